use std::time::Duration;

#[cfg(feature = "debug-tools")]
use std::path::PathBuf;

use crate::protocol::{DEFAULT_LTO, DEFAULT_MIU};

/// Link configuration options.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LinkConfig {
    /// Link MIU announced in PAX and enforced on inbound information fields.
    pub miu: usize,
    /// Link timeout announced in PAX, in units of 10 ms.
    pub lto: u8,
    /// How long the exchange loop waits for outbound work before sending SYMM.
    pub symm_delay: Duration,
    /// Limit on waiting for CC after CONNECT; `None` waits until CC, DM or
    /// link loss.
    pub connect_timeout: Option<Duration>,
    /// Limit on waiting for an SDRES.
    pub resolve_timeout: Duration,
    /// Pack several ready PDUs into one AGF when they fit the peer's MIU.
    pub aggregation: bool,
    /// Optional PCAP capture of every exchanged frame (debug builds only).
    #[cfg(feature = "debug-tools")]
    pub pcap_path: Option<PathBuf>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            miu: DEFAULT_MIU,
            lto: DEFAULT_LTO,
            symm_delay: Duration::from_millis(10),
            connect_timeout: None,
            resolve_timeout: Duration::from_secs(3),
            aggregation: false,
            #[cfg(feature = "debug-tools")]
            pcap_path: None,
        }
    }
}

impl LinkConfig {
    /// Link timeout as a duration.
    #[must_use]
    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.lto) * 10)
    }
}
