//! Application services bound to SAPs.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error};

use super::connection::Connection;
use super::error::RegistryError;
use crate::protocol::{DEFAULT_MIU, MAX_RW, Sap};

/// Callback run on its own thread for every inbound connection and for the
/// service's connectionless channel.
pub type Handler = Arc<dyn Fn(Connection) + Send + Sync>;

/// A service registered with a [`Link`](super::Link).
///
/// ```rust
/// use llcp::Service;
///
/// let service = Service::new(|conn| {
///     while let Ok((payload, _from)) = conn.recv(None) {
///         let _ = conn.send(payload);
///     }
/// })
/// .with_uri("urn:nfc:sn:echo")
/// .with_miu(248)
/// .with_rw(2);
///
/// assert_eq!(service.sap(), None);
/// assert_eq!(service.uri(), Some("urn:nfc:sn:echo"));
/// ```
#[derive(Clone)]
pub struct Service {
    uri: Option<String>,
    sap: Option<Sap>,
    miu: usize,
    rw: u8,
    handler: Handler,
}

impl Service {
    /// Service with the default MIU (128) and RW (1), bound to the next free
    /// local SAP unless [`with_sap`](Self::with_sap) is used.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(Connection) + Send + Sync + 'static,
    {
        Self {
            uri: None,
            sap: None,
            miu: DEFAULT_MIU,
            rw: 1,
            handler: Arc::new(handler),
        }
    }

    /// Advertise the service under a name for SDP and connect-by-name.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Request a fixed SAP.
    #[must_use]
    pub fn with_sap(mut self, sap: Sap) -> Self {
        self.sap = Some(sap);
        self
    }

    /// Largest information field this service accepts.
    #[must_use]
    pub fn with_miu(mut self, miu: usize) -> Self {
        self.miu = miu;
        self
    }

    /// Receive window announced on connections.
    #[must_use]
    pub fn with_rw(mut self, rw: u8) -> Self {
        self.rw = rw;
        self
    }

    /// Service name, if any
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Requested SAP, if fixed
    #[must_use]
    pub fn sap(&self) -> Option<Sap> {
        self.sap
    }

    /// MIU
    #[must_use]
    pub fn miu(&self) -> usize {
        self.miu
    }

    /// Receive window
    #[must_use]
    pub fn rw(&self) -> u8 {
        self.rw
    }

    pub(crate) fn validate(&self) -> Result<(), RegistryError> {
        if self.miu < DEFAULT_MIU || self.rw > MAX_RW {
            return Err(RegistryError::InvalidParameters {
                miu: self.miu,
                rw: self.rw,
            });
        }
        Ok(())
    }

    /// Run the handler on a dedicated thread; the connection is
    /// disconnected when the handler returns.
    pub(crate) fn spawn(&self, conn: Connection) {
        let handler = Arc::clone(&self.handler);
        let sap = conn.local_sap();
        let worker = conn.clone();

        let spawned = thread::Builder::new()
            .name(format!("llcp-sap-{:02}", sap.as_u8()))
            .spawn(move || {
                debug!(%sap, "service handler started");
                let owned = worker.clone();
                if panic::catch_unwind(AssertUnwindSafe(|| handler(owned))).is_err() {
                    error!(%sap, "service handler panicked");
                }
                worker.disconnect();
                debug!(%sap, "service handler finished");
            });

        if let Err(err) = spawned {
            error!(%sap, error = %err, "failed to start service handler");
            conn.disconnect();
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("uri", &self.uri)
            .field("sap", &self.sap)
            .field("miu", &self.miu)
            .field("rw", &self.rw)
            .finish_non_exhaustive()
    }
}
