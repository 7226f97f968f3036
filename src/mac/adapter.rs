//! Exchange loop binding a [`Link`] to a [`Mac`].

use std::thread::{self, JoinHandle};
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "debug-tools")]
use super::debug::{Direction, PcapRecorder};
use super::{Mac, MacError, MacRole};
use crate::llc::{Flow, Link, LinkError};

/// A link bound to a MAC device.
#[derive(Debug)]
pub struct MacLink<M> {
    mac: M,
    link: Link,
    #[cfg(feature = "debug-tools")]
    capture: Option<PcapRecorder>,
}

impl<M: Mac> MacLink<M> {
    /// Bind `link` to `mac`. With `debug-tools` and a configured
    /// `pcap_path`, every exchanged frame is captured.
    pub fn new(mac: M, link: Link) -> Result<Self, LinkError> {
        #[cfg(feature = "debug-tools")]
        let capture = match &link.config().pcap_path {
            Some(path) => Some(PcapRecorder::create(path).map_err(MacError::from)?),
            None => None,
        };

        Ok(Self {
            mac,
            link,
            #[cfg(feature = "debug-tools")]
            capture,
        })
    }

    /// The bound link
    #[must_use]
    pub fn link(&self) -> &Link {
        &self.link
    }

    /// Run one MAC session on the calling thread until either side
    /// deactivates or the MAC fails.
    pub fn run(mut self, role: MacRole) -> Result<(), LinkError> {
        self.link.begin_session(role)?;
        self.drive(role)
    }

    /// Run one MAC session on a background thread.
    ///
    /// The session is already active when this returns, so connections can
    /// be opened on the handle's link right away.
    pub fn spawn(mut self, role: MacRole) -> Result<MacLinkHandle, LinkError>
    where
        M: 'static,
    {
        self.link.begin_session(role)?;
        let link = self.link.clone();
        let spawned = thread::Builder::new()
            .name("llcp-link".into())
            .spawn(move || self.drive(role));

        match spawned {
            Ok(thread) => Ok(MacLinkHandle { link, thread }),
            Err(err) => {
                link.end_session();
                Err(LinkError::Mac(MacError::Io(err)))
            }
        }
    }

    #[instrument(level = "debug", skip(self))]
    fn drive(&mut self, role: MacRole) -> Result<(), LinkError> {
        let result = match self.mac.activate(role) {
            Ok(()) => {
                let result = self.exchange_loop(role);
                self.mac.deactivate();
                result
            }
            Err(err) => Err(err.into()),
        };

        match &result {
            Ok(()) => info!("link deactivated"),
            Err(err) => warn!(error = %err, "link session failed"),
        }
        self.link.end_session();
        result
    }

    fn exchange_loop(&mut self, role: MacRole) -> Result<(), LinkError> {
        let mut inbound = match role {
            MacRole::Initiator => Bytes::new(),
            MacRole::Target => self.exchange(&[])?,
        };

        loop {
            if self.link.handle_inbound(inbound)? == Flow::Stop {
                return Ok(());
            }

            let outbound = self.link.next_frame();
            if outbound.last {
                // The peer may already be gone after link DISC.
                if let Err(err) = self.exchange(&outbound.frame) {
                    debug!(error = %err, "exchange after link DISC failed");
                }
                return Ok(());
            }
            inbound = self.exchange(&outbound.frame)?;
        }
    }

    fn exchange(&mut self, frame: &[u8]) -> Result<Bytes, MacError> {
        #[cfg(feature = "debug-tools")]
        self.capture(Direction::Sent, frame);

        let started = Instant::now();
        let answer = self.mac.exchange(frame)?;
        if !frame.is_empty() {
            self.link.record_exchange(started);
        }

        #[cfg(feature = "debug-tools")]
        self.capture(Direction::Received, &answer);
        Ok(answer)
    }

    #[cfg(feature = "debug-tools")]
    fn capture(&self, direction: Direction, frame: &[u8]) {
        if frame.is_empty() {
            return;
        }
        if let Some(recorder) = &self.capture {
            if let Err(err) = recorder.record(direction, frame) {
                debug!(error = ?err, "failed to record frame");
            }
        }
    }
}

/// Handle to a session running on its own thread.
#[derive(Debug)]
pub struct MacLinkHandle {
    link: Link,
    thread: JoinHandle<Result<(), LinkError>>,
}

impl MacLinkHandle {
    /// The link driven by the session
    #[must_use]
    pub fn link(&self) -> &Link {
        &self.link
    }

    /// Ask the session to end with link DISC.
    pub fn deactivate(&self) {
        self.link.deactivate();
    }

    /// Whether the session thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the session to end.
    pub fn join(self) -> Result<(), LinkError> {
        match self.thread.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
