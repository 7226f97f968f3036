//! In-process MAC pair.
//!
//! Each endpoint holds a sender to its peer and a receiver from it. The
//! channels hold a single frame, which gives the same lock-step as a real
//! half-duplex RF link.

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::trace;

use super::{Mac, MacError, MacRole};

/// One end of an in-process MAC pair.
#[derive(Debug)]
pub struct PipeMac {
    name: &'static str,
    tx: Option<Sender<Bytes>>,
    rx: Option<Receiver<Bytes>>,
}

/// Two connected endpoints: hand one to the initiator, one to the target.
#[must_use]
pub fn pair() -> (PipeMac, PipeMac) {
    let (a_tx, b_rx) = bounded(1);
    let (b_tx, a_rx) = bounded(1);
    (
        PipeMac {
            name: "pipe-a",
            tx: Some(a_tx),
            rx: Some(a_rx),
        },
        PipeMac {
            name: "pipe-b",
            tx: Some(b_tx),
            rx: Some(b_rx),
        },
    )
}

impl Mac for PipeMac {
    fn activate(&mut self, role: MacRole) -> Result<(), MacError> {
        if self.tx.is_none() || self.rx.is_none() {
            return Err(MacError::Device(format!("{} is closed", self.name)));
        }
        trace!(pipe = self.name, ?role, "pipe activated");
        Ok(())
    }

    fn exchange(&mut self, frame: &[u8]) -> Result<Bytes, MacError> {
        let (Some(tx), Some(rx)) = (&self.tx, &self.rx) else {
            return Err(MacError::Aborted);
        };
        if !frame.is_empty() {
            tx.send(Bytes::copy_from_slice(frame))
                .map_err(|_| MacError::PeerGone)?;
        }
        rx.recv().map_err(|_| MacError::PeerGone)
    }

    fn deactivate(&mut self) {
        trace!(pipe = self.name, "pipe closed");
        self.tx = None;
        self.rx = None;
    }
}
