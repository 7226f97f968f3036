//! MAC layer abstraction.
//!
//! LLCP runs on top of a half-duplex MAC (NFC-DEP) that moves one frame in
//! each direction per turn. [`Mac`] is the seam a device driver implements;
//! [`MacLink`] drives a [`Link`](crate::Link) over it and [`pipe`] provides
//! an in-process pair for tests and demos.

mod adapter;
#[cfg(feature = "debug-tools")]
pub mod debug;
pub mod pipe;

use bytes::Bytes;
use thiserror::Error;

pub use adapter::{MacLink, MacLinkHandle};

/// Which side of the MAC this device plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MacRole {
    /// Sends the first frame of every turn.
    Initiator,
    /// Answers the initiator's frames.
    Target,
}

/// Errors reported by a MAC implementation.
#[derive(Debug, Error)]
pub enum MacError {
    /// Device I/O failure.
    #[error("mac i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The exchange was aborted locally.
    #[error("exchange aborted")]
    Aborted,

    /// The peer left the field or closed its end.
    #[error("peer gone")]
    PeerGone,

    /// Device-specific failure.
    #[error("device error: {0}")]
    Device(String),
}

/// A half-duplex frame exchange.
///
/// `exchange` sends one frame and returns the peer's next frame. A target
/// calls it with an empty frame first to receive the initiator's opening
/// frame; empty frames are never put on the wire.
pub trait Mac: Send {
    /// Bring the RF link up in `role`.
    fn activate(&mut self, role: MacRole) -> Result<(), MacError>;

    /// Send `frame` and wait for the peer's answer.
    fn exchange(&mut self, frame: &[u8]) -> Result<Bytes, MacError>;

    /// Release the RF link.
    fn deactivate(&mut self);
}

impl<M: Mac + ?Sized> Mac for Box<M> {
    fn activate(&mut self, role: MacRole) -> Result<(), MacError> {
        (**self).activate(role)
    }

    fn exchange(&mut self, frame: &[u8]) -> Result<Bytes, MacError> {
        (**self).exchange(frame)
    }

    fn deactivate(&mut self) {
        (**self).deactivate();
    }
}
