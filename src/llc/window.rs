//! Sequence numbering and receive-window accounting for one connection.

use crate::protocol::{FrameReject, SEQUENCE_MODULUS};

/// Errors related to sequence bookkeeping.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum WindowError {
    /// N(R) acknowledges a frame that was never sent.
    #[error("N(R) {nr} outside send window V(SA)={vsa} V(S)={vs}")]
    AckOutOfRange {
        /// Received N(R)
        nr: u8,
        /// Oldest unacknowledged N(S)
        vsa: u8,
        /// Next N(S)
        vs: u8,
    },
}

const fn distance(from: u8, to: u8) -> u8 {
    to.wrapping_sub(from) % SEQUENCE_MODULUS
}

const fn increment(value: u8) -> u8 {
    (value + 1) % SEQUENCE_MODULUS
}

/// Mod-16 send and receive state variables.
///
/// Inbound frames are acknowledged once the application has taken them,
/// so the peer never has more than `local_rw` frames buffered here.
#[derive(Debug, Clone)]
pub(crate) struct SequenceWindow {
    /// V(S): next N(S) to send
    vs: u8,
    /// V(SA): oldest N(S) not yet acknowledged by the peer
    vsa: u8,
    /// V(R): next N(S) expected from the peer
    vr: u8,
    /// Sequence up to which the application has consumed frames
    delivered: u8,
    /// V(RA): last N(R) sent to the peer
    vra: u8,
    remote_rw: u8,
    local_rw: u8,
}

impl SequenceWindow {
    pub(crate) const fn new(local_rw: u8, remote_rw: u8) -> Self {
        Self {
            vs: 0,
            vsa: 0,
            vr: 0,
            delivered: 0,
            vra: 0,
            remote_rw,
            local_rw,
        }
    }

    pub(crate) fn set_remote_rw(&mut self, remote_rw: u8) {
        self.remote_rw = remote_rw;
    }

    pub(crate) const fn remote_rw(&self) -> u8 {
        self.remote_rw
    }

    /// Frames sent but not acknowledged.
    pub(crate) const fn unacknowledged(&self) -> u8 {
        distance(self.vsa, self.vs)
    }

    /// Frames the peer would still accept right now.
    pub(crate) const fn available(&self) -> u8 {
        self.remote_rw.saturating_sub(self.unacknowledged())
    }

    pub(crate) const fn can_send(&self) -> bool {
        self.available() > 0
    }

    /// Allocate N(S) and N(R) for an outbound I PDU.
    pub(crate) fn next_send(&mut self) -> (u8, u8) {
        let ns = self.vs;
        self.vs = increment(self.vs);
        self.vra = self.delivered;
        (ns, self.delivered)
    }

    /// An acknowledgement not yet carried to the peer.
    pub(crate) const fn pending_ack(&self) -> bool {
        self.delivered != self.vra
    }

    /// N(R) for an RR, if one is owed.
    pub(crate) fn take_ack(&mut self) -> Option<u8> {
        if !self.pending_ack() {
            return None;
        }
        self.vra = self.delivered;
        Some(self.delivered)
    }

    /// Apply N(R) received from the peer.
    pub(crate) fn on_ack(&mut self, nr: u8) -> Result<(), WindowError> {
        if distance(self.vsa, nr) > self.unacknowledged() {
            return Err(WindowError::AckOutOfRange {
                nr,
                vsa: self.vsa,
                vs: self.vs,
            });
        }
        self.vsa = nr;
        Ok(())
    }

    /// Whether an inbound N(S) is the next expected frame and fits the
    /// receive window. Accepted frames advance V(R).
    pub(crate) fn accept(&mut self, ns: u8) -> bool {
        if ns != self.vr || self.buffered() >= self.local_rw {
            return false;
        }
        self.vr = increment(self.vr);
        true
    }

    /// Frames accepted but not yet taken by the application.
    pub(crate) const fn buffered(&self) -> u8 {
        distance(self.delivered, self.vr)
    }

    /// The application consumed one frame.
    pub(crate) fn mark_delivered(&mut self) {
        if self.buffered() > 0 {
            self.delivered = increment(self.delivered);
        }
    }

    /// FRMR body describing the rejected frame and the current state.
    pub(crate) const fn reject(&self, flags: u8, ptype: u8, sequence: u8) -> FrameReject {
        FrameReject {
            flags,
            ptype,
            sequence,
            vs: self.vs,
            vr: self.vr,
            vsa: self.vsa,
            vra: self.vra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_window_limits() {
        let mut window = SequenceWindow::new(1, 2);
        assert!(window.can_send());
        assert_eq!(window.next_send(), (0, 0));
        assert_eq!(window.next_send(), (1, 0));
        assert!(!window.can_send());
        assert_eq!(window.unacknowledged(), 2);

        window.on_ack(1).unwrap();
        assert_eq!(window.available(), 1);
        window.on_ack(2).unwrap();
        assert_eq!(window.unacknowledged(), 0);
    }

    #[test]
    fn test_ack_out_of_range() {
        let mut window = SequenceWindow::new(1, 4);
        window.next_send();
        assert_eq!(
            window.on_ack(3),
            Err(WindowError::AckOutOfRange {
                nr: 3,
                vsa: 0,
                vs: 1
            })
        );
        // Re-acknowledging the current state is harmless.
        window.on_ack(0).unwrap();
    }

    #[test]
    fn test_sequence_wraps() {
        let mut window = SequenceWindow::new(15, 15);
        for expected in 0..20u8 {
            let (ns, _) = window.next_send();
            assert_eq!(ns, expected % 16);
            window.on_ack(increment(ns)).unwrap();
        }
    }

    #[test]
    fn test_receive_acknowledges_on_delivery() {
        let mut window = SequenceWindow::new(2, 1);
        assert!(window.accept(0));
        assert!(!window.pending_ack());
        // Duplicate and out-of-order frames are refused.
        assert!(!window.accept(0));
        assert!(!window.accept(2));
        assert!(window.accept(1));
        // Window of 2 is full until the application reads.
        assert!(!window.accept(2));

        window.mark_delivered();
        assert_eq!(window.take_ack(), Some(1));
        assert_eq!(window.take_ack(), None);
        assert!(window.accept(2));
    }

    #[test]
    fn test_information_carries_ack() {
        let mut window = SequenceWindow::new(1, 1);
        assert!(window.accept(0));
        window.mark_delivered();
        assert!(window.pending_ack());
        assert_eq!(window.next_send(), (0, 1));
        assert!(!window.pending_ack());
    }

    #[test]
    fn test_reject_snapshot() {
        let mut window = SequenceWindow::new(1, 1);
        window.next_send();
        let frmr = window.reject(FrameReject::R, 0xD, 0x05);
        assert_eq!(frmr.vs, 1);
        assert_eq!(frmr.vsa, 0);
        assert_eq!(frmr.flags, FrameReject::R);
    }
}
