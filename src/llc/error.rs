//! Link-level error types covering registry, connection and MAC failures.

use core::fmt;

use thiserror::Error;

use crate::mac::MacError;
use crate::protocol::{self, DmReason, Sap, Version};

/// Errors raised while binding or unbinding services.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Another service already holds the SAP.
    #[error("SAP {sap} is already bound")]
    DuplicateSap {
        /// Requested SAP
        sap: Sap,
    },

    /// Another service already advertises the URI.
    #[error("service name {uri:?} is already bound")]
    DuplicateUri {
        /// Requested service name
        uri: String,
    },

    /// Every local SAP (32..=63) is taken.
    #[error("no free local SAP left")]
    RegistryFull,

    /// SAP 0 and 1 belong to the link.
    #[error("SAP {sap} is reserved for the link")]
    ReservedSap {
        /// Requested SAP
        sap: Sap,
    },

    /// MIU below 128, above the link MIU, or RW above 15.
    #[error("invalid service parameters: miu {miu}, rw {rw}")]
    InvalidParameters {
        /// Requested MIU
        miu: usize,
        /// Requested receive window
        rw: u8,
    },
}

/// Errors returned by connection operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The peer answered CONNECT with DM.
    #[error("connection refused: {reason}")]
    ConnectionRefused {
        /// Reason carried by the DM PDU
        reason: DmReason,
    },

    /// The connection was closed by either side.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation requires the `Connected` state.
    #[error("not connected")]
    NotConnected,

    /// Caller-supplied or configured timeout expired.
    #[error("operation timed out")]
    Timeout,

    /// The MAC session ended underneath the connection.
    #[error("link is down")]
    LinkDown,

    /// Payload larger than the peer's MIU.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Payload size
        size: usize,
        /// Peer MIU
        max: usize,
    },

    /// No service is bound at the local SAP.
    #[error("no service bound at SAP {sap}")]
    UnboundSap {
        /// Local SAP
        sap: Sap,
    },

    /// `send_to` on a connection-oriented handle.
    #[error("operation requires a datagram channel")]
    NotDatagram,

    /// A live connection already uses the SAP pair.
    #[error("connection {local} -> {remote} already exists")]
    AlreadyConnected {
        /// Local SAP
        local: Sap,
        /// Remote SAP
        remote: Sap,
    },

    /// Connection MIU outside 128..=link MIU, or RW above 15.
    #[error("invalid connection parameters: miu {miu}, rw {rw}")]
    InvalidParameters {
        /// Requested MIU
        miu: usize,
        /// Requested receive window
        rw: u8,
    },

    /// Every SDP transaction id is waiting for an answer.
    #[error("too many SDP requests in flight")]
    ResolverBusy,

    /// A request could not be encoded.
    #[error(transparent)]
    Protocol(#[from] protocol::Error),
}

/// Errors that end a MAC session.
#[derive(Debug)]
pub enum LinkError {
    /// The MAC exchange failed.
    Mac(MacError),
    /// The peer speaks a different major version.
    IncompatibleVersion {
        /// Version announced locally
        local: Version,
        /// Version announced by the peer
        remote: Version,
    },
    /// A session is already running on this link.
    AlreadyActive,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mac(err) => write!(f, "MAC error: {err}"),
            Self::IncompatibleVersion { local, remote } => {
                write!(f, "incompatible LLCP version: local {local}, remote {remote}")
            }
            Self::AlreadyActive => write!(f, "link session already active"),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Mac(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MacError> for LinkError {
    fn from(err: MacError) -> Self {
        Self::Mac(err)
    }
}
