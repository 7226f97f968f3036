//! LLCP wire format
//!
//! This module provides the PDU header, TLV parameters and PDU codec.

mod error;
mod header;
mod metrics;
pub mod parameter;
mod pdu;
mod types;

pub(crate) use metrics::PduDirection;

pub use error::{Error, Result};
pub use header::PduHeader;
pub use metrics::{LinkMetrics, MetricsSnapshot};
pub use parameter::{Parameter, ParameterSet, ParameterType, Version};
pub use pdu::{FrameReject, Pdu, PduBody};
pub use types::{DmReason, PduType, Sap};

/// Header size in bytes
pub const HEADER_SIZE: usize = 2;

/// MIU every LLCP implementation must accept
pub const DEFAULT_MIU: usize = 128;

/// Largest MIUX value (11 bits)
pub const MAX_MIUX: u16 = 0x07FF;

/// Largest MIU expressible with MIUX
pub const MAX_MIU: usize = DEFAULT_MIU + MAX_MIUX as usize;

/// Protocol version this implementation speaks
pub const LLCP_VERSION: Version = Version::new(1, 1);

/// Sequence numbers are 4 bits
pub const SEQUENCE_MODULUS: u8 = 16;

/// Largest receive window
pub const MAX_RW: u8 = 15;

/// Default link timeout, in units of 10 ms
pub const DEFAULT_LTO: u8 = 10;

/// OPT value announcing link service class 3 (connectionless and connection-oriented)
pub const LINK_SERVICE_CLASS_3: u8 = 0x03;
