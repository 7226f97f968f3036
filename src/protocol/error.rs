//! LLCP wire format errors
//!
//! Every variant describes a malformed PDU: the receiver drops the whole
//! frame, logs it and keeps the link running.

use thiserror::Error;

use super::PduType;

/// LLCP codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Frame shorter than the fields it must carry
    #[error("buffer too short: need {needed} bytes, got {got}")]
    BufferTooShort {
        /// Needed size
        needed: usize,
        /// Actual size
        got: usize,
    },

    /// PTYPE value is reserved
    #[error("unknown PDU type: {ptype:#x}")]
    UnknownPduType {
        /// Raw 4-bit PTYPE
        ptype: u8,
    },

    /// Parameter length runs past the end of the buffer
    #[error("parameter {ptype:#04x} declares {declared} bytes but only {remaining} remain")]
    MalformedParameter {
        /// Parameter type byte
        ptype: u8,
        /// Declared length
        declared: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// Fixed-size parameter with the wrong length
    #[error("parameter {ptype:#04x} has length {len}, expected {expected}")]
    InvalidParameterLength {
        /// Parameter type byte
        ptype: u8,
        /// Length found
        len: usize,
        /// Length required
        expected: usize,
    },

    /// Parameter value does not fit the 1-byte length field
    #[error("parameter value too long: {len} bytes (max 255)")]
    ParameterTooLong {
        /// Value length
        len: usize,
    },

    /// SAP outside 0..=63
    #[error("invalid SAP: {value}")]
    InvalidSap {
        /// Raw value
        value: u8,
    },

    /// Service name or URI is not UTF-8
    #[error("service name is not valid UTF-8")]
    InvalidServiceName,

    /// AGF inside an AGF
    #[error("aggregated frame nested inside an aggregated frame")]
    NestedAggregation,

    /// Body present on a PDU type that has none, or of the wrong size
    #[error("{ptype} PDU carries an unexpected {len}-byte body")]
    UnexpectedBody {
        /// PDU type
        ptype: PduType,
        /// Body length
        len: usize,
    },

    /// Information field exceeds the MIU
    #[error("information field too large: {size} bytes (max {max})")]
    InformationTooLarge {
        /// Field size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// N(S) or N(R) outside 0..=15
    #[error("sequence number out of range: {value}")]
    InvalidSequence {
        /// Offending value
        value: u8,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
