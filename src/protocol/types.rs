//! LLCP addressing and PDU type enumerations

use std::fmt;

use super::Error;

/// Service Access Point address (6 bits, 0..=63).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sap(u8);

impl Sap {
    /// Largest encodable SAP value.
    pub const MAX: u8 = 63;
    /// Link management (SYMM, PAX, link DISC).
    pub const LINK_MANAGEMENT: Self = Self(0x00);
    /// Service Discovery Protocol.
    pub const SDP: Self = Self(0x01);
    /// Well-known SAP of the Simple NDEF Exchange Protocol.
    pub const SNEP: Self = Self(0x04);
    /// First SAP handed out by automatic binding.
    pub const FIRST_LOCAL: Self = Self(0x20);

    /// Create a SAP, rejecting values above 63.
    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Build a SAP from the 6 low bits of a header field.
    pub(crate) const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x3F)
    }

    /// Raw SAP value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// SAP 0 and 1 belong to the link itself.
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        self.0 <= Self::SDP.0
    }

    /// Well-known range assigned by name convention (2..=31).
    #[must_use]
    pub const fn is_well_known(self) -> bool {
        self.0 > Self::SDP.0 && self.0 < Self::FIRST_LOCAL.0
    }

    /// Local range used for on-demand binding (32..=63).
    #[must_use]
    pub const fn is_local(self) -> bool {
        self.0 >= Self::FIRST_LOCAL.0
    }
}

impl TryFrom<u8> for Sap {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(Error::InvalidSap { value })
    }
}

impl From<Sap> for u8 {
    fn from(sap: Sap) -> Self {
        sap.0
    }
}

impl fmt::Display for Sap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// LLCP PDU types (4-bit PTYPE field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PduType {
    /// Symmetry, keeps the half-duplex exchange going
    Symm = 0x0,
    /// Parameter exchange
    Pax = 0x1,
    /// Aggregated frame
    Agf = 0x2,
    /// Unnumbered information (connectionless)
    Ui = 0x3,
    /// Connection request
    Connect = 0x4,
    /// Disconnect
    Disc = 0x5,
    /// Connection complete
    Cc = 0x6,
    /// Disconnected mode
    Dm = 0x7,
    /// Frame reject
    Frmr = 0x8,
    /// Service name lookup
    Snl = 0x9,
    /// Numbered information
    I = 0xC,
    /// Receive ready
    Rr = 0xD,
    /// Receive not ready
    Rnr = 0xE,
}

impl PduType {
    /// Convert from the 4-bit PTYPE value. Reserved values yield `None`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Symm),
            0x1 => Some(Self::Pax),
            0x2 => Some(Self::Agf),
            0x3 => Some(Self::Ui),
            0x4 => Some(Self::Connect),
            0x5 => Some(Self::Disc),
            0x6 => Some(Self::Cc),
            0x7 => Some(Self::Dm),
            0x8 => Some(Self::Frmr),
            0x9 => Some(Self::Snl),
            0xC => Some(Self::I),
            0xD => Some(Self::Rr),
            0xE => Some(Self::Rnr),
            _ => None,
        }
    }

    /// Convert to the 4-bit PTYPE value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// PDUs that carry the sequence octet after the header.
    #[must_use]
    pub const fn has_sequence(self) -> bool {
        matches!(self, Self::I | Self::Rr | Self::Rnr)
    }

    /// PDUs whose body is a TLV parameter list.
    #[must_use]
    pub const fn has_parameters(self) -> bool {
        matches!(self, Self::Pax | Self::Connect | Self::Cc | Self::Snl)
    }

    /// All defined types, in PTYPE order.
    pub const ALL: [Self; 13] = [
        Self::Symm,
        Self::Pax,
        Self::Agf,
        Self::Ui,
        Self::Connect,
        Self::Disc,
        Self::Cc,
        Self::Dm,
        Self::Frmr,
        Self::Snl,
        Self::I,
        Self::Rr,
        Self::Rnr,
    ];
}

impl fmt::Display for PduType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Symm => "SYMM",
            Self::Pax => "PAX",
            Self::Agf => "AGF",
            Self::Ui => "UI",
            Self::Connect => "CONNECT",
            Self::Disc => "DISC",
            Self::Cc => "CC",
            Self::Dm => "DM",
            Self::Frmr => "FRMR",
            Self::Snl => "SNL",
            Self::I => "I",
            Self::Rr => "RR",
            Self::Rnr => "RNR",
        };
        write!(f, "{name}")
    }
}

/// Reason octet carried by a DM PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmReason {
    /// Acknowledges a DISC
    Disconnected,
    /// No connection exists for the addressed SAP pair
    NoActiveConnection,
    /// Nothing is bound at the target SAP
    NoServiceBound,
    /// The service layer refused the CONNECT
    Rejected,
    /// Permanently refusing CONNECT to this SAP
    PermanentRejectSap,
    /// Permanently refusing CONNECT to any SAP
    PermanentRejectAny,
    /// Temporarily refusing CONNECT to this SAP
    TemporaryRejectSap,
    /// Temporarily refusing CONNECT to any SAP
    TemporaryRejectAny,
    /// Value outside the defined set
    Other(u8),
}

impl DmReason {
    /// Convert from the wire octet.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Disconnected,
            0x01 => Self::NoActiveConnection,
            0x02 => Self::NoServiceBound,
            0x03 => Self::Rejected,
            0x10 => Self::PermanentRejectSap,
            0x11 => Self::PermanentRejectAny,
            0x20 => Self::TemporaryRejectSap,
            0x21 => Self::TemporaryRejectAny,
            other => Self::Other(other),
        }
    }

    /// Convert to the wire octet.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0x00,
            Self::NoActiveConnection => 0x01,
            Self::NoServiceBound => 0x02,
            Self::Rejected => 0x03,
            Self::PermanentRejectSap => 0x10,
            Self::PermanentRejectAny => 0x11,
            Self::TemporaryRejectSap => 0x20,
            Self::TemporaryRejectAny => 0x21,
            Self::Other(value) => value,
        }
    }
}

impl fmt::Display for DmReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::NoActiveConnection => write!(f, "no active connection"),
            Self::NoServiceBound => write!(f, "no service bound to target SAP"),
            Self::Rejected => write!(f, "rejected by service layer"),
            Self::PermanentRejectSap => write!(f, "permanently rejected for this SAP"),
            Self::PermanentRejectAny => write!(f, "permanently rejected for any SAP"),
            Self::TemporaryRejectSap => write!(f, "temporarily rejected for this SAP"),
            Self::TemporaryRejectAny => write!(f, "temporarily rejected for any SAP"),
            Self::Other(value) => write!(f, "reason {value:#04x}"),
        }
    }
}
