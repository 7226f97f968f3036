//! LLCP TLV parameters
//!
//! Parameters travel in PAX, CONNECT, CC and SNL bodies as
//! `{type: u8, length: u8, value: [u8; length]}`.

use std::fmt;

use bytes::{BufMut, BytesMut};
use tracing::trace;

use super::{DEFAULT_MIU, Error, MAX_MIUX, Result, Sap};

/// Parameter type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ParameterType {
    /// LLCP version number
    Version = 0x01,
    /// MIU extension
    Miux = 0x02,
    /// Well-known service list
    Wks = 0x03,
    /// Link timeout
    Lto = 0x04,
    /// Receive window size
    Rw = 0x05,
    /// Service name
    ServiceName = 0x06,
    /// Option (link service class)
    Opt = 0x07,
    /// Service discovery request
    SdReq = 0x08,
    /// Service discovery response
    SdRes = 0x09,
}

impl ParameterType {
    /// Convert from byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Version),
            0x02 => Some(Self::Miux),
            0x03 => Some(Self::Wks),
            0x04 => Some(Self::Lto),
            0x05 => Some(Self::Rw),
            0x06 => Some(Self::ServiceName),
            0x07 => Some(Self::Opt),
            0x08 => Some(Self::SdReq),
            0x09 => Some(Self::SdRes),
            _ => None,
        }
    }

    /// Convert to byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Required value length for fixed-size parameters.
    const fn fixed_len(self) -> Option<usize> {
        match self {
            Self::Version | Self::Lto | Self::Rw | Self::Opt => Some(1),
            Self::Miux | Self::Wks | Self::SdRes => Some(2),
            Self::ServiceName | Self::SdReq => None,
        }
    }
}

/// LLCP version (major.minor), encoded as one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Version {
    major: u8,
    minor: u8,
}

impl Version {
    /// Create a version; both parts are 4 bits on the wire.
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self {
            major: major & 0x0F,
            minor: minor & 0x0F,
        }
    }

    /// Decode from the wire byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self::new(byte >> 4, byte & 0x0F)
    }

    /// Encode to the wire byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        (self.major << 4) | self.minor
    }

    /// Major version
    #[must_use]
    pub const fn major(self) -> u8 {
        self.major
    }

    /// Minor version
    #[must_use]
    pub const fn minor(self) -> u8 {
        self.minor
    }

    /// Agreed version with a peer, or `None` when majors differ.
    #[must_use]
    pub fn agree(self, remote: Self) -> Option<Self> {
        (self.major == remote.major).then(|| Self::new(self.major, self.minor.min(remote.minor)))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Decoded LLCP parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameter {
    /// LLCP version
    Version(Version),
    /// MIU extension (11 significant bits); MIU = 128 + MIUX
    Miux(u16),
    /// Bitmap of bound well-known SAPs 0..=15
    Wks(u16),
    /// Link timeout in units of 10 ms
    Lto(u8),
    /// Receive window (low 4 bits)
    Rw(u8),
    /// Service name URI
    ServiceName(String),
    /// Link service class and other options
    Opt(u8),
    /// Discovery request: transaction id + URI
    SdReq {
        /// Transaction id chosen by the requester
        tid: u8,
        /// Service name to resolve
        uri: String,
    },
    /// Discovery response: transaction id + SAP (0 when not found)
    SdRes {
        /// Transaction id copied from the request
        tid: u8,
        /// Resolved SAP byte
        sap: u8,
    },
}

impl Parameter {
    /// Type code of this parameter.
    #[must_use]
    pub const fn parameter_type(&self) -> ParameterType {
        match self {
            Self::Version(_) => ParameterType::Version,
            Self::Miux(_) => ParameterType::Miux,
            Self::Wks(_) => ParameterType::Wks,
            Self::Lto(_) => ParameterType::Lto,
            Self::Rw(_) => ParameterType::Rw,
            Self::ServiceName(_) => ParameterType::ServiceName,
            Self::Opt(_) => ParameterType::Opt,
            Self::SdReq { .. } => ParameterType::SdReq,
            Self::SdRes { .. } => ParameterType::SdRes,
        }
    }

    /// MIUX parameter announcing the given MIU.
    #[must_use]
    pub fn miux_for(miu: usize) -> Self {
        let extension = miu.saturating_sub(DEFAULT_MIU).min(usize::from(MAX_MIUX));
        Self::Miux(u16::try_from(extension).unwrap_or(MAX_MIUX))
    }

    fn value_len(&self) -> usize {
        match self {
            Self::ServiceName(name) => name.len(),
            Self::SdReq { uri, .. } => 1 + uri.len(),
            other => other.parameter_type().fixed_len().unwrap_or(0),
        }
    }

    /// Size on the wire including the type and length bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        2 + self.value_len()
    }

    /// Append the TLV to `out`; the length byte always matches the value.
    pub fn encode(&self, out: &mut BytesMut) -> Result<()> {
        let len = self.value_len();
        let len_byte = u8::try_from(len).map_err(|_| Error::ParameterTooLong { len })?;

        out.reserve(2 + len);
        out.put_u8(self.parameter_type().as_u8());
        out.put_u8(len_byte);

        match self {
            Self::Version(version) => out.put_u8(version.as_byte()),
            Self::Miux(miux) => out.put_u16(miux & MAX_MIUX),
            Self::Wks(wks) => out.put_u16(*wks),
            Self::Lto(lto) => out.put_u8(*lto),
            Self::Rw(rw) => out.put_u8(rw & 0x0F),
            Self::ServiceName(name) => out.put_slice(name.as_bytes()),
            Self::Opt(opt) => out.put_u8(*opt),
            Self::SdReq { tid, uri } => {
                out.put_u8(*tid);
                out.put_slice(uri.as_bytes());
            }
            Self::SdRes { tid, sap } => {
                out.put_u8(*tid);
                out.put_u8(sap & 0x3F);
            }
        }

        Ok(())
    }

    /// Decode one TLV from the front of `buf`.
    ///
    /// Returns the parameter (or `None` for an unknown type, which is
    /// skipped) and the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Option<Self>, usize)> {
        let Some(&[raw_type, declared]) = buf.first_chunk::<2>() else {
            return Err(Error::BufferTooShort {
                needed: 2,
                got: buf.len(),
            });
        };
        let declared = usize::from(declared);
        let remaining = buf.len() - 2;
        let Some(value) = buf.get(2..2 + declared) else {
            return Err(Error::MalformedParameter {
                ptype: raw_type,
                declared,
                remaining,
            });
        };
        let consumed = 2 + declared;

        let Some(ptype) = ParameterType::from_u8(raw_type) else {
            trace!(ptype = raw_type, len = declared, "skipping unknown parameter");
            return Ok((None, consumed));
        };

        if let Some(expected) = ptype.fixed_len() {
            if value.len() != expected {
                return Err(Error::InvalidParameterLength {
                    ptype: raw_type,
                    len: value.len(),
                    expected,
                });
            }
        }

        let parameter = match ptype {
            ParameterType::Version => Self::Version(Version::from_byte(value[0])),
            ParameterType::Miux => Self::Miux(u16::from_be_bytes([value[0], value[1]]) & MAX_MIUX),
            ParameterType::Wks => Self::Wks(u16::from_be_bytes([value[0], value[1]])),
            ParameterType::Lto => Self::Lto(value[0]),
            ParameterType::Rw => Self::Rw(value[0] & 0x0F),
            ParameterType::ServiceName => Self::ServiceName(utf8(value)?),
            ParameterType::Opt => Self::Opt(value[0]),
            ParameterType::SdReq => {
                let Some((&tid, uri)) = value.split_first() else {
                    return Err(Error::InvalidParameterLength {
                        ptype: raw_type,
                        len: 0,
                        expected: 1,
                    });
                };
                Self::SdReq {
                    tid,
                    uri: utf8(uri)?,
                }
            }
            ParameterType::SdRes => {
                let sap = Sap::try_from(value[1])?;
                Self::SdRes {
                    tid: value[0],
                    sap: sap.as_u8(),
                }
            }
        };

        Ok((Some(parameter), consumed))
    }
}

fn utf8(value: &[u8]) -> Result<String> {
    String::from_utf8(value.to_vec()).map_err(|_| Error::InvalidServiceName)
}

/// Append every parameter to `out`.
pub fn encode_parameters(parameters: &[Parameter], out: &mut BytesMut) -> Result<()> {
    for parameter in parameters {
        parameter.encode(out)?;
    }
    Ok(())
}

/// Decode a complete parameter list.
///
/// Any malformed entry fails the whole list; callers discard the PDU.
pub fn decode_parameters(mut buf: &[u8]) -> Result<Vec<Parameter>> {
    let mut parameters = Vec::new();
    while !buf.is_empty() {
        let (parameter, consumed) = Parameter::decode(buf)?;
        parameters.extend(parameter);
        buf = &buf[consumed..];
    }
    Ok(parameters)
}

/// Commonly used values pulled out of a parameter list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    /// VERSION, if present
    pub version: Option<Version>,
    /// MIUX, if present
    pub miux: Option<u16>,
    /// WKS, if present
    pub wks: Option<u16>,
    /// LTO, if present
    pub lto: Option<u8>,
    /// RW, if present
    pub rw: Option<u8>,
    /// SN, if present
    pub service_name: Option<String>,
    /// OPT, if present
    pub opt: Option<u8>,
}

impl ParameterSet {
    /// Collect the link and connection parameters; the last occurrence wins.
    #[must_use]
    pub fn from_list(parameters: &[Parameter]) -> Self {
        let mut set = Self::default();
        for parameter in parameters {
            match parameter {
                Parameter::Version(version) => set.version = Some(*version),
                Parameter::Miux(miux) => set.miux = Some(*miux),
                Parameter::Wks(wks) => set.wks = Some(*wks),
                Parameter::Lto(lto) => set.lto = Some(*lto),
                Parameter::Rw(rw) => set.rw = Some(*rw),
                Parameter::ServiceName(name) => set.service_name = Some(name.clone()),
                Parameter::Opt(opt) => set.opt = Some(*opt),
                Parameter::SdReq { .. } | Parameter::SdRes { .. } => {}
            }
        }
        set
    }

    /// MIU announced by the peer (128 when MIUX is absent).
    #[must_use]
    pub fn miu(&self) -> usize {
        DEFAULT_MIU + usize::from(self.miux.unwrap_or(0))
    }
}
