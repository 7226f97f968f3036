//! LLCP PDU encode/decode
//!
//! A PDU is the 2-byte header followed by a type-specific body. Bodies are
//! kept as [`Bytes`] slices of the received frame where possible so that
//! information fields reach the connection queues without copying.

use bytes::{BufMut, Bytes, BytesMut};

use super::parameter::{decode_parameters, encode_parameters};
use super::{
    DmReason, Error, HEADER_SIZE, Parameter, PduHeader, PduType, Result, SEQUENCE_MODULUS, Sap,
};

/// Body of an FRMR PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReject {
    /// W/I/R/S flag nibble
    pub flags: u8,
    /// PTYPE of the rejected PDU
    pub ptype: u8,
    /// Sequence octet of the rejected PDU
    pub sequence: u8,
    /// Sender V(S)
    pub vs: u8,
    /// Sender V(R)
    pub vr: u8,
    /// Sender V(SA)
    pub vsa: u8,
    /// Sender V(RA)
    pub vra: u8,
}

impl FrameReject {
    /// Well-formedness: PDU type not defined or not expected.
    pub const W: u8 = 0x8;
    /// Information field not permitted or too long.
    pub const I: u8 = 0x4;
    /// N(R) outside the send window.
    pub const R: u8 = 0x2;
    /// N(S) outside the receive window.
    pub const S: u8 = 0x1;

    /// Wire size of the body.
    pub const SIZE: usize = 4;

    fn to_bytes(self) -> [u8; Self::SIZE] {
        [
            ((self.flags & 0x0F) << 4) | (self.ptype & 0x0F),
            self.sequence,
            ((self.vs & 0x0F) << 4) | (self.vr & 0x0F),
            ((self.vsa & 0x0F) << 4) | (self.vra & 0x0F),
        ]
    }

    fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self {
            flags: bytes[0] >> 4,
            ptype: bytes[0] & 0x0F,
            sequence: bytes[1],
            vs: bytes[2] >> 4,
            vr: bytes[2] & 0x0F,
            vsa: bytes[3] >> 4,
            vra: bytes[3] & 0x0F,
        }
    }
}

/// Type-specific PDU body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PduBody {
    /// Keep-alive with no content
    Symm,
    /// Link parameter exchange
    Pax(Vec<Parameter>),
    /// Several PDUs packed into one frame
    Agf(Vec<Pdu>),
    /// Connectionless information
    Ui(Bytes),
    /// Connection request
    Connect(Vec<Parameter>),
    /// Disconnect request
    Disc,
    /// Connection complete
    Cc(Vec<Parameter>),
    /// Disconnected mode
    Dm(DmReason),
    /// Frame reject
    Frmr(FrameReject),
    /// Service name lookup (SDREQ / SDRES)
    Snl(Vec<Parameter>),
    /// Numbered information
    I {
        /// Send sequence number
        ns: u8,
        /// Receive sequence number
        nr: u8,
        /// Information field
        payload: Bytes,
    },
    /// Receive ready
    Rr {
        /// Receive sequence number
        nr: u8,
    },
    /// Receive not ready
    Rnr {
        /// Receive sequence number
        nr: u8,
    },
}

impl PduBody {
    /// PTYPE of this body.
    #[must_use]
    pub const fn pdu_type(&self) -> PduType {
        match self {
            Self::Symm => PduType::Symm,
            Self::Pax(_) => PduType::Pax,
            Self::Agf(_) => PduType::Agf,
            Self::Ui(_) => PduType::Ui,
            Self::Connect(_) => PduType::Connect,
            Self::Disc => PduType::Disc,
            Self::Cc(_) => PduType::Cc,
            Self::Dm(_) => PduType::Dm,
            Self::Frmr(_) => PduType::Frmr,
            Self::Snl(_) => PduType::Snl,
            Self::I { .. } => PduType::I,
            Self::Rr { .. } => PduType::Rr,
            Self::Rnr { .. } => PduType::Rnr,
        }
    }
}

/// A complete LLCP PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    /// Destination SAP
    pub dsap: Sap,
    /// Source SAP
    pub ssap: Sap,
    /// Type-specific body
    pub body: PduBody,
}

impl Pdu {
    /// Create a PDU
    #[must_use]
    pub const fn new(dsap: Sap, ssap: Sap, body: PduBody) -> Self {
        Self { dsap, ssap, body }
    }

    /// SYMM between the link management SAPs.
    #[must_use]
    pub const fn symm() -> Self {
        Self::new(Sap::LINK_MANAGEMENT, Sap::LINK_MANAGEMENT, PduBody::Symm)
    }

    /// PDU type
    #[must_use]
    pub const fn pdu_type(&self) -> PduType {
        self.body.pdu_type()
    }

    /// Header for this PDU
    #[must_use]
    pub const fn header(&self) -> PduHeader {
        PduHeader::new(self.dsap, self.pdu_type(), self.ssap)
    }

    /// Information field length for I and UI PDUs, zero otherwise.
    #[must_use]
    pub fn information_len(&self) -> usize {
        match &self.body {
            PduBody::Ui(payload) | PduBody::I { payload, .. } => payload.len(),
            _ => 0,
        }
    }

    /// Size of the encoded PDU.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE
            + match &self.body {
                PduBody::Symm | PduBody::Disc => 0,
                PduBody::Pax(list)
                | PduBody::Connect(list)
                | PduBody::Cc(list)
                | PduBody::Snl(list) => list.iter().map(Parameter::encoded_len).sum(),
                PduBody::Agf(inner) => inner.iter().map(|pdu| 2 + pdu.encoded_len()).sum(),
                PduBody::Ui(payload) => payload.len(),
                PduBody::Dm(_) | PduBody::Rr { .. } | PduBody::Rnr { .. } => 1,
                PduBody::Frmr(_) => FrameReject::SIZE,
                PduBody::I { payload, .. } => 1 + payload.len(),
            }
    }

    /// Encode to a fresh buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut out)?;
        Ok(out.freeze())
    }

    /// Append the encoded PDU to `out`.
    pub fn encode_into(&self, out: &mut BytesMut) -> Result<()> {
        out.put_slice(&self.header().to_bytes());

        match &self.body {
            PduBody::Symm | PduBody::Disc => {}
            PduBody::Pax(list) | PduBody::Connect(list) | PduBody::Cc(list) | PduBody::Snl(list) => {
                encode_parameters(list, out)?;
            }
            PduBody::Agf(inner) => {
                for pdu in inner {
                    if pdu.pdu_type() == PduType::Agf {
                        return Err(Error::NestedAggregation);
                    }
                    let len = pdu.encoded_len();
                    let len = u16::try_from(len).map_err(|_| Error::InformationTooLarge {
                        size: len,
                        max: usize::from(u16::MAX),
                    })?;
                    out.put_u16(len);
                    pdu.encode_into(out)?;
                }
            }
            PduBody::Ui(payload) => out.put_slice(payload),
            PduBody::Dm(reason) => out.put_u8(reason.as_u8()),
            PduBody::Frmr(reject) => out.put_slice(&reject.to_bytes()),
            PduBody::I { ns, nr, payload } => {
                out.put_u8(sequence_octet(*ns, *nr)?);
                out.put_slice(payload);
            }
            PduBody::Rr { nr } | PduBody::Rnr { nr } => out.put_u8(sequence_octet(0, *nr)?),
        }

        Ok(())
    }

    /// Decode a complete frame.
    pub fn decode(frame: Bytes) -> Result<Self> {
        Self::decode_inner(frame, None, true)
    }

    /// Decode a frame and reject information fields larger than `miu`.
    pub fn decode_bounded(frame: Bytes, miu: usize) -> Result<Self> {
        Self::decode_inner(frame, Some(miu), true)
    }

    fn decode_inner(frame: Bytes, miu: Option<usize>, allow_agf: bool) -> Result<Self> {
        let header = PduHeader::from_bytes(&frame)?;
        let body = frame.slice(HEADER_SIZE..);
        let ptype = header.ptype();

        let unexpected = |len| Error::UnexpectedBody { ptype, len };
        let check_miu = |size: usize| match miu {
            Some(max) if size > max => Err(Error::InformationTooLarge { size, max }),
            _ => Ok(()),
        };

        let body = match ptype {
            PduType::Symm | PduType::Disc => {
                if !body.is_empty() {
                    return Err(unexpected(body.len()));
                }
                if ptype == PduType::Symm {
                    PduBody::Symm
                } else {
                    PduBody::Disc
                }
            }
            PduType::Pax => PduBody::Pax(decode_parameters(&body)?),
            PduType::Connect => PduBody::Connect(decode_parameters(&body)?),
            PduType::Cc => PduBody::Cc(decode_parameters(&body)?),
            PduType::Snl => PduBody::Snl(decode_parameters(&body)?),
            PduType::Agf => {
                if !allow_agf {
                    return Err(Error::NestedAggregation);
                }
                PduBody::Agf(decode_aggregate(&body, miu)?)
            }
            PduType::Ui => {
                check_miu(body.len())?;
                PduBody::Ui(body)
            }
            PduType::Dm => match body.as_ref() {
                &[reason] => PduBody::Dm(DmReason::from_u8(reason)),
                other => return Err(unexpected(other.len())),
            },
            PduType::Frmr => match body.first_chunk::<{ FrameReject::SIZE }>() {
                Some(raw) if body.len() == FrameReject::SIZE => {
                    PduBody::Frmr(FrameReject::from_bytes(*raw))
                }
                _ => return Err(unexpected(body.len())),
            },
            PduType::I => {
                let Some(&sequence) = body.first() else {
                    return Err(Error::BufferTooShort {
                        needed: HEADER_SIZE + 1,
                        got: frame.len(),
                    });
                };
                let payload = body.slice(1..);
                check_miu(payload.len())?;
                PduBody::I {
                    ns: sequence >> 4,
                    nr: sequence & 0x0F,
                    payload,
                }
            }
            PduType::Rr | PduType::Rnr => match body.as_ref() {
                &[sequence] => {
                    let nr = sequence & 0x0F;
                    if ptype == PduType::Rr {
                        PduBody::Rr { nr }
                    } else {
                        PduBody::Rnr { nr }
                    }
                }
                other => return Err(unexpected(other.len())),
            },
        };

        Ok(Self {
            dsap: header.dsap(),
            ssap: header.ssap(),
            body,
        })
    }
}

fn sequence_octet(ns: u8, nr: u8) -> Result<u8> {
    for value in [ns, nr] {
        if value >= SEQUENCE_MODULUS {
            return Err(Error::InvalidSequence { value });
        }
    }
    Ok((ns << 4) | nr)
}

fn decode_aggregate(body: &Bytes, miu: Option<usize>) -> Result<Vec<Pdu>> {
    let mut inner = Vec::new();
    let mut offset = 0;

    while offset < body.len() {
        let Some(&[high, low]) = body[offset..].first_chunk::<2>() else {
            return Err(Error::BufferTooShort {
                needed: offset + 2,
                got: body.len(),
            });
        };
        let len = usize::from(u16::from_be_bytes([high, low]));
        let start = offset + 2;
        let end = start + len;
        if end > body.len() {
            return Err(Error::BufferTooShort {
                needed: end,
                got: body.len(),
            });
        }
        inner.push(Pdu::decode_inner(body.slice(start..end), miu, false)?);
        offset = end;
    }

    Ok(inner)
}
