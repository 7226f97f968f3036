//! LLCP PDU header
//!
//! The header is 2 bytes and carries the destination SAP, PDU type and
//! source SAP.

use super::{Error, HEADER_SIZE, PduType, Result, Sap};

/// LLCP PDU header (2 bytes)
///
/// # Wire Format
///
/// ```text
///  0                   1
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    DSAP   | PTYPE |    SSAP   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduHeader {
    dsap: Sap,
    ptype: PduType,
    ssap: Sap,
}

impl PduHeader {
    /// Create a new PDU header
    #[must_use]
    pub const fn new(dsap: Sap, ptype: PduType, ssap: Sap) -> Self {
        Self { dsap, ptype, ssap }
    }

    /// Destination SAP
    #[must_use]
    pub const fn dsap(&self) -> Sap {
        self.dsap
    }

    /// PDU type
    #[must_use]
    pub const fn ptype(&self) -> PduType {
        self.ptype
    }

    /// Source SAP
    #[must_use]
    pub const fn ssap(&self) -> Sap {
        self.ssap
    }

    /// Convert to bytes
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let dsap = self.dsap.as_u8();
        let ptype = self.ptype.as_u8();
        let ssap = self.ssap.as_u8();

        [(dsap << 2) | (ptype >> 2), ((ptype & 0x03) << 6) | ssap]
    }

    /// Write the header into the first two bytes of `out`.
    pub fn encode(&self, out: &mut [u8]) -> Result<()> {
        let Some(prefix) = out.first_chunk_mut::<HEADER_SIZE>() else {
            return Err(Error::BufferTooShort {
                needed: HEADER_SIZE,
                got: out.len(),
            });
        };
        *prefix = self.to_bytes();
        Ok(())
    }

    /// Parse from the first two bytes of `bytes`.
    ///
    /// A reserved PTYPE is an error, never a SYMM.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(&[first, second]) = bytes.first_chunk::<HEADER_SIZE>() else {
            return Err(Error::BufferTooShort {
                needed: HEADER_SIZE,
                got: bytes.len(),
            });
        };

        let raw_ptype = ((first & 0x03) << 2) | (second >> 6);
        let ptype = PduType::from_u8(raw_ptype).ok_or(Error::UnknownPduType { ptype: raw_ptype })?;

        Ok(Self {
            dsap: Sap::from_bits(first >> 2),
            ptype,
            ssap: Sap::from_bits(second),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sap(value: u8) -> Sap {
        Sap::new(value).unwrap()
    }

    #[test]
    fn test_snl_response_header() {
        // SDP answers from SAP 1 to SAP 1 with an SNL PDU.
        let header = PduHeader::new(Sap::SDP, PduType::Snl, Sap::SDP);
        assert_eq!(header.to_bytes(), [0x06, 0x41]);
    }

    #[test]
    fn test_connect_header() {
        let header = PduHeader::new(Sap::SNEP, PduType::Connect, sap(0x20));
        let bytes = header.to_bytes();
        assert_eq!(bytes, [0x11, 0x20]);

        let decoded = PduHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.dsap(), Sap::SNEP);
        assert_eq!(decoded.ptype(), PduType::Connect);
        assert_eq!(decoded.ssap(), sap(0x20));
    }

    #[test]
    fn test_symm_is_all_zero() {
        let decoded = PduHeader::from_bytes(&[0x00, 0x00]).unwrap();
        assert_eq!(decoded.ptype(), PduType::Symm);
        assert_eq!(decoded.dsap(), Sap::LINK_MANAGEMENT);
    }

    #[test]
    fn test_reserved_ptype_rejected() {
        // PTYPE 0xF: low bits of byte 0 = 0b11, top bits of byte 1 = 0b11.
        let result = PduHeader::from_bytes(&[0x03, 0xC0]);
        assert!(matches!(result, Err(Error::UnknownPduType { ptype: 0xF })));

        let result = PduHeader::from_bytes(&[0x02, 0x80]);
        assert!(matches!(result, Err(Error::UnknownPduType { ptype: 0xA })));
    }

    #[test]
    fn test_short_buffer() {
        assert!(matches!(
            PduHeader::from_bytes(&[0x11]),
            Err(Error::BufferTooShort { needed: 2, got: 1 })
        ));

        let mut out = [0u8; 1];
        let header = PduHeader::new(Sap::SDP, PduType::Snl, Sap::SDP);
        assert!(header.encode(&mut out).is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn ptype_strategy() -> impl Strategy<Value = PduType> {
            proptest::sample::select(PduType::ALL.to_vec())
        }

        proptest! {
            /// Property: every valid header survives encode/decode
            #[test]
            fn prop_header_roundtrip(
                dsap in 0u8..=63,
                ptype in ptype_strategy(),
                ssap in 0u8..=63,
            ) {
                let header = PduHeader::new(sap(dsap), ptype, sap(ssap));
                let decoded = PduHeader::from_bytes(&header.to_bytes()).unwrap();
                prop_assert_eq!(decoded, header);
            }

            /// Property: decoding never panics on arbitrary input
            #[test]
            fn prop_decode_arbitrary(bytes in prop::collection::vec(any::<u8>(), 0..4)) {
                let _ = PduHeader::from_bytes(&bytes);
            }
        }
    }
}
