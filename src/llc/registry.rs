//! SAP to service bindings.

use tracing::debug;

use super::error::RegistryError;
use super::service::Service;
use crate::protocol::Sap;

const SLOTS: usize = Sap::MAX as usize + 1;

/// How a SAP is chosen at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SapRequest {
    /// Exactly this SAP.
    Fixed(Sap),
    /// First free SAP in 32..=63.
    Auto,
}

/// Table of the 64 SAPs.
#[derive(Debug)]
pub(crate) struct Registry {
    slots: [Option<Service>; SLOTS],
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    pub(crate) fn bind(&mut self, service: Service, request: SapRequest) -> Result<Sap, RegistryError> {
        if let Some(uri) = service.uri() {
            if self.find_by_uri(uri).is_some() {
                return Err(RegistryError::DuplicateUri { uri: uri.to_owned() });
            }
        }

        let sap = match request {
            SapRequest::Fixed(sap) => {
                if self.slot(sap).is_some() {
                    return Err(RegistryError::DuplicateSap { sap });
                }
                sap
            }
            SapRequest::Auto => (Sap::FIRST_LOCAL.as_u8()..=Sap::MAX)
                .filter_map(Sap::new)
                .find(|sap| self.slot(*sap).is_none())
                .ok_or(RegistryError::RegistryFull)?,
        };

        debug!(%sap, uri = service.uri(), "service bound");
        self.slots[usize::from(sap.as_u8())] = Some(service);
        Ok(sap)
    }

    pub(crate) fn unbind(&mut self, sap: Sap) -> Option<Service> {
        let service = self.slots[usize::from(sap.as_u8())].take();
        if service.is_some() {
            debug!(%sap, "service unbound");
        }
        service
    }

    /// Exact service-name match.
    pub(crate) fn find_by_uri(&self, uri: &str) -> Option<Sap> {
        self.bound()
            .find(|(_, service)| service.uri() == Some(uri))
            .map(|(sap, _)| sap)
    }

    pub(crate) fn lookup(&self, sap: Sap) -> Option<&Service> {
        self.slot(sap)
    }

    /// Well-known service bitmap for PAX: bit n for each bound SAP n < 16.
    /// Link management and SDP are always present.
    pub(crate) fn wks(&self) -> u16 {
        self.bound()
            .filter(|(sap, _)| sap.as_u8() < 16)
            .fold(0b11, |wks, (sap, _)| wks | (1 << sap.as_u8()))
    }

    fn slot(&self, sap: Sap) -> Option<&Service> {
        self.slots[usize::from(sap.as_u8())].as_ref()
    }

    fn bound(&self) -> impl Iterator<Item = (Sap, &Service)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let sap = Sap::new(u8::try_from(index).ok()?)?;
            slot.as_ref().map(|service| (sap, service))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> Service {
        Service::new(|_conn| {})
    }

    fn sap(value: u8) -> Sap {
        Sap::new(value).unwrap()
    }

    #[test]
    fn test_fixed_and_duplicate() {
        let mut registry = Registry::new();
        assert_eq!(
            registry.bind(service(), SapRequest::Fixed(Sap::SNEP)),
            Ok(Sap::SNEP)
        );
        assert_eq!(
            registry.bind(service(), SapRequest::Fixed(Sap::SNEP)),
            Err(RegistryError::DuplicateSap { sap: Sap::SNEP })
        );
    }

    #[test]
    fn test_auto_scans_local_range() {
        let mut registry = Registry::new();
        registry.bind(service(), SapRequest::Fixed(sap(0x20))).unwrap();
        assert_eq!(registry.bind(service(), SapRequest::Auto), Ok(sap(0x21)));

        for _ in 0x22..=0x3F {
            registry.bind(service(), SapRequest::Auto).unwrap();
        }
        assert_eq!(
            registry.bind(service(), SapRequest::Auto),
            Err(RegistryError::RegistryFull)
        );

        registry.unbind(sap(0x30));
        assert_eq!(registry.bind(service(), SapRequest::Auto), Ok(sap(0x30)));
    }

    #[test]
    fn test_find_by_uri_exact_only() {
        let mut registry = Registry::new();
        registry
            .bind(
                service().with_uri("urn:nfc:sn:snep"),
                SapRequest::Fixed(Sap::SNEP),
            )
            .unwrap();

        assert_eq!(registry.find_by_uri("urn:nfc:sn:snep"), Some(Sap::SNEP));
        assert_eq!(registry.find_by_uri("urn:nfc:sn:sne"), None);
        assert_eq!(registry.find_by_uri("urn:nfc:sn:snep:v2"), None);
        assert_eq!(registry.find_by_uri("URN:NFC:SN:SNEP"), None);
    }

    #[test]
    fn test_duplicate_uri_rejected() {
        let mut registry = Registry::new();
        registry
            .bind(service().with_uri("urn:nfc:sn:test"), SapRequest::Auto)
            .unwrap();
        assert!(matches!(
            registry.bind(service().with_uri("urn:nfc:sn:test"), SapRequest::Auto),
            Err(RegistryError::DuplicateUri { .. })
        ));
    }

    #[test]
    fn test_unbind_and_lookup() {
        let mut registry = Registry::new();
        let bound = registry
            .bind(service().with_uri("urn:nfc:sn:x"), SapRequest::Auto)
            .unwrap();
        assert!(registry.lookup(bound).is_some());
        assert!(registry.unbind(bound).is_some());
        assert!(registry.lookup(bound).is_none());
        assert!(registry.unbind(bound).is_none());
        assert_eq!(registry.find_by_uri("urn:nfc:sn:x"), None);
    }

    #[test]
    fn test_every_sap_binds_and_unbinds() {
        let mut registry = Registry::new();
        for value in 0..=Sap::MAX {
            let sap = sap(value);
            let uri = format!("urn:nfc:sn:sap-{value}");
            assert_eq!(
                registry.bind(service().with_uri(uri.as_str()), SapRequest::Fixed(sap)),
                Ok(sap)
            );
            assert_eq!(registry.lookup(sap).and_then(Service::uri), Some(uri.as_str()));
            assert!(registry.unbind(sap).is_some());
            assert!(registry.lookup(sap).is_none());
            assert_eq!(registry.find_by_uri(&uri), None);
        }
    }

    #[test]
    fn test_wks_bitmap() {
        let mut registry = Registry::new();
        assert_eq!(registry.wks(), 0x0003);
        registry.bind(service(), SapRequest::Fixed(Sap::SNEP)).unwrap();
        registry.bind(service(), SapRequest::Fixed(sap(0x20))).unwrap();
        assert_eq!(registry.wks(), 0x0013);
    }
}
