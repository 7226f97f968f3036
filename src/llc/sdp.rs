//! Service Discovery Protocol at SAP 1.
//!
//! The server side answers SDREQ parameters from the registry. The client
//! side hands out transaction ids and matches SDRES answers to the callers
//! waiting in [`Link::resolve`](super::Link::resolve).

use std::collections::HashMap;

use tracing::{debug, warn};

use super::registry::Registry;
use crate::protocol::Parameter;

/// Service name of the discovery service itself.
pub const SDP_URI: &str = "urn:nfc:sn:sdp";

/// Stateless SDREQ responder.
pub(crate) struct SdpServer;

impl SdpServer {
    /// One SDRES per SDREQ, in request order. A name nobody serves is
    /// answered with SAP 0.
    pub(crate) fn respond(parameters: &[Parameter], registry: &Registry) -> Vec<Parameter> {
        parameters
            .iter()
            .filter_map(|parameter| match parameter {
                Parameter::SdReq { tid, uri } => {
                    let sap = registry.find_by_uri(uri);
                    match sap {
                        Some(sap) => debug!(tid, %uri, %sap, "service resolved"),
                        None => warn!(tid, %uri, "no service bound for name"),
                    }
                    Some(Parameter::SdRes {
                        tid: *tid,
                        sap: sap.map_or(0, |sap| sap.as_u8()),
                    })
                }
                _ => None,
            })
            .collect()
    }
}

/// Outcome of an outstanding discovery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    Waiting,
    Resolved(u8),
    Cancelled,
}

/// Transaction id allocation and SDRES correlation.
#[derive(Debug, Default)]
pub(crate) struct SdpClient {
    next_tid: u8,
    pending: HashMap<u8, Resolution>,
}

impl SdpClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reserve a transaction id not currently in use.
    pub(crate) fn request(&mut self) -> Option<u8> {
        for _ in 0..=u8::MAX {
            let tid = self.next_tid;
            self.next_tid = self.next_tid.wrapping_add(1);
            if !self.pending.contains_key(&tid) {
                self.pending.insert(tid, Resolution::Waiting);
                return Some(tid);
            }
        }
        None
    }

    /// Record an SDRES; unknown or stale ids are ignored.
    pub(crate) fn complete(&mut self, tid: u8, sap: u8) -> bool {
        match self.pending.get_mut(&tid) {
            Some(slot) if *slot == Resolution::Waiting => {
                *slot = Resolution::Resolved(sap);
                true
            }
            _ => {
                debug!(tid, "SDRES for unknown transaction");
                false
            }
        }
    }

    pub(crate) fn is_waiting(&self, tid: u8) -> bool {
        self.pending.get(&tid) == Some(&Resolution::Waiting)
    }

    pub(crate) fn take(&mut self, tid: u8) -> Option<Resolution> {
        self.pending.remove(&tid)
    }

    /// Fail every waiting request; the waiters remove their entries.
    pub(crate) fn cancel_all(&mut self) {
        for resolution in self.pending.values_mut() {
            if *resolution == Resolution::Waiting {
                *resolution = Resolution::Cancelled;
            }
        }
    }
}
