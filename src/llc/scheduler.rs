//! Outbound PDU ordering for the exchange loop.

use std::collections::VecDeque;

use tracing::trace;

use crate::protocol::{Pdu, Sap};

/// Priority class for connection PDUs. Link-level PDUs (PAX, SNL, DM and
/// FRMR answers) sit in the control queue and go before both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum PriorityClass {
    /// Connection set-up and tear-down: CONNECT, CC, DISC, DM, FRMR.
    Management,
    /// Connection traffic: I, RR, UI.
    Data,
}

/// Identity of an entry in the connection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ConnectionKey {
    /// Connection-oriented session between two SAPs.
    Oriented {
        /// Local SAP
        local: Sap,
        /// Remote SAP
        remote: Sap,
    },
    /// Connectionless channel of a local service.
    Datagram {
        /// Local SAP
        local: Sap,
    },
}

/// Control queue plus round-robin order over connections.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    control: VecDeque<Pdu>,
    rotation: VecDeque<ConnectionKey>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a link-level PDU behind earlier ones.
    pub(crate) fn push_control(&mut self, pdu: Pdu) {
        trace!(
            ptype = %pdu.pdu_type(),
            dsap = %pdu.dsap,
            queued = self.control.len(),
            "control pdu queued"
        );
        self.control.push_back(pdu);
    }

    /// Queue a link-level PDU ahead of everything else.
    pub(crate) fn push_control_front(&mut self, pdu: Pdu) {
        self.control.push_front(pdu);
    }

    /// Next control PDU if it fits in `budget` encoded bytes.
    pub(crate) fn pop_control(&mut self, budget: usize) -> Option<Pdu> {
        if self.control.front()?.encoded_len() > budget {
            return None;
        }
        self.control.pop_front()
    }

    pub(crate) fn add(&mut self, key: ConnectionKey) {
        if !self.rotation.contains(&key) {
            self.rotation.push_back(key);
        }
    }

    pub(crate) fn remove(&mut self, key: ConnectionKey) {
        self.rotation.retain(|entry| *entry != key);
    }

    pub(crate) fn rekey(&mut self, old: ConnectionKey, new: ConnectionKey) {
        for entry in &mut self.rotation {
            if *entry == old {
                *entry = new;
            }
        }
    }

    /// Connections in service order.
    pub(crate) fn order(&self) -> Vec<ConnectionKey> {
        self.rotation.iter().copied().collect()
    }

    /// Move `key` to the back after it was served.
    pub(crate) fn served(&mut self, key: ConnectionKey) {
        if let Some(position) = self.rotation.iter().position(|entry| *entry == key) {
            self.rotation.remove(position);
            self.rotation.push_back(key);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.control.clear();
        self.rotation.clear();
    }
}
