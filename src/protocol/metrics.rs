use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::PduType;

const PTYPE_SLOTS: usize = 16;
const NANOSECONDS_PER_MICROSECOND: u128 = 1_000;

/// Per-link counters, updated lock-free from the exchange loop.
#[derive(Debug)]
pub struct LinkMetrics {
    sent: [AtomicU64; PTYPE_SLOTS],
    received: [AtomicU64; PTYPE_SLOTS],
    malformed: AtomicU64,
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    exchanges: AtomicU64,
    exchange_latency_total_ns: AtomicU64,
    exchange_latency_max_ns: AtomicU64,
}

/// Direction of PDU flow for counting.
#[derive(Clone, Copy, Debug)]
pub(crate) enum PduDirection {
    Sent,
    Received,
}

impl Default for LinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkMetrics {
    /// Fresh zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sent: [const { AtomicU64::new(0) }; PTYPE_SLOTS],
            received: [const { AtomicU64::new(0) }; PTYPE_SLOTS],
            malformed: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            exchanges: AtomicU64::new(0),
            exchange_latency_total_ns: AtomicU64::new(0),
            exchange_latency_max_ns: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_pdu(&self, direction: PduDirection, ptype: PduType) {
        let slot = usize::from(ptype.as_u8());
        match direction {
            PduDirection::Sent => self.sent[slot].fetch_add(1, Ordering::Relaxed),
            PduDirection::Received => self.received[slot].fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_connection_open(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_connection_close(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_exchange(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.exchanges.fetch_add(1, Ordering::Relaxed);
        self.exchange_latency_total_ns
            .fetch_add(nanos, Ordering::Relaxed);
        update_max(&self.exchange_latency_max_ns, nanos);
    }

    /// Copy the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counters: &[AtomicU64; PTYPE_SLOTS]| {
            let mut values = [0u64; PTYPE_SLOTS];
            for (value, counter) in values.iter_mut().zip(counters) {
                *value = counter.load(Ordering::Relaxed);
            }
            values
        };

        MetricsSnapshot {
            sent: load(&self.sent),
            received: load(&self.received),
            malformed: self.malformed.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            exchanges: self.exchanges.load(Ordering::Relaxed),
            exchange_latency_total_ns: self.exchange_latency_total_ns.load(Ordering::Relaxed),
            exchange_latency_max_ns: self.exchange_latency_max_ns.load(Ordering::Relaxed),
        }
    }
}

fn update_max(target: &AtomicU64, candidate: u64) {
    let mut current = target.load(Ordering::Relaxed);
    while candidate > current {
        match target.compare_exchange_weak(
            current,
            candidate,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return,
            Err(old) => current = old,
        }
    }
}

/// Point-in-time copy of [`LinkMetrics`].
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    sent: [u64; PTYPE_SLOTS],
    received: [u64; PTYPE_SLOTS],
    /// Frames dropped because they failed to decode
    pub malformed: u64,
    /// Connections that reached the connected state
    pub connections_opened: u64,
    /// Connections that were closed after being opened
    pub connections_closed: u64,
    /// MAC exchanges completed
    pub exchanges: u64,
    /// Sum of exchange round-trip times
    pub exchange_latency_total_ns: u64,
    /// Slowest exchange round trip
    pub exchange_latency_max_ns: u64,
}

impl MetricsSnapshot {
    /// PDUs of `ptype` sent, counting sub-PDUs of aggregated frames.
    #[must_use]
    pub fn sent(&self, ptype: PduType) -> u64 {
        self.sent[usize::from(ptype.as_u8())]
    }

    /// PDUs of `ptype` received, counting sub-PDUs of aggregated frames.
    #[must_use]
    pub fn received(&self, ptype: PduType) -> u64 {
        self.received[usize::from(ptype.as_u8())]
    }

    /// All PDUs sent.
    #[must_use]
    pub fn total_sent(&self) -> u64 {
        self.sent.iter().sum()
    }

    /// All PDUs received.
    #[must_use]
    pub fn total_received(&self) -> u64 {
        self.received.iter().sum()
    }

    /// Average exchange round trip in microseconds.
    #[must_use]
    pub fn avg_exchange_latency_us(&self) -> Option<u64> {
        if self.exchanges == 0 {
            return None;
        }
        let average = u128::from(self.exchange_latency_total_ns)
            / (u128::from(self.exchanges) * NANOSECONDS_PER_MICROSECOND);
        Some(u64::try_from(average).unwrap_or(u64::MAX))
    }
}
