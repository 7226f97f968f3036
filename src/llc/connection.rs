//! Connection endpoints and their state machines.
//!
//! A [`Connection`] is a cheap handle shared between the application and
//! the link. The application blocks in [`send`](Connection::send),
//! [`recv`](Connection::recv) and [`wait`](Connection::wait); the exchange
//! loop feeds inbound PDUs in and pulls outbound PDUs out while holding the
//! link lock.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, instrument, trace, warn};

use super::doorbell::Doorbell;
use super::error::ConnectionError;
use super::scheduler::PriorityClass;
use super::window::SequenceWindow;
use crate::protocol::{
    DEFAULT_MIU, DmReason, FrameReject, HEADER_SIZE, Parameter, ParameterSet, Pdu, PduBody,
    PduType, Sap,
};

/// Inbound datagrams kept for a channel whose reader falls behind.
const DATAGRAM_BACKLOG: usize = 32;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Terminal state
    Closed,
    /// CONNECT sent, waiting for CC or DM
    Connecting,
    /// Data may flow
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Oriented,
    Datagram,
}

#[derive(Debug)]
struct ConnectionCore {
    kind: Kind,
    state: ConnectionState,
    local: Sap,
    remote: Sap,
    local_miu: usize,
    remote_miu: usize,
    window: SequenceWindow,
    remote_busy: bool,
    opened: bool,
    management: VecDeque<PduBody>,
    outbound: VecDeque<Bytes>,
    datagrams: VecDeque<(Sap, Bytes)>,
    inbound: VecDeque<(Bytes, Sap)>,
    close_reason: Option<ConnectionError>,
}

impl ConnectionCore {
    fn new(kind: Kind, state: ConnectionState, local: Sap, remote: Sap) -> Self {
        Self {
            kind,
            state,
            local,
            remote,
            local_miu: DEFAULT_MIU,
            remote_miu: DEFAULT_MIU,
            window: SequenceWindow::new(1, 1),
            remote_busy: false,
            opened: false,
            management: VecDeque::new(),
            outbound: VecDeque::new(),
            datagrams: VecDeque::new(),
            inbound: VecDeque::new(),
            close_reason: None,
        }
    }

    fn close(&mut self, reason: ConnectionError) {
        if self.state != ConnectionState::Closed {
            debug!(
                local = %self.local,
                remote = %self.remote,
                %reason,
                "connection closed"
            );
        }
        self.state = ConnectionState::Closed;
        self.close_reason.get_or_insert(reason);
        self.outbound.clear();
        self.datagrams.clear();
    }

    fn closed_error(&self) -> ConnectionError {
        self.close_reason
            .clone()
            .unwrap_or(ConnectionError::ConnectionClosed)
    }

    /// An I PDU could go out now.
    fn sendable(&self) -> bool {
        !self.outbound.is_empty() && !self.remote_busy && self.window.can_send()
    }

    fn pdu(&self, body: PduBody) -> Pdu {
        Pdu::new(self.remote, self.local, body)
    }

    fn apply_remote(&mut self, parameters: &[Parameter]) {
        let set = ParameterSet::from_list(parameters);
        self.remote_miu = set.miu();
        self.window.set_remote_rw(set.rw.unwrap_or(1));
    }

    fn reject(&mut self, flags: u8, ptype: PduType, sequence: u8) {
        let frmr = self.window.reject(flags, ptype.as_u8(), sequence);
        warn!(
            local = %self.local,
            remote = %self.remote,
            flags,
            %ptype,
            "rejecting frame"
        );
        self.management.clear();
        self.management.push_back(PduBody::Frmr(frmr));
        self.close(ConnectionError::ConnectionClosed);
    }

    fn acknowledge(&mut self, nr: u8, ptype: PduType, sequence: u8) -> bool {
        match self.window.on_ack(nr) {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "invalid acknowledgement");
                self.reject(FrameReject::R, ptype, sequence);
                false
            }
        }
    }
}

struct Shared {
    core: Mutex<ConnectionCore>,
    changed: Condvar,
    doorbell: Arc<Doorbell>,
}

/// Handle to a connection-oriented session or a connectionless channel.
///
/// Clones refer to the same endpoint.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    fn from_core(core: ConnectionCore, doorbell: Arc<Doorbell>) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                changed: Condvar::new(),
                doorbell,
            }),
        }
    }

    /// Locally initiated connection; CONNECT goes out on the next turn.
    pub(crate) fn outgoing(
        local: Sap,
        remote: Sap,
        miu: usize,
        rw: u8,
        service_name: Option<String>,
        doorbell: Arc<Doorbell>,
    ) -> Self {
        let mut core = ConnectionCore::new(Kind::Oriented, ConnectionState::Connecting, local, remote);
        core.local_miu = miu;
        core.window = SequenceWindow::new(rw, 1);

        let mut parameters = vec![Parameter::miux_for(miu), Parameter::Rw(rw)];
        parameters.extend(service_name.map(Parameter::ServiceName));
        core.management.push_back(PduBody::Connect(parameters));

        Self::from_core(core, doorbell)
    }

    /// Connection accepted from a peer CONNECT; CC goes out on the next turn.
    pub(crate) fn incoming(
        local: Sap,
        remote: Sap,
        miu: usize,
        rw: u8,
        request: &[Parameter],
        doorbell: Arc<Doorbell>,
    ) -> Self {
        let mut core = ConnectionCore::new(Kind::Oriented, ConnectionState::Connected, local, remote);
        core.local_miu = miu;
        core.window = SequenceWindow::new(rw, 1);
        core.apply_remote(request);
        core.opened = true;
        core.management
            .push_back(PduBody::Cc(vec![Parameter::miux_for(miu), Parameter::Rw(rw)]));

        Self::from_core(core, doorbell)
    }

    /// Connectionless channel of the service at `local`.
    pub(crate) fn datagram(local: Sap, miu: usize, remote_miu: usize, doorbell: Arc<Doorbell>) -> Self {
        let mut core = ConnectionCore::new(Kind::Datagram, ConnectionState::Connected, local, local);
        core.local_miu = miu;
        core.remote_miu = remote_miu;
        Self::from_core(core, doorbell)
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionCore> {
        self.shared
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_on<'a>(
        &self,
        guard: MutexGuard<'a, ConnectionCore>,
        deadline: Option<Instant>,
    ) -> (MutexGuard<'a, ConnectionCore>, bool) {
        match deadline {
            None => (
                self.shared
                    .changed
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner),
                false,
            ),
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return (guard, true);
                }
                let (guard, _) = self
                    .shared
                    .changed
                    .wait_timeout(guard, remaining)
                    .unwrap_or_else(PoisonError::into_inner);
                (guard, false)
            }
        }
    }

    fn notify(&self) {
        self.shared.changed.notify_all();
        self.shared.doorbell.ring();
    }

    /// Local SAP
    #[must_use]
    pub fn local_sap(&self) -> Sap {
        self.lock().local
    }

    /// Peer SAP; `None` for connectionless channels.
    #[must_use]
    pub fn remote_sap(&self) -> Option<Sap> {
        let core = self.lock();
        (core.kind == Kind::Oriented).then_some(core.remote)
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Whether this is a connectionless channel.
    #[must_use]
    pub fn is_datagram(&self) -> bool {
        self.lock().kind == Kind::Datagram
    }

    /// Largest payload `send` or `send_to` accepts (the peer's MIU).
    #[must_use]
    pub fn miu(&self) -> usize {
        self.lock().remote_miu
    }

    /// Queue one I PDU.
    ///
    /// Blocks while the peer's receive window is exhausted. Payloads larger
    /// than [`miu`](Self::miu) are rejected, never fragmented.
    #[instrument(level = "trace", skip(self, payload))]
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<(), ConnectionError> {
        let payload = payload.into();
        let mut core = self.lock();

        if core.kind != Kind::Oriented || core.state != ConnectionState::Connected {
            return Err(ConnectionError::NotConnected);
        }
        if payload.len() > core.remote_miu {
            return Err(ConnectionError::MessageTooLarge {
                size: payload.len(),
                max: core.remote_miu,
            });
        }

        while core.state == ConnectionState::Connected
            && core.outbound.len() + usize::from(core.window.unacknowledged())
                >= usize::from(core.window.remote_rw())
        {
            trace!(local = %core.local, "send window exhausted");
            core = self.wait_on(core, None).0;
        }
        if core.state != ConnectionState::Connected {
            return Err(core.closed_error());
        }

        core.outbound.push_back(payload);
        drop(core);
        self.notify();
        Ok(())
    }

    /// Queue one UI PDU to `remote` on a connectionless channel.
    #[instrument(level = "trace", skip(self, payload))]
    pub fn send_to(&self, remote: Sap, payload: impl Into<Bytes>) -> Result<(), ConnectionError> {
        let payload = payload.into();
        let mut core = self.lock();

        if core.kind != Kind::Datagram {
            return Err(ConnectionError::NotDatagram);
        }
        if core.state != ConnectionState::Connected {
            return Err(core.closed_error());
        }
        if payload.len() > core.remote_miu {
            return Err(ConnectionError::MessageTooLarge {
                size: payload.len(),
                max: core.remote_miu,
            });
        }

        core.datagrams.push_back((remote, payload));
        drop(core);
        self.notify();
        Ok(())
    }

    /// Next payload and the SAP it came from.
    ///
    /// Buffered payloads are still returned after the connection closed;
    /// the close reason is reported once they are drained. `None` waits
    /// without limit.
    #[instrument(level = "trace", skip(self))]
    pub fn recv(&self, timeout: Option<Duration>) -> Result<(Bytes, Sap), ConnectionError> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut core = self.lock();

        loop {
            if let Some(entry) = core.inbound.pop_front() {
                if core.kind == Kind::Oriented {
                    core.window.mark_delivered();
                }
                drop(core);
                self.notify();
                return Ok(entry);
            }
            if core.state == ConnectionState::Closed {
                return Err(core.closed_error());
            }
            let (guard, expired) = self.wait_on(core, deadline);
            core = guard;
            if expired {
                return Err(ConnectionError::Timeout);
            }
        }
    }

    /// Close the connection now.
    ///
    /// I PDUs the peer's window still admits are sent before DISC; anything
    /// else queued is dropped. Calling it on a closed connection does
    /// nothing.
    pub fn disconnect(&self) {
        let mut core = self.lock();
        match (core.state, core.kind) {
            (ConnectionState::Closed, _) => return,
            (ConnectionState::Connected, Kind::Oriented) => {
                let admitted = if core.remote_busy {
                    0
                } else {
                    usize::from(core.window.available())
                };
                core.outbound.truncate(admitted);
                core.management.push_back(PduBody::Disc);
                core.state = ConnectionState::Closed;
                core.close_reason.get_or_insert(ConnectionError::ConnectionClosed);
                debug!(local = %core.local, remote = %core.remote, "disconnect requested");
            }
            (ConnectionState::Connecting | ConnectionState::Connected, _) => {
                core.management.clear();
                core.close(ConnectionError::ConnectionClosed);
            }
        }
        drop(core);
        self.notify();
    }

    /// Same as [`disconnect`](Self::disconnect).
    pub fn stop(&self) {
        self.disconnect();
    }

    /// Block until the connection is closed.
    pub fn wait(&self) {
        let mut core = self.lock();
        while core.state != ConnectionState::Closed {
            core = self.wait_on(core, None).0;
        }
    }

    /// Block until the connection is closed or `timeout` elapses; returns
    /// whether it closed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Some(Instant::now() + timeout);
        let mut core = self.lock();
        while core.state != ConnectionState::Closed {
            let (guard, expired) = self.wait_on(core, deadline);
            core = guard;
            if expired {
                return false;
            }
        }
        true
    }

    /// Wait for CC or DM after CONNECT.
    pub(crate) fn await_connected(&self, timeout: Option<Duration>) -> Result<(), ConnectionError> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut core = self.lock();
        while core.state == ConnectionState::Connecting {
            let (guard, expired) = self.wait_on(core, deadline);
            core = guard;
            if expired && core.state == ConnectionState::Connecting {
                core.management.clear();
                core.close(ConnectionError::Timeout);
                drop(core);
                self.notify();
                return Err(ConnectionError::Timeout);
            }
        }
        match core.state {
            ConnectionState::Connected => Ok(()),
            _ => Err(core.closed_error()),
        }
    }

    /// Bind a connect-by-name request to the SAP that answered it.
    pub(crate) fn set_remote(&self, remote: Sap) {
        self.lock().remote = remote;
    }

    pub(crate) fn set_remote_miu(&self, miu: usize) {
        self.lock().remote_miu = miu;
    }

    pub(crate) fn is_connecting(&self) -> bool {
        self.lock().state == ConnectionState::Connecting
    }

    /// Closed with nothing left to send.
    pub(crate) fn is_finished(&self) -> bool {
        let core = self.lock();
        core.state == ConnectionState::Closed && core.management.is_empty() && core.outbound.is_empty()
    }

    /// Reached `Connected` at some point.
    pub(crate) fn was_opened(&self) -> bool {
        self.lock().opened
    }

    /// Next PDU of `class` whose encoding fits in `budget` bytes.
    pub(crate) fn poll_outbound(&self, class: PriorityClass, budget: usize) -> Option<Pdu> {
        let mut core = self.lock();
        let kind = core.kind;
        let pdu = match class {
            PriorityClass::Management => Self::poll_management(&mut core, budget),
            PriorityClass::Data => match kind {
                Kind::Oriented => Self::poll_information(&mut core, budget),
                Kind::Datagram => Self::poll_datagram(&mut core, budget),
            },
        };
        if pdu.is_some() {
            self.shared.changed.notify_all();
        }
        pdu
    }

    fn poll_management(core: &mut ConnectionCore, budget: usize) -> Option<Pdu> {
        let front = core.management.front()?;
        // DISC waits for the I PDUs the window still admits.
        if matches!(front, PduBody::Disc) && core.sendable() {
            return None;
        }
        let pdu = core.pdu(front.clone());
        if pdu.encoded_len() > budget {
            return None;
        }
        core.management.pop_front();
        if pdu.body == PduBody::Disc {
            core.outbound.clear();
        }
        Some(pdu)
    }

    fn poll_information(core: &mut ConnectionCore, budget: usize) -> Option<Pdu> {
        if core.sendable() {
            let payload_len = core.outbound.front().map_or(0, Bytes::len);
            if HEADER_SIZE + 1 + payload_len > budget {
                return None;
            }
            let payload = core.outbound.pop_front()?;
            let (ns, nr) = core.window.next_send();
            return Some(core.pdu(PduBody::I { ns, nr, payload }));
        }

        if core.state == ConnectionState::Connected
            && core.window.pending_ack()
            && HEADER_SIZE + 1 <= budget
        {
            let nr = core.window.take_ack()?;
            return Some(core.pdu(PduBody::Rr { nr }));
        }

        None
    }

    fn poll_datagram(core: &mut ConnectionCore, budget: usize) -> Option<Pdu> {
        let (_, payload) = core.datagrams.front()?;
        if HEADER_SIZE + payload.len() > budget {
            return None;
        }
        let (remote, payload) = core.datagrams.pop_front()?;
        Some(Pdu::new(remote, core.local, PduBody::Ui(payload)))
    }

    /// Apply a PDU routed to this connection.
    pub(crate) fn handle_pdu(&self, body: PduBody, from: Sap) {
        let mut core = self.lock();
        let kind = core.kind;
        match kind {
            Kind::Oriented => Self::handle_oriented(&mut core, body),
            Kind::Datagram => match body {
                PduBody::Ui(payload) if core.state == ConnectionState::Connected => {
                    if payload.len() > core.local_miu {
                        debug!(local = %core.local, len = payload.len(), "datagram exceeds MIU");
                    } else if core.inbound.len() >= DATAGRAM_BACKLOG {
                        warn!(local = %core.local, "datagram backlog full, dropping");
                    } else {
                        core.inbound.push_back((payload, from));
                    }
                }
                other => trace!(ptype = %other.pdu_type(), "ignored on datagram channel"),
            },
        }
        drop(core);
        self.shared.changed.notify_all();
    }

    fn handle_oriented(core: &mut ConnectionCore, body: PduBody) {
        let ptype = body.pdu_type();
        match body {
            PduBody::Cc(parameters) => {
                if core.state == ConnectionState::Connecting {
                    core.apply_remote(&parameters);
                    core.state = ConnectionState::Connected;
                    core.opened = true;
                    debug!(local = %core.local, remote = %core.remote, "connection established");
                } else {
                    debug!(state = %core.state, "unexpected CC");
                }
            }
            PduBody::Dm(reason) => match core.state {
                ConnectionState::Connecting => {
                    core.management.clear();
                    core.close(ConnectionError::ConnectionRefused { reason });
                }
                ConnectionState::Connected => {
                    core.management.clear();
                    core.close(ConnectionError::ConnectionClosed);
                }
                ConnectionState::Closed => trace!(%reason, "DM after close"),
            },
            PduBody::Disc => {
                core.management.clear();
                core.management.push_back(PduBody::Dm(DmReason::Disconnected));
                core.close(ConnectionError::ConnectionClosed);
            }
            PduBody::Frmr(reject) => {
                warn!(
                    local = %core.local,
                    remote = %core.remote,
                    flags = reject.flags,
                    ptype = reject.ptype,
                    "peer rejected a frame"
                );
                core.management.clear();
                core.close(ConnectionError::ConnectionClosed);
            }
            PduBody::I { ns, nr, payload } => {
                if core.state != ConnectionState::Connected {
                    trace!(state = %core.state, "I PDU outside connected state");
                    return;
                }
                let sequence = (ns << 4) | nr;
                if !core.acknowledge(nr, ptype, sequence) {
                    return;
                }
                core.remote_busy = false;
                if payload.len() > core.local_miu {
                    core.reject(FrameReject::I, ptype, sequence);
                    return;
                }
                if core.window.accept(ns) {
                    let remote = core.remote;
                    core.inbound.push_back((payload, remote));
                } else {
                    trace!(ns, "dropping duplicate or out-of-window I PDU");
                }
            }
            PduBody::Rr { nr } | PduBody::Rnr { nr } => {
                if core.state != ConnectionState::Connected {
                    return;
                }
                if core.acknowledge(nr, ptype, nr) {
                    core.remote_busy = ptype == PduType::Rnr;
                }
            }
            other => trace!(ptype = %other.pdu_type(), "ignored on connection"),
        }
    }

    /// The MAC session ended.
    pub(crate) fn on_link_down(&self) {
        let mut core = self.lock();
        core.management.clear();
        core.close(ConnectionError::LinkDown);
        drop(core);
        self.shared.changed.notify_all();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.lock();
        f.debug_struct("Connection")
            .field("local", &core.local)
            .field("remote", &core.remote)
            .field("state", &core.state)
            .field("kind", &core.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn sap(value: u8) -> Sap {
        Sap::new(value).unwrap()
    }

    fn bell() -> Arc<Doorbell> {
        Arc::new(Doorbell::default())
    }

    fn connected(remote_rw: u8) -> Connection {
        let conn = Connection::outgoing(sap(0x20), Sap::SNEP, 128, 1, None, bell());
        let connect = conn.poll_outbound(PriorityClass::Management, usize::MAX).unwrap();
        assert_eq!(connect.pdu_type(), PduType::Connect);
        conn.handle_pdu(PduBody::Cc(vec![Parameter::Rw(remote_rw)]), Sap::SNEP);
        assert_eq!(conn.state(), ConnectionState::Connected);
        conn
    }

    fn poll_data(conn: &Connection) -> Option<PduBody> {
        conn.poll_outbound(PriorityClass::Data, usize::MAX)
            .map(|pdu| pdu.body)
    }

    #[test]
    fn test_connect_parameters() {
        let conn = Connection::outgoing(
            sap(0x20),
            Sap::SDP,
            512,
            2,
            Some("urn:nfc:sn:snep".into()),
            bell(),
        );
        let pdu = conn.poll_outbound(PriorityClass::Management, usize::MAX).unwrap();
        assert_eq!(pdu.dsap, Sap::SDP);
        assert_eq!(pdu.ssap, sap(0x20));
        assert_eq!(
            pdu.body,
            PduBody::Connect(vec![
                Parameter::Miux(384),
                Parameter::Rw(2),
                Parameter::ServiceName("urn:nfc:sn:snep".into()),
            ])
        );
        assert!(conn.is_connecting());
    }

    #[test]
    fn test_refused_by_dm() {
        let conn = Connection::outgoing(sap(0x20), sap(0x10), 128, 1, None, bell());
        conn.handle_pdu(PduBody::Dm(DmReason::NoServiceBound), sap(0x10));
        assert_eq!(
            conn.await_connected(None),
            Err(ConnectionError::ConnectionRefused {
                reason: DmReason::NoServiceBound
            })
        );
        assert!(conn.is_finished());
    }

    #[test]
    fn test_send_requires_connected() {
        let conn = Connection::outgoing(sap(0x20), Sap::SNEP, 128, 1, None, bell());
        assert_eq!(conn.send(&b"x"[..]), Err(ConnectionError::NotConnected));
    }

    #[test]
    fn test_message_too_large() {
        let conn = connected(1);
        assert_eq!(
            conn.send(vec![0u8; 129]),
            Err(ConnectionError::MessageTooLarge { size: 129, max: 128 })
        );
    }

    #[test]
    fn test_information_sequencing() {
        let conn = connected(2);
        conn.send(&b"one"[..]).unwrap();
        conn.send(&b"two"[..]).unwrap();

        assert!(matches!(poll_data(&conn), Some(PduBody::I { ns: 0, nr: 0, .. })));
        assert!(matches!(poll_data(&conn), Some(PduBody::I { ns: 1, nr: 0, .. })));
        assert_eq!(poll_data(&conn), None);

        conn.handle_pdu(PduBody::Rr { nr: 2 }, Sap::SNEP);
        conn.send(&b"three"[..]).unwrap();
        assert!(matches!(poll_data(&conn), Some(PduBody::I { ns: 2, .. })));
    }

    #[test]
    fn test_send_blocks_until_acknowledged() {
        let conn = connected(1);
        conn.send(&b"first"[..]).unwrap();

        let sender = conn.clone();
        let handle = thread::spawn(move || sender.send(&b"second"[..]));

        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());

        assert!(matches!(poll_data(&conn), Some(PduBody::I { ns: 0, .. })));
        conn.handle_pdu(PduBody::Rr { nr: 1 }, Sap::SNEP);
        assert_eq!(handle.join().unwrap(), Ok(()));
    }

    #[test]
    fn test_disconnect_wakes_blocked_sender() {
        let conn = connected(1);
        conn.send(&b"first"[..]).unwrap();
        let sender = conn.clone();
        let handle = thread::spawn(move || sender.send(&b"second"[..]));

        thread::sleep(Duration::from_millis(20));
        conn.disconnect();
        assert_eq!(handle.join().unwrap(), Err(ConnectionError::ConnectionClosed));
    }

    #[test]
    fn test_disconnect_wakes_blocked_receiver() {
        let conn = connected(1);
        let receiver = conn.clone();
        let handle = thread::spawn(move || receiver.recv(None));

        thread::sleep(Duration::from_millis(20));
        conn.disconnect();
        assert_eq!(handle.join().unwrap(), Err(ConnectionError::ConnectionClosed));

        let channel = Connection::datagram(sap(0x21), 128, 128, bell());
        let receiver = channel.clone();
        let handle = thread::spawn(move || receiver.recv(None));

        thread::sleep(Duration::from_millis(20));
        channel.stop();
        assert_eq!(handle.join().unwrap(), Err(ConnectionError::ConnectionClosed));
    }

    #[test]
    fn test_disconnect_flushes_then_disc() {
        let conn = connected(2);
        conn.send(&b"queued"[..]).unwrap();
        conn.disconnect();
        assert_eq!(conn.state(), ConnectionState::Closed);

        // DISC holds until the queued frame is out.
        assert_eq!(conn.poll_outbound(PriorityClass::Management, usize::MAX), None);
        assert!(matches!(poll_data(&conn), Some(PduBody::I { ns: 0, .. })));
        let disc = conn.poll_outbound(PriorityClass::Management, usize::MAX).unwrap();
        assert_eq!(disc.body, PduBody::Disc);
        assert!(conn.is_finished());

        // Idempotent.
        conn.disconnect();
        assert!(conn.is_finished());
    }

    #[test]
    fn test_inbound_delivery_and_ack() {
        let conn = connected(1);
        conn.handle_pdu(
            PduBody::I {
                ns: 0,
                nr: 0,
                payload: Bytes::from_static(b"hello"),
            },
            Sap::SNEP,
        );
        // Duplicate is never delivered twice.
        conn.handle_pdu(
            PduBody::I {
                ns: 0,
                nr: 0,
                payload: Bytes::from_static(b"hello"),
            },
            Sap::SNEP,
        );
        // Nothing acknowledged until the application reads.
        assert_eq!(poll_data(&conn), None);

        let (payload, from) = conn.recv(Some(Duration::from_millis(10))).unwrap();
        assert_eq!(payload.as_ref(), b"hello");
        assert_eq!(from, Sap::SNEP);
        assert_eq!(poll_data(&conn), Some(PduBody::Rr { nr: 1 }));
        assert_eq!(
            conn.recv(Some(Duration::from_millis(10))),
            Err(ConnectionError::Timeout)
        );
    }

    #[test]
    fn test_rnr_suspends_transmission() {
        let conn = connected(2);
        conn.handle_pdu(PduBody::Rnr { nr: 0 }, Sap::SNEP);
        conn.send(&b"held"[..]).unwrap();
        assert_eq!(poll_data(&conn), None);

        conn.handle_pdu(PduBody::Rr { nr: 0 }, Sap::SNEP);
        assert!(matches!(poll_data(&conn), Some(PduBody::I { ns: 0, .. })));
    }

    #[test]
    fn test_bad_ack_rejected_with_frmr() {
        let conn = connected(1);
        conn.handle_pdu(PduBody::Rr { nr: 5 }, Sap::SNEP);
        assert_eq!(conn.state(), ConnectionState::Closed);
        let frmr = conn.poll_outbound(PriorityClass::Management, usize::MAX).unwrap();
        let PduBody::Frmr(reject) = frmr.body else {
            panic!("expected FRMR, got {frmr:?}");
        };
        assert_eq!(reject.flags, FrameReject::R);
        assert_eq!(reject.ptype, PduType::Rr.as_u8());
    }

    #[test]
    fn test_peer_disc_drains_then_closed() {
        let conn = connected(1);
        conn.handle_pdu(
            PduBody::I {
                ns: 0,
                nr: 0,
                payload: Bytes::from_static(b"last"),
            },
            Sap::SNEP,
        );
        conn.handle_pdu(PduBody::Disc, Sap::SNEP);

        let dm = conn.poll_outbound(PriorityClass::Management, usize::MAX).unwrap();
        assert_eq!(dm.body, PduBody::Dm(DmReason::Disconnected));

        assert_eq!(conn.recv(None).unwrap().0.as_ref(), b"last");
        assert_eq!(conn.recv(None), Err(ConnectionError::ConnectionClosed));
        assert!(conn.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_link_down_wakes_receiver() {
        let conn = connected(1);
        let receiver = conn.clone();
        let handle = thread::spawn(move || receiver.recv(None));
        thread::sleep(Duration::from_millis(20));
        conn.on_link_down();
        assert_eq!(handle.join().unwrap(), Err(ConnectionError::LinkDown));
        assert_eq!(conn.send(&b"x"[..]), Err(ConnectionError::NotConnected));
    }

    #[test]
    fn test_datagram_channel() {
        let channel = Connection::datagram(sap(0x21), 128, 128, bell());
        assert!(channel.is_datagram());
        assert_eq!(channel.remote_sap(), None);
        assert_eq!(channel.send(&b"x"[..]), Err(ConnectionError::NotConnected));

        channel.send_to(sap(0x30), &b"ping"[..]).unwrap();
        let pdu = channel.poll_outbound(PriorityClass::Data, usize::MAX).unwrap();
        assert_eq!(pdu.dsap, sap(0x30));
        assert_eq!(pdu.ssap, sap(0x21));
        assert_eq!(pdu.body, PduBody::Ui(Bytes::from_static(b"ping")));

        channel.handle_pdu(PduBody::Ui(Bytes::from_static(b"pong")), sap(0x30));
        assert_eq!(
            channel.recv(None).unwrap(),
            (Bytes::from_static(b"pong"), sap(0x30))
        );

        let oriented = connected(1);
        assert_eq!(
            oriented.send_to(sap(0x30), &b"x"[..]),
            Err(ConnectionError::NotDatagram)
        );
    }

    #[test]
    fn test_connect_timeout() {
        let conn = Connection::outgoing(sap(0x20), Sap::SNEP, 128, 1, None, bell());
        assert_eq!(
            conn.await_connected(Some(Duration::from_millis(5))),
            Err(ConnectionError::Timeout)
        );
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.is_finished());
    }
}
