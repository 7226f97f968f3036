//! The link: registry, connection table and the per-turn dispatch logic.
//!
//! One MAC turn sends exactly one frame and receives exactly one. The MAC
//! adapter asks [`Link::next_frame`] what to send and hands every reply to
//! [`Link::handle_inbound`]. Both run under the link lock, so routing always
//! sees a consistent registry and connection table.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tracing::{debug, error, info, instrument, trace, warn};

use super::config::LinkConfig;
use super::connection::Connection;
use super::doorbell::Doorbell;
use super::error::{ConnectionError, LinkError, RegistryError};
use super::registry::{Registry, SapRequest};
use super::scheduler::{ConnectionKey, PriorityClass, Scheduler};
use super::sdp::{Resolution, SDP_URI, SdpClient, SdpServer};
use super::service::Service;
use crate::mac::MacRole;
use crate::protocol::{
    DEFAULT_MIU, DmReason, FrameReject, HEADER_SIZE, LINK_SERVICE_CLASS_3, LLCP_VERSION,
    LinkMetrics, MAX_RW, MetricsSnapshot, Parameter, ParameterSet, Pdu, PduBody, PduDirection,
    PduHeader, PduType, Sap, Version,
};

/// Largest URI that fits an SDREQ or SN parameter.
const MAX_URI_LEN: usize = 254;

/// Where a connection request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A known SAP.
    Sap(Sap),
    /// A service name, resolved by the peer's SDP on CONNECT.
    Uri(String),
}

impl From<Sap> for Target {
    fn from(sap: Sap) -> Self {
        Self::Sap(sap)
    }
}

impl From<&str> for Target {
    fn from(uri: &str) -> Self {
        Self::Uri(uri.to_owned())
    }
}

impl From<String> for Target {
    fn from(uri: String) -> Self {
        Self::Uri(uri)
    }
}

/// Link parameters announced by the peer in PAX.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RemoteParameters {
    /// Agreed protocol version
    pub version: Version,
    /// Peer link MIU
    pub miu: usize,
    /// Peer well-known service bitmap
    pub wks: u16,
    /// Peer link timeout, units of 10 ms
    pub lto: u8,
    /// Peer link service class and options
    pub opt: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Active,
    Stopping,
}

/// Whether the exchange loop keeps going after an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

/// Frame chosen for the next MAC turn.
#[derive(Debug)]
pub(crate) struct Outbound {
    pub(crate) frame: Bytes,
    /// Link DISC: the session ends after this exchange.
    pub(crate) last: bool,
}

struct LinkState {
    phase: Phase,
    registry: Registry,
    connections: HashMap<ConnectionKey, Connection>,
    scheduler: Scheduler,
    sdp: SdpClient,
    remote: Option<RemoteParameters>,
    pax_sent: bool,
}

impl LinkState {
    fn remote_miu(&self) -> usize {
        self.remote.as_ref().map_or(DEFAULT_MIU, |remote| remote.miu)
    }

    fn insert(&mut self, key: ConnectionKey, conn: Connection) {
        self.scheduler.add(key);
        self.connections.insert(key, conn);
    }

    fn prune(&mut self, metrics: &LinkMetrics) {
        let finished: Vec<ConnectionKey> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.is_finished())
            .map(|(key, _)| *key)
            .collect();
        for key in finished {
            if let Some(conn) = self.connections.remove(&key) {
                if conn.was_opened() {
                    metrics.record_connection_close();
                }
                trace!(?key, "connection removed");
            }
            self.scheduler.remove(key);
        }
    }

    fn poll(&mut self, budget: usize) -> Option<Pdu> {
        if let Some(pdu) = self.scheduler.pop_control(budget) {
            return Some(pdu);
        }
        let order = self.scheduler.order();
        for class in [PriorityClass::Management, PriorityClass::Data] {
            for key in &order {
                let Some(conn) = self.connections.get(key) else {
                    continue;
                };
                if let Some(pdu) = conn.poll_outbound(class, budget) {
                    self.scheduler.served(*key);
                    return Some(pdu);
                }
            }
        }
        None
    }

    fn reply(&mut self, to: &Pdu, body: PduBody) {
        self.scheduler.push_control(Pdu::new(to.ssap, to.dsap, body));
    }
}

struct LinkShared {
    config: LinkConfig,
    state: Mutex<LinkState>,
    /// Signalled when SDP answers arrive or the session ends.
    events: Condvar,
    doorbell: Arc<Doorbell>,
    metrics: LinkMetrics,
}

/// An LLCP link.
///
/// Cloning yields another handle to the same link. Services are registered
/// once and survive across MAC sessions; connections live for one session.
#[derive(Clone)]
pub struct Link {
    shared: Arc<LinkShared>,
}

impl Link {
    /// Create a link with the SDP service bound at SAP 1.
    #[must_use]
    pub fn new(config: LinkConfig) -> Self {
        let mut registry = Registry::new();
        // Occupies SAP 1 so SDP answers for its own name; requests never
        // reach this handler.
        let sdp = Service::new(|_conn| {}).with_uri(SDP_URI);
        if let Err(err) = registry.bind(sdp, SapRequest::Fixed(Sap::SDP)) {
            error!(error = %err, "failed to bind SDP");
        }

        Self {
            shared: Arc::new(LinkShared {
                config,
                state: Mutex::new(LinkState {
                    phase: Phase::Idle,
                    registry,
                    connections: HashMap::new(),
                    scheduler: Scheduler::new(),
                    sdp: SdpClient::new(),
                    remote: None,
                    pax_sent: false,
                }),
                events: Condvar::new(),
                doorbell: Arc::new(Doorbell::default()),
                metrics: LinkMetrics::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    /// Counter snapshot
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Whether a MAC session is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().phase == Phase::Active
    }

    /// Peer link parameters, once PAX was received.
    #[must_use]
    pub fn remote_parameters(&self) -> Option<RemoteParameters> {
        self.lock().remote.clone()
    }

    /// Bind a service; returns the SAP it got.
    ///
    /// Without a fixed SAP the first free local SAP (32..=63) is used.
    #[instrument(level = "debug", skip(self, service), fields(uri = service.uri()))]
    pub fn register(&self, service: Service) -> Result<Sap, RegistryError> {
        service.validate()?;
        if service.miu() > self.shared.config.miu {
            return Err(RegistryError::InvalidParameters {
                miu: service.miu(),
                rw: service.rw(),
            });
        }
        let request = match service.sap() {
            Some(sap) if sap.is_reserved() => return Err(RegistryError::ReservedSap { sap }),
            Some(sap) => SapRequest::Fixed(sap),
            None => SapRequest::Auto,
        };
        self.lock().registry.bind(service, request)
    }

    /// Remove a binding. Connections already running keep going; SAP 0
    /// and 1 cannot be unbound.
    pub fn unbind(&self, sap: Sap) -> Option<Service> {
        if sap.is_reserved() {
            return None;
        }
        self.lock().registry.unbind(sap)
    }

    /// Local SAP serving `uri`.
    #[must_use]
    pub fn find_by_uri(&self, uri: &str) -> Option<Sap> {
        self.lock().registry.find_by_uri(uri)
    }

    /// Service bound at `sap`.
    #[must_use]
    pub fn lookup(&self, sap: Sap) -> Option<Service> {
        self.lock().registry.lookup(sap).cloned()
    }

    /// Connect from the service at `local` using its MIU and RW.
    pub fn connect(&self, local: Sap, target: impl Into<Target>) -> Result<Connection, ConnectionError> {
        let (miu, rw) = {
            let state = self.lock();
            let service = state
                .registry
                .lookup(local)
                .ok_or(ConnectionError::UnboundSap { sap: local })?;
            (service.miu(), service.rw())
        };
        self.connect_with(local, target, miu, rw)
    }

    /// Connect from the service at `local` with explicit MIU and RW.
    ///
    /// `miu` must lie between 128 and the link MIU, since larger frames
    /// would be dropped on receive. Blocks until CC, DM, link loss or the
    /// configured connect timeout.
    #[instrument(level = "debug", skip(self, target), fields(%local))]
    pub fn connect_with(
        &self,
        local: Sap,
        target: impl Into<Target>,
        miu: usize,
        rw: u8,
    ) -> Result<Connection, ConnectionError> {
        if !(DEFAULT_MIU..=self.shared.config.miu).contains(&miu) || rw > MAX_RW {
            return Err(ConnectionError::InvalidParameters { miu, rw });
        }
        let target = target.into();
        let (remote, service_name) = match target {
            Target::Sap(sap) => (sap, None),
            Target::Uri(uri) => {
                check_uri(&uri)?;
                (Sap::SDP, Some(uri))
            }
        };

        let conn = {
            let mut state = self.lock();
            if state.phase != Phase::Active {
                return Err(ConnectionError::LinkDown);
            }
            if local.is_reserved() || state.registry.lookup(local).is_none() {
                return Err(ConnectionError::UnboundSap { sap: local });
            }
            let key = ConnectionKey::Oriented { local, remote };
            if state.connections.get(&key).is_some_and(|conn| !conn.is_finished()) {
                return Err(ConnectionError::AlreadyConnected { local, remote });
            }

            let conn = Connection::outgoing(
                local,
                remote,
                miu,
                rw,
                service_name,
                Arc::clone(&self.shared.doorbell),
            );
            state.insert(key, conn.clone());
            conn
        };
        self.shared.doorbell.ring();

        conn.await_connected(self.shared.config.connect_timeout)?;
        self.shared.metrics.record_connection_open();
        info!(%local, remote = ?conn.remote_sap(), "connected");
        Ok(conn)
    }

    /// Ask the peer's SDP which SAP serves `uri`.
    ///
    /// Every call sends a fresh request; answers are not cached.
    #[instrument(level = "debug", skip(self))]
    pub fn resolve(&self, uri: &str) -> Result<Option<Sap>, ConnectionError> {
        check_uri(uri)?;

        let mut state = self.lock();
        if state.phase != Phase::Active {
            return Err(ConnectionError::LinkDown);
        }
        let Some(tid) = state.sdp.request() else {
            warn!("all SDP transaction ids in use");
            return Err(ConnectionError::ResolverBusy);
        };
        state.scheduler.push_control(Pdu::new(
            Sap::SDP,
            Sap::SDP,
            PduBody::Snl(vec![Parameter::SdReq {
                tid,
                uri: uri.to_owned(),
            }]),
        ));
        self.shared.doorbell.ring();

        let (mut state, _) = self
            .shared
            .events
            .wait_timeout_while(state, self.shared.config.resolve_timeout, |state| {
                state.sdp.is_waiting(tid)
            })
            .unwrap_or_else(PoisonError::into_inner);

        match state.sdp.take(tid) {
            Some(Resolution::Resolved(0)) => Ok(None),
            Some(Resolution::Resolved(sap)) => Ok(Sap::new(sap)),
            Some(Resolution::Waiting) => Err(ConnectionError::Timeout),
            Some(Resolution::Cancelled) | None => Err(ConnectionError::LinkDown),
        }
    }

    /// Connectionless channel of the service at `local`, created on first
    /// use. UI PDUs addressed to `local` are delivered to it.
    pub fn datagram_channel(&self, local: Sap) -> Result<Connection, ConnectionError> {
        let mut state = self.lock();
        if state.phase != Phase::Active {
            return Err(ConnectionError::LinkDown);
        }
        let miu = match state.registry.lookup(local) {
            Some(service) if !local.is_reserved() => service.miu(),
            _ => return Err(ConnectionError::UnboundSap { sap: local }),
        };
        let key = ConnectionKey::Datagram { local };
        if let Some(conn) = state.connections.get(&key) {
            if !conn.is_finished() {
                return Ok(conn.clone());
            }
        }
        let conn = Connection::datagram(local, miu, state.remote_miu(), Arc::clone(&self.shared.doorbell));
        state.insert(key, conn.clone());
        Ok(conn)
    }

    /// End the current MAC session: link DISC goes out on the next turn
    /// and the exchange loop stops.
    pub fn deactivate(&self) {
        let mut state = self.lock();
        if state.phase == Phase::Active {
            info!("link deactivation requested");
            state.phase = Phase::Stopping;
            drop(state);
            self.shared.doorbell.ring();
        }
    }

    /// Start a MAC session.
    pub(crate) fn begin_session(&self, role: MacRole) -> Result<(), LinkError> {
        let mut state = self.lock();
        if state.phase != Phase::Idle {
            return Err(LinkError::AlreadyActive);
        }
        state.phase = Phase::Active;
        state.remote = None;
        state.pax_sent = role == MacRole::Initiator;
        if state.pax_sent {
            let pax = self.pax(&state);
            state.scheduler.push_control_front(pax);
        }
        info!(?role, "link session started");
        Ok(())
    }

    /// Close every connection and return to idle.
    pub(crate) fn end_session(&self) {
        let mut state = self.lock();
        for conn in state.connections.values() {
            if conn.was_opened() {
                self.shared.metrics.record_connection_close();
            }
            conn.on_link_down();
        }
        state.connections.clear();
        state.scheduler.clear();
        state.sdp.cancel_all();
        state.remote = None;
        state.pax_sent = false;
        if state.phase != Phase::Idle {
            info!("link session ended");
        }
        state.phase = Phase::Idle;
        drop(state);
        self.shared.events.notify_all();
    }

    fn pax(&self, state: &LinkState) -> Pdu {
        Pdu::new(
            Sap::LINK_MANAGEMENT,
            Sap::LINK_MANAGEMENT,
            PduBody::Pax(vec![
                Parameter::Version(LLCP_VERSION),
                Parameter::miux_for(self.shared.config.miu),
                Parameter::Wks(state.registry.wks()),
                Parameter::Lto(self.shared.config.lto),
                Parameter::Opt(LINK_SERVICE_CLASS_3),
            ]),
        )
    }

    /// Frame for the next turn. Waits up to `symm_delay` for work before
    /// settling for SYMM.
    pub(crate) fn next_frame(&self) -> Outbound {
        let deadline = Instant::now() + self.shared.config.symm_delay;
        loop {
            {
                let mut state = self.lock();
                if state.phase == Phase::Stopping {
                    let disc = Pdu::new(Sap::LINK_MANAGEMENT, Sap::LINK_MANAGEMENT, PduBody::Disc);
                    return Outbound {
                        frame: self.encode(&disc).unwrap_or_default(),
                        last: true,
                    };
                }
                state.prune(&self.shared.metrics);
                if let Some(frame) = self.take_frame(&mut state) {
                    return Outbound { frame, last: false };
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.shared.doorbell.wait(remaining) {
                break;
            }
        }

        let symm = Pdu::symm();
        Outbound {
            frame: self.encode(&symm).unwrap_or_default(),
            last: false,
        }
    }

    fn take_frame(&self, state: &mut LinkState) -> Option<Bytes> {
        loop {
            let first = state.poll(usize::MAX)?;
            let pdu = if self.shared.config.aggregation {
                self.aggregate(state, first)
            } else {
                first
            };
            match self.encode(&pdu) {
                Some(frame) => return Some(frame),
                None => continue,
            }
        }
    }

    /// Pack further ready PDUs behind `first` while the AGF body fits the
    /// peer's link MIU.
    fn aggregate(&self, state: &mut LinkState, first: Pdu) -> Pdu {
        let limit = state.remote_miu();
        let mut used = 2 + first.encoded_len();
        if used > limit {
            return first;
        }

        let mut batch = vec![first];
        loop {
            let budget = limit.saturating_sub(used + 2);
            if budget < HEADER_SIZE {
                break;
            }
            let Some(next) = state.poll(budget) else {
                break;
            };
            used += 2 + next.encoded_len();
            batch.push(next);
        }

        if batch.len() == 1 {
            return batch.remove(0);
        }
        trace!(count = batch.len(), len = used, "aggregating PDUs");
        Pdu::new(Sap::LINK_MANAGEMENT, Sap::LINK_MANAGEMENT, PduBody::Agf(batch))
    }

    fn encode(&self, pdu: &Pdu) -> Option<Bytes> {
        let mut out = BytesMut::with_capacity(pdu.encoded_len());
        if let Err(err) = pdu.encode_into(&mut out) {
            error!(error = %err, ptype = %pdu.pdu_type(), "dropping unencodable PDU");
            return None;
        }
        self.count(PduDirection::Sent, pdu);
        trace!(ptype = %pdu.pdu_type(), dsap = %pdu.dsap, ssap = %pdu.ssap, "sending");
        Some(out.freeze())
    }

    fn count(&self, direction: PduDirection, pdu: &Pdu) {
        self.shared.metrics.record_pdu(direction, pdu.pdu_type());
        if let PduBody::Agf(inner) = &pdu.body {
            for sub in inner {
                self.shared.metrics.record_pdu(direction, sub.pdu_type());
            }
        }
    }

    pub(crate) fn record_exchange(&self, started: Instant) {
        self.shared.metrics.record_exchange(started.elapsed());
    }

    /// Route one received frame. Malformed frames are dropped.
    pub(crate) fn handle_inbound(&self, frame: Bytes) -> Result<Flow, LinkError> {
        if frame.is_empty() {
            trace!("empty frame");
            return Ok(Flow::Continue);
        }

        let pdu = match Pdu::decode_bounded(frame.clone(), self.shared.config.miu) {
            Ok(pdu) => pdu,
            Err(err) => {
                self.shared.metrics.record_malformed();
                match PduHeader::from_bytes(&frame) {
                    Ok(header) if header.dsap() == Sap::SDP && header.ptype() == PduType::Snl => {
                        error!(error = %err, ssap = %header.ssap(), "ignoring malformed SNL");
                    }
                    _ => warn!(error = %err, "dropping malformed PDU"),
                }
                return Ok(Flow::Continue);
            }
        };
        self.count(PduDirection::Received, &pdu);

        let mut state = self.lock();
        let flow = self.route(&mut state, pdu);
        drop(state);
        self.shared.events.notify_all();
        flow
    }

    fn route(&self, state: &mut LinkState, pdu: Pdu) -> Result<Flow, LinkError> {
        trace!(ptype = %pdu.pdu_type(), dsap = %pdu.dsap, ssap = %pdu.ssap, "received");

        if let PduBody::Agf(inner) = pdu.body {
            for sub in inner {
                if self.route(state, sub)? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }
            return Ok(Flow::Continue);
        }

        match pdu.dsap {
            Sap::LINK_MANAGEMENT => self.route_link_management(state, pdu),
            Sap::SDP if matches!(pdu.body, PduBody::Snl(_) | PduBody::Connect(_)) => {
                self.route_sdp(state, pdu);
                Ok(Flow::Continue)
            }
            _ => {
                self.route_service(state, pdu);
                Ok(Flow::Continue)
            }
        }
    }

    fn route_link_management(&self, state: &mut LinkState, pdu: Pdu) -> Result<Flow, LinkError> {
        match &pdu.body {
            PduBody::Symm => Ok(Flow::Continue),
            PduBody::Pax(parameters) => {
                self.apply_pax(state, parameters)?;
                Ok(Flow::Continue)
            }
            PduBody::Disc if pdu.ssap == Sap::LINK_MANAGEMENT => {
                info!("peer deactivated the link");
                Ok(Flow::Stop)
            }
            PduBody::Connect(_) => {
                state.reply(&pdu, PduBody::Dm(DmReason::NoServiceBound));
                Ok(Flow::Continue)
            }
            other => {
                debug!(ptype = %other.pdu_type(), "ignored at link management SAP");
                Ok(Flow::Continue)
            }
        }
    }

    fn apply_pax(&self, state: &mut LinkState, parameters: &[Parameter]) -> Result<(), LinkError> {
        let set = ParameterSet::from_list(parameters);
        let remote_version = set.version.unwrap_or(LLCP_VERSION);
        let Some(version) = LLCP_VERSION.agree(remote_version) else {
            error!(local = %LLCP_VERSION, remote = %remote_version, "incompatible LLCP version");
            return Err(LinkError::IncompatibleVersion {
                local: LLCP_VERSION,
                remote: remote_version,
            });
        };

        let remote = RemoteParameters {
            version,
            miu: set.miu(),
            wks: set.wks.unwrap_or(0),
            lto: set.lto.unwrap_or(crate::protocol::DEFAULT_LTO),
            opt: set.opt.unwrap_or(0),
        };
        info!(
            %version,
            miu = remote.miu,
            wks = remote.wks,
            lto = remote.lto,
            "link parameters exchanged"
        );

        for (key, conn) in &state.connections {
            if matches!(key, ConnectionKey::Datagram { .. }) {
                conn.set_remote_miu(remote.miu);
            }
        }
        state.remote = Some(remote);

        // The target answers the initiator's PAX with its own.
        if !state.pax_sent {
            state.pax_sent = true;
            let pax = self.pax(state);
            state.scheduler.push_control_front(pax);
        }
        Ok(())
    }

    fn route_sdp(&self, state: &mut LinkState, pdu: Pdu) {
        match &pdu.body {
            PduBody::Snl(parameters) => {
                for parameter in parameters {
                    if let Parameter::SdRes { tid, sap } = parameter {
                        state.sdp.complete(*tid, *sap);
                    }
                }
                let answers = SdpServer::respond(parameters, &state.registry);
                if !answers.is_empty() {
                    state.reply(&pdu, PduBody::Snl(answers));
                }
            }
            PduBody::Connect(parameters) => {
                let set = ParameterSet::from_list(parameters);
                let target = set
                    .service_name
                    .as_deref()
                    .and_then(|uri| state.registry.find_by_uri(uri))
                    .filter(|sap| !sap.is_reserved());
                match target {
                    Some(sap) => {
                        debug!(uri = set.service_name.as_deref(), %sap, "connect by name");
                        self.accept_connect(state, sap, pdu.ssap, parameters);
                    }
                    None => {
                        warn!(uri = set.service_name.as_deref(), "connect by name: no such service");
                        state.reply(&pdu, PduBody::Dm(DmReason::NoServiceBound));
                    }
                }
            }
            _ => {}
        }
    }

    fn route_service(&self, state: &mut LinkState, pdu: Pdu) {
        let Pdu { dsap, ssap, body } = pdu;
        match body {
            PduBody::Connect(parameters) => {
                if state.registry.lookup(dsap).is_some() && !dsap.is_reserved() {
                    self.accept_connect(state, dsap, ssap, &parameters);
                } else {
                    debug!(%dsap, "CONNECT to unbound SAP");
                    state
                        .scheduler
                        .push_control(Pdu::new(ssap, dsap, PduBody::Dm(DmReason::NoServiceBound)));
                }
            }
            PduBody::Ui(payload) => self.deliver_datagram(state, dsap, ssap, payload),
            body @ (PduBody::Symm | PduBody::Pax(_) | PduBody::Snl(_) | PduBody::Agf(_)) => {
                debug!(ptype = %body.pdu_type(), %dsap, "ignored at service SAP");
            }
            body => {
                let key = ConnectionKey::Oriented { local: dsap, remote: ssap };
                if let Some(conn) = state.connections.get(&key) {
                    conn.handle_pdu(body, ssap);
                    return;
                }
                if matches!(body, PduBody::Cc(_)) && self.bind_by_name(state, dsap, ssap) {
                    if let Some(conn) = state.connections.get(&key) {
                        conn.handle_pdu(body, ssap);
                    }
                    return;
                }
                self.answer_orphan(state, dsap, ssap, body);
            }
        }
    }

    /// A CC from SAP `remote` completing a connect-by-name sent to SDP.
    fn bind_by_name(&self, state: &mut LinkState, local: Sap, remote: Sap) -> bool {
        let pending = ConnectionKey::Oriented { local, remote: Sap::SDP };
        let Some(conn) = state.connections.get(&pending) else {
            return false;
        };
        if !conn.is_connecting() {
            return false;
        }
        let Some(conn) = state.connections.remove(&pending) else {
            return false;
        };
        conn.set_remote(remote);
        let key = ConnectionKey::Oriented { local, remote };
        state.scheduler.rekey(pending, key);
        state.connections.insert(key, conn);
        debug!(%local, %remote, "connect by name answered");
        true
    }

    /// Answer a connection PDU that matches no connection.
    fn answer_orphan(&self, state: &mut LinkState, dsap: Sap, ssap: Sap, body: PduBody) {
        let answer = match &body {
            PduBody::Disc | PduBody::Cc(_) => Some(PduBody::Dm(DmReason::NoActiveConnection)),
            PduBody::I { ns, nr, .. } => Some(PduBody::Frmr(FrameReject {
                flags: FrameReject::W,
                ptype: PduType::I.as_u8(),
                sequence: (*ns << 4) | *nr,
                ..FrameReject::default()
            })),
            PduBody::Rr { nr } | PduBody::Rnr { nr } => Some(PduBody::Frmr(FrameReject {
                flags: FrameReject::W,
                ptype: body.pdu_type().as_u8(),
                sequence: *nr,
                ..FrameReject::default()
            })),
            _ => None,
        };
        match answer {
            Some(answer) => {
                debug!(ptype = %body.pdu_type(), %dsap, %ssap, "no connection for PDU");
                state.scheduler.push_control(Pdu::new(ssap, dsap, answer));
            }
            None => trace!(ptype = %body.pdu_type(), %dsap, "dropping PDU for unknown connection"),
        }
    }

    fn accept_connect(&self, state: &mut LinkState, local: Sap, remote: Sap, parameters: &[Parameter]) {
        let Some(service) = state.registry.lookup(local).cloned() else {
            return;
        };
        let key = ConnectionKey::Oriented { local, remote };
        if let Some(existing) = state.connections.get(&key) {
            if !existing.is_finished() {
                warn!(%local, %remote, "CONNECT for a live connection");
                state
                    .scheduler
                    .push_control(Pdu::new(remote, local, PduBody::Dm(DmReason::Rejected)));
                return;
            }
        }

        let conn = Connection::incoming(
            local,
            remote,
            service.miu(),
            service.rw(),
            parameters,
            Arc::clone(&self.shared.doorbell),
        );
        state.insert(key, conn.clone());
        self.shared.metrics.record_connection_open();
        info!(%local, %remote, "connection accepted");
        service.spawn(conn);
    }

    fn deliver_datagram(&self, state: &mut LinkState, local: Sap, remote: Sap, payload: Bytes) {
        let key = ConnectionKey::Datagram { local };
        if let Some(conn) = state.connections.get(&key) {
            if !conn.is_finished() {
                conn.handle_pdu(PduBody::Ui(payload), remote);
                return;
            }
        }

        let Some(service) = state.registry.lookup(local).filter(|_| !local.is_reserved()).cloned() else {
            debug!(%local, "UI for unbound SAP");
            return;
        };
        let conn = Connection::datagram(
            local,
            service.miu(),
            state.remote_miu(),
            Arc::clone(&self.shared.doorbell),
        );
        conn.handle_pdu(PduBody::Ui(payload), remote);
        state.insert(key, conn.clone());
        service.spawn(conn);
    }
}

fn check_uri(uri: &str) -> Result<(), ConnectionError> {
    if uri.len() > MAX_URI_LEN {
        return Err(crate::protocol::Error::ParameterTooLong { len: uri.len() }.into());
    }
    Ok(())
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::new(LinkConfig::default())
    }
}
