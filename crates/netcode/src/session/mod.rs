mod config;
mod dispatch;
mod events;
mod peer;

use std::collections::{HashSet, VecDeque};

use rand::SeedableRng;
use rand::rngs::StdRng;

pub use config::{DEFAULT_UPDATE_RATE, SessionConfig, SessionError};
pub use events::{CloseReason, SessionEvent};
pub use peer::{Peer, PeerList, PeerRole, PeerState};

use crate::net::clock::{DEFAULT_CLIENT_DELAY_MS, HostClock, PING_INTERVAL_MS};
use crate::net::control::{ControlMessage, Welcome, format_ping};
use crate::net::protocol::{ErrorKind, encode_client_input, encode_host_events, encode_host_update};
use crate::net::simulator::{DelayQueue, DelayedFrame, Direction, LatencySimulation};
use crate::net::stats::TrafficStats;
use crate::net::transport::{ChannelKind, Payload, Transport};
use crate::net::value::NetValue;
use crate::registry::{
    Bandwidth, InstanceId, NidAllocator, ObjectSource, RegisteredObject, Registry,
    should_transmit,
};
use crate::snapshot::ValuePool;

/// Connection attempts that have not opened after this long are dropped.
pub const CONNECT_TIMEOUT_MS: f64 = 25_000.0;
pub const SILENCE_TIMEOUT_MS: f64 = 20_000.0;
pub const MAX_UNRELIABLE_ERRORS: u32 = 10;
/// Host rejects client input stamped further than this from its clock.
pub const INPUT_WINDOW_MS: f64 = 3000.0;
/// Extrapolation horizon for client input streams.
pub const INPUT_EXTRAPOLATION_MS: f64 = 250.0;

const UPDATE_TOLERANCE_MS: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: String,
    pub alias: String,
}

impl PeerInfo {
    pub fn new(id: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alias: alias.into(),
        }
    }
}

pub struct Session {
    config: SessionConfig,
    /// Configuration chosen by the application. A host's welcome
    /// overrides `config` while in its room.
    local_config: SessionConfig,
    latency_sim: LatencySimulation,
    rng: StdRng,

    in_room: bool,
    hosting: bool,
    my_id: Option<String>,
    host_id: Option<String>,
    peers: PeerList,
    peer_nids: NidAllocator,

    registry: Registry,
    client_values: Vec<NetValue>,
    local_client_values: Vec<NetValue>,
    received_client_values: bool,
    local_state: Vec<f64>,
    last_state_change: f64,
    last_state_transmit: f64,

    clock: HostClock,
    delayed: DelayQueue,
    stats: TrafficStats,
    pool: ValuePool,
    reported_unknown_types: HashSet<u16>,

    pending_events: VecDeque<SessionEvent>,
    removing_all: bool,
    last_update: f64,
    last_ping: f64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_seed(config: SessionConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SessionConfig, rng: StdRng) -> Self {
        Self {
            config,
            local_config: config,
            latency_sim: LatencySimulation::default(),
            rng,
            in_room: false,
            hosting: false,
            my_id: None,
            host_id: None,
            peers: PeerList::new(),
            peer_nids: NidAllocator::disabled(),
            registry: Registry::new(),
            client_values: Vec::new(),
            local_client_values: Vec::new(),
            received_client_values: false,
            local_state: Vec::new(),
            last_state_change: f64::NEG_INFINITY,
            last_state_transmit: f64::NEG_INFINITY,
            clock: HostClock::new(config.client_delay),
            delayed: DelayQueue::new(),
            stats: TrafficStats::default(),
            pool: ValuePool::new(),
            reported_unknown_types: HashSet::new(),
            pending_events: VecDeque::new(),
            removing_all: false,
            last_update: f64::NEG_INFINITY,
            last_ping: f64::NEG_INFINITY,
        }
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = SessionEvent> + '_ {
        self.pending_events.drain(..)
    }

    // Configuration

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SessionConfig) -> Result<(), SessionError> {
        if self.in_room {
            return Err(SessionError::InRoom);
        }
        self.config = config;
        self.local_config = config;
        self.clock.set_client_delay(config.client_delay);
        Ok(())
    }

    pub fn set_bandwidth_settings(
        &mut self,
        update_rate: f64,
        client_delay: f64,
    ) -> Result<(), SessionError> {
        self.set_config(SessionConfig {
            host_update_rate: update_rate,
            peer_update_rate: update_rate,
            client_delay,
        })
    }

    /// Allowed at any time, including mid-room.
    pub fn set_latency_simulation(&mut self, latency_ms: f64, pdv_ms: f64, loss: f64) {
        self.latency_sim = LatencySimulation::new(latency_ms, pdv_ms, loss);
    }

    pub fn latency_simulation(&self) -> LatencySimulation {
        self.latency_sim
    }

    pub fn register_object(
        &mut self,
        sid: &str,
        schema: Vec<NetValue>,
        bandwidth: Bandwidth,
    ) -> Result<u16, SessionError> {
        if self.in_room {
            return Err(SessionError::InRoom);
        }
        Ok(self.registry.register(sid, schema, bandwidth)?)
    }

    pub fn set_object_bandwidth(&mut self, sid: &str, bandwidth: Bandwidth) -> Result<(), SessionError> {
        if self.in_room {
            return Err(SessionError::InRoom);
        }
        self.registry.get_mut(sid)?.set_bandwidth(bandwidth);
        Ok(())
    }

    pub fn add_client_value(&mut self, value: NetValue) -> Result<(), SessionError> {
        if self.in_room {
            return Err(SessionError::InRoom);
        }
        self.local_client_values.push(value.clone());
        self.client_values.push(value);
        Ok(())
    }

    pub fn client_values(&self) -> &[NetValue] {
        &self.client_values
    }

    // Room lifecycle

    /// Enters a room. `host` is `None` when the local participant was
    /// assigned host, otherwise the host to connect to.
    pub fn join_room(&mut self, now: f64, me: PeerInfo, host: Option<PeerInfo>) {
        self.remove_all(now, CloseReason::Disconnect);

        self.in_room = true;
        self.my_id = Some(me.id.clone());
        self.delayed.clear();
        self.stats = TrafficStats::new(now);
        self.last_update = f64::NEG_INFINITY;
        self.last_ping = now;
        self.reported_unknown_types.clear();
        self.registry.clear_instances(&mut self.pool);

        let mut local = Peer::new(me.id.clone(), me.alias, PeerRole::LocalIdentity);

        match host {
            None => {
                self.hosting = true;
                self.host_id = Some(me.id);
                self.peer_nids = NidAllocator::new();
                local.nid = self.peer_nids.allocate().unwrap_or_default();
                // Undo whatever a previous room's host pushed to us.
                self.registry.restore_local(&mut self.pool);
                self.config = self.local_config;
                self.clock.reset(self.config.client_delay);
                self.client_values = self.local_client_values.clone();
                self.local_state.clear();
                self.peers.insert(local);
                log::info!("Joined room as host");
            }
            Some(host) => {
                self.hosting = false;
                self.peer_nids = NidAllocator::disabled();
                self.config = SessionConfig::default();
                self.clock.reset(DEFAULT_CLIENT_DELAY_MS);
                self.received_client_values = false;
                self.local_state.clear();
                self.last_state_change = f64::NEG_INFINITY;
                self.last_state_transmit = f64::NEG_INFINITY;

                let mut host_peer = Peer::new(host.id.clone(), host.alias, PeerRole::Host);
                host_peer.connect_time = Some(now);
                self.host_id = Some(host.id);
                self.peers.insert(local);
                self.peers.insert(host_peer);
                log::info!("Joined room, connecting to host");
            }
        }
    }

    pub fn leave_room(&mut self, now: f64) {
        self.clock.reset(self.config.client_delay);
        self.remove_all(now, CloseReason::Disconnect);
        self.in_room = false;
        self.host_id = None;
    }

    pub fn kicked(&mut self, now: f64) {
        log::warn!("Kicked from room");
        self.leave_room(now);
    }

    pub fn peer_joined(&mut self, now: f64, peer: PeerInfo) -> Result<u16, SessionError> {
        self.require_host()?;
        if self.peers.contains(&peer.id) {
            self.remove_peer(now, &peer.id, CloseReason::Rejoin);
        }

        let mut remote = Peer::new(peer.id, peer.alias, PeerRole::RemotePeer);
        remote.nid = self.peer_nids.allocate().unwrap_or_default();
        remote.connect_time = Some(now);
        let nid = remote.nid;
        log::info!("Peer '{}' joining with NID {}", remote.alias, nid);
        self.peers.insert(remote);
        Ok(nid)
    }

    pub fn peer_quit(&mut self, now: f64, id: &str) -> Result<(), SessionError> {
        self.require_host()?;
        if self.peers.contains(id) {
            self.remove_peer(now, id, CloseReason::Timeout);
        }
        Ok(())
    }

    fn require_host(&self) -> Result<(), SessionError> {
        if !self.in_room {
            Err(SessionError::NotInRoom)
        } else if !self.hosting {
            Err(SessionError::NotHost)
        } else {
            Ok(())
        }
    }

    pub fn attach_transport(
        &mut self,
        id: &str,
        transport: Box<dyn Transport>,
    ) -> Result<(), SessionError> {
        let peer = self
            .peers
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownPeer(id.to_string()))?;
        peer.attach(transport);
        Ok(())
    }

    pub fn channel_open(&mut self, now: f64, id: &str, channel: ChannelKind) {
        let Some(peer) = self.peers.get_mut(id) else {
            return;
        };
        if peer.mark_channel_open(channel) {
            self.on_open(now, id);
        }
    }

    pub fn channel_closed(&mut self, now: f64, id: &str, _channel: ChannelKind) {
        self.remove_peer(now, id, CloseReason::Disconnect);
    }

    pub fn channel_error(&mut self, now: f64, id: &str, channel: ChannelKind, message: &str) {
        if !self.peers.contains(id) {
            return;
        }
        log::error!("Peer '{}' channel '{}' error: {}", id, channel.label(), message);
        self.pending_events.push_back(SessionEvent::PeerError {
            id: id.to_string(),
            kind: ErrorKind::Transport,
            message: message.to_string(),
        });
        if self.hosting && !self.is_me(id) {
            self.remove_peer(now, id, CloseReason::NetworkError);
        }
    }

    fn on_open(&mut self, now: f64, id: &str) {
        let Some(peer) = self.peers.get_mut(id) else {
            return;
        };
        peer.fired_open = true;
        peer.last_heard_from = now;
        let (nid, alias) = (peer.nid, peer.alias.clone());
        if !self.hosting {
            peer.confirmed = true;
        }

        log::info!("Peer '{}' open", alias);
        self.pending_events.push_back(SessionEvent::PeerOpen {
            id: id.to_string(),
            nid,
            alias: alias.clone(),
        });

        if self.hosting {
            let joined = ControlMessage::PeerJoined {
                id: id.to_string(),
                nid,
                alias,
            };
            self.broadcast_control(now, &joined, Some(id));
            let welcome = ControlMessage::Welcome(self.welcome(nid));
            self.send_control(now, id, &welcome);

            let others: Vec<ControlMessage> = self
                .peers
                .iter()
                .filter(|p| p.id != id && p.role != PeerRole::LocalIdentity && p.is_open())
                .map(|p| ControlMessage::PeerJoined {
                    id: p.id.clone(),
                    nid: p.nid,
                    alias: p.alias.clone(),
                })
                .collect();
            for message in &others {
                self.send_control(now, id, message);
            }
        } else if self.host_id.as_deref() == Some(id) {
            self.send_ping(now, id, true);
        }
    }

    fn welcome(&self, nid: u16) -> Welcome {
        let host_nid = self
            .my_id
            .as_deref()
            .and_then(|id| self.peers.get(id))
            .map(|p| p.nid)
            .unwrap_or_default();
        Welcome {
            host_nid,
            nid,
            client_delay: self.config.client_delay,
            update_rate: self.config.peer_update_rate,
            objs: self.registry.schemas(),
            client_values: self
                .client_values
                .iter()
                .map(|v| NetValue::new(v.tag.clone(), v.precision, v.interp))
                .collect(),
        }
    }

    /// Closes a peer. Idempotent: later calls for the same peer are no-ops.
    pub fn remove_peer(&mut self, now: f64, id: &str, reason: CloseReason) {
        let Some(peer) = self.peers.get_mut(id) else {
            return;
        };
        if peer.is_removed() {
            return;
        }
        peer.closed = Some(reason.clone());
        let was_open = peer.fired_open;
        let alias = peer.alias.clone();
        let hosting = self.hosting;
        let is_me = self.is_me(id);
        let is_host = self.host_id.as_deref() == Some(id);

        if was_open && !is_me {
            if hosting {
                let left = ControlMessage::PeerLeft {
                    id: id.to_string(),
                    alias: alias.clone(),
                    reason: reason.as_str().to_string(),
                };
                self.broadcast_control(now, &left, Some(id));
            }
            log::info!("Peer '{}' closed: {}", alias, reason);
            self.pending_events.push_back(SessionEvent::PeerClose {
                id: id.to_string(),
                alias,
                reason: reason.clone(),
            });
        }

        let disconnect = ControlMessage::Disconnect {
            reason: reason.as_str().to_string(),
        };
        self.send_control(now, id, &disconnect);

        if let Some(mut peer) = self.peers.remove(id) {
            peer.release_transport();
            if hosting {
                self.peer_nids.free(peer.nid);
            }
            peer.input.clear(&mut self.pool);
        }

        if is_host {
            self.host_id = None;
            self.remove_all(now, CloseReason::HostQuit);
        }
        if is_me {
            self.in_room = false;
            self.hosting = false;
            self.my_id = None;
            self.remove_all(now, CloseReason::Disconnect);
            self.pending_events.push_back(SessionEvent::RoomLeft { reason });
        }
    }

    fn remove_all(&mut self, now: f64, reason: CloseReason) {
        if self.removing_all {
            return;
        }
        self.removing_all = true;
        for id in self.peers.ids() {
            self.remove_peer(now, &id, reason.clone());
        }
        self.removing_all = false;
    }

    fn is_me(&self, id: &str) -> bool {
        self.my_id.as_deref() == Some(id)
    }

    // Outbound

    pub(crate) fn send_to(&mut self, now: f64, id: &str, channel: ChannelKind, payload: Payload) {
        if !self.peers.contains(id) {
            return;
        }

        if self.latency_sim.should_drop(channel, &mut self.rng) {
            return;
        }
        if !self.latency_sim.is_delaying() {
            self.deliver(now, id, channel, &payload);
            return;
        }
        let delay = self.latency_sim.delay_ms(channel, &mut self.rng);
        self.delayed.push(
            now + delay,
            DelayedFrame {
                peer_id: id.to_string(),
                channel,
                payload,
                direction: Direction::Outbound,
            },
        );
    }

    fn deliver(&mut self, now: f64, id: &str, channel: ChannelKind, payload: &Payload) {
        let Some(peer) = self.peers.get_mut(id) else {
            return;
        };
        let err = match peer.transmit(channel, payload) {
            Ok(true) => {
                self.stats.record_outbound(payload.len());
                return;
            }
            Ok(false) => return,
            Err(err) => err,
        };
        if peer.is_removed() {
            return;
        }

        if !self.hosting {
            log::error!("Error sending on '{}': {}", channel.label(), err);
            return;
        }

        let fatal = if channel.is_reliable() {
            log::error!(
                "Error sending {} bytes on '{}' to '{}', kicking: {}",
                payload.len(),
                channel.label(),
                peer.alias,
                err
            );
            true
        } else {
            peer.error_count += 1;
            if peer.error_count >= MAX_UNRELIABLE_ERRORS {
                log::error!(
                    "Too many errors ({}) sending on '{}' to '{}', kicking: {}",
                    peer.error_count,
                    channel.label(),
                    peer.alias,
                    err
                );
            }
            peer.error_count >= MAX_UNRELIABLE_ERRORS
        };

        if fatal {
            self.pending_events.push_back(SessionEvent::PeerError {
                id: id.to_string(),
                kind: err.kind(),
                message: err.to_string(),
            });
            self.remove_peer(now, id, CloseReason::NetworkError);
        }
    }

    fn send_control(&mut self, now: f64, id: &str, message: &ControlMessage) {
        match message.to_text() {
            Ok(text) => self.send_to(now, id, ChannelKind::Ordered, Payload::Text(text)),
            Err(e) => log::error!("Failed to encode control message: {}", e),
        }
    }

    fn broadcast_control(&mut self, now: f64, message: &ControlMessage, skip: Option<&str>) {
        match message.to_text() {
            Ok(text) => self.broadcast(now, ChannelKind::Ordered, Payload::Text(text), skip),
            Err(e) => log::error!("Failed to encode control message: {}", e),
        }
    }

    pub fn broadcast(&mut self, now: f64, channel: ChannelKind, payload: Payload, skip: Option<&str>) {
        if !self.hosting {
            return;
        }
        for id in self.peers.ids() {
            if self.is_me(&id) || skip == Some(id.as_str()) {
                continue;
            }
            self.send_to(now, &id, channel, payload.clone());
        }
    }

    pub fn send_message(&mut self, now: f64, id: &str, message: &serde_json::Value) {
        match serde_json::to_string(message) {
            Ok(text) => self.send_to(now, id, ChannelKind::Ordered, Payload::Text(text)),
            Err(e) => log::error!("Failed to encode message: {}", e),
        }
    }

    fn send_ping(&mut self, now: f64, id: &str, force: bool) {
        let Some(peer) = self.peers.get_mut(id) else {
            return;
        };
        if peer.is_removed() {
            return;
        }

        let never_opened = !peer.is_open()
            && peer
                .connect_time
                .is_some_and(|t| now - t > CONNECT_TIMEOUT_MS);
        let silent = peer.is_open() && now - peer.last_heard_from > SILENCE_TIMEOUT_MS;
        if !force && (never_opened || silent) {
            let message = if never_opened {
                format!("could not establish connection to '{}'", peer.alias)
            } else {
                format!("not heard from '{}'", peer.alias)
            };
            log::warn!("Timed out: {}", message);
            self.pending_events.push_back(SessionEvent::PeerError {
                id: id.to_string(),
                kind: ErrorKind::Timeout,
                message,
            });
            self.remove_peer(now, id, CloseReason::Timeout);
            return;
        }

        let ping_id = peer.ping.next_ping(now);
        self.send_to(now, id, ChannelKind::Unreliable, Payload::Text(format_ping(ping_id)));
    }

    fn do_pings(&mut self, now: f64) {
        if self.hosting {
            for id in self.peers.ids() {
                if !self.is_me(&id) {
                    self.send_ping(now, &id, false);
                }
            }
        } else if let Some(host) = self.host_id.clone() {
            self.send_ping(now, &host, false);
        }
    }

    // Tick

    /// Advances the session by one frame. `now` in milliseconds, `dt` in
    /// seconds.
    pub fn tick<S: ObjectSource + ?Sized>(&mut self, now: f64, dt: f64, source: &S) {
        self.flush_delayed(now);
        if !self.in_room {
            return;
        }

        let interval = self.config.update_interval_ms(self.hosting);
        if now - self.last_update >= interval - UPDATE_TOLERANCE_MS {
            self.send_update(now, source);
            self.last_update = now;
        }

        if now - self.last_ping >= PING_INTERVAL_MS {
            self.last_ping = now;
            self.do_pings(now);
        }

        self.stats.roll(now);

        if !self.hosting {
            self.clock.slide(dt);
        }

        let sim_time = self.simulation_time(now);
        for peer in self.peers.iter_mut() {
            peer.input.tick(sim_time, &mut self.pool);
        }
        for (object, nid) in self.registry.tick(sim_time, &mut self.pool) {
            log::debug!("Instance {} of '{}' timed out", nid, object);
            self.pending_events
                .push_back(SessionEvent::InstanceTimedOut { object, nid });
        }
    }

    pub fn flush_delayed(&mut self, now: f64) {
        for frame in self.delayed.take_due(now) {
            match frame.direction {
                Direction::Outbound => self.deliver(now, &frame.peer_id, frame.channel, &frame.payload),
                Direction::Inbound => self.dispatch(now, &frame.peer_id, frame.channel, frame.payload),
            }
        }
    }

    fn send_update<S: ObjectSource + ?Sized>(&mut self, now: f64, source: &S) {
        if self.hosting {
            self.send_host_update(now, source);
            self.send_host_events(now);
        } else {
            self.send_client_update(now);
        }
    }

    fn send_host_update<S: ObjectSource + ?Sized>(&mut self, now: f64, source: &S) {
        self.registry.collect(now, source);
        let updates = self.registry.object_updates();
        if updates.is_empty() {
            return;
        }
        let data = encode_host_update(now, &updates);
        self.broadcast(now, ChannelKind::Unreliable, Payload::Binary(data), None);
    }

    fn send_host_events(&mut self, now: f64) {
        let dead = self.registry.take_dead_nids();
        if dead.is_empty() {
            return;
        }
        let groups: Vec<(u16, &[u16])> = dead.iter().map(|(t, n)| (*t, n.as_slice())).collect();
        let data = encode_host_events(now, &groups);
        self.broadcast(now, ChannelKind::Reliable, Payload::Binary(data), None);
    }

    fn send_client_update(&mut self, now: f64) {
        if !self.received_client_values {
            return;
        }
        let Some(host) = self.host_id.clone() else {
            return;
        };
        let since_change = now - self.last_state_change;
        let since_transmit = now - self.last_state_transmit;
        if !should_transmit(Bandwidth::Normal, since_change, since_transmit) {
            return;
        }

        self.local_state.resize(self.client_values.len(), 0.0);
        let data = encode_client_input(
            self.clock.host_time(now),
            &self.client_values,
            &self.local_state,
        );
        self.last_state_transmit = now;
        self.send_to(now, &host, ChannelKind::Unreliable, Payload::Binary(data));
    }

    // Client input

    pub fn set_client_state(&mut self, now: f64, tag: &str, value: f64) -> bool {
        if self.hosting || !self.in_room || !self.received_client_values {
            return false;
        }
        let Some(index) = self.client_value_index(tag) else {
            return false;
        };
        if self.local_state.len() <= index {
            self.local_state.resize(index + 1, 0.0);
        }
        if self.local_state[index] != value || self.last_state_change == f64::NEG_INFINITY {
            self.local_state[index] = value;
            self.last_state_change = now;
        }
        true
    }

    pub fn local_client_state(&self, tag: &str) -> Option<f64> {
        let index = self.client_value_index(tag)?;
        Some(self.local_state.get(index).copied().unwrap_or_default())
    }

    fn client_value_index(&self, tag: &str) -> Option<usize> {
        self.client_values.iter().position(|v| v.tag == tag)
    }

    pub fn client_state(&self, peer_id: &str, tag: &str) -> f64 {
        let (Some(peer), Some(index)) = (self.peers.get(peer_id), self.client_value_index(tag)) else {
            return 0.0;
        };
        peer.input
            .latest()
            .and_then(|u| u.data.get(index).copied())
            .unwrap_or_default()
    }

    pub fn interp_client_state(&self, now: f64, peer_id: &str, tag: &str, no_extrapolate: bool) -> f64 {
        let (Some(peer), Some(index)) = (self.peers.get(peer_id), self.client_value_index(tag)) else {
            return 0.0;
        };
        let mode = self.client_values[index].interp;
        let horizon = (!no_extrapolate).then_some(INPUT_EXTRAPOLATION_MS);
        peer.input
            .value_at(self.simulation_time(now), index, mode, horizon)
    }

    pub fn is_ready_for_input(&self) -> bool {
        self.in_room && (self.hosting || self.clock.has_samples())
    }

    // Objects

    pub fn object(&self, sid: &str) -> Option<&RegisteredObject> {
        self.registry.get(sid)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn override_nid(&mut self, sid: &str, id: InstanceId, nid: u16) -> Result<bool, SessionError> {
        Ok(self.registry.get_mut(sid)?.override_nid(id, nid))
    }

    pub fn remove_object_id(&mut self, id: InstanceId) {
        self.registry.remove_id(id);
    }

    pub fn instance_count(&self, sid: &str) -> usize {
        self.registry.get(sid).map_or(0, |o| o.instance_count())
    }

    pub fn instance_nids(&self, sid: &str) -> Vec<u16> {
        self.registry
            .get(sid)
            .map(|o| o.instances().map(|i| i.nid).collect())
            .unwrap_or_default()
    }

    pub fn instance_nid_at(&self, sid: &str, index: usize) -> Option<u16> {
        self.registry.get(sid)?.instances().nth(index).map(|i| i.nid)
    }

    pub fn instance_value(&self, now: f64, sid: &str, nid: u16, field: usize) -> Option<f64> {
        self.registry
            .get(sid)?
            .value_at(nid, field, self.simulation_time(now))
    }

    // Time

    pub fn host_time(&self, now: f64) -> f64 {
        if self.hosting {
            now
        } else {
            self.clock.host_time(now)
        }
    }

    pub fn simulation_time(&self, now: f64) -> f64 {
        if self.hosting {
            now - self.config.client_delay
        } else {
            self.clock.simulation_time(now)
        }
    }

    /// Host time at which input sent now is expected to take effect.
    pub fn host_input_arrival_time(&self, now: f64) -> f64 {
        if self.hosting {
            now
        } else {
            self.clock.input_arrival_time(now)
        }
    }

    pub fn clock(&self) -> &HostClock {
        &self.clock
    }

    // Queries

    pub fn is_in_room(&self) -> bool {
        self.in_room
    }

    pub fn is_host(&self) -> bool {
        self.in_room && self.hosting
    }

    pub fn my_id(&self) -> Option<&str> {
        self.my_id.as_deref()
    }

    pub fn host_id(&self) -> Option<&str> {
        self.host_id.as_deref()
    }

    pub fn peer_count(&self) -> usize {
        if self.in_room { self.peers.len() } else { 0 }
    }

    pub fn peers(&self) -> &PeerList {
        &self.peers
    }

    pub fn peer(&self, id: &str) -> Option<&Peer> {
        self.peers.get(id)
    }

    pub fn peer_by_nid(&self, nid: u16) -> Option<&Peer> {
        self.peers.by_nid(nid)
    }

    pub fn alias_from_id(&self, id: &str) -> &str {
        self.peers.get(id).map_or("", |p| p.alias.as_str())
    }

    pub fn stats(&self) -> &TrafficStats {
        &self.stats
    }

    pub fn delayed_frames(&self) -> usize {
        self.delayed.len()
    }

    pub fn pooled_buffers(&self) -> usize {
        self.pool.len()
    }
}
