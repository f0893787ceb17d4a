use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tether::signalling::{ClientMessage, SIGNALLING_SUBPROTOCOL};
use tether::{
    ChannelKind, CloseReason, LatencySimulation, MemoryHandle, MemoryTransport, PeerInfo,
    PeerRole, Session, SessionEvent, SignallingClient, SignallingEvent, TrafficStats,
};

use crate::config::LoopbackConfig;
use crate::events::{HarnessEvent, Node};
use crate::lobby::{Lobby, Outbox};
use crate::world::{Nothing, STEER, SpriteWorld, object_types, steer_value};

const GAME: &str = "tether-loopback";
const INSTANCE: &str = "default";
const ROOM: &str = "lobby";
const MAX_PUMP_ROUNDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Host,
    Peer(usize),
}

struct PeerNode {
    id: String,
    alias: String,
    session: Session,
    signalling: SignallingClient,
    /// Frames the host sent toward this peer.
    host_side: Option<MemoryHandle>,
    /// Frames this peer sent toward the host.
    peer_side: Option<MemoryHandle>,
    steer_phase: f64,
    destroyed: u64,
}

#[derive(Debug, Clone)]
pub struct HarnessStats {
    pub uptime_secs: u64,
    pub tick: u64,
    pub sim_time_ms: f64,
    pub instance_count: usize,
    pub open_peers: usize,
    /// Peers the host has confirmed to the lobby.
    pub confirmed_peers: usize,
    pub traffic: TrafficStats,
    pub latency: LatencySimulation,
    pub delayed_frames: usize,
}

#[derive(Debug, Clone)]
pub struct PeerRow {
    pub alias: String,
    pub id: String,
    pub nid: u16,
    pub in_room: bool,
    pub latency: f64,
    pub pdv: f64,
    pub instances: usize,
    pub sim_delay: f64,
    pub time_diff: f64,
    pub destroyed: u64,
}

/// One host and a handful of peers in a single process, joined through an
/// in-process lobby and linked by memory transports.
pub struct Harness {
    config: LoopbackConfig,
    lobby: Lobby,
    host: Session,
    host_signalling: SignallingClient,
    host_id: String,
    peers: Vec<PeerNode>,
    world: SpriteWorld,
    tick: u64,
    now_ms: f64,
    tick_duration: Duration,
    last_tick_time: Instant,
    accumulator: Duration,
    last_respawn: f64,
    running: Arc<AtomicBool>,
    start_time: Instant,
    pending_events: VecDeque<HarnessEvent>,
}

impl Harness {
    pub fn new(config: LoopbackConfig) -> anyhow::Result<Self> {
        let mut host = Session::new(config.session);
        for (sid, schema, bandwidth) in object_types() {
            host.register_object(sid, schema, bandwidth)?;
        }
        host.add_client_value(steer_value())?;
        host.set_latency_simulation(
            config.latency.latency_ms,
            config.latency.pdv_ms,
            config.latency.loss,
        );

        let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate.max(1) as f64);
        let world = SpriteWorld::new(config.sprites);

        let mut harness = Self {
            lobby: Lobby::new(),
            host,
            host_signalling: SignallingClient::new(),
            host_id: String::new(),
            peers: Vec::new(),
            world,
            tick: 0,
            now_ms: 0.0,
            tick_duration,
            last_tick_time: Instant::now(),
            accumulator: Duration::ZERO,
            last_respawn: 0.0,
            running: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
            pending_events: VecDeque::new(),
            config,
        };

        harness.host_signalling.on_open(SIGNALLING_SUBPROTOCOL);
        let (host_id, out) = harness.lobby.connect();
        harness.host_id = host_id;
        harness.route(out);

        for index in 0..harness.config.peers {
            harness.add_peer(index)?;
        }
        Ok(harness)
    }

    fn add_peer(&mut self, index: usize) -> anyhow::Result<()> {
        let mut session = Session::new(self.config.session);
        for (sid, schema, bandwidth) in object_types() {
            session.register_object(sid, schema, bandwidth)?;
        }
        let mut signalling = SignallingClient::new();
        signalling.on_open(SIGNALLING_SUBPROTOCOL);

        let (id, out) = self.lobby.connect();
        self.peers.push(PeerNode {
            id,
            alias: format!("peer{}", index + 1),
            session,
            signalling,
            host_side: None,
            peer_side: None,
            steer_phase: index as f64 * 0.7,
            destroyed: 0,
        });
        self.route(out);
        Ok(())
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = HarnessEvent> + '_ {
        self.pending_events.drain(..)
    }

    /// Runs until stopped or, when given, until `limit` has elapsed.
    pub fn run(&mut self, limit: Option<Duration>) {
        let mut last_report = Instant::now();
        while self.running.load(Ordering::SeqCst) {
            if limit.is_some_and(|l| self.start_time.elapsed() >= l) {
                break;
            }
            self.tick_once();
            for event in self.drain_events().collect::<Vec<_>>() {
                log_event(&event);
            }
            if last_report.elapsed() >= Duration::from_secs(1) {
                last_report = Instant::now();
                self.log_summary();
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.shutdown();
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let delta = now - self.last_tick_time;
        self.last_tick_time = now;
        self.accumulator += delta;

        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            self.step();
        }
    }

    fn step(&mut self) {
        self.tick += 1;
        let dt = self.tick_duration.as_secs_f64();
        self.now_ms += dt * 1000.0;
        let now = self.now_ms;

        let owners: Vec<String> = self
            .host
            .peers()
            .iter()
            .filter(|p| p.role == PeerRole::RemotePeer && p.is_open())
            .map(|p| p.id.clone())
            .collect();
        for owner in owners {
            let heading = self.host.interp_client_state(now, &owner, STEER, false);
            self.world.steer(&owner, heading as f32);
        }
        self.world.step(dt as f32);

        if self.config.respawn_secs > 0.0 && now - self.last_respawn >= self.config.respawn_secs * 1000.0 {
            self.last_respawn = now;
            self.world.respawn();
        }

        self.host.tick(now, dt, &self.world);
        for peer in &mut self.peers {
            let heading = (now / 1000.0 + peer.steer_phase).sin() * PI;
            peer.session
                .set_client_state(now, STEER, heading.rem_euclid(2.0 * PI));
            peer.session.tick(now, dt, &Nothing);
        }

        self.pump(now);
        self.collect_events();
    }

    /// Moves queued frames across every link until all are quiet.
    fn pump(&mut self, now: f64) {
        for _ in 0..MAX_PUMP_ROUNDS {
            let mut moved = false;
            for peer in &mut self.peers {
                if let Some(handle) = &peer.host_side {
                    for (channel, payload) in handle.drain() {
                        moved = true;
                        peer.session.receive(now, &self.host_id, channel, payload);
                    }
                }
                if let Some(handle) = &peer.peer_side {
                    for (channel, payload) in handle.drain() {
                        moved = true;
                        self.host.receive(now, &peer.id, channel, payload);
                    }
                }
            }
            if !moved {
                return;
            }
        }
        log::debug!("Links still busy after {} rounds", MAX_PUMP_ROUNDS);
    }

    fn collect_events(&mut self) {
        let host_events: Vec<SessionEvent> = self.host.drain_events().collect();
        for event in host_events {
            match event {
                SessionEvent::PeerOpen { id, nid, alias } => {
                    self.world.add_avatar(&id);
                    self.push(HarnessEvent::PeerOpened {
                        node: Node::Host,
                        alias,
                        nid,
                    });
                }
                SessionEvent::PeerClose { id, alias, reason } => {
                    self.world.remove_avatar(&id);
                    self.push(HarnessEvent::PeerClosed {
                        node: Node::Host,
                        alias,
                        reason,
                    });
                }
                SessionEvent::ConfirmPeer { id } => {
                    if let Some(message) = self.host_signalling.confirm_peer(&id) {
                        self.send_signalling(Target::Host, &message);
                    }
                    let alias = self.host.alias_from_id(&id).to_string();
                    self.push(HarnessEvent::Confirmed { alias });
                }
                SessionEvent::PeerError { kind, message, .. } => {
                    self.push(HarnessEvent::Error {
                        node: Node::Host,
                        kind,
                        message,
                    });
                }
                SessionEvent::RoomLeft { reason } => {
                    self.push(HarnessEvent::RoomLeft {
                        node: Node::Host,
                        reason,
                    });
                }
                _ => {}
            }
        }

        for index in 0..self.peers.len() {
            let events: Vec<SessionEvent> = self.peers[index].session.drain_events().collect();
            let node = Node::Peer(self.peers[index].alias.clone());
            for event in events {
                match event {
                    SessionEvent::PeerOpen { alias, nid, .. } => {
                        self.push(HarnessEvent::PeerOpened {
                            node: node.clone(),
                            alias,
                            nid,
                        });
                    }
                    SessionEvent::PeerClose { alias, reason, .. } => {
                        self.push(HarnessEvent::PeerClosed {
                            node: node.clone(),
                            alias,
                            reason,
                        });
                    }
                    SessionEvent::InstanceDestroyed { .. } => {
                        self.peers[index].destroyed += 1;
                    }
                    SessionEvent::PeerError { kind, message, .. } => {
                        self.push(HarnessEvent::Error {
                            node: node.clone(),
                            kind,
                            message,
                        });
                    }
                    SessionEvent::RoomLeft { reason } => {
                        let peer = &mut self.peers[index];
                        peer.host_side = None;
                        peer.peer_side = None;
                        if let Some(message) = peer.signalling.leave() {
                            self.send_signalling(Target::Peer(index), &message);
                        }
                        self.push(HarnessEvent::RoomLeft {
                            node: node.clone(),
                            reason,
                        });
                    }
                    _ => {}
                }
            }
        }
    }

    // Signalling

    fn target(&self, client_id: &str) -> Option<Target> {
        if client_id == self.host_id {
            return Some(Target::Host);
        }
        self.peers
            .iter()
            .position(|p| p.id == client_id)
            .map(Target::Peer)
    }

    fn send_signalling(&mut self, from: Target, message: &ClientMessage) {
        let from_id = match from {
            Target::Host => self.host_id.clone(),
            Target::Peer(i) => self.peers[i].id.clone(),
        };
        match message.to_text() {
            Ok(text) => {
                let out = self.lobby.handle_text(&from_id, &text);
                self.route(out);
            }
            Err(e) => log::error!("Failed to encode signalling message: {}", e),
        }
    }

    /// Delivers lobby replies, following up on each until nothing is left.
    fn route(&mut self, out: Outbox) {
        let mut queue: VecDeque<(String, String)> = out.into();
        while let Some((to, text)) = queue.pop_front() {
            let Some(target) = self.target(&to) else {
                continue;
            };
            let node = self.node(target);
            let client = match target {
                Target::Host => &mut self.host_signalling,
                Target::Peer(i) => &mut self.peers[i].signalling,
            };
            let event = match client.handle_text(&text) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    self.push(HarnessEvent::Signalling {
                        node,
                        text: e.to_string(),
                    });
                    continue;
                }
            };
            if let Some(reply) = self.on_signalling(target, event) {
                match reply.to_text() {
                    Ok(text) => queue.extend(self.lobby.handle_text(&to, &text)),
                    Err(e) => log::error!("Failed to encode signalling message: {}", e),
                }
            }
        }
    }

    fn on_signalling(&mut self, target: Target, event: SignallingEvent) -> Option<ClientMessage> {
        let now = self.now_ms;
        let max_clients = self.config.peers as u32 + 1;
        match (target, event) {
            (Target::Host, SignallingEvent::Welcome) => self.host_signalling.login("host"),
            (Target::Peer(i), SignallingEvent::Welcome) => {
                let alias = self.peers[i].alias.clone();
                self.peers[i].signalling.login(&alias)
            }
            (Target::Host, SignallingEvent::LoggedIn { .. }) => {
                self.host_signalling.join(GAME, INSTANCE, ROOM, max_clients)
            }
            (Target::Peer(i), SignallingEvent::LoggedIn { .. }) => {
                self.peers[i].signalling.join(GAME, INSTANCE, ROOM, max_clients)
            }
            (Target::Host, SignallingEvent::Joined { me, host }) => {
                self.host.join_room(now, me, host);
                None
            }
            (Target::Peer(i), SignallingEvent::Joined { me, host }) => {
                self.peers[i].session.join_room(now, me, host);
                None
            }
            (Target::Host, SignallingEvent::PeerJoined(info)) => {
                self.link(now, info);
                None
            }
            (Target::Host, SignallingEvent::PeerQuit { id }) => {
                if let Err(e) = self.host.peer_quit(now, &id) {
                    log::warn!("Peer quit for '{}' ignored: {}", id, e);
                }
                None
            }
            (Target::Peer(i), SignallingEvent::Kicked) => {
                self.peers[i].session.kicked(now);
                None
            }
            (node, SignallingEvent::Error(details)) => {
                let node = self.node(node);
                self.push(HarnessEvent::Signalling {
                    node,
                    text: details,
                });
                None
            }
            _ => None,
        }
    }

    /// Stands in for transport negotiation: wires a memory link between
    /// the host and the announced peer and opens every channel.
    fn link(&mut self, now: f64, info: PeerInfo) {
        let Some(index) = self.peers.iter().position(|p| p.id == info.id) else {
            log::warn!("Lobby announced unknown peer '{}'", info.id);
            return;
        };
        if let Err(e) = self.host.peer_joined(now, info.clone()) {
            log::error!("Could not admit '{}': {}", info.alias, e);
            return;
        }

        let (to_peer, host_side) = MemoryTransport::new();
        let (to_host, peer_side) = MemoryTransport::new();
        let peer = &mut self.peers[index];
        if let Err(e) = self.host.attach_transport(&info.id, Box::new(to_peer)) {
            log::error!("{}", e);
            return;
        }
        if let Err(e) = peer.session.attach_transport(&self.host_id, Box::new(to_host)) {
            log::error!("{}", e);
            return;
        }
        peer.host_side = Some(host_side);
        peer.peer_side = Some(peer_side);

        for channel in ChannelKind::ALL {
            self.host.channel_open(now, &info.id, channel);
        }
        for channel in ChannelKind::ALL {
            peer.session.channel_open(now, &self.host_id, channel);
        }
    }

    fn node(&self, target: Target) -> Node {
        match target {
            Target::Host => Node::Host,
            Target::Peer(i) => Node::Peer(self.peers[i].alias.clone()),
        }
    }

    fn push(&mut self, event: HarnessEvent) {
        self.pending_events.push_back(event);
    }

    // Controls

    pub fn kick_peer(&mut self, index: usize) {
        let Some(peer) = self.peers.get(index) else {
            return;
        };
        let id = peer.id.clone();
        self.host
            .remove_peer(self.now_ms, &id, CloseReason::Remote("kicked".to_string()));
    }

    pub fn set_latency(&mut self, latency: LatencySimulation) {
        self.config.latency = latency;
        self.host
            .set_latency_simulation(latency.latency_ms, latency.pdv_ms, latency.loss);
    }

    pub fn latency(&self) -> LatencySimulation {
        self.host.latency_simulation()
    }

    pub fn shutdown(&mut self) {
        if let Some(message) = self.host_signalling.leave() {
            self.send_signalling(Target::Host, &message);
        }
        self.host.leave_room(self.now_ms);
        self.pump(self.now_ms);
        self.collect_events();
    }

    // Reporting

    pub fn stats(&self) -> HarnessStats {
        HarnessStats {
            uptime_secs: self.start_time.elapsed().as_secs(),
            tick: self.tick,
            sim_time_ms: self.now_ms,
            instance_count: self.world.instance_count(),
            open_peers: self
                .host
                .peers()
                .iter()
                .filter(|p| p.role != PeerRole::LocalIdentity && p.is_open())
                .count(),
            confirmed_peers: self
                .lobby
                .room(&format!("{GAME}/{INSTANCE}/{ROOM}"))
                .map_or(0, |r| r.confirmed.len()),
            traffic: self.host.stats().clone(),
            latency: self.host.latency_simulation(),
            delayed_frames: self.host.delayed_frames(),
        }
    }

    pub fn peer_rows(&self) -> Vec<PeerRow> {
        self.peers
            .iter()
            .map(|p| {
                let link = p.session.host_id().and_then(|h| p.session.peer(h));
                let me = p.session.my_id().and_then(|id| p.session.peer(id));
                PeerRow {
                    alias: p.alias.clone(),
                    id: p.id.clone(),
                    nid: me.map_or(0, |m| m.nid),
                    in_room: p.session.is_in_room(),
                    latency: link.map_or(0.0, |l| l.latency()),
                    pdv: link.map_or(0.0, |l| l.pdv()),
                    instances: p
                        .session
                        .registry()
                        .iter()
                        .map(|o| o.instance_count())
                        .sum(),
                    sim_delay: p.session.clock().sim_delay(),
                    time_diff: p.session.clock().time_diff(),
                    destroyed: p.destroyed,
                }
            })
            .collect()
    }

    fn log_summary(&self) {
        let stats = self.stats();
        log::info!(
            "tick {} | {} peers open | {} instances | out {}/s ({}B/s) in {}/s",
            stats.tick,
            stats.open_peers,
            stats.instance_count,
            stats.traffic.outbound_per_sec,
            stats.traffic.outbound_bytes_per_sec,
            stats.traffic.inbound_per_sec,
        );
        for row in self.peer_rows() {
            log::info!(
                "  {} nid {} latency {:.1}ms pdv {:.1}ms sees {} instances, sim delay {:.1}ms",
                row.alias,
                row.nid,
                row.latency,
                row.pdv,
                row.instances,
                row.sim_delay
            );
        }
    }
}

pub fn log_event(event: &HarnessEvent) {
    match event {
        HarnessEvent::PeerOpened { node, alias, nid } => {
            log::info!("[{}] {} open (nid {})", node, alias, nid)
        }
        HarnessEvent::PeerClosed {
            node,
            alias,
            reason,
        } => log::info!("[{}] {} closed: {}", node, alias, reason),
        HarnessEvent::RoomLeft { node, reason } => log::info!("[{}] left room: {}", node, reason),
        HarnessEvent::Confirmed { alias } => log::debug!("[host] confirmed {}", alias),
        HarnessEvent::Signalling { node, text } => log::warn!("[{}] signalling: {}", node, text),
        HarnessEvent::Error {
            node,
            kind,
            message,
        } => log::error!("[{}] {:?}: {}", node, kind, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config(peers: usize) -> LoopbackConfig {
        LoopbackConfig {
            peers,
            sprites: 4,
            ..LoopbackConfig::default()
        }
    }

    #[test]
    fn peers_join_through_the_lobby() {
        let mut harness = Harness::new(quick_config(2)).unwrap();
        for _ in 0..30 {
            harness.step();
        }

        let stats = harness.stats();
        assert_eq!(stats.open_peers, 2);
        assert_eq!(stats.confirmed_peers, 2);
        let rows = harness.peer_rows();
        assert!(rows.iter().all(|r| r.in_room));
        let nids: Vec<u16> = rows.iter().map(|r| r.nid).collect();
        assert_eq!(nids, vec![2, 3]);
        // Four sprites plus one avatar per peer.
        assert!(rows.iter().all(|r| r.instances == 6));

        let confirmed = harness
            .drain_events()
            .filter(|e| matches!(e, HarnessEvent::Confirmed { .. }))
            .count();
        assert_eq!(confirmed, 2);
    }

    #[test]
    fn kicked_peer_leaves_the_room() {
        let mut harness = Harness::new(quick_config(1)).unwrap();
        for _ in 0..10 {
            harness.step();
        }
        harness.kick_peer(0);
        harness.step();

        assert_eq!(harness.stats().open_peers, 0);
        assert!(!harness.peer_rows()[0].in_room);
        assert!(harness.world.avatars.is_empty());
    }
}
