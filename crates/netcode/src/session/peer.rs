use std::collections::HashMap;

use crate::net::clock::PingTracker;
use crate::net::transport::{ChannelFlags, ChannelKind, Payload, Transport, TransportError};
use crate::snapshot::UpdateBuffer;

use super::events::CloseReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Host,
    RemotePeer,
    LocalIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Open,
    Closed(CloseReason),
}

pub struct Peer {
    pub id: String,
    pub alias: String,
    pub nid: u16,
    pub role: PeerRole,
    transport: Option<Box<dyn Transport>>,
    pub(crate) open_channels: ChannelFlags,
    pub(crate) fired_open: bool,
    pub(crate) closed: Option<CloseReason>,
    pub(crate) confirmed: bool,
    pub(crate) error_count: u32,
    pub(crate) connect_time: Option<f64>,
    pub(crate) last_heard_from: f64,
    pub(crate) ping: PingTracker,
    pub(crate) input: UpdateBuffer,
}

impl Peer {
    pub fn new(id: impl Into<String>, alias: impl Into<String>, role: PeerRole) -> Self {
        Self {
            id: id.into(),
            alias: alias.into(),
            nid: 0,
            role,
            transport: None,
            open_channels: ChannelFlags::empty(),
            fired_open: false,
            closed: None,
            confirmed: false,
            error_count: 0,
            connect_time: None,
            last_heard_from: 0.0,
            ping: PingTracker::new(),
            input: UpdateBuffer::new(),
        }
    }

    pub fn state(&self) -> PeerState {
        match &self.closed {
            Some(reason) => PeerState::Closed(reason.clone()),
            None if self.fired_open => PeerState::Open,
            None => PeerState::Connecting,
        }
    }

    pub fn is_open(&self) -> bool {
        self.fired_open && self.closed.is_none()
    }

    pub fn is_removed(&self) -> bool {
        self.closed.is_some()
    }

    pub fn latency(&self) -> f64 {
        self.ping.latency()
    }

    pub fn pdv(&self) -> f64 {
        self.ping.pdv()
    }

    pub fn last_heard_from(&self) -> f64 {
        self.last_heard_from
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn input(&self) -> &UpdateBuffer {
        &self.input
    }

    pub(crate) fn attach(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
    }

    pub(crate) fn mark_channel_open(&mut self, channel: ChannelKind) -> bool {
        self.open_channels.insert(channel.flag());
        !self.fired_open && self.closed.is_none() && self.open_channels.is_all()
    }

    /// Hands a frame to the transport. Channels that are not open yet, or
    /// a peer without a transport, swallow the frame and yield `false`.
    pub(crate) fn transmit(
        &mut self,
        channel: ChannelKind,
        payload: &Payload,
    ) -> Result<bool, TransportError> {
        if !self.open_channels.contains(channel.flag()) {
            return Ok(false);
        }
        match self.transport.as_mut() {
            Some(transport) => transport.send(channel, payload).map(|()| true),
            None => Ok(false),
        }
    }

    pub(crate) fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.open_channels = ChannelFlags::empty();
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("nid", &self.nid)
            .field("role", &self.role)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Peers in join order with an id index.
///
/// Code that may remove peers while walking the list iterates over
/// [`PeerList::ids`], a detached copy.
#[derive(Debug, Default)]
pub struct PeerList {
    order: Vec<String>,
    by_id: HashMap<String, Peer>,
}

impl PeerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, peer: Peer) -> Option<Peer> {
        let id = peer.id.clone();
        let old = self.by_id.insert(id.clone(), peer);
        if old.is_none() {
            self.order.push(id);
        }
        old
    }

    pub fn remove(&mut self, id: &str) -> Option<Peer> {
        let peer = self.by_id.remove(id)?;
        self.order.retain(|p| p != id);
        Some(peer)
    }

    pub fn get(&self, id: &str) -> Option<&Peer> {
        self.by_id.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Peer> {
        self.by_id.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn by_nid(&self, nid: u16) -> Option<&Peer> {
        self.iter().find(|p| p.nid == nid)
    }

    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Peer> {
        self.by_id.values_mut()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::memory::MemoryTransport;

    #[test]
    fn opens_once_all_channels_are_up() {
        let mut peer = Peer::new("a", "alice", PeerRole::RemotePeer);
        assert_eq!(peer.state(), PeerState::Connecting);
        assert!(!peer.mark_channel_open(ChannelKind::Ordered));
        assert!(!peer.mark_channel_open(ChannelKind::Unreliable));
        assert!(peer.mark_channel_open(ChannelKind::Reliable));

        peer.fired_open = true;
        assert!(!peer.mark_channel_open(ChannelKind::Reliable));
        assert_eq!(peer.state(), PeerState::Open);

        peer.closed = Some(CloseReason::Timeout);
        assert_eq!(peer.state(), PeerState::Closed(CloseReason::Timeout));
        assert!(!peer.is_open());
    }

    #[test]
    fn frames_on_closed_channels_are_swallowed() {
        let (link, handle) = MemoryTransport::new();
        let mut peer = Peer::new("a", "alice", PeerRole::RemotePeer);
        peer.attach(Box::new(link));

        let sent = peer
            .transmit(ChannelKind::Ordered, &Payload::Text("early".into()))
            .unwrap();
        assert!(!sent);
        assert_eq!(handle.pending(), 0);

        peer.mark_channel_open(ChannelKind::Ordered);
        let sent = peer
            .transmit(ChannelKind::Ordered, &Payload::Text("hello".into()))
            .unwrap();
        assert!(sent);
        assert_eq!(handle.texts(), vec!["hello".to_string()]);

        peer.release_transport();
        assert!(handle.is_closed());
        assert!(!peer.has_transport());
    }

    #[test]
    fn list_keeps_join_order_and_index_in_step() {
        let mut list = PeerList::new();
        list.insert(Peer::new("a", "alice", PeerRole::LocalIdentity));
        list.insert(Peer::new("b", "bob", PeerRole::RemotePeer));
        list.insert(Peer::new("c", "carol", PeerRole::RemotePeer));

        let snapshot = list.ids();
        assert!(list.remove("b").is_some());
        assert!(list.remove("b").is_none());
        assert_eq!(snapshot, vec!["a", "b", "c"]);
        assert_eq!(list.ids(), vec!["a", "c"]);
        assert!(!list.contains("b"));

        let names: Vec<&str> = list.iter().map(|p| p.alias.as_str()).collect();
        assert_eq!(names, vec!["alice", "carol"]);
    }

    #[test]
    fn lookup_by_nid() {
        let mut list = PeerList::new();
        let mut peer = Peer::new("b", "bob", PeerRole::RemotePeer);
        peer.nid = 7;
        list.insert(peer);
        assert_eq!(list.by_nid(7).map(|p| p.id.as_str()), Some("b"));
        assert!(list.by_nid(8).is_none());
    }
}
