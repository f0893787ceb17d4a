use crate::net::control::{ControlError, ControlMessage, TextMessage, Welcome, format_pong, parse_text};
use crate::net::protocol::{
    ErrorKind, HostMessage, ObjectFlags, WireError, decode_client_input, decode_host_message,
};
use crate::net::simulator::{DelayedFrame, Direction};
use crate::net::transport::{ChannelKind, Payload};

use super::{CloseReason, INPUT_WINDOW_MS, Peer, PeerRole, Session, SessionEvent};

impl Session {
    pub fn receive(&mut self, now: f64, id: &str, channel: ChannelKind, payload: Payload) {
        if self.latency_sim.should_drop(channel, &mut self.rng) {
            return;
        }
        if !self.latency_sim.is_delaying() {
            self.dispatch(now, id, channel, payload);
            return;
        }
        let delay = self.latency_sim.delay_ms(channel, &mut self.rng);
        self.delayed.push(
            now + delay,
            DelayedFrame {
                peer_id: id.to_string(),
                channel,
                payload,
                direction: Direction::Inbound,
            },
        );
    }

    pub(super) fn dispatch(&mut self, now: f64, id: &str, channel: ChannelKind, payload: Payload) {
        let Some(peer) = self.peers.get_mut(id) else {
            return;
        };
        if peer.is_removed() {
            return;
        }
        peer.last_heard_from = now;
        self.stats.record_inbound(payload.len());

        match payload {
            Payload::Text(text) => {
                if let Err(e) = self.on_text(now, id, &text) {
                    log::debug!("Offending message from '{}': {}", id, text);
                    self.peer_error(now, id, e.kind(), e.to_string());
                }
            }
            Payload::Binary(data) => {
                if let Err(e) = self.on_binary(now, id, channel, &data) {
                    self.peer_error(now, id, e.kind(), e.to_string());
                }
            }
        }
    }

    fn peer_error(&mut self, now: f64, id: &str, kind: ErrorKind, message: String) {
        if self.hosting {
            log::error!("Bad data from peer '{}', kicking: {}", id, message);
        } else {
            log::error!("Bad data from peer '{}': {}", id, message);
        }
        self.pending_events.push_back(SessionEvent::PeerError {
            id: id.to_string(),
            kind,
            message,
        });
        if self.hosting {
            self.remove_peer(now, id, CloseReason::DataError);
        }
    }

    fn on_text(&mut self, now: f64, id: &str, text: &str) -> Result<(), ControlError> {
        let Some(message) = parse_text(text)? else {
            return Ok(());
        };
        match message {
            TextMessage::Ping(echo) => {
                let host_time = self.hosting.then_some(now);
                let pong = format_pong(&echo, host_time);
                self.send_to(now, id, ChannelKind::Unreliable, Payload::Text(pong));
            }
            TextMessage::Pong { id: ping_id, host_time } => {
                self.on_pong(now, id, ping_id, host_time);
            }
            TextMessage::Control(control) => self.on_control(now, id, control),
            TextMessage::User(message) => {
                self.pending_events.push_back(SessionEvent::PeerMessage {
                    id: id.to_string(),
                    message,
                });
            }
        }
        Ok(())
    }

    fn on_pong(&mut self, now: f64, id: &str, ping_id: u32, host_time: Option<f64>) {
        let Some(peer) = self.peers.get_mut(id) else {
            return;
        };
        let Some(last_latency) = peer.ping.on_pong(ping_id, now) else {
            return;
        };
        if self.hosting {
            return;
        }
        let latency = peer.ping.latency();
        match host_time {
            Some(t) if t.is_finite() => self.clock.add_host_time(t, now, last_latency, latency),
            _ => log::warn!("Pong from '{}' carried no usable host time", id),
        }
    }

    fn on_control(&mut self, now: f64, from: &str, message: ControlMessage) {
        match message {
            ControlMessage::Disconnect { reason } => {
                self.remove_peer(now, from, CloseReason::from_wire(&reason));
            }
            ControlMessage::Welcome(welcome) if !self.hosting => self.on_welcome(welcome),
            ControlMessage::PeerJoined { id, nid, alias } if !self.hosting => {
                if self.peers.contains(&id) {
                    return;
                }
                // Known through the host only; no direct link.
                let mut peer = Peer::new(id.clone(), alias.clone(), PeerRole::RemotePeer);
                peer.nid = nid;
                peer.fired_open = true;
                self.peers.insert(peer);
                self.pending_events
                    .push_back(SessionEvent::PeerOpen { id, nid, alias });
            }
            ControlMessage::PeerLeft { id, reason, .. } if !self.hosting => {
                self.remove_peer(now, &id, CloseReason::from_wire(&reason));
            }
            other => {
                log::debug!("Ignoring {:?} from peer '{}'", other, from);
            }
        }
    }

    fn on_welcome(&mut self, welcome: Welcome) {
        if let Some(host) = self.host_id.clone().and_then(|id| self.peers.get_mut(&id)) {
            host.nid = welcome.host_nid;
        }
        if let Some(me) = self.my_id.clone().and_then(|id| self.peers.get_mut(&id)) {
            me.nid = welcome.nid;
        }

        self.config.client_delay = welcome.client_delay;
        self.config.peer_update_rate = welcome.update_rate;
        self.clock.set_client_delay(welcome.client_delay);

        for object in self.registry.iter() {
            if !welcome.objs.contains_key(object.sid()) {
                log::warn!(
                    "Could not map object '{}': host did not send a NID for it",
                    object.sid()
                );
            }
        }
        self.registry.map_from_host(&welcome.objs, &mut self.pool);
        self.reported_unknown_types.clear();

        self.client_values = welcome.client_values;
        self.local_state.resize(self.client_values.len(), 0.0);
        self.received_client_values = true;
        log::info!(
            "Welcomed with NID {}, {} object types, {} input values",
            welcome.nid,
            welcome.objs.len(),
            self.client_values.len()
        );
    }

    fn on_binary(&mut self, now: f64, id: &str, channel: ChannelKind, data: &[u8]) -> Result<(), WireError> {
        if !self.hosting {
            return self.on_host_message(data);
        }

        self.on_client_input(now, id, data)?;

        if channel == ChannelKind::Unreliable {
            if let Some(peer) = self.peers.get_mut(id) {
                if !peer.confirmed {
                    peer.confirmed = true;
                    self.pending_events
                        .push_back(SessionEvent::ConfirmPeer { id: id.to_string() });
                }
            }
        }
        Ok(())
    }

    fn on_client_input(&mut self, now: f64, id: &str, data: &[u8]) -> Result<(), WireError> {
        let input = decode_client_input(data, &self.client_values, &mut self.pool)?;
        let Some(peer) = self.peers.get_mut(id) else {
            self.pool.release(input.values);
            return Ok(());
        };

        // Stamped with the sender's estimate of host time; it arrives one
        // latency later.
        let timestamp = input.timestamp + peer.ping.latency();
        if (timestamp - now).abs() >= INPUT_WINDOW_MS {
            log::debug!("Dropping input from '{}' stamped {:.0}ms off", id, timestamp - now);
            self.pool.release(input.values);
            return Ok(());
        }
        peer.input.add(timestamp, input.values, &mut self.pool);
        Ok(())
    }

    fn on_host_message(&mut self, data: &[u8]) -> Result<(), WireError> {
        match decode_host_message(data, &self.registry, &mut self.pool)? {
            HostMessage::Update(update) => {
                for type_nid in update.unknown_types {
                    self.report_unknown_type(type_nid);
                }
                for object in update.objects {
                    let Some(registered) = self.registry.by_nid_mut(object.type_nid) else {
                        continue;
                    };
                    if object.flags.contains(ObjectFlags::OVERRIDDEN_NIDS) {
                        registered.mark_overridden();
                    }
                    for instance in object.instances {
                        registered.apply_update(
                            instance.nid,
                            update.timestamp,
                            instance.values,
                            &mut self.pool,
                        );
                    }
                }
            }
            HostMessage::Events(events) => {
                for (type_nid, nids) in events.destroyed {
                    let Some(registered) = self.registry.by_nid_mut(type_nid) else {
                        self.report_unknown_type(type_nid);
                        continue;
                    };
                    // Types with externally assigned NIDs are torn down by
                    // their owner's peer-left notice instead.
                    if registered.has_overridden_nids() {
                        continue;
                    }
                    let object = registered.sid().to_string();
                    for nid in nids {
                        self.pending_events.push_back(SessionEvent::InstanceDestroyed {
                            object: object.clone(),
                            nid,
                            timestamp: events.timestamp,
                        });
                        registered.destroy(nid, &mut self.pool);
                    }
                }
            }
        }
        Ok(())
    }

    fn report_unknown_type(&mut self, type_nid: u16) {
        if !self.reported_unknown_types.insert(type_nid) {
            return;
        }
        let message = format!("no object type for NID {}", type_nid);
        log::warn!("Skipping update: {}", message);
        self.pending_events.push_back(SessionEvent::PeerError {
            id: self.host_id.clone().unwrap_or_default(),
            kind: ErrorKind::Schema,
            message,
        });
    }
}
