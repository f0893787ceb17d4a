//! In-process stand-in for the signalling server.
//!
//! Speaks the same JSON messages a real server would, minus transport
//! negotiation: links between sessions are wired directly by the harness.

use std::collections::HashMap;

use tether::signalling::{
    ClientMessage, DEFAULT_ICE_SERVERS, SIGNALLING_PROTOCOL_REVISION, ServerMessage,
};

#[derive(Debug)]
struct Client {
    alias: Option<String>,
    room: Option<String>,
}

#[derive(Debug)]
pub struct Room {
    pub host: String,
    pub members: Vec<String>,
    pub max_clients: u32,
    pub confirmed: Vec<String>,
}

impl Room {
    pub fn is_full(&self) -> bool {
        self.max_clients > 0 && self.members.len() >= self.max_clients as usize
    }
}

/// Outbound text frames, addressed by client id.
pub type Outbox = Vec<(String, String)>;

#[derive(Debug, Default)]
pub struct Lobby {
    clients: HashMap<String, Client>,
    rooms: HashMap<String, Room>,
    next_client: u32,
}

impl Lobby {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection and returns its id with the greeting.
    pub fn connect(&mut self) -> (String, Outbox) {
        self.next_client += 1;
        let id = format!("c{}", self.next_client);
        self.clients.insert(
            id.clone(),
            Client {
                alias: None,
                room: None,
            },
        );
        let welcome = ServerMessage::Welcome {
            protocolrev: SIGNALLING_PROTOCOL_REVISION,
            version: serde_json::json!(env!("CARGO_PKG_VERSION")),
            name: "loopback".to_string(),
            operator: "local".to_string(),
            motd: "in-process signalling".to_string(),
            ice_servers: vec![DEFAULT_ICE_SERVERS[0].to_string()],
            clientid: id.clone(),
        };
        let mut out = Outbox::new();
        send(&mut out, &id, &welcome);
        (id, out)
    }

    pub fn handle_text(&mut self, from: &str, text: &str) -> Outbox {
        let mut out = Outbox::new();
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle(from, message, &mut out),
            Err(e) => {
                log::warn!("Lobby: bad message from {}: {}", from, e);
                send(
                    &mut out,
                    from,
                    &ServerMessage::Error {
                        details: e.to_string(),
                    },
                );
            }
        }
        out
    }

    fn handle(&mut self, from: &str, message: ClientMessage, out: &mut Outbox) {
        let Some(client) = self.clients.get_mut(from) else {
            return;
        };
        match message {
            ClientMessage::Login { alias, .. } => {
                client.alias = Some(alias.clone());
                send(out, from, &ServerMessage::LoginOk { alias });
            }
            ClientMessage::Join {
                game,
                instance,
                room,
                max_clients,
            } => {
                let key = format!("{game}/{instance}/{room}");
                let alias = client.alias.clone().unwrap_or_default();

                let room_state = self.rooms.entry(key.clone()).or_insert_with(|| Room {
                    host: from.to_string(),
                    members: Vec::new(),
                    max_clients,
                    confirmed: Vec::new(),
                });
                if room_state.is_full() {
                    send(
                        out,
                        from,
                        &ServerMessage::Error {
                            details: "room is full".to_string(),
                        },
                    );
                    return;
                }
                room_state.members.push(from.to_string());
                let host = room_state.host.clone();
                client.room = Some(key);

                let hosting = host == from;
                let hostalias = self
                    .clients
                    .get(&host)
                    .and_then(|c| c.alias.clone())
                    .unwrap_or_default();
                send(
                    out,
                    from,
                    &ServerMessage::JoinOk {
                        game,
                        instance,
                        room,
                        host: hosting,
                        hostid: host.clone(),
                        hostalias,
                    },
                );
                if !hosting {
                    send(
                        out,
                        &host,
                        &ServerMessage::PeerJoined {
                            peerid: from.to_string(),
                            peeralias: alias,
                        },
                    );
                }
            }
            ClientMessage::Leave => {
                let key = client.room.take();
                send(out, from, &ServerMessage::LeaveOk);
                if let Some(key) = key {
                    self.leave(&key, from, out);
                }
            }
            ClientMessage::ConfirmPeer { id } => {
                if let Some(room) = client.room.as_ref().and_then(|k| self.rooms.get_mut(k)) {
                    log::debug!("Lobby: {} confirmed {}", from, id);
                    room.confirmed.push(id);
                }
            }
            ClientMessage::ListInstances { game } => {
                let prefix = format!("{game}/");
                let list: Vec<serde_json::Value> = self
                    .rooms
                    .iter()
                    .filter(|(k, _)| k.starts_with(&prefix))
                    .map(|(k, r)| serde_json::json!({ "name": k, "peercount": r.members.len() }))
                    .collect();
                send(
                    out,
                    from,
                    &ServerMessage::InstanceList {
                        list: serde_json::Value::Array(list),
                    },
                );
            }
            ClientMessage::IceCandidate { toclientid, .. }
            | ClientMessage::Offer { toclientid, .. }
            | ClientMessage::Answer { toclientid, .. } => {
                log::debug!("Lobby: dropping relay from {} to {}", from, toclientid);
            }
        }
    }

    fn leave(&mut self, key: &str, who: &str, out: &mut Outbox) {
        let Some(room) = self.rooms.get_mut(key) else {
            return;
        };
        room.members.retain(|m| m != who);

        if room.host == who {
            // Host gone: everyone else is kicked and the room closes.
            let members = std::mem::take(&mut room.members);
            self.rooms.remove(key);
            for member in members {
                if let Some(client) = self.clients.get_mut(&member) {
                    client.room = None;
                }
                send(out, &member, &ServerMessage::Kicked);
            }
        } else {
            let host = room.host.clone();
            send(
                out,
                &host,
                &ServerMessage::PeerQuit {
                    id: who.to_string(),
                },
            );
        }
    }

    pub fn room(&self, key: &str) -> Option<&Room> {
        self.rooms.get(key)
    }
}

fn send(out: &mut Outbox, to: &str, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(text) => out.push((to.to_string(), text)),
        Err(e) => log::error!("Lobby: failed to encode reply: {}", e),
    }
}
