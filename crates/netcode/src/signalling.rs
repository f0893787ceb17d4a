use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::PeerInfo;

pub const SIGNALLING_PROTOCOL_REVISION: u32 = 1;
pub const SIGNALLING_SUBPROTOCOL: &str = "c2multiplayer";

pub const DEFAULT_ICE_SERVERS: [&str; 6] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
    "stun:stun3.l.google.com:19302",
    "stun:stun4.l.google.com:19302",
    "stun:23.21.150.121",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "kebab-case")]
pub enum ServerMessage {
    Welcome {
        protocolrev: u32,
        #[serde(default)]
        version: Value,
        #[serde(default)]
        name: String,
        #[serde(default)]
        operator: String,
        #[serde(default)]
        motd: String,
        #[serde(default)]
        ice_servers: Vec<String>,
        clientid: String,
    },
    LoginOk {
        alias: String,
    },
    JoinOk {
        game: String,
        instance: String,
        room: String,
        host: bool,
        #[serde(default)]
        hostid: String,
        #[serde(default)]
        hostalias: String,
    },
    LeaveOk,
    Kicked,
    PeerJoined {
        peerid: String,
        peeralias: String,
    },
    PeerQuit {
        id: String,
    },
    #[serde(rename = "icecandidate")]
    IceCandidate {
        from: String,
        icecandidate: Value,
    },
    Offer {
        from: String,
        offer: Value,
    },
    Answer {
        from: String,
        answer: Value,
    },
    InstanceList {
        list: Value,
    },
    Error {
        #[serde(default)]
        details: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "kebab-case")]
pub enum ClientMessage {
    Login {
        protocolrev: u32,
        alias: String,
    },
    Join {
        game: String,
        instance: String,
        room: String,
        max_clients: u32,
    },
    Leave,
    ConfirmPeer {
        id: String,
    },
    ListInstances {
        game: String,
    },
    #[serde(rename = "icecandidate")]
    IceCandidate {
        toclientid: String,
        icecandidate: Value,
    },
    Offer {
        toclientid: String,
        offer: Value,
    },
    Answer {
        toclientid: String,
        answer: Value,
    },
}

impl ClientMessage {
    pub fn to_text(&self) -> Result<String, SignallingError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignallingError {
    #[error("malformed signalling message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("signalling server protocol revision {0} not supported")]
    UnsupportedRevision(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    IceCandidate,
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignallingEvent {
    Welcome,
    LoggedIn {
        alias: String,
    },
    /// Room joined. `host` is `None` when we were made host.
    Joined {
        me: PeerInfo,
        host: Option<PeerInfo>,
    },
    Left,
    Kicked,
    PeerJoined(PeerInfo),
    PeerQuit {
        id: String,
    },
    Relay {
        kind: RelayKind,
        from: String,
        payload: Value,
    },
    InstanceList(Value),
    Error(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    pub protocol_revision: u32,
    pub version: Value,
    pub name: String,
    pub operator: String,
    pub motd: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub game: String,
    pub instance: String,
    pub room: String,
    pub host: bool,
}

#[derive(Debug, Clone)]
pub struct SignallingClient {
    connected: bool,
    logged_in: bool,
    server: Option<ServerInfo>,
    my_id: String,
    my_alias: String,
    room: Option<RoomInfo>,
    ice_servers: Vec<String>,
}

impl Default for SignallingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SignallingClient {
    pub fn new() -> Self {
        Self {
            connected: false,
            logged_in: false,
            server: None,
            my_id: String::new(),
            my_alias: String::new(),
            room: None,
            ice_servers: DEFAULT_ICE_SERVERS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn on_open(&mut self, subprotocol: &str) -> bool {
        if !subprotocol.contains(SIGNALLING_SUBPROTOCOL) {
            log::error!("Signalling server does not speak '{}'", SIGNALLING_SUBPROTOCOL);
            return false;
        }
        self.connected = true;
        true
    }

    pub fn on_close(&mut self) {
        self.connected = false;
        self.logged_in = false;
    }

    pub fn handle_text(&mut self, text: &str) -> Result<Option<SignallingEvent>, SignallingError> {
        let message: ServerMessage = serde_json::from_str(text)?;
        self.handle(message)
    }

    pub fn handle(&mut self, message: ServerMessage) -> Result<Option<SignallingEvent>, SignallingError> {
        let event = match message {
            ServerMessage::Welcome {
                protocolrev,
                version,
                name,
                operator,
                motd,
                ice_servers,
                clientid,
            } => {
                if !(1..=SIGNALLING_PROTOCOL_REVISION).contains(&protocolrev) {
                    self.on_close();
                    return Err(SignallingError::UnsupportedRevision(protocolrev));
                }
                self.my_id = clientid;
                self.server = Some(ServerInfo {
                    protocol_revision: protocolrev,
                    version,
                    name,
                    operator,
                    motd,
                });
                self.merge_ice_servers(ice_servers);
                Some(SignallingEvent::Welcome)
            }
            ServerMessage::LoginOk { alias } => {
                self.my_alias = alias.clone();
                self.logged_in = true;
                Some(SignallingEvent::LoggedIn { alias })
            }
            ServerMessage::JoinOk {
                game,
                instance,
                room,
                host,
                hostid,
                hostalias,
            } => {
                self.room = Some(RoomInfo {
                    game,
                    instance,
                    room,
                    host,
                });
                let me = PeerInfo::new(self.my_id.clone(), self.my_alias.clone());
                let host = (!host).then(|| PeerInfo::new(hostid, hostalias));
                Some(SignallingEvent::Joined { me, host })
            }
            ServerMessage::LeaveOk => {
                self.room = None;
                Some(SignallingEvent::Left)
            }
            ServerMessage::Kicked => {
                self.room = None;
                Some(SignallingEvent::Kicked)
            }
            ServerMessage::PeerJoined { peerid, peeralias } => self
                .hosting_room()
                .then(|| SignallingEvent::PeerJoined(PeerInfo::new(peerid, peeralias))),
            ServerMessage::PeerQuit { id } => self
                .hosting_room()
                .then_some(SignallingEvent::PeerQuit { id }),
            ServerMessage::IceCandidate { from, icecandidate } => {
                self.relay(RelayKind::IceCandidate, from, icecandidate)
            }
            ServerMessage::Offer { from, offer } => {
                let from_host = self.room.as_ref().is_some_and(|r| !r.host);
                if from_host {
                    self.relay(RelayKind::Offer, from, offer)
                } else {
                    None
                }
            }
            ServerMessage::Answer { from, answer } => {
                if self.hosting_room() {
                    self.relay(RelayKind::Answer, from, answer)
                } else {
                    None
                }
            }
            ServerMessage::InstanceList { list } => Some(SignallingEvent::InstanceList(list)),
            ServerMessage::Error { details } => {
                log::error!("Signalling error: {}", details);
                Some(SignallingEvent::Error(details))
            }
        };
        Ok(event)
    }

    fn relay(&self, kind: RelayKind, from: String, payload: Value) -> Option<SignallingEvent> {
        (self.logged_in && self.room.is_some()).then_some(SignallingEvent::Relay {
            kind,
            from,
            payload,
        })
    }

    fn hosting_room(&self) -> bool {
        self.logged_in && self.room.as_ref().is_some_and(|r| r.host)
    }

    pub fn merge_ice_servers(&mut self, servers: impl IntoIterator<Item = String>) {
        for server in servers {
            if !self.ice_servers.contains(&server) {
                self.ice_servers.push(server);
            }
        }
    }

    pub fn ice_servers(&self) -> &[String] {
        &self.ice_servers
    }

    pub fn login(&self, alias: &str) -> Option<ClientMessage> {
        (self.connected && !self.logged_in).then(|| ClientMessage::Login {
            protocolrev: SIGNALLING_PROTOCOL_REVISION,
            alias: alias.to_string(),
        })
    }

    pub fn join(&self, game: &str, instance: &str, room: &str, max_clients: u32) -> Option<ClientMessage> {
        (self.connected && self.logged_in && self.room.is_none()).then(|| ClientMessage::Join {
            game: game.to_string(),
            instance: instance.to_string(),
            room: room.to_string(),
            max_clients,
        })
    }

    pub fn leave(&self) -> Option<ClientMessage> {
        (self.connected && self.logged_in).then_some(ClientMessage::Leave)
    }

    pub fn confirm_peer(&self, id: &str) -> Option<ClientMessage> {
        (self.connected && self.hosting_room()).then(|| ClientMessage::ConfirmPeer { id: id.to_string() })
    }

    pub fn list_instances(&self, game: &str) -> Option<ClientMessage> {
        self.connected.then(|| ClientMessage::ListInstances {
            game: game.to_string(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn my_id(&self) -> &str {
        &self.my_id
    }

    pub fn my_alias(&self) -> &str {
        &self.my_alias
    }

    pub fn room(&self) -> Option<&RoomInfo> {
        self.room.as_ref()
    }

    pub fn server(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }
}
