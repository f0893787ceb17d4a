use tether::{CloseReason, ErrorKind};

/// Which session in the harness an event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Host,
    Peer(String),
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Host => f.write_str("host"),
            Node::Peer(alias) => f.write_str(alias),
        }
    }
}

#[derive(Debug, Clone)]
pub enum HarnessEvent {
    PeerOpened {
        node: Node,
        alias: String,
        nid: u16,
    },
    PeerClosed {
        node: Node,
        alias: String,
        reason: CloseReason,
    },
    RoomLeft {
        node: Node,
        reason: CloseReason,
    },
    Confirmed {
        alias: String,
    },
    Signalling {
        node: Node,
        text: String,
    },
    Error {
        node: Node,
        kind: ErrorKind,
        message: String,
    },
}
