use serde_json::Value;

use crate::net::protocol::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Disconnect,
    Timeout,
    HostQuit,
    Rejoin,
    NetworkError,
    DataError,
    Remote(String),
}

impl CloseReason {
    pub fn as_str(&self) -> &str {
        match self {
            CloseReason::Disconnect => "disconnect",
            CloseReason::Timeout => "timeout",
            CloseReason::HostQuit => "host quit",
            CloseReason::Rejoin => "rejoin",
            CloseReason::NetworkError => "network error",
            CloseReason::DataError => "data error",
            CloseReason::Remote(reason) => reason,
        }
    }

    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "disconnect" => CloseReason::Disconnect,
            "timeout" => CloseReason::Timeout,
            "host quit" => CloseReason::HostQuit,
            "rejoin" => CloseReason::Rejoin,
            "network error" => CloseReason::NetworkError,
            "data error" => CloseReason::DataError,
            other => CloseReason::Remote(other.to_string()),
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PeerOpen {
        id: String,
        nid: u16,
        alias: String,
    },
    PeerClose {
        id: String,
        alias: String,
        reason: CloseReason,
    },
    PeerError {
        id: String,
        kind: ErrorKind,
        message: String,
    },
    PeerMessage {
        id: String,
        message: Value,
    },
    InstanceDestroyed {
        object: String,
        nid: u16,
        timestamp: f64,
    },
    InstanceTimedOut {
        object: String,
        nid: u16,
    },
    /// The host should tell signalling this peer connected successfully.
    ConfirmPeer {
        id: String,
    },
    RoomLeft {
        reason: CloseReason,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_round_trip_through_wire_strings() {
        for reason in [
            CloseReason::Disconnect,
            CloseReason::Timeout,
            CloseReason::HostQuit,
            CloseReason::Rejoin,
            CloseReason::NetworkError,
            CloseReason::DataError,
        ] {
            assert_eq!(CloseReason::from_wire(reason.as_str()), reason);
        }
        assert_eq!(
            CloseReason::from_wire("quit"),
            CloseReason::Remote("quit".into())
        );
        assert_eq!(CloseReason::Remote("quit".into()).to_string(), "quit");
    }
}
