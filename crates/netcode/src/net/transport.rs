use super::protocol::ErrorKind;

/// The three logical channels between two participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Reliable, ordered. Control messages.
    Ordered,
    /// Reliable, unordered. Host events.
    Reliable,
    /// Unreliable, unordered, no retransmission. State updates and pings.
    Unreliable,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [
        ChannelKind::Ordered,
        ChannelKind::Reliable,
        ChannelKind::Unreliable,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ChannelKind::Ordered => "o",
            ChannelKind::Reliable => "r",
            ChannelKind::Unreliable => "u",
        }
    }

    pub fn is_reliable(self) -> bool {
        self != ChannelKind::Unreliable
    }

    pub fn flag(self) -> ChannelFlags {
        match self {
            ChannelKind::Ordered => ChannelFlags::ORDERED,
            ChannelKind::Reliable => ChannelFlags::RELIABLE,
            ChannelKind::Unreliable => ChannelFlags::UNRELIABLE,
        }
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ChannelFlags: u8 {
        const ORDERED = 0b0000_0001;
        const RELIABLE = 0b0000_0010;
        const UNRELIABLE = 0b0000_0100;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(s) => s.len(),
            Payload::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            Payload::Binary(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("channel '{}' is closed", .0.label())]
    Closed(ChannelKind),
    #[error("send on channel '{}' failed: {}", .0.label(), .1)]
    Send(ChannelKind, String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Transport
    }
}

pub trait Transport {
    fn send(&mut self, channel: ChannelKind, payload: &Payload) -> Result<(), TransportError>;

    fn close(&mut self);
}
