pub mod clock;
pub mod control;
pub mod memory;
pub mod protocol;
pub mod simulator;
pub mod stats;
pub mod transport;
pub mod value;

pub use clock::{DEFAULT_CLIENT_DELAY_MS, HostClock, PING_INTERVAL_MS, PingTracker};
pub use control::{ControlError, ControlMessage, TextMessage, Welcome, parse_text};
pub use memory::{MemoryHandle, MemoryTransport};
pub use protocol::{
    ClientInput, ErrorKind, HostEvents, HostMessage, HostUpdate, ObjectFlags, PROTOCOL_MAGIC,
    PROTOCOL_REVISION, SchemaLookup, WireError, decode_client_input, decode_host_message,
    encode_client_input, encode_host_events, encode_host_update,
};
pub use simulator::{DelayQueue, DelayedFrame, Direction, LatencySimulation};
pub use stats::TrafficStats;
pub use transport::{ChannelFlags, ChannelKind, Payload, Transport, TransportError};
pub use value::{NetValue, Precision};
