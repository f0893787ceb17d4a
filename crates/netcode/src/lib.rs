pub mod net;
pub mod registry;
pub mod session;
pub mod signalling;
pub mod snapshot;

pub use net::{
    ChannelKind, ErrorKind, HostClock, LatencySimulation, MemoryHandle, MemoryTransport, NetValue,
    Payload, PingTracker, Precision, TrafficStats, Transport, TransportError, WireError,
};
pub use registry::{Bandwidth, InstanceId, ObjectSource, RegisteredObject, Registry, RegistryError};
pub use session::{
    CloseReason, Peer, PeerInfo, PeerRole, PeerState, Session, SessionConfig, SessionError,
    SessionEvent,
};
pub use signalling::{
    ClientMessage, ServerMessage, SignallingClient, SignallingError, SignallingEvent,
};
pub use snapshot::{Interp, UpdateBuffer, ValuePool};
