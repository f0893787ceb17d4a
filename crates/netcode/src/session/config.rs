use serde::{Deserialize, Serialize};

use crate::net::clock::DEFAULT_CLIENT_DELAY_MS;
use crate::registry::RegistryError;

pub const DEFAULT_UPDATE_RATE: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub host_update_rate: f64,
    pub peer_update_rate: f64,
    /// Buffering delay in milliseconds added to the simulation time.
    pub client_delay: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host_update_rate: DEFAULT_UPDATE_RATE,
            peer_update_rate: DEFAULT_UPDATE_RATE,
            client_delay: DEFAULT_CLIENT_DELAY_MS,
        }
    }
}

impl SessionConfig {
    pub fn update_interval_ms(&self, hosting: bool) -> f64 {
        let rate = if hosting {
            self.host_update_rate
        } else {
            self.peer_update_rate
        };
        1000.0 / rate.max(1.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot change this while in a room")]
    InRoom,
    #[error("not in a room")]
    NotInRoom,
    #[error("only the host can do this")]
    NotHost,
    #[error("unknown peer '{0}'")]
    UnknownPeer(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
