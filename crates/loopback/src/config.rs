use tether::{LatencySimulation, SessionConfig};

#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    pub peers: usize,
    pub tick_rate: u32,
    pub sprites: usize,
    /// Seconds between sprite respawns; zero keeps the same set forever.
    pub respawn_secs: f64,
    pub session: SessionConfig,
    pub latency: LatencySimulation,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            peers: 3,
            tick_rate: 60,
            sprites: 8,
            respawn_secs: 5.0,
            session: SessionConfig::default(),
            latency: LatencySimulation::default(),
        }
    }
}
