use std::collections::VecDeque;

pub const PING_INTERVAL_MS: f64 = 2000.0;
pub const DEFAULT_CLIENT_DELAY_MS: f64 = 80.0;

const LATENCY_SAMPLES: usize = 10;
const TIME_DIFF_SAMPLES: usize = 30;
const TIME_DIFF_SLIDE_PER_SEC: f64 = 10.0;
const SIM_DELAY_SLIDE_PER_SEC: f64 = 30.0;

fn latency_trim(len: usize) -> usize {
    match len {
        0..=3 => 0,
        4..=6 => 1,
        _ => 2,
    }
}

fn time_diff_trim(len: usize) -> usize {
    match len {
        0..=3 => 0,
        4..=6 => 1,
        7..=19 => 2,
        _ => 5,
    }
}

pub fn trimmed_mean(samples: impl IntoIterator<Item = f64>, trim: fn(usize) -> usize) -> f64 {
    let mut sorted: Vec<f64> = samples.into_iter().collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f64::total_cmp);
    let cut = trim(sorted.len());
    let kept = &sorted[cut..sorted.len() - cut];
    kept.iter().sum::<f64>() / kept.len() as f64
}

#[derive(Debug, Clone)]
pub struct PingTracker {
    last_sent_id: u32,
    awaiting_pong: bool,
    last_ping_sent: f64,
    samples: VecDeque<f64>,
    latency: f64,
    pdv: f64,
}

impl Default for PingTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PingTracker {
    pub fn new() -> Self {
        Self {
            last_sent_id: 1,
            awaiting_pong: false,
            last_ping_sent: 0.0,
            samples: VecDeque::with_capacity(LATENCY_SAMPLES + 1),
            latency: 0.0,
            pdv: 0.0,
        }
    }

    pub fn next_ping(&mut self, now: f64) -> u32 {
        self.last_ping_sent = now;
        self.awaiting_pong = true;
        self.last_sent_id = self.last_sent_id.wrapping_add(1);
        self.last_sent_id
    }

    /// Records a pong. Returns the one-way latency of this round trip, or
    /// `None` if the pong is stale, duplicated or unexpected.
    pub fn on_pong(&mut self, id: u32, now: f64) -> Option<f64> {
        if !self.awaiting_pong || id != self.last_sent_id {
            return None;
        }
        self.awaiting_pong = false;

        let last_latency = (now - self.last_ping_sent) / 2.0;
        self.samples.push_back(last_latency);
        if self.samples.len() > LATENCY_SAMPLES {
            self.samples.pop_front();
        }

        let (min, max) = self
            .samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
                (lo.min(s), hi.max(s))
            });
        self.pdv = max - min;
        self.latency = trimmed_mean(self.samples.iter().copied(), latency_trim);
        Some(last_latency)
    }

    pub fn latency(&self) -> f64 {
        self.latency
    }

    pub fn pdv(&self) -> f64 {
        self.pdv
    }

    pub fn awaiting_pong(&self) -> bool {
        self.awaiting_pong
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

/// A peer's estimate of the host clock and its simulation delay.
///
/// Targets move with each measurement; the applied values slide toward
/// them at bounded rates so the simulation never jumps.
#[derive(Debug, Clone)]
pub struct HostClock {
    diffs: VecDeque<f64>,
    target_time_diff: f64,
    time_diff: f64,
    target_sim_delay: f64,
    sim_delay: f64,
    client_delay: f64,
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_DELAY_MS)
    }
}

impl HostClock {
    pub fn new(client_delay: f64) -> Self {
        Self {
            diffs: VecDeque::with_capacity(TIME_DIFF_SAMPLES + 1),
            target_time_diff: 0.0,
            time_diff: 0.0,
            target_sim_delay: 0.0,
            sim_delay: 0.0,
            client_delay,
        }
    }

    pub fn reset(&mut self, client_delay: f64) {
        *self = Self::new(client_delay);
    }

    pub fn client_delay(&self) -> f64 {
        self.client_delay
    }

    pub fn set_client_delay(&mut self, client_delay: f64) {
        self.client_delay = client_delay;
    }

    pub fn add_host_time(&mut self, host_time: f64, now: f64, last_latency: f64, latency: f64) {
        self.target_sim_delay = latency + self.client_delay;
        let diff = host_time + last_latency - now;

        if self.diffs.is_empty() {
            self.time_diff = diff;
            self.sim_delay = self.target_sim_delay;
        }

        self.diffs.push_back(diff);
        if self.diffs.len() > TIME_DIFF_SAMPLES {
            self.diffs.pop_front();
        }
        self.target_time_diff = trimmed_mean(self.diffs.iter().copied(), time_diff_trim);
    }

    pub fn slide(&mut self, dt: f64) {
        self.time_diff = approach(self.time_diff, self.target_time_diff, TIME_DIFF_SLIDE_PER_SEC * dt);
        self.sim_delay = approach(self.sim_delay, self.target_sim_delay, SIM_DELAY_SLIDE_PER_SEC * dt);
    }

    pub fn time_diff(&self) -> f64 {
        self.time_diff
    }

    pub fn target_time_diff(&self) -> f64 {
        self.target_time_diff
    }

    pub fn sim_delay(&self) -> f64 {
        self.sim_delay
    }

    pub fn target_sim_delay(&self) -> f64 {
        self.target_sim_delay
    }

    pub fn has_samples(&self) -> bool {
        !self.diffs.is_empty()
    }

    pub fn host_time(&self, now: f64) -> f64 {
        now + self.time_diff
    }

    pub fn simulation_time(&self, now: f64) -> f64 {
        now + self.time_diff - self.sim_delay
    }

    pub fn input_arrival_time(&self, now: f64) -> f64 {
        now + self.time_diff + self.sim_delay
    }
}

fn approach(current: f64, target: f64, step: f64) -> f64 {
    if current < target {
        (current + step).min(target)
    } else if current > target {
        (current - step).max(target)
    } else {
        current
    }
}
