use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::transport::{ChannelKind, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencySimulation {
    pub latency_ms: f64,
    pub pdv_ms: f64,
    pub loss: f64,
}

impl LatencySimulation {
    pub fn new(latency_ms: f64, pdv_ms: f64, loss: f64) -> Self {
        Self {
            latency_ms: latency_ms.max(0.0),
            pdv_ms: pdv_ms.max(0.0),
            loss: loss.clamp(0.0, 1.0),
        }
    }

    pub fn is_delaying(&self) -> bool {
        self.latency_ms > 0.0 || self.pdv_ms > 0.0
    }

    /// Only the unreliable channel actually loses frames.
    pub fn should_drop<R: Rng + ?Sized>(&self, channel: ChannelKind, rng: &mut R) -> bool {
        channel == ChannelKind::Unreliable && self.loss > 0.0 && rng.gen_bool(self.loss)
    }

    /// Delay for one frame. A "lost" reliable frame takes three trips.
    pub fn delay_ms<R: Rng + ?Sized>(&self, channel: ChannelKind, rng: &mut R) -> f64 {
        let multiplier = if channel.is_reliable() && self.loss > 0.0 && rng.gen_bool(self.loss) {
            3.0
        } else {
            1.0
        };
        let jitter = if self.pdv_ms > 0.0 {
            rng.gen_range(0.0..self.pdv_ms)
        } else {
            0.0
        };
        (self.latency_ms + jitter) * multiplier
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DelayedFrame {
    pub peer_id: String,
    pub channel: ChannelKind,
    pub payload: Payload,
    pub direction: Direction,
}

#[derive(Debug)]
struct Scheduled {
    release_time: f64,
    seq: u64,
    frame: DelayedFrame,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .release_time
            .total_cmp(&self.release_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
pub struct DelayQueue {
    heap: BinaryHeap<Scheduled>,
    seq: u64,
}

impl DelayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, release_time: f64, frame: DelayedFrame) {
        self.seq += 1;
        self.heap.push(Scheduled {
            release_time,
            seq: self.seq,
            frame,
        });
    }

    pub fn take_due(&mut self, now: f64) -> Vec<DelayedFrame> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|s| s.release_time <= now) {
            if let Some(s) = self.heap.pop() {
                due.push(s.frame);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
