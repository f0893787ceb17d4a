use std::collections::VecDeque;

use super::interp::{Interp, blend, unlerp};
use super::pool::ValuePool;

/// Updates older than this relative to the query time mark a stream as stale.
pub const STALE_AFTER_MS: f64 = 3000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct NetUpdate {
    pub timestamp: f64,
    pub data: Vec<f64>,
}

/// Time-ordered queue of snapshots for one value stream.
///
/// `tick` keeps three cursors into the queue: the two most recent
/// snapshots at or before the query time and the first one after it.
/// Everything older than those cursors is returned to the pool.
#[derive(Debug, Default)]
pub struct UpdateBuffer {
    updates: VecDeque<NetUpdate>,
    prior2: Option<usize>,
    prior: Option<usize>,
    next: Option<usize>,
}

impl UpdateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a snapshot in timestamp order. A snapshot whose timestamp is
    /// already queued is a retransmission: it is dropped and `false` returned.
    pub fn add(&mut self, timestamp: f64, data: Vec<f64>, pool: &mut ValuePool) -> bool {
        let mut at = self.updates.len();
        for (i, u) in self.updates.iter().enumerate().rev() {
            if u.timestamp == timestamp {
                pool.release(data);
                return false;
            }
            if u.timestamp < timestamp {
                break;
            }
            at = i;
        }

        self.updates.insert(at, NetUpdate { timestamp, data });
        for cursor in [&mut self.prior2, &mut self.prior, &mut self.next] {
            if let Some(i) = cursor
                && *i >= at
            {
                *i += 1;
            }
        }
        true
    }

    pub fn tick(&mut self, sim_time: f64, pool: &mut ValuePool) {
        self.advance(sim_time);
        self.collect(pool);
    }

    fn advance(&mut self, sim_time: f64) {
        if let (Some(p), Some(n)) = (self.prior, self.next)
            && self.updates[p].timestamp < sim_time
            && self.updates[n].timestamp > sim_time
        {
            return;
        }

        self.next = None;
        let start = self.prior.unwrap_or(0);
        for i in start..self.updates.len() {
            let ts = self.updates[i].timestamp;
            if ts <= sim_time {
                let newer = match self.prior {
                    Some(p) => ts > self.updates[p].timestamp,
                    None => true,
                };
                if newer {
                    self.prior2 = self.prior;
                    self.prior = Some(i);
                }
            } else {
                self.next = Some(i);
                break;
            }
        }
    }

    fn collect(&mut self, pool: &mut ValuePool) {
        while self.updates.len() > 2 && !self.is_cursor(0) {
            if let Some(old) = self.updates.pop_front() {
                pool.release(old.data);
            }
            for i in [&mut self.prior2, &mut self.prior, &mut self.next]
                .into_iter()
                .flatten()
            {
                *i -= 1;
            }
        }
    }

    fn is_cursor(&self, index: usize) -> bool {
        [self.prior2, self.prior, self.next].contains(&Some(index))
    }

    /// Resolves field `index` at `sim_time`.
    ///
    /// `horizon` bounds how far past the newest snapshot a value may be
    /// projected; `None` disables extrapolation entirely.
    pub fn value_at(&self, sim_time: f64, index: usize, mode: Interp, horizon: Option<f64>) -> f64 {
        let value = |i: usize| self.updates[i].data.get(index).copied().unwrap_or(0.0);

        let (from, to, extrapolating) = match (self.prior2, self.prior, self.next) {
            (_, None, None) => return 0.0,
            (_, None, Some(n)) => return value(n),
            (_, Some(p), Some(n)) => (p, n, false),
            (Some(p2), Some(p), None) if horizon.is_some() => (p2, p, true),
            (_, Some(p), None) => return value(p),
        };

        let from_ts = self.updates[from].timestamp;
        let to_ts = self.updates[to].timestamp;
        let query = match horizon {
            Some(limit) if extrapolating => sim_time.min(to_ts + limit),
            _ => sim_time,
        };
        let x = unlerp(from_ts, to_ts, query);
        blend(mode, value(from), value(to), x, extrapolating)
    }

    pub fn latest(&self) -> Option<&NetUpdate> {
        self.updates.back()
    }

    pub fn is_timed_out(&self, sim_time: f64) -> bool {
        self.updates
            .back()
            .is_some_and(|u| u.timestamp < sim_time - STALE_AFTER_MS)
    }

    pub fn clear(&mut self, pool: &mut ValuePool) {
        for u in self.updates.drain(..) {
            pool.release(u.data);
        }
        self.prior2 = None;
        self.prior = None;
        self.next = None;
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = f64> + '_ {
        self.updates.iter().map(|u| u.timestamp)
    }
}
