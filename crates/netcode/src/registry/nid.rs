use std::collections::HashSet;

const NID_SPACE: u32 = 1 << 16;

/// Wraps past 65535, skipping values still in use.
#[derive(Debug, Clone)]
pub struct NidAllocator {
    counter: u32,
    used: HashSet<u16>,
    enabled: bool,
}

impl Default for NidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl NidAllocator {
    pub fn new() -> Self {
        Self {
            counter: 0,
            used: HashSet::new(),
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn allocate(&mut self) -> Option<u16> {
        if !self.enabled || self.used.len() as u32 >= NID_SPACE {
            return None;
        }
        loop {
            self.counter = (self.counter + 1) % NID_SPACE;
            let nid = self.counter as u16;
            if self.used.insert(nid) {
                return Some(nid);
            }
        }
    }

    pub fn mark_used(&mut self, nid: u16) -> bool {
        self.used.insert(nid)
    }

    pub fn free(&mut self, nid: u16) {
        self.used.remove(&nid);
    }

    pub fn is_used(&self, nid: u16) -> bool {
        self.used.contains(&nid)
    }

    pub fn in_use(&self) -> usize {
        self.used.len()
    }

    pub fn reset(&mut self) {
        self.counter = 0;
        self.used.clear();
    }
}
