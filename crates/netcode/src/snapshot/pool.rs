const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug)]
pub struct ValuePool {
    free: Vec<Vec<f64>>,
    capacity: usize,
}

impl Default for ValuePool {
    fn default() -> Self {
        Self::new()
    }
}

impl ValuePool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            capacity,
        }
    }

    pub fn acquire(&mut self, len: usize) -> Vec<f64> {
        match self.free.pop() {
            Some(mut values) => {
                values.reserve(len);
                values
            }
            None => Vec::with_capacity(len),
        }
    }

    pub fn release(&mut self, mut values: Vec<f64>) {
        if self.free.len() >= self.capacity {
            return;
        }
        values.clear();
        self.free.push(values);
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_vectors_come_back_empty() {
        let mut pool = ValuePool::new();
        let mut v = pool.acquire(4);
        v.extend_from_slice(&[1.0, 2.0, 3.0]);
        pool.release(v);
        assert_eq!(pool.len(), 1);

        let again = pool.acquire(2);
        assert!(again.is_empty());
        assert!(again.capacity() >= 3);
        assert!(pool.is_empty());
    }

    #[test]
    fn retention_is_capped() {
        let mut pool = ValuePool::with_capacity(2);
        for _ in 0..5 {
            pool.release(vec![1.0]);
        }
        assert_eq!(pool.len(), 2);
    }
}
