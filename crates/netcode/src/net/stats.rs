#[derive(Debug, Clone, Default)]
pub struct TrafficStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub outbound_per_sec: u64,
    pub outbound_bytes_per_sec: u64,
    pub inbound_per_sec: u64,
    pub inbound_bytes_per_sec: u64,
    outbound_count: u64,
    outbound_bytes: u64,
    inbound_count: u64,
    inbound_bytes: u64,
    last_second: f64,
}

impl TrafficStats {
    pub fn new(now: f64) -> Self {
        Self {
            last_second: now,
            ..Self::default()
        }
    }

    pub fn record_outbound(&mut self, bytes: usize) {
        self.messages_sent += 1;
        self.bytes_sent += bytes as u64;
        self.outbound_count += 1;
        self.outbound_bytes += bytes as u64;
    }

    pub fn record_inbound(&mut self, bytes: usize) {
        self.messages_received += 1;
        self.bytes_received += bytes as u64;
        self.inbound_count += 1;
        self.inbound_bytes += bytes as u64;
    }

    pub fn roll(&mut self, now: f64) {
        if now - self.last_second < 1000.0 {
            return;
        }
        self.outbound_per_sec = std::mem::take(&mut self.outbound_count);
        self.outbound_bytes_per_sec = std::mem::take(&mut self.outbound_bytes);
        self.inbound_per_sec = std::mem::take(&mut self.inbound_count);
        self.inbound_bytes_per_sec = std::mem::take(&mut self.inbound_bytes);

        self.last_second += 1000.0;
        if now - self.last_second > 500.0 {
            self.last_second = now;
        }
    }
}
