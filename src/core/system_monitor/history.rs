use super::metrics::{NetworkRates, SystemSnapshot};
use super::ring_buffer::RingBuffer;

pub const DEFAULT_HISTORY_SIZE: usize = 60;

/// Rolling metric series for sparklines
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    pub cpu_usage: RingBuffer<f32>,
    pub memory_usage: RingBuffer<f32>,
    pub network_rx: RingBuffer<u64>,
    pub network_tx: RingBuffer<u64>,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cpu_usage: RingBuffer::new(capacity),
            memory_usage: RingBuffer::new(capacity),
            network_rx: RingBuffer::new(capacity),
            network_tx: RingBuffer::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.cpu_usage.capacity()
    }

    pub fn push_cpu(&mut self, value: f32) {
        self.cpu_usage.append(value);
    }

    pub fn push_memory(&mut self, value: f32) {
        self.memory_usage.append(value);
    }

    pub fn push_network(&mut self, rx: u64, tx: u64) {
        self.network_rx.append(rx);
        self.network_tx.append(tx);
    }

    /// Append one point to every series.
    pub fn record(&mut self, snapshot: &SystemSnapshot, network: &NetworkRates) {
        self.push_cpu(snapshot.cpu.global_usage);
        self.push_memory(snapshot.memory.usage_percent);
        self.push_network(
            network.bytes_recv_per_sec as u64,
            network.bytes_sent_per_sec as u64,
        );
    }

    pub fn clear(&mut self) {
        self.cpu_usage.clear();
        self.memory_usage.clear();
        self.network_rx.clear();
        self.network_tx.clear();
    }

    /// Convert cpu_usage to u64 for sparkline widgets
    /// Scales values by 10 to preserve decimal precision (0-1000 range)
    pub fn cpu_as_u64(&self) -> Vec<u64> {
        self.cpu_usage.iter().map(|&v| (v * 10.0) as u64).collect()
    }

    /// Convert memory_usage to u64 for sparkline widgets
    /// Scales values by 10 to preserve decimal precision (0-1000 range)
    pub fn memory_as_u64(&self) -> Vec<u64> {
        self.memory_usage.iter().map(|&v| (v * 10.0) as u64).collect()
    }
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new()
    }
}
