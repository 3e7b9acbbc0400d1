//! Configuration for the broker.

use std::time::Duration;

/// Configuration for a broker process.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// How long a pull registration is held open before resolving empty.
    pub pull_timeout: Duration,
    /// How long a node may stay silent before the GC drops it.
    pub node_ttl: Duration,
    /// Interval between GC sweeps.
    pub gc_interval: Duration,
    /// Ceiling on nodes per user.
    pub max_nodes_per_user: usize,
    /// Ceiling on the size of one node's block-request set.
    pub max_requested_blocks: usize,
}

impl BrokerConfig {
    /// Sets the long-poll timeout.
    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    /// Sets the offline-node TTL.
    pub fn with_node_ttl(mut self, ttl: Duration) -> Self {
        self.node_ttl = ttl;
        self
    }

    /// Sets the GC sweep interval.
    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            pull_timeout: Duration::from_millis(120_000),
            node_ttl: Duration::from_secs(20),
            gc_interval: Duration::from_secs(1),
            max_nodes_per_user: 64,
            max_requested_blocks: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_timing() {
        let config = BrokerConfig::default();
        assert_eq!(config.pull_timeout, Duration::from_millis(120_000));
        assert_eq!(config.node_ttl, Duration::from_secs(20));
        assert_eq!(config.gc_interval, Duration::from_secs(1));
    }
}
