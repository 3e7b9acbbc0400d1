//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for a node's sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// This node's id, unique per user.
    pub node_id: String,
    /// The user whose replicas converge with each other.
    pub user_id: String,
    /// Check-in interval.
    pub tick_interval: Duration,
    /// Back-off applied to the pull loop after a transport failure.
    pub pull_retry_delay: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration with default timing.
    pub fn new(node_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            user_id: user_id.into(),
            tick_interval: Duration::from_secs(5),
            pull_retry_delay: Duration::from_secs(1),
        }
    }

    /// Sets the check-in interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the pull-loop failure back-off.
    pub fn with_pull_retry_delay(mut self, delay: Duration) -> Self {
        self.pull_retry_delay = delay;
        self
    }
}

/// Optional node status advertised with each check-in.
#[derive(Debug, Clone, Default)]
pub struct CheckInStatus {
    /// Current database hash.
    pub database_hash: Option<String>,
    /// Whether the node is still generating test data.
    pub generating_data: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = SyncConfig::new("n1", "u1")
            .with_tick_interval(Duration::from_millis(50))
            .with_pull_retry_delay(Duration::from_millis(10));

        assert_eq!(config.node_id, "n1");
        assert_eq!(config.user_id, "u1");
        assert_eq!(config.tick_interval, Duration::from_millis(50));
        assert_eq!(config.pull_retry_delay, Duration::from_millis(10));
    }
}
