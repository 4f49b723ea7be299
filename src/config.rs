use crate::error::{CoordinatorError, Result};

/// Copy-set placement and quorum settings for a coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Members per copy set
    pub replica_count: usize,
    /// Running nodes required before this node campaigns for leadership
    pub least_node_count: usize,
    /// Number of node permutations used to build copy sets
    pub scatter_width: usize,
    /// Delay between running-node-count checks while waiting for quorum
    pub quorum_poll_interval_ms: u64,
    /// Seed for the shuffled permutations. Every leader must use the same
    /// value for placements to be reproducible across terms.
    pub placement_seed: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            replica_count: 3,
            least_node_count: 3,
            scatter_width: 2,
            quorum_poll_interval_ms: 1000,
            placement_seed: 0,
        }
    }
}

impl CoordinatorConfig {
    pub fn new(replica_count: usize, least_node_count: usize, scatter_width: usize) -> Self {
        Self {
            replica_count,
            least_node_count,
            scatter_width,
            ..Default::default()
        }
    }

    pub fn with_quorum_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.quorum_poll_interval_ms = interval_ms;
        self
    }

    pub fn with_placement_seed(mut self, seed: u64) -> Self {
        self.placement_seed = seed;
        self
    }

    /// Check that every count is positive and that a quorum can always fill
    /// one copy set.
    pub fn validate(&self) -> Result<()> {
        if self.replica_count == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "replica_count must be positive".to_string(),
            ));
        }
        if self.least_node_count == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "least_node_count must be positive".to_string(),
            ));
        }
        if self.scatter_width == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "scatter_width must be positive".to_string(),
            ));
        }
        if self.quorum_poll_interval_ms == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "quorum_poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.replica_count > self.least_node_count {
            return Err(CoordinatorError::InvalidConfig(format!(
                "replica_count ({}) exceeds least_node_count ({})",
                self.replica_count, self.least_node_count
            )));
        }
        Ok(())
    }
}
