use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{CoordinatorError, Result};
use crate::metadata::NodeId;

/// Builds copy sets from the running node list.
///
/// The first permutation is the sorted node list. Each further permutation,
/// up to `scatter_width` in total, is a seeded shuffle of it. Every
/// permutation is cut into consecutive groups of `replica_count` nodes:
///
/// - In the sorted permutation a short trailing group is completed with the
///   first nodes of that permutation, so every node is covered there.
/// - In shuffled permutations a short trailing group is dropped.
///
/// A node therefore shares copy sets with at most
/// `(scatter_width + 1) * (replica_count - 1)` other nodes. That is within
/// `replica_count * scatter_width` only when
/// `replica_count <= scatter_width + 1`; outside that range the wider bound
/// is the one that holds.
#[derive(Debug, Clone)]
pub struct CopySetBuilder {
    replica_count: usize,
    scatter_width: usize,
    seed: u64,
}

impl CopySetBuilder {
    pub fn new(replica_count: usize, scatter_width: usize) -> Self {
        Self {
            replica_count,
            scatter_width,
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn replica_count(&self) -> usize {
        self.replica_count
    }

    pub fn scatter_width(&self) -> usize {
        self.scatter_width
    }

    pub fn build(&self, nodes: &[NodeId]) -> Result<Vec<Vec<NodeId>>> {
        if self.replica_count == 0 || self.scatter_width == 0 {
            return Err(CoordinatorError::InvalidConfig(format!(
                "replica_count ({}) and scatter_width ({}) must be positive",
                self.replica_count, self.scatter_width
            )));
        }

        let mut canonical = nodes.to_vec();
        canonical.sort();
        canonical.dedup();

        if canonical.len() < self.replica_count {
            return Err(CoordinatorError::InsufficientNodes {
                available: canonical.len(),
                required: self.replica_count,
            });
        }

        let mut copy_sets = self.wrapped_chunks(&canonical);

        let mut rng = StdRng::seed_from_u64(self.seed);
        for _ in 1..self.scatter_width {
            let mut permutation = canonical.clone();
            permutation.shuffle(&mut rng);
            copy_sets.extend(
                permutation
                    .chunks_exact(self.replica_count)
                    .map(|chunk| chunk.to_vec()),
            );
        }

        let covered: HashSet<&NodeId> = copy_sets.iter().flatten().collect();
        if let Some(missing) = canonical.iter().find(|node| !covered.contains(node)) {
            return Err(CoordinatorError::CoverageViolation(missing.to_string()));
        }

        tracing::debug!(
            node_count = canonical.len(),
            replica_count = self.replica_count,
            scatter_width = self.scatter_width,
            copy_sets = copy_sets.len(),
            "Built copy sets"
        );

        Ok(copy_sets)
    }

    /// Cut `permutation` into groups, completing the tail from the front.
    /// Requires `permutation.len() >= replica_count`.
    fn wrapped_chunks(&self, permutation: &[NodeId]) -> Vec<Vec<NodeId>> {
        permutation
            .chunks(self.replica_count)
            .map(|chunk| {
                let mut group = chunk.to_vec();
                let missing = self.replica_count - group.len();
                group.extend_from_slice(&permutation[..missing]);
                group
            })
            .collect()
    }
}

/// Build copy sets with the default seed.
pub fn build_copy_sets(
    nodes: &[NodeId],
    replica_count: usize,
    scatter_width: usize,
) -> Result<Vec<Vec<NodeId>>> {
    CopySetBuilder::new(replica_count, scatter_width).build(nodes)
}
