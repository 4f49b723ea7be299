use chrono::Utc;

use crate::cluster::JobMetadataStore;
use crate::config::CoordinatorConfig;
use crate::copyset::builder::CopySetBuilder;
use crate::copyset::interval::{data_interval, plan_intervals};
use crate::copyset::leader::{elect_leader, LeaderRegistry};
use crate::error::{CoordinatorError, Result};
use crate::metadata::{ClusterMetadata, CopySet, NodeId};

/// Produces the cluster metadata document for one leadership term.
#[derive(Debug, Clone)]
pub struct MetadataAssembler {
    builder: CopySetBuilder,
}

impl MetadataAssembler {
    pub fn new(builder: CopySetBuilder) -> Self {
        Self { builder }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(
            CopySetBuilder::new(config.replica_count, config.scatter_width)
                .with_seed(config.placement_seed),
        )
    }

    /// Build copy sets over `nodes`, give each one a slice of the job keyspace
    /// and a leader.
    ///
    /// `nodes` is sorted and deduplicated first. There are at least as many
    /// copy sets as distinct nodes; when the builder yields fewer groups,
    /// groups are reused in order. Each set's servers are stored sorted, and
    /// leaders are recorded in `leaders` so that later sets prefer nodes that
    /// lead nothing yet.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::EmptyCluster`] if `nodes` is empty
    /// - [`CoordinatorError::InsufficientNodes`] if `nodes` cannot fill one copy set
    /// - job store errors from the interval lookups
    pub async fn assemble(
        &self,
        term: u64,
        mut nodes: Vec<NodeId>,
        jobs: &dyn JobMetadataStore,
        leaders: &mut LeaderRegistry,
    ) -> Result<ClusterMetadata> {
        nodes.sort();
        nodes.dedup();
        if nodes.is_empty() {
            return Err(CoordinatorError::EmptyCluster);
        }

        let groups = self.builder.build(&nodes)?;
        if groups.is_empty() {
            return Err(CoordinatorError::InvalidTopology(
                "copy set builder produced no groups".to_string(),
            ));
        }
        let sets_num = groups.len().max(nodes.len());

        let job_count = jobs.assignable_job_count().await?;
        let boundaries = plan_intervals(jobs, job_count, sets_num).await?;

        let mut copy_sets = Vec::with_capacity(sets_num);
        for id in 0..sets_num {
            let mut servers = groups[id % groups.len()].clone();
            servers.sort();
            let leader = elect_leader(&servers, leaders).ok_or_else(|| {
                CoordinatorError::InvalidTopology(format!("copy set {} has no servers", id))
            })?;
            copy_sets.push(CopySet {
                id,
                servers,
                leader,
                data_interval: data_interval(&boundaries, id),
            });
        }

        let metadata = ClusterMetadata {
            term,
            nodes,
            interval: boundaries,
            copy_sets,
            generated_at: Utc::now(),
        };
        metadata.validate()?;

        tracing::info!(
            term,
            node_count = metadata.nodes.len(),
            groups = groups.len(),
            sets_num,
            job_count,
            "Assembled cluster metadata"
        );
        Ok(metadata)
    }
}
