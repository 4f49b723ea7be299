//! Interfaces to the services the coordinator depends on.
//!
//! The coordinator never talks to a concrete registry, election or job store
//! directly. It holds them as trait objects:
//!
//! - [`NodeRegistry`]: running nodes, change listeners and metadata publishing
//! - [`LeaderElection`]: pushes leadership transitions for this node
//! - [`JobMetadataStore`]: assignable job count and rank-to-hash lookup
//!
//! [`memory`] provides single-process implementations of all three.

pub mod listener;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::metadata::{ClusterMetadata, NodeId};

pub use listener::{MetadataCache, NodeChangeLogger};

/// Membership change reported by the node registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Joined(NodeId),
    Left(NodeId),
}

/// Leadership transition pushed by the election primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadershipEvent {
    Acquired { term: u64 },
    Lost { term: u64 },
}

impl LeadershipEvent {
    pub fn term(&self) -> u64 {
        match self {
            LeadershipEvent::Acquired { term } | LeadershipEvent::Lost { term } => *term,
        }
    }
}

pub trait MetadataChangeListener: Send + Sync {
    fn on_metadata_change(&self, metadata: &ClusterMetadata);
}

pub trait NodeChangeListener: Send + Sync {
    fn on_node_change(&self, event: &NodeEvent);
}

#[async_trait]
pub trait NodeRegistry: Send + Sync {
    async fn running_node_count(&self) -> Result<usize>;

    async fn running_nodes(&self) -> Result<Vec<NodeId>>;

    async fn register_metadata_listener(
        &self,
        listener: Arc<dyn MetadataChangeListener>,
    ) -> Result<()>;

    async fn register_node_listener(&self, listener: Arc<dyn NodeChangeListener>) -> Result<()>;

    /// Persist and broadcast `metadata`. Fails with
    /// [`CoordinatorError::Publish`](crate::error::CoordinatorError::Publish).
    async fn publish_metadata(&self, metadata: &ClusterMetadata) -> Result<()>;
}

#[async_trait]
pub trait LeaderElection: Send + Sync {
    /// Enter the election for this node.
    ///
    /// The returned channel yields `Acquired` once per term this node wins and
    /// `Lost` when that term ends. Dropping the receiver withdraws.
    async fn campaign(&self) -> Result<mpsc::Receiver<LeadershipEvent>>;
}

#[async_trait]
pub trait JobMetadataStore: Send + Sync {
    async fn assignable_job_count(&self) -> Result<u64>;

    /// Hash of the job at `offset` in the store's stable global ordering.
    async fn job_hash_id_by_offset(&self, offset: u64) -> Result<u64>;
}
