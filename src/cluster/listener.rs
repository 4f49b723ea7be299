use std::sync::Arc;

use tokio::sync::watch;

use crate::cluster::{MetadataChangeListener, NodeChangeListener, NodeEvent};
use crate::metadata::ClusterMetadata;

/// Keeps the last metadata published to this node.
///
/// Followers keep serving from this copy when a new leader fails to publish.
#[derive(Debug, Clone)]
pub struct MetadataCache {
    tx: Arc<watch::Sender<Option<Arc<ClusterMetadata>>>>,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataCache {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Option<Arc<ClusterMetadata>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ClusterMetadata>>> {
        self.tx.subscribe()
    }
}

impl MetadataChangeListener for MetadataCache {
    fn on_metadata_change(&self, metadata: &ClusterMetadata) {
        let stale = self
            .tx
            .borrow()
            .as_ref()
            .is_some_and(|current| current.term > metadata.term);
        if stale {
            tracing::debug!(term = metadata.term, "Ignoring metadata from an older term");
            return;
        }

        tracing::info!(
            term = metadata.term,
            nodes = metadata.nodes.len(),
            copy_sets = metadata.copy_sets.len(),
            "Cluster metadata updated"
        );
        self.tx.send_replace(Some(Arc::new(metadata.clone())));
    }
}

/// Records membership changes seen by the leader. Rebalancing on these events
/// is not performed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeChangeLogger;

impl NodeChangeListener for NodeChangeLogger {
    fn on_node_change(&self, event: &NodeEvent) {
        match event {
            NodeEvent::Joined(node) => tracing::info!(node = %node, "Node joined"),
            NodeEvent::Left(node) => tracing::warn!(node = %node, "Node left"),
        }
    }
}
