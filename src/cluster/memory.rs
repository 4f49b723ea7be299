//! Single-process implementations of the cluster services.
//!
//! Used by the `copyset-lite` binary and by tests. Nothing here is shared
//! between processes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::cluster::{
    JobMetadataStore, LeaderElection, LeadershipEvent, MetadataChangeListener, NodeChangeListener,
    NodeEvent, NodeRegistry,
};
use crate::error::{CoordinatorError, Result};
use crate::metadata::{ClusterMetadata, NodeId};

/// In-memory node registry.
///
/// Published metadata is fenced by term: metadata from a term older than the
/// newest accepted one is rejected.
#[derive(Default)]
pub struct MemoryRegistry {
    nodes: RwLock<Vec<NodeId>>,
    metadata_listeners: RwLock<Vec<Arc<dyn MetadataChangeListener>>>,
    node_listeners: RwLock<Vec<Arc<dyn NodeChangeListener>>>,
    published: RwLock<Vec<ClusterMetadata>>,
    fail_publish: AtomicBool,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes<I, N>(nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        Self {
            nodes: RwLock::new(nodes.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Add a running node. Returns false if it was already registered.
    pub async fn add_node(&self, node: impl Into<NodeId>) -> bool {
        let node = node.into();
        {
            let mut nodes = self.nodes.write().await;
            if nodes.contains(&node) {
                return false;
            }
            nodes.push(node.clone());
        }
        self.notify_nodes(NodeEvent::Joined(node)).await;
        true
    }

    /// Remove a running node. Returns false if it was not registered.
    pub async fn remove_node(&self, node: &NodeId) -> bool {
        {
            let mut nodes = self.nodes.write().await;
            let before = nodes.len();
            nodes.retain(|n| n != node);
            if nodes.len() == before {
                return false;
            }
        }
        self.notify_nodes(NodeEvent::Left(node.clone())).await;
        true
    }

    /// Make every following publish fail, simulating a transport outage.
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Every metadata document accepted so far, oldest first.
    pub async fn published(&self) -> Vec<ClusterMetadata> {
        self.published.read().await.clone()
    }

    pub async fn latest_metadata(&self) -> Option<ClusterMetadata> {
        self.published.read().await.last().cloned()
    }

    pub async fn node_listener_count(&self) -> usize {
        self.node_listeners.read().await.len()
    }

    pub async fn metadata_listener_count(&self) -> usize {
        self.metadata_listeners.read().await.len()
    }

    async fn notify_nodes(&self, event: NodeEvent) {
        let listeners = self.node_listeners.read().await.clone();
        for listener in listeners {
            listener.on_node_change(&event);
        }
    }
}

#[async_trait]
impl NodeRegistry for MemoryRegistry {
    async fn running_node_count(&self) -> Result<usize> {
        Ok(self.nodes.read().await.len())
    }

    async fn running_nodes(&self) -> Result<Vec<NodeId>> {
        Ok(self.nodes.read().await.clone())
    }

    async fn register_metadata_listener(
        &self,
        listener: Arc<dyn MetadataChangeListener>,
    ) -> Result<()> {
        self.metadata_listeners.write().await.push(listener);
        Ok(())
    }

    async fn register_node_listener(&self, listener: Arc<dyn NodeChangeListener>) -> Result<()> {
        self.node_listeners.write().await.push(listener);
        Ok(())
    }

    async fn publish_metadata(&self, metadata: &ClusterMetadata) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(CoordinatorError::Publish(
                "registry unavailable".to_string(),
            ));
        }

        {
            let mut published = self.published.write().await;
            if let Some(newest) = published.last() {
                if newest.term > metadata.term {
                    return Err(CoordinatorError::Publish(format!(
                        "term {} is older than published term {}",
                        metadata.term, newest.term
                    )));
                }
            }
            published.push(metadata.clone());
        }

        let listeners = self.metadata_listeners.read().await.clone();
        for listener in listeners {
            listener.on_metadata_change(metadata);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ElectionState {
    term: u64,
    held: Option<u64>,
    campaigner: Option<mpsc::Sender<LeadershipEvent>>,
}

/// Election primitive for a single local candidate.
///
/// Leadership is handed out explicitly with [`grant`](Self::grant) and taken
/// back with [`revoke`](Self::revoke), or granted as soon as the node
/// campaigns when built with [`granting`](Self::granting).
#[derive(Debug, Default)]
pub struct LocalElection {
    state: Mutex<ElectionState>,
    auto_grant: bool,
}

impl LocalElection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn granting() -> Self {
        Self {
            auto_grant: true,
            ..Default::default()
        }
    }

    /// Give leadership to the campaigning node. Returns the held term.
    pub async fn grant(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        Self::grant_locked(&mut state).await
    }

    /// End the current term, if any. Returns the term that ended.
    pub async fn revoke(&self) -> Result<Option<u64>> {
        let mut state = self.state.lock().await;
        let Some(term) = state.held.take() else {
            return Ok(None);
        };
        if let Some(tx) = &state.campaigner {
            // A withdrawn campaigner has already left its term
            let _ = tx.send(LeadershipEvent::Lost { term }).await;
        }
        tracing::info!(term, "Leadership revoked");
        Ok(Some(term))
    }

    pub async fn current_term(&self) -> u64 {
        self.state.lock().await.term
    }

    pub async fn held_term(&self) -> Option<u64> {
        self.state.lock().await.held
    }

    pub async fn is_campaigning(&self) -> bool {
        self.state
            .lock()
            .await
            .campaigner
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    async fn grant_locked(state: &mut ElectionState) -> Result<u64> {
        if let Some(term) = state.held {
            return Ok(term);
        }
        let tx = state
            .campaigner
            .clone()
            .ok_or_else(|| CoordinatorError::Election("no node is campaigning".to_string()))?;

        let term = state.term + 1;
        tx.send(LeadershipEvent::Acquired { term })
            .await
            .map_err(|_| CoordinatorError::Election("campaigner withdrew".to_string()))?;
        state.term = term;
        state.held = Some(term);
        tracing::info!(term, "Leadership granted");
        Ok(term)
    }
}

#[async_trait]
impl LeaderElection for LocalElection {
    async fn campaign(&self) -> Result<mpsc::Receiver<LeadershipEvent>> {
        let (tx, rx) = mpsc::channel(16);
        let mut state = self.state.lock().await;
        state.campaigner = Some(tx);
        state.held = None;
        if self.auto_grant {
            Self::grant_locked(&mut state).await?;
        }
        Ok(rx)
    }
}

/// Job store over a sorted list of job hashes.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    hashes: RwLock<Vec<u64>>,
}

impl MemoryJobStore {
    pub fn with_hashes(hashes: impl IntoIterator<Item = u64>) -> Self {
        let mut hashes: Vec<u64> = hashes.into_iter().collect();
        hashes.sort_unstable();
        Self {
            hashes: RwLock::new(hashes),
        }
    }

    /// `count` jobs hashed `0, spacing, 2 * spacing, ...`
    pub fn evenly_spaced(count: u64, spacing: u64) -> Self {
        Self::with_hashes((0..count).map(|i| i * spacing))
    }

    pub async fn insert(&self, hash: u64) {
        let mut hashes = self.hashes.write().await;
        let at = hashes.partition_point(|h| *h < hash);
        hashes.insert(at, hash);
    }
}

#[async_trait]
impl JobMetadataStore for MemoryJobStore {
    async fn assignable_job_count(&self) -> Result<u64> {
        Ok(self.hashes.read().await.len() as u64)
    }

    async fn job_hash_id_by_offset(&self, offset: u64) -> Result<u64> {
        let hashes = self.hashes.read().await;
        usize::try_from(offset)
            .ok()
            .and_then(|i| hashes.get(i).copied())
            .ok_or_else(|| {
                CoordinatorError::JobStore(format!(
                    "no job at offset {} of {}",
                    offset,
                    hashes.len()
                ))
            })
    }
}
