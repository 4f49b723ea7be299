use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cluster::{
    JobMetadataStore, LeaderElection, LeadershipEvent, MetadataCache, NodeChangeLogger,
    NodeRegistry,
};
use crate::config::CoordinatorConfig;
use crate::copyset::{LeaderRegistry, MetadataAssembler};
use crate::error::{CoordinatorError, Result};
use crate::metadata::ClusterMetadata;

/// Where the coordinator is in its leadership cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    WaitingQuorum,
    Electing,
    LeaderActive { term: u64 },
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorState::WaitingQuorum => write!(f, "waiting_quorum"),
            CoordinatorState::Electing => write!(f, "electing"),
            CoordinatorState::LeaderActive { term } => write!(f, "leader_active(term={})", term),
        }
    }
}

/// How a leadership term's metadata computation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermOutcome {
    Published(Arc<ClusterMetadata>),
    /// Leadership ended before the metadata was published
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermReport {
    pub term: u64,
    pub result: Result<TermOutcome>,
}

/// Work done while this node leads one term. Owns the term's leader registry,
/// which is dropped with it.
struct LeaderTerm {
    term: u64,
    registry: Arc<dyn NodeRegistry>,
    jobs: Arc<dyn JobMetadataStore>,
    assembler: MetadataAssembler,
    leaders: LeaderRegistry,
    cancel: CancellationToken,
    /// Shared across terms: the node listener is registered once per coordinator
    node_listener_registered: Arc<AtomicBool>,
}

impl LeaderTerm {
    async fn run(mut self) -> Result<TermOutcome> {
        tracing::info!(term = self.term, "Became leader, computing cluster metadata");

        let nodes = self.registry.running_nodes().await?;
        if nodes.is_empty() {
            return Err(CoordinatorError::EmptyCluster);
        }

        let metadata = self
            .assembler
            .assemble(self.term, nodes, self.jobs.as_ref(), &mut self.leaders)
            .await?;

        // A publish still in flight when leadership ends is abandoned
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::warn!(
                    term = self.term,
                    "Leadership lost before publish, discarding metadata"
                );
                return Ok(TermOutcome::Discarded);
            }
            published = self.registry.publish_metadata(&metadata) => published?,
        }
        tracing::info!(
            term = self.term,
            copy_sets = metadata.copy_sets.len(),
            leaders = self.leaders.len(),
            "Published cluster metadata"
        );

        if !self.node_listener_registered.swap(true, Ordering::SeqCst) {
            if let Err(e) = self
                .registry
                .register_node_listener(Arc::new(NodeChangeLogger))
                .await
            {
                self.node_listener_registered.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }

        Ok(TermOutcome::Published(Arc::new(metadata)))
    }
}

struct ActiveTerm {
    term: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Quorum-gated leadership coordinator.
///
/// [`run`](Self::run) is meant to own a dedicated task:
///
/// 1. **WaitingQuorum**: polls the registry until `least_node_count` nodes run
/// 2. **Electing**: campaigns and waits, without timeout, for leadership
/// 3. **LeaderActive**: computes and publishes metadata on a separate task
///
/// Losing leadership discards unpublished metadata and returns to
/// `WaitingQuorum`.
pub struct Coordinator {
    config: CoordinatorConfig,
    assembler: MetadataAssembler,
    registry: Arc<dyn NodeRegistry>,
    election: Arc<dyn LeaderElection>,
    jobs: Arc<dyn JobMetadataStore>,
    metadata_cache: MetadataCache,
    node_listener_registered: Arc<AtomicBool>,
    state_tx: watch::Sender<CoordinatorState>,
    report_tx: Arc<watch::Sender<Option<TermReport>>>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        registry: Arc<dyn NodeRegistry>,
        election: Arc<dyn LeaderElection>,
        jobs: Arc<dyn JobMetadataStore>,
    ) -> Result<Self> {
        config.validate()?;
        let (state_tx, _) = watch::channel(CoordinatorState::WaitingQuorum);
        let (report_tx, _) = watch::channel(None);

        Ok(Self {
            assembler: MetadataAssembler::from_config(&config),
            config,
            registry,
            election,
            jobs,
            metadata_cache: MetadataCache::new(),
            node_listener_registered: Arc::new(AtomicBool::new(false)),
            state_tx,
            report_tx: Arc::new(report_tx),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    /// Outcome of the most recent leadership term's computation.
    pub fn subscribe_reports(&self) -> watch::Receiver<Option<TermReport>> {
        self.report_tx.subscribe()
    }

    /// Last metadata this node received from the registry.
    pub fn metadata_cache(&self) -> &MetadataCache {
        &self.metadata_cache
    }

    /// Run the leadership cycle until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry refuses the metadata listener or the
    /// election primitive refuses the campaign. Failures inside a term are
    /// reported through [`subscribe_reports`](Self::subscribe_reports).
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.registry
            .register_metadata_listener(Arc::new(self.metadata_cache.clone()))
            .await?;

        loop {
            self.set_state(CoordinatorState::WaitingQuorum);
            if !self.wait_for_quorum(&shutdown).await {
                break;
            }

            self.set_state(CoordinatorState::Electing);
            let events = self.election.campaign().await?;
            tracing::info!("Campaigning for cluster leadership");

            if !self.follow_leadership(events, &shutdown).await {
                break;
            }
        }

        tracing::info!("Coordinator stopped");
        Ok(())
    }

    /// Compute and publish metadata for `term` on the calling task.
    ///
    /// Every error is returned to the caller; nothing is published on failure.
    pub async fn lead_term(&self, term: u64) -> Result<TermOutcome> {
        self.leader_term(term, CancellationToken::new()).run().await
    }

    /// Poll the running node count until it reaches the quorum. Returns false
    /// if shut down first. Registry errors are logged and retried.
    async fn wait_for_quorum(&self, shutdown: &CancellationToken) -> bool {
        let interval = Duration::from_millis(self.config.quorum_poll_interval_ms);
        let needed = self.config.least_node_count;

        loop {
            match self.registry.running_node_count().await {
                Ok(count) if count >= needed => {
                    tracing::info!(node_count = count, needed, "Quorum reached");
                    return true;
                }
                Ok(count) => {
                    tracing::debug!(node_count = count, needed, "Waiting for quorum");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read running node count");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return false,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Handle leadership events until the current term ends (true) or the
    /// coordinator shuts down (false).
    async fn follow_leadership(
        &self,
        mut events: mpsc::Receiver<LeadershipEvent>,
        shutdown: &CancellationToken,
    ) -> bool {
        let mut active: Option<ActiveTerm> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    if let Some(term) = active.take() {
                        term.cancel.cancel();
                        term.handle.abort();
                    }
                    return false;
                }

                event = events.recv() => match event {
                    Some(LeadershipEvent::Acquired { term }) => {
                        if let Some(current) = &active {
                            tracing::warn!(
                                term,
                                current_term = current.term,
                                "Ignoring leadership acquisition while a term is active"
                            );
                            continue;
                        }
                        active = Some(self.start_term(term));
                        self.set_state(CoordinatorState::LeaderActive { term });
                    }
                    Some(LeadershipEvent::Lost { term }) => match active.take() {
                        Some(current) if current.term == term => {
                            Self::end_term(current).await;
                            return true;
                        }
                        Some(current) => {
                            tracing::warn!(
                                term,
                                current_term = current.term,
                                "Ignoring leadership loss for another term"
                            );
                            active = Some(current);
                        }
                        None => {
                            tracing::debug!(term, "Leadership lost before acquisition");
                        }
                    },
                    None => {
                        tracing::warn!("Election channel closed");
                        if let Some(current) = active.take() {
                            Self::end_term(current).await;
                        }
                        return true;
                    }
                },
            }
        }
    }

    fn leader_term(&self, term: u64, cancel: CancellationToken) -> LeaderTerm {
        LeaderTerm {
            term,
            registry: self.registry.clone(),
            jobs: self.jobs.clone(),
            assembler: self.assembler.clone(),
            leaders: LeaderRegistry::new(),
            cancel,
            node_listener_registered: self.node_listener_registered.clone(),
        }
    }

    fn start_term(&self, term: u64) -> ActiveTerm {
        let cancel = CancellationToken::new();
        let leader_term = self.leader_term(term, cancel.clone());
        let report_tx = self.report_tx.clone();

        let handle = tokio::spawn(async move {
            let result = leader_term.run().await;
            match &result {
                Ok(TermOutcome::Published(_)) => {}
                Ok(TermOutcome::Discarded) => {
                    tracing::info!(term, "Term ended without publishing metadata");
                }
                Err(e) => {
                    tracing::error!(term, error = %e, "Failed to compute cluster metadata");
                }
            }
            report_tx.send_replace(Some(TermReport { term, result }));
        });

        ActiveTerm {
            term,
            cancel,
            handle,
        }
    }

    /// Discard the term's unpublished work and wait for its task to finish.
    async fn end_term(active: ActiveTerm) {
        tracing::info!(term = active.term, "Leadership lost");
        active.cancel.cancel();
        if let Err(e) = active.handle.await {
            tracing::warn!(term = active.term, error = %e, "Leader term task failed");
        }
    }

    fn set_state(&self, state: CoordinatorState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Coordinator state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::memory::{LocalElection, MemoryJobStore, MemoryRegistry};
    use crate::cluster::{MetadataChangeListener, NodeChangeListener};
    use crate::metadata::NodeId;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Registry whose publish waits until released.
    struct HeldPublishRegistry {
        inner: MemoryRegistry,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl NodeRegistry for HeldPublishRegistry {
        async fn running_node_count(&self) -> Result<usize> {
            self.inner.running_node_count().await
        }

        async fn running_nodes(&self) -> Result<Vec<NodeId>> {
            self.inner.running_nodes().await
        }

        async fn register_metadata_listener(
            &self,
            listener: Arc<dyn MetadataChangeListener>,
        ) -> Result<()> {
            self.inner.register_metadata_listener(listener).await
        }

        async fn register_node_listener(
            &self,
            listener: Arc<dyn NodeChangeListener>,
        ) -> Result<()> {
            self.inner.register_node_listener(listener).await
        }

        async fn publish_metadata(&self, metadata: &ClusterMetadata) -> Result<()> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.publish_metadata(metadata).await
        }
    }

    fn coordinator(registry: Arc<MemoryRegistry>) -> Coordinator {
        Coordinator::new(
            CoordinatorConfig::default().with_quorum_poll_interval_ms(10),
            registry,
            Arc::new(LocalElection::new()),
            Arc::new(MemoryJobStore::evenly_spaced(100, 1)),
        )
        .unwrap()
    }

    #[test]
    fn state_display() {
        assert_eq!(CoordinatorState::WaitingQuorum.to_string(), "waiting_quorum");
        assert_eq!(CoordinatorState::Electing.to_string(), "electing");
        assert_eq!(
            CoordinatorState::LeaderActive { term: 4 }.to_string(),
            "leader_active(term=4)"
        );
    }

    #[test]
    fn new_rejects_invalid_config() {
        let result = Coordinator::new(
            CoordinatorConfig::new(5, 3, 2),
            Arc::new(MemoryRegistry::new()),
            Arc::new(LocalElection::new()),
            Arc::new(MemoryJobStore::default()),
        );
        assert!(matches!(result, Err(CoordinatorError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn lead_term_publishes_metadata() {
        let registry = Arc::new(MemoryRegistry::with_nodes(["a", "b", "c", "d"]));
        let coordinator = coordinator(registry.clone());

        let outcome = coordinator.lead_term(3).await.unwrap();
        let TermOutcome::Published(metadata) = outcome else {
            panic!("expected published metadata");
        };
        assert_eq!(metadata.term, 3);
        assert_eq!(registry.latest_metadata().await.as_ref(), Some(metadata.as_ref()));
        assert_eq!(registry.node_listener_count().await, 1);
    }

    #[tokio::test]
    async fn node_listener_registered_once_across_terms() {
        let registry = Arc::new(MemoryRegistry::with_nodes(["a", "b", "c"]));
        let coordinator = coordinator(registry.clone());

        for term in 1..=5 {
            coordinator.lead_term(term).await.unwrap();
        }
        assert_eq!(registry.published().await.len(), 5);
        assert_eq!(registry.node_listener_count().await, 1);
    }

    #[tokio::test]
    async fn leadership_lost_during_publish_discards_metadata() {
        let registry = Arc::new(HeldPublishRegistry {
            inner: MemoryRegistry::with_nodes(["a", "b", "c"]),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let coordinator = Coordinator::new(
            CoordinatorConfig::default(),
            registry.clone(),
            Arc::new(LocalElection::new()),
            Arc::new(MemoryJobStore::evenly_spaced(100, 1)),
        )
        .unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(coordinator.leader_term(1, cancel.clone()).run());
        registry.entered.notified().await;
        cancel.cancel();

        assert_eq!(task.await.unwrap(), Ok(TermOutcome::Discarded));
        registry.release.notify_one();
        assert!(registry.inner.published().await.is_empty());
        assert_eq!(registry.inner.node_listener_count().await, 0);
    }

    #[tokio::test]
    async fn lead_term_on_empty_cluster_fails() {
        let registry = Arc::new(MemoryRegistry::new());
        let coordinator = coordinator(registry.clone());

        let err = coordinator.lead_term(1).await.unwrap_err();
        assert_eq!(err, CoordinatorError::EmptyCluster);
        assert!(registry.published().await.is_empty());
        assert_eq!(registry.node_listener_count().await, 0);
    }

    #[tokio::test]
    async fn lead_term_propagates_publish_failure() {
        let registry = Arc::new(MemoryRegistry::with_nodes(["a", "b", "c"]));
        registry.set_fail_publish(true);
        let coordinator = coordinator(registry.clone());

        let err = coordinator.lead_term(1).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Publish(_)));
    }

    #[tokio::test]
    async fn quorum_wait_stops_on_shutdown() {
        let registry = Arc::new(MemoryRegistry::with_nodes(["a"]));
        let coordinator = coordinator(registry);
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(!coordinator.wait_for_quorum(&shutdown).await);
        assert_eq!(coordinator.state(), CoordinatorState::WaitingQuorum);
    }
}
