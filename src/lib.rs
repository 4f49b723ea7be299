pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod copyset;
pub mod error;
pub mod metadata;
pub mod shutdown;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorState, TermOutcome, TermReport};
pub use error::{CoordinatorError, Result};
pub use metadata::{ClusterMetadata, CopySet, DataInterval, NodeId};
