use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Insufficient nodes: {available} running, {required} required per copy set")]
    InsufficientNodes { available: usize, required: usize },

    #[error("Running node count is 0")]
    EmptyCluster,

    #[error("Copy set coverage violated, node {0} is in no copy set")]
    CoverageViolation(String),

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Metadata publish failed: {0}")]
    Publish(String),

    #[error("Node registry error: {0}")]
    Registry(String),

    #[error("Leader election error: {0}")]
    Election(String),

    #[error("Job store error: {0}")]
    JobStore(String),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
