//! Copy-set placement.
//!
//! - [`builder`]: groups running nodes into copy sets of `replica_count`
//! - [`interval`]: splits the job-hash keyspace into one range per copy set
//! - [`leader`]: picks the node that owns each copy set
//! - [`assembler`]: combines the three into [`ClusterMetadata`](crate::metadata::ClusterMetadata)

pub mod assembler;
pub mod builder;
pub mod interval;
pub mod leader;

pub use assembler::MetadataAssembler;
pub use builder::{build_copy_sets, CopySetBuilder};
pub use interval::plan_intervals;
pub use leader::{elect_leader, LeaderRegistry};
