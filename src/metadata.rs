use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoordinatorError, Result};

/// Identifier of a running worker, as reported by the node registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Range of the job-hash keyspace owned by one copy set.
///
/// Serialized as `[start, end]` for a bounded range and `[start]` for the
/// open-ended range held by the last copy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<u64>", try_from = "Vec<u64>")]
pub enum DataInterval {
    /// `[start, end)`
    Bounded { start: u64, end: u64 },
    /// `[start, ..)`
    Open { start: u64 },
}

impl DataInterval {
    pub fn start(&self) -> u64 {
        match self {
            DataInterval::Bounded { start, .. } | DataInterval::Open { start } => *start,
        }
    }

    pub fn end(&self) -> Option<u64> {
        match self {
            DataInterval::Bounded { end, .. } => Some(*end),
            DataInterval::Open { .. } => None,
        }
    }

    pub fn contains(&self, hash: u64) -> bool {
        match self {
            DataInterval::Bounded { start, end } => *start <= hash && hash < *end,
            DataInterval::Open { start } => *start <= hash,
        }
    }
}

impl From<DataInterval> for Vec<u64> {
    fn from(interval: DataInterval) -> Self {
        match interval {
            DataInterval::Bounded { start, end } => vec![start, end],
            DataInterval::Open { start } => vec![start],
        }
    }
}

impl TryFrom<Vec<u64>> for DataInterval {
    type Error = String;

    fn try_from(bounds: Vec<u64>) -> std::result::Result<Self, Self::Error> {
        match bounds.as_slice() {
            [start] => Ok(DataInterval::Open { start: *start }),
            [start, end] => Ok(DataInterval::Bounded {
                start: *start,
                end: *end,
            }),
            _ => Err(format!(
                "data interval must have 1 or 2 bounds, got {}",
                bounds.len()
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopySet {
    pub id: usize,
    pub servers: Vec<NodeId>,
    pub leader: NodeId,
    pub data_interval: DataInterval,
}

/// Placement document published by the cluster leader once per term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetadata {
    pub term: u64,
    pub nodes: Vec<NodeId>,
    /// Lower job-hash bound of each copy set, index-aligned with `copy_sets`
    pub interval: Vec<u64>,
    pub copy_sets: Vec<CopySet>,
    pub generated_at: DateTime<Utc>,
}

impl ClusterMetadata {
    /// Copy set whose data interval holds `hash`.
    pub fn copy_set_for_job(&self, hash: u64) -> Option<&CopySet> {
        self.copy_sets
            .iter()
            .find(|set| set.data_interval.contains(hash))
    }

    /// Copy sets led by `node`.
    pub fn copy_sets_led_by(&self, node: &NodeId) -> Vec<&CopySet> {
        self.copy_sets
            .iter()
            .filter(|set| &set.leader == node)
            .collect()
    }

    /// Check the structural invariants every consumer relies on.
    pub fn validate(&self) -> Result<()> {
        if self.interval.len() != self.copy_sets.len() {
            return Err(CoordinatorError::InvalidTopology(format!(
                "{} interval boundaries for {} copy sets",
                self.interval.len(),
                self.copy_sets.len()
            )));
        }

        let members: HashSet<&NodeId> = self.nodes.iter().collect();
        let last = self.copy_sets.len().saturating_sub(1);
        for (i, set) in self.copy_sets.iter().enumerate() {
            if let Some(unknown) = set.servers.iter().find(|s| !members.contains(s)) {
                return Err(CoordinatorError::InvalidTopology(format!(
                    "copy set {} references unknown node {}",
                    set.id, unknown
                )));
            }
            let distinct: HashSet<&NodeId> = set.servers.iter().collect();
            if distinct.len() != set.servers.len() {
                return Err(CoordinatorError::InvalidTopology(format!(
                    "copy set {} lists a server twice",
                    set.id
                )));
            }
            if !set.servers.contains(&set.leader) {
                return Err(CoordinatorError::InvalidTopology(format!(
                    "copy set {} leader {} is not one of its servers",
                    set.id, set.leader
                )));
            }
            if set.data_interval.start() != self.interval[i] {
                return Err(CoordinatorError::InvalidTopology(format!(
                    "copy set {} starts at {}, boundary is {}",
                    set.id,
                    set.data_interval.start(),
                    self.interval[i]
                )));
            }
            match set.data_interval {
                DataInterval::Open { .. } if i != last => {
                    return Err(CoordinatorError::InvalidTopology(format!(
                        "copy set {} is open-ended but not last",
                        set.id
                    )));
                }
                DataInterval::Bounded { end, .. } if i == last || end != self.interval[i + 1] => {
                    return Err(CoordinatorError::InvalidTopology(format!(
                        "copy set {} does not end at the next boundary",
                        set.id
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
