use std::collections::BTreeSet;

use crate::metadata::NodeId;

/// Nodes already chosen to lead a copy set during the current leadership term.
///
/// Owned by the term that builds the metadata and dropped with it. Membership
/// only biases the election; it never prevents a node from leading.
#[derive(Debug, Default, Clone)]
pub struct LeaderRegistry {
    leaders: BTreeSet<NodeId>,
}

impl LeaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.leaders.contains(node)
    }

    pub fn len(&self) -> usize {
        self.leaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaders.is_empty()
    }

    pub fn clear(&mut self) {
        self.leaders.clear();
    }
}

/// Pick the leader of a copy set.
///
/// The lexicographically smallest server not yet leading another set wins and
/// is recorded in `registry`. When every server already leads a set, the
/// smallest server is returned and `registry` is left untouched. Returns
/// `None` only for an empty server list.
pub fn elect_leader(servers: &[NodeId], registry: &mut LeaderRegistry) -> Option<NodeId> {
    let mut candidates: Vec<&NodeId> = servers.iter().collect();
    candidates.sort();

    if let Some(fresh) = candidates.iter().find(|node| !registry.contains(node)) {
        let leader = (*fresh).clone();
        registry.leaders.insert(leader.clone());
        return Some(leader);
    }

    candidates.first().map(|node| (*node).clone())
}
