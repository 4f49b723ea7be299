//! Placement properties across cluster sizes and parameters.
//!
//! Verifies that:
//! - Every running node lands in at least one copy set
//! - Copy sets hold `replica_count` distinct members of the cluster
//! - The number of nodes sharing data with any node stays bounded
//! - Every assignable job is owned by exactly one copy set
//! - Leaders are members of their copy set and spread before repeating


use std::collections::{HashMap, HashSet};

use copyset_lite::cluster::memory::MemoryJobStore;
use copyset_lite::copyset::interval::boundary_ranks;
use copyset_lite::copyset::{
    build_copy_sets, elect_leader, plan_intervals, CopySetBuilder, LeaderRegistry,
    MetadataAssembler,
};
use copyset_lite::error::CoordinatorError;
use copyset_lite::metadata::{ClusterMetadata, NodeId};
use test_harness::node_ids;

fn scatter(copy_sets: &[Vec<NodeId>]) -> HashMap<NodeId, HashSet<NodeId>> {
    let mut peers: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
    for set in copy_sets {
        for node in set {
            let entry = peers.entry(node.clone()).or_default();
            entry.extend(set.iter().filter(|peer| *peer != node).cloned());
        }
    }
    peers
}

async fn assemble(
    node_count: usize,
    replica_count: usize,
    scatter_width: usize,
    jobs: &MemoryJobStore,
) -> ClusterMetadata {
    let assembler = MetadataAssembler::new(
        CopySetBuilder::new(replica_count, scatter_width).with_seed(11),
    );
    let mut leaders = LeaderRegistry::new();
    assembler
        .assemble(1, node_ids(node_count), jobs, &mut leaders)
        .await
        .expect("assemble should succeed")
}

#[test]
fn test_copy_sets_cover_every_node() {
    for replica_count in 1..=4 {
        for scatter_width in 1..=4 {
            for node_count in replica_count..=12 {
                let nodes = node_ids(node_count);
                let copy_sets = CopySetBuilder::new(replica_count, scatter_width)
                    .with_seed(node_count as u64)
                    .build(&nodes)
                    .unwrap();

                let covered: HashSet<&NodeId> = copy_sets.iter().flatten().collect();
                assert_eq!(
                    covered.len(),
                    node_count,
                    "R={} W={} N={}",
                    replica_count,
                    scatter_width,
                    node_count
                );
                for set in &copy_sets {
                    assert_eq!(set.len(), replica_count);
                    let distinct: HashSet<&NodeId> = set.iter().collect();
                    assert_eq!(distinct.len(), replica_count);
                }
            }
        }
    }
}

#[test]
fn test_group_count_matches_permutations() {
    // ceil(N/R) from the sorted permutation, floor(N/R) from each shuffle
    for (node_count, replica_count, scatter_width, expected) in [
        (6, 3, 2, 4),
        (7, 3, 2, 5),
        (9, 3, 3, 9),
        (5, 2, 3, 7),
        (4, 4, 1, 1),
    ] {
        let copy_sets =
            build_copy_sets(&node_ids(node_count), replica_count, scatter_width).unwrap();
        assert_eq!(copy_sets.len(), expected, "N={}", node_count);
    }
}

#[test]
fn test_scatter_stays_bounded() {
    for (replica_count, scatter_width) in [(3, 2), (2, 3), (3, 4), (2, 1)] {
        for node_count in replica_count..=20 {
            let copy_sets = CopySetBuilder::new(replica_count, scatter_width)
                .with_seed(3)
                .build(&node_ids(node_count))
                .unwrap();
            for (node, peers) in scatter(&copy_sets) {
                assert!(
                    peers.len() <= replica_count * scatter_width,
                    "{} shares data with {} nodes (R={} W={} N={})",
                    node,
                    peers.len(),
                    replica_count,
                    scatter_width,
                    node_count
                );
            }
        }
    }
}

#[test]
fn test_input_order_does_not_change_placement() {
    let nodes = node_ids(8);
    let mut reversed = nodes.clone();
    reversed.reverse();
    let builder = CopySetBuilder::new(3, 3).with_seed(99);
    assert_eq!(builder.build(&nodes).unwrap(), builder.build(&reversed).unwrap());
}

#[test]
fn test_too_few_nodes_is_rejected() {
    assert_eq!(
        build_copy_sets(&node_ids(2), 3, 2),
        Err(CoordinatorError::InsufficientNodes {
            available: 2,
            required: 3
        })
    );
}

#[test]
fn test_boundary_ranks_edge_cases() {
    assert_eq!(boundary_ranks(10, 3).unwrap(), vec![0, 4, 8]);
    assert_eq!(boundary_ranks(0, 3).unwrap(), vec![0, 0, 0]);
    assert_eq!(boundary_ranks(2, 4).unwrap(), vec![0, 1, 1, 1]);
    assert!(matches!(
        boundary_ranks(10, 0),
        Err(CoordinatorError::InvalidTopology(_))
    ));
}

#[tokio::test]
async fn test_intervals_follow_job_hashes() {
    let jobs = MemoryJobStore::with_hashes([900, 15, 300, 42, 7, 610]);
    let boundaries = plan_intervals(&jobs, 6, 3).await.unwrap();
    // Sorted hashes: 7, 15, 42, 300, 610, 900; ranks 0, 2, 4
    assert_eq!(boundaries, vec![7, 42, 610]);
}

#[tokio::test]
async fn test_every_job_has_one_owner() {
    let jobs = MemoryJobStore::evenly_spaced(500, 13);
    for node_count in [3, 4, 7, 10] {
        let metadata = assemble(node_count, 3, 2, &jobs).await;
        assert!(metadata.validate().is_ok());
        assert!(metadata.copy_sets.len() >= node_count);
        assert!(metadata.interval.windows(2).all(|w| w[0] <= w[1]));

        for job in 0..500u64 {
            let hash = job * 13;
            let owners = metadata
                .copy_sets
                .iter()
                .filter(|set| set.data_interval.contains(hash))
                .count();
            assert_eq!(owners, 1, "hash {} with {} nodes", hash, node_count);
        }
    }
}

#[tokio::test]
async fn test_leaders_spread_before_repeating() {
    let jobs = MemoryJobStore::evenly_spaced(100, 1);
    let metadata = assemble(9, 3, 2, &jobs).await;

    let mut seen = HashSet::new();
    for set in &metadata.copy_sets {
        assert!(set.servers.contains(&set.leader));
        if !seen.insert(set.leader.clone()) {
            // Repeats only when every member already leads another set
            assert!(set.servers.iter().all(|s| seen.contains(s)));
            let smallest = set.servers.iter().min().unwrap();
            assert_eq!(&set.leader, smallest);
        }
    }
}

#[test]
fn test_elect_leader_prefers_unregistered_member() {
    let mut registry = LeaderRegistry::new();
    let servers: Vec<NodeId> = ["c", "a", "b"].into_iter().map(NodeId::from).collect();

    assert_eq!(elect_leader(&servers, &mut registry), Some(NodeId::from("a")));
    assert_eq!(elect_leader(&servers, &mut registry), Some(NodeId::from("b")));
    assert_eq!(elect_leader(&servers, &mut registry), Some(NodeId::from("c")));
    assert_eq!(registry.len(), 3);

    // All registered: smallest member, registry unchanged
    assert_eq!(elect_leader(&servers, &mut registry), Some(NodeId::from("a")));
    assert_eq!(registry.len(), 3);
}
