use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use copyset_lite::cluster::memory::{LocalElection, MemoryJobStore, MemoryRegistry};
use copyset_lite::config::CoordinatorConfig;
use copyset_lite::coordinator::{Coordinator, TermOutcome};
use copyset_lite::copyset::{CopySetBuilder, LeaderRegistry, MetadataAssembler};
use copyset_lite::metadata::{ClusterMetadata, DataInterval, NodeId};
use copyset_lite::shutdown::cancel_on_signal;

#[derive(Parser, Debug)]
#[command(name = "copyset-lite")]
#[command(version)]
#[command(about = "Copy-set placement and shard leadership for a job-scheduling cluster")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Compute copy-set metadata for a fixed node list
    Plan(PlanArgs),

    /// Run the coordinator against an in-process cluster
    Simulate(SimulateArgs),
}

// =============================================================================
// Shared Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct PlacementArgs {
    /// Members per copy set
    #[arg(long, default_value = "3")]
    replica_count: usize,

    /// Number of node permutations used to build copy sets
    #[arg(long, default_value = "2")]
    scatter_width: usize,

    /// Seed for the shuffled permutations
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Number of assignable jobs, hashed 0, spacing, 2 * spacing, ...
    #[arg(long, default_value = "1000")]
    jobs: u64,

    /// Hash distance between consecutive jobs
    #[arg(long, default_value = "1")]
    job_spacing: u64,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Node IDs (comma-separated)
    /// Example: "node-a,node-b,node-c"
    #[arg(long)]
    nodes: String,

    #[command(flatten)]
    placement: PlacementArgs,
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Number of nodes that join the cluster
    #[arg(long, default_value = "6")]
    nodes: usize,

    /// Delay between node joins
    #[arg(long, default_value = "500")]
    join_interval_ms: u64,

    /// Running nodes required before campaigning for leadership
    #[arg(long, default_value = "3")]
    least_node_count: usize,

    /// Delay between quorum checks
    #[arg(long, default_value = "1000")]
    quorum_poll_interval_ms: u64,

    #[command(flatten)]
    placement: PlacementArgs,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_nodes(nodes_str: &str) -> Vec<NodeId> {
    nodes_str
        .split(',')
        .map(str::trim)
        .filter(|node| !node.is_empty())
        .map(NodeId::from)
        .collect()
}

fn format_interval(interval: &DataInterval) -> String {
    match interval {
        DataInterval::Bounded { start, end } => format!("[{}, {})", start, end),
        DataInterval::Open { start } => format!("[{}, ..)", start),
    }
}

fn print_metadata(
    metadata: &ClusterMetadata,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(metadata)?);
        }
        OutputFormat::Table => {
            println!("Cluster Metadata");
            println!("{}", "=".repeat(40));
            println!("Term:      {}", metadata.term);
            println!("Nodes:     {}", metadata.nodes.len());
            println!("Copy sets: {}", metadata.copy_sets.len());
            println!();
            println!(
                "{:<4} {:<12} {:<24} SERVERS",
                "ID", "LEADER", "INTERVAL"
            );
            println!("{}", "-".repeat(70));
            for set in &metadata.copy_sets {
                let servers: Vec<&str> = set.servers.iter().map(NodeId::as_str).collect();
                println!(
                    "{:<4} {:<12} {:<24} {}",
                    set.id,
                    set.leader,
                    format_interval(&set.data_interval),
                    servers.join(",")
                );
            }
        }
    }
    Ok(())
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn handle_plan(args: PlanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let nodes = parse_nodes(&args.nodes);
    let placement = &args.placement;

    let assembler = MetadataAssembler::new(
        CopySetBuilder::new(placement.replica_count, placement.scatter_width)
            .with_seed(placement.seed),
    );
    let jobs = MemoryJobStore::evenly_spaced(placement.jobs, placement.job_spacing);
    let mut leaders = LeaderRegistry::new();

    let metadata = assembler.assemble(0, nodes, &jobs, &mut leaders).await?;
    print_metadata(&metadata, &placement.output)
}

async fn handle_simulate(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let placement = &args.placement;
    let config = CoordinatorConfig::new(
        placement.replica_count,
        args.least_node_count,
        placement.scatter_width,
    )
    .with_quorum_poll_interval_ms(args.quorum_poll_interval_ms)
    .with_placement_seed(placement.seed);

    let registry = Arc::new(MemoryRegistry::new());
    let coordinator = Arc::new(Coordinator::new(
        config,
        registry.clone(),
        Arc::new(LocalElection::granting()),
        Arc::new(MemoryJobStore::evenly_spaced(
            placement.jobs,
            placement.job_spacing,
        )),
    )?);

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    let mut reports = coordinator.subscribe_reports();
    let runner = {
        let coordinator = coordinator.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { coordinator.run(shutdown).await })
    };

    let joiner = {
        let registry = registry.clone();
        let shutdown = shutdown.clone();
        let count = args.nodes;
        let interval = Duration::from_millis(args.join_interval_ms);
        tokio::spawn(async move {
            for i in 1..=count {
                let node = NodeId::new(format!("node-{}", i));
                tracing::info!(node = %node, "Joining node");
                registry.add_node(node).await;
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        })
    };

    let report = tokio::select! {
        _ = shutdown.cancelled() => None,
        changed = reports.wait_for(Option::is_some) => {
            changed.ok().and_then(|report| report.clone())
        }
    };

    shutdown.cancel();
    joiner.abort();
    runner.await??;

    match report {
        Some(report) => match report.result {
            Ok(TermOutcome::Published(metadata)) => {
                print_metadata(&metadata, &placement.output)?;
            }
            Ok(TermOutcome::Discarded) => {
                eprintln!("Term {} ended before metadata was published", report.term);
            }
            Err(e) => {
                eprintln!("Error: term {} failed: {}", report.term, e);
                std::process::exit(1);
            }
        },
        None => eprintln!("Stopped before any metadata was computed"),
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Plan(plan_args) => handle_plan(plan_args).await?,
        Commands::Simulate(simulate_args) => handle_simulate(simulate_args).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_nodes_trims_and_skips_empty() {
        let nodes = parse_nodes(" a, b,,c ,");
        let nodes: Vec<&str> = nodes.iter().map(NodeId::as_str).collect();
        assert_eq!(nodes, vec!["a", "b", "c"]);
        assert!(parse_nodes("").is_empty());
    }

    #[test]
    fn format_interval_forms() {
        assert_eq!(
            format_interval(&DataInterval::Bounded { start: 1, end: 5 }),
            "[1, 5)"
        );
        assert_eq!(format_interval(&DataInterval::Open { start: 5 }), "[5, ..)");
    }

    #[test]
    fn args_parse_plan() {
        let args = Args::try_parse_from([
            "copyset-lite",
            "plan",
            "--nodes",
            "a,b,c",
            "--replica-count",
            "2",
            "-o",
            "json",
        ])
        .unwrap();
        match args.command {
            Commands::Plan(plan) => {
                assert_eq!(plan.nodes, "a,b,c");
                assert_eq!(plan.placement.replica_count, 2);
                assert_eq!(plan.placement.scatter_width, 2);
                assert!(matches!(plan.placement.output, OutputFormat::Json));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
