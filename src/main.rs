use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use replica_sched::config::{CoordinatorConfig, EngineConfig, WorkerConfig};
use replica_sched::coordinator::{Coordinator, CoordinatorHandle};
use replica_sched::engine::{CampaignProgress, Engine};
use replica_sched::error::Result as EngineResult;
use replica_sched::graph::{ResourceId, ResourceInfo};
use replica_sched::jobdef::JobDefinition;
use replica_sched::ledger::{IntervalSet, LedgerSnapshot};
use replica_sched::scheduler::{CompletionStatus, JobDescriptor, NodeIndex};
use replica_sched::shutdown::install_shutdown_handler;
use replica_sched::worker::{ExecutableJob, JobMaturer, JobOutcome, Worker, WorkerSummary};

#[derive(Parser, Debug)]
#[command(name = "replica-sched")]
#[command(version)]
#[command(about = "Replicate job scheduler for large sampling campaigns")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a simulated campaign against a job definition
    Run(RunArgs),

    /// Print the job graph built from a job definition
    Plan {
        /// Path to the job definition (JSON)
        #[arg(long)]
        definition: PathBuf,

        /// Output format
        #[arg(long, short = 'o', default_value = "json")]
        output: OutputFormat,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the job definition (JSON)
    #[arg(long)]
    definition: PathBuf,

    /// Number of concurrent workers
    #[arg(long, default_value = "4")]
    workers: u64,

    /// Jobs requested per round trip to the coordinator
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: u64,

    /// Keep pool inputs loaded for the whole campaign
    #[arg(long)]
    retain_inputs: bool,

    /// Fail every K-th replicate of each node (0 disables)
    #[arg(long, default_value = "0")]
    fail_every: u64,

    /// Write the final job ledger to this path
    #[arg(long)]
    ledger_out: Option<PathBuf>,

    /// Resume from a ledger written by an earlier run
    #[arg(long)]
    resume: Option<PathBuf>,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// Simulated jobs
// =============================================================================

/// Stand-in for real job preparation: every replicate produces one result
/// unless it falls on the configured failure stride.
struct SimulatedMaturer {
    fail_every: u64,
}

struct SimulatedJob {
    fails: bool,
}

impl ExecutableJob for SimulatedJob {
    fn run(self: Box<Self>) -> JobOutcome {
        if self.fails {
            JobOutcome::failed(CompletionStatus::FailedRetryable)
        } else {
            JobOutcome::succeeded(1)
        }
    }
}

impl JobMaturer for SimulatedMaturer {
    fn mature(
        &self,
        descriptor: &JobDescriptor,
        _prior_results: &IntervalSet,
    ) -> EngineResult<Box<dyn ExecutableJob>> {
        let fails = self.fail_every > 0 && descriptor.replicate % self.fail_every == 0;
        Ok(Box::new(SimulatedJob { fails }))
    }
}

// =============================================================================
// Run
// =============================================================================

#[derive(Serialize)]
struct RunSummary {
    campaign_id: String,
    finished: bool,
    progress: CampaignProgress,
    advised_resources: Vec<ResourceId>,
    workers: Vec<WorkerOutput>,
}

#[derive(Serialize)]
struct WorkerOutput {
    worker_id: u64,
    jobs_run: u64,
    succeeded: u64,
    failed: u64,
}

async fn poll_advisories_until(
    handle: CoordinatorHandle,
    done: CancellationToken,
) -> Vec<ResourceId> {
    let mut advised = Vec::new();
    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                match handle.poll_advisories().await {
                    Ok(ids) => advised.extend(ids),
                    Err(e) => {
                        tracing::warn!(error = %e, "Advisory poll failed");
                        break;
                    }
                }
            }
        }
    }
    advised
}

async fn run_campaign(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let definition = JobDefinition::from_path(&args.definition)?;
    let config = EngineConfig::default().with_retain_inputs(args.retain_inputs);
    let mut engine = Engine::new(&definition, config)?;

    if let Some(path) = &args.resume {
        let contents = std::fs::read_to_string(path)?;
        let snapshot: LedgerSnapshot = serde_json::from_str(&contents)?;
        engine.restore_ledger(&snapshot)?;
    }

    let shutdown = install_shutdown_handler();
    let (coordinator, handle) = Coordinator::new(engine, CoordinatorConfig::default());
    let coordinator_task = tokio::spawn(coordinator.run(shutdown.clone()));

    let poller_done = CancellationToken::new();
    let poller = tokio::spawn(poll_advisories_until(handle.clone(), poller_done.clone()));

    let maturer: Arc<dyn JobMaturer> = Arc::new(SimulatedMaturer {
        fail_every: args.fail_every,
    });
    let mut worker_tasks = Vec::new();
    for worker_id in 1..=args.workers.max(1) {
        let worker = Worker::new(
            WorkerConfig::new(worker_id).with_batch_size(args.batch_size),
            Arc::clone(&maturer),
        );
        let task = tokio::spawn(worker.run(handle.clone(), shutdown.clone()));
        worker_tasks.push((worker_id, task));
    }

    let mut workers = Vec::new();
    for (worker_id, task) in worker_tasks {
        let summary: WorkerSummary = match task.await? {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(worker_id, error = %e, "Worker stopped with error");
                WorkerSummary::default()
            }
        };
        workers.push(WorkerOutput {
            worker_id,
            jobs_run: summary.jobs_run,
            succeeded: summary.succeeded,
            failed: summary.failed,
        });
    }

    poller_done.cancel();
    let mut advised_resources = poller.await?;
    if let Ok(ids) = handle.poll_advisories().await {
        advised_resources.extend(ids);
    }
    drop(handle);

    let engine = coordinator_task.await?;
    if let Some(path) = &args.ledger_out {
        engine.ledger().save_to_path(path)?;
        tracing::info!(path = %path.display(), "Saved job ledger");
    }

    let summary = RunSummary {
        campaign_id: engine.ledger().campaign_id().to_string(),
        finished: engine.is_finished(),
        progress: engine.progress(),
        advised_resources,
        workers,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

// =============================================================================
// Plan
// =============================================================================

#[derive(Serialize)]
struct PlanOutput {
    nodes: Vec<PlanNode>,
    resources: Vec<ResourceInfo>,
    edges: Vec<(NodeIndex, NodeIndex)>,
}

#[derive(Serialize)]
struct PlanNode {
    index: NodeIndex,
    nstruct: u64,
    label: Option<String>,
    tag: Option<String>,
    resource: Option<ResourceId>,
    error: Option<String>,
}

fn plan(definition: PathBuf, output: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let definition = JobDefinition::from_path(&definition)?;
    let engine = Engine::new(&definition, EngineConfig::default())?;
    let graph = engine.graph();

    let nodes: Vec<PlanNode> = graph
        .nodes()
        .iter()
        .map(|node| {
            let template = graph.template(node.index).ok();
            PlanNode {
                index: node.index,
                nstruct: node.nstruct,
                label: node.label.clone(),
                tag: template.as_ref().map(|t| t.tag.clone()),
                resource: template.as_ref().map(|t| t.resource),
                error: node.resolution_error().map(str::to_string),
            }
        })
        .collect();

    let plan = PlanOutput {
        nodes,
        resources: graph.resources().to_vec(),
        edges: graph.edges().collect(),
    };

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        OutputFormat::Table => {
            println!("{:<6} {:<10} {:<24} {:<10}", "NODE", "NSTRUCT", "TAG", "RESOURCE");
            println!("{}", "-".repeat(52));
            for node in &plan.nodes {
                println!(
                    "{:<6} {:<10} {:<24} {:<10}",
                    node.index,
                    node.nstruct,
                    node.tag.as_deref().unwrap_or("-"),
                    node.resource.map_or_else(|| "-".to_string(), |r| r.to_string()),
                );
                if let Some(error) = &node.error {
                    println!("       error: {}", error);
                }
            }
            for (upstream, downstream) in &plan.edges {
                println!("edge: {} -> {}", upstream, downstream);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match args.command {
        Commands::Run(run_args) => run_campaign(run_args).await?,
        Commands::Plan { definition, output } => plan(definition, output)?,
    }

    Ok(())
}
