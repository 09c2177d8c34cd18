//! Workers pull batches from the coordinator and run them.
//!
//! # Components
//!
//! - [`JobMaturer`]: external hook that prepares a descriptor for execution
//! - [`ExecutableJob`]: the prepared job, run on a blocking thread
//! - [`JobExecutor`]: matures and runs one descriptor
//! - [`Worker`]: the pull loop
//!
//! # Execution Flow
//!
//! 1. Ask the coordinator for a batch from the next ready node
//! 2. Mature and run each descriptor via [`JobExecutor::execute`]
//! 3. Report each outcome, and mark output for jobs that wrote results
//! 4. Back off while upstream work drains; stop once every node is exhausted

pub mod executor;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::coordinator::CoordinatorHandle;
use crate::error::Result;

pub use executor::{ExecutableJob, JobExecutor, JobMaturer, JobOutcome};

/// Totals for one worker's run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub jobs_run: u64,
    pub succeeded: u64,
    pub failed: u64,
}

pub struct Worker {
    config: WorkerConfig,
    executor: JobExecutor,
}

impl Worker {
    pub fn new(config: WorkerConfig, maturer: Arc<dyn JobMaturer>) -> Self {
        Self {
            config,
            executor: JobExecutor::new(maturer),
        }
    }

    pub async fn run(
        self,
        handle: CoordinatorHandle,
        shutdown: CancellationToken,
    ) -> Result<WorkerSummary> {
        let worker_id = self.config.worker_id;
        let idle = Duration::from_millis(self.config.idle_poll_ms);
        // A zero-sized request can never make progress.
        let batch_size = self.config.batch_size.max(1);
        let mut summary = WorkerSummary::default();
        tracing::info!(worker_id, batch_size, "Worker started");

        while !shutdown.is_cancelled() {
            let reply = handle.request_any(batch_size).await?;

            if reply.jobs.is_empty() {
                if reply.exhausted {
                    break;
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(idle) => continue,
                }
            }

            let prior_results = Arc::new(reply.prior_results);
            for descriptor in reply.jobs {
                let index = descriptor.index;
                let outcome = self
                    .executor
                    .execute(descriptor, Arc::clone(&prior_results))
                    .await;
                handle
                    .report(index, outcome.status, outcome.result_count)
                    .await?;
                if outcome.output_written {
                    handle.mark_output(index).await?;
                }

                summary.jobs_run += 1;
                if outcome.status.is_success() {
                    summary.succeeded += 1;
                } else {
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            worker_id,
            jobs_run = summary.jobs_run,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Worker stopped"
        );
        Ok(summary)
    }
}
