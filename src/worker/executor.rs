use std::sync::Arc;

use crate::error::Result;
use crate::ledger::IntervalSet;
use crate::scheduler::job::{CompletionStatus, JobDescriptor, JobIndex};

/// What a worker observed after running one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    pub status: CompletionStatus,
    pub result_count: u64,
    /// The job's results were written to persistent storage.
    pub output_written: bool,
}

impl JobOutcome {
    pub fn succeeded(result_count: u64) -> Self {
        Self {
            status: CompletionStatus::Succeeded,
            result_count,
            output_written: true,
        }
    }

    pub fn failed(status: CompletionStatus) -> Self {
        Self {
            status,
            result_count: 0,
            output_written: false,
        }
    }
}

/// A job ready to execute. Runs on a blocking thread.
pub trait ExecutableJob: Send {
    fn run(self: Box<Self>) -> JobOutcome;
}

/// Turns a descriptor into something executable.
///
/// Fed the descriptor's template and the succeeded jobs of upstream nodes.
/// An error means the job's inputs could not be prepared; the job is then
/// reported as [`CompletionStatus::BadInputs`].
pub trait JobMaturer: Send + Sync + 'static {
    fn mature(
        &self,
        descriptor: &JobDescriptor,
        prior_results: &IntervalSet,
    ) -> Result<Box<dyn ExecutableJob>>;
}

/// Matures and runs jobs off the async runtime.
#[derive(Clone)]
pub struct JobExecutor {
    maturer: Arc<dyn JobMaturer>,
}

impl JobExecutor {
    pub fn new(maturer: Arc<dyn JobMaturer>) -> Self {
        Self { maturer }
    }

    pub async fn execute(
        &self,
        descriptor: JobDescriptor,
        prior_results: Arc<IntervalSet>,
    ) -> JobOutcome {
        let index = descriptor.index;
        let maturer = Arc::clone(&self.maturer);
        let result = tokio::task::spawn_blocking(move || {
            maturer
                .mature(&descriptor, &prior_results)
                .map(|job| job.run())
        })
        .await;

        Self::process_result(index, result)
    }

    fn process_result(
        index: JobIndex,
        result: std::result::Result<Result<JobOutcome>, tokio::task::JoinError>,
    ) -> JobOutcome {
        match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::warn!(job_index = index, error = %e, "Job maturation failed");
                JobOutcome::failed(CompletionStatus::BadInputs)
            }
            Err(e) => {
                tracing::error!(job_index = index, error = %e, "Job panicked during execution");
                JobOutcome::failed(CompletionStatus::FailedWithException)
            }
        }
    }
}
