use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::graph::JobTemplate;

/// Process-wide, 1-based, monotonically assigned job index.
pub type JobIndex = u64;

/// 1-based index of a work node in the job graph.
pub type NodeIndex = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompletionStatus {
    Succeeded,
    /// Failed after exhausting whatever retries the worker applies.
    FailedRetryable,
    FailedDoNotRetry,
    /// The inputs for the job could not be used.
    BadInputs,
    FailedWithException,
}

impl CompletionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, CompletionStatus::Succeeded)
    }
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionStatus::Succeeded => write!(f, "succeeded"),
            CompletionStatus::FailedRetryable => write!(f, "failed_retryable"),
            CompletionStatus::FailedDoNotRetry => write!(f, "failed_do_not_retry"),
            CompletionStatus::BadInputs => write!(f, "bad_inputs"),
            CompletionStatus::FailedWithException => write!(f, "failed_with_exception"),
        }
    }
}

/// Lightweight per-job handle given to workers.
///
/// The template is shared with every other descriptor of the same node; only
/// the index triple is unique to this job.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub index: JobIndex,
    pub node: NodeIndex,
    /// 1-based replicate number within the node.
    pub replicate: u64,
    pub template: Arc<JobTemplate>,
}

impl JobDescriptor {
    /// Tag used to name this job's outputs, e.g. `1ubq_0003`.
    pub fn output_tag(&self) -> String {
        format!("{}_{:04}", self.template.tag, self.replicate)
    }
}
