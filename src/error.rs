use thiserror::Error;

use crate::graph::ResourceId;
use crate::scheduler::job::{JobIndex, NodeIndex};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown work node: {0}")]
    UnknownNode(NodeIndex),

    #[error("Job index {0} was never allocated to any node")]
    UnknownJob(JobIndex),

    #[error("Template for node {node} could not be resolved: {reason}")]
    TemplateUnresolved { node: NodeIndex, reason: String },

    #[error("Job {0} was started twice")]
    DoubleStart(JobIndex),

    #[error("Job {0} was reported complete but never started")]
    CompletedBeforeStart(JobIndex),

    #[error("Job {0} was reported complete twice")]
    DoubleCompletion(JobIndex),

    #[error("Job {0} was marked as output twice")]
    DoubleOutput(JobIndex),

    #[error("Engine refused the call after an earlier protocol violation")]
    Poisoned,

    #[error("Edge {from} -> {to} would create a cycle")]
    CycleDetected { from: NodeIndex, to: NodeIndex },

    #[error("Node {node} cannot be extended: resource {resource} was already released")]
    ResourceReleased { node: NodeIndex, resource: ResourceId },

    #[error("Invalid job definition: {0}")]
    InvalidDefinition(String),

    #[error("Invalid ledger snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Coordinator is no longer running")]
    CoordinatorClosed,
}

impl EngineError {
    /// Protocol violations indicate a coordinator/worker bug and poison the engine.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            EngineError::DoubleStart(_)
                | EngineError::CompletedBeforeStart(_)
                | EngineError::DoubleCompletion(_)
                | EngineError::DoubleOutput(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
