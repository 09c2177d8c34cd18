//! Serialized access to an [`Engine`] for many concurrent workers.
//!
//! The coordinator task owns the engine outright. Workers hold a cloneable
//! [`CoordinatorHandle`] and talk to it over an mpsc channel; each message
//! carries a oneshot sender for the reply. Messages are handled one at a
//! time, so no two engine mutations ever interleave.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::CoordinatorConfig;
use crate::engine::{CampaignProgress, Engine};
use crate::error::{EngineError, Result};
use crate::graph::ResourceId;
use crate::ledger::IntervalSet;
use crate::scheduler::job::{CompletionStatus, JobDescriptor, JobIndex, NodeIndex};

/// Reply to a batch request.
#[derive(Debug, Clone, Default)]
pub struct BatchReply {
    /// Node the jobs came from; `None` when no jobs were handed out.
    pub node: Option<NodeIndex>,
    pub jobs: Vec<JobDescriptor>,
    /// Succeeded upstream jobs the batch's node consumes.
    pub prior_results: IntervalSet,
    /// No node has jobs left to hand out.
    pub exhausted: bool,
}

/// Message types for the coordinator event loop
#[derive(Debug)]
pub enum CoordinatorMessage {
    /// Request jobs from one node, or from the next ready node when `node` is `None`
    RequestBatch {
        node: Option<NodeIndex>,
        max_count: u64,
        response_tx: oneshot::Sender<Result<BatchReply>>,
    },
    /// A worker observed a job's outcome
    Report {
        index: JobIndex,
        status: CompletionStatus,
        result_count: u64,
        response_tx: oneshot::Sender<Result<NodeIndex>>,
    },
    /// A job's results reached persistent storage
    MarkOutput {
        index: JobIndex,
        response_tx: oneshot::Sender<Result<()>>,
    },
    PollAdvisories {
        response_tx: oneshot::Sender<Result<Vec<ResourceId>>>,
    },
    Progress {
        response_tx: oneshot::Sender<CampaignProgress>,
    },
    NextReadyNode {
        response_tx: oneshot::Sender<Option<NodeIndex>>,
    },
}

pub struct Coordinator {
    engine: Engine,
    config: CoordinatorConfig,
    message_rx: mpsc::Receiver<CoordinatorMessage>,
}

impl Coordinator {
    pub fn new(engine: Engine, config: CoordinatorConfig) -> (Self, CoordinatorHandle) {
        let (message_tx, message_rx) = mpsc::channel(config.channel_capacity);
        let coordinator = Self {
            engine,
            config,
            message_rx,
        };
        (coordinator, CoordinatorHandle { message_tx })
    }

    /// Run until every handle is dropped or `shutdown` is cancelled, then
    /// hand the engine back so its ledger can be inspected or persisted.
    pub async fn run(mut self, shutdown: CancellationToken) -> Engine {
        tracing::info!(
            nodes = self.engine.graph().num_nodes(),
            max_batch_size = self.config.max_batch_size,
            "Coordinator started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Coordinator shutting down");
                    break;
                }
                msg = self.message_rx.recv() => {
                    let Some(msg) = msg else {
                        tracing::info!("All coordinator handles dropped, stopping");
                        break;
                    };
                    self.handle(msg);
                }
            }
        }

        let progress = self.engine.progress();
        tracing::info!(
            started = progress.started,
            succeeded = progress.succeeded,
            failed = progress.failed,
            outstanding = progress.outstanding,
            "Coordinator stopped"
        );
        self.engine
    }

    fn handle(&mut self, msg: CoordinatorMessage) {
        match msg {
            CoordinatorMessage::RequestBatch {
                node,
                max_count,
                response_tx,
            } => {
                let max_count = max_count.min(self.config.max_batch_size);
                let result = match node {
                    _ if max_count == 0 => Ok(BatchReply {
                        exhausted: self.engine.all_nodes_exhausted(),
                        ..Default::default()
                    }),
                    Some(node) => self.batch_for(node, max_count),
                    None => self.batch_for_any(max_count),
                };
                let _ = response_tx.send(result);
            }
            CoordinatorMessage::Report {
                index,
                status,
                result_count,
                response_tx,
            } => {
                let _ = response_tx.send(self.engine.report(index, status, result_count));
            }
            CoordinatorMessage::MarkOutput { index, response_tx } => {
                let _ = response_tx.send(self.engine.mark_output(index));
            }
            CoordinatorMessage::PollAdvisories { response_tx } => {
                let _ = response_tx.send(self.engine.poll_deallocation_advisories());
            }
            CoordinatorMessage::Progress { response_tx } => {
                let _ = response_tx.send(self.engine.progress());
            }
            CoordinatorMessage::NextReadyNode { response_tx } => {
                let _ = response_tx.send(self.engine.next_ready_node());
            }
        }
    }

    fn batch_for(&mut self, node: NodeIndex, max_count: u64) -> Result<BatchReply> {
        let jobs = self.engine.next_batch(node, max_count)?;
        let prior_results = if jobs.is_empty() {
            IntervalSet::new()
        } else {
            self.engine.prior_results(node)?
        };
        Ok(BatchReply {
            node: (!jobs.is_empty()).then_some(node),
            jobs,
            prior_results,
            exhausted: self.engine.all_nodes_exhausted(),
        })
    }

    fn batch_for_any(&mut self, max_count: u64) -> Result<BatchReply> {
        while let Some(node) = self.engine.next_ready_node() {
            match self.batch_for(node, max_count) {
                // An empty batch only moves us forward if it closed the node.
                Ok(reply) if reply.jobs.is_empty() => {
                    if matches!(self.engine.is_fully_assigned(node), Ok(true)) {
                        continue;
                    }
                    return Ok(reply);
                }
                Ok(reply) => return Ok(reply),
                // The node is closed now; move on to the next one.
                Err(EngineError::TemplateUnresolved { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(BatchReply {
            exhausted: self.engine.all_nodes_exhausted(),
            ..Default::default()
        })
    }
}

/// Cloneable client side of a running [`Coordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    message_tx: mpsc::Sender<CoordinatorMessage>,
}

impl CoordinatorHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> CoordinatorMessage,
    ) -> Result<T> {
        let (response_tx, response_rx) = oneshot::channel();
        self.message_tx
            .send(make(response_tx))
            .await
            .map_err(|_| EngineError::CoordinatorClosed)?;
        response_rx.await.map_err(|_| EngineError::CoordinatorClosed)
    }

    pub async fn request_batch(&self, node: NodeIndex, max_count: u64) -> Result<BatchReply> {
        self.call(|response_tx| CoordinatorMessage::RequestBatch {
            node: Some(node),
            max_count,
            response_tx,
        })
        .await?
    }

    /// Jobs from whichever node is next ready.
    pub async fn request_any(&self, max_count: u64) -> Result<BatchReply> {
        self.call(|response_tx| CoordinatorMessage::RequestBatch {
            node: None,
            max_count,
            response_tx,
        })
        .await?
    }

    pub async fn report(
        &self,
        index: JobIndex,
        status: CompletionStatus,
        result_count: u64,
    ) -> Result<NodeIndex> {
        self.call(|response_tx| CoordinatorMessage::Report {
            index,
            status,
            result_count,
            response_tx,
        })
        .await?
    }

    pub async fn mark_output(&self, index: JobIndex) -> Result<()> {
        self.call(|response_tx| CoordinatorMessage::MarkOutput { index, response_tx })
            .await?
    }

    pub async fn poll_advisories(&self) -> Result<Vec<ResourceId>> {
        self.call(|response_tx| CoordinatorMessage::PollAdvisories { response_tx })
            .await?
    }

    pub async fn progress(&self) -> Result<CampaignProgress> {
        self.call(|response_tx| CoordinatorMessage::Progress { response_tx })
            .await
    }

    pub async fn next_ready_node(&self) -> Result<Option<NodeIndex>> {
        self.call(|response_tx| CoordinatorMessage::NextReadyNode { response_tx })
            .await
    }
}
