use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::graph::{JobGraph, ResourceId};
use crate::jobdef::{JobDefinition, JobEntry};
use crate::ledger::{IntervalSet, JobLedger, LedgerSnapshot};
use crate::resources::ResourceLifetimeTracker;
use crate::scheduler::allocation::NodeAllocationTracker;
use crate::scheduler::enumerator::JobEnumerator;
use crate::scheduler::job::{CompletionStatus, JobDescriptor, JobIndex, NodeIndex};

/// Summary of where a campaign stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CampaignProgress {
    pub nodes: usize,
    pub nodes_fully_assigned: usize,
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub outstanding: u64,
    pub output: u64,
    pub results_total: u64,
}

/// Single owner of the job graph, allocation tracker, ledger and resource
/// tracker.
///
/// Every mutating call takes `&mut self`, so mutations are serialized by
/// construction; the [`Coordinator`](crate::coordinator::Coordinator) wraps
/// an engine to serve many workers. After a protocol violation (double
/// start, completion of a never started or already completed job) the engine is
/// poisoned and refuses further mutations.
#[derive(Debug)]
pub struct Engine {
    graph: JobGraph,
    allocation: NodeAllocationTracker,
    ledger: JobLedger,
    resources: ResourceLifetimeTracker,
    poisoned: bool,
}

impl Engine {
    pub fn new(def: &JobDefinition, config: EngineConfig) -> Result<Self> {
        let graph = JobGraph::create_initial(def, config)?;
        Ok(Self::from_graph(graph))
    }

    pub fn from_graph(graph: JobGraph) -> Self {
        let mut engine = Self {
            allocation: NodeAllocationTracker::new(),
            ledger: JobLedger::new(),
            resources: ResourceLifetimeTracker::new(graph.config().retain_inputs),
            graph,
            poisoned: false,
        };
        let nodes: Vec<NodeIndex> = engine.graph.nodes().iter().map(|n| n.index).collect();
        for node in nodes {
            engine.track_node(node);
        }
        engine
    }

    fn track_node(&mut self, node: NodeIndex) {
        let Ok(work_node) = self.graph.node(node) else {
            return;
        };
        self.allocation.add_node(work_node.nstruct);
        if let Ok(template) = self.graph.template(node) {
            if let Some(info) = self.graph.resource(template.resource) {
                self.resources.register_reference(info.id, info.origin, node);
            }
        }
    }

    fn guard(&self) -> Result<()> {
        if self.poisoned {
            return Err(EngineError::Poisoned);
        }
        Ok(())
    }

    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_protocol_violation() {
                tracing::error!(error = %err, "Protocol violation, engine poisoned");
                self.poisoned = true;
            }
        }
        result
    }

    /// Hand out up to `max_count` jobs of `node`, marking each one started.
    ///
    /// Returns an empty batch when the node is exhausted or is still waiting
    /// on an upstream node.
    pub fn next_batch(&mut self, node: NodeIndex, max_count: u64) -> Result<Vec<JobDescriptor>> {
        self.guard()?;
        if !self.is_ready(node)? {
            tracing::warn!(node, "Work node requested before its dependencies finished");
            return Ok(Vec::new());
        }
        let result = JobEnumerator::new(
            &self.graph,
            &mut self.allocation,
            &mut self.ledger,
            &mut self.resources,
        )
        .next_batch(node, max_count);
        self.check(result)
    }

    /// Record a job's outcome. Returns the node that owns the job.
    pub fn report(
        &mut self,
        index: JobIndex,
        status: CompletionStatus,
        result_count: u64,
    ) -> Result<NodeIndex> {
        self.guard()?;
        let result = self.ledger.mark_completed(index, status, result_count);
        self.check(result)?;
        let node = self
            .allocation
            .owning_node(index)
            .ok_or(EngineError::UnknownJob(index))?;
        tracing::debug!(node, job_index = index, status = %status, result_count, "Job completed");
        Ok(node)
    }

    pub fn mark_output(&mut self, index: JobIndex) -> Result<()> {
        self.guard()?;
        if self.allocation.owning_node(index).is_none() {
            return Err(EngineError::UnknownJob(index));
        }
        let result = self.ledger.mark_output(index);
        self.check(result)
    }

    pub fn poll_deallocation_advisories(&mut self) -> Result<Vec<ResourceId>> {
        self.guard()?;
        self.resources.poll_deallocation_advisories(&self.allocation)
    }

    /// A node is ready once every upstream node is fully assigned and has no
    /// outstanding jobs.
    pub fn is_ready(&self, node: NodeIndex) -> Result<bool> {
        self.graph.node(node)?;
        for upstream in self.graph.upstream(node) {
            if !self.allocation.is_fully_assigned(upstream)? {
                return Ok(false);
            }
            for range in self.allocation.ranges(upstream)? {
                if self.ledger.outstanding_in_range(range.start, range.end) > 0 {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Lowest-indexed node that still has jobs and is ready to hand them out.
    pub fn next_ready_node(&self) -> Option<NodeIndex> {
        self.graph.nodes().iter().map(|n| n.index).find(|&node| {
            matches!(self.allocation.is_fully_assigned(node), Ok(false))
                && matches!(self.is_ready(node), Ok(true))
        })
    }

    /// Append nodes discovered after startup.
    pub fn add_nodes(&mut self, entries: &[JobEntry]) -> Result<Vec<NodeIndex>> {
        self.guard()?;
        let added = self.graph.update(entries);
        for &node in &added {
            self.track_node(node);
        }
        Ok(added)
    }

    pub fn add_edge(&mut self, upstream: NodeIndex, downstream: NodeIndex) -> Result<()> {
        self.guard()?;
        self.graph.add_edge(upstream, downstream)
    }

    /// Raise a node's replicate count; a fully assigned node is reopened.
    ///
    /// Refused once the node's resource has been advised for deallocation.
    pub fn extend_nstruct(&mut self, node: NodeIndex, additional: u64) -> Result<u64> {
        self.guard()?;
        if let Ok(template) = self.graph.template(node) {
            if self.resources.is_advised(template.resource) {
                return Err(EngineError::ResourceReleased {
                    node,
                    resource: template.resource,
                });
            }
        }
        self.graph.node_mut(node)?.nstruct += additional;
        self.allocation.extend_nstruct(node, additional)
    }

    pub fn set_node_label(&mut self, node: NodeIndex, label: impl Into<String>) -> Result<()> {
        self.graph.set_node_label(node, label)
    }

    /// Load a ledger persisted by an earlier run of the same campaign.
    ///
    /// Only allowed before any job is handed out. Jobs the earlier run
    /// started but never completed are forgotten so they are issued again.
    pub fn restore_ledger(&mut self, snapshot: &LedgerSnapshot) -> Result<()> {
        self.guard()?;
        if self.allocation.next_index() != 1 {
            return Err(EngineError::InvalidSnapshot(
                "a ledger can only be restored before jobs are handed out".to_string(),
            ));
        }
        let mut ledger = JobLedger::from_snapshot(snapshot)?;
        let forgotten = ledger.forget_outstanding();
        tracing::info!(
            campaign_id = %ledger.campaign_id(),
            completed = ledger.completed().len(),
            output = ledger.output().len(),
            forgotten,
            "Restored job ledger"
        );
        self.ledger = ledger;
        Ok(())
    }

    pub fn is_started(&self, index: JobIndex) -> bool {
        self.ledger.is_started(index)
    }

    pub fn is_completed(&self, index: JobIndex) -> bool {
        self.ledger.is_completed(index)
    }

    pub fn is_successful(&self, index: JobIndex) -> bool {
        self.ledger.is_successful(index)
    }

    pub fn is_failed(&self, index: JobIndex) -> bool {
        self.ledger.is_failed(index)
    }

    pub fn is_output(&self, index: JobIndex) -> bool {
        self.ledger.is_output(index)
    }

    pub fn is_fully_assigned(&self, node: NodeIndex) -> Result<bool> {
        self.allocation.is_fully_assigned(node)
    }

    pub fn owning_node(&self, index: JobIndex) -> Option<NodeIndex> {
        self.allocation.owning_node(index)
    }

    fn node_view(&self, node: NodeIndex, set: &IntervalSet) -> Result<IntervalSet> {
        let mut view = IntervalSet::new();
        for range in self.allocation.ranges(node)? {
            view = view.union(&set.intersection_with_range(range.start, range.end));
        }
        Ok(view)
    }

    pub fn started_jobs_for_node(&self, node: NodeIndex) -> Result<IntervalSet> {
        self.node_view(node, self.ledger.started())
    }

    pub fn completed_jobs_for_node(&self, node: NodeIndex) -> Result<IntervalSet> {
        self.node_view(node, &self.ledger.completed())
    }

    /// Succeeded jobs of every upstream node, handed to the maturation step
    /// of a downstream job.
    pub fn prior_results(&self, node: NodeIndex) -> Result<IntervalSet> {
        let mut prior = IntervalSet::new();
        for upstream in self.graph.upstream(node) {
            prior = prior.union(&self.node_view(upstream, self.ledger.succeeded())?);
        }
        Ok(prior)
    }

    pub fn all_nodes_exhausted(&self) -> bool {
        self.allocation.all_fully_assigned()
    }

    /// Every node is exhausted and every handed-out job has reported back.
    pub fn is_finished(&self) -> bool {
        self.all_nodes_exhausted() && self.ledger.outstanding() == 0
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn progress(&self) -> CampaignProgress {
        let nodes_fully_assigned = self
            .graph
            .nodes()
            .iter()
            .filter(|n| matches!(self.allocation.is_fully_assigned(n.index), Ok(true)))
            .count();
        CampaignProgress {
            nodes: self.graph.num_nodes(),
            nodes_fully_assigned,
            started: self.ledger.started().len(),
            succeeded: self.ledger.succeeded().len(),
            failed: self.ledger.failed().len(),
            outstanding: self.ledger.outstanding(),
            output: self.ledger.output().len(),
            results_total: self.ledger.results_total(),
        }
    }

    pub fn graph(&self) -> &JobGraph {
        &self.graph
    }

    pub fn allocation(&self) -> &NodeAllocationTracker {
        &self.allocation
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    pub fn resources(&self) -> &ResourceLifetimeTracker {
        &self.resources
    }
}
