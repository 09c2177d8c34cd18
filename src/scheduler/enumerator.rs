use crate::error::{EngineError, Result};
use crate::graph::JobGraph;
use crate::ledger::JobLedger;
use crate::resources::ResourceLifetimeTracker;
use crate::scheduler::allocation::{Allocation, NodeAllocationTracker};
use crate::scheduler::job::{JobDescriptor, JobIndex, NodeIndex};

/// Expands a work node into job descriptors one bounded batch at a time.
///
/// Borrows the engine's components for the duration of one call so that
/// allocating indices, marking them started and noting resource use happen
/// together.
pub struct JobEnumerator<'a> {
    graph: &'a JobGraph,
    allocation: &'a mut NodeAllocationTracker,
    ledger: &'a mut JobLedger,
    resources: &'a mut ResourceLifetimeTracker,
    skip_output: bool,
}

impl<'a> JobEnumerator<'a> {
    pub fn new(
        graph: &'a JobGraph,
        allocation: &'a mut NodeAllocationTracker,
        ledger: &'a mut JobLedger,
        resources: &'a mut ResourceLifetimeTracker,
    ) -> Self {
        Self {
            skip_output: graph.config().skip_output_indices,
            graph,
            allocation,
            ledger,
            resources,
        }
    }

    /// Up to `max_count` new descriptors for `node`, each already marked
    /// started. An empty batch means the node has no jobs left to give.
    ///
    /// A node whose template cannot be resolved is closed with zero jobs; the
    /// error is returned from the call that discovers it and later calls
    /// return an empty batch.
    pub fn next_batch(&mut self, node: NodeIndex, max_count: u64) -> Result<Vec<JobDescriptor>> {
        if self.allocation.is_fully_assigned(node)? || max_count == 0 {
            return Ok(Vec::new());
        }

        let template = match self.graph.template(node) {
            Ok(template) => template,
            Err(err @ EngineError::TemplateUnresolved { .. }) => {
                self.allocation.close(node)?;
                tracing::warn!(node, error = %err, "Closing work node with zero jobs");
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let mut batch = Vec::new();
        while (batch.len() as u64) < max_count {
            let allocation = self
                .allocation
                .request(node, max_count - batch.len() as u64)?;
            if allocation.is_empty() {
                break;
            }
            let last = allocation.start + allocation.count - 1;
            self.resources.note_assigned(template.resource, last);

            if self.has_recorded(&allocation) {
                for (index, replicate) in allocation.jobs() {
                    if self.is_recorded(index) {
                        tracing::debug!(node, job_index = index, "Skipping job already recorded");
                        continue;
                    }
                    self.ledger.mark_started(index)?;
                    batch.push(JobDescriptor {
                        index,
                        node,
                        replicate,
                        template: template.clone(),
                    });
                }
            } else {
                self.ledger
                    .mark_started_range(allocation.start, allocation.count)?;
                batch.extend(allocation.jobs().map(|(index, replicate)| JobDescriptor {
                    index,
                    node,
                    replicate,
                    template: template.clone(),
                }));
            }
        }

        tracing::debug!(node, count = batch.len(), "Enumerated job batch");
        Ok(batch)
    }

    /// Completed indices from a restored ledger are never reissued. Indices
    /// that only wrote output are skipped when `skip_output_indices` is set.
    fn is_recorded(&self, index: JobIndex) -> bool {
        self.ledger.is_completed(index) || (self.skip_output && self.ledger.is_output(index))
    }

    fn has_recorded(&self, allocation: &Allocation) -> bool {
        let end = allocation.start + allocation.count - 1;
        self.ledger.succeeded().count_in_range(allocation.start, end) > 0
            || self.ledger.failed().count_in_range(allocation.start, end) > 0
            || (self.skip_output && self.ledger.output().count_in_range(allocation.start, end) > 0)
    }
}
