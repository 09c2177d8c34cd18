use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::graph::{ResourceId, ResourceOrigin};
use crate::scheduler::allocation::NodeAllocationTracker;
use crate::scheduler::job::{JobIndex, NodeIndex};

#[derive(Debug, Clone)]
struct ResourceEntry {
    origin: ResourceOrigin,
    nodes: BTreeSet<NodeIndex>,
    advised: bool,
    last_job: Option<JobIndex>,
}

/// Reference counts shared input resources by the work nodes that use them.
///
/// Once every referencing node is fully assigned no descriptor will ever point
/// at the resource again, and a single deallocation advisory is emitted for it.
#[derive(Debug, Clone, Default)]
pub struct ResourceLifetimeTracker {
    entries: BTreeMap<ResourceId, ResourceEntry>,
    retain_inputs: bool,
}

impl ResourceLifetimeTracker {
    pub fn new(retain_inputs: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            retain_inputs,
        }
    }

    pub fn register_reference(
        &mut self,
        resource: ResourceId,
        origin: ResourceOrigin,
        node: NodeIndex,
    ) {
        let entry = self.entries.entry(resource).or_insert_with(|| ResourceEntry {
            origin,
            nodes: BTreeSet::new(),
            advised: false,
            last_job: None,
        });
        if entry.advised {
            tracing::warn!(
                resource,
                node,
                "Node references a resource that was already advised for deallocation"
            );
        }
        entry.nodes.insert(node);
    }

    /// Record that jobs up to `last_index` were handed out against `resource`.
    pub fn note_assigned(&mut self, resource: ResourceId, last_index: JobIndex) {
        if let Some(entry) = self.entries.get_mut(&resource) {
            entry.last_job = Some(entry.last_job.map_or(last_index, |j| j.max(last_index)));
        }
    }

    pub fn last_job_for_resource(&self, resource: ResourceId) -> Option<JobIndex> {
        self.entries.get(&resource).and_then(|e| e.last_job)
    }

    fn retained(&self, entry: &ResourceEntry) -> bool {
        self.retain_inputs && entry.origin == ResourceOrigin::Pool
    }

    /// Resources whose last consumer just became fully assigned.
    ///
    /// Each resource is returned at most once over the tracker's lifetime.
    pub fn poll_deallocation_advisories(
        &mut self,
        allocation: &NodeAllocationTracker,
    ) -> Result<Vec<ResourceId>> {
        let mut ready = Vec::new();
        for (&resource, entry) in &self.entries {
            if entry.advised || self.retained(entry) {
                continue;
            }
            let mut drained = true;
            for &node in &entry.nodes {
                if !allocation.is_fully_assigned(node)? {
                    drained = false;
                    break;
                }
            }
            if drained {
                ready.push(resource);
            }
        }

        for resource in &ready {
            if let Some(entry) = self.entries.get_mut(resource) {
                entry.advised = true;
            }
            tracing::info!(resource, "Input resource may be deallocated");
        }
        Ok(ready)
    }

    pub fn is_advised(&self, resource: ResourceId) -> bool {
        self.entries.get(&resource).is_some_and(|e| e.advised)
    }

    /// Resources that have not been advised yet, retained ones included.
    pub fn pending_resources(&self) -> Vec<ResourceId> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.advised)
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn referencing_nodes(&self, resource: ResourceId) -> Vec<NodeIndex> {
        self.entries
            .get(&resource)
            .map(|e| e.nodes.iter().copied().collect())
            .unwrap_or_default()
    }
}
