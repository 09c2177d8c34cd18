use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::scheduler::job::{JobIndex, NodeIndex};

/// Closed interval `[start, end]` of global job indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRange {
    pub start: JobIndex,
    pub end: JobIndex,
}

impl JobRange {
    pub fn len(&self) -> u64 {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, index: JobIndex) -> bool {
        self.start <= index && index <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationState {
    Unstarted,
    PartiallyAssigned,
    FullyAssigned,
}

/// Result of one `request`: `count` consecutive indices beginning at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub node: NodeIndex,
    pub start: JobIndex,
    pub count: u64,
    /// Replicate number of the job at `start`.
    pub first_replicate: u64,
}

impl Allocation {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// (global index, replicate) for every allocated job.
    pub fn jobs(&self) -> impl Iterator<Item = (JobIndex, u64)> {
        let (start, first) = (self.start, self.first_replicate);
        (0..self.count).map(move |i| (start + i, first + i))
    }
}

#[derive(Debug, Clone)]
struct NodeAllocation {
    nstruct: u64,
    /// 1-based replicate number of the next job to hand out.
    next_replicate: u64,
    ranges: Vec<JobRange>,
    closed: bool,
}

impl NodeAllocation {
    fn new(nstruct: u64) -> Self {
        Self {
            nstruct,
            next_replicate: 1,
            ranges: Vec::new(),
            closed: false,
        }
    }

    fn fully_assigned(&self) -> bool {
        self.closed || self.next_replicate > self.nstruct
    }
}

#[derive(Debug, Clone, Copy)]
struct OwnedRange {
    range: JobRange,
    node: NodeIndex,
    first_replicate: u64,
}

/// Hands out contiguous runs of global job indices to work nodes on demand.
///
/// A node's indices are discovered lazily: if requests for other nodes are
/// interleaved between two requests for the same node, the node ends up owning
/// several disjoint sub-ranges. Every sub-range is recorded, both per node and
/// in a global start-ordered list used to map an index back to its owner.
#[derive(Debug, Clone)]
pub struct NodeAllocationTracker {
    nodes: Vec<NodeAllocation>,
    owners: Vec<OwnedRange>,
    next_index: JobIndex,
}

impl Default for NodeAllocationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeAllocationTracker {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            owners: Vec::new(),
            next_index: 1,
        }
    }

    pub fn with_nodes(nstructs: impl IntoIterator<Item = u64>) -> Self {
        let mut tracker = Self::new();
        for nstruct in nstructs {
            tracker.add_node(nstruct);
        }
        tracker
    }

    pub fn add_node(&mut self, nstruct: u64) -> NodeIndex {
        self.nodes.push(NodeAllocation::new(nstruct));
        self.nodes.len() as NodeIndex
    }

    fn entry(&self, node: NodeIndex) -> Result<&NodeAllocation> {
        node.checked_sub(1)
            .and_then(|i| self.nodes.get(i as usize))
            .ok_or(EngineError::UnknownNode(node))
    }

    fn entry_mut(&mut self, node: NodeIndex) -> Result<&mut NodeAllocation> {
        node.checked_sub(1)
            .and_then(|i| self.nodes.get_mut(i as usize))
            .ok_or(EngineError::UnknownNode(node))
    }

    /// Allocate up to `max_count` indices for `node`.
    ///
    /// Returns an empty allocation, without touching any state, when the node
    /// is fully assigned or `max_count` is zero.
    pub fn request(&mut self, node: NodeIndex, max_count: u64) -> Result<Allocation> {
        let start = self.next_index;
        let entry = self.entry_mut(node)?;
        let first_replicate = entry.next_replicate;
        if max_count == 0 || entry.fully_assigned() {
            return Ok(Allocation {
                node,
                start,
                count: 0,
                first_replicate,
            });
        }

        let remaining = entry.nstruct - entry.next_replicate + 1;
        let count = max_count.min(remaining);
        let end = start + count - 1;

        match entry.ranges.last_mut() {
            Some(last) if last.end + 1 == start => last.end = end,
            _ => entry.ranges.push(JobRange { start, end }),
        }
        entry.next_replicate += count;
        let now_full = entry.fully_assigned();

        match self.owners.last_mut() {
            Some(owned) if owned.node == node && owned.range.end + 1 == start => {
                owned.range.end = end;
            }
            _ => self.owners.push(OwnedRange {
                range: JobRange { start, end },
                node,
                first_replicate,
            }),
        }
        self.next_index = end + 1;

        tracing::debug!(node, start, count, "Allocated job indices");
        if now_full {
            tracing::info!(node, last_index = end, "Work node fully assigned");
        }

        Ok(Allocation {
            node,
            start,
            count,
            first_replicate,
        })
    }

    pub fn is_fully_assigned(&self, node: NodeIndex) -> Result<bool> {
        Ok(self.entry(node)?.fully_assigned())
    }

    pub fn state(&self, node: NodeIndex) -> Result<AllocationState> {
        let entry = self.entry(node)?;
        Ok(if entry.fully_assigned() {
            AllocationState::FullyAssigned
        } else if entry.next_replicate == 1 {
            AllocationState::Unstarted
        } else {
            AllocationState::PartiallyAssigned
        })
    }

    /// Close a node with no further jobs, e.g. when its template failed to resolve.
    pub fn close(&mut self, node: NodeIndex) -> Result<()> {
        self.entry_mut(node)?.closed = true;
        Ok(())
    }

    /// Raise a node's replicate count, reopening it if it was fully assigned.
    ///
    /// New indices extend the node's most recent sub-range when nothing else
    /// was allocated since; otherwise they start a new sub-range.
    pub fn extend_nstruct(&mut self, node: NodeIndex, additional: u64) -> Result<u64> {
        let entry = self.entry_mut(node)?;
        entry.nstruct += additional;
        Ok(entry.nstruct)
    }

    pub fn nstruct(&self, node: NodeIndex) -> Result<u64> {
        Ok(self.entry(node)?.nstruct)
    }

    pub fn assigned_count(&self, node: NodeIndex) -> Result<u64> {
        Ok(self.entry(node)?.next_replicate - 1)
    }

    pub fn ranges(&self, node: NodeIndex) -> Result<&[JobRange]> {
        Ok(&self.entry(node)?.ranges)
    }

    pub fn range_start(&self, node: NodeIndex) -> Result<Option<JobIndex>> {
        Ok(self.entry(node)?.ranges.first().map(|r| r.start))
    }

    pub fn range_end(&self, node: NodeIndex) -> Result<Option<JobIndex>> {
        Ok(self.entry(node)?.ranges.last().map(|r| r.end))
    }

    fn owner_of(&self, index: JobIndex) -> Option<&OwnedRange> {
        let pos = self.owners.partition_point(|o| o.range.start <= index);
        let owned = self.owners.get(pos.checked_sub(1)?)?;
        owned.range.contains(index).then_some(owned)
    }

    pub fn owning_node(&self, index: JobIndex) -> Option<NodeIndex> {
        self.owner_of(index).map(|o| o.node)
    }

    /// (node, replicate) for an allocated index.
    pub fn replicate_for(&self, index: JobIndex) -> Option<(NodeIndex, u64)> {
        self.owner_of(index)
            .map(|o| (o.node, o.first_replicate + (index - o.range.start)))
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// First global index that has not been handed out.
    pub fn next_index(&self) -> JobIndex {
        self.next_index
    }

    pub fn all_fully_assigned(&self) -> bool {
        self.nodes.iter().all(NodeAllocation::fully_assigned)
    }
}
