pub mod allocation;
pub mod enumerator;
pub mod job;

pub use allocation::{Allocation, AllocationState, JobRange, NodeAllocationTracker};
pub use enumerator::JobEnumerator;
pub use job::{CompletionStatus, JobDescriptor, JobIndex, NodeIndex};
