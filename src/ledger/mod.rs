//! Per-job lifecycle tracking over the global index space.
//!
//! Job state is never stored per index. Each lifecycle stage is an
//! [`IntervalSet`]; because jobs are handed out and usually finished in long
//! consecutive runs, the number of runs stays small no matter how many jobs a
//! campaign has produced.
//!
//! Invariants kept by every mutation:
//! - `succeeded` and `failed` are disjoint
//! - `succeeded ∪ failed ⊆ started`
//! - an index enters `started` once and one of `succeeded`/`failed` once

pub mod interval_set;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::scheduler::job::{CompletionStatus, JobIndex};

pub use interval_set::IntervalSet;

#[derive(Debug, Clone)]
pub struct JobLedger {
    campaign_id: Uuid,
    started: IntervalSet,
    succeeded: IntervalSet,
    failed: IntervalSet,
    output: IntervalSet,
    results_total: u64,
}

impl Default for JobLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl JobLedger {
    pub fn new() -> Self {
        Self::with_campaign_id(Uuid::new_v4())
    }

    pub fn with_campaign_id(campaign_id: Uuid) -> Self {
        Self {
            campaign_id,
            started: IntervalSet::new(),
            succeeded: IntervalSet::new(),
            failed: IntervalSet::new(),
            output: IntervalSet::new(),
            results_total: 0,
        }
    }

    pub fn campaign_id(&self) -> Uuid {
        self.campaign_id
    }

    pub fn mark_started(&mut self, index: JobIndex) -> Result<()> {
        if !self.started.insert(index) {
            return Err(EngineError::DoubleStart(index));
        }
        Ok(())
    }

    /// Mark `count` consecutive indices from `start` as started.
    ///
    /// Nothing is inserted if any index in the run was already started.
    pub fn mark_started_range(&mut self, start: JobIndex, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let end = start + count - 1;
        if let Some(existing) = self.started.first_in_range(start, end) {
            return Err(EngineError::DoubleStart(existing));
        }
        self.started.insert_range(start, end);
        Ok(())
    }

    pub fn mark_completed(
        &mut self,
        index: JobIndex,
        status: CompletionStatus,
        result_count: u64,
    ) -> Result<()> {
        if !self.started.contains(index) {
            return Err(EngineError::CompletedBeforeStart(index));
        }
        if self.is_completed(index) {
            return Err(EngineError::DoubleCompletion(index));
        }
        if status.is_success() {
            self.succeeded.insert(index);
            self.results_total = self.results_total.saturating_add(result_count);
        } else {
            self.failed.insert(index);
        }
        Ok(())
    }

    /// Record that the job's results were written to persistent storage.
    pub fn mark_output(&mut self, index: JobIndex) -> Result<()> {
        if !self.output.insert(index) {
            return Err(EngineError::DoubleOutput(index));
        }
        Ok(())
    }

    pub fn is_started(&self, index: JobIndex) -> bool {
        self.started.contains(index)
    }

    pub fn is_completed(&self, index: JobIndex) -> bool {
        self.succeeded.contains(index) || self.failed.contains(index)
    }

    pub fn is_successful(&self, index: JobIndex) -> bool {
        self.succeeded.contains(index)
    }

    pub fn is_failed(&self, index: JobIndex) -> bool {
        self.failed.contains(index)
    }

    pub fn is_output(&self, index: JobIndex) -> bool {
        self.output.contains(index)
    }

    pub fn started(&self) -> &IntervalSet {
        &self.started
    }

    pub fn succeeded(&self) -> &IntervalSet {
        &self.succeeded
    }

    pub fn failed(&self) -> &IntervalSet {
        &self.failed
    }

    pub fn output(&self) -> &IntervalSet {
        &self.output
    }

    pub fn completed(&self) -> IntervalSet {
        self.succeeded.union(&self.failed)
    }

    /// Started but not yet completed.
    pub fn outstanding(&self) -> u64 {
        self.started.len() - self.succeeded.len() - self.failed.len()
    }

    /// Started but not completed within `[start, end]`.
    pub fn outstanding_in_range(&self, start: JobIndex, end: JobIndex) -> u64 {
        self.started.count_in_range(start, end)
            - self.succeeded.count_in_range(start, end)
            - self.failed.count_in_range(start, end)
    }

    /// Drop jobs that were started but never completed, so that a resumed
    /// campaign hands them out again.
    pub fn forget_outstanding(&mut self) -> u64 {
        let forgotten = self.outstanding();
        self.started = self.completed();
        forgotten
    }

    /// Sum of `result_count` over all succeeded jobs.
    pub fn results_total(&self) -> u64 {
        self.results_total
    }

    /// Total number of runs held across every set.
    pub fn footprint_runs(&self) -> usize {
        self.started.num_runs()
            + self.succeeded.num_runs()
            + self.failed.num_runs()
            + self.output.num_runs()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            campaign_id: self.campaign_id,
            saved_at: Utc::now(),
            started: self.started.iter_runs().collect(),
            succeeded: self.succeeded.iter_runs().collect(),
            failed: self.failed.iter_runs().collect(),
            output: self.output.iter_runs().collect(),
            results_total: self.results_total,
        }
    }

    pub fn from_snapshot(snapshot: &LedgerSnapshot) -> Result<Self> {
        let ledger = Self {
            campaign_id: snapshot.campaign_id,
            started: IntervalSet::from_runs(snapshot.started.iter().copied()),
            succeeded: IntervalSet::from_runs(snapshot.succeeded.iter().copied()),
            failed: IntervalSet::from_runs(snapshot.failed.iter().copied()),
            output: IntervalSet::from_runs(snapshot.output.iter().copied()),
            results_total: snapshot.results_total,
        };

        if !ledger.succeeded.is_disjoint(&ledger.failed) {
            return Err(EngineError::InvalidSnapshot(
                "succeeded and failed sets overlap".to_string(),
            ));
        }
        if !ledger.completed().is_subset(&ledger.started) {
            return Err(EngineError::InvalidSnapshot(
                "completed jobs missing from started set".to_string(),
            ));
        }
        Ok(ledger)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let snapshot: LedgerSnapshot = serde_json::from_str(&contents)?;
        Self::from_snapshot(&snapshot)
    }
}

/// Persisted form of a [`JobLedger`]: each set as a list of closed runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub campaign_id: Uuid,
    pub saved_at: DateTime<Utc>,
    pub started: Vec<(u64, u64)>,
    pub succeeded: Vec<(u64, u64)>,
    pub failed: Vec<(u64, u64)>,
    pub output: Vec<(u64, u64)>,
    pub results_total: u64,
}
