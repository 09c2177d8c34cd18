use proptest::prelude::*;

use replica_sched::error::EngineError;
use replica_sched::ledger::{IntervalSet, JobLedger, LedgerSnapshot};
use replica_sched::scheduler::CompletionStatus;

#[test]
fn test_job_lifecycle() {
    let mut ledger = JobLedger::new();
    ledger.mark_started(1).unwrap();
    assert!(ledger.is_started(1));
    assert!(!ledger.is_completed(1));
    assert_eq!(ledger.outstanding(), 1);

    ledger
        .mark_completed(1, CompletionStatus::Succeeded, 3)
        .unwrap();
    assert!(ledger.is_completed(1));
    assert!(ledger.is_successful(1));
    assert!(!ledger.is_failed(1));
    assert_eq!(ledger.outstanding(), 0);
    assert_eq!(ledger.results_total(), 3);

    ledger.mark_output(1).unwrap();
    assert!(ledger.is_output(1));
}

#[test]
fn test_failed_jobs_are_completed_but_not_successful() {
    let mut ledger = JobLedger::new();
    ledger.mark_started_range(1, 2).unwrap();
    ledger
        .mark_completed(2, CompletionStatus::BadInputs, 5)
        .unwrap();

    assert!(ledger.is_completed(2));
    assert!(ledger.is_failed(2));
    assert!(!ledger.is_successful(2));
    assert_eq!(ledger.results_total(), 0);
}

#[test]
fn test_results_total_saturates() {
    let mut ledger = JobLedger::new();
    ledger.mark_started_range(1, 2).unwrap();
    ledger
        .mark_completed(1, CompletionStatus::Succeeded, u64::MAX)
        .unwrap();
    ledger
        .mark_completed(2, CompletionStatus::Succeeded, 5)
        .unwrap();
    assert_eq!(ledger.results_total(), u64::MAX);
}

#[test]
fn test_double_start_is_rejected() {
    let mut ledger = JobLedger::new();
    ledger.mark_started(4).unwrap();
    assert!(matches!(
        ledger.mark_started(4),
        Err(EngineError::DoubleStart(4))
    ));
}

#[test]
fn test_overlapping_range_start_inserts_nothing() {
    let mut ledger = JobLedger::new();
    ledger.mark_started(7).unwrap();

    let err = ledger.mark_started_range(5, 5).unwrap_err();
    assert!(matches!(err, EngineError::DoubleStart(7)));
    assert!(!ledger.is_started(5));
    assert_eq!(ledger.started().len(), 1);
}

#[test]
fn test_completion_before_start_is_rejected() {
    let mut ledger = JobLedger::new();
    assert!(matches!(
        ledger.mark_completed(1, CompletionStatus::Succeeded, 1),
        Err(EngineError::CompletedBeforeStart(1))
    ));
}

#[test]
fn test_double_completion_is_rejected() {
    let mut ledger = JobLedger::new();
    ledger.mark_started(1).unwrap();
    ledger
        .mark_completed(1, CompletionStatus::Succeeded, 1)
        .unwrap();
    assert!(matches!(
        ledger.mark_completed(1, CompletionStatus::FailedRetryable, 0),
        Err(EngineError::DoubleCompletion(1))
    ));
    assert!(!ledger.is_failed(1));
}

#[test]
fn test_double_output_is_rejected() {
    let mut ledger = JobLedger::new();
    ledger.mark_output(3).unwrap();
    assert!(matches!(
        ledger.mark_output(3),
        Err(EngineError::DoubleOutput(3))
    ));
}

#[test]
fn test_out_of_order_completion_compacts() {
    let mut ledger = JobLedger::new();
    ledger.mark_started_range(1, 1000).unwrap();

    // Complete evens first, then odds in reverse.
    for index in (2..=1000).step_by(2) {
        ledger
            .mark_completed(index, CompletionStatus::Succeeded, 1)
            .unwrap();
    }
    assert_eq!(ledger.succeeded().num_runs(), 500);
    for index in (1..=999).rev().step_by(2) {
        ledger
            .mark_completed(index, CompletionStatus::Succeeded, 1)
            .unwrap();
    }

    assert_eq!(ledger.succeeded().num_runs(), 1);
    assert_eq!(ledger.succeeded().len(), 1000);
    assert_eq!(ledger.outstanding(), 0);
    assert_eq!(ledger.footprint_runs(), 2);
}

#[test]
fn test_alternating_completion_order_matches_in_order() {
    let mut in_order = JobLedger::new();
    let mut alternating = JobLedger::new();
    in_order.mark_started_range(1, 10).unwrap();
    alternating.mark_started_range(1, 10).unwrap();

    for index in 1..=10 {
        in_order
            .mark_completed(index, CompletionStatus::Succeeded, 1)
            .unwrap();
    }
    for index in [10, 1, 9, 2, 8, 3, 7, 4, 6, 5] {
        alternating
            .mark_completed(index, CompletionStatus::Succeeded, 1)
            .unwrap();
    }

    assert_eq!(alternating.started(), in_order.started());
    assert_eq!(alternating.succeeded(), in_order.succeeded());
    assert_eq!(alternating.failed(), in_order.failed());
    assert_eq!(alternating.results_total(), in_order.results_total());
}

#[test]
fn test_outstanding_in_range() {
    let mut ledger = JobLedger::new();
    ledger.mark_started_range(1, 10).unwrap();
    ledger
        .mark_completed(3, CompletionStatus::Succeeded, 1)
        .unwrap();
    ledger
        .mark_completed(8, CompletionStatus::FailedDoNotRetry, 0)
        .unwrap();

    assert_eq!(ledger.outstanding_in_range(1, 5), 4);
    assert_eq!(ledger.outstanding_in_range(6, 10), 4);
    assert_eq!(ledger.outstanding_in_range(11, 20), 0);
}

#[test]
fn test_forget_outstanding() {
    let mut ledger = JobLedger::new();
    ledger.mark_started_range(1, 5).unwrap();
    ledger
        .mark_completed(2, CompletionStatus::Succeeded, 1)
        .unwrap();

    assert_eq!(ledger.forget_outstanding(), 4);
    assert_eq!(ledger.started(), &IntervalSet::from_runs([(2, 2)]));
    assert_eq!(ledger.outstanding(), 0);
    ledger.mark_started(1).unwrap();
}

#[test]
fn test_snapshot_file_round_trip() {
    let mut ledger = JobLedger::new();
    ledger.mark_started_range(1, 20).unwrap();
    for index in 1..=10 {
        ledger
            .mark_completed(index, CompletionStatus::Succeeded, 2)
            .unwrap();
        ledger.mark_output(index).unwrap();
    }
    ledger
        .mark_completed(15, CompletionStatus::FailedWithException, 0)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    ledger.save_to_path(&path).unwrap();
    let loaded = JobLedger::load_from_path(&path).unwrap();

    assert_eq!(loaded.campaign_id(), ledger.campaign_id());
    assert_eq!(loaded.started(), ledger.started());
    assert_eq!(loaded.succeeded(), ledger.succeeded());
    assert_eq!(loaded.failed(), ledger.failed());
    assert_eq!(loaded.output(), ledger.output());
    assert_eq!(loaded.results_total(), 20);
}

#[test]
fn test_snapshot_with_overlapping_outcomes_is_rejected() {
    let mut snapshot: LedgerSnapshot = JobLedger::new().snapshot();
    snapshot.started = vec![(1, 5)];
    snapshot.succeeded = vec![(1, 3)];
    snapshot.failed = vec![(3, 4)];

    assert!(matches!(
        JobLedger::from_snapshot(&snapshot),
        Err(EngineError::InvalidSnapshot(_))
    ));
}

#[test]
fn test_snapshot_with_unstarted_completion_is_rejected() {
    let mut snapshot: LedgerSnapshot = JobLedger::new().snapshot();
    snapshot.started = vec![(1, 2)];
    snapshot.succeeded = vec![(1, 3)];

    assert!(matches!(
        JobLedger::from_snapshot(&snapshot),
        Err(EngineError::InvalidSnapshot(_))
    ));
}

proptest! {
    #[test]
    fn test_any_completion_order_compacts_to_one_run(
        order in (1u64..300).prop_flat_map(|n| Just((1..=n).collect::<Vec<u64>>()).prop_shuffle())
    ) {
        let n = order.len() as u64;
        let mut ledger = JobLedger::new();
        ledger.mark_started_range(1, n).unwrap();

        for &index in &order {
            ledger.mark_completed(index, CompletionStatus::Succeeded, 1).unwrap();
            prop_assert!(ledger.succeeded().num_runs() as u64 <= n);
        }

        prop_assert_eq!(ledger.succeeded().num_runs(), 1);
        prop_assert_eq!(ledger.succeeded().len(), n);
        prop_assert_eq!(ledger.outstanding(), 0);
        prop_assert_eq!(ledger.results_total(), n);
    }
}
