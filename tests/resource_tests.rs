
use replica_sched::config::EngineConfig;
use replica_sched::engine::Engine;
use replica_sched::graph::ResourceOrigin;
use replica_sched::jobdef::{JobDefinition, JobEntry};
use replica_sched::resources::ResourceLifetimeTracker;
use replica_sched::scheduler::NodeAllocationTracker;
use test_harness::{drain_node, engine_with_nodes};

#[test]
fn test_inline_resource_advised_when_its_node_is_assigned() {
    let mut engine = engine_with_nodes(&[3, 2]);
    assert!(engine.poll_deallocation_advisories().unwrap().is_empty());

    engine.next_batch(1, 2).unwrap();
    assert!(engine.poll_deallocation_advisories().unwrap().is_empty());

    engine.next_batch(1, 2).unwrap();
    assert_eq!(engine.poll_deallocation_advisories().unwrap(), vec![1]);
    assert!(engine.resources().is_advised(1));
    assert!(!engine.resources().is_advised(2));
}

#[test]
fn test_advisories_are_emitted_once() {
    let mut engine = engine_with_nodes(&[1]);
    drain_node(&mut engine, 1, 10);

    assert_eq!(engine.poll_deallocation_advisories().unwrap(), vec![1]);
    assert!(engine.poll_deallocation_advisories().unwrap().is_empty());
    assert!(engine.poll_deallocation_advisories().unwrap().is_empty());
}

#[test]
fn test_shared_pool_resource_waits_for_every_node() {
    let def = JobDefinition::new(vec![
        JobEntry::pool("1ubq.pdb", 2),
        JobEntry::pool("1ubq.pdb", 2),
        JobEntry::pool("2lzm.pdb", 1),
    ]);
    let mut engine = Engine::new(&def, EngineConfig::default()).unwrap();
    assert_eq!(engine.resources().referencing_nodes(1), vec![1, 2]);

    drain_node(&mut engine, 1, 10);
    assert!(engine.poll_deallocation_advisories().unwrap().is_empty());

    drain_node(&mut engine, 2, 10);
    assert_eq!(engine.poll_deallocation_advisories().unwrap(), vec![1]);
    assert_eq!(engine.resources().last_job_for_resource(1), Some(4));

    drain_node(&mut engine, 3, 10);
    assert_eq!(engine.poll_deallocation_advisories().unwrap(), vec![2]);
}

#[test]
fn test_retained_pool_inputs_are_never_advised() {
    let def = JobDefinition::new(vec![
        JobEntry::pool("1ubq.pdb", 2),
        JobEntry::inline("2lzm.pdb", 2),
    ]);
    let config = EngineConfig::default().with_retain_inputs(true);
    let mut engine = Engine::new(&def, config).unwrap();

    drain_node(&mut engine, 1, 10);
    drain_node(&mut engine, 2, 10);

    // Inline inputs belong to one job entry and are still released.
    assert_eq!(engine.poll_deallocation_advisories().unwrap(), vec![2]);
    assert!(!engine.resources().is_advised(1));
    assert_eq!(engine.resources().pending_resources(), vec![1]);
}

#[test]
fn test_unresolved_node_references_no_resource() {
    let mut broken = JobEntry::pool("unused.pdb", 3);
    broken.input = Default::default();
    let def = JobDefinition::new(vec![broken, JobEntry::inline("1ubq.pdb", 1)]);
    let mut engine = Engine::new(&def, EngineConfig::default()).unwrap();

    assert!(engine.next_batch(1, 10).is_err());
    drain_node(&mut engine, 2, 10);
    assert_eq!(engine.poll_deallocation_advisories().unwrap(), vec![1]);
}

#[test]
fn test_tracker_on_its_own() {
    let mut allocation = NodeAllocationTracker::with_nodes([2, 2]);
    let mut tracker = ResourceLifetimeTracker::new(false);
    tracker.register_reference(7, ResourceOrigin::Pool, 1);
    tracker.register_reference(7, ResourceOrigin::Pool, 2);

    allocation.request(1, 2).unwrap();
    tracker.note_assigned(7, 2);
    assert!(tracker
        .poll_deallocation_advisories(&allocation)
        .unwrap()
        .is_empty());

    allocation.request(2, 2).unwrap();
    tracker.note_assigned(7, 4);
    assert_eq!(tracker.poll_deallocation_advisories(&allocation).unwrap(), vec![7]);
    assert_eq!(tracker.last_job_for_resource(7), Some(4));
    assert!(tracker.pending_resources().is_empty());
}

#[test]
fn test_shared_resource_scenario_across_three_nodes() {
    let def = JobDefinition::new(vec![
        JobEntry::pool("shared.pdb", 5),
        JobEntry::pool("shared.pdb", 11),
        JobEntry::pool("other.pdb", 3),
    ]);
    let mut engine = Engine::new(&def, EngineConfig::default()).unwrap();

    assert_eq!(engine.next_batch(1, 4).unwrap().len(), 4);
    assert_eq!(engine.next_batch(1, 4).unwrap().len(), 1);
    assert!(engine.is_fully_assigned(1).unwrap());
    assert!(engine.poll_deallocation_advisories().unwrap().is_empty());

    let first = engine.next_batch(2, 10).unwrap();
    assert_eq!(first.len(), 10);
    assert_eq!(first[0].index, 6);
    assert!(engine.poll_deallocation_advisories().unwrap().is_empty());

    assert_eq!(engine.next_batch(2, 10).unwrap().len(), 1);
    assert_eq!(engine.poll_deallocation_advisories().unwrap(), vec![1]);

    let last = engine.next_batch(3, 10).unwrap();
    assert_eq!(last.len(), 3);
    assert_eq!(last[0].index, 17);
    assert_eq!(engine.poll_deallocation_advisories().unwrap(), vec![2]);
    assert!(engine.poll_deallocation_advisories().unwrap().is_empty());
}
