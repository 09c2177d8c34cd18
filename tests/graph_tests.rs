
use replica_sched::config::EngineConfig;
use replica_sched::error::EngineError;
use replica_sched::graph::{JobGraph, ResourceOrigin};
use replica_sched::jobdef::{InputSpec, JobDefinition, JobEntry};
use test_harness::inline_definition;

#[test]
fn test_one_node_per_entry_in_order() {
    let graph = JobGraph::create_initial(&inline_definition(&[5, 11, 3]), EngineConfig::default())
        .unwrap();

    assert_eq!(graph.num_nodes(), 3);
    let nstructs: Vec<u64> = graph.nodes().iter().map(|n| n.nstruct).collect();
    assert_eq!(nstructs, vec![5, 11, 3]);
    let indices: Vec<u64> = graph.nodes().iter().map(|n| n.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert_eq!(graph.num_edges(), 0);
}

#[test]
fn test_default_nstruct_applies_when_unset() {
    let mut entry = JobEntry::inline("1ubq.pdb", 1);
    entry.nstruct = None;
    let def = JobDefinition::new(vec![entry]);
    let graph =
        JobGraph::create_initial(&def, EngineConfig::default().with_default_nstruct(7)).unwrap();

    assert_eq!(graph.node(1).unwrap().nstruct, 7);
}

#[test]
fn test_inline_inputs_are_distinct_resources() {
    let def = JobDefinition::new(vec![
        JobEntry::inline("1ubq.pdb", 2),
        JobEntry::inline("1ubq.pdb", 2),
    ]);
    let graph = JobGraph::create_initial(&def, EngineConfig::default()).unwrap();

    let r1 = graph.template(1).unwrap().resource;
    let r2 = graph.template(2).unwrap().resource;
    assert_ne!(r1, r2);
    assert_eq!(graph.resources().len(), 2);
    assert_eq!(graph.resource(r1).unwrap().origin, ResourceOrigin::Inline);
}

#[test]
fn test_pool_inputs_with_same_name_share_a_resource() {
    let def = JobDefinition::new(vec![
        JobEntry::pool("inputs/1ubq.pdb", 2),
        JobEntry::pool("inputs/1ubq.pdb", 3),
        JobEntry::pool("inputs/2lzm.pdb", 1),
    ]);
    let graph = JobGraph::create_initial(&def, EngineConfig::default()).unwrap();

    assert_eq!(
        graph.template(1).unwrap().resource,
        graph.template(2).unwrap().resource
    );
    assert_ne!(
        graph.template(1).unwrap().resource,
        graph.template(3).unwrap().resource
    );
    assert_eq!(graph.resources().len(), 2);
}

#[test]
fn test_tag_defaults_to_input_stem() {
    let mut tagged = JobEntry::inline("2lzm.pdb", 1);
    tagged.tag = Some("lysozyme".to_string());
    let def = JobDefinition::new(vec![JobEntry::inline("inputs/1ubq.pdb", 1), tagged]);
    let graph = JobGraph::create_initial(&def, EngineConfig::default()).unwrap();

    assert_eq!(graph.template(1).unwrap().tag, "1ubq");
    assert_eq!(graph.template(2).unwrap().tag, "lysozyme");
}

#[test]
fn test_missing_input_leaves_node_unresolved() {
    let mut entry = JobEntry::inline("unused.pdb", 4);
    entry.input = InputSpec::Missing;
    let def = JobDefinition::new(vec![entry, JobEntry::inline("1ubq.pdb", 1)]);
    let graph = JobGraph::create_initial(&def, EngineConfig::default()).unwrap();

    assert!(graph.node(1).unwrap().resolution_error().is_some());
    assert!(matches!(
        graph.template(1),
        Err(EngineError::TemplateUnresolved { node: 1, .. })
    ));
    assert!(graph.template(2).is_ok());
}

#[test]
fn test_dependencies_become_edges() {
    let def = inline_definition(&[2, 2, 2])
        .with_dependency(2, 1)
        .with_dependency(3, 2);
    let graph = JobGraph::create_initial(&def, EngineConfig::default()).unwrap();

    assert_eq!(graph.num_edges(), 2);
    assert_eq!(graph.upstream(2), vec![1]);
    assert_eq!(graph.downstream(2), vec![3]);
    assert!(graph.upstream(1).is_empty());
}

#[test]
fn test_cycle_is_rejected() {
    let mut graph =
        JobGraph::create_initial(&inline_definition(&[1, 1, 1]), EngineConfig::default()).unwrap();
    graph.add_edge(1, 2).unwrap();
    graph.add_edge(2, 3).unwrap();

    assert!(matches!(
        graph.add_edge(3, 1),
        Err(EngineError::CycleDetected { from: 3, to: 1 })
    ));
    assert!(matches!(
        graph.add_edge(2, 2),
        Err(EngineError::CycleDetected { .. })
    ));
    assert_eq!(graph.num_edges(), 2);
}

#[test]
fn test_update_appends_nodes() {
    let mut graph =
        JobGraph::create_initial(&inline_definition(&[1]), EngineConfig::default()).unwrap();
    let added = graph.update(&[JobEntry::inline("a.pdb", 2), JobEntry::inline("b.pdb", 3)]);

    assert_eq!(added, vec![2, 3]);
    assert_eq!(graph.num_nodes(), 3);
}

#[test]
fn test_node_labels() {
    let mut graph =
        JobGraph::create_initial(&inline_definition(&[1]), EngineConfig::default()).unwrap();
    assert_eq!(graph.node_label(1), None);

    graph.set_node_label(1, "relax").unwrap();
    assert_eq!(graph.node_label(1), Some("relax"));
    assert!(graph.set_node_label(9, "x").is_err());
}

#[test]
fn test_invalid_definitions_are_rejected() {
    let empty = JobDefinition::new(Vec::new());
    assert!(matches!(
        JobGraph::create_initial(&empty, EngineConfig::default()),
        Err(EngineError::InvalidDefinition(_))
    ));

    let dangling = inline_definition(&[1]).with_dependency(1, 5);
    assert!(matches!(
        JobGraph::create_initial(&dangling, EngineConfig::default()),
        Err(EngineError::InvalidDefinition(_))
    ));
}
