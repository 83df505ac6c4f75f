use super::*;

#[test]
fn track_adds_both_directions() {
    let mut g = DependencyGraph::new();
    g.track(0, PropertyId::State(1));
    g.track(0, PropertyId::State(0));

    assert_eq!(
        g.dependencies(0),
        vec![PropertyId::State(0), PropertyId::State(1)]
    );
    assert_eq!(g.dependents(PropertyId::State(1)), vec![0]);
}

#[test]
fn track_is_idempotent() {
    let mut g = DependencyGraph::new();
    g.track(2, PropertyId::Computed(0));
    g.track(2, PropertyId::Computed(0));

    assert_eq!(g.dependencies(2), vec![PropertyId::Computed(0)]);
    assert_eq!(g.dependents(PropertyId::Computed(0)), vec![2]);
}

#[test]
fn clear_dependencies_removes_stale_edges() {
    let mut g = DependencyGraph::new();
    g.track(0, PropertyId::State(0));
    g.track(0, PropertyId::State(1));
    g.track(1, PropertyId::State(1));

    g.clear_dependencies(0);

    assert!(g.dependencies(0).is_empty());
    assert!(g.dependents(PropertyId::State(0)).is_empty());
    assert_eq!(g.dependents(PropertyId::State(1)), vec![1]);
}

#[test]
fn clear_dependencies_of_unknown_is_noop() {
    let mut g = DependencyGraph::new();
    g.clear_dependencies(5);
    assert!(g.dependencies(5).is_empty());
}

#[test]
fn rebuilt_edges_follow_branch() {
    let mut g = DependencyGraph::new();
    g.track(0, PropertyId::State(0));
    g.track(0, PropertyId::State(1));

    g.clear_dependencies(0);
    g.track(0, PropertyId::State(0));
    g.track(0, PropertyId::State(2));

    assert_eq!(
        g.dependencies(0),
        vec![PropertyId::State(0), PropertyId::State(2)]
    );
    assert!(g.dependents(PropertyId::State(1)).is_empty());
    assert_eq!(g.dependents(PropertyId::State(2)), vec![0]);
}
