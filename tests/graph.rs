// tests/graph.rs

mod common;
use crate::common::same_structure;

use std::collections::HashSet;

use jobgraph::dag::{Graph, NodeVisitor};

/// 1 -> 2 -> 4, 1 -> 3 -> 4, 5 isolated.
fn diamond() -> Graph<u32> {
    let mut g = Graph::new();
    g.add_edges(1, [2, 3]);
    g.add_edges_to([2, 3], 4);
    g.add_node(5);
    g
}

#[test]
fn add_edge_adds_missing_endpoints() {
    let mut g: Graph<u32> = Graph::new();
    g.add_edge(1, 2);

    assert!(g.contains_node(1));
    assert!(g.contains_node(2));
    assert!(g.contains_edge(1, 2));
    assert!(!g.contains_edge(2, 1));

    g.add_edge(1, 2);
    assert_eq!(g.edge_count(), 1);
}

#[test]
fn remove_node_drops_incident_edges() {
    let mut g = diamond();
    g.remove_node(2);

    assert!(!g.contains_node(2));
    assert_eq!(g.successors(1), vec![3]);
    assert_eq!(g.predecessors(4), vec![3]);
    assert_eq!(g.edge_count(), 2);
}

#[test]
fn remove_edge_keeps_nodes() {
    let mut g = diamond();
    g.remove_edge(1, 2);

    assert!(g.contains_node(1));
    assert!(g.contains_node(2));
    assert!(!g.contains_edge(1, 2));
    assert!(g.sources().contains(&2));
}

#[test]
fn closures_are_transitive() {
    let g = diamond();

    assert_eq!(g.descendants(1), HashSet::from([2, 3, 4]));
    assert_eq!(g.ancestors(4), HashSet::from([1, 2, 3]));
    assert!(g.descendants(4).is_empty());
    assert!(g.ancestors(5).is_empty());
}

#[test]
fn sources_and_sinks() {
    let g = diamond();

    let sources: HashSet<u32> = g.sources().into_iter().collect();
    let sinks: HashSet<u32> = g.sinks().into_iter().collect();
    assert_eq!(sources, HashSet::from([1, 5]));
    assert_eq!(sinks, HashSet::from([4, 5]));
}

#[test]
fn reverse_returns_new_graph() {
    let g = diamond();
    let r = g.reverse();

    assert!(r.contains_edge(2, 1));
    assert!(r.contains_edge(4, 3));
    assert!(g.contains_edge(1, 2), "receiver must not be mutated");
    assert!(same_structure(&g, &r.reverse()));
}

#[test]
fn path_exists_follows_direction() {
    let g = diamond();

    assert!(g.path_exists(1, 4));
    assert!(g.path_exists(5, 5));
    assert!(!g.path_exists(4, 1));
    assert!(!g.path_exists(1, 5));
}

#[test]
fn replace_rewires_both_directions() {
    let mut g = diamond();
    g.replace(2, 9);

    assert!(!g.contains_node(2));
    assert!(g.contains_edge(1, 9));
    assert!(g.contains_edge(9, 4));
}

struct Recorder {
    pre: Vec<u32>,
    post: Vec<u32>,
    prune: Option<u32>,
}

impl NodeVisitor<u32> for Recorder {
    fn pre_visit(&mut self, node: u32) -> bool {
        self.pre.push(node);
        Some(node) != self.prune
    }

    fn post_visit(&mut self, node: u32) {
        self.post.push(node);
    }
}

#[test]
fn depth_first_visit_orders_pre_and_post() {
    let g = diamond();
    let mut visitor = Recorder {
        pre: Vec::new(),
        post: Vec::new(),
        prune: None,
    };
    g.depth_first_visit(1, &mut visitor);

    assert_eq!(visitor.pre.first(), Some(&1));
    assert_eq!(visitor.post.last(), Some(&1));
    assert_eq!(visitor.pre.len(), 4, "4 is reachable twice but visited once");
    assert_eq!(visitor.post.first(), Some(&4));
}

#[test]
fn pruned_pre_visit_skips_children_and_post() {
    let g = diamond();
    let mut visitor = Recorder {
        pre: Vec::new(),
        post: Vec::new(),
        prune: Some(1),
    };
    g.depth_first_visit(1, &mut visitor);

    assert_eq!(visitor.pre, vec![1]);
    assert!(visitor.post.is_empty());
}

#[test]
fn topological_sort_respects_every_edge() {
    let g = diamond();
    let order = g.topological_sort();

    assert_eq!(order.len(), 5);
    let pos = |n: u32| order.iter().position(|x| *x == n).unwrap();
    for (src, dst) in g.edges() {
        assert!(pos(src) < pos(dst), "{src} must precede {dst} in {order:?}");
    }
}
