//! Structural comparison of task graphs by task name.
//!
//! Node identities differ between graphs, so comparisons go through task
//! names. Names are assumed unique within a graph; the sentinels show up
//! as `"Start"` and `"End"`.

use std::collections::BTreeSet;

use jobgraph::dag::{Graph, TaskGraph};
use jobgraph::types::TaskGuard;
use petgraph::graphmap::NodeTrait;

/// `true` if both graphs have the same node set and the same edge set.
pub fn same_structure<T: NodeTrait>(a: &Graph<T>, b: &Graph<T>) -> bool {
    let nodes = |g: &Graph<T>| g.nodes().collect::<BTreeSet<T>>();
    let edges = |g: &Graph<T>| g.edges().into_iter().collect::<BTreeSet<(T, T)>>();
    nodes(a) == nodes(b) && edges(a) == edges(b)
}

/// Every edge of `graph` as a `(from, to)` pair of task names.
pub fn task_graph_shape(graph: &TaskGraph) -> BTreeSet<(String, String)> {
    graph
        .graph()
        .edges()
        .into_iter()
        .filter_map(|(src, dst)| {
            let src = graph.node(src)?.name();
            let dst = graph.node(dst)?.name();
            Some((src, dst))
        })
        .collect()
}

fn nodes_with_guards(graph: &TaskGraph) -> BTreeSet<(String, String)> {
    graph
        .nodes()
        .map(|node| (node.name(), guard_label(node.guard())))
        .collect()
}

fn guard_label(guard: TaskGuard) -> String {
    guard.to_string()
}

/// `true` if both graphs have the same task names, guards and edges.
pub fn graphs_equivalent(a: &TaskGraph, b: &TaskGraph) -> bool {
    nodes_with_guards(a) == nodes_with_guards(b) && task_graph_shape(a) == task_graph_shape(b)
}
