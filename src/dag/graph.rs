// src/dag/graph.rs

//! Generic directed graph used as the backbone of every [`TaskGraph`].
//!
//! Storage is a `petgraph` [`DiGraphMap`], so node identities must be cheap
//! `Copy` keys (task graphs use [`TaskId`]). Iteration follows insertion
//! order, which keeps traversals and topological sorts stable for a given
//! graph instance.
//!
//! The traversal algorithms are written out by hand rather than delegated to
//! `petgraph::algo`: the scheduler relies on the exact pre/post-order
//! semantics of [`Graph::depth_first_visit`] and on the "DFS from every
//! source" shape of [`Graph::topological_sort`].
//!
//! [`TaskGraph`]: crate::dag::TaskGraph
//! [`TaskId`]: crate::dag::TaskId

use std::collections::HashSet;

use petgraph::Direction::{Incoming, Outgoing};
use petgraph::graphmap::{DiGraphMap, NodeTrait};

/// Callbacks for [`Graph::depth_first_visit`].
pub trait NodeVisitor<T> {
    /// Called before the node's successors are visited.
    ///
    /// Returning `false` leaves the node marked as visited but skips its
    /// successors and its `post_visit` for this traversal.
    fn pre_visit(&mut self, node: T) -> bool;

    /// Called after every successor has been visited.
    fn post_visit(&mut self, node: T);
}

/// Directed graph over node keys of type `T`.
///
/// Edges form a set per source: adding the same edge twice is a no-op.
/// Adding an edge adds any missing endpoint.
#[derive(Debug, Clone)]
pub struct Graph<T: NodeTrait> {
    inner: DiGraphMap<T, ()>,
}

impl<T: NodeTrait> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NodeTrait> Graph<T> {
    pub fn new() -> Self {
        Self {
            inner: DiGraphMap::new(),
        }
    }

    pub fn add_node(&mut self, node: T) {
        self.inner.add_node(node);
    }

    pub fn add_edge(&mut self, src: T, dst: T) {
        self.inner.add_edge(src, dst, ());
    }

    /// Add `src -> dst` for every destination.
    pub fn add_edges(&mut self, src: T, dsts: impl IntoIterator<Item = T>) {
        self.add_node(src);
        for dst in dsts {
            self.add_edge(src, dst);
        }
    }

    /// Add `src -> dst` for every source.
    pub fn add_edges_to(&mut self, srcs: impl IntoIterator<Item = T>, dst: T) {
        self.add_node(dst);
        for src in srcs {
            self.add_edge(src, dst);
        }
    }

    /// Remove the node together with every edge it takes part in.
    pub fn remove_node(&mut self, node: T) {
        self.inner.remove_node(node);
    }

    pub fn remove_edge(&mut self, src: T, dst: T) {
        self.inner.remove_edge(src, dst);
    }

    pub fn contains_node(&self, node: T) -> bool {
        self.inner.contains_node(node)
    }

    pub fn contains_edge(&self, src: T, dst: T) -> bool {
        self.inner.contains_edge(src, dst)
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// All nodes, in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = T> + '_ {
        self.inner.nodes()
    }

    /// All edges as `(src, dst)` pairs.
    pub fn edges(&self) -> Vec<(T, T)> {
        self.inner
            .all_edges()
            .map(|(src, dst, _)| (src, dst))
            .collect()
    }

    /// Snapshot of the direct successors of `node`.
    pub fn successors(&self, node: T) -> Vec<T> {
        self.inner.neighbors_directed(node, Outgoing).collect()
    }

    /// Snapshot of the direct predecessors of `node`.
    pub fn predecessors(&self, node: T) -> Vec<T> {
        self.inner.neighbors_directed(node, Incoming).collect()
    }

    /// Every node reachable from `node` through at least one edge.
    pub fn descendants(&self, node: T) -> HashSet<T> {
        let mut descendants = HashSet::new();
        for successor in self.successors(node) {
            descendants.extend(self.preorder(successor));
        }
        descendants
    }

    /// Every node from which `node` is reachable through at least one edge.
    pub fn ancestors(&self, node: T) -> HashSet<T> {
        self.reverse().descendants(node)
    }

    /// Nodes without incoming edges.
    pub fn sources(&self) -> Vec<T> {
        self.reverse().sinks()
    }

    /// Nodes without outgoing edges.
    pub fn sinks(&self) -> Vec<T> {
        self.inner
            .nodes()
            .filter(|&n| self.inner.neighbors_directed(n, Outgoing).next().is_none())
            .collect()
    }

    /// Move every edge of `orig` onto `replacement`, then drop `orig`.
    pub fn replace(&mut self, orig: T, replacement: T) {
        for successor in self.successors(orig) {
            self.add_edge(replacement, successor);
        }
        for predecessor in self.predecessors(orig) {
            self.add_edge(predecessor, replacement);
        }
        self.remove_node(orig);
    }

    /// A new graph with the same nodes and every edge inverted.
    pub fn reverse(&self) -> Graph<T> {
        let mut reversed = Graph::new();
        for node in self.inner.nodes() {
            reversed.add_node(node);
        }
        for (src, dst, _) in self.inner.all_edges() {
            reversed.add_edge(dst, src);
        }
        reversed
    }

    /// `true` if `source == dest` or `dest` is reachable from `source`.
    pub fn path_exists(&self, source: T, dest: T) -> bool {
        source == dest || self.preorder(source).any(|n| n == dest)
    }

    /// Depth-first pre-order iterator starting at `start`.
    pub fn preorder(&self, start: T) -> Preorder<'_, T> {
        Preorder {
            graph: self,
            stack: vec![start],
            visited: HashSet::new(),
        }
    }

    /// Classic recursive depth-first traversal with pre/post-order callbacks.
    pub fn depth_first_visit<V: NodeVisitor<T>>(&self, start: T, visitor: &mut V) {
        let mut visited = HashSet::new();
        self.depth_first_visit_helper(start, visitor, &mut visited);
    }

    fn depth_first_visit_helper<V: NodeVisitor<T>>(
        &self,
        node: T,
        visitor: &mut V,
        visited: &mut HashSet<T>,
    ) {
        if !visited.insert(node) {
            return;
        }

        if visitor.pre_visit(node) {
            for child in self.successors(node) {
                self.depth_first_visit_helper(child, visitor, visited);
            }
            visitor.post_visit(node);
        }
    }

    /// Nodes ordered so that every edge's source precedes its destination.
    ///
    /// A depth-first traversal is started from every source; nodes already
    /// reached from an earlier source are short-circuited. The result is the
    /// reverse of the concatenated post-order. The order is unspecified if
    /// the graph has cycles.
    pub fn topological_sort(&self) -> Vec<T> {
        let mut collector = PostOrderCollector {
            visited: HashSet::with_capacity(self.node_count()),
            post_order: Vec::with_capacity(self.node_count()),
        };

        for source in self.sources() {
            self.depth_first_visit(source, &mut collector);
        }

        collector.post_order.reverse();
        collector.post_order
    }
}

/// Shares one visited set across every DFS started by `topological_sort`.
struct PostOrderCollector<T> {
    visited: HashSet<T>,
    post_order: Vec<T>,
}

impl<T: NodeTrait> NodeVisitor<T> for PostOrderCollector<T> {
    fn pre_visit(&mut self, node: T) -> bool {
        self.visited.insert(node)
    }

    fn post_visit(&mut self, node: T) {
        self.post_order.push(node);
    }
}

/// Iterator returned by [`Graph::preorder`].
pub struct Preorder<'a, T: NodeTrait> {
    graph: &'a Graph<T>,
    stack: Vec<T>,
    visited: HashSet<T>,
}

impl<T: NodeTrait> Iterator for Preorder<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        while let Some(node) = self.stack.pop() {
            if !self.visited.insert(node) {
                continue;
            }
            for successor in self.graph.successors(node) {
                if !self.visited.contains(&successor) {
                    self.stack.push(successor);
                }
            }
            return Some(node);
        }
        None
    }
}
