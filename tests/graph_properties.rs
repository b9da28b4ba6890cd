// tests/graph_properties.rs

mod common;
use crate::common::{ExecutionLog, RecordingTask, same_structure, task_ref};

use proptest::prelude::*;

use jobgraph::dag::{Graph, TaskGraph};
use jobgraph::task::TaskRef;

// Acyclic by construction: edges only go from a lower to a higher index.
fn dag_strategy(max_nodes: u32) -> impl Strategy<Value = Graph<u32>> {
    (1..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec((0..n, 0..n), 0..(n as usize * 2)).prop_map(move |pairs| {
            let mut g = Graph::new();
            for node in 0..n {
                g.add_node(node);
            }
            for (a, b) in pairs {
                if a < b {
                    g.add_edge(a, b);
                } else if b < a {
                    g.add_edge(b, a);
                }
            }
            g
        })
    })
}

#[derive(Debug, Clone)]
enum Build {
    Add,
    AddAfter(Vec<usize>),
    Append,
}

fn build_strategy() -> impl Strategy<Value = Vec<Build>> {
    let step = prop_oneof![
        Just(Build::Add),
        proptest::collection::vec(any::<usize>(), 1..3).prop_map(Build::AddAfter),
        Just(Build::Append),
    ];
    proptest::collection::vec(step, 1..12)
}

fn build_task_graph(steps: &[Build]) -> (TaskGraph, Vec<TaskRef>) {
    let log = ExecutionLog::new();
    let mut graph = TaskGraph::new();
    let mut tasks: Vec<TaskRef> = Vec::new();

    for (i, step) in steps.iter().enumerate() {
        let (_, task) = task_ref(RecordingTask::new(&format!("t{i}"), &log));
        match step {
            Build::Add => {
                graph.add_task(task.clone()).unwrap();
            }
            Build::AddAfter(picks) if !tasks.is_empty() => {
                let preds: Vec<&TaskRef> = picks.iter().map(|p| &tasks[p % tasks.len()]).collect();
                graph.add_task_after(task.clone(), &preds).unwrap();
            }
            Build::AddAfter(_) => {
                graph.add_task(task.clone()).unwrap();
            }
            Build::Append => {
                graph.append_task(task.clone()).unwrap();
            }
        }
        tasks.push(task);
    }

    (graph, tasks)
}

proptest! {
    #[test]
    fn topological_sort_orders_every_edge(g in dag_strategy(16)) {
        let order = g.topological_sort();
        prop_assert_eq!(order.len(), g.node_count());

        let pos = |n: u32| order.iter().position(|x| *x == n);
        for (src, dst) in g.edges() {
            prop_assert!(pos(src) < pos(dst));
        }
    }

    #[test]
    fn double_reverse_is_identity(g in dag_strategy(16)) {
        prop_assert!(same_structure(&g, &g.reverse().reverse()));
    }

    #[test]
    fn task_graph_nodes_sit_between_start_and_end(steps in build_strategy()) {
        let (graph, tasks) = build_task_graph(&steps);
        let start = graph.start_id();
        let end = graph.end_id();

        prop_assert_eq!(graph.task_count(), tasks.len());
        prop_assert!(graph.predecessors(start).is_empty());
        for task in &tasks {
            let id = graph.task_id(task).unwrap();
            prop_assert!(graph.graph().path_exists(start, id));
            prop_assert!(graph.graph().path_exists(id, end));
        }
    }

    #[test]
    fn append_leaves_a_single_end_predecessor(steps in build_strategy()) {
        let (mut graph, _) = build_task_graph(&steps);
        let log = ExecutionLog::new();
        let (_, last) = task_ref(RecordingTask::new("last", &log));

        let id = graph.append_task(last).unwrap();
        prop_assert_eq!(graph.predecessors(graph.end_id()), vec![id]);
    }
}
