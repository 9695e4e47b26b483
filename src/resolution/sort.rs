//! Topological Sort
//!
//! Orders a subset of the table so each type's dependencies precede it.
//! Depth-first with three-colour marking: an edge into an in-progress node is a
//! cycle and is simply not treated as an ordering constraint. Backends break the
//! cycle themselves (forward declarations, lazy getters). Roots are visited in
//! input order and dependencies in declaration order, so unconstrained types
//! keep their original relative order.

use petgraph::graph::NodeIndex;

use super::graph::DependencyGraph;
use super::{Table, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    InProgress,
    Done,
}

/// Sort `types` so dependencies come first. Every input appears exactly once.
pub fn topological_sort<'a>(table: &'a Table, types: &[&'a Type]) -> Vec<&'a Type> {
    if types.len() <= 1 {
        return types.to_vec();
    }
    let graph = DependencyGraph::build(table, types);
    let mut states = vec![VisitState::Unvisited; graph.node_count()];
    let mut order = Vec::with_capacity(graph.node_count());

    for typ in types {
        if let Some(node) = graph.node(&typ.qualified_name) {
            visit(&graph, node, &mut states, &mut order);
        }
    }

    order.into_iter().map(|n| graph.type_at(n)).collect()
}

fn visit(graph: &DependencyGraph<'_>, node: NodeIndex, states: &mut [VisitState], order: &mut Vec<NodeIndex>) {
    match states[node.index()] {
        VisitState::Done | VisitState::InProgress => return,
        VisitState::Unvisited => {}
    }
    states[node.index()] = VisitState::InProgress;
    for dep in graph.dependencies(node) {
        visit(graph, dep, states, order);
    }
    states[node.index()] = VisitState::Done;
    order.push(node);
}
