//! Cycle Analysis
//!
//! Strongly connected components over the by-value dependency graph. A type in
//! a by-value cycle contains itself inline, directly or through a chain of
//! required fields, bases, alias targets or distinct bases, and so has infinite
//! size. Optional fields and container elements never count as by-value.
//!
//! Structs contribute their flattened fields, so an inherited field deleted by
//! the child is gone before cycles are looked for. Base lists are checked on
//! their own: a struct may not extend itself, directly or through its bases.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

use super::graph::{DependencyGraph, EdgeKind};
use super::{Table, Type};
use crate::error::{CodegenError, Result};

// =============================================================================
// Cycle Groups
// =============================================================================

/// An edge inside a cycle group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleEdge {
    pub from: String,
    /// Field name, or `extends` / `target` / `base` for structural edges
    pub via: String,
    pub to: String,
}

/// One strongly connected component of by-value references
#[derive(Debug, Clone)]
pub struct CycleGroup {
    pub id: usize,
    pub members: Vec<String>,
    pub edges: Vec<CycleEdge>,
    /// Single member that embeds itself
    pub is_self_referential: bool,
}

impl CycleGroup {
    /// Human readable chain, e.g. `ns.A.b -> ns.B.a -> ns.A`
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self.edges.iter().map(|e| format!("{}.{}", e.from, e.via)).collect();
        if let Some(first) = self.edges.first() {
            parts.push(first.from.clone());
        }
        parts.join(" -> ")
    }
}

/// Every by-value cycle in the table
#[derive(Debug, Clone, Default)]
pub struct CycleAnalysis {
    pub groups: Vec<CycleGroup>,
    membership: HashMap<String, usize>,
}

impl CycleAnalysis {
    pub fn get(&self, qualified_name: &str) -> Option<&CycleGroup> {
        self.membership.get(qualified_name).and_then(|id| self.groups.get(*id))
    }

    pub fn is_cyclic(&self, qualified_name: &str) -> bool {
        self.membership.contains_key(qualified_name)
    }

    /// Reject `typ` if it embeds itself by value
    pub fn check(&self, typ: &Type) -> Result<()> {
        let Some(group) = self.get(&typ.qualified_name) else {
            return Ok(());
        };
        let field = group
            .edges
            .iter()
            .find(|e| e.from == typ.qualified_name)
            .map(|e| e.via.clone())
            .unwrap_or_default();
        Err(CodegenError::UninhabitableType {
            type_name: typ.qualified_name.clone(),
            field,
            chain: group.describe(),
        })
    }
}

fn edge_label(kind: &EdgeKind) -> String {
    match kind {
        EdgeKind::Field { name, .. } => name.clone(),
        EdgeKind::Extends => "extends".into(),
        EdgeKind::AliasTarget => "target".into(),
        EdgeKind::DistinctBase => "base".into(),
    }
}

// =============================================================================
// Analysis
// =============================================================================

/// Compute by-value cycles across every declared type
pub fn compute_cycles(table: &Table) -> CycleAnalysis {
    let declared: Vec<&Type> = table.declared().collect();
    let mut analysis = CycleAnalysis::default();

    // Flattened fields, so deleted inherited fields are already gone
    let flattened = DependencyGraph::build_flattened(table, &declared);
    let by_value: DiGraph<&Type, EdgeKind> = flattened.graph.filter_map(
        |_, typ| Some(*typ),
        |_, kind| if kind.is_by_value() { Some(kind.clone()) } else { None },
    );
    analysis.add_groups(&by_value);

    // A base chain leading back to the struct itself
    let declared_graph = DependencyGraph::build(table, &declared);
    let bases: DiGraph<&Type, EdgeKind> = declared_graph.graph.filter_map(
        |_, typ| Some(*typ),
        |_, kind| if *kind == EdgeKind::Extends { Some(kind.clone()) } else { None },
    );
    analysis.add_groups(&bases);

    analysis
}

impl CycleAnalysis {
    /// Record every non-trivial SCC of `graph`. A type already in a group
    /// keeps its first group.
    fn add_groups(&mut self, graph: &DiGraph<&Type, EdgeKind>) {
        for scc in kosaraju_scc(graph) {
            let is_self_ref = scc.len() == 1 && has_self_loop(graph, scc[0]);
            if scc.len() == 1 && !is_self_ref {
                continue;
            }

            let id = self.groups.len();
            let member_set: HashSet<NodeIndex> = scc.iter().copied().collect();
            // Stable member order regardless of SCC traversal
            let mut nodes = scc.clone();
            nodes.sort();

            let mut edges = Vec::new();
            for node in &nodes {
                let mut outgoing: Vec<_> = graph
                    .edges_directed(*node, Direction::Outgoing)
                    .filter(|e| member_set.contains(&e.target()))
                    .collect();
                outgoing.reverse();
                for edge in outgoing {
                    edges.push(CycleEdge {
                        from: graph[*node].qualified_name.clone(),
                        via: edge_label(edge.weight()),
                        to: graph[edge.target()].qualified_name.clone(),
                    });
                }
            }

            let members: Vec<String> = nodes.iter().map(|n| graph[*n].qualified_name.clone()).collect();
            for member in &members {
                self.membership.entry(member.clone()).or_insert(id);
            }
            self.groups.push(CycleGroup { id, members, edges, is_self_referential: is_self_ref });
        }
    }
}

fn has_self_loop(graph: &DiGraph<&Type, EdgeKind>, node: NodeIndex) -> bool {
    graph.edges_directed(node, Direction::Outgoing).any(|e| e.target() == node)
}

/// Check a single type against a fresh analysis of the table
pub fn check_inhabitable(table: &Table, typ: &Type) -> Result<()> {
    compute_cycles(table).check(typ)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::{Field, Form, StructForm, TypeRef};

    fn add_struct(table: &mut Table, name: &str, fields: Vec<Field>) {
        table
            .add(Type::new("ns", name, Form::Struct(StructForm { fields, ..Default::default() })))
            .unwrap();
    }

    #[test]
    fn test_optional_self_reference_is_fine() {
        let mut table = Table::new();
        add_struct(&mut table, "Node", vec![
            Field::new("name", TypeRef::named("string")),
            Field::new("children", TypeRef::array(TypeRef::named("ns.Node"))).optional(),
            Field::new("next", TypeRef::named("ns.Node")).hard_optional(),
        ]);
        let node = table.get("ns.Node").unwrap();
        assert!(check_inhabitable(&table, node).is_ok());
    }

    #[test]
    fn test_required_self_embedding_rejected() {
        let mut table = Table::new();
        add_struct(&mut table, "Bad", vec![Field::new("inner", TypeRef::named("ns.Bad"))]);
        let bad = table.get("ns.Bad").unwrap();
        match check_inhabitable(&table, bad) {
            Err(CodegenError::UninhabitableType { type_name, field, .. }) => {
                assert_eq!(type_name, "ns.Bad");
                assert_eq!(field, "inner");
            }
            other => panic!("Expected UninhabitableType, got {:?}", other),
        }
    }

    #[test]
    fn test_required_chain_rejected() {
        let mut table = Table::new();
        add_struct(&mut table, "A", vec![Field::new("b", TypeRef::named("ns.B"))]);
        add_struct(&mut table, "B", vec![Field::new("a", TypeRef::named("ns.A"))]);
        add_struct(&mut table, "C", vec![Field::new("a", TypeRef::named("ns.A"))]);
        let analysis = compute_cycles(&table);
        assert_eq!(analysis.groups.len(), 1);
        assert!(analysis.is_cyclic("ns.A"));
        assert!(analysis.is_cyclic("ns.B"));
        assert!(!analysis.is_cyclic("ns.C"));
        assert!(analysis.check(table.get("ns.C").unwrap()).is_ok());
        let err = analysis.check(table.get("ns.A").unwrap()).unwrap_err();
        assert!(err.to_string().contains("ns.A.b"));
    }

    #[test]
    fn test_deleted_field_resolves_before_self_reference() {
        let mut table = Table::new();
        add_struct(&mut table, "Parent", vec![
            Field::new("id", TypeRef::named("uuid")),
            Field::new("child", TypeRef::named("ns.Child")),
        ]);
        table
            .add(Type::new("ns", "Child", Form::Struct(StructForm {
                extends: vec![TypeRef::named("ns.Parent")],
                omitted_fields: vec!["child".into()],
                ..Default::default()
            })))
            .unwrap();
        let analysis = compute_cycles(&table);
        assert!(analysis.groups.is_empty());
    }

    fn add_derived(table: &mut Table, name: &str, base: &str) {
        table
            .add(Type::new("ns", name, Form::Struct(StructForm {
                fields: vec![Field::new("a", TypeRef::named("string"))],
                extends: vec![TypeRef::named(base)],
                ..Default::default()
            })))
            .unwrap();
    }

    #[test]
    fn test_self_extension_rejected() {
        let mut table = Table::new();
        add_derived(&mut table, "Loop", "ns.Loop");
        let looped = table.get("ns.Loop").unwrap();
        match check_inhabitable(&table, looped) {
            Err(CodegenError::UninhabitableType { type_name, field, chain }) => {
                assert_eq!(type_name, "ns.Loop");
                assert_eq!(field, "extends");
                assert_eq!(chain, "ns.Loop.extends -> ns.Loop");
            }
            other => panic!("Expected UninhabitableType, got {:?}", other),
        }
    }

    #[test]
    fn test_extends_chain_rejected() {
        let mut table = Table::new();
        add_derived(&mut table, "A", "ns.B");
        add_derived(&mut table, "B", "ns.A");
        add_derived(&mut table, "C", "ns.A");
        let analysis = compute_cycles(&table);
        assert!(analysis.is_cyclic("ns.A"));
        assert!(analysis.is_cyclic("ns.B"));
        assert!(!analysis.is_cyclic("ns.C"));
        assert!(analysis.get("ns.A").unwrap().edges.iter().all(|e| e.via == "extends"));
    }
}
