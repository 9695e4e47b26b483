//! Type Dependency Graph
//!
//! petgraph view over a subset of the table. Nodes are types, edges point from a
//! type to each type it embeds. Built fresh per sort or analysis pass.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

use super::unified::unified_fields;
use super::{Form, Table, Type, TypeRef};

/// Why one type depends on another
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    /// A struct field. `by_value` when the field is required and the reference
    /// is not inside a container or generic argument.
    Field { name: String, by_value: bool },
    /// A base type in an `extends` list
    Extends,
    /// Target of an alias
    AliasTarget,
    /// Base of a distinct type
    DistinctBase,
}

impl EdgeKind {
    /// Whether the dependent stores the dependency inline
    pub fn is_by_value(&self) -> bool {
        match self {
            Self::Field { by_value, .. } => *by_value,
            Self::Extends | Self::AliasTarget | Self::DistinctBase => true,
        }
    }

    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::Field { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// A dependency of one type on another, by qualified name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub target: String,
    pub kind: EdgeKind,
}

/// How struct fields contribute edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldSource {
    /// Own fields plus one `Extends` edge per base
    Declared,
    /// Unified (inherited, overridden, deleted) fields; no `Extends` edges
    Flattened,
}

pub struct DependencyGraph<'a> {
    pub graph: DiGraph<&'a Type, EdgeKind>,
    index: HashMap<&'a str, NodeIndex>,
}

impl<'a> DependencyGraph<'a> {
    /// Graph over `types` using declared fields and extends edges.
    /// Edges to types outside the subset are dropped.
    pub fn build(table: &'a Table, types: &[&'a Type]) -> Self {
        Self::build_with(table, types, FieldSource::Declared)
    }

    /// Graph over `types` using each struct's flattened field set, so deleted
    /// inherited fields contribute nothing.
    pub fn build_flattened(table: &'a Table, types: &[&'a Type]) -> Self {
        Self::build_with(table, types, FieldSource::Flattened)
    }

    fn build_with(table: &'a Table, types: &[&'a Type], source: FieldSource) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for typ in types {
            if index.contains_key(typ.qualified_name.as_str()) {
                continue;
            }
            let node = graph.add_node(*typ);
            index.insert(typ.qualified_name.as_str(), node);
        }

        for typ in types {
            let Some(&from) = index.get(typ.qualified_name.as_str()) else {
                continue;
            };
            for dep in dependencies_of(table, typ, source) {
                if let Some(&to) = index.get(dep.target.as_str()) {
                    graph.add_edge(from, to, dep.kind);
                }
            }
        }

        Self { graph, index }
    }

    pub fn node(&self, qualified_name: &str) -> Option<NodeIndex> {
        self.index.get(qualified_name).copied()
    }

    pub fn type_at(&self, node: NodeIndex) -> &'a Type {
        self.graph[node]
    }

    /// Outgoing neighbours in the order the edges were declared
    pub fn dependencies(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self.graph.edges(node).map(|e| e.target()).collect();
        // petgraph yields the most recently added edge first
        deps.reverse();
        deps
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

/// Direct dependencies of a type, in declaration order. Targets may lie
/// outside any particular subset; primitives and builtin generics are skipped.
pub fn direct_dependencies(table: &Table, typ: &Type) -> Vec<Dependency> {
    dependencies_of(table, typ, FieldSource::Declared)
}

fn dependencies_of(table: &Table, typ: &Type, source: FieldSource) -> Vec<Dependency> {
    let mut deps = Vec::new();
    let ns = typ.namespace.as_str();
    match &typ.form {
        Form::Struct(form) => {
            if source == FieldSource::Declared {
                for base in &form.extends {
                    if let Some(resolved) = table.resolve_ref(base, ns) {
                        deps.push(Dependency {
                            target: resolved.qualified_name.clone(),
                            kind: EdgeKind::Extends,
                        });
                    }
                }
            }
            let fields = match source {
                FieldSource::Declared => form.fields.clone(),
                FieldSource::Flattened => unified_fields(typ, table),
            };
            for field in &fields {
                let by_value = !field.is_any_optional();
                collect_ref(table, ns, &field.type_ref, &mut |target, inline| {
                    deps.push(Dependency {
                        target,
                        kind: EdgeKind::Field { name: field.name.clone(), by_value: by_value && inline },
                    });
                });
            }
        }
        Form::Alias(alias) => {
            collect_ref(table, ns, &alias.target, &mut |target, inline| {
                deps.push(Dependency {
                    target,
                    kind: if inline { EdgeKind::AliasTarget } else { container_edge("target") },
                });
            });
        }
        Form::Distinct(distinct) => {
            collect_ref(table, ns, &distinct.base, &mut |target, inline| {
                deps.push(Dependency {
                    target,
                    kind: if inline { EdgeKind::DistinctBase } else { container_edge("base") },
                });
            });
        }
        Form::Primitive { .. } | Form::Enum(_) | Form::BuiltinGeneric { .. } => {}
    }
    deps
}

fn container_edge(name: &str) -> EdgeKind {
    EdgeKind::Field { name: name.to_string(), by_value: false }
}

/// Walk a reference, reporting every declared type it names. The flag is
/// true only for the outermost, non-container position.
fn collect_ref(table: &Table, namespace: &str, type_ref: &TypeRef, emit: &mut dyn FnMut(String, bool)) {
    collect_ref_inner(table, namespace, type_ref, true, emit);
}

fn collect_ref_inner(
    table: &Table,
    namespace: &str,
    type_ref: &TypeRef,
    inline: bool,
    emit: &mut dyn FnMut(String, bool),
) {
    if type_ref.is_type_param() {
        return;
    }
    let Some(resolved) = table.resolve_ref(type_ref, namespace) else {
        return;
    };
    match &resolved.form {
        Form::Primitive { .. } => {}
        Form::BuiltinGeneric { .. } => {
            for arg in &type_ref.type_args {
                collect_ref_inner(table, namespace, arg, false, emit);
            }
        }
        _ => {
            emit(resolved.qualified_name.clone(), inline);
            for arg in &type_ref.type_args {
                collect_ref_inner(table, namespace, arg, false, emit);
            }
        }
    }
}
