//! Output Collector & Merger
//!
//! Groups a target's types by output path. First-seen path order is recorded
//! once and never changes; `remove` empties a group in place so a generator can
//! absorb it into another file without the path reappearing as a near-empty
//! file.

use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Component, Path};

use super::directives;
use crate::error::{CodegenError, Result};
use crate::resolution::{unified_fields, Form, Table, Type, TypeRef};

type PathFn<'a> = Box<dyn Fn(&Type) -> Option<String> + 'a>;
type SkipFn<'a> = Box<dyn Fn(&Type) -> bool + 'a>;

/// Per-target grouping of types by output path
pub struct Collector<'a> {
    domain: String,
    path_fn: Option<PathFn<'a>>,
    skip: Option<SkipFn<'a>>,
    groups: IndexMap<String, Vec<&'a Type>>,
}

impl<'a> Collector<'a> {
    /// Collector reading `@<domain> output` and skipping `@<domain> omit`
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            path_fn: None,
            skip: None,
            groups: IndexMap::new(),
        }
    }

    /// Compute output paths with `f` instead of the output directive
    pub fn with_path_fn(mut self, f: impl Fn(&Type) -> Option<String> + 'a) -> Self {
        self.path_fn = Some(Box::new(f));
        self
    }

    /// Additional skip predicate, checked after the omit directive
    pub fn with_skip(mut self, f: impl Fn(&Type) -> bool + 'a) -> Self {
        self.skip = Some(Box::new(f));
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn output_path(&self, typ: &Type) -> Option<String> {
        match &self.path_fn {
            Some(f) => f(typ),
            None => directives::output_path(typ, &self.domain),
        }
    }

    /// Add a type to its output group. Types without a path, omitted types
    /// and types matching the skip predicate are ignored.
    pub fn add(&mut self, typ: &'a Type) -> Result<()> {
        let Some(path) = self.output_path(typ) else {
            return Ok(());
        };
        if directives::is_omitted(typ, &self.domain) {
            return Ok(());
        }
        if self.skip.as_ref().map(|f| f(typ)).unwrap_or(false) {
            return Ok(());
        }
        validate_output_path(&path).map_err(|_| CodegenError::PathTraversal {
            type_name: typ.qualified_name.clone(),
            path: path.clone(),
        })?;
        self.groups.entry(path).or_default().push(typ);
        Ok(())
    }

    /// Add every type, returning the errors of the ones that failed
    pub fn add_all(&mut self, types: impl IntoIterator<Item = &'a Type>) -> Vec<CodegenError> {
        types.into_iter().filter_map(|t| self.add(t).err()).collect()
    }

    /// Detach a path's types. The path keeps its position but is skipped by
    /// `for_each` and `paths` while empty.
    pub fn remove(&mut self, path: &str) -> Vec<&'a Type> {
        self.groups.get_mut(path).map(std::mem::take).unwrap_or_default()
    }

    pub fn get(&self, path: &str) -> &[&'a Type] {
        self.groups.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, path: &str) -> bool {
        !self.get(path).is_empty()
    }

    /// Non-empty paths in first-seen order
    pub fn paths(&self) -> Vec<String> {
        self.groups.iter().filter(|(_, v)| !v.is_empty()).map(|(k, _)| k.clone()).collect()
    }

    pub fn for_each(&self, mut f: impl FnMut(&str, &[&'a Type])) {
        for (path, types) in &self.groups {
            if !types.is_empty() {
                f(path, types);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.groups.values().filter(|v| !v.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reject absolute paths and paths that climb out of the root
pub fn validate_output_path(path: &str) -> std::result::Result<(), String> {
    let mut depth: i64 = 0;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("{} escapes the root", path));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("{} is absolute", path));
            }
        }
    }
    Ok(())
}

// =============================================================================
// Merge
// =============================================================================

/// Union keyed by qualified name: all of `a` in order, then the elements of
/// `b` not already present, in `b`'s order.
pub fn merge_types<'a>(a: &[&'a Type], b: &[&'a Type]) -> Vec<&'a Type> {
    merge_by(a, b, |t| t.qualified_name.as_str())
}

/// Same as [`merge_types`] but keyed by display name
pub fn merge_types_by_name<'a>(a: &[&'a Type], b: &[&'a Type]) -> Vec<&'a Type> {
    merge_by(a, b, |t| t.name.as_str())
}

fn merge_by<'a>(a: &[&'a Type], b: &[&'a Type], key: impl Fn(&'a Type) -> &'a str) -> Vec<&'a Type> {
    let mut seen: HashSet<&str> = a.iter().map(|t| key(*t)).collect();
    let mut merged = a.to_vec();
    for typ in b {
        if seen.insert(key(*typ)) {
            merged.push(*typ);
        }
    }
    merged
}

/// Enums referenced by the fields, alias targets or distinct bases of
/// `types`, type arguments included, in first-reference order
pub fn referenced_enums<'a>(table: &'a Table, types: &[&'a Type]) -> Vec<&'a Type> {
    let mut found = Vec::new();
    for typ in types {
        let refs: Vec<TypeRef> = match &typ.form {
            Form::Struct(_) => unified_fields(typ, table).into_iter().map(|f| f.type_ref).collect(),
            Form::Alias(alias) => vec![alias.target.clone()],
            Form::Distinct(distinct) => vec![distinct.base.clone()],
            Form::Primitive { .. } | Form::Enum(_) | Form::BuiltinGeneric { .. } => Vec::new(),
        };
        for type_ref in &refs {
            collect_enums(table, type_ref, &typ.namespace, &mut found);
        }
    }
    found
}

/// Enums declared in one output file: those `owners` reference that have no
/// other home for `domain`, followed by the standalone enums of the path
pub fn local_enums<'a>(
    table: &'a Table,
    domain: &str,
    path: &str,
    owners: &[&'a Type],
    standalone: Vec<&'a Type>,
) -> Vec<&'a Type> {
    let namespace = owners.first().map(|t| t.namespace.as_str()).unwrap_or("");
    let referenced: Vec<&Type> = referenced_enums(table, owners)
        .into_iter()
        .filter(|e| !directives::is_omitted(e, domain))
        .filter(|e| match directives::output_path(e, domain) {
            Some(out) => out == path,
            None => e.namespace == namespace,
        })
        .collect();
    merge_types(&referenced, &standalone)
}

fn collect_enums<'a>(table: &'a Table, type_ref: &TypeRef, namespace: &str, found: &mut Vec<&'a Type>) {
    if let Some(typ) = table.resolve_ref(type_ref, namespace) {
        if typ.is_enum() && !found.iter().any(|f| f.qualified_name == typ.qualified_name) {
            found.push(typ);
        }
    }
    for arg in &type_ref.type_args {
        collect_enums(table, arg, namespace, found);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::{Domain, EnumForm, Expression, ExpressionValue, Form, StructForm};

    fn typ(ns: &str, name: &str, output: Option<&str>) -> Type {
        let t = Type::new(ns, name, Form::Struct(StructForm::default()));
        match output {
            Some(path) => t.with_domain(
                Domain::new("cpp").with(Expression::new("output").with_value(ExpressionValue::String(path.into()))),
            ),
            None => t,
        }
    }

    fn names(types: &[&Type]) -> Vec<String> {
        types.iter().map(|t| t.qualified_name.clone()).collect()
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let a = typ("a", "A", Some("out/a"));
        let b = typ("b", "B", Some("out/b"));
        let a2 = typ("a", "A2", Some("out/a"));
        let none = typ("c", "C", None);
        let mut collector = Collector::new("cpp");
        for t in [&a, &b, &a2, &none] {
            collector.add(t).unwrap();
        }
        assert_eq!(collector.paths(), vec!["out/a", "out/b"]);
        assert_eq!(names(collector.get("out/a")), vec!["a.A", "a.A2"]);
    }

    #[test]
    fn test_skips_omitted_and_predicate() {
        let omitted = Type::new("a", "A", Form::Struct(StructForm::default())).with_domain(
            Domain::new("cpp")
                .with(Expression::new("output").with_value(ExpressionValue::String("out/a".into())))
                .with(Expression::new("omit")),
        );
        let enm = Type::new("a", "E", Form::Enum(EnumForm::default())).with_domain(
            Domain::new("cpp").with(Expression::new("output").with_value(ExpressionValue::String("out/a".into()))),
        );
        let mut collector = Collector::new("cpp").with_skip(|t| t.is_enum());
        collector.add(&enm).unwrap();
        assert!(collector.is_empty());
        collector.add(&omitted).unwrap();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_rejects_traversal() {
        let escaping = typ("a", "A", Some("../../etc"));
        let mut collector = Collector::new("cpp");
        match collector.add(&escaping) {
            Err(CodegenError::PathTraversal { type_name, .. }) => assert_eq!(type_name, "a.A"),
            other => panic!("Expected PathTraversal, got {:?}", other),
        }
        assert!(validate_output_path("/abs/path").is_err());
        assert!(validate_output_path("a/../b").is_ok());
    }

    #[test]
    fn test_remove_keeps_order_and_skips_empty() {
        let a = typ("a", "A", Some("out/a"));
        let b = typ("b", "B", Some("out/b"));
        let mut collector = Collector::new("cpp");
        collector.add(&a).unwrap();
        collector.add(&b).unwrap();
        let removed = collector.remove("out/a");
        assert_eq!(names(&removed), vec!["a.A"]);
        let mut visited = Vec::new();
        collector.for_each(|path, _| visited.push(path.to_string()));
        assert_eq!(visited, vec!["out/b"]);
        assert!(collector.remove("missing").is_empty());
    }

    #[test]
    fn test_path_fn_override() {
        let a = typ("a", "A", None);
        let mut collector = Collector::new("pb").with_path_fn(|t| Some(format!("gen/{}", t.namespace)));
        collector.add(&a).unwrap();
        assert_eq!(collector.paths(), vec!["gen/a"]);
    }

    #[test]
    fn test_referenced_enums_in_first_use_order() {
        let mut table = Table::new();
        table.add(Type::new("x", "Color", Form::Enum(EnumForm::default()))).unwrap();
        table.add(Type::new("x", "Size", Form::Enum(EnumForm::default()))).unwrap();
        table.add(Type::new("x", "Unused", Form::Enum(EnumForm::default()))).unwrap();
        let fields = vec![
            crate::resolution::Field::new("sizes", TypeRef::array(TypeRef::named("x.Size"))),
            crate::resolution::Field::new("color", TypeRef::named("Color")),
            crate::resolution::Field::new("again", TypeRef::named("x.Size")),
        ];
        table
            .add(Type::new("x", "Shirt", Form::Struct(StructForm { fields, ..Default::default() })))
            .unwrap();
        let shirt = table.get("x.Shirt").unwrap();
        assert_eq!(names(&referenced_enums(&table, &[shirt])), vec!["x.Size", "x.Color"]);
    }

    #[test]
    fn test_merge_types_law() {
        let a = typ("x", "A", None);
        let b = typ("x", "B", None);
        let c = typ("y", "B", None);
        let d = typ("x", "D", None);
        assert!(merge_types(&[], &[]).is_empty());
        assert_eq!(names(&merge_types(&[&a], &[])), vec!["x.A"]);
        assert_eq!(names(&merge_types(&[], &[&b])), vec!["x.B"]);
        assert_eq!(names(&merge_types(&[&b, &a], &[&d, &a, &c])), vec!["x.B", "x.A", "x.D", "y.B"]);
        assert_eq!(names(&merge_types_by_name(&[&b, &a], &[&d, &c])), vec!["x.B", "x.A", "x.D"]);
    }

    #[test]
    fn test_merge_keeps_all_of_first_list() {
        let a = typ("x", "A", None);
        let b = typ("x", "B", None);
        let c = typ("x", "C", None);
        assert_eq!(names(&merge_types(&[&a, &b, &a], &[&c, &a, &c])), vec!["x.A", "x.B", "x.A", "x.C"]);
        assert_eq!(names(&merge_types_by_name(&[&a, &a], &[&b])), vec!["x.A", "x.A", "x.B"]);
    }
}
