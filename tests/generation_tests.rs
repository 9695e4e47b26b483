//! End-to-end generation tests
//!
//! Builds tables programmatically and runs every default backend through the
//! registry, checking the cross-target properties of the generator.

use polyglot_schemas::codegen::collector::merge_types;
use polyglot_schemas::codegen::GenerationReport;
use polyglot_schemas::resolution::{
    unified_fields, DistinctForm, Domain, Expression, ExpressionValue, Field, Form, StructForm, TypeParam, TypeRef,
};
use polyglot_schemas::{CodegenError, CompilerConfig, Registry, Request, Table, Type};

const TARGETS: [&str; 3] = ["cpp", "ts", "pb"];

fn output(domain: &str, path: &str) -> Domain {
    Domain::new(domain).with(Expression::new("output").with_value(ExpressionValue::String(path.into())))
}

/// Struct with an output for every target under `{target}/{dir}`
fn everywhere(ns: &str, name: &str, form: StructForm, dir: &str) -> Type {
    TARGETS
        .iter()
        .fold(Type::new(ns, name, Form::Struct(form)), |t, target| {
            t.with_domain(output(target, &format!("{}/{}", target, dir)))
        })
}

fn fields(fields: Vec<Field>) -> StructForm {
    StructForm { fields, ..Default::default() }
}

fn generate(table: &Table) -> GenerationReport {
    let registry = Registry::with_defaults(&CompilerConfig::default());
    registry.generate_all(&Request::new(table), &[]).unwrap()
}

fn file<'r>(report: &'r GenerationReport, path: &str) -> &'r str {
    match report.files().find(|f| f.path == path) {
        Some(f) => &f.content,
        None => panic!("missing {} (errors: {:?})", path, report.errors()),
    }
}

fn abc_table() -> Table {
    let mut table = Table::new();
    table.add(everywhere("t", "A", fields(vec![Field::new("x", TypeRef::named("string"))]), "abc")).unwrap();
    table.add(everywhere("t", "B", fields(vec![Field::new("y", TypeRef::named("int32"))]), "abc")).unwrap();
    table
        .add(everywhere(
            "t",
            "C",
            StructForm {
                fields: vec![Field::new("z", TypeRef::named("bool"))],
                extends: vec![TypeRef::named("A"), TypeRef::named("B")],
                ..Default::default()
            },
            "abc",
        ))
        .unwrap();
    table
}

fn node_table() -> Table {
    let mut table = Table::new();
    table
        .add(everywhere(
            "tree",
            "Node",
            fields(vec![
                Field::new("name", TypeRef::named("string")),
                Field::new("children", TypeRef::array(TypeRef::named("tree.Node"))).optional(),
            ]),
            "tree",
        ))
        .unwrap();
    table
}

// =============================================================================
// Determinism & ordering
// =============================================================================

#[test]
fn test_generation_is_deterministic() {
    let table = abc_table();
    let first: Vec<_> = generate(&table).files().cloned().collect();
    let second: Vec<_> = generate(&table).files().cloned().collect();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_dependencies_are_declared_first() {
    let mut table = Table::new();
    table
        .add(everywhere("ns", "Outer", fields(vec![Field::new("inner", TypeRef::named("Inner"))]), "order"))
        .unwrap();
    table
        .add(everywhere("ns", "Inner", fields(vec![Field::new("value", TypeRef::named("int64"))]), "order"))
        .unwrap();
    let report = generate(&table);
    assert!(!report.has_errors(), "{:?}", report.errors());

    let cpp = file(&report, "cpp/order/types.gen.h");
    assert!(cpp.find("struct Inner {").unwrap() < cpp.find("struct Outer {").unwrap());
    let ts = file(&report, "ts/order/types.gen.ts");
    assert!(ts.find("export const innerZ").unwrap() < ts.find("export const outerZ").unwrap());
    let pb = file(&report, "pb/order/ns.proto");
    assert!(pb.find("message Inner {").unwrap() < pb.find("message Outer {").unwrap());
}

#[test]
fn test_every_type_appears_once_unless_omitted() {
    let mut table = Table::new();
    for (name, dir) in [("One", "a"), ("Two", "b"), ("Three", "a")] {
        table.add(everywhere("ns", name, fields(vec![Field::new("v", TypeRef::named("string"))]), dir)).unwrap();
    }
    let hidden = everywhere("ns", "Hidden", StructForm::default(), "a")
        .with_domain(output("pb", "pb/a").with(Expression::new("omit")));
    table.add(hidden).unwrap();

    let report = generate(&table);
    let pb: String = report.files().filter(|f| f.path.ends_with(".proto")).map(|f| f.content.clone()).collect();
    for name in ["One", "Two", "Three"] {
        assert_eq!(pb.matches(&format!("message {} {{", name)).count(), 1, "{}", name);
    }
    assert!(!pb.contains("message Hidden"));

    let cpp: String = report.files().filter(|f| f.path.ends_with(".h")).map(|f| f.content.clone()).collect();
    for name in ["One", "Two", "Three", "Hidden"] {
        assert_eq!(cpp.matches(&format!("struct {} {{", name)).count(), 1, "{}", name);
    }
}

#[test]
fn test_merge_law() {
    let a = Type::new("ns", "A", Form::Struct(StructForm::default()));
    let b = Type::new("ns", "B", Form::Struct(StructForm::default()));
    let c = Type::new("ns", "C", Form::Struct(StructForm::default()));
    let names = |v: Vec<&Type>| v.iter().map(|t| t.name.clone()).collect::<Vec<_>>();

    assert!(merge_types(&[], &[]).is_empty());
    assert_eq!(names(merge_types(&[&a], &[])), vec!["A"]);
    assert_eq!(names(merge_types(&[], &[&b, &a])), vec!["B", "A"]);
    assert_eq!(names(merge_types(&[&c, &a], &[&b, &a, &c])), vec!["C", "A", "B"]);
}

// =============================================================================
// Cycles
// =============================================================================

#[test]
fn test_recursive_node_generates_for_every_target() {
    let report = generate(&node_table());
    assert!(!report.has_errors(), "{:?}", report.errors());
    assert_eq!(report.files().count(), 4);

    let cpp = file(&report, "cpp/tree/types.gen.h");
    assert!(cpp.contains("struct Node;\n"));
    assert!(cpp.contains("    std::vector<Node> children;\n"));

    let json = file(&report, "cpp/tree/json.gen.h");
    assert!(json.contains("#include \"cpp/tree/types.gen.h\"\n"));
    assert!(json.contains("    value.children = parser.field<std::vector<Node>>(\"children\");\n"));

    let ts = file(&report, "ts/tree/types.gen.ts");
    assert!(ts.contains("  get children() {\n"));
    assert!(ts.contains("nodeZ"));

    let pb = file(&report, "pb/tree/tree.proto");
    assert!(pb.contains("message Node {\n  string name = 1;\n  repeated Node children = 2;\n}\n"));
}

#[test]
fn test_required_self_embedding_fails_only_that_file() {
    let mut table = node_table();
    table
        .add(everywhere("bad", "Loop", fields(vec![Field::new("next", TypeRef::named("bad.Loop"))]), "bad"))
        .unwrap();
    let report = generate(&table);

    assert!(report.files().any(|f| f.path == "cpp/tree/types.gen.h"));
    assert!(!report.files().any(|f| f.path.contains("/bad/")));
    let errors = report.errors();
    assert_eq!(errors.len(), 4);
    for error in errors {
        match error {
            CodegenError::Generation { source, .. } => {
                assert!(matches!(**source, CodegenError::UninhabitableType { .. }))
            }
            other => panic!("Expected Generation, got {:?}", other),
        }
    }
}

// =============================================================================
// Generics & inheritance
// =============================================================================

fn status_table(explicit_default: bool) -> Table {
    let mut table = Table::new();
    let mut details = TypeParam::new("D");
    details.default = Some(TypeRef::named("string"));
    table
        .add(everywhere(
            "status",
            "Status",
            StructForm {
                fields: vec![Field::new("details", TypeRef::param(details.clone()))],
                type_params: vec![details],
                ..Default::default()
            },
            "status",
        ))
        .unwrap();
    let status = if explicit_default {
        TypeRef::named("Status").with_args(vec![TypeRef::named("string")])
    } else {
        TypeRef::named("Status")
    };
    table
        .add(everywhere("status", "Report", fields(vec![Field::new("status", status)]), "status"))
        .unwrap();
    table
}

#[test]
fn test_defaulted_generic_instantiation_is_equivalent() {
    let implicit: Vec<_> = generate(&status_table(false)).files().cloned().collect();
    let explicit: Vec<_> = generate(&status_table(true)).files().cloned().collect();
    assert_eq!(implicit.len(), 4);
    assert_eq!(implicit, explicit);
}

#[test]
fn test_flattened_fields_follow_parent_then_child() {
    let mut table = Table::new();
    table
        .add(everywhere(
            "ns",
            "Parent",
            fields(vec![
                Field::new("a", TypeRef::named("string")),
                Field::new("b", TypeRef::named("string")),
                Field::new("c", TypeRef::named("string")),
            ]),
            "inherit",
        ))
        .unwrap();
    table
        .add(everywhere(
            "ns",
            "Child",
            StructForm {
                fields: vec![Field::new("a", TypeRef::named("int32")), Field::new("d", TypeRef::named("bool"))],
                extends: vec![TypeRef::named("Parent")],
                omitted_fields: vec!["b".into()],
                ..Default::default()
            },
            "inherit",
        ))
        .unwrap();

    let child = table.get("ns.Child").unwrap();
    let names: Vec<String> = unified_fields(child, &table).into_iter().map(|f| f.name).collect();
    assert_eq!(names, vec!["c", "a", "d"]);

    let report = generate(&table);
    let pb = file(&report, "pb/inherit/ns.proto");
    assert!(pb.contains("message Child {\n  string c = 1;\n  int32 a = 2;\n  bool d = 3;\n}\n"));
}

#[test]
fn test_multiple_inheritance_scenario() {
    let report = generate(&abc_table());
    assert!(!report.has_errors(), "{:?}", report.errors());

    let pb = file(&report, "pb/abc/t.proto");
    assert!(pb.contains("message C {\n  string x = 1;\n  int32 y = 2;\n  bool z = 3;\n}\n"));

    let cpp = file(&report, "cpp/abc/types.gen.h");
    assert!(cpp.contains("struct C : public A, public B {\n"));

    let ts = file(&report, "ts/abc/types.gen.ts");
    assert!(ts.contains("export const cZ = aZ\n  .extend(bZ.shape)\n"));
}

// =============================================================================
// Distinct types
// =============================================================================

#[test]
fn test_distinct_array_has_no_wire_message() {
    let mut table = Table::new();
    let tags = TARGETS.iter().fold(
        Type::new("ns", "Tags", Form::Distinct(DistinctForm {
            base: TypeRef::array(TypeRef::named("string")),
            type_params: vec![],
        })),
        |t, target| t.with_domain(output(target, &format!("{}/tags", target))),
    );
    table.add(tags).unwrap();

    let report = generate(&table);
    assert!(!report.has_errors(), "{:?}", report.errors());
    assert!(!report.files().any(|f| f.path.ends_with(".proto")));
    assert!(file(&report, "cpp/tags/types.gen.h").contains("struct Tags : private std::vector<std::string> {\n"));
    assert!(file(&report, "ts/tags/types.gen.ts").contains("export const tagsZ = z.array(z.string());\n"));
}

// =============================================================================
// Registry
// =============================================================================

#[test]
fn test_unknown_target_is_rejected_before_generation() {
    let table = node_table();
    let registry = Registry::with_defaults(&CompilerConfig::default());
    match registry.generate_all(&Request::new(&table), &["go/types".to_string()]) {
        Err(CodegenError::UnknownPlugin { name }) => assert_eq!(name, "go/types"),
        other => panic!("Expected UnknownPlugin, got {:?}", other),
    }
}

#[test]
fn test_selected_targets_only() {
    let table = node_table();
    let registry = Registry::with_defaults(&CompilerConfig::default());
    let report = registry.generate_all(&Request::new(&table), &["pb/types".to_string()]).unwrap();
    let paths: Vec<&str> = report.files().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["pb/tree/tree.proto"]);
}

#[test]
fn test_json_serializer_needs_types_plugin() {
    let table = node_table();
    let registry = Registry::with_defaults(&CompilerConfig::default());
    match registry.generate_all(&Request::new(&table), &["cpp/json".to_string()]) {
        Err(CodegenError::MissingPrerequisite { plugin, requires }) => {
            assert_eq!(plugin, "cpp/json");
            assert_eq!(requires, "cpp/types");
        }
        other => panic!("Expected MissingPrerequisite, got {:?}", other),
    }

    let targets = ["cpp/json".to_string(), "cpp/types".to_string()];
    let report = registry.generate_all(&Request::new(&table), &targets).unwrap();
    let mut paths: Vec<&str> = report.files().map(|f| f.path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, vec!["cpp/tree/json.gen.h", "cpp/tree/types.gen.h"]);
}

#[test]
fn test_table_loaded_from_json() {
    let table = Table::from_json(include_str!("fixtures/table.json")).unwrap();
    let report = generate(&table);
    assert!(!report.has_errors(), "{:?}", report.errors());

    let pb = file(&report, "core/pkg/service/rack/pb/rack.proto");
    assert!(pb.contains("package service.rack;"));
    assert!(pb.contains("  uint32 key = 1;\n  string name = 2;\n"));

    let ts = file(&report, "client/ts/src/rack/types.gen.ts");
    assert!(ts.contains("export const rackZ = z.object({\n"));
}
