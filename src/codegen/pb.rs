//! Protobuf Message Backend
//!
//! Emits one `{namespace}.proto` per `@pb output` path.
//!
//! Architecture:
//! - Messages carry the flattened unified fields, numbered from 1
//! - Aliases and distincts have no wire representation and are expanded at
//!   every use
//! - Enums live in the message file of their namespace unless they name an
//!   output of their own
//! - Nested arrays are wrapped in a synthesized `{Elem}List` message, once per
//!   file

use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::collector::Collector;
use super::directives;
use super::names::{escape_keyword, to_pascal_case, to_screaming_snake, to_snake_case, Language};
use super::resolver::{
    Context, Import, ImportAdder, ImportLocation, ImportResolver, Mapping, PrimitiveMapper, ResolvedImport,
    Resolver, TypeFormatter,
};
use super::{file_path, run_command, Plugin, Request, Response, GENERATED_HEADER};
use crate::config::PbConfig;
use crate::error::{CodegenError, Result};
use crate::resolution::{
    compute_cycles, substitute_type_ref, type_arg_map, unified_fields, CycleAnalysis, Field, Form, Table, Type,
    TypeParam, TypeRef,
};

const DOMAIN: &str = "pb";
const ANY_IMPORT: &str = "google/protobuf/any.proto";
const STRUCT_IMPORT: &str = "google/protobuf/struct.proto";

/// Alias chains longer than this are treated as unresolvable
const MAX_ALIAS_DEPTH: usize = 32;

pub struct PbPlugin {
    config: PbConfig,
}

impl PbPlugin {
    pub fn new(config: PbConfig) -> Self {
        Self { config }
    }
}

impl Plugin for PbPlugin {
    fn name(&self) -> &str {
        "pb/types"
    }

    fn domains(&self) -> &[&str] {
        &[DOMAIN]
    }

    #[tracing::instrument(skip_all, fields(plugin = "pb/types"))]
    fn generate(&self, request: &Request<'_>) -> Result<Response> {
        let table = request.table;
        let cycles = compute_cycles(table);
        let mut response = Response::default();

        let mut messages = Collector::new(DOMAIN).with_skip(|t| !t.is_struct());
        let mut enums = Collector::new(DOMAIN)
            .with_path_fn(|t| enum_home(table, t))
            .with_skip(|t| !t.is_enum());
        response.errors.extend(messages.add_all(table.declared()));
        response.errors.extend(enums.add_all(table.declared()));

        let generator = FileGenerator {
            table,
            cycles: &cycles,
            config: &self.config,
            repo_root: request.repo_root.as_deref(),
        };
        for path in messages.paths() {
            let structs = messages.get(&path).to_vec();
            let enum_types = enums.remove(&path);
            let name = file_name(table, &path);
            let rendered = generator.render(&path, &structs, &enum_types);
            response.record(self.name(), file_path(&path, &name), rendered);
        }
        for path in enums.paths() {
            let enum_types = enums.get(&path).to_vec();
            let name = file_name(table, &path);
            let rendered = generator.render(&path, &[], &enum_types);
            response.record(self.name(), file_path(&path, &name), rendered);
        }
        Ok(response)
    }

    fn post_write(&self, files: &[PathBuf], request: &Request<'_>) -> Result<()> {
        if !files.iter().any(|f| f.extension().map(|e| e == "proto").unwrap_or(false)) {
            return Ok(());
        }
        let root = request
            .repo_root
            .clone()
            .or_else(|| files.first().and_then(|f| find_repo_root(f)))
            .ok_or_else(|| CodegenError::PostWrite {
                command: self.config.format_command.clone(),
                reason: "could not locate repository root".to_string(),
            })?;
        run_command(&self.config.format_command, &["generate"], &[], Some(root.as_path()))
    }
}

/// Walk up from `start` to the first directory holding `.git`
fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start.ancestors().find(|dir| dir.join(".git").exists()).map(Path::to_path_buf)
}

/// `option go_package` for an output path: the module of the nearest
/// `go.mod` at or above it inside the repository, joined with the path below
/// that module. Without one the configured module prefix is used.
fn go_package(repo_root: Option<&Path>, path: &str, default_module: &str) -> String {
    repo_root
        .and_then(|root| go_import_path(root, path))
        .unwrap_or_else(|| format!("{}{}", default_module, path))
}

fn go_import_path(root: &Path, path: &str) -> Option<String> {
    let target = root.join(path);
    for dir in target.ancestors().take_while(|d| d.starts_with(root)) {
        let manifest = dir.join("go.mod");
        if !manifest.is_file() {
            continue;
        }
        let module = match fs::read_to_string(&manifest).ok().as_deref().and_then(module_name) {
            Some(module) => module,
            None => {
                warn!(path = %manifest.display(), "go.mod has no module directive");
                return None;
            }
        };
        debug!(module = %module, path, "resolved go module");
        let below: Vec<String> = target
            .strip_prefix(dir)
            .ok()?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if below.is_empty() {
            return Some(module);
        }
        return Some(format!("{}/{}", module, below.join("/")));
    }
    None
}

fn module_name(go_mod: &str) -> Option<String> {
    go_mod.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("module"), Some(name)) => Some(name.trim_matches('"').to_string()),
            _ => None,
        }
    })
}

// =============================================================================
// Files and packages
// =============================================================================

/// Output path of a type for this target. Enums without their own output
/// live with the first message of their namespace.
fn enum_home(table: &Table, typ: &Type) -> Option<String> {
    directives::output_path(typ, DOMAIN).or_else(|| {
        if !typ.is_enum() {
            return None;
        }
        table
            .structs_in_namespace(&typ.namespace)
            .into_iter()
            .filter(|s| !directives::is_omitted(s, DOMAIN))
            .find_map(|s| directives::output_path(s, DOMAIN))
    })
}

/// Namespace naming the file at `path`: its first message, else its first enum
fn file_namespace(table: &Table, path: &str) -> String {
    let at_path = |t: &&Type| !directives::is_omitted(t, DOMAIN) && enum_home(table, t).as_deref() == Some(path);
    table
        .declared()
        .filter(|t| t.is_struct())
        .find(at_path)
        .or_else(|| table.declared().filter(|t| t.is_enum()).find(at_path))
        .map(|t| t.namespace.clone())
        .unwrap_or_else(|| "types".to_string())
}

fn file_name(table: &Table, path: &str) -> String {
    format!("{}.proto", file_namespace(table, path))
}

/// Leading package segment for an output path
pub fn layer_prefix(output_path: &str) -> String {
    let parts: Vec<&str> = output_path.split('/').filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        ["core", "pkg", layer, ..] => layer.to_string(),
        [first, ..] => first.to_string(),
        [] => "synnax".to_string(),
    }
}

pub fn package_name(output_path: &str, namespace: &str) -> String {
    format!("{}.{}", layer_prefix(output_path), namespace)
}

// =============================================================================
// Syntax
// =============================================================================

struct PbSyntax;

impl TypeFormatter for PbSyntax {
    fn format_qualified(&self, qualifier: &str, type_name: &str) -> String {
        if qualifier.is_empty() {
            type_name.to_string()
        } else {
            format!("{}.{}", qualifier, type_name)
        }
    }

    // Messages have no type arguments; the args only contribute imports
    fn format_generic(&self, base: &str, _args: &[String]) -> String {
        base.to_string()
    }

    fn format_instantiation(&self, base: &str, _params: &[&TypeParam], _args: &[String]) -> String {
        base.to_string()
    }

    // Repetition is a field label, applied by the message builder
    fn format_array(&self, elem: &str) -> String {
        elem.to_string()
    }

    fn format_fixed_array(&self, elem: &str, _size: u64) -> String {
        elem.to_string()
    }

    fn format_map(&self, key: &str, value: &str) -> String {
        format!("map<{}, {}>", key, value)
    }

    fn fallback_type(&self) -> String {
        "bytes".to_string()
    }

    fn format_type_param(&self, _param: &TypeParam, imports: &mut dyn ImportAdder) -> String {
        imports.add_import(Import::new("google", ANY_IMPORT));
        "google.protobuf.Any".to_string()
    }

    fn expands_aliases(&self) -> bool {
        true
    }
}

impl PrimitiveMapper for PbSyntax {
    fn map_primitive(&self, name: &str) -> Mapping {
        match name {
            "uuid" | "string" => Mapping::plain("string"),
            "bool" => Mapping::plain("bool"),
            "int8" | "int16" | "int32" => Mapping::plain("int32"),
            "int64" | "timestamp" | "timespan" => Mapping::plain("int64"),
            "uint8" | "uint12" | "uint16" | "uint20" | "uint32" => Mapping::plain("uint32"),
            "uint64" => Mapping::plain("uint64"),
            "float32" => Mapping::plain("float"),
            "float64" => Mapping::plain("double"),
            "json" => Mapping::plain("google.protobuf.Struct").with_import(Import::new("google", STRUCT_IMPORT)),
            "any" => Mapping::plain("google.protobuf.Any").with_import(Import::new("google", ANY_IMPORT)),
            _ => Mapping::plain("bytes"),
        }
    }
}

impl ImportResolver for PbSyntax {
    fn resolve_import(&self, location: ImportLocation<'_>, target: &Type, ctx: &Context<'_>) -> ResolvedImport {
        match location {
            ImportLocation::Generated(path) => {
                let namespace = file_namespace(ctx.table, path);
                ResolvedImport {
                    import: Import::new("internal", &file_path(path, &format!("{}.proto", namespace))),
                    qualifier: package_name(path, &namespace),
                }
            }
            ImportLocation::Handwritten(include) => ResolvedImport {
                import: Import::new("internal", include),
                qualifier: directives::namespace_override(target, DOMAIN)
                    .unwrap_or_else(|| package_name(include, &target.namespace)),
            },
        }
    }

    fn output_path(&self, typ: &Type, ctx: &Context<'_>) -> Option<String> {
        enum_home(ctx.table, typ)
    }
}

/// Sorted, deduplicated import paths
#[derive(Debug, Default)]
struct ProtoImports(BTreeSet<String>);

impl ImportAdder for ProtoImports {
    fn add_import(&mut self, import: Import) {
        self.0.insert(import.path);
    }
}

// =============================================================================
// Declarations
// =============================================================================

struct EnumDecl {
    name: String,
    doc: Option<String>,
    values: Vec<String>,
}

struct FieldDecl {
    label: &'static str,
    proto_type: String,
    name: String,
    number: usize,
    doc: Option<String>,
}

struct MessageDecl {
    name: String,
    doc: Option<String>,
    fields: Vec<FieldDecl>,
}

#[derive(Default)]
struct FileDecl {
    package: String,
    go_package: String,
    imports: ProtoImports,
    enums: Vec<EnumDecl>,
    messages: Vec<MessageDecl>,
    /// Synthesized list wrapper name -> element type
    lists: IndexMap<String, String>,
}

struct FileGenerator<'a> {
    table: &'a Table,
    cycles: &'a CycleAnalysis,
    config: &'a PbConfig,
    repo_root: Option<&'a Path>,
}

impl<'a> FileGenerator<'a> {
    fn render(&self, path: &str, structs: &[&'a Type], enums: &[&'a Type]) -> Result<String> {
        let file = self.build(path, structs, enums)?;
        Ok(render_file(&file))
    }

    fn build(&self, path: &str, structs: &[&'a Type], enums: &[&'a Type]) -> Result<FileDecl> {
        let namespace = file_namespace(self.table, path);
        let mut file = FileDecl {
            package: package_name(path, &namespace),
            go_package: go_package(self.repo_root, path, &self.config.default_go_module),
            ..Default::default()
        };

        for typ in structs {
            self.cycles.check(typ)?;
        }

        for typ in enums {
            file.enums.push(enum_decl(typ));
        }

        let ctx = Context::new(self.table, path, &namespace, DOMAIN);
        let syntax = PbSyntax;
        let builder = MessageBuilder { table: self.table, resolver: Resolver::for_backend(&syntax), ctx: &ctx };
        for typ in self.table.topological_sort(structs) {
            debug!(type_name = %typ.qualified_name, "rendering");
            let message = builder.message_decl(typ, &mut file)?;
            file.messages.push(message);
            for import in directives::custom_imports(typ, DOMAIN) {
                file.imports.0.insert(import);
            }
        }
        Ok(file)
    }
}

fn enum_decl(typ: &Type) -> EnumDecl {
    let name = directives::type_name(typ, DOMAIN);
    let prefix = to_screaming_snake(&name);
    let mut values = vec![format!("{}_UNSPECIFIED = 0;", prefix)];
    if let Some(form) = typ.as_enum() {
        for (i, value) in form.values.iter().enumerate() {
            values.push(format!("{}_{} = {};", prefix, to_screaming_snake(&value.name), i + 1));
        }
    }
    EnumDecl { name, doc: directives::doc(typ), values }
}

struct MessageBuilder<'r, 'a> {
    table: &'a Table,
    resolver: Resolver<'r>,
    ctx: &'r Context<'a>,
}

impl<'r, 'a> MessageBuilder<'r, 'a> {
    fn message_decl(&self, typ: &Type, file: &mut FileDecl) -> Result<MessageDecl> {
        let fields = unified_fields(typ, self.table)
            .iter()
            .filter(|f| !directives::is_field_omitted(f, DOMAIN))
            .enumerate()
            .map(|(i, f)| self.field_decl(f, i + 1, file))
            .collect::<Result<Vec<_>>>()?;
        Ok(MessageDecl { name: directives::type_name(typ, DOMAIN), doc: directives::doc(typ), fields })
    }

    fn field_decl(&self, field: &Field, number: usize, file: &mut FileDecl) -> Result<FieldDecl> {
        let name = directives::field_name(field, DOMAIN)
            .unwrap_or_else(|| escape_keyword(Language::Protobuf, &to_snake_case(&field.name)));
        let doc = directives::field_doc(field);

        if let Some(proto_type) = directives::field_type_override(field, DOMAIN) {
            return Ok(FieldDecl { label: "", proto_type, name, number, doc });
        }

        let type_ref = self.underlying(&field.type_ref);
        let (label, proto_type) = match type_ref.is_array().then(|| type_ref.type_args.first()) {
            Some(Some(elem)) => {
                let elem = self.underlying(elem);
                if type_ref.array_size.is_some() && self.is_primitive(&elem, "uint8") {
                    ("", "bytes".to_string())
                } else if elem.is_array() {
                    let inner = match elem.type_args.first() {
                        Some(inner) => self.resolve(inner, &mut file.imports)?,
                        None => "bytes".to_string(),
                    };
                    ("repeated ", list_wrapper(&inner, &mut file.lists))
                } else {
                    ("repeated ", self.resolve(&elem, &mut file.imports)?)
                }
            }
            Some(None) => ("repeated ", "bytes".to_string()),
            None if field.is_hard_optional && !type_ref.is_map() => ("optional ", self.resolve(&type_ref, &mut file.imports)?),
            None => ("", self.resolve(&type_ref, &mut file.imports)?),
        };
        Ok(FieldDecl { label, proto_type, name, number, doc })
    }

    fn resolve(&self, type_ref: &TypeRef, imports: &mut ProtoImports) -> Result<String> {
        self.resolver.resolve_type_ref(type_ref, self.ctx, imports)
    }

    /// Strip aliases, distincts and defaulted params down to the reference
    /// whose shape decides the field label
    fn underlying(&self, type_ref: &TypeRef) -> TypeRef {
        let mut current = type_ref.clone();
        for _ in 0..MAX_ALIAS_DEPTH {
            if let Some(default) = current.type_param.as_ref().and_then(|p| p.default.clone()) {
                current = default;
                continue;
            }
            let next = match self.table.resolve_ref(&current, &self.ctx.namespace).map(|t| &t.form) {
                Some(Form::Alias(alias)) => {
                    substitute_type_ref(&alias.target, &type_arg_map(&alias.type_params, &current.type_args))
                }
                Some(Form::Distinct(distinct)) => distinct.base.clone(),
                _ => return current,
            };
            current = next;
        }
        current
    }

    fn is_primitive(&self, type_ref: &TypeRef, name: &str) -> bool {
        matches!(
            self.table.resolve_ref(type_ref, &self.ctx.namespace).map(|t| &t.form),
            Some(Form::Primitive { name: n }) if n == name
        )
    }
}

/// Name of the wrapper message holding one row of a nested array
fn list_wrapper(elem: &str, lists: &mut IndexMap<String, String>) -> String {
    let base = elem.rsplit('.').next().unwrap_or(elem);
    let name = format!("{}List", to_pascal_case(base));
    lists.entry(name.clone()).or_insert_with(|| elem.to_string());
    name
}

// =============================================================================
// Rendering
// =============================================================================

fn render_doc(out: &mut String, doc: &Option<String>, indent: &str) {
    if let Some(doc) = doc {
        for line in doc.lines() {
            out.push_str(&format!("{}// {}\n", indent, line.trim_end()));
        }
    }
}

fn render_file(file: &FileDecl) -> String {
    let mut out = String::new();
    out.push_str(GENERATED_HEADER);
    out.push_str("\n\nsyntax = \"proto3\";\n\n");
    out.push_str(&format!("package {};\n\n", file.package));
    out.push_str(&format!("option go_package = \"{}\";\n", file.go_package));

    if !file.imports.0.is_empty() {
        out.push('\n');
        for import in &file.imports.0 {
            out.push_str(&format!("import \"{}\";\n", import));
        }
    }

    for decl in &file.enums {
        out.push('\n');
        render_doc(&mut out, &decl.doc, "");
        out.push_str(&format!("enum {} {{\n", decl.name));
        for value in &decl.values {
            out.push_str(&format!("  {}\n", value));
        }
        out.push_str("}\n");
    }

    for decl in &file.messages {
        out.push('\n');
        render_doc(&mut out, &decl.doc, "");
        out.push_str(&format!("message {} {{\n", decl.name));
        for field in &decl.fields {
            render_doc(&mut out, &field.doc, "  ");
            out.push_str(&format!(
                "  {}{} {} = {};\n",
                field.label, field.proto_type, field.name, field.number
            ));
        }
        out.push_str("}\n");
    }

    for (name, elem) in &file.lists {
        out.push_str(&format!("\nmessage {} {{\n  repeated {} values = 1;\n}}\n", name, elem));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::{AliasForm, DistinctForm, Domain, EnumForm, EnumValue, Expression, ExpressionValue, StructForm};

    fn pb_output(path: &str) -> Domain {
        Domain::new("pb").with(Expression::new("output").with_value(ExpressionValue::String(path.into())))
    }

    fn add_struct(table: &mut Table, ns: &str, name: &str, form: StructForm, path: &str) {
        table.add(Type::new(ns, name, Form::Struct(form)).with_domain(pb_output(path))).unwrap();
    }

    fn fields(fields: Vec<Field>) -> StructForm {
        StructForm { fields, ..Default::default() }
    }

    fn generate(table: &Table) -> Response {
        PbPlugin::new(PbConfig::default()).generate(&Request::new(table)).unwrap()
    }

    fn content<'r>(response: &'r Response, path: &str) -> &'r str {
        match response.file(path) {
            Some(file) => &file.content,
            None => panic!("missing {} (errors: {:?})", path, response.errors),
        }
    }

    #[test]
    fn test_layer_prefix() {
        assert_eq!(layer_prefix("core/pkg/api/grpc/v1"), "api");
        assert_eq!(layer_prefix("core/pkg/distribution/rack/pb"), "distribution");
        assert_eq!(layer_prefix("x/go/status/pb"), "x");
        assert_eq!(layer_prefix(""), "synnax");
        assert_eq!(package_name("core/pkg/service/rack/pb", "rack"), "service.rack");
    }

    #[test]
    fn test_go_package_from_nearest_go_mod() {
        let dir = tempfile::tempdir().unwrap();
        let module_root = dir.path().join("client/go");
        fs::create_dir_all(&module_root).unwrap();
        fs::write(module_root.join("go.mod"), "module github.com/example/client\n\ngo 1.22\n").unwrap();

        let root = Some(dir.path());
        assert_eq!(go_package(root, "client/go/rack/pb", "fallback/"), "github.com/example/client/rack/pb");
        assert_eq!(go_package(root, "client/go", "fallback/"), "github.com/example/client");
        assert_eq!(go_package(root, "core/pkg/rack/pb", "fallback/"), "fallback/core/pkg/rack/pb");
        assert_eq!(go_package(None, "client/go/rack/pb", "fallback/"), "fallback/client/go/rack/pb");
        assert_eq!(module_name("// comment\nmodule \"example.com/quoted\"\n"), Some("example.com/quoted".into()));
        assert_eq!(module_name("go 1.22\n"), None);
    }

    #[test]
    fn test_generated_go_package_uses_repo_go_mod() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("x/go")).unwrap();
        fs::write(dir.path().join("x/go/go.mod"), "module github.com/synnaxlabs/x\n").unwrap();

        let mut table = Table::new();
        add_struct(
            &mut table,
            "status",
            "Status",
            fields(vec![Field::new("key", TypeRef::named("string"))]),
            "x/go/status/pb",
        );
        let request = Request::new(&table).with_repo_root(dir.path());
        let response = PbPlugin::new(PbConfig::default()).generate(&request).unwrap();
        let out = content(&response, "x/go/status/pb/status.proto");
        assert!(out.contains("option go_package = \"github.com/synnaxlabs/x/status/pb\";"));
    }

    #[test]
    fn test_simple_message() {
        let mut table = Table::new();
        add_struct(
            &mut table,
            "rack",
            "Rack",
            fields(vec![
                Field::new("key", TypeRef::named("uint32")),
                Field::new("name", TypeRef::named("string")),
                Field::new("taskCounter", TypeRef::named("uint64")),
                Field::new("tags", TypeRef::array(TypeRef::named("string"))),
                Field::new("location", TypeRef::named("string")).hard_optional(),
                Field::new("note", TypeRef::named("string")).optional(),
            ]),
            "core/pkg/service/rack/pb",
        );
        let response = generate(&table);
        assert!(response.is_ok());
        let out = content(&response, "core/pkg/service/rack/pb/rack.proto");
        assert!(out.starts_with(GENERATED_HEADER));
        assert!(out.contains("syntax = \"proto3\";\n\npackage service.rack;\n"));
        assert!(out.contains("option go_package = \"github.com/synnaxlabs/synnax/core/pkg/service/rack/pb\";"));
        assert!(out.contains(
            "message Rack {\n  uint32 key = 1;\n  string name = 2;\n  uint64 task_counter = 3;\n  \
             repeated string tags = 4;\n  optional string location = 5;\n  string note = 6;\n}\n"
        ));
        assert!(!out.contains("import"));
    }

    #[test]
    fn test_enums_live_with_namespace_messages() {
        let mut table = Table::new();
        table
            .add(Type::new("channel", "Mode", Form::Enum(EnumForm {
                values: vec![EnumValue::string("read", "read"), EnumValue::string("writeOnly", "write_only")],
                is_int_enum: false,
            })))
            .unwrap();
        add_struct(
            &mut table,
            "channel",
            "Channel",
            fields(vec![Field::new("mode", TypeRef::named("Mode"))]),
            "core/pkg/distribution/channel/pb",
        );
        let response = generate(&table);
        assert_eq!(response.files.len(), 1);
        let out = content(&response, "core/pkg/distribution/channel/pb/channel.proto");
        assert!(out.contains("enum Mode {\n  MODE_UNSPECIFIED = 0;\n  MODE_READ = 1;\n  MODE_WRITE_ONLY = 2;\n}\n"));
        assert!(out.contains("  Mode mode = 1;"));
        assert!(out.find("enum Mode").unwrap() < out.find("message Channel").unwrap());
    }

    #[test]
    fn test_inheritance_is_flattened() {
        let mut table = Table::new();
        add_struct(&mut table, "t", "A", fields(vec![Field::new("x", TypeRef::named("string"))]), "out/pb");
        add_struct(&mut table, "t", "B", fields(vec![Field::new("y", TypeRef::named("int32"))]), "out/pb");
        add_struct(
            &mut table,
            "t",
            "C",
            StructForm {
                fields: vec![Field::new("z", TypeRef::named("bool"))],
                extends: vec![TypeRef::named("A"), TypeRef::named("B")],
                ..Default::default()
            },
            "out/pb",
        );
        let response = generate(&table);
        let out = content(&response, "out/pb/t.proto");
        assert!(out.contains("message C {\n  string x = 1;\n  int32 y = 2;\n  bool z = 3;\n}\n"));
    }

    #[test]
    fn test_nested_arrays_and_bytes() {
        let mut table = Table::new();
        add_struct(
            &mut table,
            "series",
            "Frame",
            fields(vec![
                Field::new("rows", TypeRef::array(TypeRef::array(TypeRef::named("float64")))),
                Field::new("cols", TypeRef::array(TypeRef::array(TypeRef::named("float64")))),
                Field::new("digest", TypeRef::fixed_array(TypeRef::named("uint8"), 32)),
                Field::new("shape", TypeRef::fixed_array(TypeRef::named("int32"), 3)),
            ]),
            "x/go/series/pb",
        );
        let response = generate(&table);
        let out = content(&response, "x/go/series/pb/series.proto");
        assert!(out.contains("  repeated DoubleList rows = 1;"));
        assert!(out.contains("  repeated DoubleList cols = 2;"));
        assert!(out.contains("  bytes digest = 3;"));
        assert!(out.contains("  repeated int32 shape = 4;"));
        assert_eq!(out.matches("message DoubleList {\n  repeated double values = 1;\n}").count(), 1);
    }

    #[test]
    fn test_aliases_and_distincts_expand() {
        let mut table = Table::new();
        table
            .add(
                Type::new("task", "Tags", Form::Distinct(DistinctForm {
                    base: TypeRef::array(TypeRef::named("string")),
                    type_params: vec![],
                }))
                .with_domain(pb_output("core/pkg/service/task/pb")),
            )
            .unwrap();
        table
            .add(Type::new("task", "Key", Form::Alias(AliasForm { target: TypeRef::named("uint64"), type_params: vec![] })))
            .unwrap();
        add_struct(
            &mut table,
            "task",
            "Task",
            fields(vec![
                Field::new("key", TypeRef::named("Key")),
                Field::new("tags", TypeRef::named("Tags")),
            ]),
            "core/pkg/service/task/pb",
        );
        let response = generate(&table);
        let out = content(&response, "core/pkg/service/task/pb/task.proto");
        assert!(out.contains("  uint64 key = 1;\n  repeated string tags = 2;"));
        assert!(!out.contains("message Tags"));
        assert!(!out.contains("message Key"));
    }

    #[test]
    fn test_type_params_and_json() {
        let mut table = Table::new();
        let mut details = TypeParam::new("D");
        details.default = Some(TypeRef::named("json"));
        add_struct(
            &mut table,
            "status",
            "Status",
            StructForm {
                fields: vec![
                    Field::new("data", TypeRef::param(TypeParam::new("T"))),
                    Field::new("details", TypeRef::param(details.clone())),
                    Field::new("labels", TypeRef::map(TypeRef::named("string"), TypeRef::named("string"))),
                ],
                type_params: vec![TypeParam::new("T"), details],
                ..Default::default()
            },
            "x/go/status/pb",
        );
        let response = generate(&table);
        let out = content(&response, "x/go/status/pb/status.proto");
        assert!(out.contains("import \"google/protobuf/any.proto\";\nimport \"google/protobuf/struct.proto\";"));
        assert!(out.contains("  google.protobuf.Any data = 1;"));
        assert!(out.contains("  google.protobuf.Struct details = 2;"));
        assert!(out.contains("  map<string, string> labels = 3;"));
    }

    #[test]
    fn test_cross_namespace_reference() {
        let mut table = Table::new();
        table
            .add(Type::new("label", "Color", Form::Enum(EnumForm {
                values: vec![EnumValue::int("red", 0)],
                is_int_enum: true,
            })))
            .unwrap();
        add_struct(
            &mut table,
            "label",
            "Label",
            fields(vec![Field::new("color", TypeRef::named("Color"))]),
            "core/pkg/service/label/pb",
        );
        add_struct(
            &mut table,
            "ranger",
            "Range",
            fields(vec![
                Field::new("labels", TypeRef::array(TypeRef::named("label.Label"))),
                Field::new("color", TypeRef::named("label.Color")),
            ]),
            "core/pkg/service/ranger/pb",
        );
        let response = generate(&table);
        assert!(response.is_ok(), "{:?}", response.errors);
        let out = content(&response, "core/pkg/service/ranger/pb/ranger.proto");
        assert!(out.contains("import \"core/pkg/service/label/pb/label.proto\";"));
        assert_eq!(out.matches("import ").count(), 1);
        assert!(out.contains("  repeated service.label.Label labels = 1;"));
        assert!(out.contains("  service.label.Color color = 2;"));
    }

    #[test]
    fn test_unreachable_namespace_is_reported() {
        let mut table = Table::new();
        table.add(Type::new("other", "Hidden", Form::Struct(StructForm::default()))).unwrap();
        add_struct(
            &mut table,
            "svc",
            "Thing",
            fields(vec![Field::new("hidden", TypeRef::named("other.Hidden"))]),
            "out/pb",
        );
        let response = generate(&table);
        assert!(response.files.is_empty());
        match response.errors.first() {
            Some(CodegenError::Generation { .. }) => {}
            other => panic!("Expected Generation error, got {:?}", other),
        }
    }

    #[test]
    fn test_omitted_fields_and_overrides() {
        let mut table = Table::new();
        add_struct(
            &mut table,
            "svc",
            "Thing",
            fields(vec![
                Field::new("secret", TypeRef::named("string"))
                    .with_domain(Domain::new("pb").with(Expression::new("omit"))),
                Field::new("package", TypeRef::named("string")),
                Field::new("raw", TypeRef::named("json")).with_domain(
                    Domain::new("pb").with(Expression::new("type").with_value(ExpressionValue::String("bytes".into()))),
                ),
            ]),
            "out/pb",
        );
        let response = generate(&table);
        let out = content(&response, "out/pb/svc.proto");
        assert!(!out.contains("secret"));
        assert!(out.contains("  string package_ = 1;\n  bytes raw = 2;"));
    }
}
