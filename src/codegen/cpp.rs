//! C++ Value-Type Backend
//!
//! Emits one `types.gen.h` per `@cpp output` path.
//!
//! Architecture:
//! - Structs own their file; aliases, distincts and enums sharing the path are
//!   pulled into it, and paths holding only those are generated afterwards
//! - Every file predeclares its structs so indirect self and forward fields
//!   compile regardless of body order
//! - Native multiple inheritance only when nothing collides; otherwise the
//!   unified fields are flattened onto the child
//! - Rendering works on `StructDecl`/`EnumDecl`/`TypedefDecl` values that
//!   already carry every ordering and naming decision

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use tracing::debug;

use super::collector::{local_enums, Collector};
use super::directives;
use super::names::{escape_keyword, to_pascal_case, to_snake_case, Language};
use super::resolver::{
    Container, Context, Import, ImportAdder, ImportLocation, ImportResolver, Mapping, PrimitiveMapper,
    ResolvedImport, Resolver, TypeFormatter,
};
use super::{file_path, run_command, Plugin, Request, Response, GENERATED_HEADER};
use crate::config::CppConfig;
use crate::error::{CodegenError, Result};
use crate::resolution::{
    compute_cycles, slot_params, substitute_type_ref, type_arg_map, unified_fields, CycleAnalysis, Field, Form,
    StructForm, Table, Type, TypeParam, TypeRef,
};

const DOMAIN: &str = "cpp";
const INDIRECT_HEADER: &str = "x/cpp/mem/indirect.h";
const JSON_HEADER: &str = "x/cpp/json/json.h";

/// Alias chains longer than this are treated as plain values
const MAX_ALIAS_DEPTH: usize = 32;

const WRAPPER_USINGS: &[&str] = &[
    "begin", "end", "size", "empty", "push_back", "emplace_back", "reserve", "clear", "operator[]", "at",
];

pub struct CppPlugin {
    config: CppConfig,
}

impl CppPlugin {
    pub fn new(config: CppConfig) -> Self {
        Self { config }
    }
}

impl Plugin for CppPlugin {
    fn name(&self) -> &str {
        "cpp/types"
    }

    fn domains(&self) -> &[&str] {
        &[DOMAIN]
    }

    #[tracing::instrument(skip_all, fields(plugin = "cpp/types"))]
    fn generate(&self, request: &Request<'_>) -> Result<Response> {
        let (files, errors) = declare_all(request.table);
        let mut response = Response { errors, ..Default::default() };
        for (dir, file) in files {
            let rendered = file.map(|f| render_file(&f));
            response.record(self.name(), file_path(&dir, &self.config.file_name_pattern), rendered);
        }
        Ok(response)
    }

    fn post_write(&self, files: &[PathBuf], _request: &Request<'_>) -> Result<()> {
        format_headers(&self.config.format_command, files)
    }
}

/// Runs the formatter in place over the C++ sources among `files`
pub(super) fn format_headers(command: &str, files: &[PathBuf]) -> Result<()> {
    let headers: Vec<PathBuf> = files
        .iter()
        .filter(|f| f.extension().map(|e| e == "h" || e == "hpp" || e == "cpp" || e == "cc").unwrap_or(false))
        .cloned()
        .collect();
    if headers.is_empty() {
        return Ok(());
    }
    run_command(command, &["-i"], &headers, None)
}

/// Declarations of every header, by output directory, plus the errors hit
/// while grouping types. Struct paths come first, then paths holding only
/// typedefs, then enum-only paths.
pub(super) fn declare_all(table: &Table) -> (Vec<(String, Result<FileDecl>)>, Vec<CodegenError>) {
    let cycles = compute_cycles(table);
    let mut errors = Vec::new();

    let mut structs = Collector::new(DOMAIN).with_skip(|t| !t.is_struct());
    let mut typedefs = Collector::new(DOMAIN).with_skip(|t| !(t.is_alias() || t.is_distinct()));
    let mut enums = Collector::new(DOMAIN).with_skip(|t| !t.is_enum());
    for collector in [&mut structs, &mut typedefs, &mut enums] {
        errors.extend(collector.add_all(table.declared()));
    }

    let generator = FileGenerator { table, cycles: &cycles };
    let mut files = Vec::new();
    for path in structs.paths() {
        let struct_types = structs.get(&path).to_vec();
        let typedef_types = typedefs.remove(&path);
        let enum_types = file_enums(table, &path, &struct_types, &typedef_types, enums.remove(&path));
        let file = generator.build(&path, &struct_types, &typedef_types, &enum_types);
        files.push((path, file));
    }
    for path in typedefs.paths() {
        let typedef_types = typedefs.get(&path).to_vec();
        let enum_types = file_enums(table, &path, &[], &typedef_types, enums.remove(&path));
        let file = generator.build(&path, &[], &typedef_types, &enum_types);
        files.push((path, file));
    }
    for path in enums.paths() {
        let enum_types = enums.get(&path).to_vec();
        let file = generator.build(&path, &[], &[], &enum_types);
        files.push((path, file));
    }
    (files, errors)
}

fn file_enums<'a>(
    table: &'a Table,
    path: &str,
    structs: &[&'a Type],
    typedefs: &[&'a Type],
    standalone: Vec<&'a Type>,
) -> Vec<&'a Type> {
    let owners: Vec<&Type> = structs.iter().chain(typedefs).copied().collect();
    local_enums(table, DOMAIN, path, &owners, standalone)
}

/// Derive the C++ namespace from an output path
pub fn derive_namespace(output_path: &str) -> String {
    let parts: Vec<&str> = output_path.split('/').filter(|p| !p.is_empty()).collect();
    let rest = |from: usize| parts[from..].join("::");
    match parts.as_slice() {
        ["arc", "cpp", _, ..] => format!("arc::{}", rest(2)),
        ["x", "cpp", _, ..] => format!("x::{}", rest(2)),
        ["client", "cpp", _, ..] => format!("synnax::{}", rest(2)),
        ["driver", _, ..] => format!("driver::{}", rest(1)),
        [.., last] => format!("synnax::{}", last),
        [] => "synnax".to_string(),
    }
}

fn cpp_namespace(typ: &Type, output_path: &str) -> String {
    directives::namespace_override(typ, DOMAIN).unwrap_or_else(|| derive_namespace(output_path))
}

// =============================================================================
// Type Syntax
// =============================================================================

struct CppSyntax;

impl TypeFormatter for CppSyntax {
    fn format_qualified(&self, qualifier: &str, type_name: &str) -> String {
        if qualifier.is_empty() {
            type_name.to_string()
        } else {
            format!("::{}::{}", qualifier, type_name)
        }
    }

    fn format_generic(&self, base: &str, args: &[String]) -> String {
        format!("{}<{}>", base, args.join(", "))
    }

    fn format_instantiation(&self, base: &str, params: &[&TypeParam], args: &[String]) -> String {
        if args.is_empty() && !params.is_empty() {
            return format!("{}<>", base);
        }
        if args.is_empty() {
            base.to_string()
        } else {
            self.format_generic(base, args)
        }
    }

    fn format_array(&self, elem: &str) -> String {
        format!("std::vector<{}>", elem)
    }

    fn format_fixed_array(&self, elem: &str, size: u64) -> String {
        format!("std::array<{}, {}>", elem, size)
    }

    fn format_map(&self, key: &str, value: &str) -> String {
        format!("std::unordered_map<{}, {}>", key, value)
    }

    fn fallback_type(&self) -> String {
        "void".to_string()
    }

    fn container_import(&self, container: Container) -> Option<Import> {
        let header = match container {
            Container::Array => "vector",
            Container::FixedArray => "array",
            Container::Map => "unordered_map",
        };
        Some(Import::new("system", header))
    }
}

impl PrimitiveMapper for CppSyntax {
    fn map_primitive(&self, name: &str) -> Mapping {
        let system = |header: &str| Import::new("system", header);
        let internal = |header: &str| Import::new("internal", header);
        match name {
            "string" | "uuid" => Mapping::plain("std::string").with_import(system("string")),
            "int8" | "int16" | "int32" | "int64" | "uint8" | "uint16" | "uint32" | "uint64" => {
                Mapping::plain(&format!("std::{}_t", name)).with_import(system("cstdint"))
            }
            "uint12" => Mapping::plain("std::uint16_t").with_import(system("cstdint")),
            "uint20" => Mapping::plain("std::uint32_t").with_import(system("cstdint")),
            "float32" => Mapping::plain("float"),
            "float64" => Mapping::plain("double"),
            "bool" => Mapping::plain("bool"),
            "timestamp" => Mapping::plain("telem::TimeStamp").with_import(internal("x/cpp/telem/telem.h")),
            "timespan" => Mapping::plain("telem::TimeSpan").with_import(internal("x/cpp/telem/telem.h")),
            "json" => Mapping::plain("x::json::json").with_import(internal(JSON_HEADER)),
            "bytes" => Mapping::plain("std::vector<std::uint8_t>")
                .with_import(system("vector"))
                .with_import(system("cstdint")),
            "any" => Mapping::plain("std::any").with_import(system("any")),
            _ => Mapping::plain("void"),
        }
    }
}

impl ImportResolver for CppSyntax {
    fn resolve_import(&self, location: ImportLocation<'_>, target: &Type, _ctx: &Context<'_>) -> ResolvedImport {
        match location {
            ImportLocation::Generated(path) => ResolvedImport {
                import: Import::new("internal", &format!("{}/types.gen.h", path)),
                qualifier: cpp_namespace(target, path),
            },
            ImportLocation::Handwritten(include) => ResolvedImport {
                import: Import::new("internal", include),
                qualifier: directives::namespace_override(target, DOMAIN)
                    .unwrap_or_else(|| target.namespace.replace('.', "::")),
            },
        }
    }
}

/// Sorted `<system>` and `"internal"` includes of one header
#[derive(Debug, Default)]
pub(super) struct Includes {
    pub system: BTreeSet<String>,
    pub internal: BTreeSet<String>,
}

impl Includes {
    pub fn system(&mut self, header: &str) {
        self.system.insert(header.to_string());
    }

    pub fn internal(&mut self, header: &str) {
        self.internal.insert(header.to_string());
    }
}

impl ImportAdder for Includes {
    fn add_import(&mut self, import: Import) {
        if import.category == "system" {
            self.system.insert(import.path);
        } else {
            self.internal.insert(import.path);
        }
    }
}

// =============================================================================
// Declarations
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub(super) struct TemplateParam {
    pub name: String,
    pub default: Option<String>,
    /// Enum the argument must be
    pub enum_constraint: Option<String>,
}

/// How a field holds its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Storage {
    Value,
    /// `std::optional<T>`
    Optional,
    /// `x::mem::indirect<T>`, for references to structs declared later
    Indirect,
}

/// What a value needs to cross the JSON boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum ValueKind {
    /// Assigned to and read from JSON as is
    Plain,
    /// Telemetry time, serialized as nanoseconds
    Time,
    /// Has its own `parse` / `to_json`
    Object,
    ObjectArray,
    /// Unconstrained template parameter
    Param(String),
    ParamArray(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct FieldDecl {
    pub name: String,
    /// JSON key
    pub key: String,
    pub cpp_type: String,
    /// `cpp_type` without its optional or indirect wrapper
    pub value_type: String,
    pub storage: Storage,
    pub kind: ValueKind,
    /// `?` fields fall back to a default when the key is absent
    pub soft_optional: bool,
    pub default: Option<String>,
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct StructDecl {
    pub name: String,
    pub doc: Option<String>,
    pub template: Vec<TemplateParam>,
    /// Publicly inherited parents, qualified as seen from this header
    pub bases: Vec<String>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<String>,
}

impl StructDecl {
    /// `Name` or `Name<T, U>` for out-of-class definitions
    pub fn self_type(&self) -> String {
        if self.template.is_empty() {
            return self.name.clone();
        }
        let params: Vec<&str> = self.template.iter().map(|p| p.name.as_str()).collect();
        format!("{}<{}>", self.name, params.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum TypedefDecl {
    Using {
        name: String,
        doc: Option<String>,
        template: Vec<TemplateParam>,
        target: String,
    },
    /// Nominal wrapper privately inheriting from `std::vector<elem>`
    ArrayWrapper {
        name: String,
        doc: Option<String>,
        elem: String,
        elem_kind: ValueKind,
        methods: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct EnumDecl {
    pub name: String,
    pub doc: Option<String>,
    /// (PascalCase name, int value, string value)
    pub values: Vec<(String, i64, String)>,
    pub is_int: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Decl {
    Struct(StructDecl),
    Typedef(TypedefDecl),
}

impl Decl {
    /// Whether the declaration carries `parse` / `to_json`
    pub fn has_json(&self) -> bool {
        matches!(self, Decl::Struct(_) | Decl::Typedef(TypedefDecl::ArrayWrapper { .. }))
    }
}

/// Everything decided about one header before rendering
#[derive(Debug, Default)]
pub(super) struct FileDecl {
    pub namespace: String,
    pub includes: Includes,
    pub forward: Vec<String>,
    pub enums: Vec<EnumDecl>,
    pub decls: Vec<Decl>,
}

struct FileGenerator<'a> {
    table: &'a Table,
    cycles: &'a CycleAnalysis,
}

impl<'a> FileGenerator<'a> {
    fn build(&self, path: &str, structs: &[&'a Type], typedefs: &[&'a Type], enums: &[&'a Type]) -> Result<FileDecl> {
        let first = structs.iter().chain(typedefs).chain(enums).next();
        let namespace = first.map(|t| t.namespace.clone()).unwrap_or_default();
        let mut file = FileDecl {
            namespace: first.map(|t| cpp_namespace(t, path)).unwrap_or_else(|| derive_namespace(path)),
            ..Default::default()
        };

        for typ in structs {
            self.cycles.check(typ)?;
        }

        let mut members: Vec<&Type> = typedefs.to_vec();
        members.extend_from_slice(structs);
        let ordered = self.emission_order(&members);
        let order: Vec<&str> = ordered.iter().map(|t| t.qualified_name.as_str()).collect();

        let ctx = Context::new(self.table, path, &namespace, DOMAIN);
        let syntax = CppSyntax;
        let resolver = Resolver::for_backend(&syntax);

        for typ in enums {
            file.enums.push(enum_decl(typ, &mut file.includes));
        }

        for (position, typ) in ordered.iter().copied().enumerate() {
            debug!(type_name = %typ.qualified_name, "rendering");
            let scope = Scope { resolver: &resolver, ctx: &ctx, order: &order, position, owner: typ };
            match &typ.form {
                Form::Struct(form) => {
                    file.forward.push(forward_decl(typ, form));
                    let decl = scope.struct_decl(form, &mut file.includes)?;
                    file.decls.push(Decl::Struct(decl));
                }
                Form::Distinct(distinct) if distinct.base.is_array() && distinct.base.array_size.is_none() => {
                    file.forward.push(format!("struct {};", directives::type_name(typ, DOMAIN)));
                    let decl = scope.wrapper_decl(&distinct.base, &mut file.includes)?;
                    file.decls.push(Decl::Typedef(decl));
                }
                Form::Alias(alias) => {
                    let decl = scope.using_decl(&alias.target, &alias.type_params, &mut file.includes)?;
                    file.decls.push(Decl::Typedef(decl));
                }
                Form::Distinct(distinct) => {
                    let decl = scope.using_decl(&distinct.base, &distinct.type_params, &mut file.includes)?;
                    file.decls.push(Decl::Typedef(decl));
                }
                Form::Primitive { .. } | Form::Enum(_) | Form::BuiltinGeneric { .. } => {}
            }
            for import in directives::custom_imports(typ, DOMAIN) {
                match import.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
                    Some(system) => file.includes.system(system),
                    None => file.includes.internal(&import),
                }
            }
        }

        if file.decls.iter().any(Decl::has_json) {
            file.includes.internal(JSON_HEADER);
        }
        Ok(file)
    }
}

impl<'a> FileGenerator<'a> {
    /// Declaration order of a file. Starts from the dependency sort, then
    /// pulls every by-value dependency ahead of its dependent. The sort drops
    /// whichever edge closes a cycle; once `cycles` has passed, the edges left
    /// in any cycle are optional or container references, so by-value
    /// dependencies can always be placed first.
    fn emission_order(&self, members: &[&'a Type]) -> Vec<&'a Type> {
        let sorted = self.table.topological_sort(members);
        let mut placed: HashSet<&'a str> = HashSet::new();
        let mut visiting: HashSet<&'a str> = HashSet::new();
        let mut order = Vec::with_capacity(sorted.len());
        for typ in sorted {
            self.place(typ, members, &mut placed, &mut visiting, &mut order);
        }
        order
    }

    fn place(
        &self,
        typ: &'a Type,
        members: &[&'a Type],
        placed: &mut HashSet<&'a str>,
        visiting: &mut HashSet<&'a str>,
        order: &mut Vec<&'a Type>,
    ) {
        let key = typ.qualified_name.as_str();
        if placed.contains(key) || !visiting.insert(key) {
            return;
        }
        for dep in self.inline_dependencies(typ, members) {
            self.place(dep, members, placed, visiting, order);
        }
        visiting.remove(key);
        placed.insert(key);
        order.push(typ);
    }

    /// Members of the file that `typ` needs complete before its own body
    fn inline_dependencies(&self, typ: &'a Type, members: &[&'a Type]) -> Vec<&'a Type> {
        let member = |target: &Type| members.iter().copied().find(|m| m.qualified_name == target.qualified_name);
        let inline = |type_ref: &TypeRef| -> Option<&'a Type> {
            if type_ref.is_array() || type_ref.is_map() {
                return None;
            }
            member(self.table.resolve_ref(type_ref, &typ.namespace)?)
        };
        match &typ.form {
            Form::Struct(form) => {
                let (parents, fields) = match native_parents(self.table, typ, form) {
                    Some(parents) => (parents, form.fields.clone()),
                    None => (Vec::new(), unified_fields(typ, self.table)),
                };
                let mut deps: Vec<&'a Type> = parents.into_iter().filter_map(member).collect();
                deps.extend(
                    fields
                        .iter()
                        .filter(|f| !f.is_any_optional() && !directives::is_field_omitted(f, DOMAIN))
                        .filter(|f| directives::field_type_override(f, DOMAIN).is_none())
                        .filter_map(|f| inline(&f.type_ref)),
                );
                deps
            }
            Form::Alias(alias) => inline(&alias.target).into_iter().collect(),
            Form::Distinct(distinct) => inline(&distinct.base).into_iter().collect(),
            Form::Primitive { .. } | Form::Enum(_) | Form::BuiltinGeneric { .. } => Vec::new(),
        }
    }
}

/// Parents a struct can inherit from natively, or `None` when its unified
/// fields must be flattened onto it instead
fn native_parents<'a>(table: &'a Table, owner: &Type, form: &StructForm) -> Option<Vec<&'a Type>> {
    if form.extends.is_empty() || !form.omitted_fields.is_empty() {
        return None;
    }
    let mut seen: Vec<String> = Vec::new();
    let mut parents = Vec::new();
    for base in &form.extends {
        if !base.type_args.is_empty() {
            return None;
        }
        let parent = table.resolve_ref(base, &owner.namespace)?;
        if parent.as_struct()?.is_generic() {
            return None;
        }
        for field in unified_fields(parent, table) {
            if seen.contains(&field.name) || form.field(&field.name).is_some() {
                return None;
            }
            seen.push(field.name);
        }
        parents.push(parent);
    }
    Some(parents)
}

/// JSON treatment of a value of type `type_ref`, seen from `namespace`
fn value_kind(table: &Table, type_ref: &TypeRef, namespace: &str) -> ValueKind {
    value_kind_at(table, type_ref, namespace, 0)
}

fn value_kind_at(table: &Table, type_ref: &TypeRef, namespace: &str, depth: usize) -> ValueKind {
    if depth > MAX_ALIAS_DEPTH {
        return ValueKind::Plain;
    }
    if let Some(param) = &type_ref.type_param {
        return match &param.default {
            Some(default) => value_kind_at(table, default, namespace, depth + 1),
            None => ValueKind::Param(param.name.clone()),
        };
    }
    if type_ref.is_array() {
        return match type_ref.type_args.first().map(|e| value_kind_at(table, e, namespace, depth + 1)) {
            Some(ValueKind::Object) => ValueKind::ObjectArray,
            Some(ValueKind::Param(name)) => ValueKind::ParamArray(name),
            _ => ValueKind::Plain,
        };
    }
    let Some(target) = table.resolve_ref(type_ref, namespace) else {
        return ValueKind::Plain;
    };
    let underlying = |inner: &TypeRef, params: &[TypeParam]| {
        let args = type_arg_map(params, &type_ref.type_args);
        value_kind_at(table, &substitute_type_ref(inner, &args), &target.namespace, depth + 1)
    };
    match &target.form {
        Form::Struct(_) => ValueKind::Object,
        // Array wrappers carry their own parse / to_json
        Form::Distinct(d) if d.base.is_array() && d.base.array_size.is_none() => ValueKind::Object,
        Form::Distinct(d) => underlying(&d.base, &d.type_params),
        Form::Alias(a) => underlying(&a.target, &a.type_params),
        Form::Primitive { name } if name == "timestamp" || name == "timespan" => ValueKind::Time,
        Form::Primitive { .. } | Form::Enum(_) | Form::BuiltinGeneric { .. } => ValueKind::Plain,
    }
}

fn forward_decl(typ: &Type, form: &StructForm) -> String {
    let name = directives::type_name(typ, DOMAIN);
    let slots = slot_params(&form.type_params);
    if slots.is_empty() {
        return format!("struct {};", name);
    }
    let params: Vec<String> = slots.iter().map(|p| format!("typename {}", p.name)).collect();
    format!("template <{}>\nstruct {};", params.join(", "), name)
}

fn enum_decl(typ: &Type, includes: &mut Includes) -> EnumDecl {
    let form = typ.as_enum().cloned().unwrap_or_default();
    if form.is_int_enum {
        includes.system("cstdint");
    }
    EnumDecl {
        name: directives::type_name(typ, DOMAIN),
        doc: directives::doc(typ),
        values: form
            .values
            .iter()
            .map(|v| (to_pascal_case(&v.name), v.int_value(), v.string_value().to_string()))
            .collect(),
        is_int: form.is_int_enum,
    }
}

/// Per-type rendering state
struct Scope<'s, 'a> {
    resolver: &'s Resolver<'s>,
    ctx: &'s Context<'a>,
    /// Qualified names of the file's declarations in emission order
    order: &'s [&'s str],
    position: usize,
    owner: &'a Type,
}

impl<'s, 'a> Scope<'s, 'a> {
    fn name(&self) -> String {
        directives::type_name(self.owner, DOMAIN)
    }

    fn template(&self, params: &[TypeParam], includes: &mut Includes) -> Result<Vec<TemplateParam>> {
        let mut template = Vec::new();
        for param in slot_params(params) {
            let default = if param.optional {
                includes.system("variant");
                Some("std::monostate".to_string())
            } else {
                None
            };
            let enum_constraint = match &param.constraint {
                Some(constraint) => match self.ctx.table.resolve_ref(constraint, &self.owner.namespace) {
                    Some(target) if target.is_enum() => {
                        includes.system("type_traits");
                        Some(self.resolver.resolve_type_ref(constraint, self.ctx, includes)?)
                    }
                    _ => None,
                },
                None => None,
            };
            template.push(TemplateParam { name: param.name.clone(), default, enum_constraint });
        }
        Ok(template)
    }

    /// Whether `type_ref` names a struct of this file declared at or after
    /// the owner, outside any container
    fn is_deferred(&self, type_ref: &TypeRef) -> bool {
        if type_ref.is_array() || type_ref.is_map() {
            return false;
        }
        let Some(target) = self.ctx.table.resolve_ref(type_ref, &self.owner.namespace) else {
            return false;
        };
        if !target.is_struct() {
            return false;
        }
        self.order
            .iter()
            .position(|qn| *qn == target.qualified_name)
            .map(|p| p >= self.position)
            .unwrap_or(false)
    }

    fn field_decl(&self, field: &Field, includes: &mut Includes) -> Result<FieldDecl> {
        let name = escape_keyword(
            Language::Cpp,
            &directives::field_name(field, DOMAIN).unwrap_or_else(|| field.name.clone()),
        );
        let mut decl = FieldDecl {
            name,
            key: to_snake_case(&field.name),
            cpp_type: String::new(),
            value_type: String::new(),
            storage: Storage::Value,
            kind: ValueKind::Plain,
            soft_optional: field.is_optional && !field.is_hard_optional,
            default: None,
            doc: directives::field_doc(field),
        };

        if let Some(cpp_type) = directives::field_type_override(field, DOMAIN) {
            decl.value_type = cpp_type.clone();
            decl.cpp_type = cpp_type;
            return Ok(decl);
        }

        let base = self.resolver.resolve_type_ref(&field.type_ref, self.ctx, includes)?;
        decl.kind = value_kind(self.ctx.table, &field.type_ref, &self.owner.namespace);
        if field.is_any_optional() && self.is_deferred(&field.type_ref) {
            includes.internal(INDIRECT_HEADER);
            decl.storage = Storage::Indirect;
            decl.cpp_type = format!("x::mem::indirect<{}>", base);
        } else if field.is_hard_optional {
            includes.system("optional");
            decl.storage = Storage::Optional;
            decl.cpp_type = format!("std::optional<{}>", base);
        } else {
            decl.default = self.default_value(&field.type_ref, &base);
            decl.cpp_type = base.clone();
        }
        decl.value_type = base;
        Ok(decl)
    }

    fn default_value(&self, type_ref: &TypeRef, cpp_type: &str) -> Option<String> {
        let target = self.ctx.table.resolve_ref(type_ref, &self.owner.namespace)?;
        match &target.form {
            Form::Primitive { name } => match name.as_str() {
                "bool" => Some("false".into()),
                n if crate::resolution::is_number_primitive(n) => Some("0".into()),
                _ => None,
            },
            Form::Enum(e) if e.is_int_enum => {
                e.values.first().map(|v| format!("{}::{}", cpp_type, to_pascal_case(&v.name)))
            }
            _ => None,
        }
    }

    /// Bases rendered natively, or `None` when the fields must be flattened
    fn native_bases(&self, form: &StructForm, includes: &mut Includes) -> Result<Option<Vec<String>>> {
        let Some(parents) = native_parents(self.ctx.table, self.owner, form) else {
            return Ok(None);
        };
        let mut bases = Vec::new();
        for parent in parents {
            bases.push(self.resolver.qualified_name(parent, self.ctx, includes)?);
        }
        Ok(Some(bases))
    }

    fn struct_decl(&self, form: &StructForm, includes: &mut Includes) -> Result<StructDecl> {
        let template = self.template(&form.type_params, includes)?;
        let (bases, fields) = match self.native_bases(form, includes)? {
            Some(bases) => (bases, form.fields.clone()),
            None => (Vec::new(), unified_fields(self.owner, self.ctx.table)),
        };
        let mut decls = Vec::new();
        for field in fields.iter().filter(|f| !directives::is_field_omitted(f, DOMAIN)) {
            decls.push(self.field_decl(field, includes)?);
        }
        Ok(StructDecl {
            name: self.name(),
            doc: directives::doc(self.owner),
            template,
            bases,
            fields: decls,
            methods: directives::methods(self.owner, DOMAIN),
        })
    }

    fn using_decl(&self, target: &TypeRef, params: &[TypeParam], includes: &mut Includes) -> Result<TypedefDecl> {
        Ok(TypedefDecl::Using {
            name: self.name(),
            doc: directives::doc(self.owner),
            template: self.template(params, includes)?,
            target: self.resolver.resolve_type_ref(target, self.ctx, includes)?,
        })
    }

    fn wrapper_decl(&self, base: &TypeRef, includes: &mut Includes) -> Result<TypedefDecl> {
        let (elem, elem_kind) = match base.type_args.first() {
            Some(arg) => (
                self.resolver.resolve_type_ref(arg, self.ctx, includes)?,
                value_kind(self.ctx.table, arg, &self.owner.namespace),
            ),
            None => ("void".to_string(), ValueKind::Plain),
        };
        includes.system("vector");
        includes.system("initializer_list");
        Ok(TypedefDecl::ArrayWrapper {
            name: self.name(),
            doc: directives::doc(self.owner),
            elem,
            elem_kind,
            methods: directives::methods(self.owner, DOMAIN),
        })
    }
}

// =============================================================================
// Rendering
// =============================================================================

fn render_doc(out: &mut String, doc: &Option<String>, indent: &str) {
    if let Some(doc) = doc {
        out.push_str(&format!("{}/// @brief {}\n", indent, doc));
    }
}

fn render_template(out: &mut String, template: &[TemplateParam]) {
    if template.is_empty() {
        return;
    }
    let params: Vec<String> = template
        .iter()
        .map(|p| match &p.default {
            Some(default) => format!("typename {} = {}", p.name, default),
            None => format!("typename {}", p.name),
        })
        .collect();
    out.push_str(&format!("template <{}>\n", params.join(", ")));
}

fn render_methods(out: &mut String, methods: &[String]) {
    for method in methods {
        out.push('\n');
        for line in method.lines() {
            if line.trim().is_empty() {
                out.push('\n');
            } else {
                out.push_str(&format!("    {}\n", line));
            }
        }
    }
}

/// Declarations whose bodies the `cpp/json` plugin emits
fn render_json_methods(out: &mut String, name: &str) {
    out.push_str(&format!("    static {} parse(x::json::Parser parser);\n", name));
    out.push_str("    [[nodiscard]] x::json::json to_json() const;\n");
}

fn render_struct(out: &mut String, decl: &StructDecl) {
    render_doc(out, &decl.doc, "");
    render_template(out, &decl.template);
    if decl.bases.is_empty() {
        out.push_str(&format!("struct {} {{\n", decl.name));
    } else {
        let bases: Vec<String> = decl.bases.iter().map(|b| format!("public {}", b)).collect();
        out.push_str(&format!("struct {} : {} {{\n", decl.name, bases.join(", ")));
    }
    for param in &decl.template {
        if let Some(constraint) = &param.enum_constraint {
            out.push_str(&format!(
                "    static_assert(std::is_enum_v<{0}> && std::is_same_v<{0}, {1}>, \"{0} must be {1}\");\n",
                param.name, constraint
            ));
        }
    }
    for field in &decl.fields {
        render_doc(out, &field.doc, "    ");
        match &field.default {
            Some(default) => out.push_str(&format!("    {} {} = {};\n", field.cpp_type, field.name, default)),
            None => out.push_str(&format!("    {} {};\n", field.cpp_type, field.name)),
        }
    }
    if !decl.fields.is_empty() {
        out.push('\n');
    }
    render_json_methods(out, &decl.name);
    render_methods(out, &decl.methods);
    out.push_str("};\n");
}

fn render_typedef(out: &mut String, decl: &TypedefDecl) {
    match decl {
        TypedefDecl::Using { name, doc, template, target } => {
            render_doc(out, doc, "");
            render_template(out, template);
            out.push_str(&format!("using {} = {};\n", name, target));
        }
        TypedefDecl::ArrayWrapper { name, doc, elem, methods, .. } => {
            render_doc(out, doc, "");
            out.push_str(&format!("struct {} : private std::vector<{}> {{\n", name, elem));
            out.push_str(&format!("    using Base = std::vector<{}>;\n", elem));
            out.push_str("    using Base::Base;\n");
            for member in WRAPPER_USINGS {
                out.push_str(&format!("    using Base::{};\n", member));
            }
            out.push('\n');
            out.push_str(&format!("    {}(std::initializer_list<{}> init): Base(init) {{}}\n\n", name, elem));
            render_json_methods(out, name);
            render_methods(out, methods);
            out.push_str("};\n");
        }
    }
}

fn render_enum(out: &mut String, decl: &EnumDecl) {
    render_doc(out, &decl.doc, "");
    if decl.is_int {
        out.push_str(&format!("enum class {} : std::uint8_t {{\n", decl.name));
        for (name, value, _) in &decl.values {
            out.push_str(&format!("    {} = {},\n", name, value));
        }
        out.push_str("};\n");
        return;
    }
    out.push_str(&format!("enum class {} {{\n", decl.name));
    for (name, _, _) in &decl.values {
        out.push_str(&format!("    {},\n", name));
    }
    out.push_str("};\n");
    for (name, _, value) in &decl.values {
        out.push_str(&format!("constexpr const char* {}{} = \"{}\";\n", decl.name, name, value));
    }
}

fn render_file(file: &FileDecl) -> String {
    let mut out = String::new();
    out.push_str(GENERATED_HEADER);
    out.push_str("\n\n#pragma once\n");
    if !file.includes.system.is_empty() {
        out.push('\n');
        for header in &file.includes.system {
            out.push_str(&format!("#include <{}>\n", header));
        }
    }
    if !file.includes.internal.is_empty() {
        out.push('\n');
        for header in &file.includes.internal {
            out.push_str(&format!("#include \"{}\"\n", header));
        }
    }
    out.push_str(&format!("\nnamespace {} {{\n", file.namespace));

    let mut sections: Vec<String> = Vec::new();
    if !file.forward.is_empty() {
        sections.push(file.forward.iter().map(|f| format!("{}\n", f)).collect());
    }
    for decl in &file.enums {
        let mut section = String::new();
        render_enum(&mut section, decl);
        sections.push(section);
    }
    for decl in &file.decls {
        let mut section = String::new();
        match decl {
            Decl::Struct(s) => render_struct(&mut section, s),
            Decl::Typedef(t) => render_typedef(&mut section, t),
        }
        sections.push(section);
    }
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(section);
    }
    out.push_str("}\n");
    out
}
