//! TypeScript / Zod Backend
//!
//! Emits one `types.gen.ts` per `@ts output` path holding zod schemas and the
//! TypeScript types inferred from them.
//!
//! Architecture:
//! - Structs, aliases and distincts share a file per output path; enums they
//!   reference ride along, standalone enum paths are generated afterwards
//! - Schemas are topologically ordered; references to the owner or to a later
//!   schema of the same file are wrapped in getters so zod resolves them lazily
//! - Inheritance keeps the parent schema and layers `.omit`, `.partial` and
//!   `.extend` on top instead of flattening
//! - Generic declarations become schema factories taking the slot schemas

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::debug;

use super::collector::{local_enums, Collector};
use super::directives::{self, ValidationRules};
use super::names::{escape_keyword, to_camel_case, to_screaming_snake, to_snake_case, Language};
use super::resolver::{
    Context, Import, ImportAdder, ImportLocation, ImportResolver, Mapping, PrimitiveMapper, ResolvedImport,
    Resolver, TypeFormatter,
};
use super::{file_path, run_command, Plugin, Request, Response, GENERATED_HEADER};
use crate::config::TsConfig;
use crate::error::{CodegenError, Result};
use crate::resolution::{
    compute_cycles, slot_params, unified_fields, CycleAnalysis, ExpressionValue, Field, Form, StructForm,
    Table, Type, TypeParam, TypeRef,
};

const DOMAIN: &str = "ts";
const X_PACKAGE: &str = "@synnaxlabs/x";
const X_PREFIX: &str = "x/ts/src";

pub struct TsPlugin {
    config: TsConfig,
}

impl TsPlugin {
    pub fn new(config: TsConfig) -> Self {
        Self { config }
    }
}

impl Plugin for TsPlugin {
    fn name(&self) -> &str {
        "ts/types"
    }

    fn domains(&self) -> &[&str] {
        &[DOMAIN]
    }

    /// Validation patterns are emitted as regex literals, so they must compile
    fn check(&self, request: &Request<'_>) -> Result<()> {
        for typ in request.participants(self.domains()) {
            let Some(form) = typ.as_struct() else {
                continue;
            };
            for field in &form.fields {
                if let Some(pattern) = ValidationRules::from_field(field).pattern {
                    regex::Regex::new(&pattern).map_err(|e| CodegenError::InvalidDirective {
                        type_name: format!("{}.{}", typ.qualified_name, field.name),
                        directive: "validate pattern".to_string(),
                        reason: e.to_string(),
                    })?;
                }
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(plugin = "ts/types"))]
    fn generate(&self, request: &Request<'_>) -> Result<Response> {
        let table = request.table;
        let cycles = compute_cycles(table);
        let mut response = Response::default();

        let mut schemas = Collector::new(DOMAIN).with_skip(|t| !(t.is_struct() || t.is_alias() || t.is_distinct()));
        let mut enums = Collector::new(DOMAIN).with_skip(|t| !t.is_enum());
        for collector in [&mut schemas, &mut enums] {
            response.errors.extend(collector.add_all(table.declared()));
        }

        let generator = FileGenerator { table, cycles: &cycles, config: &self.config };
        for path in schemas.paths() {
            let schema_types = schemas.get(&path).to_vec();
            let enum_types = local_enums(table, DOMAIN, &path, &schema_types, enums.remove(&path));
            let rendered = generator.render(&path, &schema_types, &enum_types);
            response.record(self.name(), file_path(&path, &self.config.file_name_pattern), rendered);
        }
        for path in enums.paths() {
            let enum_types = enums.get(&path).to_vec();
            let rendered = generator.render(&path, &[], &enum_types);
            response.record(self.name(), file_path(&path, &self.config.file_name_pattern), rendered);
        }
        Ok(response)
    }

    fn post_write(&self, files: &[PathBuf], request: &Request<'_>) -> Result<()> {
        let sources: Vec<PathBuf> = files
            .iter()
            .filter(|f| f.extension().map(|e| e == "ts" || e == "tsx").unwrap_or(false))
            .cloned()
            .collect();
        if sources.is_empty() {
            return Ok(());
        }
        run_command(&self.config.format_command, &["--write"], &sources, request.repo_root.as_deref())
    }
}

/// Module specifier for importing `to` from a file generated at `from`
pub fn import_path(config: &TsConfig, from: &str, to: &str) -> String {
    match (config.package_for(from), config.package_for(to)) {
        (Some(source), Some(target)) if source.package == target.package => {
            let inner = to.strip_prefix(target.prefix.as_str()).unwrap_or(to).trim_start_matches('/');
            format!("@/{}", inner)
        }
        (Some(_), Some(target)) => target.package.clone(),
        _ => relative_import(from, to),
    }
}

/// Relative specifier between two output directories, always dot-prefixed
pub fn relative_import(from: &str, to: &str) -> String {
    let from: Vec<&str> = from.split('/').filter(|p| !p.is_empty()).collect();
    let to: Vec<&str> = to.split('/').filter(|p| !p.is_empty()).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut parts: Vec<&str> = vec![".."; from.len() - common];
    parts.extend_from_slice(&to[common..]);
    let rel = parts.join("/");
    if rel.starts_with('.') {
        rel
    } else {
        format!("./{}", rel)
    }
}

/// Parameter name of a generic slot in a schema factory
fn slot_arg(param_name: &str) -> String {
    escape_keyword(Language::TypeScript, &to_camel_case(param_name))
}

/// `userZ` for `User`, honoring `@ts name`
fn schema_name(typ: &Type) -> String {
    format!("{}Z", to_camel_case(&directives::type_name(typ, DOMAIN)))
}

// =============================================================================
// Type Syntax
// =============================================================================

/// Zod syntax as seen from one output file
struct TsSyntax<'c> {
    config: &'c TsConfig,
    output_path: String,
}

impl<'c> TsSyntax<'c> {
    /// Import of a `@synnaxlabs/x` export, internal when generating inside x
    fn x_import(&self, submodule: &str, name: &str) -> Import {
        if self.output_path == X_PREFIX || self.output_path.starts_with(&format!("{}/", X_PREFIX)) {
            Import::named("internal", &format!("@/{}", submodule), name)
        } else {
            Import::named("synnax", X_PACKAGE, name)
        }
    }
}

/// Runtime fallback for an unbound type parameter
fn param_fallback(param: &TypeParam) -> &'static str {
    match param.constraint.as_ref().map(|c| c.name.as_str()) {
        Some("string" | "uuid") => "z.string()",
        Some("bool") => "z.boolean()",
        Some(name) if crate::resolution::is_number_primitive(name) => "z.number()",
        Some("timestamp" | "timespan") => "z.number()",
        _ => "z.unknown()",
    }
}

impl TypeFormatter for TsSyntax<'_> {
    fn format_qualified(&self, qualifier: &str, type_name: &str) -> String {
        if qualifier.is_empty() {
            type_name.to_string()
        } else {
            format!("{}.{}", qualifier, type_name)
        }
    }

    fn format_generic(&self, base: &str, args: &[String]) -> String {
        format!("{}({})", base, args.join(", "))
    }

    fn format_instantiation(&self, base: &str, params: &[&TypeParam], args: &[String]) -> String {
        match (params.len(), args.len()) {
            (0, _) => base.to_string(),
            (_, 0) => format!("{}()", base),
            (1, _) => format!("{}({})", base, args[0]),
            _ => {
                let named: Vec<String> = params
                    .iter()
                    .zip(args)
                    .map(|(p, a)| format!("{}: {}", slot_arg(&p.name), a))
                    .collect();
                format!("{}({{ {} }})", base, named.join(", "))
            }
        }
    }

    fn format_array(&self, elem: &str) -> String {
        format!("z.array({})", elem)
    }

    fn format_fixed_array(&self, elem: &str, size: u64) -> String {
        format!("z.array({}).length({})", elem, size)
    }

    fn format_map(&self, key: &str, value: &str) -> String {
        format!("z.record({}, {})", key, value)
    }

    fn fallback_type(&self) -> String {
        "z.unknown()".to_string()
    }

    fn type_name(&self, typ: &Type, _domain: &str) -> String {
        schema_name(typ)
    }

    fn format_type_param(&self, param: &TypeParam, _imports: &mut dyn ImportAdder) -> String {
        format!("{} ?? {}", slot_arg(&param.name), param_fallback(param))
    }
}

impl PrimitiveMapper for TsSyntax<'_> {
    fn map_primitive(&self, name: &str) -> Mapping {
        match name {
            "uuid" => Mapping::plain("z.uuid()"),
            "string" => Mapping::plain("z.string()"),
            "bool" => Mapping::plain("z.boolean()"),
            "int8" | "int16" | "uint8" | "uint12" | "uint16" | "uint20" => {
                Mapping::plain(&format!("zod.{}Z", name)).with_import(self.x_import("zod", "zod"))
            }
            "int32" | "uint32" | "int64" | "uint64" => Mapping::plain(&format!("z.{}()", name)),
            "float32" | "float64" => Mapping::plain("z.number()"),
            "timestamp" => Mapping::plain("TimeStamp.z").with_import(self.x_import("telem", "TimeStamp")),
            "timespan" => Mapping::plain("TimeSpan.z").with_import(self.x_import("telem", "TimeSpan")),
            "json" => Mapping::plain("zod.stringifiedJSON()").with_import(self.x_import("zod", "zod")),
            "bytes" => Mapping::plain("z.instanceof(Uint8Array)"),
            _ => Mapping::plain("z.unknown()"),
        }
    }
}

impl ImportResolver for TsSyntax<'_> {
    fn resolve_import(&self, location: ImportLocation<'_>, target: &Type, ctx: &Context<'_>) -> ResolvedImport {
        let qualifier = directives::namespace_override(target, DOMAIN).unwrap_or_else(|| target.namespace.clone());
        let path = match location {
            ImportLocation::Generated(path) => import_path(self.config, &ctx.output_path, path),
            ImportLocation::Handwritten(include) => include.to_string(),
        };
        ResolvedImport { import: Import::named("module", &path, &qualifier), qualifier }
    }
}

/// Named imports grouped by module specifier
#[derive(Debug, Default)]
struct TsImports {
    modules: BTreeMap<String, BTreeSet<String>>,
}

impl TsImports {
    fn add(&mut self, module: &str, name: &str) {
        self.modules.entry(module.to_string()).or_default().insert(name.to_string());
    }

    fn render_group(&self, out: &mut String, include: impl Fn(&str) -> bool) {
        for (module, names) in &self.modules {
            if include(module) {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                out.push_str(&format!("import {{ {} }} from \"{}\";\n", names.join(", "), module));
            }
        }
    }

    /// `@synnaxlabs/*` packages, then zod, then other modules, then `@/` paths
    fn render(&self, out: &mut String) {
        let synnax = |m: &str| m.starts_with("@synnaxlabs/");
        let internal = |m: &str| m.starts_with("@/");
        self.render_group(out, synnax);
        out.push_str("import { z } from \"zod\";\n");
        self.render_group(out, |m| !synnax(m) && !internal(m));
        self.render_group(out, internal);
    }
}

impl ImportAdder for TsImports {
    fn add_import(&mut self, import: Import) {
        if let Some(name) = &import.name {
            self.add(&import.path, name);
        }
    }
}

// =============================================================================
// Declarations
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct FieldDecl {
    name: String,
    schema: String,
    /// Lazily evaluated through a getter
    getter: bool,
}

/// A generic slot of a schema factory
#[derive(Debug, Clone, PartialEq)]
struct SlotDecl {
    /// `T`
    type_name: String,
    /// `t`
    arg: String,
    constraint: String,
    default: String,
}

impl SlotDecl {
    fn declaration(&self) -> String {
        format!("{} extends {} = {}", self.type_name, self.constraint, self.default)
    }
}

struct FileGenerator<'a> {
    table: &'a Table,
    cycles: &'a CycleAnalysis,
    config: &'a TsConfig,
}

impl<'a> FileGenerator<'a> {
    fn render(&self, path: &str, schemas: &[&'a Type], enums: &[&'a Type]) -> Result<String> {
        let namespace = schemas.iter().chain(enums).map(|t| t.namespace.clone()).next().unwrap_or_default();
        for typ in schemas.iter().filter(|t| t.is_struct()) {
            self.cycles.check(typ)?;
        }

        let ordered = self.table.topological_sort(schemas);
        let order: Vec<&str> = ordered.iter().map(|t| t.qualified_name.as_str()).collect();
        let ctx = Context::new(self.table, path, &namespace, DOMAIN);
        let syntax = TsSyntax { config: self.config, output_path: path.to_string() };
        let resolver = Resolver::for_backend(&syntax);

        let mut imports = TsImports::default();
        let mut sections = Vec::new();
        for typ in enums {
            sections.push(render_enum(typ));
        }
        for (position, typ) in ordered.iter().copied().enumerate() {
            debug!(type_name = %typ.qualified_name, "rendering");
            let scope = Scope { syntax: &syntax, resolver: &resolver, ctx: &ctx, order: &order, position, owner: typ };
            let section = match &typ.form {
                Form::Struct(form) => scope.struct_decl(form, &mut imports)?,
                Form::Alias(alias) => scope.alias_decl(&alias.target, &alias.type_params, &mut imports)?,
                Form::Distinct(distinct) => scope.alias_decl(&distinct.base, &distinct.type_params, &mut imports)?,
                Form::Primitive { .. } | Form::Enum(_) | Form::BuiltinGeneric { .. } => continue,
            };
            sections.push(section);
        }

        let mut out = String::new();
        out.push_str(GENERATED_HEADER);
        out.push_str("\n\n");
        imports.render(&mut out);
        for section in &sections {
            out.push('\n');
            out.push_str(section);
        }
        Ok(out)
    }
}

fn render_enum(typ: &Type) -> String {
    let form = typ.as_enum().cloned().unwrap_or_default();
    let name = directives::type_name(typ, DOMAIN);
    let schema = schema_name(typ);
    let mut out = String::new();
    if form.is_int_enum {
        out.push_str(&format!("export enum {} {{\n", name));
        for value in &form.values {
            out.push_str(&format!("  {} = {},\n", to_camel_case(&value.name), value.int_value()));
        }
        out.push_str("}\n");
        out.push_str(&format!("export const {} = z.enum({});\n", schema, name));
        return out;
    }
    let values = format!("{}S", to_screaming_snake(&name));
    let literals: Vec<String> = form.values.iter().map(|v| format!("\"{}\"", v.string_value())).collect();
    out.push_str(&format!("export const {} = [{}] as const;\n", values, literals.join(", ")));
    out.push_str(&format!("export const {} = z.enum([...{}]);\n", schema, values));
    out.push_str(&format!("export type {} = z.infer<typeof {}>;\n", name, schema));
    out
}

/// Per-declaration rendering state
struct Scope<'s, 'a> {
    syntax: &'s TsSyntax<'a>,
    resolver: &'s Resolver<'s>,
    ctx: &'s Context<'a>,
    /// Qualified names of the file's schemas in emission order
    order: &'s [&'s str],
    position: usize,
    owner: &'a Type,
}

impl<'s, 'a> Scope<'s, 'a> {
    fn resolve(&self, type_ref: &TypeRef, imports: &mut TsImports) -> Result<String> {
        self.resolver.resolve_type_ref(type_ref, self.ctx, imports)
    }

    /// Whether `type_ref` mentions the owner or a schema of this file that
    /// is not yet initialized when the owner's body runs
    fn is_deferred(&self, type_ref: &TypeRef) -> bool {
        if type_ref.type_args.iter().any(|arg| self.is_deferred(arg)) {
            return true;
        }
        let Some(target) = self.ctx.table.resolve_ref(type_ref, &self.owner.namespace) else {
            return false;
        };
        self.order
            .iter()
            .position(|qn| *qn == target.qualified_name)
            .map(|p| p >= self.position)
            .unwrap_or(false)
    }

    fn slots(&self, params: &[TypeParam], imports: &mut TsImports) -> Result<Vec<SlotDecl>> {
        let mut slots = Vec::new();
        for param in slot_params(params) {
            let enum_constraint = match &param.constraint {
                Some(constraint) => match self.ctx.table.resolve_ref(constraint, &self.owner.namespace) {
                    Some(target) if target.is_enum() => Some(format!("typeof {}", self.resolve(constraint, imports)?)),
                    _ => None,
                },
                None => None,
            };
            let (constraint, default) = match enum_constraint {
                Some(enum_type) => (enum_type.clone(), enum_type),
                None => ("z.ZodType".to_string(), "z.ZodUnknown".to_string()),
            };
            slots.push(SlotDecl {
                type_name: param.name.clone(),
                arg: slot_arg(&param.name),
                constraint,
                default,
            });
        }
        Ok(slots)
    }

    fn field_decl(&self, field: &Field, imports: &mut TsImports) -> Result<FieldDecl> {
        let name = directives::field_name(field, DOMAIN).unwrap_or_else(|| to_camel_case(&field.name));
        let getter = self.is_deferred(&field.type_ref);

        let schema = if let Some(override_type) = directives::field_type_override(field, DOMAIN) {
            let mapping = self.syntax.map_primitive(&override_type);
            for import in mapping.imports {
                imports.add_import(import);
            }
            optional_suffix(validated(mapping.target_type, field, &override_type), field)
        } else if field.type_ref.is_array() && field.type_ref.array_size.is_none() {
            let elem = match field.type_ref.type_args.first() {
                Some(arg) => self.resolve(arg, imports)?,
                None => "z.unknown()".to_string(),
            };
            let wrapped = if field.is_any_optional() {
                format!("array.nullToUndefined({})", elem)
            } else {
                format!("array.nullishToEmpty({})", elem)
            };
            imports.add_import(self.syntax.x_import("array", "array"));
            wrapped
        } else {
            let base = self.resolve(&field.type_ref, imports)?;
            let primitive = match self.ctx.table.resolve_ref(&field.type_ref, &self.owner.namespace) {
                Some(Type { form: Form::Primitive { name }, .. }) => name.clone(),
                _ => String::new(),
            };
            optional_suffix(validated(base, field, &primitive), field)
        };
        Ok(FieldDecl { name, schema, getter })
    }

    fn field_decls(&self, fields: &[Field], imports: &mut TsImports) -> Result<Vec<FieldDecl>> {
        let mut decls = Vec::new();
        for field in fields.iter().filter(|f| !directives::is_field_omitted(f, DOMAIN)) {
            decls.push(self.field_decl(field, imports)?);
        }
        Ok(decls)
    }

    /// Schema expression of a struct body, indented for `indent`
    fn struct_body(&self, form: &StructForm, imports: &mut TsImports, indent: &str) -> Result<String> {
        if form.extends.is_empty() {
            let fields = self.field_decls(&unified_fields(self.owner, self.ctx.table), imports)?;
            return Ok(format!("z.object({})", render_shape(&fields, indent)));
        }

        let mut body = self.resolve(&form.extends[0], imports)?;
        for base in &form.extends[1..] {
            body.push_str(&format!("\n{}  .extend({}.shape)", indent, self.resolve(base, imports)?));
        }

        let mut inherited: BTreeMap<String, Field> = BTreeMap::new();
        for base in &form.extends {
            if let Some(parent) = self.ctx.table.resolve_ref(base, &self.owner.namespace) {
                for field in unified_fields(parent, self.ctx.table) {
                    inherited.insert(field.name.clone(), field);
                }
            }
        }

        let mut omit: Vec<String> = form.omitted_fields.iter().map(|f| to_camel_case(f)).collect();
        let mut partial = Vec::new();
        let mut extend = Vec::new();
        for field in form.fields.iter().filter(|f| !directives::is_field_omitted(f, DOMAIN)) {
            match inherited.get(&field.name) {
                Some(parent) if parent.type_ref == field.type_ref => {
                    // `.partial` only adds `undefined`; `??` fields must keep accepting null
                    if field.is_optional && !field.is_hard_optional && !parent.is_any_optional() {
                        partial.push(to_camel_case(&field.name));
                    } else {
                        extend.push(self.field_decl(field, imports)?);
                    }
                }
                Some(_) => {
                    omit.push(to_camel_case(&field.name));
                    extend.push(self.field_decl(field, imports)?);
                }
                None => extend.push(self.field_decl(field, imports)?),
            }
        }

        let keys = |names: &[String]| names.iter().map(|n| format!("{}: true", n)).collect::<Vec<_>>().join(", ");
        if !omit.is_empty() {
            body.push_str(&format!("\n{}  .omit({{ {} }})", indent, keys(&omit)));
        }
        if !partial.is_empty() {
            body.push_str(&format!("\n{}  .partial({{ {} }})", indent, keys(&partial)));
        }
        if !extend.is_empty() {
            let inner = format!("{}  ", indent);
            body.push_str(&format!("\n{}.extend({})", inner, render_shape(&extend, &inner)));
        }
        Ok(body)
    }

    fn struct_decl(&self, form: &StructForm, imports: &mut TsImports) -> Result<String> {
        let name = directives::type_name(self.owner, DOMAIN);
        let schema = schema_name(self.owner);
        let slots = self.slots(&form.type_params, imports)?;
        if slots.is_empty() {
            let body = self.struct_body(form, imports, "")?;
            return Ok(format!(
                "export const {} = {};\nexport interface {} extends z.infer<typeof {}> {{}}\n",
                schema, body, name, schema
            ));
        }
        let body = self.struct_body(form, imports, "  ")?;
        Ok(render_factory(&name, &schema, &slots, &body))
    }

    fn alias_decl(&self, target: &TypeRef, params: &[TypeParam], imports: &mut TsImports) -> Result<String> {
        let name = directives::type_name(self.owner, DOMAIN);
        let schema = schema_name(self.owner);
        let slots = self.slots(params, imports)?;
        let body = self.resolve(target, imports)?;
        if slots.is_empty() {
            return Ok(format!(
                "export const {} = {};\nexport type {} = z.infer<typeof {}>;\n",
                schema, body, name, schema
            ));
        }
        Ok(render_factory(&name, &schema, &slots, &body))
    }
}

/// Apply `validate` rules to a string or number schema
fn validated(mut schema: String, field: &Field, primitive: &str) -> String {
    let rules = ValidationRules::from_field(field);
    if rules.is_empty() {
        return schema;
    }
    if crate::resolution::is_string_primitive(primitive) {
        if rules.required {
            schema.push_str(&format!(".min(1, \"{} is required\")", human_name(&field.name)));
        }
        if rules.email {
            schema.push_str(".email()");
        }
        if rules.url {
            schema.push_str(".url()");
        }
        if let Some(min) = rules.min_length {
            schema.push_str(&format!(".min({})", min));
        }
        if let Some(max) = rules.max_length {
            schema.push_str(&format!(".max({})", max));
        }
        if let Some(pattern) = &rules.pattern {
            schema.push_str(&format!(".regex(/{}/)", pattern));
        }
    }
    if crate::resolution::is_number_primitive(primitive) {
        if let Some(min) = rules.min {
            schema.push_str(&format!(".min({})", number(min)));
        }
        if let Some(max) = rules.max {
            schema.push_str(&format!(".max({})", number(max)));
        }
    }
    match &rules.default {
        Some(ExpressionValue::String(s)) => schema.push_str(&format!(".default({:?})", s)),
        Some(ExpressionValue::Int(i)) => schema.push_str(&format!(".default({})", i)),
        Some(ExpressionValue::Float(f)) => schema.push_str(&format!(".default({})", number(*f))),
        Some(ExpressionValue::Bool(b)) => schema.push_str(&format!(".default({})", b)),
        Some(ExpressionValue::Ident(ident)) => schema.push_str(&format!(".default({})", ident)),
        None => {}
    }
    schema
}

fn optional_suffix(schema: String, field: &Field) -> String {
    if field.is_hard_optional {
        format!("{}.nullish()", schema)
    } else if field.is_optional {
        format!("{}.optional()", schema)
    } else {
        schema
    }
}

/// `first_name` -> `First name`
fn human_name(field: &str) -> String {
    let spaced = to_snake_case(field).replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// `{ ... }` object literal of fields; the closing brace sits at `indent`
fn render_shape(fields: &[FieldDecl], indent: &str) -> String {
    if fields.is_empty() {
        return "{}".to_string();
    }
    let mut out = String::from("{\n");
    for field in fields {
        if field.getter {
            out.push_str(&format!("{}  get {}() {{\n", indent, field.name));
            out.push_str(&format!("{}    return {};\n", indent, field.schema));
            out.push_str(&format!("{}  }},\n", indent));
        } else {
            out.push_str(&format!("{}  {}: {},\n", indent, field.name, field.schema));
        }
    }
    out.push_str(indent);
    out.push('}');
    out
}

/// Schema factory over generic slots plus its inferred type
fn render_factory(name: &str, schema: &str, slots: &[SlotDecl], body: &str) -> String {
    let declarations: Vec<String> = slots.iter().map(SlotDecl::declaration).collect();
    let type_args: Vec<&str> = slots.iter().map(|s| s.type_name.as_str()).collect();
    let mut out = String::new();
    if let [slot] = slots {
        out.push_str(&format!(
            "export const {} = <{}>({}?: {}) =>\n  {};\n",
            schema,
            slot.declaration(),
            slot.arg,
            slot.type_name,
            body
        ));
    } else {
        out.push_str(&format!("export interface {}Schemas<{}> {{\n", name, declarations.join(", ")));
        for slot in slots {
            out.push_str(&format!("  {}?: {};\n", slot.arg, slot.type_name));
        }
        out.push_str("}\n\n");
        out.push_str(&format!("export const {} = <{}>({{\n", schema, declarations.join(", ")));
        for slot in slots {
            out.push_str(&format!("  {},\n", slot.arg));
        }
        out.push_str(&format!("}}: {}Schemas<{}> = {{}}) =>\n  {};\n", name, type_args.join(", "), body));
    }
    out.push_str(&format!(
        "export type {}<{}> = z.infer<ReturnType<typeof {}<{}>>>;\n",
        name,
        declarations.join(", "),
        schema,
        type_args.join(", ")
    ));
    out
}
