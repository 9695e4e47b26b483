//! C++ JSON Serializer Backend
//!
//! Emits `json.gen.h` next to every `types.gen.h` that declares structs or
//! array wrappers, defining the `parse` and `to_json` members the types header
//! declares. Declarations come from the same pass `cpp/types` renders, so both
//! headers agree on field names, storage and order.

use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

use super::cpp::{declare_all, format_headers, Decl, FieldDecl, FileDecl, Storage, StructDecl, TypedefDecl, ValueKind};
use super::{file_path, Plugin, Request, Response, GENERATED_HEADER};
use crate::config::CppConfig;
use crate::error::Result;

const TYPES_HEADER_SUFFIX: &str = "/types.gen.h";

pub struct CppJsonPlugin {
    config: CppConfig,
}

impl CppJsonPlugin {
    pub fn new(config: CppConfig) -> Self {
        Self { config }
    }
}

impl Plugin for CppJsonPlugin {
    fn name(&self) -> &str {
        "cpp/json"
    }

    fn domains(&self) -> &[&str] {
        &["cpp"]
    }

    fn requires(&self) -> &[&str] {
        &["cpp/types"]
    }

    #[tracing::instrument(skip_all, fields(plugin = "cpp/json"))]
    fn generate(&self, request: &Request<'_>) -> Result<Response> {
        // Grouping errors are reported once, by cpp/types
        let (files, _) = declare_all(request.table);
        let mut response = Response::default();
        for (dir, file) in files {
            if let Ok(decl) = &file {
                if !decl.decls.iter().any(Decl::has_json) {
                    debug!(path = %dir, "nothing to serialize");
                    continue;
                }
            }
            let types_header = file_path(&dir, &self.config.file_name_pattern);
            let rendered = file.map(|decl| render_file(&types_header, &decl));
            response.record(self.name(), file_path(&dir, &self.config.json_file_name), rendered);
        }
        Ok(response)
    }

    fn post_write(&self, files: &[PathBuf], _request: &Request<'_>) -> Result<()> {
        format_headers(&self.config.format_command, files)
    }
}

// =============================================================================
// Expressions
// =============================================================================

fn parse_expr(field: &FieldDecl) -> String {
    let read = format!("parser.field<{}>(\"{}\")", field.value_type, field.key);
    match field.storage {
        Storage::Optional => format!("parser.has(\"{}\") ? std::make_optional({}) : std::nullopt", field.key, read),
        Storage::Indirect => format!(
            "parser.has(\"{}\") ? x::mem::indirect<{}>({}) : nullptr",
            field.key, field.value_type, read
        ),
        Storage::Value if field.soft_optional && matches!(field.kind, ValueKind::Plain | ValueKind::Time) => {
            format!("parser.field<{0}>(\"{1}\", {0}{{}})", field.value_type, field.key)
        }
        Storage::Value => read,
    }
}

/// How generated code reaches a value: `value` reads it, `member` prefixes
/// a member call
struct Access {
    value: String,
    member: String,
}

/// JSON form of one array element named `item`
fn element_expr(kind: &ValueKind) -> &'static str {
    match kind {
        ValueKind::Object => "item.to_json()",
        ValueKind::Time => "item.nanoseconds()",
        _ => "item",
    }
}

/// `if constexpr` chain over what a template argument can be; `emit` turns
/// a JSON expression into a statement
fn param_dispatch(param: &str, value: &str, member: &str, indent: &str, emit: impl Fn(&str) -> String) -> String {
    format!(
        "{i}if constexpr (std::is_same_v<{p}, x::json::json>)\n\
         {i}    {raw}\n\
         {i}else if constexpr (std::is_same_v<{p}, std::monostate>)\n\
         {i}    {null}\n\
         {i}else\n\
         {i}    {object}\n",
        i = indent,
        p = param,
        raw = emit(value),
        null = emit("nullptr"),
        object = emit(&format!("{}to_json()", member)),
    )
}

/// Statements writing one value to `j[key]`
fn assign(kind: &ValueKind, key: &str, access: &Access, indent: &str) -> String {
    let set = |expr: &str| format!("j[\"{}\"] = {};", key, expr);
    let array = |body: String| {
        format!(
            "{i}{{\n{i}    auto arr = x::json::json::array();\n{body}{i}    {set}\n{i}}}\n",
            i = indent,
            body = body,
            set = set("arr"),
        )
    };
    match kind {
        ValueKind::Plain => format!("{}{}\n", indent, set(&access.value)),
        ValueKind::Time => format!("{}{}\n", indent, set(&format!("{}nanoseconds()", access.member))),
        ValueKind::Object => format!("{}{}\n", indent, set(&format!("{}to_json()", access.member))),
        ValueKind::Param(param) => param_dispatch(param, &access.value, &access.member, indent, set),
        ValueKind::ObjectArray => array(format!(
            "{}    for (const auto &item: {}) arr.push_back(item.to_json());\n",
            indent, access.value
        )),
        ValueKind::ParamArray(param) => {
            let push = |expr: &str| format!("arr.push_back({});", expr);
            array(format!(
                "{}    for (const auto &item: {})\n{}",
                indent,
                access.value,
                param_dispatch(param, "item", "item.", &format!("{}        ", indent), push)
            ))
        }
    }
}

fn to_json_stmt(field: &FieldDecl) -> String {
    match field.storage {
        Storage::Value => {
            let access = Access { value: format!("this->{}", field.name), member: format!("this->{}.", field.name) };
            assign(&field.kind, &field.key, &access, "    ")
        }
        Storage::Optional | Storage::Indirect => {
            let access = Access { value: format!("*this->{}", field.name), member: format!("this->{}->", field.name) };
            let body = assign(&field.kind, &field.key, &access, "        ");
            format!("    if (this->{}.has_value()) {{\n{}    }}\n", field.name, body)
        }
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// `inline ` for plain structs, the template header for generic ones
fn definition_prefix(decl: &StructDecl) -> String {
    if decl.template.is_empty() {
        return "inline ".to_string();
    }
    let params: Vec<String> = decl.template.iter().map(|p| format!("typename {}", p.name)).collect();
    format!("template <{}>\n", params.join(", "))
}

fn render_struct(out: &mut String, decl: &StructDecl) {
    let prefix = definition_prefix(decl);
    let self_type = decl.self_type();

    out.push_str(&format!("{}{} {}::parse(x::json::Parser parser) {{\n", prefix, self_type, self_type));
    out.push_str(&format!("    {} value;\n", self_type));
    for base in &decl.bases {
        out.push_str(&format!("    static_cast<{0}&>(value) = {0}::parse(parser);\n", base));
    }
    for field in &decl.fields {
        out.push_str(&format!("    value.{} = {};\n", field.name, parse_expr(field)));
    }
    out.push_str("    return value;\n}\n\n");

    out.push_str(&format!("{}x::json::json {}::to_json() const {{\n", prefix, self_type));
    match decl.bases.split_first() {
        Some((first, rest)) => {
            out.push_str(&format!("    x::json::json j = {}::to_json();\n", first));
            for base in rest {
                out.push_str(&format!("    j.update({}::to_json());\n", base));
            }
        }
        None => out.push_str("    x::json::json j = x::json::json::object();\n"),
    }
    for field in &decl.fields {
        out.push_str(&to_json_stmt(field));
    }
    out.push_str("    return j;\n}\n");
}

fn render_wrapper(out: &mut String, name: &str, elem: &str, elem_kind: &ValueKind) {
    out.push_str(&format!("inline {0} {0}::parse(x::json::Parser parser) {{\n", name));
    out.push_str(&format!("    {} value;\n", name));
    out.push_str(&format!(
        "    for (auto &item: parser.field<std::vector<{}>>()) value.push_back(std::move(item));\n",
        elem
    ));
    out.push_str("    return value;\n}\n\n");
    out.push_str(&format!("inline x::json::json {}::to_json() const {{\n", name));
    out.push_str("    auto arr = x::json::json::array();\n");
    out.push_str(&format!("    for (const auto &item: *this) arr.push_back({});\n", element_expr(elem_kind)));
    out.push_str("    return arr;\n}\n");
}

fn uses_params(file: &FileDecl) -> bool {
    file.decls.iter().any(|d| match d {
        Decl::Struct(s) => s
            .fields
            .iter()
            .any(|f| matches!(f.kind, ValueKind::Param(_) | ValueKind::ParamArray(_))),
        Decl::Typedef(_) => false,
    })
}

fn render_file(types_header: &str, file: &FileDecl) -> String {
    let mut system: BTreeSet<&str> = BTreeSet::new();
    if uses_params(file) {
        system.insert("type_traits");
        system.insert("variant");
    }
    if file.decls.iter().any(|d| matches!(d, Decl::Typedef(TypedefDecl::ArrayWrapper { .. }))) {
        system.insert("utility");
        system.insert("vector");
    }

    let mut internal: BTreeSet<String> = BTreeSet::new();
    internal.insert(types_header.to_string());
    internal.insert("x/cpp/json/json.h".to_string());
    // Serializers of generated types from other headers
    for header in &file.includes.internal {
        if let Some(dir) = header.strip_suffix(TYPES_HEADER_SUFFIX) {
            if header != types_header {
                internal.insert(format!("{}/json.gen.h", dir));
            }
        }
    }

    let mut out = String::new();
    out.push_str(GENERATED_HEADER);
    out.push_str("\n\n#pragma once\n");
    if !system.is_empty() {
        out.push('\n');
        for header in &system {
            out.push_str(&format!("#include <{}>\n", header));
        }
    }
    out.push('\n');
    for header in &internal {
        out.push_str(&format!("#include \"{}\"\n", header));
    }
    out.push_str(&format!("\nnamespace {} {{\n", file.namespace));

    let mut sections = Vec::new();
    for decl in &file.decls {
        let mut section = String::new();
        match decl {
            Decl::Struct(s) => render_struct(&mut section, s),
            Decl::Typedef(TypedefDecl::ArrayWrapper { name, elem, elem_kind, .. }) => {
                render_wrapper(&mut section, name, elem, elem_kind)
            }
            Decl::Typedef(TypedefDecl::Using { .. }) => continue,
        }
        sections.push(section);
    }
    out.push_str(&sections.join("\n"));
    out.push_str("}\n");
    out
}
