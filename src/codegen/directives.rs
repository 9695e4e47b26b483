//! Directive Accessors
//!
//! Typed reads of the per-target directive bags attached to types and fields.
//! Directive names:
//! - `output "<path>"`: generated file location for the target
//! - `omit`: skip the type or field for the target
//! - `name "<Name>"`: rename
//! - `include "<path>"`: hand-written header/module to reference instead
//! - `namespace "<ns>"`: override the target namespace
//! - `methods "<code>"`: verbatim code injected into a generated body
//! - `import "<path>"`: extra import for injected code
//! - `type "<expr>"`: field type override
//!
//! The target-independent `doc` domain carries a `value` expression, and the
//! `validate` domain carries field validation rules.

use crate::resolution::{Domains, Expression, ExpressionValue, Field, Type};

pub const DOC_DOMAIN: &str = "doc";
pub const VALIDATE_DOMAIN: &str = "validate";

fn expression<'a>(domains: &'a Domains, domain: &str, name: &str) -> Option<&'a Expression> {
    domains.get(domain).and_then(|d| d.expressions.find(name))
}

fn string_directive(domains: &Domains, domain: &str, name: &str) -> Option<String> {
    expression(domains, domain, name)
        .and_then(|e| e.first_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `@<domain> output`
pub fn output_path(typ: &Type, domain: &str) -> Option<String> {
    string_directive(&typ.domains, domain, "output").map(|p| p.trim_end_matches('/').to_string())
}

/// `@<domain> omit`
pub fn is_omitted(typ: &Type, domain: &str) -> bool {
    expression(&typ.domains, domain, "omit").is_some()
}

pub fn is_field_omitted(field: &Field, domain: &str) -> bool {
    expression(&field.domains, domain, "omit").is_some()
}

/// `@<domain> name`, falling back to the declared name
pub fn type_name(typ: &Type, domain: &str) -> String {
    string_directive(&typ.domains, domain, "name").unwrap_or_else(|| typ.name.clone())
}

pub fn field_name(field: &Field, domain: &str) -> Option<String> {
    string_directive(&field.domains, domain, "name")
}

/// `@<domain> include`: hand-written location for an omitted type
pub fn include_path(typ: &Type, domain: &str) -> Option<String> {
    string_directive(&typ.domains, domain, "include")
}

pub fn namespace_override(typ: &Type, domain: &str) -> Option<String> {
    string_directive(&typ.domains, domain, "namespace")
}

/// Every `@<domain> methods` value, in declaration order
pub fn methods(typ: &Type, domain: &str) -> Vec<String> {
    all_strings(&typ.domains, domain, "methods")
}

/// Every `@<domain> import` value, in declaration order
pub fn custom_imports(typ: &Type, domain: &str) -> Vec<String> {
    all_strings(&typ.domains, domain, "import")
}

fn all_strings(domains: &Domains, domain: &str, name: &str) -> Vec<String> {
    let Some(d) = domains.get(domain) else {
        return Vec::new();
    };
    d.expressions
        .iter()
        .filter(|e| e.name == name)
        .flat_map(|e| e.values.iter().filter_map(|v| v.as_str().map(str::to_string)))
        .collect()
}

pub fn field_type_override(field: &Field, domain: &str) -> Option<String> {
    string_directive(&field.domains, domain, "type")
}

pub fn doc(typ: &Type) -> Option<String> {
    string_directive(&typ.domains, DOC_DOMAIN, "value")
}

pub fn field_doc(field: &Field) -> Option<String> {
    string_directive(&field.domains, DOC_DOMAIN, "value")
}

// =============================================================================
// Validation
// =============================================================================

/// Field validation rules from the `validate` domain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationRules {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<i64>,
    pub max_length: Option<i64>,
    pub pattern: Option<String>,
    pub email: bool,
    pub url: bool,
    pub required: bool,
    pub default: Option<ExpressionValue>,
}

impl ValidationRules {
    pub fn from_field(field: &Field) -> Self {
        let Some(domain) = field.domains.get(VALIDATE_DOMAIN) else {
            return Self::default();
        };
        let mut rules = Self::default();
        for expr in domain.expressions.iter() {
            let first = expr.values.first();
            match expr.name.as_str() {
                "min" => rules.min = first.and_then(|v| v.as_float()),
                "max" => rules.max = first.and_then(|v| v.as_float()),
                "min_length" => rules.min_length = first.and_then(|v| v.as_int()),
                "max_length" => rules.max_length = first.and_then(|v| v.as_int()),
                "pattern" => rules.pattern = first.and_then(|v| v.as_str()).map(str::to_string),
                "email" => rules.email = true,
                "url" => rules.url = true,
                "required" => rules.required = true,
                "default" => rules.default = first.cloned(),
                _ => {}
            }
        }
        rules
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
