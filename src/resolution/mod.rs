//! Resolution Table
//!
//! The in-memory table of every declared type, built once by the external analyzer
//! and read-only for the code generators.
//!
//! Architecture:
//! - Types are keyed by qualified name (`namespace.Name`) in declaration order
//! - `Form` is a closed enum; every consumer matches it exhaustively
//! - Primitives and the builtin generics (`Array`, `Map`) are registered up front
//! - Lookups fall back from qualified to unqualified names so primitives resolve
//!   from any namespace

pub mod analysis;
pub mod graph;
pub mod sort;
pub mod unified;

pub use analysis::{check_inhabitable, compute_cycles, CycleAnalysis, CycleGroup};
pub use graph::{DependencyGraph, EdgeKind};
pub use unified::{
    filter_defaulted_args, inherited_field_names, slot_params, substitute_type_ref, type_arg_map,
    unified_fields, TypeArgMap,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::{CodegenError, Result};

// =============================================================================
// Primitives
// =============================================================================

/// Every primitive registered by `Table::new`, in registration order.
pub const PRIMITIVES: &[&str] = &[
    "int8", "int16", "int32", "int64", "uint8", "uint12", "uint16", "uint20", "uint32",
    "uint64", "float32", "float64", "bool", "string", "uuid", "json", "bytes", "any",
    "timestamp", "timespan",
];

const STRING_PRIMITIVES: &[&str] = &["string", "uuid"];

const NUMBER_PRIMITIVES: &[&str] = &[
    "int8", "int16", "int32", "int64", "uint8", "uint12", "uint16", "uint20", "uint32",
    "uint64", "float32", "float64",
];

pub fn is_primitive(name: &str) -> bool {
    PRIMITIVES.contains(&name)
}

pub fn is_string_primitive(name: &str) -> bool {
    STRING_PRIMITIVES.contains(&name)
}

pub fn is_number_primitive(name: &str) -> bool {
    NUMBER_PRIMITIVES.contains(&name)
}

// =============================================================================
// Directives
// =============================================================================

/// A literal value attached to a directive expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// A bare identifier, e.g. `@cpp omit` style flags or enum references
    Ident(String),
}

impl ExpressionValue {
    /// String or identifier text, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Ident(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

/// A named directive with zero or more values, e.g. `@cpp output "client/cpp/rack"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub name: String,
    #[serde(default)]
    pub values: Vec<ExpressionValue>,
}

impl Expression {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), values: Vec::new() }
    }

    pub fn with_value(mut self, value: ExpressionValue) -> Self {
        self.values.push(value);
        self
    }

    /// First value as text
    pub fn first_str(&self) -> Option<&str> {
        self.values.first().and_then(|v| v.as_str())
    }
}

/// Ordered list of expressions within one domain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expressions(pub Vec<Expression>);

impl Expressions {
    pub fn find(&self, name: &str) -> Option<&Expression> {
        self.0.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Expression> {
        self.0.iter()
    }
}

/// Directives scoped to one target (`cpp`, `ts`, `pb`, `validate`, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    #[serde(default)]
    pub expressions: Expressions,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), expressions: Expressions::default() }
    }

    pub fn with(mut self, expression: Expression) -> Self {
        self.expressions.0.push(expression);
        self
    }

    /// Merge with a parent domain. Child expressions win; parent-only
    /// expressions are appended after the child's.
    pub fn merge(&self, parent: &Domain) -> Domain {
        let mut merged = self.clone();
        for expr in parent.expressions.iter() {
            if merged.expressions.find(&expr.name).is_none() {
                merged.expressions.0.push(expr.clone());
            }
        }
        merged
    }
}

/// Domains keyed by target name, in declaration order
pub type Domains = IndexMap<String, Domain>;

// =============================================================================
// References
// =============================================================================

/// A generic type parameter declared on a struct, alias or distinct type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParam {
    pub name: String,
    #[serde(default)]
    pub constraint: Option<TypeRef>,
    #[serde(default)]
    pub default: Option<TypeRef>,
    /// Optional without a default: becomes a target-level slot defaulting to "absent"
    #[serde(default)]
    pub optional: bool,
}

impl TypeParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), constraint: None, default: None, optional: false }
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Whether this parameter survives into the target's generic signature
    pub fn is_slot(&self) -> bool {
        !self.has_default()
    }
}

/// A reference to a declared type or to a type parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeRef {
    /// Qualified (or primitive) name of the referenced type
    #[serde(default)]
    pub name: String,
    /// Set when this reference names a type parameter of the enclosing type
    #[serde(default)]
    pub type_param: Option<Box<TypeParam>>,
    #[serde(default)]
    pub type_args: Vec<TypeRef>,
    /// Fixed length for `Array` references (`T[4]`)
    #[serde(default)]
    pub array_size: Option<u64>,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn param(param: TypeParam) -> Self {
        Self { name: param.name.clone(), type_param: Some(Box::new(param)), ..Default::default() }
    }

    pub fn array(elem: TypeRef) -> Self {
        Self { name: "Array".into(), type_args: vec![elem], ..Default::default() }
    }

    pub fn fixed_array(elem: TypeRef, size: u64) -> Self {
        Self { array_size: Some(size), ..Self::array(elem) }
    }

    pub fn map(key: TypeRef, value: TypeRef) -> Self {
        Self { name: "Map".into(), type_args: vec![key, value], ..Default::default() }
    }

    pub fn with_args(mut self, args: Vec<TypeRef>) -> Self {
        self.type_args = args;
        self
    }

    pub fn is_type_param(&self) -> bool {
        self.type_param.is_some()
    }

    pub fn is_array(&self) -> bool {
        self.type_param.is_none() && self.name == BuiltinGeneric::Array.as_str()
    }

    pub fn is_map(&self) -> bool {
        self.type_param.is_none() && self.name == BuiltinGeneric::Map.as_str()
    }

    /// Resolve against the table, following type parameter defaults
    pub fn resolve<'a>(&self, table: &'a Table) -> Option<&'a Type> {
        table.resolve_ref(self, "")
    }

    pub fn must_resolve<'a>(&self, table: &'a Table) -> Result<&'a Type> {
        self.resolve(table).ok_or_else(|| CodegenError::TypeNotFound { name: self.name.clone() })
    }
}

// =============================================================================
// Fields & Forms
// =============================================================================

/// A struct field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
    /// `?`: may be absent, same representation otherwise
    #[serde(default)]
    pub is_optional: bool,
    /// `??`: wrapped in an explicit optional/nullable container
    #[serde(default)]
    pub is_hard_optional: bool,
    #[serde(default)]
    pub domains: Domains,
}

impl Field {
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self {
            name: name.into(),
            type_ref,
            is_optional: false,
            is_hard_optional: false,
            domains: Domains::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    pub fn hard_optional(mut self) -> Self {
        self.is_hard_optional = true;
        self
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domains.insert(domain.name.clone(), domain);
        self
    }

    pub fn is_any_optional(&self) -> bool {
        self.is_optional || self.is_hard_optional
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructForm {
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub type_params: Vec<TypeParam>,
    #[serde(default)]
    pub extends: Vec<TypeRef>,
    /// Inherited field names deleted by this struct
    #[serde(default)]
    pub omitted_fields: Vec<String>,
    #[serde(default)]
    pub is_recursive: bool,
}

impl StructForm {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    pub fn type_param(&self, name: &str) -> Option<&TypeParam> {
        self.type_params.iter().find(|p| p.name == name)
    }

    pub fn is_field_omitted(&self, name: &str) -> bool {
        self.omitted_fields.iter().any(|f| f == name)
    }
}

/// Value of an enum member: integer enums carry ints, string enums carry strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumLiteral {
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    pub value: EnumLiteral,
    #[serde(default)]
    pub doc: Option<String>,
}

impl EnumValue {
    pub fn int(name: impl Into<String>, value: i64) -> Self {
        Self { name: name.into(), value: EnumLiteral::Int(value), doc: None }
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: EnumLiteral::Str(value.into()), doc: None }
    }

    /// The string literal, or an empty string for int members
    pub fn string_value(&self) -> &str {
        match &self.value {
            EnumLiteral::Str(s) => s,
            EnumLiteral::Int(_) => "",
        }
    }

    /// The int literal, or zero for string members
    pub fn int_value(&self) -> i64 {
        match &self.value {
            EnumLiteral::Int(i) => *i,
            EnumLiteral::Str(_) => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumForm {
    #[serde(default)]
    pub values: Vec<EnumValue>,
    #[serde(default)]
    pub is_int_enum: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AliasForm {
    pub target: TypeRef,
    #[serde(default)]
    pub type_params: Vec<TypeParam>,
}

impl AliasForm {
    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    pub fn type_param(&self, name: &str) -> Option<&TypeParam> {
        self.type_params.iter().find(|p| p.name == name)
    }
}

/// A nominal wrapper over exactly one base type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistinctForm {
    pub base: TypeRef,
    #[serde(default)]
    pub type_params: Vec<TypeParam>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinGeneric {
    Array,
    Map,
}

impl BuiltinGeneric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Array => "Array",
            Self::Map => "Map",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Self::Array => 1,
            Self::Map => 2,
        }
    }
}

/// The shape of a declared type. Exactly one per type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Form {
    Primitive { name: String },
    Struct(StructForm),
    Enum(EnumForm),
    Alias(AliasForm),
    Distinct(DistinctForm),
    BuiltinGeneric { name: BuiltinGeneric, arity: usize },
}

impl Form {
    /// Type parameters declared by this form, if it can declare any
    pub fn type_params(&self) -> &[TypeParam] {
        match self {
            Form::Struct(s) => &s.type_params,
            Form::Alias(a) => &a.type_params,
            Form::Distinct(d) => &d.type_params,
            Form::Primitive { .. } | Form::Enum(_) | Form::BuiltinGeneric { .. } => &[],
        }
    }
}

// =============================================================================
// Type
// =============================================================================

/// A declared type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Type {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Globally unique identity (`namespace.Name`, or the bare name for builtins)
    pub qualified_name: String,
    pub form: Form,
    #[serde(default)]
    pub domains: Domains,
    /// Schema file the type was declared in
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

impl Type {
    pub fn new(namespace: &str, name: &str, form: Form) -> Self {
        let qualified_name = if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", namespace, name)
        };
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            qualified_name,
            form,
            domains: Domains::new(),
            file_path: None,
        }
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domains.insert(domain.name.clone(), domain);
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn as_struct(&self) -> Option<&StructForm> {
        match &self.form {
            Form::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumForm> {
        match &self.form {
            Form::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.form, Form::Struct(_))
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.form, Form::Enum(_))
    }

    pub fn is_alias(&self) -> bool {
        matches!(self.form, Form::Alias(_))
    }

    pub fn is_distinct(&self) -> bool {
        matches!(self.form, Form::Distinct(_))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.form, Form::Primitive { .. })
    }

    pub fn is_builtin_generic(&self) -> bool {
        matches!(self.form, Form::BuiltinGeneric { .. })
    }
}

// =============================================================================
// Table
// =============================================================================

/// Serialized table shape produced by the analyzer
#[derive(Debug, Deserialize)]
struct TableSnapshot {
    #[serde(default)]
    types: Vec<Type>,
    #[serde(default)]
    imports: Vec<String>,
}

/// All declared types, indexed by qualified name in declaration order
#[derive(Debug, Clone)]
pub struct Table {
    types: IndexMap<String, Type>,
    imports: BTreeSet<String>,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    /// Create a table with primitives and builtin generics registered
    pub fn new() -> Self {
        let mut types = IndexMap::new();
        for name in PRIMITIVES {
            types.insert(
                name.to_string(),
                Type::new("", name, Form::Primitive { name: name.to_string() }),
            );
        }
        for generic in [BuiltinGeneric::Array, BuiltinGeneric::Map] {
            types.insert(
                generic.as_str().to_string(),
                Type::new("", generic.as_str(), Form::BuiltinGeneric { name: generic, arity: generic.arity() }),
            );
        }
        Self { types, imports: BTreeSet::new() }
    }

    /// Build a table from the analyzer's JSON output
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: TableSnapshot = serde_json::from_str(json)?;
        let mut table = Self::new();
        for typ in snapshot.types {
            table.add(typ)?;
        }
        for path in snapshot.imports {
            table.mark_imported(path);
        }
        Ok(table)
    }

    /// Register a type. Qualified names must be unique.
    pub fn add(&mut self, typ: Type) -> Result<()> {
        if self.types.contains_key(&typ.qualified_name) {
            return Err(CodegenError::DuplicateType { qualified_name: typ.qualified_name });
        }
        self.types.insert(typ.qualified_name.clone(), typ);
        Ok(())
    }

    pub fn get(&self, qualified_name: &str) -> Option<&Type> {
        self.types.get(qualified_name)
    }

    pub fn must_get(&self, qualified_name: &str) -> Result<&Type> {
        self.get(qualified_name)
            .ok_or_else(|| CodegenError::TypeNotFound { name: qualified_name.to_string() })
    }

    /// Look up `namespace.name`, falling back to the unqualified name
    pub fn lookup(&self, namespace: &str, name: &str) -> Option<&Type> {
        if !namespace.is_empty() {
            if let Some(typ) = self.types.get(&format!("{}.{}", namespace, name)) {
                return Some(typ);
            }
        }
        self.types.get(name)
    }

    /// Resolve a reference from within `namespace`.
    ///
    /// Type parameters resolve through their default; a parameter without one
    /// is unresolved. Named references try the qualified name, then the
    /// same-namespace name, then the unqualified name.
    pub fn resolve_ref(&self, type_ref: &TypeRef, namespace: &str) -> Option<&Type> {
        if let Some(param) = &type_ref.type_param {
            return param.default.as_ref().and_then(|d| self.resolve_ref(d, namespace));
        }
        if let Some(typ) = self.types.get(&type_ref.name) {
            return Some(typ);
        }
        self.lookup(namespace, &type_ref.name)
    }

    /// Every type in declaration order, builtins first
    pub fn types(&self) -> impl Iterator<Item = &Type> {
        self.types.values()
    }

    /// Declared types, excluding primitives and builtin generics
    pub fn declared(&self) -> impl Iterator<Item = &Type> {
        self.types.values().filter(|t| !t.is_primitive() && !t.is_builtin_generic())
    }

    pub fn struct_types(&self) -> Vec<&Type> {
        self.types.values().filter(|t| t.is_struct()).collect()
    }

    pub fn enum_types(&self) -> Vec<&Type> {
        self.types.values().filter(|t| t.is_enum()).collect()
    }

    pub fn distinct_types(&self) -> Vec<&Type> {
        self.types.values().filter(|t| t.is_distinct()).collect()
    }

    pub fn alias_types(&self) -> Vec<&Type> {
        self.types.values().filter(|t| t.is_alias()).collect()
    }

    pub fn types_in_namespace(&self, namespace: &str) -> Vec<&Type> {
        self.types.values().filter(|t| t.namespace == namespace).collect()
    }

    pub fn structs_in_namespace(&self, namespace: &str) -> Vec<&Type> {
        self.types.values().filter(|t| t.namespace == namespace && t.is_struct()).collect()
    }

    pub fn enums_in_namespace(&self, namespace: &str) -> Vec<&Type> {
        self.types.values().filter(|t| t.namespace == namespace && t.is_enum()).collect()
    }

    pub fn types_with_domain(&self, domain: &str) -> Vec<&Type> {
        self.types.values().filter(|t| t.domains.contains_key(domain)).collect()
    }

    pub fn is_primitive_type(&self, name: &str) -> bool {
        self.get(name).map(|t| t.is_primitive()).unwrap_or(false)
    }

    pub fn is_string_primitive_type(&self, name: &str) -> bool {
        self.is_primitive_type(name) && is_string_primitive(name)
    }

    pub fn is_number_primitive_type(&self, name: &str) -> bool {
        self.is_primitive_type(name) && is_number_primitive(name)
    }

    /// Record a schema import path. Analyzer-side only.
    pub fn mark_imported(&mut self, path: impl Into<String>) {
        self.imports.insert(path.into());
    }

    pub fn is_imported(&self, path: &str) -> bool {
        self.imports.contains(path)
    }

    /// Sort a subset so dependencies precede dependents. See [`sort`].
    pub fn topological_sort<'a>(&'a self, types: &[&'a Type]) -> Vec<&'a Type> {
        sort::topological_sort(self, types)
    }
}
