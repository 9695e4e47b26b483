//! Type Reference Resolver
//!
//! Shared lowering of a `TypeRef` into target syntax. Each backend supplies the
//! language-specific pieces through three traits:
//! - `TypeFormatter`: qualification, generics, arrays, maps, fallback
//! - `PrimitiveMapper`: primitive name -> target type plus required imports
//! - `ImportResolver`: output location of a referenced type -> import + qualifier
//!
//! Imports are reported to an `ImportAdder` owned by the file being generated.

use tracing::{debug, warn};

use super::directives;
use crate::error::{CodegenError, Result};
use crate::resolution::{filter_defaulted_args, slot_params, Form, Table, Type, TypeParam, TypeRef};

// =============================================================================
// Contract
// =============================================================================

/// An import required by generated code
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Import {
    /// Backend-defined bucket (`system`, `internal`, `named`, ...)
    pub category: String,
    pub path: String,
    /// Imported symbol or alias, for targets that import names
    pub name: Option<String>,
}

impl Import {
    pub fn new(category: &str, path: &str) -> Self {
        Self { category: category.to_string(), path: path.to_string(), name: None }
    }

    pub fn named(category: &str, path: &str, name: &str) -> Self {
        Self { category: category.to_string(), path: path.to_string(), name: Some(name.to_string()) }
    }
}

/// Target type for a primitive and the imports it needs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    pub target_type: String,
    pub imports: Vec<Import>,
}

impl Mapping {
    pub fn plain(target_type: &str) -> Self {
        Self { target_type: target_type.to_string(), imports: Vec::new() }
    }

    pub fn with_import(mut self, import: Import) -> Self {
        self.imports.push(import);
        self
    }
}

pub trait PrimitiveMapper {
    fn map_primitive(&self, name: &str) -> Mapping;
}

pub trait TypeFormatter {
    fn format_qualified(&self, qualifier: &str, type_name: &str) -> String;
    fn format_generic(&self, base: &str, args: &[String]) -> String;
    fn format_array(&self, elem: &str) -> String;
    fn format_fixed_array(&self, elem: &str, size: u64) -> String;
    fn format_map(&self, key: &str, value: &str) -> String;
    /// Representation of an unresolved reference
    fn fallback_type(&self) -> String;

    /// Name a declared type is referenced by in this target
    fn type_name(&self, typ: &Type, domain: &str) -> String {
        directives::type_name(typ, domain)
    }

    /// Rendering of an unsubstituted type parameter
    fn format_type_param(&self, param: &TypeParam, _imports: &mut dyn ImportAdder) -> String {
        param.name.clone()
    }

    /// Reference to a declared type. `params` are the slots the rendered
    /// `args` fill, in order.
    fn format_instantiation(&self, base: &str, _params: &[&TypeParam], args: &[String]) -> String {
        if args.is_empty() {
            base.to_string()
        } else {
            self.format_generic(base, args)
        }
    }

    /// Targets without aliasing render aliases and distincts as their underlying type
    fn expands_aliases(&self) -> bool {
        false
    }

    /// Import needed by the rendering of a container
    fn container_import(&self, _container: Container) -> Option<Import> {
        None
    }
}

/// Builtin container shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Array,
    FixedArray,
    Map,
}

/// Where a referenced type lives for the current target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportLocation<'a> {
    /// Generated output path of the referenced type
    Generated(&'a str),
    /// Hand-written include path of an omitted type
    Handwritten(&'a str),
}

/// Import path and the qualifier used to reference names through it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    pub import: Import,
    pub qualifier: String,
}

pub trait ImportResolver {
    fn resolve_import(&self, location: ImportLocation<'_>, target: &Type, ctx: &Context<'_>) -> ResolvedImport;

    /// Generated location of `typ` for this target
    fn output_path(&self, typ: &Type, ctx: &Context<'_>) -> Option<String> {
        directives::output_path(typ, &ctx.domain_name)
    }
}

pub trait ImportAdder {
    fn add_import(&mut self, import: Import);
}

impl ImportAdder for Vec<Import> {
    fn add_import(&mut self, import: Import) {
        if !self.contains(&import) {
            self.push(import);
        }
    }
}

/// Per-file resolution context
#[derive(Debug, Clone)]
pub struct Context<'a> {
    pub table: &'a Table,
    /// Output path of the file being generated
    pub output_path: String,
    /// Namespace of the file being generated
    pub namespace: String,
    /// Directive domain of the backend (`cpp`, `ts`, `pb`)
    pub domain_name: String,
    /// Resolve defaulted type params to their default instead of their name
    pub substitute_defaulted_type_params: bool,
}

impl<'a> Context<'a> {
    pub fn new(table: &'a Table, output_path: &str, namespace: &str, domain_name: &str) -> Self {
        Self {
            table,
            output_path: output_path.to_string(),
            namespace: namespace.to_string(),
            domain_name: domain_name.to_string(),
            substitute_defaulted_type_params: true,
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Target-agnostic `TypeRef` lowering over a backend's formatter pieces
pub struct Resolver<'r> {
    pub formatter: &'r dyn TypeFormatter,
    pub imports: &'r dyn ImportResolver,
    pub primitives: &'r dyn PrimitiveMapper,
}

impl<'r> Resolver<'r> {
    /// Resolver over a backend that implements every piece itself
    pub fn for_backend<B>(backend: &'r B) -> Self
    where
        B: TypeFormatter + ImportResolver + PrimitiveMapper,
    {
        Self { formatter: backend, imports: backend, primitives: backend }
    }

    /// Render `type_ref` for the file described by `ctx`.
    ///
    /// Unresolved references fall back to the formatter's fallback type.
    /// Cross-file references to types that are neither generated nor
    /// hand-written for this target are an error.
    pub fn resolve_type_ref(&self, type_ref: &TypeRef, ctx: &Context<'_>, adder: &mut dyn ImportAdder) -> Result<String> {
        if let Some(param) = &type_ref.type_param {
            if ctx.substitute_defaulted_type_params {
                if let Some(default) = &param.default {
                    return self.resolve_type_ref(default, ctx, adder);
                }
            }
            return Ok(self.formatter.format_type_param(param, adder));
        }

        let Some(resolved) = ctx.table.resolve_ref(type_ref, &ctx.namespace) else {
            warn!(reference = %type_ref.name, file = %ctx.output_path, "unresolved type reference");
            return Ok(self.formatter.fallback_type());
        };

        match &resolved.form {
            Form::Primitive { name } => {
                let mapping = self.primitives.map_primitive(name);
                for import in mapping.imports {
                    adder.add_import(import);
                }
                Ok(mapping.target_type)
            }
            Form::BuiltinGeneric { .. } if type_ref.is_array() => {
                let elem = match type_ref.type_args.first() {
                    Some(arg) => self.resolve_type_ref(arg, ctx, adder)?,
                    None => self.formatter.fallback_type(),
                };
                let (container, rendered) = match type_ref.array_size {
                    Some(size) => (Container::FixedArray, self.formatter.format_fixed_array(&elem, size)),
                    None => (Container::Array, self.formatter.format_array(&elem)),
                };
                if let Some(import) = self.formatter.container_import(container) {
                    adder.add_import(import);
                }
                Ok(rendered)
            }
            Form::BuiltinGeneric { .. } => {
                let key = match type_ref.type_args.first() {
                    Some(arg) => self.resolve_type_ref(arg, ctx, adder)?,
                    None => self.formatter.fallback_type(),
                };
                let value = match type_ref.type_args.get(1) {
                    Some(arg) => self.resolve_type_ref(arg, ctx, adder)?,
                    None => self.formatter.fallback_type(),
                };
                if let Some(import) = self.formatter.container_import(Container::Map) {
                    adder.add_import(import);
                }
                Ok(self.formatter.format_map(&key, &value))
            }
            Form::Alias(alias) if self.formatter.expands_aliases() => {
                let target = crate::resolution::substitute_type_ref(
                    &alias.target,
                    &crate::resolution::type_arg_map(&alias.type_params, &type_ref.type_args),
                );
                self.resolve_type_ref(&target, ctx, adder)
            }
            Form::Distinct(distinct) if self.formatter.expands_aliases() => {
                let base = crate::resolution::substitute_type_ref(
                    &distinct.base,
                    &crate::resolution::type_arg_map(&distinct.type_params, &type_ref.type_args),
                );
                self.resolve_type_ref(&base, ctx, adder)
            }
            Form::Struct(_) | Form::Enum(_) | Form::Alias(_) | Form::Distinct(_) => {
                let name = self.qualified_name(resolved, ctx, adder)?;
                let params = resolved.form.type_params();
                let (slots, args) = if ctx.substitute_defaulted_type_params {
                    (slot_params(params), filter_defaulted_args(params, &type_ref.type_args))
                } else {
                    (params.iter().collect(), type_ref.type_args.clone())
                };
                let rendered = args
                    .iter()
                    .map(|a| self.resolve_type_ref(a, ctx, adder))
                    .collect::<Result<Vec<_>>>()?;
                Ok(self.formatter.format_instantiation(&name, &slots, &rendered))
            }
        }
    }

    /// Name of a declared type as seen from the current file, adding the
    /// import it needs when it lives elsewhere
    pub fn qualified_name(&self, typ: &Type, ctx: &Context<'_>, adder: &mut dyn ImportAdder) -> Result<String> {
        let name = self.formatter.type_name(typ, &ctx.domain_name);
        let domain = ctx.domain_name.as_str();
        let omitted = directives::is_omitted(typ, domain);
        let output = self.imports.output_path(typ, ctx);

        let location = match (omitted, output.as_deref(), directives::include_path(typ, domain)) {
            (false, Some(path), _) if path == ctx.output_path => return Ok(name),
            (false, Some(path), _) => Some(ImportLocation::Generated(path)),
            (_, _, Some(ref include)) => {
                let resolved = self.imports.resolve_import(ImportLocation::Handwritten(include), typ, ctx);
                adder.add_import(resolved.import);
                return Ok(self.formatter.format_qualified(&resolved.qualifier, &name));
            }
            _ => None,
        };

        match location {
            Some(location) => {
                let resolved = self.imports.resolve_import(location, typ, ctx);
                adder.add_import(resolved.import);
                Ok(self.formatter.format_qualified(&resolved.qualifier, &name))
            }
            None if typ.namespace == ctx.namespace => {
                debug!(
                    type_name = %typ.qualified_name,
                    target = domain,
                    "referenced type has no output for this target"
                );
                Ok(name)
            }
            None => Err(CodegenError::UnreachableCrossNamespace {
                type_name: ctx.namespace.clone(),
                referenced: typ.qualified_name.clone(),
                target: domain.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::{AliasForm, DistinctForm, Domain, EnumForm, Expression, ExpressionValue, StructForm};

    /// Go-like syntax for exercising the resolver without a real backend
    #[derive(Default)]
    struct GoLike {
        expand: bool,
    }

    impl TypeFormatter for GoLike {
        fn format_qualified(&self, qualifier: &str, type_name: &str) -> String {
            if qualifier.is_empty() {
                type_name.to_string()
            } else {
                format!("{}.{}", qualifier, type_name)
            }
        }
        fn format_generic(&self, base: &str, args: &[String]) -> String {
            format!("{}[{}]", base, args.join(", "))
        }
        fn format_array(&self, elem: &str) -> String {
            format!("[]{}", elem)
        }
        fn format_fixed_array(&self, elem: &str, size: u64) -> String {
            format!("[{}]{}", size, elem)
        }
        fn format_map(&self, key: &str, value: &str) -> String {
            format!("map[{}]{}", key, value)
        }
        fn fallback_type(&self) -> String {
            "any".into()
        }
        fn expands_aliases(&self) -> bool {
            self.expand
        }
    }

    impl PrimitiveMapper for GoLike {
        fn map_primitive(&self, name: &str) -> Mapping {
            match name {
                "string" | "int32" | "bool" => Mapping::plain(name),
                "uuid" => Mapping::plain("uuid.UUID").with_import(Import::new("external", "github.com/google/uuid")),
                _ => Mapping::plain("any"),
            }
        }
    }

    impl ImportResolver for GoLike {
        fn resolve_import(&self, location: ImportLocation<'_>, target: &Type, _ctx: &Context<'_>) -> ResolvedImport {
            let path = match location {
                ImportLocation::Generated(p) | ImportLocation::Handwritten(p) => p,
            };
            ResolvedImport {
                import: Import::named("internal", &format!("github.com/example/{}", path), &target.namespace),
                qualifier: target.namespace.clone(),
            }
        }
    }

    fn output(path: &str) -> Domain {
        Domain::new("go").with(Expression::new("output").with_value(ExpressionValue::String(path.into())))
    }

    fn table() -> Table {
        let mut table = Table::new();
        table
            .add(Type::new("test", "MyStruct", Form::Struct(StructForm::default())).with_domain(output("pkg")))
            .unwrap();
        let mut v = TypeParam::new("V");
        v.default = Some(TypeRef::named("string"));
        table
            .add(
                Type::new("test", "Defaulted", Form::Struct(StructForm {
                    type_params: vec![TypeParam::new("T"), v],
                    ..Default::default()
                }))
                .with_domain(output("pkg")),
            )
            .unwrap();
        table
            .add(Type::new("other", "External", Form::Enum(EnumForm::default())).with_domain(output("external")))
            .unwrap();
        table.add(Type::new("other", "NoOutput", Form::Struct(StructForm::default()))).unwrap();
        table
            .add(
                Type::new("test", "Alias", Form::Alias(AliasForm { target: TypeRef::named("string"), type_params: vec![] }))
                    .with_domain(output("pkg")),
            )
            .unwrap();
        table
    }

    fn resolve(table: &Table, type_ref: &TypeRef) -> (Result<String>, Vec<Import>) {
        let ctx = Context::new(table, "pkg", "test", "go");
        let mut imports = Vec::new();
        let result = Resolver::for_backend(&GoLike::default()).resolve_type_ref(type_ref, &ctx, &mut imports);
        (result, imports)
    }

    #[test]
    fn test_arrays_and_maps() {
        let table = table();
        let nested = TypeRef::array(TypeRef::array(TypeRef::named("int32")));
        assert_eq!(resolve(&table, &nested).0.unwrap(), "[][]int32");
        assert_eq!(resolve(&table, &TypeRef::fixed_array(TypeRef::named("int32"), 4)).0.unwrap(), "[4]int32");
        let map = TypeRef::map(TypeRef::named("string"), TypeRef::named("int32"));
        assert_eq!(resolve(&table, &map).0.unwrap(), "map[string]int32");
    }

    #[test]
    fn test_primitive_imports() {
        let table = table();
        let (result, imports) = resolve(&table, &TypeRef::named("uuid"));
        assert_eq!(result.unwrap(), "uuid.UUID");
        assert_eq!(imports[0].path, "github.com/google/uuid");
        let (_, imports) = resolve(&table, &TypeRef::named("string"));
        assert!(imports.is_empty());
    }

    #[test]
    fn test_type_params() {
        let table = table();
        let mut v = TypeParam::new("V");
        v.default = Some(TypeRef::named("string"));
        assert_eq!(resolve(&table, &TypeRef::param(v.clone())).0.unwrap(), "string");

        let ctx = Context { substitute_defaulted_type_params: false, ..Context::new(&table, "pkg", "test", "go") };
        let mut imports = Vec::new();
        let result = Resolver::for_backend(&GoLike::default()).resolve_type_ref(&TypeRef::param(v), &ctx, &mut imports);
        assert_eq!(result.unwrap(), "V");
    }

    #[test]
    fn test_same_file_and_defaulted_args() {
        let table = table();
        assert_eq!(resolve(&table, &TypeRef::named("test.MyStruct")).0.unwrap(), "MyStruct");
        assert_eq!(resolve(&table, &TypeRef::named("test.Alias")).0.unwrap(), "Alias");
        let generic = TypeRef::named("test.Defaulted").with_args(vec![TypeRef::named("int32"), TypeRef::named("bool")]);
        assert_eq!(resolve(&table, &generic).0.unwrap(), "Defaulted[int32]");
    }

    #[test]
    fn test_cross_namespace_import() {
        let table = table();
        let (result, imports) = resolve(&table, &TypeRef::named("other.External"));
        assert_eq!(result.unwrap(), "other.External");
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].path, "github.com/example/external");
        assert_eq!(imports[0].name.as_deref(), Some("other"));
    }

    #[test]
    fn test_unreachable_cross_namespace_is_error() {
        let table = table();
        match resolve(&table, &TypeRef::named("other.NoOutput")).0 {
            Err(CodegenError::UnreachableCrossNamespace { referenced, .. }) => {
                assert_eq!(referenced, "other.NoOutput")
            }
            other => panic!("Expected UnreachableCrossNamespace, got {:?}", other),
        }
    }

    #[test]
    fn test_unresolved_falls_back() {
        let table = table();
        assert_eq!(resolve(&table, &TypeRef::named("missing.Type")).0.unwrap(), "any");
    }

    #[test]
    fn test_expanded_generic_distinct_substitutes_args() {
        let mut table = table();
        let t = TypeParam::new("T");
        table
            .add(
                Type::new("test", "Ids", Form::Distinct(DistinctForm {
                    base: TypeRef::array(TypeRef::param(t.clone())),
                    type_params: vec![t.clone()],
                }))
                .with_domain(output("pkg")),
            )
            .unwrap();
        table
            .add(
                Type::new("test", "Boxed", Form::Alias(AliasForm {
                    target: TypeRef::map(TypeRef::named("string"), TypeRef::param(t.clone())),
                    type_params: vec![t],
                }))
                .with_domain(output("pkg")),
            )
            .unwrap();

        let ctx = Context::new(&table, "pkg", "test", "go");
        let expanding = GoLike { expand: true };
        let resolver = Resolver::for_backend(&expanding);
        let mut imports = Vec::new();
        let ids = TypeRef::named("test.Ids").with_args(vec![TypeRef::named("int32")]);
        assert_eq!(resolver.resolve_type_ref(&ids, &ctx, &mut imports).unwrap(), "[]int32");
        let boxed = TypeRef::named("test.Boxed").with_args(vec![TypeRef::named("bool")]);
        assert_eq!(resolver.resolve_type_ref(&boxed, &ctx, &mut imports).unwrap(), "map[string]bool");

        assert_eq!(resolve(&table, &ids).0.unwrap(), "Ids[int32]");
    }
}
