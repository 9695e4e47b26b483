//! Field unification and generic substitution
//!
//! `unified_fields` flattens an extends chain into a single ordered field list:
//! inherited fields first (bases left to right, each with its generic arguments
//! substituted), deleted fields dropped, then the struct's own fields. An own
//! field with an inherited name drops the inherited one and takes its place
//! among the own fields.

use indexmap::IndexMap;

use super::{Field, Table, Type, TypeParam, TypeRef};

/// Type parameter name -> concrete argument
pub type TypeArgMap = IndexMap<String, TypeRef>;

/// Replace type parameter references with their arguments, recursively.
/// Parameters missing from `args` are left as they are.
pub fn substitute_type_ref(type_ref: &TypeRef, args: &TypeArgMap) -> TypeRef {
    if let Some(param) = &type_ref.type_param {
        if let Some(arg) = args.get(&param.name) {
            return arg.clone();
        }
        return type_ref.clone();
    }
    if type_ref.type_args.is_empty() {
        return type_ref.clone();
    }
    TypeRef {
        type_args: type_ref.type_args.iter().map(|a| substitute_type_ref(a, args)).collect(),
        ..type_ref.clone()
    }
}

/// Pair parameters with arguments. A missing argument falls back to the
/// parameter's default; a parameter with neither stays unbound.
pub fn type_arg_map(params: &[TypeParam], args: &[TypeRef]) -> TypeArgMap {
    let mut map = TypeArgMap::new();
    for (i, param) in params.iter().enumerate() {
        if let Some(arg) = args.get(i) {
            map.insert(param.name.clone(), arg.clone());
        } else if let Some(default) = &param.default {
            map.insert(param.name.clone(), default.clone());
        }
    }
    map
}

/// Drop arguments whose parameter carries an explicit default. Those are
/// substituted inline and never reach the target's generic signature.
/// Arguments for merely optional parameters pass through.
pub fn filter_defaulted_args(params: &[TypeParam], args: &[TypeRef]) -> Vec<TypeRef> {
    args.iter()
        .enumerate()
        .filter(|(i, _)| params.get(*i).map(|p| !p.has_default()).unwrap_or(true))
        .map(|(_, a)| a.clone())
        .collect()
}

/// Parameters that survive as target-level generic slots
pub fn slot_params(params: &[TypeParam]) -> Vec<&TypeParam> {
    params.iter().filter(|p| p.is_slot()).collect()
}

/// Flattened fields of a struct. Non-structs have none.
pub fn unified_fields(typ: &Type, table: &Table) -> Vec<Field> {
    let mut visiting = Vec::new();
    unify(typ, table, &TypeArgMap::new(), &mut visiting)
}

fn unify(typ: &Type, table: &Table, args: &TypeArgMap, visiting: &mut Vec<String>) -> Vec<Field> {
    let Some(form) = typ.as_struct() else {
        return Vec::new();
    };
    // A struct reachable from its own extends chain contributes nothing twice
    if visiting.contains(&typ.qualified_name) {
        return Vec::new();
    }
    visiting.push(typ.qualified_name.clone());

    let mut fields: Vec<Field> = Vec::new();
    for base in &form.extends {
        let base = substitute_type_ref(base, args);
        let Some(parent) = table.resolve_ref(&base, &typ.namespace) else {
            continue;
        };
        let parent_args = type_arg_map(parent.form.type_params(), &base.type_args);
        for inherited in unify(parent, table, &parent_args, visiting) {
            override_field(&mut fields, inherited);
        }
    }

    fields.retain(|f| !form.is_field_omitted(&f.name));

    for own in &form.fields {
        let mut field = own.clone();
        field.type_ref = substitute_type_ref(&own.type_ref, args);
        override_field(&mut fields, field);
    }

    visiting.pop();
    fields
}

/// Remove any same-name field, then append
fn override_field(fields: &mut Vec<Field>, field: Field) {
    fields.retain(|f| f.name != field.name);
    fields.push(field);
}

/// Field names a struct inherits from its bases (after deletion)
pub fn inherited_field_names(typ: &Type, table: &Table) -> Vec<String> {
    let Some(form) = typ.as_struct() else {
        return Vec::new();
    };
    let own: Vec<&str> = form.fields.iter().map(|f| f.name.as_str()).collect();
    unified_fields(typ, table)
        .into_iter()
        .filter(|f| !own.contains(&f.name.as_str()))
        .map(|f| f.name)
        .collect()
}
