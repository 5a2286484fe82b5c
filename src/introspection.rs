use std::collections::HashMap;

use graphql_parser::schema::{Definition, Document, Type, TypeDefinition};
use serde_json::{json, Value};

use crate::ast::operation::OperationKind;
use crate::schema_metadata::SchemaMetadata;

const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

/// Builds the `__schema` value the shaping pass serves for introspection
/// queries, so `__schema` / `__type` never reach a downstream service.
pub(crate) fn schema_root_json(document: &Document<'_, String>) -> Value {
    let mut kinds: HashMap<String, &'static str> = BUILTIN_SCALARS
        .iter()
        .map(|name| (name.to_string(), "SCALAR"))
        .collect();
    let mut implementers: HashMap<String, Vec<String>> = HashMap::new();
    let mut query_type = None;
    let mut mutation_type = None;
    let mut subscription_type = None;

    for definition in &document.definitions {
        match definition {
            Definition::SchemaDefinition(schema) => {
                query_type = schema.query.clone();
                mutation_type = schema.mutation.clone();
                subscription_type = schema.subscription.clone();
            }
            Definition::TypeDefinition(type_definition) => {
                let (name, kind) = match type_definition {
                    TypeDefinition::Scalar(scalar) => (&scalar.name, "SCALAR"),
                    TypeDefinition::Object(object) => (&object.name, "OBJECT"),
                    TypeDefinition::Interface(interface) => (&interface.name, "INTERFACE"),
                    TypeDefinition::Union(union) => (&union.name, "UNION"),
                    TypeDefinition::Enum(enum_type) => (&enum_type.name, "ENUM"),
                    TypeDefinition::InputObject(input) => (&input.name, "INPUT_OBJECT"),
                };
                kinds.insert(name.clone(), kind);
                match type_definition {
                    TypeDefinition::Object(object) => {
                        for interface in &object.implements_interfaces {
                            implementers
                                .entry(interface.clone())
                                .or_default()
                                .push(object.name.clone());
                        }
                    }
                    TypeDefinition::Interface(interface) => {
                        for implemented in &interface.implements_interfaces {
                            implementers
                                .entry(implemented.clone())
                                .or_default()
                                .push(interface.name.clone());
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    let mut types: Vec<Value> = BUILTIN_SCALARS
        .iter()
        .map(|name| scalar_json(name, &None))
        .collect();
    for definition in &document.definitions {
        let Definition::TypeDefinition(type_definition) = definition else {
            continue;
        };
        types.push(match type_definition {
            TypeDefinition::Scalar(scalar) => scalar_json(&scalar.name, &scalar.description),
            TypeDefinition::Object(object) => json!({
                "kind": "OBJECT",
                "name": object.name,
                "description": object.description,
                "fields": object
                    .fields
                    .iter()
                    .map(|field| field_json(field, &kinds))
                    .collect::<Vec<_>>(),
                "interfaces": object
                    .implements_interfaces
                    .iter()
                    .map(|interface| named_ref(interface, &kinds))
                    .collect::<Vec<_>>(),
                "possibleTypes": Value::Null,
                "enumValues": Value::Null,
                "inputFields": Value::Null,
                "ofType": Value::Null,
            }),
            TypeDefinition::Interface(interface) => json!({
                "kind": "INTERFACE",
                "name": interface.name,
                "description": interface.description,
                "fields": interface
                    .fields
                    .iter()
                    .map(|field| field_json(field, &kinds))
                    .collect::<Vec<_>>(),
                "interfaces": interface
                    .implements_interfaces
                    .iter()
                    .map(|implemented| named_ref(implemented, &kinds))
                    .collect::<Vec<_>>(),
                "possibleTypes": implementers
                    .get(&interface.name)
                    .map(|members| {
                        members
                            .iter()
                            .map(|member| named_ref(member, &kinds))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default(),
                "enumValues": Value::Null,
                "inputFields": Value::Null,
                "ofType": Value::Null,
            }),
            TypeDefinition::Union(union) => json!({
                "kind": "UNION",
                "name": union.name,
                "description": union.description,
                "fields": Value::Null,
                "interfaces": Value::Null,
                "possibleTypes": union
                    .types
                    .iter()
                    .map(|member| named_ref(member, &kinds))
                    .collect::<Vec<_>>(),
                "enumValues": Value::Null,
                "inputFields": Value::Null,
                "ofType": Value::Null,
            }),
            TypeDefinition::Enum(enum_type) => json!({
                "kind": "ENUM",
                "name": enum_type.name,
                "description": enum_type.description,
                "fields": Value::Null,
                "interfaces": Value::Null,
                "possibleTypes": Value::Null,
                "enumValues": enum_type
                    .values
                    .iter()
                    .map(|value| json!({
                        "name": value.name,
                        "description": value.description,
                        "isDeprecated": false,
                        "deprecationReason": Value::Null,
                    }))
                    .collect::<Vec<_>>(),
                "inputFields": Value::Null,
                "ofType": Value::Null,
            }),
            TypeDefinition::InputObject(input) => json!({
                "kind": "INPUT_OBJECT",
                "name": input.name,
                "description": input.description,
                "fields": Value::Null,
                "interfaces": Value::Null,
                "possibleTypes": Value::Null,
                "enumValues": Value::Null,
                "inputFields": input
                    .fields
                    .iter()
                    .map(|field| input_value_json(field, &kinds))
                    .collect::<Vec<_>>(),
                "ofType": Value::Null,
            }),
        });
    }

    let root_ref = |name: Option<String>, fallback: &str| -> Value {
        match name {
            Some(name) => json!({"name": name}),
            None if kinds.contains_key(fallback) => json!({"name": fallback}),
            None => Value::Null,
        }
    };

    json!({
        "queryType": match query_type {
            Some(name) => json!({"name": name}),
            None => json!({"name": "Query"}),
        },
        "mutationType": root_ref(mutation_type, "Mutation"),
        "subscriptionType": root_ref(subscription_type, "Subscription"),
        "types": types,
        "directives": [],
    })
}

fn scalar_json(name: &str, description: &Option<String>) -> Value {
    json!({
        "kind": "SCALAR",
        "name": name,
        "description": description,
        "fields": Value::Null,
        "interfaces": Value::Null,
        "possibleTypes": Value::Null,
        "enumValues": Value::Null,
        "inputFields": Value::Null,
        "ofType": Value::Null,
    })
}

fn field_json(
    field: &graphql_parser::schema::Field<'_, String>,
    kinds: &HashMap<String, &'static str>,
) -> Value {
    json!({
        "name": field.name,
        "description": field.description,
        "args": field
            .arguments
            .iter()
            .map(|argument| input_value_json(argument, kinds))
            .collect::<Vec<_>>(),
        "type": type_ref(&field.field_type, kinds),
        "isDeprecated": false,
        "deprecationReason": Value::Null,
    })
}

fn input_value_json(
    input_value: &graphql_parser::schema::InputValue<'_, String>,
    kinds: &HashMap<String, &'static str>,
) -> Value {
    json!({
        "name": input_value.name,
        "description": input_value.description,
        "type": type_ref(&input_value.value_type, kinds),
        "defaultValue": input_value
            .default_value
            .as_ref()
            .map(|value| Value::String(value.to_string()))
            .unwrap_or(Value::Null),
    })
}

fn type_ref(field_type: &Type<'_, String>, kinds: &HashMap<String, &'static str>) -> Value {
    match field_type {
        Type::NamedType(name) => named_ref(name, kinds),
        Type::ListType(inner) => json!({
            "kind": "LIST",
            "name": Value::Null,
            "ofType": type_ref(inner, kinds),
        }),
        Type::NonNullType(inner) => json!({
            "kind": "NON_NULL",
            "name": Value::Null,
            "ofType": type_ref(inner, kinds),
        }),
    }
}

fn named_ref(name: &str, kinds: &HashMap<String, &'static str>) -> Value {
    json!({
        "kind": kinds.get(name).copied().unwrap_or("SCALAR"),
        "name": name,
        "ofType": Value::Null,
    })
}

/// Registers the introspection meta types in the field tables so the shaping
/// pass can project `__schema` / `__type` selections with its ordinary
/// machinery.
pub(crate) fn register_meta_types(metadata: &mut SchemaMetadata) {
    let query_root = metadata.root_type_name(OperationKind::Query).to_string();
    let query_fields = metadata.type_fields.entry(query_root).or_default();
    query_fields.insert("__schema".to_string(), "__Schema".to_string());
    query_fields.insert("__type".to_string(), "__Type".to_string());

    let meta_fields: [(&str, &[(&str, &str)]); 6] = [
        (
            "__Schema",
            &[
                ("description", "String"),
                ("queryType", "__Type"),
                ("mutationType", "__Type"),
                ("subscriptionType", "__Type"),
                ("types", "__Type"),
                ("directives", "__Directive"),
            ],
        ),
        (
            "__Type",
            &[
                ("kind", "__TypeKind"),
                ("name", "String"),
                ("description", "String"),
                ("specifiedByURL", "String"),
                ("fields", "__Field"),
                ("interfaces", "__Type"),
                ("possibleTypes", "__Type"),
                ("enumValues", "__EnumValue"),
                ("inputFields", "__InputValue"),
                ("ofType", "__Type"),
            ],
        ),
        (
            "__Field",
            &[
                ("name", "String"),
                ("description", "String"),
                ("args", "__InputValue"),
                ("type", "__Type"),
                ("isDeprecated", "Boolean"),
                ("deprecationReason", "String"),
            ],
        ),
        (
            "__InputValue",
            &[
                ("name", "String"),
                ("description", "String"),
                ("type", "__Type"),
                ("defaultValue", "String"),
            ],
        ),
        (
            "__EnumValue",
            &[
                ("name", "String"),
                ("description", "String"),
                ("isDeprecated", "Boolean"),
                ("deprecationReason", "String"),
            ],
        ),
        (
            "__Directive",
            &[
                ("name", "String"),
                ("description", "String"),
                ("locations", "__DirectiveLocation"),
                ("args", "__InputValue"),
                ("isRepeatable", "Boolean"),
            ],
        ),
    ];
    for (type_name, fields) in meta_fields {
        let entry = metadata.type_fields.entry(type_name.to_string()).or_default();
        for (field_name, field_type) in fields {
            entry.insert(field_name.to_string(), field_type.to_string());
        }
    }

    metadata.enum_values.insert(
        "__TypeKind".to_string(),
        [
            "SCALAR",
            "OBJECT",
            "INTERFACE",
            "UNION",
            "ENUM",
            "INPUT_OBJECT",
            "LIST",
            "NON_NULL",
        ]
        .iter()
        .map(|kind| kind.to_string())
        .collect(),
    );
}
