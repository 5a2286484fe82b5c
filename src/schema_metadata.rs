use std::collections::{HashMap, HashSet};

use graphql_parser::schema::{Definition, Document, Type, TypeDefinition};
use serde_json::Value;

use crate::ast::operation::OperationKind;
use crate::introspection;

/// Schema-derived lookup tables used for representation extraction, variable
/// validation and the final shaping pass. Built once per schema and shared
/// read-only across requests.
#[derive(Debug, Default)]
pub struct SchemaMetadata {
    /// Abstract type name -> concrete (and transitively abstract) types that
    /// satisfy it.
    pub possible_types: HashMap<String, HashSet<String>>,
    pub enum_values: HashMap<String, Vec<String>>,
    /// Type name -> field name -> unwrapped field type name.
    pub type_fields: HashMap<String, HashMap<String, String>>,
    pub root_type_names: RootTypeNames,
    /// The `__schema` value served to introspection queries.
    pub introspection_schema_root_json: Value,
}

#[derive(Debug, Default)]
pub struct RootTypeNames {
    pub query: Option<String>,
    pub mutation: Option<String>,
    pub subscription: Option<String>,
}

impl SchemaMetadata {
    pub fn root_type_name(&self, operation_kind: OperationKind) -> &str {
        match operation_kind {
            OperationKind::Query => self.root_type_names.query.as_deref().unwrap_or("Query"),
            OperationKind::Mutation => {
                self.root_type_names.mutation.as_deref().unwrap_or("Mutation")
            }
            OperationKind::Subscription => self
                .root_type_names
                .subscription
                .as_deref()
                .unwrap_or("Subscription"),
        }
    }

    pub fn entity_satisfies_type_condition(&self, type_name: &str, type_condition: &str) -> bool {
        type_name == type_condition
            || self
                .possible_types
                .get(type_condition)
                .is_some_and(|possible| possible.contains(type_name))
    }
}

pub trait SchemaWithMetadata {
    fn schema_metadata(&self) -> SchemaMetadata;
}

impl<'a> SchemaWithMetadata for Document<'a, String> {
    fn schema_metadata(&self) -> SchemaMetadata {
        let mut first_possible_types: HashMap<String, Vec<String>> = HashMap::new();
        let mut type_fields: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut enum_values: HashMap<String, Vec<String>> = HashMap::new();
        let mut root_type_names = RootTypeNames::default();

        for definition in &self.definitions {
            match definition {
                Definition::SchemaDefinition(schema) => {
                    root_type_names.query = schema.query.clone();
                    root_type_names.mutation = schema.mutation.clone();
                    root_type_names.subscription = schema.subscription.clone();
                }
                Definition::TypeDefinition(TypeDefinition::Enum(enum_type)) => {
                    enum_values.insert(
                        enum_type.name.clone(),
                        enum_type
                            .values
                            .iter()
                            .map(|value| value.name.clone())
                            .collect(),
                    );
                }
                Definition::TypeDefinition(TypeDefinition::Object(object_type)) => {
                    let fields = type_fields.entry(object_type.name.clone()).or_default();
                    for field in &object_type.fields {
                        fields.insert(field.name.clone(), field.field_type.type_name());
                    }
                    for interface in &object_type.implements_interfaces {
                        first_possible_types
                            .entry(interface.clone())
                            .or_default()
                            .push(object_type.name.clone());
                    }
                }
                Definition::TypeDefinition(TypeDefinition::Interface(interface_type)) => {
                    let fields = type_fields.entry(interface_type.name.clone()).or_default();
                    for field in &interface_type.fields {
                        fields.insert(field.name.clone(), field.field_type.type_name());
                    }
                    for interface in &interface_type.implements_interfaces {
                        first_possible_types
                            .entry(interface.clone())
                            .or_default()
                            .push(interface_type.name.clone());
                    }
                }
                Definition::TypeDefinition(TypeDefinition::Union(union_type)) => {
                    first_possible_types
                        .insert(union_type.name.clone(), union_type.types.clone());
                }
                Definition::TypeDefinition(TypeDefinition::InputObject(input_type)) => {
                    let fields = type_fields.entry(input_type.name.clone()).or_default();
                    for field in &input_type.fields {
                        fields.insert(field.name.clone(), field.value_type.type_name());
                    }
                }
                _ => {}
            }
        }

        // Close the possible-types relation over one level of nesting so a
        // type satisfying an interface also satisfies the interfaces that
        // interface implements.
        let mut possible_types: HashMap<String, HashSet<String>> = HashMap::new();
        for (abstract_type, direct_members) in &first_possible_types {
            let mut members: HashSet<String> = HashSet::new();
            for member in direct_members {
                members.insert(member.clone());
                if let Some(nested_members) = first_possible_types.get(member) {
                    for nested in nested_members {
                        members.insert(nested.clone());
                    }
                }
            }
            possible_types.insert(abstract_type.clone(), members);
        }

        let introspection_schema_root_json = introspection::schema_root_json(self);
        let mut metadata = SchemaMetadata {
            possible_types,
            enum_values,
            type_fields,
            root_type_names,
            introspection_schema_root_json,
        };
        introspection::register_meta_types(&mut metadata);
        metadata
    }
}

trait TypeName {
    fn type_name(&self) -> String;
}

impl TypeName for Type<'_, String> {
    fn type_name(&self) -> String {
        match self {
            Type::NamedType(name) => name.clone(),
            Type::NonNullType(inner) => inner.type_name(),
            Type::ListType(inner) => inner.type_name(),
        }
    }
}
