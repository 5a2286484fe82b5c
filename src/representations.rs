use serde_json::{Map, Value};

use crate::ast::selection_set::{SelectionItem, SelectionSet};
use crate::errors::ExecutionError;
use crate::schema_metadata::SchemaMetadata;
use crate::TYPENAME_FIELD;

/// Projects an entity through a `requires` selection set, producing the
/// representation sent to a downstream service for entity resolution.
///
/// Required fields must already have been materialized by an earlier plan
/// step; a missing field is an extraction error. `__typename` is the
/// exception: it is copied when present, and callers drop representations
/// that end up without it (the corresponding entity is skipped for that
/// fetch). Null values are preserved verbatim.
pub fn project_for_requires(
    entity: &Value,
    requires: &SelectionSet,
    schema_metadata: &SchemaMetadata,
) -> Result<Value, ExecutionError> {
    let Value::Object(entity_object) = entity else {
        // Scalars and nulls have no representation.
        return Ok(Value::Null);
    };
    let mut projected = Map::new();
    project_object(entity_object, requires, schema_metadata, &mut projected)?;
    Ok(Value::Object(projected))
}

fn project_object(
    entity: &Map<String, Value>,
    selection_set: &SelectionSet,
    schema_metadata: &SchemaMetadata,
    projected: &mut Map<String, Value>,
) -> Result<(), ExecutionError> {
    for item in &selection_set.items {
        match item {
            SelectionItem::Field(field) => {
                let response_key = field.response_key();
                if response_key == TYPENAME_FIELD {
                    if let Some(type_name) = entity.get(TYPENAME_FIELD) {
                        projected.insert(TYPENAME_FIELD.to_string(), type_name.clone());
                    }
                    continue;
                }
                let value = entity.get(response_key).ok_or_else(|| {
                    ExecutionError::MissingRequiredField {
                        field: response_key.to_string(),
                    }
                })?;
                projected.insert(
                    response_key.to_string(),
                    project_value(value, &field.selections, schema_metadata)?,
                );
            }
            SelectionItem::InlineFragment(fragment) => {
                let Some(type_condition) = &fragment.type_condition else {
                    continue;
                };
                let Some(Value::String(type_name)) = entity.get(TYPENAME_FIELD) else {
                    continue;
                };
                // Both directions are valid here: the entity may be typed as
                // a member of the condition, or the condition may name an
                // abstract type the entity belongs to.
                if schema_metadata.entity_satisfies_type_condition(type_name, type_condition)
                    || schema_metadata.entity_satisfies_type_condition(type_condition, type_name)
                {
                    project_object(entity, &fragment.selections, schema_metadata, projected)?;
                }
            }
            SelectionItem::FragmentSpread(_) => {
                unreachable!("fragment spreads cannot appear in a requires selection")
            }
        }
    }
    Ok(())
}

fn project_value(
    value: &Value,
    selections: &SelectionSet,
    schema_metadata: &SchemaMetadata,
) -> Result<Value, ExecutionError> {
    match value {
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|item| project_value(item, selections, schema_metadata))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Value::Object(object) if !selections.is_empty() => {
            let mut projected = Map::new();
            project_object(object, selections, schema_metadata, &mut projected)?;
            Ok(Value::Object(projected))
        }
        other => Ok(other.clone()),
    }
}
