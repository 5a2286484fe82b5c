use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::{instrument, warn};

use crate::ast::document::OperationContext;
use crate::ast::operation::OperationKind;
use crate::ast::selection_set::{SelectionItem, SelectionSet};
use crate::errors::GraphQLError;
use crate::schema_metadata::SchemaMetadata;
use crate::TYPENAME_FIELD;

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Unknown fragment \"{0}\"")]
    UnknownFragment(String),
    #[error("Failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Re-projects the working tree through the client operation and serializes
/// the final response body.
///
/// Only requested fields survive, under their response keys and in the order
/// of the client document; fields the tree lacks come out as null. Fields
/// introduced by downstream services but not requested never leak.
#[instrument(level = "trace", skip_all)]
pub fn project_by_operation(
    data: &mut Value,
    errors: &mut Vec<GraphQLError>,
    extensions: &Map<String, Value>,
    operation_context: &OperationContext,
    schema_metadata: &SchemaMetadata,
    variable_values: &Option<HashMap<String, Value>>,
) -> Result<String, ProjectionError> {
    let root_type_name =
        schema_metadata.root_type_name(operation_context.operation.operation_kind);
    let projected = project_selection_set(
        data,
        errors,
        &operation_context.operation.selection_set,
        root_type_name,
        operation_context,
        schema_metadata,
        variable_values,
    )?;

    let mut body = String::with_capacity(projected.len() + 16);
    body.push_str("{\"data\":");
    body.push_str(&projected);
    if !errors.is_empty() {
        body.push_str(",\"errors\":");
        body.push_str(&serde_json::to_string(errors)?);
    }
    if !extensions.is_empty() {
        body.push_str(",\"extensions\":");
        body.push_str(&serde_json::to_string(extensions)?);
    }
    body.push('}');
    Ok(body)
}

fn project_selection_set(
    data: &mut Value,
    errors: &mut Vec<GraphQLError>,
    selection_set: &SelectionSet,
    type_name: &str,
    operation_context: &OperationContext,
    schema_metadata: &SchemaMetadata,
    variable_values: &Option<HashMap<String, Value>>,
) -> Result<String, ProjectionError> {
    match data {
        Value::Null => Ok("null".to_string()),
        Value::Bool(true) => Ok("true".to_string()),
        Value::Bool(false) => Ok("false".to_string()),
        Value::Number(number) => Ok(number.to_string()),
        Value::String(value) => {
            if let Some(enum_values) = schema_metadata.enum_values.get(type_name) {
                if !enum_values.contains(value) {
                    errors.push(GraphQLError::from_message(format!(
                        "Value is not a valid enum value for type \"{}\"",
                        type_name
                    )));
                    *data = Value::Null;
                    return Ok("null".to_string());
                }
            }
            Ok(serde_json::to_string(value)?)
        }
        Value::Array(items) => {
            let mut projected_items = Vec::with_capacity(items.len());
            for item in items.iter_mut() {
                projected_items.push(project_selection_set(
                    item,
                    errors,
                    selection_set,
                    type_name,
                    operation_context,
                    schema_metadata,
                    variable_values,
                )?);
            }
            Ok(format!("[{}]", projected_items.join(",")))
        }
        Value::Object(object) => {
            let items = project_object(
                object,
                errors,
                selection_set,
                type_name,
                operation_context,
                schema_metadata,
                variable_values,
            )?;
            Ok(format!("{{{}}}", items.join(",")))
        }
    }
}

fn project_object(
    object: &mut Map<String, Value>,
    errors: &mut Vec<GraphQLError>,
    selection_set: &SelectionSet,
    parent_type_name: &str,
    operation_context: &OperationContext,
    schema_metadata: &SchemaMetadata,
    variable_values: &Option<HashMap<String, Value>>,
) -> Result<Vec<String>, ProjectionError> {
    // The object may be more specifically typed than the field position.
    let type_name = match object.get(TYPENAME_FIELD) {
        Some(Value::String(type_name)) => type_name,
        _ => parent_type_name,
    }
    .to_string();
    let field_types = schema_metadata.type_fields.get(&type_name);
    let is_query_root = type_name == schema_metadata.root_type_name(OperationKind::Query);

    let mut items = vec![];
    for selection in &selection_set.items {
        match selection {
            SelectionItem::Field(field) => {
                if let Some(skip_variable) = &field.skip_if {
                    let condition = variable_values
                        .as_ref()
                        .and_then(|variables| variables.get(skip_variable));
                    if condition == Some(&Value::Bool(true)) {
                        continue;
                    }
                }
                if let Some(include_variable) = &field.include_if {
                    let condition = variable_values
                        .as_ref()
                        .and_then(|variables| variables.get(include_variable));
                    if condition != Some(&Value::Bool(true)) {
                        continue;
                    }
                }
                let response_key = field.response_key();
                if field.name == TYPENAME_FIELD {
                    items.push(format!("\"{}\":\"{}\"", response_key, type_name));
                    continue;
                }
                let Some(field_types) = field_types else {
                    warn!(
                        "Type \"{}\" not found in schema, skipping projection",
                        type_name
                    );
                    continue;
                };
                if is_query_root && field.name == "__schema" {
                    object.insert(
                        response_key.to_string(),
                        schema_metadata.introspection_schema_root_json.clone(),
                    );
                }
                if is_query_root && field.name == "__type" {
                    object.insert(
                        response_key.to_string(),
                        resolve_type_by_name(field, schema_metadata, variable_values),
                    );
                }
                let field_type = field_types.get(&field.name);
                let field_value = object.get_mut(response_key);
                match (field_type, field_value) {
                    (Some(field_type), Some(field_value)) => {
                        let projected = project_selection_set(
                            field_value,
                            errors,
                            &field.selections,
                            field_type,
                            operation_context,
                            schema_metadata,
                            variable_values,
                        )?;
                        items.push(format!("\"{}\":{}", response_key, projected));
                    }
                    (Some(_), None) => {
                        items.push(format!("\"{}\":null", response_key));
                    }
                    (None, _) => {
                        warn!(
                            "Field \"{}\" not found on type \"{}\", skipping projection",
                            field.name, type_name
                        );
                    }
                }
            }
            SelectionItem::InlineFragment(fragment) => {
                let applies = match &fragment.type_condition {
                    Some(type_condition) => schema_metadata
                        .entity_satisfies_type_condition(&type_name, type_condition),
                    None => true,
                };
                if applies {
                    items.extend(project_object(
                        object,
                        errors,
                        &fragment.selections,
                        &type_name,
                        operation_context,
                        schema_metadata,
                        variable_values,
                    )?);
                }
            }
            SelectionItem::FragmentSpread(spread) => {
                let fragment = operation_context
                    .fragments
                    .get(&spread.fragment_name)
                    .ok_or_else(|| {
                        ProjectionError::UnknownFragment(spread.fragment_name.clone())
                    })?;
                if schema_metadata
                    .entity_satisfies_type_condition(&type_name, &fragment.type_condition)
                {
                    items.extend(project_object(
                        object,
                        errors,
                        &fragment.selection_set,
                        &type_name,
                        operation_context,
                        schema_metadata,
                        variable_values,
                    )?);
                }
            }
        }
    }
    Ok(items)
}

fn resolve_type_by_name(
    field: &crate::ast::selection_set::FieldSelection,
    schema_metadata: &SchemaMetadata,
    variable_values: &Option<HashMap<String, Value>>,
) -> Value {
    let requested = field
        .arguments
        .as_ref()
        .and_then(|arguments| {
            arguments
                .iter()
                .find(|(name, _)| name == "name")
                .map(|(_, value)| value.to_json(variable_values))
        })
        .and_then(|value| value.as_str().map(|name| name.to_string()));
    let Some(requested) = requested else {
        return Value::Null;
    };
    schema_metadata
        .introspection_schema_root_json
        .get("types")
        .and_then(|types| types.as_array())
        .and_then(|types| {
            types
                .iter()
                .find(|candidate| {
                    candidate.get("name").and_then(|name| name.as_str())
                        == Some(requested.as_str())
                })
                .cloned()
        })
        .unwrap_or(Value::Null)
}
