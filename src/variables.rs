use std::collections::HashMap;

use serde_json::Value;

use crate::ast::operation::{OperationDefinition, TypeNode};
use crate::schema_metadata::SchemaMetadata;

#[derive(Debug, thiserror::Error)]
pub enum VariableError {
    #[error("Variable \"{variable}\" got an invalid value: {reason}")]
    InvalidValue { variable: String, reason: String },
    #[error("Variable \"{0}\" is non-nullable but no value was provided")]
    MissingNonNull(String),
}

/// Coerces the client-supplied variables against the operation's variable
/// definitions: defaults are applied, values are validated against schema
/// metadata, and variables the operation does not define are dropped.
/// Returns `None` when no variable ends up with a value.
pub fn collect_variables(
    operation: &OperationDefinition,
    variables: &Option<HashMap<String, Value>>,
    schema_metadata: &SchemaMetadata,
) -> Result<Option<HashMap<String, Value>>, VariableError> {
    let Some(variable_definitions) = &operation.variable_definitions else {
        return Ok(None);
    };

    let mut variable_values = HashMap::new();
    for variable_definition in variable_definitions {
        let variable_name = &variable_definition.name;
        if let Some(value) = variables.as_ref().and_then(|v| v.get(variable_name)) {
            validate_runtime_value(value, &variable_definition.variable_type, schema_metadata)
                .map_err(|reason| VariableError::InvalidValue {
                    variable: variable_name.clone(),
                    reason,
                })?;
            variable_values.insert(variable_name.clone(), value.clone());
            continue;
        }
        if let Some(default_value) = &variable_definition.default_value {
            let coerced = default_value.to_json(&None);
            validate_runtime_value(&coerced, &variable_definition.variable_type, schema_metadata)
                .map_err(|reason| VariableError::InvalidValue {
                    variable: variable_name.clone(),
                    reason,
                })?;
            variable_values.insert(variable_name.clone(), coerced);
            continue;
        }
        if variable_definition.variable_type.is_non_null() {
            return Err(VariableError::MissingNonNull(variable_name.clone()));
        }
    }

    if variable_values.is_empty() {
        Ok(None)
    } else {
        Ok(Some(variable_values))
    }
}

fn validate_runtime_value(
    value: &Value,
    type_node: &TypeNode,
    schema_metadata: &SchemaMetadata,
) -> Result<(), String> {
    match type_node {
        TypeNode::NonNull(inner_type) => {
            if value.is_null() {
                return Err("value cannot be null for a non-nullable type".to_string());
            }
            validate_runtime_value(value, inner_type, schema_metadata)
        }
        TypeNode::List(inner_type) => match value {
            Value::Null => Ok(()),
            Value::Array(items) => {
                for item in items {
                    validate_runtime_value(item, inner_type, schema_metadata)?;
                }
                Ok(())
            }
            other => Err(format!("expected a list, got {}", other)),
        },
        TypeNode::Named(name) => {
            if value.is_null() {
                return Ok(());
            }
            if let Some(enum_values) = schema_metadata.enum_values.get(name) {
                return match value {
                    Value::String(member) if enum_values.contains(member) => Ok(()),
                    Value::String(member) => Err(format!(
                        "\"{}\" is not a valid value for enum \"{}\"",
                        member, name
                    )),
                    other => Err(format!("expected an enum value for \"{}\", got {}", name, other)),
                };
            }
            match name.as_str() {
                "String" => match value {
                    Value::String(_) => Ok(()),
                    other => Err(format!("expected a String, got {}", other)),
                },
                "ID" => match value {
                    Value::String(_) | Value::Number(_) => Ok(()),
                    other => Err(format!("expected an ID, got {}", other)),
                },
                "Int" => match value {
                    Value::Number(number) if number.is_i64() => Ok(()),
                    other => Err(format!("expected an Int, got {}", other)),
                },
                "Float" => match value {
                    Value::Number(_) => Ok(()),
                    other => Err(format!("expected a Float, got {}", other)),
                },
                "Boolean" => match value {
                    Value::Bool(_) => Ok(()),
                    other => Err(format!("expected a Boolean, got {}", other)),
                },
                _ => {
                    if let Some(fields) = schema_metadata.type_fields.get(name) {
                        let Value::Object(object) = value else {
                            return Err(format!(
                                "expected an input object for \"{}\", got {}",
                                name, value
                            ));
                        };
                        for (field_name, field_value) in object {
                            if let Some(field_type) = fields.get(field_name) {
                                validate_runtime_value(
                                    field_value,
                                    &TypeNode::Named(field_type.clone()),
                                    schema_metadata,
                                )?;
                            }
                        }
                    }
                    // Custom scalars accept any value.
                    Ok(())
                }
            }
        }
    }
}
