use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub(crate) const DOWNSTREAM_SERVICE_ERROR: &str = "DOWNSTREAM_SERVICE_ERROR";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<GraphQLErrorLocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>, // Path segments can be strings or numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GraphQLErrorLocation {
    pub line: usize,
    pub column: usize,
}

impl GraphQLError {
    pub fn from_message(message: impl Into<String>) -> Self {
        GraphQLError {
            message: message.into(),
            locations: None,
            path: None,
            extensions: None,
        }
    }
}

/// A failure of the plan walk itself, as opposed to an error reported by a
/// downstream service. These are recorded at the node boundary and never
/// abort sibling or parent nodes.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("No executor registered for service \"{0}\"")]
    UnknownService(String),
    #[error("Variable \"representations\" is reserved for entity resolution and cannot be supplied by the client")]
    ReservedRepresentationsVariable,
    #[error("Service \"{service}\" returned no _entities array for an entity fetch")]
    MalformedEntitiesReply { service: String },
    #[error("Service \"{service}\" returned {received} entities for {sent} representations")]
    EntityCountMismatch {
        service: String,
        sent: usize,
        received: usize,
    },
    #[error("Required field \"{field}\" is missing from an entity representation")]
    MissingRequiredField { field: String },
}

impl From<ExecutionError> for GraphQLError {
    fn from(error: ExecutionError) -> Self {
        GraphQLError::from_message(error.to_string())
    }
}

/// Wraps errors reported by a downstream service so the final response
/// carries the originating service, the subquery and its variables. The
/// original error path and extensions are preserved, with the fixed fields
/// taking precedence.
pub fn wrap_downstream_errors(
    errors: Vec<GraphQLError>,
    service_name: &str,
    query: &str,
    variables: &Option<Map<String, Value>>,
) -> Vec<GraphQLError> {
    errors
        .into_iter()
        .map(|mut error| {
            if error.message.is_empty() {
                error.message = format!(
                    "Error while fetching subquery from service \"{}\"",
                    service_name
                );
            }
            let mut extensions = error.extensions.take().unwrap_or_default();
            extensions.insert(
                "code".to_string(),
                Value::String(DOWNSTREAM_SERVICE_ERROR.to_string()),
            );
            extensions.insert(
                "serviceName".to_string(),
                Value::String(service_name.to_string()),
            );
            extensions.insert("query".to_string(), Value::String(query.to_string()));
            extensions.insert(
                "variables".to_string(),
                match variables {
                    Some(variables) => Value::Object(variables.clone()),
                    None => Value::Null,
                },
            );
            error.extensions = Some(extensions);
            error
        })
        .collect()
}
