use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;

use crate::errors::GraphQLError;

/// Opaque request-scoped state handed through to every subgraph executor.
/// The executor core never inspects it; transports may downcast it for
/// deadlines, auth material or anything else carried per request.
pub type RequestContext = dyn Any + Send + Sync;

/// A single downstream operation, ready for dispatch.
pub struct SubgraphRequest<'a> {
    pub query: String,
    pub operation_name: Option<&'a str>,
    pub variables: Option<Map<String, Value>>,
    pub context: &'a RequestContext,
}

impl fmt::Debug for SubgraphRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubgraphRequest")
            .field("query", &self.query)
            .field("operation_name", &self.operation_name)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

/// The wire contract of a downstream service reply.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SubgraphResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl SubgraphResponse {
    pub fn from_error_message(message: impl Into<String>) -> SubgraphResponse {
        SubgraphResponse {
            data: None,
            errors: Some(vec![GraphQLError::from_message(message)]),
            extensions: None,
        }
    }

    pub fn new(
        data: Option<Value>,
        errors: Option<Vec<GraphQLError>>,
        extensions: Option<Map<String, Value>>,
    ) -> SubgraphResponse {
        SubgraphResponse {
            data: match data {
                Some(data) if data.is_null() => None,
                other => other,
            },
            errors: match errors {
                Some(errors) if errors.is_empty() => None,
                other => other,
            },
            extensions: match extensions {
                Some(extensions) if extensions.is_empty() => None,
                other => other,
            },
        }
    }
}
