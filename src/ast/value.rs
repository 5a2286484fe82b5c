use graphql_parser::query as parser;
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display};

/// A GraphQL input value literal, as it appears in arguments and variable
/// default values. `Display` prints valid GraphQL source.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum(String),
    Variable(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Coerces the literal into a runtime JSON value, resolving variables
    /// against the provided variable map. Unknown variables become null.
    pub fn to_json(
        &self,
        variables: &Option<HashMap<String, serde_json::Value>>,
    ) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::Number(Number::from(*n)),
            Value::Float(n) => Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Enum(e) => serde_json::Value::String(e.clone()),
            Value::Variable(name) => variables
                .as_ref()
                .and_then(|variables| variables.get(name))
                .cloned()
                .unwrap_or(serde_json::Value::Null),
            Value::List(items) => serde_json::Value::Array(
                items.iter().map(|item| item.to_json(variables)).collect(),
            ),
            Value::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json(variables)))
                    .collect(),
            ),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => {
                let escaped = serde_json::to_string(s).map_err(|_| fmt::Error)?;
                write!(f, "{}", escaped)
            }
            Value::Enum(e) => write!(f, "{}", e),
            Value::Variable(name) => write!(f, "${}", name),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&parser::Value<'_, String>> for Value {
    fn from(value: &parser::Value<'_, String>) -> Self {
        match value {
            parser::Value::Null => Value::Null,
            parser::Value::Boolean(b) => Value::Boolean(*b),
            parser::Value::Int(n) => Value::Int(n.as_i64().unwrap_or_default()),
            parser::Value::Float(n) => Value::Float(*n),
            parser::Value::String(s) => Value::String(s.clone()),
            parser::Value::Enum(e) => Value::Enum(e.clone()),
            parser::Value::Variable(name) => Value::Variable(name.clone()),
            parser::Value::List(items) => {
                Value::List(items.iter().map(|item| item.into()).collect())
            }
            parser::Value::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.into()))
                    .collect(),
            ),
        }
    }
}
