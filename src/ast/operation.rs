use graphql_parser::query as parser;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use super::selection_set::SelectionSet;
use super::value::Value;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
            OperationKind::Subscription => write!(f, "subscription"),
        }
    }
}

/// An executable operation. `Display` prints it as GraphQL source, which is
/// how downstream operations are serialized for dispatch.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OperationDefinition {
    pub name: Option<String>,
    pub operation_kind: OperationKind,
    pub variable_definitions: Option<Vec<VariableDefinition>>,
    pub selection_set: SelectionSet,
}

impl Display for OperationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation_kind)?;
        if let Some(name) = &self.name {
            write!(f, " {}", name)?;
        }
        if let Some(variable_definitions) = &self.variable_definitions {
            if !variable_definitions.is_empty() {
                write!(f, "(")?;
                for (i, variable_definition) in variable_definitions.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", variable_definition)?;
                }
                write!(f, ")")?;
            }
        }
        write!(f, "{}", self.selection_set)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VariableDefinition {
    pub name: String,
    pub variable_type: TypeNode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl Display for VariableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.default_value {
            Some(default_value) => {
                write!(f, "${}:{}={}", self.name, self.variable_type, default_value)
            }
            None => write!(f, "${}:{}", self.name, self.variable_type),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum TypeNode {
    Named(String),
    NonNull(Box<TypeNode>),
    List(Box<TypeNode>),
}

impl TypeNode {
    pub fn named(name: impl Into<String>) -> Self {
        TypeNode::Named(name.into())
    }

    pub fn non_null(inner: TypeNode) -> Self {
        TypeNode::NonNull(Box::new(inner))
    }

    pub fn list(inner: TypeNode) -> Self {
        TypeNode::List(Box::new(inner))
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeNode::NonNull(_))
    }
}

impl Display for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeNode::Named(name) => write!(f, "{}", name),
            TypeNode::NonNull(inner) => write!(f, "{}!", inner),
            TypeNode::List(inner) => write!(f, "[{}]", inner),
        }
    }
}

impl From<&parser::Type<'_, String>> for TypeNode {
    fn from(value: &parser::Type<'_, String>) -> Self {
        match value {
            parser::Type::NamedType(name) => TypeNode::Named(name.clone()),
            parser::Type::NonNullType(inner) => TypeNode::non_null(inner.as_ref().into()),
            parser::Type::ListType(inner) => TypeNode::list(inner.as_ref().into()),
        }
    }
}

impl From<&parser::VariableDefinition<'_, String>> for VariableDefinition {
    fn from(value: &parser::VariableDefinition<'_, String>) -> Self {
        VariableDefinition {
            name: value.name.clone(),
            variable_type: (&value.var_type).into(),
            default_value: value.default_value.as_ref().map(|v| v.into()),
        }
    }
}
