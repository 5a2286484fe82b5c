use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::{self, Display};

use crate::ast::operation::{OperationKind, VariableDefinition};
use crate::ast::selection_set::SelectionSet;

/// A pre-compiled query plan, as produced by a federation query planner.
/// Immutable for the duration of a request; safe to share across requests.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    pub kind: String, // "QueryPlan"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<PlanNode>,
}

impl QueryPlan {
    pub fn new(node: Option<PlanNode>) -> Self {
        QueryPlan {
            kind: "QueryPlan".to_string(),
            node,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind")]
pub enum PlanNode {
    Fetch(FetchNode),
    Sequence(SequenceNode),
    Parallel(ParallelNode),
    Flatten(FlattenNode),
}

/// One operation against one subgraph service.
///
/// `selection_set` is the selection sent to the service; for entity fetches
/// (`requires` present) it is the selection nested under `_entities`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FetchNode {
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_kind: Option<OperationKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    pub selection_set: SelectionSet,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variable_usages: BTreeMap<String, VariableDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<SelectionSet>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SequenceNode {
    pub nodes: Vec<PlanNode>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ParallelNode {
    pub nodes: Vec<PlanNode>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FlattenNode {
    pub path: Vec<ResponsePathSegment>,
    pub node: Box<PlanNode>,
}

/// A segment of a response path. `Field` descends into an object key,
/// `List` (serialized as `"@"`) fans out over every element of a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePathSegment {
    Field(String),
    List,
}

const LIST_MARKER: &str = "@";

impl Display for ResponsePathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponsePathSegment::Field(name) => write!(f, "{}", name),
            ResponsePathSegment::List => write!(f, "{}", LIST_MARKER),
        }
    }
}

impl From<&str> for ResponsePathSegment {
    fn from(segment: &str) -> Self {
        if segment == LIST_MARKER {
            ResponsePathSegment::List
        } else {
            ResponsePathSegment::Field(segment.to_string())
        }
    }
}

impl Serialize for ResponsePathSegment {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ResponsePathSegment::Field(name) => serializer.serialize_str(name),
            ResponsePathSegment::List => serializer.serialize_str(LIST_MARKER),
        }
    }
}

impl<'de> Deserialize<'de> for ResponsePathSegment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SegmentVisitor;

        impl de::Visitor<'_> for SegmentVisitor {
            type Value = ResponsePathSegment;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a field name or the list marker \"@\"")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ResponsePathSegment::from(value))
            }
        }

        deserializer.deserialize_str(SegmentVisitor)
    }
}

pub fn response_path(segments: &[&str]) -> Vec<ResponsePathSegment> {
    segments
        .iter()
        .map(|segment| ResponsePathSegment::from(*segment))
        .collect()
}
