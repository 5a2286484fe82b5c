use graphql_parser::query as parser;
use std::collections::HashMap;

use super::operation::{OperationDefinition, OperationKind};
use super::selection_set::{
    FieldSelection, FragmentSpreadSelection, InlineFragmentSelection, SelectionItem, SelectionSet,
};
use super::value::Value;

/// The parsed client operation plus its fragment definitions. Built once per
/// request and shared read-only with the executor and the shaping pass.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation: OperationDefinition,
    pub fragments: HashMap<String, FragmentDefinition>,
}

#[derive(Debug, Clone)]
pub struct FragmentDefinition {
    pub type_condition: String,
    pub selection_set: SelectionSet,
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Document contains no executable operation")]
    MissingOperation,
    #[error("Operation \"{0}\" is not defined in the document")]
    UnknownOperation(String),
    #[error("Operation name is required when a document defines multiple operations")]
    AmbiguousOperation,
}

impl OperationContext {
    pub fn from_document(
        document: &parser::Document<'_, String>,
        operation_name: Option<&str>,
    ) -> Result<Self, DocumentError> {
        let mut operations = vec![];
        let mut fragments = HashMap::new();
        for definition in &document.definitions {
            match definition {
                parser::Definition::Operation(operation) => operations.push(operation),
                parser::Definition::Fragment(fragment) => {
                    let parser::TypeCondition::On(type_condition) = &fragment.type_condition;
                    fragments.insert(
                        fragment.name.clone(),
                        FragmentDefinition {
                            type_condition: type_condition.clone(),
                            selection_set: convert_selection_set(&fragment.selection_set),
                        },
                    );
                }
            }
        }

        let operation = match operation_name {
            Some(name) => operations
                .into_iter()
                .find(|operation| operation_name_of(operation) == Some(name))
                .ok_or_else(|| DocumentError::UnknownOperation(name.to_string()))?,
            None => match operations.len() {
                0 => return Err(DocumentError::MissingOperation),
                1 => operations.remove(0),
                _ => return Err(DocumentError::AmbiguousOperation),
            },
        };

        Ok(OperationContext {
            operation: convert_operation(operation),
            fragments,
        })
    }
}

fn operation_name_of<'a>(operation: &'a parser::OperationDefinition<'_, String>) -> Option<&'a str> {
    match operation {
        parser::OperationDefinition::SelectionSet(_) => None,
        parser::OperationDefinition::Query(query) => query.name.as_deref(),
        parser::OperationDefinition::Mutation(mutation) => mutation.name.as_deref(),
        parser::OperationDefinition::Subscription(subscription) => subscription.name.as_deref(),
    }
}

fn convert_operation(operation: &parser::OperationDefinition<'_, String>) -> OperationDefinition {
    match operation {
        parser::OperationDefinition::SelectionSet(selection_set) => OperationDefinition {
            name: None,
            operation_kind: OperationKind::Query,
            variable_definitions: None,
            selection_set: convert_selection_set(selection_set),
        },
        parser::OperationDefinition::Query(query) => OperationDefinition {
            name: query.name.clone(),
            operation_kind: OperationKind::Query,
            variable_definitions: convert_variable_definitions(&query.variable_definitions),
            selection_set: convert_selection_set(&query.selection_set),
        },
        parser::OperationDefinition::Mutation(mutation) => OperationDefinition {
            name: mutation.name.clone(),
            operation_kind: OperationKind::Mutation,
            variable_definitions: convert_variable_definitions(&mutation.variable_definitions),
            selection_set: convert_selection_set(&mutation.selection_set),
        },
        parser::OperationDefinition::Subscription(subscription) => OperationDefinition {
            name: subscription.name.clone(),
            operation_kind: OperationKind::Subscription,
            variable_definitions: convert_variable_definitions(
                &subscription.variable_definitions,
            ),
            selection_set: convert_selection_set(&subscription.selection_set),
        },
    }
}

fn convert_variable_definitions(
    definitions: &[parser::VariableDefinition<'_, String>],
) -> Option<Vec<super::operation::VariableDefinition>> {
    if definitions.is_empty() {
        None
    } else {
        Some(definitions.iter().map(|definition| definition.into()).collect())
    }
}

fn convert_selection_set(selection_set: &parser::SelectionSet<'_, String>) -> SelectionSet {
    SelectionSet {
        items: selection_set
            .items
            .iter()
            .filter_map(convert_selection)
            .collect(),
    }
}

fn convert_selection(selection: &parser::Selection<'_, String>) -> Option<SelectionItem> {
    match selection {
        parser::Selection::Field(field) => convert_field(field).map(SelectionItem::Field),
        parser::Selection::InlineFragment(fragment) => {
            Some(SelectionItem::InlineFragment(InlineFragmentSelection {
                type_condition: fragment.type_condition.as_ref().map(|condition| {
                    let parser::TypeCondition::On(name) = condition;
                    name.clone()
                }),
                selections: convert_selection_set(&fragment.selection_set),
            }))
        }
        parser::Selection::FragmentSpread(spread) => {
            Some(SelectionItem::FragmentSpread(FragmentSpreadSelection {
                fragment_name: spread.fragment_name.clone(),
            }))
        }
    }
}

/// Captures `@skip`/`@include` conditions. Literal conditions are folded
/// away here; variable conditions are evaluated during the shaping pass.
fn convert_field(field: &parser::Field<'_, String>) -> Option<FieldSelection> {
    let mut skip_if = None;
    let mut include_if = None;
    for directive in &field.directives {
        let condition = directive
            .arguments
            .iter()
            .find(|(name, _)| name == "if")
            .map(|(_, value)| value);
        match (directive.name.as_str(), condition) {
            ("skip", Some(parser::Value::Boolean(true)))
            | ("include", Some(parser::Value::Boolean(false))) => return None,
            ("skip", Some(parser::Value::Variable(variable))) => {
                skip_if = Some(variable.clone());
            }
            ("include", Some(parser::Value::Variable(variable))) => {
                include_if = Some(variable.clone());
            }
            _ => {}
        }
    }
    Some(FieldSelection {
        name: field.name.clone(),
        alias: field.alias.clone(),
        arguments: if field.arguments.is_empty() {
            None
        } else {
            Some(
                field
                    .arguments
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::from(value)))
                    .collect(),
            )
        },
        selections: convert_selection_set(&field.selection_set),
        skip_if,
        include_if,
    })
}
