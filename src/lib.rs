use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use serde_json::{Map, Value};
use tracing::{instrument, trace, warn};

pub mod ast;
pub mod deep_merge;
mod errors;
pub mod executors;
mod introspection;
pub mod plan;
pub mod projection;
pub mod representations;
mod response;
pub mod schema_metadata;
pub mod traverse;
pub mod variables;

pub use errors::{wrap_downstream_errors, ExecutionError, GraphQLError, GraphQLErrorLocation};
pub use response::{RequestContext, SubgraphRequest, SubgraphResponse};

use crate::ast::document::OperationContext;
use crate::ast::operation::{
    OperationDefinition, OperationKind, TypeNode, VariableDefinition,
};
use crate::ast::selection_set::{FieldSelection, SelectionItem, SelectionSet};
use crate::ast::value::Value as GraphQLValue;
use crate::executors::map::SubgraphExecutorMap;
use crate::plan::{
    FetchNode, FlattenNode, ParallelNode, PlanNode, QueryPlan, ResponsePathSegment, SequenceNode,
};
use crate::schema_metadata::SchemaMetadata;
use crate::traverse::traverse_and_callback;

pub(crate) const TYPENAME_FIELD: &str = "__typename";
const ENTITIES_FIELD: &str = "_entities";
const REPRESENTATIONS_VAR: &str = "representations";

/// Per-request execution state. The plan, operation, schema metadata and
/// service map are shared read-only; the error list and extensions are
/// private to the request and only ever grow.
pub struct ExecutionContext<'a> {
    pub variable_values: &'a Option<HashMap<String, Value>>,
    pub schema_metadata: &'a SchemaMetadata,
    pub operation_context: &'a OperationContext,
    pub subgraph_executors: &'a SubgraphExecutorMap,
    pub request_context: &'a RequestContext,
    pub errors: Vec<GraphQLError>,
    pub extensions: Map<String, Value>,
}

#[async_trait]
trait ExecutablePlanNode {
    async fn execute(&self, execution_context: &mut ExecutionContext<'_>, data: &mut Value);
}

#[async_trait]
pub trait ExecutableQueryPlan {
    async fn execute(&self, execution_context: &mut ExecutionContext<'_>, data: &mut Value);
}

#[async_trait]
impl ExecutablePlanNode for PlanNode {
    async fn execute(&self, execution_context: &mut ExecutionContext<'_>, data: &mut Value) {
        match self {
            PlanNode::Fetch(node) => node.execute(execution_context, data).await,
            PlanNode::Sequence(node) => node.execute(execution_context, data).await,
            PlanNode::Parallel(node) => node.execute(execution_context, data).await,
            PlanNode::Flatten(node) => node.execute(execution_context, data).await,
        }
    }
}

#[async_trait]
impl ExecutablePlanNode for SequenceNode {
    #[instrument(level = "trace", skip_all, name = "SequenceNode::execute", fields(
        nodes_count = %self.nodes.len()
    ))]
    async fn execute(&self, execution_context: &mut ExecutionContext<'_>, data: &mut Value) {
        for node in &self.nodes {
            // Each child observes the merges of the previous one.
            node.execute(execution_context, data).await;
        }
    }
}

#[async_trait]
impl ExecutablePlanNode for FetchNode {
    #[instrument(level = "debug", skip_all, name = "FetchNode::execute", fields(
        service_name = %self.service_name
    ))]
    async fn execute(&self, execution_context: &mut ExecutionContext<'_>, data: &mut Value) {
        match self.execute_and_get_result(execution_context, None).await {
            Ok(fetch_result) => {
                if let Some(result_data) = fetch_result.data {
                    merge_root_result(data, result_data);
                }
                record_errors_and_extensions(
                    execution_context,
                    fetch_result.errors,
                    fetch_result.extensions,
                );
            }
            Err(error) => execution_context.errors.push(error.into()),
        }
    }
}

#[async_trait]
impl ExecutablePlanNode for FlattenNode {
    #[instrument(level = "trace", skip_all, name = "FlattenNode::execute", fields(
        path = ?self.path
    ))]
    async fn execute(&self, execution_context: &mut ExecutionContext<'_>, data: &mut Value) {
        let fetch_node = match self.node.as_ref() {
            PlanNode::Fetch(fetch_node) => fetch_node,
            other => {
                warn!(
                    "FlattenNode only supports a Fetch child node, found: {:?}",
                    other
                );
                return;
            }
        };

        let Some(requires) = &fetch_node.requires else {
            // A plain fetch over a narrowed slice: one downstream call,
            // merged into every addressed entity.
            match fetch_node.execute_and_get_result(execution_context, None).await {
                Ok(fetch_result) => {
                    if let Some(result_data) = fetch_result.data {
                        traverse_and_callback(
                            data,
                            &self.path,
                            VecDeque::new(),
                            &mut |entity, _indexes| {
                                deep_merge::deep_merge(entity, result_data.clone());
                            },
                        );
                    }
                    record_errors_and_extensions(
                        execution_context,
                        fetch_result.errors,
                        fetch_result.extensions,
                    );
                }
                Err(error) => execution_context.errors.push(error.into()),
            }
            return;
        };

        let schema_metadata = execution_context.schema_metadata;
        let mut collected_representations: Vec<Value> = vec![];
        let mut targets: Vec<&mut Value> = vec![];
        let mut extraction_error: Option<ExecutionError> = None;
        traverse_and_callback(data, &self.path, VecDeque::new(), &mut |entity, _indexes| {
            if extraction_error.is_some() {
                return;
            }
            match representations::project_for_requires(entity, requires, schema_metadata) {
                Ok(projection) => {
                    if projection.get(TYPENAME_FIELD).is_some() {
                        collected_representations.push(projection);
                        targets.push(entity);
                    }
                }
                Err(error) => extraction_error = Some(error),
            }
        });
        if let Some(error) = extraction_error {
            execution_context.errors.push(error.into());
            return;
        }
        if collected_representations.is_empty() {
            trace!("no valid representations on path, skipping fetch");
            return;
        }

        let sent = collected_representations.len();
        match fetch_node
            .execute_and_get_result(execution_context, Some(collected_representations))
            .await
        {
            Ok(fetch_result) => {
                let mut merge_error = None;
                if let Some(result_data) = fetch_result.data {
                    match take_entities(result_data, &fetch_node.service_name, sent) {
                        Ok(entities) => {
                            for (target, entity) in targets.into_iter().zip(entities) {
                                deep_merge::deep_merge(target, entity);
                            }
                        }
                        Err(error) => merge_error = Some(error),
                    }
                }
                record_errors_and_extensions(
                    execution_context,
                    fetch_result.errors,
                    fetch_result.extensions,
                );
                if let Some(error) = merge_error {
                    execution_context.errors.push(error.into());
                }
            }
            Err(error) => execution_context.errors.push(error.into()),
        }
    }
}

enum ParallelJob<'a> {
    Root(Result<SubgraphResponse, ExecutionError>),
    Entities {
        result: Result<SubgraphResponse, ExecutionError>,
        service_name: &'a str,
        path: &'a [ResponsePathSegment],
        index_paths: Vec<VecDeque<usize>>,
    },
}

#[async_trait]
impl ExecutablePlanNode for ParallelNode {
    #[instrument(level = "trace", skip_all, name = "ParallelNode::execute", fields(
        nodes_count = %self.nodes.len()
    ))]
    async fn execute(&self, execution_context: &mut ExecutionContext<'_>, data: &mut Value) {
        let mut all_errors: Vec<GraphQLError> = vec![];
        let mut all_extensions: Vec<Map<String, Value>> = vec![];
        // Children the fetch fan-out below cannot express run sequentially
        // after the concurrent batch; by planner contract they still touch
        // disjoint fields.
        let mut sequential: Vec<&PlanNode> = vec![];

        {
            let fetch_context: &ExecutionContext<'_> = execution_context;
            let mut jobs: FuturesUnordered<BoxFuture<ParallelJob>> = FuturesUnordered::new();
            for node in &self.nodes {
                match node {
                    PlanNode::Fetch(fetch_node) => {
                        let job = fetch_node.execute_and_get_result(fetch_context, None);
                        jobs.push(job.map(ParallelJob::Root).boxed());
                    }
                    PlanNode::Flatten(flatten_node) => {
                        let (fetch_node, requires) = match flatten_node.node.as_ref() {
                            PlanNode::Fetch(fetch_node) => match &fetch_node.requires {
                                Some(requires) => (fetch_node, requires),
                                None => {
                                    sequential.push(node);
                                    continue;
                                }
                            },
                            _ => {
                                sequential.push(node);
                                continue;
                            }
                        };
                        let mut collected_representations = vec![];
                        let mut index_paths = vec![];
                        let mut extraction_error = None;
                        traverse_and_callback(
                            &mut *data,
                            &flatten_node.path,
                            VecDeque::new(),
                            &mut |entity, indexes| {
                                if extraction_error.is_some() {
                                    return;
                                }
                                match representations::project_for_requires(
                                    entity,
                                    requires,
                                    fetch_context.schema_metadata,
                                ) {
                                    Ok(projection) => {
                                        if projection.get(TYPENAME_FIELD).is_some() {
                                            collected_representations.push(projection);
                                            index_paths.push(indexes);
                                        }
                                    }
                                    Err(error) => extraction_error = Some(error),
                                }
                            },
                        );
                        if let Some(error) = extraction_error {
                            all_errors.push(error.into());
                            continue;
                        }
                        if collected_representations.is_empty() {
                            continue;
                        }
                        let job = fetch_node
                            .execute_and_get_result(fetch_context, Some(collected_representations));
                        jobs.push(
                            job.map(move |result| ParallelJob::Entities {
                                result,
                                service_name: &fetch_node.service_name,
                                path: &flatten_node.path,
                                index_paths,
                            })
                            .boxed(),
                        );
                    }
                    other => sequential.push(other),
                }
            }

            // Results are merged here, by the awaiting task, as each job
            // completes; jobs themselves never touch the working tree.
            while let Some(job) = jobs.next().await {
                match job {
                    ParallelJob::Root(Ok(fetch_result)) => {
                        if let Some(result_data) = fetch_result.data {
                            merge_root_result(data, result_data);
                        }
                        if let Some(errors) = fetch_result.errors {
                            all_errors.extend(errors);
                        }
                        if let Some(extensions) = fetch_result.extensions {
                            all_extensions.push(extensions);
                        }
                    }
                    ParallelJob::Entities {
                        result: Ok(fetch_result),
                        service_name,
                        path,
                        mut index_paths,
                    } => {
                        let mut merge_error = None;
                        if let Some(result_data) = fetch_result.data {
                            match take_entities(result_data, service_name, index_paths.len()) {
                                Ok(entities) => {
                                    for (entity, indexes_in_path) in
                                        entities.into_iter().zip(index_paths.iter_mut())
                                    {
                                        let mut target = &mut *data;
                                        for segment in path {
                                            match segment {
                                                ResponsePathSegment::List => {
                                                    if let Some(index) =
                                                        indexes_in_path.pop_front()
                                                    {
                                                        target = &mut target[index];
                                                    }
                                                }
                                                ResponsePathSegment::Field(field_name) => {
                                                    target = &mut target[field_name.as_str()];
                                                }
                                            }
                                        }
                                        while let Some(index) = indexes_in_path.pop_front() {
                                            target = &mut target[index];
                                        }
                                        deep_merge::deep_merge(target, entity);
                                    }
                                }
                                Err(error) => merge_error = Some(error),
                            }
                        }
                        if let Some(errors) = fetch_result.errors {
                            all_errors.extend(errors);
                        }
                        if let Some(extensions) = fetch_result.extensions {
                            all_extensions.push(extensions);
                        }
                        if let Some(error) = merge_error {
                            all_errors.push(error.into());
                        }
                    }
                    ParallelJob::Root(Err(error))
                    | ParallelJob::Entities {
                        result: Err(error), ..
                    } => all_errors.push(error.into()),
                }
            }
        }

        for node in sequential {
            node.execute(execution_context, data).await;
        }

        record_errors_and_extensions(
            execution_context,
            if all_errors.is_empty() {
                None
            } else {
                Some(all_errors)
            },
            if all_extensions.is_empty() {
                None
            } else {
                Some(all_extensions.into_iter().flatten().collect())
            },
        );
    }
}

#[async_trait]
trait ExecutableFetchNode {
    async fn execute_and_get_result(
        &self,
        execution_context: &ExecutionContext<'_>,
        representations: Option<Vec<Value>>,
    ) -> Result<SubgraphResponse, ExecutionError>;
    fn downstream_variables(
        &self,
        variable_values: &Option<HashMap<String, Value>>,
    ) -> Option<Map<String, Value>>;
    fn root_operation(&self, client_operation_kind: OperationKind) -> OperationDefinition;
    fn entities_operation(&self) -> OperationDefinition;
}

#[async_trait]
impl ExecutableFetchNode for FetchNode {
    #[instrument(level = "debug", skip_all, name = "FetchNode::execute_and_get_result", fields(
        service_name = %self.service_name
    ))]
    async fn execute_and_get_result(
        &self,
        execution_context: &ExecutionContext<'_>,
        representations: Option<Vec<Value>>,
    ) -> Result<SubgraphResponse, ExecutionError> {
        let executor = execution_context
            .subgraph_executors
            .get(&self.service_name)
            .ok_or_else(|| ExecutionError::UnknownService(self.service_name.clone()))?;

        let mut variables = self.downstream_variables(execution_context.variable_values);
        let operation = match representations {
            Some(representations) => {
                if execution_context
                    .variable_values
                    .as_ref()
                    .is_some_and(|variable_values| {
                        variable_values.contains_key(REPRESENTATIONS_VAR)
                    })
                {
                    return Err(ExecutionError::ReservedRepresentationsVariable);
                }
                variables.get_or_insert_with(Map::new).insert(
                    REPRESENTATIONS_VAR.to_string(),
                    Value::Array(representations),
                );
                self.entities_operation()
            }
            None => self.root_operation(
                execution_context.operation_context.operation.operation_kind,
            ),
        };
        let query = operation.to_string();

        let mut fetch_result = executor
            .execute(SubgraphRequest {
                query: query.clone(),
                operation_name: self.operation_name.as_deref(),
                variables: variables.clone(),
                context: execution_context.request_context,
            })
            .await;

        // Downstream errors never abort execution; they are wrapped with the
        // originating service and subquery and travel with the partial data.
        if let Some(errors) = fetch_result.errors.take() {
            fetch_result.errors = Some(wrap_downstream_errors(
                errors,
                &self.service_name,
                &query,
                &variables,
            ));
        }
        Ok(fetch_result)
    }

    fn downstream_variables(
        &self,
        variable_values: &Option<HashMap<String, Value>>,
    ) -> Option<Map<String, Value>> {
        let variable_values = variable_values.as_ref()?;
        if self.variable_usages.is_empty() || variable_values.is_empty() {
            return None;
        }
        // Variables without a client-provided value are omitted, not sent as
        // explicit nulls.
        let forwarded: Map<String, Value> = self
            .variable_usages
            .keys()
            .filter_map(|variable_name| {
                variable_values
                    .get(variable_name)
                    .map(|value| (variable_name.clone(), value.clone()))
            })
            .collect();
        if forwarded.is_empty() {
            None
        } else {
            Some(forwarded)
        }
    }

    fn root_operation(&self, client_operation_kind: OperationKind) -> OperationDefinition {
        OperationDefinition {
            name: self.operation_name.clone(),
            operation_kind: self.operation_kind.unwrap_or(client_operation_kind),
            variable_definitions: if self.variable_usages.is_empty() {
                None
            } else {
                Some(self.variable_usages.values().cloned().collect())
            },
            selection_set: self.selection_set.clone(),
        }
    }

    fn entities_operation(&self) -> OperationDefinition {
        let mut variable_definitions = Vec::with_capacity(self.variable_usages.len() + 1);
        variable_definitions.push(VariableDefinition {
            name: REPRESENTATIONS_VAR.to_string(),
            variable_type: TypeNode::non_null(TypeNode::list(TypeNode::non_null(
                TypeNode::named("_Any"),
            ))),
            default_value: None,
        });
        variable_definitions.extend(self.variable_usages.values().cloned());
        OperationDefinition {
            name: self.operation_name.clone(),
            operation_kind: OperationKind::Query,
            variable_definitions: Some(variable_definitions),
            selection_set: SelectionSet {
                items: vec![SelectionItem::Field(FieldSelection {
                    arguments: Some(vec![(
                        REPRESENTATIONS_VAR.to_string(),
                        GraphQLValue::Variable(REPRESENTATIONS_VAR.to_string()),
                    )]),
                    selections: self.selection_set.clone(),
                    ..FieldSelection::new(ENTITIES_FIELD)
                })],
            },
        }
    }
}

fn merge_root_result(data: &mut Value, result_data: Value) {
    if data.is_null() {
        *data = result_data;
    } else {
        deep_merge::deep_merge(data, result_data);
    }
}

/// Validates an `_entities` reply: it must be an array positionally aligned
/// with the representations that were sent. On any mismatch nothing is
/// merged from this fetch.
fn take_entities(
    result_data: Value,
    service_name: &str,
    sent: usize,
) -> Result<Vec<Value>, ExecutionError> {
    let entities = match result_data {
        Value::Object(mut result_map) => result_map.remove(ENTITIES_FIELD),
        _ => None,
    };
    let Some(Value::Array(entities)) = entities else {
        return Err(ExecutionError::MalformedEntitiesReply {
            service: service_name.to_string(),
        });
    };
    if entities.len() != sent {
        return Err(ExecutionError::EntityCountMismatch {
            service: service_name.to_string(),
            sent,
            received: entities.len(),
        });
    }
    Ok(entities)
}

fn record_errors_and_extensions(
    execution_context: &mut ExecutionContext<'_>,
    errors: Option<Vec<GraphQLError>>,
    extensions: Option<Map<String, Value>>,
) {
    if let Some(errors) = errors {
        trace!("recording {} downstream errors", errors.len());
        execution_context.errors.extend(errors);
    }
    if let Some(extensions) = extensions {
        execution_context.extensions.extend(extensions);
    }
}

#[async_trait]
impl ExecutableQueryPlan for QueryPlan {
    #[instrument(level = "trace", skip_all, name = "QueryPlan::execute")]
    async fn execute(&self, execution_context: &mut ExecutionContext<'_>, data: &mut Value) {
        if let Some(root_node) = &self.node {
            root_node.execute(execution_context, data).await
        }
    }
}

/// Coerces the raw client variables, then executes the plan and shapes the
/// response. This is the entry point a gateway calls per request.
pub async fn execute(
    query_plan: &QueryPlan,
    subgraph_executors: &SubgraphExecutorMap,
    raw_variable_values: &Option<HashMap<String, Value>>,
    schema_metadata: &SchemaMetadata,
    operation_context: &OperationContext,
    request_context: &RequestContext,
) -> String {
    let variable_values = match variables::collect_variables(
        &operation_context.operation,
        raw_variable_values,
        schema_metadata,
    ) {
        Ok(variable_values) => variable_values,
        Err(error) => {
            return errors_only_response(&[GraphQLError::from_message(error.to_string())])
        }
    };
    execute_query_plan(
        query_plan,
        subgraph_executors,
        &variable_values,
        schema_metadata,
        operation_context,
        request_context,
    )
    .await
}

/// Executes a plan against already-coerced variables and returns the
/// serialized response body.
#[instrument(level = "trace", skip_all)]
pub async fn execute_query_plan(
    query_plan: &QueryPlan,
    subgraph_executors: &SubgraphExecutorMap,
    variable_values: &Option<HashMap<String, Value>>,
    schema_metadata: &SchemaMetadata,
    operation_context: &OperationContext,
    request_context: &RequestContext,
) -> String {
    // The working tree starts empty; root fetches populate it and entity
    // fetches mutate it in place. A plan without nodes still shapes an
    // all-null response from the empty tree.
    let mut data = Value::Object(Map::new());
    let mut execution_context = ExecutionContext {
        variable_values,
        schema_metadata,
        operation_context,
        subgraph_executors,
        request_context,
        errors: vec![],
        extensions: Map::new(),
    };
    query_plan.execute(&mut execution_context, &mut data).await;

    let mut errors = execution_context.errors;
    let extensions = execution_context.extensions;
    match projection::project_by_operation(
        &mut data,
        &mut errors,
        &extensions,
        operation_context,
        schema_metadata,
        variable_values,
    ) {
        Ok(body) => body,
        // A failed shaping pass replaces the whole response; collected
        // errors do not survive it.
        Err(shaping_error) => {
            errors_only_response(&[GraphQLError::from_message(shaping_error.to_string())])
        }
    }
}

fn errors_only_response(errors: &[GraphQLError]) -> String {
    match serde_json::to_string(errors) {
        Ok(serialized) => format!("{{\"errors\":{}}}", serialized),
        Err(_) => "{\"errors\":[{\"message\":\"Failed to serialize response\"}]}".to_string(),
    }
}

#[cfg(test)]
mod tests;
