use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::ast::document::OperationContext;
use crate::ast::operation::{TypeNode, VariableDefinition};
use crate::ast::selection_set::SelectionSet;
use crate::executors::common::SubgraphExecutor;
use crate::executors::map::SubgraphExecutorMap;
use crate::plan::{
    response_path, FetchNode, FlattenNode, ParallelNode, PlanNode, QueryPlan, SequenceNode,
};
use crate::schema_metadata::{SchemaMetadata, SchemaWithMetadata};
use crate::{execute, execute_query_plan, SubgraphRequest, SubgraphResponse};

const SCHEMA_SDL: &str = r#"
    type Query {
        me: User
        topProducts: [Product]
        a: Int
        b: Int
    }
    type Mutation {
        createUser: User
    }
    type User {
        id: ID!
        name: String
        email: String
    }
    type Product {
        upc: String!
        name: String
        price: Int
    }
"#;

#[derive(Debug, Clone)]
struct RecordedRequest {
    query: String,
    variables: Option<Map<String, Value>>,
}

/// Stub data source: replies with a canned response and records every
/// request it receives.
struct StaticSubgraphExecutor {
    response: SubgraphResponse,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

#[async_trait]
impl SubgraphExecutor for StaticSubgraphExecutor {
    async fn execute(&self, request: SubgraphRequest<'_>) -> SubgraphResponse {
        self.requests
            .lock()
            .expect("request log should not be poisoned")
            .push(RecordedRequest {
                query: request.query,
                variables: request.variables,
            });
        self.response.clone()
    }
}

fn static_executor(response: Value) -> (StaticSubgraphExecutor, Arc<Mutex<Vec<RecordedRequest>>>) {
    let requests = Arc::new(Mutex::new(vec![]));
    let executor = StaticSubgraphExecutor {
        response: serde_json::from_value(response).expect("stub response should deserialize"),
        requests: requests.clone(),
    };
    (executor, requests)
}

fn schema_metadata() -> SchemaMetadata {
    graphql_parser::parse_schema::<String>(SCHEMA_SDL)
        .expect("test schema should parse")
        .schema_metadata()
}

fn operation_context(source: &str) -> OperationContext {
    let document =
        graphql_parser::parse_query::<String>(source).expect("test operation should parse");
    OperationContext::from_document(&document, None).expect("test operation should convert")
}

fn selection(source: &str) -> SelectionSet {
    operation_context(source).operation.selection_set
}

fn fetch(service_name: &str, selection_source: &str) -> FetchNode {
    FetchNode {
        service_name: service_name.to_string(),
        operation_kind: None,
        operation_name: None,
        selection_set: selection(selection_source),
        variable_usages: BTreeMap::new(),
        requires: None,
    }
}

fn entity_fetch(service_name: &str, selection_source: &str, requires_source: &str) -> FetchNode {
    FetchNode {
        requires: Some(selection(requires_source)),
        ..fetch(service_name, selection_source)
    }
}

fn run_plan(
    plan: &QueryPlan,
    executors: &SubgraphExecutorMap,
    variables: Option<HashMap<String, Value>>,
    client_query: &str,
) -> String {
    let metadata = schema_metadata();
    let context = operation_context(client_query);
    tokio_test::block_on(execute_query_plan(
        plan,
        executors,
        &variables,
        &metadata,
        &context,
        &(),
    ))
}

fn parse(body: &str) -> Value {
    serde_json::from_str(body).expect("response body should be valid JSON")
}

#[test]
fn single_root_fetch_shapes_only_requested_fields() {
    let (accounts, requests) = static_executor(json!({
        "data": {"me": {"id": "1", "name": "Ada"}}
    }));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("accounts", accounts);
    let plan = QueryPlan::new(Some(fetch("accounts", "{ me { id name } }").into_plan_node()));

    let body = run_plan(&plan, &executors, None, "{ me { name } }");

    insta::assert_snapshot!(body, @r#"{"data":{"me":{"name":"Ada"}}}"#);
    let requests = requests.lock().expect("request log should not be poisoned");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].query, "query{me{id name}}");
    assert_eq!(requests[0].variables, None);
}

#[test]
fn aliases_are_honored_end_to_end() {
    let (accounts, _) = static_executor(json!({
        "data": {"me": {"moniker": "Ada"}}
    }));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("accounts", accounts);
    let plan = QueryPlan::new(Some(
        fetch("accounts", "{ me { moniker: name } }").into_plan_node(),
    ));

    let body = run_plan(&plan, &executors, None, "{ me { moniker: name } }");

    assert_eq!(body, r#"{"data":{"me":{"moniker":"Ada"}}}"#);
}

#[test]
fn entity_fetch_merges_positionally_aligned_entities() {
    let (products, _) = static_executor(json!({
        "data": {"topProducts": [
            {"__typename": "Product", "upc": "a"},
            {"__typename": "Product", "upc": "b"}
        ]}
    }));
    let (names, name_requests) = static_executor(json!({
        "data": {"_entities": [{"name": "Alpha"}, {"name": "Beta"}]}
    }));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("products", products);
    executors.insert("names", names);
    let plan = QueryPlan::new(Some(PlanNode::Sequence(SequenceNode {
        nodes: vec![
            fetch("products", "{ topProducts { __typename upc } }").into_plan_node(),
            PlanNode::Flatten(FlattenNode {
                path: response_path(&["topProducts", "@"]),
                node: Box::new(
                    entity_fetch("names", "{ name }", "{ __typename upc }").into_plan_node(),
                ),
            }),
        ],
    })));

    let body = run_plan(&plan, &executors, None, "{ topProducts { upc name } }");

    assert_eq!(
        parse(&body)["data"],
        json!({"topProducts": [
            {"upc": "a", "name": "Alpha"},
            {"upc": "b", "name": "Beta"}
        ]})
    );
    let name_requests = name_requests
        .lock()
        .expect("request log should not be poisoned");
    assert_eq!(name_requests.len(), 1);
    assert_eq!(
        name_requests[0].query,
        "query($representations:[_Any!]!){_entities(representations:$representations){name}}"
    );
    assert_eq!(
        name_requests[0]
            .variables
            .as_ref()
            .expect("representations should be sent")["representations"],
        json!([
            {"__typename": "Product", "upc": "a"},
            {"__typename": "Product", "upc": "b"}
        ])
    );
}

#[test]
fn parallel_root_fetches_coexist_in_the_merged_entity() {
    let (names, _) = static_executor(json!({"data": {"me": {"name": "Ada"}}}));
    let (emails, _) = static_executor(json!({"data": {"me": {"email": "ada@acme.dev"}}}));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("names", names);
    executors.insert("emails", emails);
    let plan = QueryPlan::new(Some(PlanNode::Parallel(ParallelNode {
        nodes: vec![
            fetch("names", "{ me { name } }").into_plan_node(),
            fetch("emails", "{ me { email } }").into_plan_node(),
        ],
    })));

    let body = run_plan(&plan, &executors, None, "{ me { name email } }");

    assert_eq!(
        parse(&body)["data"],
        json!({"me": {"name": "Ada", "email": "ada@acme.dev"}})
    );
}

#[test]
fn parallel_entity_fetches_merge_disjoint_fields() {
    let (products, _) = static_executor(json!({
        "data": {"topProducts": [
            {"__typename": "Product", "upc": "a"},
            {"__typename": "Product", "upc": "b"}
        ]}
    }));
    let (names, _) = static_executor(json!({
        "data": {"_entities": [{"name": "Alpha"}, {"name": "Beta"}]}
    }));
    let (prices, _) = static_executor(json!({
        "data": {"_entities": [{"price": 10}, {"price": 20}]}
    }));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("products", products);
    executors.insert("names", names);
    executors.insert("prices", prices);
    let entity_flatten = |service: &str, selection_source: &str| {
        PlanNode::Flatten(FlattenNode {
            path: response_path(&["topProducts", "@"]),
            node: Box::new(
                entity_fetch(service, selection_source, "{ __typename upc }").into_plan_node(),
            ),
        })
    };
    let plan = QueryPlan::new(Some(PlanNode::Sequence(SequenceNode {
        nodes: vec![
            fetch("products", "{ topProducts { __typename upc } }").into_plan_node(),
            PlanNode::Parallel(ParallelNode {
                nodes: vec![
                    entity_flatten("names", "{ name }"),
                    entity_flatten("prices", "{ price }"),
                ],
            }),
        ],
    })));

    let body = run_plan(&plan, &executors, None, "{ topProducts { upc name price } }");

    assert_eq!(
        parse(&body)["data"],
        json!({"topProducts": [
            {"upc": "a", "name": "Alpha", "price": 10},
            {"upc": "b", "name": "Beta", "price": 20}
        ]})
    );
}

#[test]
fn downstream_errors_preserve_partial_data() {
    let (books, _) = static_executor(json!({
        "data": {"a": 1, "b": null},
        "errors": [{"message": "bad b", "path": ["b"]}]
    }));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("books", books);
    let plan = QueryPlan::new(Some(fetch("books", "{ a b }").into_plan_node()));

    let body = run_plan(&plan, &executors, None, "{ a b }");

    let response = parse(&body);
    assert_eq!(response["data"], json!({"a": 1, "b": null}));
    let error = &response["errors"][0];
    assert_eq!(error["message"], "bad b");
    assert_eq!(error["path"], json!(["b"]));
    assert_eq!(error["extensions"]["code"], "DOWNSTREAM_SERVICE_ERROR");
    assert_eq!(error["extensions"]["serviceName"], "books");
    assert_eq!(error["extensions"]["query"], "query{a b}");
    assert_eq!(error["extensions"]["variables"], Value::Null);
}

#[test]
fn entity_count_mismatch_records_an_error_and_merges_nothing() {
    let (products, _) = static_executor(json!({
        "data": {"topProducts": [
            {"__typename": "Product", "upc": "a"},
            {"__typename": "Product", "upc": "b"}
        ]}
    }));
    let (names, _) = static_executor(json!({
        "data": {"_entities": [{"name": "Alpha"}]}
    }));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("products", products);
    executors.insert("names", names);
    let plan = QueryPlan::new(Some(PlanNode::Sequence(SequenceNode {
        nodes: vec![
            fetch("products", "{ topProducts { __typename upc } }").into_plan_node(),
            PlanNode::Flatten(FlattenNode {
                path: response_path(&["topProducts", "@"]),
                node: Box::new(
                    entity_fetch("names", "{ name }", "{ __typename upc }").into_plan_node(),
                ),
            }),
        ],
    })));

    let body = run_plan(&plan, &executors, None, "{ topProducts { upc name } }");

    let response = parse(&body);
    assert_eq!(
        response["data"],
        json!({"topProducts": [
            {"upc": "a", "name": null},
            {"upc": "b", "name": null}
        ]})
    );
    let errors = response["errors"].as_array().expect("an error is recorded");
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0]["message"],
        "Service \"names\" returned 1 entities for 2 representations"
    );
}

#[test]
fn unknown_services_do_not_abort_sibling_nodes() {
    let (accounts, _) = static_executor(json!({"data": {"me": {"name": "Ada"}}}));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("accounts", accounts);
    let plan = QueryPlan::new(Some(PlanNode::Sequence(SequenceNode {
        nodes: vec![
            fetch("ghost", "{ a }").into_plan_node(),
            fetch("accounts", "{ me { name } }").into_plan_node(),
        ],
    })));

    let body = run_plan(&plan, &executors, None, "{ a me { name } }");

    let response = parse(&body);
    assert_eq!(response["data"], json!({"a": null, "me": {"name": "Ada"}}));
    assert_eq!(
        response["errors"][0]["message"],
        "No executor registered for service \"ghost\""
    );
}

#[test]
fn client_supplied_representations_variable_is_rejected() {
    let (products, _) = static_executor(json!({
        "data": {"topProducts": [{"__typename": "Product", "upc": "a"}]}
    }));
    let (names, name_requests) = static_executor(json!({
        "data": {"_entities": [{"name": "Alpha"}]}
    }));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("products", products);
    executors.insert("names", names);
    let plan = QueryPlan::new(Some(PlanNode::Sequence(SequenceNode {
        nodes: vec![
            fetch("products", "{ topProducts { __typename upc } }").into_plan_node(),
            PlanNode::Flatten(FlattenNode {
                path: response_path(&["topProducts", "@"]),
                node: Box::new(
                    entity_fetch("names", "{ name }", "{ __typename upc }").into_plan_node(),
                ),
            }),
        ],
    })));

    let variables = HashMap::from([("representations".to_string(), json!(["smuggled"]))]);
    let body = run_plan(
        &plan,
        &executors,
        Some(variables),
        "{ topProducts { upc name } }",
    );

    let response = parse(&body);
    assert_eq!(
        response["errors"][0]["message"],
        "Variable \"representations\" is reserved for entity resolution and cannot be supplied by the client"
    );
    // The entity fetch was abandoned before dispatch.
    assert!(name_requests
        .lock()
        .expect("request log should not be poisoned")
        .is_empty());
    assert_eq!(
        response["data"],
        json!({"topProducts": [{"upc": "a", "name": null}]})
    );
}

#[test]
fn representations_without_typename_are_skipped() {
    let (products, _) = static_executor(json!({
        "data": {"topProducts": [
            {"__typename": "Product", "upc": "a"},
            {"upc": "b"}
        ]}
    }));
    let (names, name_requests) = static_executor(json!({
        "data": {"_entities": [{"name": "Alpha"}]}
    }));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("products", products);
    executors.insert("names", names);
    let plan = QueryPlan::new(Some(PlanNode::Sequence(SequenceNode {
        nodes: vec![
            fetch("products", "{ topProducts { __typename upc } }").into_plan_node(),
            PlanNode::Flatten(FlattenNode {
                path: response_path(&["topProducts", "@"]),
                node: Box::new(
                    entity_fetch("names", "{ name }", "{ __typename upc }").into_plan_node(),
                ),
            }),
        ],
    })));

    let body = run_plan(&plan, &executors, None, "{ topProducts { upc name } }");

    let sent = name_requests
        .lock()
        .expect("request log should not be poisoned");
    assert_eq!(
        sent[0].variables.as_ref().expect("representations are sent")["representations"],
        json!([{"__typename": "Product", "upc": "a"}])
    );
    assert_eq!(
        parse(&body)["data"],
        json!({"topProducts": [
            {"upc": "a", "name": "Alpha"},
            {"upc": "b", "name": null}
        ]})
    );
}

#[test]
fn downstream_errors_do_not_abort_later_sequence_children() {
    let (books, _) = static_executor(json!({
        "data": {"a": 1, "b": null},
        "errors": [{"message": "bad b", "path": ["b"]}]
    }));
    let (accounts, account_requests) = static_executor(json!({"data": {"me": {"name": "Ada"}}}));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("books", books);
    executors.insert("accounts", accounts);
    let plan = QueryPlan::new(Some(PlanNode::Sequence(SequenceNode {
        nodes: vec![
            fetch("books", "{ a b }").into_plan_node(),
            fetch("accounts", "{ me { name } }").into_plan_node(),
        ],
    })));

    let body = run_plan(&plan, &executors, None, "{ a b me { name } }");

    assert_eq!(
        account_requests
            .lock()
            .expect("request log should not be poisoned")
            .len(),
        1
    );
    let response = parse(&body);
    assert_eq!(
        response["data"],
        json!({"a": 1, "b": null, "me": {"name": "Ada"}})
    );
    assert_eq!(response["errors"].as_array().map(Vec::len), Some(1));
}

#[test]
fn only_used_variables_are_forwarded_downstream() {
    let (products, product_requests) = static_executor(json!({
        "data": {"topProducts": [{"__typename": "Product", "upc": "a"}]}
    }));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("products", products);
    let mut fetch_node = fetch("products", "{ topProducts { upc } }");
    fetch_node.variable_usages.insert(
        "first".to_string(),
        VariableDefinition {
            name: "first".to_string(),
            variable_type: TypeNode::named("Int"),
            default_value: None,
        },
    );
    let plan = QueryPlan::new(Some(fetch_node.into_plan_node()));

    let variables = HashMap::from([
        ("first".to_string(), json!(5)),
        ("unused".to_string(), json!(7)),
    ]);
    run_plan(
        &plan,
        &executors,
        Some(variables),
        "query($first: Int, $unused: Int) { topProducts { upc } }",
    );

    let requests = product_requests
        .lock()
        .expect("request log should not be poisoned");
    assert_eq!(requests[0].query, "query($first:Int){topProducts{upc}}");
    let forwarded = requests[0].variables.as_ref().expect("variables are sent");
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded["first"], json!(5));
}

#[test]
fn mutations_keep_the_client_operation_kind() {
    let (accounts, requests) = static_executor(json!({
        "data": {"createUser": {"id": "7"}}
    }));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("accounts", accounts);
    let plan = QueryPlan::new(Some(fetch("accounts", "{ createUser { id } }").into_plan_node()));

    let body = run_plan(&plan, &executors, None, "mutation { createUser { id } }");

    assert_eq!(
        requests
            .lock()
            .expect("request log should not be poisoned")[0]
            .query,
        "mutation{createUser{id}}"
    );
    assert_eq!(parse(&body)["data"], json!({"createUser": {"id": "7"}}));
}

#[test]
fn flatten_without_requires_broadcasts_the_reply() {
    let (products, _) = static_executor(json!({
        "data": {"topProducts": [
            {"__typename": "Product", "upc": "a"},
            {"__typename": "Product", "upc": "b"}
        ]}
    }));
    let (pricing, _) = static_executor(json!({"data": {"price": 5}}));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("products", products);
    executors.insert("pricing", pricing);
    let plan = QueryPlan::new(Some(PlanNode::Sequence(SequenceNode {
        nodes: vec![
            fetch("products", "{ topProducts { __typename upc } }").into_plan_node(),
            PlanNode::Flatten(FlattenNode {
                path: response_path(&["topProducts", "@"]),
                node: Box::new(fetch("pricing", "{ price }").into_plan_node()),
            }),
        ],
    })));

    let body = run_plan(&plan, &executors, None, "{ topProducts { upc price } }");

    assert_eq!(
        parse(&body)["data"],
        json!({"topProducts": [
            {"upc": "a", "price": 5},
            {"upc": "b", "price": 5}
        ]})
    );
}

#[test]
fn plans_without_nodes_shape_an_all_null_response() {
    let executors = SubgraphExecutorMap::new();
    let plan = QueryPlan::new(None);

    let body = run_plan(&plan, &executors, None, "{ me { name } }");

    insta::assert_snapshot!(body, @r#"{"data":{"me":null}}"#);
}

#[test]
fn downstream_extensions_surface_on_the_response() {
    let (accounts, _) = static_executor(json!({
        "data": {"me": {"name": "Ada"}},
        "extensions": {"traceId": "abc123"}
    }));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("accounts", accounts);
    let plan = QueryPlan::new(Some(fetch("accounts", "{ me { name } }").into_plan_node()));

    let body = run_plan(&plan, &executors, None, "{ me { name } }");

    assert_eq!(parse(&body)["extensions"], json!({"traceId": "abc123"}));
}

#[test]
fn variable_coercion_failures_skip_execution() {
    let (accounts, requests) = static_executor(json!({"data": {"me": {"name": "Ada"}}}));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("accounts", accounts);
    let plan = QueryPlan::new(Some(fetch("accounts", "{ me { name } }").into_plan_node()));
    let metadata = schema_metadata();
    let context = operation_context("query($first: Int!) { me { name } }");

    let body = tokio_test::block_on(execute(
        &plan, &executors, &None, &metadata, &context, &(),
    ));

    assert_eq!(
        parse(&body),
        json!({"errors": [{
            "message": "Variable \"first\" is non-nullable but no value was provided"
        }]})
    );
    assert!(requests
        .lock()
        .expect("request log should not be poisoned")
        .is_empty());
}

#[test]
fn variable_defaults_reach_downstream_fetches() {
    let (products, product_requests) = static_executor(json!({
        "data": {"topProducts": [{"__typename": "Product", "upc": "a"}]}
    }));
    let mut executors = SubgraphExecutorMap::new();
    executors.insert("products", products);
    let mut fetch_node = fetch("products", "{ topProducts { upc } }");
    fetch_node.variable_usages.insert(
        "first".to_string(),
        VariableDefinition {
            name: "first".to_string(),
            variable_type: TypeNode::named("Int"),
            default_value: None,
        },
    );
    let plan = QueryPlan::new(Some(fetch_node.into_plan_node()));
    let metadata = schema_metadata();
    let context = operation_context("query($first: Int = 2) { topProducts { upc } }");

    tokio_test::block_on(execute(
        &plan, &executors, &None, &metadata, &context, &(),
    ));

    let requests = product_requests
        .lock()
        .expect("request log should not be poisoned");
    assert_eq!(
        requests[0].variables.as_ref().expect("variables are sent")["first"],
        json!(2)
    );
}

impl FetchNode {
    fn into_plan_node(self) -> PlanNode {
        PlanNode::Fetch(self)
    }
}
