use std::collections::HashMap;

use crate::executors::common::{SubgraphExecutor, SubgraphExecutorBoxedArc};
use crate::executors::http::HTTPSubgraphExecutor;

/// Service name -> executor. Built once at startup and shared read-only
/// across requests.
#[derive(Default)]
pub struct SubgraphExecutorMap {
    inner: HashMap<String, SubgraphExecutorBoxedArc>,
}

impl SubgraphExecutorMap {
    pub fn new() -> Self {
        SubgraphExecutorMap::default()
    }

    pub fn get(&self, subgraph_name: &str) -> Option<&SubgraphExecutorBoxedArc> {
        self.inner.get(subgraph_name)
    }

    pub fn insert(
        &mut self,
        subgraph_name: impl Into<String>,
        executor: impl SubgraphExecutor + Send + Sync + 'static,
    ) {
        self.insert_boxed_arc(subgraph_name.into(), executor.to_boxed_arc());
    }

    pub fn insert_boxed_arc(&mut self, subgraph_name: String, executor: SubgraphExecutorBoxedArc) {
        self.inner.insert(subgraph_name, executor);
    }

    /// Builds a map of HTTP executors sharing one client.
    pub fn from_http_endpoint_map(subgraph_endpoint_map: HashMap<String, String>) -> Self {
        let http_client = reqwest::Client::new();
        let inner = subgraph_endpoint_map
            .into_iter()
            .map(|(subgraph_name, endpoint)| {
                let executor =
                    HTTPSubgraphExecutor::new(&endpoint, http_client.clone()).to_boxed_arc();
                (subgraph_name, executor)
            })
            .collect();
        SubgraphExecutorMap { inner }
    }
}
