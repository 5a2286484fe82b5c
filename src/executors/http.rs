use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, instrument, trace};

use crate::executors::common::SubgraphExecutor;
use crate::response::{SubgraphRequest, SubgraphResponse};

pub struct HTTPSubgraphExecutor {
    pub endpoint: String,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpRequestBody<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    operation_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<&'a Map<String, Value>>,
}

impl HTTPSubgraphExecutor {
    pub fn new(endpoint: &str, http_client: reqwest::Client) -> Self {
        HTTPSubgraphExecutor {
            endpoint: endpoint.to_string(),
            http_client,
        }
    }

    async fn post(&self, request: &SubgraphRequest<'_>) -> Result<SubgraphResponse, reqwest::Error> {
        let body = HttpRequestBody {
            query: &request.query,
            operation_name: request.operation_name,
            variables: request.variables.as_ref(),
        };
        let request_body_bytes = match sonic_rs::to_vec(&body) {
            Ok(bytes) => bytes,
            Err(serialize_error) => {
                return Ok(SubgraphResponse::from_error_message(format!(
                    "Failed to serialize request for {}: {}",
                    self.endpoint, serialize_error
                )))
            }
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(request_body_bytes)
            .send()
            .await?;
        let response_bytes = response.bytes().await?;

        Ok(
            sonic_rs::from_slice::<SubgraphResponse>(&response_bytes).unwrap_or_else(
                |parse_error| {
                    trace!("unparsable subgraph response: {:?}", response_bytes);
                    SubgraphResponse::from_error_message(format!(
                        "Unexpected response from {}: {}",
                        self.endpoint, parse_error
                    ))
                },
            ),
        )
    }
}

#[async_trait]
impl SubgraphExecutor for HTTPSubgraphExecutor {
    #[instrument(level = "trace", skip_all, name = "HTTPSubgraphExecutor::execute", fields(endpoint = %self.endpoint))]
    async fn execute(&self, request: SubgraphRequest<'_>) -> SubgraphResponse {
        self.post(&request).await.unwrap_or_else(|network_error| {
            error!(
                "Failed to reach subgraph at {}: {}",
                self.endpoint, network_error
            );
            SubgraphResponse::from_error_message(format!(
                "Error reaching subgraph at {}: {}",
                self.endpoint, network_error
            ))
        })
    }
}
