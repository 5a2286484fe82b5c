use std::sync::Arc;

use async_trait::async_trait;

use crate::response::{SubgraphRequest, SubgraphResponse};

/// The abstract data source a subgraph service provides. Transport failures
/// are reported as error responses, never as panics or Rust errors: the
/// executor records them and keeps walking the plan.
#[async_trait]
pub trait SubgraphExecutor {
    async fn execute(&self, request: SubgraphRequest<'_>) -> SubgraphResponse;

    fn to_boxed_arc<'a>(self) -> Arc<Box<dyn SubgraphExecutor + Send + Sync + 'a>>
    where
        Self: Sized + Send + Sync + 'a,
    {
        Arc::new(Box::new(self))
    }
}

pub type SubgraphExecutorType = dyn SubgraphExecutor + Send + Sync;

pub type SubgraphExecutorBoxedArc = Arc<Box<SubgraphExecutorType>>;
