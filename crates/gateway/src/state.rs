use std::sync::Arc;

use ward_domain::clock::Clock;
use ward_domain::config::Config;
use ward_llm::{LlmProvider, VectorStore};
use ward_storage::{CodeResolver, Repositories};

use crate::beds::BedLifecycleManager;
use crate::discharge::DischargeAggregator;
use crate::orchestrator::Orchestrator;
use crate::registry::ToolRegistry;
use crate::sessions::ConversationStore;
use crate::workflow::WorkflowEngine;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ToolRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<ConversationStore>,
    pub beds: Arc<BedLifecycleManager>,
    pub aggregator: Arc<DischargeAggregator>,
    pub engine: Arc<WorkflowEngine>,
    pub repos: Repositories,
    pub resolver: CodeResolver,
    pub llm: Arc<dyn LlmProvider>,
    pub clock: Arc<dyn Clock>,
    pub vectors: Arc<dyn VectorStore>,
}
