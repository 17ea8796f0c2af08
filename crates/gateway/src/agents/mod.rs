//! Domain agents — each owns one bounded context and registers its tools
//! into the registry at boot.
//!
//! Tool handlers resolve human codes to ids at the boundary, delegate to
//! repositories (or the bed lifecycle manager / discharge aggregator /
//! workflow engine), and return plain JSON payloads; the registry wraps
//! them in the uniform envelope.

pub mod appointments;
pub mod beds;
pub mod clinical;
pub mod coordinator;
pub mod departments;
pub mod discharge;
pub mod documents;
pub mod equipment;
pub mod inventory;
pub mod meetings;
pub mod patient;
pub mod staff;
pub mod users;
pub mod workflows;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use ward_domain::clock::Clock;
use ward_domain::config::Config;
use ward_domain::tool::ToolDescriptor;
use ward_domain::{Error, Result};
use ward_llm::{LlmProvider, VectorStore};
use ward_storage::{CodeResolver, Repositories};

use crate::beds::BedLifecycleManager;
use crate::discharge::DischargeAggregator;
use crate::registry::ToolRegistry;
use crate::workflow::WorkflowEngine;

/// Shared handles every agent draws from.
#[derive(Clone)]
pub struct AgentDeps {
    pub repos: Repositories,
    pub resolver: CodeResolver,
    pub beds: Arc<BedLifecycleManager>,
    pub aggregator: Arc<DischargeAggregator>,
    pub engine: Arc<WorkflowEngine>,
    pub llm: Arc<dyn LlmProvider>,
    pub vectors: Arc<dyn VectorStore>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}

/// Register every domain agent's tools. Called once at boot.
pub fn register_all(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    patient::register(registry, deps)?;
    beds::register(registry, deps)?;
    staff::register(registry, deps)?;
    equipment::register(registry, deps)?;
    inventory::register(registry, deps)?;
    appointments::register(registry, deps)?;
    discharge::register(registry, deps)?;
    clinical::register(registry, deps)?;
    documents::register(registry, deps)?;
    departments::register(registry, deps)?;
    meetings::register(registry, deps)?;
    users::register(registry, deps)?;
    coordinator::register(registry, deps)?;
    workflows::register(registry, deps)?;
    Ok(())
}

// ── Shared helpers ─────────────────────────────────────────────────

/// Deserialize tool arguments into their typed request shape.
pub(crate) fn parse<T: DeserializeOwned>(args: &Value) -> Result<T> {
    serde_json::from_value(args.clone()).map_err(|e| Error::InvalidArguments(e.to_string()))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(Error::from)
}

/// Descriptor shorthand used by every agent module.
pub(crate) fn descriptor(
    name: &str,
    owning_agent: &str,
    description: &str,
    input_schema: Value,
    side_effecting: bool,
) -> ToolDescriptor {
    ToolDescriptor {
        name: name.into(),
        description: description.into(),
        owning_agent: owning_agent.into(),
        input_schema,
        // Payloads are tool-specific JSON objects.
        output_schema: serde_json::json!({ "type": "object" }),
        side_effecting,
    }
}
