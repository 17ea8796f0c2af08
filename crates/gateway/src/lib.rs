//! Wardline gateway — the orchestration core of the hospital operations
//! platform.
//!
//! Everything the frontend can do flows through the [`registry::ToolRegistry`]:
//! domain agents register schema-validated tools at boot, the
//! [`orchestrator::Orchestrator`] turns natural-language messages into tool
//! calls, and the [`workflow`] engine runs checkpointed multi-step graphs.

pub mod agents;
pub mod api;
pub mod beds;
pub mod bootstrap;
pub mod discharge;
pub mod orchestrator;
pub mod registry;
pub mod schema;
pub mod sessions;
pub mod state;
pub mod workflow;
