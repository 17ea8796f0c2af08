//! AppState construction and background-task spawning.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use ward_domain::clock::{Clock, SystemClock};
use ward_domain::config::{Config, ConfigSeverity, LlmProviderKind};
use ward_llm::{
    InMemoryVectorStore, LlmProvider, OpenAiCompatProvider, ScriptedProvider, VectorStore,
};
use ward_storage::{
    CheckpointStore, CodeResolver, FileCheckpointStore, InMemoryStore, MemoryCheckpointStore,
    Repositories,
};

use crate::agents::{self, AgentDeps};
use crate::beds::BedLifecycleManager;
use crate::discharge::DischargeAggregator;
use crate::orchestrator::Orchestrator;
use crate::registry::{ToolRegistry, ToolSpec};
use crate::sessions::ConversationStore;
use crate::state::AppState;

/// Validate config, wire every subsystem, register all agents, and return
/// a fully-built [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Repositories (in-memory reference implementation) ────────────
    let store = InMemoryStore::new();
    let repos = store.repositories();
    let resolver = CodeResolver::new(repos.clone());
    tracing::info!("repositories ready");

    // ── LLM provider ─────────────────────────────────────────────────
    let llm: Arc<dyn LlmProvider> = match config.llm.provider {
        LlmProviderKind::Scripted => {
            tracing::info!("scripted LLM provider ready (offline mode)");
            Arc::new(ScriptedProvider::new())
        }
        LlmProviderKind::OpenaiCompat => {
            let api_key = std::env::var(&config.llm.api_key_env).ok();
            let provider = OpenAiCompatProvider::new(
                config.llm.base_url.clone(),
                api_key,
                config.llm.model.clone(),
                config.llm.embedding_model.clone(),
                Duration::from_millis(config.llm.call_timeout_ms),
            )
            .context("initializing LLM provider")?;
            tracing::info!(base_url = %config.llm.base_url, model = %config.llm.model, "LLM provider ready");
            Arc::new(provider)
        }
    };

    build_app_state_with(config, repos, resolver, Arc::new(SystemClock), llm).await
}

/// The wiring path shared with the test suite: callers supply the
/// repositories, resolver, clock, and LLM provider.
pub async fn build_app_state_with(
    config: Arc<Config>,
    repos: Repositories,
    resolver: CodeResolver,
    clock: Arc<dyn Clock>,
    llm: Arc<dyn LlmProvider>,
) -> anyhow::Result<AppState> {
    // ── Vector store ─────────────────────────────────────────────────
    let vectors: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    tracing::info!("vector store ready");

    // ── Checkpoint store ─────────────────────────────────────────────
    let checkpoints: Arc<dyn CheckpointStore> = match &config.workflows.checkpoint_dir {
        Some(dir) => {
            let store = FileCheckpointStore::new(dir.clone())
                .context("initializing file checkpoint store")?;
            tracing::info!(dir = %dir.display(), "file checkpoint store ready");
            Arc::new(store)
        }
        None => {
            tracing::info!("in-memory checkpoint store ready");
            Arc::new(MemoryCheckpointStore::new())
        }
    };

    // ── Core managers ────────────────────────────────────────────────
    let beds = Arc::new(BedLifecycleManager::new(
        repos.clone(),
        clock.clone(),
        config.beds.cleaning_duration_minutes,
    ));
    let aggregator = Arc::new(DischargeAggregator::new(
        repos.clone(),
        beds.clone(),
        clock.clone(),
    ));
    let engine = Arc::new(crate::workflow::WorkflowEngine::new(
        crate::workflow::WorkflowDeps {
            repos: repos.clone(),
            beds: beds.clone(),
            llm: llm.clone(),
            vectors: vectors.clone(),
            clock: clock.clone(),
            config: config.clone(),
        },
        checkpoints,
    ));
    tracing::info!("bed lifecycle, discharge aggregator, workflow engine ready");

    // ── Tool registry + agents ───────────────────────────────────────
    let registry = Arc::new(ToolRegistry::new(Duration::from_millis(
        config.tools.call_timeout_ms,
    )));
    let agent_deps = AgentDeps {
        repos: repos.clone(),
        resolver: resolver.clone(),
        beds: beds.clone(),
        aggregator: aggregator.clone(),
        engine: engine.clone(),
        llm: llm.clone(),
        vectors: vectors.clone(),
        clock: clock.clone(),
        config: config.clone(),
    };
    agents::register_all(&registry, &agent_deps).context("registering agent tools")?;
    tracing::info!(
        tools = registry.tool_count(),
        agents = registry.agent_count(),
        "tool registry ready"
    );

    // ── Sessions + orchestrator ──────────────────────────────────────
    let sessions = Arc::new(ConversationStore::new(
        config.sessions.window_size,
        config.sessions.lru_capacity,
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        registry.clone(),
        llm.clone(),
        sessions.clone(),
        config.clone(),
    ));

    // The orchestrator is itself reachable through the catalog, so the
    // frontend speaks one protocol for everything.
    let orch = orchestrator.clone();
    registry.register(ToolSpec::new(
        ward_domain::tool::ToolDescriptor {
            name: "chat".into(),
            description: "Send a natural-language message to the hospital assistant. \
                          Pass session_id to continue a conversation."
                .into(),
            owning_agent: "orchestrator".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string" },
                    "session_id": { "type": "string" }
                },
                "required": ["message"]
            }),
            output_schema: serde_json::json!({ "type": "object" }),
            side_effecting: true,
        },
        move |args| {
            let orch = orch.clone();
            Box::pin(async move {
                let message = args["message"].as_str().unwrap_or_default().to_owned();
                let session_id = args["session_id"].as_str().map(str::to_owned);
                let turn = orch.chat(session_id.as_deref(), &message).await;
                serde_json::to_value(&turn).map_err(ward_domain::Error::from)
            })
        },
    ))?;

    Ok(AppState {
        config,
        registry,
        orchestrator,
        sessions,
        beds,
        aggregator,
        engine,
        repos,
        resolver,
        llm,
        clock,
        vectors,
    })
}

/// Spawn the long-running background tasks: the bed-cleaning sweep and
/// session-store maintenance. Call after [`build_app_state`] when running
/// the server.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Periodic bed sweep ───────────────────────────────────────────
    {
        let beds = state.beds.clone();
        let interval_secs = state.config.beds.sweep_interval_seconds;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                let promoted = beds.sweep_expired().await;
                if !promoted.is_empty() {
                    tracing::info!(count = promoted.len(), "bed sweep promoted cleaning beds");
                }
            }
        });
    }

    // ── Periodic session pruning ─────────────────────────────────────
    {
        let sessions = state.sessions.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                sessions.evict_over_capacity();
            }
        });
    }

    tracing::info!("background tasks spawned");
}
