//! Workflow engine — directed graphs of nodes over typed state, with a
//! checkpoint at every node boundary.
//!
//! Checkpoints are keyed by `(session_id, workflow_kind)`; exactly one
//! active run may exist per key. A process restart followed by
//! [`WorkflowEngine::resume_session`] replays from the last committed
//! checkpoint and, given identical external responses, reaches the same
//! terminal state as an uninterrupted run.
//!
//! Nodes classify their failures: transient errors retry with exponential
//! backoff up to the configured maximum, permanent errors fail the run.
//! Cancellation is cooperative — the engine observes the token between
//! nodes — and executed nodes compensate in reverse order when a run
//! fails or is cancelled.

pub mod admission;
pub mod clinical;
pub mod document;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use ward_domain::clock::Clock;
use ward_domain::config::Config;
use ward_domain::trace::TraceEvent;
use ward_domain::{Error, Result};
use ward_llm::{LlmProvider, VectorStore};
use ward_storage::{CheckpointKey, CheckpointStore, Repositories};

use crate::beds::BedLifecycleManager;

pub use admission::AdmissionState;
pub use clinical::ClinicalDecisionState;
pub use document::DocumentProcessingState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Kinds & statuses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Admission,
    ClinicalDecision,
    DocumentProcessing,
}

impl WorkflowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowKind::Admission => "admission",
            WorkflowKind::ClinicalDecision => "clinical_decision",
            WorkflowKind::DocumentProcessing => "document_processing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Paused,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run state (the checkpoint payload)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node: String,
    pub attempts: u32,
    pub outcome: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub kind: WorkflowKind,
    pub session_id: String,
    pub current_node: String,
    pub status: RunStatus,
    /// The typed workflow state, serialized.
    pub payload: serde_json::Value,
    pub history: Vec<NodeRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Checkpoint sequence; increments at every node boundary.
    pub seq: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Node abstraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where control goes after a node completes.
pub enum Edge {
    Next,
    Goto(&'static str),
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Permanent,
}

#[derive(Debug)]
pub struct NodeError {
    pub class: FailureClass,
    pub message: String,
}

impl NodeError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Permanent,
            message: message.into(),
        }
    }
}

impl From<Error> for NodeError {
    fn from(e: Error) -> Self {
        if e.is_transient() {
            NodeError::transient(e.to_string())
        } else {
            NodeError::permanent(e.to_string())
        }
    }
}

/// Everything a node may touch. External calls made through these handles
/// are the run's suspension points.
#[derive(Clone)]
pub struct WorkflowDeps {
    pub repos: Repositories,
    pub beds: Arc<BedLifecycleManager>,
    pub llm: Arc<dyn LlmProvider>,
    pub vectors: Arc<dyn VectorStore>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}

#[derive(Clone)]
pub struct NodeContext {
    pub deps: WorkflowDeps,
    pub session_id: String,
    pub cancel: CancelToken,
}

#[async_trait::async_trait]
pub trait WorkflowNode<S>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, state: &mut S, ctx: &NodeContext) -> std::result::Result<Edge, NodeError>;

    /// Best-effort undo, invoked in reverse execution order when a run
    /// fails or is cancelled after this node committed its effects.
    async fn compensate(&self, _state: &mut S, _ctx: &NodeContext) {}
}

pub struct Graph<S> {
    nodes: Vec<Arc<dyn WorkflowNode<S>>>,
}

impl<S> Graph<S> {
    pub fn new(nodes: Vec<Arc<dyn WorkflowNode<S>>>) -> Self {
        Self { nodes }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name() == name)
    }

    fn first_node(&self) -> &str {
        self.nodes[0].name()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cancellation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A cancellation flag checked by the engine between nodes.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct RunHandle {
    key: CheckpointKey,
    kind: WorkflowKind,
    cancel: CancelToken,
}

pub struct WorkflowEngine {
    deps: WorkflowDeps,
    checkpoints: Arc<dyn CheckpointStore>,
    admission: Graph<AdmissionState>,
    clinical: Graph<ClinicalDecisionState>,
    document: Graph<DocumentProcessingState>,
    runs: Mutex<HashMap<String, RunHandle>>,
}

/// What `status` reports about a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunView {
    pub run_id: String,
    pub kind: WorkflowKind,
    pub session_id: String,
    pub current_node: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&RunState> for RunView {
    fn from(run: &RunState) -> Self {
        Self {
            run_id: run.run_id.clone(),
            kind: run.kind,
            session_id: run.session_id.clone(),
            current_node: run.current_node.clone(),
            status: run.status,
            error: run.error.clone(),
        }
    }
}

impl WorkflowEngine {
    pub fn new(deps: WorkflowDeps, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            admission: admission::graph(),
            clinical: clinical::graph(),
            document: document::graph(),
            deps,
            checkpoints,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Start a run and drive it to a terminal state. Exactly one active run
    /// per `(session_id, kind)` — a second start while one is live fails
    /// with `Conflict`.
    pub async fn start(
        &self,
        kind: WorkflowKind,
        session_id: &str,
        input: serde_json::Value,
    ) -> Result<RunState> {
        let key = CheckpointKey::new(session_id, kind.as_str());

        // A prior non-terminal run owns the key until resumed or cancelled;
        // a terminal run's checkpoint is cleared for the new episode.
        if let Some((_, bytes)) = self.checkpoints.get(&key).await? {
            let previous: RunState = serde_json::from_slice(&bytes)?;
            if !previous.status.is_terminal() {
                return Err(Error::Conflict(format!(
                    "an active {} run already exists for session {session_id}",
                    kind.as_str()
                )));
            }
            self.checkpoints.delete(&key).await?;
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancelToken::new();
        self.runs.lock().insert(
            run_id.clone(),
            RunHandle {
                key: key.clone(),
                kind,
                cancel: cancel.clone(),
            },
        );

        let run = RunState {
            run_id,
            kind,
            session_id: session_id.to_owned(),
            current_node: String::new(),
            status: RunStatus::Running,
            payload: serde_json::Value::Null,
            history: Vec::new(),
            error: None,
            seq: 0,
        };

        match kind {
            WorkflowKind::Admission => {
                let state = AdmissionState::from_input(input)?;
                let mut run = run;
                run.current_node = self.admission.first_node().to_owned();
                self.drive(&self.admission, run, state, cancel).await
            }
            WorkflowKind::ClinicalDecision => {
                let state = ClinicalDecisionState::from_input(input)?;
                let mut run = run;
                run.current_node = self.clinical.first_node().to_owned();
                self.drive(&self.clinical, run, state, cancel).await
            }
            WorkflowKind::DocumentProcessing => {
                let state = DocumentProcessingState::from_input(input)?;
                let mut run = run;
                run.current_node = self.document.first_node().to_owned();
                self.drive(&self.document, run, state, cancel).await
            }
        }
    }

    /// Continue a run known to this process from its last checkpoint.
    pub async fn resume(&self, run_id: &str) -> Result<RunState> {
        let (key, kind) = {
            let runs = self.runs.lock();
            let handle = runs
                .get(run_id)
                .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
            (handle.key.clone(), handle.kind)
        };
        self.resume_key(&key, kind).await
    }

    /// Continue whatever run is checkpointed for `(session_id, kind)` —
    /// the restart path, where run ids are no longer in memory.
    pub async fn resume_session(&self, session_id: &str, kind: WorkflowKind) -> Result<RunState> {
        let key = CheckpointKey::new(session_id, kind.as_str());
        self.resume_key(&key, kind).await
    }

    async fn resume_key(&self, key: &CheckpointKey, kind: WorkflowKind) -> Result<RunState> {
        let (_, bytes) = self
            .checkpoints
            .get(key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no checkpoint for {}", key.session_id)))?;
        let run: RunState = serde_json::from_slice(&bytes)?;
        if run.status.is_terminal() {
            return Ok(run);
        }

        let cancel = CancelToken::new();
        self.runs.lock().insert(
            run.run_id.clone(),
            RunHandle {
                key: key.clone(),
                kind,
                cancel: cancel.clone(),
            },
        );

        match kind {
            WorkflowKind::Admission => {
                let state: AdmissionState = serde_json::from_value(run.payload.clone())?;
                self.drive(&self.admission, run, state, cancel).await
            }
            WorkflowKind::ClinicalDecision => {
                let state: ClinicalDecisionState = serde_json::from_value(run.payload.clone())?;
                self.drive(&self.clinical, run, state, cancel).await
            }
            WorkflowKind::DocumentProcessing => {
                let state: DocumentProcessingState = serde_json::from_value(run.payload.clone())?;
                self.drive(&self.document, run, state, cancel).await
            }
        }
    }

    /// Current node and status of a run.
    pub async fn status(&self, run_id: &str) -> Result<RunView> {
        let key = {
            let runs = self.runs.lock();
            runs.get(run_id).map(|h| h.key.clone())
        }
        .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        let (_, bytes) = self
            .checkpoints
            .get(&key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("run {run_id} has no checkpoint")))?;
        let run: RunState = serde_json::from_slice(&bytes)?;
        Ok(RunView::from(&run))
    }

    /// Request cancellation. A live run aborts at its next node boundary;
    /// a parked (crashed/paused) run is marked failed immediately.
    pub async fn cancel(&self, run_id: &str) -> Result<RunView> {
        let key = {
            let runs = self.runs.lock();
            let handle = runs
                .get(run_id)
                .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
            handle.cancel.cancel();
            handle.key.clone()
        };

        let Some((seq, bytes)) = self.checkpoints.get(&key).await? else {
            return Err(Error::NotFound(format!("run {run_id} has no checkpoint")));
        };
        let mut run: RunState = serde_json::from_slice(&bytes)?;
        if !run.status.is_terminal() {
            // The driver may be parked (e.g. the process that started it
            // died); mark the checkpoint failed so the key frees up. A live
            // driver will observe the token before its next node instead,
            // in which case this write is the one the driver would make.
            run.status = RunStatus::Failed;
            run.error = Some("cancelled".into());
            run.seq = seq + 1;
            match self
                .checkpoints
                .put(&key, run.seq, serde_json::to_vec(&run)?)
                .await
            {
                Ok(()) => {}
                // Lost the race against the live driver's own write.
                Err(Error::Conflict(_)) => return self.status(run_id).await,
                Err(e) => return Err(e),
            }
        }
        Ok(RunView::from(&run))
    }

    // ── The drive loop ───────────────────────────────────────────

    async fn drive<S>(
        &self,
        graph: &Graph<S>,
        mut run: RunState,
        mut state: S,
        cancel: CancelToken,
    ) -> Result<RunState>
    where
        S: Serialize + DeserializeOwned + Send,
    {
        let retry_max = self.deps.config.workflows.node_retry_max;
        let ctx = NodeContext {
            deps: self.deps.clone(),
            session_id: run.session_id.clone(),
            cancel: cancel.clone(),
        };
        let key = CheckpointKey::new(&run.session_id, run.kind.as_str());
        let mut executed: Vec<usize> = Vec::new();

        loop {
            if cancel.is_cancelled() {
                self.compensate_executed(graph, &executed, &mut state, &ctx).await;
                run.status = RunStatus::Failed;
                run.error = Some("cancelled".into());
                if let Some(stored) = self.commit(&key, &mut run, &state).await? {
                    run = stored;
                }
                break;
            }

            let Some(idx) = graph.position(&run.current_node) else {
                return Err(Error::Internal(format!(
                    "workflow {} has no node named {}",
                    run.kind.as_str(),
                    run.current_node
                )));
            };
            let node = graph.nodes[idx].clone();

            let mut attempts = 0u32;
            let edge = loop {
                attempts += 1;
                match node.run(&mut state, &ctx).await {
                    Ok(edge) => break Ok(edge),
                    Err(e) if e.class == FailureClass::Transient && attempts <= retry_max => {
                        tracing::warn!(
                            node = node.name(),
                            attempt = attempts,
                            error = %e.message,
                            "workflow node failed transiently, retrying"
                        );
                        let backoff = 50u64.saturating_mul(1 << attempts.min(6));
                        tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                    }
                    Err(e) => break Err(e),
                }
            };

            match edge {
                Ok(edge) => {
                    executed.push(idx);
                    run.history.push(NodeRecord {
                        node: node.name().into(),
                        attempts,
                        outcome: "ok".into(),
                        at: self.deps.clock.now(),
                    });
                    match edge {
                        Edge::Next => {
                            if idx + 1 >= graph.nodes.len() {
                                run.status = RunStatus::Succeeded;
                            } else {
                                run.current_node = graph.nodes[idx + 1].name().to_owned();
                            }
                        }
                        Edge::Goto(target) => {
                            if graph.position(target).is_none() {
                                return Err(Error::Internal(format!(
                                    "workflow {} routes to unknown node {target}",
                                    run.kind.as_str()
                                )));
                            }
                            run.current_node = target.to_owned();
                        }
                        Edge::Finish => run.status = RunStatus::Succeeded,
                    }
                    if let Some(stored) = self.commit(&key, &mut run, &state).await? {
                        // A concurrent cancel finalized the run; undo this
                        // driver's committed effects before adopting it.
                        self.compensate_executed(graph, &executed, &mut state, &ctx).await;
                        run = stored;
                        break;
                    }
                    if run.status.is_terminal() {
                        break;
                    }
                }
                Err(e) => {
                    run.history.push(NodeRecord {
                        node: node.name().into(),
                        attempts,
                        outcome: format!("failed: {}", e.message),
                        at: self.deps.clock.now(),
                    });
                    self.compensate_executed(graph, &executed, &mut state, &ctx).await;
                    run.status = RunStatus::Failed;
                    run.error = Some(e.message);
                    if let Some(stored) = self.commit(&key, &mut run, &state).await? {
                        run = stored;
                    }
                    break;
                }
            }
        }

        TraceEvent::WorkflowFinished {
            run_id: run.run_id.clone(),
            kind: run.kind.as_str().into(),
            status: match run.status {
                RunStatus::Succeeded => "succeeded".into(),
                RunStatus::Failed => "failed".into(),
                _ => "running".into(),
            },
        }
        .emit();
        Ok(run)
    }

    async fn compensate_executed<S>(
        &self,
        graph: &Graph<S>,
        executed: &[usize],
        state: &mut S,
        ctx: &NodeContext,
    ) where
        S: Send,
    {
        for &idx in executed.iter().rev() {
            graph.nodes[idx].compensate(state, ctx).await;
        }
    }

    /// Commit the run + typed state at a node boundary. The store enforces
    /// the single-writer sequence; losing the race to a writer that already
    /// finalized the run (a concurrent `cancel`) adopts the stored terminal
    /// state, returned as `Some`.
    async fn commit<S: Serialize>(
        &self,
        key: &CheckpointKey,
        run: &mut RunState,
        state: &S,
    ) -> Result<Option<RunState>> {
        run.payload = serde_json::to_value(state)?;
        run.seq += 1;
        let bytes = serde_json::to_vec(&run)?;
        match self.checkpoints.put(key, run.seq, bytes).await {
            Ok(()) => {
                TraceEvent::WorkflowCheckpoint {
                    run_id: run.run_id.clone(),
                    kind: run.kind.as_str().into(),
                    node: run.current_node.clone(),
                    seq: run.seq,
                }
                .emit();
                Ok(None)
            }
            Err(Error::Conflict(msg)) => {
                if let Some((_, stored_bytes)) = self.checkpoints.get(key).await? {
                    let stored: RunState = serde_json::from_slice(&stored_bytes)?;
                    if stored.status.is_terminal() {
                        tracing::warn!(
                            run_id = %run.run_id,
                            "checkpoint write lost to a terminal writer, adopting its state"
                        );
                        return Ok(Some(stored));
                    }
                }
                Err(Error::Conflict(msg))
            }
            Err(e) => Err(e),
        }
    }
}
