//! Workflow adapter tools — thin blocking wrappers over the engine.
//!
//! Each adapter starts (or resumes) a run and blocks until it reaches a
//! terminal state or `workflows.start_timeout_ms` elapses. The run record
//! is the tool's payload, whether the run succeeded or failed.

use serde::Deserialize;
use serde_json::{json, Value};

use ward_domain::{Error, Result};

use crate::registry::{ToolRegistry, ToolSpec};
use crate::workflow::{RunState, WorkflowKind};

use super::{descriptor, parse, AgentDeps};

const AGENT: &str = "workflow";

pub fn register(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "execute_patient_admission_workflow",
            AGENT,
            "Run the full admission workflow: validate, create the patient, find and assign a bed, staff, and equipment, and write the admission note.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "date_of_birth": { "type": "string", "description": "YYYY-MM-DD" },
                    "patient_code": { "type": "string" },
                    "session_id": { "type": "string" }
                },
                "required": ["name", "date_of_birth"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    name: String,
                    date_of_birth: String,
                    patient_code: Option<String>,
                    session_id: Option<String>,
                }
                let req: Req = parse(&args)?;
                let session_id = req
                    .session_id
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let run = run_blocking(
                    &d,
                    WorkflowKind::Admission,
                    &session_id,
                    json!({
                        "name": req.name,
                        "date_of_birth": req.date_of_birth,
                        "patient_code": req.patient_code,
                    }),
                )
                .await?;
                run_to_json(&run)
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "execute_document_processing_workflow",
            AGENT,
            "Run the document processing workflow: parse, extract and validate entities, persist into the knowledge base.",
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "title": { "type": "string" },
                    "session_id": { "type": "string" }
                },
                "required": ["text"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    text: String,
                    title: Option<String>,
                    session_id: Option<String>,
                }
                let req: Req = parse(&args)?;
                let session_id = req
                    .session_id
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let run = run_blocking(
                    &d,
                    WorkflowKind::DocumentProcessing,
                    &session_id,
                    json!({ "text": req.text, "title": req.title }),
                )
                .await?;
                run_to_json(&run)
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "resume_workflow",
            AGENT,
            "Resume a checkpointed workflow run for a session, e.g. after a restart.",
            json!({
                "type": "object",
                "properties": {
                    "kind": { "type": "string", "enum": ["admission", "clinical_decision", "document_processing"] },
                    "session_id": { "type": "string" }
                },
                "required": ["kind", "session_id"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    kind: WorkflowKind,
                    session_id: String,
                }
                let req: Req = parse(&args)?;
                let engine = d.engine.clone();
                let timeout =
                    std::time::Duration::from_millis(d.config.workflows.start_timeout_ms);
                let run = tokio::time::timeout(
                    timeout,
                    engine.resume_session(&req.session_id, req.kind),
                )
                .await
                .map_err(|_| Error::Timeout("workflow resume exceeded its deadline".into()))??;
                run_to_json(&run)
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "get_workflow_status",
            AGENT,
            "Current node and status of a workflow run.",
            json!({
                "type": "object",
                "properties": {
                    "run_id": { "type": "string" }
                },
                "required": ["run_id"]
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    run_id: String,
                }
                let req: Req = parse(&args)?;
                let view = d.engine.status(&req.run_id).await?;
                serde_json::to_value(&view).map_err(Error::from)
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "cancel_workflow",
            AGENT,
            "Cooperatively cancel a workflow run; it aborts at its next step boundary.",
            json!({
                "type": "object",
                "properties": {
                    "run_id": { "type": "string" }
                },
                "required": ["run_id"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    run_id: String,
                }
                let req: Req = parse(&args)?;
                let view = d.engine.cancel(&req.run_id).await?;
                serde_json::to_value(&view).map_err(Error::from)
            })
        },
    ))?;

    Ok(())
}

/// Start a run and block until it is terminal or the configured timeout.
pub(crate) async fn run_blocking(
    d: &AgentDeps,
    kind: WorkflowKind,
    session_id: &str,
    input: Value,
) -> Result<RunState> {
    let timeout = std::time::Duration::from_millis(d.config.workflows.start_timeout_ms);
    tokio::time::timeout(timeout, d.engine.start(kind, session_id, input))
        .await
        .map_err(|_| Error::Timeout(format!("{} workflow exceeded its deadline", kind.as_str())))?
}

/// The run record as a tool payload. A failed run is still data — callers
/// read `status` and `error`.
pub(crate) fn run_to_json(run: &RunState) -> Result<Value> {
    Ok(json!({
        "run_id": run.run_id,
        "kind": run.kind,
        "session_id": run.session_id,
        "status": run.status,
        "error": run.error,
        "state": run.payload,
        "history": run.history.iter().map(|h| json!({
            "node": h.node,
            "attempts": h.attempts,
            "outcome": h.outcome,
        })).collect::<Vec<_>>(),
    }))
}
