//! Clinical AI agent — wraps the LLM structured-output chains as tools.
//!
//! Every response is a `{structured_output, confidence, used_knowledge_refs}`
//! envelope: suggestions with a score, never an authoritative diagnosis.

use serde::Deserialize;
use serde_json::{json, Value};

use ward_domain::entity::EntityKind;
use ward_domain::{Error, Result};

use crate::registry::{ToolRegistry, ToolSpec};
use crate::workflow::WorkflowKind;

use super::{descriptor, parse, AgentDeps};

const AGENT: &str = "clinical";

pub fn register(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "enhanced_symptom_analysis",
            AGENT,
            "Analyze described symptoms against the knowledge base. Returns suggestions with a confidence score, not a diagnosis.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Symptom description" },
                    "patient": { "type": "string", "description": "Optional patient id or code for context" }
                },
                "required": ["query"]
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { symptom_analysis(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "enhanced_differential_diagnosis",
            AGENT,
            "Propose a ranked differential for a set of symptoms. Suggestions with confidence, not a diagnosis.",
            json!({
                "type": "object",
                "properties": {
                    "symptoms": { "type": "array", "items": { "type": "string" } },
                    "patient": { "type": "string", "description": "Optional patient id or code for context" }
                },
                "required": ["symptoms"]
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { differential_diagnosis(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "execute_clinical_decision_workflow",
            AGENT,
            "Run the full checkpointed clinical decision workflow (symptoms → history → knowledge → differential → recommendations).",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "patient": { "type": "string" },
                    "session_id": { "type": "string" }
                },
                "required": ["query"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    query: String,
                    patient: Option<String>,
                    session_id: Option<String>,
                }
                let req: Req = parse(&args)?;
                let patient_id = match req.patient {
                    Some(patient) => {
                        Some(d.resolver.resolve_ref(EntityKind::Patient, &patient).await?)
                    }
                    None => None,
                };
                let session_id = req
                    .session_id
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let run = super::workflows::run_blocking(
                    &d,
                    WorkflowKind::ClinicalDecision,
                    &session_id,
                    json!({ "query": req.query, "patient_id": patient_id }),
                )
                .await?;
                super::workflows::run_to_json(&run)
            })
        },
    ))?;

    Ok(())
}

/// Query the knowledge base for grounding snippets.
async fn knowledge_refs(d: &AgentDeps, needle: &str) -> Result<Vec<Value>> {
    let vector = d.llm.embed(needle).await?;
    let refs = d.vectors.query(&vector, 4).await?;
    Ok(refs
        .into_iter()
        .map(|r| json!({ "id": r.id, "score": r.score, "metadata": r.metadata }))
        .collect())
}

async fn patient_context(d: &AgentDeps, patient: Option<String>) -> Result<Value> {
    let Some(patient) = patient else {
        return Ok(Value::Null);
    };
    let id = d.resolver.resolve_ref(EntityKind::Patient, &patient).await?;
    let record = d
        .repos
        .patients
        .get(&id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("patient {id}")))?;
    let notes = d.repos.notes.for_patient(&id).await?;
    Ok(json!({
        "patient_code": record.patient_code,
        "date_of_birth": record.date_of_birth,
        "recent_notes": notes.iter().rev().take(3).map(|n| n.text.clone()).collect::<Vec<_>>(),
    }))
}

fn suggestion_envelope(structured: Value, refs: Vec<Value>) -> Value {
    let confidence = structured["confidence"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0);
    json!({
        "structured_output": structured,
        "confidence": confidence,
        "used_knowledge_refs": refs,
        "disclaimer": "AI-generated suggestions for clinician review; not a diagnosis.",
    })
}

async fn symptom_analysis(d: AgentDeps, args: Value) -> Result<Value> {
    #[derive(Deserialize)]
    struct Req {
        query: String,
        patient: Option<String>,
    }
    let req: Req = parse(&args)?;
    let context = patient_context(&d, req.patient).await?;
    let refs = knowledge_refs(&d, &req.query).await?;

    let schema = json!({
        "type": "object",
        "properties": {
            "symptoms": { "type": "array", "items": { "type": "string" } },
            "severity": { "type": "string" },
            "red_flags": { "type": "array", "items": { "type": "string" } },
            "confidence": { "type": "number" }
        },
        "required": ["symptoms"]
    });
    let prompt = format!(
        "Patient context: {context}\nKnowledge: {}\n\nAnalyze these symptoms: {}",
        json!(refs),
        req.query
    );
    let structured = d.llm.structured(&prompt, &schema).await?;
    Ok(suggestion_envelope(structured, refs))
}

async fn differential_diagnosis(d: AgentDeps, args: Value) -> Result<Value> {
    #[derive(Deserialize)]
    struct Req {
        symptoms: Vec<String>,
        patient: Option<String>,
    }
    let req: Req = parse(&args)?;
    if req.symptoms.is_empty() {
        return Err(Error::InvalidArguments("symptoms must not be empty".into()));
    }
    let context = patient_context(&d, req.patient).await?;
    let refs = knowledge_refs(&d, &req.symptoms.join(" ")).await?;

    let schema = json!({
        "type": "object",
        "properties": {
            "differential": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "condition": { "type": "string" },
                        "likelihood": { "type": "number" }
                    },
                    "required": ["condition"]
                }
            },
            "confidence": { "type": "number" }
        },
        "required": ["differential"]
    });
    let prompt = format!(
        "Patient context: {context}\nKnowledge: {}\n\nSymptoms: {}\nPropose a ranked differential.",
        json!(refs),
        req.symptoms.join(", ")
    );
    let structured = d.llm.structured(&prompt, &schema).await?;
    Ok(suggestion_envelope(structured, refs))
}
