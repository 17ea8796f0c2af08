//! Clinical decision support workflow.
//!
//! ```text
//! extract_symptoms → retrieve_history → search_knowledge → differential
//!     → recommend → score_confidence → finalize
//! ```
//!
//! Every LLM-bearing node demands structured output; a response that does
//! not match the node's shape is retried once with a stricter prompt, then
//! fails the step. The output is a set of suggestions with a confidence
//! score, never an authoritative diagnosis.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ward_domain::{Error, Result};

use super::{Edge, Graph, NodeContext, NodeError, WorkflowNode};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalDecisionState {
    pub query: String,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub patient_context: Value,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub knowledge_snippets: Vec<Value>,
    #[serde(default)]
    pub differential: Vec<Value>,
    #[serde(default)]
    pub recommendations: Vec<Value>,
    #[serde(default)]
    pub node_confidences: Vec<f64>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClinicalInput {
    query: String,
    #[serde(default)]
    patient_id: Option<String>,
}

impl ClinicalDecisionState {
    pub fn from_input(input: Value) -> Result<Self> {
        let input: ClinicalInput = serde_json::from_value(input)
            .map_err(|e| Error::InvalidArguments(format!("clinical decision input: {e}")))?;
        if input.query.trim().is_empty() {
            return Err(Error::InvalidArguments("query must not be empty".into()));
        }
        Ok(Self {
            query: input.query,
            patient_id: input.patient_id,
            patient_context: Value::Null,
            symptoms: Vec::new(),
            history: Vec::new(),
            knowledge_snippets: Vec::new(),
            differential: Vec::new(),
            recommendations: Vec::new(),
            node_confidences: Vec::new(),
            confidence: 0.0,
            errors: Vec::new(),
        })
    }
}

pub fn graph() -> Graph<ClinicalDecisionState> {
    Graph::new(vec![
        Arc::new(ExtractSymptoms),
        Arc::new(RetrieveHistory),
        Arc::new(SearchKnowledge),
        Arc::new(Differential),
        Arc::new(Recommend),
        Arc::new(ScoreConfidence),
        Arc::new(Finalize),
    ])
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Structured-output helper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ask for structured output and re-ask once with a stricter prompt when
/// the response does not satisfy `accept`. Transport failures stay
/// transient so the engine's retry policy applies.
async fn structured_with_retry(
    ctx: &NodeContext,
    prompt: &str,
    schema: &Value,
    accept: impl Fn(&Value) -> bool,
) -> std::result::Result<Value, NodeError> {
    match ctx.deps.llm.structured(prompt, schema).await {
        Ok(value) if accept(&value) => return Ok(value),
        Ok(_) => {}
        Err(e) if e.is_transient() => return Err(NodeError::transient(e.to_string())),
        Err(e) => return Err(NodeError::permanent(e.to_string())),
    }

    let strict_prompt = format!(
        "{prompt}\n\nRespond with ONLY a JSON object that conforms exactly to the schema. \
         No prose, no markdown fences."
    );
    match ctx.deps.llm.structured(&strict_prompt, schema).await {
        Ok(value) if accept(&value) => Ok(value),
        Ok(_) => Err(NodeError::permanent(
            "structured output did not match the expected shape after retry",
        )),
        Err(e) if e.is_transient() => Err(NodeError::transient(e.to_string())),
        Err(e) => Err(NodeError::permanent(e.to_string())),
    }
}

fn confidence_of(value: &Value) -> f64 {
    value["confidence"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Nodes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ExtractSymptoms;

#[async_trait::async_trait]
impl WorkflowNode<ClinicalDecisionState> for ExtractSymptoms {
    fn name(&self) -> &'static str {
        "extract_symptoms"
    }

    async fn run(
        &self,
        state: &mut ClinicalDecisionState,
        ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "symptoms": { "type": "array", "items": { "type": "string" } },
                "confidence": { "type": "number" }
            },
            "required": ["symptoms"]
        });
        let prompt = format!(
            "Extract the clinical symptoms mentioned in this request:\n\n{}",
            state.query
        );
        let value = structured_with_retry(ctx, &prompt, &schema, |v| v["symptoms"].is_array()).await?;
        state.symptoms = value["symptoms"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|s| s.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default();
        state.node_confidences.push(confidence_of(&value));
        Ok(Edge::Next)
    }
}

struct RetrieveHistory;

#[async_trait::async_trait]
impl WorkflowNode<ClinicalDecisionState> for RetrieveHistory {
    fn name(&self) -> &'static str {
        "retrieve_history"
    }

    async fn run(
        &self,
        state: &mut ClinicalDecisionState,
        ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let Some(patient_id) = &state.patient_id else {
            return Ok(Edge::Next);
        };
        let patient = ctx.deps.repos.patients.get(patient_id).await?;
        let Some(patient) = patient else {
            state
                .errors
                .push(format!("patient {patient_id} not found, continuing without history"));
            return Ok(Edge::Next);
        };
        state.patient_context = serde_json::json!({
            "patient_code": patient.patient_code,
            "name": patient.name,
            "date_of_birth": patient.date_of_birth,
        });
        let notes = ctx.deps.repos.notes.for_patient(patient_id).await?;
        state.history = notes.into_iter().map(|n| n.text).collect();
        Ok(Edge::Next)
    }
}

struct SearchKnowledge;

#[async_trait::async_trait]
impl WorkflowNode<ClinicalDecisionState> for SearchKnowledge {
    fn name(&self) -> &'static str {
        "search_knowledge"
    }

    async fn run(
        &self,
        state: &mut ClinicalDecisionState,
        ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let needle = if state.symptoms.is_empty() {
            state.query.clone()
        } else {
            format!("{} {}", state.query, state.symptoms.join(" "))
        };
        let vector = ctx.deps.llm.embed(&needle).await?;
        let refs = ctx.deps.vectors.query(&vector, 4).await?;
        state.knowledge_snippets = refs
            .into_iter()
            .map(|r| serde_json::json!({ "id": r.id, "score": r.score, "metadata": r.metadata }))
            .collect();
        Ok(Edge::Next)
    }
}

struct Differential;

#[async_trait::async_trait]
impl WorkflowNode<ClinicalDecisionState> for Differential {
    fn name(&self) -> &'static str {
        "differential"
    }

    async fn run(
        &self,
        state: &mut ClinicalDecisionState,
        ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let schema = serde_json::json!({
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
            "Symptoms: {}\nHistory: {}\nKnowledge: {}\n\nPropose a differential diagnosis as candidate conditions with likelihoods.",
            state.symptoms.join(", "),
            state.history.join(" | "),
            serde_json::to_string(&state.knowledge_snippets).unwrap_or_default(),
        );
        let value =
            structured_with_retry(ctx, &prompt, &schema, |v| v["differential"].is_array()).await?;
        state.differential = value["differential"].as_array().cloned().unwrap_or_default();
        state.node_confidences.push(confidence_of(&value));
        Ok(Edge::Next)
    }
}

struct Recommend;

#[async_trait::async_trait]
impl WorkflowNode<ClinicalDecisionState> for Recommend {
    fn name(&self) -> &'static str {
        "recommend"
    }

    async fn run(
        &self,
        state: &mut ClinicalDecisionState,
        ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "recommendations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "action": { "type": "string" },
                            "rationale": { "type": "string" }
                        },
                        "required": ["action"]
                    }
                },
                "confidence": { "type": "number" }
            },
            "required": ["recommendations"]
        });
        let prompt = format!(
            "Differential: {}\n\nRecommend next clinical actions (tests, monitoring, referrals).",
            serde_json::to_string(&state.differential).unwrap_or_default(),
        );
        let value =
            structured_with_retry(ctx, &prompt, &schema, |v| v["recommendations"].is_array())
                .await?;
        state.recommendations = value["recommendations"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        state.node_confidences.push(confidence_of(&value));
        Ok(Edge::Next)
    }
}

struct ScoreConfidence;

#[async_trait::async_trait]
impl WorkflowNode<ClinicalDecisionState> for ScoreConfidence {
    fn name(&self) -> &'static str {
        "score_confidence"
    }

    async fn run(
        &self,
        state: &mut ClinicalDecisionState,
        _ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        state.confidence = aggregate_confidence(&state.node_confidences);
        Ok(Edge::Next)
    }
}

/// Arithmetic mean clamped to [0, 1]: deterministic for fixed inputs and
/// monotonic in every node confidence.
pub fn aggregate_confidence(node_confidences: &[f64]) -> f64 {
    if node_confidences.is_empty() {
        return 0.0;
    }
    let sum: f64 = node_confidences.iter().map(|c| c.clamp(0.0, 1.0)).sum();
    (sum / node_confidences.len() as f64).clamp(0.0, 1.0)
}

struct Finalize;

#[async_trait::async_trait]
impl WorkflowNode<ClinicalDecisionState> for Finalize {
    fn name(&self) -> &'static str {
        "finalize"
    }

    async fn run(
        &self,
        _state: &mut ClinicalDecisionState,
        _ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        Ok(Edge::Finish)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_mean_is_monotonic() {
        let low = aggregate_confidence(&[0.2, 0.4, 0.6]);
        let higher = aggregate_confidence(&[0.2, 0.7, 0.6]);
        assert!(higher > low);
    }

    #[test]
    fn confidence_stays_in_unit_interval() {
        assert_eq!(aggregate_confidence(&[]), 0.0);
        assert_eq!(aggregate_confidence(&[5.0, 9.0]), 1.0);
        let mid = aggregate_confidence(&[0.0, 1.0]);
        assert!((mid - 0.5).abs() < 1e-9);
    }

    #[test]
    fn rejects_empty_query() {
        let err = ClinicalDecisionState::from_input(serde_json::json!({"query": "  "}))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }
}
