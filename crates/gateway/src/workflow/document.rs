//! Document processing workflow.
//!
//! ```text
//! parse → extract_entities → validate_entities → persist
//! ```
//!
//! Entities that fail type constraints are recorded in `errors` and
//! dropped; the run only fails when every extracted entity is invalid.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ward_domain::entity::DocumentRecord;
use ward_domain::{Error, Result};

use super::{Edge, Graph, NodeContext, NodeError, WorkflowNode};

const ENTITY_KINDS: &[&str] = &["patient", "medication", "equipment", "procedure", "date"];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentProcessingState {
    pub document: Value,
    #[serde(default)]
    pub extracted_entities: Vec<Value>,
    #[serde(default)]
    pub validated_entities: Vec<Value>,
    #[serde(default)]
    pub stored_refs: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl DocumentProcessingState {
    pub fn from_input(input: Value) -> Result<Self> {
        if input.get("text").and_then(Value::as_str).is_none() {
            return Err(Error::InvalidArguments(
                "document input requires a 'text' field".into(),
            ));
        }
        Ok(Self {
            document: input,
            extracted_entities: Vec::new(),
            validated_entities: Vec::new(),
            stored_refs: Vec::new(),
            errors: Vec::new(),
        })
    }

    fn text(&self) -> &str {
        self.document
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn title(&self) -> String {
        self.document
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| "untitled".into())
    }
}

pub fn graph() -> Graph<DocumentProcessingState> {
    Graph::new(vec![
        Arc::new(Parse),
        Arc::new(ExtractEntities),
        Arc::new(ValidateEntities),
        Arc::new(Persist),
    ])
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Nodes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Parse;

#[async_trait::async_trait]
impl WorkflowNode<DocumentProcessingState> for Parse {
    fn name(&self) -> &'static str {
        "parse"
    }

    async fn run(
        &self,
        state: &mut DocumentProcessingState,
        _ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let text = state.text().trim().to_owned();
        if text.is_empty() {
            return Err(NodeError::permanent("document text is empty"));
        }
        let title = state.title();
        state.document = serde_json::json!({ "title": title, "text": text });
        Ok(Edge::Next)
    }
}

struct ExtractEntities;

#[async_trait::async_trait]
impl WorkflowNode<DocumentProcessingState> for ExtractEntities {
    fn name(&self) -> &'static str {
        "extract_entities"
    }

    async fn run(
        &self,
        state: &mut DocumentProcessingState,
        ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "entities": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "kind": { "type": "string" },
                            "value": { "type": "string" }
                        },
                        "required": ["kind", "value"]
                    }
                }
            },
            "required": ["entities"]
        });
        let prompt = format!(
            "Extract clinical entities (patient, medication, equipment, procedure, date) from:\n\n{}",
            state.text()
        );
        let value = ctx
            .deps
            .llm
            .structured(&prompt, &schema)
            .await
            .map_err(NodeError::from)?;
        state.extracted_entities = value["entities"].as_array().cloned().unwrap_or_default();
        Ok(Edge::Next)
    }
}

struct ValidateEntities;

#[async_trait::async_trait]
impl WorkflowNode<DocumentProcessingState> for ValidateEntities {
    fn name(&self) -> &'static str {
        "validate_entities"
    }

    async fn run(
        &self,
        state: &mut DocumentProcessingState,
        _ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        for entity in state.extracted_entities.clone() {
            match check_entity(&entity) {
                Ok(()) => state.validated_entities.push(entity),
                Err(reason) => state.errors.push(reason),
            }
        }
        if !state.extracted_entities.is_empty() && state.validated_entities.is_empty() {
            return Err(NodeError::permanent("all extracted entities were invalid"));
        }
        Ok(Edge::Next)
    }
}

fn check_entity(entity: &Value) -> std::result::Result<(), String> {
    let kind = entity["kind"].as_str().unwrap_or_default();
    let value = entity["value"].as_str().unwrap_or_default();
    if !ENTITY_KINDS.contains(&kind) {
        return Err(format!("entity kind '{kind}' is not recognized"));
    }
    if value.trim().is_empty() {
        return Err(format!("entity of kind '{kind}' has an empty value"));
    }
    Ok(())
}

struct Persist;

#[async_trait::async_trait]
impl WorkflowNode<DocumentProcessingState> for Persist {
    fn name(&self) -> &'static str {
        "persist"
    }

    async fn run(
        &self,
        state: &mut DocumentProcessingState,
        ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let record = DocumentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title: state.title(),
            text: state.text().to_owned(),
            metadata: serde_json::json!({ "entities": state.validated_entities }),
        };
        let record = ctx.deps.repos.documents.insert(record).await?;

        let vector = ctx.deps.llm.embed(&record.text).await?;
        ctx.deps
            .vectors
            .upsert(
                &record.id,
                vector,
                serde_json::json!({ "title": record.title }),
            )
            .await?;

        state.stored_refs.push(record.id);
        Ok(Edge::Finish)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_check_enforces_kind_and_value() {
        assert!(check_entity(&serde_json::json!({"kind": "medication", "value": "saline"})).is_ok());
        assert!(check_entity(&serde_json::json!({"kind": "spaceship", "value": "x"})).is_err());
        assert!(check_entity(&serde_json::json!({"kind": "date", "value": "  "})).is_err());
    }

    #[test]
    fn input_requires_text() {
        let err = DocumentProcessingState::from_input(serde_json::json!({"title": "t"}))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }
}
