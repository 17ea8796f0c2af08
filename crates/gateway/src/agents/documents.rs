//! Document agent — the RAG knowledge base surface.

use serde::Deserialize;
use serde_json::json;

use ward_domain::entity::DocumentRecord;
use ward_domain::{Error, Result};

use crate::registry::{ToolRegistry, ToolSpec};

use super::{descriptor, parse, to_json, AgentDeps};

const AGENT: &str = "document";

pub fn register(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "ingest_document",
            AGENT,
            "Store a document in the knowledge base and index it for retrieval.",
            json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "text": { "type": "string" },
                    "metadata": { "type": "object" }
                },
                "required": ["text"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { ingest(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "search_documents",
            AGENT,
            "Semantic search over the knowledge base.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "k": { "type": "integer", "description": "Max results (default 4)" }
                },
                "required": ["query"]
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { search(d, args).await })
        },
    ))?;

    Ok(())
}

async fn ingest(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        title: Option<String>,
        text: String,
        #[serde(default)]
        metadata: serde_json::Value,
    }
    let req: Req = parse(&args)?;
    if req.text.trim().is_empty() {
        return Err(Error::InvalidArguments("text must not be empty".into()));
    }

    let record = DocumentRecord {
        id: uuid::Uuid::new_v4().to_string(),
        title: req.title.unwrap_or_else(|| "untitled".into()),
        text: req.text,
        metadata: req.metadata,
    };
    let record = d.repos.documents.insert(record).await?;

    let vector = d.llm.embed(&record.text).await?;
    d.vectors
        .upsert(&record.id, vector, json!({ "title": record.title }))
        .await?;

    to_json(&record)
}

async fn search(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        query: String,
        k: Option<usize>,
    }
    let req: Req = parse(&args)?;
    let vector = d.llm.embed(&req.query).await?;
    let refs = d.vectors.query(&vector, req.k.unwrap_or(4)).await?;

    // Join back to the stored documents for display.
    let mut hits = Vec::new();
    for r in refs {
        let title = d
            .repos
            .documents
            .get(&r.id)
            .await?
            .map(|doc| doc.title)
            .unwrap_or_default();
        hits.push(json!({ "id": r.id, "score": r.score, "title": title }));
    }
    Ok(json!({ "results": hits }))
}
