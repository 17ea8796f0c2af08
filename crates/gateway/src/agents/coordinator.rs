//! Coordinator agent — the high-level tools the complex-request
//! classifier points at.

use serde::Deserialize;
use serde_json::json;

use ward_domain::entity::{EntityKind, TransactionKind};
use ward_domain::{Error, Result};

use crate::registry::{ToolRegistry, ToolSpec};

use super::{descriptor, parse, AgentDeps};

const AGENT: &str = "coordinator";

pub fn register(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "ai_master_request",
            AGENT,
            "Handle a broad analytics or dashboard request: summarize current hospital state and propose next steps.",
            json!({
                "type": "object",
                "properties": {
                    "request": { "type": "string" }
                },
                "required": ["request"]
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { master_request(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "run_predictive_forecast",
            AGENT,
            "Project days-to-stockout per supply from observed consumption. Deterministic; no model involved.",
            json!({
                "type": "object",
                "properties": {
                    "supply": { "type": "string", "description": "Supply id or item code; all supplies when omitted" },
                    "horizon_days": { "type": "integer", "description": "Flag supplies projected to run out within this horizon (default 14)" }
                }
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { forecast(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "translate_text",
            AGENT,
            "Translate text (e.g. discharge instructions) into a target language.",
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "target_language": { "type": "string" }
                },
                "required": ["text", "target_language"]
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { translate(d, args).await })
        },
    ))?;

    Ok(())
}

async fn master_request(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        request: String,
    }
    let req: Req = parse(&args)?;

    // Assemble the live figures first; the model only narrates them.
    let beds = d.repos.beds.list(None).await?;
    let occupied = beds
        .iter()
        .filter(|b| b.status == ward_domain::entity::BedStatus::Occupied)
        .count();
    let supplies = d.repos.supplies.list().await?;
    let low_stock = supplies
        .iter()
        .filter(|s| s.quantity_on_hand <= s.reorder_threshold)
        .count();
    let staff = d.repos.staff.list(true).await?;
    let snapshot = json!({
        "beds_total": beds.len(),
        "beds_occupied": occupied,
        "supplies_total": supplies.len(),
        "supplies_low_stock": low_stock,
        "active_staff": staff.len(),
    });

    let schema = json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string" },
            "highlights": { "type": "array", "items": { "type": "string" } },
            "suggested_actions": { "type": "array", "items": { "type": "string" } },
            "confidence": { "type": "number" }
        },
        "required": ["summary"]
    });
    let prompt = format!(
        "Hospital snapshot: {snapshot}\n\nRequest: {}\n\nAnswer from the snapshot only.",
        req.request
    );
    let structured = d.llm.structured(&prompt, &schema).await?;
    let confidence = structured["confidence"].as_f64().unwrap_or(0.5);
    Ok(json!({
        "structured_output": structured,
        "snapshot": snapshot,
        "confidence": confidence,
    }))
}

async fn forecast(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        supply: Option<String>,
        horizon_days: Option<i64>,
    }
    let req: Req = parse(&args)?;
    let horizon = req.horizon_days.unwrap_or(14).max(1);

    let supplies = match req.supply {
        Some(supply) => {
            let id = d.resolver.resolve_ref(EntityKind::Supply, &supply).await?;
            vec![d
                .repos
                .supplies
                .get(&id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("supply {id}")))?]
        }
        None => d.repos.supplies.list().await?,
    };

    let now = d.clock.now();
    let mut projections = Vec::new();
    for supply in supplies {
        let txs = d.repos.supplies.transactions_for(&supply.id).await?;
        let consumed: i64 = txs
            .iter()
            .filter(|t| t.kind == TransactionKind::Consume)
            .map(|t| -t.delta)
            .sum();
        let observed_days = txs
            .iter()
            .map(|t| (now - t.timestamp).num_days())
            .max()
            .unwrap_or(0)
            .max(1);
        let daily_rate = consumed as f64 / observed_days as f64;
        let days_to_stockout = if daily_rate > 0.0 {
            Some(supply.quantity_on_hand as f64 / daily_rate)
        } else {
            None
        };
        projections.push(json!({
            "supply_id": supply.id,
            "item_code": supply.item_code,
            "quantity_on_hand": supply.quantity_on_hand,
            "daily_consumption": daily_rate,
            "days_to_stockout": days_to_stockout,
            "at_risk": days_to_stockout.map(|days| days <= horizon as f64).unwrap_or(false),
        }));
    }
    Ok(json!({ "horizon_days": horizon, "projections": projections }))
}

async fn translate(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        text: String,
        target_language: String,
    }
    let req: Req = parse(&args)?;
    let schema = json!({
        "type": "object",
        "properties": {
            "translation": { "type": "string" },
            "confidence": { "type": "number" }
        },
        "required": ["translation"]
    });
    let prompt = format!(
        "Translate the following into {} preserving medical terminology:\n\n{}",
        req.target_language, req.text
    );
    let structured = d.llm.structured(&prompt, &schema).await?;
    Ok(json!({
        "translation": structured["translation"],
        "target_language": req.target_language,
        "confidence": structured["confidence"].as_f64().unwrap_or(0.5),
    }))
}
