//! Inventory agent.
//!
//! Every stock movement goes through `apply_transaction`, which appends an
//! InventoryTransaction and adjusts the quantity in one repository call.
//! Quantities never go negative.

use serde::Deserialize;
use serde_json::json;

use ward_domain::entity::{EntityKind, PatientSupplyUsage, Supply, TransactionKind};
use ward_domain::{Error, Result};

use crate::registry::{ToolRegistry, ToolSpec};

use super::{descriptor, parse, to_json, AgentDeps};

const AGENT: &str = "inventory";

pub fn register(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "create_supply",
            AGENT,
            "Register a supply item. Item codes are unique; one is generated when omitted.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "item_code": { "type": "string" },
                    "category_id": { "type": "string" },
                    "quantity_on_hand": { "type": "integer" },
                    "reorder_threshold": { "type": "integer" }
                },
                "required": ["name"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { create_supply(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "list_supplies",
            AGENT,
            "List supply items with current stock.",
            json!({ "type": "object", "properties": {} }),
            false,
        ),
        move |_args| {
            let d = d.clone();
            Box::pin(async move {
                let supplies = d.repos.supplies.list().await?;
                Ok(json!({ "supplies": to_json(&supplies)?, "count": supplies.len() }))
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "update_supply_stock",
            AGENT,
            "Apply a signed stock delta (restock, consume, adjust). Refuses to take quantity below zero.",
            json!({
                "type": "object",
                "properties": {
                    "supply": { "type": "string", "description": "Supply id or item code" },
                    "delta": { "type": "integer" },
                    "kind": { "type": "string", "enum": ["restock", "consume", "adjust"] },
                    "performed_by": { "type": "string" }
                },
                "required": ["supply", "delta", "kind", "performed_by"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { update_stock(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "get_low_stock_supplies",
            AGENT,
            "Supplies at or below their reorder threshold.",
            json!({ "type": "object", "properties": {} }),
            false,
        ),
        move |_args| {
            let d = d.clone();
            Box::pin(async move {
                let low: Vec<Supply> = d
                    .repos
                    .supplies
                    .list()
                    .await?
                    .into_iter()
                    .filter(|s| s.quantity_on_hand <= s.reorder_threshold)
                    .collect();
                Ok(json!({ "supplies": to_json(&low)?, "count": low.len() }))
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "record_patient_supply_usage",
            AGENT,
            "Record a supply administered to a patient; consumes stock accordingly.",
            json!({
                "type": "object",
                "properties": {
                    "supply": { "type": "string", "description": "Supply id or item code" },
                    "patient": { "type": "string", "description": "Patient id or code" },
                    "quantity": { "type": "integer" },
                    "administered_by": { "type": "string" }
                },
                "required": ["supply", "patient", "quantity", "administered_by"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { record_usage(d, args).await })
        },
    ))?;

    Ok(())
}

async fn create_supply(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        name: String,
        item_code: Option<String>,
        category_id: Option<String>,
        #[serde(default)]
        quantity_on_hand: i64,
        #[serde(default)]
        reorder_threshold: i64,
    }
    let req: Req = parse(&args)?;
    if req.quantity_on_hand < 0 {
        return Err(Error::InvalidArguments(
            "quantity_on_hand must not be negative".into(),
        ));
    }
    let code = match req.item_code {
        Some(code) => code,
        None => {
            let existing = d.repos.supplies.list().await?;
            let max: u32 = existing
                .iter()
                .filter_map(|s| s.item_code.strip_prefix("MED"))
                .filter_map(|n| n.parse().ok())
                .max()
                .unwrap_or(0);
            format!("MED{:03}", max + 1)
        }
    };
    let supply = Supply {
        id: uuid::Uuid::new_v4().to_string(),
        item_code: code,
        name: req.name,
        category_id: req.category_id,
        quantity_on_hand: 0,
        reorder_threshold: req.reorder_threshold,
    };
    let supply = d.repos.supplies.insert(supply).await?;
    // Seed stock through a transaction so the delta-sum invariant holds
    // from the first unit.
    if req.quantity_on_hand > 0 {
        d.repos
            .supplies
            .apply_transaction(
                &supply.id,
                req.quantity_on_hand,
                TransactionKind::Restock,
                "system",
                d.clock.now(),
            )
            .await?;
    }
    let supply = d
        .repos
        .supplies
        .get(&supply.id)
        .await?
        .ok_or_else(|| Error::Internal("supply vanished after insert".into()))?;
    to_json(&supply)
}

async fn update_stock(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        supply: String,
        delta: i64,
        kind: TransactionKind,
        performed_by: String,
    }
    let req: Req = parse(&args)?;
    let id = d.resolver.resolve_ref(EntityKind::Supply, &req.supply).await?;
    let (supply, tx) = d
        .repos
        .supplies
        .apply_transaction(&id, req.delta, req.kind, &req.performed_by, d.clock.now())
        .await?;
    Ok(json!({ "supply": to_json(&supply)?, "transaction": to_json(&tx)? }))
}

async fn record_usage(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        supply: String,
        patient: String,
        quantity: i64,
        administered_by: String,
    }
    let req: Req = parse(&args)?;
    if req.quantity <= 0 {
        return Err(Error::InvalidArguments("quantity must be positive".into()));
    }
    let supply_id = d.resolver.resolve_ref(EntityKind::Supply, &req.supply).await?;
    let patient_id = d.resolver.resolve_ref(EntityKind::Patient, &req.patient).await?;

    // Consume first; the usage row only exists if stock moved.
    let (supply, tx) = d
        .repos
        .supplies
        .apply_transaction(
            &supply_id,
            -req.quantity,
            TransactionKind::Consume,
            &req.administered_by,
            d.clock.now(),
        )
        .await?;

    let usage = PatientSupplyUsage {
        id: uuid::Uuid::new_v4().to_string(),
        patient_id,
        supply_id: supply_id.clone(),
        quantity: req.quantity,
        administered_by: req.administered_by.clone(),
        administered_at: d.clock.now(),
    };
    let usage = match d.repos.supply_usage.insert(usage).await {
        Ok(usage) => usage,
        Err(e) => {
            // Give the stock back rather than leave a phantom consumption.
            if let Err(undo) = d
                .repos
                .supplies
                .apply_transaction(
                    &supply_id,
                    req.quantity,
                    TransactionKind::Adjust,
                    &req.administered_by,
                    d.clock.now(),
                )
                .await
            {
                tracing::error!(error = %undo, "failed to restore stock after usage insert failure");
            }
            return Err(e);
        }
    };
    Ok(json!({
        "usage": to_json(&usage)?,
        "supply": to_json(&supply)?,
        "transaction": to_json(&tx)?,
    }))
}
