//! Equipment agent.
//!
//! Device state machine: `available → in_use` only through a usage row,
//! `in_use → available` on usage close, `any → maintenance`,
//! `maintenance → available`.

use serde::Deserialize;
use serde_json::json;

use ward_domain::entity::{Equipment, EquipmentStatus, EquipmentUsage, EntityKind};
use ward_domain::{Error, Result};

use crate::registry::{ToolRegistry, ToolSpec};

use super::{descriptor, parse, to_json, AgentDeps};

const AGENT: &str = "equipment";

pub fn register(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "create_equipment",
            AGENT,
            "Register a device. Equipment codes are unique; one is generated when omitted.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "equipment_code": { "type": "string" },
                    "category_id": { "type": "string" },
                    "location": { "type": "string" }
                },
                "required": ["name"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { create_equipment(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "list_equipment",
            AGENT,
            "List devices, optionally filtered by status.",
            json!({
                "type": "object",
                "properties": {
                    "status": {
                        "type": "string",
                        "enum": ["available", "in_use", "maintenance", "out_of_service"]
                    }
                }
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    status: Option<EquipmentStatus>,
                }
                let req: Req = parse(&args)?;
                let devices: Vec<Equipment> = d
                    .repos
                    .equipment
                    .list()
                    .await?
                    .into_iter()
                    .filter(|e| req.status.map_or(true, |s| e.status == s))
                    .collect();
                Ok(json!({ "equipment": to_json(&devices)?, "count": devices.len() }))
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "update_equipment_status",
            AGENT,
            "Move a device between maintenance, out_of_service, and available. in_use is only reachable through a usage record.",
            json!({
                "type": "object",
                "properties": {
                    "equipment": { "type": "string", "description": "Equipment id or code" },
                    "status": { "type": "string", "enum": ["available", "maintenance", "out_of_service"] }
                },
                "required": ["equipment", "status"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { update_status(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "add_equipment_usage_simple",
            AGENT,
            "Open a usage episode: an operator uses an available device on a patient.",
            json!({
                "type": "object",
                "properties": {
                    "equipment": { "type": "string", "description": "Equipment id or code" },
                    "patient": { "type": "string", "description": "Patient id or code" },
                    "operator": { "type": "string", "description": "Staff id or employee code" },
                    "purpose": { "type": "string" }
                },
                "required": ["equipment", "patient", "operator"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { add_usage(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "close_equipment_usage",
            AGENT,
            "End a usage episode and return the device to available.",
            json!({
                "type": "object",
                "properties": {
                    "usage_id": { "type": "string" }
                },
                "required": ["usage_id"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { close_usage(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "schedule_equipment_maintenance",
            AGENT,
            "Take a device out of rotation for maintenance.",
            json!({
                "type": "object",
                "properties": {
                    "equipment": { "type": "string", "description": "Equipment id or code" },
                    "reason": { "type": "string" }
                },
                "required": ["equipment"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { schedule_maintenance(d, args).await })
        },
    ))?;

    Ok(())
}

async fn create_equipment(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        name: String,
        equipment_code: Option<String>,
        category_id: Option<String>,
        location: Option<String>,
    }
    let req: Req = parse(&args)?;
    let code = match req.equipment_code {
        Some(code) => code,
        None => {
            let existing = d.repos.equipment.list().await?;
            let max: u32 = existing
                .iter()
                .filter_map(|e| e.equipment_code.strip_prefix("EQ"))
                .filter_map(|n| n.parse().ok())
                .max()
                .unwrap_or(0);
            format!("EQ{:03}", max + 1)
        }
    };
    let device = Equipment {
        id: uuid::Uuid::new_v4().to_string(),
        equipment_code: code,
        name: req.name,
        category_id: req.category_id,
        status: EquipmentStatus::Available,
        location: req.location,
    };
    to_json(&d.repos.equipment.insert(device).await?)
}

async fn update_status(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        equipment: String,
        status: EquipmentStatus,
    }
    let req: Req = parse(&args)?;
    let id = d.resolver.resolve_ref(EntityKind::Equipment, &req.equipment).await?;
    let mut device = d
        .repos
        .equipment
        .get(&id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("equipment {id}")))?;

    let legal = match (device.status, req.status) {
        (_, EquipmentStatus::Maintenance) | (_, EquipmentStatus::OutOfService) => true,
        (EquipmentStatus::Maintenance, EquipmentStatus::Available)
        | (EquipmentStatus::OutOfService, EquipmentStatus::Available) => true,
        _ => false,
    };
    if !legal {
        return Err(Error::Conflict(format!(
            "equipment {} cannot go from {:?} to {:?} directly",
            id, device.status, req.status
        )));
    }
    device.status = req.status;
    to_json(&d.repos.equipment.update(device).await?)
}

async fn add_usage(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        equipment: String,
        patient: String,
        operator: String,
        purpose: Option<String>,
    }
    let req: Req = parse(&args)?;
    let equipment_id = d.resolver.resolve_ref(EntityKind::Equipment, &req.equipment).await?;
    let patient_id = d.resolver.resolve_ref(EntityKind::Patient, &req.patient).await?;
    let operator_id = d.resolver.resolve_ref(EntityKind::Staff, &req.operator).await?;

    let mut device = d
        .repos
        .equipment
        .get(&equipment_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("equipment {equipment_id}")))?;
    if device.status != EquipmentStatus::Available {
        return Err(Error::Conflict(format!(
            "equipment {equipment_id} is {:?}, not available",
            device.status
        )));
    }

    let usage = EquipmentUsage {
        id: uuid::Uuid::new_v4().to_string(),
        patient_id,
        equipment_id: equipment_id.clone(),
        operator_id,
        started_at: d.clock.now(),
        ended_at: None,
        purpose: req.purpose.unwrap_or_else(|| "treatment".into()),
    };
    let usage = d.repos.equipment_usage.insert(usage).await?;
    device.status = EquipmentStatus::InUse;
    d.repos.equipment.update(device).await?;
    to_json(&usage)
}

async fn close_usage(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        usage_id: String,
    }
    let req: Req = parse(&args)?;
    let usage = d.repos.equipment_usage.close(&req.usage_id, d.clock.now()).await?;

    // Return the device to rotation unless another open usage holds it.
    let open = d
        .repos
        .equipment_usage
        .open_for_equipment(&usage.equipment_id)
        .await?;
    if open.is_empty() {
        if let Some(mut device) = d.repos.equipment.get(&usage.equipment_id).await? {
            if device.status == EquipmentStatus::InUse {
                device.status = EquipmentStatus::Available;
                d.repos.equipment.update(device).await?;
            }
        }
    }
    to_json(&usage)
}

async fn schedule_maintenance(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        equipment: String,
        reason: Option<String>,
    }
    let req: Req = parse(&args)?;
    let id = d.resolver.resolve_ref(EntityKind::Equipment, &req.equipment).await?;
    let mut device = d
        .repos
        .equipment
        .get(&id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("equipment {id}")))?;
    device.status = EquipmentStatus::Maintenance;
    let device = d.repos.equipment.update(device).await?;
    Ok(json!({
        "equipment": to_json(&device)?,
        "reason": req.reason.unwrap_or_else(|| "scheduled maintenance".into()),
        "scheduled_at": d.clock.now(),
    }))
}
