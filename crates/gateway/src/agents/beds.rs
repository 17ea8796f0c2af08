//! Bed/room agent — every tool delegates to the bed lifecycle manager.

use serde::Deserialize;
use serde_json::json;

use ward_domain::entity::{Bed, BedStatus, EntityKind};
use ward_domain::{Error, Result};

use crate::registry::{ToolRegistry, ToolSpec};

use super::{descriptor, parse, to_json, AgentDeps};

const AGENT: &str = "bed";

pub fn register(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "create_bed",
            AGENT,
            "Add a bed to a room. Bed numbers are unique within a room.",
            json!({
                "type": "object",
                "properties": {
                    "bed_number": { "type": "string" },
                    "room_id": { "type": "string" }
                },
                "required": ["bed_number", "room_id"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    bed_number: String,
                    room_id: String,
                }
                let req: Req = parse(&args)?;
                let bed = d
                    .repos
                    .beds
                    .insert(Bed {
                        id: uuid::Uuid::new_v4().to_string(),
                        bed_number: req.bed_number,
                        room_id: req.room_id,
                        status: BedStatus::Available,
                        current_patient_id: None,
                        cleaning_started_at: None,
                        cleaning_duration_minutes: None,
                    })
                    .await?;
                to_json(&bed)
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "list_beds",
            AGENT,
            "List beds, optionally filtered by status, with cleaning progress.",
            json!({
                "type": "object",
                "properties": {
                    "status": {
                        "type": "string",
                        "enum": ["available", "occupied", "cleaning", "maintenance", "reserved"]
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
                    status: Option<BedStatus>,
                }
                let req: Req = parse(&args)?;
                let beds = d.repos.beds.list(req.status).await?;
                let views: Vec<_> = beds.iter().map(|b| d.beds.status_of(b)).collect();
                Ok(json!({ "beds": to_json(&views)?, "count": views.len() }))
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "assign_bed_to_patient",
            AGENT,
            "Put an active patient into an available or reserved bed.",
            json!({
                "type": "object",
                "properties": {
                    "bed": { "type": "string", "description": "Bed id or bed number" },
                    "patient": { "type": "string", "description": "Patient id or code" }
                },
                "required": ["bed", "patient"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                let (bed_id, patient_id) = resolve_pair(&d, &args).await?;
                let bed = d.beds.assign(&bed_id, &patient_id).await?;
                to_json(&d.beds.status_of(&bed))
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "discharge_bed",
            AGENT,
            "Vacate an occupied bed and start its cleaning timer.",
            json!({
                "type": "object",
                "properties": {
                    "bed": { "type": "string", "description": "Bed id or bed number" }
                },
                "required": ["bed"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                let bed_id = resolve_bed(&d, &args).await?;
                let (bed, eta) = d.beds.discharge(&bed_id).await?;
                let view = d.beds.status_of(&bed);
                Ok(json!({ "bed": to_json(&view)?, "cleaning_eta": eta }))
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "get_bed_status_with_time_remaining",
            AGENT,
            "Bed status with cleaning time remaining and progress percent.",
            json!({
                "type": "object",
                "properties": {
                    "bed": { "type": "string", "description": "Bed id or bed number" }
                },
                "required": ["bed"]
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                let bed_id = resolve_bed(&d, &args).await?;
                to_json(&d.beds.status(&bed_id).await?)
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "create_bed_turnover",
            AGENT,
            "Start a turnover cycle on an occupied bed (vacate + clean).",
            json!({
                "type": "object",
                "properties": {
                    "bed": { "type": "string", "description": "Bed id or bed number" }
                },
                "required": ["bed"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                let bed_id = resolve_bed(&d, &args).await?;
                let (bed, eta) = d.beds.discharge(&bed_id).await?;
                Ok(json!({
                    "turnover": {
                        "bed_id": bed.id,
                        "bed_number": bed.bed_number,
                        "started_at": bed.cleaning_started_at,
                        "cleaning_eta": eta,
                    }
                }))
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "update_bed_status",
            AGENT,
            "Move a bed between available, maintenance, and reserved.",
            json!({
                "type": "object",
                "properties": {
                    "bed": { "type": "string", "description": "Bed id or bed number" },
                    "status": { "type": "string", "enum": ["available", "maintenance", "reserved"] }
                },
                "required": ["bed", "status"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { update_bed_status(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "auto_update_expired_cleaning_beds",
            AGENT,
            "Sweep cleaning beds whose timer expired and make them available.",
            json!({ "type": "object", "properties": {} }),
            true,
        ),
        move |_args| {
            let d = d.clone();
            Box::pin(async move {
                let updated = d.beds.sweep_expired().await;
                Ok(json!({ "updated": updated }))
            })
        },
    ))?;

    Ok(())
}

async fn resolve_bed(d: &AgentDeps, args: &serde_json::Value) -> Result<String> {
    #[derive(Deserialize)]
    struct Req {
        bed: String,
    }
    let req: Req = parse(args)?;
    d.resolver.resolve_ref(EntityKind::Bed, &req.bed).await
}

async fn resolve_pair(d: &AgentDeps, args: &serde_json::Value) -> Result<(String, String)> {
    #[derive(Deserialize)]
    struct Req {
        bed: String,
        patient: String,
    }
    let req: Req = parse(args)?;
    let bed_id = d.resolver.resolve_ref(EntityKind::Bed, &req.bed).await?;
    let patient_id = d.resolver.resolve_ref(EntityKind::Patient, &req.patient).await?;
    Ok((bed_id, patient_id))
}

async fn update_bed_status(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        bed: String,
        status: BedStatus,
    }
    let req: Req = parse(&args)?;
    let bed_id = d.resolver.resolve_ref(EntityKind::Bed, &req.bed).await?;
    let current = d
        .repos
        .beds
        .get(&bed_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("bed {bed_id}")))?;

    let bed = match (current.status, req.status) {
        (BedStatus::Maintenance, BedStatus::Available) => d.beds.clear_maintenance(&bed_id).await?,
        (BedStatus::Reserved, BedStatus::Available) => d.beds.release(&bed_id).await?,
        (BedStatus::Cleaning, BedStatus::Available) => {
            d.beds.force_complete_cleaning(&bed_id).await?
        }
        (_, BedStatus::Maintenance) => d.beds.mark_maintenance(&bed_id).await?,
        (BedStatus::Available, BedStatus::Reserved) => d.beds.reserve(&bed_id).await?,
        (from, to) => {
            return Err(Error::IllegalTransition {
                bed_id,
                from: from.as_str().into(),
                action: format!("set_status:{}", to.as_str()),
            })
        }
    };
    to_json(&d.beds.status_of(&bed))
}
