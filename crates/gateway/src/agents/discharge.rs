//! Discharge agent — delegates to the discharge aggregator.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use ward_domain::entity::EntityKind;
use ward_domain::{Error, Result};

use crate::discharge::DischargeInput;
use crate::registry::{ToolRegistry, ToolSpec};

use super::{descriptor, parse, to_json, AgentDeps};

const AGENT: &str = "discharge";

pub fn register(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "generate_discharge_report",
            AGENT,
            "Discharge a patient: aggregate the episode into a report, start the bed's cleaning cycle, and mark the patient discharged — atomically.",
            json!({
                "type": "object",
                "properties": {
                    "patient": { "type": "string", "description": "Patient id or code" },
                    "bed": { "type": "string", "description": "Bed id or number; derived from occupancy when omitted" },
                    "episode_start": { "type": "string", "description": "RFC 3339; defaults to admission time" },
                    "episode_end": { "type": "string", "description": "RFC 3339; defaults to now" }
                },
                "required": []
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { generate(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "get_discharge_report",
            AGENT,
            "Fetch a previously generated discharge report.",
            json!({
                "type": "object",
                "properties": {
                    "report_id": { "type": "string" }
                },
                "required": ["report_id"]
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    report_id: String,
                }
                let req: Req = parse(&args)?;
                let report = d
                    .repos
                    .reports
                    .get(&req.report_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("report {}", req.report_id)))?;
                to_json(&report)
            })
        },
    ))?;

    Ok(())
}

async fn generate(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        patient: Option<String>,
        bed: Option<String>,
        episode_start: Option<DateTime<Utc>>,
        episode_end: Option<DateTime<Utc>>,
    }
    let req: Req = parse(&args)?;

    // Either reference works; a bed reference pins the patient to its
    // current occupant.
    let (patient_id, bed_id) = match (&req.patient, &req.bed) {
        (Some(patient), bed) => {
            let patient_id = d.resolver.resolve_ref(EntityKind::Patient, patient).await?;
            let bed_id = match bed {
                Some(bed) => Some(d.resolver.resolve_ref(EntityKind::Bed, bed).await?),
                None => None,
            };
            (patient_id, bed_id)
        }
        (None, Some(bed)) => {
            let bed_id = d.resolver.resolve_ref(EntityKind::Bed, bed).await?;
            let bed = d
                .repos
                .beds
                .get(&bed_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("bed {bed_id}")))?;
            let patient_id = bed.current_patient_id.ok_or_else(|| {
                Error::Conflict(format!("bed {bed_id} has no current patient"))
            })?;
            (patient_id, Some(bed_id))
        }
        (None, None) => {
            return Err(Error::InvalidArguments(
                "provide a patient or a bed reference".into(),
            ))
        }
    };

    let report = d
        .aggregator
        .generate(DischargeInput {
            patient_id,
            bed_id,
            episode_start: req.episode_start,
            episode_end: req.episode_end,
        })
        .await?;
    to_json(&report)
}
