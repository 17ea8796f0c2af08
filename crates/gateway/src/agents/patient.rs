//! Patient agent.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use ward_domain::entity::{EntityKind, Patient, PatientStatus};
use ward_domain::{Error, Result};

use crate::registry::{ToolRegistry, ToolSpec};

use super::{descriptor, parse, to_json, AgentDeps};

const AGENT: &str = "patient";

pub fn register(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "create_patient",
            AGENT,
            "Register a new patient. Accepts an optional pre-assigned patient code; otherwise one is generated.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Full name" },
                    "date_of_birth": { "type": "string", "description": "YYYY-MM-DD" },
                    "patient_code": { "type": "string", "description": "Optional unique code (e.g. P001)" }
                },
                "required": ["name", "date_of_birth"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { create_patient(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "search_patients",
            AGENT,
            "Search patients by name or code substring.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" }
                },
                "required": ["query"]
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    query: String,
                }
                let req: Req = parse(&args)?;
                let patients = d.repos.patients.search(&req.query).await?;
                Ok(json!({ "patients": to_json(&patients)?, "count": patients.len() }))
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "get_patient",
            AGENT,
            "Fetch one patient by id or patient code.",
            json!({
                "type": "object",
                "properties": {
                    "patient": { "type": "string", "description": "Patient id or code" }
                },
                "required": ["patient"]
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    patient: String,
                }
                let req: Req = parse(&args)?;
                let id = d.resolver.resolve_ref(EntityKind::Patient, &req.patient).await?;
                let patient = d
                    .repos
                    .patients
                    .get(&id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("patient {id}")))?;
                to_json(&patient)
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "update_patient",
            AGENT,
            "Update a patient's demographic fields.",
            json!({
                "type": "object",
                "properties": {
                    "patient": { "type": "string", "description": "Patient id or code" },
                    "name": { "type": "string" },
                    "date_of_birth": { "type": "string" }
                },
                "required": ["patient"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { update_patient(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "get_patient_medical_history",
            AGENT,
            "Clinical notes recorded for a patient, oldest first.",
            json!({
                "type": "object",
                "properties": {
                    "patient": { "type": "string", "description": "Patient id or code" }
                },
                "required": ["patient"]
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    patient: String,
                }
                let req: Req = parse(&args)?;
                let id = d.resolver.resolve_ref(EntityKind::Patient, &req.patient).await?;
                let notes = d.repos.notes.for_patient(&id).await?;
                Ok(json!({ "patient_id": id, "notes": to_json(&notes)?, "count": notes.len() }))
            })
        },
    ))?;

    Ok(())
}

async fn create_patient(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        name: String,
        date_of_birth: String,
        patient_code: Option<String>,
    }
    let req: Req = parse(&args)?;
    if req.name.trim().is_empty() {
        return Err(Error::InvalidArguments("name must not be empty".into()));
    }
    if NaiveDate::parse_from_str(&req.date_of_birth, "%Y-%m-%d").is_err() {
        return Err(Error::InvalidArguments(format!(
            "date_of_birth '{}' is not YYYY-MM-DD",
            req.date_of_birth
        )));
    }

    let code = match req.patient_code {
        Some(code) => code,
        None => d.repos.patients.allocate_code().await?,
    };
    let now = d.clock.now();
    let patient = Patient {
        id: uuid::Uuid::new_v4().to_string(),
        patient_code: code,
        name: req.name,
        date_of_birth: req.date_of_birth,
        status: PatientStatus::Active,
        created_at: now,
        admitted_at: Some(now),
    };
    let patient = d.repos.patients.insert(patient).await?;
    to_json(&patient)
}

async fn update_patient(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        patient: String,
        name: Option<String>,
        date_of_birth: Option<String>,
    }
    let req: Req = parse(&args)?;
    let id = d.resolver.resolve_ref(EntityKind::Patient, &req.patient).await?;
    let mut patient = d
        .repos
        .patients
        .get(&id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("patient {id}")))?;
    if let Some(name) = req.name {
        if name.trim().is_empty() {
            return Err(Error::InvalidArguments("name must not be empty".into()));
        }
        patient.name = name;
    }
    if let Some(dob) = req.date_of_birth {
        if NaiveDate::parse_from_str(&dob, "%Y-%m-%d").is_err() {
            return Err(Error::InvalidArguments(format!("date_of_birth '{dob}' is not YYYY-MM-DD")));
        }
        patient.date_of_birth = dob;
    }
    let patient = d.repos.patients.update(patient).await?;
    to_json(&patient)
}
