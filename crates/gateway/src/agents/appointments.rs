//! Appointment agent.
//!
//! Scheduling enforces no overlap per doctor among `scheduled`
//! appointments, using half-open `[start, end)` intervals: back-to-back
//! bookings are legal.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use ward_domain::entity::{Appointment, AppointmentStatus, EntityKind};
use ward_domain::{Error, Result};

use crate::registry::{ToolRegistry, ToolSpec};

use super::{descriptor, parse, to_json, AgentDeps};

const AGENT: &str = "appointment";

pub fn register(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "create_appointment",
            AGENT,
            "Book an appointment. Fails with a conflict when the doctor already has an overlapping scheduled appointment.",
            json!({
                "type": "object",
                "properties": {
                    "patient": { "type": "string", "description": "Patient id or code" },
                    "doctor": { "type": "string", "description": "Doctor staff id or employee code" },
                    "start_at": { "type": "string", "description": "RFC 3339 timestamp" },
                    "duration_minutes": { "type": "integer" },
                    "reason": { "type": "string" }
                },
                "required": ["patient", "doctor", "start_at", "duration_minutes"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { create_appointment(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "list_appointments",
            AGENT,
            "List appointments for a patient or a doctor.",
            json!({
                "type": "object",
                "properties": {
                    "patient": { "type": "string" },
                    "doctor": { "type": "string" }
                }
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { list_appointments(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "update_appointment_status",
            AGENT,
            "Complete or cancel an appointment.",
            json!({
                "type": "object",
                "properties": {
                    "appointment_id": { "type": "string" },
                    "status": { "type": "string", "enum": ["scheduled", "completed", "cancelled"] }
                },
                "required": ["appointment_id", "status"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    appointment_id: String,
                    status: AppointmentStatus,
                }
                let req: Req = parse(&args)?;
                let mut appointment = d
                    .repos
                    .appointments
                    .get(&req.appointment_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("appointment {}", req.appointment_id)))?;
                appointment.status = req.status;
                to_json(&d.repos.appointments.update(appointment).await?)
            })
        },
    ))?;

    Ok(())
}

async fn create_appointment(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        patient: String,
        doctor: String,
        start_at: DateTime<Utc>,
        duration_minutes: i64,
        reason: Option<String>,
    }
    let req: Req = parse(&args)?;
    if req.duration_minutes <= 0 {
        return Err(Error::InvalidArguments(
            "duration_minutes must be positive".into(),
        ));
    }
    let patient_id = d.resolver.resolve_ref(EntityKind::Patient, &req.patient).await?;
    let doctor_id = d.resolver.resolve_ref(EntityKind::Staff, &req.doctor).await?;

    let candidate = Appointment {
        id: uuid::Uuid::new_v4().to_string(),
        patient_id,
        doctor_id: doctor_id.clone(),
        start_at: req.start_at,
        duration_minutes: req.duration_minutes,
        status: AppointmentStatus::Scheduled,
        reason: req.reason,
    };

    let existing = d.repos.appointments.for_doctor(&doctor_id).await?;
    if let Some(clash) = existing
        .iter()
        .filter(|a| a.status == AppointmentStatus::Scheduled)
        .find(|a| a.overlaps(&candidate))
    {
        return Err(Error::Conflict(format!(
            "doctor {} already has appointment {} from {} to {}",
            doctor_id,
            clash.id,
            clash.start_at.format("%H:%M"),
            clash.end_at().format("%H:%M"),
        )));
    }

    to_json(&d.repos.appointments.insert(candidate).await?)
}

async fn list_appointments(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        patient: Option<String>,
        doctor: Option<String>,
    }
    let req: Req = parse(&args)?;
    let appointments = if let Some(patient) = req.patient {
        let id = d.resolver.resolve_ref(EntityKind::Patient, &patient).await?;
        d.repos.appointments.for_patient(&id).await?
    } else if let Some(doctor) = req.doctor {
        let id = d.resolver.resolve_ref(EntityKind::Staff, &doctor).await?;
        d.repos.appointments.for_doctor(&id).await?
    } else {
        return Err(Error::InvalidArguments(
            "provide either patient or doctor".into(),
        ));
    };
    Ok(json!({ "appointments": to_json(&appointments)?, "count": appointments.len() }))
}
