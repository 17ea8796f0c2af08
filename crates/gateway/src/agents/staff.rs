//! Staff agent.

use serde::Deserialize;
use serde_json::json;

use ward_domain::entity::{EntityKind, Staff, StaffAssignment, StaffRole};
use ward_domain::{Error, Result};

use crate::registry::{ToolRegistry, ToolSpec};

use super::{descriptor, parse, to_json, AgentDeps};

const AGENT: &str = "staff";

pub fn register(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "create_staff",
            AGENT,
            "Register a staff member. Employee codes are unique; one is generated when omitted.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "role": { "type": "string", "enum": ["doctor", "nurse", "technician", "admin", "support"] },
                    "employee_code": { "type": "string" },
                    "department_id": { "type": "string" }
                },
                "required": ["name", "role"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { create_staff(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "list_staff",
            AGENT,
            "List staff members, optionally active only.",
            json!({
                "type": "object",
                "properties": {
                    "active_only": { "type": "boolean" }
                }
            }),
            false,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    #[serde(default)]
                    active_only: bool,
                }
                let req: Req = parse(&args)?;
                let staff = d.repos.staff.list(req.active_only).await?;
                Ok(json!({ "staff": to_json(&staff)?, "count": staff.len() }))
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "assign_staff_to_patient_simple",
            AGENT,
            "Add a staff member to a patient's care team.",
            json!({
                "type": "object",
                "properties": {
                    "staff": { "type": "string", "description": "Staff id or employee code" },
                    "patient": { "type": "string", "description": "Patient id or code" },
                    "role_on_case": { "type": "string" }
                },
                "required": ["staff", "patient"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move { assign_staff(d, args).await })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "update_staff_status",
            AGENT,
            "Activate or deactivate a staff member (soft delete).",
            json!({
                "type": "object",
                "properties": {
                    "staff": { "type": "string", "description": "Staff id or employee code" },
                    "active": { "type": "boolean" }
                },
                "required": ["staff", "active"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    staff: String,
                    active: bool,
                }
                let req: Req = parse(&args)?;
                let id = d.resolver.resolve_ref(EntityKind::Staff, &req.staff).await?;
                let mut member = d
                    .repos
                    .staff
                    .get(&id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("staff {id}")))?;
                member.active = req.active;
                to_json(&d.repos.staff.update(member).await?)
            })
        },
    ))?;

    Ok(())
}

async fn create_staff(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        name: String,
        role: StaffRole,
        employee_code: Option<String>,
        department_id: Option<String>,
    }
    let req: Req = parse(&args)?;
    if req.name.trim().is_empty() {
        return Err(Error::InvalidArguments("name must not be empty".into()));
    }
    let code = match req.employee_code {
        Some(code) => code,
        None => next_employee_code(&d).await?,
    };
    let member = Staff {
        id: uuid::Uuid::new_v4().to_string(),
        employee_code: code,
        name: req.name,
        role: req.role,
        department_id: req.department_id,
        active: true,
    };
    to_json(&d.repos.staff.insert(member).await?)
}

async fn next_employee_code(d: &AgentDeps) -> Result<String> {
    let existing = d.repos.staff.list(false).await?;
    let max: u32 = existing
        .iter()
        .filter_map(|s| s.employee_code.strip_prefix("EMP"))
        .filter_map(|n| n.parse().ok())
        .max()
        .unwrap_or(0);
    Ok(format!("EMP{:03}", max + 1))
}

async fn assign_staff(d: AgentDeps, args: serde_json::Value) -> Result<serde_json::Value> {
    #[derive(Deserialize)]
    struct Req {
        staff: String,
        patient: String,
        role_on_case: Option<String>,
    }
    let req: Req = parse(&args)?;
    let staff_id = d.resolver.resolve_ref(EntityKind::Staff, &req.staff).await?;
    let patient_id = d.resolver.resolve_ref(EntityKind::Patient, &req.patient).await?;
    let member = d
        .repos
        .staff
        .get(&staff_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("staff {staff_id}")))?;
    if !member.active {
        return Err(Error::Conflict(format!("staff {staff_id} is not active")));
    }

    let assignment = StaffAssignment {
        id: uuid::Uuid::new_v4().to_string(),
        patient_id,
        staff_id,
        role_on_case: req.role_on_case.unwrap_or_else(|| "care_team".into()),
        started_at: d.clock.now(),
        ended_at: None,
    };
    to_json(&d.repos.assignments.insert(assignment).await?)
}
