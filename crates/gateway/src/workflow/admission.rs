//! Patient admission workflow.
//!
//! ```text
//! validate_patient → create_patient → find_bed → assign_bed → assign_staff
//!     → assign_equipment → generate_reports → finalize
//!                              │
//!   find_bed ─(no candidates)─► wait_or_fail ─(retry budget left)─► find_bed
//!                                    └─(exhausted)─► failed: no_bed_available
//! ```
//!
//! `create_patient` declares compensation (the row it inserted is removed),
//! so a run that fails hunting for a bed leaves no patient behind.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ward_domain::entity::{
    Equipment, EquipmentStatus, EquipmentUsage, MedicalNote, Patient, PatientDraft, PatientStatus,
    Staff, StaffAssignment, StaffRole,
};
use ward_domain::{Error, Result};

use super::{Edge, Graph, NodeContext, NodeError, WorkflowNode};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionState {
    pub input: PatientDraft,
    #[serde(default)]
    pub validation_result: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub candidate_beds: Vec<String>,
    #[serde(default)]
    pub selected_bed_id: Option<String>,
    #[serde(default)]
    pub assigned_staff: Vec<String>,
    #[serde(default)]
    pub assigned_equipment: Vec<String>,
    #[serde(default)]
    pub equipment_usage_id: Option<String>,
    #[serde(default)]
    pub reports: Vec<String>,
    #[serde(default)]
    pub bed_search_attempts: u32,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl AdmissionState {
    pub fn from_input(input: serde_json::Value) -> Result<Self> {
        let draft: PatientDraft = serde_json::from_value(input)
            .map_err(|e| Error::InvalidArguments(format!("admission input: {e}")))?;
        Ok(Self {
            input: draft,
            validation_result: None,
            patient_id: None,
            candidate_beds: Vec::new(),
            selected_bed_id: None,
            assigned_staff: Vec::new(),
            assigned_equipment: Vec::new(),
            equipment_usage_id: None,
            reports: Vec::new(),
            bed_search_attempts: 0,
            status: "pending".into(),
            errors: Vec::new(),
        })
    }
}

pub fn graph() -> Graph<AdmissionState> {
    Graph::new(vec![
        Arc::new(ValidatePatient),
        Arc::new(CreatePatient),
        Arc::new(FindBed),
        Arc::new(AssignBed),
        Arc::new(AssignStaff),
        Arc::new(AssignEquipment),
        Arc::new(GenerateReports),
        Arc::new(Finalize),
        Arc::new(WaitOrFail),
    ])
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Nodes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ValidatePatient;

#[async_trait::async_trait]
impl WorkflowNode<AdmissionState> for ValidatePatient {
    fn name(&self) -> &'static str {
        "validate_patient"
    }

    async fn run(
        &self,
        state: &mut AdmissionState,
        _ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        if state.input.name.trim().is_empty() {
            return Err(NodeError::permanent("patient name must not be empty"));
        }
        if NaiveDate::parse_from_str(&state.input.date_of_birth, "%Y-%m-%d").is_err() {
            return Err(NodeError::permanent(format!(
                "date_of_birth '{}' is not YYYY-MM-DD",
                state.input.date_of_birth
            )));
        }
        state.validation_result = Some("ok".into());
        Ok(Edge::Next)
    }
}

struct CreatePatient;

#[async_trait::async_trait]
impl WorkflowNode<AdmissionState> for CreatePatient {
    fn name(&self) -> &'static str {
        "create_patient"
    }

    async fn run(
        &self,
        state: &mut AdmissionState,
        ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let repos = &ctx.deps.repos;
        let code = match &state.input.patient_code {
            Some(code) => code.clone(),
            None => repos.patients.allocate_code().await?,
        };
        let now = ctx.deps.clock.now();
        let patient = Patient {
            id: uuid::Uuid::new_v4().to_string(),
            patient_code: code,
            name: state.input.name.clone(),
            date_of_birth: state.input.date_of_birth.clone(),
            status: PatientStatus::Active,
            created_at: now,
            admitted_at: Some(now),
        };
        let patient = repos.patients.insert(patient).await.map_err(|e| match e {
            Error::Conflict(msg) => NodeError::permanent(msg),
            other => NodeError::from(other),
        })?;
        state.patient_id = Some(patient.id);
        Ok(Edge::Next)
    }

    async fn compensate(&self, state: &mut AdmissionState, ctx: &NodeContext) {
        let Some(patient_id) = state.patient_id.take() else {
            return;
        };
        if let Err(e) = ctx.deps.repos.patients.remove(&patient_id).await {
            tracing::warn!(patient_id, error = %e, "admission compensation: patient removal failed");
        }
    }
}

struct FindBed;

#[async_trait::async_trait]
impl WorkflowNode<AdmissionState> for FindBed {
    fn name(&self) -> &'static str {
        "find_bed"
    }

    async fn run(
        &self,
        state: &mut AdmissionState,
        ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let available = ctx
            .deps
            .repos
            .beds
            .list(Some(ward_domain::entity::BedStatus::Available))
            .await?;
        state.candidate_beds = available.into_iter().map(|b| b.id).collect();
        if state.candidate_beds.is_empty() {
            Ok(Edge::Goto("wait_or_fail"))
        } else {
            Ok(Edge::Next)
        }
    }
}

struct AssignBed;

#[async_trait::async_trait]
impl WorkflowNode<AdmissionState> for AssignBed {
    fn name(&self) -> &'static str {
        "assign_bed"
    }

    async fn run(
        &self,
        state: &mut AdmissionState,
        ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let patient_id = state
            .patient_id
            .clone()
            .ok_or_else(|| NodeError::permanent("assign_bed reached without a patient"))?;

        // Candidates can be taken between find_bed and here; walk the list.
        for bed_id in state.candidate_beds.clone() {
            match ctx.deps.beds.assign(&bed_id, &patient_id).await {
                Ok(_) => {
                    state.selected_bed_id = Some(bed_id);
                    return Ok(Edge::Next);
                }
                Err(Error::BedUnavailable(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Edge::Goto("wait_or_fail"))
    }

    async fn compensate(&self, state: &mut AdmissionState, ctx: &NodeContext) {
        let (Some(bed_id), Some(patient_id)) = (&state.selected_bed_id, &state.patient_id) else {
            return;
        };
        if let Err(e) = ctx.deps.beds.revert_assignment(bed_id, patient_id).await {
            tracing::warn!(bed_id, error = %e, "admission compensation: bed revert failed");
        }
    }
}

struct WaitOrFail;

#[async_trait::async_trait]
impl WorkflowNode<AdmissionState> for WaitOrFail {
    fn name(&self) -> &'static str {
        "wait_or_fail"
    }

    async fn run(
        &self,
        state: &mut AdmissionState,
        ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let cfg = &ctx.deps.config.workflows;
        if state.bed_search_attempts < cfg.admission_bed_retry_attempts {
            state.bed_search_attempts += 1;
            tokio::time::sleep(std::time::Duration::from_millis(
                cfg.admission_bed_retry_delay_ms,
            ))
            .await;
            return Ok(Edge::Goto("find_bed"));
        }
        state.status = "no_bed_available".into();
        Err(NodeError::permanent("no_bed_available"))
    }
}

struct AssignStaff;

#[async_trait::async_trait]
impl WorkflowNode<AdmissionState> for AssignStaff {
    fn name(&self) -> &'static str {
        "assign_staff"
    }

    async fn run(
        &self,
        state: &mut AdmissionState,
        ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let patient_id = state
            .patient_id
            .clone()
            .ok_or_else(|| NodeError::permanent("assign_staff reached without a patient"))?;
        let staff = ctx.deps.repos.staff.list(true).await?;
        let Some(member) = pick_care_staff(&staff) else {
            state.errors.push("no active staff available for care team".into());
            return Ok(Edge::Next);
        };

        let assignment = StaffAssignment {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            staff_id: member.id.clone(),
            role_on_case: match member.role {
                StaffRole::Doctor => "attending".into(),
                _ => "primary_care".into(),
            },
            started_at: ctx.deps.clock.now(),
            ended_at: None,
        };
        ctx.deps.repos.assignments.insert(assignment).await?;
        state.assigned_staff.push(member.id.clone());
        Ok(Edge::Next)
    }
}

fn pick_care_staff(staff: &[Staff]) -> Option<&Staff> {
    staff
        .iter()
        .find(|s| s.role == StaffRole::Doctor)
        .or_else(|| staff.iter().find(|s| s.role == StaffRole::Nurse))
        .or_else(|| staff.first())
}

struct AssignEquipment;

#[async_trait::async_trait]
impl WorkflowNode<AdmissionState> for AssignEquipment {
    fn name(&self) -> &'static str {
        "assign_equipment"
    }

    async fn run(
        &self,
        state: &mut AdmissionState,
        ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let patient_id = state
            .patient_id
            .clone()
            .ok_or_else(|| NodeError::permanent("assign_equipment reached without a patient"))?;
        let Some(operator) = state.assigned_staff.first().cloned() else {
            state
                .errors
                .push("no care staff assigned, skipping equipment".into());
            return Ok(Edge::Next);
        };
        let devices = ctx.deps.repos.equipment.list().await?;
        let Some(device) = devices
            .into_iter()
            .find(|d: &Equipment| d.status == EquipmentStatus::Available)
        else {
            return Ok(Edge::Next);
        };

        let usage = EquipmentUsage {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            equipment_id: device.id.clone(),
            operator_id: operator,
            started_at: ctx.deps.clock.now(),
            ended_at: None,
            purpose: "admission monitoring".into(),
        };
        let usage = ctx.deps.repos.equipment_usage.insert(usage).await?;
        let mut device = device;
        device.status = EquipmentStatus::InUse;
        ctx.deps.repos.equipment.update(device.clone()).await?;
        state.assigned_equipment.push(device.id);
        state.equipment_usage_id = Some(usage.id);
        Ok(Edge::Next)
    }

    async fn compensate(&self, state: &mut AdmissionState, ctx: &NodeContext) {
        let Some(usage_id) = state.equipment_usage_id.take() else {
            return;
        };
        let now = ctx.deps.clock.now();
        if let Err(e) = ctx.deps.repos.equipment_usage.close(&usage_id, now).await {
            tracing::warn!(usage_id, error = %e, "admission compensation: usage close failed");
        }
        for equipment_id in state.assigned_equipment.drain(..) {
            if let Ok(Some(mut device)) = ctx.deps.repos.equipment.get(&equipment_id).await {
                device.status = EquipmentStatus::Available;
                if let Err(e) = ctx.deps.repos.equipment.update(device).await {
                    tracing::warn!(equipment_id, error = %e, "admission compensation: device release failed");
                }
            }
        }
    }
}

struct GenerateReports;

#[async_trait::async_trait]
impl WorkflowNode<AdmissionState> for GenerateReports {
    fn name(&self) -> &'static str {
        "generate_reports"
    }

    async fn run(
        &self,
        state: &mut AdmissionState,
        ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        let patient_id = state
            .patient_id
            .clone()
            .ok_or_else(|| NodeError::permanent("generate_reports reached without a patient"))?;
        let author = state
            .assigned_staff
            .first()
            .cloned()
            .unwrap_or_else(|| "system".into());
        let note = MedicalNote {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            author_id: author,
            text: format!(
                "Admitted {} to bed {}. Care team: {}.",
                state.input.name,
                state.selected_bed_id.as_deref().unwrap_or("unassigned"),
                if state.assigned_staff.is_empty() {
                    "pending".to_owned()
                } else {
                    state.assigned_staff.join(", ")
                }
            ),
            written_at: ctx.deps.clock.now(),
        };
        let note = ctx.deps.repos.notes.insert(note).await?;
        state.reports.push(note.id);
        Ok(Edge::Next)
    }
}

struct Finalize;

#[async_trait::async_trait]
impl WorkflowNode<AdmissionState> for Finalize {
    fn name(&self) -> &'static str {
        "finalize"
    }

    async fn run(
        &self,
        state: &mut AdmissionState,
        _ctx: &NodeContext,
    ) -> std::result::Result<Edge, NodeError> {
        state.status = "admitted".into();
        Ok(Edge::Finish)
    }
}
