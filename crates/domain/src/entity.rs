//! Core entities of the hospital operations platform.
//!
//! Ids are opaque, stable strings (UUIDs at creation time). Human-readable
//! codes (`patient_code`, `employee_code`, `item_code`, `equipment_code`,
//! `bed_number`) are first-class at the tool boundary and resolved to ids
//! exactly once, at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Patient
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    Active,
    Discharged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    /// Human-readable unique code (e.g. `P001`).
    pub patient_code: String,
    pub name: String,
    pub date_of_birth: String,
    pub status: PatientStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub admitted_at: Option<DateTime<Utc>>,
}

/// Input shape for creating a patient (the admission draft).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientDraft {
    pub name: String,
    pub date_of_birth: String,
    #[serde(default)]
    pub patient_code: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Beds & rooms
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BedStatus {
    Available,
    Occupied,
    Cleaning,
    Maintenance,
    Reserved,
}

impl BedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BedStatus::Available => "available",
            BedStatus::Occupied => "occupied",
            BedStatus::Cleaning => "cleaning",
            BedStatus::Maintenance => "maintenance",
            BedStatus::Reserved => "reserved",
        }
    }
}

/// A bed. `current_patient_id` is non-null iff status is `occupied`;
/// `cleaning_started_at` is non-null iff status is `cleaning`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bed {
    pub id: String,
    /// Unique within its room (e.g. `101A`).
    pub bed_number: String,
    pub room_id: String,
    pub status: BedStatus,
    #[serde(default)]
    pub current_patient_id: Option<String>,
    #[serde(default)]
    pub cleaning_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cleaning_duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub room_number: String,
    pub department_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub floor: Option<i32>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Staff
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Roles a staff member may hold. Fixed set; the tool boundary rejects
/// anything else as invalid arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Doctor,
    Nurse,
    Technician,
    Admin,
    Support,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staff {
    pub id: String,
    /// Unique employee code (e.g. `EMP001`).
    pub employee_code: String,
    pub name: String,
    pub role: StaffRole,
    #[serde(default)]
    pub department_id: Option<String>,
    pub active: bool,
}

/// Membership of a staff member on a patient's care team. Append-only;
/// ended by an explicit close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffAssignment {
    pub id: String,
    pub patient_id: String,
    pub staff_id: String,
    pub role_on_case: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Equipment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    Available,
    InUse,
    Maintenance,
    OutOfService,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    pub id: String,
    /// Unique equipment code (e.g. `EQ001`).
    pub equipment_code: String,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<String>,
    pub status: EquipmentStatus,
    #[serde(default)]
    pub location: Option<String>,
}

/// A usage episode of a device on a patient. `ended_at >= started_at` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentUsage {
    pub id: String,
    pub patient_id: String,
    pub equipment_id: String,
    pub operator_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub purpose: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supplies & inventory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supply {
    pub id: String,
    /// Unique item code (e.g. `MED001`).
    pub item_code: String,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<String>,
    pub quantity_on_hand: i64,
    pub reorder_threshold: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Restock,
    Consume,
    Adjust,
}

/// Append-only stock movement. The sum of deltas per supply equals
/// `quantity_on_hand`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: String,
    pub supply_id: String,
    pub delta: i64,
    pub kind: TransactionKind,
    pub actor_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A supply administered to a patient. Drives a corresponding consume
/// transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSupplyUsage {
    pub id: String,
    pub patient_id: String,
    pub supply_id: String,
    pub quantity: i64,
    pub administered_by: String,
    pub administered_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Appointments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub start_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Appointment {
    pub fn end_at(&self) -> DateTime<Utc> {
        self.start_at + chrono::Duration::minutes(self.duration_minutes)
    }

    /// Half-open interval overlap: `[start, end)` of both appointments.
    pub fn overlaps(&self, other: &Appointment) -> bool {
        self.start_at < other.end_at() && other.start_at < self.end_at()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Clinical notes & documents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalNote {
    pub id: String,
    pub patient_id: String,
    pub author_id: String,
    pub text: String,
    pub written_at: DateTime<Utc>,
}

/// A knowledge-base document stored in the RAG corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Discharge report
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportState {
    /// Written but not yet committed by the discharge saga.
    Tentative,
    Final,
}

/// Structured sections of a discharge report, in their fixed render order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSections {
    pub identification: serde_json::Value,
    pub dates: serde_json::Value,
    pub care_team: Vec<StaffAssignment>,
    pub treatments: Vec<MedicalNote>,
    pub equipment_used: Vec<EquipmentUsage>,
    pub supplies_used: Vec<PatientSupplyUsage>,
    pub appointments: Vec<Appointment>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DischargeReport {
    pub id: String,
    pub patient_id: String,
    pub bed_id_at_discharge: String,
    pub generated_at: DateTime<Utc>,
    pub episode_start: DateTime<Utc>,
    pub episode_end: DateTime<Utc>,
    pub state: ReportState,
    pub sections: ReportSections,
    pub rendered_text: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Users & meetings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An application user. `password_hash` is an opaque value supplied by the
/// caller; the core never hashes or verifies passwords.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub topic: String,
    pub participant_staff_ids: Vec<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entity kinds (for code resolution)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Entity kinds with a human-readable code that resolves to an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Patient,
    Bed,
    Staff,
    Equipment,
    Supply,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn appt(start_h: u32, start_m: u32, dur: i64) -> Appointment {
        Appointment {
            id: "a".into(),
            patient_id: "p".into(),
            doctor_id: "d".into(),
            start_at: Utc.with_ymd_and_hms(2025, 3, 1, start_h, start_m, 0).unwrap(),
            duration_minutes: dur,
            status: AppointmentStatus::Scheduled,
            reason: None,
        }
    }

    #[test]
    fn appointment_overlap_is_half_open() {
        let a = appt(10, 0, 30);
        let b = appt(10, 15, 30);
        let c = appt(10, 30, 30);
        assert!(a.overlaps(&b));
        // Back-to-back appointments do not overlap.
        assert!(!a.overlaps(&c));
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn bed_status_snake_case_roundtrip() {
        let json = serde_json::to_string(&BedStatus::Maintenance).unwrap();
        assert_eq!(json, "\"maintenance\"");
        let s: BedStatus = serde_json::from_str("\"cleaning\"").unwrap();
        assert_eq!(s, BedStatus::Cleaning);
        assert_eq!(s.as_str(), "cleaning");
    }
}
