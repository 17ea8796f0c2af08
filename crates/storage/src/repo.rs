//! Storage interfaces, one per entity kind.
//!
//! Each call is assumed transactional at single-call granularity; anything
//! wider (the discharge saga) is composed above this layer with explicit
//! compensation.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use ward_domain::entity::{
    Appointment, Bed, BedStatus, Department, DischargeReport, DocumentRecord, Equipment,
    EquipmentUsage, InventoryTransaction, Meeting, MedicalNote, Patient, PatientSupplyUsage, Room,
    Staff, StaffAssignment, Supply, TransactionKind, User,
};
use ward_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Patients
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait PatientRepo: Send + Sync {
    /// Insert a patient. Fails with `Conflict` on a duplicate patient code.
    async fn insert(&self, patient: Patient) -> Result<Patient>;
    async fn get(&self, id: &str) -> Result<Option<Patient>>;
    async fn get_by_code(&self, code: &str) -> Result<Option<Patient>>;
    async fn update(&self, patient: Patient) -> Result<Patient>;
    /// Substring search over name and code.
    async fn search(&self, query: &str) -> Result<Vec<Patient>>;
    /// Remove a patient row (compensation only — patients are never
    /// hard-deleted once referenced by usage records).
    async fn remove(&self, id: &str) -> Result<()>;
    /// Allocate the next code in the monotonic `P{n}` sequence.
    async fn allocate_code(&self) -> Result<String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Beds, rooms, departments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait BedRepo: Send + Sync {
    /// Insert a bed. Fails with `Conflict` when the bed number is taken
    /// within the same room.
    async fn insert(&self, bed: Bed) -> Result<Bed>;
    async fn get(&self, id: &str) -> Result<Option<Bed>>;
    async fn get_by_number(&self, bed_number: &str) -> Result<Option<Bed>>;
    async fn update(&self, bed: Bed) -> Result<Bed>;
    async fn list(&self, status: Option<BedStatus>) -> Result<Vec<Bed>>;
}

#[async_trait::async_trait]
pub trait RoomRepo: Send + Sync {
    async fn insert(&self, room: Room) -> Result<Room>;
    async fn get(&self, id: &str) -> Result<Option<Room>>;
    async fn list(&self) -> Result<Vec<Room>>;
}

#[async_trait::async_trait]
pub trait DepartmentRepo: Send + Sync {
    async fn insert(&self, department: Department) -> Result<Department>;
    async fn get(&self, id: &str) -> Result<Option<Department>>;
    async fn list(&self) -> Result<Vec<Department>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Staff
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait StaffRepo: Send + Sync {
    async fn insert(&self, staff: Staff) -> Result<Staff>;
    async fn get(&self, id: &str) -> Result<Option<Staff>>;
    async fn get_by_code(&self, code: &str) -> Result<Option<Staff>>;
    async fn update(&self, staff: Staff) -> Result<Staff>;
    async fn list(&self, active_only: bool) -> Result<Vec<Staff>>;
}

#[async_trait::async_trait]
pub trait AssignmentRepo: Send + Sync {
    async fn insert(&self, assignment: StaffAssignment) -> Result<StaffAssignment>;
    async fn close(&self, id: &str, ended_at: DateTime<Utc>) -> Result<StaffAssignment>;
    async fn for_patient(&self, patient_id: &str) -> Result<Vec<StaffAssignment>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Equipment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait EquipmentRepo: Send + Sync {
    async fn insert(&self, equipment: Equipment) -> Result<Equipment>;
    async fn get(&self, id: &str) -> Result<Option<Equipment>>;
    async fn get_by_code(&self, code: &str) -> Result<Option<Equipment>>;
    async fn update(&self, equipment: Equipment) -> Result<Equipment>;
    async fn list(&self) -> Result<Vec<Equipment>>;
}

#[async_trait::async_trait]
pub trait EquipmentUsageRepo: Send + Sync {
    async fn insert(&self, usage: EquipmentUsage) -> Result<EquipmentUsage>;
    async fn get(&self, id: &str) -> Result<Option<EquipmentUsage>>;
    async fn close(&self, id: &str, ended_at: DateTime<Utc>) -> Result<EquipmentUsage>;
    async fn for_patient(&self, patient_id: &str) -> Result<Vec<EquipmentUsage>>;
    /// Open (not yet ended) usage rows for a device.
    async fn open_for_equipment(&self, equipment_id: &str) -> Result<Vec<EquipmentUsage>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supplies & inventory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait SupplyRepo: Send + Sync {
    async fn insert(&self, supply: Supply) -> Result<Supply>;
    async fn get(&self, id: &str) -> Result<Option<Supply>>;
    async fn get_by_code(&self, code: &str) -> Result<Option<Supply>>;
    async fn list(&self) -> Result<Vec<Supply>>;
    /// Atomically append an inventory transaction and adjust
    /// `quantity_on_hand`. A delta that would drive the quantity negative
    /// fails with `StockInsufficient` and appends nothing.
    async fn apply_transaction(
        &self,
        supply_id: &str,
        delta: i64,
        kind: TransactionKind,
        actor_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(Supply, InventoryTransaction)>;
    async fn transactions_for(&self, supply_id: &str) -> Result<Vec<InventoryTransaction>>;
}

#[async_trait::async_trait]
pub trait SupplyUsageRepo: Send + Sync {
    async fn insert(&self, usage: PatientSupplyUsage) -> Result<PatientSupplyUsage>;
    async fn for_patient(&self, patient_id: &str) -> Result<Vec<PatientSupplyUsage>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Appointments, notes, documents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait AppointmentRepo: Send + Sync {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment>;
    async fn get(&self, id: &str) -> Result<Option<Appointment>>;
    async fn update(&self, appointment: Appointment) -> Result<Appointment>;
    async fn for_doctor(&self, doctor_id: &str) -> Result<Vec<Appointment>>;
    async fn for_patient(&self, patient_id: &str) -> Result<Vec<Appointment>>;
}

#[async_trait::async_trait]
pub trait NoteRepo: Send + Sync {
    async fn insert(&self, note: MedicalNote) -> Result<MedicalNote>;
    async fn for_patient(&self, patient_id: &str) -> Result<Vec<MedicalNote>>;
}

#[async_trait::async_trait]
pub trait DocumentRepo: Send + Sync {
    async fn insert(&self, document: DocumentRecord) -> Result<DocumentRecord>;
    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Discharge reports
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait ReportRepo: Send + Sync {
    async fn insert(&self, report: DischargeReport) -> Result<DischargeReport>;
    async fn get(&self, id: &str) -> Result<Option<DischargeReport>>;
    async fn update(&self, report: DischargeReport) -> Result<DischargeReport>;
    /// Remove a tentative report (saga compensation).
    async fn remove(&self, id: &str) -> Result<()>;
    /// The finalized report covering this patient's current episode, if any.
    async fn final_for_patient(&self, patient_id: &str) -> Result<Option<DischargeReport>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Users & meetings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert a user. Fails with `Conflict` on a duplicate username.
    async fn insert(&self, user: User) -> Result<User>;
    async fn get(&self, id: &str) -> Result<Option<User>>;
    async fn update(&self, user: User) -> Result<User>;
    async fn list(&self) -> Result<Vec<User>>;
}

#[async_trait::async_trait]
pub trait MeetingRepo: Send + Sync {
    async fn insert(&self, meeting: Meeting) -> Result<Meeting>;
    async fn list(&self) -> Result<Vec<Meeting>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bundle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything the core needs from storage, one handle per entity kind.
#[derive(Clone)]
pub struct Repositories {
    pub patients: Arc<dyn PatientRepo>,
    pub beds: Arc<dyn BedRepo>,
    pub rooms: Arc<dyn RoomRepo>,
    pub departments: Arc<dyn DepartmentRepo>,
    pub staff: Arc<dyn StaffRepo>,
    pub assignments: Arc<dyn AssignmentRepo>,
    pub equipment: Arc<dyn EquipmentRepo>,
    pub equipment_usage: Arc<dyn EquipmentUsageRepo>,
    pub supplies: Arc<dyn SupplyRepo>,
    pub supply_usage: Arc<dyn SupplyUsageRepo>,
    pub appointments: Arc<dyn AppointmentRepo>,
    pub notes: Arc<dyn NoteRepo>,
    pub documents: Arc<dyn DocumentRepo>,
    pub reports: Arc<dyn ReportRepo>,
    pub users: Arc<dyn UserRepo>,
    pub meetings: Arc<dyn MeetingRepo>,
}
