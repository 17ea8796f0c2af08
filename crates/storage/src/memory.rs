//! In-memory reference implementation of every repository trait.
//!
//! Backs the test suite and the offline boot path. Collections are
//! parking_lot-guarded maps; the supply collection shares one lock with its
//! transaction log so stock adjustments are atomic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use ward_domain::entity::*;
use ward_domain::{Error, Result};

use crate::repo::*;

#[derive(Default)]
struct SupplyShelf {
    supplies: HashMap<String, Supply>,
    transactions: Vec<InventoryTransaction>,
}

/// One store implementing all repository traits over shared maps.
#[derive(Default)]
pub struct InMemoryStore {
    patients: RwLock<HashMap<String, Patient>>,
    patient_code_seq: AtomicU64,
    beds: RwLock<HashMap<String, Bed>>,
    rooms: RwLock<HashMap<String, Room>>,
    departments: RwLock<HashMap<String, Department>>,
    staff: RwLock<HashMap<String, Staff>>,
    assignments: RwLock<HashMap<String, StaffAssignment>>,
    equipment: RwLock<HashMap<String, Equipment>>,
    equipment_usage: RwLock<HashMap<String, EquipmentUsage>>,
    shelf: Mutex<SupplyShelf>,
    supply_usage: RwLock<Vec<PatientSupplyUsage>>,
    appointments: RwLock<HashMap<String, Appointment>>,
    notes: RwLock<Vec<MedicalNote>>,
    documents: RwLock<HashMap<String, DocumentRecord>>,
    reports: RwLock<HashMap<String, DischargeReport>>,
    users: RwLock<HashMap<String, User>>,
    meetings: RwLock<HashMap<String, Meeting>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bundle this store behind every repository interface.
    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            patients: self.clone(),
            beds: self.clone(),
            rooms: self.clone(),
            departments: self.clone(),
            staff: self.clone(),
            assignments: self.clone(),
            equipment: self.clone(),
            equipment_usage: self.clone(),
            supplies: self.clone(),
            supply_usage: self.clone(),
            appointments: self.clone(),
            notes: self.clone(),
            documents: self.clone(),
            reports: self.clone(),
            users: self.clone(),
            meetings: self.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Patients
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl PatientRepo for InMemoryStore {
    async fn insert(&self, patient: Patient) -> Result<Patient> {
        let mut patients = self.patients.write();
        if patients
            .values()
            .any(|p| p.patient_code == patient.patient_code)
        {
            return Err(Error::Conflict(format!(
                "patient code {} already exists",
                patient.patient_code
            )));
        }
        patients.insert(patient.id.clone(), patient.clone());
        Ok(patient)
    }

    async fn get(&self, id: &str) -> Result<Option<Patient>> {
        Ok(self.patients.read().get(id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Patient>> {
        Ok(self
            .patients
            .read()
            .values()
            .find(|p| p.patient_code == code)
            .cloned())
    }

    async fn update(&self, patient: Patient) -> Result<Patient> {
        let mut patients = self.patients.write();
        if !patients.contains_key(&patient.id) {
            return Err(Error::NotFound(format!("patient {}", patient.id)));
        }
        patients.insert(patient.id.clone(), patient.clone());
        Ok(patient)
    }

    async fn search(&self, query: &str) -> Result<Vec<Patient>> {
        let needle = query.to_lowercase();
        Ok(self
            .patients
            .read()
            .values()
            .filter(|p| {
                p.name.to_lowercase().contains(&needle)
                    || p.patient_code.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.patients.write().remove(id);
        Ok(())
    }

    async fn allocate_code(&self) -> Result<String> {
        // Skip over any codes already taken by caller-supplied values.
        loop {
            let n = self.patient_code_seq.fetch_add(1, Ordering::SeqCst) + 1;
            let code = format!("P{n:03}");
            if !self
                .patients
                .read()
                .values()
                .any(|p| p.patient_code == code)
            {
                return Ok(code);
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Beds, rooms, departments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl BedRepo for InMemoryStore {
    async fn insert(&self, bed: Bed) -> Result<Bed> {
        let mut beds = self.beds.write();
        if beds
            .values()
            .any(|b| b.room_id == bed.room_id && b.bed_number == bed.bed_number)
        {
            return Err(Error::Conflict(format!(
                "bed {} already exists in room {}",
                bed.bed_number, bed.room_id
            )));
        }
        beds.insert(bed.id.clone(), bed.clone());
        Ok(bed)
    }

    async fn get(&self, id: &str) -> Result<Option<Bed>> {
        Ok(self.beds.read().get(id).cloned())
    }

    async fn get_by_number(&self, bed_number: &str) -> Result<Option<Bed>> {
        Ok(self
            .beds
            .read()
            .values()
            .find(|b| b.bed_number == bed_number)
            .cloned())
    }

    async fn update(&self, bed: Bed) -> Result<Bed> {
        let mut beds = self.beds.write();
        if !beds.contains_key(&bed.id) {
            return Err(Error::NotFound(format!("bed {}", bed.id)));
        }
        beds.insert(bed.id.clone(), bed.clone());
        Ok(bed)
    }

    async fn list(&self, status: Option<BedStatus>) -> Result<Vec<Bed>> {
        let mut beds: Vec<Bed> = self
            .beds
            .read()
            .values()
            .filter(|b| status.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        beds.sort_by(|a, b| a.bed_number.cmp(&b.bed_number));
        Ok(beds)
    }
}

#[async_trait::async_trait]
impl RoomRepo for InMemoryStore {
    async fn insert(&self, room: Room) -> Result<Room> {
        self.rooms.write().insert(room.id.clone(), room.clone());
        Ok(room)
    }

    async fn get(&self, id: &str) -> Result<Option<Room>> {
        Ok(self.rooms.read().get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Room>> {
        Ok(self.rooms.read().values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl DepartmentRepo for InMemoryStore {
    async fn insert(&self, department: Department) -> Result<Department> {
        self.departments
            .write()
            .insert(department.id.clone(), department.clone());
        Ok(department)
    }

    async fn get(&self, id: &str) -> Result<Option<Department>> {
        Ok(self.departments.read().get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Department>> {
        Ok(self.departments.read().values().cloned().collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Staff
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl StaffRepo for InMemoryStore {
    async fn insert(&self, staff: Staff) -> Result<Staff> {
        let mut members = self.staff.write();
        if members
            .values()
            .any(|s| s.employee_code == staff.employee_code)
        {
            return Err(Error::Conflict(format!(
                "employee code {} already exists",
                staff.employee_code
            )));
        }
        members.insert(staff.id.clone(), staff.clone());
        Ok(staff)
    }

    async fn get(&self, id: &str) -> Result<Option<Staff>> {
        Ok(self.staff.read().get(id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Staff>> {
        Ok(self
            .staff
            .read()
            .values()
            .find(|s| s.employee_code == code)
            .cloned())
    }

    async fn update(&self, staff: Staff) -> Result<Staff> {
        let mut members = self.staff.write();
        if !members.contains_key(&staff.id) {
            return Err(Error::NotFound(format!("staff {}", staff.id)));
        }
        members.insert(staff.id.clone(), staff.clone());
        Ok(staff)
    }

    async fn list(&self, active_only: bool) -> Result<Vec<Staff>> {
        Ok(self
            .staff
            .read()
            .values()
            .filter(|s| !active_only || s.active)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl AssignmentRepo for InMemoryStore {
    async fn insert(&self, assignment: StaffAssignment) -> Result<StaffAssignment> {
        self.assignments
            .write()
            .insert(assignment.id.clone(), assignment.clone());
        Ok(assignment)
    }

    async fn close(&self, id: &str, ended_at: DateTime<Utc>) -> Result<StaffAssignment> {
        let mut assignments = self.assignments.write();
        let assignment = assignments
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("assignment {id}")))?;
        assignment.ended_at = Some(ended_at);
        Ok(assignment.clone())
    }

    async fn for_patient(&self, patient_id: &str) -> Result<Vec<StaffAssignment>> {
        let mut rows: Vec<StaffAssignment> = self
            .assignments
            .read()
            .values()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.started_at);
        Ok(rows)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Equipment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl EquipmentRepo for InMemoryStore {
    async fn insert(&self, equipment: Equipment) -> Result<Equipment> {
        let mut devices = self.equipment.write();
        if devices
            .values()
            .any(|e| e.equipment_code == equipment.equipment_code)
        {
            return Err(Error::Conflict(format!(
                "equipment code {} already exists",
                equipment.equipment_code
            )));
        }
        devices.insert(equipment.id.clone(), equipment.clone());
        Ok(equipment)
    }

    async fn get(&self, id: &str) -> Result<Option<Equipment>> {
        Ok(self.equipment.read().get(id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Equipment>> {
        Ok(self
            .equipment
            .read()
            .values()
            .find(|e| e.equipment_code == code)
            .cloned())
    }

    async fn update(&self, equipment: Equipment) -> Result<Equipment> {
        let mut devices = self.equipment.write();
        if !devices.contains_key(&equipment.id) {
            return Err(Error::NotFound(format!("equipment {}", equipment.id)));
        }
        devices.insert(equipment.id.clone(), equipment.clone());
        Ok(equipment)
    }

    async fn list(&self) -> Result<Vec<Equipment>> {
        Ok(self.equipment.read().values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl EquipmentUsageRepo for InMemoryStore {
    async fn insert(&self, usage: EquipmentUsage) -> Result<EquipmentUsage> {
        self.equipment_usage
            .write()
            .insert(usage.id.clone(), usage.clone());
        Ok(usage)
    }

    async fn get(&self, id: &str) -> Result<Option<EquipmentUsage>> {
        Ok(self.equipment_usage.read().get(id).cloned())
    }

    async fn close(&self, id: &str, ended_at: DateTime<Utc>) -> Result<EquipmentUsage> {
        let mut usages = self.equipment_usage.write();
        let usage = usages
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("equipment usage {id}")))?;
        if ended_at < usage.started_at {
            return Err(Error::InvalidArguments(
                "ended_at precedes started_at".into(),
            ));
        }
        usage.ended_at = Some(ended_at);
        Ok(usage.clone())
    }

    async fn for_patient(&self, patient_id: &str) -> Result<Vec<EquipmentUsage>> {
        let mut rows: Vec<EquipmentUsage> = self
            .equipment_usage
            .read()
            .values()
            .filter(|u| u.patient_id == patient_id)
            .cloned()
            .collect();
        rows.sort_by_key(|u| u.started_at);
        Ok(rows)
    }

    async fn open_for_equipment(&self, equipment_id: &str) -> Result<Vec<EquipmentUsage>> {
        Ok(self
            .equipment_usage
            .read()
            .values()
            .filter(|u| u.equipment_id == equipment_id && u.ended_at.is_none())
            .cloned()
            .collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supplies & inventory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl SupplyRepo for InMemoryStore {
    async fn insert(&self, supply: Supply) -> Result<Supply> {
        let mut shelf = self.shelf.lock();
        if shelf
            .supplies
            .values()
            .any(|s| s.item_code == supply.item_code)
        {
            return Err(Error::Conflict(format!(
                "item code {} already exists",
                supply.item_code
            )));
        }
        shelf.supplies.insert(supply.id.clone(), supply.clone());
        Ok(supply)
    }

    async fn get(&self, id: &str) -> Result<Option<Supply>> {
        Ok(self.shelf.lock().supplies.get(id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Supply>> {
        Ok(self
            .shelf
            .lock()
            .supplies
            .values()
            .find(|s| s.item_code == code)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Supply>> {
        Ok(self.shelf.lock().supplies.values().cloned().collect())
    }

    async fn apply_transaction(
        &self,
        supply_id: &str,
        delta: i64,
        kind: TransactionKind,
        actor_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(Supply, InventoryTransaction)> {
        let mut guard = self.shelf.lock();
        let shelf = &mut *guard;
        let supply = shelf
            .supplies
            .get_mut(supply_id)
            .ok_or_else(|| Error::NotFound(format!("supply {supply_id}")))?;
        let next = supply.quantity_on_hand + delta;
        if next < 0 {
            return Err(Error::StockInsufficient {
                supply_id: supply_id.to_owned(),
                on_hand: supply.quantity_on_hand,
                requested: delta,
            });
        }
        supply.quantity_on_hand = next;
        let updated = supply.clone();
        let tx = InventoryTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            supply_id: supply_id.to_owned(),
            delta,
            kind,
            actor_id: actor_id.to_owned(),
            timestamp: at,
        };
        shelf.transactions.push(tx.clone());
        Ok((updated, tx))
    }

    async fn transactions_for(&self, supply_id: &str) -> Result<Vec<InventoryTransaction>> {
        Ok(self
            .shelf
            .lock()
            .transactions
            .iter()
            .filter(|t| t.supply_id == supply_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl SupplyUsageRepo for InMemoryStore {
    async fn insert(&self, usage: PatientSupplyUsage) -> Result<PatientSupplyUsage> {
        if usage.quantity <= 0 {
            return Err(Error::InvalidArguments(
                "supply usage quantity must be positive".into(),
            ));
        }
        self.supply_usage.write().push(usage.clone());
        Ok(usage)
    }

    async fn for_patient(&self, patient_id: &str) -> Result<Vec<PatientSupplyUsage>> {
        let mut rows: Vec<PatientSupplyUsage> = self
            .supply_usage
            .read()
            .iter()
            .filter(|u| u.patient_id == patient_id)
            .cloned()
            .collect();
        rows.sort_by_key(|u| u.administered_at);
        Ok(rows)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Appointments, notes, documents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl AppointmentRepo for InMemoryStore {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment> {
        self.appointments
            .write()
            .insert(appointment.id.clone(), appointment.clone());
        Ok(appointment)
    }

    async fn get(&self, id: &str) -> Result<Option<Appointment>> {
        Ok(self.appointments.read().get(id).cloned())
    }

    async fn update(&self, appointment: Appointment) -> Result<Appointment> {
        let mut appointments = self.appointments.write();
        if !appointments.contains_key(&appointment.id) {
            return Err(Error::NotFound(format!("appointment {}", appointment.id)));
        }
        appointments.insert(appointment.id.clone(), appointment.clone());
        Ok(appointment)
    }

    async fn for_doctor(&self, doctor_id: &str) -> Result<Vec<Appointment>> {
        Ok(self
            .appointments
            .read()
            .values()
            .filter(|a| a.doctor_id == doctor_id)
            .cloned()
            .collect())
    }

    async fn for_patient(&self, patient_id: &str) -> Result<Vec<Appointment>> {
        let mut rows: Vec<Appointment> = self
            .appointments
            .read()
            .values()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.start_at);
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl NoteRepo for InMemoryStore {
    async fn insert(&self, note: MedicalNote) -> Result<MedicalNote> {
        self.notes.write().push(note.clone());
        Ok(note)
    }

    async fn for_patient(&self, patient_id: &str) -> Result<Vec<MedicalNote>> {
        let mut rows: Vec<MedicalNote> = self
            .notes
            .read()
            .iter()
            .filter(|n| n.patient_id == patient_id)
            .cloned()
            .collect();
        rows.sort_by_key(|n| n.written_at);
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl DocumentRepo for InMemoryStore {
    async fn insert(&self, document: DocumentRecord) -> Result<DocumentRecord> {
        self.documents
            .write()
            .insert(document.id.clone(), document.clone());
        Ok(document)
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.documents.read().get(id).cloned())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Discharge reports
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ReportRepo for InMemoryStore {
    async fn insert(&self, report: DischargeReport) -> Result<DischargeReport> {
        self.reports
            .write()
            .insert(report.id.clone(), report.clone());
        Ok(report)
    }

    async fn get(&self, id: &str) -> Result<Option<DischargeReport>> {
        Ok(self.reports.read().get(id).cloned())
    }

    async fn update(&self, report: DischargeReport) -> Result<DischargeReport> {
        let mut reports = self.reports.write();
        if !reports.contains_key(&report.id) {
            return Err(Error::NotFound(format!("report {}", report.id)));
        }
        reports.insert(report.id.clone(), report.clone());
        Ok(report)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.reports.write().remove(id);
        Ok(())
    }

    async fn final_for_patient(&self, patient_id: &str) -> Result<Option<DischargeReport>> {
        Ok(self
            .reports
            .read()
            .values()
            .filter(|r| r.patient_id == patient_id && r.state == ReportState::Final)
            .max_by_key(|r| r.generated_at)
            .cloned())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Users & meetings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl UserRepo for InMemoryStore {
    async fn insert(&self, user: User) -> Result<User> {
        let mut users = self.users.write();
        if users.values().any(|u| u.username == user.username) {
            return Err(Error::Conflict(format!(
                "username {} already exists",
                user.username
            )));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.read().get(id).cloned())
    }

    async fn update(&self, user: User) -> Result<User> {
        let mut users = self.users.write();
        if !users.contains_key(&user.id) {
            return Err(Error::NotFound(format!("user {}", user.id)));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>> {
        Ok(self.users.read().values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl MeetingRepo for InMemoryStore {
    async fn insert(&self, meeting: Meeting) -> Result<Meeting> {
        self.meetings
            .write()
            .insert(meeting.id.clone(), meeting.clone());
        Ok(meeting)
    }

    async fn list(&self) -> Result<Vec<Meeting>> {
        let mut rows: Vec<Meeting> = self.meetings.read().values().cloned().collect();
        rows.sort_by_key(|m| m.scheduled_at);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn supply(id: &str, code: &str, qty: i64) -> Supply {
        Supply {
            id: id.into(),
            item_code: code.into(),
            name: "Saline".into(),
            category_id: None,
            quantity_on_hand: qty,
            reorder_threshold: 10,
        }
    }

    #[tokio::test]
    async fn stock_never_goes_negative() {
        let store = InMemoryStore::new();
        SupplyRepo::insert(store.as_ref(), supply("s1", "MED001", 5))
            .await
            .unwrap();
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

        let err = store
            .apply_transaction("s1", -7, TransactionKind::Consume, "u1", at)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StockInsufficient { on_hand: 5, .. }));

        // Nothing appended, quantity untouched.
        let after = SupplyRepo::get(store.as_ref(), "s1").await.unwrap().unwrap();
        assert_eq!(after.quantity_on_hand, 5);
        assert!(store.transactions_for("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transaction_deltas_sum_to_quantity() {
        let store = InMemoryStore::new();
        SupplyRepo::insert(store.as_ref(), supply("s1", "MED001", 0))
            .await
            .unwrap();
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

        for delta in [20, -3, -5, 4] {
            let kind = if delta > 0 {
                TransactionKind::Restock
            } else {
                TransactionKind::Consume
            };
            store
                .apply_transaction("s1", delta, kind, "u1", at)
                .await
                .unwrap();
        }

        let qty = SupplyRepo::get(store.as_ref(), "s1")
            .await
            .unwrap()
            .unwrap()
            .quantity_on_hand;
        let sum: i64 = store
            .transactions_for("s1")
            .await
            .unwrap()
            .iter()
            .map(|t| t.delta)
            .sum();
        assert_eq!(qty, 16);
        assert_eq!(sum, qty);
    }

    #[tokio::test]
    async fn duplicate_codes_conflict() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let p = Patient {
            id: "p1".into(),
            patient_code: "P001".into(),
            name: "Jane Roe".into(),
            date_of_birth: "1990-02-01".into(),
            status: PatientStatus::Active,
            created_at: now,
            admitted_at: Some(now),
        };
        PatientRepo::insert(store.as_ref(), p.clone()).await.unwrap();
        let mut dup = p;
        dup.id = "p2".into();
        let err = PatientRepo::insert(store.as_ref(), dup).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn allocated_codes_skip_taken_values() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        PatientRepo::insert(
            store.as_ref(),
            Patient {
                id: "p1".into(),
                patient_code: "P001".into(),
                name: "Taken".into(),
                date_of_birth: "1980-01-01".into(),
                status: PatientStatus::Active,
                created_at: now,
                admitted_at: None,
            },
        )
        .await
        .unwrap();

        let code = store.allocate_code().await.unwrap();
        assert_eq!(code, "P002");
    }

    #[tokio::test]
    async fn bed_number_unique_per_room_only() {
        let store = InMemoryStore::new();
        let bed = |id: &str, room: &str| Bed {
            id: id.into(),
            bed_number: "101A".into(),
            room_id: room.into(),
            status: BedStatus::Available,
            current_patient_id: None,
            cleaning_started_at: None,
            cleaning_duration_minutes: None,
        };
        BedRepo::insert(store.as_ref(), bed("b1", "R1")).await.unwrap();
        // Same number in another room is fine.
        BedRepo::insert(store.as_ref(), bed("b2", "R2")).await.unwrap();
        // Same number in the same room conflicts.
        let err = BedRepo::insert(store.as_ref(), bed("b3", "R1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
