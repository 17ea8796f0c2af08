//! Bed lifecycle manager — owns every mutation of bed status.
//!
//! ```text
//! available ──assign──► occupied
//! occupied  ──discharge──► cleaning
//! cleaning  ──timer_expired | force_complete──► available
//! any       ──mark_maintenance──► maintenance
//! maintenance ──clear_maintenance──► available
//! available ──reserve──► reserved
//! reserved  ──assign──► occupied | ──release──► available
//! ```
//!
//! Transitions are serialized per bed by an id-keyed async lock. The sweep
//! skips beds whose lock it cannot take immediately and never propagates
//! errors to its caller.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use ward_domain::clock::Clock;
use ward_domain::entity::{Bed, BedStatus, PatientStatus};
use ward_domain::trace::TraceEvent;
use ward_domain::{Error, Result};
use ward_storage::Repositories;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status view
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What callers see when they ask where a bed stands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedStatusView {
    pub bed_id: String,
    pub bed_number: String,
    pub status: BedStatus,
    pub time_remaining_minutes: i64,
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_patient_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct BedLifecycleManager {
    repos: Repositories,
    clock: Arc<dyn Clock>,
    cleaning_duration_minutes: i64,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl BedLifecycleManager {
    pub fn new(
        repos: Repositories,
        clock: Arc<dyn Clock>,
        cleaning_duration_minutes: i64,
    ) -> Self {
        Self {
            repos,
            clock,
            cleaning_duration_minutes,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, bed_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(bed_id.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn load(&self, bed_id: &str) -> Result<Bed> {
        self.repos
            .beds
            .get(bed_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("bed {bed_id}")))
    }

    fn emit_transition(&self, bed: &Bed, from: BedStatus, action: &str) {
        TraceEvent::BedTransition {
            bed_id: bed.id.clone(),
            from: from.as_str().into(),
            to: bed.status.as_str().into(),
            action: action.into(),
        }
        .emit();
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Put an active patient into an available or reserved bed.
    pub async fn assign(&self, bed_id: &str, patient_id: &str) -> Result<Bed> {
        let lock = self.lock_for(bed_id);
        let _guard = lock.lock().await;

        let mut bed = self.load(bed_id).await?;
        if !matches!(bed.status, BedStatus::Available | BedStatus::Reserved) {
            return Err(Error::BedUnavailable(bed_id.to_owned()));
        }
        let patient = self
            .repos
            .patients
            .get(patient_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("patient {patient_id}")))?;
        if patient.status != PatientStatus::Active {
            return Err(Error::PatientInactive(patient_id.to_owned()));
        }

        let from = bed.status;
        bed.status = BedStatus::Occupied;
        bed.current_patient_id = Some(patient_id.to_owned());
        bed.cleaning_started_at = None;
        bed.cleaning_duration_minutes = None;
        let bed = self.repos.beds.update(bed).await?;
        self.emit_transition(&bed, from, "assign");
        Ok(bed)
    }

    /// Vacate an occupied bed and start its cleaning timer. Returns the bed
    /// and the cleaning ETA.
    pub async fn discharge(&self, bed_id: &str) -> Result<(Bed, chrono::DateTime<chrono::Utc>)> {
        let lock = self.lock_for(bed_id);
        let _guard = lock.lock().await;

        let mut bed = self.load(bed_id).await?;
        if bed.status != BedStatus::Occupied {
            return Err(Error::IllegalTransition {
                bed_id: bed_id.to_owned(),
                from: bed.status.as_str().into(),
                action: "discharge".into(),
            });
        }

        let now = self.clock.now();
        let from = bed.status;
        bed.status = BedStatus::Cleaning;
        bed.current_patient_id = None;
        bed.cleaning_started_at = Some(now);
        bed.cleaning_duration_minutes = Some(self.cleaning_duration_minutes);
        let bed = self.repos.beds.update(bed).await?;
        self.emit_transition(&bed, from, "discharge");
        let eta = now + Duration::minutes(self.cleaning_duration_minutes);
        Ok((bed, eta))
    }

    pub async fn reserve(&self, bed_id: &str) -> Result<Bed> {
        self.simple_transition(bed_id, "reserve", &[BedStatus::Available], BedStatus::Reserved)
            .await
    }

    pub async fn release(&self, bed_id: &str) -> Result<Bed> {
        self.simple_transition(bed_id, "release", &[BedStatus::Reserved], BedStatus::Available)
            .await
    }

    /// Any state may drop into maintenance; occupancy and cleaning state
    /// are cleared so the field invariants hold.
    pub async fn mark_maintenance(&self, bed_id: &str) -> Result<Bed> {
        let lock = self.lock_for(bed_id);
        let _guard = lock.lock().await;

        let mut bed = self.load(bed_id).await?;
        let from = bed.status;
        bed.status = BedStatus::Maintenance;
        bed.current_patient_id = None;
        bed.cleaning_started_at = None;
        bed.cleaning_duration_minutes = None;
        let bed = self.repos.beds.update(bed).await?;
        self.emit_transition(&bed, from, "mark_maintenance");
        Ok(bed)
    }

    pub async fn clear_maintenance(&self, bed_id: &str) -> Result<Bed> {
        self.simple_transition(
            bed_id,
            "clear_maintenance",
            &[BedStatus::Maintenance],
            BedStatus::Available,
        )
        .await
    }

    /// Compensation path for a failed admission: undo an `assign` without
    /// starting a cleaning cycle. Only reverts if the named patient still
    /// occupies the bed.
    pub(crate) async fn revert_assignment(&self, bed_id: &str, patient_id: &str) -> Result<Bed> {
        let lock = self.lock_for(bed_id);
        let _guard = lock.lock().await;

        let mut bed = self.load(bed_id).await?;
        if bed.status != BedStatus::Occupied
            || bed.current_patient_id.as_deref() != Some(patient_id)
        {
            return Err(Error::IllegalTransition {
                bed_id: bed_id.to_owned(),
                from: bed.status.as_str().into(),
                action: "revert_assignment".into(),
            });
        }
        let from = bed.status;
        bed.status = BedStatus::Available;
        bed.current_patient_id = None;
        let bed = self.repos.beds.update(bed).await?;
        self.emit_transition(&bed, from, "revert_assignment");
        Ok(bed)
    }

    /// Staff-confirmed early completion of cleaning.
    pub async fn force_complete_cleaning(&self, bed_id: &str) -> Result<Bed> {
        let lock = self.lock_for(bed_id);
        let _guard = lock.lock().await;
        self.complete_cleaning_locked(bed_id, "force_complete").await
    }

    async fn simple_transition(
        &self,
        bed_id: &str,
        action: &str,
        from_any_of: &[BedStatus],
        to: BedStatus,
    ) -> Result<Bed> {
        let lock = self.lock_for(bed_id);
        let _guard = lock.lock().await;

        let mut bed = self.load(bed_id).await?;
        if !from_any_of.contains(&bed.status) {
            return Err(Error::IllegalTransition {
                bed_id: bed_id.to_owned(),
                from: bed.status.as_str().into(),
                action: action.into(),
            });
        }
        let from = bed.status;
        bed.status = to;
        let bed = self.repos.beds.update(bed).await?;
        self.emit_transition(&bed, from, action);
        Ok(bed)
    }

    /// Caller must hold the bed lock.
    async fn complete_cleaning_locked(&self, bed_id: &str, action: &str) -> Result<Bed> {
        let mut bed = self.load(bed_id).await?;
        if bed.status != BedStatus::Cleaning {
            return Err(Error::IllegalTransition {
                bed_id: bed_id.to_owned(),
                from: bed.status.as_str().into(),
                action: action.into(),
            });
        }
        let from = bed.status;
        bed.status = BedStatus::Available;
        bed.cleaning_started_at = None;
        bed.cleaning_duration_minutes = None;
        let bed = self.repos.beds.update(bed).await?;
        self.emit_transition(&bed, from, action);
        Ok(bed)
    }

    // ── Status ───────────────────────────────────────────────────

    /// For non-cleaning beds the timer fields read as done (0 remaining,
    /// 100%); for cleaning beds progress is clamped to 100.
    pub async fn status(&self, bed_id: &str) -> Result<BedStatusView> {
        let bed = self.load(bed_id).await?;
        Ok(self.status_of(&bed))
    }

    pub fn status_of(&self, bed: &Bed) -> BedStatusView {
        let (remaining, progress) = match (bed.status, bed.cleaning_started_at) {
            (BedStatus::Cleaning, Some(started)) => {
                let duration = bed
                    .cleaning_duration_minutes
                    .unwrap_or(self.cleaning_duration_minutes)
                    .max(1);
                let elapsed = (self.clock.now() - started).num_minutes();
                let remaining = (duration - elapsed).max(0);
                let progress = ((elapsed * 100) / duration).clamp(0, 100) as u8;
                (remaining, progress)
            }
            _ => (0, 100),
        };
        BedStatusView {
            bed_id: bed.id.clone(),
            bed_number: bed.bed_number.clone(),
            status: bed.status,
            time_remaining_minutes: remaining,
            progress_percent: progress,
            current_patient_id: bed.current_patient_id.clone(),
        }
    }

    // ── Sweep ────────────────────────────────────────────────────

    /// Promote every cleaning bed whose timer has expired. Contended beds
    /// are skipped (the holder is already transitioning them); errors are
    /// logged, never raised.
    pub async fn sweep_expired(&self) -> Vec<String> {
        let cleaning = match self.repos.beds.list(Some(BedStatus::Cleaning)).await {
            Ok(beds) => beds,
            Err(e) => {
                tracing::warn!(error = %e, "bed sweep could not list cleaning beds");
                return Vec::new();
            }
        };

        let scanned = cleaning.len();
        let now = self.clock.now();
        let mut promoted = Vec::new();
        let mut skipped_locked = 0usize;

        for bed in cleaning {
            let Some(started) = bed.cleaning_started_at else {
                tracing::warn!(bed_id = %bed.id, "cleaning bed has no start timestamp");
                continue;
            };
            let duration = bed
                .cleaning_duration_minutes
                .unwrap_or(self.cleaning_duration_minutes);
            if now - started < Duration::minutes(duration) {
                continue;
            }

            let lock = self.lock_for(&bed.id);
            let Ok(_guard) = lock.try_lock() else {
                skipped_locked += 1;
                continue;
            };
            match self.complete_cleaning_locked(&bed.id, "timer_expired").await {
                Ok(_) => promoted.push(bed.id),
                // Someone transitioned it between the list and the lock.
                Err(Error::IllegalTransition { .. }) => {}
                Err(e) => {
                    tracing::warn!(bed_id = %bed.id, error = %e, "bed sweep transition failed");
                }
            }
        }

        TraceEvent::SweepCompleted {
            scanned,
            promoted: promoted.len(),
            skipped_locked,
        }
        .emit();
        promoted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ward_domain::clock::ManualClock;
    use ward_domain::entity::Patient;
    use ward_storage::repo::{BedRepo, PatientRepo};
    use ward_storage::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: ManualClock,
        manager: BedLifecycleManager,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let clock = ManualClock::new(t0);
        let manager =
            BedLifecycleManager::new(store.repositories(), Arc::new(clock.clone()), 30);

        BedRepo::insert(
            store.as_ref(),
            Bed {
                id: "b1".into(),
                bed_number: "101A".into(),
                room_id: "R1".into(),
                status: BedStatus::Available,
                current_patient_id: None,
                cleaning_started_at: None,
                cleaning_duration_minutes: None,
            },
        )
        .await
        .unwrap();
        PatientRepo::insert(
            store.as_ref(),
            Patient {
                id: "p1".into(),
                patient_code: "P001".into(),
                name: "Jane Roe".into(),
                date_of_birth: "1990-02-01".into(),
                status: PatientStatus::Active,
                created_at: t0,
                admitted_at: Some(t0),
            },
        )
        .await
        .unwrap();

        Fixture {
            store,
            clock,
            manager,
        }
    }

    #[tokio::test]
    async fn full_occupancy_cycle() {
        let f = fixture().await;

        let bed = f.manager.assign("b1", "p1").await.unwrap();
        assert_eq!(bed.status, BedStatus::Occupied);
        assert_eq!(bed.current_patient_id.as_deref(), Some("p1"));

        let (bed, eta) = f.manager.discharge("b1").await.unwrap();
        assert_eq!(bed.status, BedStatus::Cleaning);
        assert!(bed.current_patient_id.is_none());
        assert_eq!(eta, f.clock.now() + Duration::minutes(30));

        let bed = f.manager.force_complete_cleaning("b1").await.unwrap();
        assert_eq!(bed.status, BedStatus::Available);
        assert!(bed.cleaning_started_at.is_none());
    }

    #[tokio::test]
    async fn reserved_bed_accepts_assignment() {
        let f = fixture().await;
        f.manager.reserve("b1").await.unwrap();
        let bed = f.manager.assign("b1", "p1").await.unwrap();
        assert_eq!(bed.status, BedStatus::Occupied);
    }

    #[tokio::test]
    async fn illegal_transitions_leave_state_unchanged() {
        let f = fixture().await;
        f.manager.mark_maintenance("b1").await.unwrap();

        let err = f.manager.assign("b1", "p1").await.unwrap_err();
        assert!(matches!(err, Error::BedUnavailable(_)));
        let err = f.manager.discharge("b1").await.unwrap_err();
        assert!(matches!(err, Error::IllegalTransition { .. }));
        let err = f.manager.reserve("b1").await.unwrap_err();
        assert!(matches!(err, Error::IllegalTransition { .. }));

        let bed = BedRepo::get(f.store.as_ref(), "b1").await.unwrap().unwrap();
        assert_eq!(bed.status, BedStatus::Maintenance);

        let bed = f.manager.clear_maintenance("b1").await.unwrap();
        assert_eq!(bed.status, BedStatus::Available);
    }

    #[tokio::test]
    async fn inactive_patient_cannot_be_assigned() {
        let f = fixture().await;
        let mut patient = PatientRepo::get(f.store.as_ref(), "p1")
            .await
            .unwrap()
            .unwrap();
        patient.status = PatientStatus::Discharged;
        PatientRepo::update(f.store.as_ref(), patient).await.unwrap();

        let err = f.manager.assign("b1", "p1").await.unwrap_err();
        assert!(matches!(err, Error::PatientInactive(_)));
        let bed = BedRepo::get(f.store.as_ref(), "b1").await.unwrap().unwrap();
        assert_eq!(bed.status, BedStatus::Available);
    }

    #[tokio::test]
    async fn cleaning_progress_is_monotonic_and_completes() {
        let f = fixture().await;
        f.manager.assign("b1", "p1").await.unwrap();
        f.manager.discharge("b1").await.unwrap();

        let mut last_progress = 0u8;
        let mut last_remaining = i64::MAX;
        for _ in 0..6 {
            let view = f.manager.status("b1").await.unwrap();
            assert!(view.progress_percent >= last_progress);
            assert!(view.time_remaining_minutes <= last_remaining);
            last_progress = view.progress_percent;
            last_remaining = view.time_remaining_minutes;
            f.clock.advance(Duration::minutes(6));
        }
        // At (or past) the full duration, progress reads 100.
        let view = f.manager.status("b1").await.unwrap();
        assert_eq!(view.progress_percent, 100);
        assert_eq!(view.time_remaining_minutes, 0);
    }

    #[tokio::test]
    async fn non_cleaning_beds_read_as_done() {
        let f = fixture().await;
        let view = f.manager.status("b1").await.unwrap();
        assert_eq!(view.time_remaining_minutes, 0);
        assert_eq!(view.progress_percent, 100);
    }

    #[tokio::test]
    async fn sweep_promotes_only_expired_and_is_idempotent() {
        let f = fixture().await;
        f.manager.assign("b1", "p1").await.unwrap();
        f.manager.discharge("b1").await.unwrap();

        // Not yet expired.
        f.clock.advance(Duration::minutes(29));
        assert!(f.manager.sweep_expired().await.is_empty());

        f.clock.advance(Duration::minutes(2));
        let promoted = f.manager.sweep_expired().await;
        assert_eq!(promoted, vec!["b1".to_string()]);
        let bed = BedRepo::get(f.store.as_ref(), "b1").await.unwrap().unwrap();
        assert_eq!(bed.status, BedStatus::Available);

        // Second sweep with no intervening transitions finds nothing.
        assert!(f.manager.sweep_expired().await.is_empty());
    }

    #[tokio::test]
    async fn sweep_skips_locked_beds() {
        let f = fixture().await;
        f.manager.assign("b1", "p1").await.unwrap();
        f.manager.discharge("b1").await.unwrap();
        f.clock.advance(Duration::minutes(31));

        let lock = f.manager.lock_for("b1");
        let _held = lock.lock().await;
        assert!(f.manager.sweep_expired().await.is_empty());
        drop(_held);
        assert_eq!(f.manager.sweep_expired().await, vec!["b1".to_string()]);
    }

    #[tokio::test]
    async fn unknown_bed_is_not_found() {
        let f = fixture().await;
        let err = f.manager.status("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
