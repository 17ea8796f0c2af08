//! Discharge aggregator — builds one report per (patient, episode) from
//! every entity store, then commits the report, the bed transition, and
//! the patient status as a single logical unit.
//!
//! The repositories are only transactional per call, so the commit is a
//! saga: write the report tentative, run the bed and patient mutations,
//! finalize. Any failure deletes the tentative report and writes the
//! pre-transition snapshots back, so readers never observe a partial
//! discharge.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use ward_domain::clock::Clock;
use ward_domain::entity::{
    Appointment, Bed, BedStatus, DischargeReport, EquipmentUsage, MedicalNote, Patient,
    PatientStatus, PatientSupplyUsage, ReportSections, ReportState, StaffAssignment,
};
use ward_domain::trace::TraceEvent;
use ward_domain::{Error, Result};
use ward_storage::Repositories;

use crate::beds::BedLifecycleManager;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Input
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default)]
pub struct DischargeInput {
    pub patient_id: String,
    /// Derived from current occupancy when omitted.
    pub bed_id: Option<String>,
    /// Defaults to the patient's admission timestamp.
    pub episode_start: Option<DateTime<Utc>>,
    /// Defaults to now.
    pub episode_end: Option<DateTime<Utc>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Aggregator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct DischargeAggregator {
    repos: Repositories,
    beds: Arc<BedLifecycleManager>,
    clock: Arc<dyn Clock>,
}

impl DischargeAggregator {
    pub fn new(repos: Repositories, beds: Arc<BedLifecycleManager>, clock: Arc<dyn Clock>) -> Self {
        Self { repos, beds, clock }
    }

    pub async fn generate(&self, input: DischargeInput) -> Result<DischargeReport> {
        let patient = self
            .repos
            .patients
            .get(&input.patient_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("patient {}", input.patient_id)))?;

        // Idempotency: a finished episode returns its existing report
        // without re-running any side effects.
        if patient.status == PatientStatus::Discharged {
            if let Some(report) = self.repos.reports.final_for_patient(&patient.id).await? {
                return Ok(report);
            }
            return Err(Error::Conflict(format!(
                "patient {} is already discharged",
                patient.id
            )));
        }

        let bed = self.resolve_bed(&patient, input.bed_id.as_deref()).await?;

        let episode_end = input.episode_end.unwrap_or_else(|| self.clock.now());
        let configured_start = input
            .episode_start
            .or(patient.admitted_at)
            .unwrap_or(patient.created_at);

        let sections = self
            .collect_sections(&patient, &bed, configured_start, episode_end)
            .await?;
        let episode_start = sections.1;
        let sections = sections.0;
        let rendered_text = render_report(&patient, &bed, &sections, episode_start, episode_end);

        // ── Saga: report → bed → patient → finalize ──────────────
        let report = DischargeReport {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id: patient.id.clone(),
            bed_id_at_discharge: bed.id.clone(),
            generated_at: self.clock.now(),
            episode_start,
            episode_end,
            state: ReportState::Tentative,
            sections,
            rendered_text,
        };
        let report = self.repos.reports.insert(report).await?;

        let bed_snapshot = bed.clone();
        if let Err(e) = self.beds.discharge(&bed.id).await {
            self.rollback(&report.id, None, None, &patient.id, &e).await;
            return Err(e);
        }

        let mut discharged = patient.clone();
        discharged.status = PatientStatus::Discharged;
        if let Err(e) = self.repos.patients.update(discharged).await {
            self.rollback(&report.id, Some(bed_snapshot), None, &patient.id, &e)
                .await;
            return Err(e);
        }

        let mut final_report = report.clone();
        final_report.state = ReportState::Final;
        match self.repos.reports.update(final_report).await {
            Ok(report) => {
                TraceEvent::DischargeCommitted {
                    patient_id: patient.id.clone(),
                    bed_id: bed.id.clone(),
                    report_id: report.id.clone(),
                }
                .emit();
                Ok(report)
            }
            Err(e) => {
                self.rollback(
                    &report.id,
                    Some(bed_snapshot),
                    Some(patient.clone()),
                    &patient.id,
                    &e,
                )
                .await;
                Err(e)
            }
        }
    }

    /// Undo whatever the saga managed to persist. Best effort: failures
    /// here are logged, the original error is what the caller sees.
    async fn rollback(
        &self,
        report_id: &str,
        bed_snapshot: Option<Bed>,
        patient_snapshot: Option<Patient>,
        patient_id: &str,
        cause: &Error,
    ) {
        if let Some(patient) = patient_snapshot {
            if let Err(e) = self.repos.patients.update(patient).await {
                tracing::error!(error = %e, "discharge rollback: patient restore failed");
            }
        }
        if let Some(bed) = bed_snapshot {
            if let Err(e) = self.repos.beds.update(bed).await {
                tracing::error!(error = %e, "discharge rollback: bed restore failed");
            }
        }
        if let Err(e) = self.repos.reports.remove(report_id).await {
            tracing::error!(error = %e, "discharge rollback: tentative report removal failed");
        }
        TraceEvent::DischargeRolledBack {
            patient_id: patient_id.to_owned(),
            reason: cause.to_string(),
        }
        .emit();
    }

    async fn resolve_bed(&self, patient: &Patient, bed_id: Option<&str>) -> Result<Bed> {
        if let Some(bed_id) = bed_id {
            let bed = self
                .repos
                .beds
                .get(bed_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("bed {bed_id}")))?;
            if bed.status != BedStatus::Occupied
                || bed.current_patient_id.as_deref() != Some(patient.id.as_str())
            {
                return Err(Error::Conflict(format!(
                    "bed {bed_id} is not occupied by patient {}",
                    patient.id
                )));
            }
            return Ok(bed);
        }
        self.repos
            .beds
            .list(Some(BedStatus::Occupied))
            .await?
            .into_iter()
            .find(|b| b.current_patient_id.as_deref() == Some(patient.id.as_str()))
            .ok_or_else(|| {
                Error::Conflict(format!("patient {} does not occupy a bed", patient.id))
            })
    }

    /// Gather every section, widening the window when records predate the
    /// configured episode start (late writes, clock drift) so nothing
    /// administered to the patient is omitted.
    async fn collect_sections(
        &self,
        patient: &Patient,
        bed: &Bed,
        configured_start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(ReportSections, DateTime<Utc>)> {
        let assignments = self.repos.assignments.for_patient(&patient.id).await?;
        let equipment = self.repos.equipment_usage.for_patient(&patient.id).await?;
        let supplies = self.repos.supply_usage.for_patient(&patient.id).await?;
        let appointments = self.repos.appointments.for_patient(&patient.id).await?;
        let notes = self.repos.notes.for_patient(&patient.id).await?;

        let earliest = earliest_timestamp(&assignments, &equipment, &supplies, &appointments, &notes);
        let start = match earliest {
            Some(t) if t < configured_start => {
                tracing::info!(
                    patient_id = %patient.id,
                    configured = %configured_start,
                    widened_to = %t,
                    "widening discharge episode window to cover early records"
                );
                t
            }
            _ => configured_start,
        };

        let in_window = |t: DateTime<Utc>| t >= start && t <= end;
        let sections = ReportSections {
            identification: serde_json::json!({
                "patient_id": patient.id,
                "patient_code": patient.patient_code,
                "name": patient.name,
                "date_of_birth": patient.date_of_birth,
                "bed_number": bed.bed_number,
            }),
            dates: serde_json::json!({
                "admitted_at": patient.admitted_at,
                "episode_start": start,
                "episode_end": end,
            }),
            care_team: assignments
                .into_iter()
                .filter(|a| in_window(a.started_at))
                .collect(),
            treatments: notes
                .iter()
                .filter(|n| in_window(n.written_at))
                .cloned()
                .collect(),
            equipment_used: equipment
                .into_iter()
                .filter(|u| in_window(u.started_at))
                .collect(),
            supplies_used: supplies
                .into_iter()
                .filter(|u| in_window(u.administered_at))
                .collect(),
            appointments: appointments
                .into_iter()
                .filter(|a| in_window(a.start_at))
                .collect(),
            summary: summarize(&notes),
        };
        Ok((sections, start))
    }
}

fn earliest_timestamp(
    assignments: &[StaffAssignment],
    equipment: &[EquipmentUsage],
    supplies: &[PatientSupplyUsage],
    appointments: &[Appointment],
    notes: &[MedicalNote],
) -> Option<DateTime<Utc>> {
    let mut earliest: Option<DateTime<Utc>> = None;
    let mut consider = |t: DateTime<Utc>| {
        earliest = Some(match earliest {
            Some(e) if e <= t => e,
            _ => t,
        });
    };
    assignments.iter().for_each(|a| consider(a.started_at));
    equipment.iter().for_each(|u| consider(u.started_at));
    supplies.iter().for_each(|u| consider(u.administered_at));
    appointments.iter().for_each(|a| consider(a.start_at));
    notes.iter().for_each(|n| consider(n.written_at));
    earliest
}

fn summarize(notes: &[MedicalNote]) -> String {
    match notes.last() {
        Some(note) => note.text.clone(),
        None => "No clinical notes recorded for this episode.".into(),
    }
}

fn render_report(
    patient: &Patient,
    bed: &Bed,
    sections: &ReportSections,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "DISCHARGE REPORT\n================\n\nIdentification\n  {} ({}), born {}\n  Bed {}\n\n",
        patient.name, patient.patient_code, patient.date_of_birth, bed.bed_number
    ));
    out.push_str(&format!(
        "Admission / Discharge\n  Episode {} .. {}\n\n",
        start.format("%Y-%m-%d %H:%M"),
        end.format("%Y-%m-%d %H:%M")
    ));
    out.push_str(&format!("Care Team ({} assignments)\n", sections.care_team.len()));
    for a in &sections.care_team {
        out.push_str(&format!("  - staff {} as {}\n", a.staff_id, a.role_on_case));
    }
    out.push_str(&format!("\nTreatments ({} notes)\n", sections.treatments.len()));
    out.push_str(&format!(
        "\nEquipment Used ({} records)\n",
        sections.equipment_used.len()
    ));
    for u in &sections.equipment_used {
        out.push_str(&format!("  - {} for {}\n", u.equipment_id, u.purpose));
    }
    out.push_str(&format!(
        "\nSupplies Used ({} records)\n",
        sections.supplies_used.len()
    ));
    for u in &sections.supplies_used {
        out.push_str(&format!("  - {} x{}\n", u.supply_id, u.quantity));
    }
    out.push_str(&format!(
        "\nAppointments ({})\n",
        sections.appointments.len()
    ));
    out.push_str(&format!("\nSummary\n  {}\n", sections.summary));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ward_domain::clock::ManualClock;
    use ward_domain::entity::*;
    use ward_storage::repo::*;
    use ward_storage::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: ManualClock,
        aggregator: DischargeAggregator,
        t0: DateTime<Utc>,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let clock = ManualClock::new(t0);
        let repos = store.repositories();
        let beds = Arc::new(BedLifecycleManager::new(
            repos.clone(),
            Arc::new(clock.clone()),
            30,
        ));
        let aggregator = DischargeAggregator::new(repos, beds, Arc::new(clock.clone()));

        BedRepo::insert(
            store.as_ref(),
            Bed {
                id: "b1".into(),
                bed_number: "101A".into(),
                room_id: "R1".into(),
                status: BedStatus::Occupied,
                current_patient_id: Some("p1".into()),
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
            aggregator,
            t0,
        }
    }

    #[tokio::test]
    async fn successful_discharge_commits_all_three() {
        let f = fixture().await;
        f.clock.advance(Duration::hours(48));

        let report = f
            .aggregator
            .generate(DischargeInput {
                patient_id: "p1".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.state, ReportState::Final);
        let patient = PatientRepo::get(f.store.as_ref(), "p1").await.unwrap().unwrap();
        assert_eq!(patient.status, PatientStatus::Discharged);
        let bed = BedRepo::get(f.store.as_ref(), "b1").await.unwrap().unwrap();
        assert_eq!(bed.status, BedStatus::Cleaning);
    }

    #[tokio::test]
    async fn report_includes_every_usage_row_in_window() {
        let f = fixture().await;
        let mid = f.t0 + Duration::hours(4);
        for (id, eq) in [("eu1", "eq1"), ("eu2", "eq2")] {
            EquipmentUsageRepo::insert(
                f.store.as_ref(),
                EquipmentUsage {
                    id: id.into(),
                    patient_id: "p1".into(),
                    equipment_id: eq.into(),
                    operator_id: "st1".into(),
                    started_at: mid,
                    ended_at: None,
                    purpose: "monitoring".into(),
                },
            )
            .await
            .unwrap();
        }
        SupplyUsageRepo::insert(
            f.store.as_ref(),
            PatientSupplyUsage {
                id: "su1".into(),
                patient_id: "p1".into(),
                supply_id: "s1".into(),
                quantity: 2,
                administered_by: "st1".into(),
                administered_at: mid,
            },
        )
        .await
        .unwrap();
        AssignmentRepo::insert(
            f.store.as_ref(),
            StaffAssignment {
                id: "as1".into(),
                patient_id: "p1".into(),
                staff_id: "st1".into(),
                role_on_case: "attending".into(),
                started_at: mid,
                ended_at: None,
            },
        )
        .await
        .unwrap();

        f.clock.advance(Duration::hours(24));
        let report = f
            .aggregator
            .generate(DischargeInput {
                patient_id: "p1".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.sections.equipment_used.len(), 2);
        assert_eq!(report.sections.supplies_used.len(), 1);
        assert_eq!(report.sections.care_team.len(), 1);
    }

    #[tokio::test]
    async fn window_widens_to_cover_early_records() {
        let f = fixture().await;
        // Written before the configured admission timestamp.
        let early = f.t0 - Duration::hours(3);
        SupplyUsageRepo::insert(
            f.store.as_ref(),
            PatientSupplyUsage {
                id: "su-early".into(),
                patient_id: "p1".into(),
                supply_id: "s1".into(),
                quantity: 1,
                administered_by: "st1".into(),
                administered_at: early,
            },
        )
        .await
        .unwrap();

        f.clock.advance(Duration::hours(12));
        let report = f
            .aggregator
            .generate(DischargeInput {
                patient_id: "p1".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.episode_start, early);
        assert_eq!(report.sections.supplies_used.len(), 1);
    }

    #[tokio::test]
    async fn failed_discharge_mutates_nothing() {
        let f = fixture().await;
        // Sabotage: bed already cleaning, so the bed transition will fail.
        let mut bed = BedRepo::get(f.store.as_ref(), "b1").await.unwrap().unwrap();
        bed.status = BedStatus::Cleaning;
        bed.current_patient_id = None;
        bed.cleaning_started_at = Some(f.t0);
        BedRepo::update(f.store.as_ref(), bed).await.unwrap();

        let err = f
            .aggregator
            .generate(DischargeInput {
                patient_id: "p1".into(),
                bed_id: Some("b1".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let patient = PatientRepo::get(f.store.as_ref(), "p1").await.unwrap().unwrap();
        assert_eq!(patient.status, PatientStatus::Active);
        assert!(f
            .store
            .final_for_patient("p1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn repeat_discharge_returns_existing_report() {
        let f = fixture().await;
        f.clock.advance(Duration::hours(2));
        let first = f
            .aggregator
            .generate(DischargeInput {
                patient_id: "p1".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let second = f
            .aggregator
            .generate(DischargeInput {
                patient_id: "p1".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    // ── Saga rollback ────────────────────────────────────────────

    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex as PlMutex;

    /// Fails the first `update` call, then behaves normally.
    struct FlakyPatients {
        inner: Arc<dyn PatientRepo>,
        fail_next_update: AtomicBool,
    }

    #[async_trait::async_trait]
    impl PatientRepo for FlakyPatients {
        async fn insert(&self, patient: Patient) -> Result<Patient> {
            self.inner.insert(patient).await
        }

        async fn get(&self, id: &str) -> Result<Option<Patient>> {
            self.inner.get(id).await
        }

        async fn get_by_code(&self, code: &str) -> Result<Option<Patient>> {
            self.inner.get_by_code(code).await
        }

        async fn update(&self, patient: Patient) -> Result<Patient> {
            if self.fail_next_update.swap(false, Ordering::SeqCst) {
                return Err(Error::TransientUpstream {
                    provider: "patients".into(),
                    message: "connection reset".into(),
                });
            }
            self.inner.update(patient).await
        }

        async fn search(&self, query: &str) -> Result<Vec<Patient>> {
            self.inner.search(query).await
        }

        async fn remove(&self, id: &str) -> Result<()> {
            self.inner.remove(id).await
        }

        async fn allocate_code(&self) -> Result<String> {
            self.inner.allocate_code().await
        }
    }

    /// Delegates to the real store while recording insert/remove ids, so
    /// tests can see the tentative report come and go.
    struct RecordingReports {
        inner: Arc<dyn ReportRepo>,
        inserted: PlMutex<Vec<String>>,
        removed: PlMutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ReportRepo for RecordingReports {
        async fn insert(&self, report: DischargeReport) -> Result<DischargeReport> {
            let report = self.inner.insert(report).await?;
            self.inserted.lock().push(report.id.clone());
            Ok(report)
        }

        async fn get(&self, id: &str) -> Result<Option<DischargeReport>> {
            self.inner.get(id).await
        }

        async fn update(&self, report: DischargeReport) -> Result<DischargeReport> {
            self.inner.update(report).await
        }

        async fn remove(&self, id: &str) -> Result<()> {
            self.removed.lock().push(id.to_owned());
            self.inner.remove(id).await
        }

        async fn final_for_patient(&self, patient_id: &str) -> Result<Option<DischargeReport>> {
            self.inner.final_for_patient(patient_id).await
        }
    }

    #[tokio::test]
    async fn in_flight_failure_rolls_back_bed_and_tentative_report() {
        let store = InMemoryStore::new();
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let clock = ManualClock::new(t0);

        let mut repos = store.repositories();
        repos.patients = Arc::new(FlakyPatients {
            inner: repos.patients.clone(),
            fail_next_update: AtomicBool::new(true),
        });
        let reports = Arc::new(RecordingReports {
            inner: repos.reports.clone(),
            inserted: PlMutex::new(Vec::new()),
            removed: PlMutex::new(Vec::new()),
        });
        repos.reports = reports.clone();

        let beds = Arc::new(BedLifecycleManager::new(
            repos.clone(),
            Arc::new(clock.clone()),
            30,
        ));
        let aggregator = DischargeAggregator::new(repos.clone(), beds, Arc::new(clock.clone()));

        BedRepo::insert(
            store.as_ref(),
            Bed {
                id: "b1".into(),
                bed_number: "101A".into(),
                room_id: "R1".into(),
                status: BedStatus::Occupied,
                current_patient_id: Some("p1".into()),
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

        // The bed transition commits, then the patient update fails: the
        // saga must restore the bed snapshot and delete the tentative
        // report before surfacing the error.
        clock.advance(Duration::hours(6));
        let err = aggregator
            .generate(DischargeInput {
                patient_id: "p1".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err}");

        let bed = BedRepo::get(store.as_ref(), "b1").await.unwrap().unwrap();
        assert_eq!(bed.status, BedStatus::Occupied);
        assert_eq!(bed.current_patient_id.as_deref(), Some("p1"));
        let patient = PatientRepo::get(store.as_ref(), "p1").await.unwrap().unwrap();
        assert_eq!(patient.status, PatientStatus::Active);

        let inserted = reports.inserted.lock().clone();
        assert_eq!(inserted.len(), 1, "exactly one tentative report written");
        assert_eq!(*reports.removed.lock(), inserted);
        assert!(ReportRepo::get(store.as_ref(), &inserted[0])
            .await
            .unwrap()
            .is_none());

        // With the transient condition gone, a retry completes normally.
        let report = aggregator
            .generate(DischargeInput {
                patient_id: "p1".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(report.state, ReportState::Final);
        let bed = BedRepo::get(store.as_ref(), "b1").await.unwrap().unwrap();
        assert_eq!(bed.status, BedStatus::Cleaning);
    }
}
