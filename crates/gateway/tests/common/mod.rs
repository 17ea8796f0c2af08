//! Shared fixture for the gateway integration tests: in-memory
//! repositories, a manual clock, and a scripted LLM provider wired
//! through the production bootstrap path.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use ward_domain::clock::ManualClock;
use ward_domain::config::Config;
use ward_domain::entity::*;
use ward_domain::envelope::ToolEnvelope;
use ward_gateway::bootstrap;
use ward_gateway::state::AppState;
use ward_llm::ScriptedProvider;
use ward_storage::repo::{BedRepo, PatientRepo, StaffRepo};
use ward_storage::{CodeResolver, InMemoryStore};

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub clock: ManualClock,
    pub llm: Arc<ScriptedProvider>,
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
}

pub async fn app() -> TestApp {
    app_with(Config::default()).await
}

pub async fn app_with(config: Config) -> TestApp {
    let store = InMemoryStore::new();
    let repos = store.repositories();
    let resolver = CodeResolver::new(repos.clone());
    let clock = ManualClock::new(t0());
    let llm = Arc::new(ScriptedProvider::new());

    let state = bootstrap::build_app_state_with(
        Arc::new(config),
        repos,
        resolver,
        Arc::new(clock.clone()),
        llm.clone(),
    )
    .await
    .expect("test app state builds");

    TestApp {
        state,
        store,
        clock,
        llm,
    }
}

impl TestApp {
    pub async fn call(&self, tool: &str, args: Value) -> ToolEnvelope {
        self.state.registry.call(tool, args).await
    }

    pub async fn seed_bed(&self, id: &str, bed_number: &str, status: BedStatus) -> Bed {
        let bed = Bed {
            id: id.into(),
            bed_number: bed_number.into(),
            room_id: "R1".into(),
            status,
            current_patient_id: None,
            cleaning_started_at: None,
            cleaning_duration_minutes: None,
        };
        BedRepo::insert(self.store.as_ref(), bed).await.unwrap()
    }

    pub async fn seed_patient(&self, id: &str, code: &str) -> Patient {
        let patient = Patient {
            id: id.into(),
            patient_code: code.into(),
            name: "Jane Roe".into(),
            date_of_birth: "1990-02-01".into(),
            status: PatientStatus::Active,
            created_at: t0(),
            admitted_at: Some(t0()),
        };
        PatientRepo::insert(self.store.as_ref(), patient)
            .await
            .unwrap()
    }

    pub async fn seed_staff(&self, id: &str, code: &str, role: StaffRole) -> Staff {
        let member = Staff {
            id: id.into(),
            employee_code: code.into(),
            name: "Sam Kim".into(),
            role,
            department_id: None,
            active: true,
        };
        StaffRepo::insert(self.store.as_ref(), member)
            .await
            .unwrap()
    }

    pub async fn occupy(&self, bed_id: &str, patient_id: &str) {
        self.state
            .beds
            .assign(bed_id, patient_id)
            .await
            .expect("seed occupancy");
    }
}
