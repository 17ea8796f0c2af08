//! End-to-end admission workflow scenarios.

mod common;

use regex::Regex;
use serde_json::json;
use ward_domain::entity::{BedStatus, StaffRole};
use ward_storage::repo::{BedRepo, PatientRepo};

#[tokio::test]
async fn admission_happy_path_occupies_bed_and_mints_code() {
    let app = common::app().await;
    app.seed_bed("b1", "101A", BedStatus::Available).await;
    app.seed_staff("st1", "EMP001", StaffRole::Doctor).await;

    let envelope = app
        .call(
            "execute_patient_admission_workflow",
            json!({ "name": "Jane Roe", "date_of_birth": "1990-02-01" }),
        )
        .await;
    assert!(envelope.success, "{:?}", envelope.error_message);
    let data = envelope.data.unwrap();
    assert_eq!(data["status"], "succeeded");

    let patient_id = data["state"]["patient_id"].as_str().unwrap().to_owned();
    let patient = PatientRepo::get(app.store.as_ref(), &patient_id)
        .await
        .unwrap()
        .expect("patient was created");
    assert!(
        Regex::new(r"^P\d+$").unwrap().is_match(&patient.patient_code),
        "unexpected code {}",
        patient.patient_code
    );

    let bed = BedRepo::get(app.store.as_ref(), "b1").await.unwrap().unwrap();
    assert_eq!(bed.status, BedStatus::Occupied);
    assert_eq!(bed.current_patient_id.as_deref(), Some(patient_id.as_str()));

    // The admission note landed in the patient's history.
    assert_eq!(data["state"]["reports"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn admission_with_no_bed_fails_and_creates_no_patient() {
    let app = common::app().await;
    app.seed_bed("b1", "101A", BedStatus::Maintenance).await;
    app.seed_bed("b2", "102A", BedStatus::Maintenance).await;

    let envelope = app
        .call(
            "execute_patient_admission_workflow",
            json!({ "name": "Jane Roe", "date_of_birth": "1990-02-01" }),
        )
        .await;
    assert!(envelope.success, "the adapter itself succeeds; the run failed");
    let data = envelope.data.unwrap();
    assert_eq!(data["status"], "failed");
    assert_eq!(data["error"], "no_bed_available");

    // The created patient row was compensated away.
    let survivors = PatientRepo::search(app.store.as_ref(), "Jane").await.unwrap();
    assert!(survivors.is_empty(), "no patient should remain: {survivors:?}");

    // Beds untouched.
    for bed_id in ["b1", "b2"] {
        let bed = BedRepo::get(app.store.as_ref(), bed_id).await.unwrap().unwrap();
        assert_eq!(bed.status, BedStatus::Maintenance);
    }
}

#[tokio::test]
async fn admission_rejects_malformed_birth_date() {
    let app = common::app().await;
    app.seed_bed("b1", "101A", BedStatus::Available).await;

    let envelope = app
        .call(
            "execute_patient_admission_workflow",
            json!({ "name": "Jane Roe", "date_of_birth": "02/01/1990" }),
        )
        .await;
    assert!(envelope.success);
    let data = envelope.data.unwrap();
    assert_eq!(data["status"], "failed");
    assert!(data["error"].as_str().unwrap().contains("YYYY-MM-DD"));
}

#[tokio::test]
async fn second_admission_start_for_same_session_conflicts_while_active() {
    let app = common::app().await;
    app.seed_bed("b1", "101A", BedStatus::Available).await;

    // First run completes; a second start on the same session key is fine
    // because terminal checkpoints are cleared for the next episode.
    let first = app
        .call(
            "execute_patient_admission_workflow",
            json!({ "name": "Jane Roe", "date_of_birth": "1990-02-01", "session_id": "s1" }),
        )
        .await;
    assert!(first.success);

    app.seed_bed("b2", "102A", BedStatus::Available).await;
    let second = app
        .call(
            "execute_patient_admission_workflow",
            json!({ "name": "John Doe", "date_of_birth": "1985-05-05", "session_id": "s1" }),
        )
        .await;
    assert!(second.success, "{:?}", second.error_message);
    assert_eq!(second.data.unwrap()["status"], "succeeded");
}
