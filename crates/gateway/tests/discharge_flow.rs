//! Discharge scenarios: cleaning timers, sweep, and report completeness.

mod common;

use chrono::Duration;
use serde_json::json;
use ward_domain::entity::{BedStatus, PatientStatus, StaffRole};
use ward_storage::repo::{BedRepo, PatientRepo};

#[tokio::test]
async fn discharge_starts_cleaning_and_sweep_completes_it() {
    let app = common::app().await;
    app.seed_bed("b1", "101A", BedStatus::Available).await;
    app.seed_patient("p1", "P001").await;
    app.occupy("b1", "p1").await;

    // S3: discharge starts the 30-minute cleaning window.
    let envelope = app.call("discharge_bed", json!({ "bed": "101A" })).await;
    assert!(envelope.success, "{:?}", envelope.error_message);
    let data = envelope.data.unwrap();
    assert_eq!(data["bed"]["status"], "cleaning");
    assert_eq!(data["bed"]["time_remaining_minutes"], 30);

    // Not yet expired: sweep finds nothing.
    app.clock.advance(Duration::minutes(29));
    let envelope = app
        .call("auto_update_expired_cleaning_beds", json!({}))
        .await;
    assert!(envelope.data.unwrap()["updated"].as_array().unwrap().is_empty());

    // One minute past the window: the bed comes back.
    app.clock.advance(Duration::minutes(2));
    let envelope = app
        .call("auto_update_expired_cleaning_beds", json!({}))
        .await;
    let updated = envelope.data.unwrap()["updated"].clone();
    assert_eq!(updated, json!(["b1"]));

    let bed = BedRepo::get(app.store.as_ref(), "b1").await.unwrap().unwrap();
    assert_eq!(bed.status, BedStatus::Available);
}

#[tokio::test]
async fn discharge_report_covers_all_episode_records() {
    let app = common::app().await;
    app.seed_bed("b1", "101A", BedStatus::Available).await;
    app.seed_patient("p1", "P001").await;
    app.seed_staff("st1", "EMP001", StaffRole::Doctor).await;
    app.occupy("b1", "p1").await;

    // Care team + two equipment usages + one supply usage, all via tools.
    let ok = app
        .call(
            "assign_staff_to_patient_simple",
            json!({ "staff": "EMP001", "patient": "P001" }),
        )
        .await;
    assert!(ok.success);

    for name in ["Ventilator", "Infusion Pump"] {
        let created = app.call("create_equipment", json!({ "name": name })).await;
        let code = created.data.unwrap()["equipment_code"].as_str().unwrap().to_owned();
        let usage = app
            .call(
                "add_equipment_usage_simple",
                json!({ "equipment": code, "patient": "P001", "operator": "EMP001" }),
            )
            .await;
        assert!(usage.success, "{:?}", usage.error_message);
    }

    let supply = app
        .call(
            "create_supply",
            json!({ "name": "Saline", "quantity_on_hand": 10 }),
        )
        .await;
    let item_code = supply.data.unwrap()["item_code"].as_str().unwrap().to_owned();
    let usage = app
        .call(
            "record_patient_supply_usage",
            json!({ "supply": item_code, "patient": "P001", "quantity": 2, "administered_by": "st1" }),
        )
        .await;
    assert!(usage.success, "{:?}", usage.error_message);

    app.clock.advance(Duration::hours(24));
    let envelope = app
        .call("generate_discharge_report", json!({ "patient": "P001" }))
        .await;
    assert!(envelope.success, "{:?}", envelope.error_message);
    let report = envelope.data.unwrap();

    // S6: every usage row appears in its section.
    assert_eq!(report["sections"]["equipment_used"].as_array().unwrap().len(), 2);
    assert_eq!(report["sections"]["supplies_used"].as_array().unwrap().len(), 1);
    assert_eq!(report["sections"]["care_team"].as_array().unwrap().len(), 1);

    // The discharge committed all three legs.
    let patient = PatientRepo::get(app.store.as_ref(), "p1").await.unwrap().unwrap();
    assert_eq!(patient.status, PatientStatus::Discharged);
    let bed = BedRepo::get(app.store.as_ref(), "b1").await.unwrap().unwrap();
    assert_eq!(bed.status, BedStatus::Cleaning);
}

#[tokio::test]
async fn discharging_by_bed_reference_finds_the_occupant() {
    let app = common::app().await;
    app.seed_bed("b1", "101A", BedStatus::Available).await;
    app.seed_patient("p1", "P001").await;
    app.occupy("b1", "p1").await;

    let envelope = app
        .call("generate_discharge_report", json!({ "bed": "101A" }))
        .await;
    assert!(envelope.success, "{:?}", envelope.error_message);
    assert_eq!(envelope.data.unwrap()["patient_id"], "p1");
}

#[tokio::test]
async fn discharge_of_unoccupied_patient_is_conflict() {
    let app = common::app().await;
    app.seed_patient("p1", "P001").await;

    let envelope = app
        .call("generate_discharge_report", json!({ "patient": "P001" }))
        .await;
    assert!(!envelope.success);
    assert_eq!(
        envelope.error_kind,
        Some(ward_domain::envelope::ErrorKind::Conflict)
    );
    // Nothing changed.
    let patient = PatientRepo::get(app.store.as_ref(), "p1").await.unwrap().unwrap();
    assert_eq!(patient.status, PatientStatus::Active);
}
