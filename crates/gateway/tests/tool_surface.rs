//! Tool-boundary properties: envelope shape, error taxonomy, stock and
//! appointment invariants, code/id duality.

mod common;

use serde_json::json;
use ward_domain::entity::StaffRole;
use ward_domain::envelope::ErrorKind;
use ward_storage::repo::SupplyRepo;

#[tokio::test]
async fn over_consumption_is_refused_and_stock_unchanged() {
    let app = common::app().await;
    let created = app
        .call(
            "create_supply",
            json!({ "name": "Saline", "item_code": "MED001", "quantity_on_hand": 5 }),
        )
        .await;
    assert!(created.success);
    let supply_id = created.data.unwrap()["id"].as_str().unwrap().to_owned();

    // S4: delta of -7 against 5 on hand.
    let envelope = app
        .call(
            "update_supply_stock",
            json!({ "supply": "MED001", "delta": -7, "kind": "consume", "performed_by": "u1" }),
        )
        .await;
    assert!(!envelope.success);
    assert_eq!(envelope.error_kind, Some(ErrorKind::StockInsufficient));

    let supply = SupplyRepo::get(app.store.as_ref(), &supply_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(supply.quantity_on_hand, 5);
    // Only the seeding restock transaction exists.
    let txs = app.store.transactions_for(&supply_id).await.unwrap();
    assert_eq!(txs.len(), 1);
}

#[tokio::test]
async fn transaction_deltas_always_sum_to_stock() {
    let app = common::app().await;
    app.call(
        "create_supply",
        json!({ "name": "Gauze", "item_code": "MED002", "quantity_on_hand": 20 }),
    )
    .await;

    for (delta, kind) in [(-3i64, "consume"), (10, "restock"), (-7, "consume"), (-25, "consume")] {
        // The last one fails; that is the point.
        let _ = app
            .call(
                "update_supply_stock",
                json!({ "supply": "MED002", "delta": delta, "kind": kind, "performed_by": "u1" }),
            )
            .await;
    }

    let supply = SupplyRepo::get_by_code(app.store.as_ref(), "MED002")
        .await
        .unwrap()
        .unwrap();
    let sum: i64 = app
        .store
        .transactions_for(&supply.id)
        .await
        .unwrap()
        .iter()
        .map(|t| t.delta)
        .sum();
    assert_eq!(supply.quantity_on_hand, 20);
    assert_eq!(sum, supply.quantity_on_hand);
}

#[tokio::test]
async fn overlapping_appointments_conflict_but_adjacent_succeed() {
    let app = common::app().await;
    app.seed_patient("p1", "P001").await;
    app.seed_staff("doc1", "EMP001", StaffRole::Doctor).await;

    // S5: 10:00–10:30 booked, 10:15–10:45 conflicts, 10:30–11:00 fits.
    let first = app
        .call(
            "create_appointment",
            json!({
                "patient": "P001", "doctor": "EMP001",
                "start_at": "2025-03-01T10:00:00Z", "duration_minutes": 30
            }),
        )
        .await;
    assert!(first.success, "{:?}", first.error_message);

    let overlapping = app
        .call(
            "create_appointment",
            json!({
                "patient": "P001", "doctor": "EMP001",
                "start_at": "2025-03-01T10:15:00Z", "duration_minutes": 30
            }),
        )
        .await;
    assert!(!overlapping.success);
    assert_eq!(overlapping.error_kind, Some(ErrorKind::Conflict));

    let adjacent = app
        .call(
            "create_appointment",
            json!({
                "patient": "P001", "doctor": "EMP001",
                "start_at": "2025-03-01T10:30:00Z", "duration_minutes": 30
            }),
        )
        .await;
    assert!(adjacent.success, "{:?}", adjacent.error_message);
}

#[tokio::test]
async fn every_failure_carries_a_taxonomy_kind_and_trace_id() {
    let app = common::app().await;
    let failures = [
        app.call("get_patient", json!({ "patient": "P999" })).await,
        app.call("get_patient", json!({})).await,
        app.call("no_such_tool", json!({})).await,
        app.call(
            "update_supply_stock",
            json!({ "supply": "MED001", "delta": -1, "kind": "consume", "performed_by": "u" }),
        )
        .await,
    ];
    let expected = [
        ErrorKind::NotFound,
        ErrorKind::InvalidArguments,
        ErrorKind::NotFound,
        ErrorKind::NotFound,
    ];
    for (envelope, expected_kind) in failures.iter().zip(expected) {
        assert!(!envelope.success);
        assert_eq!(envelope.error_kind, Some(expected_kind));
        assert!(envelope.error_message.is_some());
        assert!(!envelope.trace_id.is_empty());
    }
}

#[tokio::test]
async fn codes_and_ids_are_interchangeable_at_the_boundary() {
    let app = common::app().await;
    app.seed_patient("pid-77", "P077").await;

    let by_code = app.call("get_patient", json!({ "patient": "P077" })).await;
    let by_id = app.call("get_patient", json!({ "patient": "pid-77" })).await;
    assert!(by_code.success && by_id.success);
    assert_eq!(by_code.data, by_id.data);
}

#[tokio::test]
async fn invalid_enum_value_is_rejected_before_dispatch() {
    let app = common::app().await;
    app.seed_bed("b1", "101A", ward_domain::entity::BedStatus::Available)
        .await;

    let envelope = app
        .call(
            "update_bed_status",
            json!({ "bed": "101A", "status": "occupied" }),
        )
        .await;
    assert!(!envelope.success);
    assert_eq!(envelope.error_kind, Some(ErrorKind::InvalidArguments));

    // The bed never saw the call.
    let bed = ward_storage::repo::BedRepo::get(app.store.as_ref(), "b1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bed.status, ward_domain::entity::BedStatus::Available);
}

#[tokio::test]
async fn catalog_lists_contract_tools() {
    let app = common::app().await;
    let names: Vec<String> = app
        .state
        .registry
        .list()
        .into_iter()
        .map(|d| d.name)
        .collect();
    for expected in [
        "create_patient",
        "assign_bed_to_patient",
        "discharge_bed",
        "get_bed_status_with_time_remaining",
        "create_bed_turnover",
        "auto_update_expired_cleaning_beds",
        "update_supply_stock",
        "get_low_stock_supplies",
        "create_appointment",
        "generate_discharge_report",
        "enhanced_symptom_analysis",
        "enhanced_differential_diagnosis",
        "execute_patient_admission_workflow",
        "ai_master_request",
        "run_predictive_forecast",
        "chat",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
}
