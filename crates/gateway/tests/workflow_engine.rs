//! Workflow engine scenarios: the clinical and document graphs end to
//! end, structured-output retry, checkpoint resumability, and
//! cooperative cancellation.

mod common;

use serde_json::json;
use ward_domain::entity::BedStatus;
use ward_gateway::workflow::{AdmissionState, RunState, RunStatus, WorkflowKind};
use ward_storage::repo::BedRepo;
use ward_storage::{CheckpointKey, CheckpointStore};

#[tokio::test]
async fn clinical_decision_runs_all_nodes_and_averages_confidence() {
    let app = common::app().await;
    app.seed_patient("p1", "P001").await;

    app.llm.push_structured(json!({
        "symptoms": ["fever", "productive cough"],
        "confidence": 0.9
    }));
    app.llm.push_structured(json!({
        "differential": [
            { "condition": "community-acquired pneumonia", "likelihood": 0.6 },
            { "condition": "acute bronchitis", "likelihood": 0.3 }
        ],
        "confidence": 0.7
    }));
    app.llm.push_structured(json!({
        "recommendations": [
            { "action": "chest x-ray", "rationale": "confirm consolidation" }
        ],
        "confidence": 0.8
    }));

    let run = app
        .state
        .engine
        .start(
            WorkflowKind::ClinicalDecision,
            "sess-clin",
            json!({ "query": "fever and cough for three days", "patient_id": "p1" }),
        )
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    let state = &run.payload;
    assert_eq!(state["symptoms"], json!(["fever", "productive cough"]));
    assert_eq!(state["differential"].as_array().unwrap().len(), 2);
    assert_eq!(state["recommendations"].as_array().unwrap().len(), 1);
    let confidence = state["confidence"].as_f64().unwrap();
    assert!((confidence - 0.8).abs() < 1e-9, "mean of 0.9/0.7/0.8, got {confidence}");
    // Seven nodes ran.
    assert_eq!(run.history.len(), 7);
}

#[tokio::test]
async fn malformed_structured_output_retries_with_stricter_prompt() {
    let app = common::app().await;

    // First response misses the required shape; the retry provides it.
    app.llm.push_structured(json!({ "oops": true }));
    app.llm.push_structured(json!({ "symptoms": ["headache"], "confidence": 0.6 }));
    app.llm.push_structured(json!({ "differential": [], "confidence": 0.5 }));
    app.llm.push_structured(json!({ "recommendations": [], "confidence": 0.5 }));

    let run = app
        .state
        .engine
        .start(
            WorkflowKind::ClinicalDecision,
            "sess-retry",
            json!({ "query": "headache" }),
        )
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    let prompts = app.llm.structured_prompts_seen();
    assert!(prompts[1].contains("ONLY a JSON object"), "second prompt is the strict one");
}

#[tokio::test]
async fn document_run_drops_invalid_entities_but_persists_the_rest() {
    let app = common::app().await;
    app.llm.push_structured(json!({
        "entities": [
            { "kind": "medication", "value": "ceftriaxone" },
            { "kind": "starship", "value": "enterprise" },
            { "kind": "date", "value": "" }
        ]
    }));

    let run = app
        .state
        .engine
        .start(
            WorkflowKind::DocumentProcessing,
            "sess-doc",
            json!({ "title": "ICU note", "text": "Started ceftriaxone." }),
        )
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.payload["validated_entities"].as_array().unwrap().len(), 1);
    assert_eq!(run.payload["errors"].as_array().unwrap().len(), 2);
    assert_eq!(run.payload["stored_refs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn document_run_fails_when_every_entity_is_invalid() {
    let app = common::app().await;
    app.llm.push_structured(json!({
        "entities": [ { "kind": "starship", "value": "enterprise" } ]
    }));

    let run = app
        .state
        .engine
        .start(
            WorkflowKind::DocumentProcessing,
            "sess-doc-bad",
            json!({ "text": "gibberish" }),
        )
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.unwrap().contains("invalid"));
}

#[tokio::test]
async fn resume_continues_from_the_checkpointed_node() {
    // Simulate a process that died after create_patient's checkpoint: the
    // checkpoint directory survives, the new process resumes from it.
    let dir = tempfile::tempdir().unwrap();
    let mut config = ward_domain::config::Config::default();
    config.workflows.checkpoint_dir = Some(dir.path().to_path_buf());
    let app = common::app_with(config).await;

    app.seed_bed("b1", "101A", BedStatus::Available).await;
    app.seed_patient("p1", "P001").await;

    // Hand-write the mid-run checkpoint the dead process left behind.
    let mut state = AdmissionState::from_input(json!({
        "name": "Jane Roe", "date_of_birth": "1990-02-01"
    }))
    .unwrap();
    state.validation_result = Some("ok".into());
    state.patient_id = Some("p1".into());
    let run = RunState {
        run_id: "run-crashed".into(),
        kind: WorkflowKind::Admission,
        session_id: "sess-crash".into(),
        current_node: "find_bed".into(),
        status: RunStatus::Running,
        payload: serde_json::to_value(&state).unwrap(),
        history: Vec::new(),
        error: None,
        seq: 2,
    };
    let checkpoints =
        ward_storage::FileCheckpointStore::new(dir.path()).unwrap();
    let key = CheckpointKey::new("sess-crash", "admission");
    checkpoints.put(&key, 1, b"{}".to_vec()).await.unwrap();
    checkpoints.put(&key, 2, serde_json::to_vec(&run).unwrap()).await.unwrap();

    let resumed = app
        .state
        .engine
        .resume_session("sess-crash", WorkflowKind::Admission)
        .await
        .unwrap();

    assert_eq!(resumed.run_id, "run-crashed");
    assert_eq!(resumed.status, RunStatus::Succeeded);
    let bed = BedRepo::get(app.store.as_ref(), "b1").await.unwrap().unwrap();
    assert_eq!(bed.status, BedStatus::Occupied);
    assert_eq!(bed.current_patient_id.as_deref(), Some("p1"));

    // Resuming a terminal run is a no-op returning the same state.
    let again = app
        .state
        .engine
        .resume_session("sess-crash", WorkflowKind::Admission)
        .await
        .unwrap();
    assert_eq!(again.status, RunStatus::Succeeded);
    assert_eq!(again.seq, resumed.seq);
}

#[tokio::test]
async fn terminal_checkpoints_clear_for_the_next_episode() {
    let app = common::app().await;
    let engine = &app.state.engine;

    // A run that fails mid-way leaves a terminal checkpoint, which must
    // not block a fresh start on the same (session, kind): no structured
    // responses queued → transient errors exhaust retries → Failed.
    let run = engine
        .start(
            WorkflowKind::ClinicalDecision,
            "sess-conflict",
            json!({ "query": "anything" }),
        )
        .await
        .unwrap();
    assert_eq!(run.status, RunStatus::Failed);

    app.llm.push_structured(json!({ "symptoms": [], "confidence": 0.5 }));
    app.llm.push_structured(json!({ "differential": [], "confidence": 0.5 }));
    app.llm.push_structured(json!({ "recommendations": [], "confidence": 0.5 }));
    let second = engine
        .start(
            WorkflowKind::ClinicalDecision,
            "sess-conflict",
            json!({ "query": "again" }),
        )
        .await
        .unwrap();
    assert_eq!(second.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn cancel_aborts_a_live_run_at_the_next_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ward_domain::config::Config::default();
    config.workflows.checkpoint_dir = Some(dir.path().to_path_buf());
    // Make wait_or_fail linger so the test can cancel mid-run.
    config.workflows.admission_bed_retry_attempts = 50;
    config.workflows.admission_bed_retry_delay_ms = 100;
    let app = common::app_with(config).await;
    // No beds at all: the run loops find_bed → wait_or_fail.

    let engine = app.state.engine.clone();
    let handle = tokio::spawn(async move {
        engine
            .start(
                WorkflowKind::Admission,
                "sess-cancel",
                json!({ "name": "Jane Roe", "date_of_birth": "1990-02-01" }),
            )
            .await
    });

    // Learn the run id from the shared checkpoint directory.
    let checkpoints = ward_storage::FileCheckpointStore::new(dir.path()).unwrap();
    let key = CheckpointKey::new("sess-cancel", "admission");
    let run_id = loop {
        if let Some((_, bytes)) = checkpoints.get(&key).await.unwrap() {
            let run: RunState = serde_json::from_slice(&bytes).unwrap();
            break run.run_id;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    };

    let view = app.state.engine.cancel(&run_id).await.unwrap();
    assert_eq!(view.status, RunStatus::Failed);

    let finished = handle.await.unwrap().unwrap();
    assert_eq!(finished.status, RunStatus::Failed);
    assert_eq!(finished.error.as_deref(), Some("cancelled"));

    // Compensation removed the patient the run had created.
    let survivors = ward_storage::repo::PatientRepo::search(app.store.as_ref(), "Jane")
        .await
        .unwrap();
    assert!(survivors.is_empty());
}
