//! Orchestrator turn behavior: the bounded tool loop, post-operation bed
//! hook, classifier hints, and conversation memory.

mod common;

use chrono::Duration;
use serde_json::json;
use ward_domain::config::Config;
use ward_domain::entity::BedStatus;
use ward_domain::tool::FunctionCall;
use ward_storage::repo::BedRepo;

fn call(name: &str, args: serde_json::Value) -> FunctionCall {
    FunctionCall {
        call_id: uuid::Uuid::new_v4().to_string(),
        tool_name: name.into(),
        arguments: args,
    }
}

#[tokio::test]
async fn plain_answer_ends_the_turn_after_one_round() {
    let app = common::app().await;
    app.llm.push_chat_text("There are no beds configured yet.");

    let turn = app.state.orchestrator.chat(None, "any beds free?").await;
    assert_eq!(turn.assistant_text, "There are no beds configured yet.");
    assert!(turn.tool_calls.is_empty());
    assert!(turn.note.is_none());
    assert_eq!(app.llm.chat_requests_seen().len(), 1);
}

#[tokio::test]
async fn tool_rounds_are_capped() {
    let mut config = Config::default();
    config.orchestrator.max_tool_rounds = 3;
    let app = common::app_with(config).await;

    // The model keeps asking for tools forever; the loop must stop at 3.
    for _ in 0..10 {
        app.llm
            .push_chat_calls(vec![call("list_beds", json!({}))]);
    }

    let turn = app.state.orchestrator.chat(None, "spin forever").await;
    assert_eq!(turn.note.as_deref(), Some("max_tool_rounds_reached"));
    assert_eq!(turn.tool_calls.len(), 3);
    assert_eq!(app.llm.chat_requests_seen().len(), 3);
}

#[tokio::test]
async fn tool_results_feed_the_next_round() {
    let app = common::app().await;
    app.seed_bed("b1", "101A", BedStatus::Available).await;

    app.llm
        .push_chat_calls(vec![call("list_beds", json!({ "status": "available" }))]);
    app.llm.push_chat_text("Bed 101A is free.");

    let turn = app.state.orchestrator.chat(None, "any beds free?").await;
    assert_eq!(turn.assistant_text, "Bed 101A is free.");
    assert_eq!(turn.tool_calls.len(), 1);
    assert!(turn.tool_calls[0].envelope.success);

    // Round two saw the tool result message in its window.
    let second_request = &app.llm.chat_requests_seen()[1];
    let has_tool_message = second_request
        .messages
        .iter()
        .any(|m| m.role == ward_domain::tool::Role::Tool);
    assert!(has_tool_message);
}

#[tokio::test]
async fn bed_affecting_tools_trigger_the_cleaning_sweep() {
    let app = common::app().await;
    // Bed A occupied (the model will discharge it); bed B stuck in an
    // expired cleaning cycle that only the hook's sweep can release.
    app.seed_bed("ba", "101A", BedStatus::Available).await;
    app.seed_patient("p1", "P001").await;
    app.occupy("ba", "p1").await;
    app.seed_bed("bb", "102A", BedStatus::Available).await;
    app.seed_patient("p2", "P002").await;
    app.occupy("bb", "p2").await;
    app.state.beds.discharge("bb").await.unwrap();
    app.clock.advance(Duration::minutes(45));

    app.llm
        .push_chat_calls(vec![call("discharge_bed", json!({ "bed": "101A" }))]);
    app.llm.push_chat_text("Done — bed 101A is turning over.");

    let turn = app
        .state
        .orchestrator
        .chat(None, "discharge bed 101A")
        .await;
    assert!(turn.tool_calls[0].envelope.success);

    // The hook swept bed B back to available in the same turn.
    let bed_b = BedRepo::get(app.store.as_ref(), "bb").await.unwrap().unwrap();
    assert_eq!(bed_b.status, BedStatus::Available);
}

#[tokio::test]
async fn classifier_hint_lands_in_the_system_prompt() {
    let app = common::app().await;
    app.llm.push_chat_text("Forecast ready.");

    app.state
        .orchestrator
        .chat(None, "forecast our saline stock for next week")
        .await;

    let request = &app.llm.chat_requests_seen()[0];
    let system = &request.messages[0];
    assert_eq!(system.role, ward_domain::tool::Role::System);
    assert!(system.content.contains("run_predictive_forecast"));

    // A plain message gets the bare prompt.
    app.llm.push_chat_text("Hello.");
    app.state.orchestrator.chat(None, "hello there").await;
    let request = &app.llm.chat_requests_seen()[1];
    assert!(!request.messages[0].content.contains("run_predictive_forecast"));
}

#[tokio::test]
async fn sessions_accumulate_across_turns() {
    let app = common::app().await;
    app.llm.push_chat_text("Hi Jane.");
    app.llm.push_chat_text("As I said, hi.");

    let first = app.state.orchestrator.chat(Some("s1"), "I'm Jane").await;
    assert_eq!(first.session_id, "s1");
    app.state.orchestrator.chat(Some("s1"), "what did I say?").await;

    // Second request carries the first turn's exchange.
    let second_request = &app.llm.chat_requests_seen()[1];
    let texts: Vec<&str> = second_request
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert!(texts.contains(&"I'm Jane"));
    assert!(texts.contains(&"Hi Jane."));
}

#[tokio::test]
async fn chat_is_reachable_as_a_tool() {
    let app = common::app().await;
    app.llm.push_chat_text("Hello from the envelope.");

    let envelope = app
        .call("chat", json!({ "message": "hello", "session_id": "s9" }))
        .await;
    assert!(envelope.success);
    let data = envelope.data.unwrap();
    assert_eq!(data["session_id"], "s9");
    assert_eq!(data["assistant_text"], "Hello from the envelope.");
}
