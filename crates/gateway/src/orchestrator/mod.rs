//! Orchestrator — the single natural-language entry point.
//!
//! A chat turn appends the user message to its session, loops the LLM
//! against the tool catalog (bounded by `orchestrator.max_tool_rounds`),
//! dispatches every proposed call through the registry, and returns the
//! final assistant text plus the raw envelopes. Bed-affecting tool calls
//! trigger a synchronous cleaning sweep afterwards; hook failures never
//! fail the originating call.

pub mod classify;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use ward_domain::config::Config;
use ward_domain::envelope::ToolEnvelope;
use ward_domain::tool::Message;
use ward_domain::trace::TraceEvent;
use ward_llm::{ChatRequest, LlmProvider};

use crate::registry::ToolRegistry;
use crate::sessions::ConversationStore;

/// Tools whose success can leave expired cleaning timers behind.
const BED_AFFECTING_TOOLS: &[&str] = &[
    "discharge_bed",
    "assign_bed_to_patient",
    "update_bed_status",
    "create_bed_turnover",
    "auto_update_expired_cleaning_beds",
];

const SWEEP_TOOL: &str = "auto_update_expired_cleaning_beds";

const SYSTEM_PROMPT: &str = "You are the Wardline hospital operations assistant. \
Use the available tools to read and change hospital state; never invent data. \
Tool results are authoritative. Answer concisely once you have what you need. \
Clinical tools return suggestions with confidence scores, not diagnoses — say so \
when relaying them.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub envelope: ToolEnvelope,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub session_id: String,
    pub assistant_text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Set when the turn ended abnormally: `max_tool_rounds_reached`,
    /// `turn_timeout`, or `llm_unavailable`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    llm: Arc<dyn LlmProvider>,
    sessions: Arc<ConversationStore>,
    classifier: classify::RequestClassifier,
    config: Arc<Config>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        llm: Arc<dyn LlmProvider>,
        sessions: Arc<ConversationStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            registry,
            llm,
            sessions,
            classifier: classify::RequestClassifier::new(),
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<ConversationStore> {
        &self.sessions
    }

    /// Run one chat turn. Serialized per session by the session's turn
    /// lock; the store's map lock is never held across I/O.
    pub async fn chat(&self, session_id: Option<&str>, user_message: &str) -> ChatTurn {
        let (session_id, turn_lock) = self.sessions.resolve_or_create(session_id);
        let _turn = turn_lock.lock().await;

        let deadline =
            Instant::now() + Duration::from_millis(self.config.orchestrator.chat_turn_timeout_ms);
        self.sessions
            .append(&session_id, Message::user(user_message));

        let system_prompt = self.build_system_prompt(user_message);
        let mut tool_calls: Vec<ToolCallRecord> = Vec::new();
        let mut last_text = String::new();
        let mut rounds = 0u32;

        let note = 'turn: loop {
            if rounds >= self.config.orchestrator.max_tool_rounds {
                break Some("max_tool_rounds_reached".to_owned());
            }
            if Instant::now() >= deadline {
                break Some("turn_timeout".to_owned());
            }
            rounds += 1;

            let mut messages = vec![Message::system(&system_prompt)];
            messages.extend(self.sessions.window(&session_id));
            let req = ChatRequest {
                messages,
                tools: self.registry.definitions(),
                model: None,
            };

            let llm_started = Instant::now();
            let outcome = tokio::time::timeout(
                Duration::from_millis(self.config.llm.call_timeout_ms),
                self.llm.chat(req),
            )
            .await;
            let outcome = match outcome {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "LLM call failed mid-turn");
                    last_text = "I could not reach the language model; please retry.".into();
                    break 'turn Some("llm_unavailable".to_owned());
                }
                Err(_) => {
                    tracing::warn!("LLM call exceeded its deadline");
                    last_text = "The language model timed out; please retry.".into();
                    break 'turn Some("llm_unavailable".to_owned());
                }
            };
            TraceEvent::LlmRequest {
                provider: self.llm.provider_id().into(),
                model: self.config.llm.model.clone(),
                duration_ms: llm_started.elapsed().as_millis() as u64,
                function_calls: outcome.function_calls.len(),
            }
            .emit();

            let text = outcome.assistant_text.clone().unwrap_or_default();
            if outcome.function_calls.is_empty() {
                // Final answer for this turn.
                self.sessions
                    .append(&session_id, Message::assistant(text.clone()));
                last_text = text;
                break None;
            }

            self.sessions.append(
                &session_id,
                Message::assistant_with_calls(text.clone(), outcome.function_calls.clone()),
            );
            if !text.is_empty() {
                last_text = text;
            }

            for call in outcome.function_calls {
                if Instant::now() >= deadline {
                    break 'turn Some("turn_timeout".to_owned());
                }
                let envelope = self
                    .registry
                    .call(&call.tool_name, call.arguments.clone())
                    .await;
                self.sessions.append(
                    &session_id,
                    Message::tool_result(
                        &call.call_id,
                        serde_json::to_string(&envelope).unwrap_or_default(),
                    ),
                );
                let succeeded = envelope.success;
                tool_calls.push(ToolCallRecord {
                    tool_name: call.tool_name.clone(),
                    arguments: call.arguments,
                    envelope,
                });
                if succeeded {
                    self.run_bed_hook(&call.tool_name).await;
                }
            }
        };

        if let Some(note) = &note {
            if last_text.is_empty() {
                last_text = format!(
                    "I had to stop early ({note}); here is what completed so far."
                );
            }
            self.sessions
                .append(&session_id, Message::assistant(last_text.clone()));
        }

        TraceEvent::TurnCompleted {
            session_id: session_id.clone(),
            rounds,
            tool_calls: tool_calls.len(),
        }
        .emit();

        ChatTurn {
            session_id,
            assistant_text: last_text,
            tool_calls,
            note,
        }
    }

    fn build_system_prompt(&self, user_message: &str) -> String {
        match self.classifier.classify(user_message) {
            Some(hint) => format!(
                "{SYSTEM_PROMPT}\n\nThis looks like a {} request; the `{}` tool usually \
                 serves it best, but use your judgment.",
                hint.category, hint.preferred_tool
            ),
            None => SYSTEM_PROMPT.to_owned(),
        }
    }

    /// After any bed-affecting tool, sweep expired cleaning timers so bed
    /// state the user is about to read is fresh. Failures are logged only.
    async fn run_bed_hook(&self, tool_name: &str) {
        if tool_name == SWEEP_TOOL || !BED_AFFECTING_TOOLS.contains(&tool_name) {
            return;
        }
        let envelope = self.registry.call(SWEEP_TOOL, serde_json::json!({})).await;
        if !envelope.success {
            tracing::warn!(
                trace_id = %envelope.trace_id,
                error = envelope.error_message.as_deref().unwrap_or("unknown"),
                "post-operation cleaning sweep failed"
            );
        }
    }
}
