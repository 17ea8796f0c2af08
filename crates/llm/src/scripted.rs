//! Deterministic scripted provider for tests and offline operation.
//!
//! Responses are queued ahead of time and popped in order; every request
//! received is recorded for assertions. When the chat queue runs dry the
//! provider answers with a fixed fallback message, so an orchestrator loop
//! always terminates.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde_json::Value;

use ward_domain::{Error, Result};

use crate::traits::{ChatOutcome, ChatRequest, LlmProvider};

#[derive(Default)]
pub struct ScriptedProvider {
    chat_queue: Mutex<VecDeque<Result<ChatOutcome>>>,
    structured_queue: Mutex<VecDeque<Result<Value>>>,
    /// Prompts seen by `chat`, in order.
    chat_requests: Mutex<Vec<ChatRequest>>,
    structured_prompts: Mutex<Vec<String>>,
    embedding_dim: usize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            embedding_dim: 8,
            ..Self::default()
        }
    }

    pub fn push_chat(&self, outcome: ChatOutcome) {
        self.chat_queue.lock().push_back(Ok(outcome));
    }

    pub fn push_chat_text(&self, text: impl Into<String>) {
        self.push_chat(ChatOutcome {
            assistant_text: Some(text.into()),
            function_calls: Vec::new(),
        });
    }

    pub fn push_chat_calls(&self, calls: Vec<ward_domain::tool::FunctionCall>) {
        self.push_chat(ChatOutcome {
            assistant_text: None,
            function_calls: calls,
        });
    }

    pub fn push_chat_err(&self, err: Error) {
        self.chat_queue.lock().push_back(Err(err));
    }

    pub fn push_structured(&self, value: Value) {
        self.structured_queue.lock().push_back(Ok(value));
    }

    pub fn push_structured_err(&self, err: Error) {
        self.structured_queue.lock().push_back(Err(err));
    }

    pub fn chat_requests_seen(&self) -> Vec<ChatRequest> {
        self.chat_requests.lock().clone()
    }

    pub fn structured_prompts_seen(&self) -> Vec<String> {
        self.structured_prompts.lock().clone()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatOutcome> {
        self.chat_requests.lock().push(req);
        match self.chat_queue.lock().pop_front() {
            Some(outcome) => outcome,
            None => Ok(ChatOutcome {
                assistant_text: Some("(no scripted response remaining)".into()),
                function_calls: Vec::new(),
            }),
        }
    }

    async fn structured(&self, prompt: &str, _schema: &Value) -> Result<Value> {
        self.structured_prompts.lock().push(prompt.to_owned());
        match self.structured_queue.lock().pop_front() {
            Some(value) => value,
            None => Err(Error::TransientUpstream {
                provider: "scripted".into(),
                message: "structured queue is empty".into(),
            }),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // Stable pseudo-embedding from byte content: same text, same vector.
        let mut vector = vec![0.0f32; self.embedding_dim];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.embedding_dim] += f32::from(byte) / 255.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pops_responses_in_order() {
        let provider = ScriptedProvider::new();
        provider.push_chat_text("first");
        provider.push_chat_text("second");

        let a = provider.chat(ChatRequest::default()).await.unwrap();
        let b = provider.chat(ChatRequest::default()).await.unwrap();
        assert_eq!(a.assistant_text.as_deref(), Some("first"));
        assert_eq!(b.assistant_text.as_deref(), Some("second"));
        assert_eq!(provider.chat_requests_seen().len(), 2);
    }

    #[tokio::test]
    async fn empty_queue_yields_terminal_text() {
        let provider = ScriptedProvider::new();
        let out = provider.chat(ChatRequest::default()).await.unwrap();
        assert!(out.function_calls.is_empty());
        assert!(out.assistant_text.is_some());
    }

    #[tokio::test]
    async fn embeddings_are_deterministic() {
        let provider = ScriptedProvider::new();
        let a = provider.embed("sepsis protocol").await.unwrap();
        let b = provider.embed("sepsis protocol").await.unwrap();
        let c = provider.embed("bed turnover").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
