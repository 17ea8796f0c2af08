use ward_domain::tool::{FunctionCall, Message, ToolDefinition};
use ward_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / outcome types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The conversation messages to send.
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
}

/// What the model decided: a final answer, one or more function calls,
/// or both (some providers emit text alongside calls).
#[derive(Debug, Clone, Default)]
pub struct ChatOutcome {
    pub assistant_text: Option<String>,
    pub function_calls: Vec<FunctionCall>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every LLM adapter implements.
///
/// `structured` failures are retriable — callers decide how many attempts
/// to spend; timeouts and 5xx responses surface as transient errors so the
/// workflow engine's retry policy applies.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// One function-calling chat completion (no token streaming).
    async fn chat(&self, req: ChatRequest) -> Result<ChatOutcome>;

    /// Ask for an object conforming to the given JSON schema.
    async fn structured(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// Embed a text into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
