//! Tool catalog types and provider-agnostic chat messages.

use serde::{Deserialize, Serialize};

/// Catalog entry for one registered tool. Names are unique and immutable
/// after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// The domain agent that owns this tool (e.g. `"bed"`, `"inventory"`).
    pub owning_agent: String,
    /// JSON Schema for the tool's arguments.
    pub input_schema: serde_json::Value,
    /// JSON Schema for the tool's result payload.
    pub output_schema: serde_json::Value,
    /// Whether the tool mutates state (drives post-operation hooks).
    pub side_effecting: bool,
}

/// Tool definition exposed to the LLM function-calling catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl From<&ToolDescriptor> for ToolDefinition {
    fn from(d: &ToolDescriptor) -> Self {
        Self {
            name: d.name.clone(),
            description: d.description.clone(),
            parameters: d.input_schema.clone(),
        }
    }
}

/// A function call proposed by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in a conversation session (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Function calls attached to an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_calls: Vec<FunctionCall>,
    /// For tool messages, the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            function_calls: Vec::new(),
            call_id: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            function_calls: Vec::new(),
            call_id: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            function_calls: Vec::new(),
            call_id: None,
        }
    }

    pub fn assistant_with_calls(text: impl Into<String>, calls: Vec<FunctionCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            function_calls: calls,
            call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            function_calls: Vec::new(),
            call_id: Some(call_id.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_from_descriptor_carries_schema() {
        let d = ToolDescriptor {
            name: "list_beds".into(),
            description: "List beds".into(),
            owning_agent: "bed".into(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
            output_schema: serde_json::json!({"type": "object"}),
            side_effecting: false,
        };
        let def = ToolDefinition::from(&d);
        assert_eq!(def.name, "list_beds");
        assert_eq!(def.parameters["type"], "object");
    }

    #[test]
    fn tool_message_keeps_call_id() {
        let m = Message::tool_result("call-7", "{\"ok\":true}");
        assert_eq!(m.role, Role::Tool);
        assert_eq!(m.call_id.as_deref(), Some("call-7"));
    }
}
