//! The uniform response envelope returned by every tool call.

use serde::{Deserialize, Serialize};

/// Closed taxonomy of error kinds surfaced at the tool boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArguments,
    NotFound,
    Conflict,
    StockInsufficient,
    PermissionDenied,
    Timeout,
    TransientUpstream,
    PermanentUpstream,
    WorkflowCancelled,
    MaxToolRoundsReached,
    Internal,
}

/// Uniform tool-call response. Every tool, whether reached through the LLM
/// loop or the RPC boundary, answers with this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub trace_id: String,
}

impl ToolEnvelope {
    pub fn ok(trace_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error_kind: None,
            error_message: None,
            trace_id: trace_id.into(),
        }
    }

    pub fn err(
        trace_id: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            trace_id: trace_id.into(),
        }
    }
}
