//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio, and any other endpoint that
//! follows the chat-completions contract with function calling.

use serde_json::Value;

use ward_domain::tool::{FunctionCall, Message, Role, ToolDefinition};
use ward_domain::{Error, Result};

use crate::traits::{ChatOutcome, ChatRequest, LlmProvider};

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    embedding_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
        embedding_model: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("building HTTP client: {e}")))?;
        Ok(Self {
            id: "openai_compat".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            default_model: default_model.into(),
            embedding_model: embedding_model.into(),
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        builder
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = resp.status();
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if status.is_success() {
            return Ok(payload);
        }
        let message = payload["error"]["message"]
            .as_str()
            .unwrap_or("upstream error")
            .to_owned();
        if status.as_u16() == 429 || status.is_server_error() {
            Err(Error::TransientUpstream {
                provider: self.id.clone(),
                message: format!("{status}: {message}"),
            })
        } else {
            Err(Error::PermanentUpstream {
                provider: self.id.clone(),
                message: format!("{status}: {message}"),
            })
        }
    }

    fn map_transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(format!("{}: request timed out", self.id))
        } else {
            Error::TransientUpstream {
                provider: self.id.clone(),
                message: e.to_string(),
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_wire(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.call_id.clone().unwrap_or_default(),
            "content": msg.content,
        }),
        Role::Assistant if !msg.function_calls.is_empty() => {
            let tool_calls: Vec<Value> = msg
                .function_calls
                .iter()
                .map(|fc| {
                    serde_json::json!({
                        "id": fc.call_id,
                        "type": "function",
                        "function": {
                            "name": fc.tool_name,
                            "arguments": fc.arguments.to_string(),
                        },
                    })
                })
                .collect();
            serde_json::json!({
                "role": "assistant",
                "content": msg.content,
                "tool_calls": tool_calls,
            })
        }
        _ => serde_json::json!({
            "role": role_to_str(msg.role),
            "content": msg.content,
        }),
    }
}

fn tool_to_wire(def: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": def.name,
            "description": def.description,
            "parameters": def.parameters,
        },
    })
}

fn parse_function_calls(message: &Value) -> Vec<FunctionCall> {
    let Some(calls) = message["tool_calls"].as_array() else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|tc| {
            let name = tc["function"]["name"].as_str()?;
            let raw_args = tc["function"]["arguments"].as_str().unwrap_or("{}");
            // Malformed argument JSON degrades to an empty object; the tool
            // registry rejects it with invalid_arguments downstream.
            let arguments = serde_json::from_str(raw_args).unwrap_or_else(|e| {
                tracing::warn!(tool = name, error = %e, "tool call arguments are not valid JSON");
                Value::Object(Default::default())
            });
            Some(FunctionCall {
                call_id: tc["id"].as_str().unwrap_or_default().to_owned(),
                tool_name: name.to_owned(),
                arguments,
            })
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LlmProvider impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatOutcome> {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_wire).collect();
        let mut body = serde_json::json!({
            "model": req.model.clone().unwrap_or_else(|| self.default_model.clone()),
            "messages": messages,
        });
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_wire).collect();
            body["tools"] = Value::Array(tools);
        }

        let payload = self.post_json("/chat/completions", body).await?;
        let message = &payload["choices"][0]["message"];
        let assistant_text = message["content"]
            .as_str()
            .filter(|t| !t.is_empty())
            .map(str::to_owned);
        let function_calls = parse_function_calls(message);

        Ok(ChatOutcome {
            assistant_text,
            function_calls,
        })
    }

    async fn structured(&self, prompt: &str, schema: &Value) -> Result<Value> {
        let body = serde_json::json!({
            "model": self.default_model,
            "messages": [{"role": "user", "content": prompt}],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "structured_output",
                    "schema": schema,
                    "strict": true,
                },
            },
        });

        let payload = self.post_json("/chat/completions", body).await?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| Error::TransientUpstream {
                provider: self.id.clone(),
                message: "structured response had no content".into(),
            })?;
        serde_json::from_str(content).map_err(|e| Error::TransientUpstream {
            provider: self.id.clone(),
            message: format!("structured response was not valid JSON: {e}"),
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": text,
        });
        let payload = self.post_json("/embeddings", body).await?;
        let vector = payload["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| Error::TransientUpstream {
                provider: self.id.clone(),
                message: "embedding response had no vector".into(),
            })?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        Ok(vector)
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
