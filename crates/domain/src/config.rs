//! Configuration for the Wardline gateway.
//!
//! Loaded from a TOML file (`wardline.toml` by default); every section and
//! key has a default so an empty file boots a working process.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub beds: BedsConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub workflows: WorkflowsConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bed lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedsConfig {
    /// Timer target for the cleaning → available transition.
    #[serde(default = "d_30")]
    pub cleaning_duration_minutes: i64,
    /// Cadence of the background sweep that expires cleaning timers.
    #[serde(default = "d_120")]
    pub sweep_interval_seconds: u64,
}

impl Default for BedsConfig {
    fn default() -> Self {
        Self {
            cleaning_duration_minutes: 30,
            sweep_interval_seconds: 120,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Cap on LLM ↔ tool loop iterations per chat turn.
    #[serde(default = "d_6")]
    pub max_tool_rounds: u32,
    /// Wall-clock cap per chat turn.
    #[serde(default = "d_120000")]
    pub chat_turn_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 6,
            chat_turn_timeout_ms: 120_000,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Per tool invocation timeout.
    #[serde(default = "d_30000")]
    pub call_timeout_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 30_000,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderKind {
    /// Deterministic canned provider (tests, offline demos).
    Scripted,
    /// Any OpenAI-compatible chat-completions endpoint.
    OpenaiCompat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_llm_kind")]
    pub provider: LlmProviderKind,
    /// Per LLM call timeout.
    #[serde(default = "d_60000")]
    pub call_timeout_ms: u64,
    #[serde(default = "d_llm_url")]
    pub base_url: String,
    /// Env var holding the API key (the key itself never lives in config).
    #[serde(default = "d_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_llm_model")]
    pub model: String,
    #[serde(default = "d_llm_embedding_model")]
    pub embedding_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::Scripted,
            call_timeout_ms: 60_000,
            base_url: d_llm_url(),
            api_key_env: d_llm_key_env(),
            model: d_llm_model(),
            embedding_model: d_llm_embedding_model(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workflows
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowsConfig {
    /// Transient retry count inside workflow nodes.
    #[serde(default = "d_2")]
    pub node_retry_max: u32,
    /// Bed-search retries in the admission graph's wait_or_fail node.
    #[serde(default = "d_1")]
    pub admission_bed_retry_attempts: u32,
    #[serde(default = "d_250")]
    pub admission_bed_retry_delay_ms: u64,
    /// Cap on blocking workflow-adapter tools.
    #[serde(default = "d_120000")]
    pub start_timeout_ms: u64,
    /// When set, checkpoints persist as JSON files under this directory;
    /// otherwise they live in memory.
    #[serde(default)]
    pub checkpoint_dir: Option<std::path::PathBuf>,
}

impl Default for WorkflowsConfig {
    fn default() -> Self {
        Self {
            node_retry_max: 2,
            admission_bed_retry_attempts: 1,
            admission_bed_retry_delay_ms: 250,
            start_timeout_ms: 120_000,
            checkpoint_dir: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Messages retained per session (oldest trimmed first).
    #[serde(default = "d_32")]
    pub window_size: usize,
    /// Sessions retained across the process (LRU eviction beyond this).
    #[serde(default = "d_10000")]
    pub lru_capacity: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            window_size: 32,
            lru_capacity: 10_000,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Config {
    /// Check the config for impossible or suspicious values. Errors abort
    /// boot; warnings are logged and ignored.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let mut error = |message: String| {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message,
            })
        };

        if self.server.port == 0 {
            error("server.port must be non-zero".into());
        }
        if self.beds.cleaning_duration_minutes <= 0 {
            error("beds.cleaning_duration_minutes must be positive".into());
        }
        if self.orchestrator.max_tool_rounds == 0 {
            error("orchestrator.max_tool_rounds must be at least 1".into());
        }
        if self.sessions.window_size == 0 {
            error("sessions.window_size must be at least 1".into());
        }

        if self.beds.sweep_interval_seconds < 5 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "beds.sweep_interval_seconds under 5s will busy-loop the sweep".into(),
            });
        }
        if self.llm.provider == LlmProviderKind::OpenaiCompat
            && std::env::var(&self.llm.api_key_env).is_err()
        {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: format!(
                    "llm.provider is openai_compat but {} is not set",
                    self.llm.api_key_env
                ),
            });
        }

        issues
    }
}

// ── Serde default helpers ──────────────────────────────────────────

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    8600
}
fn d_30() -> i64 {
    30
}
fn d_120() -> u64 {
    120
}
fn d_6() -> u32 {
    6
}
fn d_2() -> u32 {
    2
}
fn d_1() -> u32 {
    1
}
fn d_250() -> u64 {
    250
}
fn d_32() -> usize {
    32
}
fn d_10000() -> usize {
    10_000
}
fn d_30000() -> u64 {
    30_000
}
fn d_60000() -> u64 {
    60_000
}
fn d_120000() -> u64 {
    120_000
}
fn d_llm_kind() -> LlmProviderKind {
    LlmProviderKind::Scripted
}
fn d_llm_url() -> String {
    "http://localhost:11434/v1".into()
}
fn d_llm_key_env() -> String {
    "WARDLINE_LLM_API_KEY".into()
}
fn d_llm_model() -> String {
    "gpt-4o-mini".into()
}
fn d_llm_embedding_model() -> String {
    "text-embedding-3-small".into()
}
