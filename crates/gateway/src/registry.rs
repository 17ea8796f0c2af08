//! Tool registry — the central catalog of every action the LLM or RPC
//! boundary may invoke.
//!
//! Registration happens at boot (domain agents register their tools at
//! construction); afterwards the registry is read-only. Every call is
//! schema-validated before dispatch, bounded by the configured timeout,
//! and recorded as a structured trace entry through the observer hook.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use sha2::{Digest, Sha256};

use ward_domain::envelope::{ErrorKind, ToolEnvelope};
use ward_domain::tool::{ToolDefinition, ToolDescriptor};
use ward_domain::trace::TraceEvent;
use ward_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool spec & handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub type ToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A descriptor plus the callable that implements it.
pub struct ToolSpec {
    pub descriptor: ToolDescriptor,
    pub handler: ToolHandler,
}

impl ToolSpec {
    /// Convenience constructor wrapping an async closure.
    pub fn new<F>(descriptor: ToolDescriptor, handler: F) -> Self
    where
        F: Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            handler: Arc::new(handler),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trace observer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One structured record per tool call.
#[derive(Debug, Clone)]
pub struct ToolTrace {
    pub tool: String,
    pub args_digest: String,
    pub duration_ms: u64,
    pub outcome: String,
    pub trace_id: String,
}

pub trait TraceObserver: Send + Sync {
    fn record(&self, trace: &ToolTrace);
    /// Called at registry teardown.
    fn flush(&self) {}
}

/// Default observer: emits the trace event and keeps rolling counters.
#[derive(Default)]
pub struct LogTraceObserver {
    calls: AtomicU64,
    failures: AtomicU64,
}

impl TraceObserver for LogTraceObserver {
    fn record(&self, trace: &ToolTrace) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if trace.outcome != "ok" {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        TraceEvent::ToolDispatched {
            tool: trace.tool.clone(),
            args_digest: trace.args_digest.clone(),
            duration_ms: trace.duration_ms,
            outcome: trace.outcome.clone(),
            trace_id: trace.trace_id.clone(),
        }
        .emit();
    }

    fn flush(&self) {
        tracing::info!(
            calls = self.calls.load(Ordering::Relaxed),
            failures = self.failures.load(Ordering::Relaxed),
            "tool trace observer flushed"
        );
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ToolRegistry {
    /// Registration-ordered specs; the index maps name → position.
    tools: RwLock<Vec<ToolSpec>>,
    index: RwLock<HashMap<String, usize>>,
    observer: Arc<dyn TraceObserver>,
    call_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(call_timeout: Duration) -> Self {
        Self::with_observer(call_timeout, Arc::new(LogTraceObserver::default()))
    }

    pub fn with_observer(call_timeout: Duration, observer: Arc<dyn TraceObserver>) -> Self {
        Self {
            tools: RwLock::new(Vec::new()),
            index: RwLock::new(HashMap::new()),
            observer,
            call_timeout,
        }
    }

    /// Add a tool to the catalog. Names are unique and immutable; a
    /// duplicate fails with a registration error.
    pub fn register(&self, spec: ToolSpec) -> Result<()> {
        let name = spec.descriptor.name.clone();
        let mut index = self.index.write();
        if index.contains_key(&name) {
            return Err(Error::Registration(name));
        }
        let mut tools = self.tools.write();
        index.insert(name, tools.len());
        tools.push(spec);
        Ok(())
    }

    /// Descriptors in registration order, handler-free.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools
            .read()
            .iter()
            .map(|spec| spec.descriptor.clone())
            .collect()
    }

    /// Tool definitions for the LLM function-calling catalog.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .iter()
            .map(|spec| ToolDefinition::from(&spec.descriptor))
            .collect()
    }

    pub fn describe(&self, name: &str) -> Result<ToolDescriptor> {
        let index = self.index.read();
        let tools = self.tools.read();
        index
            .get(name)
            .and_then(|&i| tools.get(i))
            .map(|spec| spec.descriptor.clone())
            .ok_or_else(|| Error::NotFound(format!("tool {name}")))
    }

    pub fn is_side_effecting(&self, name: &str) -> bool {
        self.describe(name)
            .map(|d| d.side_effecting)
            .unwrap_or(false)
    }

    pub fn tool_count(&self) -> usize {
        self.tools.read().len()
    }

    /// Number of distinct owning agents.
    pub fn agent_count(&self) -> usize {
        let tools = self.tools.read();
        let mut agents: Vec<&str> = tools
            .iter()
            .map(|s| s.descriptor.owning_agent.as_str())
            .collect();
        agents.sort_unstable();
        agents.dedup();
        agents.len()
    }

    /// Validate, dispatch, and wrap one tool call. Never panics or leaks
    /// internals — every path produces a uniform envelope.
    pub async fn call(&self, name: &str, arguments: Value) -> ToolEnvelope {
        let trace_id = uuid::Uuid::new_v4().to_string();
        let started = std::time::Instant::now();

        let spec = {
            let index = self.index.read();
            let tools = self.tools.read();
            index
                .get(name)
                .and_then(|&i| tools.get(i))
                .map(|spec| (spec.descriptor.input_schema.clone(), spec.handler.clone()))
        };

        let Some((input_schema, handler)) = spec else {
            let envelope = ToolEnvelope::err(
                &trace_id,
                ErrorKind::NotFound,
                format!("unknown tool: {name}"),
            );
            self.record(name, &arguments, started, &envelope, &trace_id);
            return envelope;
        };

        // No handler runs unless its input validates.
        if let Err(violation) = crate::schema::validate_args(&input_schema, &arguments) {
            let envelope =
                ToolEnvelope::err(&trace_id, ErrorKind::InvalidArguments, violation);
            self.record(name, &arguments, started, &envelope, &trace_id);
            return envelope;
        }

        let outcome = tokio::time::timeout(self.call_timeout, handler(arguments.clone())).await;
        let envelope = match outcome {
            Ok(Ok(data)) => ToolEnvelope::ok(&trace_id, data),
            Ok(Err(e)) => ToolEnvelope::err(&trace_id, e.kind(), public_message(&e, &trace_id)),
            Err(_) => ToolEnvelope::err(
                &trace_id,
                ErrorKind::Timeout,
                format!(
                    "tool {name} exceeded its {}ms deadline",
                    self.call_timeout.as_millis()
                ),
            ),
        };
        self.record(name, &arguments, started, &envelope, &trace_id);
        envelope
    }

    /// Flush the trace observer. Called once at process shutdown.
    pub fn teardown(&self) {
        self.observer.flush();
    }

    fn record(
        &self,
        name: &str,
        arguments: &Value,
        started: std::time::Instant,
        envelope: &ToolEnvelope,
        trace_id: &str,
    ) {
        let outcome = if envelope.success {
            "ok".to_owned()
        } else {
            envelope
                .error_kind
                .map(|k| {
                    serde_json::to_value(k)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_owned))
                        .unwrap_or_else(|| "internal".into())
                })
                .unwrap_or_else(|| "internal".into())
        };
        self.observer.record(&ToolTrace {
            tool: name.to_owned(),
            args_digest: args_digest(arguments),
            duration_ms: started.elapsed().as_millis() as u64,
            outcome,
            trace_id: trace_id.to_owned(),
        });
    }
}

/// Short hex digest of the canonical argument JSON. Traces never carry raw
/// arguments (they can contain patient data).
fn args_digest(arguments: &Value) -> String {
    let canonical = arguments.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(&digest[..8])
}

/// Internal errors are surfaced as a trace-id pointer, never as internals.
fn public_message(e: &Error, trace_id: &str) -> String {
    match e.kind() {
        ErrorKind::Internal => format!("internal error (trace {trace_id})"),
        _ => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.into(),
            description: "test tool".into(),
            owning_agent: "test".into(),
            input_schema: json!({
                "type": "object",
                "properties": { "value": { "type": "integer" } },
                "required": ["value"]
            }),
            output_schema: json!({"type": "object"}),
            side_effecting: false,
        }
    }

    fn echo_spec(name: &str) -> ToolSpec {
        ToolSpec::new(descriptor(name), |args| {
            Box::pin(async move { Ok(json!({ "echo": args["value"] })) })
        })
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(Duration::from_millis(500))
    }

    #[test]
    fn duplicate_registration_fails() {
        let reg = registry();
        reg.register(echo_spec("echo")).unwrap();
        let err = reg.register(echo_spec("echo")).unwrap_err();
        assert!(matches!(err, Error::Registration(name) if name == "echo"));
        assert_eq!(reg.tool_count(), 1);
    }

    #[test]
    fn list_preserves_registration_order() {
        let reg = registry();
        for name in ["charlie", "alpha", "bravo"] {
            reg.register(echo_spec(name)).unwrap();
        }
        let names: Vec<String> = reg.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["charlie", "alpha", "bravo"]);
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_handler() {
        struct CountingObserver(Mutex<Vec<ToolTrace>>);
        impl TraceObserver for CountingObserver {
            fn record(&self, trace: &ToolTrace) {
                self.0.lock().push(trace.clone());
            }
        }
        let observer = Arc::new(CountingObserver(Mutex::new(Vec::new())));
        let reg = ToolRegistry::with_observer(Duration::from_millis(500), observer.clone());

        let invoked = Arc::new(AtomicU64::new(0));
        let invoked_in_handler = invoked.clone();
        reg.register(ToolSpec::new(descriptor("strict"), move |_args| {
            let invoked = invoked_in_handler.clone();
            Box::pin(async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(json!({}))
            })
        }))
        .unwrap();

        let envelope = reg.call("strict", json!({"value": "not an int"})).await;
        assert!(!envelope.success);
        assert_eq!(envelope.error_kind, Some(ErrorKind::InvalidArguments));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        // The failed call was still traced.
        let traces = observer.0.lock();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].outcome, "invalid_arguments");
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let reg = registry();
        let envelope = reg.call("ghost", json!({})).await;
        assert_eq!(envelope.error_kind, Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn successful_call_returns_data_and_trace_id() {
        let reg = registry();
        reg.register(echo_spec("echo")).unwrap();
        let envelope = reg.call("echo", json!({"value": 7})).await;
        assert!(envelope.success);
        assert_eq!(envelope.data.unwrap()["echo"], 7);
        assert!(!envelope.trace_id.is_empty());
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let reg = ToolRegistry::new(Duration::from_millis(20));
        reg.register(ToolSpec::new(descriptor("slow"), |_args| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!({}))
            })
        }))
        .unwrap();

        let envelope = reg.call("slow", json!({"value": 1})).await;
        assert_eq!(envelope.error_kind, Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn internal_errors_hide_details_behind_trace_id() {
        let reg = registry();
        reg.register(ToolSpec::new(descriptor("boom"), |_args| {
            Box::pin(async move {
                Err(Error::Internal("secret stack details".into()))
            })
        }))
        .unwrap();

        let envelope = reg.call("boom", json!({"value": 1})).await;
        assert_eq!(envelope.error_kind, Some(ErrorKind::Internal));
        let msg = envelope.error_message.unwrap();
        assert!(!msg.contains("secret"));
        assert!(msg.contains(&envelope.trace_id));
    }

    #[test]
    fn digest_is_stable_and_short() {
        let a = args_digest(&json!({"value": 1}));
        let b = args_digest(&json!({"value": 1}));
        let c = args_digest(&json!({"value": 2}));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn agent_count_deduplicates_owners() {
        let reg = registry();
        reg.register(echo_spec("a")).unwrap();
        reg.register(echo_spec("b")).unwrap();
        assert_eq!(reg.agent_count(), 1);
    }
}
