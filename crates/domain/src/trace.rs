use serde::Serialize;

/// Structured trace events emitted across all Wardline crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ToolDispatched {
        tool: String,
        args_digest: String,
        duration_ms: u64,
        outcome: String,
        trace_id: String,
    },
    BedTransition {
        bed_id: String,
        from: String,
        to: String,
        action: String,
    },
    SweepCompleted {
        scanned: usize,
        promoted: usize,
        skipped_locked: usize,
    },
    WorkflowCheckpoint {
        run_id: String,
        kind: String,
        node: String,
        seq: u64,
    },
    WorkflowFinished {
        run_id: String,
        kind: String,
        status: String,
    },
    DischargeCommitted {
        patient_id: String,
        bed_id: String,
        report_id: String,
    },
    DischargeRolledBack {
        patient_id: String,
        reason: String,
    },
    SessionEvicted {
        session_id: String,
    },
    LlmRequest {
        provider: String,
        model: String,
        duration_ms: u64,
        function_calls: usize,
    },
    TurnCompleted {
        session_id: String,
        rounds: u32,
        tool_calls: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ward_event");
    }
}
