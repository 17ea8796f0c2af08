//! Meeting agent.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use ward_domain::entity::{EntityKind, Meeting};
use ward_domain::{Error, Result};

use crate::registry::{ToolRegistry, ToolSpec};

use super::{descriptor, parse, to_json, AgentDeps};

const AGENT: &str = "meeting";

pub fn register(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "schedule_meeting",
            AGENT,
            "Schedule a staff meeting.",
            json!({
                "type": "object",
                "properties": {
                    "topic": { "type": "string" },
                    "participants": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Staff ids or employee codes"
                    },
                    "scheduled_at": { "type": "string", "description": "RFC 3339 timestamp" },
                    "duration_minutes": { "type": "integer" }
                },
                "required": ["topic", "participants", "scheduled_at"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    topic: String,
                    participants: Vec<String>,
                    scheduled_at: DateTime<Utc>,
                    duration_minutes: Option<i64>,
                }
                let req: Req = parse(&args)?;
                if req.participants.is_empty() {
                    return Err(Error::InvalidArguments(
                        "participants must not be empty".into(),
                    ));
                }
                let mut participant_ids = Vec::with_capacity(req.participants.len());
                for staff in &req.participants {
                    participant_ids
                        .push(d.resolver.resolve_ref(EntityKind::Staff, staff).await?);
                }
                let meeting = Meeting {
                    id: uuid::Uuid::new_v4().to_string(),
                    topic: req.topic,
                    participant_staff_ids: participant_ids,
                    scheduled_at: req.scheduled_at,
                    duration_minutes: req.duration_minutes.unwrap_or(30),
                };
                to_json(&d.repos.meetings.insert(meeting).await?)
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "list_meetings",
            AGENT,
            "List scheduled meetings, soonest first.",
            json!({ "type": "object", "properties": {} }),
            false,
        ),
        move |_args| {
            let d = d.clone();
            Box::pin(async move {
                let meetings = d.repos.meetings.list().await?;
                Ok(json!({ "meetings": to_json(&meetings)?, "count": meetings.len() }))
            })
        },
    ))?;

    Ok(())
}
