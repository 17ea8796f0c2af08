//! Department agent — departments and their rooms.

use serde::Deserialize;
use serde_json::json;

use ward_domain::entity::{Department, Room};
use ward_domain::{Error, Result};

use crate::registry::{ToolRegistry, ToolSpec};

use super::{descriptor, parse, to_json, AgentDeps};

const AGENT: &str = "department";

pub fn register(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "create_department",
            AGENT,
            "Create a department.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "floor": { "type": "integer" }
                },
                "required": ["name"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    name: String,
                    floor: Option<i32>,
                }
                let req: Req = parse(&args)?;
                let department = Department {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: req.name,
                    floor: req.floor,
                };
                to_json(&d.repos.departments.insert(department).await?)
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "list_departments",
            AGENT,
            "List departments.",
            json!({ "type": "object", "properties": {} }),
            false,
        ),
        move |_args| {
            let d = d.clone();
            Box::pin(async move {
                let departments = d.repos.departments.list().await?;
                Ok(json!({ "departments": to_json(&departments)?, "count": departments.len() }))
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "create_room",
            AGENT,
            "Create a room inside a department.",
            json!({
                "type": "object",
                "properties": {
                    "room_number": { "type": "string" },
                    "department_id": { "type": "string" }
                },
                "required": ["room_number", "department_id"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    room_number: String,
                    department_id: String,
                }
                let req: Req = parse(&args)?;
                if d.repos.departments.get(&req.department_id).await?.is_none() {
                    return Err(Error::NotFound(format!(
                        "department {}",
                        req.department_id
                    )));
                }
                let room = Room {
                    id: uuid::Uuid::new_v4().to_string(),
                    room_number: req.room_number,
                    department_id: req.department_id,
                };
                to_json(&d.repos.rooms.insert(room).await?)
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "list_rooms",
            AGENT,
            "List rooms.",
            json!({ "type": "object", "properties": {} }),
            false,
        ),
        move |_args| {
            let d = d.clone();
            Box::pin(async move {
                let rooms = d.repos.rooms.list().await?;
                Ok(json!({ "rooms": to_json(&rooms)?, "count": rooms.len() }))
            })
        },
    ))?;

    Ok(())
}
