//! User agent. Passwords arrive as opaque hashes — the core never hashes
//! or verifies them.

use serde::Deserialize;
use serde_json::json;

use ward_domain::entity::User;
use ward_domain::{Error, Result};

use crate::registry::{ToolRegistry, ToolSpec};

use super::{descriptor, parse, to_json, AgentDeps};

const AGENT: &str = "user";

pub fn register(registry: &ToolRegistry, deps: &AgentDeps) -> Result<()> {
    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "create_user",
            AGENT,
            "Create an application user. New users are active unless stated otherwise.",
            json!({
                "type": "object",
                "properties": {
                    "username": { "type": "string" },
                    "email": { "type": "string" },
                    "password_hash": { "type": "string", "description": "Opaque hash computed by the caller" },
                    "role": { "type": "string" },
                    "is_active": { "type": "boolean" }
                },
                "required": ["username", "email", "password_hash", "role"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    username: String,
                    email: String,
                    password_hash: String,
                    role: String,
                    is_active: Option<bool>,
                }
                let req: Req = parse(&args)?;
                let user = User {
                    id: uuid::Uuid::new_v4().to_string(),
                    username: req.username,
                    email: req.email,
                    password_hash: req.password_hash,
                    role: req.role,
                    is_active: req.is_active.unwrap_or(true),
                };
                let user = d.repos.users.insert(user).await?;
                to_json(&redacted(user))
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "list_users",
            AGENT,
            "List application users.",
            json!({ "type": "object", "properties": {} }),
            false,
        ),
        move |_args| {
            let d = d.clone();
            Box::pin(async move {
                let users: Vec<User> = d
                    .repos
                    .users
                    .list()
                    .await?
                    .into_iter()
                    .map(redacted)
                    .collect();
                Ok(json!({ "users": to_json(&users)?, "count": users.len() }))
            })
        },
    ))?;

    let d = deps.clone();
    registry.register(ToolSpec::new(
        descriptor(
            "update_user",
            AGENT,
            "Update a user's email, role, password hash, or active flag.",
            json!({
                "type": "object",
                "properties": {
                    "user_id": { "type": "string" },
                    "email": { "type": "string" },
                    "role": { "type": "string" },
                    "password_hash": { "type": "string" },
                    "is_active": { "type": "boolean" }
                },
                "required": ["user_id"]
            }),
            true,
        ),
        move |args| {
            let d = d.clone();
            Box::pin(async move {
                #[derive(Deserialize)]
                struct Req {
                    user_id: String,
                    email: Option<String>,
                    role: Option<String>,
                    password_hash: Option<String>,
                    is_active: Option<bool>,
                }
                let req: Req = parse(&args)?;
                let mut user = d
                    .repos
                    .users
                    .get(&req.user_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("user {}", req.user_id)))?;
                if let Some(email) = req.email {
                    user.email = email;
                }
                if let Some(role) = req.role {
                    user.role = role;
                }
                if let Some(hash) = req.password_hash {
                    user.password_hash = hash;
                }
                if let Some(active) = req.is_active {
                    user.is_active = active;
                }
                let user = d.repos.users.update(user).await?;
                to_json(&redacted(user))
            })
        },
    ))?;

    Ok(())
}

/// Hashes never leave the boundary, even opaque ones.
fn redacted(mut user: User) -> User {
    user.password_hash = "<redacted>".into();
    user
}
