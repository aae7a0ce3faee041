use rusqlite::Connection;
use serde_json::json;

use super::error::err;
use super::types::{AppState, Request};
use crate::model::{Actor, Role};

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn db_conn_mut<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<&'a mut Connection, serde_json::Value> {
    state
        .db
        .as_mut()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// The caller identity travels with every request; there is no session state.
pub fn require_actor(req: &Request) -> Result<Actor, serde_json::Value> {
    let unauthenticated =
        |msg: &str| err(&req.id, "unauthenticated", msg.to_string(), None);
    let Some(raw) = req.actor.as_ref() else {
        return Err(unauthenticated("missing actor"));
    };
    let id = raw
        .get("id")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| unauthenticated("actor.id is required"))?;
    let roles_raw = raw
        .get("roles")
        .and_then(|v| v.as_array())
        .ok_or_else(|| unauthenticated("actor.roles must be an array"))?;

    let mut roles = Vec::with_capacity(roles_raw.len());
    for r in roles_raw {
        let parsed = r.as_str().and_then(Role::parse).ok_or_else(|| {
            err(
                &req.id,
                "unauthenticated",
                "unknown role",
                Some(json!({ "role": r })),
            )
        })?;
        if !roles.contains(&parsed) {
            roles.push(parsed);
        }
    }
    Ok(Actor {
        id: id.to_string(),
        roles,
    })
}
