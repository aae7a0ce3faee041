use crate::config;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, require_actor};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use serde_json::json;

fn handle_grading_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match config::load_grading(conn) {
        Ok(cfg) => ok(&req.id, cfg.to_json()),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_grading_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match require_actor(req) {
        Ok(a) => a,
        Err(e) => return e,
    };
    if !actor.has(Role::Admin) {
        return err(&req.id, "forbidden", "not permitted", None);
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match config::load_grading(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = current.merge_patch(patch_obj) {
        return err(&req.id, "bad_params", msg, Some(json!({ "patch": patch_obj })));
    }
    if let Err(e) = config::save_grading(conn, &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(actor = %actor.id, "grading config updated");
    ok(&req.id, current.to_json())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grading.config.get" => Some(handle_grading_get(state, req)),
        "grading.config.update" => Some(handle_grading_update(state, req)),
        _ => None,
    }
}
