use crate::engine::{audit, EngineError};
use crate::ipc::error::respond;
use crate::ipc::helpers::{optional_i64, optional_str, require_db, to_value};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let student_id = optional_str(params, "studentId")?;
    let limit = optional_i64(params, "limit")?;
    let entries = audit::list(conn, student_id, limit)?;
    Ok(json!({ "entries": to_value(&entries)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "audit.list" => handle_list(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
