use crate::engine::{attendance, EngineError};
use crate::ipc::error::respond;
use crate::ipc::helpers::{optional_str, require_db, require_str, to_value};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_record(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let enrollment_id = require_str(params, "enrollmentId")?;
    let date = require_str(params, "date")?;
    let status = require_str(params, "status")?;
    let row = attendance::record(conn, enrollment_id, date, status)?;
    Ok(json!({ "attendance": to_value(&row)? }))
}

fn handle_record_batch(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let assignment_id = require_str(params, "assignmentId")?;
    let date = require_str(params, "date")?;
    let raw = params
        .get("entries")
        .and_then(|v| v.as_array())
        .ok_or_else(|| EngineError::new("bad_params", "missing or invalid param: entries"))?;
    let mut entries = Vec::with_capacity(raw.len());
    for item in raw {
        let enrollment_id = item
            .get("enrollmentId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::new("bad_params", "entry missing enrollmentId"))?;
        let status = item
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::new("bad_params", "entry missing status"))?;
        entries.push(attendance::BatchEntry {
            enrollment_id: enrollment_id.to_string(),
            status: status.to_string(),
        });
    }
    let recorded = attendance::record_batch(conn, assignment_id, date, &entries)?;
    Ok(json!({ "recorded": recorded }))
}

fn handle_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let enrollment_id = optional_str(params, "enrollmentId")?;
    let assignment_id = optional_str(params, "assignmentId")?;
    let from = optional_str(params, "from")?;
    let to = optional_str(params, "to")?;
    let rows = attendance::list(conn, enrollment_id, assignment_id, from, to)?;
    Ok(json!({ "attendance": to_value(&rows)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.record" => handle_record(state, &req.params),
        "attendance.recordBatch" => handle_record_batch(state, &req.params),
        "attendance.list" => handle_list(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
