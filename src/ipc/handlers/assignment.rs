use crate::engine::{assignment, EngineError};
use crate::ipc::error::respond;
use crate::ipc::helpers::{optional_str, require_db, require_str, to_value};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let teacher_id = require_str(params, "teacherId")?;
    let subject_id = require_str(params, "subjectId")?;
    let section_id = require_str(params, "sectionId")?;
    let semester_id = optional_str(params, "semesterId")?;
    let a = assignment::create(conn, teacher_id, subject_id, section_id, semester_id)?;
    Ok(json!({ "assignment": to_value(&a)? }))
}

fn handle_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let teacher_id = optional_str(params, "teacherId")?;
    let semester_id = optional_str(params, "semesterId")?;
    let rows = assignment::list(conn, teacher_id, semester_id)?;
    Ok(json!({ "assignments": to_value(&rows)? }))
}

fn handle_roster(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let assignment_id = require_str(params, "assignmentId")?;
    let roster = assignment::roster(conn, assignment_id)?;
    Ok(json!({ "students": to_value(&roster)? }))
}

fn handle_delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let assignment_id = require_str(params, "assignmentId")?;
    assignment::delete(conn, assignment_id)?;
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assignment.create" => handle_create(state, &req.params),
        "assignment.list" => handle_list(state, &req.params),
        "assignment.roster" => handle_roster(state, &req.params),
        "assignment.delete" => handle_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
