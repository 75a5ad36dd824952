use crate::engine::{enrollment, EngineError};
use crate::ipc::error::respond;
use crate::ipc::helpers::{optional_str, require_db, require_str, to_value};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let student_id = require_str(params, "studentId")?;
    let assignment_id = require_str(params, "assignmentId")?;
    let e = enrollment::enroll(conn, student_id, assignment_id)?;
    Ok(json!({ "enrollment": to_value(&e)? }))
}

fn handle_available_students(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let assignment_id = require_str(params, "assignmentId")?;
    let students = enrollment::available_students(conn, assignment_id)?;
    Ok(json!({ "students": to_value(&students)? }))
}

fn handle_deactivate(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let enrollment_id = require_str(params, "enrollmentId")?;
    let e = enrollment::deactivate(conn, enrollment_id)?;
    Ok(json!({ "enrollment": to_value(&e)? }))
}

fn handle_delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let enrollment_id = require_str(params, "enrollmentId")?;
    enrollment::delete(conn, enrollment_id)?;
    Ok(json!({ "deleted": true }))
}

fn handle_list_for_student(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let student_id = require_str(params, "studentId")?;
    let semester_id = optional_str(params, "semesterId")?;
    let rows = enrollment::list_for_student(conn, student_id, semester_id)?;
    Ok(json!({ "enrollments": to_value(&rows)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "enrollment.create" => handle_create(state, &req.params),
        "enrollment.availableStudents" => handle_available_students(state, &req.params),
        "enrollment.deactivate" => handle_deactivate(state, &req.params),
        "enrollment.delete" => handle_delete(state, &req.params),
        "enrollment.listForStudent" => handle_list_for_student(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
