use crate::engine::{reports, EngineError};
use crate::ipc::error::respond;
use crate::ipc::helpers::{optional_i64, optional_str, require_db, require_str, to_value};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_student_performance(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let student_id = require_str(params, "studentId")?;
    let report = reports::student_performance(conn, student_id)?;
    Ok(json!({ "report": to_value(&report)? }))
}

fn handle_student_gpa(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let student_id = require_str(params, "studentId")?;
    let term = optional_str(params, "term")?;
    let gpa = reports::student_gpa(conn, student_id, term)?;
    Ok(json!({ "gpa": to_value(&gpa)? }))
}

fn handle_attendance_rate(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let student_id = require_str(params, "studentId")?;
    let assignment_id = optional_str(params, "assignmentId")?;
    let from = optional_str(params, "from")?;
    let to = optional_str(params, "to")?;
    let rate = reports::attendance_rate(conn, student_id, assignment_id, from, to)?;
    Ok(json!({ "attendanceRate": to_value(&rate)? }))
}

fn handle_teacher_class_stats(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let teacher_id = require_str(params, "teacherId")?;
    let stats = reports::teacher_class_stats(conn, teacher_id)?;
    Ok(json!({ "classes": to_value(&stats)? }))
}

fn handle_consecutive_absences(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let enrollment_id = require_str(params, "enrollmentId")?;
    let threshold = optional_i64(params, "threshold")?;
    let report = reports::consecutive_absences(conn, enrollment_id, threshold)?;
    Ok(json!({ "report": to_value(&report)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "report.studentPerformance" => handle_student_performance(state, &req.params),
        "report.studentGpa" => handle_student_gpa(state, &req.params),
        "report.attendanceRate" => handle_attendance_rate(state, &req.params),
        "report.teacherClassStats" => handle_teacher_class_stats(state, &req.params),
        "report.consecutiveAbsences" => handle_consecutive_absences(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
