use crate::engine::{assessment, assignment, grade, EngineError};
use crate::ipc::error::respond;
use crate::ipc::helpers::{optional_str, require_db, require_f64, require_str, to_value};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_assessment_create(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let assignment_id = require_str(params, "assignmentId")?;
    let teacher_id = optional_str(params, "teacherId")?;
    assignment::require_teacher_manage(conn, assignment_id, teacher_id)?;
    let name = require_str(params, "name")?;
    let category = require_str(params, "category")?;
    let max_score = require_f64(params, "maxScore")?;
    let date = optional_str(params, "date")?;
    let term = require_str(params, "term")?;
    let a = assessment::create_assessment(
        conn,
        assignment_id,
        name,
        category,
        max_score,
        date,
        term,
        teacher_id,
    )?;
    Ok(json!({ "assessment": to_value(&a)? }))
}

fn handle_assessment_list(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let assignment_id = require_str(params, "assignmentId")?;
    let term = optional_str(params, "term")?;
    let rows = assessment::list_assessments(conn, assignment_id, term)?;
    Ok(json!({ "assessments": to_value(&rows)? }))
}

fn handle_score_record(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let enrollment_id = require_str(params, "enrollmentId")?;
    let assessment_id = require_str(params, "assessmentId")?;
    let score = require_f64(params, "score")?;
    let teacher_id = optional_str(params, "teacherId")?;
    if teacher_id.is_some() {
        let a = assessment::get_assessment(conn, assessment_id)?;
        assignment::require_teacher_manage(conn, &a.assignment_id, teacher_id)?;
    }
    let recorded = assessment::record_score(conn, enrollment_id, assessment_id, score, teacher_id)?;
    Ok(json!({
        "score": to_value(&recorded.score)?,
        "grades": to_value(&recorded.grades)?,
    }))
}

fn handle_score_list(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let assessment_id = optional_str(params, "assessmentId")?;
    let enrollment_id = optional_str(params, "enrollmentId")?;
    let rows = assessment::list_scores(conn, assessment_id, enrollment_id)?;
    Ok(json!({ "scores": to_value(&rows)? }))
}

fn handle_weights_set(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let assignment_id = require_str(params, "assignmentId")?;
    let teacher_id = optional_str(params, "teacherId")?;
    assignment::require_teacher_manage(conn, assignment_id, teacher_id)?;
    let activities = require_f64(params, "activities")?;
    let quizzes = require_f64(params, "quizzes")?;
    let projects = require_f64(params, "projects")?;
    let exams = require_f64(params, "exams")?;
    let w = assessment::set_weights(
        conn,
        assignment_id,
        activities,
        quizzes,
        projects,
        exams,
        teacher_id,
    )?;
    Ok(json!({ "weights": to_value(&w)? }))
}

fn handle_weights_get(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let assignment_id = require_str(params, "assignmentId")?;
    let w = assessment::weights_for(conn, assignment_id)?;
    Ok(json!({ "weights": to_value(&w)? }))
}

fn handle_grade_list(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let enrollment_id = optional_str(params, "enrollmentId")?;
    let student_id = optional_str(params, "studentId")?;
    let term = optional_str(params, "term")?;
    let rows = grade::list(conn, enrollment_id, student_id, term)?;
    Ok(json!({ "grades": to_value(&rows)? }))
}

fn handle_grade_recompute(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let enrollment_id = require_str(params, "enrollmentId")?;
    let actor = optional_str(params, "teacherId")?;
    let grades = grade::recompute(conn, enrollment_id, actor)?;
    Ok(json!({ "grades": to_value(&grades)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assessment.create" => handle_assessment_create(state, &req.params),
        "assessment.list" => handle_assessment_list(state, &req.params),
        "score.record" => handle_score_record(state, &req.params),
        "score.list" => handle_score_list(state, &req.params),
        "weights.set" => handle_weights_set(state, &req.params),
        "weights.get" => handle_weights_get(state, &req.params),
        "grade.list" => handle_grade_list(state, &req.params),
        "grade.recompute" => handle_grade_recompute(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
