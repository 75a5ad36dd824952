use crate::engine::{catalog, EngineError};
use crate::ipc::error::respond;
use crate::ipc::helpers::{optional_str, require_db, require_i64, require_str, to_value};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_section_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let name = require_str(params, "name")?;
    let year_level = require_i64(params, "yearLevel")?;
    let section = catalog::create_section(conn, name, year_level)?;
    Ok(json!({ "section": to_value(&section)? }))
}

fn handle_section_list(state: &AppState) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    Ok(json!({ "sections": to_value(&catalog::list_sections(conn)?)? }))
}

fn handle_subject_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let code = require_str(params, "code")?;
    let name = require_str(params, "name")?;
    let description = optional_str(params, "description")?.unwrap_or("");
    let subject = catalog::create_subject(conn, code, name, description)?;
    Ok(json!({ "subject": to_value(&subject)? }))
}

fn handle_subject_list(state: &AppState) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    Ok(json!({ "subjects": to_value(&catalog::list_subjects(conn)?)? }))
}

fn handle_teacher_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let name = require_str(params, "name")?;
    let department = optional_str(params, "department")?.unwrap_or("");
    let teacher = catalog::create_teacher(conn, name, department)?;
    Ok(json!({ "teacher": to_value(&teacher)? }))
}

fn handle_teacher_list(state: &AppState) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    Ok(json!({ "teachers": to_value(&catalog::list_teachers(conn)?)? }))
}

fn handle_parent_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let name = require_str(params, "name")?;
    let contact = optional_str(params, "contactNumber")?;
    let parent = catalog::create_parent(conn, name, contact)?;
    Ok(json!({ "parent": to_value(&parent)? }))
}

fn handle_parent_list(state: &AppState) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    Ok(json!({ "parents": to_value(&catalog::list_parents(conn)?)? }))
}

fn handle_student_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let name = require_str(params, "name")?;
    let year_level = require_i64(params, "yearLevel")?;
    let section_id = require_str(params, "sectionId")?;
    let parent_id = optional_str(params, "parentId")?;
    let student = catalog::create_student(conn, name, year_level, section_id, parent_id)?;
    Ok(json!({ "student": to_value(&student)? }))
}

fn handle_student_list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let section_id = optional_str(params, "sectionId")?;
    Ok(json!({ "students": to_value(&catalog::list_students(conn, section_id)?)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "section.create" => handle_section_create(state, &req.params),
        "section.list" => handle_section_list(state),
        "subject.create" => handle_subject_create(state, &req.params),
        "subject.list" => handle_subject_list(state),
        "teacher.create" => handle_teacher_create(state, &req.params),
        "teacher.list" => handle_teacher_list(state),
        "parent.create" => handle_parent_create(state, &req.params),
        "parent.list" => handle_parent_list(state),
        "student.create" => handle_student_create(state, &req.params),
        "student.list" => handle_student_list(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
