use crate::engine::{semester, EngineError};
use crate::ipc::error::respond;
use crate::ipc::helpers::{optional_str, require_db, require_str, to_value};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let name = require_str(params, "name")?;
    let academic_year = require_str(params, "academicYear")?;
    let start = require_str(params, "startDate")?;
    let end = require_str(params, "endDate")?;
    let status = optional_str(params, "status")?;
    let sem = semester::create(conn, name, academic_year, start, end, status)?;
    Ok(json!({ "semester": to_value(&sem)? }))
}

fn handle_set_current(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let id = require_str(params, "semesterId")?;
    let sem = semester::set_current(conn, id)?;
    Ok(json!({ "semester": to_value(&sem)? }))
}

fn handle_transition(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let id = require_str(params, "semesterId")?;
    let status = require_str(params, "status")?;
    let sem = semester::transition(conn, id, status)?;
    Ok(json!({ "semester": to_value(&sem)? }))
}

fn handle_get_current(state: &AppState) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let sem = semester::get_current(conn)?;
    Ok(match sem {
        Some(s) => json!({ "semester": to_value(&s)? }),
        None => json!({ "semester": serde_json::Value::Null }),
    })
}

fn handle_delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let id = require_str(params, "semesterId")?;
    semester::delete(conn, id)?;
    Ok(json!({ "deleted": true }))
}

fn handle_list(state: &AppState) -> Result<serde_json::Value, EngineError> {
    let conn = require_db(state)?;
    let semesters = semester::list(conn)?;
    Ok(json!({ "semesters": to_value(&semesters)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "semester.create" => handle_create(state, &req.params),
        "semester.setCurrent" => handle_set_current(state, &req.params),
        "semester.transition" => handle_transition(state, &req.params),
        "semester.getCurrent" => handle_get_current(state),
        "semester.delete" => handle_delete(state, &req.params),
        "semester.list" => handle_list(state),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
