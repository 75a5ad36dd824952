use crate::engine::EngineError;
use crate::ipc::types::AppState;
use rusqlite::Connection;

pub fn require_db(state: &AppState) -> Result<&Connection, EngineError> {
    state
        .db
        .as_ref()
        .ok_or_else(|| EngineError::new("no_workspace", "select a workspace first"))
}

pub fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, EngineError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| EngineError::new("bad_params", format!("missing {}", key)))
}

pub fn optional_str<'a>(
    params: &'a serde_json::Value,
    key: &str,
) -> Result<Option<&'a str>, EngineError> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| EngineError::new("bad_params", format!("{} must be a string", key))),
    }
}

pub fn require_f64(params: &serde_json::Value, key: &str) -> Result<f64, EngineError> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| EngineError::new("bad_params", format!("missing numeric {}", key)))
}

pub fn require_i64(params: &serde_json::Value, key: &str) -> Result<i64, EngineError> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| EngineError::new("bad_params", format!("missing integer {}", key)))
}

pub fn optional_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, EngineError> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| EngineError::new("bad_params", format!("{} must be an integer", key))),
    }
}

pub fn to_value<T: serde::Serialize>(v: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(v)
        .map_err(|e| EngineError::new("db_query_failed", format!("serialize failed: {}", e)))
}
