use serde::Serialize;

/// Typed rule violation carried from the engine to the wire. `code` maps
/// 1:1 onto the response `error.code`; `message` names the violated rule
/// with the offending values so the UI layer never re-derives it.
#[derive(Debug, Clone, Serialize)]
pub struct EngineError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl EngineError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: &str, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::new("not_found", format!("{} not found", what))
    }

    /// Collapse a rusqlite failure into the engine taxonomy. A busy/locked
    /// database past busy_timeout is the retryable lock_timeout case; the
    /// score-range triggers abort with a constraint violation that keeps
    /// its RAISE message.
    pub fn db(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(f, ref msg) = e {
            match f.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    return Self::new(
                        "lock_timeout",
                        "lock wait exceeded the configured timeout; retry the operation",
                    );
                }
                rusqlite::ErrorCode::ConstraintViolation => {
                    let text = msg.clone().unwrap_or_else(|| e.to_string());
                    if text.contains("score cannot") {
                        return Self::new("score_range", text);
                    }
                    return Self::new("constraint_violation", text);
                }
                _ => {}
            }
        }
        Self::new("db_query_failed", e.to_string())
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::db(e)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for EngineError {}
