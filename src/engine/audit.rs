use crate::engine::EngineError;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

/// Append inside the caller's transaction. The entry commits or rolls back
/// with the mutation it documents; there is no best-effort path.
pub fn append(
    conn: &Connection,
    user_id: Option<&str>,
    action: &str,
    details: &str,
    student_id: Option<&str>,
    assessment_id: Option<&str>,
) -> Result<(), EngineError> {
    conn.execute(
        "INSERT INTO audit_log(id, user_id, action, details, student_id, assessment_id, timestamp)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            user_id,
            action,
            details,
            student_id,
            assessment_id,
            chrono::Utc::now().to_rfc3339(),
        ),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub details: String,
    pub student_id: Option<String>,
    pub assessment_id: Option<String>,
    pub timestamp: String,
}

/// Read surface. No update or delete exists anywhere in the engine.
pub fn list(
    conn: &Connection,
    student_id: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<AuditEntry>, EngineError> {
    let limit = limit.unwrap_or(100).clamp(1, 1000);
    let map = |r: &rusqlite::Row<'_>| {
        Ok(AuditEntry {
            id: r.get(0)?,
            user_id: r.get(1)?,
            action: r.get(2)?,
            details: r.get(3)?,
            student_id: r.get(4)?,
            assessment_id: r.get(5)?,
            timestamp: r.get(6)?,
        })
    };
    let rows = match student_id {
        Some(sid) => {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, action, details, student_id, assessment_id, timestamp
                 FROM audit_log WHERE student_id = ?
                 ORDER BY timestamp DESC, id LIMIT ?",
            )?;
            let rows = stmt
                .query_map((sid, limit), map)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, action, details, student_id, assessment_id, timestamp
                 FROM audit_log ORDER BY timestamp DESC, id LIMIT ?",
            )?;
            let rows = stmt
                .query_map([limit], map)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}
