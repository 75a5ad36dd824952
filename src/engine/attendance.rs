use crate::engine::{enrollment, semester, EngineError};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "late" => Some(Self::Late),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRow {
    pub id: String,
    pub enrollment_id: String,
    pub date: String,
    pub status: String,
}

fn validate_entry(
    conn: &Connection,
    enrollment_id: &str,
    date: &str,
    status: &str,
) -> Result<AttendanceStatus, EngineError> {
    let e = enrollment::get(conn, enrollment_id)?;
    let sem_status = semester::status_of(conn, &e.semester_id)?;
    if !sem_status.can_record_attendance() {
        return Err(EngineError::new(
            "semester_closed",
            format!(
                "attendance requires an active semester; this one is {}",
                sem_status.as_str()
            ),
        ));
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| EngineError::new("validation", "date must be YYYY-MM-DD"))?;
    AttendanceStatus::parse(status).ok_or_else(|| {
        EngineError::new(
            "validation",
            format!("unknown attendance status '{}'; expected present, absent or late", status),
        )
    })
}

fn upsert_row(
    conn: &Connection,
    enrollment_id: &str,
    date: &str,
    status: AttendanceStatus,
) -> Result<(), EngineError> {
    conn.execute(
        "INSERT INTO attendance(id, enrollment_id, date, status) VALUES(?, ?, ?, ?)
         ON CONFLICT(enrollment_id, date) DO UPDATE SET status = excluded.status",
        (
            Uuid::new_v4().to_string(),
            enrollment_id,
            date,
            status.as_str(),
        ),
    )?;
    Ok(())
}

pub fn record(
    conn: &Connection,
    enrollment_id: &str,
    date: &str,
    status: &str,
) -> Result<AttendanceRow, EngineError> {
    let parsed = validate_entry(conn, enrollment_id, date, status)?;
    upsert_row(conn, enrollment_id, date, parsed)?;
    conn.query_row(
        "SELECT id, enrollment_id, date, status FROM attendance
         WHERE enrollment_id = ? AND date = ?",
        (enrollment_id, date),
        |r| {
            Ok(AttendanceRow {
                id: r.get(0)?,
                enrollment_id: r.get(1)?,
                date: r.get(2)?,
                status: r.get(3)?,
            })
        },
    )
    .map_err(EngineError::db)
}

pub struct BatchEntry {
    pub enrollment_id: String,
    pub status: String,
}

/// Roster-wide attendance for one date in a single transaction. Any
/// rejected entry aborts the whole batch.
pub fn record_batch(
    conn: &Connection,
    assignment_id: &str,
    date: &str,
    entries: &[BatchEntry],
) -> Result<usize, EngineError> {
    let tx = conn.unchecked_transaction()?;
    for entry in entries {
        let e = enrollment::get(&tx, &entry.enrollment_id)?;
        if e.assignment_id != assignment_id {
            return Err(EngineError::with_details(
                "assignment_mismatch",
                "batch contains an enrollment from another assignment",
                serde_json::json!({ "enrollmentId": entry.enrollment_id }),
            ));
        }
        let parsed = validate_entry(&tx, &entry.enrollment_id, date, &entry.status)?;
        upsert_row(&tx, &entry.enrollment_id, date, parsed)?;
    }
    tx.commit()?;
    Ok(entries.len())
}

pub fn list(
    conn: &Connection,
    enrollment_id: Option<&str>,
    assignment_id: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<Vec<AttendanceRow>, EngineError> {
    let mut sql = String::from(
        "SELECT att.id, att.enrollment_id, att.date, att.status
         FROM attendance att
         JOIN enrollments e ON e.id = att.enrollment_id
         WHERE 1 = 1",
    );
    let mut binds: Vec<String> = Vec::new();
    if let Some(eid) = enrollment_id {
        sql.push_str(" AND att.enrollment_id = ?");
        binds.push(eid.to_string());
    }
    if let Some(aid) = assignment_id {
        sql.push_str(" AND e.assignment_id = ?");
        binds.push(aid.to_string());
    }
    if let Some(f) = from {
        sql.push_str(" AND att.date >= ?");
        binds.push(f.to_string());
    }
    if let Some(t) = to {
        sql.push_str(" AND att.date <= ?");
        binds.push(t.to_string());
    }
    sql.push_str(" ORDER BY att.date, att.enrollment_id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), |r| {
            Ok(AttendanceRow {
                id: r.get(0)?,
                enrollment_id: r.get(1)?,
                date: r.get(2)?,
                status: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
