use crate::engine::EngineError;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

/// Forward-only lifecycle: Upcoming -> Active -> Closed -> Archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemesterStatus {
    Upcoming,
    Active,
    Closed,
    Archived,
}

impl SemesterStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upcoming" => Some(Self::Upcoming),
            "active" => Some(Self::Active),
            "closed" => Some(Self::Closed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Archived => "archived",
        }
    }

    fn next(&self) -> Option<Self> {
        match self {
            Self::Upcoming => Some(Self::Active),
            Self::Active => Some(Self::Closed),
            Self::Closed => Some(Self::Archived),
            Self::Archived => None,
        }
    }

    pub fn can_enroll(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn can_record_attendance(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn can_edit_grades(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Closed | Self::Archived)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Semester {
    pub id: String,
    pub name: String,
    pub academic_year: String,
    pub start_date: String,
    pub end_date: String,
    pub status: String,
    pub is_current: bool,
    pub is_read_only: bool,
    pub can_enroll: bool,
    pub can_record_attendance: bool,
    pub can_edit_grades: bool,
}

fn row_to_semester(r: &rusqlite::Row<'_>) -> rusqlite::Result<Semester> {
    let status: String = r.get(5)?;
    let parsed = SemesterStatus::parse(&status);
    Ok(Semester {
        id: r.get(0)?,
        name: r.get(1)?,
        academic_year: r.get(2)?,
        start_date: r.get(3)?,
        end_date: r.get(4)?,
        status,
        is_current: r.get::<_, i64>(6)? != 0,
        is_read_only: parsed.map(|s| s.is_read_only()).unwrap_or(false),
        can_enroll: parsed.map(|s| s.can_enroll()).unwrap_or(false),
        can_record_attendance: parsed.map(|s| s.can_record_attendance()).unwrap_or(false),
        can_edit_grades: parsed.map(|s| s.can_edit_grades()).unwrap_or(false),
    })
}

const SEMESTER_COLS: &str = "id, name, academic_year, start_date, end_date, status, is_current";

pub fn get(conn: &Connection, semester_id: &str) -> Result<Semester, EngineError> {
    conn.query_row(
        &format!("SELECT {} FROM semesters WHERE id = ?", SEMESTER_COLS),
        [semester_id],
        row_to_semester,
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("semester"))
}

pub fn status_of(conn: &Connection, semester_id: &str) -> Result<SemesterStatus, EngineError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT status FROM semesters WHERE id = ?",
            [semester_id],
            |r| r.get(0),
        )
        .optional()?;
    let raw = raw.ok_or_else(|| EngineError::not_found("semester"))?;
    SemesterStatus::parse(&raw).ok_or_else(|| {
        EngineError::new(
            "validation",
            format!("semester has unknown status '{}'", raw),
        )
    })
}

pub fn create(
    conn: &Connection,
    name: &str,
    academic_year: &str,
    start_date: &str,
    end_date: &str,
    status: Option<&str>,
) -> Result<Semester, EngineError> {
    let status = match status {
        None => SemesterStatus::Upcoming,
        Some(raw) => SemesterStatus::parse(raw).ok_or_else(|| {
            EngineError::new("validation", format!("unknown semester status '{}'", raw))
        })?,
    };

    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").map_err(|_| {
        EngineError::new("validation", "startDate must be YYYY-MM-DD")
    })?;
    let end = NaiveDate::parse_from_str(end_date, "%Y-%m-%d")
        .map_err(|_| EngineError::new("validation", "endDate must be YYYY-MM-DD"))?;
    if end < start {
        return Err(EngineError::new(
            "validation",
            format!("end date {} is before start date {}", end, start),
        ));
    }
    if name.trim().is_empty() {
        return Err(EngineError::new("validation", "name must not be empty"));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO semesters(id, name, academic_year, start_date, end_date, status, is_current)
         VALUES(?, ?, ?, ?, ?, ?, 0)",
        (
            &id,
            name.trim(),
            academic_year,
            start_date,
            end_date,
            status.as_str(),
        ),
    )?;
    get(conn, &id)
}

/// Clear-all-then-set-one inside a single transaction so no observable
/// instant has zero or two current semesters.
pub fn set_current(conn: &Connection, semester_id: &str) -> Result<Semester, EngineError> {
    let status = status_of(conn, semester_id)?;
    if status == SemesterStatus::Archived {
        return Err(EngineError::new(
            "validation",
            "an archived semester cannot be made current",
        ));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute("UPDATE semesters SET is_current = 0 WHERE is_current = 1", [])?;
    tx.execute(
        "UPDATE semesters SET is_current = 1 WHERE id = ?",
        [semester_id],
    )?;
    tx.commit()?;
    get(conn, semester_id)
}

pub fn transition(
    conn: &Connection,
    semester_id: &str,
    new_status: &str,
) -> Result<Semester, EngineError> {
    let target = SemesterStatus::parse(new_status).ok_or_else(|| {
        EngineError::new(
            "invalid_transition",
            format!("unknown semester status '{}'", new_status),
        )
    })?;
    let current = status_of(conn, semester_id)?;

    if current.next() != Some(target) {
        return Err(EngineError::with_details(
            "invalid_transition",
            format!(
                "semester status can only move forward; {} -> {} is not allowed",
                current.as_str(),
                target.as_str()
            ),
            serde_json::json!({ "from": current.as_str(), "to": target.as_str() }),
        ));
    }

    conn.execute(
        "UPDATE semesters SET status = ? WHERE id = ?",
        (target.as_str(), semester_id),
    )?;
    get(conn, semester_id)
}

/// Absence of a current semester is a valid state, not an error.
pub fn get_current(conn: &Connection) -> Result<Option<Semester>, EngineError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM semesters WHERE is_current = 1",
                SEMESTER_COLS
            ),
            [],
            row_to_semester,
        )
        .optional()?)
}

pub fn delete(conn: &Connection, semester_id: &str) -> Result<(), EngineError> {
    // Refuse while anything references the semester; archive instead.
    let _ = get(conn, semester_id)?;
    let assignment_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM assignments WHERE semester_id = ?",
        [semester_id],
        |r| r.get(0),
    )?;
    let enrollment_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM enrollments WHERE semester_id = ?",
        [semester_id],
        |r| r.get(0),
    )?;
    if assignment_count > 0 || enrollment_count > 0 {
        return Err(EngineError::with_details(
            "referential_integrity",
            format!(
                "semester is referenced by {} assignment(s) and {} enrollment(s); archive it instead",
                assignment_count, enrollment_count
            ),
            serde_json::json!({
                "assignmentCount": assignment_count,
                "enrollmentCount": enrollment_count
            }),
        ));
    }
    conn.execute("DELETE FROM semesters WHERE id = ?", [semester_id])?;
    Ok(())
}

pub fn list(conn: &Connection) -> Result<Vec<Semester>, EngineError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM semesters ORDER BY start_date, name",
        SEMESTER_COLS
    ))?;
    let rows = stmt
        .query_map([], row_to_semester)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
