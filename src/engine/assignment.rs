use crate::engine::{semester, EngineError};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

/// A teaching offering: subject x teacher x section bound to a semester.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub teacher_id: String,
    pub subject_id: String,
    pub section_id: String,
    pub semester_id: String,
}

pub fn get(conn: &Connection, assignment_id: &str) -> Result<Assignment, EngineError> {
    conn.query_row(
        "SELECT id, teacher_id, subject_id, section_id, semester_id
         FROM assignments WHERE id = ?",
        [assignment_id],
        |r| {
            Ok(Assignment {
                id: r.get(0)?,
                teacher_id: r.get(1)?,
                subject_id: r.get(2)?,
                section_id: r.get(3)?,
                semester_id: r.get(4)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("assignment"))
}

fn ref_exists(conn: &Connection, table: &str, id: &str) -> Result<bool, EngineError> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    Ok(conn
        .query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()?
        .is_some())
}

pub fn create(
    conn: &Connection,
    teacher_id: &str,
    subject_id: &str,
    section_id: &str,
    semester_id: Option<&str>,
) -> Result<Assignment, EngineError> {
    if !ref_exists(conn, "teachers", teacher_id)? {
        return Err(EngineError::not_found("teacher"));
    }
    if !ref_exists(conn, "subjects", subject_id)? {
        return Err(EngineError::not_found("subject"));
    }
    if !ref_exists(conn, "sections", section_id)? {
        return Err(EngineError::not_found("section"));
    }

    // Omitted semester falls back to the current one.
    let semester_id = match semester_id {
        Some(id) => {
            let _ = semester::get(conn, id)?;
            id.to_string()
        }
        None => semester::get_current(conn)?
            .ok_or_else(|| {
                EngineError::new(
                    "no_active_semester",
                    "no semester supplied and no current semester is set",
                )
            })?
            .id,
    };

    let duplicate: Option<String> = conn
        .query_row(
            "SELECT id FROM assignments
             WHERE teacher_id = ? AND subject_id = ? AND section_id = ? AND semester_id = ?",
            (teacher_id, subject_id, section_id, &semester_id),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(existing) = duplicate {
        return Err(EngineError::with_details(
            "duplicate_assignment",
            "this teacher already offers this subject to this section in this semester",
            serde_json::json!({ "assignmentId": existing }),
        ));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO assignments(id, teacher_id, subject_id, section_id, semester_id)
         VALUES(?, ?, ?, ?, ?)",
        (&id, teacher_id, subject_id, section_id, &semester_id),
    )?;
    get(conn, &id)
}

pub fn can_teacher_manage(
    conn: &Connection,
    assignment_id: &str,
    teacher_id: &str,
) -> Result<bool, EngineError> {
    let assignment = get(conn, assignment_id)?;
    Ok(assignment.teacher_id == teacher_id)
}

/// Ownership gate used by the assessment/score/weight mutation paths when
/// the caller supplies a teacher identity.
pub fn require_teacher_manage(
    conn: &Connection,
    assignment_id: &str,
    teacher_id: Option<&str>,
) -> Result<(), EngineError> {
    let Some(teacher_id) = teacher_id else {
        return Ok(());
    };
    if can_teacher_manage(conn, assignment_id, teacher_id)? {
        Ok(())
    } else {
        Err(EngineError::new(
            "forbidden",
            "only the assigned teacher may manage this offering",
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub enrollment_id: String,
    pub student_id: String,
    pub student_no: String,
    pub student_name: String,
    pub year_level: i64,
}

/// Active enrollments joined to student identity.
pub fn roster(conn: &Connection, assignment_id: &str) -> Result<Vec<RosterEntry>, EngineError> {
    let _ = get(conn, assignment_id)?;
    let mut stmt = conn.prepare(
        "SELECT e.id, s.id, s.student_no, s.name, s.year_level
         FROM enrollments e
         JOIN students s ON s.id = e.student_id
         WHERE e.assignment_id = ? AND e.is_active = 1
         ORDER BY s.student_no",
    )?;
    let rows = stmt
        .query_map([assignment_id], |r| {
            Ok(RosterEntry {
                enrollment_id: r.get(0)?,
                student_id: r.get(1)?,
                student_no: r.get(2)?,
                student_name: r.get(3)?,
                year_level: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRow {
    pub id: String,
    pub teacher_id: String,
    pub subject_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub section_id: String,
    pub section_name: String,
    pub semester_id: String,
    pub enrolled_count: i64,
}

pub fn list(
    conn: &Connection,
    teacher_id: Option<&str>,
    semester_id: Option<&str>,
) -> Result<Vec<AssignmentRow>, EngineError> {
    let mut sql = String::from(
        "SELECT a.id, a.teacher_id, a.subject_id, sub.code, sub.name,
                a.section_id, sec.name, a.semester_id,
                (SELECT COUNT(*) FROM enrollments e
                 WHERE e.assignment_id = a.id AND e.is_active = 1)
         FROM assignments a
         JOIN subjects sub ON sub.id = a.subject_id
         JOIN sections sec ON sec.id = a.section_id
         WHERE 1 = 1",
    );
    let mut binds: Vec<String> = Vec::new();
    if let Some(t) = teacher_id {
        sql.push_str(" AND a.teacher_id = ?");
        binds.push(t.to_string());
    }
    if let Some(s) = semester_id {
        sql.push_str(" AND a.semester_id = ?");
        binds.push(s.to_string());
    }
    sql.push_str(" ORDER BY sub.code, sec.name");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), |r| {
            Ok(AssignmentRow {
                id: r.get(0)?,
                teacher_id: r.get(1)?,
                subject_id: r.get(2)?,
                subject_code: r.get(3)?,
                subject_name: r.get(4)?,
                section_id: r.get(5)?,
                section_name: r.get(6)?,
                semester_id: r.get(7)?,
                enrolled_count: r.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete(conn: &Connection, assignment_id: &str) -> Result<(), EngineError> {
    let _ = get(conn, assignment_id)?;
    let enrollment_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM enrollments WHERE assignment_id = ?",
        [assignment_id],
        |r| r.get(0),
    )?;
    if enrollment_count > 0 {
        return Err(EngineError::with_details(
            "referential_integrity",
            format!(
                "assignment has {} enrollment(s); remove them first",
                enrollment_count
            ),
            serde_json::json!({ "enrollmentCount": enrollment_count }),
        ));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM assessment_scores WHERE assessment_id IN
         (SELECT id FROM assessments WHERE assignment_id = ?)",
        [assignment_id],
    )?;
    tx.execute("DELETE FROM assessments WHERE assignment_id = ?", [assignment_id])?;
    tx.execute("DELETE FROM category_weights WHERE assignment_id = ?", [assignment_id])?;
    tx.execute("DELETE FROM assignments WHERE id = ?", [assignment_id])?;
    tx.commit()?;
    Ok(())
}
