use crate::engine::{assignment, catalog, semester, EngineError};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub assignment_id: String,
    pub semester_id: String,
    pub is_active: bool,
}

pub fn get(conn: &Connection, enrollment_id: &str) -> Result<Enrollment, EngineError> {
    conn.query_row(
        "SELECT id, student_id, assignment_id, semester_id, is_active
         FROM enrollments WHERE id = ?",
        [enrollment_id],
        |r| {
            Ok(Enrollment {
                id: r.get(0)?,
                student_id: r.get(1)?,
                assignment_id: r.get(2)?,
                semester_id: r.get(3)?,
                is_active: r.get::<_, i64>(4)? != 0,
            })
        },
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("enrollment"))
}

/// Validation gate on create. The checks run in a fixed order so the caller
/// always sees the most specific rejection first.
pub fn enroll(
    conn: &Connection,
    student_id: &str,
    assignment_id: &str,
) -> Result<Enrollment, EngineError> {
    let student = catalog::get_student(conn, student_id)?;
    let assignment = assignment::get(conn, assignment_id)?;

    let status = semester::status_of(conn, &assignment.semester_id)?;
    if !status.can_enroll() {
        return Err(EngineError::new(
            "semester_closed",
            format!(
                "enrollment requires an active semester; this one is {}",
                status.as_str()
            ),
        ));
    }

    if student.section_id != assignment.section_id {
        return Err(EngineError::with_details(
            "section_mismatch",
            "student does not belong to the assignment's section",
            serde_json::json!({
                "studentSectionId": student.section_id,
                "assignmentSectionId": assignment.section_id
            }),
        ));
    }

    let section_year: i64 = conn.query_row(
        "SELECT year_level FROM sections WHERE id = ?",
        [&assignment.section_id],
        |r| r.get(0),
    )?;
    if student.year_level != section_year {
        return Err(EngineError::with_details(
            "year_level_mismatch",
            format!(
                "student is year {} but the section is year {}",
                student.year_level, section_year
            ),
            serde_json::json!({
                "studentYearLevel": student.year_level,
                "sectionYearLevel": section_year
            }),
        ));
    }

    let active_dup: Option<String> = conn
        .query_row(
            "SELECT id FROM enrollments
             WHERE student_id = ? AND assignment_id = ? AND is_active = 1",
            (student_id, assignment_id),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(existing) = active_dup {
        return Err(EngineError::with_details(
            "duplicate_enrollment",
            "student already has an active enrollment in this assignment",
            serde_json::json!({ "enrollmentId": existing }),
        ));
    }

    // A dropped (inactive) enrollment for the same pair is reactivated
    // rather than duplicated; the (student, assignment) key stays unique.
    let inactive: Option<String> = conn
        .query_row(
            "SELECT id FROM enrollments WHERE student_id = ? AND assignment_id = ?",
            (student_id, assignment_id),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = inactive {
        conn.execute(
            "UPDATE enrollments SET is_active = 1, semester_id = ? WHERE id = ?",
            (&assignment.semester_id, &id),
        )?;
        return get(conn, &id);
    }

    // Enrollment semester := assignment semester, always.
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO enrollments(id, student_id, assignment_id, semester_id, is_active)
         VALUES(?, ?, ?, ?, 1)",
        (&id, student_id, assignment_id, &assignment.semester_id),
    )?;
    get(conn, &id)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableStudent {
    pub student_id: String,
    pub student_no: String,
    pub name: String,
}

/// Students the enrollment picker may offer: same section and year level as
/// the assignment, minus the already actively enrolled.
pub fn available_students(
    conn: &Connection,
    assignment_id: &str,
) -> Result<Vec<AvailableStudent>, EngineError> {
    let _ = assignment::get(conn, assignment_id)?;
    let mut stmt = conn.prepare(
        "SELECT s.id, s.student_no, s.name
         FROM students s
         JOIN assignments a ON a.id = ?1
         JOIN sections sec ON sec.id = a.section_id
         WHERE s.section_id = a.section_id
           AND s.year_level = sec.year_level
           AND NOT EXISTS (
               SELECT 1 FROM enrollments e
               WHERE e.student_id = s.id AND e.assignment_id = a.id AND e.is_active = 1
           )
         ORDER BY s.student_no",
    )?;
    let rows = stmt
        .query_map([assignment_id], |r| {
            Ok(AvailableStudent {
                student_id: r.get(0)?,
                student_no: r.get(1)?,
                name: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Dropping keeps the ledger rows; only the active flag changes.
pub fn deactivate(conn: &Connection, enrollment_id: &str) -> Result<Enrollment, EngineError> {
    let _ = get(conn, enrollment_id)?;
    conn.execute(
        "UPDATE enrollments SET is_active = 0 WHERE id = ?",
        [enrollment_id],
    )?;
    get(conn, enrollment_id)
}

/// Hard delete cascades the enrollment's attendance, grades and scores in
/// one transaction.
pub fn delete(conn: &Connection, enrollment_id: &str) -> Result<(), EngineError> {
    let _ = get(conn, enrollment_id)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM attendance WHERE enrollment_id = ?", [enrollment_id])?;
    tx.execute("DELETE FROM grades WHERE enrollment_id = ?", [enrollment_id])?;
    tx.execute(
        "DELETE FROM assessment_scores WHERE enrollment_id = ?",
        [enrollment_id],
    )?;
    tx.execute("DELETE FROM enrollments WHERE id = ?", [enrollment_id])?;
    tx.commit()?;
    Ok(())
}

pub fn list_for_student(
    conn: &Connection,
    student_id: &str,
    semester_id: Option<&str>,
) -> Result<Vec<Enrollment>, EngineError> {
    let map = |r: &rusqlite::Row<'_>| {
        Ok(Enrollment {
            id: r.get(0)?,
            student_id: r.get(1)?,
            assignment_id: r.get(2)?,
            semester_id: r.get(3)?,
            is_active: r.get::<_, i64>(4)? != 0,
        })
    };
    let rows = match semester_id {
        Some(sem) => {
            let mut stmt = conn.prepare(
                "SELECT id, student_id, assignment_id, semester_id, is_active
                 FROM enrollments WHERE student_id = ? AND semester_id = ?",
            )?;
            let rows = stmt
                .query_map((student_id, sem), map)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, student_id, assignment_id, semester_id, is_active
                 FROM enrollments WHERE student_id = ?",
            )?;
            let rows = stmt
                .query_map([student_id], map)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}
