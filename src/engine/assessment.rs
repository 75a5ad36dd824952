use crate::engine::{assignment, audit, enrollment, grade, semester, EngineError};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Term {
    Midterm,
    Final,
}

impl Term {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "midterm" => Some(Self::Midterm),
            "final" => Some(Self::Final),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Midterm => "midterm",
            Self::Final => "final",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Activities,
    Quizzes,
    Projects,
    Exams,
}

pub const CATEGORIES: [Category; 4] = [
    Category::Activities,
    Category::Quizzes,
    Category::Projects,
    Category::Exams,
];

impl Category {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "activities" => Some(Self::Activities),
            "quizzes" => Some(Self::Quizzes),
            "projects" => Some(Self::Projects),
            "exams" => Some(Self::Exams),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activities => "activities",
            Self::Quizzes => "quizzes",
            Self::Projects => "projects",
            Self::Exams => "exams",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWeights {
    pub assignment_id: String,
    pub activities: f64,
    pub quizzes: f64,
    pub projects: f64,
    pub exams: f64,
    pub is_default: bool,
}

impl CategoryWeights {
    pub fn weight_of(&self, category: Category) -> f64 {
        match category {
            Category::Activities => self.activities,
            Category::Quizzes => self.quizzes,
            Category::Projects => self.projects,
            Category::Exams => self.exams,
        }
    }
}

/// Stored weights for the assignment, or the 20/20/30/30 defaults when no
/// row exists yet.
pub fn weights_for(conn: &Connection, assignment_id: &str) -> Result<CategoryWeights, EngineError> {
    let row: Option<(f64, f64, f64, f64)> = conn
        .query_row(
            "SELECT activities_weight, quizzes_weight, projects_weight, exams_weight
             FROM category_weights WHERE assignment_id = ?",
            [assignment_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    Ok(match row {
        Some((activities, quizzes, projects, exams)) => CategoryWeights {
            assignment_id: assignment_id.to_string(),
            activities,
            quizzes,
            projects,
            exams,
            is_default: false,
        },
        None => CategoryWeights {
            assignment_id: assignment_id.to_string(),
            activities: 20.0,
            quizzes: 20.0,
            projects: 30.0,
            exams: 30.0,
            is_default: true,
        },
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub assignment_id: String,
    pub name: String,
    pub category: String,
    pub max_score: f64,
    pub date: Option<String>,
    pub term: String,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub fn get_assessment(conn: &Connection, assessment_id: &str) -> Result<Assessment, EngineError> {
    conn.query_row(
        "SELECT id, assignment_id, name, category, max_score, date, term, created_by,
                created_at, updated_at
         FROM assessments WHERE id = ?",
        [assessment_id],
        row_to_assessment,
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("assessment"))
}

fn row_to_assessment(r: &rusqlite::Row<'_>) -> rusqlite::Result<Assessment> {
    Ok(Assessment {
        id: r.get(0)?,
        assignment_id: r.get(1)?,
        name: r.get(2)?,
        category: r.get(3)?,
        max_score: r.get(4)?,
        date: r.get(5)?,
        term: r.get(6)?,
        created_by: r.get(7)?,
        created_at: r.get(8)?,
        updated_at: r.get(9)?,
    })
}

fn require_writable_semester(conn: &Connection, semester_id: &str) -> Result<(), EngineError> {
    let status = semester::status_of(conn, semester_id)?;
    if status.is_read_only() {
        return Err(EngineError::new(
            "semester_closed",
            format!("the semester is {} and read-only", status.as_str()),
        ));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn create_assessment(
    conn: &Connection,
    assignment_id: &str,
    name: &str,
    category: &str,
    max_score: f64,
    date: Option<&str>,
    term: &str,
    created_by: Option<&str>,
) -> Result<Assessment, EngineError> {
    let a = assignment::get(conn, assignment_id)?;
    require_writable_semester(conn, &a.semester_id)?;

    if name.trim().is_empty() {
        return Err(EngineError::new("validation", "assessment name must not be empty"));
    }
    let category = Category::parse(category).ok_or_else(|| {
        EngineError::new(
            "validation",
            format!(
                "unknown category '{}'; expected activities, quizzes, projects or exams",
                category
            ),
        )
    })?;
    let term = Term::parse(term).ok_or_else(|| {
        EngineError::new(
            "validation",
            format!("unknown term '{}'; expected midterm or final", term),
        )
    })?;
    if !max_score.is_finite() || max_score <= 0.0 {
        return Err(EngineError::new(
            "validation",
            format!("maxScore must be positive, got {}", max_score),
        ));
    }
    if let Some(d) = date {
        NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|_| EngineError::new("validation", "date must be YYYY-MM-DD"))?;
    }

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO assessments(id, assignment_id, name, category, max_score, date, term,
                                 created_by, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            assignment_id,
            name.trim(),
            category.as_str(),
            max_score,
            date,
            term.as_str(),
            created_by,
            &now,
            &now,
        ),
    )?;
    audit::append(
        &tx,
        created_by,
        "Assessment Added",
        &format!(
            "Assessment '{}' ({}, {} pts, {}) added to assignment {}",
            name.trim(),
            category.as_str(),
            max_score,
            term.as_str(),
            assignment_id
        ),
        None,
        Some(&id),
    )?;
    tx.commit()?;
    get_assessment(conn, &id)
}

pub fn list_assessments(
    conn: &Connection,
    assignment_id: &str,
    term: Option<&str>,
) -> Result<Vec<Assessment>, EngineError> {
    let _ = assignment::get(conn, assignment_id)?;
    let base = "SELECT id, assignment_id, name, category, max_score, date, term, created_by,
                       created_at, updated_at
                FROM assessments WHERE assignment_id = ?";
    let rows = match term {
        Some(t) => {
            if Term::parse(t).is_none() {
                return Err(EngineError::new("validation", format!("unknown term '{}'", t)));
            }
            let mut stmt = conn.prepare(&format!("{} AND term = ? ORDER BY date, name", base))?;
            let rows = stmt
                .query_map((assignment_id, t), row_to_assessment)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!("{} ORDER BY term, date, name", base))?;
            let rows = stmt
                .query_map([assignment_id], row_to_assessment)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRow {
    pub id: String,
    pub enrollment_id: String,
    pub assessment_id: String,
    pub score: f64,
    pub recorded_by: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecorded {
    pub score: ScoreRow,
    pub grades: Vec<grade::TermGrade>,
}

/// Upsert one score and recompute the enrollment's grades for both terms in
/// one exclusive transaction. Either every write below lands or none do.
pub fn record_score(
    conn: &Connection,
    enrollment_id: &str,
    assessment_id: &str,
    score: f64,
    recorded_by: Option<&str>,
) -> Result<ScoreRecorded, EngineError> {
    let e = enrollment::get(conn, enrollment_id)?;
    let a = get_assessment(conn, assessment_id)?;

    require_writable_semester(conn, &e.semester_id)?;

    if e.assignment_id != a.assignment_id {
        return Err(EngineError::with_details(
            "assignment_mismatch",
            "the enrollment and the assessment belong to different assignments",
            serde_json::json!({
                "enrollmentAssignmentId": e.assignment_id,
                "assessmentAssignmentId": a.assignment_id
            }),
        ));
    }

    if !score.is_finite() || score < 0.0 || score > a.max_score {
        return Err(EngineError::with_details(
            "score_range",
            format!("score {} is outside [0, {}]", score, a.max_score),
            serde_json::json!({ "score": score, "maxScore": a.max_score }),
        ));
    }

    let now = chrono::Utc::now().to_rfc3339();
    let tx = rusqlite::Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    tx.execute(
        "INSERT INTO assessment_scores(id, enrollment_id, assessment_id, score, recorded_by,
                                       created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(enrollment_id, assessment_id) DO UPDATE SET
             score = excluded.score,
             recorded_by = excluded.recorded_by,
             updated_at = excluded.updated_at",
        (
            Uuid::new_v4().to_string(),
            enrollment_id,
            assessment_id,
            score,
            recorded_by,
            &now,
            &now,
        ),
    )?;
    audit::append(
        &tx,
        recorded_by,
        "Score Updated",
        &format!(
            "Score {}/{} recorded on '{}' for enrollment {}",
            score, a.max_score, a.name, enrollment_id
        ),
        Some(&e.student_id),
        Some(assessment_id),
    )?;
    // A category's weight spans the whole term, so both term grades are
    // refreshed regardless of which assessment changed.
    let grades = grade::recompute_enrollment(&tx, enrollment_id, recorded_by)?;
    tx.commit()?;

    let row = conn.query_row(
        "SELECT id, enrollment_id, assessment_id, score, recorded_by, updated_at
         FROM assessment_scores WHERE enrollment_id = ? AND assessment_id = ?",
        (enrollment_id, assessment_id),
        |r| {
            Ok(ScoreRow {
                id: r.get(0)?,
                enrollment_id: r.get(1)?,
                assessment_id: r.get(2)?,
                score: r.get(3)?,
                recorded_by: r.get(4)?,
                updated_at: r.get(5)?,
            })
        },
    )?;
    Ok(ScoreRecorded { score: row, grades })
}

pub fn list_scores(
    conn: &Connection,
    assessment_id: Option<&str>,
    enrollment_id: Option<&str>,
) -> Result<Vec<ScoreRow>, EngineError> {
    let mut sql = String::from(
        "SELECT id, enrollment_id, assessment_id, score, recorded_by, updated_at
         FROM assessment_scores WHERE 1 = 1",
    );
    let mut binds: Vec<String> = Vec::new();
    if let Some(aid) = assessment_id {
        sql.push_str(" AND assessment_id = ?");
        binds.push(aid.to_string());
    }
    if let Some(eid) = enrollment_id {
        sql.push_str(" AND enrollment_id = ?");
        binds.push(eid.to_string());
    }
    sql.push_str(" ORDER BY enrollment_id, assessment_id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), |r| {
            Ok(ScoreRow {
                id: r.get(0)?,
                enrollment_id: r.get(1)?,
                assessment_id: r.get(2)?,
                score: r.get(3)?,
                recorded_by: r.get(4)?,
                updated_at: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Replace the assignment's category weights and recompute every active
/// enrollment under it, in a single exclusive transaction. A rejected sum
/// leaves the stored row untouched.
pub fn set_weights(
    conn: &Connection,
    assignment_id: &str,
    activities: f64,
    quizzes: f64,
    projects: f64,
    exams: f64,
    actor: Option<&str>,
) -> Result<CategoryWeights, EngineError> {
    let a = assignment::get(conn, assignment_id)?;
    require_writable_semester(conn, &a.semester_id)?;

    for (label, w) in [
        ("activities", activities),
        ("quizzes", quizzes),
        ("projects", projects),
        ("exams", exams),
    ] {
        if !w.is_finite() || w < 0.0 {
            return Err(EngineError::new(
                "validation",
                format!("{} weight must be a non-negative number, got {}", label, w),
            ));
        }
    }
    let sum = activities + quizzes + projects + exams;
    if (sum - 100.0).abs() > 1e-9 {
        return Err(EngineError::with_details(
            "weight_sum",
            format!("weights must total 100%, got {}%", sum),
            serde_json::json!({
                "activities": activities,
                "quizzes": quizzes,
                "projects": projects,
                "exams": exams,
                "sum": sum
            }),
        ));
    }

    let tx = rusqlite::Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    tx.execute(
        "INSERT INTO category_weights(id, assignment_id, activities_weight, quizzes_weight,
                                      projects_weight, exams_weight)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(assignment_id) DO UPDATE SET
             activities_weight = excluded.activities_weight,
             quizzes_weight = excluded.quizzes_weight,
             projects_weight = excluded.projects_weight,
             exams_weight = excluded.exams_weight",
        (
            Uuid::new_v4().to_string(),
            assignment_id,
            activities,
            quizzes,
            projects,
            exams,
        ),
    )?;
    audit::append(
        &tx,
        actor,
        "Category Weight Changed",
        &format!(
            "Weights for assignment {} set to {}/{}/{}/{}",
            assignment_id, activities, quizzes, projects, exams
        ),
        None,
        None,
    )?;

    let enrollment_ids: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT id FROM enrollments WHERE assignment_id = ? AND is_active = 1",
        )?;
        let ids = stmt
            .query_map([assignment_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };
    for eid in &enrollment_ids {
        grade::recompute_enrollment(&tx, eid, actor)?;
    }
    tx.commit()?;

    weights_for(conn, assignment_id)
}
