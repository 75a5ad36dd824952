use crate::engine::assessment::{weights_for, Category, Term, CATEGORIES};
use crate::engine::{audit, enrollment, EngineError};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Half-up rounding to 2 decimal places, the grade book's fixed precision.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub category: String,
    pub average: f64,
    pub weight: f64,
    pub scored_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermGrade {
    pub enrollment_id: String,
    pub term: String,
    pub value: f64,
    pub breakdown: Vec<CategoryBreakdown>,
}

/// Weighted term grade from category averages. A category with no scored
/// assessments contributes 0 to the weighted sum rather than being excluded
/// from the base; the conservative policy the registrar confirmed.
pub fn compute_term_grade(
    conn: &Connection,
    enrollment_id: &str,
    term: Term,
) -> Result<TermGrade, EngineError> {
    let e = enrollment::get(conn, enrollment_id)?;
    let weights = weights_for(conn, &e.assignment_id)?;

    let mut stmt = conn.prepare(
        "SELECT a.category, s.score, a.max_score
         FROM assessment_scores s
         JOIN assessments a ON a.id = s.assessment_id
         WHERE s.enrollment_id = ? AND a.term = ?",
    )?;
    let rows = stmt
        .query_map((enrollment_id, term.as_str()), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, f64>(1)?,
                r.get::<_, f64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut sums: HashMap<Category, (f64, usize)> = HashMap::new();
    for (raw_category, score, max_score) in rows {
        let Some(category) = Category::parse(&raw_category) else {
            continue;
        };
        if max_score <= 0.0 {
            continue;
        }
        let entry = sums.entry(category).or_insert((0.0, 0));
        entry.0 += 100.0 * score / max_score;
        entry.1 += 1;
    }

    let mut value = 0.0;
    let mut breakdown = Vec::with_capacity(CATEGORIES.len());
    for category in CATEGORIES {
        let weight = weights.weight_of(category);
        let (sum, count) = sums.get(&category).copied().unwrap_or((0.0, 0));
        let average = if count > 0 { sum / count as f64 } else { 0.0 };
        value += average * weight / 100.0;
        breakdown.push(CategoryBreakdown {
            category: category.as_str().to_string(),
            average: round_off_2_decimals(average),
            weight,
            scored_count: count,
        });
    }

    Ok(TermGrade {
        enrollment_id: enrollment_id.to_string(),
        term: term.as_str().to_string(),
        value: round_off_2_decimals(value),
        breakdown,
    })
}

/// Recompute and upsert both term grades for one enrollment, auditing each
/// write. Runs inside the caller's transaction; nothing here commits.
pub fn recompute_enrollment(
    conn: &Connection,
    enrollment_id: &str,
    actor: Option<&str>,
) -> Result<Vec<TermGrade>, EngineError> {
    let e = enrollment::get(conn, enrollment_id)?;
    let mut out = Vec::with_capacity(2);
    for term in [Term::Midterm, Term::Final] {
        let grade = compute_term_grade(conn, enrollment_id, term)?;
        conn.execute(
            "INSERT INTO grades(id, enrollment_id, term, value) VALUES(?, ?, ?, ?)
             ON CONFLICT(enrollment_id, term) DO UPDATE SET value = excluded.value",
            (
                Uuid::new_v4().to_string(),
                enrollment_id,
                term.as_str(),
                grade.value,
            ),
        )?;
        audit::append(
            conn,
            actor,
            "Grade Updated",
            &format!(
                "Grade recomputed: {:.2} for enrollment {} term {}",
                grade.value,
                enrollment_id,
                term.as_str()
            ),
            Some(&e.student_id),
            None,
        )?;
        out.push(grade);
    }
    Ok(out)
}

/// Explicit recomputation entry point. Grade rows are never authored
/// directly; a "grade edit" is expressed only as this recomputation, so the
/// stored value can never diverge from the assessment scores.
pub fn recompute(
    conn: &Connection,
    enrollment_id: &str,
    actor: Option<&str>,
) -> Result<Vec<TermGrade>, EngineError> {
    let tx = rusqlite::Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let grades = recompute_enrollment(&tx, enrollment_id, actor)?;
    tx.commit()?;
    Ok(grades)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRow {
    pub id: String,
    pub enrollment_id: String,
    pub term: String,
    pub value: f64,
}

pub fn list(
    conn: &Connection,
    enrollment_id: Option<&str>,
    student_id: Option<&str>,
    term: Option<&str>,
) -> Result<Vec<GradeRow>, EngineError> {
    if let Some(raw) = term {
        if Term::parse(raw).is_none() {
            return Err(EngineError::new(
                "validation",
                format!("unknown term '{}'", raw),
            ));
        }
    }

    let mut sql = String::from(
        "SELECT g.id, g.enrollment_id, g.term, g.value
         FROM grades g
         JOIN enrollments e ON e.id = g.enrollment_id
         WHERE 1 = 1",
    );
    let mut binds: Vec<String> = Vec::new();
    if let Some(eid) = enrollment_id {
        sql.push_str(" AND g.enrollment_id = ?");
        binds.push(eid.to_string());
    }
    if let Some(sid) = student_id {
        sql.push_str(" AND e.student_id = ?");
        binds.push(sid.to_string());
    }
    if let Some(t) = term {
        sql.push_str(" AND g.term = ?");
        binds.push(t.to_string());
    }
    sql.push_str(" ORDER BY g.enrollment_id, g.term");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), |r| {
            Ok(GradeRow {
                id: r.get(0)?,
                enrollment_id: r.get(1)?,
                term: r.get(2)?,
                value: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_up_to_two_decimals() {
        assert_eq!(round_off_2_decimals(0.0), 0.0);
        assert_eq!(round_off_2_decimals(72.994), 72.99);
        assert_eq!(round_off_2_decimals(72.995), 73.0);
        assert_eq!(round_off_2_decimals(73.0), 73.0);
        assert_eq!(round_off_2_decimals(86.666_666), 86.67);
    }
}
