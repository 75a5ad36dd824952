use crate::engine::{assessment, assignment, catalog, enrollment, grade, EngineError};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRate {
    pub attendance_rate: f64,
    pub present_count: i64,
    pub absent_count: i64,
    pub late_count: i64,
    pub total_count: i64,
}

/// Present/absent/late tallies for a student, optionally scoped to one
/// assignment and a date window. Rate = present / total.
pub fn attendance_rate(
    conn: &Connection,
    student_id: &str,
    assignment_id: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<AttendanceRate, EngineError> {
    let _ = catalog::get_student(conn, student_id)?;

    let mut sql = String::from(
        "SELECT
            SUM(CASE WHEN att.status = 'present' THEN 1 ELSE 0 END),
            SUM(CASE WHEN att.status = 'absent' THEN 1 ELSE 0 END),
            SUM(CASE WHEN att.status = 'late' THEN 1 ELSE 0 END),
            COUNT(*)
         FROM attendance att
         JOIN enrollments e ON e.id = att.enrollment_id
         WHERE e.student_id = ?",
    );
    let mut binds: Vec<String> = vec![student_id.to_string()];
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

    let (present, absent, late, total): (Option<i64>, Option<i64>, Option<i64>, i64) = conn
        .query_row(&sql, rusqlite::params_from_iter(binds.iter()), |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        })?;
    let present = present.unwrap_or(0);
    let rate = if total > 0 {
        grade::round_off_2_decimals(100.0 * present as f64 / total as f64)
    } else {
        0.0
    };
    Ok(AttendanceRate {
        attendance_rate: rate,
        present_count: present,
        absent_count: absent.unwrap_or(0),
        late_count: late.unwrap_or(0),
        total_count: total,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPerformance {
    pub assignment_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub average_grade: f64,
    pub attendance_rate: f64,
    pub grade_count: i64,
    pub attendance_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPerformance {
    pub student_id: String,
    pub student_no: String,
    pub student_name: String,
    pub overall_average_grade: f64,
    pub overall_gpa: f64,
    pub overall_attendance_rate: f64,
    pub subjects: Vec<SubjectPerformance>,
}

/// Percentage average projected onto a 4.0 scale.
fn gpa_from_average(avg: f64) -> f64 {
    grade::round_off_2_decimals(avg / 100.0 * 4.0)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGpa {
    pub gpa: f64,
    pub average_grade: f64,
    pub grade_count: i64,
    pub term: String,
}

/// 4.0-scale GPA over the student's stored grades, optionally for a
/// single term. No grades yields 0.0, not an error.
pub fn student_gpa(
    conn: &Connection,
    student_id: &str,
    term: Option<&str>,
) -> Result<StudentGpa, EngineError> {
    let _ = catalog::get_student(conn, student_id)?;
    let term = match term {
        None => None,
        Some(raw) => Some(
            assessment::Term::parse(raw)
                .ok_or_else(|| EngineError::new("validation", format!("unknown term '{}'", raw)))?,
        ),
    };

    let mut sql = String::from(
        "SELECT COALESCE(AVG(g.value), 0), COUNT(g.id)
         FROM grades g JOIN enrollments e ON e.id = g.enrollment_id
         WHERE e.student_id = ?",
    );
    let mut binds: Vec<String> = vec![student_id.to_string()];
    if let Some(t) = term {
        sql.push_str(" AND g.term = ?");
        binds.push(t.as_str().to_string());
    }

    let (avg, count): (f64, i64) = conn.query_row(
        &sql,
        rusqlite::params_from_iter(binds.iter()),
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok(StudentGpa {
        gpa: gpa_from_average(avg),
        average_grade: grade::round_off_2_decimals(avg),
        grade_count: count,
        term: term.map(|t| t.as_str().to_string()).unwrap_or_else(|| "all".to_string()),
    })
}

pub fn student_performance(
    conn: &Connection,
    student_id: &str,
) -> Result<StudentPerformance, EngineError> {
    let student = catalog::get_student(conn, student_id)?;

    let mut stmt = conn.prepare(
        "SELECT e.assignment_id, sub.code, sub.name,
                COALESCE(AVG(g.value), 0),
                COUNT(DISTINCT g.id),
                COUNT(DISTINCT att.id),
                COUNT(DISTINCT CASE WHEN att.status = 'present' THEN att.id END)
         FROM enrollments e
         JOIN assignments a ON a.id = e.assignment_id
         JOIN subjects sub ON sub.id = a.subject_id
         LEFT JOIN grades g ON g.enrollment_id = e.id
         LEFT JOIN attendance att ON att.enrollment_id = e.id
         WHERE e.student_id = ? AND e.is_active = 1
         GROUP BY e.assignment_id, sub.code, sub.name
         ORDER BY sub.code",
    )?;
    let subjects = stmt
        .query_map([student_id], |r| {
            let avg: f64 = r.get(3)?;
            let attendance_count: i64 = r.get(5)?;
            let present: i64 = r.get(6)?;
            let rate = if attendance_count > 0 {
                100.0 * present as f64 / attendance_count as f64
            } else {
                0.0
            };
            Ok(SubjectPerformance {
                assignment_id: r.get(0)?,
                subject_code: r.get(1)?,
                subject_name: r.get(2)?,
                average_grade: grade::round_off_2_decimals(avg),
                attendance_rate: grade::round_off_2_decimals(rate),
                grade_count: r.get(4)?,
                attendance_count,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let overall_avg: f64 = conn.query_row(
        "SELECT COALESCE(AVG(g.value), 0)
         FROM grades g JOIN enrollments e ON e.id = g.enrollment_id
         WHERE e.student_id = ?",
        [student_id],
        |r| r.get(0),
    )?;
    let overall_attendance = attendance_rate(conn, student_id, None, None, None)?;

    Ok(StudentPerformance {
        student_id: student.id,
        student_no: student.student_no,
        student_name: student.name,
        overall_average_grade: grade::round_off_2_decimals(overall_avg),
        overall_gpa: gpa_from_average(overall_avg),
        overall_attendance_rate: overall_attendance.attendance_rate,
        subjects,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStat {
    pub assignment_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub section_name: String,
    pub student_count: i64,
    pub average_grade: f64,
    pub attendance_rate: f64,
    pub at_risk_students: i64,
}

/// Per-offering statistics for one teacher. A student is at risk when the
/// average grade is below 75 or the attendance rate below 70.
pub fn teacher_class_stats(conn: &Connection, teacher_id: &str) -> Result<Vec<ClassStat>, EngineError> {
    let offerings = assignment::list(conn, Some(teacher_id), None)?;
    let mut out = Vec::with_capacity(offerings.len());

    for offering in offerings {
        let avg: f64 = conn.query_row(
            "SELECT COALESCE(AVG(g.value), 0)
             FROM grades g JOIN enrollments e ON e.id = g.enrollment_id
             WHERE e.assignment_id = ? AND e.is_active = 1",
            [&offering.id],
            |r| r.get(0),
        )?;

        let (present, total): (Option<i64>, i64) = conn.query_row(
            "SELECT SUM(CASE WHEN att.status = 'present' THEN 1 ELSE 0 END), COUNT(*)
             FROM attendance att JOIN enrollments e ON e.id = att.enrollment_id
             WHERE e.assignment_id = ? AND e.is_active = 1",
            [&offering.id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let rate = if total > 0 {
            100.0 * present.unwrap_or(0) as f64 / total as f64
        } else {
            0.0
        };

        let mut at_risk = 0_i64;
        let mut stmt = conn.prepare(
            "SELECT e.id, e.student_id FROM enrollments e
             WHERE e.assignment_id = ? AND e.is_active = 1",
        )?;
        let rows = stmt
            .query_map([&offering.id], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let student_count = rows.len() as i64;
        for (enrollment_id, student_id) in rows {
            let student_avg: Option<f64> = conn.query_row(
                "SELECT AVG(value) FROM grades WHERE enrollment_id = ?",
                [&enrollment_id],
                |r| r.get(0),
            )?;
            let per_student = attendance_rate(conn, &student_id, Some(&offering.id), None, None)?;
            // No attendance recorded counts as a 0% rate, so such a
            // student is flagged even with a passing average.
            let grade_risk = student_avg.unwrap_or(0.0) < 75.0;
            let attendance_risk = per_student.attendance_rate < 70.0;
            if grade_risk || attendance_risk {
                at_risk += 1;
            }
        }

        out.push(ClassStat {
            assignment_id: offering.id,
            subject_code: offering.subject_code,
            subject_name: offering.subject_name,
            section_name: offering.section_name,
            student_count,
            average_grade: grade::round_off_2_decimals(avg),
            attendance_rate: grade::round_off_2_decimals(rate),
            at_risk_students: at_risk,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsecutiveAbsences {
    pub has_consecutive_absences: bool,
    pub consecutive_count: i64,
    pub dates: Vec<String>,
}

/// Flags `threshold` absences on consecutive calendar days, looking at the
/// enrollment's most recent absence records.
pub fn consecutive_absences(
    conn: &Connection,
    enrollment_id: &str,
    threshold: Option<i64>,
) -> Result<ConsecutiveAbsences, EngineError> {
    let _ = enrollment::get(conn, enrollment_id)?;
    let threshold = threshold.unwrap_or(3).max(1);

    let mut stmt = conn.prepare(
        "SELECT date FROM attendance
         WHERE enrollment_id = ? AND status = 'absent'
         ORDER BY date DESC LIMIT ?",
    )?;
    let mut dates: Vec<NaiveDate> = stmt
        .query_map((enrollment_id, threshold), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter_map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok())
        .collect();

    if (dates.len() as i64) < threshold {
        return Ok(ConsecutiveAbsences {
            has_consecutive_absences: false,
            consecutive_count: dates.len() as i64,
            dates: Vec::new(),
        });
    }

    dates.sort();
    let consecutive = dates
        .windows(2)
        .all(|w| (w[1] - w[0]).num_days() == 1);

    Ok(ConsecutiveAbsences {
        has_consecutive_absences: consecutive,
        consecutive_count: if consecutive { threshold } else { dates.len() as i64 },
        dates: if consecutive {
            dates.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect()
        } else {
            Vec::new()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::engine::{assessment, assignment, attendance, catalog, enrollment, semester};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::init_schema(&conn).expect("init schema");
        conn
    }

    struct Fixture {
        teacher: String,
        student: String,
        assignment: String,
        enrollment: String,
    }

    fn fixture(conn: &Connection) -> Fixture {
        let teacher = catalog::create_teacher(conn, "Reyes", "Math").expect("teacher");
        let subject = catalog::create_subject(conn, "MATH101", "Algebra", "").expect("subject");
        let section = catalog::create_section(conn, "Grade 7 - A", 7).expect("section");
        let sem = semester::create(conn, "1st", "2026-2027", "2026-08-01", "2026-12-20", None)
            .expect("semester");
        semester::transition(conn, &sem.id, "active").expect("activate");
        let a = assignment::create(conn, &teacher.id, &subject.id, &section.id, Some(&sem.id))
            .expect("assignment");
        let student = catalog::create_student(conn, "Ana", 7, &section.id, None).expect("student");
        let e = enrollment::enroll(conn, &student.id, &a.id).expect("enroll");
        Fixture {
            teacher: teacher.id,
            student: student.id,
            assignment: a.id,
            enrollment: e.id,
        }
    }

    #[test]
    fn attendance_rate_matches_tallies() {
        let conn = test_conn();
        let fx = fixture(&conn);
        for (date, status) in [
            ("2026-09-01", "present"),
            ("2026-09-02", "present"),
            ("2026-09-03", "absent"),
            ("2026-09-04", "late"),
        ] {
            attendance::record(&conn, &fx.enrollment, date, status).expect("record");
        }

        let r = attendance_rate(&conn, &fx.student, None, None, None).expect("rate");
        assert_eq!(r.total_count, 4);
        assert_eq!(r.present_count, 2);
        assert_eq!(r.absent_count, 1);
        assert_eq!(r.late_count, 1);
        assert_eq!(r.attendance_rate, 50.0);

        let windowed = attendance_rate(&conn, &fx.student, None, Some("2026-09-03"), None)
            .expect("windowed");
        assert_eq!(windowed.total_count, 2);
    }

    #[test]
    fn student_performance_summarizes_grades_and_attendance() {
        let conn = test_conn();
        let fx = fixture(&conn);
        let exam = assessment::create_assessment(
            &conn,
            &fx.assignment,
            "Midterm Exam",
            "exams",
            100.0,
            None,
            "midterm",
            None,
        )
        .expect("assessment");
        assessment::record_score(&conn, &fx.enrollment, &exam.id, 80.0, None).expect("score");
        attendance::record(&conn, &fx.enrollment, "2026-09-01", "present").expect("attendance");

        let p = student_performance(&conn, &fx.student).expect("performance");
        assert_eq!(p.subjects.len(), 1);
        assert_eq!(p.subjects[0].subject_code, "MATH101");
        // midterm 24.00 (0.3 * 80) and final 0.00 average to 12.00.
        assert_eq!(p.overall_average_grade, 12.0);
        assert_eq!(p.overall_gpa, 0.48);
        assert_eq!(p.overall_attendance_rate, 100.0);
    }

    #[test]
    fn gpa_projects_average_onto_four_point_scale() {
        let conn = test_conn();
        let fx = fixture(&conn);

        let empty = student_gpa(&conn, &fx.student, None).expect("no grades yet");
        assert_eq!(empty.gpa, 0.0);
        assert_eq!(empty.grade_count, 0);
        assert_eq!(empty.term, "all");

        let exam = assessment::create_assessment(
            &conn,
            &fx.assignment,
            "Midterm Exam",
            "exams",
            100.0,
            None,
            "midterm",
            None,
        )
        .expect("assessment");
        assessment::record_score(&conn, &fx.enrollment, &exam.id, 80.0, None).expect("score");

        // midterm grade is 24.00 (0.3 * 80), so 24/100 * 4 = 0.96.
        let midterm = student_gpa(&conn, &fx.student, Some("midterm")).expect("midterm gpa");
        assert_eq!(midterm.gpa, 0.96);
        assert_eq!(midterm.average_grade, 24.0);
        assert_eq!(midterm.grade_count, 1);
        assert_eq!(midterm.term, "midterm");

        let bad = student_gpa(&conn, &fx.student, Some("prelim")).expect_err("unknown term");
        assert_eq!(bad.code, "validation");
    }

    #[test]
    fn teacher_stats_flag_at_risk_students() {
        let conn = test_conn();
        let fx = fixture(&conn);
        let exam = assessment::create_assessment(
            &conn,
            &fx.assignment,
            "Midterm Exam",
            "exams",
            100.0,
            None,
            "midterm",
            None,
        )
        .expect("assessment");
        // 0.3 * 50 = 15.00, far below the 75 risk line.
        assessment::record_score(&conn, &fx.enrollment, &exam.id, 50.0, None).expect("score");

        let stats = teacher_class_stats(&conn, &fx.teacher).expect("stats");
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].student_count, 1);
        assert_eq!(stats[0].at_risk_students, 1);
    }

    #[test]
    fn attendance_never_recorded_still_flags_risk() {
        let conn = test_conn();
        let fx = fixture(&conn);
        // Passing average, but a 0% attendance rate with no records.
        for (id, term) in [("g1", "midterm"), ("g2", "final")] {
            conn.execute(
                "INSERT INTO grades(id, enrollment_id, term, value) VALUES(?, ?, ?, 90.0)",
                (id, &fx.enrollment, term),
            )
            .expect("grade");
        }

        let stats = teacher_class_stats(&conn, &fx.teacher).expect("stats");
        assert_eq!(stats[0].at_risk_students, 1);

        attendance::record(&conn, &fx.enrollment, "2026-09-01", "present").expect("present");
        let stats = teacher_class_stats(&conn, &fx.teacher).expect("stats");
        assert_eq!(stats[0].at_risk_students, 0);
    }

    #[test]
    fn consecutive_absences_require_adjacent_days() {
        let conn = test_conn();
        let fx = fixture(&conn);
        for date in ["2026-09-01", "2026-09-02", "2026-09-03"] {
            attendance::record(&conn, &fx.enrollment, date, "absent").expect("absent");
        }
        let hit = consecutive_absences(&conn, &fx.enrollment, Some(3)).expect("check");
        assert!(hit.has_consecutive_absences);
        assert_eq!(hit.dates.len(), 3);

        // A gap breaks the streak.
        attendance::record(&conn, &fx.enrollment, "2026-09-05", "absent").expect("absent");
        let gap = consecutive_absences(&conn, &fx.enrollment, Some(3)).expect("check");
        assert!(!gap.has_consecutive_absences);
    }
}
