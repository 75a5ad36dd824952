use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_registrard");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn registrard");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
}

struct Seed {
    teacher_id: String,
    student_id: String,
    assignment_id: String,
    enrollment_id: String,
}

fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &PathBuf) -> Seed {
    let mut n = 0;
    let mut next = || {
        n += 1;
        format!("seed-{}", n)
    };
    let _ = request_ok(
        stdin,
        reader,
        &next(),
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let sem = request_ok(
        stdin,
        reader,
        &next(),
        "semester.create",
        json!({
            "name": "First Semester",
            "academicYear": "2025-2026",
            "startDate": "2025-06-02",
            "endDate": "2025-10-24"
        }),
    );
    let semester_id = sem["semester"]["id"].as_str().expect("semester id").to_string();
    let _ = request_ok(
        stdin,
        reader,
        &next(),
        "semester.transition",
        json!({ "semesterId": semester_id, "status": "active" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        &next(),
        "semester.setCurrent",
        json!({ "semesterId": semester_id }),
    );
    let section = request_ok(
        stdin,
        reader,
        &next(),
        "section.create",
        json!({ "name": "Dahlia", "yearLevel": 1 }),
    );
    let subject = request_ok(
        stdin,
        reader,
        &next(),
        "subject.create",
        json!({ "code": "MATH1", "name": "Mathematics 1" }),
    );
    let teacher = request_ok(
        stdin,
        reader,
        &next(),
        "teacher.create",
        json!({ "name": "R. Santos", "department": "Mathematics" }),
    );
    let teacher_id = teacher["teacher"]["id"].as_str().expect("teacher id").to_string();
    let student = request_ok(
        stdin,
        reader,
        &next(),
        "student.create",
        json!({
            "name": "A. Cruz",
            "yearLevel": 1,
            "sectionId": section["section"]["id"]
        }),
    );
    let student_id = student["student"]["id"].as_str().expect("student id").to_string();
    let assignment = request_ok(
        stdin,
        reader,
        &next(),
        "assignment.create",
        json!({
            "teacherId": teacher_id,
            "subjectId": subject["subject"]["id"],
            "sectionId": section["section"]["id"]
        }),
    );
    let assignment_id = assignment["assignment"]["id"]
        .as_str()
        .expect("assignment id")
        .to_string();
    let enrollment = request_ok(
        stdin,
        reader,
        &next(),
        "enrollment.create",
        json!({ "studentId": student_id, "assignmentId": assignment_id }),
    );
    let enrollment_id = enrollment["enrollment"]["id"]
        .as_str()
        .expect("enrollment id")
        .to_string();
    Seed {
        teacher_id,
        student_id,
        assignment_id,
        enrollment_id,
    }
}

#[test]
fn rerecording_attendance_corrects_the_day() {
    let workspace = temp_dir("registrar-att-correct");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "attendance.record",
        json!({ "enrollmentId": s.enrollment_id, "date": "2025-06-16", "status": "absent" }),
    );
    let corrected = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "attendance.record",
        json!({ "enrollmentId": s.enrollment_id, "date": "2025-06-16", "status": "late" }),
    );
    assert_eq!(corrected["attendance"]["status"].as_str(), Some("late"));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "r3",
        "attendance.list",
        json!({ "enrollmentId": s.enrollment_id }),
    );
    let rows = listed["attendance"].as_array().expect("attendance array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"].as_str(), Some("late"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn batch_attendance_is_all_or_nothing() {
    let workspace = temp_dir("registrar-att-batch");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed(&mut stdin, &mut reader, &workspace);

    let bad = request(
        &mut stdin,
        &mut reader,
        "b1",
        "attendance.recordBatch",
        json!({
            "assignmentId": s.assignment_id,
            "date": "2025-06-16",
            "entries": [
                { "enrollmentId": s.enrollment_id, "status": "present" },
                { "enrollmentId": s.enrollment_id, "status": "sleeping" }
            ]
        }),
    );
    assert_eq!(error_code(&bad), "validation");

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "b2",
        "attendance.list",
        json!({ "assignmentId": s.assignment_id }),
    );
    assert_eq!(empty["attendance"].as_array().map(|a| a.len()), Some(0));

    let good = request_ok(
        &mut stdin,
        &mut reader,
        "b3",
        "attendance.recordBatch",
        json!({
            "assignmentId": s.assignment_id,
            "date": "2025-06-16",
            "entries": [
                { "enrollmentId": s.enrollment_id, "status": "present" }
            ]
        }),
    );
    assert_eq!(good["recorded"].as_u64(), Some(1));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn attendance_rate_counts_present_over_total() {
    let workspace = temp_dir("registrar-att-rate");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed(&mut stdin, &mut reader, &workspace);

    let days = [
        ("2025-06-16", "present"),
        ("2025-06-17", "present"),
        ("2025-06-18", "absent"),
        ("2025-06-19", "late"),
    ];
    for (i, (date, status)) in days.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("d{}", i),
            "attendance.record",
            json!({ "enrollmentId": s.enrollment_id, "date": date, "status": status }),
        );
    }

    let rate = request_ok(
        &mut stdin,
        &mut reader,
        "rate",
        "report.attendanceRate",
        json!({ "studentId": s.student_id }),
    );
    let r = &rate["attendanceRate"];
    assert_eq!(r["presentCount"].as_i64(), Some(2));
    assert_eq!(r["absentCount"].as_i64(), Some(1));
    assert_eq!(r["lateCount"].as_i64(), Some(1));
    assert_eq!(r["totalCount"].as_i64(), Some(4));
    assert_eq!(r["attendanceRate"].as_f64(), Some(50.0));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn consecutive_absences_counts_the_latest_run() {
    let workspace = temp_dir("registrar-att-consecutive");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed(&mut stdin, &mut reader, &workspace);

    let days = [
        ("2025-06-16", "present"),
        ("2025-06-17", "absent"),
        ("2025-06-18", "absent"),
        ("2025-06-19", "absent"),
    ];
    for (i, (date, status)) in days.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("d{}", i),
            "attendance.record",
            json!({ "enrollmentId": s.enrollment_id, "date": date, "status": status }),
        );
    }

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "nmiss",
        "report.consecutiveAbsences",
        json!({ "enrollmentId": s.enrollment_id, "threshold": 3 }),
    );
    assert_eq!(
        report["report"]["hasConsecutiveAbsences"].as_bool(),
        Some(true)
    );
    assert_eq!(report["report"]["consecutiveCount"].as_i64(), Some(3));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn student_performance_rolls_up_grades_and_attendance() {
    let workspace = temp_dir("registrar-att-performance");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let s = seed(&mut stdin, &mut reader, &workspace);

    let assessment = request_ok(
        &mut stdin,
        &mut reader,
        "a1",
        "assessment.create",
        json!({
            "assignmentId": s.assignment_id,
            "teacherId": s.teacher_id,
            "name": "Quiz 1",
            "category": "quizzes",
            "maxScore": 100,
            "term": "midterm"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "score.record",
        json!({
            "enrollmentId": s.enrollment_id,
            "assessmentId": assessment["assessment"]["id"],
            "score": 90,
            "teacherId": s.teacher_id
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "attendance.record",
        json!({ "enrollmentId": s.enrollment_id, "date": "2025-06-16", "status": "present" }),
    );

    let performance = request_ok(
        &mut stdin,
        &mut reader,
        "p1",
        "report.studentPerformance",
        json!({ "studentId": s.student_id }),
    );
    let report = &performance["report"];
    assert_eq!(report["studentId"].as_str(), Some(s.student_id.as_str()));
    let subjects = report["subjects"].as_array().expect("subjects array");
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0]["subjectCode"].as_str(), Some("MATH1"));
    assert_eq!(subjects[0]["attendanceRate"].as_f64(), Some(100.0));
    // Quiz 90 gives midterm 18.00, final 0.00; average 9.00 -> 0.36 GPA.
    assert_eq!(report["overallAverageGrade"].as_f64(), Some(9.0));
    assert_eq!(report["overallGpa"].as_f64(), Some(0.36));

    let gpa = request_ok(
        &mut stdin,
        &mut reader,
        "g1",
        "report.studentGpa",
        json!({ "studentId": s.student_id, "term": "midterm" }),
    );
    assert_eq!(gpa["gpa"]["gpa"].as_f64(), Some(0.72));
    assert_eq!(gpa["gpa"]["averageGrade"].as_f64(), Some(18.0));
    assert_eq!(gpa["gpa"]["gradeCount"].as_i64(), Some(1));

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "p2",
        "report.teacherClassStats",
        json!({ "teacherId": s.teacher_id }),
    );
    let classes = stats["classes"].as_array().expect("classes array");
    assert_eq!(classes.len(), 1);

    let _ = std::fs::remove_dir_all(workspace);
}
