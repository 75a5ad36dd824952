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

fn create_semester(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
) -> String {
    let result = request_ok(
        stdin,
        reader,
        id,
        "semester.create",
        json!({
            "name": name,
            "academicYear": "2025-2026",
            "startDate": "2025-06-02",
            "endDate": "2025-10-24"
        }),
    );
    result
        .get("semester")
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .expect("semester id")
        .to_string()
}

#[test]
fn lifecycle_only_moves_forward_one_step() {
    let workspace = temp_dir("registrar-sem-forward");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let semester_id = create_semester(&mut stdin, &mut reader, "2", "First Semester");

    // Skipping a stage is rejected.
    let skipped = request(
        &mut stdin,
        &mut reader,
        "3",
        "semester.transition",
        json!({ "semesterId": semester_id, "status": "closed" }),
    );
    assert_eq!(error_code(&skipped), "invalid_transition");

    for (id, status) in [("4", "active"), ("5", "closed"), ("6", "archived")] {
        let result = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "semester.transition",
            json!({ "semesterId": semester_id, "status": status }),
        );
        assert_eq!(
            result
                .get("semester")
                .and_then(|v| v.get("status"))
                .and_then(|v| v.as_str()),
            Some(status)
        );
    }

    // Archived is terminal; going backwards is rejected too.
    let reopened = request(
        &mut stdin,
        &mut reader,
        "7",
        "semester.transition",
        json!({ "semesterId": semester_id, "status": "active" }),
    );
    assert_eq!(error_code(&reopened), "invalid_transition");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn set_current_is_exclusive() {
    let workspace = temp_dir("registrar-sem-current");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let first = create_semester(&mut stdin, &mut reader, "2", "First Semester");
    let second = create_semester(&mut stdin, &mut reader, "3", "Second Semester");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "semester.setCurrent",
        json!({ "semesterId": first }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "semester.setCurrent",
        json!({ "semesterId": second }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "6", "semester.list", json!({}));
    let semesters = listed
        .get("semesters")
        .and_then(|v| v.as_array())
        .expect("semesters array");
    let current: Vec<&str> = semesters
        .iter()
        .filter(|s| s.get("isCurrent").and_then(|v| v.as_bool()) == Some(true))
        .filter_map(|s| s.get("id").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(current, vec![second.as_str()]);

    let got = request_ok(&mut stdin, &mut reader, "7", "semester.getCurrent", json!({}));
    assert_eq!(
        got.get("semester")
            .and_then(|v| v.get("id"))
            .and_then(|v| v.as_str()),
        Some(second.as_str())
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn archived_semester_cannot_become_current() {
    let workspace = temp_dir("registrar-sem-archived");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let semester_id = create_semester(&mut stdin, &mut reader, "2", "Old Semester");
    for (id, status) in [("3", "active"), ("4", "closed"), ("5", "archived")] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "semester.transition",
            json!({ "semesterId": semester_id, "status": status }),
        );
    }
    let rejected = request(
        &mut stdin,
        &mut reader,
        "6",
        "semester.setCurrent",
        json!({ "semesterId": semester_id }),
    );
    assert_eq!(error_code(&rejected), "validation");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn delete_refuses_semester_with_assignments() {
    let workspace = temp_dir("registrar-sem-delete");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let semester_id = create_semester(&mut stdin, &mut reader, "2", "First Semester");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "semester.transition",
        json!({ "semesterId": semester_id, "status": "active" }),
    );

    let section = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "section.create",
        json!({ "name": "Sampaguita", "yearLevel": 2 }),
    );
    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "subject.create",
        json!({ "code": "SCI2", "name": "Science 2" }),
    );
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "teacher.create",
        json!({ "name": "L. Reyes", "department": "Science" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "assignment.create",
        json!({
            "teacherId": teacher["teacher"]["id"],
            "subjectId": subject["subject"]["id"],
            "sectionId": section["section"]["id"],
            "semesterId": semester_id
        }),
    );

    let rejected = request(
        &mut stdin,
        &mut reader,
        "8",
        "semester.delete",
        json!({ "semesterId": semester_id }),
    );
    assert_eq!(error_code(&rejected), "referential_integrity");

    // An unreferenced semester deletes cleanly.
    let empty = create_semester(&mut stdin, &mut reader, "9", "Second Semester");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "semester.delete",
        json!({ "semesterId": empty }),
    );

    let _ = std::fs::remove_dir_all(workspace);
}
