use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

pub fn open_db(workspace: &Path, lock_timeout_ms: Option<u64>) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("registrar.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // busy_timeout is the lock-wait budget for conflicting writers; expiry
    // surfaces to callers as a retryable lock_timeout error.
    conn.busy_timeout(Duration::from_millis(
        lock_timeout_ms.unwrap_or(DEFAULT_LOCK_TIMEOUT_MS),
    ))?;

    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            year_level INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            is_active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            teacher_no TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            department TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS parents(
            id TEXT PRIMARY KEY,
            parent_no TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            contact_number TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_no TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            year_level INTEGER NOT NULL,
            section_id TEXT NOT NULL,
            parent_id TEXT,
            FOREIGN KEY(section_id) REFERENCES sections(id),
            FOREIGN KEY(parent_id) REFERENCES parents(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_section ON students(section_id, year_level)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS semesters(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            status TEXT NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    // The lifecycle manager clears-then-sets inside one transaction; this
    // partial index refuses a second current row from any other write path.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_semesters_single_current
         ON semesters(is_current) WHERE is_current = 1",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            section_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(section_id) REFERENCES sections(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id),
            UNIQUE(teacher_id, subject_id, section_id, semester_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_teacher ON assignments(teacher_id, semester_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_semester ON assignments(semester_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            assignment_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id),
            UNIQUE(student_id, assignment_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_assignment ON enrollments(assignment_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_semester ON enrollments(semester_id)",
        [],
    )?;

    // Attendance derives semester and subject through its enrollment; the
    // row stores nothing that could drift out of sync.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id),
            UNIQUE(enrollment_id, date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_enrollment ON attendance(enrollment_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL,
            term TEXT NOT NULL,
            value REAL NOT NULL,
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id),
            UNIQUE(enrollment_id, term)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_enrollment ON grades(enrollment_id, term)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            max_score REAL NOT NULL,
            date TEXT,
            term TEXT NOT NULL,
            created_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_assignment ON assessments(assignment_id, term)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_category ON assessments(assignment_id, category, term)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessment_scores(
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL,
            assessment_id TEXT NOT NULL,
            score REAL NOT NULL,
            recorded_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id),
            FOREIGN KEY(assessment_id) REFERENCES assessments(id),
            UNIQUE(enrollment_id, assessment_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_enrollment ON assessment_scores(enrollment_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_assessment ON assessment_scores(assessment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS category_weights(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL UNIQUE,
            activities_weight REAL NOT NULL,
            quizzes_weight REAL NOT NULL,
            projects_weight REAL NOT NULL,
            exams_weight REAL NOT NULL,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log(
            id TEXT PRIMARY KEY,
            user_id TEXT,
            action TEXT NOT NULL,
            details TEXT NOT NULL,
            student_id TEXT,
            assessment_id TEXT,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_student ON audit_log(student_id, timestamp)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_log(action, timestamp)",
        [],
    )?;

    // Score range is enforced at the storage layer so no write path, not
    // even raw SQL, can persist a score outside [0, max_score].
    conn.execute_batch(
        "CREATE TRIGGER IF NOT EXISTS trg_validate_score_insert
         BEFORE INSERT ON assessment_scores
         BEGIN
             SELECT CASE
                 WHEN NEW.score < 0 THEN
                     RAISE(ABORT, 'score cannot be negative')
                 WHEN NEW.score > (SELECT max_score FROM assessments WHERE id = NEW.assessment_id) THEN
                     RAISE(ABORT, 'score cannot exceed maximum score')
             END;
         END;
         CREATE TRIGGER IF NOT EXISTS trg_validate_score_update
         BEFORE UPDATE ON assessment_scores
         BEGIN
             SELECT CASE
                 WHEN NEW.score < 0 THEN
                     RAISE(ABORT, 'score cannot be negative')
                 WHEN NEW.score > (SELECT max_score FROM assessments WHERE id = NEW.assessment_id) THEN
                     RAISE(ABORT, 'score cannot exceed maximum score')
             END;
         END;",
    )?;

    Ok(())
}
