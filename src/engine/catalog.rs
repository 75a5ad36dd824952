use crate::engine::EngineError;
use chrono::Datelike;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

/// Closed mapping from a role tag to its registry-number prefix and backing
/// table. Replaces the dynamic model-name dispatch the original system used
/// for id generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryRole {
    Student,
    Teacher,
    Parent,
}

impl RegistryRole {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Student => "STD",
            Self::Teacher => "TCH",
            Self::Parent => "PRT",
        }
    }

    fn table_and_column(&self) -> (&'static str, &'static str) {
        match self {
            Self::Student => ("students", "student_no"),
            Self::Teacher => ("teachers", "teacher_no"),
            Self::Parent => ("parents", "parent_no"),
        }
    }
}

/// Next `PRE-YYYY-NNNNN` number in the per-role per-year sequence. Callers
/// run this inside the same transaction as the insert that consumes it.
pub fn next_registry_no(conn: &Connection, role: RegistryRole, year: i32) -> Result<String, EngineError> {
    let (table, column) = role.table_and_column();
    let like = format!("{}-{}-%", role.prefix(), year);
    let last: Option<String> = conn
        .query_row(
            &format!(
                "SELECT {col} FROM {table} WHERE {col} LIKE ? ORDER BY {col} DESC LIMIT 1",
                col = column,
                table = table
            ),
            [&like],
            |r| r.get(0),
        )
        .optional()?;

    let next = match last {
        None => 1,
        Some(no) => no
            .rsplit('-')
            .next()
            .and_then(|n| n.parse::<u32>().ok())
            .map(|n| n + 1)
            .ok_or_else(|| {
                EngineError::new(
                    "validation",
                    format!("existing registry number '{}' is malformed", no),
                )
            })?,
    };
    Ok(format!("{}-{}-{:05}", role.prefix(), year, next))
}

fn current_year() -> i32 {
    chrono::Utc::now().year()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub name: String,
    pub year_level: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub teacher_no: String,
    pub name: String,
    pub department: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Parent {
    pub id: String,
    pub parent_no: String,
    pub name: String,
    pub contact_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub student_no: String,
    pub name: String,
    pub year_level: i64,
    pub section_id: String,
    pub parent_id: Option<String>,
}

pub fn create_section(conn: &Connection, name: &str, year_level: i64) -> Result<Section, EngineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::new("validation", "section name must not be empty"));
    }
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM sections WHERE name = ?", [name], |r| r.get(0))
        .optional()?;
    if exists.is_some() {
        return Err(EngineError::new(
            "validation",
            format!("section '{}' already exists", name),
        ));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO sections(id, name, year_level) VALUES(?, ?, ?)",
        (&id, name, year_level),
    )?;
    Ok(Section {
        id,
        name: name.to_string(),
        year_level,
    })
}

pub fn create_subject(
    conn: &Connection,
    code: &str,
    name: &str,
    description: &str,
) -> Result<Subject, EngineError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(EngineError::new("validation", "subject code must not be empty"));
    }
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM subjects WHERE code = ?", [code], |r| r.get(0))
        .optional()?;
    if exists.is_some() {
        return Err(EngineError::new(
            "validation",
            format!("subject code '{}' already exists", code),
        ));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, code, name, description, is_active) VALUES(?, ?, ?, ?, 1)",
        (&id, code, name, description),
    )?;
    Ok(Subject {
        id,
        code: code.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        is_active: true,
    })
}

pub fn create_teacher(conn: &Connection, name: &str, department: &str) -> Result<Teacher, EngineError> {
    let tx = conn.unchecked_transaction()?;
    let teacher_no = next_registry_no(&tx, RegistryRole::Teacher, current_year())?;
    let id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO teachers(id, teacher_no, name, department) VALUES(?, ?, ?, ?)",
        (&id, &teacher_no, name, department),
    )?;
    tx.commit()?;
    Ok(Teacher {
        id,
        teacher_no,
        name: name.to_string(),
        department: department.to_string(),
    })
}

pub fn create_parent(
    conn: &Connection,
    name: &str,
    contact_number: Option<&str>,
) -> Result<Parent, EngineError> {
    let tx = conn.unchecked_transaction()?;
    let parent_no = next_registry_no(&tx, RegistryRole::Parent, current_year())?;
    let id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO parents(id, parent_no, name, contact_number) VALUES(?, ?, ?, ?)",
        (&id, &parent_no, name, contact_number),
    )?;
    tx.commit()?;
    Ok(Parent {
        id,
        parent_no,
        name: name.to_string(),
        contact_number: contact_number.map(|s| s.to_string()),
    })
}

pub fn create_student(
    conn: &Connection,
    name: &str,
    year_level: i64,
    section_id: &str,
    parent_id: Option<&str>,
) -> Result<Student, EngineError> {
    let section_exists: Option<i64> = conn
        .query_row("SELECT 1 FROM sections WHERE id = ?", [section_id], |r| r.get(0))
        .optional()?;
    if section_exists.is_none() {
        return Err(EngineError::not_found("section"));
    }
    if let Some(pid) = parent_id {
        let parent_exists: Option<i64> = conn
            .query_row("SELECT 1 FROM parents WHERE id = ?", [pid], |r| r.get(0))
            .optional()?;
        if parent_exists.is_none() {
            return Err(EngineError::not_found("parent"));
        }
    }

    let tx = conn.unchecked_transaction()?;
    let student_no = next_registry_no(&tx, RegistryRole::Student, current_year())?;
    let id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO students(id, student_no, name, year_level, section_id, parent_id)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, &student_no, name, year_level, section_id, parent_id),
    )?;
    tx.commit()?;
    Ok(Student {
        id,
        student_no,
        name: name.to_string(),
        year_level,
        section_id: section_id.to_string(),
        parent_id: parent_id.map(|s| s.to_string()),
    })
}

pub fn get_student(conn: &Connection, student_id: &str) -> Result<Student, EngineError> {
    conn.query_row(
        "SELECT id, student_no, name, year_level, section_id, parent_id
         FROM students WHERE id = ?",
        [student_id],
        |r| {
            Ok(Student {
                id: r.get(0)?,
                student_no: r.get(1)?,
                name: r.get(2)?,
                year_level: r.get(3)?,
                section_id: r.get(4)?,
                parent_id: r.get(5)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("student"))
}

pub fn list_sections(conn: &Connection) -> Result<Vec<Section>, EngineError> {
    let mut stmt =
        conn.prepare("SELECT id, name, year_level FROM sections ORDER BY year_level, name")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Section {
                id: r.get(0)?,
                name: r.get(1)?,
                year_level: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_subjects(conn: &Connection) -> Result<Vec<Subject>, EngineError> {
    let mut stmt = conn
        .prepare("SELECT id, code, name, description, is_active FROM subjects ORDER BY code")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Subject {
                id: r.get(0)?,
                code: r.get(1)?,
                name: r.get(2)?,
                description: r.get(3)?,
                is_active: r.get::<_, i64>(4)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_teachers(conn: &Connection) -> Result<Vec<Teacher>, EngineError> {
    let mut stmt =
        conn.prepare("SELECT id, teacher_no, name, department FROM teachers ORDER BY teacher_no")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Teacher {
                id: r.get(0)?,
                teacher_no: r.get(1)?,
                name: r.get(2)?,
                department: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_parents(conn: &Connection) -> Result<Vec<Parent>, EngineError> {
    let mut stmt = conn
        .prepare("SELECT id, parent_no, name, contact_number FROM parents ORDER BY parent_no")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Parent {
                id: r.get(0)?,
                parent_no: r.get(1)?,
                name: r.get(2)?,
                contact_number: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_students(conn: &Connection, section_id: Option<&str>) -> Result<Vec<Student>, EngineError> {
    let sql = "SELECT id, student_no, name, year_level, section_id, parent_id FROM students";
    let map = |r: &rusqlite::Row<'_>| {
        Ok(Student {
            id: r.get(0)?,
            student_no: r.get(1)?,
            name: r.get(2)?,
            year_level: r.get(3)?,
            section_id: r.get(4)?,
            parent_id: r.get(5)?,
        })
    };
    let rows = match section_id {
        Some(sec) => {
            let mut stmt =
                conn.prepare(&format!("{} WHERE section_id = ? ORDER BY student_no", sql))?;
            let rows = stmt.query_map([sec], map)?.collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!("{} ORDER BY student_no", sql))?;
            let rows = stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}
