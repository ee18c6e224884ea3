use crate::record::now_timestamp;
use crate::store::StoreResult;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STATUS_ACTIVE: &str = "active";

fn default_status() -> String {
    STATUS_ACTIVE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub student_no: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
}

impl StudentInfo {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_ACTIVE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectInfo {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub academic_year: Option<String>,
}

fn id_or_new(id: &str) -> String {
    let id = id.trim();
    if id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        id.to_string()
    }
}

fn student_row(r: &Row<'_>) -> rusqlite::Result<StudentInfo> {
    Ok(StudentInfo {
        id: r.get(0)?,
        student_no: r.get(1)?,
        first_name: r.get(2)?,
        last_name: r.get(3)?,
        email: r.get(4)?,
        status: r.get(5)?,
    })
}

/// Insert or update by id; a blank id gets a fresh one. Returns the stored row.
pub fn upsert_student(conn: &Connection, student: &StudentInfo) -> StoreResult<StudentInfo> {
    let stored = StudentInfo {
        id: id_or_new(&student.id),
        ..student.clone()
    };
    conn.execute(
        "INSERT INTO students(id, student_no, first_name, last_name, email, status, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           student_no = excluded.student_no,
           first_name = excluded.first_name,
           last_name = excluded.last_name,
           email = excluded.email,
           status = excluded.status,
           updated_at = excluded.updated_at",
        (
            &stored.id,
            &stored.student_no,
            &stored.first_name,
            &stored.last_name,
            &stored.email,
            &stored.status,
            now_timestamp(),
        ),
    )?;
    Ok(stored)
}

pub fn get_student(conn: &Connection, student_id: &str) -> StoreResult<Option<StudentInfo>> {
    let row = conn
        .query_row(
            "SELECT id, student_no, first_name, last_name, email, status
             FROM students WHERE id = ?",
            [student_id],
            student_row,
        )
        .optional()?;
    Ok(row)
}

pub fn upsert_subject(conn: &Connection, subject: &SubjectInfo) -> StoreResult<SubjectInfo> {
    let stored = SubjectInfo {
        id: id_or_new(&subject.id),
        ..subject.clone()
    };
    conn.execute(
        "INSERT INTO subjects(id, name, code) VALUES(?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, code = excluded.code",
        (&stored.id, &stored.name, &stored.code),
    )?;
    Ok(stored)
}

/// Every subject, ordered by name.
pub fn list_subjects(conn: &Connection) -> StoreResult<Vec<SubjectInfo>> {
    let mut stmt = conn.prepare("SELECT id, name, code FROM subjects ORDER BY name, id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(SubjectInfo {
                id: r.get(0)?,
                name: r.get(1)?,
                code: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn upsert_class(conn: &Connection, class: &ClassInfo) -> StoreResult<ClassInfo> {
    let stored = ClassInfo {
        id: id_or_new(&class.id),
        ..class.clone()
    };
    conn.execute(
        "INSERT INTO classes(id, name, academic_year) VALUES(?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, academic_year = excluded.academic_year",
        (&stored.id, &stored.name, &stored.academic_year),
    )?;
    Ok(stored)
}

pub fn get_class(conn: &Connection, class_id: &str) -> StoreResult<Option<ClassInfo>> {
    let row = conn
        .query_row(
            "SELECT id, name, academic_year FROM classes WHERE id = ?",
            [class_id],
            |r| {
                Ok(ClassInfo {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    academic_year: r.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Replace the class's membership with exactly `student_ids`.
/// Callers wrap this in a transaction; it does not commit on its own.
pub fn set_enrollments(conn: &Connection, class_id: &str, student_ids: &[String]) -> StoreResult<usize> {
    conn.execute("DELETE FROM enrollments WHERE class_id = ?", [class_id])?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO enrollments(class_id, student_id) VALUES(?, ?)
         ON CONFLICT(class_id, student_id) DO NOTHING",
    )?;
    let mut n = 0;
    for student_id in student_ids {
        n += stmt.execute((class_id, student_id))?;
    }
    Ok(n)
}

/// Enrolled students of a class, ordered by id.
pub fn enrolled_students(conn: &Connection, class_id: &str) -> StoreResult<Vec<StudentInfo>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.student_no, s.first_name, s.last_name, s.email, s.status
         FROM enrollments e
         JOIN students s ON s.id = e.student_id
         WHERE e.class_id = ?
         ORDER BY s.id",
    )?;
    let rows = stmt
        .query_map([class_id], student_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn enrolled_ids(conn: &Connection, class_id: &str) -> StoreResult<Vec<String>> {
    Ok(enrolled_students(conn, class_id)?
        .into_iter()
        .map(|s| s.id)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn student(id: &str, first: &str, status: &str) -> StudentInfo {
        StudentInfo {
            id: id.into(),
            student_no: None,
            first_name: first.into(),
            last_name: "Doe".into(),
            email: None,
            status: status.into(),
        }
    }

    #[test]
    fn upsert_student_generates_id_and_updates_in_place() {
        let conn = db::open_in_memory().expect("db");
        let created = upsert_student(&conn, &student("", "Ama", "active")).expect("insert");
        assert!(!created.id.is_empty());

        let renamed = StudentInfo {
            first_name: "Amara".into(),
            ..created.clone()
        };
        upsert_student(&conn, &renamed).expect("update");
        let loaded = get_student(&conn, &created.id).expect("get").expect("exists");
        assert_eq!(loaded.full_name(), "Amara Doe");
        assert!(loaded.is_active());
    }

    #[test]
    fn set_enrollments_replaces_membership() {
        let conn = db::open_in_memory().expect("db");
        upsert_class(
            &conn,
            &ClassInfo {
                id: "c1".into(),
                name: "JHS 1".into(),
                academic_year: Some("2024/2025".into()),
            },
        )
        .expect("class");
        for (id, status) in [("s1", "active"), ("s2", "inactive"), ("s3", "active")] {
            upsert_student(&conn, &student(id, id, status)).expect("student");
        }

        set_enrollments(&conn, "c1", &["s1".into(), "s2".into()]).expect("first");
        set_enrollments(&conn, "c1", &["s3".into(), "s2".into()]).expect("second");
        assert_eq!(enrolled_ids(&conn, "c1").expect("ids"), vec!["s2", "s3"]);

        let students = enrolled_students(&conn, "c1").expect("students");
        assert_eq!(students.iter().filter(|s| s.is_active()).count(), 1);
    }

    #[test]
    fn subjects_list_by_name() {
        let conn = db::open_in_memory().expect("db");
        for (id, name) in [("m", "Mathematics"), ("e", "English")] {
            upsert_subject(
                &conn,
                &SubjectInfo {
                    id: id.into(),
                    name: name.into(),
                    code: None,
                },
            )
            .expect("subject");
        }
        let names: Vec<String> = list_subjects(&conn)
            .expect("list")
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["English", "Mathematics"]);
    }
}
