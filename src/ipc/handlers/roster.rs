use crate::error::EngineError;
use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::helpers::{db_conn, parse_params, required_str, to_json};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, ClassInfo, StudentInfo, SubjectInfo};
use serde_json::json;

fn non_blank(value: &str, what: &str) -> Result<(), HandlerErr> {
    if value.trim().is_empty() {
        return Err(HandlerErr::bad_params(format!("{what} must not be empty")));
    }
    Ok(())
}

fn handle_classes_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let class: ClassInfo = parse_params(&req.params, "class")?;
    non_blank(&class.name, "class name")?;
    let stored = roster::upsert_class(conn, &class)?;
    Ok(json!({ "class": to_json(&stored)? }))
}

/// Accepts `student` or a `students` array.
fn handle_students_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let students: Vec<StudentInfo> = if req.params.get("students").is_some() {
        parse_params(&req.params, "students")?
    } else {
        vec![parse_params(&req.params, "student")?]
    };
    for s in &students {
        non_blank(&s.first_name, "first_name")?;
        non_blank(&s.last_name, "last_name")?;
    }

    let tx = conn.unchecked_transaction()?;
    let mut stored = Vec::with_capacity(students.len());
    for s in &students {
        stored.push(roster::upsert_student(&tx, s)?);
    }
    tx.commit()?;
    Ok(json!({ "students": to_json(&stored)? }))
}

fn handle_subjects_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let subject: SubjectInfo = parse_params(&req.params, "subject")?;
    non_blank(&subject.name, "subject name")?;
    let stored = roster::upsert_subject(conn, &subject)?;
    Ok(json!({ "subject": to_json(&stored)? }))
}

fn handle_enrollments_set(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let class_id = required_str(&req.params, "class_id")?;
    let student_ids: Vec<String> = parse_params(&req.params, "student_ids")?;
    if roster::get_class(conn, &class_id)?.is_none() {
        return Err(EngineError::NotFound(format!("class {class_id}")).into());
    }
    for id in &student_ids {
        if roster::get_student(conn, id)?.is_none() {
            return Err(HandlerErr::from(EngineError::NotFound(format!("student {id}")))
                .with_details(json!({ "student_id": id })));
        }
    }

    let tx = conn.unchecked_transaction()?;
    let enrolled = roster::set_enrollments(&tx, &class_id, &student_ids)?;
    tx.commit()?;
    Ok(json!({ "class_id": class_id, "enrolled": enrolled }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.upsert" => handle_classes_upsert(state, req),
        "students.upsert" => handle_students_upsert(state, req),
        "subjects.upsert" => handle_subjects_upsert(state, req),
        "enrollments.set" => handle_enrollments_set(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
