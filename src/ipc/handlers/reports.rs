use crate::error::EngineError;
use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::helpers::{db_conn, optional_str, required_str, to_json};
use crate::ipc::types::{AppState, Request};
use crate::ranking::CohortKey;
use crate::reports::{self, ReportScope};
use crate::roster::{self, StudentInfo};
use crate::store::{GradeFilter, GradeStore, SqliteGradeStore};
use rusqlite::Connection;
use std::collections::BTreeMap;
use tracing::debug;

fn student(conn: &Connection, student_id: &str) -> Result<StudentInfo, HandlerErr> {
    roster::get_student(conn, student_id)?
        .ok_or_else(|| EngineError::NotFound(format!("student {student_id}")).into())
}

fn handle_term_report(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let student = student(conn, &required_str(&req.params, "student_id")?)?;
    let academic_year = required_str(&req.params, "academic_year")?;
    let term = required_str(&req.params, "term")?;

    let store = SqliteGradeStore::new(conn, &state.config);
    let records = store.list(&GradeFilter {
        student_id: Some(student.id.clone()),
        academic_year: Some(academic_year.clone()),
        term: Some(term.clone()),
        ..Default::default()
    })?;
    let subjects = roster::list_subjects(conn)?;

    let report = reports::term_report(&state.config, &student, &subjects, &records, &academic_year, &term)?;
    debug!(student_id = %student.id, subjects = report.subjects.len(), "term report assembled");
    to_json(&report)
}

fn handle_transcript(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let student = student(conn, &required_str(&req.params, "student_id")?)?;
    let scope = ReportScope {
        academic_year: optional_str(&req.params, "academic_year"),
        term: optional_str(&req.params, "term"),
    };

    let store = SqliteGradeStore::new(conn, &state.config);
    let own = store.list(&GradeFilter::student(&student.id))?;
    let mut cohorts: Vec<CohortKey> = own
        .iter()
        .filter(|r| scope.matches(r))
        .map(|r| CohortKey::of(&r.key))
        .collect();
    cohorts.sort();
    cohorts.dedup();

    // Ranks need every classmate's records, not just this student's.
    let mut cohort_records = Vec::new();
    let mut enrollments: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for cohort in &cohorts {
        cohort_records.extend(store.list(&GradeFilter::cohort(cohort))?);
        if !enrollments.contains_key(&cohort.class_id) {
            enrollments.insert(cohort.class_id.clone(), roster::enrolled_ids(conn, &cohort.class_id)?);
        }
    }
    let subjects = roster::list_subjects(conn)?;

    let transcript = reports::transcript(&state.config, &student, &subjects, &cohort_records, &enrollments, &scope)?;
    debug!(student_id = %student.id, terms = transcript.terms.len(), "transcript assembled");
    to_json(&transcript)
}

fn handle_class_performance(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let class_id = required_str(&req.params, "class_id")?;
    let class = roster::get_class(conn, &class_id)?
        .ok_or_else(|| EngineError::NotFound(format!("class {class_id}")))?;
    let cohort = CohortKey {
        class_id,
        academic_year: required_str(&req.params, "academic_year")?,
        term: required_str(&req.params, "term")?,
    };

    let store = SqliteGradeStore::new(conn, &state.config);
    let records = store.list(&GradeFilter::cohort(&cohort))?;
    let students = roster::enrolled_students(conn, &cohort.class_id)?;

    let summary = reports::class_performance(
        &state.config,
        &class,
        &students,
        &records,
        &cohort.academic_year,
        &cohort.term,
    )?;
    debug!(class_id = %class.id, grades = summary.total_grades, "class performance assembled");
    to_json(&summary)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.termReport" => handle_term_report(state, req),
        "reports.transcript" => handle_transcript(state, req),
        "reports.classPerformance" => handle_class_performance(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
