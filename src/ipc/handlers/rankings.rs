use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::helpers::{db_conn, optional_str, required_str, to_json};
use crate::ipc::types::{AppState, Request};
use crate::ranking::{self, CohortKey};
use crate::reports;
use crate::roster;
use crate::store::{GradeFilter, GradeStore, SqliteGradeStore};
use serde_json::json;

fn cohort_key(req: &Request) -> Result<CohortKey, HandlerErr> {
    Ok(CohortKey {
        class_id: required_str(&req.params, "class_id")?,
        academic_year: required_str(&req.params, "academic_year")?,
        term: required_str(&req.params, "term")?,
    })
}

fn handle_rankings_class(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let cohort = cohort_key(req)?;
    let store = SqliteGradeStore::new(conn, &state.config);
    let records = store.list(&GradeFilter::cohort(&cohort))?;
    reports::ensure_consistent(&state.config, &records)?;
    let enrolled = roster::enrolled_ids(conn, &cohort.class_id)?;

    let entries = ranking::rank_cohort(&state.config, &cohort, &records, &enrolled);
    Ok(json!({
        "cohort": to_json(&cohort)?,
        "total_students": entries.len(),
        "rankings": to_json(&entries)?,
    }))
}

/// One subject when `subject_id` is given, otherwise every subject with grades.
fn handle_rankings_subject(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let cohort = cohort_key(req)?;
    let store = SqliteGradeStore::new(conn, &state.config);
    let records = store.list(&GradeFilter::cohort(&cohort))?;
    reports::ensure_consistent(&state.config, &records)?;

    let mut subjects = ranking::rank_subjects(&state.config, &cohort, &records);
    if let Some(subject_id) = optional_str(&req.params, "subject_id") {
        subjects.retain(|s| s.subject_id == subject_id);
    }
    Ok(json!({
        "cohort": to_json(&cohort)?,
        "subjects": to_json(&subjects)?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "rankings.class" => handle_rankings_class(state, req),
        "rankings.subject" => handle_rankings_subject(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
