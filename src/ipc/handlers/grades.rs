use crate::aggregate;
use crate::calc;
use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::helpers::{db_conn, grade_filter, grade_input, grade_key, to_json};
use crate::ipc::types::{AppState, Request};
use crate::record::GradeInput;
use crate::reports;
use crate::scoring::{self, Submission};
use crate::store::{GradeStore, SqliteGradeStore};
use crate::validate::{self, Validation};
use serde_json::json;

fn rejected(validation: &Validation) -> HandlerErr {
    HandlerErr::new("validation_failed", validation.messages().join("; "))
        .with_details(json!({ "errors": validation.errors }))
}

fn handle_grades_validate(state: &mut AppState, req: &Request) -> HandlerResult {
    let input = grade_input(&state.config, &req.params)?;
    to_json(&validate::validate(&state.config, &input))
}

/// Breakdown for the given marks without touching the store. Components left
/// out count as not assessed.
fn handle_grades_calculate(state: &mut AppState, req: &Request) -> HandlerResult {
    let input = grade_input(&state.config, &req.params)?;
    let issues = validate::component_issues(&state.config, &input.components);
    if !issues.is_empty() {
        return Err(rejected(&Validation {
            is_valid: false,
            errors: issues,
        }));
    }
    to_json(&calc::calculate(&state.config, &input.components))
}

fn handle_grades_get_or_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let input = GradeInput {
        key: grade_key(&req.params),
        ..Default::default()
    };
    let validation = validate::validate(&state.config, &input);
    if !validation.is_valid {
        return Err(rejected(&validation));
    }

    let tx = conn.unchecked_transaction()?;
    let (record, created) = {
        let store = SqliteGradeStore::new(&tx, &state.config);
        store.get_or_create(&input.key)?
    };
    tx.commit()?;
    Ok(json!({ "record": to_json(&record)?, "created": created }))
}

fn handle_grades_submit(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let input = grade_input(&state.config, &req.params)?;

    let tx = conn.unchecked_transaction()?;
    let submission = {
        let store = SqliteGradeStore::new(&tx, &state.config);
        scoring::submit_grade(&store, &state.config, &input)?
    };
    match submission {
        Submission::Saved { record, created } => {
            tx.commit()?;
            Ok(json!({ "record": to_json(&record)?, "created": created }))
        }
        Submission::Rejected(validation) => Err(rejected(&validation)),
    }
}

fn handle_grades_submit_batch(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let Some(raw) = req.params.get("grades").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing grades"));
    };
    let inputs = raw
        .iter()
        .map(|g| grade_input(&state.config, g))
        .collect::<Result<Vec<_>, _>>()?;

    let tx = conn.unchecked_transaction()?;
    let outcome = {
        let store = SqliteGradeStore::new(&tx, &state.config);
        scoring::submit_batch(&store, &state.config, &inputs)?
    };
    tx.commit()?;
    to_json(&outcome)
}

fn handle_grades_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let store = SqliteGradeStore::new(conn, &state.config);
    let records = store.list(&grade_filter(&req.params))?;
    Ok(json!({ "grades": to_json(&records)? }))
}

fn handle_grades_rescore(state: &mut AppState, _req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let tx = conn.unchecked_transaction()?;
    let outcome = {
        let store = SqliteGradeStore::new(&tx, &state.config);
        scoring::rescore_all(&store, &state.config)?
    };
    tx.commit()?;
    to_json(&outcome)
}

fn handle_grades_summary(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let store = SqliteGradeStore::new(conn, &state.config);
    let records = store.list(&grade_filter(&req.params))?;
    reports::ensure_consistent(&state.config, &records)?;
    to_json(&aggregate::summarize(state.config.scale(), &records))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.validate" => handle_grades_validate(state, req),
        "grades.calculate" => handle_grades_calculate(state, req),
        "grades.getOrCreate" => handle_grades_get_or_create(state, req),
        "grades.submit" => handle_grades_submit(state, req),
        "grades.submitBatch" => handle_grades_submit_batch(state, req),
        "grades.list" => handle_grades_list(state, req),
        "grades.rescore" => handle_grades_rescore(state, req),
        "grades.summary" => handle_grades_summary(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
