use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::calc::{ComponentScore, Components};
use crate::config::ScoringConfig;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::record::{GradeInput, GradeKey};
use crate::store::GradeFilter;

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Ids arrive as strings from most hosts but as numbers from some.
fn id_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(id_value)
        .filter(|s| !s.is_empty())
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    optional_str(params, key).ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn parse_params<T: DeserializeOwned>(params: &Value, key: &str) -> Result<T, HandlerErr> {
    let raw = params
        .get(key)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid {}: {}", key, e)))
}

/// Numbers, numeric strings, or absent (0). Anything else becomes NaN so
/// validation reports it against the right field.
fn number(v: Option<&Value>) -> f64 {
    match v {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) if s.trim().is_empty() => 0.0,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        Some(_) => f64::NAN,
    }
}

fn components_from(config: &ScoringConfig, params: &Value) -> Components {
    let mut out = Components::new();
    if let Some(map) = params.get("components").and_then(|v| v.as_object()) {
        for (name, part) in map {
            out.insert(
                name.trim().to_ascii_lowercase(),
                ComponentScore::new(number(part.get("score")), number(part.get("total"))),
            );
        }
        return out;
    }

    // Flat form: `assessment_score`, `assessment_total`, ...
    for c in config.components() {
        let score = params.get(format!("{c}_score"));
        let total = params.get(format!("{c}_total"));
        if score.is_some() || total.is_some() {
            out.insert(c.to_string(), ComponentScore::new(number(score), number(total)));
        }
    }
    out
}

pub fn grade_key(params: &Value) -> GradeKey {
    let field = |k: &str| optional_str(params, k).unwrap_or_default();
    GradeKey {
        student_id: field("student_id"),
        class_id: field("class_id"),
        subject_id: field("subject_id"),
        academic_year: field("academic_year"),
        term: field("term"),
    }
}

/// Missing key fields stay blank so validation can name them.
pub fn grade_input(config: &ScoringConfig, params: &Value) -> Result<GradeInput, HandlerErr> {
    if !params.is_object() {
        return Err(HandlerErr::bad_params("grade must be an object"));
    }
    let text = |k: &str| {
        params
            .get(k)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    Ok(GradeInput {
        key: grade_key(params),
        components: components_from(config, params),
        remarks: text("remarks"),
        grade_date: text("grade_date").filter(|d| !d.trim().is_empty()),
    })
}

pub fn grade_filter(params: &Value) -> GradeFilter {
    GradeFilter {
        student_id: optional_str(params, "student_id"),
        class_id: optional_str(params, "class_id"),
        subject_id: optional_str(params, "subject_id"),
        academic_year: optional_str(params, "academic_year"),
        term: optional_str(params, "term"),
    }
}

pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("internal", e.to_string()))
}
