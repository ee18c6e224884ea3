use crate::config::ScoringConfig;
use crate::db;
use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::helpers::to_json;
use crate::ipc::types::{AppState, Request, SCORING_CONFIG_KEY};
use crate::scoring;
use crate::store::SqliteGradeStore;
use serde_json::json;
use tracing::info;

fn handle_config_get(state: &mut AppState, _req: &Request) -> HandlerResult {
    let stored = match state.db.as_ref() {
        Some(conn) => db::settings_get_json(conn, SCORING_CONFIG_KEY)
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?
            .is_some(),
        None => false,
    };
    Ok(json!({
        "config": to_json(&state.config)?,
        "source": if stored { "workspace" } else { "default" },
    }))
}

fn rescore_wanted(req: &Request) -> bool {
    req.params
        .get("rescore")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Store (or clear) the workspace config and optionally rescore every grade
/// under it, all in one transaction. `state.config` only moves after commit.
fn apply_config(state: &mut AppState, config: ScoringConfig, stored: bool, rescore: bool) -> HandlerResult {
    let mut rescored = serde_json::Value::Null;
    if let Some(conn) = state.db.as_ref() {
        let tx = conn.unchecked_transaction()?;
        let written = if stored {
            db::settings_set_json(&tx, SCORING_CONFIG_KEY, &to_json(&config)?)
        } else {
            db::settings_delete(&tx, SCORING_CONFIG_KEY)
        };
        written.map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
        if rescore {
            let store = SqliteGradeStore::new(&tx, &config);
            rescored = to_json(&scoring::rescore_all(&store, &config)?)?;
        }
        tx.commit()?;
    }
    state.config = config;
    Ok(json!({
        "config": to_json(&state.config)?,
        "rescored": rescored,
    }))
}

fn handle_config_set(state: &mut AppState, req: &Request) -> HandlerResult {
    let raw = req
        .params
        .get("config")
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing config"))?;
    let config = ScoringConfig::from_json(raw).map_err(|e| HandlerErr::new("config_invalid", e.to_string()))?;

    let out = apply_config(state, config, true, rescore_wanted(req))?;
    info!(
        components = state.config.weights().len(),
        bands = state.config.scale().bands().len(),
        "scoring config replaced"
    );
    Ok(out)
}

fn handle_config_reset(state: &mut AppState, req: &Request) -> HandlerResult {
    let config = state.default_config.clone();
    let out = apply_config(state, config, false, rescore_wanted(req))?;
    info!("scoring config reset to default");
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "config.get" => handle_config_get(state, req),
        "config.set" => handle_config_set(state, req),
        "config.reset" => handle_config_reset(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
