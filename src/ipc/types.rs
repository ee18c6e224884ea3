use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Deserialize;
use tracing::info;

use crate::config::ScoringConfig;
use crate::db;
use crate::error::EngineResult;

/// Settings row holding a workspace's own scoring config.
pub const SCORING_CONFIG_KEY: &str = "scoring.config";

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Config every engine call in the open workspace runs under.
    pub config: ScoringConfig,
    /// Used when a workspace has not stored its own.
    pub default_config: ScoringConfig,
}

impl AppState {
    pub fn new(default_config: ScoringConfig) -> Self {
        Self {
            workspace: None,
            db: None,
            config: default_config.clone(),
            default_config,
        }
    }

    /// Open (creating if needed) the workspace database and load its scoring
    /// config. A stored config that fails validation leaves the current
    /// workspace untouched.
    pub fn open_workspace(&mut self, path: &Path) -> EngineResult<()> {
        let conn = db::open_db(path)?;
        let config = match db::settings_get_json(&conn, SCORING_CONFIG_KEY)? {
            Some(stored) => ScoringConfig::from_json(stored)?,
            None => self.default_config.clone(),
        };

        info!(
            workspace = %path.display(),
            components = config.weights().len(),
            bands = config.scale().bands().len(),
            "workspace opened"
        );
        self.workspace = Some(path.to_path_buf());
        self.db = Some(conn);
        self.config = config;
        Ok(())
    }
}
