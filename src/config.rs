use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Scores, weighted values and band edges are all expressed at two decimals.
pub const SCORE_RESOLUTION: f64 = 0.01;

const WEIGHT_SUM: f64 = 100.0;
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
const BAND_EPSILON: f64 = 1e-9;
const MAX_GRADE_POINT: f64 = 4.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one weighted component is required")]
    NoComponents,
    #[error("component name must not be empty")]
    BlankComponent,
    #[error("duplicate component '{0}'")]
    DuplicateComponent(String),
    #[error("component '{component}' has invalid weight {weight}")]
    InvalidWeight { component: String, weight: f64 },
    #[error("component weights must sum to 100, got {sum}")]
    WeightSum { sum: f64 },
    #[error("grade scale must define at least one band")]
    EmptyScale,
    #[error("grade letter must not be empty")]
    BlankLetter,
    #[error("duplicate grade letter '{0}'")]
    DuplicateLetter(String),
    #[error("band '{letter}' has min {min} above max {max}")]
    InvertedBand { letter: String, min: f64, max: f64 },
    #[error("band '{letter}' edge {edge} is not a multiple of 0.01")]
    OffResolution { letter: String, edge: f64 },
    #[error("band '{letter}' grade point {points} is outside 0.0-4.0")]
    PointsOutOfRange { letter: String, points: f64 },
    #[error("lowest band '{letter}' must start at 0, starts at {min}")]
    ScaleStart { letter: String, min: f64 },
    #[error("highest band '{letter}' must end at 100, ends at {max}")]
    ScaleEnd { letter: String, max: f64 },
    #[error("bands '{lower}' and '{upper}' overlap")]
    Overlap { lower: String, upper: String },
    #[error("gap between band '{lower}' (max {lower_max}) and band '{upper}' (min {upper_min})")]
    Gap {
        lower: String,
        lower_max: f64,
        upper: String,
        upper_min: f64,
    },
    #[error("failed to read scoring config {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scoring config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid scoring config: {0}")]
    Document(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentWeight {
    pub component: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub letter: String,
    pub min: f64,
    pub max: f64,
    pub points: f64,
}

impl GradeBand {
    fn new(letter: &str, min: f64, max: f64, points: f64) -> Self {
        Self {
            letter: letter.to_string(),
            min,
            max,
            points,
        }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, score: f64) -> bool {
        score >= self.min - BAND_EPSILON && score <= self.max + BAND_EPSILON
    }
}

/// Totals are classified after rounding to 0.01, so an edge between two
/// hundredths would leave a hundredth that no band claims.
fn on_resolution(edge: f64) -> bool {
    (edge - crate::calc::round_2dp(edge)).abs() <= BAND_EPSILON
}

/// Letter bands, always held highest band first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GradeScale {
    bands: Vec<GradeBand>,
}

impl GradeScale {
    pub fn new(bands: Vec<GradeBand>) -> Result<Self, ConfigError> {
        if bands.is_empty() {
            return Err(ConfigError::EmptyScale);
        }

        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(bands.len());
        for band in bands {
            let letter = band.letter.trim().to_string();
            if letter.is_empty() {
                return Err(ConfigError::BlankLetter);
            }
            if !seen.insert(letter.clone()) {
                return Err(ConfigError::DuplicateLetter(letter));
            }
            if !(band.min <= band.max) {
                return Err(ConfigError::InvertedBand {
                    letter,
                    min: band.min,
                    max: band.max,
                });
            }
            if let Some(edge) = [band.min, band.max].into_iter().find(|e| !on_resolution(*e)) {
                return Err(ConfigError::OffResolution { letter, edge });
            }
            if !(0.0..=MAX_GRADE_POINT).contains(&band.points) {
                return Err(ConfigError::PointsOutOfRange {
                    letter,
                    points: band.points,
                });
            }
            normalized.push(GradeBand { letter, ..band });
        }

        normalized.sort_by(|a, b| b.min.total_cmp(&a.min));

        let lowest = &normalized[normalized.len() - 1];
        if lowest.min.abs() > BAND_EPSILON {
            return Err(ConfigError::ScaleStart {
                letter: lowest.letter.clone(),
                min: lowest.min,
            });
        }
        let highest = &normalized[0];
        if (highest.max - 100.0).abs() > BAND_EPSILON {
            return Err(ConfigError::ScaleEnd {
                letter: highest.letter.clone(),
                max: highest.max,
            });
        }

        for pair in normalized.windows(2) {
            let (upper, lower) = (&pair[0], &pair[1]);
            if upper.min <= lower.max + BAND_EPSILON {
                return Err(ConfigError::Overlap {
                    lower: lower.letter.clone(),
                    upper: upper.letter.clone(),
                });
            }
            if upper.min - lower.max > SCORE_RESOLUTION + BAND_EPSILON {
                return Err(ConfigError::Gap {
                    lower: lower.letter.clone(),
                    lower_max: lower.max,
                    upper: upper.letter.clone(),
                    upper_min: upper.min,
                });
            }
        }

        Ok(Self { bands: normalized })
    }

    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    /// Letters from the highest band down.
    pub fn letters(&self) -> impl Iterator<Item = &str> {
        self.bands.iter().map(|b| b.letter.as_str())
    }

    /// The fail band; `new` guarantees at least one band exists.
    pub fn lowest(&self) -> &GradeBand {
        &self.bands[self.bands.len() - 1]
    }

    pub fn points_for(&self, letter: &str) -> Option<f64> {
        self.bands
            .iter()
            .find(|b| b.letter == letter)
            .map(|b| b.points)
    }

    pub fn contains_letter(&self, letter: &str) -> bool {
        self.bands.iter().any(|b| b.letter == letter)
    }

    pub fn classify(&self, total_score: f64) -> &str {
        crate::calc::classify(self, total_score)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ScoringConfigFile {
    weights: Vec<ComponentWeight>,
    bands: Vec<GradeBand>,
}

/// Component weights plus grade scale for one institution.
///
/// Every engine function takes this explicitly. It can only be built through
/// validation, so holding one means the weights sum to 100 and the bands tile
/// `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScoringConfigFile")]
pub struct ScoringConfig {
    weights: Vec<ComponentWeight>,
    #[serde(rename = "bands")]
    scale: GradeScale,
}

impl TryFrom<ScoringConfigFile> for ScoringConfig {
    type Error = ConfigError;

    fn try_from(file: ScoringConfigFile) -> Result<Self, Self::Error> {
        Self::new(file.weights, file.bands)
    }
}

impl ScoringConfig {
    pub fn new(weights: Vec<ComponentWeight>, bands: Vec<GradeBand>) -> Result<Self, ConfigError> {
        let weights = validate_weights(weights)?;
        let scale = GradeScale::new(bands)?;
        Ok(Self { weights, scale })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Same validation as `load`, for a config held in a settings row or a request.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(ConfigError::Document)
    }

    pub fn weights(&self) -> &[ComponentWeight] {
        &self.weights
    }

    pub fn weight_of(&self, component: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|w| w.component == component)
            .map(|w| w.weight)
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.weights.iter().map(|w| w.component.as_str())
    }

    pub fn scale(&self) -> &GradeScale {
        &self.scale
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let weights = vec![
            ComponentWeight {
                component: "assessment".to_string(),
                weight: 30.0,
            },
            ComponentWeight {
                component: "test".to_string(),
                weight: 20.0,
            },
            ComponentWeight {
                component: "exam".to_string(),
                weight: 50.0,
            },
        ];
        let scale = GradeScale {
            bands: vec![
                GradeBand::new("A+", 90.0, 100.0, 4.0),
                GradeBand::new("A", 85.0, 89.99, 4.0),
                GradeBand::new("A-", 80.0, 84.99, 3.7),
                GradeBand::new("B+", 75.0, 79.99, 3.3),
                GradeBand::new("B", 70.0, 74.99, 3.0),
                GradeBand::new("B-", 65.0, 69.99, 2.7),
                GradeBand::new("C+", 60.0, 64.99, 2.3),
                GradeBand::new("C", 55.0, 59.99, 2.0),
                GradeBand::new("C-", 50.0, 54.99, 1.7),
                GradeBand::new("D+", 45.0, 49.99, 1.3),
                GradeBand::new("D", 40.0, 44.99, 1.0),
                GradeBand::new("F", 0.0, 39.99, 0.0),
            ],
        };
        Self { weights, scale }
    }
}

fn validate_weights(weights: Vec<ComponentWeight>) -> Result<Vec<ComponentWeight>, ConfigError> {
    if weights.is_empty() {
        return Err(ConfigError::NoComponents);
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(weights.len());
    for w in weights {
        let component = w.component.trim().to_ascii_lowercase();
        if component.is_empty() {
            return Err(ConfigError::BlankComponent);
        }
        if !seen.insert(component.clone()) {
            return Err(ConfigError::DuplicateComponent(component));
        }
        if !w.weight.is_finite() || w.weight < 0.0 {
            return Err(ConfigError::InvalidWeight {
                component,
                weight: w.weight,
            });
        }
        out.push(ComponentWeight {
            component,
            weight: w.weight,
        });
    }

    let sum: f64 = out.iter().map(|w| w.weight).sum();
    if (sum - WEIGHT_SUM).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ConfigError::WeightSum { sum });
    }
    Ok(out)
}

/// Process-level settings read from the environment (and `.env`, if present).
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub log_level: String,
    pub scoring_config: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let log_level = non_empty_var("SCORINGD_LOG").unwrap_or_else(|| "info".to_string());
        Self {
            log_level,
            scoring_config: non_empty_var("SCORINGD_CONFIG").map(PathBuf::from),
            workspace: non_empty_var("SCORINGD_WORKSPACE").map(PathBuf::from),
        }
    }

    /// Config used for workspaces that have not stored their own.
    pub fn default_scoring(&self) -> Result<ScoringConfig, ConfigError> {
        match &self.scoring_config {
            Some(path) => ScoringConfig::load(path),
            None => Ok(ScoringConfig::default()),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
