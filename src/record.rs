use crate::calc::{self, ComponentScore, Components, ScoreBreakdown};
use crate::config::ScoringConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The unique tuple a grade record is stored under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GradeKey {
    pub student_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub academic_year: String,
    pub term: String,
}

impl GradeKey {
    pub fn in_cohort(&self, class_id: &str, academic_year: &str, term: &str) -> bool {
        self.class_id == class_id && self.academic_year == academic_year && self.term == term
    }
}

/// A submission for one tuple. Only the components present are replaced on an
/// existing record; the rest keep their stored marks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeInput {
    #[serde(flatten)]
    pub key: GradeKey,
    #[serde(default)]
    pub components: Components,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub grade_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeRecord {
    pub id: String,
    #[serde(flatten)]
    pub key: GradeKey,
    pub components: Components,
    #[serde(flatten)]
    pub breakdown: ScoreBreakdown,
    pub remarks: Option<String>,
    pub grade_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl GradeRecord {
    /// A first-submission record: every configured component at `0/0`, fully computed.
    pub fn blank(config: &ScoringConfig, key: GradeKey) -> Self {
        let components: Components = config
            .components()
            .map(|c| (c.to_string(), ComponentScore::default()))
            .collect();
        let breakdown = calc::calculate(config, &components);
        let now = now_timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            key,
            components,
            breakdown,
            remarks: None,
            grade_date: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Merge a validated submission and recompute every derived field.
    pub fn apply(&mut self, config: &ScoringConfig, input: &GradeInput) {
        for (name, part) in &input.components {
            self.components.insert(name.clone(), *part);
        }
        if input.remarks.is_some() {
            self.remarks = input.remarks.clone();
        }
        if input.grade_date.is_some() {
            self.grade_date = input.grade_date.clone();
        }
        self.breakdown = calc::calculate(config, &self.components);
        self.updated_at = now_timestamp();
    }

    /// Recompute under `config`; returns whether any derived field changed.
    pub fn recalculate(&mut self, config: &ScoringConfig) -> bool {
        for c in config.components() {
            self.components.entry(c.to_string()).or_default();
        }
        let next = calc::calculate(config, &self.components);
        if next == self.breakdown {
            return false;
        }
        self.breakdown = next;
        self.updated_at = now_timestamp();
        true
    }

    pub fn total_score(&self) -> f64 {
        self.breakdown.total_score
    }

    pub fn grade_letter(&self) -> &str {
        &self.breakdown.grade_letter
    }
}
