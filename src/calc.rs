use crate::config::{ComponentWeight, GradeScale, ScoringConfig};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw marks for one component. `total == 0` means the component was not assessed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub total: f64,
}

impl ComponentScore {
    pub fn new(score: f64, total: f64) -> Self {
        Self { score, total }
    }

    pub fn is_assessed(&self) -> bool {
        self.total > 0.0
    }

    /// `"24/30"`, as printed on term reports.
    pub fn display(&self) -> String {
        format!("{}/{}", fmt_number(self.score), fmt_number(self.total))
    }
}

pub type Components = BTreeMap<String, ComponentScore>;

/// Two-decimal rounding (half away from zero), the resolution grade records are
/// stored and classified at.
pub fn round_2dp(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Shortest decimal form at two-decimal resolution: `24`, `24.5`, `24.25`.
pub fn fmt_number(x: f64) -> String {
    let s = format!("{:.2}", round_2dp(x));
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedComponent {
    pub component: String,
    pub weighted: f64,
}

fn exact_weighted(part: ComponentScore, weight: f64) -> f64 {
    if !part.is_assessed() {
        return 0.0;
    }
    part.score * weight / part.total
}

/// Contribution of one component, rounded for storage and display.
pub fn weighted_score(part: ComponentScore, weight: f64) -> f64 {
    round_2dp(exact_weighted(part, weight))
}

/// One entry per configured component, in config order. Components missing from
/// `components` count as not assessed; their weight is not redistributed.
pub fn weighted_scores(weights: &[ComponentWeight], components: &Components) -> Vec<WeightedComponent> {
    weights
        .iter()
        .map(|w| {
            let part = components.get(&w.component).copied().unwrap_or_default();
            WeightedComponent {
                component: w.component.clone(),
                weighted: weighted_score(part, w.weight),
            }
        })
        .collect()
}

/// Sum of the unrounded contributions, rounded once. Summing the rounded
/// `weighted_scores` instead can drift a hundredth across a band edge.
pub fn total_score(weights: &[ComponentWeight], components: &Components) -> f64 {
    let sum: f64 = weights
        .iter()
        .map(|w| {
            let part = components.get(&w.component).copied().unwrap_or_default();
            exact_weighted(part, w.weight)
        })
        .sum();
    round_2dp(sum)
}

/// Letter for a total, scanning bands highest first. Anything no band
/// contains (negative, above 100, NaN) falls back to the lowest band's letter.
pub fn classify(scale: &GradeScale, total_score: f64) -> &str {
    let score = round_2dp(total_score);
    scale
        .bands()
        .iter()
        .find(|b| b.contains(score))
        .map(|b| b.letter.as_str())
        .unwrap_or_else(|| scale.lowest().letter.as_str())
}

/// Derived fields of a grade record.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub weighted: Vec<WeightedComponent>,
    pub total_score: f64,
    pub grade_letter: String,
    pub grade_point: f64,
}

impl ScoreBreakdown {
    pub fn weighted_for(&self, component: &str) -> f64 {
        self.weighted
            .iter()
            .find(|w| w.component == component)
            .map(|w| w.weighted)
            .unwrap_or(0.0)
    }
}

impl Serialize for ScoreBreakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.weighted.len() + 3))?;
        for w in &self.weighted {
            map.serialize_entry(&format!("weighted_{}", w.component), &w.weighted)?;
        }
        map.serialize_entry("total_score", &self.total_score)?;
        map.serialize_entry("grade_letter", &self.grade_letter)?;
        map.serialize_entry("grade_point", &self.grade_point)?;
        map.end()
    }
}

/// Weighted components, total, letter and grade point for one record.
/// Input must already have passed `validate::validate`.
pub fn calculate(config: &ScoringConfig, components: &Components) -> ScoreBreakdown {
    let weighted = weighted_scores(config.weights(), components);
    let total_score = total_score(config.weights(), components);
    let grade_letter = classify(config.scale(), total_score).to_string();
    let grade_point = config.scale().points_for(&grade_letter).unwrap_or(0.0);
    ScoreBreakdown {
        weighted,
        total_score,
        grade_letter,
        grade_point,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(parts: &[(&str, f64, f64)]) -> Components {
        parts
            .iter()
            .map(|(c, s, t)| (c.to_string(), ComponentScore::new(*s, *t)))
            .collect()
    }

    #[test]
    fn worked_example_lands_on_a_minus() {
        let cfg = ScoringConfig::default();
        let b = calculate(
            &cfg,
            &components(&[("assessment", 24.0, 30.0), ("test", 16.0, 20.0), ("exam", 40.0, 50.0)]),
        );
        assert_eq!(b.weighted_for("assessment"), 24.0);
        assert_eq!(b.weighted_for("test"), 16.0);
        assert_eq!(b.weighted_for("exam"), 40.0);
        assert_eq!(b.total_score, 80.0);
        assert_eq!(b.grade_letter, "A-");
        assert_eq!(b.grade_point, 3.7);
    }

    #[test]
    fn full_marks_total_exactly_100() {
        let cfg = ScoringConfig::default();
        let b = calculate(
            &cfg,
            &components(&[("assessment", 37.3, 37.3), ("test", 7.0, 7.0), ("exam", 61.0, 61.0)]),
        );
        assert_eq!(b.total_score, 100.0);
        assert_eq!(b.grade_letter, "A+");
    }

    #[test]
    fn unassessed_component_contributes_zero_without_redistribution() {
        let cfg = ScoringConfig::default();
        let b = calculate(
            &cfg,
            &components(&[("assessment", 30.0, 30.0), ("test", 0.0, 0.0), ("exam", 50.0, 50.0)]),
        );
        assert_eq!(b.weighted_for("test"), 0.0);
        assert_eq!(b.total_score, 80.0);

        let missing = calculate(&cfg, &components(&[("exam", 25.0, 50.0)]));
        assert_eq!(missing.weighted.len(), 3);
        assert_eq!(missing.total_score, 25.0);
        assert_eq!(missing.grade_letter, "F");
    }

    #[test]
    fn total_rounds_once_over_unrounded_contributions() {
        let cfg = ScoringConfig::default();
        let parts = components(&[("assessment", 2.0, 7.0), ("test", 2.0, 7.0), ("exam", 5.0, 7.0)]);
        let b = calculate(&cfg, &parts);
        assert_eq!(b.weighted_for("assessment"), 8.57);
        assert_eq!(b.weighted_for("test"), 5.71);
        assert_eq!(b.weighted_for("exam"), 35.71);
        // The rounded parts add up to 49.99; the exact sum is 50.
        assert_eq!(b.total_score, 50.0);
        assert_eq!(b.grade_letter, "C-");
        assert_eq!(total_score(cfg.weights(), &parts), 50.0);
    }

    #[test]
    fn classify_is_inclusive_at_band_edges() {
        let scale = ScoringConfig::default().scale().clone();
        assert_eq!(classify(&scale, 84.99), "A-");
        assert_eq!(classify(&scale, 85.0), "A");
        assert_eq!(classify(&scale, 89.99), "A");
        assert_eq!(classify(&scale, 90.0), "A+");
        assert_eq!(classify(&scale, 100.0), "A+");
        assert_eq!(classify(&scale, 39.99), "F");
        assert_eq!(classify(&scale, 40.0), "D");
        assert_eq!(classify(&scale, 0.0), "F");
        // Sub-resolution totals round onto a band instead of falling in a seam.
        assert_eq!(classify(&scale, 84.996), "A");
        assert_eq!(classify(&scale, 84.994), "A-");
    }

    #[test]
    fn classify_falls_back_to_lowest_letter_for_malformed_totals() {
        let scale = ScoringConfig::default().scale().clone();
        assert_eq!(classify(&scale, -5.0), "F");
        assert_eq!(classify(&scale, 100.5), "F");
        assert_eq!(classify(&scale, f64::NAN), "F");
    }

    #[test]
    fn breakdown_serializes_flat_weighted_fields() {
        let cfg = ScoringConfig::default();
        let b = calculate(&cfg, &components(&[("exam", 45.0, 50.0)]));
        let v = serde_json::to_value(&b).expect("serialize");
        assert_eq!(v["weighted_assessment"], 0.0);
        assert_eq!(v["weighted_exam"], 45.0);
        assert_eq!(v["total_score"], 45.0);
        assert_eq!(v["grade_letter"], "D+");
    }

    #[test]
    fn number_formatting_trims_trailing_zeros() {
        assert_eq!(fmt_number(24.0), "24");
        assert_eq!(fmt_number(24.5), "24.5");
        assert_eq!(fmt_number(24.256), "24.26");
        assert_eq!(fmt_number(0.0), "0");
        assert_eq!(ComponentScore::new(16.0, 20.0).display(), "16/20");
    }
}
