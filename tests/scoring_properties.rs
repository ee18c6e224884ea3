use scoringd::aggregate;
use scoringd::calc::{self, round_2dp, ComponentScore, Components};
use scoringd::config::ScoringConfig;
use scoringd::ranking::{self, CohortKey};
use scoringd::record::{GradeInput, GradeKey, GradeRecord};
use serde_json::json;

fn components(parts: &[(&str, f64, f64)]) -> Components {
    parts
        .iter()
        .map(|(c, s, t)| (c.to_string(), ComponentScore::new(*s, *t)))
        .collect()
}

fn record(cfg: &ScoringConfig, student: &str, subject: &str, exam: f64) -> GradeRecord {
    let key = GradeKey {
        student_id: student.into(),
        class_id: "c1".into(),
        subject_id: subject.into(),
        academic_year: "2024/2025".into(),
        term: "1".into(),
    };
    let mut r = GradeRecord::blank(cfg, key.clone());
    r.apply(
        cfg,
        &GradeInput {
            key,
            components: components(&[("exam", exam, 100.0)]),
            ..Default::default()
        },
    );
    r
}

#[test]
fn classifier_is_total_over_every_hundredth() {
    let cfg = ScoringConfig::default();
    let scale = cfg.scale();
    for hundredths in 0..=10_000u32 {
        let s = f64::from(hundredths) / 100.0;
        let hits = scale.bands().iter().filter(|b| b.contains(s)).count();
        assert_eq!(hits, 1, "score {s} matched {hits} bands");
        assert_eq!(scale.classify(s), calc::classify(scale, s));
    }
    assert_eq!(scale.classify(84.99), "A-");
    assert_eq!(scale.classify(85.0), "A");
    assert_eq!(scale.classify(39.99), "F");
    assert_eq!(scale.classify(40.0), "D");
    assert_eq!(scale.classify(-3.0), "F");
    assert_eq!(scale.classify(100.5), "F");
    assert_eq!(scale.classify(f64::NAN), "F");
}

fn custom_config(bands: serde_json::Value) -> ScoringConfig {
    ScoringConfig::from_json(json!({
        "weights": [{ "component": "exam", "weight": 100 }],
        "bands": bands,
    }))
    .expect("valid scale")
}

#[test]
fn custom_scales_cover_every_hundredth_exactly_once() {
    let scales = [
        custom_config(json!([
            { "letter": "F", "min": 0, "max": 49.99, "points": 0.0 },
            { "letter": "P", "min": 50, "max": 100, "points": 4.0 }
        ])),
        custom_config(json!([
            { "letter": "Pass", "min": 50, "max": 100, "points": 4.0 },
            { "letter": "Fail", "min": 0, "max": 49.99, "points": 0.0 }
        ])),
        custom_config(json!([
            { "letter": "F", "min": 0, "max": 49.99, "points": 0.0 },
            { "letter": "B", "min": 50, "max": 74.99, "points": 3.0 },
            { "letter": "A", "min": 75, "max": 100, "points": 4.0 }
        ])),
        custom_config(json!([
            { "letter": "A", "min": 70, "max": 100, "points": 4.0 },
            { "letter": "B", "min": 60, "max": 69.99, "points": 3.0 },
            { "letter": "C", "min": 50.01, "max": 59.99, "points": 2.0 },
            { "letter": "D", "min": 0.01, "max": 50, "points": 1.0 },
            { "letter": "E", "min": 0, "max": 0, "points": 0.0 }
        ])),
        custom_config(json!([{ "letter": "P", "min": 0, "max": 100, "points": 4.0 }])),
    ];
    for cfg in &scales {
        let scale = cfg.scale();
        for hundredths in 0..=10_000u32 {
            let s = f64::from(hundredths) / 100.0;
            let hits: Vec<&str> = scale
                .bands()
                .iter()
                .filter(|b| b.contains(s))
                .map(|b| b.letter.as_str())
                .collect();
            assert_eq!(hits.len(), 1, "score {s} matched {hits:?}");
            assert_eq!(scale.classify(s), hits[0]);
        }
    }
}

#[test]
fn weights_are_conserved_for_fully_assessed_records() {
    let cfg = ScoringConfig::default();
    let full = calc::calculate(
        &cfg,
        &components(&[("assessment", 30.0, 30.0), ("test", 20.0, 20.0), ("exam", 50.0, 50.0)]),
    );
    assert_eq!(full.total_score, 100.0);
    assert_eq!(full.grade_letter, "A+");

    for (a, t, e) in [(12.0, 7.0, 33.0), (29.0, 1.0, 48.5), (0.0, 20.0, 0.0), (8.0, 3.0, 41.0)] {
        let b = calc::calculate(
            &cfg,
            &components(&[("assessment", a, 30.0), ("test", t, 20.0), ("exam", e, 50.0)]),
        );
        let exact = a * 30.0 / 30.0 + t * 20.0 / 20.0 + e * 50.0 / 50.0;
        assert_eq!(b.total_score, round_2dp(exact));
    }

    // Thirds and sevenths do not land on hundredths; the total still rounds
    // from the exact sum rather than from the rounded parts.
    let b = calc::calculate(
        &cfg,
        &components(&[("assessment", 2.0, 7.0), ("test", 2.0, 7.0), ("exam", 5.0, 7.0)]),
    );
    let rounded_parts: f64 = b.weighted.iter().map(|w| w.weighted).sum();
    assert_eq!(round_2dp(rounded_parts), 49.99);
    assert_eq!(b.total_score, 50.0);
    assert_eq!(b.grade_letter, "C-");

    let b = calc::calculate(
        &cfg,
        &components(&[("assessment", 1.0, 3.0), ("test", 1.0, 3.0), ("exam", 1.0, 3.0)]),
    );
    let exact = 1.0 * 30.0 / 3.0 + 1.0 * 20.0 / 3.0 + 1.0 * 50.0 / 3.0;
    assert_eq!(b.total_score, round_2dp(exact));
    assert_eq!(b.total_score, 33.33);
}

#[test]
fn end_to_end_example_grades_a_minus() {
    let cfg = ScoringConfig::default();
    let b = calc::calculate(
        &cfg,
        &components(&[("assessment", 24.0, 30.0), ("test", 16.0, 20.0), ("exam", 40.0, 50.0)]),
    );
    let weighted: Vec<f64> = b.weighted.iter().map(|w| w.weighted).collect();
    assert_eq!(weighted, vec![24.0, 16.0, 40.0]);
    assert_eq!(b.total_score, 80.0);
    assert_eq!(b.grade_letter, "A-");
    assert_eq!(b.grade_point, 3.7);
}

#[test]
fn gpa_stays_within_bounds() {
    let cfg = ScoringConfig::default();
    let letters: Vec<&str> = cfg.scale().letters().collect();
    for n in 1..=letters.len() {
        let g = aggregate::gpa(cfg.scale(), letters.iter().take(n).copied());
        assert!((0.0..=4.0).contains(&g), "gpa {g}");
    }
    assert_eq!(aggregate::gpa(cfg.scale(), std::iter::empty::<&str>()), 0.0);
}

#[test]
fn ranking_ignores_input_order() {
    let cfg = ScoringConfig::default();
    let cohort = CohortKey {
        class_id: "c1".into(),
        academic_year: "2024/2025".into(),
        term: "1".into(),
    };
    let mut records = vec![
        record(&cfg, "s3", "math", 70.0),
        record(&cfg, "s1", "math", 70.0),
        record(&cfg, "s2", "math", 85.0),
        record(&cfg, "s4", "math", 55.0),
        record(&cfg, "s4", "eng", 85.0),
    ];
    let enrolled = vec!["s5".to_string()];
    let baseline = ranking::rank_cohort(&cfg, &cohort, &records, &enrolled);

    for _ in 0..records.len() {
        records.rotate_left(1);
        let again = ranking::rank_cohort(&cfg, &cohort, &records, &enrolled);
        assert_eq!(again, baseline);
    }
    records.reverse();
    assert_eq!(ranking::rank_cohort(&cfg, &cohort, &records, &enrolled), baseline);

    let order: Vec<(&str, u32)> = baseline
        .iter()
        .map(|e| (e.student_id.as_str(), e.rank))
        .collect();
    // s1, s3 and s4 all average 35; s4 has the better GPA, then student id decides.
    assert_eq!(order, vec![("s2", 1), ("s4", 2), ("s1", 3), ("s3", 4), ("s5", 5)]);
}

#[test]
fn ordinals_follow_english_suffix_rules() {
    let cases = [
        (1, "1st"),
        (2, "2nd"),
        (3, "3rd"),
        (4, "4th"),
        (11, "11th"),
        (12, "12th"),
        (13, "13th"),
        (21, "21st"),
        (22, "22nd"),
        (101, "101st"),
        (111, "111th"),
        (0, "—"),
    ];
    for (n, expected) in cases {
        assert_eq!(ranking::format_rank(n), expected);
    }
    assert_eq!(ranking::format_rank_opt(None), "—");
}
