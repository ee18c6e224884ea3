use crate::config::ScoringConfig;
use crate::record::{GradeInput, GradeRecord};
use crate::store::{GradeFilter, GradeStore, StoreResult};
use crate::validate::{self, Validation, ValidationIssue};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Submission {
    Saved { record: GradeRecord, created: bool },
    Rejected(Validation),
}

/// Validate, then create-or-load the record, merge the submitted components,
/// recompute and save. A rejected submission writes nothing.
pub fn submit_grade<S: GradeStore + ?Sized>(
    store: &S,
    config: &ScoringConfig,
    input: &GradeInput,
) -> StoreResult<Submission> {
    let validation = validate::validate(config, input);
    if !validation.is_valid {
        debug!(
            student_id = %input.key.student_id,
            subject_id = %input.key.subject_id,
            issues = validation.errors.len(),
            "grade submission rejected"
        );
        return Ok(Submission::Rejected(validation));
    }

    let (mut record, created) = store.get_or_create(&input.key)?;
    record.apply(config, input);
    store.save(&record)?;

    debug!(
        grade_id = %record.id,
        created,
        total_score = record.total_score(),
        grade_letter = record.grade_letter(),
        "grade saved"
    );
    Ok(Submission::Saved { record, created })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedInput {
    pub index: usize,
    pub errors: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub saved: Vec<GradeRecord>,
    pub rejected: Vec<RejectedInput>,
}

/// Each input stands alone: invalid ones are reported by position and skipped,
/// the rest are saved. A store error aborts the batch.
pub fn submit_batch<S: GradeStore + ?Sized>(
    store: &S,
    config: &ScoringConfig,
    inputs: &[GradeInput],
) -> StoreResult<BatchOutcome> {
    let mut out = BatchOutcome::default();
    for (index, input) in inputs.iter().enumerate() {
        match submit_grade(store, config, input)? {
            Submission::Saved { record, .. } => out.saved.push(record),
            Submission::Rejected(v) => out.rejected.push(RejectedInput {
                index,
                errors: v.errors,
            }),
        }
    }
    info!(
        saved = out.saved.len(),
        rejected = out.rejected.len(),
        "grade batch processed"
    );
    Ok(out)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RescoreOutcome {
    pub examined: usize,
    pub changed: usize,
}

/// Recompute every stored record under `config`, saving only those whose
/// derived fields moved.
pub fn rescore_all<S: GradeStore + ?Sized>(store: &S, config: &ScoringConfig) -> StoreResult<RescoreOutcome> {
    let records = store.list(&GradeFilter::default())?;
    let mut out = RescoreOutcome {
        examined: records.len(),
        changed: 0,
    };
    for mut record in records {
        if record.recalculate(config) {
            store.save(&record)?;
            out.changed += 1;
        }
    }
    info!(examined = out.examined, changed = out.changed, "grades rescored");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::ComponentScore;
    use crate::config::{ComponentWeight, ScoringConfig};
    use crate::db;
    use crate::record::GradeKey;
    use crate::store::SqliteGradeStore;

    fn input(student: &str, parts: &[(&str, f64, f64)]) -> GradeInput {
        let mut i = GradeInput {
            key: GradeKey {
                student_id: student.into(),
                class_id: "c1".into(),
                subject_id: "math".into(),
                academic_year: "2024/2025".into(),
                term: "1".into(),
            },
            ..Default::default()
        };
        for (c, s, t) in parts {
            i.components.insert(c.to_string(), ComponentScore::new(*s, *t));
        }
        i
    }

    fn count(conn: &rusqlite::Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM grades", [], |r| r.get(0))
            .expect("count")
    }

    #[test]
    fn end_to_end_submission_grades_a_minus() {
        let conn = db::open_in_memory().expect("db");
        let cfg = ScoringConfig::default();
        let store = SqliteGradeStore::new(&conn, &cfg);

        let res = submit_grade(
            &store,
            &cfg,
            &input("s1", &[("assessment", 24.0, 30.0), ("test", 16.0, 20.0), ("exam", 40.0, 50.0)]),
        )
        .expect("submit");
        let Submission::Saved { record, created } = res else {
            panic!("expected saved, got {res:?}");
        };
        assert!(created);
        assert_eq!(record.breakdown.weighted_for("assessment"), 24.0);
        assert_eq!(record.breakdown.weighted_for("test"), 16.0);
        assert_eq!(record.breakdown.weighted_for("exam"), 40.0);
        assert_eq!(record.total_score(), 80.0);
        assert_eq!(record.grade_letter(), "A-");
        assert_eq!(record.breakdown.grade_point, 3.7);
    }

    #[test]
    fn invalid_first_submission_creates_nothing() {
        let conn = db::open_in_memory().expect("db");
        let cfg = ScoringConfig::default();
        let store = SqliteGradeStore::new(&conn, &cfg);

        let res = submit_grade(&store, &cfg, &input("s1", &[("exam", 60.0, 50.0)])).expect("submit");
        assert!(matches!(res, Submission::Rejected(ref v) if !v.is_valid));
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn resubmission_updates_in_place() {
        let conn = db::open_in_memory().expect("db");
        let cfg = ScoringConfig::default();
        let store = SqliteGradeStore::new(&conn, &cfg);

        submit_grade(&store, &cfg, &input("s1", &[("assessment", 30.0, 30.0)])).expect("first");
        let res = submit_grade(&store, &cfg, &input("s1", &[("exam", 50.0, 50.0)])).expect("second");
        let Submission::Saved { record, created } = res else {
            panic!("expected saved");
        };
        assert!(!created);
        assert_eq!(record.total_score(), 80.0);
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn batch_skips_invalid_inputs_by_index() {
        let conn = db::open_in_memory().expect("db");
        let cfg = ScoringConfig::default();
        let store = SqliteGradeStore::new(&conn, &cfg);

        let out = submit_batch(
            &store,
            &cfg,
            &[
                input("s1", &[("exam", 45.0, 50.0)]),
                input("s2", &[("exam", -1.0, 50.0)]),
                input("s3", &[("test", 10.0, 20.0)]),
            ],
        )
        .expect("batch");
        assert_eq!(out.saved.len(), 2);
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].index, 1);
        assert_eq!(count(&conn), 2);
    }

    #[test]
    fn rescore_applies_a_new_weighting() {
        let conn = db::open_in_memory().expect("db");
        let cfg = ScoringConfig::default();
        let store = SqliteGradeStore::new(&conn, &cfg);
        submit_grade(
            &store,
            &cfg,
            &input("s1", &[("assessment", 30.0, 30.0), ("test", 0.0, 20.0), ("exam", 25.0, 50.0)]),
        )
        .expect("submit");
        submit_grade(&store, &cfg, &input("s2", &[("assessment", 0.0, 30.0)])).expect("submit");

        let exam_heavy = ScoringConfig::new(
            vec![
                ComponentWeight {
                    component: "assessment".into(),
                    weight: 10.0,
                },
                ComponentWeight {
                    component: "test".into(),
                    weight: 10.0,
                },
                ComponentWeight {
                    component: "exam".into(),
                    weight: 80.0,
                },
            ],
            cfg.scale().bands().to_vec(),
        )
        .expect("config");
        let store = SqliteGradeStore::new(&conn, &exam_heavy);
        let out = rescore_all(&store, &exam_heavy).expect("rescore");
        assert_eq!(out, RescoreOutcome { examined: 2, changed: 1 });

        let all = store.list(&GradeFilter::student("s1")).expect("list");
        assert_eq!(all[0].total_score(), 50.0);
        assert_eq!(all[0].grade_letter(), "C-");
    }
}
