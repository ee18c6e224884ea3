use crate::calc::{ComponentScore, Components, ScoreBreakdown, WeightedComponent};
use crate::config::ScoringConfig;
use crate::ranking::CohortKey;
use crate::record::{GradeKey, GradeRecord};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("grade record {0} does not exist")]
    Missing(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Equality filter over the grade tuple; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeFilter {
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub academic_year: Option<String>,
    #[serde(default)]
    pub term: Option<String>,
}

impl GradeFilter {
    pub fn cohort(cohort: &CohortKey) -> Self {
        Self {
            class_id: Some(cohort.class_id.clone()),
            academic_year: Some(cohort.academic_year.clone()),
            term: Some(cohort.term.clone()),
            ..Default::default()
        }
    }

    pub fn student(student_id: &str) -> Self {
        Self {
            student_id: Some(student_id.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, key: &GradeKey) -> bool {
        let ok = |want: &Option<String>, have: &str| want.as_deref().map_or(true, |w| w == have);
        ok(&self.student_id, &key.student_id)
            && ok(&self.class_id, &key.class_id)
            && ok(&self.subject_id, &key.subject_id)
            && ok(&self.academic_year, &key.academic_year)
            && ok(&self.term, &key.term)
    }

    fn columns(&self) -> [(&'static str, Option<&str>); 5] {
        [
            ("student_id", self.student_id.as_deref()),
            ("class_id", self.class_id.as_deref()),
            ("subject_id", self.subject_id.as_deref()),
            ("academic_year", self.academic_year.as_deref()),
            ("term", self.term.as_deref()),
        ]
    }
}

/// Persistence boundary the engine reads and writes grade records through.
pub trait GradeStore {
    /// Idempotent: returns the stored record for `key`, creating a blank,
    /// fully computed one if none exists. `created` tells which happened.
    fn get_or_create(&self, key: &GradeKey) -> StoreResult<(GradeRecord, bool)>;

    fn find(&self, key: &GradeKey) -> StoreResult<Option<GradeRecord>>;

    fn list(&self, filter: &GradeFilter) -> StoreResult<Vec<GradeRecord>>;

    /// Writes marks and derived fields of an existing record in place.
    fn save(&self, record: &GradeRecord) -> StoreResult<()>;
}

pub struct SqliteGradeStore<'a> {
    conn: &'a Connection,
    config: &'a ScoringConfig,
}

const GRADE_COLUMNS: &str = "id, student_id, class_id, subject_id, academic_year, term,
     total_score, grade_letter, grade_point, remarks, grade_date, created_at, updated_at";

struct GradeRow {
    id: String,
    key: GradeKey,
    total_score: f64,
    grade_letter: String,
    grade_point: f64,
    remarks: Option<String>,
    grade_date: Option<String>,
    created_at: String,
    updated_at: String,
}

fn grade_row(r: &Row<'_>) -> rusqlite::Result<GradeRow> {
    Ok(GradeRow {
        id: r.get(0)?,
        key: GradeKey {
            student_id: r.get(1)?,
            class_id: r.get(2)?,
            subject_id: r.get(3)?,
            academic_year: r.get(4)?,
            term: r.get(5)?,
        },
        total_score: r.get(6)?,
        grade_letter: r.get(7)?,
        grade_point: r.get(8)?,
        remarks: r.get(9)?,
        grade_date: r.get(10)?,
        created_at: r.get(11)?,
        updated_at: r.get(12)?,
    })
}

impl<'a> SqliteGradeStore<'a> {
    /// `conn` may be a `rusqlite::Transaction`; the store never commits on its own.
    pub fn new(conn: &'a Connection, config: &'a ScoringConfig) -> Self {
        Self { conn, config }
    }

    fn hydrate(&self, rows: Vec<GradeRow>) -> StoreResult<Vec<GradeRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT component, score, total, weighted
             FROM grade_components
             WHERE grade_id = ?
             ORDER BY component",
        )?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let parts = stmt
                .query_map([&row.id], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        ComponentScore::new(r.get(1)?, r.get(2)?),
                        r.get::<_, f64>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut components = Components::new();
            let mut stored_weighted: HashMap<String, f64> = HashMap::new();
            for (name, part, weighted) in parts {
                stored_weighted.insert(name.clone(), weighted);
                components.insert(name, part);
            }
            let weighted = self
                .config
                .components()
                .map(|c| {
                    components.entry(c.to_string()).or_default();
                    WeightedComponent {
                        component: c.to_string(),
                        weighted: stored_weighted.get(c).copied().unwrap_or(0.0),
                    }
                })
                .collect();

            out.push(GradeRecord {
                id: row.id,
                key: row.key,
                components,
                breakdown: ScoreBreakdown {
                    weighted,
                    total_score: row.total_score,
                    grade_letter: row.grade_letter,
                    grade_point: row.grade_point,
                },
                remarks: row.remarks,
                grade_date: row.grade_date,
                created_at: row.created_at,
                updated_at: row.updated_at,
            });
        }
        Ok(out)
    }

    fn write_components(&self, record: &GradeRecord) -> StoreResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO grade_components(grade_id, component, score, total, weighted)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(grade_id, component) DO UPDATE SET
               score = excluded.score,
               total = excluded.total,
               weighted = excluded.weighted",
        )?;
        for (name, part) in &record.components {
            let weighted = record.breakdown.weighted_for(name);
            stmt.execute(params![record.id, name, part.score, part.total, weighted])?;
        }
        Ok(())
    }
}

impl GradeStore for SqliteGradeStore<'_> {
    fn get_or_create(&self, key: &GradeKey) -> StoreResult<(GradeRecord, bool)> {
        let blank = GradeRecord::blank(self.config, key.clone());
        // The UNIQUE tuple decides creation, so concurrent first submissions
        // cannot both insert.
        let inserted = self.conn.execute(
            "INSERT INTO grades(id, student_id, class_id, subject_id, academic_year, term,
                                total_score, grade_letter, grade_point, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, class_id, subject_id, academic_year, term) DO NOTHING",
            params![
                blank.id,
                key.student_id,
                key.class_id,
                key.subject_id,
                key.academic_year,
                key.term,
                blank.breakdown.total_score,
                blank.breakdown.grade_letter,
                blank.breakdown.grade_point,
                blank.created_at,
                blank.updated_at,
            ],
        )?;
        if inserted == 1 {
            self.write_components(&blank)?;
            return Ok((blank, true));
        }

        let existing = self
            .find(key)?
            .ok_or_else(|| StoreError::Missing(format!("{key:?}")))?;
        Ok((existing, false))
    }

    fn find(&self, key: &GradeKey) -> StoreResult<Option<GradeRecord>> {
        let sql = format!(
            "SELECT {GRADE_COLUMNS}
             FROM grades
             WHERE student_id = ? AND class_id = ? AND subject_id = ? AND academic_year = ? AND term = ?"
        );
        let row = self
            .conn
            .query_row(
                &sql,
                params![
                    key.student_id,
                    key.class_id,
                    key.subject_id,
                    key.academic_year,
                    key.term
                ],
                grade_row,
            )
            .optional()?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row])?.pop()),
            None => Ok(None),
        }
    }

    fn list(&self, filter: &GradeFilter) -> StoreResult<Vec<GradeRecord>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();
        for (column, value) in filter.columns() {
            if let Some(v) = value {
                clauses.push(format!("{column} = ?"));
                bind_values.push(Value::Text(v.to_string()));
            }
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {GRADE_COLUMNS}
             FROM grades
             {where_sql}
             ORDER BY academic_year, term, class_id, subject_id, student_id"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bind_values), grade_row)?
            .collect::<Result<Vec<_>, _>>()?;
        self.hydrate(rows)
    }

    fn save(&self, record: &GradeRecord) -> StoreResult<()> {
        let updated = self.conn.execute(
            "UPDATE grades SET
               total_score = ?, grade_letter = ?, grade_point = ?,
               remarks = ?, grade_date = ?, updated_at = ?
             WHERE id = ?",
            params![
                record.breakdown.total_score,
                record.breakdown.grade_letter,
                record.breakdown.grade_point,
                record.remarks,
                record.grade_date,
                record.updated_at,
                record.id,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::Missing(record.id.clone()));
        }
        self.write_components(record)
    }
}
