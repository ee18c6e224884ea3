use crate::aggregate;
use crate::config::ScoringConfig;
use crate::record::{GradeKey, GradeRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const RANK_PLACEHOLDER: &str = "—";
pub const TOP_PERFORMER_CUTOFF: u32 = 3;

/// One class in one academic year and term: the population a rank is taken over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CohortKey {
    pub class_id: String,
    pub academic_year: String,
    pub term: String,
}

impl CohortKey {
    pub fn of(key: &GradeKey) -> Self {
        Self {
            class_id: key.class_id.clone(),
            academic_year: key.academic_year.clone(),
            term: key.term.clone(),
        }
    }

    pub fn contains(&self, key: &GradeKey) -> bool {
        key.in_cohort(&self.class_id, &self.academic_year, &self.term)
    }
}

/// Derived standing; recomputed from the records on every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingEntry {
    pub student_id: String,
    pub average_score: f64,
    pub gpa: f64,
    pub subjects: usize,
    pub rank: u32,
    pub rank_display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectRanking {
    pub subject_id: String,
    pub entries: Vec<RankingEntry>,
}

/// Highest average first, then higher GPA, then student id ascending. The last
/// key makes the order total, so equal scores never depend on input order.
fn standing_order(a: &RankingEntry, b: &RankingEntry) -> Ordering {
    b.average_score
        .partial_cmp(&a.average_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.gpa.partial_cmp(&a.gpa).unwrap_or(Ordering::Equal))
        .then_with(|| a.student_id.cmp(&b.student_id))
}

fn rank_groups(config: &ScoringConfig, groups: BTreeMap<String, Vec<&GradeRecord>>) -> Vec<RankingEntry> {
    let mut entries: Vec<RankingEntry> = groups
        .into_iter()
        .map(|(student_id, records)| RankingEntry {
            student_id,
            average_score: aggregate::average_score(records.iter().copied()),
            gpa: aggregate::gpa(config.scale(), records.iter().map(|r| r.grade_letter())),
            subjects: records.len(),
            rank: 0,
            rank_display: String::new(),
        })
        .collect();

    entries.sort_by(standing_order);

    // Sequential: equal averages still get distinct ranks, decided by the tie-break.
    for (idx, entry) in entries.iter_mut().enumerate() {
        entry.rank = (idx + 1) as u32;
        entry.rank_display = format_rank(entry.rank);
    }
    entries
}

/// Class standing for one cohort. Enrolled students without any record in the
/// cohort are still ranked, with average and GPA of 0.
pub fn rank_cohort(
    config: &ScoringConfig,
    cohort: &CohortKey,
    records: &[GradeRecord],
    enrolled: &[String],
) -> Vec<RankingEntry> {
    let mut groups: BTreeMap<String, Vec<&GradeRecord>> = BTreeMap::new();
    for student_id in enrolled {
        groups.entry(student_id.clone()).or_default();
    }
    for r in records.iter().filter(|r| cohort.contains(&r.key)) {
        groups.entry(r.key.student_id.clone()).or_default().push(r);
    }
    rank_groups(config, groups)
}

/// Standing within one subject of a cohort; only students with a record in
/// that subject take part.
pub fn rank_subject(
    config: &ScoringConfig,
    cohort: &CohortKey,
    subject_id: &str,
    records: &[GradeRecord],
) -> Vec<RankingEntry> {
    let mut groups: BTreeMap<String, Vec<&GradeRecord>> = BTreeMap::new();
    for r in records
        .iter()
        .filter(|r| cohort.contains(&r.key) && r.key.subject_id == subject_id)
    {
        groups.entry(r.key.student_id.clone()).or_default().push(r);
    }
    rank_groups(config, groups)
}

/// Subject standings for every subject that has records in the cohort,
/// ordered by subject id.
pub fn rank_subjects(config: &ScoringConfig, cohort: &CohortKey, records: &[GradeRecord]) -> Vec<SubjectRanking> {
    let mut subject_ids: Vec<&str> = records
        .iter()
        .filter(|r| cohort.contains(&r.key))
        .map(|r| r.key.subject_id.as_str())
        .collect();
    subject_ids.sort_unstable();
    subject_ids.dedup();

    subject_ids
        .into_iter()
        .map(|subject_id| SubjectRanking {
            subject_id: subject_id.to_string(),
            entries: rank_subject(config, cohort, subject_id, records),
        })
        .collect()
}

pub fn rank_of(entries: &[RankingEntry], student_id: &str) -> Option<u32> {
    entries
        .iter()
        .find(|e| e.student_id == student_id)
        .map(|e| e.rank)
}

pub fn is_top_performer(rank: u32) -> bool {
    (1..=TOP_PERFORMER_CUTOFF).contains(&rank)
}

/// English ordinal (`1st`, `12th`, `22nd`); rank 0 renders as the placeholder.
pub fn format_rank(rank: u32) -> String {
    if rank == 0 {
        return RANK_PLACEHOLDER.to_string();
    }
    let suffix = match (rank % 100, rank % 10) {
        (11..=13, _) => "th",
        (_, 1) => "st",
        (_, 2) => "nd",
        (_, 3) => "rd",
        _ => "th",
    };
    format!("{rank}{suffix}")
}

pub fn format_rank_opt(rank: Option<u32>) -> String {
    rank.map(format_rank)
        .unwrap_or_else(|| RANK_PLACEHOLDER.to_string())
}

/// Mean total score for one subject across a cohort, two decimals.
pub fn subject_average(cohort: &CohortKey, subject_id: &str, records: &[GradeRecord]) -> f64 {
    aggregate::average_score(
        records
            .iter()
            .filter(|r| cohort.contains(&r.key) && r.key.subject_id == subject_id),
    )
}
