use crate::aggregate::{self, GradeDistribution};
use crate::config::ScoringConfig;
use crate::ranking::{self, CohortKey};
use crate::record::GradeRecord;
use crate::roster::{ClassInfo, StudentInfo, SubjectInfo};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("grade {grade_id} has letter '{letter}', which the active grade scale does not define")]
    UnknownGradeLetter { grade_id: String, letter: String },
}

/// Refuse to report over records classified under some other scale. A partial
/// or mis-weighted report is worse than none.
pub fn ensure_consistent<'a, I>(config: &ScoringConfig, records: I) -> Result<(), ReportError>
where
    I: IntoIterator<Item = &'a GradeRecord>,
{
    for r in records {
        if !config.scale().contains_letter(r.grade_letter()) {
            return Err(ReportError::UnknownGradeLetter {
                grade_id: r.id.clone(),
                letter: r.grade_letter().to_string(),
            });
        }
    }
    Ok(())
}

/// Optional academic year / term restriction for a transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportScope {
    #[serde(default)]
    pub academic_year: Option<String>,
    #[serde(default)]
    pub term: Option<String>,
}

impl ReportScope {
    pub fn matches(&self, record: &GradeRecord) -> bool {
        self.academic_year
            .as_deref()
            .map_or(true, |y| y == record.key.academic_year)
            && self.term.as_deref().map_or(true, |t| t == record.key.term)
    }
}

fn leading_number(s: &str) -> Option<u64> {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// "Term 2" before "Term 10"; labels without digits sort as plain text after
/// numbered ones.
pub fn term_order(a: &str, b: &str) -> Ordering {
    match (leading_number(a), leading_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

struct SubjectCatalog<'a> {
    by_id: HashMap<&'a str, &'a SubjectInfo>,
}

impl<'a> SubjectCatalog<'a> {
    fn new(subjects: &'a [SubjectInfo]) -> Self {
        Self {
            by_id: subjects.iter().map(|s| (s.id.as_str(), s)).collect(),
        }
    }

    /// Unknown subjects print their id as the name.
    fn name(&self, subject_id: &str) -> String {
        self.by_id
            .get(subject_id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| subject_id.to_string())
    }

    fn code(&self, subject_id: &str) -> Option<String> {
        self.by_id.get(subject_id).and_then(|s| s.code.clone())
    }

    fn sort(&self, records: &mut [&GradeRecord]) {
        records.sort_by(|a, b| {
            self.name(&a.key.subject_id)
                .cmp(&self.name(&b.key.subject_id))
                .then_with(|| a.key.subject_id.cmp(&b.key.subject_id))
        });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentLine {
    pub component: String,
    pub score: f64,
    pub total: f64,
    pub display: String,
}

fn component_lines(config: &ScoringConfig, record: &GradeRecord) -> Vec<ComponentLine> {
    config
        .components()
        .map(|c| {
            let part = record.components.get(c).copied().unwrap_or_default();
            ComponentLine {
                component: c.to_string(),
                score: part.score,
                total: part.total,
                display: part.display(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermSubjectLine {
    pub subject_id: String,
    pub subject_name: String,
    pub subject_code: Option<String>,
    pub components: Vec<ComponentLine>,
    pub total_score: f64,
    pub grade_letter: String,
    pub grade_point: f64,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermSummary {
    pub total_subjects: usize,
    pub gpa: f64,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermReport {
    pub student: String,
    pub student_id: String,
    pub academic_year: String,
    pub term: String,
    pub subjects: Vec<TermSubjectLine>,
    pub summary: TermSummary,
}

/// One student's subjects for one academic year and term.
pub fn term_report(
    config: &ScoringConfig,
    student: &StudentInfo,
    subjects: &[SubjectInfo],
    records: &[GradeRecord],
    academic_year: &str,
    term: &str,
) -> Result<TermReport, ReportError> {
    let mut selected: Vec<&GradeRecord> = records
        .iter()
        .filter(|r| {
            r.key.student_id == student.id && r.key.academic_year == academic_year && r.key.term == term
        })
        .collect();
    ensure_consistent(config, selected.iter().copied())?;

    let catalog = SubjectCatalog::new(subjects);
    catalog.sort(&mut selected);

    let lines = selected
        .iter()
        .map(|r| TermSubjectLine {
            subject_id: r.key.subject_id.clone(),
            subject_name: catalog.name(&r.key.subject_id),
            subject_code: catalog.code(&r.key.subject_id),
            components: component_lines(config, r),
            total_score: r.total_score(),
            grade_letter: r.grade_letter().to_string(),
            grade_point: r.breakdown.grade_point,
            remarks: r.remarks.clone(),
        })
        .collect();

    let summary = aggregate::summarize(config.scale(), selected.iter().copied());
    Ok(TermReport {
        student: student.full_name(),
        student_id: student.id.clone(),
        academic_year: academic_year.to_string(),
        term: term.to_string(),
        subjects: lines,
        summary: TermSummary {
            total_subjects: summary.total_subjects,
            gpa: summary.gpa,
            average_score: summary.average_score,
        },
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummaryInfo {
    pub id: String,
    pub student_no: Option<String>,
    pub full_name: String,
    pub email: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcademicInfo {
    pub gpa: f64,
    pub total_subjects: usize,
    pub average_score: f64,
    pub grade_distribution: GradeDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptSubject {
    pub subject_id: String,
    pub subject_name: String,
    pub subject_code: Option<String>,
    pub total_score: f64,
    pub grade_letter: String,
    pub grade_point: f64,
    pub subject_rank: Option<u32>,
    pub subject_rank_display: String,
    pub class_average: f64,
    pub top_performer: bool,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptTerm {
    pub class_id: String,
    pub academic_year: String,
    pub term: String,
    pub rank: Option<u32>,
    pub rank_display: String,
    pub total_students: usize,
    pub gpa: f64,
    pub average_score: f64,
    pub subjects: Vec<TranscriptSubject>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub student_info: StudentSummaryInfo,
    pub academic_info: AcademicInfo,
    pub terms: Vec<TranscriptTerm>,
}

/// A student's record across terms, with class and subject standing per term.
///
/// `cohort_records` must hold every record of each cohort the student appears
/// in, since ranks are taken over the whole class. `enrollments` maps class id
/// to enrolled student ids.
pub fn transcript(
    config: &ScoringConfig,
    student: &StudentInfo,
    subjects: &[SubjectInfo],
    cohort_records: &[GradeRecord],
    enrollments: &BTreeMap<String, Vec<String>>,
    scope: &ReportScope,
) -> Result<Transcript, ReportError> {
    let own: Vec<&GradeRecord> = cohort_records
        .iter()
        .filter(|r| r.key.student_id == student.id && scope.matches(r))
        .collect();

    let mut cohorts: Vec<CohortKey> = own.iter().map(|r| CohortKey::of(&r.key)).collect();
    cohorts.sort_by(|a, b| {
        a.academic_year
            .cmp(&b.academic_year)
            .then_with(|| term_order(&a.term, &b.term))
            .then_with(|| a.class_id.cmp(&b.class_id))
    });
    cohorts.dedup();

    ensure_consistent(
        config,
        cohort_records
            .iter()
            .filter(|r| cohorts.iter().any(|c| c.contains(&r.key))),
    )?;

    let catalog = SubjectCatalog::new(subjects);
    let no_one: Vec<String> = Vec::new();
    let mut terms = Vec::with_capacity(cohorts.len());
    for cohort in cohorts {
        let enrolled = enrollments.get(&cohort.class_id).unwrap_or(&no_one);
        let standing = ranking::rank_cohort(config, &cohort, cohort_records, enrolled);
        let rank = ranking::rank_of(&standing, &student.id);
        let subject_rankings = ranking::rank_subjects(config, &cohort, cohort_records);

        let mut term_records: Vec<&GradeRecord> = own
            .iter()
            .copied()
            .filter(|r| cohort.contains(&r.key))
            .collect();
        catalog.sort(&mut term_records);

        let lines = term_records
            .iter()
            .map(|r| {
                let subject_rank = subject_rankings
                    .iter()
                    .find(|s| s.subject_id == r.key.subject_id)
                    .and_then(|s| ranking::rank_of(&s.entries, &student.id));
                TranscriptSubject {
                    subject_id: r.key.subject_id.clone(),
                    subject_name: catalog.name(&r.key.subject_id),
                    subject_code: catalog.code(&r.key.subject_id),
                    total_score: r.total_score(),
                    grade_letter: r.grade_letter().to_string(),
                    grade_point: r.breakdown.grade_point,
                    subject_rank,
                    subject_rank_display: ranking::format_rank_opt(subject_rank),
                    class_average: ranking::subject_average(&cohort, &r.key.subject_id, cohort_records),
                    top_performer: subject_rank.is_some_and(ranking::is_top_performer),
                    remarks: r.remarks.clone(),
                }
            })
            .collect();

        let summary = aggregate::summarize(config.scale(), term_records.iter().copied());
        terms.push(TranscriptTerm {
            class_id: cohort.class_id.clone(),
            academic_year: cohort.academic_year.clone(),
            term: cohort.term.clone(),
            rank,
            rank_display: ranking::format_rank_opt(rank),
            total_students: standing.len(),
            gpa: summary.gpa,
            average_score: summary.average_score,
            subjects: lines,
        });
    }

    let overall = aggregate::summarize(config.scale(), own.iter().copied());
    Ok(Transcript {
        student_info: StudentSummaryInfo {
            id: student.id.clone(),
            student_no: student.student_no.clone(),
            full_name: student.full_name(),
            email: student.email.clone(),
            status: student.status.clone(),
        },
        academic_info: AcademicInfo {
            gpa: overall.gpa,
            total_subjects: overall.total_subjects,
            average_score: overall.average_score,
            grade_distribution: overall.distribution,
        },
        terms,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassPerformanceSummary {
    pub class_id: String,
    pub class_name: String,
    pub academic_year: String,
    pub term: String,
    pub total_students: usize,
    pub active_students: usize,
    pub total_grades: usize,
    pub average_score: f64,
    pub grade_distribution: GradeDistribution,
}

/// Averages and letter spread for one class in one academic year and term.
pub fn class_performance(
    config: &ScoringConfig,
    class: &ClassInfo,
    roster: &[StudentInfo],
    records: &[GradeRecord],
    academic_year: &str,
    term: &str,
) -> Result<ClassPerformanceSummary, ReportError> {
    let selected: Vec<&GradeRecord> = records
        .iter()
        .filter(|r| r.key.in_cohort(&class.id, academic_year, term))
        .collect();
    ensure_consistent(config, selected.iter().copied())?;

    let summary = aggregate::summarize(config.scale(), selected.iter().copied());
    Ok(ClassPerformanceSummary {
        class_id: class.id.clone(),
        class_name: class.name.clone(),
        academic_year: academic_year.to_string(),
        term: term.to_string(),
        total_students: roster.len(),
        active_students: roster.iter().filter(|s| s.is_active()).count(),
        total_grades: summary.total_subjects,
        average_score: summary.average_score,
        grade_distribution: summary.distribution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{ComponentScore, Components};
    use crate::record::{GradeInput, GradeKey};

    fn record(cfg: &ScoringConfig, student: &str, subject: &str, term: &str, exam: f64) -> GradeRecord {
        let key = GradeKey {
            student_id: student.into(),
            class_id: "c1".into(),
            subject_id: subject.into(),
            academic_year: "2024/2025".into(),
            term: term.into(),
        };
        let mut r = GradeRecord::blank(cfg, key.clone());
        let mut components = Components::new();
        components.insert("assessment".into(), ComponentScore::new(30.0, 30.0));
        components.insert("test".into(), ComponentScore::new(20.0, 20.0));
        components.insert("exam".into(), ComponentScore::new(exam, 50.0));
        r.apply(
            cfg,
            &GradeInput {
                key,
                components,
                ..Default::default()
            },
        );
        r
    }

    fn student(id: &str, status: &str) -> StudentInfo {
        StudentInfo {
            id: id.into(),
            student_no: Some(format!("N-{id}")),
            first_name: "Kofi".into(),
            last_name: id.to_uppercase(),
            email: None,
            status: status.into(),
        }
    }

    fn subjects() -> Vec<SubjectInfo> {
        vec![
            SubjectInfo {
                id: "math".into(),
                name: "Mathematics".into(),
                code: Some("MTH".into()),
            },
            SubjectInfo {
                id: "eng".into(),
                name: "English".into(),
                code: None,
            },
        ]
    }

    #[test]
    fn term_order_is_numeric_aware() {
        let mut terms = vec!["Term 10", "Term 2", "Final", "Term 1"];
        terms.sort_by(|a, b| term_order(a, b));
        assert_eq!(terms, vec!["Term 1", "Term 2", "Term 10", "Final"]);
    }

    #[test]
    fn term_report_lists_subjects_by_name_with_summary() {
        let cfg = ScoringConfig::default();
        let records = vec![
            record(&cfg, "s1", "math", "1", 40.0),
            record(&cfg, "s1", "eng", "1", 30.0),
            record(&cfg, "s1", "eng", "2", 50.0),
            record(&cfg, "s2", "math", "1", 10.0),
        ];
        let report = term_report(&cfg, &student("s1", "active"), &subjects(), &records, "2024/2025", "1")
            .expect("report");

        let names: Vec<&str> = report.subjects.iter().map(|s| s.subject_name.as_str()).collect();
        assert_eq!(names, vec!["English", "Mathematics"]);
        assert_eq!(report.subjects[1].subject_code.as_deref(), Some("MTH"));
        assert_eq!(report.subjects[0].components[2].display, "30/50");
        assert_eq!(report.subjects[1].total_score, 90.0);
        assert_eq!(report.summary.total_subjects, 2);
        assert_eq!(report.summary.average_score, 85.0);
        assert_eq!(report.summary.gpa, 3.85);
    }

    #[test]
    fn empty_term_report_has_zero_summary() {
        let cfg = ScoringConfig::default();
        let report = term_report(&cfg, &student("s9", "active"), &[], &[], "2024/2025", "1").expect("report");
        assert!(report.subjects.is_empty());
        assert_eq!(report.summary.average_score, 0.0);
        assert_eq!(report.summary.gpa, 0.0);
    }

    #[test]
    fn unknown_letter_blocks_report() {
        let cfg = ScoringConfig::default();
        let mut r = record(&cfg, "s1", "math", "1", 40.0);
        r.breakdown.grade_letter = "E".into();
        let err = term_report(&cfg, &student("s1", "active"), &[], &[r], "2024/2025", "1")
            .expect_err("must refuse");
        assert!(matches!(err, ReportError::UnknownGradeLetter { ref letter, .. } if letter == "E"));
    }

    #[test]
    fn transcript_ranks_terms_and_flags_top_subjects() {
        let cfg = ScoringConfig::default();
        let records = vec![
            record(&cfg, "s1", "math", "1", 40.0),
            record(&cfg, "s2", "math", "1", 50.0),
            record(&cfg, "s3", "math", "1", 20.0),
            record(&cfg, "s4", "math", "1", 10.0),
            record(&cfg, "s4", "eng", "1", 50.0),
            record(&cfg, "s1", "eng", "1", 45.0),
            record(&cfg, "s1", "math", "2", 25.0),
        ];
        let mut enrollments = BTreeMap::new();
        enrollments.insert(
            "c1".to_string(),
            vec!["s1".into(), "s2".into(), "s3".into(), "s4".into(), "s5".into()],
        );

        let t = transcript(
            &cfg,
            &student("s1", "active"),
            &subjects(),
            &records,
            &enrollments,
            &ReportScope::default(),
        )
        .expect("transcript");

        assert_eq!(t.student_info.full_name, "Kofi S1");
        assert_eq!(t.academic_info.total_subjects, 3);
        assert_eq!(t.terms.len(), 2);

        let first = &t.terms[0];
        assert_eq!(first.term, "1");
        assert_eq!(first.total_students, 5);
        // s2 averages 100, s1 (90, 95) averages 92.5.
        assert_eq!(first.rank, Some(2));
        assert_eq!(first.rank_display, "2nd");
        let eng = &first.subjects[0];
        assert_eq!(eng.subject_name, "English");
        assert_eq!(eng.subject_rank, Some(2));
        assert!(eng.top_performer);
        assert_eq!(eng.class_average, 97.5);
        let math = &first.subjects[1];
        assert_eq!(math.subject_rank_display, "2nd");
        assert_eq!(math.class_average, 80.0);

        let second = &t.terms[1];
        assert_eq!(second.rank, Some(1));
        assert_eq!(second.total_students, 5);
    }

    #[test]
    fn transcript_scope_limits_terms() {
        let cfg = ScoringConfig::default();
        let records = vec![
            record(&cfg, "s1", "math", "1", 40.0),
            record(&cfg, "s1", "math", "2", 25.0),
        ];
        let scope = ReportScope {
            academic_year: None,
            term: Some("2".into()),
        };
        let t = transcript(&cfg, &student("s1", "active"), &[], &records, &BTreeMap::new(), &scope)
            .expect("transcript");
        assert_eq!(t.terms.len(), 1);
        assert_eq!(t.terms[0].subjects[0].subject_name, "math");
        assert_eq!(t.academic_info.average_score, 75.0);
    }

    #[test]
    fn class_performance_counts_roster_and_grades() {
        let cfg = ScoringConfig::default();
        let records = vec![
            record(&cfg, "s1", "math", "1", 40.0),
            record(&cfg, "s2", "math", "1", 15.0),
            record(&cfg, "s1", "math", "2", 0.0),
        ];
        let class = ClassInfo {
            id: "c1".into(),
            name: "JHS 2".into(),
            academic_year: Some("2024/2025".into()),
        };
        let roster = vec![student("s1", "active"), student("s2", "inactive"), student("s3", "active")];
        let s = class_performance(&cfg, &class, &roster, &records, "2024/2025", "1").expect("summary");
        assert_eq!(s.class_name, "JHS 2");
        assert_eq!(s.total_students, 3);
        assert_eq!(s.active_students, 2);
        assert_eq!(s.total_grades, 2);
        assert_eq!(s.average_score, 77.5);
        assert_eq!(s.grade_distribution.get("A+"), Some(1));
        assert_eq!(s.grade_distribution.get("B-"), Some(1));
        assert_eq!(s.grade_distribution.letters().count(), 12);
    }
}
