use crate::calc::{ComponentScore, Components};
use crate::config::ScoringConfig;
use crate::record::{GradeInput, GradeKey};
use serde::Serialize;

/// One problem with a submission, tied to the field the UI should highlight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, component: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            component: component.map(str::to_string),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl Validation {
    fn from_issues(errors: Vec<ValidationIssue>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn messages(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.message.as_str()).collect()
    }
}

/// `assessment_score` -> `Assessment Score`.
fn title_case(field: &str) -> String {
    field
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn key_issues(key: &GradeKey) -> Vec<ValidationIssue> {
    let fields = [
        ("student_id", &key.student_id),
        ("class_id", &key.class_id),
        ("subject_id", &key.subject_id),
        ("academic_year", &key.academic_year),
        ("term", &key.term),
    ];
    fields
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(f, _)| ValidationIssue::new(*f, None, format!("{} is required", title_case(f))))
        .collect()
}

fn configured<'a>(
    config: &'a ScoringConfig,
    components: &'a Components,
) -> impl Iterator<Item = (&'a str, &'a ComponentScore)> + 'a {
    config
        .components()
        .filter_map(move |c| components.get(c).map(|part| (c, part)))
}

/// Score/total checks for the submitted components only.
pub fn component_issues(config: &ScoringConfig, components: &Components) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for name in components.keys() {
        if config.weight_of(name).is_none() {
            issues.push(ValidationIssue::new(
                name.clone(),
                Some(name),
                format!("Unknown component '{}'", name),
            ));
        }
    }

    for (name, part) in configured(config, components) {
        if part.score > part.total {
            issues.push(ValidationIssue::new(
                format!("{name}_score"),
                Some(name),
                format!("{} score cannot exceed {} total", capitalize(name), name),
            ));
        }
    }

    for (name, part) in configured(config, components) {
        for (suffix, value) in [("score", part.score), ("total", part.total)] {
            let field = format!("{name}_{suffix}");
            if !value.is_finite() {
                issues.push(ValidationIssue::new(
                    field.clone(),
                    Some(name),
                    format!("{} must be a number", title_case(&field)),
                ));
            } else if value < 0.0 {
                issues.push(ValidationIssue::new(
                    field.clone(),
                    Some(name),
                    format!("{} cannot be negative", title_case(&field)),
                ));
            }
        }
    }

    issues
}

/// Advisory check run before any calculation or write. Never panics and never
/// short-circuits, so the caller gets every problem at once.
pub fn validate(config: &ScoringConfig, input: &GradeInput) -> Validation {
    let mut issues = key_issues(&input.key);
    issues.extend(component_issues(config, &input.components));

    if let Some(date) = input.grade_date.as_deref() {
        if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            issues.push(ValidationIssue::new(
                "grade_date",
                None,
                "Grade Date must be formatted YYYY-MM-DD",
            ));
        }
    }

    Validation::from_issues(issues)
}
