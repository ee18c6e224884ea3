use crate::calc::round_2dp;
use crate::config::GradeScale;
use crate::record::GradeRecord;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Count per letter over every letter of the scale, in scale order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeDistribution {
    counts: Vec<(String, usize)>,
}

impl GradeDistribution {
    pub fn empty(scale: &GradeScale) -> Self {
        Self {
            counts: scale.letters().map(|l| (l.to_string(), 0)).collect(),
        }
    }

    pub fn get(&self, letter: &str) -> Option<usize> {
        self.counts
            .iter()
            .find(|(l, _)| l == letter)
            .map(|(_, n)| *n)
    }

    pub fn letters(&self) -> impl Iterator<Item = &str> {
        self.counts.iter().map(|(l, _)| l.as_str())
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }

    fn bump(&mut self, letter: &str) {
        if let Some((_, n)) = self.counts.iter_mut().find(|(l, _)| l == letter) {
            *n += 1;
        }
    }
}

impl Serialize for GradeDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len()))?;
        for (letter, count) in &self.counts {
            map.serialize_entry(letter, count)?;
        }
        map.end()
    }
}

/// Mean grade point, two decimals. Letters outside the scale earn 0 points;
/// no letters at all gives 0.0.
pub fn gpa<'a, I>(scale: &GradeScale, letters: I) -> f64
where
    I: IntoIterator<Item = &'a str>,
{
    let mut points = 0.0_f64;
    let mut n: usize = 0;
    for letter in letters {
        points += scale.points_for(letter).unwrap_or(0.0);
        n += 1;
    }
    if n == 0 {
        return 0.0;
    }
    round_2dp(points / (n as f64))
}

/// Letters outside the scale are not counted.
pub fn distribution<'a, I>(scale: &GradeScale, letters: I) -> GradeDistribution
where
    I: IntoIterator<Item = &'a str>,
{
    let mut dist = GradeDistribution::empty(scale);
    for letter in letters {
        dist.bump(letter);
    }
    dist
}

/// Mean `total_score`, two decimals, 0 for no records.
pub fn average_score<'a, I>(records: I) -> f64
where
    I: IntoIterator<Item = &'a GradeRecord>,
{
    let mut sum = 0.0_f64;
    let mut n: usize = 0;
    for r in records {
        sum += r.total_score();
        n += 1;
    }
    if n == 0 {
        return 0.0;
    }
    round_2dp(sum / (n as f64))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeSummary {
    pub gpa: f64,
    pub total_subjects: usize,
    pub average_score: f64,
    pub distribution: GradeDistribution,
}

/// GPA, distribution and average over a caller-filtered record set.
pub fn summarize<'a, I>(scale: &GradeScale, records: I) -> GradeSummary
where
    I: IntoIterator<Item = &'a GradeRecord>,
{
    let records: Vec<&GradeRecord> = records.into_iter().collect();
    let letters: Vec<&str> = records.iter().map(|r| r.grade_letter()).collect();
    GradeSummary {
        gpa: gpa(scale, letters.iter().copied()),
        total_subjects: records.len(),
        average_score: average_score(records.iter().copied()),
        distribution: distribution(scale, letters.iter().copied()),
    }
}
