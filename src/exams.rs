use std::collections::HashMap;

use crate::models::{ExamScore, ExamStats, SectionAggregate, SectionAverage};

pub const DEFAULT_REQUIRED_AVERAGE: f64 = 75.0;
pub const DEFAULT_REQUIRED_MINIMUM: f64 = 60.0;

pub fn group_scores(scores: &[ExamScore]) -> Vec<SectionAggregate> {
    let mut map: HashMap<String, (f64, u32)> = HashMap::new();

    for score in scores {
        let entry = map.entry(score.section.clone()).or_insert((0.0, 0));
        entry.0 += score.percentage;
        entry.1 += 1;
    }

    let mut groups: Vec<SectionAggregate> = map
        .into_iter()
        .map(|(section, (total, count))| SectionAggregate {
            section,
            total,
            count,
        })
        .collect();

    groups.sort_by(|a, b| a.section.cmp(&b.section));
    groups
}

pub fn evaluate_exams(
    scores: &[ExamScore],
    required_average: f64,
    required_minimum: f64,
) -> ExamStats {
    evaluate_exam_aggregates(&group_scores(scores), required_average, required_minimum)
}

/// The overall average is the mean over every score, not over section
/// averages, so a large section weighs more than a small one. With no scores
/// at all the overall gate fails while the per-section gate passes vacuously;
/// the cohort layer's not-yet-assessed handling relies on that split.
pub fn evaluate_exam_aggregates(
    groups: &[SectionAggregate],
    required_average: f64,
    required_minimum: f64,
) -> ExamStats {
    let mut section_averages: Vec<SectionAverage> = groups
        .iter()
        .filter(|group| group.count > 0)
        .map(|group| {
            let average = group.total / group.count as f64;
            SectionAverage {
                section: group.section.clone(),
                average,
                passing_met: average >= required_minimum,
            }
        })
        .collect();
    section_averages.sort_by(|a, b| a.section.cmp(&b.section));

    let score_count: u32 = groups.iter().map(|group| group.count).sum();
    let score_total: f64 = groups
        .iter()
        .filter(|group| group.count > 0)
        .map(|group| group.total)
        .sum();

    let overall_average = if score_count > 0 {
        score_total / score_count as f64
    } else {
        0.0
    };

    ExamStats {
        all_sections_met: section_averages.iter().all(|section| section.passing_met),
        overall_met: score_count > 0 && overall_average >= required_average,
        section_averages,
        overall_average,
        required_average,
        required_minimum,
    }
}
