use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::attendance::evaluate_attendance_counts;
use crate::exams::evaluate_exam_aggregates;
use crate::models::{
    AttendanceCounts, AttendanceStats, GraduationStatus, SectionAggregate, SectionAverage,
    YearLevel,
};

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub required_attendance: f64,
    pub required_average: f64,
    pub required_minimum: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            required_attendance: crate::attendance::DEFAULT_REQUIRED_ATTENDANCE,
            required_average: crate::exams::DEFAULT_REQUIRED_AVERAGE,
            required_minimum: crate::exams::DEFAULT_REQUIRED_MINIMUM,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub student_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub grade: String,
    pub year_level: YearLevel,
    pub enrolled_period: String,
}

/// Pre-grouped cohort inputs. The storage layer groups attendance marks by
/// (student, period, status) and exam scores by (student, section) so the
/// aggregate pass never touches raw rows; the active period is threaded in
/// explicitly rather than read from ambient state.
#[derive(Debug, Clone)]
pub struct CohortInputs {
    pub active_period: String,
    pub roster: Vec<RosterEntry>,
    pub attendance: HashMap<(Uuid, String), AttendanceCounts>,
    pub exams: HashMap<Uuid, Vec<SectionAggregate>>,
}

/// Attendance figures for one program year. `stats` is `None` when the
/// student has no countable sessions recorded for that period yet, which is
/// "not yet assessed", not a zero score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearFigures {
    pub period: String,
    pub stats: Option<AttendanceStats>,
}

impl YearFigures {
    fn attendance_met(&self) -> bool {
        self.stats.as_ref().map(|stats| stats.met).unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortExamFigures {
    pub average: Option<f64>,
    pub average_met: bool,
    pub sections: Vec<SectionAverage>,
    pub all_sections_met: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentOutcome {
    pub student_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub grade: String,
    pub year_level: YearLevel,
    pub year_one: YearFigures,
    pub year_two: Option<YearFigures>,
    pub exams: CohortExamFigures,
    pub graduation: GraduationStatus,
}

pub fn aggregate_cohort(
    inputs: &CohortInputs,
    thresholds: &Thresholds,
) -> HashMap<Uuid, StudentOutcome> {
    let mut outcomes = HashMap::with_capacity(inputs.roster.len());

    for student in &inputs.roster {
        let year_one = year_figures(inputs, student.student_id, &student.enrolled_period, thresholds);
        let year_two = match student.year_level {
            YearLevel::First => None,
            YearLevel::Second => Some(year_figures(
                inputs,
                student.student_id,
                &inputs.active_period,
                thresholds,
            )),
        };

        let exams = exam_figures(inputs.exams.get(&student.student_id), thresholds);

        // Graduation gates read the current-year bucket; buckets with no
        // data yet count as met rather than failed.
        let current_year = year_two.as_ref().unwrap_or(&year_one);
        let attendance_met = current_year.attendance_met();
        let graduation = GraduationStatus {
            eligible: attendance_met && exams.average_met && exams.all_sections_met,
            attendance_met,
            overall_average_met: exams.average_met,
            all_sections_met: exams.all_sections_met,
        };

        outcomes.insert(
            student.student_id,
            StudentOutcome {
                student_id: student.student_id,
                full_name: student.full_name.clone(),
                email: student.email.clone(),
                grade: student.grade.clone(),
                year_level: student.year_level,
                year_one,
                year_two,
                exams,
                graduation,
            },
        );
    }

    outcomes
}

fn year_figures(
    inputs: &CohortInputs,
    student_id: Uuid,
    period: &str,
    thresholds: &Thresholds,
) -> YearFigures {
    let stats = inputs
        .attendance
        .get(&(student_id, period.to_string()))
        .filter(|counts| counts.countable_sessions > 0)
        .map(|counts| evaluate_attendance_counts(counts, thresholds.required_attendance));

    YearFigures {
        period: period.to_string(),
        stats,
    }
}

fn exam_figures(
    groups: Option<&Vec<SectionAggregate>>,
    thresholds: &Thresholds,
) -> CohortExamFigures {
    let groups = match groups {
        Some(groups) if groups.iter().any(|group| group.count > 0) => groups,
        _ => {
            return CohortExamFigures {
                average: None,
                average_met: true,
                sections: Vec::new(),
                all_sections_met: true,
            };
        }
    };

    let stats = evaluate_exam_aggregates(
        groups,
        thresholds.required_average,
        thresholds.required_minimum,
    );

    CohortExamFigures {
        average: Some(stats.overall_average),
        average_met: stats.overall_met,
        sections: stats.section_averages,
        all_sections_met: stats.all_sections_met,
    }
}

pub fn sorted_outcomes(outcomes: &HashMap<Uuid, StudentOutcome>) -> Vec<&StudentOutcome> {
    let mut rows: Vec<&StudentOutcome> = outcomes.values().collect();
    rows.sort_by(|a, b| a.full_name.cmp(&b.full_name));
    rows
}
