use std::collections::HashMap;
use std::fmt::Write;

use uuid::Uuid;

use crate::cohort::{sorted_outcomes, StudentOutcome, Thresholds, YearFigures};
use crate::models::YearLevel;

fn year_line(outcome: &StudentOutcome) -> String {
    let format_year = |figures: &YearFigures| match &figures.stats {
        Some(stats) => format!(
            "{:.1}% of {} sessions",
            stats.percentage, stats.effective_total
        ),
        None => "no sessions recorded".to_string(),
    };

    match &outcome.year_two {
        Some(year_two) => format!(
            "year 1 {} / year 2 {}",
            format_year(&outcome.year_one),
            format_year(year_two)
        ),
        None => format!("year 1 {}", format_year(&outcome.year_one)),
    }
}

fn exam_line(outcome: &StudentOutcome) -> String {
    match outcome.exams.average {
        Some(average) => {
            let failing: Vec<&str> = outcome
                .exams
                .sections
                .iter()
                .filter(|section| !section.passing_met)
                .map(|section| section.section.as_str())
                .collect();
            if failing.is_empty() {
                format!("exam average {average:.1}")
            } else {
                format!(
                    "exam average {average:.1}, below minimum in {}",
                    failing.join(", ")
                )
            }
        }
        None => "no exams recorded".to_string(),
    }
}

pub fn build_report(
    period: &str,
    grade: Option<&str>,
    outcomes: &HashMap<Uuid, StudentOutcome>,
    thresholds: &Thresholds,
) -> String {
    let rows = sorted_outcomes(outcomes);
    let eligible_count = rows.iter().filter(|row| row.graduation.eligible).count();

    let mut output = String::new();
    let scope_label = grade.unwrap_or("all grades");

    let _ = writeln!(output, "# Graduation Eligibility Report");
    let _ = writeln!(
        output,
        "Generated for {} in period {} (attendance >= {:.0}%, exam average >= {:.0}, section minimum >= {:.0})",
        scope_label,
        period,
        thresholds.required_attendance,
        thresholds.required_average,
        thresholds.required_minimum
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");

    if rows.is_empty() {
        let _ = writeln!(output, "No students found for this scope.");
        return output;
    }

    let _ = writeln!(
        output,
        "{} of {} students are currently eligible to graduate.",
        eligible_count,
        rows.len()
    );
    let second_years = rows
        .iter()
        .filter(|row| row.year_level == YearLevel::Second)
        .count();
    let _ = writeln!(
        output,
        "{} second-year students, {} first-year.",
        second_years,
        rows.len() - second_years
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Not Yet Eligible");

    let blocked: Vec<&StudentOutcome> = rows
        .iter()
        .copied()
        .filter(|row| !row.graduation.eligible)
        .collect();

    if blocked.is_empty() {
        let _ = writeln!(output, "Every student in scope is eligible.");
    } else {
        for row in &blocked {
            let mut reasons = Vec::new();
            if !row.graduation.attendance_met {
                reasons.push("attendance below threshold");
            }
            if !row.graduation.overall_average_met {
                reasons.push("exam average below threshold");
            }
            if !row.graduation.all_sections_met {
                reasons.push("failing section minimum");
            }
            let _ = writeln!(
                output,
                "- {} ({}): {}. {}; {}",
                row.full_name,
                row.email,
                reasons.join(", "),
                year_line(row),
                exam_line(row)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Eligible");

    let eligible: Vec<&StudentOutcome> = rows
        .iter()
        .copied()
        .filter(|row| row.graduation.eligible)
        .collect();

    if eligible.is_empty() {
        let _ = writeln!(output, "No students are eligible yet.");
    } else {
        for row in &eligible {
            let _ = writeln!(
                output,
                "- {} ({}): {}; {}",
                row.full_name,
                row.email,
                year_line(row),
                exam_line(row)
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::{aggregate_cohort, CohortInputs, RosterEntry};
    use crate::models::AttendanceCounts;

    #[test]
    fn report_lists_blockers_with_reasons() {
        let student = RosterEntry {
            student_id: Uuid::new_v4(),
            full_name: "Mina Gerges".to_string(),
            email: "mina.gerges@stmina.example".to_string(),
            grade: "year-one".to_string(),
            year_level: YearLevel::First,
            enrolled_period: "2025-2026".to_string(),
        };
        let id = student.student_id;

        let mut inputs = CohortInputs {
            active_period: "2025-2026".to_string(),
            roster: vec![student],
            attendance: HashMap::new(),
            exams: HashMap::new(),
        };
        inputs.attendance.insert(
            (id, "2025-2026".to_string()),
            AttendanceCounts {
                present: 4,
                absent: 6,
                countable_sessions: 10,
                ..AttendanceCounts::default()
            },
        );

        let outcomes = aggregate_cohort(&inputs, &Thresholds::default());
        let report = build_report("2025-2026", None, &outcomes, &Thresholds::default());

        assert!(report.contains("0 of 1 students are currently eligible"));
        assert!(report.contains("attendance below threshold"));
        assert!(report.contains("Mina Gerges"));
    }

    #[test]
    fn empty_scope_renders_placeholder() {
        let outcomes = HashMap::new();
        let report = build_report(
            "2025-2026",
            Some("year-two"),
            &outcomes,
            &Thresholds::default(),
        );
        assert!(report.contains("No students found for this scope."));
    }
}
