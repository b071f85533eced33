use crate::models::{AttendanceStats, ExamStats, GraduationStatus};

pub fn evaluate_graduation(attendance: &AttendanceStats, exams: &ExamStats) -> GraduationStatus {
    GraduationStatus {
        eligible: attendance.met && exams.overall_met && exams.all_sections_met,
        attendance_met: attendance.met,
        overall_average_met: exams.overall_met,
        all_sections_met: exams.all_sections_met,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::evaluate_attendance_counts;
    use crate::exams::evaluate_exam_aggregates;
    use crate::models::{AttendanceCounts, SectionAggregate};

    fn attendance(present: u32, countable: u32) -> AttendanceStats {
        evaluate_attendance_counts(
            &AttendanceCounts {
                present,
                countable_sessions: countable,
                ..AttendanceCounts::default()
            },
            75.0,
        )
    }

    fn exams(average: f64) -> ExamStats {
        let groups = vec![SectionAggregate {
            section: "Bible Studies".to_string(),
            total: average,
            count: 1,
        }];
        evaluate_exam_aggregates(&groups, 75.0, 60.0)
    }

    #[test]
    fn eligible_only_when_all_three_gates_pass() {
        let status = evaluate_graduation(&attendance(9, 10), &exams(80.0));
        assert!(status.eligible);
        assert!(status.attendance_met);
        assert!(status.overall_average_met);
        assert!(status.all_sections_met);
    }

    #[test]
    fn failed_attendance_blocks_eligibility() {
        let status = evaluate_graduation(&attendance(5, 10), &exams(90.0));
        assert!(!status.eligible);
        assert!(!status.attendance_met);
        assert!(status.overall_average_met);
    }

    #[test]
    fn failing_section_blocks_eligibility_despite_overall_pass() {
        let groups = vec![
            SectionAggregate {
                section: "Bible Studies".to_string(),
                total: 190.0,
                count: 2,
            },
            SectionAggregate {
                section: "Dogma".to_string(),
                total: 55.0,
                count: 1,
            },
        ];
        let exam_stats = evaluate_exam_aggregates(&groups, 75.0, 60.0);
        assert!(exam_stats.overall_met);

        let status = evaluate_graduation(&attendance(10, 10), &exam_stats);
        assert!(!status.eligible);
        assert!(!status.all_sections_met);
    }
}
