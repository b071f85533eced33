use crate::models::{AttendanceCounts, AttendanceMark, AttendanceStats, AttendanceStatus};

pub const DEFAULT_REQUIRED_ATTENDANCE: f64 = 75.0;

pub fn tally_marks(marks: &[AttendanceMark], countable_sessions: u32) -> AttendanceCounts {
    let mut counts = AttendanceCounts {
        countable_sessions,
        ..AttendanceCounts::default()
    };

    for mark in marks {
        match mark.status {
            AttendanceStatus::Present => counts.present += 1,
            AttendanceStatus::Late => counts.late += 1,
            AttendanceStatus::Absent => counts.absent += 1,
            AttendanceStatus::Excused => counts.excused += 1,
        }
    }

    counts
}

pub fn evaluate_attendance(
    marks: &[AttendanceMark],
    countable_sessions: u32,
    required_percentage: f64,
) -> AttendanceStats {
    evaluate_attendance_counts(&tally_marks(marks, countable_sessions), required_percentage)
}

/// Excused sessions leave both sides of the ratio; a late counts as half a
/// presence. An empty effective total yields 0, not NaN.
pub fn evaluate_attendance_counts(
    counts: &AttendanceCounts,
    required_percentage: f64,
) -> AttendanceStats {
    let effective_total = counts.countable_sessions.saturating_sub(counts.excused);
    let effective_present = counts.present as f64 + counts.late as f64 / 2.0;

    let percentage = if effective_total > 0 {
        effective_present / effective_total as f64 * 100.0
    } else {
        0.0
    };

    AttendanceStats {
        present_count: counts.present,
        late_count: counts.late,
        absent_count: counts.absent,
        excused_count: counts.excused,
        total_countable_sessions: counts.countable_sessions,
        effective_present,
        effective_total,
        percentage,
        required_percentage,
        met: percentage >= required_percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn marks_of(statuses: &[AttendanceStatus]) -> Vec<AttendanceMark> {
        let student_id = Uuid::new_v4();
        statuses
            .iter()
            .map(|status| AttendanceMark {
                session_id: Uuid::new_v4(),
                student_id,
                status: *status,
            })
            .collect()
    }

    #[test]
    fn six_session_worked_example() {
        use AttendanceStatus::*;
        let marks = marks_of(&[Present, Present, Present, Late, Late, Absent]);
        let stats = evaluate_attendance(&marks, 6, DEFAULT_REQUIRED_ATTENDANCE);

        assert_eq!(stats.excused_count, 0);
        assert!((stats.effective_present - 4.0).abs() < 0.001);
        assert_eq!(stats.effective_total, 6);
        assert!((stats.percentage - 66.666).abs() < 0.01);
        assert!(!stats.met);
    }

    #[test]
    fn two_lates_equal_one_present() {
        use AttendanceStatus::*;
        let with_lates = marks_of(&[Present, Late, Late, Absent]);
        let with_present = marks_of(&[Present, Present, Absent]);

        let a = evaluate_attendance(&with_lates, 8, 75.0);
        let b = evaluate_attendance(&with_present, 8, 75.0);
        assert!((a.effective_present - b.effective_present).abs() < 0.001);
    }

    #[test]
    fn excused_leaves_both_sides_of_the_ratio() {
        use AttendanceStatus::*;
        let without = evaluate_attendance(&marks_of(&[Present, Present, Absent]), 3, 75.0);
        let with = evaluate_attendance(&marks_of(&[Present, Present, Absent, Excused]), 4, 75.0);

        assert!((with.effective_present - without.effective_present).abs() < 0.001);
        assert_eq!(with.effective_total, without.effective_total);
        assert!((with.percentage - without.percentage).abs() < 0.001);
    }

    #[test]
    fn zero_countable_sessions_yields_zero_not_nan() {
        let stats = evaluate_attendance(&[], 0, 75.0);
        assert_eq!(stats.percentage, 0.0);
        assert!(!stats.met);
        assert!(stats.percentage.is_finite());
    }

    #[test]
    fn all_sessions_excused_yields_zero() {
        use AttendanceStatus::*;
        let stats = evaluate_attendance(&marks_of(&[Excused, Excused, Excused]), 3, 75.0);
        assert_eq!(stats.effective_total, 0);
        assert_eq!(stats.percentage, 0.0);
        assert!(!stats.met);
    }

    #[test]
    fn zero_threshold_is_met_even_with_no_sessions() {
        let stats = evaluate_attendance(&[], 0, 0.0);
        assert!(stats.met);
    }

    #[test]
    fn percentage_stays_in_range() {
        use AttendanceStatus::*;
        let all_present = evaluate_attendance(&marks_of(&[Present, Present]), 2, 75.0);
        assert!(all_present.percentage <= 100.0);
        assert!(all_present.met);

        let all_absent = evaluate_attendance(&marks_of(&[Absent, Absent]), 2, 75.0);
        assert!(all_absent.percentage >= 0.0);
        assert!(!all_absent.met);
    }

    #[test]
    fn met_tracks_threshold_exactly() {
        use AttendanceStatus::*;
        let marks = marks_of(&[Present, Present, Present, Absent]);
        let stats = evaluate_attendance(&marks, 4, 75.0);
        assert!((stats.percentage - 75.0).abs() < 0.001);
        assert!(stats.met);
    }
}
