use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rand::Rng;

use crate::error::{AdminActionError, IssueError, RedeemError};
use crate::models::{
    AdminStatus, Assignment, AsyncCode, AsyncLog, AttendanceCounts, AttendanceStatus, LogStatus,
};

// 0/O and 1/I are left out so codes survive being read aloud or copied by
// hand.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 6;

pub fn generate_code<R: Rng>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Canonical week boundary: the Sunday on or before the given date.
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

pub fn parse_week_of(raw: &str) -> Result<NaiveDate, RedeemError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(week_start_of)
        .map_err(|_| RedeemError::MalformedTargetWeek(raw.to_string()))
}

/// 1-based week index of `target` within the assignment schedule, or `None`
/// when it falls before the start or past `total_weeks`. Both dates are
/// normalized to their week boundary first.
pub fn week_number(start_date: NaiveDate, target: NaiveDate, total_weeks: u32) -> Option<u32> {
    let days = (week_start_of(target) - week_start_of(start_date)).num_days();
    if days < 0 {
        return None;
    }
    let number = (days / 7) as u32 + 1;
    (number <= total_weeks).then_some(number)
}

pub fn elapsed_weeks(assignment: &Assignment, today: NaiveDate) -> u32 {
    match week_number(assignment.start_date, today, assignment.total_weeks) {
        Some(number) => number,
        None if today < assignment.start_date => 0,
        None => assignment.total_weeks,
    }
}

pub fn issue_code<R: Rng>(
    rng: &mut R,
    grade: &str,
    week_start: NaiveDate,
    valid_until: DateTime<Utc>,
    now: DateTime<Utc>,
    issued_by: &str,
) -> Result<AsyncCode, IssueError> {
    if valid_until <= now {
        return Err(IssueError::WindowAlreadyClosed(valid_until));
    }

    Ok(AsyncCode {
        code: generate_code(rng),
        grade: grade.to_string(),
        week_start: week_start_of(week_start),
        valid_until,
        active: true,
        issued_by: issued_by.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Redemption {
    pub week_number: u32,
    pub week_start: NaiveDate,
    /// True when this redemption replaces a rejected week; the replacement
    /// clears the prior rejection notes and marking staff.
    pub resubmission: bool,
}

/// The active flag and the validity window gate independently, each with its
/// own refusal. An existing log for the target week is a conflict unless it
/// is rejected, which re-opens the week for a fresh code entry.
pub fn check_redemption(
    code: Option<&AsyncCode>,
    now: DateTime<Utc>,
    assignment: &Assignment,
    target_week: NaiveDate,
    existing: Option<&AsyncLog>,
) -> Result<Redemption, RedeemError> {
    let code = code.ok_or(RedeemError::CodeNotFound)?;

    if !code.active {
        return Err(RedeemError::CodeInactive);
    }
    if now > code.valid_until {
        return Err(RedeemError::CodeExpired(code.valid_until));
    }
    if code.grade != assignment.grade {
        return Err(RedeemError::GradeMismatch {
            code_grade: code.grade.clone(),
            assignment_grade: assignment.grade.clone(),
        });
    }

    let week_start = week_start_of(target_week);
    let week_number = week_number(assignment.start_date, week_start, assignment.total_weeks)
        .ok_or(RedeemError::WeekOutOfRange(week_start))?;

    match existing {
        None => Ok(Redemption {
            week_number,
            week_start,
            resubmission: false,
        }),
        Some(log) if log.status == LogStatus::Rejected => Ok(Redemption {
            week_number,
            week_start,
            resubmission: true,
        }),
        Some(log) => Err(RedeemError::AlreadyLogged {
            week_number,
            status: log.status,
        }),
    }
}

pub fn build_verified_log(
    assignment: &Assignment,
    redemption: &Redemption,
    code: &AsyncCode,
    student_notes: Option<String>,
) -> AsyncLog {
    AsyncLog {
        assignment_id: assignment.id,
        week_number: redemption.week_number,
        week_start: redemption.week_start,
        status: LogStatus::Verified,
        code: Some(code.code.clone()),
        marked_by: None,
        notes: None,
        student_notes,
    }
}

/// Staff actions upsert: any in-range week may be marked whether or not a row
/// exists. Returns the week-start the log row should carry.
pub fn check_admin_action(
    assignment: &Assignment,
    week_number: u32,
) -> Result<NaiveDate, AdminActionError> {
    if week_number == 0 || week_number > assignment.total_weeks {
        return Err(AdminActionError::WeekOutOfRange {
            week_number,
            total_weeks: assignment.total_weeks,
        });
    }
    Ok(week_start_of(assignment.start_date) + Duration::weeks(week_number as i64 - 1))
}

pub fn build_admin_log(
    assignment: &Assignment,
    week_number: u32,
    week_start: NaiveDate,
    status: AdminStatus,
    marked_by: &str,
    notes: Option<String>,
) -> AsyncLog {
    AsyncLog {
        assignment_id: assignment.id,
        week_number,
        week_start,
        status: status.as_log_status(),
        code: None,
        marked_by: Some(marked_by.to_string()),
        notes,
        student_notes: None,
    }
}

/// Folds a log set into attendance counts over the weeks elapsed so far.
/// Weeks with no log at all join rejected weeks in the absent bucket.
pub fn tally_async_logs(logs: &[AsyncLog], elapsed_weeks: u32) -> AttendanceCounts {
    let mut counts = AttendanceCounts {
        countable_sessions: elapsed_weeks,
        ..AttendanceCounts::default()
    };

    for log in logs {
        if log.week_number == 0 || log.week_number > elapsed_weeks {
            continue;
        }
        match log.status.as_attendance_status() {
            AttendanceStatus::Present => counts.present += 1,
            AttendanceStatus::Late => counts.late += 1,
            AttendanceStatus::Absent => counts.absent += 1,
            AttendanceStatus::Excused => counts.excused += 1,
        }
    }

    let logged = counts.present + counts.late + counts.excused + counts.absent;
    counts.absent += elapsed_weeks.saturating_sub(logged);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_assignment() -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            grade: "year-one".to_string(),
            start_date: date(2025, 10, 5),
            total_weeks: 40,
        }
    }

    fn sample_code(assignment: &Assignment) -> AsyncCode {
        AsyncCode {
            code: "BRT7KQ".to_string(),
            grade: assignment.grade.clone(),
            week_start: date(2025, 10, 19),
            valid_until: Utc.with_ymd_and_hms(2025, 10, 21, 12, 0, 0).unwrap(),
            active: true,
            issued_by: "father.marcus@stmina.example".to_string(),
        }
    }

    fn verified_log(assignment: &Assignment, week_number: u32) -> AsyncLog {
        AsyncLog {
            assignment_id: assignment.id,
            week_number,
            week_start: date(2025, 10, 19),
            status: LogStatus::Verified,
            code: Some("BRT7KQ".to_string()),
            marked_by: None,
            notes: None,
            student_notes: None,
        }
    }

    #[test]
    fn codes_avoid_confusable_characters() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), CODE_LENGTH);
            for c in code.chars() {
                assert!(!"0O1I".contains(c), "confusable character in {code}");
            }
        }
    }

    #[test]
    fn week_number_worked_examples() {
        let start = date(2025, 10, 5);
        assert_eq!(week_number(start, date(2025, 10, 19), 40), Some(3));
        assert_eq!(week_number(start, date(2025, 10, 5), 40), Some(1));
        assert_eq!(week_number(start, date(2025, 9, 28), 40), None);
        assert_eq!(week_number(start, date(2026, 10, 4), 40), None);
    }

    #[test]
    fn week_number_normalizes_mid_week_dates() {
        let start = date(2025, 10, 5);
        // Wednesday of week 3 lands in the same week as its Sunday.
        assert_eq!(week_number(start, date(2025, 10, 22), 40), Some(3));
    }

    #[test]
    fn week_start_of_is_idempotent() {
        let sunday = date(2025, 10, 5);
        assert_eq!(week_start_of(sunday), sunday);
        assert_eq!(week_start_of(date(2025, 10, 8)), sunday);
        assert_eq!(week_start_of(week_start_of(date(2025, 10, 11))), sunday);
    }

    #[test]
    fn parse_week_of_rejects_garbage() {
        let err = parse_week_of("next sunday").unwrap_err();
        assert_eq!(err.reason(), "malformed_target_week");
        assert_eq!(parse_week_of("2025-10-22"), Ok(date(2025, 10, 19)));
    }

    #[test]
    fn redemption_happy_path() {
        let assignment = sample_assignment();
        let code = sample_code(&assignment);
        let now = Utc.with_ymd_and_hms(2025, 10, 20, 9, 0, 0).unwrap();

        let redemption =
            check_redemption(Some(&code), now, &assignment, date(2025, 10, 19), None).unwrap();
        assert_eq!(redemption.week_number, 3);
        assert!(!redemption.resubmission);

        let log = build_verified_log(&assignment, &redemption, &code, None);
        assert_eq!(log.status, LogStatus::Verified);
        assert_eq!(log.code.as_deref(), Some("BRT7KQ"));
        assert!(log.marked_by.is_none());
    }

    #[test]
    fn missing_code_is_not_found() {
        let assignment = sample_assignment();
        let now = Utc.with_ymd_and_hms(2025, 10, 20, 9, 0, 0).unwrap();
        let err =
            check_redemption(None, now, &assignment, date(2025, 10, 19), None).unwrap_err();
        assert_eq!(err.reason(), "code_not_found");
    }

    #[test]
    fn inactive_and_expired_are_distinct_refusals() {
        let assignment = sample_assignment();
        let now = Utc.with_ymd_and_hms(2025, 10, 22, 9, 0, 0).unwrap();

        // Past the window but still flagged active.
        let expired = sample_code(&assignment);
        let err = check_redemption(Some(&expired), now, &assignment, date(2025, 10, 19), None)
            .unwrap_err();
        assert_eq!(err.reason(), "code_expired");

        // Inside the window but deactivated.
        let mut inactive = sample_code(&assignment);
        inactive.active = false;
        let early = Utc.with_ymd_and_hms(2025, 10, 20, 9, 0, 0).unwrap();
        let err = check_redemption(Some(&inactive), early, &assignment, date(2025, 10, 19), None)
            .unwrap_err();
        assert_eq!(err.reason(), "code_inactive");
    }

    #[test]
    fn grade_mismatch_is_refused() {
        let assignment = sample_assignment();
        let mut code = sample_code(&assignment);
        code.grade = "year-two".to_string();
        let now = Utc.with_ymd_and_hms(2025, 10, 20, 9, 0, 0).unwrap();

        let err = check_redemption(Some(&code), now, &assignment, date(2025, 10, 19), None)
            .unwrap_err();
        assert_eq!(err.reason(), "grade_mismatch");
    }

    #[test]
    fn week_before_start_is_out_of_range() {
        let assignment = sample_assignment();
        let code = sample_code(&assignment);
        let now = Utc.with_ymd_and_hms(2025, 10, 20, 9, 0, 0).unwrap();

        let err = check_redemption(Some(&code), now, &assignment, date(2025, 9, 28), None)
            .unwrap_err();
        assert_eq!(err.reason(), "week_out_of_range");
    }

    #[test]
    fn second_redemption_for_verified_week_conflicts() {
        let assignment = sample_assignment();
        let code = sample_code(&assignment);
        let now = Utc.with_ymd_and_hms(2025, 10, 20, 9, 0, 0).unwrap();
        let existing = verified_log(&assignment, 3);

        let err = check_redemption(
            Some(&code),
            now,
            &assignment,
            date(2025, 10, 19),
            Some(&existing),
        )
        .unwrap_err();
        assert_eq!(
            err,
            RedeemError::AlreadyLogged {
                week_number: 3,
                status: LogStatus::Verified
            }
        );
    }

    #[test]
    fn rejected_week_reopens_and_replacement_clears_staff_fields() {
        let assignment = sample_assignment();
        let code = sample_code(&assignment);
        let now = Utc.with_ymd_and_hms(2025, 10, 20, 9, 0, 0).unwrap();
        let rejected = AsyncLog {
            status: LogStatus::Rejected,
            code: None,
            marked_by: Some("deacon.sara@stmina.example".to_string()),
            notes: Some("video did not load".to_string()),
            ..verified_log(&assignment, 3)
        };

        let redemption = check_redemption(
            Some(&code),
            now,
            &assignment,
            date(2025, 10, 19),
            Some(&rejected),
        )
        .unwrap();
        assert!(redemption.resubmission);

        let replacement = build_verified_log(&assignment, &redemption, &code, None);
        assert_eq!(replacement.status, LogStatus::Verified);
        assert!(replacement.marked_by.is_none());
        assert!(replacement.notes.is_none());
    }

    #[test]
    fn admin_action_rejects_out_of_range_weeks() {
        let assignment = sample_assignment();
        assert!(check_admin_action(&assignment, 0).is_err());
        assert!(check_admin_action(&assignment, 41).is_err());
        assert_eq!(
            check_admin_action(&assignment, 3).unwrap(),
            date(2025, 10, 19)
        );
    }

    #[test]
    fn admin_log_carries_staff_and_notes() {
        let assignment = sample_assignment();
        let week_start = check_admin_action(&assignment, 5).unwrap();
        let log = build_admin_log(
            &assignment,
            5,
            week_start,
            AdminStatus::Excused,
            "deacon.sara@stmina.example",
            Some("travelling".to_string()),
        );
        assert_eq!(log.status, LogStatus::Excused);
        assert_eq!(log.marked_by.as_deref(), Some("deacon.sara@stmina.example"));
        assert!(log.code.is_none());
    }

    #[test]
    fn issue_refuses_already_closed_window() {
        let mut rng = StdRng::seed_from_u64(3);
        let now = Utc.with_ymd_and_hms(2025, 10, 20, 9, 0, 0).unwrap();
        let past = Utc.with_ymd_and_hms(2025, 10, 19, 9, 0, 0).unwrap();

        let err = issue_code(&mut rng, "year-one", date(2025, 10, 19), past, now, "staff")
            .unwrap_err();
        assert_eq!(err.reason(), "window_already_closed");
    }

    #[test]
    fn issued_code_normalizes_week_start() {
        let mut rng = StdRng::seed_from_u64(3);
        let now = Utc.with_ymd_and_hms(2025, 10, 20, 9, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2025, 10, 23, 9, 0, 0).unwrap();

        let code = issue_code(&mut rng, "year-one", date(2025, 10, 22), until, now, "staff")
            .unwrap();
        assert_eq!(code.week_start, date(2025, 10, 19));
        assert!(code.active);
    }

    #[test]
    fn tally_maps_statuses_and_fills_missing_weeks_as_absent() {
        let assignment = sample_assignment();
        let logs = vec![
            AsyncLog {
                week_number: 1,
                status: LogStatus::Verified,
                ..verified_log(&assignment, 1)
            },
            AsyncLog {
                week_number: 2,
                status: LogStatus::Manual,
                ..verified_log(&assignment, 2)
            },
            AsyncLog {
                week_number: 3,
                status: LogStatus::Excused,
                ..verified_log(&assignment, 3)
            },
            AsyncLog {
                week_number: 4,
                status: LogStatus::Rejected,
                ..verified_log(&assignment, 4)
            },
        ];

        let counts = tally_async_logs(&logs, 6);
        assert_eq!(counts.present, 2);
        assert_eq!(counts.excused, 1);
        // One rejected week plus two never-logged weeks.
        assert_eq!(counts.absent, 3);
        assert_eq!(counts.countable_sessions, 6);
    }

    #[test]
    fn tally_ignores_weeks_beyond_the_elapsed_horizon() {
        let assignment = sample_assignment();
        let logs = vec![AsyncLog {
            week_number: 9,
            ..verified_log(&assignment, 9)
        }];
        let counts = tally_async_logs(&logs, 4);
        assert_eq!(counts.present, 0);
        assert_eq!(counts.absent, 4);
    }

    #[test]
    fn elapsed_weeks_clamps_to_schedule() {
        let assignment = sample_assignment();
        assert_eq!(elapsed_weeks(&assignment, date(2025, 9, 1)), 0);
        assert_eq!(elapsed_weeks(&assignment, date(2025, 10, 19)), 3);
        assert_eq!(elapsed_weeks(&assignment, date(2027, 1, 1)), 40);
    }
}
