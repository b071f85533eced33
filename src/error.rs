use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::models::LogStatus;

/// Refusals raised while redeeming an asynchronous-attendance code. Each
/// variant carries a stable reason code so callers can branch without
/// matching on message text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RedeemError {
    #[error("code not found")]
    CodeNotFound,

    #[error("code has been deactivated")]
    CodeInactive,

    #[error("code expired at {0}")]
    CodeExpired(DateTime<Utc>),

    #[error("code was issued for grade {code_grade}, assignment is grade {assignment_grade}")]
    GradeMismatch {
        code_grade: String,
        assignment_grade: String,
    },

    #[error("week of {0} is outside the assignment schedule")]
    WeekOutOfRange(NaiveDate),

    #[error("unparsable target week {0:?}, expected YYYY-MM-DD")]
    MalformedTargetWeek(String),

    #[error("week {week_number} is already logged as {status}")]
    AlreadyLogged {
        week_number: u32,
        status: LogStatus,
    },
}

impl RedeemError {
    pub fn reason(&self) -> &'static str {
        match self {
            RedeemError::CodeNotFound => "code_not_found",
            RedeemError::CodeInactive => "code_inactive",
            RedeemError::CodeExpired(_) => "code_expired",
            RedeemError::GradeMismatch { .. } => "grade_mismatch",
            RedeemError::WeekOutOfRange(_) => "week_out_of_range",
            RedeemError::MalformedTargetWeek(_) => "malformed_target_week",
            RedeemError::AlreadyLogged { .. } => "week_already_logged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IssueError {
    #[error("an active code already exists for grade {grade}, week of {week_start}")]
    ActiveCodeExists { grade: String, week_start: NaiveDate },

    #[error("validity window ends at {0}, which is already past")]
    WindowAlreadyClosed(DateTime<Utc>),
}

impl IssueError {
    pub fn reason(&self) -> &'static str {
        match self {
            IssueError::ActiveCodeExists { .. } => "active_code_exists",
            IssueError::WindowAlreadyClosed(_) => "window_already_closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum AdminActionError {
    #[error("week {week_number} is outside 1..={total_weeks}")]
    WeekOutOfRange { week_number: u32, total_weeks: u32 },
}

impl AdminActionError {
    pub fn reason(&self) -> &'static str {
        match self {
            AdminActionError::WeekOutOfRange { .. } => "week_out_of_range",
        }
    }
}
