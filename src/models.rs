use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Excused => "excused",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "present" => Some(AttendanceStatus::Present),
            "late" => Some(AttendanceStatus::Late),
            "absent" => Some(AttendanceStatus::Absent),
            "excused" => Some(AttendanceStatus::Excused),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttendanceMark {
    pub session_id: Uuid,
    pub student_id: Uuid,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone)]
pub struct ExamScore {
    pub student_id: Uuid,
    pub section: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AttendanceCounts {
    pub present: u32,
    pub late: u32,
    pub absent: u32,
    pub excused: u32,
    pub countable_sessions: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceStats {
    pub present_count: u32,
    pub late_count: u32,
    pub absent_count: u32,
    pub excused_count: u32,
    pub total_countable_sessions: u32,
    pub effective_present: f64,
    pub effective_total: u32,
    pub percentage: f64,
    pub required_percentage: f64,
    pub met: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionAggregate {
    pub section: String,
    pub total: f64,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionAverage {
    pub section: String,
    pub average: f64,
    pub passing_met: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamStats {
    pub section_averages: Vec<SectionAverage>,
    pub overall_average: f64,
    pub overall_met: bool,
    pub all_sections_met: bool,
    pub required_average: f64,
    pub required_minimum: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GraduationStatus {
    pub eligible: bool,
    pub attendance_met: bool,
    pub overall_average_met: bool,
    pub all_sections_met: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum YearLevel {
    First,
    Second,
}

impl YearLevel {
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(YearLevel::First),
            2 => Some(YearLevel::Second),
            _ => None,
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            YearLevel::First => 1,
            YearLevel::Second => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub grade: String,
    pub start_date: NaiveDate,
    pub total_weeks: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsyncCode {
    pub code: String,
    pub grade: String,
    pub week_start: NaiveDate,
    pub valid_until: DateTime<Utc>,
    pub active: bool,
    pub issued_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogStatus {
    Verified,
    Manual,
    Excused,
    Rejected,
}

impl LogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LogStatus::Verified => "verified",
            LogStatus::Manual => "manual",
            LogStatus::Excused => "excused",
            LogStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "verified" => Some(LogStatus::Verified),
            "manual" => Some(LogStatus::Manual),
            "excused" => Some(LogStatus::Excused),
            "rejected" => Some(LogStatus::Rejected),
            _ => None,
        }
    }

    /// Verified and manual weeks count as presence, excused weeks are
    /// attendance-neutral, rejected weeks land in the absent bucket.
    pub fn as_attendance_status(self) -> AttendanceStatus {
        match self {
            LogStatus::Verified | LogStatus::Manual => AttendanceStatus::Present,
            LogStatus::Excused => AttendanceStatus::Excused,
            LogStatus::Rejected => AttendanceStatus::Absent,
        }
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminStatus {
    Manual,
    Excused,
    Rejected,
}

impl AdminStatus {
    pub fn as_log_status(self) -> LogStatus {
        match self {
            AdminStatus::Manual => LogStatus::Manual,
            AdminStatus::Excused => LogStatus::Excused,
            AdminStatus::Rejected => LogStatus::Rejected,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(AdminStatus::Manual),
            "excused" => Some(AdminStatus::Excused),
            "rejected" => Some(AdminStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsyncLog {
    pub assignment_id: Uuid,
    pub week_number: u32,
    pub week_start: NaiveDate,
    pub status: LogStatus,
    pub code: Option<String>,
    pub marked_by: Option<String>,
    pub notes: Option<String>,
    pub student_notes: Option<String>,
}
