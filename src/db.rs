use std::collections::HashMap;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::cohort::RosterEntry;
use crate::models::{
    Assignment, AsyncCode, AsyncLog, AttendanceCounts, AttendanceMark, AttendanceStatus,
    ExamScore, LogStatus, SectionAggregate, YearLevel,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Mina Gerges",
            "mina.gerges@stmina.example",
            "year-one",
            YearLevel::First,
            "2025-2026",
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Sara Habib",
            "sara.habib@stmina.example",
            "year-two",
            YearLevel::Second,
            "2024-2025",
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Peter Azmy",
            "peter.azmy@stmina.example",
            "year-one",
            YearLevel::First,
            "2025-2026",
        ),
    ];

    for (id, name, email, grade, year_level, enrolled_period) in students {
        sqlx::query(
            r#"
            INSERT INTO graduation_engine.students
            (id, full_name, email, grade, year_level, enrolled_period)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                grade = EXCLUDED.grade,
                year_level = EXCLUDED.year_level,
                enrolled_period = EXCLUDED.enrolled_period
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(grade)
        .bind(year_level.as_i16())
        .bind(enrolled_period)
        .execute(pool)
        .await?;
    }

    let sessions = vec![
        ("2025-2026", NaiveDate::from_ymd_opt(2025, 10, 5).context("invalid date")?, true),
        ("2025-2026", NaiveDate::from_ymd_opt(2025, 10, 12).context("invalid date")?, true),
        ("2025-2026", NaiveDate::from_ymd_opt(2025, 10, 19).context("invalid date")?, true),
        // Midterm day, excluded from the countable universe.
        ("2025-2026", NaiveDate::from_ymd_opt(2025, 10, 26).context("invalid date")?, false),
        ("2024-2025", NaiveDate::from_ymd_opt(2024, 10, 6).context("invalid date")?, true),
        ("2024-2025", NaiveDate::from_ymd_opt(2024, 10, 13).context("invalid date")?, true),
    ];

    for (period, held_on, countable) in sessions {
        sqlx::query(
            r#"
            INSERT INTO graduation_engine.sessions (id, period, held_on, countable)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (period, held_on) DO UPDATE SET countable = EXCLUDED.countable
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(period)
        .bind(held_on)
        .bind(countable)
        .execute(pool)
        .await?;
    }

    let marks = vec![
        ("mina.gerges@stmina.example", "2025-2026", "2025-10-05", "present"),
        ("mina.gerges@stmina.example", "2025-2026", "2025-10-12", "late"),
        ("mina.gerges@stmina.example", "2025-2026", "2025-10-19", "present"),
        ("sara.habib@stmina.example", "2025-2026", "2025-10-05", "present"),
        ("sara.habib@stmina.example", "2025-2026", "2025-10-12", "excused"),
        ("sara.habib@stmina.example", "2024-2025", "2024-10-06", "present"),
        ("sara.habib@stmina.example", "2024-2025", "2024-10-13", "present"),
        ("peter.azmy@stmina.example", "2025-2026", "2025-10-05", "absent"),
    ];

    for (email, period, held_on, status) in marks {
        let held_on = NaiveDate::parse_from_str(held_on, "%Y-%m-%d")?;
        sqlx::query(
            r#"
            INSERT INTO graduation_engine.attendance_marks (session_id, student_id, status)
            SELECT s.id, st.id, $3
            FROM graduation_engine.sessions s,
                 graduation_engine.students st
            WHERE s.period = $1 AND s.held_on = $2 AND st.email = $4
            ON CONFLICT (session_id, student_id) DO UPDATE SET status = EXCLUDED.status
            "#,
        )
        .bind(period)
        .bind(held_on)
        .bind(status)
        .bind(email)
        .execute(pool)
        .await?;
    }

    let scores = vec![
        ("mina.gerges@stmina.example", "bible-midterm", "Bible Studies", "2025-2026", 80.0),
        ("mina.gerges@stmina.example", "bible-final", "Bible Studies", "2025-2026", 90.0),
        ("mina.gerges@stmina.example", "dogma-midterm", "Dogma", "2025-2026", 70.0),
        ("sara.habib@stmina.example", "bible-midterm", "Bible Studies", "2025-2026", 88.0),
    ];

    for (email, exam_name, section, period, percentage) in scores {
        sqlx::query(
            r#"
            INSERT INTO graduation_engine.exam_scores
            (student_id, exam_name, section, period, percentage)
            SELECT id, $2, $3, $4, $5 FROM graduation_engine.students WHERE email = $1
            ON CONFLICT (student_id, exam_name) DO UPDATE
            SET section = EXCLUDED.section,
                period = EXCLUDED.period,
                percentage = EXCLUDED.percentage
            "#,
        )
        .bind(email)
        .bind(exam_name)
        .bind(section)
        .bind(period)
        .bind(percentage)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO graduation_engine.async_assignments
        (id, student_id, grade, start_date, total_weeks)
        SELECT $1, id, grade, $2, $3 FROM graduation_engine.students
        WHERE email = 'peter.azmy@stmina.example'
        ON CONFLICT (student_id) DO NOTHING
        "#,
    )
    .bind(Uuid::parse_str("7b7a4d0e-5c1f-4f8a-9f23-1d2e3c4b5a69")?)
    .bind(NaiveDate::from_ymd_opt(2025, 10, 5).context("invalid date")?)
    .bind(40i32)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_roster(pool: &PgPool, grade: Option<&str>) -> anyhow::Result<Vec<RosterEntry>> {
    let mut query = String::from(
        "SELECT id, full_name, email, grade, year_level, enrolled_period \
         FROM graduation_engine.students",
    );
    if grade.is_some() {
        query.push_str(" WHERE grade = $1");
    }
    query.push_str(" ORDER BY full_name");

    let mut rows = sqlx::query(&query);
    if let Some(value) = grade {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut roster = Vec::new();

    for row in records {
        let year_level: i16 = row.get("year_level");
        let year_level = YearLevel::from_i16(year_level)
            .with_context(|| format!("student {} has year level {year_level}", row.get::<Uuid, _>("id")))?;
        roster.push(RosterEntry {
            student_id: row.get("id"),
            full_name: row.get("full_name"),
            email: row.get("email"),
            grade: row.get("grade"),
            year_level,
            enrolled_period: row.get("enrolled_period"),
        });
    }

    Ok(roster)
}

pub async fn fetch_student_by_email(pool: &PgPool, email: &str) -> anyhow::Result<RosterEntry> {
    let row = sqlx::query(
        "SELECT id, full_name, email, grade, year_level, enrolled_period \
         FROM graduation_engine.students WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no student with email {email}"))?;

    let year_level: i16 = row.get("year_level");
    Ok(RosterEntry {
        student_id: row.get("id"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        grade: row.get("grade"),
        year_level: YearLevel::from_i16(year_level)
            .with_context(|| format!("student {email} has year level {year_level}"))?,
        enrolled_period: row.get("enrolled_period"),
    })
}

pub async fn fetch_countable_session_count(pool: &PgPool, period: &str) -> anyhow::Result<u32> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS sessions FROM graduation_engine.sessions \
         WHERE countable AND period = $1",
    )
    .bind(period)
    .fetch_one(pool)
    .await?;
    let sessions: i64 = row.get("sessions");
    Ok(sessions as u32)
}

/// Marks grouped by (student, period, status), restricted to countable
/// sessions. One query regardless of cohort size; unknown status strings are
/// dropped with a warning so a bad row never sinks the aggregate pass.
pub async fn fetch_attendance_counts(
    pool: &PgPool,
    periods: &[String],
) -> anyhow::Result<HashMap<(Uuid, String), AttendanceCounts>> {
    let mut session_totals: HashMap<String, u32> = HashMap::new();
    let rows = sqlx::query(
        "SELECT period, COUNT(*) AS sessions FROM graduation_engine.sessions \
         WHERE countable AND period = ANY($1) GROUP BY period",
    )
    .bind(periods)
    .fetch_all(pool)
    .await?;
    for row in rows {
        let sessions: i64 = row.get("sessions");
        session_totals.insert(row.get("period"), sessions as u32);
    }

    let rows = sqlx::query(
        "SELECT m.student_id, s.period, m.status, COUNT(*) AS marks \
         FROM graduation_engine.attendance_marks m \
         JOIN graduation_engine.sessions s ON s.id = m.session_id \
         WHERE s.countable AND s.period = ANY($1) \
         GROUP BY m.student_id, s.period, m.status",
    )
    .bind(periods)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<(Uuid, String), AttendanceCounts> = HashMap::new();

    for row in rows {
        let student_id: Uuid = row.get("student_id");
        let period: String = row.get("period");
        let status: String = row.get("status");
        let marks: i64 = row.get("marks");

        let Some(status) = AttendanceStatus::parse(&status) else {
            tracing::warn!(student = %student_id, %status, "ignoring unknown attendance status");
            continue;
        };

        let countable_sessions = session_totals.get(&period).copied().unwrap_or(0);
        let entry = grouped
            .entry((student_id, period))
            .or_insert_with(|| AttendanceCounts {
                countable_sessions,
                ..AttendanceCounts::default()
            });

        match status {
            AttendanceStatus::Present => entry.present += marks as u32,
            AttendanceStatus::Late => entry.late += marks as u32,
            AttendanceStatus::Absent => entry.absent += marks as u32,
            AttendanceStatus::Excused => entry.excused += marks as u32,
        }
    }

    Ok(grouped)
}

/// Exam scores grouped by (student, section) as (sum, count) pairs.
pub async fn fetch_exam_aggregates(
    pool: &PgPool,
    period: &str,
) -> anyhow::Result<HashMap<Uuid, Vec<SectionAggregate>>> {
    let rows = sqlx::query(
        "SELECT student_id, section, SUM(percentage) AS total, COUNT(*) AS scores \
         FROM graduation_engine.exam_scores WHERE period = $1 \
         GROUP BY student_id, section",
    )
    .bind(period)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<Uuid, Vec<SectionAggregate>> = HashMap::new();

    for row in rows {
        let student_id: Uuid = row.get("student_id");
        let scores: i64 = row.get("scores");
        grouped.entry(student_id).or_default().push(SectionAggregate {
            section: row.get("section"),
            total: row.get("total"),
            count: scores as u32,
        });
    }

    Ok(grouped)
}

pub async fn fetch_marks_for_student(
    pool: &PgPool,
    student_id: Uuid,
    period: &str,
) -> anyhow::Result<Vec<AttendanceMark>> {
    let rows = sqlx::query(
        "SELECT m.session_id, m.student_id, m.status \
         FROM graduation_engine.attendance_marks m \
         JOIN graduation_engine.sessions s ON s.id = m.session_id \
         WHERE s.countable AND s.period = $1 AND m.student_id = $2",
    )
    .bind(period)
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let mut marks = Vec::new();
    for row in rows {
        let status: String = row.get("status");
        let Some(status) = AttendanceStatus::parse(&status) else {
            tracing::warn!(student = %student_id, %status, "ignoring unknown attendance status");
            continue;
        };
        marks.push(AttendanceMark {
            session_id: row.get("session_id"),
            student_id: row.get("student_id"),
            status,
        });
    }

    Ok(marks)
}

pub async fn fetch_scores_for_student(
    pool: &PgPool,
    student_id: Uuid,
    period: &str,
) -> anyhow::Result<Vec<ExamScore>> {
    let rows = sqlx::query(
        "SELECT student_id, section, percentage FROM graduation_engine.exam_scores \
         WHERE period = $1 AND student_id = $2",
    )
    .bind(period)
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ExamScore {
            student_id: row.get("student_id"),
            section: row.get("section"),
            percentage: row.get("percentage"),
        })
        .collect())
}

pub async fn import_marks_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        email: String,
        period: String,
        held_on: NaiveDate,
        status: String,
        #[serde(default = "default_countable")]
        countable: bool,
    }

    fn default_countable() -> bool {
        true
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let status = AttendanceStatus::parse(&row.status)
            .with_context(|| format!("unknown attendance status {:?}", row.status))?;

        let session_id: Uuid = sqlx::query(
            r#"
            INSERT INTO graduation_engine.sessions (id, period, held_on, countable)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (period, held_on) DO UPDATE SET countable = EXCLUDED.countable
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.period)
        .bind(row.held_on)
        .bind(row.countable)
        .fetch_one(pool)
        .await?
        .get("id");

        let student_id: Uuid = sqlx::query(
            "SELECT id FROM graduation_engine.students WHERE email = $1",
        )
        .bind(&row.email)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no student with email {}", row.email))?
        .get("id");

        sqlx::query(
            r#"
            INSERT INTO graduation_engine.attendance_marks (session_id, student_id, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (session_id, student_id) DO UPDATE SET status = EXCLUDED.status
            "#,
        )
        .bind(session_id)
        .bind(student_id)
        .bind(status.as_str())
        .execute(pool)
        .await?;

        imported += 1;
    }

    tracing::info!(imported, "attendance marks imported");
    Ok(imported)
}

pub async fn import_scores_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        email: String,
        exam_name: String,
        section: String,
        period: String,
        percentage: f64,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        if !(0.0..=100.0).contains(&row.percentage) {
            anyhow::bail!(
                "score {} for {} is outside 0..=100",
                row.percentage,
                row.email
            );
        }

        let student_id: Uuid = sqlx::query(
            "SELECT id FROM graduation_engine.students WHERE email = $1",
        )
        .bind(&row.email)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no student with email {}", row.email))?
        .get("id");

        sqlx::query(
            r#"
            INSERT INTO graduation_engine.exam_scores
            (student_id, exam_name, section, period, percentage)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_id, exam_name) DO UPDATE
            SET section = EXCLUDED.section,
                period = EXCLUDED.period,
                percentage = EXCLUDED.percentage
            "#,
        )
        .bind(student_id)
        .bind(&row.exam_name)
        .bind(&row.section)
        .bind(&row.period)
        .bind(row.percentage)
        .execute(pool)
        .await?;

        imported += 1;
    }

    tracing::info!(imported, "exam scores imported");
    Ok(imported)
}

/// Returns false when an active code already holds the (grade, week_start)
/// slot; the partial unique index is the arbiter under concurrent issuance.
pub async fn insert_code(pool: &PgPool, code: &AsyncCode) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO graduation_engine.async_codes
        (code, grade, week_start, valid_until, active, issued_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (grade, week_start) WHERE active DO NOTHING
        "#,
    )
    .bind(&code.code)
    .bind(&code.grade)
    .bind(code.week_start)
    .bind(code.valid_until)
    .bind(code.active)
    .bind(&code.issued_by)
    .execute(pool)
    .await?;

    let inserted = result.rows_affected() > 0;
    if inserted {
        tracing::info!(grade = %code.grade, week_start = %code.week_start, "async code issued");
    }
    Ok(inserted)
}

pub async fn deactivate_code(pool: &PgPool, code: &str) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "UPDATE graduation_engine.async_codes SET active = FALSE WHERE code = $1",
    )
    .bind(code)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_code(pool: &PgPool, code: &str) -> anyhow::Result<Option<AsyncCode>> {
    let row = sqlx::query(
        "SELECT code, grade, week_start, valid_until, active, issued_by \
         FROM graduation_engine.async_codes WHERE code = $1",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| AsyncCode {
        code: row.get("code"),
        grade: row.get("grade"),
        week_start: row.get("week_start"),
        valid_until: row.get("valid_until"),
        active: row.get("active"),
        issued_by: row.get("issued_by"),
    }))
}

pub async fn fetch_assignment(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Option<Assignment>> {
    let row = sqlx::query(
        "SELECT id, student_id, grade, start_date, total_weeks \
         FROM graduation_engine.async_assignments WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| {
        let total_weeks: i32 = row.get("total_weeks");
        Assignment {
            id: row.get("id"),
            student_id: row.get("student_id"),
            grade: row.get("grade"),
            start_date: row.get("start_date"),
            total_weeks: total_weeks as u32,
        }
    }))
}

fn log_from_row(row: sqlx::postgres::PgRow) -> anyhow::Result<AsyncLog> {
    let week_number: i32 = row.get("week_number");
    let status: String = row.get("status");
    let status = LogStatus::parse(&status)
        .with_context(|| format!("unknown log status {status:?}"))?;

    Ok(AsyncLog {
        assignment_id: row.get("assignment_id"),
        week_number: week_number as u32,
        week_start: row.get("week_start"),
        status,
        code: row.get("code"),
        marked_by: row.get("marked_by"),
        notes: row.get("notes"),
        student_notes: row.get("student_notes"),
    })
}

pub async fn fetch_log(
    pool: &PgPool,
    assignment_id: Uuid,
    week_number: u32,
) -> anyhow::Result<Option<AsyncLog>> {
    let row = sqlx::query(
        "SELECT assignment_id, week_number, week_start, status, code, marked_by, notes, student_notes \
         FROM graduation_engine.async_logs WHERE assignment_id = $1 AND week_number = $2",
    )
    .bind(assignment_id)
    .bind(week_number as i32)
    .fetch_optional(pool)
    .await?;

    row.map(log_from_row).transpose()
}

pub async fn fetch_logs(pool: &PgPool, assignment_id: Uuid) -> anyhow::Result<Vec<AsyncLog>> {
    let rows = sqlx::query(
        "SELECT assignment_id, week_number, week_start, status, code, marked_by, notes, student_notes \
         FROM graduation_engine.async_logs WHERE assignment_id = $1 ORDER BY week_number",
    )
    .bind(assignment_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(log_from_row).collect()
}

/// First write wins: a concurrent redemption for the same week loses the
/// insert and the caller reports the week as already logged.
pub async fn insert_verified_log(pool: &PgPool, log: &AsyncLog) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO graduation_engine.async_logs
        (assignment_id, week_number, week_start, status, code, marked_by, notes, student_notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (assignment_id, week_number) DO NOTHING
        "#,
    )
    .bind(log.assignment_id)
    .bind(log.week_number as i32)
    .bind(log.week_start)
    .bind(log.status.as_str())
    .bind(&log.code)
    .bind(&log.marked_by)
    .bind(&log.notes)
    .bind(&log.student_notes)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Resubmission path: only flips a row that is still rejected, so a racing
/// staff overwrite is never clobbered.
pub async fn replace_rejected_log(pool: &PgPool, log: &AsyncLog) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE graduation_engine.async_logs
        SET status = $3, code = $4, marked_by = NULL, notes = NULL, student_notes = $5
        WHERE assignment_id = $1 AND week_number = $2 AND status = 'rejected'
        "#,
    )
    .bind(log.assignment_id)
    .bind(log.week_number as i32)
    .bind(log.status.as_str())
    .bind(&log.code)
    .bind(&log.student_notes)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn upsert_admin_log(pool: &PgPool, log: &AsyncLog) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO graduation_engine.async_logs
        (assignment_id, week_number, week_start, status, code, marked_by, notes, student_notes)
        VALUES ($1, $2, $3, $4, NULL, $5, $6, NULL)
        ON CONFLICT (assignment_id, week_number) DO UPDATE
        SET status = EXCLUDED.status,
            code = NULL,
            marked_by = EXCLUDED.marked_by,
            notes = EXCLUDED.notes
        "#,
    )
    .bind(log.assignment_id)
    .bind(log.week_number as i32)
    .bind(log.week_start)
    .bind(log.status.as_str())
    .bind(&log.marked_by)
    .bind(&log.notes)
    .execute(pool)
    .await?;

    tracing::info!(
        assignment = %log.assignment_id,
        week = log.week_number,
        status = %log.status,
        "async week marked by staff"
    );
    Ok(())
}
