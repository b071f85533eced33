use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod async_code;
mod attendance;
mod cohort;
mod db;
mod error;
mod exams;
mod graduation;
mod models;
mod report;

use cohort::{CohortInputs, Thresholds};
use error::{IssueError, RedeemError};
use models::{AdminStatus, LogStatus};

#[derive(Parser)]
#[command(name = "graduation-engine")]
#[command(about = "Attendance and graduation eligibility engine for a two-year program", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ThresholdArgs {
    #[arg(long, default_value_t = attendance::DEFAULT_REQUIRED_ATTENDANCE)]
    required_attendance: f64,
    #[arg(long, default_value_t = exams::DEFAULT_REQUIRED_AVERAGE)]
    required_average: f64,
    #[arg(long, default_value_t = exams::DEFAULT_REQUIRED_MINIMUM)]
    required_minimum: f64,
}

impl ThresholdArgs {
    fn as_thresholds(&self) -> Thresholds {
        Thresholds {
            required_attendance: self.required_attendance,
            required_average: self.required_average,
            required_minimum: self.required_minimum,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import attendance marks from a CSV file
    ImportMarks {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import exam scores from a CSV file
    ImportScores {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Evaluate one student's attendance, exams, and eligibility
    Evaluate {
        #[arg(long)]
        email: String,
        #[arg(long)]
        period: String,
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Compute eligibility for every student in one pass
    Cohort {
        /// The active academic period
        #[arg(long)]
        period: String,
        #[arg(long)]
        grade: Option<String>,
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Generate a markdown eligibility report
    Report {
        #[arg(long)]
        period: String,
        #[arg(long)]
        grade: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Issue an asynchronous-attendance code for a grade and week
    IssueCode {
        #[arg(long)]
        grade: String,
        #[arg(long)]
        week_of: String,
        #[arg(long, default_value_t = 72)]
        valid_hours: i64,
        #[arg(long)]
        staff: String,
    },
    /// Deactivate a code before its validity window closes
    DeactivateCode {
        #[arg(long)]
        code: String,
    },
    /// Redeem a code as a verified asynchronous week
    RedeemCode {
        #[arg(long)]
        code: String,
        #[arg(long)]
        email: String,
        /// Defaults to the week the code was issued for
        #[arg(long)]
        week_of: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Mark an asynchronous week manually as staff
    MarkWeek {
        #[arg(long)]
        email: String,
        #[arg(long)]
        week: u32,
        /// One of manual, excused, rejected
        #[arg(long)]
        status: String,
        #[arg(long)]
        staff: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Evaluate a student's asynchronous attendance from their weekly log
    AsyncSummary {
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = attendance::DEFAULT_REQUIRED_ATTENDANCE)]
        required_attendance: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cohort_graduation_engine=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportMarks { csv } => {
            let imported = db::import_marks_csv(&pool, &csv).await?;
            println!("Imported {imported} marks from {}.", csv.display());
        }
        Commands::ImportScores { csv } => {
            let imported = db::import_scores_csv(&pool, &csv).await?;
            println!("Imported {imported} scores from {}.", csv.display());
        }
        Commands::Evaluate {
            email,
            period,
            thresholds,
        } => {
            evaluate_student(&pool, &email, &period, &thresholds.as_thresholds()).await?;
        }
        Commands::Cohort {
            period,
            grade,
            json,
            thresholds,
        } => {
            let inputs = load_cohort_inputs(&pool, &period, grade.as_deref()).await?;
            let outcomes = cohort::aggregate_cohort(&inputs, &thresholds.as_thresholds());

            if json {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            } else if outcomes.is_empty() {
                println!("No students found for this scope.");
            } else {
                for outcome in cohort::sorted_outcomes(&outcomes) {
                    let verdict = if outcome.graduation.eligible {
                        "eligible"
                    } else {
                        "not yet eligible"
                    };
                    let attendance = current_year_label(outcome);
                    let average = match outcome.exams.average {
                        Some(average) => format!("{average:.1}"),
                        None => "none".to_string(),
                    };
                    println!(
                        "- {} ({}) {}: attendance {}, exam average {}",
                        outcome.full_name, outcome.email, verdict, attendance, average
                    );
                }
            }
        }
        Commands::Report {
            period,
            grade,
            out,
            thresholds,
        } => {
            let thresholds = thresholds.as_thresholds();
            let inputs = load_cohort_inputs(&pool, &period, grade.as_deref()).await?;
            let outcomes = cohort::aggregate_cohort(&inputs, &thresholds);
            let report = report::build_report(&period, grade.as_deref(), &outcomes, &thresholds);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::IssueCode {
            grade,
            week_of,
            valid_hours,
            staff,
        } => {
            let week_start = match async_code::parse_week_of(&week_of) {
                Ok(date) => date,
                Err(refusal) => {
                    println!("Issuance refused ({}): {refusal}", refusal.reason());
                    return Ok(());
                }
            };

            let now = Utc::now();
            let valid_until = now + Duration::hours(valid_hours.max(1));
            let mut rng = StdRng::from_entropy();

            match async_code::issue_code(&mut rng, &grade, week_start, valid_until, now, &staff) {
                Ok(code) => {
                    if db::insert_code(&pool, &code).await? {
                        println!(
                            "Issued code {} for grade {} week of {} (valid until {}).",
                            code.code, code.grade, code.week_start, code.valid_until
                        );
                    } else {
                        let refusal = IssueError::ActiveCodeExists {
                            grade: code.grade,
                            week_start: code.week_start,
                        };
                        println!("Issuance refused ({}): {refusal}", refusal.reason());
                    }
                }
                Err(refusal) => {
                    println!("Issuance refused ({}): {refusal}", refusal.reason());
                }
            }
        }
        Commands::DeactivateCode { code } => {
            if db::deactivate_code(&pool, &code).await? {
                println!("Code {code} deactivated.");
            } else {
                println!("No code {code} found.");
            }
        }
        Commands::RedeemCode {
            code,
            email,
            week_of,
            notes,
        } => {
            redeem_code(&pool, &code, &email, week_of.as_deref(), notes).await?;
        }
        Commands::MarkWeek {
            email,
            week,
            status,
            staff,
            notes,
        } => {
            let status = AdminStatus::parse(&status)
                .with_context(|| format!("unknown status {status:?}, expected manual, excused, or rejected"))?;

            let student = db::fetch_student_by_email(&pool, &email).await?;
            let assignment = db::fetch_assignment(&pool, student.student_id)
                .await?
                .with_context(|| format!("{email} has no asynchronous assignment"))?;

            match async_code::check_admin_action(&assignment, week) {
                Ok(week_start) => {
                    let log = async_code::build_admin_log(
                        &assignment,
                        week,
                        week_start,
                        status,
                        &staff,
                        notes,
                    );
                    db::upsert_admin_log(&pool, &log).await?;
                    println!(
                        "Week {} marked {} for {}.",
                        week,
                        log.status,
                        student.full_name
                    );
                }
                Err(refusal) => {
                    println!("Action refused ({}): {refusal}", refusal.reason());
                }
            }
        }
        Commands::AsyncSummary {
            email,
            required_attendance,
        } => {
            let student = db::fetch_student_by_email(&pool, &email).await?;
            let assignment = db::fetch_assignment(&pool, student.student_id)
                .await?
                .with_context(|| format!("{email} has no asynchronous assignment"))?;

            let logs = db::fetch_logs(&pool, assignment.id).await?;
            let elapsed = async_code::elapsed_weeks(&assignment, Utc::now().date_naive());
            let counts = async_code::tally_async_logs(&logs, elapsed);
            let stats = attendance::evaluate_attendance_counts(&counts, required_attendance);

            println!(
                "Asynchronous attendance for {} (weeks 1..={} of {}):",
                student.full_name, elapsed, assignment.total_weeks
            );
            println!(
                "  {} present-equivalent, {} excused, {} absent-equivalent",
                stats.present_count, stats.excused_count, stats.absent_count
            );
            println!(
                "  {:.1}% of {} effective weeks (required {:.0}%) - {}",
                stats.percentage,
                stats.effective_total,
                stats.required_percentage,
                if stats.met { "met" } else { "not met" }
            );
        }
    }

    Ok(())
}

fn current_year_label(outcome: &cohort::StudentOutcome) -> String {
    let figures = outcome.year_two.as_ref().unwrap_or(&outcome.year_one);
    match &figures.stats {
        Some(stats) => format!("{:.1}%", stats.percentage),
        None => "none".to_string(),
    }
}

async fn evaluate_student(
    pool: &PgPool,
    email: &str,
    period: &str,
    thresholds: &Thresholds,
) -> anyhow::Result<()> {
    let student = db::fetch_student_by_email(pool, email).await?;
    let countable = db::fetch_countable_session_count(pool, period).await?;
    let marks = db::fetch_marks_for_student(pool, student.student_id, period).await?;
    let scores = db::fetch_scores_for_student(pool, student.student_id, period).await?;

    let attendance_stats =
        attendance::evaluate_attendance(&marks, countable, thresholds.required_attendance);
    let exam_stats = exams::evaluate_exams(
        &scores,
        thresholds.required_average,
        thresholds.required_minimum,
    );
    let status = graduation::evaluate_graduation(&attendance_stats, &exam_stats);

    println!("{} ({}) in {}:", student.full_name, student.email, period);
    println!(
        "  Attendance: {:.1}% of {} effective sessions (required {:.0}%) - {}",
        attendance_stats.percentage,
        attendance_stats.effective_total,
        attendance_stats.required_percentage,
        if attendance_stats.met { "met" } else { "not met" }
    );
    println!(
        "  Exams: overall {:.1} (required {:.0}) - {}",
        exam_stats.overall_average,
        exam_stats.required_average,
        if exam_stats.overall_met { "met" } else { "not met" }
    );
    for section in &exam_stats.section_averages {
        println!(
            "    - {}: {:.1} (minimum {:.0}) - {}",
            section.section,
            section.average,
            exam_stats.required_minimum,
            if section.passing_met { "passing" } else { "failing" }
        );
    }
    println!(
        "  Eligible to graduate: {}",
        if status.eligible { "yes" } else { "no" }
    );

    Ok(())
}

async fn load_cohort_inputs(
    pool: &PgPool,
    active_period: &str,
    grade: Option<&str>,
) -> anyhow::Result<CohortInputs> {
    let roster = db::fetch_roster(pool, grade).await?;

    let mut periods: Vec<String> = roster
        .iter()
        .map(|entry| entry.enrolled_period.clone())
        .collect();
    periods.push(active_period.to_string());
    periods.sort();
    periods.dedup();

    let attendance = db::fetch_attendance_counts(pool, &periods).await?;
    let exams = db::fetch_exam_aggregates(pool, active_period).await?;

    Ok(CohortInputs {
        active_period: active_period.to_string(),
        roster,
        attendance,
        exams,
    })
}

async fn redeem_code(
    pool: &PgPool,
    code: &str,
    email: &str,
    week_of: Option<&str>,
    notes: Option<String>,
) -> anyhow::Result<()> {
    let refuse = |refusal: &RedeemError| {
        println!("Redemption refused ({}): {refusal}", refusal.reason());
    };

    let student = db::fetch_student_by_email(pool, email).await?;
    let assignment = db::fetch_assignment(pool, student.student_id)
        .await?
        .with_context(|| format!("{email} has no asynchronous assignment"))?;

    let Some(code_row) = db::fetch_code(pool, code).await? else {
        refuse(&RedeemError::CodeNotFound);
        return Ok(());
    };

    let target_week = match week_of {
        Some(raw) => match async_code::parse_week_of(raw) {
            Ok(date) => date,
            Err(refusal) => {
                refuse(&refusal);
                return Ok(());
            }
        },
        None => code_row.week_start,
    };

    let existing = match async_code::week_number(
        assignment.start_date,
        target_week,
        assignment.total_weeks,
    ) {
        Some(week_number) => db::fetch_log(pool, assignment.id, week_number).await?,
        None => None,
    };

    let redemption = match async_code::check_redemption(
        Some(&code_row),
        Utc::now(),
        &assignment,
        target_week,
        existing.as_ref(),
    ) {
        Ok(redemption) => redemption,
        Err(refusal) => {
            refuse(&refusal);
            return Ok(());
        }
    };

    let log = async_code::build_verified_log(&assignment, &redemption, &code_row, notes);
    let stored = if redemption.resubmission {
        db::replace_rejected_log(pool, &log).await?
    } else {
        db::insert_verified_log(pool, &log).await?
    };

    if stored {
        println!(
            "Week {} (week of {}) verified for {}.",
            redemption.week_number, redemption.week_start, student.full_name
        );
    } else {
        // Lost the insert race or the rejected row was overwritten first;
        // either way the week is no longer ours to write.
        let status = existing.map(|log| log.status).unwrap_or(LogStatus::Verified);
        refuse(&RedeemError::AlreadyLogged {
            week_number: redemption.week_number,
            status,
        });
    }

    Ok(())
}
