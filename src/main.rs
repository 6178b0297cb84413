use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

mod aggregate;
mod config;
mod dashboard;
mod db;
mod engine;
mod error;
mod models;
mod normalize;
mod performance;
mod report;
mod store;
mod telemetry;

use config::Settings;
use engine::Engine;
use models::{PerformanceSnapshot, SectionStats, StudentRow};
use store::InMemoryStore;

#[derive(Parser)]
#[command(name = "school-grade-rollup")]
#[command(about = "Student performance and cohort dashboards for a school year", long_about = None)]
struct Cli {
    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct YearArg {
    /// School year id; defaults to the current year
    #[arg(long)]
    year: Option<Uuid>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a small sample school year
    Seed,
    /// Import scores from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[command(flatten)]
        year: YearArg,
    },
    /// Show one student's performance
    Student {
        enrollment_id: Uuid,
        #[command(flatten)]
        year: YearArg,
    },
    /// Show a section dashboard
    Section {
        section_id: Uuid,
        #[command(flatten)]
        year: YearArg,
    },
    /// Show a technical mention dashboard
    Mention {
        mention_section_id: Uuid,
        #[command(flatten)]
        year: YearArg,
    },
    /// Show the year dashboard
    Year {
        #[command(flatten)]
        year: YearArg,
    },
    /// Validate an evaluation and mark it as graded
    Finalize {
        evaluation_id: Uuid,
        #[command(flatten)]
        year: YearArg,
    },
    /// Generate a markdown year report
    Report {
        #[command(flatten)]
        year: YearArg,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn resolve_year(pool: &PgPool, year: &YearArg) -> anyhow::Result<Uuid> {
    match year.year {
        Some(id) => Ok(id),
        None => db::current_year_id(pool).await,
    }
}

async fn load_engine(pool: &PgPool, year: &YearArg) -> anyhow::Result<(Uuid, Engine<InMemoryStore>)> {
    let year_id = resolve_year(pool, year).await?;
    let store = db::load_year(pool, year_id).await?;
    Ok((year_id, Engine::new(store)))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn describe_snapshot(title: &str, snapshot: &PerformanceSnapshot) {
    let average = match (snapshot.literal_average, snapshot.general_average) {
        (Some(letter), _) => letter.to_string(),
        (None, Some(average)) => format!("{average:.2}"),
        (None, None) => "n/a".to_string(),
    };
    println!(
        "{title}: average {average}, {}/{} subjects approved, {:?}",
        snapshot.subjects_approved, snapshot.total_subjects, snapshot.general_state
    );
    for subject in &snapshot.subjects {
        let value = match (subject.literal, subject.average) {
            (Some(letter), _) => letter.to_string(),
            (None, Some(average)) => format!("{average:.2}"),
            (None, None) => "observed".to_string(),
        };
        println!(
            "  - {}: {} across {} evaluations ({:?})",
            subject.label, value, subject.evaluations, subject.state
        );
    }
}

fn describe_rows(rows: &[StudentRow]) {
    for (rank, row) in rows.iter().enumerate() {
        println!("  {}. {} ranking {:.2}", rank + 1, row.student_name, row.ranking_value);
    }
}

fn describe_section(stats: &SectionStats) {
    println!(
        "{} ({}, {}): {}/{} approved ({:.2}%), average {:.2}",
        stats.name,
        stats.level,
        stats.evaluation_type,
        stats.approved_students,
        stats.total_students,
        stats.approval_rate,
        stats.general_average
    );
    if !stats.top_students.is_empty() {
        println!("Top students:");
        describe_rows(&stats.top_students);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load()?;
    telemetry::init_tracing(settings.telemetry())?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.database().max_connections)
        .connect(settings.database().url()?)
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
        Commands::Import { csv, year } => {
            let year_id = resolve_year(&pool, &year).await?;
            let outcome = db::import_csv(&pool, year_id, &csv).await?;
            tracing::info!(saved = outcome.saved, rejected = outcome.rejected, "import finished");
            println!(
                "Saved {} scores from {} ({} rejected).",
                outcome.saved,
                csv.display(),
                outcome.rejected
            );
        }
        Commands::Student { enrollment_id, year } => {
            let (_, mut engine) = load_engine(&pool, &year).await?;
            let performance = engine.get_student_performance(enrollment_id)?;
            if cli.json {
                print_json(&performance)?;
            } else {
                println!("{}", performance.student_name);
                describe_snapshot("General", &performance.general);
                if let Some(mention) = &performance.mention {
                    describe_snapshot("Mention", mention);
                }
            }
        }
        Commands::Section { section_id, year } => {
            let (_, mut engine) = load_engine(&pool, &year).await?;
            let stats = engine.get_section_dashboard(section_id)?;
            if cli.json {
                print_json(&stats)?;
            } else {
                describe_section(&stats);
            }
        }
        Commands::Mention { mention_section_id, year } => {
            let (_, mut engine) = load_engine(&pool, &year).await?;
            let stats = engine.get_mention_dashboard(mention_section_id)?;
            if cli.json {
                print_json(&stats)?;
            } else {
                describe_section(&stats);
            }
        }
        Commands::Year { year } => {
            let (year_id, mut engine) = load_engine(&pool, &year).await?;
            let stats = engine.get_year_dashboard(year_id)?;
            if cli.json {
                print_json(&stats)?;
            } else {
                println!(
                    "{}: {}/{} approved, approval rate {:.2}%",
                    stats.name, stats.approved_students, stats.total_students, stats.approval_rate
                );
                for level in &stats.distribution {
                    println!(
                        "- {}: {}/{} approved ({:.2}%)",
                        level.category.label(),
                        level.approved_students,
                        level.total_students,
                        level.approval_rate
                    );
                }
                if !stats.top_students.is_empty() {
                    println!("Top students:");
                    describe_rows(&stats.top_students);
                }
            }
        }
        Commands::Finalize { evaluation_id, year } => {
            let (_, engine) = load_engine(&pool, &year).await?;
            let summary = match engine.finalize_evaluation(evaluation_id) {
                Ok(summary) => summary,
                Err(err) => {
                    tracing::warn!(evaluation_id = %evaluation_id, error = %err, "evaluation not finalized");
                    return Err(err.into());
                }
            };
            db::mark_finalized(&pool, evaluation_id).await?;
            tracing::info!(evaluation_id = %evaluation_id, "evaluation finalized");
            if cli.json {
                print_json(&summary)?;
            } else {
                println!(
                    "{}: {:?}, {}/{} graded, verdict {:?}, average {}",
                    summary.name,
                    summary.state,
                    summary.qualified,
                    summary.scores,
                    summary.verdict,
                    summary.average
                );
            }
        }
        Commands::Report { year, out } => {
            let (year_id, mut engine) = load_engine(&pool, &year).await?;
            let stats = engine.get_year_dashboard(year_id)?;
            std::fs::write(&out, report::build_report(&stats))
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
