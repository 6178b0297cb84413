use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::GradingError;
use crate::models::{
    Cohort, Enrollment, Evaluation, GradingRegime, Letter, MentionSection, SchoolYear, Score,
    Section, SubjectAssignment,
};
use crate::store::{InMemoryStore, RecordStore, ScoreScope};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn cohort_from(section_id: Option<Uuid>, mention_section_id: Option<Uuid>) -> anyhow::Result<Cohort> {
    match (section_id, mention_section_id) {
        (Some(id), None) => Ok(Cohort::Section(id)),
        (None, Some(id)) => Ok(Cohort::Mention(id)),
        _ => anyhow::bail!("record must belong to exactly one section or mention section"),
    }
}

fn cohort_columns(cohort: Cohort) -> (Option<Uuid>, Option<Uuid>) {
    match cohort {
        Cohort::Section(id) => (Some(id), None),
        Cohort::Mention(id) => (None, Some(id)),
    }
}

pub async fn current_year_id(pool: &PgPool) -> anyhow::Result<Uuid> {
    let row = sqlx::query("SELECT id FROM grade_rollup.school_years WHERE is_current")
        .fetch_optional(pool)
        .await?
        .context("no school year is marked as current; pass --year")?;
    Ok(row.get("id"))
}

/// Loads every record of one school year into memory.
pub async fn load_year(pool: &PgPool, year_id: Uuid) -> anyhow::Result<InMemoryStore> {
    let mut store = InMemoryStore::new();

    let year = sqlx::query(
        "SELECT id, name, state, is_current FROM grade_rollup.school_years WHERE id = $1",
    )
    .bind(year_id)
    .fetch_optional(pool)
    .await?
    .ok_or(GradingError::not_found("school year", year_id))?;
    store.years.push(SchoolYear {
        id: year.get("id"),
        name: year.get("name"),
        state: year.get::<String, _>("state").parse()?,
        current: year.get("is_current"),
    });

    let regimes = sqlx::query("SELECT level, kind FROM grade_rollup.grading_regimes WHERE year_id = $1")
        .bind(year_id)
        .fetch_all(pool)
        .await?;
    for row in regimes {
        store.regimes.push(GradingRegime {
            year_id,
            level: row.get::<String, _>("level").parse()?,
            kind: row.get::<String, _>("kind").parse()?,
        });
    }

    let sections = sqlx::query(
        "SELECT id, name, level FROM grade_rollup.sections WHERE year_id = $1 ORDER BY name",
    )
    .bind(year_id)
    .fetch_all(pool)
    .await?;
    for row in sections {
        store.sections.push(Section {
            id: row.get("id"),
            year_id,
            name: row.get("name"),
            level: row.get::<String, _>("level").parse()?,
        });
    }

    let mentions = sqlx::query(
        "SELECT id, name, mention FROM grade_rollup.mention_sections WHERE year_id = $1 ORDER BY name",
    )
    .bind(year_id)
    .fetch_all(pool)
    .await?;
    for row in mentions {
        store.mention_sections.push(MentionSection {
            id: row.get("id"),
            year_id,
            name: row.get("name"),
            mention: row.get("mention"),
        });
    }

    let enrollments = sqlx::query(
        r#"
        SELECT id, student_name, section_id, mention_section_id, is_current, state
        FROM grade_rollup.enrollments
        WHERE year_id = $1
        ORDER BY student_name
        "#,
    )
    .bind(year_id)
    .fetch_all(pool)
    .await?;
    for row in enrollments {
        store.enrollments.push(Enrollment {
            id: row.get("id"),
            year_id,
            student_name: row.get("student_name"),
            section_id: row.get("section_id"),
            mention_section_id: row.get("mention_section_id"),
            current: row.get("is_current"),
            state: row.get::<String, _>("state").parse()?,
        });
    }

    let assignments = sqlx::query(
        r#"
        SELECT a.id, a.section_id, a.mention_section_id, a.subject_id, a.subject_name, a.teacher_name
        FROM grade_rollup.subject_assignments a
        LEFT JOIN grade_rollup.sections s ON s.id = a.section_id
        LEFT JOIN grade_rollup.mention_sections m ON m.id = a.mention_section_id
        WHERE s.year_id = $1 OR m.year_id = $1
        ORDER BY a.subject_name
        "#,
    )
    .bind(year_id)
    .fetch_all(pool)
    .await?;
    for row in assignments {
        store.assignments.push(SubjectAssignment {
            id: row.get("id"),
            cohort: cohort_from(row.get("section_id"), row.get("mention_section_id"))?,
            subject_id: row.get("subject_id"),
            subject_name: row.get("subject_name"),
            teacher_name: row.get("teacher_name"),
        });
    }

    let evaluations = sqlx::query(
        r#"
        SELECT id, name, section_id, mention_section_id, assignment_id, evaluation_date
        FROM grade_rollup.evaluations
        WHERE year_id = $1
        ORDER BY evaluation_date NULLS LAST, name
        "#,
    )
    .bind(year_id)
    .fetch_all(pool)
    .await?;
    for row in evaluations {
        store.evaluations.push(Evaluation {
            id: row.get("id"),
            year_id,
            name: row.get("name"),
            cohort: cohort_from(row.get("section_id"), row.get("mention_section_id"))?,
            assignment_id: row.get("assignment_id"),
            evaluation_date: row.get::<Option<NaiveDate>, _>("evaluation_date"),
        });
    }

    let scores = sqlx::query(
        r#"
        SELECT sc.id, sc.evaluation_id, sc.enrollment_id, sc.score, sc.literal, sc.observation
        FROM grade_rollup.scores sc
        JOIN grade_rollup.evaluations ev ON ev.id = sc.evaluation_id
        WHERE ev.year_id = $1
        ORDER BY ev.evaluation_date NULLS LAST, ev.name
        "#,
    )
    .bind(year_id)
    .fetch_all(pool)
    .await?;
    for row in scores {
        let literal = row
            .get::<Option<String>, _>("literal")
            .map(|value| value.parse::<Letter>())
            .transpose()?;
        store.scores.push(Score {
            id: row.get("id"),
            evaluation_id: row.get("evaluation_id"),
            enrollment_id: row.get("enrollment_id"),
            score: row.get("score"),
            literal,
            observation: row.get("observation"),
        });
    }

    tracing::info!(
        year_id = %year_id,
        sections = store.sections.len(),
        enrollments = store.enrollments.len(),
        scores = store.scores.len(),
        "loaded school year"
    );

    Ok(store)
}

pub async fn save_score(pool: &PgPool, score: &Score) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO grade_rollup.scores
        (id, evaluation_id, enrollment_id, score, literal, observation)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE
        SET score = EXCLUDED.score,
            literal = EXCLUDED.literal,
            observation = EXCLUDED.observation
        "#,
    )
    .bind(score.id)
    .bind(score.evaluation_id)
    .bind(score.enrollment_id)
    .bind(score.score)
    .bind(score.literal.map(Letter::as_str))
    .bind(score.observation.as_deref())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_finalized(pool: &PgPool, evaluation_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("UPDATE grade_rollup.evaluations SET finalized_at = NOW() WHERE id = $1")
        .bind(evaluation_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportOutcome {
    pub saved: usize,
    pub rejected: usize,
}

/// Imports scores for one year from a CSV file.
///
/// Each row goes through the same validation as an interactive write; rows
/// that fail are logged and skipped. A row for an enrollment that already has
/// a score in the evaluation replaces that score.
pub async fn import_csv(pool: &PgPool, year_id: Uuid, csv_path: &Path) -> anyhow::Result<ImportOutcome> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        evaluation_id: Uuid,
        enrollment_id: Uuid,
        score: Option<f64>,
        literal: Option<String>,
        observation: Option<String>,
    }

    let store = load_year(pool, year_id).await?;
    let mut engine = Engine::new(store);
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut outcome = ImportOutcome::default();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed CSV row {}", line + 1))?;

        let literal = match row.literal.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => match value.parse::<Letter>() {
                Ok(letter) => Some(letter),
                Err(err) => {
                    tracing::warn!(row = line + 1, error = %err, "rejected score");
                    outcome.rejected += 1;
                    continue;
                }
            },
            None => None,
        };

        let existing_id = engine
            .store()
            .list_scores(ScoreScope::Evaluation(row.evaluation_id))
            .into_iter()
            .find(|score| score.enrollment_id == row.enrollment_id)
            .map(|score| score.id);

        let score = Score {
            id: existing_id.unwrap_or_else(Uuid::new_v4),
            evaluation_id: row.evaluation_id,
            enrollment_id: row.enrollment_id,
            score: row.score,
            literal,
            observation: row.observation,
        };

        if let Err(err) = engine.record_score(score.clone()) {
            tracing::warn!(row = line + 1, error = %err, "rejected score");
            outcome.rejected += 1;
            continue;
        }

        save_score(pool, &score).await?;
        outcome.saved += 1;
    }

    Ok(outcome)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let year_id = Uuid::parse_str("7b0e2a1c-5f1d-4c59-9a51-0d2f6b3c8e01")?;
    let kinder = Uuid::parse_str("1a6f3d24-8b0e-4a7c-b2d1-5e9c4f7a1b02")?;
    let third_grade = Uuid::parse_str("2b7a4e35-9c1f-4b8d-83e2-6fad5a8b2c03")?;
    let fifth_year = Uuid::parse_str("3c8b5f46-ad20-4c9e-94f3-70be6b9c3d04")?;
    let computing = Uuid::parse_str("4d9c6057-be31-4daf-a504-81cf7cad4e05")?;

    sqlx::query(
        r#"
        INSERT INTO grade_rollup.school_years (id, name, state, is_current)
        VALUES ($1, '2025-2026', 'active', TRUE)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(year_id)
    .execute(pool)
    .await?;

    for (level, kind) in [
        ("preschool", "observation"),
        ("primary", "literal"),
        ("secondary", "numeric-base-20"),
    ] {
        sqlx::query(
            r#"
            INSERT INTO grade_rollup.grading_regimes (year_id, level, kind)
            VALUES ($1, $2, $3)
            ON CONFLICT (year_id, level) DO UPDATE SET kind = EXCLUDED.kind
            "#,
        )
        .bind(year_id)
        .bind(level)
        .bind(kind)
        .execute(pool)
        .await?;
    }

    for (id, name, level) in [
        (kinder, "Kinder A", "preschool"),
        (third_grade, "3rd grade A", "primary"),
        (fifth_year, "5th year A", "secondary"),
    ] {
        sqlx::query(
            r#"
            INSERT INTO grade_rollup.sections (id, year_id, name, level)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(year_id)
        .bind(name)
        .bind(level)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO grade_rollup.mention_sections (id, year_id, name, mention)
        VALUES ($1, $2, 'Computing 5th year', 'Computing')
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(computing)
    .bind(year_id)
    .execute(pool)
    .await?;

    let students = [
        ("Lucia Fernandez", kinder, None),
        ("Mateo Rojas", third_grade, None),
        ("Valentina Diaz", third_grade, None),
        ("Santiago Perez", fifth_year, None),
        ("Camila Torres", fifth_year, Some(computing)),
    ];
    let mut enrollment_ids = Vec::new();
    for (name, section_id, mention_id) in students {
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO grade_rollup.enrollments
            (id, year_id, student_name, section_id, mention_section_id, is_current, state)
            VALUES ($1, $2, $3, $4, $5, TRUE, 'done')
            ON CONFLICT (id) DO UPDATE SET student_name = EXCLUDED.student_name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v5(&year_id, name.as_bytes()))
        .bind(year_id)
        .bind(name)
        .bind(section_id)
        .bind(mention_id)
        .fetch_one(pool)
        .await?
        .get("id");
        enrollment_ids.push(id);
    }

    let subjects = [
        (Cohort::Section(fifth_year), "Mathematics", "Prof. Salazar"),
        (Cohort::Section(fifth_year), "Chemistry", "Prof. Mendoza"),
        (Cohort::Mention(computing), "Networks", "Prof. Castillo"),
    ];
    let mut assignment_ids = Vec::new();
    for (cohort, subject, teacher) in subjects {
        let id = Uuid::new_v5(&cohort.id(), subject.as_bytes());
        let (section_id, mention_id) = cohort_columns(cohort);
        sqlx::query(
            r#"
            INSERT INTO grade_rollup.subject_assignments
            (id, section_id, mention_section_id, subject_id, subject_name, teacher_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(section_id)
        .bind(mention_id)
        .bind(Uuid::new_v5(&year_id, subject.as_bytes()))
        .bind(subject)
        .bind(teacher)
        .execute(pool)
        .await?;
        assignment_ids.push(id);
    }

    let evaluations = [
        (Cohort::Section(kinder), None, "Motor skills", NaiveDate::from_ymd_opt(2025, 10, 6)),
        (Cohort::Section(third_grade), None, "Reading project", NaiveDate::from_ymd_opt(2025, 10, 13)),
        (Cohort::Section(fifth_year), Some(assignment_ids[0]), "Algebra test", NaiveDate::from_ymd_opt(2025, 10, 20)),
        (Cohort::Section(fifth_year), Some(assignment_ids[1]), "Lab report", NaiveDate::from_ymd_opt(2025, 10, 27)),
        (Cohort::Mention(computing), Some(assignment_ids[2]), "Routing workshop", NaiveDate::from_ymd_opt(2025, 11, 3)),
    ];
    let mut evaluation_ids = Vec::new();
    for (cohort, assignment_id, name, date) in evaluations {
        let id = Uuid::new_v5(&cohort.id(), name.as_bytes());
        let (section_id, mention_id) = cohort_columns(cohort);
        sqlx::query(
            r#"
            INSERT INTO grade_rollup.evaluations
            (id, year_id, name, section_id, mention_section_id, assignment_id, evaluation_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(year_id)
        .bind(name)
        .bind(section_id)
        .bind(mention_id)
        .bind(assignment_id)
        .bind(date.context("invalid date")?)
        .execute(pool)
        .await?;
        evaluation_ids.push(id);
    }

    let scores: [(usize, usize, Option<f64>, Option<&str>, Option<&str>); 7] = [
        (0, 0, None, None, Some("Holds crayons with confidence")),
        (1, 1, None, Some("A"), None),
        (1, 2, None, Some("C"), None),
        (2, 3, Some(16.0), None, None),
        (2, 4, Some(12.5), None, None),
        (3, 3, Some(14.0), None, None),
        (4, 4, Some(17.0), None, None),
    ];
    for (evaluation, enrollment, value, literal, observation) in scores {
        sqlx::query(
            r#"
            INSERT INTO grade_rollup.scores
            (id, evaluation_id, enrollment_id, score, literal, observation)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (evaluation_id, enrollment_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(evaluation_ids[evaluation])
        .bind(enrollment_ids[enrollment])
        .bind(value)
        .bind(literal)
        .bind(observation)
        .execute(pool)
        .await?;
    }

    Ok(())
}
