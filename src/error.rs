use thiserror::Error;
use uuid::Uuid;

use crate::models::Level;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradingError {
    #[error("score {value} is outside the valid range 0..={max}")]
    InvalidScoreValue { value: f64, max: f64 },
    #[error("enrollment {enrollment_id} already has a score for evaluation {evaluation_id}")]
    DuplicateScore { evaluation_id: Uuid, enrollment_id: Uuid },
    #[error("no grading regime configured for {level} in year {year_id}")]
    MissingRegimeConfig { level: Level, year_id: Uuid },
    #[error("score of enrollment {enrollment_id} in evaluation {evaluation_id} requires {expected}")]
    AmbiguousGradingInput {
        evaluation_id: Uuid,
        enrollment_id: Uuid,
        expected: &'static str,
    },
    #[error("enrollment {enrollment_id} is not an active member of the cohort of evaluation {evaluation_id}")]
    EnrollmentNotInCohort { evaluation_id: Uuid, enrollment_id: Uuid },
    #[error("school year {year_id} is finished; its records are locked")]
    YearFinished { year_id: Uuid },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("unknown {kind} `{value}`")]
    UnknownVariant { kind: &'static str, value: String },
}

impl GradingError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn unknown_variant(kind: &'static str, value: &str) -> Self {
        Self::UnknownVariant { kind, value: value.to_string() }
    }
}
