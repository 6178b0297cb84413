use std::collections::HashSet;

use uuid::Uuid;

use crate::error::GradingError;
use crate::models::{EvaluationState, NormalizedScore, Score, ScoreKind};

/// Converts a raw score into points-on-20 or a letter, according to the kind
/// of its evaluation. Returns `None` for a draft score: one without a value
/// in the field its kind reads.
pub fn normalize(score: &Score, kind: ScoreKind) -> Option<NormalizedScore> {
    match kind {
        ScoreKind::NumericBase20 | ScoreKind::NumericBase100 => {
            let max = kind.max_value()?;
            let min = kind.min_passing()?;
            score.score.filter(|v| *v > 0.0).map(|v| NormalizedScore {
                points20: Some(v * 20.0 / max),
                literal: None,
                passed: v >= min,
            })
        }
        ScoreKind::Literal => score.literal.map(|letter| NormalizedScore {
            points20: None,
            literal: Some(letter),
            passed: letter.passes(),
        }),
        ScoreKind::Observation => score.has_observation().then_some(NormalizedScore {
            points20: None,
            literal: None,
            passed: true,
        }),
    }
}

/// Range check applied before a score is written.
pub fn validate_score(score: &Score, kind: ScoreKind) -> Result<(), GradingError> {
    let (Some(max), Some(value)) = (kind.max_value(), score.score) else {
        return Ok(());
    };

    if !value.is_finite() || value < 0.0 || value > max {
        return Err(GradingError::InvalidScoreValue { value, max });
    }

    Ok(())
}

/// Rejects a second score for the same enrollment within one evaluation.
pub fn check_duplicates<'a, I>(scores: I) -> Result<(), GradingError>
where
    I: IntoIterator<Item = &'a Score>,
{
    let mut seen: HashSet<(Uuid, Uuid)> = HashSet::new();
    for score in scores {
        if !seen.insert((score.evaluation_id, score.enrollment_id)) {
            return Err(GradingError::DuplicateScore {
                evaluation_id: score.evaluation_id,
                enrollment_id: score.enrollment_id,
            });
        }
    }
    Ok(())
}

/// Checks performed when an evaluation is marked as graded: every score must
/// be in range, unique per enrollment, and carry the field its kind requires.
pub fn validate_finalize(
    evaluation_id: Uuid,
    kind: ScoreKind,
    scores: &[Score],
) -> Result<(), GradingError> {
    check_duplicates(scores)?;

    for score in scores {
        validate_score(score, kind)?;

        let expected = match kind {
            ScoreKind::Literal if score.literal.is_none() => Some("a letter grade"),
            ScoreKind::Observation if !score.has_observation() => Some("an observation"),
            _ => None,
        };

        if let Some(expected) = expected {
            return Err(GradingError::AmbiguousGradingInput {
                evaluation_id,
                enrollment_id: score.enrollment_id,
                expected,
            });
        }
    }

    Ok(())
}

pub fn evaluation_state(scores: &[Score]) -> EvaluationState {
    let qualified = scores.iter().filter(|score| score.is_qualified()).count();
    if scores.is_empty() || qualified == 0 {
        EvaluationState::Draft
    } else if qualified == scores.len() {
        EvaluationState::All
    } else {
        EvaluationState::Partial
    }
}
