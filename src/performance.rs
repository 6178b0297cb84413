use std::collections::HashMap;

use uuid::Uuid;

use crate::aggregate::{mean, percentage};
use crate::models::{
    round2, GeneralState, GradedScore, GroupKey, Letter, Level, PerformanceSnapshot, ScoreKind,
    SnapshotScope, SubjectResult,
};

/// Minimum passing average on the points-on-20 scale.
const MIN_POINTS20: f64 = 10.0;

struct SubjectTally {
    key: GroupKey,
    label: String,
    points: Vec<f64>,
    last_literal: Option<Letter>,
    any_failed: bool,
    evaluations: usize,
}

fn tally(scores: &[GradedScore]) -> Vec<SubjectTally> {
    let mut tallies: Vec<SubjectTally> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for score in scores {
        let idx = *index.entry(score.key).or_insert_with(|| {
            tallies.push(SubjectTally {
                key: score.key,
                label: score.label.clone(),
                points: Vec::new(),
                last_literal: None,
                any_failed: false,
                evaluations: 0,
            });
            tallies.len() - 1
        });

        let entry = &mut tallies[idx];
        entry.evaluations += 1;
        entry.any_failed |= !score.normalized.passed;
        if let Some(points) = score.normalized.points20 {
            entry.points.push(points);
        }
        if let Some(letter) = score.normalized.literal {
            entry.last_literal = Some(letter);
        }
    }

    tallies
}

/// Rolls one enrollment's qualified scores up into a performance snapshot.
///
/// `scores` must already be restricted to the scope of the snapshot: the
/// general section or one mention. Preschool enrollments have no failure
/// concept and always come out approved. A student with nothing graded yet
/// is approved too; only graded subjects can fail a student.
pub fn roll_up(
    enrollment_id: Uuid,
    level: Level,
    kind: ScoreKind,
    scope: SnapshotScope,
    scores: &[GradedScore],
) -> PerformanceSnapshot {
    let tallies = tally(scores);

    let mut snapshot = PerformanceSnapshot {
        enrollment_id,
        scope,
        level,
        evaluation_type: kind,
        total_subjects: 0,
        subjects_approved: 0,
        subjects_failed: 0,
        general_average: None,
        literal_average: None,
        use_literal: false,
        general_state: GeneralState::Approve,
        approval_percentage: 0.0,
        subjects: Vec::new(),
    };

    if level == Level::Preschool {
        for tally in &tallies {
            snapshot.subjects.push(SubjectResult {
                key: tally.key,
                label: tally.label.clone(),
                average: None,
                literal: None,
                state: GeneralState::Approve,
                evaluations: tally.evaluations,
            });
        }
        snapshot.total_subjects = tallies.len();
        snapshot.subjects_approved = tallies.len();
        snapshot.general_state = GeneralState::Approve;
        snapshot.approval_percentage = percentage(snapshot.subjects_approved, snapshot.total_subjects);
        return snapshot;
    }

    snapshot.use_literal = scores.iter().any(|score| score.normalized.literal.is_some());

    if snapshot.use_literal {
        let mut weights: Vec<f64> = Vec::new();
        for tally in &tallies {
            let Some(letter) = tally.last_literal else {
                continue;
            };
            let state = GeneralState::from_passed(letter.passes());
            weights.push(f64::from(letter.weight()));
            snapshot.subjects.push(SubjectResult {
                key: tally.key,
                label: tally.label.clone(),
                average: None,
                literal: Some(letter),
                state,
                evaluations: tally.evaluations,
            });
        }

        if !weights.is_empty() {
            let letter = Letter::from_weight(mean(&weights));
            snapshot.literal_average = Some(letter);
            snapshot.general_state = GeneralState::from_passed(letter.passes());
        }
    } else {
        let mut averages: Vec<f64> = Vec::new();
        for tally in &tallies {
            if tally.points.is_empty() {
                continue;
            }
            let average = mean(&tally.points);
            let state =
                GeneralState::from_passed(round2(average) >= MIN_POINTS20 && !tally.any_failed);
            averages.push(average);
            snapshot.subjects.push(SubjectResult {
                key: tally.key,
                label: tally.label.clone(),
                average: Some(round2(average)),
                literal: None,
                state,
                evaluations: tally.evaluations,
            });
        }

        if !averages.is_empty() {
            snapshot.general_average = Some(round2(mean(&averages)));
        }
    }

    snapshot.total_subjects = snapshot.subjects.len();
    snapshot.subjects_approved = snapshot
        .subjects
        .iter()
        .filter(|subject| subject.state.is_approved())
        .count();
    snapshot.subjects_failed = snapshot.total_subjects - snapshot.subjects_approved;

    if let Some(average) = snapshot.general_average {
        snapshot.general_state =
            GeneralState::from_passed(average >= MIN_POINTS20 && snapshot.subjects_failed == 0);
    }

    snapshot.approval_percentage = percentage(snapshot.subjects_approved, snapshot.total_subjects);
    snapshot
}
