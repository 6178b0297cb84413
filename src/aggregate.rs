use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{
    round2, Evaluation, EvaluationSummary, GeneralState, GradedScore, GroupAggregate, GroupAverage,
    GroupKey, Letter, Score, ScoreKind,
};
use crate::normalize::{evaluation_state, normalize};

struct GroupAccumulator {
    key: GroupKey,
    label: String,
    points: Vec<f64>,
    literals: Vec<Letter>,
    score_count: usize,
    students: Vec<(Uuid, bool)>,
    student_index: HashMap<Uuid, usize>,
}

impl GroupAccumulator {
    fn new(key: GroupKey, label: &str) -> Self {
        Self {
            key,
            label: label.to_string(),
            points: Vec::new(),
            literals: Vec::new(),
            score_count: 0,
            students: Vec::new(),
            student_index: HashMap::new(),
        }
    }

    fn push(&mut self, score: &GradedScore) {
        self.score_count += 1;
        if let Some(points) = score.normalized.points20 {
            self.points.push(points);
        }
        if let Some(letter) = score.normalized.literal {
            self.literals.push(letter);
        }

        // A student counts as approved in the group once any of their scores passes.
        match self.student_index.get(&score.enrollment_id) {
            Some(&idx) => self.students[idx].1 |= score.normalized.passed,
            None => {
                self.student_index.insert(score.enrollment_id, self.students.len());
                self.students.push((score.enrollment_id, score.normalized.passed));
            }
        }
    }

    fn finish(self) -> GroupAggregate {
        let average = if !self.points.is_empty() {
            GroupAverage::Numeric(round2(mean(&self.points)))
        } else if let Some(letter) = mode_letter(&self.literals) {
            GroupAverage::Literal(letter)
        } else {
            GroupAverage::Observed
        };

        let total_students = self.students.len();
        let approved_students = self.students.iter().filter(|(_, passed)| *passed).count();

        GroupAggregate {
            key: self.key,
            label: self.label,
            average,
            score_count: self.score_count,
            total_students,
            approved_students,
            failed_students: total_students - approved_students,
            approval_rate: percentage(approved_students, total_students),
        }
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(part as f64 / total as f64 * 100.0)
    }
}

/// Most frequent letter; on a tie the letter seen first wins.
pub fn mode_letter(letters: &[Letter]) -> Option<Letter> {
    let mut counts: Vec<(Letter, usize)> = Vec::new();
    for letter in letters {
        match counts.iter_mut().find(|(seen, _)| seen == letter) {
            Some(entry) => entry.1 += 1,
            None => counts.push((*letter, 1)),
        }
    }

    let mut best: Option<(Letter, usize)> = None;
    for (letter, count) in counts {
        if best.map(|(_, top)| count > top).unwrap_or(true) {
            best = Some((letter, count));
        }
    }
    best.map(|(letter, _)| letter)
}

/// Groups qualified scores by subject or evaluation, in first-seen order.
pub fn aggregate_by_group(scores: &[GradedScore]) -> Vec<GroupAggregate> {
    let mut groups: Vec<GroupAccumulator> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for score in scores {
        let idx = *index.entry(score.key).or_insert_with(|| {
            groups.push(GroupAccumulator::new(score.key, &score.label));
            groups.len() - 1
        });
        groups[idx].push(score);
    }

    groups.into_iter().map(GroupAccumulator::finish).collect()
}

/// Grading progress, majority verdict and display average of one evaluation.
pub fn summarize_evaluation(
    evaluation: &Evaluation,
    kind: ScoreKind,
    scores: &[Score],
) -> EvaluationSummary {
    let normalized: Vec<_> = scores.iter().filter_map(|score| normalize(score, kind)).collect();

    // Ungraded scores count against the majority, except under observation
    // grading where there is nothing to fail.
    let approved = scores
        .iter()
        .filter(|score| {
            normalize(score, kind)
                .map(|n| n.passed)
                .unwrap_or(kind == ScoreKind::Observation)
        })
        .count();
    let verdict = GeneralState::from_passed(approved > scores.len() / 2);

    let average = match kind {
        ScoreKind::NumericBase20 | ScoreKind::NumericBase100 => {
            let points: Vec<f64> = normalized.iter().filter_map(|n| n.points20).collect();
            format!("{} pts", round2(kind.from_points20(mean(&points))))
        }
        ScoreKind::Literal => {
            let letters: Vec<Letter> = normalized.iter().filter_map(|n| n.literal).collect();
            mode_letter(&letters)
                .map(|letter| letter.to_string())
                .unwrap_or_else(|| "-".to_string())
        }
        ScoreKind::Observation => "approved".to_string(),
    };

    EvaluationSummary {
        evaluation_id: evaluation.id,
        name: evaluation.name.clone(),
        evaluation_type: kind,
        state: evaluation_state(scores),
        verdict,
        average,
        scores: scores.len(),
        qualified: normalized.len(),
    }
}
