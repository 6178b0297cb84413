use uuid::Uuid;

use crate::models::{
    Cohort, Enrollment, Evaluation, GradingRegime, Level, MentionSection, SchoolYear, Score, Section,
    SubjectAssignment,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreScope {
    Evaluation(Uuid),
    Enrollment(Uuid),
}

/// Read access to the school records the engine derives from, plus the one
/// write it performs: storing a validated score.
pub trait RecordStore {
    fn list_scores(&self, scope: ScoreScope) -> Vec<Score>;
    fn get_regime(&self, level: Level, year_id: Uuid) -> Option<GradingRegime>;
    /// Current enrollments in state `done` only.
    fn list_enrollments(&self, cohort: Cohort) -> Vec<Enrollment>;
    fn list_subject_assignments(&self, cohort: Cohort) -> Vec<SubjectAssignment>;

    fn get_year(&self, year_id: Uuid) -> Option<SchoolYear>;
    fn get_section(&self, section_id: Uuid) -> Option<Section>;
    fn get_mention_section(&self, mention_section_id: Uuid) -> Option<MentionSection>;
    fn get_enrollment(&self, enrollment_id: Uuid) -> Option<Enrollment>;
    fn get_evaluation(&self, evaluation_id: Uuid) -> Option<Evaluation>;
    fn list_sections(&self, year_id: Uuid) -> Vec<Section>;
    fn list_mention_sections(&self, year_id: Uuid) -> Vec<MentionSection>;
    fn list_evaluations(&self, year_id: Uuid) -> Vec<Evaluation>;

    fn upsert_score(&mut self, score: Score);
}

/// Store backed by plain vectors; iteration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    pub years: Vec<SchoolYear>,
    pub regimes: Vec<GradingRegime>,
    pub sections: Vec<Section>,
    pub mention_sections: Vec<MentionSection>,
    pub enrollments: Vec<Enrollment>,
    pub assignments: Vec<SubjectAssignment>,
    pub evaluations: Vec<Evaluation>,
    pub scores: Vec<Score>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryStore {
    fn list_scores(&self, scope: ScoreScope) -> Vec<Score> {
        self.scores
            .iter()
            .filter(|score| match scope {
                ScoreScope::Evaluation(id) => score.evaluation_id == id,
                ScoreScope::Enrollment(id) => score.enrollment_id == id,
            })
            .cloned()
            .collect()
    }

    fn get_regime(&self, level: Level, year_id: Uuid) -> Option<GradingRegime> {
        self.regimes
            .iter()
            .find(|regime| regime.level == level && regime.year_id == year_id)
            .copied()
    }

    fn list_enrollments(&self, cohort: Cohort) -> Vec<Enrollment> {
        self.enrollments
            .iter()
            .filter(|enrollment| enrollment.is_active())
            .filter(|enrollment| match cohort {
                Cohort::Section(id) => enrollment.section_id == id,
                Cohort::Mention(id) => enrollment.mention_section_id == Some(id),
            })
            .cloned()
            .collect()
    }

    fn list_subject_assignments(&self, cohort: Cohort) -> Vec<SubjectAssignment> {
        self.assignments
            .iter()
            .filter(|assignment| assignment.cohort == cohort)
            .cloned()
            .collect()
    }

    fn get_year(&self, year_id: Uuid) -> Option<SchoolYear> {
        self.years.iter().find(|year| year.id == year_id).cloned()
    }

    fn get_section(&self, section_id: Uuid) -> Option<Section> {
        self.sections.iter().find(|section| section.id == section_id).cloned()
    }

    fn get_mention_section(&self, mention_section_id: Uuid) -> Option<MentionSection> {
        self.mention_sections
            .iter()
            .find(|mention| mention.id == mention_section_id)
            .cloned()
    }

    fn get_enrollment(&self, enrollment_id: Uuid) -> Option<Enrollment> {
        self.enrollments
            .iter()
            .find(|enrollment| enrollment.id == enrollment_id)
            .cloned()
    }

    fn get_evaluation(&self, evaluation_id: Uuid) -> Option<Evaluation> {
        self.evaluations
            .iter()
            .find(|evaluation| evaluation.id == evaluation_id)
            .cloned()
    }

    fn list_sections(&self, year_id: Uuid) -> Vec<Section> {
        self.sections
            .iter()
            .filter(|section| section.year_id == year_id)
            .cloned()
            .collect()
    }

    fn list_mention_sections(&self, year_id: Uuid) -> Vec<MentionSection> {
        self.mention_sections
            .iter()
            .filter(|mention| mention.year_id == year_id)
            .cloned()
            .collect()
    }

    fn list_evaluations(&self, year_id: Uuid) -> Vec<Evaluation> {
        self.evaluations
            .iter()
            .filter(|evaluation| evaluation.year_id == year_id)
            .cloned()
            .collect()
    }

    fn upsert_score(&mut self, score: Score) {
        match self.scores.iter_mut().find(|existing| existing.id == score.id) {
            Some(existing) => *existing = score,
            None => self.scores.push(score),
        }
    }
}
