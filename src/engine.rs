use std::collections::HashMap;

use uuid::Uuid;

use crate::aggregate::summarize_evaluation;
use crate::dashboard::{self, Member, SectionInput, YearMember};
use crate::error::GradingError;
use crate::models::{
    Cohort, Enrollment, Evaluation, EvaluationSummary, GradedScore, GroupKey, Level, LevelCategory,
    PerformanceSnapshot, Score, ScoreKind, SectionStats, SnapshotScope, StudentPerformance,
    YearState, YearStats,
};
use crate::normalize::{normalize, validate_finalize, validate_score};
use crate::performance::roll_up;
use crate::store::{RecordStore, ScoreScope};

#[derive(Debug, Clone)]
struct StudentRecord {
    performance: StudentPerformance,
    enrollment: Enrollment,
    level: Level,
    general_scores: Vec<GradedScore>,
    mention_scores: Vec<GradedScore>,
}

/// Grading context of one evaluation, resolved once per lookup.
struct EvaluationContext {
    evaluation: Evaluation,
    level: Level,
    kind: ScoreKind,
    key: GroupKey,
    label: String,
}

/// Derives performance snapshots and dashboards from a record store and
/// memoizes them until a score write invalidates them.
///
/// Cached values form a chain: student snapshots feed section and mention
/// dashboards, which feed the year dashboard. Writing a score drops the
/// entries of that chain that read it, leaves first.
pub struct Engine<S> {
    store: S,
    students: HashMap<Uuid, StudentRecord>,
    cohorts: HashMap<Cohort, SectionStats>,
    years: HashMap<Uuid, YearStats>,
}

impl<S: RecordStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            students: HashMap::new(),
            cohorts: HashMap::new(),
            years: HashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn cohort_level(&self, cohort: Cohort) -> Result<Level, GradingError> {
        match cohort {
            Cohort::Section(id) => self
                .store
                .get_section(id)
                .map(|section| section.level)
                .ok_or(GradingError::not_found("section", id)),
            Cohort::Mention(id) => self
                .store
                .get_mention_section(id)
                .map(|_| Level::Secondary)
                .ok_or(GradingError::not_found("mention section", id)),
        }
    }

    fn regime_kind(&self, level: Level, year_id: Uuid) -> Result<ScoreKind, GradingError> {
        self.store
            .get_regime(level, year_id)
            .map(|regime| regime.kind)
            .ok_or(GradingError::MissingRegimeConfig { level, year_id })
    }

    /// Mentions are always graded on 20, whatever the secondary regime says.
    fn cohort_kind(&self, cohort: Cohort, year_id: Uuid) -> Result<ScoreKind, GradingError> {
        match cohort {
            Cohort::Mention(_) => Ok(ScoreKind::NumericBase20),
            Cohort::Section(_) => {
                let level = self.cohort_level(cohort)?;
                self.regime_kind(level, year_id)
            }
        }
    }

    fn evaluation_context(&self, evaluation_id: Uuid) -> Result<EvaluationContext, GradingError> {
        let evaluation = self
            .store
            .get_evaluation(evaluation_id)
            .ok_or(GradingError::not_found("evaluation", evaluation_id))?;
        let level = self.cohort_level(evaluation.cohort)?;
        let kind = self.cohort_kind(evaluation.cohort, evaluation.year_id)?;

        let assignment = match (level, evaluation.assignment_id) {
            (Level::Secondary, Some(assignment_id)) => self
                .store
                .list_subject_assignments(evaluation.cohort)
                .into_iter()
                .find(|assignment| assignment.id == assignment_id),
            _ => None,
        };

        let (key, label) = match assignment {
            Some(assignment) => (GroupKey::Subject(assignment.subject_id), assignment.subject_name),
            None => (GroupKey::Evaluation(evaluation.id), evaluation.name.clone()),
        };

        Ok(EvaluationContext { evaluation, level, kind, key, label })
    }

    /// Normalizes scores and tags them with their group, split between the
    /// general section and the given mention. Draft scores and scores of any
    /// other mention are dropped.
    fn grade(
        &self,
        scores: &[Score],
        mention: Option<Uuid>,
    ) -> Result<(Vec<GradedScore>, Vec<GradedScore>), GradingError> {
        let mut contexts: HashMap<Uuid, EvaluationContext> = HashMap::new();
        let mut general = Vec::new();
        let mut in_mention = Vec::new();

        for score in scores {
            if !contexts.contains_key(&score.evaluation_id) {
                let context = self.evaluation_context(score.evaluation_id)?;
                contexts.insert(score.evaluation_id, context);
            }
            let Some(context) = contexts.get(&score.evaluation_id) else {
                continue;
            };
            let Some(normalized) = normalize(score, context.kind) else {
                continue;
            };

            let graded = GradedScore {
                enrollment_id: score.enrollment_id,
                key: context.key,
                label: context.label.clone(),
                normalized,
            };
            match context.evaluation.cohort {
                Cohort::Section(_) => general.push(graded),
                Cohort::Mention(id) if Some(id) == mention => in_mention.push(graded),
                Cohort::Mention(_) => {}
            }
        }

        Ok((general, in_mention))
    }

    fn student_record(&mut self, enrollment_id: Uuid) -> Result<&StudentRecord, GradingError> {
        if !self.students.contains_key(&enrollment_id) {
            let record = self.compute_student(enrollment_id)?;
            self.students.insert(enrollment_id, record);
        }
        self.students
            .get(&enrollment_id)
            .ok_or(GradingError::not_found("enrollment", enrollment_id))
    }

    fn compute_student(&self, enrollment_id: Uuid) -> Result<StudentRecord, GradingError> {
        let enrollment = self
            .store
            .get_enrollment(enrollment_id)
            .ok_or(GradingError::not_found("enrollment", enrollment_id))?;
        let level = self.cohort_level(Cohort::Section(enrollment.section_id))?;
        let kind = self.regime_kind(level, enrollment.year_id)?;

        let mention_id = match level {
            Level::Secondary => enrollment.mention_section_id,
            _ => None,
        };

        let scores = self.store.list_scores(ScoreScope::Enrollment(enrollment_id));
        let (general_scores, mention_scores) = self.grade(&scores, mention_id)?;

        let general = roll_up(enrollment_id, level, kind, SnapshotScope::General, &general_scores);
        let mention = mention_id.map(|mention_id| {
            roll_up(
                enrollment_id,
                Level::Secondary,
                ScoreKind::NumericBase20,
                SnapshotScope::Mention(mention_id),
                &mention_scores,
            )
        });

        tracing::debug!(
            enrollment_id = %enrollment_id,
            subjects = general.total_subjects,
            state = ?general.general_state,
            "recomputed student performance"
        );

        Ok(StudentRecord {
            performance: StudentPerformance {
                enrollment_id,
                student_name: enrollment.student_name.clone(),
                section_id: enrollment.section_id,
                general,
                mention,
            },
            enrollment,
            level,
            general_scores,
            mention_scores,
        })
    }

    pub fn get_student_performance(
        &mut self,
        enrollment_id: Uuid,
    ) -> Result<StudentPerformance, GradingError> {
        Ok(self.student_record(enrollment_id)?.performance.clone())
    }

    fn cohort_dashboard(&mut self, cohort: Cohort) -> Result<SectionStats, GradingError> {
        if let Some(stats) = self.cohorts.get(&cohort) {
            return Ok(stats.clone());
        }

        let (name, level, year_id) = match cohort {
            Cohort::Section(id) => {
                let section = self
                    .store
                    .get_section(id)
                    .ok_or(GradingError::not_found("section", id))?;
                (section.name, section.level, section.year_id)
            }
            Cohort::Mention(id) => {
                let mention = self
                    .store
                    .get_mention_section(id)
                    .ok_or(GradingError::not_found("mention section", id))?;
                (mention.name, Level::Secondary, mention.year_id)
            }
        };
        let kind = self.cohort_kind(cohort, year_id)?;

        let mut records = Vec::new();
        for enrollment in self.store.list_enrollments(cohort) {
            records.push(self.student_record(enrollment.id)?.clone());
        }

        let mut scores = Vec::new();
        let mut snapshots: Vec<(&Enrollment, &PerformanceSnapshot)> = Vec::new();
        for record in &records {
            match cohort {
                Cohort::Section(_) => {
                    scores.extend(record.general_scores.iter().cloned());
                    snapshots.push((&record.enrollment, &record.performance.general));
                }
                Cohort::Mention(_) => {
                    scores.extend(record.mention_scores.iter().cloned());
                    if let Some(snapshot) = &record.performance.mention {
                        snapshots.push((&record.enrollment, snapshot));
                    }
                }
            }
        }

        let members: Vec<Member<'_>> = snapshots
            .into_iter()
            .map(|(enrollment, snapshot)| Member { enrollment, snapshot })
            .collect();
        let stats = dashboard::build_section_dashboard(
            SectionInput {
                cohort,
                name: &name,
                level,
                evaluation_type: kind,
                scores: &scores,
            },
            &members,
        );

        tracing::debug!(cohort = ?cohort, students = stats.total_students, "rebuilt cohort dashboard");
        self.cohorts.insert(cohort, stats.clone());
        Ok(stats)
    }

    pub fn get_section_dashboard(&mut self, section_id: Uuid) -> Result<SectionStats, GradingError> {
        self.cohort_dashboard(Cohort::Section(section_id))
    }

    pub fn get_mention_dashboard(
        &mut self,
        mention_section_id: Uuid,
    ) -> Result<SectionStats, GradingError> {
        self.cohort_dashboard(Cohort::Mention(mention_section_id))
    }

    pub fn get_year_dashboard(&mut self, year_id: Uuid) -> Result<YearStats, GradingError> {
        if let Some(stats) = self.years.get(&year_id) {
            return Ok(stats.clone());
        }

        let year = self
            .store
            .get_year(year_id)
            .ok_or(GradingError::not_found("school year", year_id))?;

        let mut sections = Vec::new();
        let mut assignments = Vec::new();
        let mut records: Vec<(String, StudentRecord)> = Vec::new();
        for section in self.store.list_sections(year_id) {
            assignments.extend(self.store.list_subject_assignments(Cohort::Section(section.id)));
            sections.push(self.get_section_dashboard(section.id)?);
            for enrollment in self.store.list_enrollments(Cohort::Section(section.id)) {
                let record = self.student_record(enrollment.id)?.clone();
                records.push((section.name.clone(), record));
            }
        }
        for mention in self.store.list_mention_sections(year_id) {
            assignments.extend(self.store.list_subject_assignments(Cohort::Mention(mention.id)));
            sections.push(self.get_mention_dashboard(mention.id)?);
        }

        let year_evaluations = self.store.list_evaluations(year_id);
        let teachers = dashboard::teacher_summary(&assignments, &year_evaluations);

        let mut evaluations = Vec::new();
        for evaluation in &year_evaluations {
            let context = self.evaluation_context(evaluation.id)?;
            let scores = self.store.list_scores(ScoreScope::Evaluation(evaluation.id));
            evaluations.push((
                context.level,
                summarize_evaluation(&context.evaluation, context.kind, &scores),
            ));
        }

        let members: Vec<YearMember<'_>> = records
            .iter()
            .map(|(section_name, record)| {
                let category = LevelCategory::of(record.level, &record.enrollment);
                let mut scores = record.general_scores.clone();
                if category == LevelCategory::TechnicalMention {
                    scores.extend(record.mention_scores.iter().cloned());
                }
                YearMember {
                    enrollment: &record.enrollment,
                    section_name,
                    category,
                    snapshot: &record.performance.general,
                    scores,
                }
            })
            .collect();

        let stats =
            dashboard::build_year_dashboard(&year, &members, &sections, &evaluations, teachers);
        tracing::debug!(year_id = %year_id, students = stats.total_students, "rebuilt year dashboard");
        self.years.insert(year_id, stats.clone());
        Ok(stats)
    }

    /// Validates an evaluation before it is marked as graded.
    pub fn finalize_evaluation(&self, evaluation_id: Uuid) -> Result<EvaluationSummary, GradingError> {
        let context = self.evaluation_context(evaluation_id)?;
        let scores = self.store.list_scores(ScoreScope::Evaluation(evaluation_id));
        validate_finalize(evaluation_id, context.kind, &scores)?;
        Ok(summarize_evaluation(&context.evaluation, context.kind, &scores))
    }

    /// Validates and stores a score, then drops every cached aggregate that
    /// read the enrollment's scores.
    pub fn record_score(&mut self, score: Score) -> Result<(), GradingError> {
        let context = self.evaluation_context(score.evaluation_id)?;
        let year_id = context.evaluation.year_id;
        let year = self
            .store
            .get_year(year_id)
            .ok_or(GradingError::not_found("school year", year_id))?;
        if year.state == YearState::Finished {
            return Err(GradingError::YearFinished { year_id });
        }

        let member = self
            .store
            .get_enrollment(score.enrollment_id)
            .map(|enrollment| {
                enrollment.is_active()
                    && match context.evaluation.cohort {
                        Cohort::Section(id) => enrollment.section_id == id,
                        Cohort::Mention(id) => enrollment.mention_section_id == Some(id),
                    }
            })
            .unwrap_or(false);
        if !member {
            return Err(GradingError::EnrollmentNotInCohort {
                evaluation_id: score.evaluation_id,
                enrollment_id: score.enrollment_id,
            });
        }

        validate_score(&score, context.kind)?;

        let duplicate = self
            .store
            .list_scores(ScoreScope::Evaluation(score.evaluation_id))
            .into_iter()
            .any(|existing| existing.enrollment_id == score.enrollment_id && existing.id != score.id);
        if duplicate {
            return Err(GradingError::DuplicateScore {
                evaluation_id: score.evaluation_id,
                enrollment_id: score.enrollment_id,
            });
        }

        let enrollment_id = score.enrollment_id;
        self.store.upsert_score(score);
        self.invalidate_enrollment(enrollment_id, year_id);
        Ok(())
    }

    pub fn invalidate_enrollment(&mut self, enrollment_id: Uuid, year_id: Uuid) {
        self.students.remove(&enrollment_id);

        if let Some(enrollment) = self.store.get_enrollment(enrollment_id) {
            self.cohorts.remove(&Cohort::Section(enrollment.section_id));
            if let Some(mention_id) = enrollment.mention_section_id {
                self.cohorts.remove(&Cohort::Mention(mention_id));
            }
        }

        self.years.remove(&year_id);
        tracing::debug!(enrollment_id = %enrollment_id, "invalidated cached aggregates");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        EnrollmentState, GeneralState, GradingRegime, Letter, MentionSection, SchoolYear, Section,
        SubjectAssignment,
    };
    use crate::store::InMemoryStore;

    struct Fixture {
        store: InMemoryStore,
        year_id: Uuid,
    }

    impl Fixture {
        fn new(secondary: ScoreKind) -> Self {
            let year_id = Uuid::new_v4();
            let mut store = InMemoryStore::new();
            store.years.push(SchoolYear {
                id: year_id,
                name: "2025-2026".to_string(),
                state: YearState::Active,
                current: true,
            });
            for (level, kind) in [
                (Level::Preschool, ScoreKind::Observation),
                (Level::Primary, ScoreKind::Literal),
                (Level::Secondary, secondary),
            ] {
                store.regimes.push(GradingRegime { year_id, level, kind });
            }
            Self { store, year_id }
        }

        fn section(&mut self, name: &str, level: Level) -> Uuid {
            let id = Uuid::new_v4();
            self.store.sections.push(Section {
                id,
                year_id: self.year_id,
                name: name.to_string(),
                level,
            });
            id
        }

        fn mention(&mut self, name: &str) -> Uuid {
            let id = Uuid::new_v4();
            self.store.mention_sections.push(MentionSection {
                id,
                year_id: self.year_id,
                name: name.to_string(),
                mention: "Computing".to_string(),
            });
            id
        }

        fn student(&mut self, name: &str, section_id: Uuid, mention: Option<Uuid>) -> Uuid {
            let id = Uuid::new_v4();
            self.store.enrollments.push(Enrollment {
                id,
                year_id: self.year_id,
                student_name: name.to_string(),
                section_id,
                mention_section_id: mention,
                current: true,
                state: EnrollmentState::Done,
            });
            id
        }

        fn subject(&mut self, cohort: Cohort, name: &str) -> Uuid {
            let id = Uuid::new_v4();
            self.store.assignments.push(SubjectAssignment {
                id,
                cohort,
                subject_id: Uuid::new_v4(),
                subject_name: name.to_string(),
                teacher_name: "Prof. Rivas".to_string(),
            });
            id
        }

        fn evaluation(&mut self, cohort: Cohort, assignment: Option<Uuid>, name: &str) -> Uuid {
            let id = Uuid::new_v4();
            self.store.evaluations.push(Evaluation {
                id,
                year_id: self.year_id,
                name: name.to_string(),
                cohort,
                assignment_id: assignment,
                evaluation_date: None,
            });
            id
        }

        fn points(&mut self, evaluation_id: Uuid, enrollment_id: Uuid, value: f64) {
            self.store.scores.push(Score {
                id: Uuid::new_v4(),
                evaluation_id,
                enrollment_id,
                score: Some(value),
                literal: None,
                observation: None,
            });
        }

        fn letter(&mut self, evaluation_id: Uuid, enrollment_id: Uuid, letter: Letter) {
            self.store.scores.push(Score {
                id: Uuid::new_v4(),
                evaluation_id,
                enrollment_id,
                score: None,
                literal: Some(letter),
                observation: None,
            });
        }
    }

    #[test]
    fn secondary_student_rolls_up_by_subject() {
        let mut fx = Fixture::new(ScoreKind::NumericBase20);
        let section = fx.section("1st year A", Level::Secondary);
        let math = fx.subject(Cohort::Section(section), "Mathematics");
        let biology = fx.subject(Cohort::Section(section), "Biology");
        let student = fx.student("Ana", section, None);
        let m1 = fx.evaluation(Cohort::Section(section), Some(math), "Algebra test");
        let m2 = fx.evaluation(Cohort::Section(section), Some(math), "Geometry test");
        let b1 = fx.evaluation(Cohort::Section(section), Some(biology), "Cells");
        fx.points(m1, student, 14.0);
        fx.points(m2, student, 16.0);
        fx.points(b1, student, 8.0);

        let mut engine = Engine::new(fx.store);
        let performance = engine.get_student_performance(student).unwrap();
        let general = performance.general;
        assert_eq!(general.total_subjects, 2);
        assert_eq!(general.general_average, Some(11.5));
        assert_eq!(general.subjects_failed, 1);
        assert_eq!(general.general_state, GeneralState::Failed);
        assert!(performance.mention.is_none());
    }

    #[test]
    fn primary_literals_group_by_evaluation() {
        let mut fx = Fixture::new(ScoreKind::NumericBase20);
        let section = fx.section("2nd grade", Level::Primary);
        let student = fx.student("Beto", section, None);
        for letter in [Letter::A, Letter::A, Letter::C] {
            let evaluation = fx.evaluation(Cohort::Section(section), None, "Project");
            fx.letter(evaluation, student, letter);
        }

        let mut engine = Engine::new(fx.store);
        let general = engine.get_student_performance(student).unwrap().general;
        assert_eq!(general.total_subjects, 3);
        assert_eq!(general.literal_average, Some(Letter::B));
        assert_eq!(general.general_state, GeneralState::Approve);
    }

    #[test]
    fn mention_is_graded_apart_from_the_section() {
        let mut fx = Fixture::new(ScoreKind::NumericBase100);
        let section = fx.section("5th year", Level::Secondary);
        let mention = fx.mention("Computing 5th");
        let chemistry = fx.subject(Cohort::Section(section), "Chemistry");
        let networks = fx.subject(Cohort::Mention(mention), "Networks");
        let student = fx.student("Carla", section, Some(mention));
        let general_eval = fx.evaluation(Cohort::Section(section), Some(chemistry), "Lab");
        let mention_eval = fx.evaluation(Cohort::Mention(mention), Some(networks), "Routing");
        fx.points(general_eval, student, 90.0);
        fx.points(mention_eval, student, 7.0);

        let mut engine = Engine::new(fx.store);
        let performance = engine.get_student_performance(student).unwrap();
        assert_eq!(performance.general.general_average, Some(18.0));
        assert!(performance.general.general_state.is_approved());

        let mention_snapshot = performance.mention.unwrap();
        assert_eq!(mention_snapshot.evaluation_type, ScoreKind::NumericBase20);
        assert_eq!(mention_snapshot.general_average, Some(7.0));
        assert_eq!(mention_snapshot.general_state, GeneralState::Failed);

        let dashboard = engine.get_mention_dashboard(mention).unwrap();
        assert_eq!(dashboard.total_students, 1);
        assert_eq!(dashboard.groups.len(), 1);
        assert_eq!(dashboard.groups[0].label, "Networks");
    }

    #[test]
    fn missing_regime_is_an_error_not_a_zero() {
        let mut fx = Fixture::new(ScoreKind::NumericBase20);
        fx.store.regimes.retain(|regime| regime.level != Level::Secondary);
        let section = fx.section("3rd year", Level::Secondary);
        let student = fx.student("Dario", section, None);
        let year_id = fx.year_id;

        let mut engine = Engine::new(fx.store);
        let err = engine.get_student_performance(student).unwrap_err();
        assert_eq!(
            err,
            GradingError::MissingRegimeConfig { level: Level::Secondary, year_id }
        );
        assert!(engine.get_year_dashboard(year_id).is_err());
    }

    #[test]
    fn writing_a_score_refreshes_every_dependent_view() {
        let mut fx = Fixture::new(ScoreKind::NumericBase20);
        let section = fx.section("1st year B", Level::Secondary);
        let math = fx.subject(Cohort::Section(section), "Mathematics");
        let student = fx.student("Elena", section, None);
        let exam = fx.evaluation(Cohort::Section(section), Some(math), "Final");
        let year_id = fx.year_id;
        let score_id = Uuid::new_v4();
        fx.store.scores.push(Score {
            id: score_id,
            evaluation_id: exam,
            enrollment_id: student,
            score: Some(8.0),
            literal: None,
            observation: None,
        });

        let mut engine = Engine::new(fx.store);
        assert_eq!(engine.get_section_dashboard(section).unwrap().general_average, 8.0);
        assert_eq!(engine.get_year_dashboard(year_id).unwrap().approved_students, 0);

        engine
            .record_score(Score {
                id: score_id,
                evaluation_id: exam,
                enrollment_id: student,
                score: Some(17.0),
                literal: None,
                observation: None,
            })
            .unwrap();

        assert_eq!(
            engine.get_student_performance(student).unwrap().general.general_average,
            Some(17.0)
        );
        assert_eq!(engine.get_section_dashboard(section).unwrap().general_average, 17.0);
        assert_eq!(engine.get_year_dashboard(year_id).unwrap().approved_students, 1);
    }

    #[test]
    fn score_writes_are_validated() {
        let mut fx = Fixture::new(ScoreKind::NumericBase20);
        let section = fx.section("4th year", Level::Secondary);
        let math = fx.subject(Cohort::Section(section), "Mathematics");
        let student = fx.student("Fabio", section, None);
        let exam = fx.evaluation(Cohort::Section(section), Some(math), "Midterm");
        fx.points(exam, student, 12.0);

        let mut engine = Engine::new(fx.store);
        let too_high = Score {
            id: Uuid::new_v4(),
            evaluation_id: exam,
            enrollment_id: student,
            score: Some(21.0),
            literal: None,
            observation: None,
        };
        assert!(matches!(
            engine.record_score(too_high),
            Err(GradingError::InvalidScoreValue { .. })
        ));

        let second = Score {
            id: Uuid::new_v4(),
            evaluation_id: exam,
            enrollment_id: student,
            score: Some(15.0),
            literal: None,
            observation: None,
        };
        assert!(matches!(
            engine.record_score(second),
            Err(GradingError::DuplicateScore { .. })
        ));
        assert_eq!(engine.store().scores.len(), 1);
    }

    #[test]
    fn scores_only_go_to_active_members_of_the_cohort() {
        let mut fx = Fixture::new(ScoreKind::NumericBase20);
        let section = fx.section("2nd grade A", Level::Primary);
        let other = fx.section("2nd grade B", Level::Primary);
        let member = fx.student("Ivan", section, None);
        let outsider = fx.student("Julia", other, None);
        let withdrawn = fx.student("Kevin", section, None);
        fx.store.enrollments[2].state = EnrollmentState::Cancel;
        let evaluation = fx.evaluation(Cohort::Section(section), None, "Spelling");

        let mut engine = Engine::new(fx.store);
        let letter = |enrollment_id: Uuid| Score {
            id: Uuid::new_v4(),
            evaluation_id: evaluation,
            enrollment_id,
            score: None,
            literal: Some(Letter::B),
            observation: None,
        };

        for enrollment_id in [Uuid::new_v4(), outsider, withdrawn] {
            let err = engine.record_score(letter(enrollment_id)).unwrap_err();
            assert_eq!(
                err,
                GradingError::EnrollmentNotInCohort { evaluation_id: evaluation, enrollment_id }
            );
        }
        assert!(engine.store().scores.is_empty());

        engine.record_score(letter(member)).unwrap();
        assert_eq!(engine.store().scores.len(), 1);
    }

    #[test]
    fn ungraded_students_count_the_same_in_every_view() {
        let mut fx = Fixture::new(ScoreKind::NumericBase20);
        let section = fx.section("1st grade", Level::Primary);
        let graded = fx.student("Laura", section, None);
        fx.student("Manuel", section, None);
        let evaluation = fx.evaluation(Cohort::Section(section), None, "Drawing");
        fx.letter(evaluation, graded, Letter::B);
        let year_id = fx.year_id;

        let mut engine = Engine::new(fx.store);
        let dashboard = engine.get_section_dashboard(section).unwrap();
        let year = engine.get_year_dashboard(year_id).unwrap();

        assert_eq!(dashboard.approved_students, 2);
        assert_eq!(year.approved_students, 2);
        assert_eq!(year.distribution[0].approved_students, 2);
        assert_eq!(year.approval_rate, 100.0);
        assert_eq!(dashboard.top_students.len(), 1);
        assert_eq!(dashboard.top_students[0].student_name, "Laura");
        let level_top = &year.levels[0].top_by_section[0].top;
        assert_eq!(level_top.len(), 1);
        assert_eq!(level_top[0].student_name, "Laura");
    }

    #[test]
    fn year_dashboard_summarizes_teacher_load() {
        let mut fx = Fixture::new(ScoreKind::NumericBase20);
        let section = fx.section("3rd year", Level::Secondary);
        let mention = fx.mention("Computing 3rd year");
        let math = fx.subject(Cohort::Section(section), "Mathematics");
        let networks = fx.subject(Cohort::Mention(mention), "Networks");
        fx.evaluation(Cohort::Section(section), Some(math), "Algebra");
        fx.evaluation(Cohort::Mention(mention), Some(networks), "Routing");
        let year_id = fx.year_id;

        let mut engine = Engine::new(fx.store);
        let teachers = engine.get_year_dashboard(year_id).unwrap().teachers;
        assert_eq!(teachers.len(), 1);
        assert_eq!(teachers[0].teacher_name, "Prof. Rivas");
        assert_eq!(teachers[0].sections, 2);
        assert_eq!(teachers[0].subjects, 2);
        assert_eq!(teachers[0].evaluations, 2);
    }

    #[test]
    fn finished_years_refuse_writes() {
        let mut fx = Fixture::new(ScoreKind::NumericBase20);
        fx.store.years[0].state = YearState::Finished;
        let section = fx.section("2nd year", Level::Secondary);
        let student = fx.student("Gabi", section, None);
        let exam = fx.evaluation(Cohort::Section(section), None, "Quiz");

        let mut engine = Engine::new(fx.store);
        let err = engine
            .record_score(Score {
                id: Uuid::new_v4(),
                evaluation_id: exam,
                enrollment_id: student,
                score: Some(12.0),
                literal: None,
                observation: None,
            })
            .unwrap_err();
        assert!(matches!(err, GradingError::YearFinished { .. }));
    }

    #[test]
    fn preschool_finalize_requires_observations() {
        let mut fx = Fixture::new(ScoreKind::NumericBase20);
        let section = fx.section("Kinder A", Level::Preschool);
        let student = fx.student("Hugo", section, None);
        let evaluation = fx.evaluation(Cohort::Section(section), None, "Motor skills");
        fx.store.scores.push(Score {
            id: Uuid::new_v4(),
            evaluation_id: evaluation,
            enrollment_id: student,
            score: None,
            literal: None,
            observation: Some(String::new()),
        });

        let engine = Engine::new(fx.store);
        assert!(matches!(
            engine.finalize_evaluation(evaluation),
            Err(GradingError::AmbiguousGradingInput { .. })
        ));
    }

    #[test]
    fn year_dashboard_counts_technical_mention_apart() {
        let mut fx = Fixture::new(ScoreKind::NumericBase20);
        let section = fx.section("5th year A", Level::Secondary);
        let kinder = fx.section("Kinder B", Level::Preschool);
        let mention = fx.mention("Accounting 5th");
        let math = fx.subject(Cohort::Section(section), "Mathematics");
        let general_student = fx.student("Ines", section, None);
        let technical_student = fx.student("Jose", section, Some(mention));
        fx.student("Karla", kinder, None);
        let exam = fx.evaluation(Cohort::Section(section), Some(math), "Final");
        fx.points(exam, general_student, 15.0);
        fx.points(exam, technical_student, 6.0);
        let year_id = fx.year_id;

        let mut engine = Engine::new(fx.store);
        let stats = engine.get_year_dashboard(year_id).unwrap();

        let categories: Vec<LevelCategory> =
            stats.distribution.iter().map(|level| level.category).collect();
        assert_eq!(
            categories,
            vec![
                LevelCategory::Preschool,
                LevelCategory::SecondaryGeneral,
                LevelCategory::TechnicalMention
            ]
        );
        // 100%, 100% and 0% across the three levels.
        assert_eq!(stats.approval_rate, 66.67);
        assert_eq!(stats.total_students, 3);
        assert_eq!(stats.evaluations.total, 1);
        assert_eq!(stats.evaluations.qualified, 1);
        assert_eq!(stats.top_students[0].student_name, "Ines");
    }
}
