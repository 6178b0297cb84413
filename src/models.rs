use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GradingError;

/// Rounds half away from zero to two decimals, the precision every reported
/// average and percentage carries.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Preschool,
    Primary,
    Secondary,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Preschool => "preschool",
            Level::Primary => "primary",
            Level::Secondary => "secondary",
        }
    }
}

impl FromStr for Level {
    type Err = GradingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "preschool" | "pre" => Ok(Level::Preschool),
            "primary" => Ok(Level::Primary),
            "secondary" | "secundary" => Ok(Level::Secondary),
            other => Err(GradingError::unknown_variant("level", other)),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the raw value of a score is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreKind {
    #[serde(rename = "numeric-base-20")]
    NumericBase20,
    #[serde(rename = "numeric-base-100")]
    NumericBase100,
    #[serde(rename = "literal")]
    Literal,
    #[serde(rename = "observation")]
    Observation,
}

impl ScoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoreKind::NumericBase20 => "numeric-base-20",
            ScoreKind::NumericBase100 => "numeric-base-100",
            ScoreKind::Literal => "literal",
            ScoreKind::Observation => "observation",
        }
    }

    /// Upper bound of a valid raw value, for numeric kinds.
    pub fn max_value(self) -> Option<f64> {
        match self {
            ScoreKind::NumericBase20 => Some(20.0),
            ScoreKind::NumericBase100 => Some(100.0),
            ScoreKind::Literal | ScoreKind::Observation => None,
        }
    }

    /// Minimum passing value on the kind's own scale.
    pub fn min_passing(self) -> Option<f64> {
        match self {
            ScoreKind::NumericBase20 => Some(10.0),
            ScoreKind::NumericBase100 => Some(50.0),
            ScoreKind::Literal | ScoreKind::Observation => None,
        }
    }

    /// Converts a value expressed in points-on-20 back to this kind's scale.
    pub fn from_points20(self, points20: f64) -> f64 {
        match self {
            ScoreKind::NumericBase100 => points20 * 5.0,
            _ => points20,
        }
    }
}

impl FromStr for ScoreKind {
    type Err = GradingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "numeric-base-20" | "20" => Ok(ScoreKind::NumericBase20),
            "numeric-base-100" | "100" => Ok(ScoreKind::NumericBase100),
            "literal" => Ok(ScoreKind::Literal),
            "observation" => Ok(ScoreKind::Observation),
            other => Err(GradingError::unknown_variant("score kind", other)),
        }
    }
}

impl fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Letter grade, A best and E worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Letter {
    A,
    B,
    C,
    D,
    E,
}

impl Letter {
    pub fn weight(self) -> u8 {
        match self {
            Letter::A => 5,
            Letter::B => 4,
            Letter::C => 3,
            Letter::D => 2,
            Letter::E => 1,
        }
    }

    pub fn from_weight(weight: f64) -> Letter {
        if weight >= 4.5 {
            Letter::A
        } else if weight >= 3.5 {
            Letter::B
        } else if weight >= 2.5 {
            Letter::C
        } else if weight >= 1.5 {
            Letter::D
        } else {
            Letter::E
        }
    }

    pub fn passes(self) -> bool {
        self <= Letter::C
    }

    /// Points-on-20 equivalent used to rank literal-graded students next to
    /// numeric ones.
    pub fn ranking_points(self) -> f64 {
        match self {
            Letter::A => 18.0,
            Letter::B => 15.0,
            Letter::C => 12.0,
            Letter::D => 8.0,
            Letter::E => 4.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Letter::A => "A",
            Letter::B => "B",
            Letter::C => "C",
            Letter::D => "D",
            Letter::E => "E",
        }
    }
}

impl FromStr for Letter {
    type Err = GradingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Letter::A),
            "B" => Ok(Letter::B),
            "C" => Ok(Letter::C),
            "D" => Ok(Letter::D),
            "E" => Ok(Letter::E),
            other => Err(GradingError::unknown_variant("letter", other)),
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneralState {
    Approve,
    Failed,
}

impl GeneralState {
    pub fn from_passed(passed: bool) -> Self {
        if passed {
            GeneralState::Approve
        } else {
            GeneralState::Failed
        }
    }

    pub fn is_approved(self) -> bool {
        self == GeneralState::Approve
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentState {
    Draft,
    Done,
    Cancel,
}

impl FromStr for EnrollmentState {
    type Err = GradingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "draft" => Ok(EnrollmentState::Draft),
            "done" => Ok(EnrollmentState::Done),
            "cancel" | "cancelled" => Ok(EnrollmentState::Cancel),
            other => Err(GradingError::unknown_variant("enrollment state", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YearState {
    Draft,
    Active,
    Finished,
}

impl YearState {
    pub fn as_str(self) -> &'static str {
        match self {
            YearState::Draft => "draft",
            YearState::Active => "active",
            YearState::Finished => "finished",
        }
    }
}

impl FromStr for YearState {
    type Err = GradingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "draft" => Ok(YearState::Draft),
            "active" => Ok(YearState::Active),
            "finished" => Ok(YearState::Finished),
            other => Err(GradingError::unknown_variant("year state", other)),
        }
    }
}

/// Grading progress of an evaluation across its scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationState {
    All,
    Partial,
    Draft,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchoolYear {
    pub id: Uuid,
    pub name: String,
    pub state: YearState,
    pub current: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GradingRegime {
    pub year_id: Uuid,
    pub level: Level,
    pub kind: ScoreKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub id: Uuid,
    pub year_id: Uuid,
    pub name: String,
    pub level: Level,
}

/// A technical-mention group; always graded like secondary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MentionSection {
    pub id: Uuid,
    pub year_id: Uuid,
    pub name: String,
    pub mention: String,
}

/// The group an evaluation or subject assignment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Cohort {
    Section(Uuid),
    Mention(Uuid),
}

impl Cohort {
    pub fn id(self) -> Uuid {
        match self {
            Cohort::Section(id) | Cohort::Mention(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub year_id: Uuid,
    pub student_name: String,
    pub section_id: Uuid,
    pub mention_section_id: Option<Uuid>,
    pub current: bool,
    pub state: EnrollmentState,
}

impl Enrollment {
    pub fn is_active(&self) -> bool {
        self.current && self.state == EnrollmentState::Done
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAssignment {
    pub id: Uuid,
    pub cohort: Cohort,
    /// Register subject shared by every section teaching it.
    pub subject_id: Uuid,
    pub subject_name: String,
    pub teacher_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub year_id: Uuid,
    pub name: String,
    pub cohort: Cohort,
    /// Subject assignment, absent for preschool and primary evaluations.
    pub assignment_id: Option<Uuid>,
    pub evaluation_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
    pub id: Uuid,
    pub evaluation_id: Uuid,
    pub enrollment_id: Uuid,
    pub score: Option<f64>,
    pub literal: Option<Letter>,
    pub observation: Option<String>,
}

impl Score {
    pub fn has_observation(&self) -> bool {
        self.observation
            .as_deref()
            .map(|text| !text.trim().is_empty())
            .unwrap_or(false)
    }

    /// A score is qualified once any of its fields carries a value; zero
    /// points count as not yet graded.
    pub fn is_qualified(&self) -> bool {
        self.literal.is_some() || self.score.map(|v| v > 0.0).unwrap_or(false) || self.has_observation()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedScore {
    pub points20: Option<f64>,
    pub literal: Option<Letter>,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum GroupKey {
    Subject(Uuid),
    Evaluation(Uuid),
}

/// A normalized score tagged with the group it rolls up into.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedScore {
    pub enrollment_id: Uuid,
    pub key: GroupKey,
    pub label: String,
    pub normalized: NormalizedScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum GroupAverage {
    Numeric(f64),
    Literal(Letter),
    Observed,
}

impl GroupAverage {
    pub fn numeric(self) -> Option<f64> {
        match self {
            GroupAverage::Numeric(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupAggregate {
    pub key: GroupKey,
    pub label: String,
    pub average: GroupAverage,
    pub score_count: usize,
    pub total_students: usize,
    pub approved_students: usize,
    pub failed_students: usize,
    pub approval_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum SnapshotScope {
    General,
    Mention(Uuid),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectResult {
    pub key: GroupKey,
    pub label: String,
    pub average: Option<f64>,
    pub literal: Option<Letter>,
    pub state: GeneralState,
    pub evaluations: usize,
}

/// Performance of one enrollment over one set of groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub enrollment_id: Uuid,
    pub scope: SnapshotScope,
    pub level: Level,
    pub evaluation_type: ScoreKind,
    pub total_subjects: usize,
    pub subjects_approved: usize,
    pub subjects_failed: usize,
    /// Points on 20, present when the snapshot is numeric.
    pub general_average: Option<f64>,
    pub literal_average: Option<Letter>,
    pub use_literal: bool,
    pub general_state: GeneralState,
    pub approval_percentage: f64,
    pub subjects: Vec<SubjectResult>,
}

impl PerformanceSnapshot {
    /// Value students are ranked by, on a 0..20 scale.
    pub fn ranking_value(&self) -> f64 {
        match (self.use_literal, self.literal_average) {
            (true, Some(letter)) => letter.ranking_points(),
            (true, None) => 0.0,
            (false, _) => self.general_average.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentPerformance {
    pub enrollment_id: Uuid,
    pub student_name: String,
    pub section_id: Uuid,
    pub general: PerformanceSnapshot,
    pub mention: Option<PerformanceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRow {
    pub enrollment_id: Uuid,
    pub student_name: String,
    pub average: Option<f64>,
    pub literal_average: Option<Letter>,
    pub ranking_value: f64,
    pub state: GeneralState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionStats {
    pub cohort: Cohort,
    pub name: String,
    pub level: Level,
    pub evaluation_type: ScoreKind,
    pub groups: Vec<GroupAggregate>,
    /// Mean of the numeric group averages, each group weighted equally.
    pub general_average: f64,
    /// Mean of the listed students' ranking values.
    pub students_average: f64,
    pub total_students: usize,
    pub approved_students: usize,
    pub failed_students: usize,
    pub approval_rate: f64,
    pub students: Vec<StudentRow>,
    pub top_students: Vec<StudentRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelCategory {
    Preschool,
    Primary,
    SecondaryGeneral,
    TechnicalMention,
}

impl LevelCategory {
    pub const ALL: [LevelCategory; 4] = [
        LevelCategory::Preschool,
        LevelCategory::Primary,
        LevelCategory::SecondaryGeneral,
        LevelCategory::TechnicalMention,
    ];

    pub fn of(level: Level, enrollment: &Enrollment) -> Self {
        match level {
            Level::Preschool => LevelCategory::Preschool,
            Level::Primary => LevelCategory::Primary,
            Level::Secondary if enrollment.mention_section_id.is_some() => {
                LevelCategory::TechnicalMention
            }
            Level::Secondary => LevelCategory::SecondaryGeneral,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LevelCategory::Preschool => "Preschool",
            LevelCategory::Primary => "Primary",
            LevelCategory::SecondaryGeneral => "General secondary",
            LevelCategory::TechnicalMention => "Technical mention",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelBreakdown {
    pub category: LevelCategory,
    pub total_students: usize,
    pub approved_students: usize,
    pub failed_students: usize,
    pub approval_rate: f64,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionTop {
    pub section_id: Uuid,
    pub name: String,
    pub top: Vec<StudentRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelDashboard {
    pub category: LevelCategory,
    pub evaluation_type: ScoreKind,
    pub total_students: usize,
    pub approved_students: usize,
    pub failed_students: usize,
    pub approval_rate: f64,
    pub performance: Vec<GroupAggregate>,
    pub top_by_section: Vec<SectionTop>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionComparison {
    pub cohort: Cohort,
    pub name: String,
    pub level: Level,
    pub average: f64,
    pub total_students: usize,
    pub approved_students: usize,
    pub failed_students: usize,
    pub approval_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifficultSubject {
    pub subject_id: Uuid,
    pub subject_name: String,
    pub total_students: usize,
    pub failed_students: usize,
    pub failure_rate: f64,
    pub average: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationStats {
    pub total: usize,
    pub qualified: usize,
    pub partial: usize,
    pub draft: usize,
    pub preschool: usize,
    pub primary: usize,
    pub secondary: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub evaluation_id: Uuid,
    pub name: String,
    pub evaluation_type: ScoreKind,
    pub state: EvaluationState,
    pub verdict: GeneralState,
    pub average: String,
    pub scores: usize,
    pub qualified: usize,
}

/// Teaching load of one teacher across the year's subject assignments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeacherLoad {
    pub teacher_name: String,
    pub sections: usize,
    pub subjects: usize,
    pub evaluations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearStats {
    pub year_id: Uuid,
    pub name: String,
    pub state: YearState,
    pub total_students: usize,
    pub approved_students: usize,
    pub distribution: Vec<LevelBreakdown>,
    /// Mean of each reported level's own approval rate.
    pub approval_rate: f64,
    pub top_students: Vec<StudentRow>,
    pub sections: Vec<SectionComparison>,
    pub levels: Vec<LevelDashboard>,
    pub difficult_subjects: Vec<DifficultSubject>,
    pub evaluations: EvaluationStats,
    pub teachers: Vec<TeacherLoad>,
}
