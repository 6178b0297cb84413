use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::aggregate::{aggregate_by_group, mean, percentage};
use crate::models::{
    round2, Cohort, DifficultSubject, Enrollment, Evaluation, EvaluationState, EvaluationStats,
    EvaluationSummary, GradedScore, GroupKey, Level, LevelBreakdown, LevelCategory,
    LevelDashboard, PerformanceSnapshot, SchoolYear, ScoreKind, SectionComparison, SectionStats,
    SectionTop, StudentRow, SubjectAssignment, TeacherLoad, YearStats,
};

pub const SECTION_TOP: usize = 5;
pub const YEAR_TOP: usize = 10;
pub const LEVEL_SECTION_TOP: usize = 3;
pub const DIFFICULT_SUBJECTS: usize = 10;

/// Ranking value given to primary students who have no grades yet.
const UNGRADED_PRIMARY_RANKING: f64 = 18.0;

/// One enrollment of a cohort together with the snapshot that applies to it.
pub struct Member<'a> {
    pub enrollment: &'a Enrollment,
    pub snapshot: &'a PerformanceSnapshot,
}

/// One enrollment of a school year, as seen by the year dashboard.
pub struct YearMember<'a> {
    pub enrollment: &'a Enrollment,
    pub section_name: &'a str,
    pub category: LevelCategory,
    pub snapshot: &'a PerformanceSnapshot,
    /// Qualified scores feeding the level's performance breakdown.
    pub scores: Vec<GradedScore>,
}

pub struct SectionInput<'a> {
    pub cohort: Cohort,
    pub name: &'a str,
    pub level: Level,
    pub evaluation_type: ScoreKind,
    /// Qualified scores of every listed enrollment, within the cohort.
    pub scores: &'a [GradedScore],
}

fn row(enrollment: &Enrollment, snapshot: &PerformanceSnapshot) -> StudentRow {
    StudentRow {
        enrollment_id: enrollment.id,
        student_name: enrollment.student_name.clone(),
        average: snapshot.general_average,
        literal_average: snapshot.literal_average,
        ranking_value: snapshot.ranking_value(),
        state: snapshot.general_state,
    }
}

/// Highest ranking values first; equal values keep their listing order.
pub fn top_students(rows: &[StudentRow], limit: usize) -> Vec<StudentRow> {
    let mut ranked = rows.to_vec();
    ranked.sort_by(|a, b| {
        b.ranking_value
            .partial_cmp(&a.ranking_value)
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(limit);
    ranked
}

fn section_row(level: Level, member: &Member<'_>) -> Option<StudentRow> {
    let snapshot = member.snapshot;
    if snapshot.total_subjects > 0 || level == Level::Preschool {
        return Some(row(member.enrollment, snapshot));
    }

    match level {
        Level::Primary => Some(StudentRow {
            ranking_value: UNGRADED_PRIMARY_RANKING,
            ..row(member.enrollment, snapshot)
        }),
        _ => None,
    }
}

pub fn build_section_dashboard(input: SectionInput<'_>, members: &[Member<'_>]) -> SectionStats {
    let groups = aggregate_by_group(input.scores);
    let group_averages: Vec<f64> = groups.iter().filter_map(|group| group.average.numeric()).collect();

    let students: Vec<StudentRow> = members
        .iter()
        .filter_map(|member| section_row(input.level, member))
        .collect();

    let ranking_values: Vec<f64> = students.iter().map(|student| student.ranking_value).collect();
    let approved_students = students.iter().filter(|student| student.state.is_approved()).count();

    // Only students with graded subjects compete for the top list.
    let top = if input.level == Level::Preschool {
        Vec::new()
    } else {
        let graded: Vec<StudentRow> = members
            .iter()
            .filter(|member| member.snapshot.total_subjects > 0)
            .map(|member| row(member.enrollment, member.snapshot))
            .collect();
        top_students(&graded, SECTION_TOP)
    };

    SectionStats {
        cohort: input.cohort,
        name: input.name.to_string(),
        level: input.level,
        evaluation_type: input.evaluation_type,
        groups,
        general_average: round2(mean(&group_averages)),
        students_average: round2(mean(&ranking_values)),
        total_students: students.len(),
        approved_students,
        failed_students: students.len() - approved_students,
        approval_rate: percentage(approved_students, students.len()),
        students,
        top_students: top,
    }
}

fn breakdown(category: LevelCategory, members: &[&YearMember<'_>]) -> LevelBreakdown {
    let approved_students = members
        .iter()
        .filter(|member| member.snapshot.general_state.is_approved())
        .count();
    let averages: Vec<f64> = members
        .iter()
        .filter_map(|member| member.snapshot.general_average)
        .filter(|average| *average > 0.0)
        .collect();

    LevelBreakdown {
        category,
        total_students: members.len(),
        approved_students,
        failed_students: members.len() - approved_students,
        approval_rate: percentage(approved_students, members.len()),
        average: round2(mean(&averages)),
    }
}

fn level_dashboard(
    category: LevelCategory,
    members: &[&YearMember<'_>],
    breakdown: &LevelBreakdown,
) -> LevelDashboard {
    let scores: Vec<GradedScore> = members
        .iter()
        .flat_map(|member| member.scores.iter().cloned())
        .collect();
    let mut performance = aggregate_by_group(&scores);
    performance.sort_by(|a, b| a.label.cmp(&b.label));

    let mut by_section: Vec<(Uuid, &str, Vec<StudentRow>)> = Vec::new();
    for member in members.iter().filter(|member| member.snapshot.total_subjects > 0) {
        let section_id = member.enrollment.section_id;
        let student = row(member.enrollment, member.snapshot);
        match by_section.iter_mut().find(|(id, _, _)| *id == section_id) {
            Some((_, _, rows)) => rows.push(student),
            None => by_section.push((section_id, member.section_name, vec![student])),
        }
    }

    let mut top_by_section: Vec<SectionTop> = by_section
        .into_iter()
        .map(|(section_id, name, rows)| SectionTop {
            section_id,
            name: name.to_string(),
            top: top_students(&rows, LEVEL_SECTION_TOP),
        })
        .collect();
    top_by_section.sort_by(|a, b| a.name.cmp(&b.name));

    LevelDashboard {
        category,
        evaluation_type: members
            .first()
            .map(|member| member.snapshot.evaluation_type)
            .unwrap_or(ScoreKind::Observation),
        total_students: breakdown.total_students,
        approved_students: breakdown.approved_students,
        failed_students: breakdown.failed_students,
        approval_rate: breakdown.approval_rate,
        performance,
        top_by_section,
    }
}

fn difficult_subjects(sections: &[SectionStats]) -> Vec<DifficultSubject> {
    struct Tally {
        subject_id: Uuid,
        name: String,
        total: usize,
        failed: usize,
        average_sum: f64,
        count: usize,
    }

    let mut tallies: Vec<Tally> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    let secondary = sections
        .iter()
        .filter(|section| section.level == Level::Secondary && matches!(section.cohort, Cohort::Section(_)));
    for section in secondary {
        for group in &section.groups {
            let GroupKey::Subject(subject_id) = group.key else {
                continue;
            };
            let idx = *index.entry(subject_id).or_insert_with(|| {
                tallies.push(Tally {
                    subject_id,
                    name: group.label.clone(),
                    total: 0,
                    failed: 0,
                    average_sum: 0.0,
                    count: 0,
                });
                tallies.len() - 1
            });
            let tally = &mut tallies[idx];
            tally.total += group.total_students;
            tally.failed += group.failed_students;
            tally.average_sum += group.average.numeric().unwrap_or(0.0);
            tally.count += 1;
        }
    }

    let mut subjects: Vec<DifficultSubject> = tallies
        .into_iter()
        .filter(|tally| tally.total > 0)
        .map(|tally| DifficultSubject {
            subject_id: tally.subject_id,
            subject_name: tally.name,
            total_students: tally.total,
            failed_students: tally.failed,
            failure_rate: percentage(tally.failed, tally.total),
            average: round2(tally.average_sum / tally.count as f64),
        })
        .collect();
    subjects.sort_by(|a, b| {
        b.failure_rate
            .partial_cmp(&a.failure_rate)
            .unwrap_or(Ordering::Equal)
    });
    subjects.truncate(DIFFICULT_SUBJECTS);
    subjects
}

fn evaluation_stats(evaluations: &[(Level, EvaluationSummary)]) -> EvaluationStats {
    let mut stats = EvaluationStats {
        total: evaluations.len(),
        ..EvaluationStats::default()
    };
    for (level, summary) in evaluations {
        match summary.state {
            EvaluationState::All => stats.qualified += 1,
            EvaluationState::Partial => stats.partial += 1,
            EvaluationState::Draft => stats.draft += 1,
        }
        match level {
            Level::Preschool => stats.preschool += 1,
            Level::Primary => stats.primary += 1,
            Level::Secondary => stats.secondary += 1,
        }
    }
    stats
}

/// Sections, subjects and evaluations per teacher, in first-seen order.
pub fn teacher_summary(
    assignments: &[SubjectAssignment],
    evaluations: &[Evaluation],
) -> Vec<TeacherLoad> {
    struct Tally<'a> {
        name: &'a str,
        cohorts: HashSet<Cohort>,
        subjects: HashSet<Uuid>,
        assignments: HashSet<Uuid>,
    }

    let mut tallies: Vec<Tally<'_>> = Vec::new();
    for assignment in assignments {
        let idx = match tallies.iter().position(|t| t.name == assignment.teacher_name) {
            Some(idx) => idx,
            None => {
                tallies.push(Tally {
                    name: &assignment.teacher_name,
                    cohorts: HashSet::new(),
                    subjects: HashSet::new(),
                    assignments: HashSet::new(),
                });
                tallies.len() - 1
            }
        };
        let tally = &mut tallies[idx];
        tally.cohorts.insert(assignment.cohort);
        tally.subjects.insert(assignment.subject_id);
        tally.assignments.insert(assignment.id);
    }

    tallies
        .into_iter()
        .map(|tally| TeacherLoad {
            teacher_name: tally.name.to_string(),
            sections: tally.cohorts.len(),
            subjects: tally.subjects.len(),
            evaluations: evaluations
                .iter()
                .filter(|evaluation| {
                    evaluation
                        .assignment_id
                        .map(|id| tally.assignments.contains(&id))
                        .unwrap_or(false)
                })
                .count(),
        })
        .collect()
}

pub fn build_year_dashboard(
    year: &SchoolYear,
    members: &[YearMember<'_>],
    sections: &[SectionStats],
    evaluations: &[(Level, EvaluationSummary)],
    teachers: Vec<TeacherLoad>,
) -> YearStats {
    let mut distribution = Vec::new();
    let mut levels = Vec::new();

    for category in LevelCategory::ALL {
        let in_category: Vec<&YearMember<'_>> = members
            .iter()
            .filter(|member| member.category == category)
            .collect();
        if in_category.is_empty() {
            continue;
        }
        let summary = breakdown(category, &in_category);
        levels.push(level_dashboard(category, &in_category, &summary));
        distribution.push(summary);
    }

    let level_rates: Vec<f64> = distribution.iter().map(|level| level.approval_rate).collect();

    let graded_rows: Vec<StudentRow> = members
        .iter()
        .filter(|member| member.snapshot.total_subjects > 0)
        .map(|member| row(member.enrollment, member.snapshot))
        .collect();

    let mut comparison: Vec<SectionComparison> = sections
        .iter()
        .filter(|section| {
            matches!(section.cohort, Cohort::Section(_))
                && section.level != Level::Preschool
                && section.total_students > 0
        })
        .map(|section| SectionComparison {
            cohort: section.cohort,
            name: section.name.clone(),
            level: section.level,
            average: section.students_average,
            total_students: section.total_students,
            approved_students: section.approved_students,
            failed_students: section.failed_students,
            approval_rate: section.approval_rate,
        })
        .collect();
    comparison.sort_by(|a, b| b.average.partial_cmp(&a.average).unwrap_or(Ordering::Equal));

    YearStats {
        year_id: year.id,
        name: year.name.clone(),
        state: year.state,
        total_students: members.len(),
        approved_students: members
            .iter()
            .filter(|member| member.snapshot.general_state.is_approved())
            .count(),
        distribution,
        approval_rate: round2(mean(&level_rates)),
        top_students: top_students(&graded_rows, YEAR_TOP),
        sections: comparison,
        levels,
        difficult_subjects: difficult_subjects(sections),
        evaluations: evaluation_stats(evaluations),
        teachers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        EnrollmentState, GeneralState, GroupAverage, Letter, NormalizedScore, SnapshotScope,
        YearState,
    };
    use crate::performance::roll_up;

    fn enrollment(name: &str, section_id: Uuid) -> Enrollment {
        Enrollment {
            id: Uuid::new_v4(),
            year_id: Uuid::nil(),
            student_name: name.to_string(),
            section_id,
            mention_section_id: None,
            current: true,
            state: EnrollmentState::Done,
        }
    }

    fn snapshot(level: Level, average: Option<f64>, state: GeneralState, subjects: usize) -> PerformanceSnapshot {
        PerformanceSnapshot {
            enrollment_id: Uuid::nil(),
            scope: SnapshotScope::General,
            level,
            evaluation_type: ScoreKind::NumericBase20,
            total_subjects: subjects,
            subjects_approved: if state.is_approved() { subjects } else { 0 },
            subjects_failed: if state.is_approved() { 0 } else { subjects },
            general_average: average,
            literal_average: None,
            use_literal: false,
            general_state: state,
            approval_percentage: if state.is_approved() { 100.0 } else { 0.0 },
            subjects: Vec::new(),
        }
    }

    fn graded(enrollment_id: Uuid, subject: Uuid, points: f64) -> GradedScore {
        GradedScore {
            enrollment_id,
            key: GroupKey::Subject(subject),
            label: "Subject".to_string(),
            normalized: NormalizedScore {
                points20: Some(points),
                literal: None,
                passed: points >= 10.0,
            },
        }
    }

    #[test]
    fn section_average_weights_subjects_not_students() {
        let section_id = Uuid::new_v4();
        let crowded = Uuid::new_v4();
        let small = Uuid::new_v4();
        let mut scores = Vec::new();
        for _ in 0..30 {
            scores.push(graded(Uuid::new_v4(), crowded, 14.0));
        }
        for _ in 0..3 {
            scores.push(graded(Uuid::new_v4(), small, 16.0));
        }

        let stats = build_section_dashboard(
            SectionInput {
                cohort: Cohort::Section(section_id),
                name: "1st year A",
                level: Level::Secondary,
                evaluation_type: ScoreKind::NumericBase20,
                scores: &scores,
            },
            &[],
        );

        assert_eq!(stats.groups.len(), 2);
        assert_eq!(stats.groups[0].average, GroupAverage::Numeric(14.0));
        assert_eq!(stats.general_average, 15.0);
    }

    #[test]
    fn top_students_keep_listing_order_on_ties() {
        let section_id = Uuid::new_v4();
        let people: Vec<Enrollment> = ["Ana", "Beto", "Carla", "Dario", "Elena", "Fabio"]
            .iter()
            .map(|name| enrollment(name, section_id))
            .collect();
        let snapshots = vec![
            snapshot(Level::Secondary, Some(12.0), GeneralState::Approve, 2),
            snapshot(Level::Secondary, Some(17.0), GeneralState::Approve, 2),
            snapshot(Level::Secondary, Some(12.0), GeneralState::Approve, 2),
            snapshot(Level::Secondary, Some(9.0), GeneralState::Failed, 2),
            snapshot(Level::Secondary, Some(12.0), GeneralState::Approve, 2),
            snapshot(Level::Secondary, None, GeneralState::Failed, 0),
        ];
        let members: Vec<Member<'_>> = people
            .iter()
            .zip(snapshots.iter())
            .map(|(enrollment, snapshot)| Member { enrollment, snapshot })
            .collect();

        let stats = build_section_dashboard(
            SectionInput {
                cohort: Cohort::Section(section_id),
                name: "2nd year B",
                level: Level::Secondary,
                evaluation_type: ScoreKind::NumericBase20,
                scores: &[],
            },
            &members,
        );

        // Ungraded secondary students are left out of the listing.
        assert_eq!(stats.total_students, 5);
        assert_eq!(stats.failed_students, 1);
        let names: Vec<&str> = stats.top_students.iter().map(|s| s.student_name.as_str()).collect();
        assert_eq!(names, vec!["Beto", "Ana", "Carla", "Elena", "Dario"]);
    }

    #[test]
    fn ungraded_primary_students_are_approved_but_never_ranked() {
        let section_id = Uuid::new_v4();
        let graded = enrollment("Graded", section_id);
        let ungraded = enrollment("Ungraded", section_id);
        let reading = GradedScore {
            enrollment_id: graded.id,
            key: GroupKey::Evaluation(Uuid::new_v4()),
            label: "Reading".to_string(),
            normalized: NormalizedScore {
                points20: None,
                literal: Some(Letter::B),
                passed: true,
            },
        };
        let graded_snapshot = roll_up(
            graded.id,
            Level::Primary,
            ScoreKind::Literal,
            SnapshotScope::General,
            std::slice::from_ref(&reading),
        );
        let empty = roll_up(ungraded.id, Level::Primary, ScoreKind::Literal, SnapshotScope::General, &[]);

        let stats = build_section_dashboard(
            SectionInput {
                cohort: Cohort::Section(section_id),
                name: "3rd grade",
                level: Level::Primary,
                evaluation_type: ScoreKind::Literal,
                scores: std::slice::from_ref(&reading),
            },
            &[
                Member { enrollment: &ungraded, snapshot: &empty },
                Member { enrollment: &graded, snapshot: &graded_snapshot },
            ],
        );

        assert_eq!(stats.approved_students, 2);
        assert_eq!(stats.students[0].ranking_value, 18.0);
        assert_eq!(stats.students[0].state, GeneralState::Approve);
        let top: Vec<(&str, f64)> = stats
            .top_students
            .iter()
            .map(|s| (s.student_name.as_str(), s.ranking_value))
            .collect();
        assert_eq!(top, vec![("Graded", 15.0)]);
    }

    #[test]
    fn section_comparison_leaves_out_mentions() {
        let year = SchoolYear {
            id: Uuid::new_v4(),
            name: "2025-2026".to_string(),
            state: YearState::Active,
            current: true,
        };
        let section_id = Uuid::new_v4();
        let student = enrollment("Ana", section_id);
        let passing = snapshot(Level::Secondary, Some(14.0), GeneralState::Approve, 1);
        let members = [Member { enrollment: &student, snapshot: &passing }];

        let section = build_section_dashboard(
            SectionInput {
                cohort: Cohort::Section(section_id),
                name: "5th year A",
                level: Level::Secondary,
                evaluation_type: ScoreKind::NumericBase20,
                scores: &[],
            },
            &members,
        );
        let mention = build_section_dashboard(
            SectionInput {
                cohort: Cohort::Mention(Uuid::new_v4()),
                name: "Computing 5th year",
                level: Level::Secondary,
                evaluation_type: ScoreKind::NumericBase20,
                scores: &[],
            },
            &members,
        );

        let stats = build_year_dashboard(&year, &[], &[section, mention], &[], Vec::new());
        assert_eq!(stats.sections.len(), 1);
        assert_eq!(stats.sections[0].cohort, Cohort::Section(section_id));
    }

    #[test]
    fn teacher_summary_counts_sections_subjects_and_evaluations() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let math = Uuid::new_v4();
        let assign = |cohort: Uuid, subject_id: Uuid, subject: &str, teacher: &str| SubjectAssignment {
            id: Uuid::new_v4(),
            cohort: Cohort::Section(cohort),
            subject_id,
            subject_name: subject.to_string(),
            teacher_name: teacher.to_string(),
        };
        let assignments = vec![
            assign(first, math, "Mathematics", "Prof. Salazar"),
            assign(second, math, "Mathematics", "Prof. Salazar"),
            assign(first, Uuid::new_v4(), "Chemistry", "Prof. Mendoza"),
        ];
        let evaluation = |assignment_id: Option<Uuid>| Evaluation {
            id: Uuid::new_v4(),
            year_id: Uuid::nil(),
            name: "Test".to_string(),
            cohort: Cohort::Section(first),
            assignment_id,
            evaluation_date: None,
        };
        let evaluations = vec![
            evaluation(Some(assignments[0].id)),
            evaluation(Some(assignments[1].id)),
            evaluation(Some(assignments[0].id)),
            evaluation(None),
        ];

        let teachers = teacher_summary(&assignments, &evaluations);
        assert_eq!(
            teachers,
            vec![
                TeacherLoad {
                    teacher_name: "Prof. Salazar".to_string(),
                    sections: 2,
                    subjects: 1,
                    evaluations: 3,
                },
                TeacherLoad {
                    teacher_name: "Prof. Mendoza".to_string(),
                    sections: 1,
                    subjects: 1,
                    evaluations: 0,
                },
            ]
        );
    }

    #[test]
    fn year_rate_is_the_mean_of_level_rates() {
        let year = SchoolYear {
            id: Uuid::new_v4(),
            name: "2025-2026".to_string(),
            state: YearState::Active,
            current: true,
        };
        let primary_section = Uuid::new_v4();
        let secondary_section = Uuid::new_v4();

        let primary: Vec<Enrollment> = (0..5).map(|_| enrollment("P", primary_section)).collect();
        let secondary: Vec<Enrollment> = (0..10).map(|_| enrollment("S", secondary_section)).collect();
        let pass = snapshot(Level::Primary, Some(15.0), GeneralState::Approve, 1);
        let fail = snapshot(Level::Secondary, Some(7.0), GeneralState::Failed, 1);
        let secondary_pass = snapshot(Level::Secondary, Some(14.0), GeneralState::Approve, 1);

        let mut members = Vec::new();
        for (i, enrollment) in primary.iter().enumerate() {
            members.push(YearMember {
                enrollment,
                section_name: "1st grade",
                category: LevelCategory::Primary,
                snapshot: if i < 4 { &pass } else { &fail },
                scores: Vec::new(),
            });
        }
        for (i, enrollment) in secondary.iter().enumerate() {
            members.push(YearMember {
                enrollment,
                section_name: "1st year",
                category: LevelCategory::SecondaryGeneral,
                snapshot: if i < 4 { &secondary_pass } else { &fail },
                scores: Vec::new(),
            });
        }

        let stats = build_year_dashboard(&year, &members, &[], &[], Vec::new());

        // 80% and 40%; the pooled figure would be 8/15.
        assert_eq!(stats.approval_rate, 60.0);
        assert_eq!(stats.distribution.len(), 2);
        assert!(stats
            .distribution
            .iter()
            .all(|level| level.category != LevelCategory::Preschool));
        assert_eq!(stats.levels.len(), 2);
        assert_eq!(stats.top_students.len(), YEAR_TOP);
        assert_eq!(stats.top_students[0].ranking_value, 15.0);
    }

    #[test]
    fn difficult_subjects_sort_by_failure_rate() {
        let easy = Uuid::new_v4();
        let hard = Uuid::new_v4();
        let mut scores = Vec::new();
        for points in [15.0, 16.0, 8.0] {
            scores.push(graded(Uuid::new_v4(), easy, points));
        }
        for points in [6.0, 7.0, 12.0] {
            scores.push(graded(Uuid::new_v4(), hard, points));
        }
        let section = build_section_dashboard(
            SectionInput {
                cohort: Cohort::Section(Uuid::new_v4()),
                name: "4th year",
                level: Level::Secondary,
                evaluation_type: ScoreKind::NumericBase20,
                scores: &scores,
            },
            &[],
        );

        let subjects = difficult_subjects(&[section]);
        assert_eq!(subjects[0].subject_id, hard);
        assert_eq!(subjects[0].failure_rate, 66.67);
        assert_eq!(subjects[1].failure_rate, 33.33);
    }
}
