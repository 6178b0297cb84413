use std::fmt::Write;

use crate::models::{GroupAverage, StudentRow, YearStats};

fn student_average(student: &StudentRow) -> String {
    match (student.literal_average, student.average) {
        (Some(letter), _) => letter.to_string(),
        (None, Some(average)) => format!("{average:.2}"),
        (None, None) => "-".to_string(),
    }
}

fn group_average(average: GroupAverage) -> String {
    match average {
        GroupAverage::Numeric(value) => format!("{value:.2}"),
        GroupAverage::Literal(letter) => letter.to_string(),
        GroupAverage::Observed => "observed".to_string(),
    }
}

pub fn build_report(stats: &YearStats) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# School Year Report: {}", stats.name);
    let _ = writeln!(
        output,
        "State: {}. {} of {} students approved; approval rate {:.2}%.",
        stats.state.as_str(),
        stats.approved_students,
        stats.total_students,
        stats.approval_rate
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Levels");

    if stats.distribution.is_empty() {
        let _ = writeln!(output, "No enrolled students this year.");
    } else {
        for level in &stats.distribution {
            let _ = writeln!(
                output,
                "- {}: {}/{} approved ({:.2}%), average {:.2}",
                level.category.label(),
                level.approved_students,
                level.total_students,
                level.approval_rate,
                level.average
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Students");

    if stats.top_students.is_empty() {
        let _ = writeln!(output, "No graded students yet.");
    } else {
        for (rank, student) in stats.top_students.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} ({})",
                rank + 1,
                student.student_name,
                student_average(student)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Sections");

    if stats.sections.is_empty() {
        let _ = writeln!(output, "No graded sections.");
    } else {
        for section in &stats.sections {
            let _ = writeln!(
                output,
                "- {} ({}): average {:.2}, {}/{} approved ({:.2}%)",
                section.name,
                section.level,
                section.average,
                section.approved_students,
                section.total_students,
                section.approval_rate
            );
        }
    }

    for level in &stats.levels {
        if level.performance.is_empty() {
            continue;
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "### {} performance", level.category.label());
        for group in &level.performance {
            let _ = writeln!(
                output,
                "- {}: {} ({}/{} approved)",
                group.label,
                group_average(group.average),
                group.approved_students,
                group.total_students
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Difficult Subjects");

    if stats.difficult_subjects.is_empty() {
        let _ = writeln!(output, "No secondary subjects graded.");
    } else {
        for subject in &stats.difficult_subjects {
            let _ = writeln!(
                output,
                "- {}: {:.2}% failing ({}/{}), average {:.2}",
                subject.subject_name,
                subject.failure_rate,
                subject.failed_students,
                subject.total_students,
                subject.average
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Teachers");

    if stats.teachers.is_empty() {
        let _ = writeln!(output, "No subject assignments this year.");
    } else {
        for teacher in &stats.teachers {
            let _ = writeln!(
                output,
                "- {}: {} sections, {} subjects, {} evaluations",
                teacher.teacher_name, teacher.sections, teacher.subjects, teacher.evaluations
            );
        }
    }

    let evaluations = &stats.evaluations;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Evaluations");
    let _ = writeln!(
        output,
        "{} evaluations: {} fully graded, {} partial, {} draft.",
        evaluations.total, evaluations.qualified, evaluations.partial, evaluations.draft
    );
    let _ = writeln!(
        output,
        "By level: {} preschool, {} primary, {} secondary.",
        evaluations.preschool, evaluations.primary, evaluations.secondary
    );

    output
}
