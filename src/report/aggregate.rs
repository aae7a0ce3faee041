use serde::Serialize;

use crate::calc::{self, GradeWeights, Letter};
use crate::model::{Assessment, AssessmentKind, Subject, SubjectReport};

/// Non-fatal findings raised while building reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub student_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment_id: Option<String>,
    pub code: &'static str,
    pub message: String,
}

impl Issue {
    fn no_assessments(student_id: &str, subject: &Subject) -> Self {
        Self {
            student_id: student_id.to_string(),
            subject_id: Some(subject.id.clone()),
            assessment_id: None,
            code: "no_assessments",
            message: format!("no assessments recorded for {}", subject.name),
        }
    }

    fn invalid_mark(student_id: &str, a: &Assessment, e: &calc::InvalidMarkError) -> Self {
        Self {
            student_id: student_id.to_string(),
            subject_id: Some(a.subject_id.clone()),
            assessment_id: Some(a.id.clone()),
            code: "invalid_mark",
            message: e.to_string(),
        }
    }
}

/// Latest FINAL_EXAM by date; equal dates go to the later-recorded one.
/// Dates are stored as `YYYY-MM-DD`, so string order is date order.
fn effective_exam(exams: &[(&Assessment, f64)]) -> Option<f64> {
    exams
        .iter()
        .max_by(|(a, _), (b, _)| a.date.cmp(&b.date).then(a.seq.cmp(&b.seq)))
        .map(|(_, pct)| *pct)
}

/// Build one subject report from the assessments of a (student, subject, term, year).
///
/// Comments on `prior` are carried forward untouched; only computed marks change.
/// Invalid assessments are left out of the calculation and reported as issues;
/// an `Err` means the computed components themselves were out of range.
pub fn aggregate_subject(
    student_id: &str,
    subject: &Subject,
    enrolled: bool,
    assessments: &[Assessment],
    prior: Option<&SubjectReport>,
    weights: GradeWeights,
) -> Result<(SubjectReport, Vec<Issue>), calc::InvalidMarkError> {
    let mut issues = Vec::new();
    let mut coursework = Vec::new();
    let mut exams = Vec::new();

    for a in assessments {
        let pct = match calc::normalize(a.score, a.max_score) {
            Ok(v) => calc::round_2dp(v),
            Err(e) => {
                issues.push(Issue::invalid_mark(student_id, a, &e));
                continue;
            }
        };
        match a.kind {
            AssessmentKind::Coursework => coursework.push(pct),
            AssessmentKind::FinalExam => exams.push((a, pct)),
        }
    }

    if coursework.is_empty() && exams.is_empty() {
        issues.push(Issue::no_assessments(student_id, subject));
    }

    let coursework_mark = calc::mean_2dp(&coursework);
    let exam_mark = effective_exam(&exams);
    let final_mark = calc::final_mark(coursework_mark, exam_mark, weights)?;
    let final_grade = final_mark.map(calc::grade).unwrap_or(Letter::U);

    let report = SubjectReport {
        subject_id: subject.id.clone(),
        subject_name: subject.name.clone(),
        coursework_mark,
        exam_mark,
        final_mark,
        final_grade,
        comment: prior.and_then(|p| p.comment.clone()),
        comment_by: prior.and_then(|p| p.comment_by.clone()),
        enrolled,
    };
    Ok((report, issues))
}
