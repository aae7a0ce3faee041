use serde::Serialize;

use super::error::{MissingComment, ReportError};
use crate::model::Report;

/// Workflow position of a report. Only `finalized` is stored; the rest is
/// always derived from the current field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportStatus {
    InProgress,
    AwaitingClassTeacher,
    ReadyToFinalize,
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub status: ReportStatus,
    pub missing_subject_comments: Vec<MissingComment>,
    pub overall_comment_missing: bool,
}

pub fn readiness(report: &Report) -> Readiness {
    let missing: Vec<MissingComment> = report
        .subject_reports
        .iter()
        .filter(|sr| !sr.has_comment())
        .map(|sr| MissingComment {
            subject_id: sr.subject_id.clone(),
            subject_name: sr.subject_name.clone(),
        })
        .collect();
    let overall_missing = !report.has_overall_comment();

    let status = if report.finalized {
        ReportStatus::Finalized
    } else if !missing.is_empty() {
        ReportStatus::InProgress
    } else if overall_missing {
        ReportStatus::AwaitingClassTeacher
    } else {
        ReportStatus::ReadyToFinalize
    };

    Readiness {
        status,
        missing_subject_comments: missing,
        overall_comment_missing: overall_missing,
    }
}

pub fn status(report: &Report) -> ReportStatus {
    readiness(report).status
}

/// Gate for the only mutating transition, ReadyToFinalize -> Finalized.
pub fn check_finalizable(report: &Report) -> Result<(), ReportError> {
    let r = readiness(report);
    match r.status {
        ReportStatus::ReadyToFinalize => Ok(()),
        ReportStatus::Finalized => Err(ReportError::locked(&report.id)),
        ReportStatus::InProgress | ReportStatus::AwaitingClassTeacher => {
            Err(ReportError::NotReady {
                report_id: report.id.clone(),
                missing_subjects: r.missing_subject_comments,
                overall_comment_missing: r.overall_comment_missing,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::Letter;
    use crate::model::{ClassGroup, SubjectReport};

    fn subject(id: &str, comment: Option<&str>) -> SubjectReport {
        SubjectReport {
            subject_id: id.to_string(),
            subject_name: id.to_uppercase(),
            coursework_mark: Some(70.0),
            exam_mark: None,
            final_mark: Some(70.0),
            final_grade: Letter::B,
            comment: comment.map(str::to_string),
            comment_by: comment.map(|_| "t-1".to_string()),
            enrolled: true,
        }
    }

    fn report(subjects: Vec<SubjectReport>, overall: Option<&str>) -> Report {
        Report {
            id: "r-1".to_string(),
            student_id: "stu-1".to_string(),
            student_name: "Moyo, Tariro".to_string(),
            class_group: ClassGroup {
                id: "cg-1".to_string(),
                name: "Form 2A".to_string(),
                form: "2".to_string(),
                section: "A".to_string(),
            },
            term: "Term 1".to_string(),
            academic_year: "2026".to_string(),
            subject_reports: subjects,
            overall_comment: overall.map(str::to_string),
            overall_comment_by: overall.map(|_| "ct-1".to_string()),
            finalized: false,
            finalized_at: None,
            finalized_by: None,
            version: 1,
        }
    }

    #[test]
    fn states_follow_comment_coverage() {
        let r = report(vec![subject("math", Some("ok")), subject("eng", None)], None);
        assert_eq!(status(&r), ReportStatus::InProgress);

        let r = report(vec![subject("math", Some("ok")), subject("eng", Some("ok"))], None);
        assert_eq!(status(&r), ReportStatus::AwaitingClassTeacher);

        let mut r = report(vec![subject("math", Some("ok"))], Some("Great term"));
        assert_eq!(status(&r), ReportStatus::ReadyToFinalize);
        r.finalized = true;
        assert_eq!(status(&r), ReportStatus::Finalized);
    }

    #[test]
    fn blank_comments_do_not_count() {
        let r = report(vec![subject("math", Some("   "))], Some("Fine"));
        assert_eq!(status(&r), ReportStatus::InProgress);
    }

    #[test]
    fn not_ready_names_what_is_missing() {
        let r = report(vec![subject("math", Some("ok")), subject("eng", None)], None);
        match check_finalizable(&r) {
            Err(ReportError::NotReady {
                missing_subjects,
                overall_comment_missing,
                ..
            }) => {
                assert_eq!(missing_subjects.len(), 1);
                assert_eq!(missing_subjects[0].subject_id, "eng");
                assert!(overall_comment_missing);
            }
            other => panic!("expected NotReady, got {:?}", other),
        }

        let ok = report(vec![subject("math", Some("ok"))], Some("done"));
        assert!(check_finalizable(&ok).is_ok());
    }
}
