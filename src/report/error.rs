use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::calc::InvalidMarkError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingComment {
    pub subject_id: String,
    pub subject_name: String,
}

/// Failures surfaced by the report engine. None of them are transient, so
/// nothing here is retried.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid mark: {0}")]
    InvalidMark(#[from] InvalidMarkError),

    #[error("report {report_id} is finalized and can no longer change")]
    ReportLocked {
        report_id: String,
        subject_id: Option<String>,
    },

    #[error("report {report_id} is not ready to finalize")]
    NotReady {
        report_id: String,
        missing_subjects: Vec<MissingComment>,
        overall_comment_missing: bool,
    },

    #[error("not permitted")]
    Forbidden,

    #[error("{what} not found")]
    NotFound { what: &'static str, id: String },

    #[error("{0}")]
    BadInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for ReportError {
    fn from(e: rusqlite::Error) -> Self {
        ReportError::Storage(e.into())
    }
}

impl ReportError {
    pub fn locked(report_id: &str) -> Self {
        ReportError::ReportLocked {
            report_id: report_id.to_string(),
            subject_id: None,
        }
    }

    pub fn not_found(what: &'static str, id: &str) -> Self {
        ReportError::NotFound {
            what,
            id: id.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ReportError::InvalidMark(_) => "invalid_mark",
            ReportError::ReportLocked { .. } => "report_locked",
            ReportError::NotReady { .. } => "not_ready",
            ReportError::Forbidden => "forbidden",
            ReportError::NotFound { .. } => "not_found",
            ReportError::BadInput(_) => "bad_params",
            ReportError::Storage(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ReportError::ReportLocked {
                report_id,
                subject_id,
            } => Some(json!({ "reportId": report_id, "subjectId": subject_id })),
            ReportError::NotReady {
                report_id,
                missing_subjects,
                overall_comment_missing,
            } => Some(json!({
                "reportId": report_id,
                "missingSubjects": missing_subjects,
                "overallCommentMissing": overall_comment_missing,
            })),
            ReportError::NotFound { what, id } => Some(json!({ "kind": what, "id": id })),
            _ => None,
        }
    }
}
