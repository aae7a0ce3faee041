use crate::calc::Letter;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Admin,
    Clerk,
    Teacher,
    ClassTeacher,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "clerk" => Some(Role::Clerk),
            "teacher" => Some(Role::Teacher),
            "classTeacher" => Some(Role::ClassTeacher),
            _ => None,
        }
    }
}

/// The authenticated caller. Every engine operation receives one explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn has(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssessmentKind {
    Coursework,
    FinalExam,
}

impl AssessmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentKind::Coursework => "COURSEWORK",
            AssessmentKind::FinalExam => "FINAL_EXAM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "COURSEWORK" => Some(AssessmentKind::Coursework),
            "FINAL_EXAM" => Some(AssessmentKind::FinalExam),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    #[serde(rename = "type")]
    pub kind: AssessmentKind,
    pub score: f64,
    pub max_score: f64,
    pub term: String,
    pub academic_year: String,
    pub date: String,
    /// Insertion order; breaks ties between equal dates.
    pub seq: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    pub id: String,
    pub name: String,
    pub form: String,
    pub section: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectReport {
    pub subject_id: String,
    pub subject_name: String,
    pub coursework_mark: Option<f64>,
    pub exam_mark: Option<f64>,
    pub final_mark: Option<f64>,
    pub final_grade: Letter,
    pub comment: Option<String>,
    pub comment_by: Option<String>,
    /// False when the subject is only kept because it carries a comment.
    pub enrolled: bool,
}

impl SubjectReport {
    pub fn has_comment(&self) -> bool {
        has_text(self.comment.as_deref())
    }

    /// Computed content only; comment fields excluded.
    pub fn same_marks(&self, other: &SubjectReport) -> bool {
        self.coursework_mark == other.coursework_mark
            && self.exam_mark == other.exam_mark
            && self.final_mark == other.final_mark
            && self.final_grade == other.final_grade
            && self.enrolled == other.enrolled
            && self.subject_name == other.subject_name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub class_group: ClassGroup,
    pub term: String,
    pub academic_year: String,
    pub subject_reports: Vec<SubjectReport>,
    pub overall_comment: Option<String>,
    pub overall_comment_by: Option<String>,
    pub finalized: bool,
    pub finalized_at: Option<String>,
    pub finalized_by: Option<String>,
    pub version: i64,
}

impl Report {
    pub fn has_overall_comment(&self) -> bool {
        has_text(self.overall_comment.as_deref())
    }

    pub fn subject(&self, subject_id: &str) -> Option<&SubjectReport> {
        self.subject_reports
            .iter()
            .find(|s| s.subject_id == subject_id)
    }
}

pub fn has_text(v: Option<&str>) -> bool {
    v.map(|s| !s.trim().is_empty()).unwrap_or(false)
}
