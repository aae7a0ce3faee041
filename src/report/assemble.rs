use std::collections::HashSet;

use uuid::Uuid;

use super::aggregate::{aggregate_subject, Issue};
use super::error::ReportError;
use crate::calc::GradeWeights;
use crate::model::{Assessment, ClassGroup, Report, Subject};
use crate::store::{AssessmentStore, EnrollmentStore, StudentRef};

#[derive(Debug, Clone)]
pub struct SubjectInput {
    pub subject: Subject,
    pub enrolled: bool,
    pub assessments: Vec<Assessment>,
}

/// Everything needed to build one student's report without touching storage.
#[derive(Debug, Clone)]
pub struct AssemblyInput {
    pub student: StudentRef,
    pub class_group: ClassGroup,
    pub term: String,
    pub year: String,
    /// Enrolled subjects first, in enrollment order, then dropped-but-commented ones.
    pub subjects: Vec<SubjectInput>,
    pub existing: Option<Report>,
}

#[derive(Debug, Clone)]
pub struct Assembled {
    pub report: Report,
    pub issues: Vec<Issue>,
}

/// Read the inputs for one student. `existing` is the stored report for the
/// same (student, term, year), if any.
pub fn load_input<S>(
    store: &S,
    student: &StudentRef,
    term: &str,
    year: &str,
    existing: Option<Report>,
) -> Result<AssemblyInput, ReportError>
where
    S: AssessmentStore + EnrollmentStore,
{
    let class_group = store
        .class_group_of(&student.id, term, year)?
        .ok_or_else(|| {
            ReportError::BadInput(format!(
                "student {} is not placed in a class group for {} {}",
                student.id, term, year
            ))
        })?;

    let enrolled = store.enrolled_subjects(&student.id, term, year)?;
    if enrolled.is_empty() && existing.is_none() {
        return Err(ReportError::BadInput(format!(
            "student {} has no enrolled subjects for {} {}",
            student.id, term, year
        )));
    }

    let enrolled_ids: HashSet<&str> = enrolled.iter().map(|s| s.id.as_str()).collect();
    let mut subjects = Vec::with_capacity(enrolled.len());
    for subject in &enrolled {
        let assessments = store.list_assessments(&student.id, &subject.id, term, year)?;
        subjects.push(SubjectInput {
            subject: subject.clone(),
            enrolled: true,
            assessments,
        });
    }

    // Dropped subjects are only kept when someone already commented on them.
    if let Some(prev) = &existing {
        for sr in &prev.subject_reports {
            if enrolled_ids.contains(sr.subject_id.as_str()) || !sr.has_comment() {
                continue;
            }
            let assessments = store.list_assessments(&student.id, &sr.subject_id, term, year)?;
            subjects.push(SubjectInput {
                subject: Subject {
                    id: sr.subject_id.clone(),
                    code: String::new(),
                    name: sr.subject_name.clone(),
                },
                enrolled: false,
                assessments,
            });
        }
    }

    Ok(AssemblyInput {
        student: student.clone(),
        class_group,
        term: term.to_string(),
        year: year.to_string(),
        subjects,
        existing,
    })
}

/// Generate or regenerate a report from its inputs. Pure: no storage access,
/// so batches can run this step in parallel.
pub fn assemble(input: &AssemblyInput, weights: GradeWeights) -> Result<Assembled, ReportError> {
    if let Some(prev) = &input.existing {
        if prev.finalized {
            return Err(ReportError::locked(&prev.id));
        }
    }

    let mut issues = Vec::new();
    let mut subject_reports = Vec::with_capacity(input.subjects.len());
    for si in &input.subjects {
        let prior = input
            .existing
            .as_ref()
            .and_then(|r| r.subject(&si.subject.id));
        let (sr, mut found) = aggregate_subject(
            &input.student.id,
            &si.subject,
            si.enrolled,
            &si.assessments,
            prior,
            weights,
        )?;
        subject_reports.push(sr);
        issues.append(&mut found);
    }

    let report = match &input.existing {
        Some(prev) => Report {
            class_group: input.class_group.clone(),
            student_name: input.student.display_name.clone(),
            subject_reports,
            ..prev.clone()
        },
        None => Report {
            id: Uuid::new_v4().to_string(),
            student_id: input.student.id.clone(),
            student_name: input.student.display_name.clone(),
            class_group: input.class_group.clone(),
            term: input.term.clone(),
            academic_year: input.year.clone(),
            subject_reports,
            overall_comment: None,
            overall_comment_by: None,
            finalized: false,
            finalized_at: None,
            finalized_by: None,
            version: 0,
        },
    };

    Ok(Assembled { report, issues })
}
