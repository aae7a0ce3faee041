use rayon::prelude::*;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use tracing::{info, warn};

use super::aggregate::Issue;
use super::assemble::{assemble, load_input, Assembled, AssemblyInput};
use super::error::ReportError;
use super::guard::{self, CommentGuard};
use super::repo;
use super::status::{self, Readiness, ReportStatus};
use crate::calc::{self, GradeWeights, Letter};
use crate::config::{self, GradingConfig};
use crate::model::{has_text, Actor, Report};
use crate::store::{EnrollmentStore, SqliteStore};

/// Per-student failure in a batch. The rest of the batch still completes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFailure {
    pub student_id: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub subject_comments: Vec<String>,
    pub overall_comment: bool,
    pub finalize: bool,
}

/// What callers see: the stored report plus everything derived from it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    #[serde(flatten)]
    pub report: Report,
    #[serde(flatten)]
    pub readiness: Readiness,
    pub overall_average: Option<f64>,
    pub overall_grade: Option<Letter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
}

impl ReportView {
    pub fn new(report: Report) -> Self {
        let readiness = status::readiness(&report);
        let overall_average =
            calc::overall_average(report.subject_reports.iter().map(|s| s.final_mark));
        Self {
            overall_grade: overall_average.map(calc::grade),
            overall_average,
            readiness,
            report,
            permissions: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    pub reports: Vec<ReportView>,
    pub failures: Vec<StudentFailure>,
    pub warnings: Vec<Issue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub total: usize,
    pub in_progress: usize,
    pub awaiting_class_teacher: usize,
    pub ready_to_finalize: usize,
    pub finalized: usize,
}

/// Orchestrates generation, comments and finalization against one workspace.
///
/// Every mutation runs in an IMMEDIATE transaction and re-reads the report and
/// the caller's authorization inside it, so a finalize that commits first
/// always turns a racing comment into `ReportLocked`.
pub struct ReportService<'a> {
    conn: &'a mut Connection,
}

impl<'a> ReportService<'a> {
    pub fn new(conn: &'a mut Connection) -> Self {
        Self { conn }
    }

    fn db(&self) -> &Connection {
        &*self.conn
    }

    fn grading(&self) -> Result<GradingConfig, ReportError> {
        Ok(config::load_grading(self.db())?)
    }

    fn weights(&self) -> Result<GradeWeights, ReportError> {
        Ok(self.grading()?.weights)
    }

    pub fn generate_for_class(
        &mut self,
        class_group_id: &str,
        term: &str,
        year: &str,
        actor: &Actor,
    ) -> Result<GenerationOutcome, ReportError> {
        let store = SqliteStore::new(self.db());
        let class_group = store
            .class_group(class_group_id)?
            .ok_or_else(|| guard::missing_or_forbidden(actor, "class group", class_group_id))?;
        if !CommentGuard::new(&store).can_generate(actor, &class_group)? {
            return Err(ReportError::Forbidden);
        }
        let weights = self.weights()?;

        let students = store.students_in_class_group(class_group_id, term, year)?;
        let mut failures = Vec::new();
        let mut inputs: Vec<AssemblyInput> = Vec::with_capacity(students.len());
        for student in &students {
            let existing = repo::find_for_student(self.db(), &student.id, term, year)?;
            match load_input(&store, student, term, year, existing) {
                Ok(input) => inputs.push(input),
                Err(e) => failures.push(failure(&student.id, &e)),
            }
        }

        let assembled: Vec<(usize, Result<Assembled, ReportError>)> = inputs
            .par_iter()
            .enumerate()
            .map(|(i, input)| (i, assemble(input, weights)))
            .collect();

        let mut reports = Vec::new();
        let mut warnings = Vec::new();
        for (i, result) in assembled {
            let input = &inputs[i];
            let outcome = match result {
                Ok(a) => self.persist(input, a, weights),
                Err(e) => Err(e),
            };
            match outcome {
                Ok((report, mut issues)) => {
                    warnings.append(&mut issues);
                    reports.push(ReportView::new(report));
                }
                Err(ReportError::ReportLocked { report_id, .. }) => {
                    // Finalized reports stay exactly as they are; they are still listed.
                    info!(report_id = %report_id, student_id = %input.student.id, "skipping finalized report");
                    if let Some(r) = repo::load(self.db(), &report_id)? {
                        reports.push(ReportView::new(r));
                    }
                    failures.push(StudentFailure {
                        student_id: input.student.id.clone(),
                        code: "report_locked",
                        message: format!("report {} is finalized", report_id),
                    });
                }
                Err(e) => {
                    warn!(student_id = %input.student.id, error = %e, "report generation failed");
                    failures.push(failure(&input.student.id, &e));
                }
            }
        }

        info!(
            class_group_id = %class_group_id,
            term = %term,
            year = %year,
            actor = %actor.id,
            generated = reports.len(),
            failed = failures.len(),
            "generated class reports"
        );
        Ok(GenerationOutcome {
            reports,
            failures,
            warnings,
        })
    }

    /// Write one assembled report. If the stored report moved on since the
    /// inputs were read, rebuild from fresh inputs inside the transaction.
    fn persist(
        &mut self,
        input: &AssemblyInput,
        assembled: Assembled,
        weights: GradeWeights,
    ) -> Result<(Report, Vec<Issue>), ReportError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = repo::find_for_student(&tx, &input.student.id, &input.term, &input.year)?;

        let stale = match (&current, &input.existing) {
            (None, None) => false,
            (Some(c), Some(e)) => c.version != e.version,
            _ => true,
        };
        let assembled = if stale {
            let store = SqliteStore::new(&tx);
            let fresh = load_input(&store, &input.student, &input.term, &input.year, current.clone())?;
            assemble(&fresh, weights)?
        } else {
            assembled
        };

        let changed = repo::save_assembled(&tx, &assembled.report, current.as_ref())?;
        let stored = repo::load(&tx, &assembled.report.id)?
            .ok_or_else(|| ReportError::not_found("report", &assembled.report.id))?;
        tx.commit()?;
        if changed {
            info!(report_id = %stored.id, student_id = %stored.student_id, version = stored.version, "report written");
        }
        Ok((stored, assembled.issues))
    }

    pub fn regenerate(&mut self, report_id: &str, actor: &Actor) -> Result<GenerationOutcome, ReportError> {
        let weights = self.weights()?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let store = SqliteStore::new(&tx);
        let existing = repo::load(&tx, report_id)?
            .ok_or_else(|| guard::missing_or_forbidden(actor, "report", report_id))?;
        if !CommentGuard::new(&store).can_generate(actor, &existing.class_group)? {
            return Err(ReportError::Forbidden);
        }
        if existing.finalized {
            return Err(ReportError::locked(report_id));
        }

        let student = store
            .student(&existing.student_id)?
            .ok_or_else(|| ReportError::not_found("student", &existing.student_id))?;
        let (term, year) = (existing.term.clone(), existing.academic_year.clone());
        let input = load_input(&store, &student, &term, &year, Some(existing.clone()))?;
        let assembled = assemble(&input, weights)?;
        repo::save_assembled(&tx, &assembled.report, Some(&existing))?;
        let stored = repo::load(&tx, report_id)?
            .ok_or_else(|| ReportError::not_found("report", report_id))?;
        tx.commit()?;

        info!(report_id = %report_id, actor = %actor.id, version = stored.version, "report regenerated");
        Ok(GenerationOutcome {
            reports: vec![ReportView::new(stored)],
            failures: Vec::new(),
            warnings: assembled.issues,
        })
    }

    pub fn get(&self, report_id: &str, actor: &Actor) -> Result<ReportView, ReportError> {
        let report = repo::load(self.db(), report_id)?
            .ok_or_else(|| ReportError::not_found("report", report_id))?;
        let store = SqliteStore::new(self.db());
        let g = CommentGuard::new(&store);

        let mut subject_comments = Vec::new();
        let mut overall_comment = false;
        if !report.finalized {
            for sr in &report.subject_reports {
                if g.can_comment_subject(actor, &report, &sr.subject_id)? {
                    subject_comments.push(sr.subject_id.clone());
                }
            }
            overall_comment = g.can_comment_overall(actor, &report)?;
        }
        let finalize = g.can_finalize(actor, &report);

        let mut view = ReportView::new(report);
        view.permissions = Some(Permissions {
            subject_comments,
            overall_comment,
            finalize,
        });
        Ok(view)
    }

    pub fn class_reports(
        &self,
        class_group_id: &str,
        term: &str,
        year: &str,
    ) -> Result<Vec<ReportView>, ReportError> {
        Ok(repo::list_for_class(self.db(), class_group_id, term, year)?
            .into_iter()
            .map(ReportView::new)
            .collect())
    }

    pub fn form_section_reports(
        &self,
        form: &str,
        section: &str,
        term: &str,
        year: &str,
    ) -> Result<Vec<ReportView>, ReportError> {
        Ok(repo::list_for_form_section(self.db(), form, section, term, year)?
            .into_iter()
            .map(ReportView::new)
            .collect())
    }

    pub fn student_reports(&self, student_id: &str) -> Result<Vec<ReportView>, ReportError> {
        Ok(repo::list_for_student(self.db(), student_id)?
            .into_iter()
            .map(ReportView::new)
            .collect())
    }

    /// Finalized reports only; nothing else is fit to print.
    pub fn printable(
        &self,
        class_group_id: &str,
        term: &str,
        year: &str,
    ) -> Result<Vec<ReportView>, ReportError> {
        Ok(self
            .class_reports(class_group_id, term, year)?
            .into_iter()
            .filter(|v| v.report.finalized)
            .collect())
    }

    pub fn class_summary(
        &self,
        class_group_id: &str,
        term: &str,
        year: &str,
    ) -> Result<ClassSummary, ReportError> {
        let reports = repo::list_for_class(self.db(), class_group_id, term, year)?;
        let count = |s: ReportStatus| reports.iter().filter(|r| status::status(r) == s).count();
        Ok(ClassSummary {
            total: reports.len(),
            in_progress: count(ReportStatus::InProgress),
            awaiting_class_teacher: count(ReportStatus::AwaitingClassTeacher),
            ready_to_finalize: count(ReportStatus::ReadyToFinalize),
            finalized: count(ReportStatus::Finalized),
        })
    }

    pub fn suggest_overall_comment(&self, report_id: &str) -> Result<Option<String>, ReportError> {
        let report = repo::load(self.db(), report_id)?
            .ok_or_else(|| ReportError::not_found("report", report_id))?;
        let avg = calc::overall_average(report.subject_reports.iter().map(|s| s.final_mark));
        Ok(avg.map(|a| calc::performance_comment(a).to_string()))
    }

    fn clean_comment(&self, comment: &str) -> Result<Option<String>, ReportError> {
        let max = self.grading()?.comment_max_chars;
        let trimmed = comment.trim();
        if trimmed.chars().count() > max {
            return Err(ReportError::BadInput(format!(
                "comment exceeds {} characters",
                max
            )));
        }
        Ok(has_text(Some(trimmed)).then(|| trimmed.to_string()))
    }

    pub fn add_subject_comment(
        &mut self,
        report_id: &str,
        subject_id: &str,
        comment: &str,
        actor: &Actor,
    ) -> Result<ReportView, ReportError> {
        let comment = self.clean_comment(comment)?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let store = SqliteStore::new(&tx);
        let report = repo::load(&tx, report_id)?
            .ok_or_else(|| guard::missing_or_forbidden(actor, "report", report_id))?;
        if !CommentGuard::new(&store).can_comment_subject(actor, &report, subject_id)? {
            warn!(report_id = %report_id, subject_id = %subject_id, actor = %actor.id, "subject comment denied");
            return Err(ReportError::Forbidden);
        }
        if report.finalized {
            return Err(ReportError::ReportLocked {
                report_id: report_id.to_string(),
                subject_id: Some(subject_id.to_string()),
            });
        }
        if report.subject(subject_id).is_none() {
            return Err(ReportError::not_found("subject report", subject_id));
        }

        let author = comment.as_ref().map(|_| actor.id.as_str());
        repo::set_subject_comment(&tx, report_id, subject_id, comment.as_deref(), author)?;
        let stored = repo::load(&tx, report_id)?
            .ok_or_else(|| ReportError::not_found("report", report_id))?;
        tx.commit()?;

        info!(report_id = %report_id, subject_id = %subject_id, actor = %actor.id, cleared = comment.is_none(), "subject comment saved");
        Ok(ReportView::new(stored))
    }

    pub fn add_overall_comment(
        &mut self,
        report_id: &str,
        comment: &str,
        actor: &Actor,
    ) -> Result<ReportView, ReportError> {
        let comment = self.clean_comment(comment)?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let store = SqliteStore::new(&tx);
        let report = repo::load(&tx, report_id)?
            .ok_or_else(|| guard::missing_or_forbidden(actor, "report", report_id))?;
        if !CommentGuard::new(&store).can_comment_overall(actor, &report)? {
            warn!(report_id = %report_id, actor = %actor.id, "overall comment denied");
            return Err(ReportError::Forbidden);
        }
        if report.finalized {
            return Err(ReportError::locked(report_id));
        }

        let author = comment.as_ref().map(|_| actor.id.as_str());
        repo::set_overall_comment(&tx, report_id, comment.as_deref(), author)?;
        let stored = repo::load(&tx, report_id)?
            .ok_or_else(|| ReportError::not_found("report", report_id))?;
        tx.commit()?;

        info!(report_id = %report_id, actor = %actor.id, cleared = comment.is_none(), "overall comment saved");
        Ok(ReportView::new(stored))
    }

    pub fn finalize(&mut self, report_id: &str, actor: &Actor) -> Result<ReportView, ReportError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let report = repo::load(&tx, report_id)?
            .ok_or_else(|| guard::missing_or_forbidden(actor, "report", report_id))?;
        if !guard::may_finalize(actor) {
            warn!(report_id = %report_id, actor = %actor.id, "finalize denied");
            return Err(ReportError::Forbidden);
        }
        status::check_finalizable(&report)?;
        if !repo::mark_finalized(&tx, report_id, &actor.id)? {
            return Err(ReportError::locked(report_id));
        }
        let stored = repo::load(&tx, report_id)?
            .ok_or_else(|| ReportError::not_found("report", report_id))?;
        tx.commit()?;

        info!(report_id = %report_id, actor = %actor.id, "report finalized");
        Ok(ReportView::new(stored))
    }
}

fn failure(student_id: &str, e: &ReportError) -> StudentFailure {
    StudentFailure {
        student_id: student_id.to_string(),
        code: e.code(),
        message: e.to_string(),
    }
}
