use super::error::ReportError;
use super::status::{self, ReportStatus};
use crate::model::{Actor, ClassGroup, Report, Role};
use crate::store::StaffDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    CommentSubject,
    CommentOverall,
    Finalize,
    Generate,
}

/// Which roles may attempt an action at all. Assignment checks come after.
fn role_allows(role: Role, action: Action) -> bool {
    match (role, action) {
        (Role::Teacher, Action::CommentSubject) => true,
        (Role::Teacher, _) => false,
        (Role::ClassTeacher, Action::CommentOverall | Action::Generate) => true,
        (Role::ClassTeacher, _) => false,
        (Role::Admin | Role::Clerk, Action::Finalize | Action::Generate) => true,
        (Role::Admin | Role::Clerk, _) => false,
    }
}

fn any_role_allows(actor: &Actor, action: Action) -> bool {
    actor.roles.iter().any(|r| role_allows(*r, action))
}

/// Admin staff may learn that a report does not exist; everyone else gets a
/// plain denial.
pub fn missing_or_forbidden(actor: &Actor, what: &'static str, id: &str) -> ReportError {
    if actor.has(Role::Admin) || actor.has(Role::Clerk) {
        ReportError::not_found(what, id)
    } else {
        ReportError::Forbidden
    }
}

pub struct CommentGuard<'a, D: StaffDirectory> {
    staff: &'a D,
}

impl<'a, D: StaffDirectory> CommentGuard<'a, D> {
    pub fn new(staff: &'a D) -> Self {
        Self { staff }
    }

    pub fn can_comment_subject(
        &self,
        actor: &Actor,
        report: &Report,
        subject_id: &str,
    ) -> anyhow::Result<bool> {
        if !any_role_allows(actor, Action::CommentSubject) {
            return Ok(false);
        }
        self.staff.is_assigned_teacher(
            &actor.id,
            subject_id,
            &report.class_group.form,
            &report.class_group.section,
        )
    }

    pub fn can_comment_overall(&self, actor: &Actor, report: &Report) -> anyhow::Result<bool> {
        if !any_role_allows(actor, Action::CommentOverall) {
            return Ok(false);
        }
        self.staff
            .is_class_teacher_of(&actor.id, &report.class_group.id)
    }

    pub fn can_finalize(&self, actor: &Actor, report: &Report) -> bool {
        may_finalize(actor) && status::status(report) == ReportStatus::ReadyToFinalize
    }

    pub fn can_generate(&self, actor: &Actor, class_group: &ClassGroup) -> anyhow::Result<bool> {
        if actor.has(Role::Admin) || actor.has(Role::Clerk) {
            return Ok(true);
        }
        if !any_role_allows(actor, Action::Generate) {
            return Ok(false);
        }
        self.staff.is_class_teacher_of(&actor.id, &class_group.id)
    }
}

/// Role half of `can_finalize`, so callers can tell Forbidden from NotReady.
pub fn may_finalize(actor: &Actor) -> bool {
    any_role_allows(actor, Action::Finalize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::Letter;
    use crate::model::SubjectReport;

    struct FakeStaff;

    impl StaffDirectory for FakeStaff {
        fn is_assigned_teacher(
            &self,
            actor_id: &str,
            subject_id: &str,
            form: &str,
            section: &str,
        ) -> anyhow::Result<bool> {
            Ok(actor_id == "t-math" && subject_id == "math" && form == "2" && section == "A")
        }

        fn is_class_teacher_of(&self, actor_id: &str, class_group_id: &str) -> anyhow::Result<bool> {
            Ok(actor_id == "t-ct" && class_group_id == "cg-2a")
        }
    }

    fn actor(id: &str, roles: &[Role]) -> Actor {
        Actor {
            id: id.to_string(),
            roles: roles.to_vec(),
        }
    }

    fn report(section: &str, ready: bool) -> Report {
        Report {
            id: "r-1".to_string(),
            student_id: "stu-1".to_string(),
            student_name: "Moyo, Tariro".to_string(),
            class_group: ClassGroup {
                id: format!("cg-2{}", section.to_lowercase()),
                name: format!("Form 2{}", section),
                form: "2".to_string(),
                section: section.to_string(),
            },
            term: "Term 1".to_string(),
            academic_year: "2026".to_string(),
            subject_reports: vec![SubjectReport {
                subject_id: "math".to_string(),
                subject_name: "Maths".to_string(),
                coursework_mark: None,
                exam_mark: None,
                final_mark: None,
                final_grade: Letter::U,
                comment: ready.then(|| "ok".to_string()),
                comment_by: None,
                enrolled: true,
            }],
            overall_comment: ready.then(|| "fine".to_string()),
            overall_comment_by: None,
            finalized: false,
            finalized_at: None,
            finalized_by: None,
            version: 1,
        }
    }

    #[test]
    fn subject_comment_needs_role_and_exact_assignment() {
        let g = CommentGuard::new(&FakeStaff);
        let teacher = actor("t-math", &[Role::Teacher]);
        assert!(g.can_comment_subject(&teacher, &report("A", false), "math").unwrap());
        assert!(!g.can_comment_subject(&teacher, &report("B", false), "math").unwrap());
        assert!(!g.can_comment_subject(&teacher, &report("A", false), "eng").unwrap());

        // Assignment alone is not enough without the teacher role.
        let no_role = actor("t-math", &[Role::Clerk]);
        assert!(!g.can_comment_subject(&no_role, &report("A", false), "math").unwrap());
    }

    #[test]
    fn overall_comment_is_class_teacher_only() {
        let g = CommentGuard::new(&FakeStaff);
        let ct = actor("t-ct", &[Role::Teacher, Role::ClassTeacher]);
        assert!(g.can_comment_overall(&ct, &report("A", false)).unwrap());
        assert!(!g.can_comment_overall(&ct, &report("B", false)).unwrap());
        let admin = actor("t-ct", &[Role::Admin]);
        assert!(!g.can_comment_overall(&admin, &report("A", false)).unwrap());
    }

    #[test]
    fn finalize_needs_admin_role_and_ready_state() {
        let g = CommentGuard::new(&FakeStaff);
        let clerk = actor("c-1", &[Role::Clerk]);
        let ct = actor("t-ct", &[Role::ClassTeacher]);
        assert!(g.can_finalize(&clerk, &report("A", true)));
        assert!(!g.can_finalize(&clerk, &report("A", false)));
        assert!(!g.can_finalize(&ct, &report("A", true)));
    }

    #[test]
    fn unknown_report_is_hidden_from_non_admins() {
        let teacher = actor("t-math", &[Role::Teacher]);
        assert!(matches!(
            missing_or_forbidden(&teacher, "report", "nope"),
            ReportError::Forbidden
        ));
        let admin = actor("a-1", &[Role::Admin]);
        assert!(matches!(
            missing_or_forbidden(&admin, "report", "nope"),
            ReportError::NotFound { .. }
        ));
    }
}
