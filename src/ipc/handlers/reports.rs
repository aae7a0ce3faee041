use crate::ipc::error::{err, ok, report_err};
use crate::ipc::helpers::{db_conn_mut, require_actor, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::Actor;
use crate::report::{ReportError, ReportService};
use serde::Serialize;
use serde_json::json;

/// Resolve the actor and the workspace, then run `f` against the service.
fn with_service<T, F>(state: &mut AppState, req: &Request, f: F) -> serde_json::Value
where
    T: Serialize,
    F: FnOnce(&mut ReportService<'_>, &Actor) -> Result<T, ReportError>,
{
    let actor = match require_actor(req) {
        Ok(a) => a,
        Err(e) => return e,
    };
    let conn = match db_conn_mut(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut service = ReportService::new(conn);
    match f(&mut service, &actor) {
        Ok(v) => match serde_json::to_value(v) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Err(e) => report_err(&req.id, &e),
    }
}

fn class_period(req: &Request) -> Result<(String, String, String), serde_json::Value> {
    Ok((
        required_str(req, "classGroupId")?,
        required_str(req, "term")?,
        required_str(req, "year")?,
    ))
}

fn handle_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (class_group_id, term, year) = match class_period(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    with_service(state, req, |svc, actor| {
        svc.generate_for_class(&class_group_id, &term, &year, actor)
    })
}

fn handle_regenerate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let report_id = match required_str(req, "reportId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    with_service(state, req, |svc, actor| svc.regenerate(&report_id, actor))
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let report_id = match required_str(req, "reportId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    with_service(state, req, |svc, actor| svc.get(&report_id, actor))
}

fn handle_class_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (class_group_id, term, year) = match class_period(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    with_service(state, req, |svc, _| {
        Ok(json!({ "reports": svc.class_reports(&class_group_id, &term, &year)? }))
    })
}

fn handle_by_form_section(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params = ["form", "section", "term", "year"].map(|k| required_str(req, k));
    let [form, section, term, year] = match params {
        [Ok(a), Ok(b), Ok(c), Ok(d)] => [a, b, c, d],
        [Err(e), ..] | [_, Err(e), ..] | [_, _, Err(e), _] | [.., Err(e)] => return e,
    };
    with_service(state, req, |svc, _| {
        Ok(json!({ "reports": svc.form_section_reports(&form, &section, &term, &year)? }))
    })
}

fn handle_student_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    with_service(state, req, |svc, _| {
        Ok(json!({ "reports": svc.student_reports(&student_id)? }))
    })
}

fn handle_subject_comment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (report_id, subject_id) = match (required_str(req, "reportId"), required_str(req, "subjectId")) {
        (Ok(r), Ok(s)) => (r, s),
        (Err(e), _) | (_, Err(e)) => return e,
    };
    // An empty string clears the comment; the key itself is required.
    let Some(comment) = req.params.get("comment").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing comment", None);
    };
    let comment = comment.to_string();
    with_service(state, req, |svc, actor| {
        svc.add_subject_comment(&report_id, &subject_id, &comment, actor)
    })
}

fn handle_overall_comment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let report_id = match required_str(req, "reportId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(comment) = req.params.get("comment").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing comment", None);
    };
    let comment = comment.to_string();
    with_service(state, req, |svc, actor| {
        svc.add_overall_comment(&report_id, &comment, actor)
    })
}

fn handle_finalize(state: &mut AppState, req: &Request) -> serde_json::Value {
    let report_id = match required_str(req, "reportId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    with_service(state, req, |svc, actor| svc.finalize(&report_id, actor))
}

fn handle_printable(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (class_group_id, term, year) = match class_period(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    with_service(state, req, |svc, _| {
        Ok(json!({ "reports": svc.printable(&class_group_id, &term, &year)? }))
    })
}

fn handle_class_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (class_group_id, term, year) = match class_period(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    with_service(state, req, |svc, _| {
        svc.class_summary(&class_group_id, &term, &year)
    })
}

fn handle_suggest_overall_comment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let report_id = match required_str(req, "reportId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    with_service(state, req, |svc, _| {
        Ok(json!({ "suggestion": svc.suggest_overall_comment(&report_id)? }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.generate" => Some(handle_generate(state, req)),
        "reports.regenerate" => Some(handle_regenerate(state, req)),
        "reports.get" => Some(handle_get(state, req)),
        "reports.classList" => Some(handle_class_list(state, req)),
        "reports.byFormSection" => Some(handle_by_form_section(state, req)),
        "reports.studentList" => Some(handle_student_list(state, req)),
        "reports.subjectComment" => Some(handle_subject_comment(state, req)),
        "reports.overallComment" => Some(handle_overall_comment(state, req)),
        "reports.finalize" => Some(handle_finalize(state, req)),
        "reports.printable" => Some(handle_printable(state, req)),
        "reports.classSummary" => Some(handle_class_summary(state, req)),
        "reports.suggestOverallComment" => Some(handle_suggest_overall_comment(state, req)),
        _ => None,
    }
}
