use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_conn_mut, require_actor, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{AssessmentKind, Role};
use crate::store::{AssessmentStore, SqliteStore};
use chrono::NaiveDate;
use rusqlite::TransactionBehavior;
use serde_json::json;
use uuid::Uuid;

fn required_f64(req: &Request, key: &str) -> Result<f64, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be a number", key), None))
}

// Range checks on score/maxScore happen when reports are built, so a bad
// entry only affects its own subject.
fn handle_assessments_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let actor = match require_actor(req) {
        Ok(a) => a,
        Err(e) => return e,
    };
    if !(actor.has(Role::Teacher) || actor.has(Role::Admin) || actor.has(Role::Clerk)) {
        return err(&req.id, "forbidden", "not permitted", None);
    }
    let conn = match db_conn_mut(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let params = ["studentId", "subjectId", "type", "term", "year", "date"]
        .map(|k| required_str(req, k));
    let [student_id, subject_id, kind_raw, term, year, date] = match params {
        [Ok(a), Ok(b), Ok(c), Ok(d), Ok(e), Ok(f)] => [a, b, c, d, e, f],
        [Err(e), ..]
        | [_, Err(e), ..]
        | [_, _, Err(e), ..]
        | [_, _, _, Err(e), ..]
        | [_, _, _, _, Err(e), _]
        | [.., Err(e)] => return e,
    };
    let Some(kind) = AssessmentKind::parse(&kind_raw) else {
        return err(
            &req.id,
            "bad_params",
            "type must be COURSEWORK or FINAL_EXAM",
            Some(json!({ "type": kind_raw })),
        );
    };
    if NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
        return err(
            &req.id,
            "bad_params",
            "date must be YYYY-MM-DD",
            Some(json!({ "date": date })),
        );
    }
    let (score, max_score) = match (required_f64(req, "score"), required_f64(req, "maxScore")) {
        (Ok(s), Ok(m)) => (s, m),
        (Err(e), _) | (_, Err(e)) => return e,
    };

    // seq breaks same-date ties; allocate and insert under one write lock.
    let tx = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let seq: i64 = match tx.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM assessments", [], |r| {
        r.get(0)
    }) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let id = Uuid::new_v4().to_string();
    if let Err(e) = tx.execute(
        "INSERT INTO assessments(
            id, seq, student_id, subject_id, kind, score, max_score, term, academic_year, date)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            seq,
            student_id,
            subject_id,
            kind.as_str(),
            score,
            max_score,
            term,
            year,
            date
        ],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "assessments" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    tracing::debug!(assessment_id = %id, seq, student_id = %student_id, subject_id = %subject_id, "assessment recorded");
    ok(&req.id, json!({ "assessmentId": id }))
}

fn handle_assessments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_actor(req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let params = ["studentId", "subjectId", "term", "year"].map(|k| required_str(req, k));
    let [student_id, subject_id, term, year] = match params {
        [Ok(a), Ok(b), Ok(c), Ok(d)] => [a, b, c, d],
        [Err(e), ..] | [_, Err(e), ..] | [_, _, Err(e), _] | [.., Err(e)] => return e,
    };

    match SqliteStore::new(conn).list_assessments(&student_id, &subject_id, &term, &year) {
        Ok(list) => ok(&req.id, json!({ "assessments": list })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assessments.record" => Some(handle_assessments_record(state, req)),
        "assessments.list" => Some(handle_assessments_list(state, req)),
        _ => None,
    }
}
