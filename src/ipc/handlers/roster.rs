use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_conn_mut, optional_str, require_actor, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Roster data is maintained by office staff only.
fn require_office(req: &Request) -> Result<(), serde_json::Value> {
    let actor = require_actor(req)?;
    if actor.has(Role::Admin) || actor.has(Role::Clerk) {
        Ok(())
    } else {
        Err(err(&req.id, "forbidden", "not permitted", None))
    }
}

fn exists(conn: &Connection, table: &str, id: &str) -> rusqlite::Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let hit: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(hit.is_some())
}

fn require_row(conn: &Connection, req: &Request, table: &str, id: &str) -> Result<(), serde_json::Value> {
    match exists(conn, table, id) {
        Ok(true) => Ok(()),
        Ok(false) => Err(err(
            &req.id,
            "not_found",
            format!("{} not found", table),
            Some(json!({ "id": id })),
        )),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

fn handle_class_groups_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_office(req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (form, section) = match (required_str(req, "form"), required_str(req, "section")) {
        (Ok(f), Ok(s)) => (f, s),
        (Err(e), _) | (_, Err(e)) => return e,
    };
    let name = optional_str(req, "name").unwrap_or_else(|| format!("Form {}{}", form, section));

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO class_groups(id, name, form, section) VALUES(?, ?, ?, ?)",
        (&id, &name, &form, &section),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "class_groups" })),
        );
    }
    ok(
        &req.id,
        json!({ "classGroupId": id, "name": name, "form": form, "section": section }),
    )
}

fn handle_class_groups_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classGroups": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.form,
           c.section,
           (SELECT teacher_id FROM class_teachers t WHERE t.class_group_id = c.id) AS class_teacher
         FROM class_groups c
         ORDER BY c.form, c.section",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let form: String = row.get(2)?;
            let section: String = row.get(3)?;
            let class_teacher: Option<String> = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "form": form,
                "section": section,
                "classTeacherId": class_teacher
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(groups) => ok(&req.id, json!({ "classGroups": groups })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_office(req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (code, name) = match (required_str(req, "code"), required_str(req, "name")) {
        (Ok(c), Ok(n)) => (c.to_ascii_uppercase(), n),
        (Err(e), _) | (_, Err(e)) => return e,
    };

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, code, name) VALUES(?, ?, ?)",
        (&id, &code, &name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "subjects" })),
        );
    }
    ok(&req.id, json!({ "subjectId": id, "code": code, "name": name }))
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "subjects": [] }));
    };
    let rows = conn
        .prepare("SELECT id, code, name FROM subjects ORDER BY code")
        .and_then(|mut stmt| {
            stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                let code: String = row.get(1)?;
                let name: String = row.get(2)?;
                Ok(json!({ "id": id, "code": code, "name": name }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        });
    match rows {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_office(req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (first, last) = match (required_str(req, "firstName"), required_str(req, "lastName")) {
        (Ok(f), Ok(l)) => (f, l),
        (Err(e), _) | (_, Err(e)) => return e,
    };
    let student_no = optional_str(req, "studentNo");

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, last_name, first_name, student_no) VALUES(?, ?, ?, ?)",
        (&id, &last, &first, &student_no),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    ok(&req.id, json!({ "studentId": id }))
}

fn handle_students_place(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_office(req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let params = ["studentId", "classGroupId", "term", "year"]
        .map(|k| required_str(req, k));
    let [student_id, class_group_id, term, year] = match params {
        [Ok(a), Ok(b), Ok(c), Ok(d)] => [a, b, c, d],
        [Err(e), ..] | [_, Err(e), ..] | [_, _, Err(e), _] | [.., Err(e)] => return e,
    };
    if let Err(e) = require_row(conn, req, "students", &student_id) {
        return e;
    }
    if let Err(e) = require_row(conn, req, "class_groups", &class_group_id) {
        return e;
    }

    if let Err(e) = conn.execute(
        "INSERT INTO placements(student_id, term, academic_year, class_group_id)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, term, academic_year)
         DO UPDATE SET class_group_id = excluded.class_group_id",
        (&student_id, &term, &year, &class_group_id),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_enrollments_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_office(req) {
        return e;
    }
    let conn = match db_conn_mut(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let params = ["studentId", "term", "year"].map(|k| required_str(req, k));
    let [student_id, term, year] = match params {
        [Ok(a), Ok(b), Ok(c)] => [a, b, c],
        [Err(e), ..] | [_, Err(e), _] | [.., Err(e)] => return e,
    };
    let Some(raw_ids) = req.params.get("subjectIds").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "subjectIds must be an array", None);
    };
    let mut subject_ids: Vec<String> = Vec::with_capacity(raw_ids.len());
    for v in raw_ids {
        let Some(s) = v.as_str() else {
            return err(&req.id, "bad_params", "subjectIds must be strings", None);
        };
        if subject_ids.iter().any(|x| x == s) {
            return err(
                &req.id,
                "bad_params",
                "duplicate subject in subjectIds",
                Some(json!({ "subjectId": s })),
            );
        }
        subject_ids.push(s.to_string());
    }
    if let Err(e) = require_row(conn, req, "students", &student_id) {
        return e;
    }
    for sid in &subject_ids {
        if let Err(e) = require_row(conn, req, "subjects", sid) {
            return e;
        }
    }

    let tx = match conn.transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "DELETE FROM subject_enrollments WHERE student_id = ? AND term = ? AND academic_year = ?",
        (&student_id, &term, &year),
    ) {
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    for (i, sid) in subject_ids.iter().enumerate() {
        if let Err(e) = tx.execute(
            "INSERT INTO subject_enrollments(student_id, subject_id, term, academic_year, sort_order)
             VALUES(?, ?, ?, ?, ?)",
            (&student_id, sid, &term, &year, i as i64),
        ) {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "subject_enrollments" })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "count": subject_ids.len() }))
}

fn handle_staff_assign_subject(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_office(req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let params = ["teacherId", "subjectId", "form", "section"].map(|k| required_str(req, k));
    let [teacher_id, subject_id, form, section] = match params {
        [Ok(a), Ok(b), Ok(c), Ok(d)] => [a, b, c, d],
        [Err(e), ..] | [_, Err(e), ..] | [_, _, Err(e), _] | [.., Err(e)] => return e,
    };
    let active = req
        .params
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    if let Err(e) = require_row(conn, req, "subjects", &subject_id) {
        return e;
    }

    if let Err(e) = conn.execute(
        "INSERT INTO subject_assignments(teacher_id, subject_id, form, section, active)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(teacher_id, subject_id, form, section)
         DO UPDATE SET active = excluded.active",
        (&teacher_id, &subject_id, &form, &section, active as i64),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true, "active": active }))
}

fn handle_staff_set_class_teacher(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_office(req) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let (class_group_id, teacher_id) =
        match (required_str(req, "classGroupId"), required_str(req, "teacherId")) {
            (Ok(c), Ok(t)) => (c, t),
            (Err(e), _) | (_, Err(e)) => return e,
        };
    if let Err(e) = require_row(conn, req, "class_groups", &class_group_id) {
        return e;
    }

    if let Err(e) = conn.execute(
        "INSERT INTO class_teachers(class_group_id, teacher_id) VALUES(?, ?)
         ON CONFLICT(class_group_id) DO UPDATE SET teacher_id = excluded.teacher_id",
        (&class_group_id, &teacher_id),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classGroups.create" => Some(handle_class_groups_create(state, req)),
        "classGroups.list" => Some(handle_class_groups_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.place" => Some(handle_students_place(state, req)),
        "enrollments.set" => Some(handle_enrollments_set(state, req)),
        "staff.assignSubject" => Some(handle_staff_assign_subject(state, req)),
        "staff.setClassTeacher" => Some(handle_staff_set_class_teacher(state, req)),
        _ => None,
    }
}
