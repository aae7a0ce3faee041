#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub const TERM: &str = "Term 1";
pub const YEAR: &str = "2026";

pub fn admin() -> Value {
    json!({ "id": "admin-1", "roles": ["admin"] })
}

pub fn clerk() -> Value {
    json!({ "id": "clerk-1", "roles": ["clerk"] })
}

pub fn math_teacher() -> Value {
    json!({ "id": "t-math", "roles": ["teacher"] })
}

pub fn english_teacher() -> Value {
    json!({ "id": "t-eng", "roles": ["teacher"] })
}

pub fn class_teacher() -> Value {
    json!({ "id": "t-ct", "roles": ["teacher", "classTeacher"] })
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_reportd");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn reportd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    pub fn open(workspace: &Path) -> Self {
        let mut s = Self::spawn();
        s.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
            None,
        );
        s
    }

    /// Write a request without waiting for its response.
    pub fn send(&mut self, method: &str, params: Value, actor: Option<Value>) -> String {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(a) = actor {
            payload["actor"] = a;
        }
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");
        id
    }

    pub fn recv(&mut self, id: &str) -> Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for request {}", id);
        let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
        value
    }

    pub fn request(&mut self, method: &str, params: Value, actor: Option<Value>) -> Value {
        let id = self.send(method, params, actor);
        self.recv(&id)
    }

    pub fn ok(&mut self, method: &str, params: Value, actor: Option<Value>) -> Value {
        let value = self.request(method, params, actor);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Expect a failure and return the whole error object.
    pub fn fail(&mut self, method: &str, params: Value, actor: Option<Value>) -> Value {
        let value = self.request(method, params, actor);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value.get("error").cloned().expect("error object")
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn code(error: &Value) -> &str {
    error.get("code").and_then(|v| v.as_str()).unwrap_or("")
}

pub fn str_field<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
}

/// One class group (Form 2A) with maths and English, a class teacher,
/// and subject teachers assigned to 2A.
pub struct Fixture {
    pub class_group_id: String,
    pub math_id: String,
    pub english_id: String,
}

impl Fixture {
    pub fn create(s: &mut Sidecar) -> Self {
        let cg = s.ok(
            "classGroups.create",
            json!({ "form": "2", "section": "A" }),
            Some(admin()),
        );
        let class_group_id = str_field(&cg, "classGroupId").to_string();

        let math = s.ok(
            "subjects.create",
            json!({ "code": "MATH", "name": "Mathematics" }),
            Some(admin()),
        );
        let english = s.ok(
            "subjects.create",
            json!({ "code": "ENG", "name": "English" }),
            Some(admin()),
        );
        let f = Self {
            class_group_id,
            math_id: str_field(&math, "subjectId").to_string(),
            english_id: str_field(&english, "subjectId").to_string(),
        };

        s.ok(
            "staff.assignSubject",
            json!({ "teacherId": "t-math", "subjectId": f.math_id, "form": "2", "section": "A" }),
            Some(admin()),
        );
        s.ok(
            "staff.assignSubject",
            json!({ "teacherId": "t-eng", "subjectId": f.english_id, "form": "2", "section": "A" }),
            Some(admin()),
        );
        s.ok(
            "staff.setClassTeacher",
            json!({ "classGroupId": f.class_group_id, "teacherId": "t-ct" }),
            Some(admin()),
        );
        f
    }

    /// Create a student in 2A taking the given subjects.
    pub fn add_student(&self, s: &mut Sidecar, first: &str, last: &str, subjects: &[&str]) -> String {
        let created = s.ok(
            "students.create",
            json!({ "firstName": first, "lastName": last }),
            Some(admin()),
        );
        let student_id = str_field(&created, "studentId").to_string();
        s.ok(
            "students.place",
            json!({
                "studentId": student_id,
                "classGroupId": self.class_group_id,
                "term": TERM,
                "year": YEAR
            }),
            Some(admin()),
        );
        s.ok(
            "enrollments.set",
            json!({ "studentId": student_id, "term": TERM, "year": YEAR, "subjectIds": subjects }),
            Some(admin()),
        );
        student_id
    }

    pub fn record(
        &self,
        s: &mut Sidecar,
        student_id: &str,
        subject_id: &str,
        kind: &str,
        score: f64,
        max: f64,
        date: &str,
    ) {
        s.ok(
            "assessments.record",
            json!({
                "studentId": student_id,
                "subjectId": subject_id,
                "type": kind,
                "score": score,
                "maxScore": max,
                "term": TERM,
                "year": YEAR,
                "date": date
            }),
            Some(math_teacher()),
        );
    }

    pub fn generate(&self, s: &mut Sidecar) -> Value {
        s.ok(
            "reports.generate",
            json!({ "classGroupId": self.class_group_id, "term": TERM, "year": YEAR }),
            Some(admin()),
        )
    }
}

/// The generated report belonging to `student_id`.
pub fn report_for<'a>(generated: &'a Value, student_id: &str) -> &'a Value {
    generated
        .get("reports")
        .and_then(|v| v.as_array())
        .and_then(|arr| {
            arr.iter()
                .find(|r| r.get("studentId").and_then(|v| v.as_str()) == Some(student_id))
        })
        .unwrap_or_else(|| panic!("no report for {} in {}", student_id, generated))
}

pub fn subject_row<'a>(report: &'a Value, subject_id: &str) -> &'a Value {
    report
        .get("subjectReports")
        .and_then(|v| v.as_array())
        .and_then(|arr| {
            arr.iter()
                .find(|r| r.get("subjectId").and_then(|v| v.as_str()) == Some(subject_id))
        })
        .unwrap_or_else(|| panic!("no subject {} in {}", subject_id, report))
}
