mod common;

use common::*;
use serde_json::json;

#[test]
fn report_moves_from_generation_to_finalized() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut s = Sidecar::open(workspace.path());
    let f = Fixture::create(&mut s);
    let stu = f.add_student(&mut s, "Tariro", "Moyo", &[&f.math_id, &f.english_id]);

    f.record(&mut s, &stu, &f.math_id, "COURSEWORK", 18.0, 20.0, "2026-02-01");
    f.record(&mut s, &stu, &f.math_id, "COURSEWORK", 16.0, 20.0, "2026-03-01");
    f.record(&mut s, &stu, &f.math_id, "FINAL_EXAM", 56.0, 100.0, "2026-04-01");
    f.record(&mut s, &stu, &f.english_id, "COURSEWORK", 72.0, 100.0, "2026-02-10");

    let generated = f.generate(&mut s);
    assert_eq!(generated["failures"].as_array().map(|a| a.len()), Some(0));
    let report = report_for(&generated, &stu);
    let report_id = str_field(report, "id").to_string();
    assert_eq!(report["studentName"], "Moyo, Tariro");
    assert_eq!(report["status"], "inProgress");

    let math = subject_row(report, &f.math_id);
    assert_eq!(math["courseworkMark"].as_f64(), Some(85.0));
    assert_eq!(math["examMark"].as_f64(), Some(56.0));
    assert_eq!(math["finalMark"].as_f64(), Some(64.7));
    assert_eq!(math["finalGrade"], "C");

    let english = subject_row(report, &f.english_id);
    assert_eq!(english["finalMark"].as_f64(), Some(72.0));
    assert_eq!(english["finalGrade"], "B");
    assert!(english["examMark"].is_null());

    // Nothing is commented yet.
    let e = s.fail(
        "reports.finalize",
        json!({ "reportId": report_id }),
        Some(admin()),
    );
    assert_eq!(code(&e), "not_ready");
    assert_eq!(e["details"]["missingSubjects"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(e["details"]["overallCommentMissing"], true);

    let after_math = s.ok(
        "reports.subjectComment",
        json!({ "reportId": report_id, "subjectId": f.math_id, "comment": "Solid algebra." }),
        Some(math_teacher()),
    );
    assert_eq!(subject_row(&after_math, &f.math_id)["commentBy"], "t-math");
    assert_eq!(after_math["status"], "inProgress");

    let after_eng = s.ok(
        "reports.subjectComment",
        json!({ "reportId": report_id, "subjectId": f.english_id, "comment": "  Reads widely.  " }),
        Some(english_teacher()),
    );
    assert_eq!(subject_row(&after_eng, &f.english_id)["comment"], "Reads widely.");
    assert_eq!(after_eng["status"], "awaitingClassTeacher");

    let e = s.fail(
        "reports.finalize",
        json!({ "reportId": report_id }),
        Some(admin()),
    );
    assert_eq!(code(&e), "not_ready");
    assert_eq!(e["details"]["missingSubjects"].as_array().map(|a| a.len()), Some(0));
    assert_eq!(e["details"]["overallCommentMissing"], true);

    let suggestion = s.ok(
        "reports.suggestOverallComment",
        json!({ "reportId": report_id }),
        Some(class_teacher()),
    );
    assert!(suggestion["suggestion"].is_string());

    let ready = s.ok(
        "reports.overallComment",
        json!({ "reportId": report_id, "comment": "A steady term." }),
        Some(class_teacher()),
    );
    assert_eq!(ready["status"], "readyToFinalize");
    assert_eq!(ready["overallCommentBy"], "t-ct");

    let view = s.ok("reports.get", json!({ "reportId": report_id }), Some(admin()));
    assert_eq!(view["permissions"]["finalize"], true);

    let finalized = s.ok(
        "reports.finalize",
        json!({ "reportId": report_id }),
        Some(clerk()),
    );
    assert_eq!(finalized["status"], "finalized");
    assert_eq!(finalized["finalized"], true);
    assert_eq!(finalized["finalizedBy"], "clerk-1");
    assert!(finalized["finalizedAt"].is_string());

    let printable = s.ok(
        "reports.printable",
        json!({ "classGroupId": f.class_group_id, "term": TERM, "year": YEAR }),
        Some(admin()),
    );
    assert_eq!(printable["reports"].as_array().map(|a| a.len()), Some(1));
}

#[test]
fn finalized_report_rejects_every_write() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut s = Sidecar::open(workspace.path());
    let f = Fixture::create(&mut s);
    let stu = f.add_student(&mut s, "Kuda", "Banda", &[&f.math_id]);
    f.record(&mut s, &stu, &f.math_id, "COURSEWORK", 30.0, 40.0, "2026-02-01");

    let generated = f.generate(&mut s);
    let report_id = str_field(report_for(&generated, &stu), "id").to_string();
    s.ok(
        "reports.subjectComment",
        json!({ "reportId": report_id, "subjectId": f.math_id, "comment": "Good." }),
        Some(math_teacher()),
    );
    s.ok(
        "reports.overallComment",
        json!({ "reportId": report_id, "comment": "Good term." }),
        Some(class_teacher()),
    );
    let finalized = s.ok("reports.finalize", json!({ "reportId": report_id }), Some(admin()));
    let version = finalized["version"].as_i64();

    let e = s.fail(
        "reports.subjectComment",
        json!({ "reportId": report_id, "subjectId": f.math_id, "comment": "Changed." }),
        Some(math_teacher()),
    );
    assert_eq!(code(&e), "report_locked");
    assert_eq!(e["details"]["subjectId"], f.math_id.as_str());

    let e = s.fail(
        "reports.overallComment",
        json!({ "reportId": report_id, "comment": "Changed." }),
        Some(class_teacher()),
    );
    assert_eq!(code(&e), "report_locked");

    let e = s.fail("reports.regenerate", json!({ "reportId": report_id }), Some(admin()));
    assert_eq!(code(&e), "report_locked");

    let e = s.fail("reports.finalize", json!({ "reportId": report_id }), Some(admin()));
    assert_eq!(code(&e), "report_locked");

    // New marks after finalization do not reach the stored report.
    f.record(&mut s, &stu, &f.math_id, "FINAL_EXAM", 10.0, 100.0, "2026-04-01");
    let again = f.generate(&mut s);
    let failures = again["failures"].as_array().cloned().unwrap_or_default();
    assert!(failures.iter().any(|x| x["code"] == "report_locked"));
    let kept = report_for(&again, &stu);
    assert_eq!(kept["version"].as_i64(), version);
    assert_eq!(subject_row(kept, &f.math_id)["comment"], "Good.");
    assert!(subject_row(kept, &f.math_id)["examMark"].is_null());
}

#[test]
fn class_summary_counts_each_state() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut s = Sidecar::open(workspace.path());
    let f = Fixture::create(&mut s);
    let a = f.add_student(&mut s, "Ada", "Chari", &[&f.math_id]);
    let b = f.add_student(&mut s, "Ben", "Dube", &[&f.math_id]);
    f.record(&mut s, &a, &f.math_id, "COURSEWORK", 50.0, 100.0, "2026-02-01");
    f.record(&mut s, &b, &f.math_id, "COURSEWORK", 90.0, 100.0, "2026-02-01");

    let generated = f.generate(&mut s);
    let b_report = str_field(report_for(&generated, &b), "id").to_string();
    s.ok(
        "reports.subjectComment",
        json!({ "reportId": b_report, "subjectId": f.math_id, "comment": "Excellent." }),
        Some(math_teacher()),
    );

    let summary = s.ok(
        "reports.classSummary",
        json!({ "classGroupId": f.class_group_id, "term": TERM, "year": YEAR }),
        Some(class_teacher()),
    );
    assert_eq!(summary["total"], 2);
    assert_eq!(summary["inProgress"], 1);
    assert_eq!(summary["awaitingClassTeacher"], 1);
    assert_eq!(summary["readyToFinalize"], 0);
    assert_eq!(summary["finalized"], 0);

    let by_section = s.ok(
        "reports.byFormSection",
        json!({ "form": "2", "section": "A", "term": TERM, "year": YEAR }),
        Some(math_teacher()),
    );
    assert_eq!(by_section["reports"].as_array().map(|a| a.len()), Some(2));

    let history = s.ok(
        "reports.studentList",
        json!({ "studentId": a }),
        Some(math_teacher()),
    );
    assert_eq!(history["reports"].as_array().map(|a| a.len()), Some(1));
}
