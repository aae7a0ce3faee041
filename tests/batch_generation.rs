mod common;

use common::*;
use serde_json::json;

#[test]
fn one_bad_student_does_not_block_the_class() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut s = Sidecar::open(workspace.path());
    let f = Fixture::create(&mut s);
    let good = f.add_student(&mut s, "Anesu", "Mhlanga", &[&f.math_id]);
    let empty = f.add_student(&mut s, "Blessing", "Nyoni", &[]);
    let other = f.add_student(&mut s, "Chido", "Ruzvidzo", &[&f.english_id]);
    f.record(&mut s, &good, &f.math_id, "COURSEWORK", 45.0, 50.0, "2026-02-01");
    f.record(&mut s, &other, &f.english_id, "FINAL_EXAM", 33.0, 50.0, "2026-04-01");

    let generated = f.generate(&mut s);
    let reports = generated["reports"].as_array().cloned().unwrap_or_default();
    assert_eq!(reports.len(), 2);
    report_for(&generated, &good);
    report_for(&generated, &other);

    let failures = generated["failures"].as_array().cloned().unwrap_or_default();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["studentId"], empty.as_str());
    assert_eq!(failures[0]["code"], "bad_params");

    let listed = s.ok(
        "reports.classList",
        json!({ "classGroupId": f.class_group_id, "term": TERM, "year": YEAR }),
        Some(english_teacher()),
    );
    assert_eq!(listed["reports"].as_array().map(|a| a.len()), Some(2));
}

#[test]
fn generation_requires_office_or_class_teacher() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut s = Sidecar::open(workspace.path());
    let f = Fixture::create(&mut s);
    let stu = f.add_student(&mut s, "Dudzai", "Sithole", &[&f.math_id]);

    let params = json!({ "classGroupId": f.class_group_id, "term": TERM, "year": YEAR });
    let e = s.fail("reports.generate", params.clone(), Some(math_teacher()));
    assert_eq!(code(&e), "forbidden");

    let by_ct = s.ok("reports.generate", params.clone(), Some(class_teacher()));
    report_for(&by_ct, &stu);

    let e = s.fail(
        "reports.generate",
        json!({ "classGroupId": "missing", "term": TERM, "year": YEAR }),
        Some(clerk()),
    );
    assert_eq!(code(&e), "not_found");
}

#[test]
fn every_report_matches_its_recomputed_marks() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut s = Sidecar::open(workspace.path());
    let f = Fixture::create(&mut s);
    let mut students = Vec::new();
    for i in 0..12 {
        let stu = f.add_student(
            &mut s,
            &format!("Student{}", i),
            "Batch",
            &[&f.math_id, &f.english_id],
        );
        f.record(&mut s, &stu, &f.math_id, "COURSEWORK", i as f64 * 8.0, 100.0, "2026-02-01");
        f.record(&mut s, &stu, &f.english_id, "FINAL_EXAM", 100.0 - i as f64 * 5.0, 100.0, "2026-04-01");
        students.push((stu, i as f64));
    }

    let generated = f.generate(&mut s);
    for (stu, i) in &students {
        let r = report_for(&generated, stu);
        let math = subject_row(r, &f.math_id);
        assert_eq!(math["finalMark"].as_f64(), Some(i * 8.0));
        let english = subject_row(r, &f.english_id);
        assert_eq!(english["finalMark"].as_f64(), Some(100.0 - i * 5.0));
    }
}
