use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::calc::Letter;
use crate::model::{ClassGroup, Report, SubjectReport};

const REPORT_SELECT: &str = "SELECT r.id, r.student_id, s.last_name, s.first_name,
        c.id, c.name, c.form, c.section,
        r.term, r.academic_year, r.overall_comment, r.overall_comment_by,
        r.finalized, r.finalized_at, r.finalized_by, r.version
     FROM reports r
     JOIN students s ON s.id = r.student_id
     JOIN class_groups c ON c.id = r.class_group_id";

fn report_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Report> {
    let last: String = row.get(2)?;
    let first: String = row.get(3)?;
    let finalized: i64 = row.get(12)?;
    Ok(Report {
        id: row.get(0)?,
        student_id: row.get(1)?,
        student_name: format!("{}, {}", last, first),
        class_group: ClassGroup {
            id: row.get(4)?,
            name: row.get(5)?,
            form: row.get(6)?,
            section: row.get(7)?,
        },
        term: row.get(8)?,
        academic_year: row.get(9)?,
        subject_reports: Vec::new(),
        overall_comment: row.get(10)?,
        overall_comment_by: row.get(11)?,
        finalized: finalized != 0,
        finalized_at: row.get(13)?,
        finalized_by: row.get(14)?,
        version: row.get(15)?,
    })
}

fn load_subject_reports(conn: &Connection, report_id: &str) -> anyhow::Result<Vec<SubjectReport>> {
    let mut stmt = conn.prepare(
        "SELECT sr.subject_id, sub.name, sr.coursework_mark, sr.exam_mark, sr.final_mark,
                sr.final_grade, sr.comment, sr.comment_by, sr.enrolled
         FROM subject_reports sr
         JOIN subjects sub ON sub.id = sr.subject_id
         WHERE sr.report_id = ?
         ORDER BY sr.sort_order",
    )?;
    let rows = stmt
        .query_map([report_id], |r| {
            let grade_raw: String = r.get(5)?;
            let enrolled: i64 = r.get(8)?;
            Ok((
                SubjectReport {
                    subject_id: r.get(0)?,
                    subject_name: r.get(1)?,
                    coursework_mark: r.get(2)?,
                    exam_mark: r.get(3)?,
                    final_mark: r.get(4)?,
                    final_grade: Letter::U,
                    comment: r.get(6)?,
                    comment_by: r.get(7)?,
                    enrolled: enrolled != 0,
                },
                grade_raw,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(mut sr, grade_raw)| {
            sr.final_grade = Letter::parse(&grade_raw).ok_or_else(|| {
                anyhow::anyhow!("subject report {} has bad grade {}", sr.subject_id, grade_raw)
            })?;
            Ok(sr)
        })
        .collect()
}

fn with_subjects(conn: &Connection, mut reports: Vec<Report>) -> anyhow::Result<Vec<Report>> {
    for r in reports.iter_mut() {
        r.subject_reports = load_subject_reports(conn, &r.id)?;
    }
    Ok(reports)
}

fn query_reports<P: rusqlite::Params>(
    conn: &Connection,
    tail: &str,
    params: P,
) -> anyhow::Result<Vec<Report>> {
    let sql = format!("{} {}", REPORT_SELECT, tail);
    let mut stmt = conn.prepare(&sql)?;
    let reports = stmt
        .query_map(params, report_row)?
        .collect::<Result<Vec<_>, _>>()?;
    with_subjects(conn, reports)
}

pub fn load(conn: &Connection, report_id: &str) -> anyhow::Result<Option<Report>> {
    Ok(query_reports(conn, "WHERE r.id = ?", [report_id])?
        .into_iter()
        .next())
}

pub fn find_for_student(
    conn: &Connection,
    student_id: &str,
    term: &str,
    year: &str,
) -> anyhow::Result<Option<Report>> {
    let id: Option<String> = conn
        .query_row(
            "SELECT id FROM reports WHERE student_id = ? AND term = ? AND academic_year = ?",
            (student_id, term, year),
            |r| r.get(0),
        )
        .optional()?;
    match id {
        Some(id) => load(conn, &id),
        None => Ok(None),
    }
}

pub fn list_for_class(
    conn: &Connection,
    class_group_id: &str,
    term: &str,
    year: &str,
) -> anyhow::Result<Vec<Report>> {
    query_reports(
        conn,
        "WHERE r.class_group_id = ? AND r.term = ? AND r.academic_year = ?
         ORDER BY s.last_name, s.first_name, s.id",
        (class_group_id, term, year),
    )
}

pub fn list_for_form_section(
    conn: &Connection,
    form: &str,
    section: &str,
    term: &str,
    year: &str,
) -> anyhow::Result<Vec<Report>> {
    query_reports(
        conn,
        "WHERE c.form = ? AND c.section = ? AND r.term = ? AND r.academic_year = ?
         ORDER BY s.last_name, s.first_name, s.id",
        (form, section, term, year),
    )
}

pub fn list_for_student(conn: &Connection, student_id: &str) -> anyhow::Result<Vec<Report>> {
    query_reports(
        conn,
        "WHERE r.student_id = ? ORDER BY r.academic_year, r.term",
        [student_id],
    )
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn bump_version(conn: &Connection, report_id: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE reports SET version = version + 1, updated_at = ? WHERE id = ?",
        (now(), report_id),
    )?;
    Ok(())
}

fn insert_subject(
    conn: &Connection,
    report_id: &str,
    sort_order: usize,
    sr: &SubjectReport,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO subject_reports(
            report_id, subject_id, sort_order, coursework_mark, exam_mark,
            final_mark, final_grade, comment, comment_by, enrolled)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            report_id,
            sr.subject_id,
            sort_order as i64,
            sr.coursework_mark,
            sr.exam_mark,
            sr.final_mark,
            sr.final_grade.as_str(),
            sr.comment,
            sr.comment_by,
            sr.enrolled as i64,
        ],
    )?;
    Ok(())
}

/// Write an assembled report, touching only what changed relative to
/// `previous`. Comment columns of existing rows are never written here.
/// Returns whether anything was written.
pub fn save_assembled(
    conn: &Connection,
    report: &Report,
    previous: Option<&Report>,
) -> anyhow::Result<bool> {
    let Some(prev) = previous else {
        let ts = now();
        conn.execute(
            "INSERT INTO reports(
                id, student_id, class_group_id, term, academic_year,
                finalized, version, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, 0, 1, ?, ?)",
            (
                &report.id,
                &report.student_id,
                &report.class_group.id,
                &report.term,
                &report.academic_year,
                &ts,
                &ts,
            ),
        )?;
        for (i, sr) in report.subject_reports.iter().enumerate() {
            insert_subject(conn, &report.id, i, sr)?;
        }
        return Ok(true);
    };

    let mut changed = false;
    if prev.class_group.id != report.class_group.id {
        conn.execute(
            "UPDATE reports SET class_group_id = ? WHERE id = ?",
            (&report.class_group.id, &report.id),
        )?;
        changed = true;
    }

    let old: HashMap<&str, (usize, &SubjectReport)> = prev
        .subject_reports
        .iter()
        .enumerate()
        .map(|(i, sr)| (sr.subject_id.as_str(), (i, sr)))
        .collect();

    for (i, sr) in report.subject_reports.iter().enumerate() {
        match old.get(sr.subject_id.as_str()) {
            Some((old_pos, old_sr)) if *old_pos == i && old_sr.same_marks(sr) => {}
            Some(_) => {
                conn.execute(
                    "UPDATE subject_reports
                     SET sort_order = ?, coursework_mark = ?, exam_mark = ?, final_mark = ?,
                         final_grade = ?, enrolled = ?
                     WHERE report_id = ? AND subject_id = ?",
                    rusqlite::params![
                        i as i64,
                        sr.coursework_mark,
                        sr.exam_mark,
                        sr.final_mark,
                        sr.final_grade.as_str(),
                        sr.enrolled as i64,
                        report.id,
                        sr.subject_id,
                    ],
                )?;
                changed = true;
            }
            None => {
                insert_subject(conn, &report.id, i, sr)?;
                changed = true;
            }
        }
    }

    for old_sr in &prev.subject_reports {
        if report.subject(&old_sr.subject_id).is_none() {
            // The comment guard in SQL keeps a concurrently written comment alive.
            conn.execute(
                "DELETE FROM subject_reports
                 WHERE report_id = ? AND subject_id = ?
                   AND (comment IS NULL OR trim(comment) = '')",
                (&report.id, &old_sr.subject_id),
            )?;
            changed = true;
        }
    }

    if changed {
        bump_version(conn, &report.id)?;
    }
    Ok(changed)
}

pub fn set_subject_comment(
    conn: &Connection,
    report_id: &str,
    subject_id: &str,
    comment: Option<&str>,
    author: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE subject_reports SET comment = ?, comment_by = ?
         WHERE report_id = ? AND subject_id = ?",
        (comment, author, report_id, subject_id),
    )?;
    bump_version(conn, report_id)
}

pub fn set_overall_comment(
    conn: &Connection,
    report_id: &str,
    comment: Option<&str>,
    author: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE reports SET overall_comment = ?, overall_comment_by = ? WHERE id = ?",
        (comment, author, report_id),
    )?;
    bump_version(conn, report_id)
}

/// Flip the finalized flag. Returns false if the row was already finalized.
pub fn mark_finalized(conn: &Connection, report_id: &str, actor_id: &str) -> anyhow::Result<bool> {
    let ts = now();
    let n = conn.execute(
        "UPDATE reports
         SET finalized = 1, finalized_at = ?, finalized_by = ?, version = version + 1, updated_at = ?
         WHERE id = ? AND finalized = 0",
        (&ts, actor_id, &ts, report_id),
    )?;
    Ok(n == 1)
}
