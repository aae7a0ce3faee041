//! Collaborator lookups the report engine consumes but never writes.
//!
//! The engine depends on the traits only; `SqliteStore` serves them from the
//! workspace tables that the roster handlers maintain.

use crate::model::{Assessment, AssessmentKind, ClassGroup, Subject};
use rusqlite::{Connection, OptionalExtension};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRef {
    pub id: String,
    pub display_name: String,
}

pub trait AssessmentStore {
    fn list_assessments(
        &self,
        student_id: &str,
        subject_id: &str,
        term: &str,
        year: &str,
    ) -> anyhow::Result<Vec<Assessment>>;
}

pub trait EnrollmentStore {
    fn enrolled_subjects(&self, student_id: &str, term: &str, year: &str)
        -> anyhow::Result<Vec<Subject>>;
    fn class_group_of(
        &self,
        student_id: &str,
        term: &str,
        year: &str,
    ) -> anyhow::Result<Option<ClassGroup>>;
    fn students_in_class_group(
        &self,
        class_group_id: &str,
        term: &str,
        year: &str,
    ) -> anyhow::Result<Vec<StudentRef>>;
    fn class_group(&self, class_group_id: &str) -> anyhow::Result<Option<ClassGroup>>;
    fn student(&self, student_id: &str) -> anyhow::Result<Option<StudentRef>>;
}

pub trait StaffDirectory {
    fn is_assigned_teacher(
        &self,
        actor_id: &str,
        subject_id: &str,
        form: &str,
        section: &str,
    ) -> anyhow::Result<bool>;
    fn is_class_teacher_of(&self, actor_id: &str, class_group_id: &str) -> anyhow::Result<bool>;
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn class_group_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClassGroup> {
    Ok(ClassGroup {
        id: row.get(0)?,
        name: row.get(1)?,
        form: row.get(2)?,
        section: row.get(3)?,
    })
}

fn student_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRef> {
    let id: String = row.get(0)?;
    let last: String = row.get(1)?;
    let first: String = row.get(2)?;
    Ok(StudentRef {
        id,
        display_name: format!("{}, {}", last, first),
    })
}

impl AssessmentStore for SqliteStore<'_> {
    fn list_assessments(
        &self,
        student_id: &str,
        subject_id: &str,
        term: &str,
        year: &str,
    ) -> anyhow::Result<Vec<Assessment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, student_id, subject_id, kind, score, max_score, term, academic_year, date, seq
             FROM assessments
             WHERE student_id = ? AND subject_id = ? AND term = ? AND academic_year = ?
             ORDER BY seq",
        )?;
        let rows = stmt
            .query_map((student_id, subject_id, term, year), |r| {
                let kind_raw: String = r.get(3)?;
                Ok((
                    Assessment {
                        id: r.get(0)?,
                        student_id: r.get(1)?,
                        subject_id: r.get(2)?,
                        kind: AssessmentKind::Coursework,
                        score: r.get(4)?,
                        max_score: r.get(5)?,
                        term: r.get(6)?,
                        academic_year: r.get(7)?,
                        date: r.get(8)?,
                        seq: r.get(9)?,
                    },
                    kind_raw,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (mut a, kind_raw) in rows {
            a.kind = AssessmentKind::parse(&kind_raw).ok_or_else(|| {
                anyhow::anyhow!("assessment {} has unknown type {}", a.id, kind_raw)
            })?;
            out.push(a);
        }
        Ok(out)
    }
}

impl EnrollmentStore for SqliteStore<'_> {
    fn enrolled_subjects(
        &self,
        student_id: &str,
        term: &str,
        year: &str,
    ) -> anyhow::Result<Vec<Subject>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.code, s.name
             FROM subject_enrollments e
             JOIN subjects s ON s.id = e.subject_id
             WHERE e.student_id = ? AND e.term = ? AND e.academic_year = ?
             ORDER BY e.sort_order, s.code",
        )?;
        let subjects = stmt
            .query_map((student_id, term, year), |r| {
                Ok(Subject {
                    id: r.get(0)?,
                    code: r.get(1)?,
                    name: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(subjects)
    }

    fn class_group_of(
        &self,
        student_id: &str,
        term: &str,
        year: &str,
    ) -> anyhow::Result<Option<ClassGroup>> {
        let cg = self
            .conn
            .query_row(
                "SELECT c.id, c.name, c.form, c.section
                 FROM placements p
                 JOIN class_groups c ON c.id = p.class_group_id
                 WHERE p.student_id = ? AND p.term = ? AND p.academic_year = ?",
                (student_id, term, year),
                class_group_row,
            )
            .optional()?;
        Ok(cg)
    }

    fn students_in_class_group(
        &self,
        class_group_id: &str,
        term: &str,
        year: &str,
    ) -> anyhow::Result<Vec<StudentRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.last_name, s.first_name
             FROM placements p
             JOIN students s ON s.id = p.student_id
             WHERE p.class_group_id = ? AND p.term = ? AND p.academic_year = ?
             ORDER BY s.last_name, s.first_name, s.id",
        )?;
        let students = stmt
            .query_map((class_group_id, term, year), student_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(students)
    }

    fn class_group(&self, class_group_id: &str) -> anyhow::Result<Option<ClassGroup>> {
        let cg = self
            .conn
            .query_row(
                "SELECT id, name, form, section FROM class_groups WHERE id = ?",
                [class_group_id],
                class_group_row,
            )
            .optional()?;
        Ok(cg)
    }

    fn student(&self, student_id: &str) -> anyhow::Result<Option<StudentRef>> {
        let s = self
            .conn
            .query_row(
                "SELECT id, last_name, first_name FROM students WHERE id = ?",
                [student_id],
                student_row,
            )
            .optional()?;
        Ok(s)
    }
}

impl StaffDirectory for SqliteStore<'_> {
    fn is_assigned_teacher(
        &self,
        actor_id: &str,
        subject_id: &str,
        form: &str,
        section: &str,
    ) -> anyhow::Result<bool> {
        let hit: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM subject_assignments
                 WHERE teacher_id = ? AND subject_id = ? AND form = ? AND section = ? AND active = 1",
                (actor_id, subject_id, form, section),
                |r| r.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    fn is_class_teacher_of(&self, actor_id: &str, class_group_id: &str) -> anyhow::Result<bool> {
        let hit: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM class_teachers WHERE class_group_id = ? AND teacher_id = ?",
                (class_group_id, actor_id),
                |r| r.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }
}
