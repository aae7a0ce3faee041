use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("reportd.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // Several sidecars may share one workspace; writers queue instead of failing.
    conn.busy_timeout(Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_groups(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            form TEXT NOT NULL,
            section TEXT NOT NULL,
            UNIQUE(form, section)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            student_no TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS placements(
            student_id TEXT NOT NULL,
            term TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            class_group_id TEXT NOT NULL,
            PRIMARY KEY(student_id, term, academic_year),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_group_id) REFERENCES class_groups(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_placements_class ON placements(class_group_id, term, academic_year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_enrollments(
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            term TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(student_id, subject_id, term, academic_year),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_assignments(
            teacher_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            form TEXT NOT NULL,
            section TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY(teacher_id, subject_id, form, section),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_teachers(
            class_group_id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            FOREIGN KEY(class_group_id) REFERENCES class_groups(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            seq INTEGER NOT NULL UNIQUE,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            score REAL NOT NULL,
            max_score REAL NOT NULL,
            term TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            date TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_lookup
         ON assessments(student_id, subject_id, term, academic_year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reports(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_group_id TEXT NOT NULL,
            term TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            overall_comment TEXT,
            overall_comment_by TEXT,
            finalized INTEGER NOT NULL DEFAULT 0,
            finalized_at TEXT,
            finalized_by TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_group_id) REFERENCES class_groups(id),
            UNIQUE(student_id, term, academic_year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reports_class ON reports(class_group_id, term, academic_year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_reports(
            report_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            coursework_mark REAL,
            exam_mark REAL,
            final_mark REAL,
            final_grade TEXT NOT NULL,
            comment TEXT,
            comment_by TEXT,
            enrolled INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY(report_id, subject_id),
            FOREIGN KEY(report_id) REFERENCES reports(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;

    // Early workspaces predate comment retention for dropped subjects.
    ensure_subject_reports_enrolled(&conn)?;

    Ok(conn)
}

fn ensure_subject_reports_enrolled(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "subject_reports", "enrolled")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE subject_reports ADD COLUMN enrolled INTEGER NOT NULL DEFAULT 1",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
