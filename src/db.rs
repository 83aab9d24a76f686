use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("jikanwari.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            grade TEXT NOT NULL DEFAULT '',
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // Date-specific schedule documents, one whole document per
    // (classroom, date). The body is the flattened wire form; saves replace
    // the full document.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_docs(
            doc_key TEXT PRIMARY KEY,
            classroom_code TEXT NOT NULL,
            date TEXT NOT NULL,
            body TEXT NOT NULL,
            is_confirmed INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            UNIQUE(classroom_code, date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_docs_classroom_date
         ON schedule_docs(classroom_code, date)",
        [],
    )?;

    // Recurring weekday templates, keyed (classroom, year-month, weekday).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS template_docs(
            doc_key TEXT PRIMARY KEY,
            classroom_code TEXT NOT NULL,
            month TEXT NOT NULL,
            weekday INTEGER NOT NULL,
            body TEXT NOT NULL,
            updated_at TEXT,
            UNIQUE(classroom_code, month, weekday)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_template_docs_classroom_month
         ON template_docs(classroom_code, month)",
        [],
    )?;

    Ok(conn)
}
