use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("registrar.sqlite3");
    let conn = Connection::open(db_path)?;
    // Writers from other admin tools may hold the db briefly; wait rather than fail.
    conn.busy_timeout(Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            student_id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            dob TEXT,
            course TEXT,
            enrollment_date TEXT,
            status TEXT NOT NULL DEFAULT 'Pending',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // Existing workspaces may have a students table without created_at. Add and backfill if needed.
    ensure_students_created_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_created ON students(created_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_status ON students(status)",
        [],
    )?;

    Ok(conn)
}

fn ensure_students_created_at(conn: &Connection) -> anyhow::Result<()> {
    // If the column already exists, we're done.
    if table_has_column(conn, "students", "created_at")? {
        return Ok(());
    }

    conn.execute("ALTER TABLE students ADD COLUMN created_at TEXT", [])?;
    // Backfill so the default dashboard ordering has a non-null key for every row.
    conn.execute(
        "UPDATE students SET created_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') WHERE created_at IS NULL",
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
