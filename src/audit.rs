use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};

use crate::students::Student;

/// Append-only deletion log under `<workspace>/logs/deletions.log`.
/// One line per deleted record; a side-channel for manual recovery and
/// forensics, never authoritative state.
pub struct DeletionLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DeletionLog {
    pub fn new(workspace: &Path) -> DeletionLog {
        DeletionLog {
            path: workspace.join("logs").join("deletions.log"),
            lock: Mutex::new(()),
        }
    }

    /// Appends one line for the deleted record. Best-effort: an unwritable
    /// log directory is reported on stderr and swallowed, never surfaced to
    /// the delete operation.
    pub fn record(&self, student: &Student) {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let line = deletion_line(&now, student);
        if let Err(e) = self.append(&line) {
            log::warn!(
                "deletion audit append failed for {}: {}",
                student.student_id,
                e
            );
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        // Hold the lock across dir creation and append so concurrent deletes
        // cannot interleave partial lines.
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{}", line)
    }
}

fn deletion_line(timestamp: &str, s: &Student) -> String {
    // student_id is charset-restricted at insert time and needs no escaping.
    format!(
        "{} | DELETED student_id={} | name={} | email={} | course={} | enrollment_date={}",
        timestamp,
        s.student_id,
        escape_field(&s.full_name),
        escape_field(&s.email),
        escape_field(s.course.as_deref().unwrap_or("")),
        escape_field(s.enrollment_date.as_deref().unwrap_or("")),
    )
}

/// Backslash-escapes the field delimiter and line breaks so one deletion is
/// always exactly one well-formed line.
fn escape_field(v: &str) -> String {
    let mut out = String::with_capacity(v.len());
    for c in v.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\|"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}
