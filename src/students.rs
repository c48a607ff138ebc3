use rusqlite::{Connection, OptionalExtension, Row};

use crate::audit::DeletionLog;

/// Academic status of a registration record. Stored as its canonical
/// string form; anything arriving over the wire goes through `parse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Active,
    Pending,
    Inactive,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Active => "Active",
            Status::Pending => "Pending",
            Status::Inactive => "Inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Status::Active),
            "pending" => Some(Status::Pending),
            "inactive" => Some(Status::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub student_id: String,
    pub full_name: String,
    pub email: String,
    pub dob: Option<String>,
    pub course: Option<String>,
    pub enrollment_date: Option<String>,
    pub status: Status,
    pub created_at: String,
}

/// Input for `insert`. Optional fields are stored as NULL when absent;
/// `status` defaults to Pending when not supplied.
#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub student_id: String,
    pub full_name: String,
    pub email: String,
    pub dob: Option<String>,
    pub course: Option<String>,
    pub enrollment_date: Option<String>,
    pub status: Option<Status>,
}

/// Partial update. Outer `None` means "leave unchanged"; for the
/// nullable columns, `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default)]
pub struct StudentPatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub dob: Option<Option<String>>,
    pub course: Option<Option<String>>,
    pub enrollment_date: Option<Option<String>>,
    pub status: Option<Status>,
}

impl StudentPatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.email.is_none()
            && self.dob.is_none()
            && self.course.is_none()
            && self.enrollment_date.is_none()
            && self.status.is_none()
    }
}

/// Sort column allow-list. Anything outside it falls back to
/// `created_at` so callers can never inject query shape through ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderColumn {
    #[default]
    CreatedAt,
    FullName,
    EnrollmentDate,
    StudentId,
}

impl OrderColumn {
    pub fn as_sql(self) -> &'static str {
        match self {
            OrderColumn::CreatedAt => "created_at",
            OrderColumn::FullName => "full_name",
            OrderColumn::EnrollmentDate => "enrollment_date",
            OrderColumn::StudentId => "student_id",
        }
    }

    pub fn parse(s: &str) -> OrderColumn {
        match s {
            "full_name" => OrderColumn::FullName,
            "enrollment_date" => OrderColumn::EnrollmentDate,
            "student_id" => OrderColumn::StudentId,
            _ => OrderColumn::CreatedAt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    pub fn parse(s: &str) -> Direction {
        if s.eq_ignore_ascii_case("asc") {
            Direction::Asc
        } else {
            Direction::Desc
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub search: Option<String>,
    pub order: OrderColumn,
    pub dir: Direction,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum StudentError {
    #[error("invalid or missing field(s): {fields:?}")]
    Validation { fields: Vec<String> },
    #[error("student not found")]
    NotFound,
    #[error("a student with the given student id or email already exists")]
    AlreadyExists,
    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

/// Student id format: 1..=50 chars, alphanumeric plus dash/underscore.
pub fn validate_student_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 50
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Structural email check: one local part, one dotted domain.
pub fn validate_email(email: &str) -> bool {
    let mut parts = email.rsplitn(2, '@');
    let domain = parts.next().unwrap_or("");
    let Some(local) = parts.next() else {
        return false;
    };

    if local.is_empty() || local.len() > 64 {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    if !local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~.".contains(c))
    {
        return false;
    }

    if domain.is_empty() || domain.len() > 255 || !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Names of the fields that are missing or blank in `data`.
/// An empty result means all required fields are present.
pub fn validate_required(fields: &[&str], data: &serde_json::Map<String, serde_json::Value>) -> Vec<String> {
    fields
        .iter()
        .filter(|f| {
            data.get(**f)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .is_none()
        })
        .map(|f| f.to_string())
        .collect()
}

const STUDENT_COLUMNS: &str =
    "student_id, full_name, email, dob, course, enrollment_date, status, created_at";

fn student_from_row(row: &Row) -> rusqlite::Result<Student> {
    let status: String = row.get(6)?;
    Ok(Student {
        student_id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        dob: non_blank(row.get(3)?),
        course: non_blank(row.get(4)?),
        enrollment_date: non_blank(row.get(5)?),
        // Hand-edited rows may carry an unknown status; read those as Pending
        // rather than failing the whole row.
        status: Status::parse(&status).unwrap_or(Status::Pending),
        created_at: row.get(7)?,
    })
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn find_by_id(conn: &Connection, student_id: &str) -> Result<Option<Student>, StudentError> {
    let sql = format!(
        "SELECT {} FROM students WHERE student_id = ? LIMIT 1",
        STUDENT_COLUMNS
    );
    conn.query_row(&sql, [student_id], student_from_row)
        .optional()
        .map_err(StudentError::Storage)
}

pub fn list(conn: &Connection, query: &ListQuery) -> Result<Vec<Student>, StudentError> {
    let mut sql = format!("SELECT {} FROM students", STUDENT_COLUMNS);

    let pattern = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s));
    if pattern.is_some() {
        sql.push_str(
            " WHERE full_name LIKE ?1 OR student_id LIKE ?1 OR email LIKE ?1 OR course LIKE ?1",
        );
    }

    // Order column and direction come from closed enums; the student_id
    // tiebreak keeps equal keys in a consistent relative order.
    sql.push_str(&format!(
        " ORDER BY {} {}, student_id ASC",
        query.order.as_sql(),
        query.dir.as_sql()
    ));

    match (query.limit, query.offset) {
        (Some(limit), Some(offset)) if limit >= 0 && offset >= 0 => {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        }
        (Some(limit), None) if limit >= 0 => {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        _ => {}
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = match &pattern {
        Some(p) => stmt.query_map([p], student_from_row),
        None => stmt.query_map([], student_from_row),
    };
    rows.and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(StudentError::Storage)
}

pub fn insert(conn: &Connection, student: &NewStudent) -> Result<(), StudentError> {
    let mut bad: Vec<String> = Vec::new();
    if student.full_name.trim().is_empty() || student.full_name.len() > 200 {
        bad.push("full_name".into());
    }
    if !validate_student_id(&student.student_id) {
        bad.push("student_id".into());
    }
    if !validate_email(&student.email) {
        bad.push("email".into());
    }
    if student.course.as_deref().map(|c| c.len() > 150).unwrap_or(false) {
        bad.push("course".into());
    }
    if !bad.is_empty() {
        return Err(StudentError::Validation { fields: bad });
    }

    let status = student.status.unwrap_or(Status::Pending);
    conn.execute(
        "INSERT INTO students(
           student_id,
           full_name,
           email,
           dob,
           course,
           enrollment_date,
           status,
           created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &student.student_id,
            student.full_name.trim(),
            student.email.trim(),
            student.dob.as_deref(),
            student.course.as_deref(),
            student.enrollment_date.as_deref(),
            status.as_str(),
        ),
    )
    .map_err(map_unique_violation)?;
    Ok(())
}

pub fn update(
    conn: &Connection,
    student_id: &str,
    patch: &StudentPatch,
) -> Result<(), StudentError> {
    // Nothing to update; mirror the permissive contract callers rely on.
    if patch.is_empty() {
        return Ok(());
    }

    let mut bad: Vec<String> = Vec::new();
    if let Some(name) = &patch.full_name {
        if name.trim().is_empty() || name.len() > 200 {
            bad.push("full_name".into());
        }
    }
    if let Some(email) = &patch.email {
        if !validate_email(email) {
            bad.push("email".into());
        }
    }
    if let Some(Some(course)) = &patch.course {
        if course.len() > 150 {
            bad.push("course".into());
        }
    }
    if !bad.is_empty() {
        return Err(StudentError::Validation { fields: bad });
    }

    let mut set_parts: Vec<&str> = Vec::new();
    let mut binds: Vec<rusqlite::types::Value> = Vec::new();

    if let Some(name) = &patch.full_name {
        set_parts.push("full_name = ?");
        binds.push(rusqlite::types::Value::Text(name.trim().to_string()));
    }
    if let Some(email) = &patch.email {
        set_parts.push("email = ?");
        binds.push(rusqlite::types::Value::Text(email.trim().to_string()));
    }
    if let Some(dob) = &patch.dob {
        set_parts.push("dob = ?");
        binds.push(text_or_null(dob.as_deref()));
    }
    if let Some(course) = &patch.course {
        set_parts.push("course = ?");
        binds.push(text_or_null(course.as_deref()));
    }
    if let Some(enrollment_date) = &patch.enrollment_date {
        set_parts.push("enrollment_date = ?");
        binds.push(text_or_null(enrollment_date.as_deref()));
    }
    if let Some(status) = patch.status {
        set_parts.push("status = ?");
        binds.push(rusqlite::types::Value::Text(status.as_str().to_string()));
    }

    binds.push(rusqlite::types::Value::Text(student_id.to_string()));
    let sql = format!(
        "UPDATE students SET {} WHERE student_id = ?",
        set_parts.join(", ")
    );
    let changed = conn
        .execute(&sql, rusqlite::params_from_iter(binds))
        .map_err(map_unique_violation)?;
    if changed == 0 {
        return Err(StudentError::NotFound);
    }
    Ok(())
}

/// Deletes a student. The record is read first so the audit entry always
/// reflects pre-delete state; the audit append itself is best-effort and
/// never fails the delete.
pub fn delete(
    conn: &Connection,
    audit: &DeletionLog,
    student_id: &str,
) -> Result<Student, StudentError> {
    let Some(student) = find_by_id(conn, student_id)? else {
        return Err(StudentError::NotFound);
    };

    conn.execute("DELETE FROM students WHERE student_id = ?", [student_id])?;
    audit.record(&student);
    Ok(student)
}

fn text_or_null(v: Option<&str>) -> rusqlite::types::Value {
    match v.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => rusqlite::types::Value::Text(s.to_string()),
        None => rusqlite::types::Value::Null,
    }
}

fn map_unique_violation(e: rusqlite::Error) -> StudentError {
    if let rusqlite::Error::SqliteFailure(ref f, _) = e {
        if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        {
            return StudentError::AlreadyExists;
        }
    }
    StudentError::Storage(e)
}
