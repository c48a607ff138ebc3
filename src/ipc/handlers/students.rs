use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::students::{
    self, Direction, ListQuery, NewStudent, OrderColumn, Status, Student, StudentError,
    StudentPatch,
};
use rusqlite::Connection;
use serde_json::json;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn opt_trimmed(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn student_json(s: &Student) -> serde_json::Value {
    json!({
        "studentId": s.student_id,
        "fullName": s.full_name,
        "email": s.email,
        "dob": s.dob,
        "course": s.course,
        "enrollmentDate": s.enrollment_date,
        "status": s.status.as_str(),
        "createdAt": s.created_at,
    })
}

/// Maps a repository error onto the wire. Storage failures keep their
/// detail on stderr only; the response stays opaque.
fn repo_err(req: &Request, storage_code: &str, e: StudentError) -> serde_json::Value {
    match e {
        StudentError::Validation { fields } => err(
            &req.id,
            "validation_failed",
            "invalid or missing field(s)",
            Some(json!({ "fields": fields })),
        ),
        StudentError::NotFound => err(&req.id, "not_found", "student not found", None),
        StudentError::AlreadyExists => err(
            &req.id,
            "already_exists",
            "a student with the given student id or email already exists",
            None,
        ),
        StudentError::Storage(e) => {
            log::error!("{}: {}", storage_code, e);
            err(&req.id, storage_code, "internal storage error", None)
        }
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    // Unknown order/dir values fall back rather than erroring, so a stale
    // or hostile query string can never change the query shape.
    let query = ListQuery {
        search: opt_trimmed(req, "search"),
        order: req
            .params
            .get("order")
            .and_then(|v| v.as_str())
            .map(OrderColumn::parse)
            .unwrap_or_default(),
        dir: req
            .params
            .get("dir")
            .and_then(|v| v.as_str())
            .map(Direction::parse)
            .unwrap_or_default(),
        limit: req.params.get("limit").and_then(|v| v.as_i64()),
        offset: req.params.get("offset").and_then(|v| v.as_i64()),
    };

    match students::list(conn, &query) {
        Ok(rows) => {
            let students: Vec<serde_json::Value> = rows.iter().map(student_json).collect();
            ok(&req.id, json!({ "students": students }))
        }
        Err(e) => repo_err(req, "db_query_failed", e),
    }
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match students::find_by_id(conn, student_id.trim()) {
        Ok(Some(s)) => ok(&req.id, json!({ "student": student_json(&s) })),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => repo_err(req, "db_query_failed", e),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(params) = req.params.as_object() else {
        return err(&req.id, "bad_params", "params must be an object", None);
    };

    let missing = students::validate_required(&["studentId", "fullName", "email"], params);
    if !missing.is_empty() {
        return err(
            &req.id,
            "validation_failed",
            "invalid or missing field(s)",
            Some(json!({ "fields": missing })),
        );
    }

    let student = NewStudent {
        student_id: opt_trimmed(req, "studentId").unwrap_or_default(),
        full_name: opt_trimmed(req, "fullName").unwrap_or_default(),
        email: opt_trimmed(req, "email").unwrap_or_default(),
        dob: opt_trimmed(req, "dob"),
        course: opt_trimmed(req, "course"),
        enrollment_date: opt_trimmed(req, "enrollmentDate"),
        // Admin registration always starts a record in Pending; any status
        // supplied by the caller is ignored here.
        status: None,
    };

    match students::insert(conn, &student) {
        Ok(()) => ok(
            &req.id,
            json!({
                "studentId": student.student_id,
                "status": Status::Pending.as_str()
            }),
        ),
        Err(e) => repo_err(req, "db_insert_failed", e),
    }
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing/invalid patch", None);
    };

    let mut patch = StudentPatch::default();

    if let Some(v) = patch_obj.get("fullName") {
        let Some(s) = v.as_str() else {
            return err(&req.id, "bad_params", "patch.fullName must be a string", None);
        };
        patch.full_name = Some(s.to_string());
    }
    if let Some(v) = patch_obj.get("email") {
        let Some(s) = v.as_str() else {
            return err(&req.id, "bad_params", "patch.email must be a string", None);
        };
        patch.email = Some(s.to_string());
    }
    if let Some(v) = patch_obj.get("dob") {
        patch.dob = Some(match string_or_clear(v, &req.id, "patch.dob") {
            Ok(c) => c,
            Err(resp) => return resp,
        });
    }
    if let Some(v) = patch_obj.get("course") {
        patch.course = Some(match string_or_clear(v, &req.id, "patch.course") {
            Ok(c) => c,
            Err(resp) => return resp,
        });
    }
    if let Some(v) = patch_obj.get("enrollmentDate") {
        patch.enrollment_date = Some(
            match string_or_clear(v, &req.id, "patch.enrollmentDate") {
                Ok(c) => c,
                Err(resp) => return resp,
            },
        );
    }
    if let Some(v) = patch_obj.get("status") {
        let parsed = v.as_str().and_then(Status::parse);
        let Some(status) = parsed else {
            return err(
                &req.id,
                "validation_failed",
                "status must be one of: Active, Pending, Inactive",
                Some(json!({ "fields": ["status"] })),
            );
        };
        patch.status = Some(status);
    }

    match students::update(conn, student_id.trim(), &patch) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => repo_err(req, "db_update_failed", e),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (Some(conn), Some(audit)) = (state.db.as_ref(), state.deletions.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    match students::delete(conn, audit, student_id.trim()) {
        Ok(deleted) => ok(
            &req.id,
            json!({ "ok": true, "studentId": deleted.student_id }),
        ),
        Err(e) => repo_err(req, "db_delete_failed", e),
    }
}

/// A nullable patch field: JSON null (or a blank string) clears the column.
fn string_or_clear(
    v: &serde_json::Value,
    req_id: &str,
    key: &str,
) -> Result<Option<String>, serde_json::Value> {
    if v.is_null() {
        return Ok(None);
    }
    let Some(s) = v.as_str() else {
        return Err(err(
            req_id,
            "bad_params",
            format!("{} must be a string or null", key),
            None,
        ));
    };
    let s = s.trim().to_string();
    Ok(if s.is_empty() { None } else { Some(s) })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
