use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::profile::{self, ProfileFormat};
use crate::students;
use chrono::{SecondsFormat, Utc};
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

fn fetch_student(
    conn: &Connection,
    req: &Request,
    student_id: &str,
) -> Result<students::Student, serde_json::Value> {
    match students::find_by_id(conn, student_id.trim()) {
        Ok(Some(s)) => Ok(s),
        Ok(None) => Err(err(&req.id, "not_found", "student not found", None)),
        Err(e) => {
            log::error!("db_query_failed: {}", e);
            Err(err(&req.id, "db_query_failed", "internal storage error", None))
        }
    }
}

fn handle_profile_render(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let requested = match req.params.get("format").and_then(|v| v.as_str()) {
        None => ProfileFormat::default(),
        Some(s) => match ProfileFormat::parse(s) {
            Some(f) => f,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "format must be one of: html, pdf",
                    Some(json!({ "format": s })),
                )
            }
        },
    };

    let student = match fetch_student(conn, req, &student_id) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    // A pdf request degrades to the html card; the caller sees both the
    // requested and the effective format.
    let effective = profile::effective_format(requested);
    ok(
        &req.id,
        json!({
            "requestedFormat": requested.as_str(),
            "format": effective.as_str(),
            "html": profile::profile_card_html(&student),
        }),
    )
}

fn handle_profile_slip(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student = match fetch_student(conn, req, &student_id) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    ok(
        &req.id,
        json!({ "html": profile::registration_slip_html(&student, &generated_at) }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "profile.render" => Some(handle_profile_render(state, req)),
        "profile.slip" => Some(handle_profile_slip(state, req)),
        _ => None,
    }
}
