use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_registrard");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn registrard");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    let rows = [
        ("S1", "Alice Johnson", "alice@example.edu", "Physics"),
        ("S2", "Bob Smith", "bob@example.edu", "History"),
        ("S3", "Carol Mensah", "carol@example.edu", "Mathematics"),
    ];
    for (i, (id, name, email, course)) in rows.iter().enumerate() {
        let _ = request_ok(
            stdin,
            reader,
            &format!("seed{}", i),
            "students.create",
            json!({
                "studentId": id,
                "fullName": name,
                "email": email,
                "course": course
            }),
        );
    }
}

fn listed_ids(result: &serde_json::Value) -> Vec<String> {
    result
        .get("students")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|s| {
            s.get("studentId")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        })
        .collect()
}

#[test]
fn search_matches_name_id_email_and_course() {
    let workspace = temp_dir("registrar-search");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed(&mut stdin, &mut reader);

    // Case-insensitive substring against full_name.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "q1",
        "students.list",
        json!({ "search": "alice" }),
    );
    assert_eq!(listed_ids(&res), vec!["S1"]);

    // Against course.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "q2",
        "students.list",
        json!({ "search": "math" }),
    );
    assert_eq!(listed_ids(&res), vec!["S3"]);

    // Against email.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "q3",
        "students.list",
        json!({ "search": "bob@" }),
    );
    assert_eq!(listed_ids(&res), vec!["S2"]);

    // Against student id.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "q4",
        "students.list",
        json!({ "search": "S2" }),
    );
    assert_eq!(listed_ids(&res), vec!["S2"]);

    // No match.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "q5",
        "students.list",
        json!({ "search": "zzz" }),
    );
    assert!(listed_ids(&res).is_empty());

    // Blank search is the same as no search.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "q6",
        "students.list",
        json!({ "search": "   " }),
    );
    assert_eq!(listed_ids(&res).len(), 3);
}

#[test]
fn order_allow_list_and_direction_fallback() {
    let workspace = temp_dir("registrar-order");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed(&mut stdin, &mut reader);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "q1",
        "students.list",
        json!({ "order": "full_name", "dir": "asc" }),
    );
    assert_eq!(listed_ids(&res), vec!["S1", "S2", "S3"]);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "q2",
        "students.list",
        json!({ "order": "full_name", "dir": "desc" }),
    );
    assert_eq!(listed_ids(&res), vec!["S3", "S2", "S1"]);

    // Anything outside the allow-list behaves exactly like created_at DESC.
    let hostile = request_ok(
        &mut stdin,
        &mut reader,
        "q3",
        "students.list",
        json!({ "order": "students; DROP TABLE students", "dir": "xyz" }),
    );
    let baseline = request_ok(
        &mut stdin,
        &mut reader,
        "q4",
        "students.list",
        json!({ "order": "created_at", "dir": "desc" }),
    );
    assert_eq!(listed_ids(&hostile), listed_ids(&baseline));
    assert_eq!(listed_ids(&hostile).len(), 3);

    // The table is still there and still queryable.
    let res = request_ok(&mut stdin, &mut reader, "q5", "students.list", json!({}));
    assert_eq!(listed_ids(&res).len(), 3);
}

#[test]
fn limit_and_offset_page_through_results() {
    let workspace = temp_dir("registrar-page");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed(&mut stdin, &mut reader);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "q1",
        "students.list",
        json!({ "order": "student_id", "dir": "asc", "limit": 2 }),
    );
    assert_eq!(listed_ids(&res), vec!["S1", "S2"]);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "q2",
        "students.list",
        json!({ "order": "student_id", "dir": "asc", "limit": 2, "offset": 2 }),
    );
    assert_eq!(listed_ids(&res), vec!["S3"]);

    // Negative values are ignored rather than passed through.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "q3",
        "students.list",
        json!({ "order": "student_id", "dir": "asc", "limit": -1, "offset": -5 }),
    );
    assert_eq!(listed_ids(&res), vec!["S1", "S2", "S3"]);
}
