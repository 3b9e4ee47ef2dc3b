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
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rosterd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("rosterd-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["result"]["workspacePath"].is_null());

    // Everything but health needs a workspace.
    for (id, method) in [
        ("2", "students.list"),
        ("3", "attendance.summary"),
        ("4", "grades.summary"),
        ("5", "dashboard.counts"),
        ("6", "setup.get"),
    ] {
        let resp = request(&mut stdin, &mut reader, id, method, json!({}));
        assert_eq!(error_code(&resp), "no_workspace", "{}", method);
    }

    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for (id, method, params) in [
        ("8", "students.list", json!({})),
        ("9", "subjects.list", json!({})),
        ("10", "enrollments.list", json!({})),
        ("11", "evaluations.list", json!({})),
        ("12", "attendance.summary", json!({})),
        ("13", "grades.summary", json!({})),
        ("14", "dashboard.counts", json!({})),
        ("15", "reports.attendance", json!({ "subjectId": "missing" })),
        ("16", "reports.grades", json!({ "subjectId": "missing" })),
        ("17", "setup.get", json!({})),
        ("18", "attendance.cancel", json!({ "sessionId": "missing" })),
        ("19", "grades.cancel", json!({ "sessionId": "missing" })),
        ("20", "attendance.deleteRecord", json!({ "recordId": "missing" })),
        ("21", "grades.deleteRecord", json!({ "recordId": "missing" })),
        (
            "22",
            "backup.exportWorkspace",
            json!({ "outPath": bundle_out.to_string_lossy() }),
        ),
    ] {
        let resp = request(&mut stdin, &mut reader, id, method, params);
        assert_ne!(error_code(&resp), "not_implemented", "{}", method);
    }

    let unknown = request(&mut stdin, &mut reader, "23", "planner.units.list", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    writeln!(stdin, "{{not json").expect("write bad line");
    stdin.flush().expect("flush bad line");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json line");
    let bad: serde_json::Value = serde_json::from_str(line.trim()).expect("parse bad_json");
    assert_eq!(error_code(&bad), "bad_json");
    assert!(bad.get("id").is_none());

    // The loop keeps serving after a bad line.
    let again = request(&mut stdin, &mut reader, "24", "health", json!({}));
    assert_eq!(again["ok"].as_bool(), Some(true));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn invalid_utf8_line_gets_bad_json_and_keeps_serving() {
    let workspace = temp_dir("rosterd-router-utf8");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "firstName": "Rosa", "lastName": "Gil", "course": "1A" }),
    );
    assert_eq!(created["ok"].as_bool(), Some(true));

    stdin
        .write_all(b"\xff\xfe{\"id\":\"x\"}\n")
        .expect("write invalid utf-8");
    stdin.flush().expect("flush invalid utf-8");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json line");
    let bad: serde_json::Value = serde_json::from_str(line.trim()).expect("parse bad_json");
    assert_eq!(error_code(&bad), "bad_json");

    // Same process, same state.
    let health = request(&mut stdin, &mut reader, "3", "health", json!({}));
    assert_eq!(health["ok"].as_bool(), Some(true));
    let listed = request(&mut stdin, &mut reader, "4", "students.list", json!({}));
    assert_eq!(
        listed["result"]["students"].as_array().map(|a| a.len()),
        Some(1)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
