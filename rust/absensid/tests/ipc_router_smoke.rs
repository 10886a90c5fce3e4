mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("absensi-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    let early = request(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(error_code(&early), Some("no_workspace"));

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(
        selected.get("workspacePath").and_then(|v| v.as_str()),
        Some(workspace.to_string_lossy().as_ref())
    );
    assert!(workspace.join("absensi.sqlite3").exists());

    let methods = [
        ("setup.get", json!({})),
        ("auth.session", json!({})),
        ("classes.list", json!({})),
        ("students.list", json!({})),
        ("attendance.daySummary", json!({ "date": "2024-04-01" })),
        ("reports.monthly", json!({ "year": 2024, "month": 4 })),
    ];
    for (i, (method, params)) in methods.into_iter().enumerate() {
        let _ = request_ok(&mut stdin, &mut reader, &format!("m{}", i), method, params);
    }

    let unknown = request(&mut stdin, &mut reader, "9", "grades.list", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json response");
    let bad: serde_json::Value = serde_json::from_str(line.trim()).expect("parse");
    assert_eq!(bad.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&bad), Some("bad_json"));

    // Still serving after the bad line.
    let _ = request_ok(&mut stdin, &mut reader, "10", "health", json!({}));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn workspace_select_requires_path() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(&mut stdin, &mut reader, "1", "workspace.select", json!({}));
    assert_eq!(error_code(&resp), Some("bad_params"));
}
