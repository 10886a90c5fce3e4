mod test_support;

use serde_json::json;
use test_support::{
    create_student, error_code, open_workspace_with_classes, request, request_ok, spawn_sidecar,
    temp_dir,
};

fn sheet_status(sheet: &serde_json::Value, id: &str) -> (String, bool) {
    let row = sheet["students"]
        .as_array()
        .expect("students")
        .iter()
        .find(|s| s.get("id").and_then(|v| v.as_str()) == Some(id))
        .expect("student on sheet");
    (
        row.get("status").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        row.get("recorded").and_then(|v| v.as_bool()).unwrap_or(false),
    )
}

#[test]
fn resaving_a_day_overwrites_instead_of_duplicating() {
    let workspace = temp_dir("absensi-attendance-overwrite");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ids = open_workspace_with_classes(&mut stdin, &mut reader, &workspace, &[("7A", 7)]);
    let a = create_student(&mut stdin, &mut reader, "s1", "1001", "Ahmad Fauzi", &ids[0]);
    let b = create_student(&mut stdin, &mut reader, "s2", "1002", "Siti Nurhaliza", &ids[0]);

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "save1",
        "attendance.save",
        json!({
            "date": "2024-04-15",
            "records": [
                { "studentId": a, "status": "Hadir" },
                { "studentId": b, "status": "Sakit", "notes": "demam" }
            ]
        }),
    );
    assert_eq!(first.get("saved").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(first["summary"]["sakit"].as_i64(), Some(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "save2",
        "attendance.save",
        json!({
            "date": "2024-04-15",
            "records": [{ "studentId": b, "status": "Izin" }]
        }),
    );

    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "sheet",
        "attendance.sheet",
        json!({ "classId": ids[0], "date": "2024-04-15" }),
    );
    assert_eq!(sheet_status(&sheet, &b), ("Izin".to_string(), true));
    assert_eq!(sheet["summary"]["hadir"].as_i64(), Some(1));
    assert_eq!(sheet["summary"]["izin"].as_i64(), Some(1));
    assert_eq!(sheet["summary"]["sakit"].as_i64(), Some(0));

    // One record per (student, date): the month report sees a single Izin.
    let report = request_ok(
        &mut stdin,
        &mut reader,
        "rep",
        "reports.monthly",
        json!({ "year": 2024, "month": 4, "classId": ids[0] }),
    );
    let row_b = report["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .find(|r| r.get("studentId").and_then(|v| v.as_str()) == Some(b.as_str()))
        .expect("row for b");
    assert_eq!(row_b["izin"].as_i64(), Some(1));
    assert_eq!(row_b["sakit"].as_i64(), Some(0));
}

#[test]
fn sheet_defaults_unrecorded_students_to_configured_status() {
    let workspace = temp_dir("absensi-attendance-default");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ids = open_workspace_with_classes(&mut stdin, &mut reader, &workspace, &[("7A", 7)]);
    let a = create_student(&mut stdin, &mut reader, "s1", "1001", "Ahmad Fauzi", &ids[0]);

    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.sheet",
        json!({ "classId": ids[0], "date": "2024-04-16" }),
    );
    assert_eq!(sheet.get("date").and_then(|v| v.as_str()), Some("2024-04-16"));
    assert_eq!(sheet_status(&sheet, &a), ("Hadir".to_string(), false));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "attendance", "patch": { "defaultStatus": "Alpha" } }),
    );
    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.sheet",
        json!({ "classId": ids[0], "date": "2024-04-16" }),
    );
    assert_eq!(sheet_status(&sheet, &a), ("Alpha".to_string(), false));
}

#[test]
fn failed_save_commits_nothing() {
    let workspace = temp_dir("absensi-attendance-abort");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ids = open_workspace_with_classes(&mut stdin, &mut reader, &workspace, &[("7A", 7)]);
    let a = create_student(&mut stdin, &mut reader, "s1", "1001", "Ahmad Fauzi", &ids[0]);

    let unknown_student = request(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.save",
        json!({
            "date": "2024-04-15",
            "records": [
                { "studentId": a, "status": "Sakit" },
                { "studentId": "ghost", "status": "Hadir" }
            ]
        }),
    );
    assert_eq!(error_code(&unknown_student), Some("not_found"));

    let bad_status = request(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.save",
        json!({
            "date": "2024-04-15",
            "records": [{ "studentId": a, "status": "Terlambat" }]
        }),
    );
    assert_eq!(error_code(&bad_status), Some("bad_params"));

    let bad_date = request(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.save",
        json!({
            "date": "15/04/2024",
            "records": [{ "studentId": a, "status": "Hadir" }]
        }),
    );
    assert_eq!(error_code(&bad_date), Some("bad_params"));

    let sheet = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.sheet",
        json!({ "classId": ids[0], "date": "2024-04-15" }),
    );
    assert_eq!(sheet_status(&sheet, &a), ("Hadir".to_string(), false));
}

#[test]
fn day_summary_counts_active_students() {
    let workspace = temp_dir("absensi-attendance-summary");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ids = open_workspace_with_classes(&mut stdin, &mut reader, &workspace, &[("7A", 7), ("7B", 7)]);
    let a = create_student(&mut stdin, &mut reader, "s1", "1001", "Ahmad Fauzi", &ids[0]);
    let b = create_student(&mut stdin, &mut reader, "s2", "1002", "Budi Santoso", &ids[0]);
    let c = create_student(&mut stdin, &mut reader, "s3", "2001", "Citra Lestari", &ids[1]);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "save",
        "attendance.save",
        json!({
            "date": "2024-04-15",
            "records": [
                { "studentId": a, "status": "Hadir" },
                { "studentId": b, "status": "Hadir" },
                { "studentId": c, "status": "Alpha" }
            ]
        }),
    );

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "sum",
        "attendance.daySummary",
        json!({ "date": "2024-04-15" }),
    );
    assert_eq!(summary.get("totalStudents").and_then(|v| v.as_i64()), Some(3));
    assert_eq!(summary.get("totalClasses").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(summary["counts"]["hadir"].as_i64(), Some(2));
    assert_eq!(summary["counts"]["alpha"].as_i64(), Some(1));
    assert_eq!(summary.get("percentage").and_then(|v| v.as_i64()), Some(67));

    let empty_day = request_ok(
        &mut stdin,
        &mut reader,
        "sum2",
        "attendance.daySummary",
        json!({ "date": "2024-04-16" }),
    );
    assert_eq!(empty_day.get("percentage").and_then(|v| v.as_i64()), Some(0));
}

#[test]
fn recorded_by_falls_back_to_logged_in_admin() {
    let workspace = temp_dir("absensi-attendance-recorder");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let ids = open_workspace_with_classes(&mut stdin, &mut reader, &workspace, &[("7A", 7)]);
    let a = create_student(&mut stdin, &mut reader, "s1", "1001", "Ahmad Fauzi", &ids[0]);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "login",
        "auth.login",
        json!({ "username": "admin", "password": "@Smp2025" }),
    );
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "save",
        "attendance.save",
        json!({ "date": "2024-04-15", "records": [{ "studentId": a, "status": "Hadir" }] }),
    );
    assert_eq!(saved.get("recordedBy").and_then(|v| v.as_str()), Some("admin"));

    let _ = request_ok(&mut stdin, &mut reader, "logout", "auth.logout", json!({}));
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "save2",
        "attendance.save",
        json!({ "date": "2024-04-16", "records": [{ "studentId": a, "status": "Hadir" }] }),
    );
    assert_eq!(saved.get("recordedBy").and_then(|v| v.as_str()), Some("Admin"));
}
