mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn setup_defaults_cover_every_section() {
    let workspace = temp_dir("absensi-setup-defaults");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let all = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(all["auth"]["username"].as_str(), Some("admin"));
    assert_eq!(all["auth"]["fullName"].as_str(), Some("Administrator"));
    assert_eq!(all["attendance"]["defaultStatus"].as_str(), Some("Hadir"));
    assert_eq!(all["attendance"]["recordedBy"].as_str(), Some("Admin"));
    assert_eq!(all["import"]["maxFileBytes"].as_i64(), Some(5 * 1024 * 1024));
    assert_eq!(all["import"]["errorPreviewCount"].as_i64(), Some(5));

    let one = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.get",
        json!({ "section": "import" }),
    );
    assert_eq!(one, all["import"]);
}

#[test]
fn setup_update_validates_and_persists() {
    let workspace = temp_dir("absensi-setup-update");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "attendance", "patch": { "recordedBy": "Wali Kelas" } }),
    );
    assert_eq!(updated["recordedBy"].as_str(), Some("Wali Kelas"));
    assert_eq!(updated["defaultStatus"].as_str(), Some("Hadir"));

    let rejected = [
        json!({ "section": "attendance", "patch": { "defaultStatus": "Telat" } }),
        json!({ "section": "import", "patch": { "maxFileBytes": 10 } }),
        json!({ "section": "import", "patch": { "errorPreviewCount": 0 } }),
        json!({ "section": "auth", "patch": { "passwordSha256": "abc" } }),
        json!({ "section": "auth", "patch": { "theme": "dark" } }),
        json!({ "section": "printing", "patch": {} }),
    ];
    for (i, params) in rejected.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("bad{}", i), "setup.update", params);
        assert_eq!(error_code(&resp), Some("bad_params"), "case {}", i);
    }

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.get",
        json!({ "section": "attendance" }),
    );
    assert_eq!(after["recordedBy"].as_str(), Some("Wali Kelas"));
    assert_eq!(after["defaultStatus"].as_str(), Some("Hadir"));
}
