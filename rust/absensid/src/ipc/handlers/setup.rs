use crate::calc::AttendanceStatus;
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::with_db;
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

/// sha256 of the password the school was handed with the installation.
pub const DEFAULT_PASSWORD_SHA256: &str =
    "2cd92046ddf2c52245e3e12e0b604dfb9e5b881f46f56606f8e0de471415048b";

pub const DEFAULT_MAX_FILE_BYTES: i64 = 5 * 1024 * 1024;

#[derive(Clone, Copy)]
pub enum SetupSection {
    Auth,
    Attendance,
    Import,
}

impl SetupSection {
    const ALL: [SetupSection; 3] = [Self::Auth, Self::Attendance, Self::Import];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "auth" => Some(Self::Auth),
            "attendance" => Some(Self::Attendance),
            "import" => Some(Self::Import),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Attendance => "attendance",
            Self::Import => "import",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Auth => "setup.auth",
            Self::Attendance => "setup.attendance",
            Self::Import => "setup.import",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Auth => json!({
            "username": "admin",
            "passwordSha256": DEFAULT_PASSWORD_SHA256,
            "fullName": "Administrator"
        }),
        SetupSection::Attendance => json!({
            "defaultStatus": "Hadir",
            "recordedBy": "Admin"
        }),
        SetupSection::Import => json!({
            "maxFileBytes": DEFAULT_MAX_FILE_BYTES,
            "errorPreviewCount": 5
        }),
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        let value = match (section, k.as_str()) {
            (SetupSection::Auth, "username") => Value::String(parse_string_max(v, k, 64)?),
            (SetupSection::Auth, "fullName") => Value::String(parse_string_max(v, k, 120)?),
            (SetupSection::Auth, "passwordSha256") => {
                let s = parse_string_max(v, k, 64)?.to_ascii_lowercase();
                if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err("passwordSha256 must be 64 hex characters".into());
                }
                Value::String(s)
            }
            (SetupSection::Attendance, "defaultStatus") => {
                let s = parse_string_max(v, k, 8)?;
                let Some(status) = AttendanceStatus::parse(&s) else {
                    let allowed: Vec<&str> = AttendanceStatus::ALL.iter().map(|s| s.as_str()).collect();
                    return Err(format!("defaultStatus must be one of: {}", allowed.join(", ")));
                };
                Value::String(status.as_str().to_string())
            }
            (SetupSection::Attendance, "recordedBy") => {
                Value::String(parse_string_max(v, k, 64)?)
            }
            (SetupSection::Import, "maxFileBytes") => {
                Value::from(parse_i64_range(v, k, 1024, 50 * 1024 * 1024)?)
            }
            (SetupSection::Import, "errorPreviewCount") => {
                Value::from(parse_i64_range(v, k, 1, 50)?)
            }
            _ => return Err(format!("unknown {} field: {}", section.name(), k)),
        };
        obj.insert(k.clone(), value);
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SetupSection) -> Result<Value, HandlerErr> {
    let mut current = default_section(section);
    let saved = db::settings_get_json(conn, section.key()).map_err(HandlerErr::query)?;
    if let Some(saved_obj) = saved.as_ref().and_then(|v| v.as_object()) {
        // Stored values were validated on the way in; a bad one falls back to the default.
        let _ = merge_section_patch(section, &mut current, saved_obj);
    }
    Ok(current)
}

pub struct AuthConfig {
    pub username: String,
    pub password_sha256: String,
    pub full_name: String,
}

pub struct AttendanceConfig {
    pub default_status: AttendanceStatus,
    pub recorded_by: String,
}

pub struct ImportConfig {
    pub max_file_bytes: u64,
    pub error_preview_count: usize,
}

fn str_field(section: &Value, key: &str) -> String {
    section
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

pub fn auth_config(conn: &Connection) -> Result<AuthConfig, HandlerErr> {
    let s = load_section(conn, SetupSection::Auth)?;
    Ok(AuthConfig {
        username: str_field(&s, "username"),
        password_sha256: str_field(&s, "passwordSha256"),
        full_name: str_field(&s, "fullName"),
    })
}

pub fn attendance_config(conn: &Connection) -> Result<AttendanceConfig, HandlerErr> {
    let s = load_section(conn, SetupSection::Attendance)?;
    Ok(AttendanceConfig {
        default_status: AttendanceStatus::parse(&str_field(&s, "defaultStatus"))
            .unwrap_or(AttendanceStatus::Hadir),
        recorded_by: str_field(&s, "recordedBy"),
    })
}

pub fn import_config(conn: &Connection) -> Result<ImportConfig, HandlerErr> {
    let s = load_section(conn, SetupSection::Import)?;
    Ok(ImportConfig {
        max_file_bytes: s
            .get("maxFileBytes")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_FILE_BYTES as u64),
        error_preview_count: s
            .get("errorPreviewCount")
            .and_then(|v| v.as_u64())
            .unwrap_or(5) as usize,
    })
}

fn setup_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    if let Some(raw) = params.get("section").and_then(|v| v.as_str()) {
        let section = SetupSection::parse(raw)
            .ok_or_else(|| HandlerErr::bad_params(format!("unknown section: {}", raw)))?;
        return load_section(conn, section);
    }
    let mut all = Map::new();
    for section in SetupSection::ALL {
        all.insert(section.name().to_string(), load_section(conn, section)?);
    }
    Ok(Value::Object(all))
}

fn setup_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let raw = params
        .get("section")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing section"))?;
    let section = SetupSection::parse(raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown section: {}", raw)))?;
    let patch = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

    let mut current = load_section(conn, section)?;
    merge_section_patch(section, &mut current, patch).map_err(HandlerErr::bad_params)?;
    db::settings_set_json(conn, section.key(), &current)
        .map_err(|e| HandlerErr::update("settings", e))?;
    tracing::info!(section = section.name(), "setup section updated");
    Ok(current)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(with_db(state, req, setup_get)),
        "setup.update" => Some(with_db(state, req, setup_update)),
        _ => None,
    }
}
