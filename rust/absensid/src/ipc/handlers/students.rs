use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{class_exists, get_optional_str, get_required_str, with_db};
use crate::ipc::types::{AppState, Request};
use crate::roster_import::{normalize_gender, MAX_NAME_CHARS, MIN_NAME_CHARS};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

const CONTACT_FIELDS: [(&str, &str); 4] = [
    ("phone", "phone"),
    ("address", "address"),
    ("parentName", "parent_name"),
    ("parentPhone", "parent_phone"),
];

fn validate_nis(nis: &str) -> Result<(), HandlerErr> {
    if nis.is_empty() || !nis.chars().all(|c| c.is_ascii_digit()) {
        return Err(HandlerErr::bad_params("NIS harus berupa angka"));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), HandlerErr> {
    let n = name.chars().count();
    if !(MIN_NAME_CHARS..=MAX_NAME_CHARS).contains(&n) {
        return Err(HandlerErr::bad_params(format!(
            "Nama harus {}-{} karakter",
            MIN_NAME_CHARS, MAX_NAME_CHARS
        )));
    }
    Ok(())
}

fn validate_gender(raw: &str) -> Result<&'static str, HandlerErr> {
    normalize_gender(raw)
        .ok_or_else(|| HandlerErr::bad_params("gender must be Laki-laki or Perempuan"))
}

fn nis_owner(conn: &Connection, nis: &str) -> Result<Option<String>, HandlerErr> {
    conn.query_row(
        "SELECT id FROM students WHERE student_id = ?",
        [nis],
        |r| r.get::<_, String>(0),
    )
    .optional()
    .map_err(HandlerErr::query)
}

fn students_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_optional_str(params, "classId")?.filter(|c| c != "all");
    let search = get_optional_str(params, "search")?.map(|s| s.to_lowercase());
    let include_inactive = params
        .get("includeInactive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let mut sql = String::from(
        "SELECT s.id, s.student_id, s.name, s.class_id, c.name, s.gender,
                s.phone, s.address, s.parent_name, s.parent_phone, s.is_active
         FROM students s
         LEFT JOIN classes c ON c.id = s.class_id
         WHERE 1 = 1",
    );
    let mut bind: Vec<SqlValue> = Vec::new();
    if !include_inactive {
        sql.push_str(" AND s.is_active = 1");
    }
    if let Some(cid) = class_id {
        sql.push_str(" AND s.class_id = ?");
        bind.push(SqlValue::Text(cid));
    }
    sql.push_str(" ORDER BY s.name");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let students = stmt
        .query_map(params_from_iter(bind), |row| {
            let class_name: Option<String> = row.get(4)?;
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "studentId": row.get::<_, String>(1)?,
                "name": row.get::<_, String>(2)?,
                "classId": row.get::<_, String>(3)?,
                "className": class_name,
                "gender": row.get::<_, String>(5)?,
                "phone": row.get::<_, Option<String>>(6)?,
                "address": row.get::<_, Option<String>>(7)?,
                "parentName": row.get::<_, Option<String>>(8)?,
                "parentPhone": row.get::<_, Option<String>>(9)?,
                "isActive": row.get::<_, i64>(10)? != 0
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    // SQLite's lower() folds ASCII only, so the match runs here.
    let students: Vec<Value> = match search {
        Some(q) => students
            .into_iter()
            .filter(|s| {
                ["name", "studentId"].iter().any(|k| {
                    s.get(*k)
                        .and_then(|v| v.as_str())
                        .is_some_and(|v| v.to_lowercase().contains(&q))
                })
            })
            .collect(),
        None => students,
    };
    Ok(json!({ "students": students }))
}

fn students_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let nis = get_required_str(params, "studentId")?;
    let name = get_required_str(params, "name")?;
    let class_id = get_required_str(params, "classId")?;
    let gender = validate_gender(&get_required_str(params, "gender")?)?;
    validate_nis(&nis)?;
    validate_name(&name)?;

    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }
    if nis_owner(conn, &nis)?.is_some() {
        return Err(HandlerErr::new("conflict", format!("NIS {} sudah terdaftar", nis)));
    }

    let mut contacts: Vec<Option<String>> = Vec::with_capacity(CONTACT_FIELDS.len());
    for (key, _) in CONTACT_FIELDS {
        contacts.push(get_optional_str(params, key)?);
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(
           id, student_id, name, class_id, gender,
           phone, address, parent_name, parent_phone,
           is_active, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, 1,
           strftime('%Y-%m-%dT%H:%M:%SZ','now'), strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &id,
            &nis,
            &name,
            &class_id,
            gender,
            contacts[0].as_deref(),
            contacts[1].as_deref(),
            contacts[2].as_deref(),
            contacts[3].as_deref(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "students" }))
    })?;
    tracing::info!(student = %id, nis = %nis, "student created");
    Ok(json!({ "id": id }))
}

fn students_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let patch = params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

    let exists = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(HandlerErr::query)?
        .is_some();
    if !exists {
        return Err(HandlerErr::not_found("student not found"));
    }

    let mut sets: Vec<String> = Vec::new();
    let mut bind: Vec<SqlValue> = Vec::new();
    for (k, v) in patch {
        match k.as_str() {
            "studentId" => {
                let nis = v
                    .as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| HandlerErr::bad_params("patch.studentId must be string"))?;
                validate_nis(&nis)?;
                if nis_owner(conn, &nis)?.is_some_and(|owner| owner != id) {
                    return Err(HandlerErr::new("conflict", format!("NIS {} sudah terdaftar", nis)));
                }
                sets.push("student_id = ?".to_string());
                bind.push(SqlValue::Text(nis));
            }
            "name" => {
                let name = v
                    .as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| HandlerErr::bad_params("patch.name must be string"))?;
                validate_name(&name)?;
                sets.push("name = ?".to_string());
                bind.push(SqlValue::Text(name));
            }
            "classId" => {
                let class_id = v
                    .as_str()
                    .ok_or_else(|| HandlerErr::bad_params("patch.classId must be string"))?;
                if !class_exists(conn, class_id)? {
                    return Err(HandlerErr::not_found("class not found"));
                }
                sets.push("class_id = ?".to_string());
                bind.push(SqlValue::Text(class_id.to_string()));
            }
            "gender" => {
                let raw = v
                    .as_str()
                    .ok_or_else(|| HandlerErr::bad_params("patch.gender must be string"))?;
                sets.push("gender = ?".to_string());
                bind.push(SqlValue::Text(validate_gender(raw)?.to_string()));
            }
            "isActive" => {
                let active = v
                    .as_bool()
                    .ok_or_else(|| HandlerErr::bad_params("patch.isActive must be boolean"))?;
                sets.push("is_active = ?".to_string());
                bind.push(SqlValue::Integer(active as i64));
            }
            other => {
                let Some((_, column)) = CONTACT_FIELDS.iter().find(|(key, _)| *key == other) else {
                    return Err(HandlerErr::bad_params(format!("unknown patch field: {}", other)));
                };
                // Blank or null clears the contact field.
                let value = match v {
                    Value::Null => None,
                    Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
                    _ => {
                        return Err(HandlerErr::bad_params(format!(
                            "patch.{} must be string or null",
                            other
                        )))
                    }
                };
                sets.push(format!("{} = ?", column));
                bind.push(value.map(SqlValue::Text).unwrap_or(SqlValue::Null));
            }
        }
    }
    if sets.is_empty() {
        return Ok(json!({ "ok": true }));
    }

    let sql = format!(
        "UPDATE students SET {}, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') WHERE id = ?",
        sets.join(", ")
    );
    bind.push(SqlValue::Text(id.clone()));
    conn.execute(&sql, params_from_iter(bind))
        .map_err(|e| HandlerErr::update("students", e))?;
    Ok(json!({ "ok": true }))
}

fn students_deactivate(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let changed = conn
        .execute(
            "UPDATE students
             SET is_active = 0, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE id = ?",
            [&id],
        )
        .map_err(|e| HandlerErr::update("students", e))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("student not found"));
    }
    tracing::info!(student = %id, "student deactivated");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.list" => Some(with_db(state, req, students_list)),
        "students.create" => Some(with_db(state, req, students_create)),
        "students.update" => Some(with_db(state, req, students_update)),
        "students.deactivate" => Some(with_db(state, req, students_deactivate)),
        _ => None,
    }
}
