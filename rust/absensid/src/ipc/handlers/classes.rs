use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_required_i64, get_required_str, with_db};
use crate::ipc::types::{AppState, Request};
use crate::roster_import::{class_key, KnownClass};
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

pub fn list_known_classes(conn: &Connection) -> Result<Vec<KnownClass>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, name FROM classes ORDER BY grade_level, name")
        .map_err(HandlerErr::query)?;
    stmt.query_map([], |r| {
        Ok(KnownClass {
            id: r.get(0)?,
            name: r.get(1)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::query)
}

fn classes_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    // Correlated subquery so inactive students do not inflate the count.
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.name,
               c.grade_level,
               (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id AND s.is_active = 1)
             FROM classes c
             ORDER BY c.grade_level, c.name",
        )
        .map_err(HandlerErr::query)?;
    let classes = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let grade_level: i64 = row.get(2)?;
            let student_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "gradeLevel": grade_level,
                "studentCount": student_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "classes": classes }))
}

fn classes_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let grade_level = get_required_i64(params, "gradeLevel")?;
    if !(1..=12).contains(&grade_level) {
        return Err(HandlerErr::bad_params("gradeLevel must be in 1..=12"));
    }
    // Import resolves classes by this key, so two classes may not share it.
    let key = class_key(&name);
    if let Some(clash) = list_known_classes(conn)?
        .into_iter()
        .find(|c| class_key(&c.name) == key)
    {
        return Err(HandlerErr::new(
            "conflict",
            format!("Kelas \"{}\" sudah ada", clash.name),
        )
        .with_details(json!({ "classId": clash.id })));
    }

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, grade_level, created_at)
         VALUES(?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (&class_id, &name, grade_level),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "classes" }))
    })?;
    tracing::info!(class_id = %class_id, name = %name, "class created");
    Ok(json!({ "classId": class_id, "name": name }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "classes.list" => Some(with_db(state, req, classes_list)),
        "classes.create" => Some(with_db(state, req, classes_create)),
        _ => None,
    }
}
