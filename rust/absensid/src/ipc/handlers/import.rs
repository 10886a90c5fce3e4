//! Roster spreadsheet exchange: bulk import plus the template and roster exports.

use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::{classes, setup};
use crate::ipc::helpers::{get_optional_str, get_required_str, with_db};
use crate::ipc::types::{AppState, Request};
use crate::roster_import::{self, number_text, ImportError, ImportPlan};
use crate::xlsx::{self, RosterExportRow};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

fn existing_nis(conn: &Connection) -> Result<HashMap<String, bool>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT student_id, is_active FROM students")
        .map_err(HandlerErr::query)?;
    stmt.query_map([], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? != 0))
    })
    .and_then(|it| it.collect::<Result<HashMap<_, _>, _>>())
    .map_err(HandlerErr::query)
}

fn header_err(e: ImportError) -> HandlerErr {
    let details = match &e {
        ImportError::MissingColumns(missing) => json!({ "missingColumns": missing }),
        ImportError::Empty => json!({ "missingColumns": roster_import::TEMPLATE_HEADER }),
    };
    HandlerErr::new("bad_header", e.to_string()).with_details(details)
}

/// Writes the accepted rows as one batch keyed by NIS.
fn apply_plan(conn: &Connection, plan: &ImportPlan) -> Result<(), HandlerErr> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO students(
                   id, student_id, name, class_id, gender, is_active, created_at, updated_at
                 ) VALUES(?, ?, ?, ?, ?, 1,
                   strftime('%Y-%m-%dT%H:%M:%SZ','now'), strftime('%Y-%m-%dT%H:%M:%SZ','now'))
                 ON CONFLICT(student_id) DO UPDATE SET
                   name = excluded.name,
                   class_id = excluded.class_id,
                   gender = excluded.gender,
                   is_active = 1,
                   updated_at = excluded.updated_at",
            )
            .map_err(HandlerErr::query)?;
        for c in &plan.candidates {
            stmt.execute((
                Uuid::new_v4().to_string(),
                &c.nis,
                &c.name,
                &c.class_id,
                c.gender,
            ))
            .map_err(|e| {
                HandlerErr::update("students", e)
                    .with_details(json!({ "table": "students", "row": c.row_number }))
            })?;
        }
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))
}

fn run_import(
    conn: &Connection,
    rows: &[Vec<String>],
    header_row: usize,
) -> Result<Value, HandlerErr> {
    let known = classes::list_known_classes(conn)?;
    let existing = existing_nis(conn)?;
    let plan = roster_import::plan_import(rows, header_row, &known, &existing).map_err(header_err)?;

    apply_plan(conn, &plan)?;

    let cfg = setup::import_config(conn)?;
    let (preview, more) = roster_import::error_preview(&plan.errors, cfg.error_preview_count);
    let imported = plan.candidates.len();
    let reactivated = plan.candidates.iter().filter(|c| c.reactivates).count();
    tracing::info!(
        imported,
        reactivated,
        skipped = plan.skipped_rows,
        rejected = plan.rejected_rows,
        "roster import finished"
    );

    Ok(json!({
        "imported": imported,
        "reactivated": reactivated,
        "skipped": plan.skipped_rows,
        "rejected": plan.rejected_rows,
        "errors": plan.errors,
        "warnings": plan.warnings,
        "errorPreview": preview,
        "moreErrorCount": more
    }))
}

fn students_import_xlsx(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let path = PathBuf::from(get_required_str(params, "path")?);
    let cfg = setup::import_config(conn)?;
    xlsx::check_upload(&path, cfg.max_file_bytes)
        .map_err(|e| HandlerErr::new("bad_file", e.to_string()))?;
    let sheet = xlsx::read_first_sheet(&path)
        .map_err(|e| HandlerErr::new("bad_file", format!("{e:#}")))?;
    tracing::info!(
        path = %path.display(),
        rows = sheet.rows.len(),
        first_row = sheet.first_row,
        "spreadsheet read"
    );
    run_import(conn, &sheet.rows, sheet.first_row)
}

fn students_import_rows(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let raw = params
        .get("rows")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("rows must be an array"))?;
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(raw.len());
    for (i, row) in raw.iter().enumerate() {
        let cells = row
            .as_array()
            .ok_or_else(|| HandlerErr::bad_params(format!("rows[{}] must be an array", i)))?;
        rows.push(
            cells
                .iter()
                .map(|c| match c {
                    Value::Null => String::new(),
                    Value::String(s) => s.clone(),
                    Value::Number(n) => match n.as_i64() {
                        Some(i) => i.to_string(),
                        None => n.as_f64().map(number_text).unwrap_or_else(|| n.to_string()),
                    },
                    other => other.to_string(),
                })
                .collect(),
        );
    }
    run_import(conn, &rows, 1)
}

fn out_path(params: &Value) -> Result<PathBuf, HandlerErr> {
    get_required_str(params, "outPath").map(PathBuf::from)
}

fn students_export_template(_conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let out = out_path(params)?;
    let n = xlsx::write_template(&out)
        .map_err(|e| HandlerErr::new("export_failed", format!("{e:#}")))?;
    tracing::info!(path = %out.display(), "import template written");
    Ok(json!({ "path": out.to_string_lossy(), "rowsExported": n }))
}

fn students_export_xlsx(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let out = out_path(params)?;
    let class_id = get_optional_str(params, "classId")?.filter(|c| c != "all");

    let mut sql = String::from(
        "SELECT s.student_id, s.name, COALESCE(c.name, ''), s.gender,
                s.phone, s.address, s.parent_name, s.parent_phone
         FROM students s
         LEFT JOIN classes c ON c.id = s.class_id
         WHERE s.is_active = 1",
    );
    let mut bind: Vec<SqlValue> = Vec::new();
    if let Some(cid) = class_id {
        sql.push_str(" AND s.class_id = ?");
        bind.push(SqlValue::Text(cid));
    }
    sql.push_str(" ORDER BY c.grade_level, c.name, s.name");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok(RosterExportRow {
                nis: r.get(0)?,
                name: r.get(1)?,
                class_name: r.get(2)?,
                gender: r.get(3)?,
                phone: r.get(4)?,
                address: r.get(5)?,
                parent_name: r.get(6)?,
                parent_phone: r.get(7)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let n = xlsx::write_roster(&out, &rows)
        .map_err(|e| HandlerErr::new("export_failed", format!("{e:#}")))?;
    tracing::info!(path = %out.display(), rows = n, "roster exported");
    Ok(json!({ "path": out.to_string_lossy(), "rowsExported": n }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.importXlsx" => Some(with_db(state, req, students_import_xlsx)),
        "students.importRows" => Some(with_db(state, req, students_import_rows)),
        "students.exportTemplate" => Some(with_db(state, req, students_export_template)),
        "students.exportXlsx" => Some(with_db(state, req, students_export_xlsx)),
        _ => None,
    }
}
