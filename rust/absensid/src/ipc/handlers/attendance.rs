use crate::calc::{self, AttendanceStatus, StatusCounts};
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::{auth, setup};
use crate::ipc::helpers::{
    class_exists, date_or_today, get_optional_str, get_required_str, parse_date, with_db,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

struct SaveRecord {
    student_id: String,
    status: AttendanceStatus,
    notes: Option<String>,
}

fn parse_status(raw: &str) -> Result<AttendanceStatus, HandlerErr> {
    AttendanceStatus::parse(raw).ok_or_else(|| {
        HandlerErr::bad_params(format!(
            "status must be one of: Hadir, Izin, Sakit, Alpha (got {})",
            raw
        ))
    })
}

fn attendance_sheet(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = date_or_today(params)?;
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }
    let default_status = setup::attendance_config(conn)?.default_status;
    let date_s = date.format("%Y-%m-%d").to_string();

    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.student_id, s.name, s.gender, a.status, a.notes
             FROM students s
             LEFT JOIN attendance a ON a.student_id = s.id AND a.date = ?
             WHERE s.class_id = ? AND s.is_active = 1
             ORDER BY s.name",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map((&date_s, &class_id), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, Option<String>>(5)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let mut summary = StatusCounts::default();
    let mut students = Vec::with_capacity(rows.len());
    for (id, nis, name, gender, stored, notes) in rows {
        let recorded = stored.as_deref().and_then(AttendanceStatus::parse);
        let status = recorded.unwrap_or(default_status);
        summary.add(status);
        students.push(json!({
            "id": id,
            "studentId": nis,
            "name": name,
            "gender": gender,
            "status": status.as_str(),
            "notes": notes,
            "recorded": recorded.is_some()
        }));
    }

    Ok(json!({
        "date": date_s,
        "classId": class_id,
        "students": students,
        "summary": summary
    }))
}

fn parse_records(params: &Value) -> Result<Vec<SaveRecord>, HandlerErr> {
    let raw = params
        .get("records")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("records must be an array"))?;
    let mut out = Vec::with_capacity(raw.len());
    for (i, rec) in raw.iter().enumerate() {
        if !rec.is_object() {
            return Err(HandlerErr::bad_params(format!("records[{}] must be an object", i)));
        }
        let student_id = get_required_str(rec, "studentId")?;
        let status = parse_status(&get_required_str(rec, "status")?)?;
        let notes = get_optional_str(rec, "notes")?;
        out.push(SaveRecord {
            student_id,
            status,
            notes,
        });
    }
    Ok(out)
}

fn resolve_recorded_by(conn: &Connection, params: &Value) -> Result<String, HandlerErr> {
    if let Some(by) = get_optional_str(params, "recordedBy")? {
        return Ok(by);
    }
    if let Some(admin) = auth::current_admin(conn)? {
        return Ok(admin.username);
    }
    Ok(setup::attendance_config(conn)?.recorded_by)
}

fn attendance_save(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let date = parse_date(&get_required_str(params, "date")?)?;
    let records = parse_records(params)?;
    let recorded_by = resolve_recorded_by(conn, params)?;
    let date_s = date.format("%Y-%m-%d").to_string();

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    {
        let mut exists_stmt = tx
            .prepare("SELECT 1 FROM students WHERE id = ?")
            .map_err(HandlerErr::query)?;
        let mut upsert = tx
            .prepare(
                "INSERT INTO attendance(
                   id, student_id, date, status, notes, recorded_by, created_at, updated_at
                 ) VALUES(?, ?, ?, ?, ?, ?,
                   strftime('%Y-%m-%dT%H:%M:%SZ','now'), strftime('%Y-%m-%dT%H:%M:%SZ','now'))
                 ON CONFLICT(student_id, date) DO UPDATE SET
                   status = excluded.status,
                   notes = excluded.notes,
                   recorded_by = excluded.recorded_by,
                   updated_at = excluded.updated_at",
            )
            .map_err(HandlerErr::query)?;
        for rec in &records {
            let known = exists_stmt
                .query_row([&rec.student_id], |r| r.get::<_, i64>(0))
                .optional()
                .map_err(HandlerErr::query)?
                .is_some();
            if !known {
                // Dropping the transaction rolls back whatever was written so far.
                return Err(HandlerErr::not_found(format!(
                    "student not found: {}",
                    rec.student_id
                )));
            }
            upsert
                .execute((
                    Uuid::new_v4().to_string(),
                    &rec.student_id,
                    &date_s,
                    rec.status.as_str(),
                    rec.notes.as_deref(),
                    &recorded_by,
                ))
                .map_err(|e| HandlerErr::update("attendance", e))?;
        }
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    let summary: StatusCounts = records.iter().map(|r| r.status).collect();
    tracing::info!(date = %date_s, saved = records.len(), recorded_by = %recorded_by, "attendance saved");
    Ok(json!({
        "date": date_s,
        "saved": records.len(),
        "recordedBy": recorded_by,
        "summary": summary
    }))
}

fn attendance_day_summary(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let date = date_or_today(params)?;
    let date_s = date.format("%Y-%m-%d").to_string();

    let total_students: i64 = conn
        .query_row("SELECT COUNT(*) FROM students WHERE is_active = 1", [], |r| {
            r.get(0)
        })
        .map_err(HandlerErr::query)?;
    let total_classes: i64 = conn
        .query_row("SELECT COUNT(*) FROM classes", [], |r| r.get(0))
        .map_err(HandlerErr::query)?;

    let mut stmt = conn
        .prepare(
            "SELECT a.status
             FROM attendance a
             JOIN students s ON s.id = a.student_id
             WHERE a.date = ? AND s.is_active = 1",
        )
        .map_err(HandlerErr::query)?;
    let statuses = stmt
        .query_map([&date_s], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    let counts: StatusCounts = statuses
        .iter()
        .filter_map(|s| AttendanceStatus::parse(s))
        .collect();

    Ok(json!({
        "date": date_s,
        "totalStudents": total_students,
        "totalClasses": total_classes,
        "counts": counts,
        "recorded": counts.total(),
        "percentage": calc::percentage(counts.hadir, total_students.max(0) as u32)
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "attendance.sheet" => Some(with_db(state, req, attendance_sheet)),
        "attendance.save" => Some(with_db(state, req, attendance_save)),
        "attendance.daySummary" => Some(with_db(state, req, attendance_day_summary)),
        _ => None,
    }
}
