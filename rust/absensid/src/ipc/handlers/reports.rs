use crate::calc::{self, AttendanceRow, AttendanceStatus, CalcError, ReportRow, RosterEntry};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_optional_str, get_required_i64, get_required_str, with_db};
use crate::ipc::types::{AppState, Request};
use crate::xlsx;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::{json, Value};
use std::path::PathBuf;

const MONTH_NAMES: [&str; 12] = [
    "Januari",
    "Februari",
    "Maret",
    "April",
    "Mei",
    "Juni",
    "Juli",
    "Agustus",
    "September",
    "Oktober",
    "November",
    "Desember",
];

fn calc_err(e: CalcError) -> HandlerErr {
    HandlerErr::new("bad_params", e.message).with_details(json!({ "calcCode": e.code }))
}

struct MonthlyReport {
    year: i32,
    month: u32,
    working_days: u32,
    rows: Vec<ReportRow>,
}

fn parse_period(params: &Value) -> Result<(i32, u32), HandlerErr> {
    let year = get_required_i64(params, "year")?;
    let month = get_required_i64(params, "month")?;
    if !(1..=12).contains(&month) {
        return Err(HandlerErr::bad_params("month must be between 1 and 12"));
    }
    let year = i32::try_from(year).map_err(|_| HandlerErr::bad_params("year out of range"))?;
    Ok((year, month as u32))
}

fn load_roster(conn: &Connection, class_id: Option<&str>) -> Result<Vec<RosterEntry>, HandlerErr> {
    let mut sql = String::from(
        "SELECT s.id, s.student_id, s.name, c.name
         FROM students s
         LEFT JOIN classes c ON c.id = s.class_id
         WHERE s.is_active = 1",
    );
    let mut bind: Vec<SqlValue> = Vec::new();
    if let Some(cid) = class_id {
        sql.push_str(" AND s.class_id = ?");
        bind.push(SqlValue::Text(cid.to_string()));
    }
    sql.push_str(" ORDER BY s.name");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    stmt.query_map(params_from_iter(bind), |r| {
        Ok(RosterEntry {
            id: r.get(0)?,
            nis: r.get(1)?,
            name: r.get(2)?,
            class_name: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::query)
}

fn load_month_rows(
    conn: &Connection,
    first: &str,
    last: &str,
) -> Result<Vec<AttendanceRow>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT student_id, status FROM attendance WHERE date >= ? AND date <= ?")
        .map_err(HandlerErr::query)?;
    let raw = stmt
        .query_map((first, last), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    // The CHECK constraint keeps unknown statuses out of the table.
    Ok(raw
        .into_iter()
        .filter_map(|(student_id, status)| {
            AttendanceStatus::parse(&status).map(|status| AttendanceRow { student_id, status })
        })
        .collect())
}

fn build_monthly(conn: &Connection, params: &Value) -> Result<MonthlyReport, HandlerErr> {
    let (year, month) = parse_period(params)?;
    let class_id = get_optional_str(params, "classId")?.filter(|c| c != "all");

    let (first, last) = calc::month_bounds(year, month).map_err(calc_err)?;
    let working_days = calc::working_days_in_month(year, month).map_err(calc_err)?;
    let roster = load_roster(conn, class_id.as_deref())?;
    let rows = load_month_rows(
        conn,
        &first.format("%Y-%m-%d").to_string(),
        &last.format("%Y-%m-%d").to_string(),
    )?;

    Ok(MonthlyReport {
        year,
        month,
        working_days,
        rows: calc::monthly_report(&roster, &rows, working_days),
    })
}

fn reports_monthly(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let report = build_monthly(conn, params)?;
    Ok(json!({
        "year": report.year,
        "month": report.month,
        "workingDays": report.working_days,
        "rows": report.rows
    }))
}

fn reports_monthly_export_xlsx(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let out = PathBuf::from(get_required_str(params, "outPath")?);
    let report = build_monthly(conn, params)?;
    let title = format!(
        "Rekap Kehadiran {} {} ({} hari efektif)",
        MONTH_NAMES[(report.month - 1) as usize],
        report.year,
        report.working_days
    );
    let n = xlsx::write_monthly_report(&out, &title, &report.rows)
        .map_err(|e| HandlerErr::new("export_failed", format!("{e:#}")))?;
    tracing::info!(path = %out.display(), rows = n, "monthly report exported");
    Ok(json!({ "path": out.to_string_lossy(), "rowsExported": n }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "reports.monthly" => Some(with_db(state, req, reports_monthly)),
        "reports.monthlyExportXlsx" => Some(with_db(state, req, reports_monthly_export_xlsx)),
        _ => None,
    }
}
