use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Hadir,
    Izin,
    Sakit,
    Alpha,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 4] = [
        AttendanceStatus::Hadir,
        AttendanceStatus::Izin,
        AttendanceStatus::Sakit,
        AttendanceStatus::Alpha,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Hadir" => Some(Self::Hadir),
            "Izin" => Some(Self::Izin),
            "Sakit" => Some(Self::Sakit),
            "Alpha" => Some(Self::Alpha),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hadir => "Hadir",
            Self::Izin => "Izin",
            Self::Sakit => "Sakit",
            Self::Alpha => "Alpha",
        }
    }
}

/// Per-status tallies. Serialized with the lowercase keys the report screens use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub hadir: u32,
    pub izin: u32,
    pub sakit: u32,
    pub alpha: u32,
}

impl StatusCounts {
    pub fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Hadir => self.hadir += 1,
            AttendanceStatus::Izin => self.izin += 1,
            AttendanceStatus::Sakit => self.sakit += 1,
            AttendanceStatus::Alpha => self.alpha += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.hadir + self.izin + self.sakit + self.alpha
    }
}

impl FromIterator<AttendanceStatus> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = AttendanceStatus>>(iter: I) -> Self {
        let mut counts = StatusCounts::default();
        for s in iter {
            counts.add(s);
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// First and last calendar day of `month` (1-based) in `year`.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), CalcError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| CalcError::new("bad_params", "month must be between 1 and 12"))?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| CalcError::new("bad_params", "year out of range"))?;
    let last = next_first
        .pred_opt()
        .ok_or_else(|| CalcError::new("bad_params", "year out of range"))?;
    Ok((first, last))
}

/// Monday through Friday in the month. There is no holiday calendar.
pub fn working_days_in_month(year: i32, month: u32) -> Result<u32, CalcError> {
    let (first, last) = month_bounds(year, month)?;
    Ok(first
        .iter_days()
        .take_while(|d| *d <= last)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .count() as u32)
}

/// `round(part / whole * 100)`, or 0 when there is nothing to divide by.
pub fn percentage(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as u32
}

#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub id: String,
    pub nis: String,
    pub name: String,
    pub class_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AttendanceRow {
    pub student_id: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub student_id: String,
    pub student_name: String,
    pub student_nis: String,
    pub class_name: String,
    pub total_days: u32,
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub percentage: u32,
}

/// One row per roster entry, in roster order. Attendance rows for students not
/// on the roster are ignored.
///
/// The percentage is taken against the full weekday count of the month, not
/// against the days that actually have a record.
pub fn monthly_report(
    roster: &[RosterEntry],
    rows: &[AttendanceRow],
    working_days: u32,
) -> Vec<ReportRow> {
    let mut by_student: HashMap<&str, StatusCounts> = HashMap::new();
    for row in rows {
        by_student
            .entry(row.student_id.as_str())
            .or_default()
            .add(row.status);
    }

    roster
        .iter()
        .map(|s| {
            let counts = by_student.get(s.id.as_str()).copied().unwrap_or_default();
            ReportRow {
                student_id: s.id.clone(),
                student_name: s.name.clone(),
                student_nis: s.nis.clone(),
                class_name: s
                    .class_name
                    .clone()
                    .unwrap_or_else(|| "Unknown".to_string()),
                total_days: working_days,
                counts,
                percentage: percentage(counts.hadir, working_days),
            }
        })
        .collect()
}
