// Spreadsheet I/O for the roster and the monthly report.
//
// Reading goes through calamine (xlsx and legacy xls), writing through
// rust_xlsxwriter (xlsx only).

use anyhow::{anyhow, Context};
use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;

use crate::calc::ReportRow;
use crate::roster_import::{number_text, TEMPLATE_HEADER};

pub const ACCEPTED_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

const TEMPLATE_EXAMPLES: [[&str; 4]; 2] = [
    ["12345", "Ahmad Fauzi", "7A", "Laki-laki"],
    ["12346", "Siti Nurhaliza", "7B", "Perempuan"],
];

pub struct RosterExportRow {
    pub nis: String,
    pub name: String,
    pub class_name: String,
    pub gender: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
}

/// Checks extension and size before anything is parsed.
pub fn check_upload(path: &Path, max_bytes: u64) -> anyhow::Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(anyhow!("file harus berformat .xlsx atau .xls"));
    }
    let meta = std::fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.to_string_lossy()))?;
    if meta.len() > max_bytes {
        return Err(anyhow!(
            "ukuran file {} byte melebihi batas {} byte",
            meta.len(),
            max_bytes
        ));
    }
    Ok(())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        // NIS columns typed as numbers come back as floats.
        Data::Float(f) => number_text(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{:?}", e),
    }
}

/// Rows of the first worksheet as trimmed strings, header included.
pub struct SheetRows {
    /// 1-based spreadsheet row of `rows[0]`.
    pub first_row: usize,
    pub rows: Vec<Vec<String>>,
}

pub fn read_first_sheet(path: &Path) -> anyhow::Result<SheetRows> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open spreadsheet {}", path.to_string_lossy()))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("spreadsheet contains no sheets"))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("failed to read sheet {}", sheet_name))?;

    // The range begins at the first non-empty cell, not at A1.
    let first_row = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);
    Ok(SheetRows {
        first_row,
        rows: range
            .rows()
            .map(|r| r.iter().map(cell_text).collect())
            .collect(),
    })
}

fn write_header(ws: &mut Worksheet, header: &[&str]) -> anyhow::Result<()> {
    let bold = Format::new().set_bold();
    for (col, label) in header.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, *label, &bold)?;
        ws.set_column_width(col as u16, 20)?;
    }
    Ok(())
}

fn save(workbook: &mut Workbook, out_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    workbook
        .save(out_path)
        .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))?;
    Ok(())
}

/// Import template: fixed header row followed by two example rows.
pub fn write_template(out_path: &Path) -> anyhow::Result<usize> {
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name("Template Siswa")?;
    write_header(ws, &TEMPLATE_HEADER)?;
    for (i, example) in TEMPLATE_EXAMPLES.iter().enumerate() {
        let row = (i + 1) as u32;
        for (col, value) in example.iter().enumerate() {
            ws.write_string(row, col as u16, *value)?;
        }
    }
    save(&mut workbook, out_path)?;
    Ok(TEMPLATE_EXAMPLES.len())
}

/// Roster export. The first four columns match the import template so the
/// file can be edited and imported back.
pub fn write_roster(out_path: &Path, rows: &[RosterExportRow]) -> anyhow::Result<usize> {
    let mut header: Vec<&str> = TEMPLATE_HEADER.to_vec();
    header.extend(["No. HP", "Alamat", "Nama Orang Tua", "No. HP Orang Tua"]);

    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name("Data Siswa")?;
    write_header(ws, &header)?;
    for (i, s) in rows.iter().enumerate() {
        let row = (i + 1) as u32;
        let cells = [
            Some(s.nis.as_str()),
            Some(s.name.as_str()),
            Some(s.class_name.as_str()),
            Some(s.gender.as_str()),
            s.phone.as_deref(),
            s.address.as_deref(),
            s.parent_name.as_deref(),
            s.parent_phone.as_deref(),
        ];
        for (col, value) in cells.iter().enumerate() {
            if let Some(v) = value {
                ws.write_string(row, col as u16, *v)?;
            }
        }
    }
    save(&mut workbook, out_path)?;
    Ok(rows.len())
}

pub fn write_monthly_report(
    out_path: &Path,
    title: &str,
    rows: &[ReportRow],
) -> anyhow::Result<usize> {
    let header = [
        "NIS",
        "Nama",
        "Kelas",
        "Hari Efektif",
        "Hadir",
        "Izin",
        "Sakit",
        "Alpha",
        "Persentase (%)",
    ];

    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name("Rekap")?;
    ws.write_string_with_format(0, 0, title, &Format::new().set_bold())?;
    // Title on row 0, table header on row 2.
    let bold = Format::new().set_bold();
    for (col, label) in header.iter().enumerate() {
        ws.write_string_with_format(2, col as u16, *label, &bold)?;
        ws.set_column_width(col as u16, if col == 1 { 30 } else { 14 })?;
    }
    for (i, r) in rows.iter().enumerate() {
        let row = (i + 3) as u32;
        ws.write_string(row, 0, &r.student_nis)?;
        ws.write_string(row, 1, &r.student_name)?;
        ws.write_string(row, 2, &r.class_name)?;
        ws.write_number(row, 3, r.total_days as f64)?;
        ws.write_number(row, 4, r.counts.hadir as f64)?;
        ws.write_number(row, 5, r.counts.izin as f64)?;
        ws.write_number(row, 6, r.counts.sakit as f64)?;
        ws.write_number(row, 7, r.counts.alpha as f64)?;
        ws.write_number(row, 8, r.percentage as f64)?;
    }
    save(&mut workbook, out_path)?;
    Ok(rows.len())
}
