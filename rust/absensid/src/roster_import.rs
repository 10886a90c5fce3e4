//! Validation of spreadsheet rows before they are upserted into the roster.
//!
//! The first row is the header. Data rows are checked independently; a bad row
//! never stops the others from being imported, but a header that lacks one of
//! the four required columns stops everything.

use std::collections::{HashMap, HashSet};

pub const MIN_NAME_CHARS: usize = 2;
pub const MAX_NAME_CHARS: usize = 100;

pub const TEMPLATE_HEADER: [&str; 4] = ["NIS", "Nama Lengkap", "Kelas", "Jenis Kelamin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Nis,
    Name,
    Class,
    Gender,
}

impl Column {
    pub fn label(self) -> &'static str {
        match self {
            Column::Nis => "NIS",
            Column::Name => "Nama Lengkap",
            Column::Class => "Kelas",
            Column::Gender => "Jenis Kelamin",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::Nis => &["nis"],
            Column::Name => &["nama", "name"],
            Column::Class => &["kelas", "class"],
            Column::Gender => &["jenis kelamin", "gender"],
        }
    }
}

// "jenis kelamin" contains "nis", so gender has to claim its cell first.
const MATCH_ORDER: [Column; 4] = [Column::Gender, Column::Name, Column::Class, Column::Nis];

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("file tidak berisi baris header")]
    Empty,
    #[error("kolom wajib tidak ditemukan: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub nis: usize,
    pub name: usize,
    pub class: usize,
    pub gender: usize,
}

pub fn map_header(header: &[String]) -> Result<ColumnMap, ImportError> {
    let cells: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
    let mut taken: HashSet<usize> = HashSet::new();
    let mut found: HashMap<&'static str, usize> = HashMap::new();

    for col in MATCH_ORDER {
        let hit = cells.iter().enumerate().find(|(i, cell)| {
            !taken.contains(i) && col.aliases().iter().any(|a| cell.contains(a))
        });
        if let Some((i, _)) = hit {
            taken.insert(i);
            found.insert(col.label(), i);
        }
    }

    let lookup = |col: Column| found.get(col.label()).copied();
    match (
        lookup(Column::Nis),
        lookup(Column::Name),
        lookup(Column::Class),
        lookup(Column::Gender),
    ) {
        (Some(nis), Some(name), Some(class), Some(gender)) => Ok(ColumnMap {
            nis,
            name,
            class,
            gender,
        }),
        _ => {
            let missing = [Column::Nis, Column::Name, Column::Class, Column::Gender]
                .into_iter()
                .filter(|c| lookup(*c).is_none())
                .map(|c| c.label().to_string())
                .collect();
            Err(ImportError::MissingColumns(missing))
        }
    }
}

pub fn normalize_gender(raw: &str) -> Option<&'static str> {
    match raw.trim().to_lowercase().as_str() {
        "laki-laki" | "l" => Some("Laki-laki"),
        "perempuan" | "p" => Some("Perempuan"),
        _ => None,
    }
}

/// Cell text for a numeric value. Whole numbers print without a fractional
/// part, so a NIS stored as a number reads back as digits.
pub fn number_text(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Comparison key for class names: case-folded with all whitespace removed.
pub fn class_key(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone)]
pub struct KnownClass {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportCandidate {
    pub row_number: usize,
    pub nis: String,
    pub name: String,
    pub class_id: String,
    pub gender: &'static str,
    pub reactivates: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ImportPlan {
    pub candidates: Vec<ImportCandidate>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub rejected_rows: usize,
    pub skipped_rows: usize,
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|s| s.trim()).unwrap_or("")
}

/// Validates every data row. `header_row` is the 1-based spreadsheet row the
/// header sits on; reported row numbers count from it. `existing` maps NIS to
/// the `is_active` flag of roster entries already in the store.
pub fn plan_import(
    rows: &[Vec<String>],
    header_row: usize,
    classes: &[KnownClass],
    existing: &HashMap<String, bool>,
) -> Result<ImportPlan, ImportError> {
    let Some((header, data)) = rows.split_first() else {
        return Err(ImportError::Empty);
    };
    let cols = map_header(header)?;

    // `None` marks a key shared by more than one class.
    let mut class_ids: HashMap<String, Option<&str>> = HashMap::new();
    for c in classes {
        class_ids
            .entry(class_key(&c.name))
            .and_modify(|id| *id = None)
            .or_insert(Some(c.id.as_str()));
    }

    let mut plan = ImportPlan::default();
    let mut seen_nis: HashSet<String> = HashSet::new();

    for (i, row) in data.iter().enumerate() {
        let row_number = header_row + i + 1;
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }

        let nis = cell(row, cols.nis);
        let name = cell(row, cols.name);
        let class_name = cell(row, cols.class);
        let gender_raw = cell(row, cols.gender);

        let missing: Vec<&str> = [
            (Column::Nis, nis),
            (Column::Name, name),
            (Column::Class, class_name),
            (Column::Gender, gender_raw),
        ]
        .iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(c, _)| c.label())
        .collect();
        if !missing.is_empty() {
            plan.errors
                .push(format!("Baris {}: {} wajib diisi", row_number, missing.join(", ")));
            plan.rejected_rows += 1;
            continue;
        }

        let mut row_errors: Vec<String> = Vec::new();
        if !nis.chars().all(|c| c.is_ascii_digit()) {
            row_errors.push(format!("Baris {}: NIS harus berupa angka", row_number));
        }
        let gender = normalize_gender(gender_raw);
        if gender.is_none() {
            row_errors.push(format!(
                "Baris {}: Jenis kelamin \"{}\" tidak valid (gunakan Laki-laki/Perempuan atau L/P)",
                row_number, gender_raw
            ));
        }
        let class_id = match class_ids.get(&class_key(class_name)) {
            Some(Some(id)) => Some(*id),
            Some(None) => {
                row_errors.push(format!(
                    "Baris {}: Kelas \"{}\" ambigu (lebih dari satu kelas cocok)",
                    row_number, class_name
                ));
                None
            }
            None => {
                row_errors.push(format!(
                    "Baris {}: Kelas \"{}\" tidak ditemukan",
                    row_number, class_name
                ));
                None
            }
        };
        let name_len = name.chars().count();
        if !(MIN_NAME_CHARS..=MAX_NAME_CHARS).contains(&name_len) {
            row_errors.push(format!(
                "Baris {}: Nama harus {}-{} karakter",
                row_number, MIN_NAME_CHARS, MAX_NAME_CHARS
            ));
        }

        let (Some(gender), Some(class_id)) = (gender, class_id) else {
            plan.errors.extend(row_errors);
            plan.rejected_rows += 1;
            continue;
        };
        if !row_errors.is_empty() {
            plan.errors.extend(row_errors);
            plan.rejected_rows += 1;
            continue;
        }

        if seen_nis.contains(nis) {
            plan.errors.push(format!(
                "Baris {}: NIS {} duplikat di dalam file",
                row_number, nis
            ));
            plan.rejected_rows += 1;
            continue;
        }

        let reactivates = match existing.get(nis) {
            Some(true) => {
                plan.warnings.push(format!(
                    "Baris {}: NIS {} sudah terdaftar dan aktif, dilewati",
                    row_number, nis
                ));
                plan.skipped_rows += 1;
                continue;
            }
            Some(false) => true,
            None => false,
        };

        seen_nis.insert(nis.to_string());
        plan.candidates.push(ImportCandidate {
            row_number,
            nis: nis.to_string(),
            name: name.to_string(),
            class_id: class_id.to_string(),
            gender,
            reactivates,
        });
    }

    Ok(plan)
}

/// First `limit` errors plus how many were left out.
pub fn error_preview(errors: &[String], limit: usize) -> (Vec<String>, usize) {
    let shown: Vec<String> = errors.iter().take(limit).cloned().collect();
    let more = errors.len().saturating_sub(shown.len());
    (shown, more)
}
