use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::{DatasetKind, FileFormat, Row, UploadedDataset};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Invalid file type for '{0}'. Please upload CSV or Excel files.")]
    UnsupportedFileType(String),
}

// ---------------------------------------------------------------------------
// Validation result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ValidationStatus {
    /// Spreadsheet upload; checked by the optimizer, not locally.
    Accepted,
    Validated,
    /// Required columns are absent. Advisory, submission is not blocked.
    MissingColumns,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub kind: DatasetKind,
    pub missing_columns: BTreeSet<String>,
    pub is_valid: bool,
    pub status: ValidationStatus,
}

/// Header row and data rows of a comma-separated text upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

// ---------------------------------------------------------------------------
// Column contract
// ---------------------------------------------------------------------------

/// Required column keys per kind, exactly as the optimizer reads them.
/// Courses need name, lecturer and credit units (SKS); times need day and
/// start time; rooms need name and capacity. The preferences column is
/// advisory only.
pub fn required_columns(kind: DatasetKind) -> &'static [&'static str] {
    match kind {
        DatasetKind::Courses => &["nama", "dosen", "sks"],
        DatasetKind::Times => &["hari", "jam_mulai"],
        DatasetKind::Rooms => &["nama", "kapasitas"],
        DatasetKind::Preferences => &["dosen"],
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Split text into a header row and data rows. No quoting or escaping: every
/// comma is a separator.
pub fn parse_table(text: &str) -> ParsedTable {
    // Spreadsheet tools prefix "CSV UTF-8" exports with a byte order mark.
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.trim().split('\n').map(|l| l.trim_end_matches('\r'));

    let headers: Vec<String> = lines
        .next()
        .unwrap_or_default()
        .split(',')
        .map(|h| h.trim().to_string())
        .collect();

    let rows = lines
        .map(|line| {
            let mut values = line.split(',').map(str::trim);
            headers
                .iter()
                .map(|h| (h.clone(), values.next().unwrap_or_default().to_string()))
                .collect::<Row>()
        })
        .collect();

    ParsedTable { headers, rows }
}

// ---------------------------------------------------------------------------
// Validate implementation
// ---------------------------------------------------------------------------

/// Check parsed headers against the column contract for `kind`.
/// `missing_columns` is always `required - headers`; only non-preference
/// kinds turn a non-empty difference into a warning.
pub fn validate(kind: DatasetKind, headers: &[String]) -> ValidationOutcome {
    let present: BTreeSet<&str> = headers.iter().map(String::as_str).collect();
    let missing_columns: BTreeSet<String> = required_columns(kind)
        .iter()
        .filter(|col| !present.contains(*col))
        .map(|col| col.to_string())
        .collect();

    let blocking = !missing_columns.is_empty() && kind != DatasetKind::Preferences;
    ValidationOutcome {
        kind,
        missing_columns,
        is_valid: !blocking,
        status: if blocking {
            ValidationStatus::MissingColumns
        } else {
            ValidationStatus::Validated
        },
    }
}

/// Accept one uploaded file for `kind`: reject unknown extensions, parse CSV
/// content, and validate its header row. Spreadsheets are stored unparsed.
pub fn validate_upload(
    kind: DatasetKind,
    file_name: &str,
    raw: Vec<u8>,
) -> Result<(UploadedDataset, ValidationOutcome), UploadError> {
    let format = FileFormat::from_file_name(file_name)
        .ok_or_else(|| UploadError::UnsupportedFileType(file_name.to_string()))?;

    if format.is_spreadsheet() {
        let outcome = ValidationOutcome {
            kind,
            missing_columns: BTreeSet::new(),
            is_valid: true,
            status: ValidationStatus::Accepted,
        };
        let dataset = UploadedDataset {
            kind,
            file_name: file_name.to_string(),
            format,
            raw,
            parsed_headers: Vec::new(),
            parsed_rows: Vec::new(),
        };
        return Ok((dataset, outcome));
    }

    let table = parse_table(&String::from_utf8_lossy(&raw));
    let outcome = validate(kind, &table.headers);
    let dataset = UploadedDataset {
        kind,
        file_name: file_name.to_string(),
        format,
        raw,
        parsed_headers: table.headers,
        parsed_rows: table.rows,
    };
    Ok((dataset, outcome))
}

/// Human-readable byte size, e.g. `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let exp = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exp as i32);
    // Two decimals at most, trailing zeros dropped.
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exp])
}
