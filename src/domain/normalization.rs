//! Parsing of uploaded normalization tables.
//!
//! The whole file is parsed and validated before anything touches storage, so a
//! bad row anywhere rejects the upload and leaves the stored table untouched.

use crate::domain::models::NewNormalizationEntry;
use crate::error::ApiError;

pub const REQUIRED_COLUMNS: [&str; 4] = ["age", "sex", "raw_score", "normalized_score"];

/// Upload gate: a `.csv` file name or a CSV-ish content type.
pub fn is_delimited_text(file_name: Option<&str>, content_type: Option<&str>) -> bool {
    let by_name = file_name
        .map(|n| n.to_ascii_lowercase().ends_with(".csv"))
        .unwrap_or(false);
    let by_type = content_type
        .map(|t| {
            let t = t.to_ascii_lowercase();
            t.starts_with("text/csv") || t.starts_with("application/csv")
        })
        .unwrap_or(false);
    by_name || by_type
}

pub fn parse_table(bytes: &[u8]) -> Result<Vec<NewNormalizationEntry>, ApiError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| ApiError::MalformedRow {
            line: 1,
            reason: e.to_string(),
        })?
        .clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::MalformedRow {
            line: 1,
            reason: format!("missing column(s): {}", missing.join(", ")),
        });
    }

    // The reader skips blank lines; report the record's own line.
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ApiError::MalformedRow {
            line: e.position().map(|p| p.line()).unwrap_or(0),
            reason: describe(&e),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let row: NewNormalizationEntry = record
            .deserialize(Some(&headers))
            .map_err(|e| ApiError::MalformedRow { line, reason: describe(&e) })?;
        if row.sex.is_empty() {
            return Err(ApiError::MalformedRow {
                line,
                reason: "sex must not be empty".to_string(),
            });
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(ApiError::MalformedRow {
            line: 2,
            reason: "table has no rows".to_string(),
        });
    }
    Ok(rows)
}

fn describe(err: &csv::Error) -> String {
    match err.kind() {
        csv::ErrorKind::Deserialize { err, .. } => match err.field() {
            Some(idx) => format!("column {}: {}", idx + 1, err.kind()),
            None => err.kind().to_string(),
        },
        _ => err.to_string(),
    }
}
