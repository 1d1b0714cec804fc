use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::RowDefect;

use super::loader::RawTable;
use super::model::{Record, Table, Value};
use super::schema::DomainSchema;

// ---------------------------------------------------------------------------
// Normalized output
// ---------------------------------------------------------------------------

/// A cleaned table plus the rows that were excluded while cleaning it.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub table: Table,
    pub dropped: Vec<RowDefect>,
}

impl Normalized {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }
}

/// Timestamp layouts accepted for the date column, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Tokens treated as "no value" in numeric columns.
const MISSING_TOKENS: &[&str] = &["", "na", "n/a", "nan", "null", "none", "-"];

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Clean one raw source table.
///
/// * column names are trimmed
/// * key columns present in the header are required per row; a row with an
///   empty text key, an unparsable year or an unparsable timestamp is
///   dropped and reported in [`Normalized::dropped`]
/// * designated metric columns are coerced to floats, with `Missing` for
///   anything unparsable (the row is kept)
/// * remaining columns get a best-effort type guess
pub fn normalize(raw: &RawTable, schema: &DomainSchema) -> Normalized {
    let columns: Vec<String> = raw.headers.iter().map(|h| h.trim().to_string()).collect();

    let mut records = Vec::with_capacity(raw.rows.len());
    let mut dropped = Vec::new();

    for (row_no, row) in raw.rows.iter().enumerate() {
        match normalize_row(row_no, &columns, row, schema) {
            Ok(record) => records.push(record),
            Err(defect) => {
                log::debug!("{}: dropping {defect}", raw.source);
                dropped.push(defect);
            }
        }
    }

    if !dropped.is_empty() {
        log::warn!(
            "{}: dropped {} of {} rows with malformed keys",
            raw.source,
            dropped.len(),
            raw.rows.len()
        );
    }

    // Duplicate trimmed headers collapse to one column (last cell wins).
    let mut unique_columns: Vec<String> = Vec::with_capacity(columns.len());
    for col in columns {
        if !unique_columns.contains(&col) {
            unique_columns.push(col);
        }
    }

    Normalized {
        table: Table::new(schema.domain, unique_columns, records),
        dropped,
    }
}

fn normalize_row(
    row_no: usize,
    columns: &[String],
    row: &[String],
    schema: &DomainSchema,
) -> Result<Record, RowDefect> {
    let defect = |column: &str, message: String| RowDefect {
        row: row_no,
        column: column.to_string(),
        message,
    };

    // Cells beyond the end of a short row are treated as empty.
    let mut cells = BTreeMap::new();
    for (i, col) in columns.iter().enumerate() {
        let cell = row.get(i).map_or("", |c| c.trim());
        let value = if schema.text_keys.contains(col) {
            if cell.is_empty() {
                return Err(defect(col, "empty key".into()));
            }
            Value::Text(cell.to_string())
        } else if schema.integer_keys.contains(col) {
            let n = parse_integer(cell)
                .ok_or_else(|| defect(col, format!("'{cell}' is not an integer")))?;
            Value::Integer(n)
        } else if schema.date_column.as_deref() == Some(col.as_str()) {
            let ts = parse_datetime(cell)
                .ok_or_else(|| defect(col, format!("'{cell}' is not a date-time")))?;
            Value::DateTime(ts)
        } else if schema.is_metric(col) {
            coerce_numeric(cell)
        } else {
            guess_type(cell)
        };
        cells.insert(col.clone(), value);
    }
    Ok(Record::new(cells))
}

// ---------------------------------------------------------------------------
// Cell parsers
// ---------------------------------------------------------------------------

/// Parse an integer, accepting a float with no fractional part (`2015.0`).
pub fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(i);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
        _ => None,
    }
}

/// Parse a timestamp in any of the accepted layouts; a bare date is
/// midnight. Offsets (RFC 3339) are dropped in favour of local wall time.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Coerce a metric cell: finite number or `Missing`.
pub fn coerce_numeric(s: &str) -> Value {
    let s = s.trim();
    if MISSING_TOKENS.contains(&s.to_ascii_lowercase().as_str()) {
        return Value::Missing;
    }
    match s.replace(',', "").parse::<f64>() {
        Ok(f) if f.is_finite() => Value::Float(f),
        _ => Value::Missing,
    }
}

fn guess_type(s: &str) -> Value {
    if s.is_empty() {
        return Value::Missing;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() {
            return Value::Float(f);
        }
    }
    Value::Text(s.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
