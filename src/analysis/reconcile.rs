use std::collections::HashMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::data::model::{Domain, Record, Table, Value};
use crate::data::schema::{DomainSchema, COL_YEAR};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Join key derivation
// ---------------------------------------------------------------------------

/// Expose the integer `Year` join key on a table.
///
/// Air-quality tables already carry it. Weather tables get it from the
/// calendar year of the timestamp; rows without a timestamp get `Missing`.
pub fn derive_year(table: &Table, schema: &DomainSchema) -> Result<Table> {
    if table.has_column(COL_YEAR) {
        return Ok(table.clone());
    }
    let date_col = schema
        .date_column
        .as_deref()
        .ok_or_else(|| PipelineError::schema_mismatch(table.domain, COL_YEAR))?;
    table.require_columns(&[date_col])?;

    let mut columns = table.columns.clone();
    let pos = columns
        .iter()
        .position(|c| c == date_col)
        .map(|p| p + 1)
        .unwrap_or(columns.len());
    columns.insert(pos, COL_YEAR.to_string());

    let records = table
        .records
        .iter()
        .map(|r| {
            let mut r = r.clone();
            let year = r
                .get(date_col)
                .as_datetime()
                .map(|ts| Value::Integer(i64::from(ts.year())))
                .unwrap_or(Value::Missing);
            r.cells.insert(COL_YEAR.to_string(), year);
            r
        })
        .collect();

    Ok(Table {
        domain: table.domain,
        columns,
        records,
    })
}

// ---------------------------------------------------------------------------
// Inner join on year
// ---------------------------------------------------------------------------

/// An additional equality key between the two sides, e.g. `County` on the
/// air-quality side against `Location` on the weather side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinColumns {
    pub left: String,
    pub right: String,
}

fn suffix(domain: Domain) -> &'static str {
    match domain {
        Domain::AirQuality => "_aq",
        Domain::Weather => "_weather",
        Domain::Merged => "_merged",
    }
}

/// Inner-join two tables on `Year` (and optionally on `extra`).
///
/// Rows with no partner on the other side, or with a missing key, are
/// dropped. `extra` is used only when both tables carry their column.
/// Non-key names present on both sides are suffixed with `_aq` / `_weather`.
/// Output order: left rows in order, each followed by its partners in
/// right order.
pub fn reconcile(left: &Table, right: &Table, extra: Option<&JoinColumns>) -> Result<Table> {
    left.require_columns(&[COL_YEAR])?;
    right.require_columns(&[COL_YEAR])?;

    let extra = extra.filter(|j| {
        let usable = left.has_column(&j.left) && right.has_column(&j.right);
        if !usable {
            log::info!(
                "joining on year only: '{}'/'{}' not carried by both sides",
                j.left,
                j.right
            );
        }
        usable
    });

    // Name mapping: (source column, output column) per side.
    let shared_extra = extra.filter(|j| j.left == j.right).map(|j| j.left.as_str());
    let is_key = |c: &str| c == COL_YEAR || Some(c) == shared_extra;

    let left_map: Vec<(&String, String)> = left
        .columns
        .iter()
        .filter(|c| c.as_str() != COL_YEAR)
        .map(|c| {
            let out = if !is_key(c.as_str()) && right.has_column(c) {
                format!("{c}{}", suffix(left.domain))
            } else {
                c.clone()
            };
            (c, out)
        })
        .collect();
    let right_map: Vec<(&String, String)> = right
        .columns
        .iter()
        .filter(|c| !is_key(c.as_str()))
        .map(|c| {
            let out = if left.has_column(c) {
                format!("{c}{}", suffix(right.domain))
            } else {
                c.clone()
            };
            (c, out)
        })
        .collect();

    let mut columns = vec![COL_YEAR.to_string()];
    columns.extend(left_map.iter().map(|(_, out)| out.clone()));
    columns.extend(right_map.iter().map(|(_, out)| out.clone()));

    let key_of = |r: &Record, extra_col: Option<&str>| -> Option<(i32, Option<String>)> {
        let year = r.year()?;
        match extra_col {
            Some(col) => Some((year, Some(r.text(col)?.to_string()))),
            None => Some((year, None)),
        }
    };

    let mut index: HashMap<(i32, Option<String>), Vec<&Record>> = HashMap::new();
    for r in &right.records {
        if let Some(k) = key_of(r, extra.map(|j| j.right.as_str())) {
            index.entry(k).or_default().push(r);
        }
    }

    let mut records = Vec::new();
    for l in &left.records {
        let Some(k) = key_of(l, extra.map(|j| j.left.as_str())) else {
            continue;
        };
        let Some(partners) = index.get(&k) else {
            continue;
        };
        for r in partners {
            let mut cells = std::collections::BTreeMap::new();
            cells.insert(COL_YEAR.to_string(), Value::Integer(i64::from(k.0)));
            for (src, out) in &left_map {
                cells.insert(out.clone(), l.get(src).clone());
            }
            for (src, out) in &right_map {
                cells.insert(out.clone(), r.get(src).clone());
            }
            records.push(Record::new(cells));
        }
    }

    log::info!(
        "reconciled {} {} rows with {} {} rows into {} merged rows",
        left.len(),
        left.domain,
        right.len(),
        right.domain,
        records.len()
    );

    Ok(Table {
        domain: Domain::Merged,
        columns,
        records,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
