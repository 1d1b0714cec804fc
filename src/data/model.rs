use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{Datelike, NaiveDateTime};

use crate::error::{PipelineError, Result};

use super::schema::{DomainSchema, COL_COUNTY, COL_LOCATION, COL_STATE, COL_YEAR};

// ---------------------------------------------------------------------------
// Value – a single typed cell
// ---------------------------------------------------------------------------

/// A dynamically-typed cell mirroring the column types found in the source
/// files. `Missing` is the missing-value marker.
#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Missing,
}

// -- Manual Eq/Ord so Value can be a BTreeMap key / BTreeSet member --

/// Equality follows [`Ord`]: `Integer(2) == Float(2.0)`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Missing => 0,
                Integer(_) | Float(_) => 1,
                DateTime(_) => 2,
                Text(_) => 3,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Missing, Missing) => std::cmp::Ordering::Equal,
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Integer(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Integer(b)) => a.total_cmp(&(*b as f64)),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v:.4}"),
            Value::DateTime(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S")),
            Value::Missing => Ok(()),
        }
    }
}

impl Value {
    /// Numeric view of the cell; `None` for text, dates and missing cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// `Float(v)` for a present value, `Missing` otherwise.
    pub fn from_option(v: Option<f64>) -> Self {
        v.map(Value::Float).unwrap_or(Value::Missing)
    }
}

// ---------------------------------------------------------------------------
// Domain tag
// ---------------------------------------------------------------------------

/// Which source category a table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    AirQuality,
    Weather,
    /// Output of the key reconciler (both domains side by side).
    Merged,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::AirQuality => write!(f, "air-quality"),
            Domain::Weather => write!(f, "weather"),
            Domain::Merged => write!(f, "merged"),
        }
    }
}

// ---------------------------------------------------------------------------
// Record – one row of a table
// ---------------------------------------------------------------------------

/// One row: column name → typed value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub cells: BTreeMap<String, Value>,
}

static MISSING: Value = Value::Missing;

impl Record {
    pub fn new(cells: BTreeMap<String, Value>) -> Self {
        Record { cells }
    }

    /// Cell value, `Missing` when the column is absent.
    pub fn get(&self, column: &str) -> &Value {
        self.cells.get(column).unwrap_or(&MISSING)
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).as_f64()
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).as_str()
    }

    pub fn year(&self) -> Option<i32> {
        self.get(COL_YEAR).as_i64().and_then(|y| i32::try_from(y).ok())
    }
}

/// Air-quality view of a record: `State`, `County`, `Year` plus metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct AirQualityRecord<'a> {
    pub region: &'a str,
    pub subregion: &'a str,
    pub year: i32,
    pub metrics: BTreeMap<&'a str, Option<f64>>,
}

impl<'a> AirQualityRecord<'a> {
    /// Returns `None` when any key cell is missing.
    pub fn from_record(record: &'a Record, schema: &'a DomainSchema) -> Option<Self> {
        Some(AirQualityRecord {
            region: record.text(COL_STATE)?,
            subregion: record.text(COL_COUNTY)?,
            year: record.year()?,
            metrics: schema
                .metrics
                .iter()
                .map(|m| (m.as_str(), record.number(m)))
                .collect(),
        })
    }
}

/// Weather view of a record: `Location` and timestamp plus metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRecord<'a> {
    pub location: &'a str,
    pub timestamp: NaiveDateTime,
    pub metrics: BTreeMap<&'a str, Option<f64>>,
}

impl<'a> WeatherRecord<'a> {
    pub fn from_record(record: &'a Record, schema: &'a DomainSchema) -> Option<Self> {
        let date_col = schema.date_column.as_deref()?;
        Some(WeatherRecord {
            location: record.text(COL_LOCATION)?,
            timestamp: record.get(date_col).as_datetime()?,
            metrics: schema
                .metrics
                .iter()
                .map(|m| (m.as_str(), record.number(m)))
                .collect(),
        })
    }

    /// The calendar-year join key.
    pub fn year(&self) -> i32 {
        self.timestamp.year()
    }
}

// ---------------------------------------------------------------------------
// Table – an ordered collection of same-schema records
// ---------------------------------------------------------------------------

/// Records sharing one column set. Every record holds a cell for every
/// column in `columns` (absent values are stored as [`Value::Missing`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub domain: Domain,
    /// Column names in display/export order.
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Table {
    /// Build a table, filling every absent cell with `Missing`.
    pub fn new(domain: Domain, columns: Vec<String>, records: Vec<Record>) -> Self {
        let records = records
            .into_iter()
            .map(|mut r| {
                for col in &columns {
                    r.cells.entry(col.clone()).or_insert(Value::Missing);
                }
                r.cells.retain(|k, _| columns.contains(k));
                r
            })
            .collect();
        Table {
            domain,
            columns,
            records,
        }
    }

    pub fn empty(domain: Domain, columns: Vec<String>) -> Self {
        Table {
            domain,
            columns,
            records: Vec::new(),
        }
    }

    /// A table with the same schema but a different set of records.
    pub fn with_records(&self, records: Vec<Record>) -> Self {
        Table {
            domain: self.domain,
            columns: self.columns.clone(),
            records,
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // -- Column capability queries --

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Fail with `SchemaMismatch` on the first column this table lacks.
    pub fn require_columns<S: AsRef<str>>(&self, columns: &[S]) -> Result<()> {
        match columns.iter().find(|c| !self.has_column(c.as_ref())) {
            Some(missing) => Err(PipelineError::schema_mismatch(self.domain, missing.as_ref())),
            None => Ok(()),
        }
    }

    /// The subset of `wanted` this table carries, in the order given.
    pub fn available_columns<S: AsRef<str>>(&self, wanted: &[S]) -> Vec<String> {
        wanted
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| self.has_column(c))
            .map(str::to_string)
            .collect()
    }

    /// Sorted distinct non-missing values of a column (e.g. filter options).
    pub fn distinct_values(&self, column: &str) -> BTreeSet<Value> {
        self.records
            .iter()
            .map(|r| r.get(column))
            .filter(|v| !v.is_missing())
            .cloned()
            .collect()
    }

    /// Numeric column values in record order.
    pub fn column_f64(&self, column: &str) -> Vec<Option<f64>> {
        self.records.iter().map(|r| r.number(column)).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(pairs: &[(&str, Value)]) -> Record {
        Record::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_table_new_fills_absent_cells_with_missing() {
        let table = Table::new(
            Domain::AirQuality,
            vec!["State".into(), "Median AQI".into()],
            vec![record(&[("State", Value::Text("OH".into()))])],
        );
        assert_eq!(table.records[0].get("Median AQI"), &Value::Missing);
        assert_eq!(table.records[0].cells.len(), 2);
    }

    #[test]
    fn test_require_columns_names_first_absent_column() {
        let table = Table::empty(Domain::Weather, vec!["Location".into()]);
        let err = table.require_columns(&["Location", "Date_Time"]).unwrap_err();
        match err {
            PipelineError::SchemaMismatch { domain, column } => {
                assert_eq!(domain, Domain::Weather);
                assert_eq!(column, "Date_Time");
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_available_columns_keeps_requested_order() {
        let table = Table::empty(
            Domain::Weather,
            vec!["Humidity_pct".into(), "Temperature_C".into()],
        );
        let got = table.available_columns(&["Temperature_C", "Wind_Speed_kmh", "Humidity_pct"]);
        assert_eq!(got, vec!["Temperature_C", "Humidity_pct"]);
    }

    #[test]
    fn test_missing_sorts_before_numbers_and_numbers_compare_across_types() {
        assert!(Value::Missing < Value::Integer(-5));
        assert!(Value::Integer(2) < Value::Float(2.5));
        assert!(Value::Float(1.5) < Value::Integer(2));
    }

    #[test]
    fn test_equal_numbers_of_different_types_are_one_distinct_value() {
        assert_eq!(Value::Integer(2), Value::Float(2.0));
        assert_eq!(Value::Integer(2).cmp(&Value::Float(2.0)), std::cmp::Ordering::Equal);
        assert_ne!(Value::Integer(2), Value::Text("2".into()));

        let table = Table::new(
            Domain::AirQuality,
            vec!["Year".into()],
            vec![
                record(&[("Year", Value::Integer(2))]),
                record(&[("Year", Value::Float(2.0))]),
                record(&[("Year", Value::Integer(3))]),
            ],
        );
        assert_eq!(table.distinct_values("Year").len(), 2);
    }

    #[test]
    fn test_weather_view_exposes_calendar_year() {
        let schema = DomainSchema::weather();
        let ts = NaiveDate::from_ymd_opt(2019, 12, 31)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap();
        let r = record(&[
            ("Location", Value::Text("Phoenix".into())),
            ("Date_Time", Value::DateTime(ts)),
            ("Temperature_C", Value::Float(12.5)),
        ]);
        let view = WeatherRecord::from_record(&r, &schema).expect("keys present");
        assert_eq!(view.year(), 2019);
        assert_eq!(view.metrics.get("Temperature_C"), Some(&Some(12.5)));
        assert_eq!(view.metrics.get("Humidity_pct"), Some(&None));
    }

    #[test]
    fn test_air_quality_view_requires_all_keys() {
        let schema = DomainSchema::air_quality();
        let r = record(&[
            ("State", Value::Text("OH".into())),
            ("Year", Value::Integer(2015)),
        ]);
        assert!(AirQualityRecord::from_record(&r, &schema).is_none());
    }
}
