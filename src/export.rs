//! Delimited-text export of pipeline outputs.
//!
//! Header = column names, one row per record, floats in a fixed precision,
//! missing values as empty cells.

use std::io::Write;
use std::path::Path;

use crate::analysis::aggregate::Aggregates;
use crate::analysis::correlation::CorrelationMatrix;
use crate::analysis::decompose::DecompositionResult;
use crate::data::model::{Table, Value};
use crate::error::Result;

pub const DEFAULT_PRECISION: usize = 4;

/// Render one cell. Integers keep their exact form; floats use `precision`.
pub fn format_value(value: &Value, precision: usize) -> String {
    match value {
        Value::Float(v) => format_float(Some(*v), precision),
        Value::Missing => String::new(),
        other => other.to_string(),
    }
}

fn format_float(v: Option<f64>, precision: usize) -> String {
    v.map(|v| format!("{v:.precision$}")).unwrap_or_default()
}

pub fn write_table<W: Write>(table: &Table, writer: W, precision: usize) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(&table.columns)?;
    for record in &table.records {
        csv.write_record(
            table
                .columns
                .iter()
                .map(|c| format_value(record.get(c), precision)),
        )?;
    }
    csv.flush()?;
    Ok(())
}

/// Aggregates are exported with their min/max columns.
pub fn write_aggregates<W: Write>(aggregates: &Aggregates, writer: W, precision: usize) -> Result<()> {
    write_table(&aggregates.to_table(true), writer, precision)
}

/// Square layout: first column names the row metric.
pub fn write_correlation<W: Write>(
    matrix: &CorrelationMatrix,
    writer: W,
    precision: usize,
) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    let mut header = vec!["metric".to_string()];
    header.extend(matrix.metrics.iter().cloned());
    csv.write_record(&header)?;
    for (name, row) in matrix.metrics.iter().zip(&matrix.cells) {
        let mut out = vec![name.clone()];
        out.extend(row.iter().map(|c| format_float(*c, precision)));
        csv.write_record(&out)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_decomposition<W: Write>(
    result: &DecompositionResult,
    writer: W,
    precision: usize,
) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["date", "observed", "trend", "seasonal", "residual"])?;
    for i in 0..result.len() {
        let (date, observed) = result.observed[i];
        csv.write_record([
            date.format("%Y-%m-%d").to_string(),
            format_float(observed, precision),
            format_float(result.trend[i].1, precision),
            format_float(result.seasonal[i].1, precision),
            format_float(result.residual[i].1, precision),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Create `path` (and its parent directory) and hand a buffered writer to
/// one of the `write_*` functions.
pub fn to_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(std::io::BufWriter<std::fs::File>) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write(std::io::BufWriter::new(file))?;
    log::info!("wrote {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregate::aggregate;
    use crate::analysis::decompose::decompose;
    use crate::data::model::{Domain, Record};
    use chrono::NaiveDate;

    fn ohio() -> Table {
        let rows = [("Lake", 40.0), ("Erie", 60.5)];
        Table::new(
            Domain::AirQuality,
            vec!["State".into(), "County".into(), "Year".into(), "Median AQI".into(), "Max AQI".into()],
            rows.iter()
                .map(|(c, m)| {
                    Record::new(
                        [
                            ("State".to_string(), Value::Text("OH".into())),
                            ("County".to_string(), Value::Text(c.to_string())),
                            ("Year".to_string(), Value::Integer(2015)),
                            ("Median AQI".to_string(), Value::Float(*m)),
                        ]
                        .into_iter()
                        .collect(),
                    )
                })
                .collect(),
        )
    }

    fn render<F: FnOnce(&mut Vec<u8>) -> Result<()>>(f: F) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_table_export_uses_fixed_precision_and_blank_missing() {
        let out = render(|b| write_table(&ohio(), b, 2));
        assert_eq!(
            out,
            "State,County,Year,Median AQI,Max AQI\nOH,Lake,2015,40.00,\nOH,Erie,2015,60.50,\n"
        );
    }

    #[test]
    fn test_aggregate_export_includes_extrema() {
        let agg = aggregate(&ohio(), &["Year"], &["Median AQI"]).unwrap();
        let out = render(|b| write_aggregates(&agg, b, 2));
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("Year,n_rows,Median AQI,Median AQI_min,Median AQI_max"));
        assert_eq!(lines.next(), Some("2015,2,50.25,40.00,60.50"));
    }

    #[test]
    fn test_correlation_export_is_square() {
        let m = CorrelationMatrix {
            metrics: vec!["a".into(), "b".into()],
            cells: vec![vec![Some(1.0), Some(-0.5)], vec![Some(-0.5), None]],
            observations: vec![vec![3, 3], vec![3, 3]],
            rows: 3,
        };
        let out = render(|b| write_correlation(&m, b, 3));
        assert_eq!(out, "metric,a,b\na,1.000,-0.500\nb,-0.500,\n");
    }

    #[test]
    fn test_decomposition_export_has_one_row_per_day() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series: Vec<_> = (0..10)
            .map(|i| (start + chrono::Duration::days(i), i as f64))
            .collect();
        let result = decompose(&series, 3).unwrap();
        let out = render(|b| write_decomposition(&result, b, 2));
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], "date,observed,trend,seasonal,residual");
        assert!(lines[1].starts_with("2024-01-01,0.00,,"));
    }

    #[test]
    fn test_to_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("table.csv");
        to_file(&path, |w| write_table(&ohio(), w, 1)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("State,County,Year"));
    }
}
