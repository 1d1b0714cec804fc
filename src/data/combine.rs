use crate::error::{PipelineError, Result};

use super::model::{AirQualityRecord, Domain, Table, WeatherRecord};
use super::schema::DomainSchema;

/// Concatenate same-domain shards (e.g. one file per year) into one table.
///
/// Fill policy: the output columns are the union of the input columns in
/// first-seen order; a shard lacking a column contributes `Missing` cells
/// for it. No shard is ever dropped. Rows keep input order.
///
/// Fails with `NoSources` for an empty input list and with
/// `SchemaMismatch` when a key column is absent from every input.
pub fn combine(tables: &[Table], schema: &DomainSchema) -> Result<Table> {
    if tables.is_empty() {
        return Err(PipelineError::NoSources {
            domain: schema.domain,
        });
    }

    for key in schema.key_columns() {
        if !tables.iter().any(|t| t.has_column(key)) {
            return Err(PipelineError::schema_mismatch(schema.domain, key));
        }
    }

    let mut columns: Vec<String> = Vec::new();
    for table in tables {
        for col in &table.columns {
            if !columns.contains(col) {
                columns.push(col.clone());
            }
        }
    }

    for (i, table) in tables.iter().enumerate() {
        let absent: Vec<&str> = columns
            .iter()
            .filter(|c| !table.has_column(c))
            .map(String::as_str)
            .collect();
        if !absent.is_empty() {
            log::warn!(
                "{} shard {i} lacks columns {absent:?}; filling with missing values",
                schema.domain
            );
        }
    }

    let records = tables
        .iter()
        .flat_map(|t| t.records.iter().cloned())
        .collect();
    let combined = Table::new(schema.domain, columns, records);

    let incomplete = incomplete_key_rows(&combined, schema);
    if incomplete > 0 {
        log::warn!(
            "{}: {incomplete} rows come from shards without every key column",
            schema.domain
        );
    }

    log::info!(
        "combined {} {} shards into {} rows",
        tables.len(),
        schema.domain,
        combined.len()
    );
    Ok(combined)
}

/// Rows whose domain view cannot be built because a key cell is missing.
fn incomplete_key_rows(table: &Table, schema: &DomainSchema) -> usize {
    table
        .records
        .iter()
        .filter(|r| match schema.domain {
            Domain::AirQuality => AirQualityRecord::from_record(r, schema).is_none(),
            Domain::Weather => WeatherRecord::from_record(r, schema).is_none(),
            Domain::Merged => false,
        })
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Record, Value};

    fn aq_table(columns: &[&str], rows: &[&[Value]]) -> Table {
        let columns: Vec<String> = columns.iter().map(|s| s.to_string()).collect();
        let records = rows
            .iter()
            .map(|row| {
                Record::new(
                    columns
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect(),
                )
            })
            .collect();
        Table::new(Domain::AirQuality, columns, records)
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_combine_preserves_input_order() {
        let a = aq_table(
            &["State", "County", "Year"],
            &[&[text("OH"), text("Lake"), Value::Integer(2015)]],
        );
        let b = aq_table(
            &["State", "County", "Year"],
            &[&[text("OH"), text("Erie"), Value::Integer(2016)]],
        );
        let out = combine(&[a, b], &DomainSchema::air_quality()).unwrap();
        let years: Vec<_> = out.records.iter().map(|r| r.year()).collect();
        assert_eq!(years, vec![Some(2015), Some(2016)]);
    }

    #[test]
    fn test_combine_unions_columns_and_fills_missing() {
        let a = aq_table(
            &["State", "County", "Year", "Median AQI"],
            &[&[text("OH"), text("Lake"), Value::Integer(2015), Value::Float(40.0)]],
        );
        let b = aq_table(
            &["State", "County", "Year", "Max AQI"],
            &[&[text("OH"), text("Erie"), Value::Integer(2016), Value::Float(120.0)]],
        );
        let out = combine(&[a, b], &DomainSchema::air_quality()).unwrap();
        assert_eq!(out.columns, vec!["State", "County", "Year", "Median AQI", "Max AQI"]);
        assert!(out.records[0].get("Max AQI").is_missing());
        assert!(out.records[1].get("Median AQI").is_missing());
        assert_eq!(out.records[1].number("Max AQI"), Some(120.0));
    }

    #[test]
    fn test_key_absent_from_some_shards_is_tolerated() {
        let a = aq_table(
            &["State", "County", "Year"],
            &[&[text("OH"), text("Lake"), Value::Integer(2015)]],
        );
        let b = aq_table(&["State", "Year"], &[&[text("OH"), Value::Integer(2016)]]);
        let out = combine(&[a, b], &DomainSchema::air_quality()).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.records[1].get("County").is_missing());
    }

    #[test]
    fn test_key_absent_from_every_shard_is_schema_mismatch() {
        let a = aq_table(&["State", "Year"], &[&[text("OH"), Value::Integer(2015)]]);
        let err = combine(&[a], &DomainSchema::air_quality()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::SchemaMismatch { ref column, .. } if column == "County"
        ));
    }

    #[test]
    fn test_no_inputs_is_no_sources() {
        let err = combine(&[], &DomainSchema::weather()).unwrap_err();
        assert!(matches!(err, PipelineError::NoSources { domain: Domain::Weather }));
    }
}
