use std::collections::BTreeMap;

use crate::data::model::{Domain, Record, Table, Value};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Aggregate rows
// ---------------------------------------------------------------------------

/// Summary of one metric within one group, over non-missing values only.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricSummary {
    /// `None` when every value in the group is missing.
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Number of non-missing values.
    pub count: usize,
}

/// One row per distinct group key.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    /// Group column → value, in `group_by` order.
    pub key: Vec<(String, Value)>,
    /// Number of source records in the group.
    pub rows: usize,
    pub metrics: BTreeMap<String, MetricSummary>,
}

impl AggregateRow {
    pub fn key_value(&self, column: &str) -> Option<&Value> {
        self.key.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn mean(&self, metric: &str) -> Option<f64> {
        self.metrics.get(metric).and_then(|s| s.mean)
    }

    /// Group key rendered for display, e.g. `"Ohio / Lake"`.
    pub fn label(&self) -> String {
        self.key
            .iter()
            .map(|(_, v)| v.to_string())
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

/// The ordered output of [`aggregate`] together with what produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregates {
    pub domain: Domain,
    pub group_by: Vec<String>,
    pub metrics: Vec<String>,
    /// Ordered by group key ascending.
    pub rows: Vec<AggregateRow>,
}

impl Aggregates {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Flatten into a table: group columns, `n_rows`, then per metric the
    /// mean under the metric's own name and, with `extrema`, `<metric>_min`
    /// and `<metric>_max`.
    pub fn to_table(&self, extrema: bool) -> Table {
        let mut columns = self.group_by.clone();
        columns.push("n_rows".to_string());
        for m in &self.metrics {
            columns.push(m.clone());
            if extrema {
                columns.push(format!("{m}_min"));
                columns.push(format!("{m}_max"));
            }
        }

        let records = self
            .rows
            .iter()
            .map(|row| {
                let mut cells: BTreeMap<String, Value> = row.key.iter().cloned().collect();
                cells.insert("n_rows".to_string(), Value::Integer(row.rows as i64));
                for m in &self.metrics {
                    let s = row.metrics.get(m).copied().unwrap_or_default();
                    cells.insert(m.clone(), Value::from_option(s.mean));
                    if extrema {
                        cells.insert(format!("{m}_min"), Value::from_option(s.min));
                        cells.insert(format!("{m}_max"), Value::from_option(s.max));
                    }
                }
                Record::new(cells)
            })
            .collect();

        Table::new(self.domain, columns, records)
    }
}

#[derive(Default)]
struct Accumulator {
    rows: usize,
    sums: BTreeMap<String, (f64, usize, f64, f64)>,
}

impl Accumulator {
    fn add(&mut self, record: &Record, metrics: &[String]) {
        self.rows += 1;
        for m in metrics {
            let Some(v) = record.number(m) else {
                continue;
            };
            let e = self
                .sums
                .entry(m.clone())
                .or_insert((0.0, 0, f64::INFINITY, f64::NEG_INFINITY));
            e.0 += v;
            e.1 += 1;
            e.2 = e.2.min(v);
            e.3 = e.3.max(v);
        }
    }

    fn finish(self, key: Vec<(String, Value)>, metrics: &[String]) -> AggregateRow {
        let summaries = metrics
            .iter()
            .map(|m| {
                let s = match self.sums.get(m) {
                    Some(&(sum, n, min, max)) if n > 0 => MetricSummary {
                        mean: Some(sum / n as f64),
                        min: Some(min),
                        max: Some(max),
                        count: n,
                    },
                    _ => MetricSummary::default(),
                };
                (m.clone(), s)
            })
            .collect();
        AggregateRow {
            key,
            rows: self.rows,
            metrics: summaries,
        }
    }
}

// ---------------------------------------------------------------------------
// Grouped statistics
// ---------------------------------------------------------------------------

/// Group `table` by `group_by` and summarise each metric per group.
///
/// Every group column is required. Metrics the table does not carry are
/// skipped with a warning. Records with a missing group value are not
/// assigned to any group.
pub fn aggregate<G: AsRef<str>, M: AsRef<str>>(
    table: &Table,
    group_by: &[G],
    metrics: &[M],
) -> Result<Aggregates> {
    table.require_columns(group_by)?;
    let group_by: Vec<String> = group_by.iter().map(|g| g.as_ref().to_string()).collect();

    let present = table.available_columns(metrics);
    if present.len() < metrics.len() {
        let skipped: Vec<&str> = metrics
            .iter()
            .map(|m| m.as_ref())
            .filter(|m| !table.has_column(m))
            .collect();
        log::warn!("{}: skipping absent metrics {skipped:?}", table.domain);
    }

    let mut groups: BTreeMap<Vec<Value>, Accumulator> = BTreeMap::new();
    let mut ungrouped = 0;
    for record in &table.records {
        let key: Vec<Value> = group_by.iter().map(|g| record.get(g).clone()).collect();
        if key.iter().any(Value::is_missing) {
            ungrouped += 1;
            continue;
        }
        groups.entry(key).or_default().add(record, &present);
    }
    if ungrouped > 0 {
        log::debug!("{}: {ungrouped} rows with a missing group key", table.domain);
    }

    let rows = groups
        .into_iter()
        .map(|(key, acc)| {
            let key = group_by.iter().cloned().zip(key).collect();
            acc.finish(key, &present)
        })
        .collect();

    Ok(Aggregates {
        domain: table.domain,
        group_by,
        metrics: present,
        rows,
    })
}

// ---------------------------------------------------------------------------
// Rankings
// ---------------------------------------------------------------------------

/// A group and its mean for the ranked metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranked<'a> {
    pub row: &'a AggregateRow,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremes<'a> {
    pub lowest: Ranked<'a>,
    pub highest: Ranked<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// Lowest and highest group by mean of `metric`. Ties go to the group that
/// comes first in group-key order. `None` when no group has a value.
pub fn rank_extremes<'a>(rows: &'a [AggregateRow], metric: &str) -> Option<Extremes<'a>> {
    let mut valued = rows
        .iter()
        .filter_map(|row| row.mean(metric).map(|value| Ranked { row, value }));
    let first = valued.next()?;
    let mut out = Extremes {
        lowest: first,
        highest: first,
    };
    for r in valued {
        if r.value < out.lowest.value {
            out.lowest = r;
        }
        if r.value > out.highest.value {
            out.highest = r;
        }
    }
    Some(out)
}

/// The first `n` groups ordered by mean of `metric`; ties keep group-key
/// order. Groups without a value are left out.
pub fn top_n<'a>(rows: &'a [AggregateRow], metric: &str, n: usize, order: Order) -> Vec<Ranked<'a>> {
    let mut valued: Vec<Ranked<'a>> = rows
        .iter()
        .filter_map(|row| row.mean(metric).map(|value| Ranked { row, value }))
        .collect();
    valued.sort_by(|a, b| match order {
        Order::Ascending => a.value.total_cmp(&b.value),
        Order::Descending => b.value.total_cmp(&a.value),
    });
    valued.truncate(n);
    valued
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn aq(rows: &[(&str, &str, i64, Option<f64>)]) -> Table {
        let records = rows
            .iter()
            .map(|(s, c, y, m)| {
                Record::new(
                    [
                        ("State".to_string(), Value::Text(s.to_string())),
                        ("County".to_string(), Value::Text(c.to_string())),
                        ("Year".to_string(), Value::Integer(*y)),
                        ("Median AQI".to_string(), Value::from_option(*m)),
                    ]
                    .into_iter()
                    .collect(),
                )
            })
            .collect();
        Table::new(
            Domain::AirQuality,
            vec!["State".into(), "County".into(), "Year".into(), "Median AQI".into()],
            records,
        )
    }

    fn ohio() -> Table {
        aq(&[
            ("OH", "Lake", 2015, Some(40.0)),
            ("OH", "Erie", 2015, Some(60.0)),
        ])
    }

    // --- Means --------------------------------------------------------------

    #[test]
    fn test_year_mean_over_counties() {
        let out = aggregate(&ohio(), &["Year"], &["Median AQI"]).unwrap();
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].key_value("Year"), Some(&Value::Integer(2015)));
        assert_eq!(out.rows[0].mean("Median AQI"), Some(50.0));
        assert_eq!(out.rows[0].rows, 2);
        let s = out.rows[0].metrics["Median AQI"];
        assert_eq!((s.min, s.max, s.count), (Some(40.0), Some(60.0), 2));
    }

    #[test]
    fn test_single_value_group_mean_equals_value() {
        let out = aggregate(&ohio(), &["County"], &["Median AQI"]).unwrap();
        for row in &out.rows {
            let expected = if row.label() == "Lake" { 40.0 } else { 60.0 };
            assert_eq!(row.mean("Median AQI"), Some(expected));
        }
    }

    #[test]
    fn test_missing_values_are_ignored_and_all_missing_is_none() {
        let t = aq(&[
            ("OH", "Lake", 2015, Some(40.0)),
            ("OH", "Erie", 2015, None),
            ("OH", "Lake", 2016, None),
        ]);
        let out = aggregate(&t, &["Year"], &["Median AQI"]).unwrap();
        assert_eq!(out.rows[0].mean("Median AQI"), Some(40.0));
        assert_eq!(out.rows[0].metrics["Median AQI"].count, 1);
        assert_eq!(out.rows[1].mean("Median AQI"), None);
        assert_eq!(out.rows[1].rows, 1);
    }

    #[test]
    fn test_rows_ordered_by_group_key_ascending() {
        let t = aq(&[
            ("TX", "Harris", 2017, Some(1.0)),
            ("OH", "Lake", 2015, Some(2.0)),
            ("OH", "Erie", 2016, Some(3.0)),
        ]);
        let out = aggregate(&t, &["Year", "State"], &["Median AQI"]).unwrap();
        let labels: Vec<_> = out.rows.iter().map(AggregateRow::label).collect();
        assert_eq!(labels, vec!["2015 / OH", "2016 / OH", "2017 / TX"]);
    }

    #[test]
    fn test_absent_group_column_is_schema_mismatch() {
        assert!(aggregate(&ohio(), &["Location"], &["Median AQI"]).is_err());
    }

    #[test]
    fn test_absent_metric_is_skipped() {
        let out = aggregate(&ohio(), &["Year"], &["Median AQI", "Max AQI"]).unwrap();
        assert_eq!(out.metrics, vec!["Median AQI"]);
    }

    // --- Rankings -----------------------------------------------------------

    #[test]
    fn test_lowest_and_highest_county() {
        let out = aggregate(&ohio(), &["State", "County"], &["Median AQI"]).unwrap();
        let ex = rank_extremes(&out.rows, "Median AQI").unwrap();
        assert_eq!(ex.lowest.row.key_value("County"), Some(&Value::Text("Lake".into())));
        assert_eq!(ex.lowest.value, 40.0);
        assert_eq!(ex.highest.row.key_value("County"), Some(&Value::Text("Erie".into())));
        assert_eq!(ex.highest.value, 60.0);
    }

    #[test]
    fn test_ties_break_on_first_group_key() {
        let t = aq(&[
            ("OH", "Wood", 2015, Some(50.0)),
            ("OH", "Allen", 2015, Some(50.0)),
        ]);
        let out = aggregate(&t, &["County"], &["Median AQI"]).unwrap();
        let ex = rank_extremes(&out.rows, "Median AQI").unwrap();
        assert_eq!(ex.lowest.row.label(), "Allen");
        assert_eq!(ex.highest.row.label(), "Allen");
        let top = top_n(&out.rows, "Median AQI", 1, Order::Descending);
        assert_eq!(top[0].row.label(), "Allen");
    }

    #[test]
    fn test_top_n_descending_skips_unvalued_groups() {
        let t = aq(&[
            ("OH", "A", 2015, Some(10.0)),
            ("OH", "B", 2015, None),
            ("OH", "C", 2015, Some(30.0)),
            ("OH", "D", 2015, Some(20.0)),
        ]);
        let out = aggregate(&t, &["County"], &["Median AQI"]).unwrap();
        let top: Vec<_> = top_n(&out.rows, "Median AQI", 5, Order::Descending)
            .iter()
            .map(|r| r.row.label())
            .collect();
        assert_eq!(top, vec!["C", "D", "A"]);
    }

    #[test]
    fn test_rank_extremes_none_without_values() {
        let t = aq(&[("OH", "A", 2015, None)]);
        let out = aggregate(&t, &["County"], &["Median AQI"]).unwrap();
        assert!(rank_extremes(&out.rows, "Median AQI").is_none());
    }

    #[test]
    fn test_to_table_with_extrema() {
        let out = aggregate(&ohio(), &["Year"], &["Median AQI"]).unwrap();
        let t = out.to_table(true);
        assert_eq!(
            t.columns,
            vec!["Year", "n_rows", "Median AQI", "Median AQI_min", "Median AQI_max"]
        );
        assert_eq!(t.records[0].number("Median AQI_max"), Some(60.0));
    }
}
