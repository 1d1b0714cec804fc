use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::model::{Record, Table};
use super::schema::{DomainSchema, COL_COUNTY, COL_LOCATION, COL_STATE, COL_YEAR};

// ---------------------------------------------------------------------------
// Filter predicate configuration
// ---------------------------------------------------------------------------

/// User-selected predicates.
///
/// Every field distinguishes "not set" from "set to nothing":
/// * `None` → no restriction on that column
/// * `Some(empty set)` → the user deselected everything, no row passes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// `State` values.
    pub regions: Option<BTreeSet<String>>,
    /// `County` values.
    pub subregions: Option<BTreeSet<String>>,
    /// Weather `Location` values.
    pub locations: Option<BTreeSet<String>>,
    pub years: Option<YearSelection>,
    /// Calendar-date window on the weather timestamp.
    pub dates: Option<DateRange>,
}

/// Either an explicit set of years or an inclusive range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YearSelection {
    Set(BTreeSet<i32>),
    Range { from: i32, to: i32 },
}

impl YearSelection {
    pub fn contains(&self, year: i32) -> bool {
        match self {
            YearSelection::Set(years) => years.contains(&year),
            YearSelection::Range { from, to } => (*from..=*to).contains(&year),
        }
    }
}

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl FilterSpec {
    /// True when no predicate is set.
    pub fn is_unrestricted(&self) -> bool {
        self.regions.is_none()
            && self.subregions.is_none()
            && self.locations.is_none()
            && self.years.is_none()
            && self.dates.is_none()
    }

    /// The subregion when the selection narrows to exactly one.
    pub fn single_subregion(&self) -> Option<&str> {
        match &self.subregions {
            Some(set) if set.len() == 1 => set.iter().next().map(String::as_str),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Filter engine
// ---------------------------------------------------------------------------

/// Return indices of records that pass all applicable predicates.
///
/// A predicate is applicable when the table carries its column (`Year` may
/// also come from the schema's timestamp). A record passes a predicate when:
/// * the predicate is `None` → passes (no constraint)
/// * the selection is empty → fails
/// * the record's value is selected → passes; a missing value fails
pub fn filtered_indices(table: &Table, spec: &FilterSpec, schema: &DomainSchema) -> Vec<usize> {
    let date_col = schema
        .date_column
        .as_deref()
        .filter(|c| table.has_column(c));

    let set_predicates: Vec<(&str, &BTreeSet<String>)> = [
        (COL_STATE, &spec.regions),
        (COL_COUNTY, &spec.subregions),
        (COL_LOCATION, &spec.locations),
    ]
    .into_iter()
    .filter_map(|(col, sel)| sel.as_ref().map(|s| (col, s)))
    .filter(|(col, _)| {
        let applicable = table.has_column(col);
        if !applicable {
            log::debug!("{}: no '{col}' column, predicate skipped", table.domain);
        }
        applicable
    })
    .collect();

    let year_of = |r: &Record| -> Option<i32> {
        if table.has_column(COL_YEAR) {
            r.year()
        } else {
            date_col.and_then(|c| r.get(c).as_datetime()).map(|d| d.year())
        }
    };
    let years = spec
        .years
        .as_ref()
        .filter(|_| table.has_column(COL_YEAR) || date_col.is_some());
    let dates = spec.dates.as_ref().filter(|_| date_col.is_some());

    table
        .records
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            for (col, selected) in &set_predicates {
                match r.text(col) {
                    Some(v) if selected.contains(v) => {}
                    _ => return false,
                }
            }
            if let Some(sel) = years {
                if !year_of(*r).is_some_and(|y| sel.contains(y)) {
                    return false;
                }
            }
            if let (Some(range), Some(col)) = (dates, date_col) {
                if !r
                    .get(col)
                    .as_datetime()
                    .is_some_and(|ts| range.contains(ts.date()))
                {
                    return false;
                }
            }
            true
        })
        .map(|(i, _)| i)
        .collect()
}

/// Apply a [`FilterSpec`] to a table, producing a new (possibly empty) table.
pub fn apply(table: &Table, spec: &FilterSpec, schema: &DomainSchema) -> Table {
    if spec.is_unrestricted() {
        return table.clone();
    }
    let records = filtered_indices(table, spec, schema)
        .into_iter()
        .map(|i| table.records[i].clone())
        .collect();
    let out = table.with_records(records);
    log::debug!(
        "{} filter kept {} of {} rows",
        table.domain,
        out.len(),
        table.len()
    );
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Domain, Value};

    fn aq() -> Table {
        let rows = [
            ("Ohio", "Lake", 2015, 40.0),
            ("Ohio", "Erie", 2015, 60.0),
            ("Texas", "Harris", 2016, 70.0),
            ("Texas", "Dallas", 2018, 55.0),
        ];
        let columns: Vec<String> = vec!["State".into(), "County".into(), "Year".into(), "Median AQI".into()];
        let records = rows
            .iter()
            .map(|(s, c, y, m)| {
                Record::new(
                    [
                        ("State".to_string(), Value::Text(s.to_string())),
                        ("County".to_string(), Value::Text(c.to_string())),
                        ("Year".to_string(), Value::Integer(*y)),
                        ("Median AQI".to_string(), Value::Float(*m)),
                    ]
                    .into_iter()
                    .collect(),
                )
            })
            .collect();
        Table::new(Domain::AirQuality, columns, records)
    }

    fn weather() -> Table {
        let columns: Vec<String> = vec!["Location".into(), "Date_Time".into(), "Temperature_C".into()];
        let records = [
            ("Phoenix", (2019, 12, 31)),
            ("Phoenix", (2020, 1, 1)),
            ("Denver", (2020, 6, 15)),
        ]
        .iter()
        .map(|(loc, (y, m, d))| {
            let ts = NaiveDate::from_ymd_opt(*y, *m, *d)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap();
            Record::new(
                [
                    ("Location".to_string(), Value::Text(loc.to_string())),
                    ("Date_Time".to_string(), Value::DateTime(ts)),
                    ("Temperature_C".to_string(), Value::Float(20.0)),
                ]
                .into_iter()
                .collect(),
            )
        })
        .collect();
        Table::new(Domain::Weather, columns, records)
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unset_spec_is_identity() {
        let t = aq();
        assert_eq!(apply(&t, &FilterSpec::default(), &DomainSchema::air_quality()), t);
        let w = weather();
        assert_eq!(apply(&w, &FilterSpec::default(), &DomainSchema::weather()), w);
    }

    #[test]
    fn test_empty_selection_hides_everything() {
        let spec = FilterSpec {
            regions: Some(BTreeSet::new()),
            ..Default::default()
        };
        let out = apply(&aq(), &spec, &DomainSchema::air_quality());
        assert!(out.is_empty());
        assert_eq!(out.columns, aq().columns);
    }

    #[test]
    fn test_predicates_compose_with_and() {
        let spec = FilterSpec {
            regions: Some(set(&["Ohio", "Texas"])),
            years: Some(YearSelection::Range { from: 2015, to: 2016 }),
            ..Default::default()
        };
        let out = apply(&aq(), &spec, &DomainSchema::air_quality());
        let counties: Vec<_> = out.records.iter().filter_map(|r| r.text("County")).collect();
        assert_eq!(counties, vec!["Lake", "Erie", "Harris"]);
    }

    #[test]
    fn test_year_set_selection() {
        let spec = FilterSpec {
            years: Some(YearSelection::Set([2016, 2018].into_iter().collect())),
            ..Default::default()
        };
        let out = apply(&aq(), &spec, &DomainSchema::air_quality());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_region_predicate_does_not_apply_to_weather() {
        let spec = FilterSpec {
            regions: Some(set(&["Ohio"])),
            ..Default::default()
        };
        let out = apply(&weather(), &spec, &DomainSchema::weather());
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_weather_year_comes_from_timestamp() {
        let spec = FilterSpec {
            years: Some(YearSelection::Set([2020].into_iter().collect())),
            locations: Some(set(&["Phoenix"])),
            ..Default::default()
        };
        let out = apply(&weather(), &spec, &DomainSchema::weather());
        assert_eq!(out.len(), 1);
        assert_eq!(out.records[0].text("Location"), Some("Phoenix"));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let spec = FilterSpec {
            dates: Some(DateRange {
                start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2020, 6, 15).unwrap(),
            }),
            ..Default::default()
        };
        let out = apply(&weather(), &spec, &DomainSchema::weather());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_missing_cell_fails_active_predicate() {
        let mut t = aq();
        t.records[0]
            .cells
            .insert("County".to_string(), Value::Missing);
        let spec = FilterSpec {
            subregions: Some(set(&["Lake", "Erie", "Harris", "Dallas"])),
            ..Default::default()
        };
        assert_eq!(filtered_indices(&t, &spec, &DomainSchema::air_quality()), vec![1, 2, 3]);
    }

    #[test]
    fn test_single_subregion() {
        let spec = FilterSpec {
            subregions: Some(set(&["Lake"])),
            ..Default::default()
        };
        assert_eq!(spec.single_subregion(), Some("Lake"));
        assert_eq!(FilterSpec::default().single_subregion(), None);
    }

    #[test]
    fn test_spec_deserializes_year_range_and_set() {
        let range: FilterSpec = toml::from_str("years = { from = 2015, to = 2020 }").unwrap();
        assert_eq!(range.years, Some(YearSelection::Range { from: 2015, to: 2020 }));
        let list: FilterSpec = toml::from_str("years = [2019, 2020]\nregions = []").unwrap();
        assert!(list.years.as_ref().is_some_and(|y| y.contains(2019)));
        assert_eq!(list.regions, Some(BTreeSet::new()));
        assert!(list.subregions.is_none());
    }
}
