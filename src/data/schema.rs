use super::model::Domain;

// ---------------------------------------------------------------------------
// Column names
// ---------------------------------------------------------------------------

pub const COL_STATE: &str = "State";
pub const COL_COUNTY: &str = "County";
pub const COL_YEAR: &str = "Year";
pub const COL_LOCATION: &str = "Location";
pub const COL_DATE_TIME: &str = "Date_Time";

/// Air-quality summary columns published in the annual AQI-by-county files.
pub const AIR_QUALITY_METRICS: &[&str] = &[
    "Days with AQI",
    "Good Days",
    "Moderate Days",
    "Unhealthy for Sensitive Groups Days",
    "Unhealthy Days",
    "Very Unhealthy Days",
    "Hazardous Days",
    "Max AQI",
    "90th Percentile AQI",
    "Median AQI",
];

pub const WEATHER_METRICS: &[&str] = &[
    "Temperature_C",
    "Humidity_pct",
    "Precipitation_mm",
    "Wind_Speed_kmh",
];

// ---------------------------------------------------------------------------
// DomainSchema
// ---------------------------------------------------------------------------

/// Which columns of a domain are keys, which is the timestamp and which are
/// numeric metrics. Every stage declares its required columns against this.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainSchema {
    pub domain: Domain,
    /// Key columns holding non-empty text (`State`, `County`, `Location`).
    pub text_keys: Vec<String>,
    /// Key columns holding integers (`Year`).
    pub integer_keys: Vec<String>,
    /// Timestamp key column, parsed into a date-time.
    pub date_column: Option<String>,
    /// Designated numeric columns; unparsable cells become `Missing`.
    pub metrics: Vec<String>,
}

impl DomainSchema {
    pub fn air_quality() -> Self {
        DomainSchema {
            domain: Domain::AirQuality,
            text_keys: vec![COL_STATE.into(), COL_COUNTY.into()],
            integer_keys: vec![COL_YEAR.into()],
            date_column: None,
            metrics: AIR_QUALITY_METRICS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn weather() -> Self {
        DomainSchema {
            domain: Domain::Weather,
            text_keys: vec![COL_LOCATION.into()],
            integer_keys: Vec::new(),
            date_column: Some(COL_DATE_TIME.into()),
            metrics: WEATHER_METRICS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// All required key columns: text keys, integer keys, then the timestamp.
    pub fn key_columns(&self) -> Vec<&str> {
        self.text_keys
            .iter()
            .chain(self.integer_keys.iter())
            .chain(self.date_column.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn is_key(&self, column: &str) -> bool {
        self.key_columns().contains(&column)
    }

    pub fn is_metric(&self, column: &str) -> bool {
        self.metrics.iter().any(|m| m == column)
    }
}
