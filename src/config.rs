use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::analysis::decompose::YEARLY_PERIOD;
use crate::analysis::reconcile::JoinColumns;
use crate::data::filter::FilterSpec;
use crate::data::schema::{DomainSchema, COL_YEAR};
use crate::export::DEFAULT_PRECISION;

// ---------------------------------------------------------------------------
// Top-level configuration
// ---------------------------------------------------------------------------

/// Run configuration, read from TOML. Every section is optional.
///
/// ```toml
/// [sources]
/// air_quality_dir = "data/air_quality"
/// weather_dir = "data/weather"
///
/// [filter]
/// regions = ["Ohio"]
/// years = { from = 2015, to = 2020 }
///
/// [analysis.decomposition]
/// location = "Phoenix"
/// metric = "Temperature_C"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sources: SourcesConfig,
    pub air_quality: SchemaOverrides,
    pub weather: SchemaOverrides,
    pub filter: FilterSpec,
    /// Extra named filter views, each exported into its own sub-directory.
    pub views: Vec<ViewConfig>,
    pub analysis: AnalysisConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub air_quality_dir: PathBuf,
    pub weather_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            air_quality_dir: PathBuf::from("data/air_quality"),
            weather_dir: PathBuf::from("data/weather"),
            output_dir: PathBuf::from("output"),
        }
    }
}

/// Per-domain adjustments to the built-in schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchemaOverrides {
    pub metrics: Option<Vec<String>>,
    pub date_column: Option<String>,
}

impl SchemaOverrides {
    pub fn apply(&self, mut schema: DomainSchema) -> DomainSchema {
        if let Some(metrics) = &self.metrics {
            schema.metrics = metrics.clone();
        }
        if let Some(date_column) = &self.date_column {
            schema.date_column = Some(date_column.clone());
        }
        schema
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewConfig {
    pub name: String,
    #[serde(default)]
    pub filter: FilterSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Air-quality grouping for the summary table (e.g. `["Year", "State"]`).
    pub group_by: Vec<String>,
    /// Metric used for the lowest/highest subregion rankings.
    pub ranking_metric: String,
    pub top_n: usize,
    /// Correlation axis; empty means every metric of both schemas.
    pub correlation_metrics: Vec<String>,
    /// Additional join key for the merged row-level table.
    pub join: Option<JoinColumns>,
    /// Whether to build and export the row-level merged table.
    pub merge_rows: bool,
    pub decomposition: DecompositionConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            group_by: vec![COL_YEAR.to_string()],
            ranking_metric: "Median AQI".to_string(),
            top_n: 5,
            correlation_metrics: Vec::new(),
            join: None,
            merge_rows: false,
            decomposition: DecompositionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    /// Location to decompose; when unset, the filter's single selected
    /// location is used, otherwise decomposition is skipped.
    pub location: Option<String>,
    pub metric: String,
    pub period: usize,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            location: None,
            metric: "Temperature_C".to_string(),
            period: YEARLY_PERIOD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Decimal places for floating-point cells.
    pub precision: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn air_quality_schema(&self) -> DomainSchema {
        self.air_quality.apply(DomainSchema::air_quality())
    }

    pub fn weather_schema(&self) -> DomainSchema {
        self.weather.apply(DomainSchema::weather())
    }

    /// The configured correlation axis, or all metrics of both schemas.
    pub fn correlation_axis(&self) -> Vec<String> {
        if !self.analysis.correlation_metrics.is_empty() {
            return self.analysis.correlation_metrics.clone();
        }
        let mut axis = self.air_quality_schema().metrics;
        axis.extend(self.weather_schema().metrics);
        axis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::YearSelection;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg.sources.air_quality_dir, PathBuf::from("data/air_quality"));
        assert_eq!(cfg.analysis.group_by, vec!["Year"]);
        assert_eq!(cfg.analysis.decomposition.period, 365);
        assert_eq!(cfg.export.precision, 4);
        assert!(cfg.filter.is_unrestricted());
        assert!(cfg.views.is_empty());
    }

    #[test]
    fn test_full_config_parses() {
        let text = r#"
            [sources]
            output_dir = "out"

            [weather]
            metrics = ["Temperature_C", "Humidity_pct"]
            date_column = "Timestamp"

            [filter]
            regions = ["Ohio"]
            years = { from = 2015, to = 2020 }

            [[views]]
            name = "texas"
            filter = { regions = ["Texas"] }

            [analysis]
            group_by = ["Year", "State"]
            top_n = 3
            merge_rows = true
            join = { left = "County", right = "Location" }

            [analysis.decomposition]
            location = "Phoenix"
            period = 7

            [export]
            precision = 2
        "#;
        let cfg = Config::from_toml_str(text).unwrap();
        assert_eq!(cfg.sources.output_dir, PathBuf::from("out"));
        assert_eq!(cfg.sources.weather_dir, PathBuf::from("data/weather"));
        let wx = cfg.weather_schema();
        assert_eq!(wx.metrics, vec!["Temperature_C", "Humidity_pct"]);
        assert_eq!(wx.date_column.as_deref(), Some("Timestamp"));
        assert_eq!(cfg.filter.years, Some(YearSelection::Range { from: 2015, to: 2020 }));
        assert_eq!(cfg.views[0].name, "texas");
        assert!(cfg.views[0].filter.regions.is_some());
        assert_eq!(cfg.analysis.top_n, 3);
        assert_eq!(cfg.analysis.ranking_metric, "Median AQI");
        assert_eq!(cfg.analysis.decomposition.metric, "Temperature_C");
        assert_eq!(cfg.analysis.decomposition.period, 7);
        assert_eq!(cfg.export.precision, 2);
        assert_eq!(
            cfg.analysis.join,
            Some(JoinColumns { left: "County".into(), right: "Location".into() })
        );
    }

    #[test]
    fn test_correlation_axis_defaults_to_both_schemas() {
        let cfg = Config::from_toml_str("[weather]\nmetrics = [\"Temperature_C\"]").unwrap();
        let axis = cfg.correlation_axis();
        assert_eq!(axis.last().map(String::as_str), Some("Temperature_C"));
        assert!(axis.contains(&"Median AQI".to_string()));
    }

    #[test]
    fn test_unknown_value_type_is_an_error() {
        assert!(Config::from_toml_str("[export]\nprecision = \"two\"").is_err());
    }
}
