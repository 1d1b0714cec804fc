//! Stage orchestration: load → normalize → combine per domain, then
//! filter → {aggregate, reconcile → correlate, decompose}.
//!
//! Each domain's result is independent, so a failed air-quality load still
//! leaves the weather summaries usable and vice versa.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::analysis::aggregate::{aggregate, rank_extremes, top_n, Aggregates, Order, Ranked};
use crate::analysis::correlation::{correlate, CorrelationMatrix};
use crate::analysis::decompose::{daily_series, decompose, DecompositionResult};
use crate::analysis::reconcile::{derive_year, reconcile};
use crate::config::Config;
use crate::data::combine::combine;
use crate::data::filter::{self, FilterSpec};
use crate::data::loader::{self, RawTable};
use crate::data::model::{Domain, Table};
use crate::data::normalize::normalize;
use crate::data::schema::{DomainSchema, COL_COUNTY, COL_LOCATION, COL_STATE, COL_YEAR};
use crate::error::{PipelineError, Result, RowDefect};
use crate::export;

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// What happened while loading one domain.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadReport {
    pub files: Vec<String>,
    /// Rows kept after normalization.
    pub rows: usize,
    /// Rows dropped by the normalizer, with the source they came from.
    pub dropped: Vec<(String, RowDefect)>,
    /// Rows the file reader could not decode.
    pub unreadable: usize,
}

impl LoadReport {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len() + self.unreadable
    }
}

/// A combined domain table and its load report.
#[derive(Debug, Clone)]
pub struct DomainData {
    pub table: Table,
    pub report: LoadReport,
}

/// Read, normalize and combine the given files of one domain.
pub fn load_domain(paths: &[PathBuf], schema: &DomainSchema) -> Result<DomainData> {
    let raws = paths
        .iter()
        .map(|p| loader::load_file(p))
        .collect::<anyhow::Result<Vec<_>>>()?;
    from_raw(&raws, schema)
}

/// Every supported file in `dir`, combined as one domain.
pub fn load_domain_dir(dir: &Path, schema: &DomainSchema) -> Result<DomainData> {
    load_domain(&loader::list_datasets(dir)?, schema)
}

/// Normalize and combine already-read source tables.
pub fn from_raw(raws: &[RawTable], schema: &DomainSchema) -> Result<DomainData> {
    let mut report = LoadReport::default();
    let mut tables = Vec::with_capacity(raws.len());
    for raw in raws {
        let normalized = normalize(raw, schema);
        report.files.push(raw.source.clone());
        report.unreadable += raw.skipped_rows;
        report.dropped.extend(
            normalized
                .dropped
                .into_iter()
                .map(|d| (raw.source.clone(), d)),
        );
        tables.push(normalized.table);
    }
    let table = combine(&tables, schema)?;
    report.rows = table.len();
    if report.dropped_count() > 0 {
        log::warn!(
            "{}: {} malformed rows excluded across {} files",
            schema.domain,
            report.dropped_count(),
            report.files.len()
        );
    }
    Ok(DomainData { table, report })
}

// ---------------------------------------------------------------------------
// Run outputs
// ---------------------------------------------------------------------------

/// Non-fatal conditions the presentation layer should surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A filter or join produced zero rows.
    EmptyResult { stage: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::EmptyResult { stage } => write!(f, "{stage} produced no rows"),
        }
    }
}

/// Lowest/highest and top/bottom subregions by one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Rankings {
    pub metric: String,
    /// Per-subregion means the ranking was taken from.
    pub by_subregion: Aggregates,
    pub lowest: (String, f64),
    pub highest: (String, f64),
    pub top: Vec<(String, f64)>,
    pub bottom: Vec<(String, f64)>,
}

#[derive(Debug, Clone)]
pub struct AirQualityOutputs {
    pub filtered: Table,
    /// Per-year means of every metric.
    pub annual: Aggregates,
    /// Means by the configured grouping.
    pub summary: Aggregates,
    /// Absent when the filter selects a single subregion.
    pub rankings: Option<Rankings>,
}

#[derive(Debug, Clone)]
pub struct WeatherOutputs {
    /// Filtered rows with the derived `Year` column.
    pub filtered: Table,
    pub annual: Aggregates,
    pub by_location: Aggregates,
}

/// Everything one pipeline run produced. `None` means the output was not
/// requested or its inputs were unavailable.
#[derive(Debug)]
pub struct RunOutput {
    pub air_quality: Option<Result<AirQualityOutputs>>,
    pub weather: Option<Result<WeatherOutputs>>,
    pub merged: Option<Result<Table>>,
    pub correlation: Option<Result<CorrelationMatrix>>,
    pub decomposition: Option<Result<DecompositionResult>>,
    pub warnings: Vec<Warning>,
}

// ---------------------------------------------------------------------------
// Analysis run
// ---------------------------------------------------------------------------

/// Run every analysis stage over the loaded domains.
pub fn run(
    air_quality: Option<&Table>,
    weather: Option<&Table>,
    spec: &FilterSpec,
    config: &Config,
) -> RunOutput {
    let mut warnings = Vec::new();

    let aq_out = air_quality.map(|t| air_quality_outputs(t, spec, config, &mut warnings));
    let wx_out = weather.map(|t| weather_outputs(t, spec, config, &mut warnings));

    let both = match (&aq_out, &wx_out) {
        (Some(Ok(aq)), Some(Ok(wx))) => Some((aq, wx)),
        _ => None,
    };

    let correlation =
        both.map(|(aq, wx)| correlate(&aq.annual, &wx.annual, &config.correlation_axis()));

    let merged = both.filter(|_| config.analysis.merge_rows).map(|(aq, wx)| -> Result<Table> {
        let merged = reconcile(&aq.filtered, &wx.filtered, config.analysis.join.as_ref())?;
        if merged.is_empty() {
            warnings.push(Warning::EmptyResult {
                stage: "year reconciliation".to_string(),
            });
        }
        Ok(merged)
    });

    let decomposition = match &wx_out {
        Some(Ok(wx)) => decomposition_location(spec, config).map(|location| {
            decompose_location(&wx.filtered, &location, config)
        }),
        _ => None,
    };

    for w in &warnings {
        log::warn!("{w}");
    }

    RunOutput {
        air_quality: aq_out,
        weather: wx_out,
        merged,
        correlation,
        decomposition,
        warnings,
    }
}

fn air_quality_outputs(
    table: &Table,
    spec: &FilterSpec,
    config: &Config,
    warnings: &mut Vec<Warning>,
) -> Result<AirQualityOutputs> {
    let schema = config.air_quality_schema();
    let filtered = filter::apply(table, spec, &schema);
    if filtered.is_empty() {
        warnings.push(Warning::EmptyResult {
            stage: format!("{} filter", Domain::AirQuality),
        });
    }

    let annual = aggregate(&filtered, &[COL_YEAR], &schema.metrics)?;
    let summary = aggregate(&filtered, &config.analysis.group_by, &schema.metrics)?;

    let rankings = if spec.single_subregion().is_none() {
        subregion_rankings(&filtered, config)?
    } else {
        None
    };

    Ok(AirQualityOutputs {
        filtered,
        annual,
        summary,
        rankings,
    })
}

fn subregion_rankings(table: &Table, config: &Config) -> Result<Option<Rankings>> {
    let metric = &config.analysis.ranking_metric;
    let by_subregion = aggregate(table, &[COL_STATE, COL_COUNTY], std::slice::from_ref(metric))?;

    let labelled = |r: &Ranked| (r.row.label(), r.value);
    let Some(extremes) = rank_extremes(&by_subregion.rows, metric) else {
        return Ok(None);
    };
    let n = config.analysis.top_n;
    let lowest = labelled(&extremes.lowest);
    let highest = labelled(&extremes.highest);
    let top = top_n(&by_subregion.rows, metric, n, Order::Descending)
        .iter()
        .map(labelled)
        .collect();
    let bottom = top_n(&by_subregion.rows, metric, n, Order::Ascending)
        .iter()
        .map(labelled)
        .collect();
    log::info!(
        "{metric}: lowest {} ({:.1}), highest {} ({:.1})",
        lowest.0,
        lowest.1,
        highest.0,
        highest.1
    );
    let rankings = Rankings {
        metric: metric.clone(),
        by_subregion,
        lowest,
        highest,
        top,
        bottom,
    };
    Ok(Some(rankings))
}

fn weather_outputs(
    table: &Table,
    spec: &FilterSpec,
    config: &Config,
    warnings: &mut Vec<Warning>,
) -> Result<WeatherOutputs> {
    let schema = config.weather_schema();
    let filtered = derive_year(&filter::apply(table, spec, &schema), &schema)?;
    if filtered.is_empty() {
        warnings.push(Warning::EmptyResult {
            stage: format!("{} filter", Domain::Weather),
        });
    }
    let annual = aggregate(&filtered, &[COL_YEAR], &schema.metrics)?;
    let by_location = aggregate(&filtered, &[COL_LOCATION], &schema.metrics)?;
    Ok(WeatherOutputs {
        filtered,
        annual,
        by_location,
    })
}

fn decompose_location(table: &Table, location: &str, config: &Config) -> Result<DecompositionResult> {
    let settings = &config.analysis.decomposition;
    let series = daily_series(table, &config.weather_schema(), location, &settings.metric)?;
    log::info!(
        "decomposing {} days of {} at {location}",
        series.len(),
        settings.metric
    );
    decompose(&series, settings.period)
}

fn decomposition_location(spec: &FilterSpec, config: &Config) -> Option<String> {
    if let Some(loc) = &config.analysis.decomposition.location {
        return Some(loc.clone());
    }
    match &spec.locations {
        Some(set) if set.len() == 1 => set.iter().next().cloned(),
        _ => {
            log::info!("no single location selected; skipping seasonal decomposition");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// A tabular output and the writer it goes through.
enum Output<'a> {
    Table(&'a Table),
    Aggregates(&'a Aggregates),
}

impl RunOutput {
    /// Write every available output as CSV into `dir`; returns the files
    /// written. Outputs that failed are skipped.
    pub fn export_to(&self, dir: &Path, precision: usize) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        let mut save = |name: &str, output: Output<'_>| -> Result<()> {
            let path = dir.join(name);
            export::to_file(&path, |w| match output {
                Output::Table(t) => export::write_table(t, w, precision),
                Output::Aggregates(a) => export::write_aggregates(a, w, precision),
            })?;
            written.push(path);
            Ok(())
        };

        if let Some(Ok(aq)) = &self.air_quality {
            save("air_quality_filtered.csv", Output::Table(&aq.filtered))?;
            save("air_quality_annual.csv", Output::Aggregates(&aq.annual))?;
            save("air_quality_summary.csv", Output::Aggregates(&aq.summary))?;
            if let Some(r) = &aq.rankings {
                save("air_quality_by_county.csv", Output::Aggregates(&r.by_subregion))?;
            }
        }
        if let Some(Ok(wx)) = &self.weather {
            save("weather_filtered.csv", Output::Table(&wx.filtered))?;
            save("weather_annual.csv", Output::Aggregates(&wx.annual))?;
            save("weather_by_location.csv", Output::Aggregates(&wx.by_location))?;
        }
        if let Some(Ok(merged)) = &self.merged {
            save("merged.csv", Output::Table(merged))?;
        }

        if let Some(Ok(m)) = &self.correlation {
            let path = dir.join("correlation.csv");
            export::to_file(&path, |w| export::write_correlation(m, w, precision))?;
            written.push(path);
        }
        if let Some(Ok(d)) = &self.decomposition {
            let path = dir.join("decomposition.csv");
            export::to_file(&path, |w| export::write_decomposition(d, w, precision))?;
            written.push(path);
        }
        Ok(written)
    }

    /// Errors of individual outputs, labelled, for display.
    pub fn errors(&self) -> Vec<(&'static str, &PipelineError)> {
        let mut out = Vec::new();
        if let Some(Err(e)) = &self.air_quality {
            out.push(("air quality", e));
        }
        if let Some(Err(e)) = &self.weather {
            out.push(("weather", e));
        }
        if let Some(Err(e)) = &self.merged {
            out.push(("merged table", e));
        }
        if let Some(Err(e)) = &self.correlation {
            out.push(("correlation", e));
        }
        if let Some(Err(e)) = &self.decomposition {
            out.push(("decomposition", e));
        }
        out
    }
}
