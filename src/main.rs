use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use airwatch::cache::SourceCache;
use airwatch::config::Config;
use airwatch::data::filter::FilterSpec;
use airwatch::data::loader;
use airwatch::data::schema::DomainSchema;
use airwatch::error::PipelineError;
use airwatch::pipeline::{self, DomainData, RunOutput};

const DEFAULT_CONFIG: &str = "airwatch.toml";

#[derive(Parser, Debug)]
#[command(name = "airwatch")]
#[command(about = "Air-quality and weather integration and statistics pipeline")]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults to ./airwatch.toml when present)
    config: Option<PathBuf>,

    /// Write outputs here instead of the configured `sources.output_dir`
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Only run the named `[[views]]` (repeatable); the top-level filter is skipped
    #[arg(long = "view")]
    views: Vec<String>,

    /// Decimal places for floating-point cells
    #[arg(long)]
    precision: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.clone())?;
    if let Some(dir) = &cli.output_dir {
        config.sources.output_dir = dir.clone();
    }
    if let Some(precision) = cli.precision {
        config.export.precision = precision;
    }
    let runs = selected_runs(&config, &cli.views)?;

    let mut cache: SourceCache<DomainData> = SourceCache::new();
    let aq_schema = config.air_quality_schema();
    let wx_schema = config.weather_schema();
    let aq = load_domain(&mut cache, &config.sources.air_quality_dir, &aq_schema);
    let wx = load_domain(&mut cache, &config.sources.weather_dir, &wx_schema);

    if aq.is_err() && wx.is_err() {
        anyhow::bail!("neither the air-quality nor the weather sources could be loaded");
    }

    for (dir, spec) in runs {
        let output = pipeline::run(
            aq.as_ref().ok().map(|d| &d.table),
            wx.as_ref().ok().map(|d| &d.table),
            spec,
            &config,
        );
        report_run(&dir, &output);
        let written = output
            .export_to(&dir, config.export.precision)
            .with_context(|| format!("exporting to {}", dir.display()))?;
        println!("  {} files written to {}", written.len(), dir.display());
    }

    let (hits, misses) = cache.stats();
    log::debug!("source cache: {hits} hits, {misses} misses");
    Ok(())
}

/// Output directory and filter of every run: the top-level filter into the
/// output dir plus each view into its own sub-directory, or only the views
/// named on the command line.
fn selected_runs<'a>(
    config: &'a Config,
    names: &[String],
) -> anyhow::Result<Vec<(PathBuf, &'a FilterSpec)>> {
    let out = &config.sources.output_dir;
    if names.is_empty() {
        let mut runs = vec![(out.clone(), &config.filter)];
        runs.extend(config.views.iter().map(|v| (out.join(&v.name), &v.filter)));
        return Ok(runs);
    }
    names
        .iter()
        .map(|name| -> anyhow::Result<(PathBuf, &'a FilterSpec)> {
            let view = config
                .views
                .iter()
                .find(|v| &v.name == name)
                .with_context(|| format!("no view named '{name}' in the configuration"))?;
            Ok((out.join(&view.name), &view.filter))
        })
        .collect()
}

fn load_config(arg: Option<PathBuf>) -> anyhow::Result<Config> {
    match arg {
        Some(path) => Config::load(&path),
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load(Path::new(DEFAULT_CONFIG)),
        None => {
            log::info!("no {DEFAULT_CONFIG} found; using built-in defaults");
            Ok(Config::default())
        }
    }
}

/// Load one domain directory through the cache. Failures are logged and
/// returned so the other domain can still be analysed.
fn load_domain(
    cache: &mut SourceCache<DomainData>,
    dir: &Path,
    schema: &DomainSchema,
) -> Result<DomainData, PipelineError> {
    let result = loader::list_datasets(dir)
        .map_err(PipelineError::from)
        .and_then(|files| cache.get_or_load(&files, |paths| pipeline::load_domain(paths, schema)));

    match &result {
        Ok(data) => {
            println!(
                "{}: {} rows from {} files ({} dropped)",
                schema.domain,
                data.report.rows,
                data.report.files.len(),
                data.report.dropped_count()
            );
            for (source, defect) in &data.report.dropped {
                log::debug!("{source}: {}", PipelineError::from(defect.clone()));
            }
        }
        Err(e) => log::error!("{} sources unavailable: {e}", schema.domain),
    }
    result
}

fn report_run(dir: &Path, output: &RunOutput) {
    println!("{}:", dir.display());
    if let Some(Ok(aq)) = &output.air_quality {
        if let Some(r) = &aq.rankings {
            println!(
                "  {}: lowest {} ({:.1}), highest {} ({:.1})",
                r.metric, r.lowest.0, r.lowest.1, r.highest.0, r.highest.1
            );
        }
    }
    for warning in &output.warnings {
        println!("  warning: {warning}");
    }
    for (what, err) in output.errors() {
        if err.is_insufficient_data() {
            println!("  {what} skipped: {err}");
        } else {
            log::error!("{what} failed: {err}");
        }
    }
}
