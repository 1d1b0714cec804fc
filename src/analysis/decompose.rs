use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::data::model::{Table, WeatherRecord};
use crate::data::schema::{DomainSchema, COL_LOCATION};
use crate::error::{PipelineError, Result};

/// Seasonal period for yearly-periodic daily data.
pub const YEARLY_PERIOD: usize = 365;

/// A dated value; `None` where a component is undefined (trend edges).
pub type Point = (NaiveDate, Option<f64>);

/// Additive decomposition: observed = trend + seasonal + residual.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionResult {
    pub period: usize,
    /// The resampled, interpolated input series.
    pub observed: Vec<Point>,
    pub trend: Vec<Point>,
    pub seasonal: Vec<Point>,
    pub residual: Vec<Point>,
}

impl DecompositionResult {
    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Daily resampling
// ---------------------------------------------------------------------------

/// Resample one location's `metric` to a regular daily series.
///
/// Multiple readings on one day are averaged. Interior days without a value
/// are linearly interpolated between the nearest known days; the series
/// starts at the first and ends at the last day with a value.
pub fn daily_series(
    table: &Table,
    schema: &DomainSchema,
    location: &str,
    metric: &str,
) -> Result<Vec<(NaiveDate, f64)>> {
    let mut required = vec![COL_LOCATION, metric];
    required.extend(schema.date_column.as_deref());
    table.require_columns(&required)?;

    let mut days: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for record in &table.records {
        let Some(view) = WeatherRecord::from_record(record, schema) else {
            continue;
        };
        if view.location != location {
            continue;
        }
        if let Some(v) = record.number(metric) {
            let e = days.entry(view.timestamp.date()).or_insert((0.0, 0));
            e.0 += v;
            e.1 += 1;
        }
    }

    let known: BTreeMap<NaiveDate, f64> = days
        .into_iter()
        .map(|(d, (sum, n))| (d, sum / n as f64))
        .collect();
    Ok(interpolate_daily(&known))
}

/// Fill every calendar day between the first and last known day, linearly
/// interpolating gaps. Nothing is extrapolated.
pub fn interpolate_daily(known: &BTreeMap<NaiveDate, f64>) -> Vec<(NaiveDate, f64)> {
    let mut out = Vec::new();
    let mut iter = known.iter().peekable();
    while let Some((&day, &value)) = iter.next() {
        out.push((day, value));
        let Some(&(&next_day, &next_value)) = iter.peek() else {
            break;
        };
        let span = (next_day - day).num_days();
        for step in 1..span {
            let frac = step as f64 / span as f64;
            let date = day + chrono::Duration::days(step);
            out.push((date, value + (next_value - value) * frac));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Additive decomposition
// ---------------------------------------------------------------------------

/// Centred moving average of window `period`. Even periods use the 2×period
/// weighting (half weight on both ends) so the window stays centred.
fn centred_moving_average(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let half = period / 2;
    let mut trend = vec![None; n];
    if n <= 2 * half {
        return trend;
    }
    for (i, slot) in trend.iter_mut().enumerate().take(n - half).skip(half) {
        let window = &values[i - half..=i + half];
        let avg = if period % 2 == 1 {
            window.iter().sum::<f64>() / period as f64
        } else {
            let inner: f64 = window[1..window.len() - 1].iter().sum();
            (inner + 0.5 * (window[0] + window[window.len() - 1])) / period as f64
        };
        *slot = Some(avg);
    }
    trend
}

/// Decompose a regular daily series with the given seasonal period.
///
/// Seasonal phase is the position within the period (`index mod period`);
/// phase means of the detrended series are re-centred to sum to zero.
/// The series must span at least two full periods.
pub fn decompose(series: &[(NaiveDate, f64)], period: usize) -> Result<DecompositionResult> {
    if period < 2 {
        return Err(PipelineError::insufficient("seasonal period", 2, period));
    }
    // Two full cycles give every phase at least one defined trend value.
    let needed = 2 * period;
    if series.len() < needed {
        return Err(PipelineError::insufficient(
            "seasonal decomposition (days)",
            needed,
            series.len(),
        ));
    }

    let values: Vec<f64> = series.iter().map(|&(_, v)| v).collect();
    let trend = centred_moving_average(&values, period);

    let mut phase_sums = vec![(0.0, 0usize); period];
    for (i, (v, t)) in values.iter().zip(&trend).enumerate() {
        if let Some(t) = t {
            let e = &mut phase_sums[i % period];
            e.0 += v - t;
            e.1 += 1;
        }
    }
    let mut phase_means: Vec<Option<f64>> = phase_sums
        .iter()
        .map(|&(sum, n)| (n > 0).then(|| sum / n as f64))
        .collect();
    let defined: Vec<f64> = phase_means.iter().flatten().copied().collect();
    if !defined.is_empty() {
        let centre = defined.iter().sum::<f64>() / defined.len() as f64;
        for m in phase_means.iter_mut().flatten() {
            *m -= centre;
        }
    }

    let seasonal: Vec<Option<f64>> = (0..values.len()).map(|i| phase_means[i % period]).collect();
    let residual: Vec<Option<f64>> = values
        .iter()
        .zip(trend.iter().zip(&seasonal))
        .map(|(v, (t, s))| Some(v - (*t)? - (*s)?))
        .collect();

    let dated = |component: &[Option<f64>]| -> Vec<Point> {
        series
            .iter()
            .zip(component)
            .map(|(&(d, _), &c)| (d, c))
            .collect()
    };

    Ok(DecompositionResult {
        period,
        observed: series.iter().map(|&(d, v)| (d, Some(v))).collect(),
        trend: dated(trend.as_slice()),
        seasonal: dated(seasonal.as_slice()),
        residual: dated(residual.as_slice()),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
