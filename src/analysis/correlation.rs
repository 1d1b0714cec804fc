use crate::data::model::Table;
use crate::error::{PipelineError, Result};

use super::aggregate::Aggregates;
use super::reconcile::reconcile;

/// Minimum number of overlapping years (and paired observations per cell).
pub const MIN_OBSERVATIONS: usize = 2;

// ---------------------------------------------------------------------------
// CorrelationMatrix
// ---------------------------------------------------------------------------

/// Square, symmetric Pearson correlation matrix over `metrics`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub metrics: Vec<String>,
    /// `cells[i][j]`; `None` when undefined (zero variance or too few pairs).
    pub cells: Vec<Vec<Option<f64>>>,
    /// Number of paired observations behind each cell.
    pub observations: Vec<Vec<usize>>,
    /// Rows of the merged annual table the matrix was computed over.
    pub rows: usize,
}

impl CorrelationMatrix {
    pub fn index_of(&self, metric: &str) -> Option<usize> {
        self.metrics.iter().position(|m| m == metric)
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        self.cells[self.index_of(a)?][self.index_of(b)?]
    }
}

// ---------------------------------------------------------------------------
// Correlation engine
// ---------------------------------------------------------------------------

/// Correlate annual aggregates of two domains.
///
/// The two collections are inner-joined on `Year`; metrics not present in
/// the joined rows are dropped from the axis.
pub fn correlate<S: AsRef<str>>(
    left: &Aggregates,
    right: &Aggregates,
    metrics: &[S],
) -> Result<CorrelationMatrix> {
    let merged = reconcile(&left.to_table(false), &right.to_table(false), None)?;
    correlate_table(&merged, metrics)
}

/// Pairwise-complete Pearson correlation over the columns of one table.
pub fn correlate_table<S: AsRef<str>>(table: &Table, metrics: &[S]) -> Result<CorrelationMatrix> {
    if table.len() < MIN_OBSERVATIONS {
        return Err(PipelineError::insufficient(
            "correlation (overlapping years)",
            MIN_OBSERVATIONS,
            table.len(),
        ));
    }

    let axis = table.available_columns(metrics);
    if axis.len() < metrics.len() {
        let skipped: Vec<&str> = metrics
            .iter()
            .map(|m| m.as_ref())
            .filter(|m| !table.has_column(m))
            .collect();
        log::warn!("correlation: metrics {skipped:?} not present after the join");
    }
    if axis.is_empty() {
        return Err(PipelineError::insufficient("correlation (metrics)", 1, 0));
    }

    let columns: Vec<Vec<Option<f64>>> = axis.iter().map(|m| table.column_f64(m)).collect();
    let k = axis.len();
    let mut cells = vec![vec![None; k]; k];
    let mut observations = vec![vec![0; k]; k];

    for i in 0..k {
        for j in i..k {
            let pairs: Vec<(f64, f64)> = columns[i]
                .iter()
                .zip(&columns[j])
                .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
                .collect();
            let r = if i == j {
                has_variance(&pairs).then_some(1.0)
            } else {
                pearson(&pairs)
            };
            cells[i][j] = r;
            cells[j][i] = r;
            observations[i][j] = pairs.len();
            observations[j][i] = pairs.len();
        }
    }

    Ok(CorrelationMatrix {
        metrics: axis,
        cells,
        observations,
        rows: table.len(),
    })
}

fn has_variance(pairs: &[(f64, f64)]) -> bool {
    pairs.len() >= MIN_OBSERVATIONS && pairs.iter().any(|&(x, _)| x != pairs[0].0)
}

/// Pearson correlation coefficient; `None` for fewer than two pairs or when
/// either side has zero variance.
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < MIN_OBSERVATIONS {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for &(x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
