use thiserror::Error;

use crate::data::model::Domain;

// ---------------------------------------------------------------------------
// Pipeline error taxonomy
// ---------------------------------------------------------------------------

/// Errors raised by the pipeline stages.
///
/// Row-level defects (`Parse`) never abort a batch: the normalizer collects
/// them as [`RowDefect`]s and drops the row. Everything else aborts only the
/// stage (or domain) that raised it.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("row {row}: column '{column}': {message}")]
    Parse {
        row: usize,
        column: String,
        message: String,
    },

    #[error("{domain} data is missing required column '{column}'")]
    SchemaMismatch { domain: Domain, column: String },

    #[error("no {domain} source tables were selected")]
    NoSources { domain: Domain },

    #[error("insufficient data for {what}: need at least {needed}, found {found}")]
    InsufficientData {
        what: String,
        needed: usize,
        found: usize,
    },

    #[error("loading sources failed: {0:#}")]
    Load(#[from] anyhow::Error),

    #[error("CSV export failed: {0}")]
    Export(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn schema_mismatch(domain: Domain, column: impl Into<String>) -> Self {
        PipelineError::SchemaMismatch {
            domain,
            column: column.into(),
        }
    }

    pub fn insufficient(what: impl Into<String>, needed: usize, found: usize) -> Self {
        PipelineError::InsufficientData {
            what: what.into(),
            needed,
            found,
        }
    }

    /// Whether this error only affects the output that requested it, as
    /// opposed to a whole domain load.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, PipelineError::InsufficientData { .. })
    }
}

/// A source row excluded by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDefect {
    /// Zero-based data row index within the source (header excluded).
    pub row: usize,
    pub column: String,
    pub message: String,
}

impl From<RowDefect> for PipelineError {
    fn from(d: RowDefect) -> Self {
        PipelineError::Parse {
            row: d.row,
            column: d.column,
            message: d.message,
        }
    }
}

impl std::fmt::Display for RowDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}: column '{}': {}", self.row, self.column, self.message)
    }
}
