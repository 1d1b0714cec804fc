/// Statistics over filtered domain tables.
///
/// Submodules:
/// - `reconcile`: derives the `Year` join key and inner-joins the domains.
/// - `aggregate`: grouped means/extrema and group rankings.
/// - `correlation`: pairwise-complete Pearson matrix over annual aggregates.
/// - `decompose`: daily resampling and additive seasonal decomposition.

pub mod aggregate;
pub mod correlation;
pub mod decompose;
pub mod reconcile;
