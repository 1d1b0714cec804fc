//! Air-quality and weather integration pipeline.
//!
//! Loads per-county/per-year AQI summaries and per-location weather
//! observations, reconciles them on calendar year and derives grouped
//! statistics, correlation matrices and seasonal decompositions for a
//! presentation layer to render.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod pipeline;

pub use error::{PipelineError, Result};
