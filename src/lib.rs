//! Climate dashboard core.
//!
//! Data access for the climate API (stations, temperature series, gridded and heatmap
//! data), the async layer-loading pipeline, and the composition root that ties them
//! to the interactive state of a map dashboard. The `climate-dash` binary drives it
//! from a terminal.

pub mod api;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod models;
pub mod providers;
pub mod render;
pub mod runtime;

pub use config::DashboardConfig;
pub use dashboard::Dashboard;
pub use error::{AppError, Result};
