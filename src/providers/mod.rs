//! Data providers that feed the dashboard's reactive state.
//!
//! Each provider owns one resource, publishes its state through a watch channel and
//! swallows fetch errors into a side-channel error value. Every provider tags its
//! fetches with a request generation so that a slow, superseded response can never
//! overwrite a newer one.

mod connection;
mod heatmap;
mod series;
mod stations;

pub use connection::*;
pub use heatmap::*;
pub use series::*;
pub use stations::*;
