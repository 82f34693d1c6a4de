//! Defines the data structures and models used throughout the dashboard.
//!
//! This includes the records fetched from the climate API, the geographic primitives
//! used to scope queries, and the decoder that normalises the API's listing shapes.

mod decode;
mod geo;
mod station;

pub use decode::*;
pub use geo::*;
pub use station::*;
