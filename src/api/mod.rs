//! Provides clients and utilities for obtaining climate data.
//!
//! Includes:
//! - `client`: Client for the remote climate data API.
//! - `demo`: Built-in station set and synthetic data used when the backend is unavailable.

mod client;
mod demo;

pub use client::*;
pub use demo::*;
