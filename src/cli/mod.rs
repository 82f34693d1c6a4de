//! Terminal front-end.
//!
//! Defines the clap command surface, the `App` that drives a `Dashboard` from those
//! commands, and the prompts, tables and spinners used by the interactive menu.

mod commands;

pub use commands::*;
