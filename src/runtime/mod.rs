//! Scheduling primitives behind the layer-loading pipeline.
//!
//! - `schedule`: the yield point that defers expensive work.
//! - `sequence`: request-generation tokens that discard stale results.
//! - `loader`: the async layer loader.
//! - `lazy`: priority-ordered batch loading of several layers.

mod lazy;
mod loader;
mod schedule;
mod sequence;

pub use lazy::*;
pub use loader::*;
pub use schedule::*;
pub use sequence::*;
