//! Rendering seams: the GPU capability probe and the map layer descriptors handed to
//! whatever renderer hosts the dashboard.

mod layers;
mod probe;

pub use layers::*;
pub use probe::*;
