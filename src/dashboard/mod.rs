//! The interactive dashboard: composition root plus the widget state it owns.

mod panel;
mod root;
mod selection;
mod timeline;

pub use panel::*;
pub use root::*;
pub use selection::*;
pub use timeline::*;
