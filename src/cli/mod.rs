//! CLI-specific utilities for osm2mif
//!
//! Output that only makes sense on a terminal lives here, separate from the
//! conversion library.

pub mod report;

pub use report::render_summary;
