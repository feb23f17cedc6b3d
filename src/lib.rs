//! # osm2mif Library
//!
//! Converts an OpenStreetMap XML extract into a MapInfo MIF/MID file pair,
//! driven by a rule table that selects, styles and splits ways.
//!
//! ## Features
//!
//! - **Rule table**: include, exclude, restyle and retype tag values
//! - **Junction splitting**: ways are cut wherever they share a node
//! - **Turn restrictions**: banned right turns annotated per segment
//! - **Two passes, no temporary files**: the extract is simply read twice
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use osm2mif::{run_convert, ConvertConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConvertConfig::new("brussels.osm", "roads.rules", "out/brussels");
//!     let summary = run_convert(&config)?;
//!     println!("{} records written", summary.records_written);
//!     Ok(())
//! }
//! ```

pub use crate::core::convert::{convert, index_pass, way_pass, WayStats};
pub use crate::core::filter::{Verdict, WayAttributes};
pub use crate::core::index::{EntityIndex, IndexBuilder, Restriction, ScanStats};
pub use crate::core::mif::{format_coordinate, output_path, MifWriter, Record, DEFAULT_STYLE};
pub use crate::core::rules::{BoundingBox, Classification, GeometryType, MatchTier, RuleTable};
pub use crate::core::segment::{Segment, WaySegmenter};
pub use crate::core::source::{Coord, ElementKind, MemberKind, OsmElement, OsmReader, ReadStats};
pub use crate::core::turns::{signed_angle, TurnRestrictionResolver, TurnStats};
pub use crate::core::{run_convert, ConvertConfig, ConvertSummary};
pub use osm2mif_common::{Error, Result};

// Internal modules
mod core;
