//! Core conversion modules for osm2mif
//!
//! Leaf-first: the rule table and element reader feed the entity index, which
//! the segmenter, turn resolver and MIF writer consume during the second pass.

pub mod convert;
pub mod filter;
pub mod index;
pub mod mif;
pub mod rules;
pub mod segment;
pub mod source;
pub mod turns;

pub use convert::{run_convert, ConvertConfig, ConvertSummary};
