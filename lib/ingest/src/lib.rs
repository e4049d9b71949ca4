//! # Toolcat Ingest
//!
//! Reads a wide source extract (CSV or JSON) and normalizes it into the
//! relational model: one entity table, one link table per multi-valued
//! attribute group, and a geography table.

pub mod normalizer;
pub mod source;

pub use normalizer::{split_multi, NormalizeReport, Normalized, Normalizer};
pub use source::{SourceExtract, SourceRecord, SourceTable};
