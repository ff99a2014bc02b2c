//! CSV ingestion and map persistence for the veil pipeline.
//!
//! Streaming row sources and sinks over [`csv`], pre-pass projections that
//! gather identifier values, join pairs and earliest timestamps from input
//! files, and the on-disk repository for identifier and offset maps.

pub mod csv_io;
pub mod persist;
pub mod projection;

pub use csv_io::{CsvRowSink, CsvRowSource};
pub use persist::MapRepository;
pub use projection::{collect_column_values, collect_earliest_timestamps, collect_join_pairs};
