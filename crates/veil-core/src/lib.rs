//! Deterministic, collision-free pseudonymization engine.
//!
//! The engine replaces identifier values with consistent surrogates across
//! files sharing the same entities, and shifts datetimes by an
//! entity-consistent offset so relative spacing survives while absolute
//! dates do not. I/O adapters (CSV reading/writing, config loading, map
//! persistence) live in the ingest and CLI crates.

pub mod alias;
pub mod allocate;
pub mod datetime;
pub mod id_map;
pub mod io;
pub mod join;
pub mod offset;
pub mod pipeline;
pub mod rng;

pub use alias::{DomainPlan, IdentifierDomain};
pub use allocate::SurrogateAllocator;
pub use datetime::{ColumnFormat, DATE_FORMAT, DATE_TIME_FORMAT, FormatSampler, parse_flexible};
pub use id_map::{IdentifierMap, LookupMode};
pub use io::{RowSink, RowSource, VecSink, VecSource};
pub use join::JoinIndex;
pub use offset::{Direction, NANOS_PER_DAY, OffsetMap, OffsetPolicy, shift};
pub use pipeline::{AnchorResolution, Pipeline};
pub use rng::SplitMix64;
