pub mod config;
pub mod error;
pub mod row;
pub mod summary;

pub use config::{FileConfig, OffsetPolicyConfig, VeilConfig};
pub use error::{Result, VeilError};
pub use row::{Row, Value};
pub use summary::{FileSummary, RunSummary, ShiftStatus};
