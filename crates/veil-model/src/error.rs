use thiserror::Error;

/// Fatal errors. Per-field problems (lookup misses, unparsable datetimes)
/// are not errors; they degrade the field to missing and are counted in the
/// run summary instead.
#[derive(Debug, Error)]
pub enum VeilError {
    #[error("config error: {0}")]
    Config(String),
    #[error(
        "surrogate space exhausted: {needed} values requested but only {available} remain in [0, {space})"
    )]
    CapacityExceeded {
        needed: u64,
        available: u64,
        space: u64,
    },
    #[error("surrogate column '{0}' collides with the identifier column name")]
    NameCollision(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, VeilError>;
