//! CLI library components for the veil pseudonymizer.

pub mod logging;
pub mod pipeline;
