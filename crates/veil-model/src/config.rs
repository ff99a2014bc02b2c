//! Declarative run configuration.
//!
//! Consumed by the CLI from a YAML file, validated once before any
//! processing starts. Contradictory declarations are a fatal
//! [`VeilError::Config`]; nothing here recovers at row level.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VeilError};

/// Default surrogate value space: `[0, 10^9)`.
pub const DEFAULT_SURROGATE_SPACE: u64 = 1_000_000_000;

/// Default bound for randomly drawn offsets, in days.
pub const DEFAULT_MAX_DAYS: i64 = 365;

/// Largest shift range expressible in whole nanoseconds (about 292 years).
pub const MAX_SHIFT_DAYS: i64 = i64::MAX / (86_400 * 1_000_000_000);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeilConfig {
    /// Column name or alias-group name whose values key the offset map.
    pub datetime_base: String,

    /// Bound for the random offset policy, in days.
    #[serde(default = "default_max_days")]
    pub max_days: i64,

    /// Upper bound (exclusive) of the surrogate integer space.
    #[serde(default = "default_surrogate_space")]
    pub surrogate_space: u64,

    /// Seed for surrogate and offset generation. Runs with the same seed,
    /// config, and inputs produce identical outputs.
    #[serde(default)]
    pub seed: Option<u64>,

    /// How per-entity offsets are allocated.
    #[serde(default)]
    pub offset_policy: OffsetPolicyConfig,

    /// Whether random offsets are drawn at whole-day granularity.
    /// Sub-day offsets also shift the time of day.
    #[serde(default = "default_true")]
    pub whole_days: bool,

    /// Alias groups: group name -> member column names. All members share
    /// one substitution table.
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,

    /// Per-file column declarations, keyed by file name.
    pub files: BTreeMap<String, FileConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    /// Identifier columns to substitute.
    #[serde(default)]
    pub id: Vec<String>,

    /// Datetime columns to shift.
    #[serde(default)]
    pub datetime: Vec<String>,

    /// Columns dropped from the output entirely.
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OffsetPolicyConfig {
    /// One offset per entity, uniform in `[-max_days, +max_days]`, never zero.
    #[default]
    Random,
    /// Offset = entity's earliest observed timestamp minus midnight of
    /// January 1 of that timestamp's year.
    YearStart,
}

fn default_max_days() -> i64 {
    DEFAULT_MAX_DAYS
}

fn default_surrogate_space() -> u64 {
    DEFAULT_SURROGATE_SPACE
}

fn default_true() -> bool {
    true
}

impl VeilConfig {
    /// Validates the configuration. Called once by the CLI before any file
    /// is opened.
    pub fn validate(&self) -> Result<()> {
        if self.datetime_base.trim().is_empty() {
            return Err(VeilError::Config("datetime_base must not be empty".into()));
        }
        if self.files.is_empty() {
            return Err(VeilError::Config("no files declared".into()));
        }
        if self.surrogate_space == 0 {
            return Err(VeilError::Config("surrogate_space must be positive".into()));
        }
        if self.offset_policy == OffsetPolicyConfig::Random {
            if self.max_days <= 0 {
                return Err(VeilError::Config(
                    "max_days must be positive for the random offset policy".into(),
                ));
            }
            if self.max_days > MAX_SHIFT_DAYS {
                return Err(VeilError::Config(format!(
                    "max_days {} exceeds the supported maximum of {MAX_SHIFT_DAYS} days",
                    self.max_days
                )));
            }
        }
        for (group, members) in &self.aliases {
            if members.is_empty() {
                return Err(VeilError::Config(format!(
                    "alias group '{group}' has no member columns"
                )));
            }
        }
        for (file, decl) in &self.files {
            let Some(excluded) = &decl.exclude else {
                continue;
            };
            for column in excluded {
                if decl.id.contains(column) || decl.datetime.contains(column) {
                    return Err(VeilError::Config(format!(
                        "file '{file}': column '{column}' is both excluded and declared for processing"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{OffsetPolicyConfig, VeilConfig};

    fn minimal() -> VeilConfig {
        serde_json::from_str(
            r#"{
                "datetime_base": "patient_id",
                "files": {
                    "visits.csv": {
                        "id": ["patient_id"],
                        "datetime": ["admit_date"]
                    }
                }
            }"#,
        )
        .expect("parse config")
    }

    #[test]
    fn defaults_applied() {
        let config = minimal();
        assert_eq!(config.max_days, 365);
        assert_eq!(config.surrogate_space, 1_000_000_000);
        assert_eq!(config.offset_policy, OffsetPolicyConfig::Random);
        assert!(config.whole_days);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn excluded_processing_column_rejected() {
        let mut config = minimal();
        let decl = config.files.get_mut("visits.csv").unwrap();
        decl.exclude = Some(vec!["patient_id".to_string()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_alias_group_rejected() {
        let mut config = minimal();
        config.aliases.insert("subject".to_string(), Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn nonpositive_max_days_rejected() {
        let mut config = minimal();
        config.max_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn max_days_past_nanosecond_range_rejected() {
        let mut config = minimal();
        config.max_days = 200_000;
        assert!(config.validate().is_err());
        config.max_days = super::MAX_SHIFT_DAYS;
        assert!(config.validate().is_ok());
    }
}
