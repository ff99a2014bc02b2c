//! File-system repository for identifier and offset maps.
//!
//! One two-column CSV per identifier domain (`<DOMAIN>.ids.csv`, header
//! `original_value,surrogate_value`) plus one `offsets.csv` (header
//! `entity_id,offset_nanoseconds`). Snapshots are append-only between runs:
//! re-importing a snapshot reproduces the exact lookup behavior for every
//! previously exported key, which is what makes re-runs idempotent.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use csv::{ReaderBuilder, WriterBuilder};
use tracing::debug;

use veil_core::{IdentifierMap, OffsetMap};

const ID_MAP_SUFFIX: &str = ".ids.csv";
const OFFSETS_FILE: &str = "offsets.csv";

#[derive(Debug, Clone)]
pub struct MapRepository {
    base_dir: PathBuf,
}

impl MapRepository {
    /// Opens a repository, creating the directory when absent.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("create map repository: {}", base_dir.display()))?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn id_map_path(&self, domain: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}{ID_MAP_SUFFIX}", normalize_id(domain)))
    }

    fn offsets_path(&self) -> PathBuf {
        self.base_dir.join(OFFSETS_FILE)
    }

    pub fn has_id_map(&self, domain: &str) -> bool {
        self.id_map_path(domain).exists()
    }

    pub fn save_id_map(&self, domain: &str, map: &IdentifierMap) -> Result<PathBuf> {
        let path = self.id_map_path(domain);
        let mut writer = WriterBuilder::new()
            .from_path(&path)
            .with_context(|| format!("write id map: {}", path.display()))?;
        writer
            .write_record(["original_value", "surrogate_value"])
            .context("write id map header")?;
        for (original, surrogate) in map.export() {
            writer
                .write_record([original.as_str(), surrogate.to_string().as_str()])
                .with_context(|| format!("write id map entry: {}", path.display()))?;
        }
        writer.flush().context("flush id map")?;
        debug!(domain = %domain, entries = map.len(), path = %path.display(), "id map saved");
        Ok(path)
    }

    /// Loads a domain's map; `None` when no snapshot exists yet.
    pub fn load_id_map(&self, domain: &str) -> Result<Option<IdentifierMap>> {
        let path = self.id_map_path(domain);
        if !path.exists() {
            return Ok(None);
        }
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .with_context(|| format!("read id map: {}", path.display()))?;
        let mut pairs = Vec::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("read id map entry: {}", path.display()))?;
            let original = record.get(0).unwrap_or("").to_string();
            let Some(surrogate) = record.get(1).and_then(|s| s.trim().parse::<u64>().ok()) else {
                bail!("malformed surrogate in {}: {:?}", path.display(), record);
            };
            pairs.push((original, surrogate));
        }
        let map = IdentifierMap::from_pairs(pairs)
            .with_context(|| format!("restore id map: {}", path.display()))?;
        Ok(Some(map))
    }

    pub fn save_offsets(&self, map: &OffsetMap) -> Result<PathBuf> {
        let path = self.offsets_path();
        let mut writer = WriterBuilder::new()
            .from_path(&path)
            .with_context(|| format!("write offsets: {}", path.display()))?;
        writer
            .write_record(["entity_id", "offset_nanoseconds"])
            .context("write offsets header")?;
        for (entity, nanos) in map.export() {
            writer
                .write_record([entity.as_str(), nanos.to_string().as_str()])
                .with_context(|| format!("write offset entry: {}", path.display()))?;
        }
        writer.flush().context("flush offsets")?;
        debug!(entries = map.len(), path = %path.display(), "offset map saved");
        Ok(path)
    }

    /// Loads persisted `(entity_id, offset_nanoseconds)` pairs; the caller
    /// supplies the policy when reconstructing the map.
    pub fn load_offset_pairs(&self) -> Result<Option<Vec<(String, i64)>>> {
        let path = self.offsets_path();
        if !path.exists() {
            return Ok(None);
        }
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .with_context(|| format!("read offsets: {}", path.display()))?;
        let mut pairs = Vec::new();
        for record in reader.records() {
            let record =
                record.with_context(|| format!("read offset entry: {}", path.display()))?;
            let entity = record.get(0).unwrap_or("").to_string();
            let Some(nanos) = record.get(1).and_then(|s| s.trim().parse::<i64>().ok()) else {
                bail!("malformed offset in {}: {:?}", path.display(), record);
            };
            pairs.push((entity, nanos));
        }
        Ok(Some(pairs))
    }
}

/// Normalizes a domain name for use in filenames.
fn normalize_id(id: &str) -> String {
    id.trim()
        .to_uppercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}
