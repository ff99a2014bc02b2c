//! Run orchestration: config loading, map restoration, pre-scan passes,
//! and the per-file processing loop shared by `run` and `reidentify`.
//!
//! Files are processed in config declaration order (alphabetical by file
//! name). Pre-scan passes all happen before the first row is written, so a
//! run either has every surrogate and offset it needs or fails before
//! touching the output directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use tracing::{debug, info, info_span, trace, warn};

use veil_core::{
    AnchorResolution, Direction, DomainPlan, JoinIndex, LookupMode, OffsetMap, OffsetPolicy,
    Pipeline, RowSource, SplitMix64, SurrogateAllocator,
};
use veil_ingest::{
    CsvRowSink, CsvRowSource, MapRepository, collect_column_values, collect_earliest_timestamps,
    collect_join_pairs,
};
use veil_model::{OffsetPolicyConfig, RunSummary, VeilConfig};

use crate::logging::redact_value;

/// Decorrelates offset draws from surrogate draws under a shared seed.
const OFFSET_STREAM_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

pub struct RunOptions {
    pub config_path: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub map_dir: PathBuf,
    /// Frozen maps: unseen identifiers degrade to null instead of
    /// allocating new surrogates.
    pub frozen: bool,
}

pub struct ReidentifyOptions {
    pub config_path: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub map_dir: PathBuf,
}

#[derive(Debug)]
pub struct RunResult {
    pub output_dir: PathBuf,
    pub map_dir: PathBuf,
    pub summary: RunSummary,
    pub errors: Vec<String>,
    pub has_errors: bool,
}

/// Loads and validates a YAML run configuration.
pub fn load_config(path: &Path) -> Result<VeilConfig> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read config: {}", path.display()))?;
    let config: VeilConfig =
        serde_yaml::from_str(&text).with_context(|| format!("parse config: {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {}", path.display()))?;
    Ok(config)
}

fn offset_policy(config: &VeilConfig) -> OffsetPolicy {
    match config.offset_policy {
        OffsetPolicyConfig::Random => OffsetPolicy::Random {
            max_days: config.max_days,
            whole_days: config.whole_days,
        },
        OffsetPolicyConfig::YearStart => OffsetPolicy::YearStart,
    }
}

/// Pseudonymizes every declared file into the output directory, extending
/// and persisting the identifier and offset maps.
pub fn execute_run(opts: &RunOptions) -> Result<RunResult> {
    let config = load_config(&opts.config_path)?;
    let span = info_span!("run", config = %opts.config_path.display());
    let _guard = span.enter();

    let plan = DomainPlan::resolve(&config)?;
    let policy = offset_policy(&config);
    let repo = MapRepository::new(&opts.map_dir)?;
    let offsets = match repo.load_offset_pairs()? {
        Some(pairs) => OffsetMap::from_pairs(policy, pairs)?,
        None => OffsetMap::new(policy),
    };
    let allocator = match config.seed {
        Some(seed) => SurrogateAllocator::with_seed(config.surrogate_space, seed),
        None => SurrogateAllocator::new(config.surrogate_space),
    };
    let offset_rng = match config.seed {
        Some(seed) => SplitMix64::new(seed ^ OFFSET_STREAM_SALT),
        None => SplitMix64::from_entropy(),
    };
    let mode = if opts.frozen {
        LookupMode::Frozen
    } else {
        LookupMode::Update
    };
    let mut pipeline = Pipeline::new(plan, offsets, allocator, &config.datetime_base)
        .with_mode(mode)
        .with_offset_rng(offset_rng);
    restore_id_maps(&repo, &mut pipeline)?;

    let mut errors = Vec::new();
    let headers_by_file = read_headers(&config, &opts.input_dir, &mut errors)?;

    if mode == LookupMode::Update {
        seed_domains(&config, &opts.input_dir, &headers_by_file, &mut pipeline)?;
        if matches!(policy, OffsetPolicy::YearStart) {
            register_year_start_anchors(&config, &opts.input_dir, &headers_by_file, &mut pipeline)?;
        }
    }

    let summary = process_files(
        &config,
        &opts.input_dir,
        &opts.output_dir,
        &headers_by_file,
        Direction::Forward,
        &mut pipeline,
    )?;

    persist_maps(&repo, &pipeline)?;

    let has_errors = !errors.is_empty();
    Ok(RunResult {
        output_dir: opts.output_dir.clone(),
        map_dir: opts.map_dir.clone(),
        summary,
        errors,
        has_errors,
    })
}

/// Restores originals from previously veiled files. Maps are read-only:
/// every identifier and offset must already be persisted.
pub fn execute_reidentify(opts: &ReidentifyOptions) -> Result<RunResult> {
    let config = load_config(&opts.config_path)?;
    let span = info_span!("reidentify", config = %opts.config_path.display());
    let _guard = span.enter();

    let plan = DomainPlan::resolve(&config)?;
    let policy = offset_policy(&config);
    let repo = MapRepository::new(&opts.map_dir)?;
    let wants_shift = config.files.values().any(|decl| !decl.datetime.is_empty());
    let offsets = match repo.load_offset_pairs()? {
        Some(pairs) => OffsetMap::from_pairs(policy, pairs)?,
        None if wants_shift => bail!(
            "no persisted offsets in {}; cannot reverse datetime shifts",
            opts.map_dir.display()
        ),
        None => OffsetMap::new(policy),
    };
    let mut pipeline = Pipeline::new(
        plan,
        offsets,
        SurrogateAllocator::new(config.surrogate_space),
        &config.datetime_base,
    )
    .with_mode(LookupMode::Frozen);

    let domain_names: Vec<String> = pipeline
        .plan()
        .domains()
        .iter()
        .map(|d| d.name.clone())
        .collect();
    for name in &domain_names {
        match repo.load_id_map(name)? {
            Some(map) => pipeline.restore_id_map(name, map)?,
            None => bail!(
                "no persisted identifier map for domain '{name}' in {}",
                opts.map_dir.display()
            ),
        }
    }

    let mut errors = Vec::new();
    let headers_by_file = read_headers(&config, &opts.input_dir, &mut errors)?;
    let summary = process_files(
        &config,
        &opts.input_dir,
        &opts.output_dir,
        &headers_by_file,
        Direction::Reverse,
        &mut pipeline,
    )?;

    let has_errors = !errors.is_empty();
    Ok(RunResult {
        output_dir: opts.output_dir.clone(),
        map_dir: opts.map_dir.clone(),
        summary,
        errors,
        has_errors,
    })
}

fn restore_id_maps(repo: &MapRepository, pipeline: &mut Pipeline) -> Result<()> {
    let domain_names: Vec<String> = pipeline
        .plan()
        .domains()
        .iter()
        .map(|d| d.name.clone())
        .collect();
    for name in &domain_names {
        if let Some(map) = repo.load_id_map(name)? {
            debug!(domain = %name, entries = map.len(), "restored identifier map");
            pipeline.restore_id_map(name, map)?;
        }
    }
    Ok(())
}

/// Reads the header row of every declared file. Missing files are recorded
/// as run errors and skipped by later passes.
fn read_headers(
    config: &VeilConfig,
    input_dir: &Path,
    errors: &mut Vec<String>,
) -> Result<BTreeMap<String, Vec<String>>> {
    let mut headers = BTreeMap::new();
    for file in config.files.keys() {
        let path = input_dir.join(file);
        if !path.exists() {
            warn!(file = %file, "declared input file not found");
            errors.push(format!("{file}: not found in {}", input_dir.display()));
            continue;
        }
        let mut source = CsvRowSource::open(&path)?;
        headers.insert(file.clone(), source.field_names()?);
    }
    Ok(headers)
}

/// Projection pass that assigns surrogates for every identifier value
/// before any row is transformed. Cross-file consistency falls out: a
/// value seen in two files hits the same domain map.
fn seed_domains(
    config: &VeilConfig,
    input_dir: &Path,
    headers_by_file: &BTreeMap<String, Vec<String>>,
    pipeline: &mut Pipeline,
) -> Result<()> {
    for (file, decl) in &config.files {
        let Some(headers) = headers_by_file.get(file) else {
            continue;
        };
        let columns: Vec<String> = decl
            .id
            .iter()
            .filter(|c| headers.contains(c))
            .cloned()
            .collect();
        if columns.is_empty() {
            continue;
        }
        let values = collect_column_values(&input_dir.join(file), &columns)?;
        for (column, observed) in values {
            let Some(idx) = pipeline.plan().domain_of(&column) else {
                continue;
            };
            let domain = pipeline.plan().domain(idx).name.clone();
            debug!(file = %file, column = %column, values = observed.len(), "seeding domain");
            for value in &observed {
                trace!(column = %column, value = %redact_value(value), "observed identifier");
            }
            pipeline.seed_domain_values(&domain, observed)?;
        }
    }
    Ok(())
}

/// Finds each anchor entity's earliest timestamp across all declared files
/// and registers it as the year-start reference point.
fn register_year_start_anchors(
    config: &VeilConfig,
    input_dir: &Path,
    headers_by_file: &BTreeMap<String, Vec<String>>,
    pipeline: &mut Pipeline,
) -> Result<()> {
    let mut earliest: BTreeMap<String, NaiveDateTime> = BTreeMap::new();
    for (file, decl) in &config.files {
        if decl.datetime.is_empty() {
            continue;
        }
        let Some(headers) = headers_by_file.get(file) else {
            continue;
        };
        let Some(anchor_column) = pipeline.resolve_anchor_column(headers) else {
            continue;
        };
        let observed =
            collect_earliest_timestamps(&input_dir.join(file), anchor_column, &decl.datetime)?;
        for (entity, ts) in observed {
            earliest
                .entry(entity)
                .and_modify(|current| {
                    if ts < *current {
                        *current = ts;
                    }
                })
                .or_insert(ts);
        }
    }
    info!(entities = earliest.len(), "year-start anchors resolved");
    for (entity, ts) in earliest {
        pipeline.offsets_mut().register_year_start_anchor(&entity, ts);
    }
    Ok(())
}

/// Attaches an anchor to a file that lacks one directly: a declared id
/// column shared with another file that does carry the anchor becomes the
/// join key.
///
/// In the reverse direction the other file holds surrogates, but the key
/// cell has already been restored to its original by the time the index is
/// consulted, so the collected pairs are translated back through the
/// identifier maps first.
fn joined_anchor(
    config: &VeilConfig,
    input_dir: &Path,
    headers_by_file: &BTreeMap<String, Vec<String>>,
    pipeline: &Pipeline,
    file: &str,
    direction: Direction,
) -> Result<AnchorResolution> {
    let Some(headers) = headers_by_file.get(file) else {
        return Ok(AnchorResolution::Skipped);
    };
    let decl = &config.files[file];
    for key in &decl.id {
        if !headers.contains(key) {
            continue;
        }
        let key_domain = pipeline.plan().domain_of(key);
        for (other, _) in config.files.iter().filter(|(name, _)| name.as_str() != file) {
            let Some(other_headers) = headers_by_file.get(other) else {
                continue;
            };
            let Some(anchor_column) = pipeline.resolve_anchor_column(other_headers) else {
                continue;
            };
            // The key may appear under an alias-group member name there.
            let Some(other_key) = other_headers
                .iter()
                .find(|h| key_domain.is_some() && pipeline.plan().domain_of(h) == key_domain)
            else {
                continue;
            };
            let pairs = collect_join_pairs(&input_dir.join(other), other_key, anchor_column)?;
            let pairs = match direction {
                Direction::Forward => pairs,
                Direction::Reverse => {
                    let anchor_domain = pipeline.plan().domain_of(anchor_column);
                    pairs
                        .into_iter()
                        .filter_map(|(key, anchor)| {
                            let key = invert_value(pipeline, key_domain, &key)?;
                            let anchor = invert_value(pipeline, anchor_domain, &anchor)?;
                            Some((key, anchor))
                        })
                        .collect()
                }
            };
            let index = JoinIndex::build(pairs);
            if index.is_empty() {
                continue;
            }
            info!(
                file = %file,
                key = %key,
                via = %other,
                entries = index.len(),
                "anchor attached through join"
            );
            return Ok(AnchorResolution::Joined {
                key_column: key.clone(),
                index,
            });
        }
    }
    Ok(AnchorResolution::Skipped)
}

/// Maps a surrogate cell back to its original through the domain's
/// identifier map. Columns outside every domain pass through unchanged.
fn invert_value(pipeline: &Pipeline, domain: Option<usize>, value: &str) -> Option<String> {
    let Some(idx) = domain else {
        return Some(value.to_string());
    };
    let name = &pipeline.plan().domain(idx).name;
    let map = pipeline.id_map(name)?;
    value
        .parse::<u64>()
        .ok()
        .and_then(|surrogate| map.invert(surrogate))
        .map(str::to_string)
}

fn process_files(
    config: &VeilConfig,
    input_dir: &Path,
    output_dir: &Path,
    headers_by_file: &BTreeMap<String, Vec<String>>,
    direction: Direction,
    pipeline: &mut Pipeline,
) -> Result<RunSummary> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("create output dir: {}", output_dir.display()))?;
    let mut summary = RunSummary::default();
    for (file, decl) in &config.files {
        let Some(headers) = headers_by_file.get(file) else {
            continue;
        };
        let anchor = if decl.datetime.is_empty() {
            AnchorResolution::Skipped
        } else if let Some(column) = pipeline.resolve_anchor_column(headers) {
            AnchorResolution::Column(column.to_string())
        } else {
            joined_anchor(config, input_dir, headers_by_file, pipeline, file, direction)?
        };
        let input_path = input_dir.join(file);
        let output_path = output_dir.join(file);
        info!(file = %file, "processing");
        let mut source = CsvRowSource::open(&input_path)?;
        let mut sink = CsvRowSink::create(&output_path)?;
        let file_summary = pipeline
            .process_file(file, decl, anchor, direction, &mut source, &mut sink)
            .with_context(|| format!("process {file}"))?;
        sink.into_inner()?;
        summary.push(file_summary);
    }
    Ok(summary)
}

fn persist_maps(repo: &MapRepository, pipeline: &Pipeline) -> Result<()> {
    for domain in pipeline.plan().domains() {
        if let Some(map) = pipeline.id_map(&domain.name) {
            repo.save_id_map(&domain.name, map)?;
        }
    }
    repo.save_offsets(pipeline.offsets())?;
    Ok(())
}
