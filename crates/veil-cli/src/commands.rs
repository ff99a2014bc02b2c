use std::path::{Path, PathBuf};

use anyhow::Result;

use veil_cli::pipeline::{
    ReidentifyOptions, RunOptions, RunResult, execute_reidentify, execute_run,
};

use crate::cli::{ReidentifyArgs, RunArgs};

pub fn run(args: &RunArgs) -> Result<RunResult> {
    let input_dir = args
        .input_dir
        .clone()
        .unwrap_or_else(|| config_dir(&args.config));
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| input_dir.join("veiled"));
    let map_dir = args
        .map_dir
        .clone()
        .unwrap_or_else(|| output_dir.join("maps"));
    execute_run(&RunOptions {
        config_path: args.config.clone(),
        input_dir,
        output_dir,
        map_dir,
        frozen: args.frozen,
    })
}

pub fn reidentify(args: &ReidentifyArgs) -> Result<RunResult> {
    let input_dir = args
        .input_dir
        .clone()
        .unwrap_or_else(|| config_dir(&args.config));
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| input_dir.join("unveiled"));
    execute_reidentify(&ReidentifyOptions {
        config_path: args.config.clone(),
        input_dir,
        output_dir,
        map_dir: args.map_dir.clone(),
    })
}

fn config_dir(config: &Path) -> PathBuf {
    config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}
