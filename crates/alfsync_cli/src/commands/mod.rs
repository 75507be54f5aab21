//! CLI command implementations.

pub mod authorities;
pub mod reindex;
pub mod sync;

use alfsync_engine::SyncConfig;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Checkpoint file used when `--checkpoint` is not given.
pub const DEFAULT_CHECKPOINT: &str = "alfsync.checkpoint";

/// Loads connector parameters from a JSON object of string values.
pub fn load_params(path: &Path) -> Result<SyncConfig, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(path)?;
    let params: HashMap<String, String> = serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid parameter file {:?}: {}", path, e))?;
    Ok(SyncConfig::from_params(&params))
}
