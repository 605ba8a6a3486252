//! Run manifest
//!
//! Every non-dry run writes a small manifest next to its outputs so
//! downstream tooling (and humans) can see what produced the files.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub created_at: DateTime<Utc>,
    pub build_id: String,
    pub cohort: String,
    pub snapshot: String,
    pub proposals: usize,
    pub warnings: usize,
    pub cascaded_children: usize,
    pub cascaded_opportunities: usize,
}

pub fn write_manifest(dir: &Path, manifest: &RunManifest) -> Result<()> {
    let path = dir.join("run_manifest.json");
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(&path, json)
        .with_context(|| format!("writing run manifest '{}'", path.display()))?;
    Ok(())
}
