use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn run_id(prefix: &str, ts: DateTime<Utc>) -> String {
    format!("{prefix}-{}", ts.format("%Y%m%dT%H%M%S%3fZ"))
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub fn read_required(path: &Path, what: &str) -> Result<Vec<u8>> {
    if !path.is_file() {
        anyhow::bail!("{what} not found: {}", path.display());
    }
    fs::read(path).with_context(|| format!("failed to read {what}: {}", path.display()))
}

pub fn write_manifest<T: Serialize>(cache_root: &Path, run_id: &str, value: &T) -> Result<PathBuf> {
    let path = cache_root.join("manifests").join(format!("{run_id}.json"));
    write_json_pretty(&path, value)?;
    Ok(path)
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let mut data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;
    data.push(b'\n');

    fs::write(path, &data)
        .with_context(|| format!("failed to write json file: {}", path.display()))
}
