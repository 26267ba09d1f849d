use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::store::SqliteStore;

pub fn run(args: StatusArgs) -> Result<()> {
    let cache_root = &args.store.cache_root;
    let manifest_dir = cache_root.join("manifests");
    let db_path = args.store.resolve_db_path();

    info!(cache_root = %cache_root.display(), "status requested");

    if manifest_dir.is_dir() {
        for (kind, (runs, latest)) in latest_runs(&manifest_dir)? {
            info!(kind = %kind, runs, latest = %latest, "run manifests");
        }
    } else {
        warn!(path = %manifest_dir.display(), "manifest directory missing");
    }

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let store = SqliteStore::open(&db_path)?;
    info!(
        path = %db_path.display(),
        schema_version = %store.metadata_value("db_schema_version")?.unwrap_or_default(),
        updated_at = %store.metadata_value("db_updated_at")?.unwrap_or_default(),
        "database status"
    );
    for (table, rows) in store.table_counts()? {
        info!(table, rows, "table rows");
    }
    for (algorithm_name, algorithm_version, target, rows) in store.match_versions()? {
        info!(
            algorithm_name = %algorithm_name,
            algorithm_version = %algorithm_version,
            target = %target,
            rows,
            "stored matches"
        );
    }

    Ok(())
}

fn latest_runs(manifest_dir: &Path) -> Result<BTreeMap<String, (usize, String)>> {
    let mut runs = BTreeMap::<String, (usize, String)>::new();
    let entries = fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|value| value.to_str()) != Some("json") {
            continue;
        }
        let Some(run_id) = path.file_stem().and_then(|value| value.to_str()) else {
            continue;
        };
        let Some((kind, _)) = run_id.split_once('-') else {
            continue;
        };

        let slot = runs.entry(kind.to_string()).or_default();
        slot.0 += 1;
        if run_id > slot.1.as_str() {
            slot.1 = run_id.to_string();
        }
    }

    Ok(runs)
}
