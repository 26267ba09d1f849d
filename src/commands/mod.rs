pub mod ingest;
pub mod matching;
pub mod predict;
pub mod purge;
pub mod review;
pub mod score;
pub mod status;

use anyhow::{Result, bail};
use tracing::warn;

use crate::cli::StoreArgs;
use crate::store::SqliteStore;

pub(crate) fn open_existing_store(args: &StoreArgs) -> Result<SqliteStore> {
    let db_path = args.resolve_db_path();
    if !db_path.is_file() {
        bail!(
            "database not found: {} (run ingest first)",
            db_path.display()
        );
    }
    SqliteStore::open(&db_path)
}

/// A run over an algorithm version that already has stored rows replaces
/// them. Without `confirm` such a run only previews.
pub(crate) fn preview_unless_confirmed(
    dry_run: bool,
    confirm: bool,
    stored_rows: i64,
    algorithm_version: &str,
) -> bool {
    if dry_run || confirm || stored_rows == 0 {
        return dry_run;
    }
    warn!(
        algorithm_version,
        stored_rows,
        "stored rows would be replaced; previewing only, pass --confirm to overwrite"
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rerun_over_stored_rows_needs_confirmation() {
        assert!(!preview_unless_confirmed(false, false, 0, "kw-1"));
        assert!(preview_unless_confirmed(false, false, 12, "kw-1"));
        assert!(!preview_unless_confirmed(false, true, 12, "kw-1"));
        assert!(preview_unless_confirmed(true, true, 12, "kw-1"));
    }
}
