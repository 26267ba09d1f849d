use anyhow::Result;
use tracing::info;

use crate::cli::PurgeArgs;
use crate::store::SqliteStore;

use super::open_existing_store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeSummary {
    pub matches: i64,
    pub predictions: i64,
    pub deleted: bool,
}

pub fn run(args: PurgeArgs) -> Result<()> {
    let store = open_existing_store(&args.store)?;
    let version = args.algorithm_version.as_deref();

    let summary = purge(&store, version, args.cascade_predictions, args.confirm)?;
    if summary.deleted {
        store.touch()?;
        info!(
            algorithm_version = version.unwrap_or("all"),
            matches = summary.matches,
            predictions = summary.predictions,
            "purge completed"
        );
    } else {
        info!(
            algorithm_version = version.unwrap_or("all"),
            matches = summary.matches,
            predictions = summary.predictions,
            "purge preview only; pass --confirm to delete"
        );
    }

    Ok(())
}

pub fn purge(
    store: &SqliteStore,
    algorithm_version: Option<&str>,
    cascade_predictions: bool,
    confirm: bool,
) -> Result<PurgeSummary> {
    if !confirm {
        let predictions = if cascade_predictions {
            store.count_predictions(algorithm_version)?
        } else {
            0
        };
        return Ok(PurgeSummary {
            matches: store.count_matches(algorithm_version)?,
            predictions,
            deleted: false,
        });
    }

    let matches = store.purge_matches(algorithm_version)?;
    let predictions = if cascade_predictions {
        store.purge_predictions(algorithm_version)?
    } else {
        0
    };
    Ok(PurgeSummary {
        matches: matches as i64,
        predictions: predictions as i64,
        deleted: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchRecord, MatchTarget, MatchType, PredictedVote, Prediction};
    use crate::store::{PipelineStore, PredictionKey, ReplaceKey};

    fn seeded_store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        for version in ["kw-1", "kw-2"] {
            let record = MatchRecord {
                promise_code: "SP-1".to_string(),
                party_id: "sp".to_string(),
                target: MatchTarget::Motion,
                target_id: "M-1".to_string(),
                score: 0.8,
                matched_terms: vec!["huur".to_string(), "woningen".to_string()],
                match_type: MatchType::Implicit,
                confidence: 0.3,
                algorithm_name: "keyword-motion".to_string(),
                algorithm_version: version.to_string(),
                rationale: "{}".to_string(),
                review: None,
            };
            let key = ReplaceKey {
                promise_code: "SP-1",
                target: MatchTarget::Motion,
                algorithm_version: version,
            };
            store.replace_matches(&key, &[record]).unwrap();

            let prediction = Prediction {
                motion_id: "M-1".to_string(),
                party_id: "sp".to_string(),
                predicted_vote: PredictedVote::For,
                confidence: 1.0,
                rationale: String::new(),
                actual_vote: None,
                deviates: None,
            };
            let key = PredictionKey {
                motion_id: "M-1",
                algorithm_version: version,
                party_id: None,
            };
            store.replace_predictions(&key, &[prediction]).unwrap();
        }
        store
    }

    #[test]
    fn preview_deletes_nothing() {
        let store = seeded_store();

        let summary = purge(&store, None, true, false).unwrap();

        assert_eq!(
            summary,
            PurgeSummary {
                matches: 2,
                predictions: 2,
                deleted: false,
            }
        );
        assert_eq!(store.count_matches(None).unwrap(), 2);
        assert_eq!(store.count_predictions(None).unwrap(), 2);
    }

    #[test]
    fn confirmed_purge_is_scoped_and_cascades_on_request() {
        let store = seeded_store();

        let summary = purge(&store, Some("kw-1"), false, true).unwrap();
        assert_eq!(summary.matches, 1);
        assert_eq!(summary.predictions, 0);
        assert_eq!(store.count_predictions(Some("kw-1")).unwrap(), 1);

        let summary = purge(&store, Some("kw-2"), true, true).unwrap();
        assert_eq!(summary.matches, 1);
        assert_eq!(summary.predictions, 1);
        assert_eq!(store.count_matches(None).unwrap(), 0);
        assert_eq!(store.count_predictions(None).unwrap(), 1);
    }
}
