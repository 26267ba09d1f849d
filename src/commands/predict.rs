use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, error, info};

use crate::cli::PredictArgs;
use crate::config::{PipelineConfig, config_sha256, load_config};
use crate::model::{
    MatchTarget, MotionKind, PredictRunCounts, PredictRunManifest, PredictedVote, VoteDirection,
};
use crate::pipeline::predictor::{PromiseSignal, VotePredictor};
use crate::pipeline::procedural::ProceduralFilter;
use crate::store::{MatchQuery, PipelineStore, PredictionKey, PromiseFilter};
use crate::util::{now_utc_string, run_id, write_manifest};

use super::{open_existing_store, preview_unless_confirmed};
use super::score::load_outcomes;

#[derive(Debug, Clone)]
pub struct PredictOptions {
    pub party_id: Option<String>,
    pub limit: Option<usize>,
    pub algorithm_version: String,
    pub dry_run: bool,
}

pub fn run(args: PredictArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = run_id("predict", started_ts);

    let config = load_config(args.store.config.as_deref())?;
    let config_sha256 = config_sha256(&config)?;
    let mut store = open_existing_store(&args.store)?;

    let stored = store.count_predictions(Some(&args.algorithm_version))?;
    let options = PredictOptions {
        party_id: args.party.clone(),
        limit: args.limit,
        algorithm_version: args.algorithm_version.clone(),
        dry_run: preview_unless_confirmed(
            args.dry_run,
            args.confirm,
            stored,
            &args.algorithm_version,
        ),
    };

    info!(
        run_id = %run_id,
        algorithm_version = %options.algorithm_version,
        party = options.party_id.as_deref().unwrap_or("all"),
        dry_run = options.dry_run,
        "starting prediction run"
    );

    let counts = predict_motions(&mut store, &config, &options)?;
    if !options.dry_run {
        store.touch()?;
    }

    info!(
        motions_scanned = counts.motions_scanned,
        procedural_excluded = counts.procedural_excluded,
        motions_predicted = counts.motions_predicted,
        predictions = counts.predictions,
        unknown = counts.unknown_predictions,
        deviations = counts.deviations,
        motions_failed = counts.motions_failed,
        "prediction run completed"
    );

    let manifest = PredictRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        started_at,
        updated_at: now_utc_string(),
        algorithm_version: options.algorithm_version,
        config_sha256,
        party_filter: options.party_id,
        dry_run: options.dry_run,
        counts,
    };
    let manifest_path = write_manifest(&args.store.cache_root, &run_id, &manifest)?;
    info!(path = %manifest_path.display(), "wrote prediction manifest");

    Ok(())
}

pub fn predict_motions<S: PipelineStore>(
    store: &mut S,
    config: &PipelineConfig,
    options: &PredictOptions,
) -> Result<PredictRunCounts> {
    let mut counts = PredictRunCounts::default();
    let procedural = ProceduralFilter::new(&config.procedural)?;
    let predictor = VotePredictor::new(&config.prediction);

    let directions = store
        .load_promises(&PromiseFilter {
            party_id: options.party_id.clone(),
            election_year: None,
        })?
        .into_iter()
        .map(|promise| (promise.code, promise.expected_direction))
        .collect::<HashMap<String, VoteDirection>>();

    // Paged by hand rather than through CandidatePages: predictions are
    // written between pages.
    let page_size = config.batches.motions.max(1);
    let mut cursor: Option<String> = None;
    loop {
        let page = store.load_candidates(cursor.as_deref(), page_size)?;
        let Some(last) = page.last() else {
            break;
        };
        cursor = Some(last.id.clone());
        let exhausted = page.len() < page_size;

        let mut motion_ids = Vec::<String>::with_capacity(page.len());
        for motion in &page {
            counts.motions_scanned += 1;
            let kind =
                procedural.classify(&motion.title, Some(&motion.text), motion.kind.as_deref());
            if kind != MotionKind::Ordinary {
                counts.procedural_excluded += 1;
                debug!(
                    motion_id = %motion.id,
                    category = kind.as_str(),
                    "skipping procedural motion"
                );
                continue;
            }
            motion_ids.push(motion.id.clone());
        }

        let signals = load_signals(&*store, &motion_ids, &directions, options)?;
        let outcomes = load_outcomes(&*store, &motion_ids, config.batches.vote_lookup)?;

        for motion_id in &motion_ids {
            if options
                .limit
                .is_some_and(|limit| counts.motions_predicted >= limit)
            {
                return Ok(counts);
            }

            let motion_signals = signals
                .get(motion_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let predictions =
                predictor.predict(motion_id, motion_signals, outcomes.get(motion_id));
            if !predictions.is_empty() {
                counts.motions_predicted += 1;
                counts.predictions += predictions.len();
                counts.unknown_predictions += predictions
                    .iter()
                    .filter(|value| value.predicted_vote == PredictedVote::Unknown)
                    .count();
                counts.deviations += predictions
                    .iter()
                    .filter(|value| value.deviates == Some(true))
                    .count();
            }

            if options.dry_run {
                continue;
            }
            let key = PredictionKey {
                motion_id: motion_id.as_str(),
                algorithm_version: &options.algorithm_version,
                party_id: options.party_id.as_deref(),
            };
            if let Err(err) = store.replace_predictions(&key, &predictions) {
                counts.motions_failed += 1;
                error!(motion_id = %motion_id, error = %err, "failed to persist predictions");
            }
        }

        if exhausted {
            break;
        }
    }

    Ok(counts)
}

fn load_signals<S: PipelineStore + ?Sized>(
    store: &S,
    motion_ids: &[String],
    directions: &HashMap<String, VoteDirection>,
    options: &PredictOptions,
) -> Result<HashMap<String, Vec<PromiseSignal>>> {
    let mut signals = HashMap::<String, Vec<PromiseSignal>>::new();
    if motion_ids.is_empty() {
        return Ok(signals);
    }

    let matches = store.load_matches(&MatchQuery {
        target: MatchTarget::Motion,
        algorithm_version: &options.algorithm_version,
        party_id: options.party_id.as_deref(),
        election_year: None,
        target_ids: Some(motion_ids),
    })?;

    for record in matches {
        let Some(match_type) = record.match_type.reviewed(record.review) else {
            continue;
        };
        let Some(expected) = directions.get(&record.promise_code).copied() else {
            continue;
        };
        signals
            .entry(record.target_id)
            .or_default()
            .push(PromiseSignal {
                promise_code: record.promise_code,
                party_id: record.party_id,
                match_type,
                confidence: record.confidence,
                expected,
            });
    }

    Ok(signals)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::model::{
        MatchRecord, MatchType, Motion, PartyVote, Promise, ReviewStatus, Specificity, Theme,
        VoteOutcome,
    };
    use crate::store::{ReplaceKey, SqliteStore};

    const VERSION: &str = "kw-test";

    fn promise(code: &str, party_id: &str, expected_direction: VoteDirection) -> Promise {
        Promise {
            code: code.to_string(),
            party_id: party_id.to_string(),
            election_year: 2023,
            text: format!("belofte {code}"),
            summary: format!("belofte {code}"),
            theme: Theme::Housing,
            specificity: Specificity::Directional,
            expected_direction,
        }
    }

    fn motion(id: &str, kind: Option<&str>) -> Motion {
        Motion {
            id: id.to_string(),
            title: format!("Motie {id}"),
            text: "verzoekt de regering meer sociale huurwoningen te bouwen".to_string(),
            introduced: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            kind: kind.map(ToOwned::to_owned),
        }
    }

    fn record(
        promise_code: &str,
        party_id: &str,
        motion_id: &str,
        match_type: MatchType,
        confidence: f64,
    ) -> MatchRecord {
        MatchRecord {
            promise_code: promise_code.to_string(),
            party_id: party_id.to_string(),
            target: MatchTarget::Motion,
            target_id: motion_id.to_string(),
            score: 1.0,
            matched_terms: Vec::new(),
            match_type,
            confidence,
            algorithm_name: "keyword-motion".to_string(),
            algorithm_version: VERSION.to_string(),
            rationale: "{}".to_string(),
            review: None,
        }
    }

    fn options(party_id: Option<&str>, dry_run: bool) -> PredictOptions {
        PredictOptions {
            party_id: party_id.map(ToOwned::to_owned),
            limit: None,
            algorithm_version: VERSION.to_string(),
            dry_run,
        }
    }

    fn seeded_store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        for party in ["sp", "vvd"] {
            store.upsert_party(party, party).unwrap();
            store.upsert_program(party, 2023, None).unwrap();
        }
        store
            .upsert_promise(&promise("SP-1", "sp", VoteDirection::For))
            .unwrap();
        store
            .upsert_promise(&promise("VVD-1", "vvd", VoteDirection::Against))
            .unwrap();
        store.upsert_motion(&motion("M-1", None)).unwrap();
        store
            .upsert_motion(&motion("M-2", Some("Ordevoorstel")))
            .unwrap();

        let matches = [
            (
                "SP-1",
                vec![
                    record("SP-1", "sp", "M-1", MatchType::Explicit, 0.9),
                    record("SP-1", "sp", "M-2", MatchType::Explicit, 0.9),
                ],
            ),
            (
                "VVD-1",
                vec![record("VVD-1", "vvd", "M-1", MatchType::Implicit, 0.6)],
            ),
        ];
        for (promise_code, records) in matches {
            let key = ReplaceKey {
                promise_code,
                target: MatchTarget::Motion,
                algorithm_version: VERSION,
            };
            store.replace_matches(&key, &records).unwrap();
        }

        store
            .upsert_vote_outcome(&VoteOutcome {
                motion_id: "M-1".to_string(),
                result: "aangenomen".to_string(),
                total_for: 29,
                total_against: 0,
                total_abstain: 0,
                party_votes: vec![
                    PartyVote {
                        party_id: "sp".to_string(),
                        vote: Some(VoteDirection::For),
                        seats: 5,
                    },
                    PartyVote {
                        party_id: "vvd".to_string(),
                        vote: Some(VoteDirection::For),
                        seats: 24,
                    },
                ],
            })
            .unwrap();
        store
    }

    fn stored_votes(store: &SqliteStore) -> Vec<(String, String, Option<bool>)> {
        let mut statement = store
            .connection()
            .prepare(
                "
                SELECT party_id, predicted_vote, deviates
                FROM predictions
                ORDER BY motion_id, party_id
                ",
            )
            .unwrap();
        statement
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn predicts_per_party_and_flags_deviations() {
        let mut store = seeded_store();
        let config = PipelineConfig::default();

        let counts = predict_motions(&mut store, &config, &options(None, false)).unwrap();

        assert_eq!(counts.motions_scanned, 2);
        assert_eq!(counts.procedural_excluded, 1);
        assert_eq!(counts.motions_predicted, 1);
        assert_eq!(counts.predictions, 2);
        assert_eq!(counts.unknown_predictions, 0);
        assert_eq!(counts.deviations, 1);
        assert_eq!(
            stored_votes(&store),
            vec![
                ("sp".to_string(), "FOR".to_string(), Some(false)),
                ("vvd".to_string(), "AGAINST".to_string(), Some(true)),
            ]
        );
    }

    #[test]
    fn party_scoped_rerun_leaves_other_parties_alone() {
        let mut store = seeded_store();
        let config = PipelineConfig::default();
        predict_motions(&mut store, &config, &options(None, false)).unwrap();

        store
            .set_review("SP-1", "M-1", VERSION, ReviewStatus::Incorrect, None)
            .unwrap();
        let counts = predict_motions(&mut store, &config, &options(Some("sp"), false)).unwrap();

        assert_eq!(counts.motions_predicted, 0);
        assert_eq!(
            stored_votes(&store),
            vec![("vvd".to_string(), "AGAINST".to_string(), Some(true))]
        );
    }

    #[test]
    fn dry_run_and_limit_write_nothing_beyond_cap() {
        let mut store = seeded_store();
        let config = PipelineConfig::default();

        let counts = predict_motions(&mut store, &config, &options(None, true)).unwrap();
        assert_eq!(counts.predictions, 2);
        assert_eq!(store.count_predictions(None).unwrap(), 0);

        let capped = PredictOptions {
            limit: Some(0),
            ..options(None, false)
        };
        let counts = predict_motions(&mut store, &config, &capped).unwrap();
        assert_eq!(counts.motions_predicted, 0);
        assert_eq!(store.count_predictions(None).unwrap(), 0);
    }
}
