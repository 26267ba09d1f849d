use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::ScoreArgs;
use crate::config::{PipelineConfig, config_sha256, load_config};
use crate::model::{MatchTarget, PartyConsistencyResult, PromiseConsistency, VoteOutcome};
use crate::pipeline::consistency::{VotedMatch, aggregate_party, promise_consistency};
use crate::pipeline::procedural::ProceduralFilter;
use crate::store::{MatchQuery, PipelineStore, PromiseFilter};
use crate::util::{now_utc_string, write_json_pretty};

use super::open_existing_store;

#[derive(Debug, Clone)]
pub struct ScoreScope {
    pub party_id: Option<String>,
    pub election_year: Option<i32>,
    pub algorithm_version: String,
}

#[derive(Debug, Serialize)]
struct ScoreReport<'a> {
    report_version: u32,
    generated_at: String,
    algorithm_version: &'a str,
    config_sha256: String,
    parties: &'a [PartyConsistencyResult],
}

pub fn run(args: ScoreArgs) -> Result<()> {
    let config = load_config(args.store.config.as_deref())?;
    let store = open_existing_store(&args.store)?;
    let scope = ScoreScope {
        party_id: args.party.clone(),
        election_year: args.year,
        algorithm_version: args.algorithm_version.clone(),
    };

    let results = score_parties(&store, &config, &scope)?;
    for result in &results {
        info!(
            party_id = %result.party_id,
            election_year = result.election_year,
            overall_score = ?result.overall_score,
            rating = ?result.rating,
            total_promises = result.total_promises,
            scored_promises = result.scored_promises,
            insufficient_data_promises = result.insufficient_data_promises,
            "party consistency"
        );
    }

    let report = ScoreReport {
        report_version: 1,
        generated_at: now_utc_string(),
        algorithm_version: &scope.algorithm_version,
        config_sha256: config_sha256(&config)?,
        parties: &results,
    };
    if args.json {
        let rendered =
            serde_json::to_string_pretty(&report).context("failed to serialize score report")?;
        println!("{rendered}");
    }
    if let Some(path) = &args.report_path {
        write_json_pretty(path, &report)?;
        info!(path = %path.display(), "wrote score report");
    }

    Ok(())
}

pub fn score_parties<S: PipelineStore + ?Sized>(
    store: &S,
    config: &PipelineConfig,
    scope: &ScoreScope,
) -> Result<Vec<PartyConsistencyResult>> {
    let promises = store.load_promises(&PromiseFilter {
        party_id: scope.party_id.clone(),
        election_year: scope.election_year,
    })?;
    let matches = store.load_matches(&MatchQuery {
        target: MatchTarget::Motion,
        algorithm_version: &scope.algorithm_version,
        party_id: scope.party_id.as_deref(),
        election_year: scope.election_year,
        target_ids: None,
    })?;

    let mut motion_ids = matches
        .iter()
        .map(|value| value.target_id.clone())
        .collect::<Vec<String>>();
    motion_ids.sort();
    motion_ids.dedup();

    // Motions can turn procedural after matching, through a re-ingested kind
    // or a config override.
    let procedural = ProceduralFilter::new(&config.procedural)?;
    let motions = store.load_motions(&motion_ids)?;
    let excluded = motions
        .values()
        .filter_map(|motion| {
            let exclusion =
                procedural.evaluate(&motion.title, Some(&motion.text), motion.kind.as_deref())?;
            debug!(
                motion_id = %motion.id,
                category = exclusion.category.as_str(),
                "ignoring matches on procedural motion"
            );
            Some(motion.id.as_str())
        })
        .collect::<HashSet<&str>>();
    motion_ids.retain(|motion_id| !excluded.contains(motion_id.as_str()));
    let outcomes = load_outcomes(store, &motion_ids, config.batches.vote_lookup)?;

    let directions = promises
        .iter()
        .map(|promise| (promise.code.as_str(), promise.expected_direction))
        .collect::<HashMap<_, _>>();
    let mut voted = HashMap::<&str, Vec<VotedMatch>>::new();
    for record in &matches {
        if excluded.contains(record.target_id.as_str()) {
            continue;
        }
        let Some(match_type) = record.match_type.reviewed(record.review) else {
            continue;
        };
        let Some(expected) = directions.get(record.promise_code.as_str()) else {
            continue;
        };
        voted
            .entry(record.promise_code.as_str())
            .or_default()
            .push(VotedMatch {
                match_type,
                confidence: record.confidence,
                expected: *expected,
                actual: outcomes
                    .get(&record.target_id)
                    .and_then(|outcome| outcome.party_vote(&record.party_id)),
            });
    }

    let mut parties = BTreeMap::<(&str, i32), Vec<PromiseConsistency>>::new();
    for promise in &promises {
        let promise_matches = voted
            .get(promise.code.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();
        parties
            .entry((promise.party_id.as_str(), promise.election_year))
            .or_default()
            .push(promise_consistency(
                promise,
                promise_matches,
                &config.consistency,
            ));
    }

    Ok(parties
        .into_iter()
        .map(|((party_id, election_year), scores)| {
            aggregate_party(party_id, election_year, scores, &config.consistency)
        })
        .collect())
}

pub(crate) fn load_outcomes<S: PipelineStore + ?Sized>(
    store: &S,
    motion_ids: &[String],
    batch_size: usize,
) -> Result<HashMap<String, VoteOutcome>> {
    let mut outcomes = HashMap::new();
    for chunk in motion_ids.chunks(batch_size.max(1)) {
        outcomes.extend(store.load_vote_outcomes(chunk)?);
    }
    Ok(outcomes)
}
