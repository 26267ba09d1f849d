use std::collections::BTreeMap;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::cli::MatchArgs;
use crate::config::{PipelineConfig, config_sha256, load_config};
use crate::model::{MatchRunCounts, MatchRunManifest, MatchTarget, Promise};
use crate::pipeline::aggregator::{MatchAggregator, RecordContext, dedupe_by_summary, to_records};
use crate::pipeline::keywords::KeywordExtractor;
use crate::pipeline::procedural::ProceduralFilter;
use crate::pipeline::scorer::{MatchScorer, Normalization, PreparedCandidate, PreparedPromise};
use crate::store::{CandidatePages, PipelineStore, PromiseFilter, ReplaceKey};
use crate::util::{now_utc_string, run_id, write_manifest};

use super::{open_existing_store, preview_unless_confirmed};

pub const MOTION_ALGORITHM: &str = "keyword-motion";
pub const PASSAGE_ALGORITHM: &str = "keyword-passage";

#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub party_id: Option<String>,
    pub election_year: Option<i32>,
    pub limit: Option<usize>,
    pub algorithm_version: String,
    pub dry_run: bool,
}

pub fn run(args: MatchArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = run_id("match", started_ts);

    let config = load_config(args.store.config.as_deref())?;
    let config_sha256 = config_sha256(&config)?;
    let mut store = open_existing_store(&args.store)?;

    let stored = store.count_target_matches(args.target, &args.algorithm_version)?;
    let options = MatchOptions {
        party_id: args.party.clone(),
        election_year: args.year,
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
        target = args.target.as_str(),
        algorithm_version = %options.algorithm_version,
        party = options.party_id.as_deref().unwrap_or("all"),
        dry_run = options.dry_run,
        "starting match run"
    );

    let (algorithm_name, counts) = match args.target {
        MatchTarget::Motion => (MOTION_ALGORITHM, match_motions(&mut store, &config, &options)?),
        MatchTarget::Passage => (
            PASSAGE_ALGORITHM,
            match_passages(&mut store, &config, &options)?,
        ),
    };
    if !options.dry_run {
        store.touch()?;
    }

    info!(
        promises = counts.promises_considered,
        duplicates_dropped = counts.duplicate_promises_dropped,
        candidates = counts.candidates_scanned,
        procedural_excluded = counts.procedural_excluded,
        out_of_scope = counts.out_of_scope,
        pairs_scored = counts.pairs_scored,
        matches_accepted = counts.matches_accepted,
        matches_persisted = counts.matches_persisted,
        promises_failed = counts.promises_failed,
        "match run completed"
    );

    let manifest = MatchRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        started_at,
        updated_at: now_utc_string(),
        target: args.target,
        algorithm_name: algorithm_name.to_string(),
        algorithm_version: options.algorithm_version,
        config_sha256,
        party_filter: options.party_id,
        year_filter: options.election_year,
        dry_run: options.dry_run,
        counts,
    };
    let manifest_path = write_manifest(&args.store.cache_root, &run_id, &manifest)?;
    info!(path = %manifest_path.display(), "wrote match manifest");

    Ok(())
}

pub fn match_motions<S: PipelineStore>(
    store: &mut S,
    config: &PipelineConfig,
    options: &MatchOptions,
) -> Result<MatchRunCounts> {
    let mut counts = MatchRunCounts::default();
    let extractor = KeywordExtractor::new(&config.keywords);
    let procedural = ProceduralFilter::new(&config.procedural)?;
    let scorer = MatchScorer::new(&config.scoring);
    let mode = Normalization::PromiseVocabulary;

    let selection = select_promises(&*store, config, options, &mut counts)?;
    let prepared = selection
        .kept
        .into_iter()
        .map(|promise| PreparedPromise::new(promise, &extractor))
        .collect::<Vec<PreparedPromise>>();
    warn_without_keywords(&prepared);

    let mut aggregator = MatchAggregator::new(config.aggregation.motion_top_k);
    for page in CandidatePages::new(&*store, config.batches.motions) {
        for motion in page? {
            counts.candidates_scanned += 1;

            if let Some(exclusion) =
                procedural.evaluate(&motion.title, Some(&motion.text), motion.kind.as_deref())
            {
                counts.procedural_excluded += 1;
                debug!(
                    motion_id = %motion.id,
                    category = exclusion.category.as_str(),
                    reason = %exclusion.reason,
                    "excluded procedural motion"
                );
                continue;
            }

            let Some(election_year) = config.aggregation.election_year_for(motion.introduced)
            else {
                counts.out_of_scope += 1;
                continue;
            };

            let text = format!("{}\n{}", motion.title, motion.text);
            let candidate = PreparedCandidate::new(&motion.id, &text, &extractor);
            for promise in prepared
                .iter()
                .filter(|value| value.promise.election_year == election_year)
            {
                counts.pairs_scored += 1;
                let scored = scorer.score(promise, &candidate, mode);
                if scorer.accepts(&scored, mode) {
                    aggregator.offer(&promise.promise.code, scored);
                }
            }
        }
    }

    let context = RecordContext {
        target: MatchTarget::Motion,
        mode,
        algorithm_name: MOTION_ALGORITHM,
        algorithm_version: &options.algorithm_version,
        max_stored_terms: config.aggregation.max_stored_terms,
    };
    persist(
        store,
        &scorer,
        &prepared,
        &selection.dropped,
        &aggregator,
        &context,
        options.dry_run,
        &mut counts,
    );

    Ok(counts)
}

pub fn match_passages<S: PipelineStore>(
    store: &mut S,
    config: &PipelineConfig,
    options: &MatchOptions,
) -> Result<MatchRunCounts> {
    let mut counts = MatchRunCounts::default();
    let extractor = KeywordExtractor::new(&config.keywords);
    let scorer = MatchScorer::new(&config.scoring);
    let mode = Normalization::CandidateLength;

    let selection = select_promises(&*store, config, options, &mut counts)?;
    let mut programs = BTreeMap::<(String, i32), Vec<PreparedPromise>>::new();
    for promise in selection.kept {
        programs
            .entry((promise.party_id.clone(), promise.election_year))
            .or_default()
            .push(PreparedPromise::new(promise, &extractor));
    }

    for promises in programs.values() {
        warn_without_keywords(promises);
    }

    let mut aggregator = MatchAggregator::new(config.aggregation.passage_top_k);
    for ((party_id, election_year), promises) in &programs {
        let passages = match store.load_passages(party_id, *election_year) {
            Ok(passages) => passages,
            Err(err) => {
                error!(
                    party_id = %party_id,
                    election_year = *election_year,
                    error = %err,
                    "failed to load program passages"
                );
                continue;
            }
        };

        for passage in &passages {
            counts.candidates_scanned += 1;
            let candidate = PreparedCandidate::new(&passage.id, &passage.text, &extractor);
            for promise in promises {
                counts.pairs_scored += 1;
                let scored = scorer.score(promise, &candidate, mode);
                if scorer.accepts(&scored, mode) {
                    aggregator.offer(&promise.promise.code, scored);
                }
            }
        }
    }

    let prepared = programs.into_values().flatten().collect::<Vec<PreparedPromise>>();
    let context = RecordContext {
        target: MatchTarget::Passage,
        mode,
        algorithm_name: PASSAGE_ALGORITHM,
        algorithm_version: &options.algorithm_version,
        max_stored_terms: config.aggregation.max_stored_terms,
    };
    persist(
        store,
        &scorer,
        &prepared,
        &selection.dropped,
        &aggregator,
        &context,
        options.dry_run,
        &mut counts,
    );

    Ok(counts)
}

fn warn_without_keywords(prepared: &[PreparedPromise]) {
    for promise in prepared.iter().filter(|value| value.keywords.is_empty()) {
        warn!(promise_code = %promise.promise.code, "promise text yields no keywords");
    }
}

struct Selection {
    kept: Vec<Promise>,
    dropped: Vec<Promise>,
}

fn select_promises<S: PipelineStore + ?Sized>(
    store: &S,
    config: &PipelineConfig,
    options: &MatchOptions,
    counts: &mut MatchRunCounts,
) -> Result<Selection> {
    let filter = PromiseFilter {
        party_id: options.party_id.clone(),
        election_year: options.election_year,
    };

    let mut programs = BTreeMap::<(String, i32), Vec<Promise>>::new();
    for promise in store.load_promises(&filter)? {
        programs
            .entry((promise.party_id.clone(), promise.election_year))
            .or_default()
            .push(promise);
    }

    let mut kept = Vec::<Promise>::new();
    let mut dropped = Vec::<Promise>::new();
    for promises in programs.into_values() {
        let deduplicated = dedupe_by_summary(promises, config.aggregation.dedup_jaccard, |value| {
            value.summary.as_str()
        });
        for promise in &deduplicated.dropped {
            debug!(promise_code = %promise.code, "dropped near-duplicate promise");
        }
        kept.extend(deduplicated.kept);
        dropped.extend(deduplicated.dropped);
    }

    if let Some(limit) = options.limit {
        kept.truncate(limit);
    }
    counts.promises_considered = kept.len();
    counts.duplicate_promises_dropped = dropped.len();
    Ok(Selection { kept, dropped })
}

/// Replaces the stored matches of every promise in the run. Promises with no
/// accepted candidate, and dropped duplicates, get an empty set so that
/// stale matches from earlier runs disappear.
#[allow(clippy::too_many_arguments)]
fn persist<S: PipelineStore>(
    store: &mut S,
    scorer: &MatchScorer<'_>,
    prepared: &[PreparedPromise],
    dropped: &[Promise],
    aggregator: &MatchAggregator,
    context: &RecordContext<'_>,
    dry_run: bool,
    counts: &mut MatchRunCounts,
) {
    counts.matches_accepted = aggregator.accepted_count();
    if dry_run {
        return;
    }

    let replacements = prepared
        .iter()
        .map(|promise| {
            let records = to_records(
                scorer,
                promise,
                aggregator.matches_for(&promise.promise.code),
                context,
            );
            (promise.promise.code.as_str(), records)
        })
        .chain(
            dropped
                .iter()
                .map(|promise| (promise.code.as_str(), Vec::new())),
        );

    for (promise_code, records) in replacements {
        let key = ReplaceKey {
            promise_code,
            target: context.target,
            algorithm_version: context.algorithm_version,
        };
        match store.replace_matches(&key, &records) {
            Ok(persisted) => counts.matches_persisted += persisted,
            Err(err) => {
                counts.promises_failed += 1;
                error!(promise_code = %promise_code, error = %err, "failed to persist matches");
            }
        }
    }
}

#[cfg(test)]
mod tests;
