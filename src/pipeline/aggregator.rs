use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::model::{MatchRecord, MatchTarget};
use crate::pipeline::keywords::token_set;
use crate::pipeline::scorer::{MatchScorer, Normalization, PreparedPromise, ScoredCandidate};

pub struct MatchAggregator {
    cap: usize,
    ranked: BTreeMap<String, Vec<ScoredCandidate>>,
}

impl MatchAggregator {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            ranked: BTreeMap::new(),
        }
    }

    pub fn offer(&mut self, promise_code: &str, candidate: ScoredCandidate) {
        if self.cap == 0 {
            return;
        }

        let entries = self.ranked.entry(promise_code.to_string()).or_default();
        if let Some(existing) = entries
            .iter_mut()
            .find(|value| value.target_id == candidate.target_id)
        {
            if candidate.score > existing.score {
                *existing = candidate;
            }
        } else {
            entries.push(candidate);
        }

        entries.sort_by(rank_order);
        entries.truncate(self.cap);
    }

    pub fn matches_for(&self, promise_code: &str) -> &[ScoredCandidate] {
        self.ranked
            .get(promise_code)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn accepted_count(&self) -> usize {
        self.ranked.values().map(Vec::len).sum()
    }
}

fn rank_order(left: &ScoredCandidate, right: &ScoredCandidate) -> Ordering {
    right
        .score
        .total_cmp(&left.score)
        .then_with(|| left.target_id.cmp(&right.target_id))
}

pub fn jaccard(left: &str, right: &str) -> f64 {
    let left = token_set(left);
    let right = token_set(right);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();
    intersection as f64 / union as f64
}

#[derive(Debug)]
pub struct Deduplicated<T> {
    pub kept: Vec<T>,
    pub dropped: Vec<T>,
}

/// Drops later items whose summary is a near-duplicate of an earlier kept
/// item. Input order decides which copy survives.
pub fn dedupe_by_summary<T, F>(items: Vec<T>, threshold: f64, summary: F) -> Deduplicated<T>
where
    F: Fn(&T) -> &str,
{
    let mut kept = Vec::<T>::with_capacity(items.len());
    let mut dropped = Vec::<T>::new();

    for item in items {
        let duplicate = kept
            .iter()
            .any(|existing| jaccard(summary(existing), summary(&item)) > threshold);
        if duplicate {
            dropped.push(item);
        } else {
            kept.push(item);
        }
    }

    Deduplicated { kept, dropped }
}

pub struct RecordContext<'a> {
    pub target: MatchTarget,
    pub mode: Normalization,
    pub algorithm_name: &'a str,
    pub algorithm_version: &'a str,
    pub max_stored_terms: usize,
}

pub fn to_records(
    scorer: &MatchScorer<'_>,
    prepared: &PreparedPromise,
    candidates: &[ScoredCandidate],
    context: &RecordContext<'_>,
) -> Vec<MatchRecord> {
    candidates
        .iter()
        .map(|candidate| {
            let (match_type, confidence) = scorer.classify(candidate);
            let matched_terms = candidate
                .matched_terms
                .iter()
                .take(context.max_stored_terms)
                .cloned()
                .collect::<Vec<String>>();
            let rationale = serde_json::json!({
                "normalization": context.mode.as_str(),
                "raw_score": candidate.raw_score,
                "normalizer": candidate.normalizer,
                "theme": prepared.promise.theme.as_str(),
                "theme_bonus": candidate.theme_bonus,
                "phrase_hits": candidate.phrase_hits,
                "matched_term_count": candidate.matched_terms.len(),
                "promise_keyword_count": prepared.keywords.len(),
            })
            .to_string();

            MatchRecord {
                promise_code: prepared.promise.code.clone(),
                party_id: prepared.promise.party_id.clone(),
                target: context.target,
                target_id: candidate.target_id.clone(),
                score: candidate.score,
                matched_terms,
                match_type,
                confidence,
                algorithm_name: context.algorithm_name.to_string(),
                algorithm_version: context.algorithm_version.to_string(),
                rationale,
                review: None,
            }
        })
        .collect()
}
