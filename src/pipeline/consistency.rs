use crate::config::ConsistencyConfig;
use crate::model::{
    ConsistencyLabel, MatchType, PartyConsistencyResult, PartyRating, Promise, PromiseConsistency,
    VoteDirection,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VotedMatch {
    pub match_type: MatchType,
    pub confidence: f64,
    pub expected: VoteDirection,
    pub actual: Option<VoteDirection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromiseTally {
    pub label: ConsistencyLabel,
    pub ratio: Option<f64>,
    pub total_weight: f64,
    pub aligned_weight: f64,
    pub voted_matches: usize,
}

pub fn type_weight(config: &ConsistencyConfig, match_type: MatchType) -> f64 {
    match match_type {
        MatchType::Explicit => config.explicit_weight,
        MatchType::Implicit => config.implicit_weight,
        MatchType::Contradicts => config.contradicts_weight,
    }
}

pub fn effective_direction(expected: VoteDirection, match_type: MatchType) -> VoteDirection {
    match match_type {
        MatchType::Contradicts => expected.inverted(),
        MatchType::Explicit | MatchType::Implicit => expected,
    }
}

pub fn score_promise(matches: &[VotedMatch], config: &ConsistencyConfig) -> PromiseTally {
    let voted = matches
        .iter()
        .filter_map(|value| value.actual.map(|actual| (value, actual)))
        .collect::<Vec<_>>();

    if voted.len() < config.min_sample {
        return insufficient(voted.len());
    }

    let mut total_weight = 0.0_f64;
    let mut aligned_weight = 0.0_f64;
    for (value, actual) in &voted {
        let weight =
            type_weight(config, value.match_type).max(0.0) * value.confidence.clamp(0.0, 1.0);
        total_weight += weight;
        if effective_direction(value.expected, value.match_type) == *actual {
            aligned_weight += weight;
        }
    }

    if total_weight <= 0.0 {
        return insufficient(voted.len());
    }

    let ratio = (aligned_weight / total_weight).clamp(0.0, 1.0);
    let label = if ratio >= config.consistent_ratio {
        ConsistencyLabel::Consistent
    } else if ratio >= config.mixed_ratio {
        ConsistencyLabel::Mixed
    } else {
        ConsistencyLabel::Inconsistent
    };

    PromiseTally {
        label,
        ratio: Some(ratio),
        total_weight,
        aligned_weight,
        voted_matches: voted.len(),
    }
}

fn insufficient(voted_matches: usize) -> PromiseTally {
    PromiseTally {
        label: ConsistencyLabel::InsufficientData,
        ratio: None,
        total_weight: 0.0,
        aligned_weight: 0.0,
        voted_matches,
    }
}

pub fn promise_consistency(
    promise: &Promise,
    matches: &[VotedMatch],
    config: &ConsistencyConfig,
) -> PromiseConsistency {
    let tally = score_promise(matches, config);
    PromiseConsistency {
        promise_code: promise.code.clone(),
        summary: promise.summary.clone(),
        theme: promise.theme,
        label: tally.label,
        consistency_ratio: tally.ratio,
        total_weight: tally.total_weight,
        aligned_weight: tally.aligned_weight,
        voted_matches: tally.voted_matches,
    }
}

pub fn aggregate_party(
    party_id: &str,
    election_year: i32,
    promise_scores: Vec<PromiseConsistency>,
    config: &ConsistencyConfig,
) -> PartyConsistencyResult {
    let mut weighted = 0.0_f64;
    let mut weight_total = 0.0_f64;
    let mut scored_promises = 0usize;

    for value in &promise_scores {
        let Some(ratio) = value.consistency_ratio else {
            continue;
        };
        if value.label == ConsistencyLabel::InsufficientData {
            continue;
        }
        scored_promises += 1;
        weighted += ratio * value.total_weight;
        weight_total += value.total_weight;
    }

    let overall_score = (weight_total > 0.0)
        .then(|| ((weighted / weight_total) * 1000.0).round() / 10.0)
        .map(|score| score.clamp(0.0, 100.0));
    let rating = overall_score.map(|score| party_rating(score, config));

    PartyConsistencyResult {
        party_id: party_id.to_string(),
        election_year,
        overall_score,
        rating,
        total_promises: promise_scores.len(),
        scored_promises,
        insufficient_data_promises: promise_scores.len() - scored_promises,
        promise_scores,
    }
}

pub fn party_rating(score: f64, config: &ConsistencyConfig) -> PartyRating {
    if score >= config.party_high_score {
        PartyRating::High
    } else if score >= config.party_moderate_score {
        PartyRating::Moderate
    } else {
        PartyRating::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Theme;

    fn voted(
        match_type: MatchType,
        confidence: f64,
        expected: VoteDirection,
        actual: Option<VoteDirection>,
    ) -> VotedMatch {
        VotedMatch {
            match_type,
            confidence,
            expected,
            actual,
        }
    }

    fn consistency(code: &str, ratio: Option<f64>, total_weight: f64) -> PromiseConsistency {
        PromiseConsistency {
            promise_code: code.to_string(),
            summary: String::new(),
            theme: Theme::Other,
            label: if ratio.is_some() {
                ConsistencyLabel::Mixed
            } else {
                ConsistencyLabel::InsufficientData
            },
            consistency_ratio: ratio,
            total_weight,
            aligned_weight: ratio.unwrap_or(0.0) * total_weight,
            voted_matches: 3,
        }
    }

    #[test]
    fn two_aligned_votes_are_insufficient_data() {
        let config = ConsistencyConfig::default();
        let matches = [
            voted(MatchType::Explicit, 1.0, VoteDirection::For, Some(VoteDirection::For)),
            voted(MatchType::Explicit, 1.0, VoteDirection::For, Some(VoteDirection::For)),
        ];

        let tally = score_promise(&matches, &config);
        assert_eq!(tally.label, ConsistencyLabel::InsufficientData);
        assert_eq!(tally.ratio, None);
        assert_eq!(tally.total_weight, 0.0);
    }

    #[test]
    fn matches_without_votes_do_not_count_toward_sample() {
        let config = ConsistencyConfig::default();
        let matches = [
            voted(MatchType::Explicit, 0.9, VoteDirection::For, Some(VoteDirection::For)),
            voted(MatchType::Explicit, 0.9, VoteDirection::For, None),
            voted(MatchType::Implicit, 0.9, VoteDirection::For, Some(VoteDirection::For)),
            voted(MatchType::Implicit, 0.9, VoteDirection::For, None),
        ];

        let tally = score_promise(&matches, &config);
        assert_eq!(tally.label, ConsistencyLabel::InsufficientData);
        assert_eq!(tally.voted_matches, 2);
    }

    #[test]
    fn weighted_ratio_follows_type_weights_and_confidence() {
        let config = ConsistencyConfig::default();
        let matches = [
            voted(MatchType::Explicit, 0.8, VoteDirection::For, Some(VoteDirection::For)),
            voted(MatchType::Explicit, 0.8, VoteDirection::For, Some(VoteDirection::For)),
            voted(MatchType::Implicit, 0.4, VoteDirection::For, Some(VoteDirection::Against)),
        ];

        let tally = score_promise(&matches, &config);
        assert!((tally.aligned_weight - 1.6).abs() < 1e-9);
        assert!((tally.total_weight - 1.8).abs() < 1e-9);
        assert!((tally.ratio.unwrap() - 1.6 / 1.8).abs() < 1e-9);
        assert_eq!(tally.label, ConsistencyLabel::Consistent);
    }

    #[test]
    fn contradicting_match_inverts_expected_direction() {
        let config = ConsistencyConfig::default();
        let matches = [
            voted(MatchType::Contradicts, 1.0, VoteDirection::For, Some(VoteDirection::Against)),
            voted(MatchType::Contradicts, 1.0, VoteDirection::For, Some(VoteDirection::Against)),
            voted(MatchType::Explicit, 1.0, VoteDirection::For, Some(VoteDirection::Against)),
        ];

        let tally = score_promise(&matches, &config);
        assert!((tally.ratio.unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(tally.label, ConsistencyLabel::Mixed);
    }

    #[test]
    fn low_ratio_is_inconsistent() {
        let config = ConsistencyConfig::default();
        let matches = [
            voted(MatchType::Explicit, 1.0, VoteDirection::Against, Some(VoteDirection::For)),
            voted(MatchType::Explicit, 1.0, VoteDirection::Against, Some(VoteDirection::For)),
            voted(MatchType::Explicit, 1.0, VoteDirection::Against, Some(VoteDirection::For)),
        ];

        let tally = score_promise(&matches, &config);
        assert_eq!(tally.ratio, Some(0.0));
        assert_eq!(tally.label, ConsistencyLabel::Inconsistent);
    }

    #[test]
    fn zero_confidence_matches_leave_promise_unscored() {
        let config = ConsistencyConfig::default();
        let unweighted = voted(MatchType::Explicit, 0.0, VoteDirection::For, Some(VoteDirection::For));
        let matches = [unweighted; 3];

        let tally = score_promise(&matches, &config);
        assert_eq!(tally.label, ConsistencyLabel::InsufficientData);
    }

    #[test]
    fn party_score_is_weighted_mean_rounded_to_one_decimal() {
        let config = ConsistencyConfig::default();
        let scores = vec![
            consistency("P-1", Some(1.0), 2.0),
            consistency("P-2", Some(0.5), 1.0),
            consistency("P-3", None, 0.0),
        ];

        let result = aggregate_party("sp", 2023, scores, &config);

        // (1.0 * 2 + 0.5 * 1) / 3 = 0.8333
        assert_eq!(result.overall_score, Some(83.3));
        assert_eq!(result.rating, Some(PartyRating::High));
        assert_eq!(result.total_promises, 3);
        assert_eq!(result.scored_promises, 2);
        assert_eq!(result.insufficient_data_promises, 1);
    }

    #[test]
    fn party_without_scored_promises_has_no_score() {
        let config = ConsistencyConfig::default();
        let scores = vec![consistency("P-1", None, 0.0), consistency("P-2", None, 0.0)];

        let result = aggregate_party("vvd", 2023, scores, &config);
        assert_eq!(result.overall_score, None);
        assert_eq!(result.rating, None);
        assert_eq!(result.insufficient_data_promises, 2);
    }

    #[test]
    fn party_rating_uses_its_own_thresholds() {
        let config = ConsistencyConfig::default();
        assert_eq!(party_rating(70.0, &config), PartyRating::High);
        assert_eq!(party_rating(65.0, &config), PartyRating::Moderate);
        assert_eq!(party_rating(39.9, &config), PartyRating::Low);
    }
}
