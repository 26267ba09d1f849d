use std::collections::BTreeMap;

use crate::config::PredictionConfig;
use crate::model::{MatchType, PredictedVote, Prediction, VoteDirection, VoteOutcome};
use crate::pipeline::consistency::effective_direction;

#[derive(Debug, Clone, PartialEq)]
pub struct PromiseSignal {
    pub promise_code: String,
    pub party_id: String,
    pub match_type: MatchType,
    pub confidence: f64,
    pub expected: VoteDirection,
}

pub struct VotePredictor<'a> {
    config: &'a PredictionConfig,
}

impl<'a> VotePredictor<'a> {
    pub fn new(config: &'a PredictionConfig) -> Self {
        Self { config }
    }

    pub fn predict(
        &self,
        motion_id: &str,
        signals: &[PromiseSignal],
        outcome: Option<&VoteOutcome>,
    ) -> Vec<Prediction> {
        let mut by_party = BTreeMap::<&str, Vec<&PromiseSignal>>::new();
        for signal in signals {
            by_party
                .entry(signal.party_id.as_str())
                .or_default()
                .push(signal);
        }

        by_party
            .into_iter()
            .map(|(party_id, party_signals)| {
                let mut prediction = self.predict_party(motion_id, party_id, &party_signals);
                if let Some(outcome) = outcome {
                    compare_with_actual(&mut prediction, outcome.party_vote(party_id));
                }
                prediction
            })
            .collect()
    }

    fn predict_party(
        &self,
        motion_id: &str,
        party_id: &str,
        signals: &[&PromiseSignal],
    ) -> Prediction {
        let mut for_signal = 0.0_f64;
        let mut against_signal = 0.0_f64;
        let mut contributions = Vec::<(f64, &str, VoteDirection)>::new();

        for signal in signals {
            let weight = signal.confidence.clamp(0.0, 1.0);
            let direction = effective_direction(signal.expected, signal.match_type);
            match direction {
                VoteDirection::For => for_signal += weight,
                VoteDirection::Against => against_signal += weight,
            }
            contributions.push((weight, signal.promise_code.as_str(), direction));
        }

        let total = for_signal + against_signal;
        let (for_ratio, against_ratio) = if total > 0.0 {
            (for_signal / total, against_signal / total)
        } else {
            (0.0, 0.0)
        };
        let net_signal = (for_ratio - against_ratio).abs();

        let (predicted_vote, confidence) = if total <= 0.0 || net_signal < self.config.min_net_signal
        {
            (PredictedVote::Unknown, 0.0)
        } else if for_ratio > against_ratio {
            (PredictedVote::For, for_ratio.min(1.0))
        } else {
            (PredictedVote::Against, against_ratio.min(1.0))
        };

        contributions.sort_by(|left, right| {
            right
                .0
                .total_cmp(&left.0)
                .then_with(|| left.1.cmp(right.1))
        });
        let top = contributions
            .iter()
            .take(self.config.rationale_top_n)
            .map(|(weight, code, direction)| format!("{code} ({direction}, {weight:.2})"))
            .collect::<Vec<String>>()
            .join("; ");
        let rationale = format!(
            "{} from {} promise(s), net signal {:.2}: {}",
            predicted_vote.as_str(),
            signals.len(),
            net_signal,
            top
        );

        Prediction {
            motion_id: motion_id.to_string(),
            party_id: party_id.to_string(),
            predicted_vote,
            confidence,
            rationale,
            actual_vote: None,
            deviates: None,
        }
    }
}

pub fn compare_with_actual(prediction: &mut Prediction, actual: Option<VoteDirection>) {
    prediction.actual_vote = actual;
    prediction.deviates = match (prediction.predicted_vote.direction(), actual) {
        (Some(predicted), Some(actual)) => Some(predicted != actual),
        _ => None,
    };
}
