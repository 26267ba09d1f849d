use crate::config::ScoringConfig;
use crate::model::{MatchType, Promise};
use crate::pipeline::keywords::{KeywordExtractor, Keywords, is_bigram, normalize_text, word_count};

/// How a raw overlap score is normalized. Motion matching divides by the
/// promise vocabulary size; passage matching divides by candidate length.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Normalization {
    PromiseVocabulary,
    CandidateLength,
}

impl Normalization {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PromiseVocabulary => "promise_vocabulary",
            Self::CandidateLength => "candidate_length",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreparedPromise {
    pub promise: Promise,
    pub keywords: Keywords,
}

impl PreparedPromise {
    pub fn new(promise: Promise, extractor: &KeywordExtractor) -> Self {
        let keywords = extractor.extract(&promise.text);
        Self { promise, keywords }
    }
}

#[derive(Debug, Clone)]
pub struct PreparedCandidate {
    pub id: String,
    pub text: String,
    pub keywords: Keywords,
    pub word_count: usize,
}

impl PreparedCandidate {
    pub fn new(id: &str, text: &str, extractor: &KeywordExtractor) -> Self {
        Self {
            id: id.to_string(),
            text: normalize_text(text)
                .split_whitespace()
                .collect::<Vec<&str>>()
                .join(" "),
            keywords: extractor.extract(text),
            word_count: word_count(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub target_id: String,
    pub score: f64,
    pub raw_score: f64,
    pub normalizer: f64,
    pub theme_bonus: f64,
    pub phrase_hits: usize,
    pub matched_terms: Vec<String>,
}

pub struct MatchScorer<'a> {
    config: &'a ScoringConfig,
}

impl<'a> MatchScorer<'a> {
    pub fn new(config: &'a ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score(
        &self,
        promise: &PreparedPromise,
        candidate: &PreparedCandidate,
        mode: Normalization,
    ) -> ScoredCandidate {
        let mut contributions = Vec::<(String, f64)>::new();
        let mut phrase_hits = 0usize;

        for (term, weight) in promise.keywords.iter() {
            let present = match mode {
                Normalization::PromiseVocabulary => candidate.keywords.contains(term),
                Normalization::CandidateLength => candidate.text.contains(term),
            };
            if !present {
                continue;
            }

            let multiplier = if is_bigram(term) {
                phrase_hits += 1;
                self.config.phrase_multiplier
            } else {
                self.config.term_multiplier
            };
            contributions.push((term.to_string(), weight * multiplier));
        }

        let theme_bonus = self.theme_bonus(promise, candidate);
        let raw_score = contributions.iter().map(|(_, value)| value).sum::<f64>() + theme_bonus;
        let normalizer = self.normalizer(promise, candidate, mode);
        let score = if normalizer > 0.0 {
            (raw_score / normalizer).max(0.0)
        } else {
            0.0
        };

        contributions.sort_by(|left, right| {
            right
                .1
                .total_cmp(&left.1)
                .then_with(|| left.0.cmp(&right.0))
        });

        ScoredCandidate {
            target_id: candidate.id.clone(),
            score,
            raw_score,
            normalizer,
            theme_bonus,
            phrase_hits,
            matched_terms: contributions.into_iter().map(|(term, _)| term).collect(),
        }
    }

    pub fn accepts(&self, scored: &ScoredCandidate, mode: Normalization) -> bool {
        let min_score = match mode {
            Normalization::PromiseVocabulary => self.config.motion_min_score,
            Normalization::CandidateLength => self.config.passage_min_score,
        };
        scored.score > min_score && scored.matched_terms.len() >= self.config.min_matched_terms
    }

    pub fn classify(&self, scored: &ScoredCandidate) -> (MatchType, f64) {
        let match_type = if scored.score >= self.config.explicit_score && scored.phrase_hits > 0 {
            MatchType::Explicit
        } else {
            MatchType::Implicit
        };
        let confidence = (scored.score / self.config.confidence_saturation).clamp(0.0, 1.0);
        (match_type, confidence)
    }

    fn theme_bonus(&self, promise: &PreparedPromise, candidate: &PreparedCandidate) -> f64 {
        let Some(family) = self.config.theme_families.get(&promise.promise.theme) else {
            return 0.0;
        };

        let present = family
            .iter()
            .any(|term| !term.is_empty() && candidate.text.contains(term.as_str()));
        if present { self.config.theme_bonus } else { 0.0 }
    }

    fn normalizer(
        &self,
        promise: &PreparedPromise,
        candidate: &PreparedCandidate,
        mode: Normalization,
    ) -> f64 {
        match mode {
            Normalization::PromiseVocabulary => (promise.keywords.len().max(1) as f64).sqrt(),
            Normalization::CandidateLength => {
                let floor = self.config.length_floor_words.max(1) as f64;
                let words = (candidate.word_count as f64).max(floor);
                (words / floor).sqrt()
            }
        }
    }
}
