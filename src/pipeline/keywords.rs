use std::collections::{BTreeMap, HashSet};

use crate::config::KeywordConfig;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Keywords {
    terms: BTreeMap<String, f64>,
}

impl Keywords {
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains_key(term)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.terms.iter().map(|(term, weight)| (term.as_str(), *weight))
    }
}

pub fn is_bigram(term: &str) -> bool {
    term.contains(' ')
}

pub struct KeywordExtractor {
    min_token_chars: usize,
    bigram_weight: f64,
    stop_words: HashSet<String>,
}

impl KeywordExtractor {
    pub fn new(config: &KeywordConfig) -> Self {
        Self {
            min_token_chars: config.min_token_chars.max(1),
            bigram_weight: config.bigram_weight,
            stop_words: config
                .stop_words
                .iter()
                .map(|value| value.trim().to_lowercase())
                .filter(|value| !value.is_empty())
                .collect(),
        }
    }

    pub fn extract(&self, text: &str) -> Keywords {
        let tokens = normalize_text(text)
            .split_whitespace()
            .filter(|token| token.chars().count() >= self.min_token_chars)
            .map(ToOwned::to_owned)
            .collect::<Vec<String>>();

        let mut counts = BTreeMap::<String, f64>::new();
        for token in tokens.iter().filter(|token| !self.is_stop_word(token)) {
            *counts.entry(token.clone()).or_insert(0.0) += 1.0;
        }

        for pair in tokens.windows(2) {
            if self.is_stop_word(&pair[0]) || self.is_stop_word(&pair[1]) {
                continue;
            }
            *counts
                .entry(format!("{} {}", pair[0], pair[1]))
                .or_insert(0.0) += self.bigram_weight;
        }

        let max_count = counts.values().copied().fold(0.0_f64, f64::max);
        if max_count <= 0.0 {
            return Keywords::default();
        }

        let terms = counts
            .into_iter()
            .filter(|(_, count)| *count > 0.0)
            .map(|(term, count)| (term, count / max_count))
            .collect();
        Keywords { terms }
    }

    fn is_stop_word(&self, token: &str) -> bool {
        self.stop_words.contains(token)
    }
}

pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|character| {
            if character.is_alphanumeric() || character == '-' {
                character
            } else {
                ' '
            }
        })
        .collect::<String>()
}

pub fn token_set(text: &str) -> HashSet<String> {
    normalize_text(text)
        .split_whitespace()
        .map(ToOwned::to_owned)
        .collect()
}

pub fn word_count(text: &str) -> usize {
    normalize_text(text).split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> KeywordExtractor {
        KeywordExtractor::new(&KeywordConfig::default())
    }

    #[test]
    fn extract_drops_stop_words_and_short_tokens() {
        let keywords = extractor().extract("Minimumloon verhogen naar 16 euro per uur");

        assert!(keywords.contains("minimumloon"));
        assert!(keywords.contains("verhogen"));
        assert!(keywords.contains("euro"));
        assert!(!keywords.contains("naar"));
        assert!(!keywords.contains("16"));
        assert!(!keywords.contains("uur"));
    }

    #[test]
    fn extract_weights_bigrams_above_single_occurrences() {
        let keywords = extractor().extract("Minimumloon verhogen naar 16 euro per uur");

        assert_eq!(keywords.weight("minimumloon verhogen"), Some(1.0));
        let unigram = keywords.weight("minimumloon").unwrap();
        assert!((unigram - 1.0 / 1.5).abs() < 1e-9);
    }

    #[test]
    fn bigrams_skip_pairs_with_a_stop_word() {
        let keywords = extractor().extract("belasting voor grote bedrijven omhoog");

        assert!(keywords.contains("grote bedrijven"));
        assert!(keywords.contains("bedrijven omhoog"));
        assert!(!keywords.keys_contain_fragment("voor"));
    }

    #[test]
    fn weights_stay_within_unit_interval() {
        let text = "Betaalbare huurwoningen bouwen. Meer huurwoningen voor starters, \
                    huurwoningen in elke gemeente en een huurbevriezing voor sociale huurwoningen.";
        let keywords = extractor().extract(text);

        assert!(!keywords.is_empty());
        for (_, weight) in keywords.iter() {
            assert!(weight > 0.0 && weight <= 1.0);
        }
    }

    #[test]
    fn extraction_is_deterministic() {
        let text = "Het eigen risico in de zorg wordt afgeschaft en de zorgpremie verlaagd.";
        assert_eq!(extractor().extract(text), extractor().extract(text));
    }

    #[test]
    fn punctuation_is_stripped_but_hyphens_survive() {
        let keywords = extractor().extract("CO2-uitstoot (industrie) halveren!");

        assert!(keywords.contains("co2-uitstoot"));
        assert!(keywords.contains("industrie"));
        assert!(keywords.contains("halveren"));
    }

    #[test]
    fn empty_or_stop_word_text_yields_no_keywords() {
        assert!(extractor().extract("").is_empty());
        assert!(extractor().extract("de het een van voor").is_empty());
    }

    impl Keywords {
        fn weight(&self, term: &str) -> Option<f64> {
            self.terms.get(term).copied()
        }

        fn keys_contain_fragment(&self, fragment: &str) -> bool {
            self.terms
                .keys()
                .any(|term| term.split(' ').any(|part| part == fragment))
        }
    }
}
