use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{MotionKind, Theme};
use crate::util::sha256_hex;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub keywords: KeywordConfig,
    pub procedural: ProceduralConfig,
    pub scoring: ScoringConfig,
    pub aggregation: AggregationConfig,
    pub consistency: ConsistencyConfig,
    pub prediction: PredictionConfig,
    pub batches: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub min_token_chars: usize,
    pub bigram_weight: f64,
    pub stop_words: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindLabel {
    pub label: String,
    pub category: MotionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProceduralConfig {
    pub kind_labels: Vec<KindLabel>,
    pub no_confidence_patterns: Vec<String>,
    pub order_patterns: Vec<String>,
    pub procedural_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub phrase_multiplier: f64,
    pub term_multiplier: f64,
    pub theme_bonus: f64,
    pub length_floor_words: usize,
    pub motion_min_score: f64,
    pub passage_min_score: f64,
    pub min_matched_terms: usize,
    pub explicit_score: f64,
    pub confidence_saturation: f64,
    pub theme_families: BTreeMap<Theme, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionPeriod {
    pub year: i32,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub motion_top_k: usize,
    pub passage_top_k: usize,
    pub dedup_jaccard: f64,
    pub max_stored_terms: usize,
    pub elections: Vec<ElectionPeriod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    pub min_sample: usize,
    pub explicit_weight: f64,
    pub implicit_weight: f64,
    pub contradicts_weight: f64,
    pub consistent_ratio: f64,
    pub mixed_ratio: f64,
    pub party_high_score: f64,
    pub party_moderate_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub min_net_signal: f64,
    pub rationale_top_n: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub motions: usize,
    pub vote_lookup: usize,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            min_token_chars: 4,
            bigram_weight: 1.5,
            stop_words: to_strings(DEFAULT_STOP_WORDS),
        }
    }
}

impl Default for ProceduralConfig {
    fn default() -> Self {
        let kind_labels = [
            ("Motie van wantrouwen", MotionKind::NoConfidence),
            ("Motie van afkeuring", MotionKind::NoConfidence),
            ("Motie van treurnis", MotionKind::NoConfidence),
            ("Ordevoorstel", MotionKind::Order),
            ("Procedurevoorstel", MotionKind::Procedural),
            ("Procedurele motie", MotionKind::Procedural),
        ]
        .into_iter()
        .map(|(label, category)| KindLabel {
            label: label.to_string(),
            category,
        })
        .collect();

        Self {
            kind_labels,
            no_confidence_patterns: to_strings(&[
                r"(?i)\bmotie\s+van\s+(wantrouwen|afkeuring|treurnis)\b",
                r"(?i)\bzegt\s+(het|haar|zijn)\s+vertrouwen\s+op\b",
                r"(?i)\bno[- ]confidence\b",
            ]),
            order_patterns: to_strings(&[
                r"(?i)\bordevoorstel",
                r"(?i)\borde\s+van\s+de\s+(dag|vergadering)\b",
                r"(?i)\bregeling\s+van\s+werkzaamheden\b",
                r"(?i)\bagenda(wijziging|voorstel)\b",
            ]),
            procedural_patterns: to_strings(&[
                r"(?i)\bprocedure(voorstel|le\s+motie)\b",
                r"(?i)\b(uitstel|aanhouden)\s+van\s+de\s+stemming",
                r"(?i)\b(hoorzitting|rondetafelgesprek)\b",
                r"(?i)\bverzoekt\s+de\s+(griffie|voorzitter|commissie)\b",
            ]),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let theme_families = DEFAULT_THEME_FAMILIES
            .iter()
            .map(|(theme, terms)| (*theme, to_strings(terms)))
            .collect();

        Self {
            phrase_multiplier: 2.0,
            term_multiplier: 1.0,
            theme_bonus: 0.5,
            length_floor_words: 100,
            motion_min_score: 0.15,
            passage_min_score: 0.3,
            min_matched_terms: 2,
            explicit_score: 1.5,
            confidence_saturation: 3.0,
            theme_families,
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            motion_top_k: 15,
            passage_top_k: 3,
            dedup_jaccard: 0.7,
            max_stored_terms: 10,
            elections: vec![
                ElectionPeriod {
                    year: 2021,
                    date: NaiveDate::from_ymd_opt(2021, 3, 17).unwrap_or_default(),
                },
                ElectionPeriod {
                    year: 2023,
                    date: NaiveDate::from_ymd_opt(2023, 11, 22).unwrap_or_default(),
                },
            ],
        }
    }
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            min_sample: 3,
            explicit_weight: 1.0,
            implicit_weight: 0.5,
            contradicts_weight: 1.0,
            consistent_ratio: 0.7,
            mixed_ratio: 0.3,
            party_high_score: 70.0,
            party_moderate_score: 40.0,
        }
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            min_net_signal: 0.2,
            rationale_top_n: 3,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            motions: 200,
            vote_lookup: 500,
        }
    }
}

impl AggregationConfig {
    /// Election year whose programs govern a motion introduced on `date`:
    /// the latest election held on or before that date.
    pub fn election_year_for(&self, date: NaiveDate) -> Option<i32> {
        self.elections
            .iter()
            .filter(|period| period.date <= date)
            .max_by_key(|period| period.date)
            .map(|period| period.year)
    }
}

pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            let raw =
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_slice::<PipelineConfig>(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    validate(&config)?;
    Ok(config)
}

pub fn config_sha256(config: &PipelineConfig) -> Result<String> {
    let data = serde_json::to_vec(config).context("failed to serialize pipeline config")?;
    Ok(sha256_hex(&data))
}

fn validate(config: &PipelineConfig) -> Result<()> {
    if config.keywords.min_token_chars == 0 {
        bail!("keywords.min_token_chars must be at least 1");
    }
    if config.scoring.length_floor_words == 0 {
        bail!("scoring.length_floor_words must be at least 1");
    }
    if config.scoring.confidence_saturation <= 0.0 {
        bail!("scoring.confidence_saturation must be positive");
    }
    if config.consistency.mixed_ratio > config.consistency.consistent_ratio {
        bail!("consistency.mixed_ratio must not exceed consistency.consistent_ratio");
    }
    if config.aggregation.elections.is_empty() {
        bail!("aggregation.elections must list at least one election");
    }
    Ok(())
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

const DEFAULT_STOP_WORDS: &[&str] = &[
    // articles, pronouns
    "de", "het", "een", "deze", "dit", "die", "dat", "wat", "wie", "welke", "ons", "onze",
    "hun", "zich", "zijn", "haar", "wij", "zij", "hij", "jij", "jullie", "iedereen", "ieder",
    "elke", "alle", "andere", "waar", "waarbij", "waarin", "daar", "daarom", "daarbij", "hier",
    // prepositions, conjunctions
    "van", "voor", "met", "naar", "over", "door", "bij", "tot", "uit", "tegen", "onder",
    "tussen", "zonder", "tijdens", "binnen", "buiten", "vanaf", "omdat", "want", "maar",
    "als", "dan", "ook", "niet", "geen", "meer", "minder", "veel", "zoals", "zodat", "terwijl",
    "echter", "alleen", "nog", "wel", "namelijk", "verder", "boven", "rond",
    // auxiliary verbs
    "worden", "wordt", "werd", "werden", "hebben", "heeft", "had", "kunnen", "kan", "moeten",
    "moet", "zullen", "zal", "willen", "wil", "gaan", "gaat", "mogen", "mag", "laten",
    // parliamentary and programme boilerplate
    "motie", "kamer", "tweede", "regering", "verzoekt", "constaterende", "overwegende",
    "spreekt", "lid", "leden", "partij", "programma", "verkiezingsprogramma",
    "kabinet", "nederland", "nederlandse", "zorgen", "ervoor", "dag",
    "jaar", "jaren", "komende", "nieuwe", "goed", "goede", "betere", "belangrijk",
];

const DEFAULT_THEME_FAMILIES: &[(Theme, &[&str])] = &[
    (
        Theme::Economy,
        &["economie", "belasting", "ondernemers", "begroting", "inflatie", "btw"],
    ),
    (
        Theme::Labour,
        &["minimumloon", "arbeidsmarkt", "werknemers", "banen", "werkloosheid", "zzp"],
    ),
    (
        Theme::Healthcare,
        &["ziekenhuis", "eigen risico", "zorgverzekering", "huisarts", "ggz", "zorgpersoneel"],
    ),
    (
        Theme::Education,
        &["onderwijs", "leraren", "studenten", "studiefinanciering", "basisbeurs", "school"],
    ),
    (
        Theme::Housing,
        &["woningen", "huurwoningen", "woningbouw", "huurprijzen", "hypotheekrente", "corporaties"],
    ),
    (
        Theme::ClimateEnergy,
        &["klimaat", "energie", "co2-uitstoot", "windparken", "kernenergie", "verduurzaming"],
    ),
    (
        Theme::Migration,
        &["migratie", "asiel", "asielzoekers", "vluchtelingen", "arbeidsmigratie", "inburgering"],
    ),
    (
        Theme::JusticeSecurity,
        &["politie", "veiligheid", "criminaliteit", "justitie", "rechtspraak", "straffen"],
    ),
    (
        Theme::Agriculture,
        &["landbouw", "boeren", "stikstof", "veehouderij", "natuur", "visserij"],
    ),
    (
        Theme::ForeignDefence,
        &["defensie", "navo", "krijgsmacht", "ontwikkelingshulp", "europese unie", "oekraine"],
    ),
    (
        Theme::SocialSecurity,
        &["uitkering", "pensioen", "toeslagen", "armoede", "bijstand", "kinderopvang"],
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn election_year_uses_latest_election_on_or_before_date() {
        let config = AggregationConfig::default();
        let before = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
        let first = NaiveDate::from_ymd_opt(2021, 3, 17).unwrap();
        let between = NaiveDate::from_ymd_opt(2022, 9, 1).unwrap();
        let after = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        assert_eq!(config.election_year_for(before), None);
        assert_eq!(config.election_year_for(first), Some(2021));
        assert_eq!(config.election_year_for(between), Some(2021));
        assert_eq!(config.election_year_for(after), Some(2023));
    }

    #[test]
    fn partial_json_override_keeps_remaining_defaults() {
        let raw = r#"{ "consistency": { "min_sample": 5 }, "scoring": { "theme_bonus": 0.0 } }"#;
        let config: PipelineConfig = serde_json::from_str(raw).expect("override should parse");

        assert_eq!(config.consistency.min_sample, 5);
        assert_eq!(config.consistency.consistent_ratio, 0.7);
        assert_eq!(config.scoring.theme_bonus, 0.0);
        assert_eq!(config.scoring.min_matched_terms, 2);
        assert_eq!(config.keywords.bigram_weight, 1.5);
    }

    #[test]
    fn config_hash_is_stable_and_sensitive_to_changes() {
        let base = PipelineConfig::default();
        let mut tuned = PipelineConfig::default();
        tuned.scoring.motion_min_score = 0.2;

        let first = config_sha256(&base).unwrap();
        assert_eq!(first, config_sha256(&base).unwrap());
        assert_ne!(first, config_sha256(&tuned).unwrap());
    }

    #[test]
    fn validate_rejects_inverted_label_thresholds() {
        let mut config = PipelineConfig::default();
        config.consistency.mixed_ratio = 0.9;
        assert!(validate(&config).is_err());
    }
}
