use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Economy,
    Labour,
    Healthcare,
    Education,
    Housing,
    ClimateEnergy,
    Migration,
    JusticeSecurity,
    Agriculture,
    ForeignDefence,
    SocialSecurity,
    Other,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Economy => "economy",
            Self::Labour => "labour",
            Self::Healthcare => "healthcare",
            Self::Education => "education",
            Self::Housing => "housing",
            Self::ClimateEnergy => "climate_energy",
            Self::Migration => "migration",
            Self::JusticeSecurity => "justice_security",
            Self::Agriculture => "agriculture",
            Self::ForeignDefence => "foreign_defence",
            Self::SocialSecurity => "social_security",
            Self::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase().replace([' ', '-', '&'], "_");
        let theme = match normalized.as_str() {
            "economy" | "economie" | "financien" => Self::Economy,
            "labour" | "labor" | "werk" | "arbeid" | "arbeidsmarkt" => Self::Labour,
            "healthcare" | "health" | "zorg" | "gezondheidszorg" => Self::Healthcare,
            "education" | "onderwijs" => Self::Education,
            "housing" | "wonen" | "volkshuisvesting" => Self::Housing,
            "climate_energy" | "climate" | "klimaat" | "klimaat___energie" | "energie" => {
                Self::ClimateEnergy
            }
            "migration" | "migratie" | "asiel" => Self::Migration,
            "justice_security" | "security" | "veiligheid" | "justitie" => Self::JusticeSecurity,
            "agriculture" | "landbouw" | "landbouw_en_natuur" => Self::Agriculture,
            "foreign_defence" | "defence" | "defensie" | "buitenland" => Self::ForeignDefence,
            "social_security" | "sociale_zekerheid" | "inkomen" => Self::SocialSecurity,
            "other" | "overig" => Self::Other,
            _ => return None,
        };
        Some(theme)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Specificity {
    Concrete,
    Directional,
    Vague,
}

impl Specificity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Concrete => "CONCRETE",
            Self::Directional => "DIRECTIONAL",
            Self::Vague => "VAGUE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CONCRETE" | "CONCREET" => Some(Self::Concrete),
            "DIRECTIONAL" | "RICHTINGGEVEND" => Some(Self::Directional),
            "VAGUE" | "VAAG" => Some(Self::Vague),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteDirection {
    For,
    Against,
}

impl VoteDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::For => "FOR",
            Self::Against => "AGAINST",
        }
    }

    pub fn inverted(self) -> Self {
        match self {
            Self::For => Self::Against,
            Self::Against => Self::For,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "for" | "voor" => Some(Self::For),
            "against" | "tegen" => Some(Self::Against),
            _ => None,
        }
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictedVote {
    For,
    Against,
    Unknown,
}

impl PredictedVote {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::For => "FOR",
            Self::Against => "AGAINST",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn direction(self) -> Option<VoteDirection> {
        match self {
            Self::For => Some(VoteDirection::For),
            Self::Against => Some(VoteDirection::Against),
            Self::Unknown => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MotionKind {
    Ordinary,
    NoConfidence,
    Order,
    Procedural,
}

impl MotionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::NoConfidence => "no-confidence",
            Self::Order => "order",
            Self::Procedural => "procedural",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Explicit,
    Implicit,
    Contradicts,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Implicit => "implicit",
            Self::Contradicts => "contradicts",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "explicit" => Some(Self::Explicit),
            "implicit" => Some(Self::Implicit),
            "contradicts" => Some(Self::Contradicts),
            _ => None,
        }
    }

    /// Effective match type after human review. `None` means the reviewer
    /// rejected the match.
    pub fn reviewed(self, review: Option<ReviewStatus>) -> Option<Self> {
        match (review, self) {
            (Some(ReviewStatus::Incorrect), _) => None,
            (Some(ReviewStatus::Upgrade), Self::Implicit) => Some(Self::Explicit),
            (Some(ReviewStatus::Downgrade), Self::Explicit) => Some(Self::Implicit),
            (_, value) => Some(value),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Correct,
    Incorrect,
    Upgrade,
    Downgrade,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
            Self::Upgrade => "upgrade",
            Self::Downgrade => "downgrade",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "correct" => Some(Self::Correct),
            "incorrect" => Some(Self::Incorrect),
            "upgrade" => Some(Self::Upgrade),
            "downgrade" => Some(Self::Downgrade),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MatchTarget {
    #[value(alias = "motions")]
    Motion,
    #[value(alias = "passages")]
    Passage,
}

impl MatchTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Motion => "motion",
            Self::Passage => "passage",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Promise {
    pub code: String,
    pub party_id: String,
    pub election_year: i32,
    pub text: String,
    pub summary: String,
    pub theme: Theme,
    pub specificity: Specificity,
    pub expected_direction: VoteDirection,
}

#[derive(Debug, Clone, Serialize)]
pub struct Motion {
    pub id: String,
    pub title: String,
    pub text: String,
    pub introduced: NaiveDate,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramPassage {
    pub id: String,
    pub party_id: String,
    pub election_year: i32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartyVote {
    pub party_id: String,
    pub vote: Option<VoteDirection>,
    pub seats: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteOutcome {
    pub motion_id: String,
    pub result: String,
    pub total_for: u32,
    pub total_against: u32,
    pub total_abstain: u32,
    pub party_votes: Vec<PartyVote>,
}

impl VoteOutcome {
    pub fn party_vote(&self, party_id: &str) -> Option<VoteDirection> {
        self.party_votes
            .iter()
            .find(|value| value.party_id == party_id)
            .and_then(|value| value.vote)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchRecord {
    pub promise_code: String,
    pub party_id: String,
    pub target: MatchTarget,
    pub target_id: String,
    pub score: f64,
    pub matched_terms: Vec<String>,
    pub match_type: MatchType,
    pub confidence: f64,
    pub algorithm_name: String,
    pub algorithm_version: String,
    pub rationale: String,
    pub review: Option<ReviewStatus>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLabel {
    Consistent,
    Mixed,
    Inconsistent,
    InsufficientData,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRating {
    High,
    Moderate,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromiseConsistency {
    pub promise_code: String,
    pub summary: String,
    pub theme: Theme,
    pub label: ConsistencyLabel,
    pub consistency_ratio: Option<f64>,
    pub total_weight: f64,
    pub aligned_weight: f64,
    pub voted_matches: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartyConsistencyResult {
    pub party_id: String,
    pub election_year: i32,
    pub overall_score: Option<f64>,
    pub rating: Option<PartyRating>,
    pub total_promises: usize,
    pub scored_promises: usize,
    pub insufficient_data_promises: usize,
    pub promise_scores: Vec<PromiseConsistency>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub motion_id: String,
    pub party_id: String,
    pub predicted_vote: PredictedVote,
    pub confidence: f64,
    pub rationale: String,
    pub actual_vote: Option<VoteDirection>,
    pub deviates: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub parties: Vec<RawParty>,
    pub programs: Vec<RawProgram>,
    pub promises: Vec<RawPromise>,
    pub passages: Vec<RawPassage>,
    pub motions: Vec<RawMotion>,
    pub votes: Vec<RawVoteOutcome>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawParty {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawProgram {
    pub party_id: String,
    pub election_year: i32,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPromise {
    pub code: String,
    pub party_id: String,
    pub election_year: i32,
    pub text: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub specificity: Option<String>,
    #[serde(default)]
    pub expected_direction: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPassage {
    pub id: String,
    pub party_id: String,
    pub election_year: i32,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMotion {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub text: Option<String>,
    pub introduced_date: String,
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPartyVote {
    pub party_id: String,
    #[serde(default)]
    pub vote: Option<String>,
    #[serde(default)]
    pub seats: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawVoteOutcome {
    pub motion_id: String,
    pub result: String,
    #[serde(default)]
    pub total_for: u32,
    #[serde(default)]
    pub total_against: u32,
    #[serde(default)]
    pub total_abstain: u32,
    #[serde(default)]
    pub per_party: Vec<RawPartyVote>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestCounts {
    pub parties_inserted: usize,
    pub parties_updated: usize,
    pub programs_inserted: usize,
    pub programs_updated: usize,
    pub promises_inserted: usize,
    pub promises_updated: usize,
    pub passages_inserted: usize,
    pub passages_updated: usize,
    pub motions_inserted: usize,
    pub motions_updated: usize,
    pub votes_inserted: usize,
    pub votes_updated: usize,
    pub skipped_records: usize,
    pub fallback_values: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub started_at: String,
    pub updated_at: String,
    pub dataset_path: String,
    pub dataset_sha256: String,
    pub dry_run: bool,
    pub counts: IngestCounts,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchRunCounts {
    pub promises_considered: usize,
    pub duplicate_promises_dropped: usize,
    pub candidates_scanned: usize,
    pub procedural_excluded: usize,
    pub out_of_scope: usize,
    pub pairs_scored: usize,
    pub matches_accepted: usize,
    pub matches_persisted: usize,
    pub promises_failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub updated_at: String,
    pub target: MatchTarget,
    pub algorithm_name: String,
    pub algorithm_version: String,
    pub config_sha256: String,
    pub party_filter: Option<String>,
    pub year_filter: Option<i32>,
    pub dry_run: bool,
    pub counts: MatchRunCounts,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PredictRunCounts {
    pub motions_scanned: usize,
    pub procedural_excluded: usize,
    pub motions_predicted: usize,
    pub predictions: usize,
    pub unknown_predictions: usize,
    pub deviations: usize,
    pub motions_failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub updated_at: String,
    pub algorithm_version: String,
    pub config_sha256: String,
    pub party_filter: Option<String>,
    pub dry_run: bool,
    pub counts: PredictRunCounts,
}
