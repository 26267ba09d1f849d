use std::fs;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::cli::IngestArgs;
use crate::model::{
    Dataset, IngestCounts, IngestRunManifest, Motion, PartyVote, ProgramPassage, Promise,
    RawMotion, RawPromise, RawVoteOutcome, Specificity, Theme, VoteDirection, VoteOutcome,
};
use crate::store::{DB_SCHEMA_VERSION, SqliteStore, UpsertOutcome};
use crate::util::{now_utc_string, read_required, run_id, sha256_hex, write_manifest};

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = run_id("ingest", started_ts);

    let raw = read_required(&args.dataset, "dataset")?;
    let dataset_sha256 = sha256_hex(&raw);
    let dataset: Dataset = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse dataset: {}", args.dataset.display()))?;

    info!(
        run_id = %run_id,
        dataset = %args.dataset.display(),
        dry_run = args.dry_run,
        "starting ingest"
    );

    // A preview runs against the target database when there is one, so
    // references to rows ingested earlier resolve as they would for real.
    let db_path = args.store.resolve_db_path();
    let mut store = if args.dry_run && !db_path.exists() {
        SqliteStore::open_in_memory()?
    } else {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        SqliteStore::open(&db_path)?
    };

    let report = if args.dry_run {
        store.rolled_back(|store| ingest_dataset(store, &dataset))?
    } else {
        let report = ingest_dataset(&mut store, &dataset)?;
        store.touch()?;
        report
    };

    let counts = &report.counts;
    info!(
        parties_inserted = counts.parties_inserted,
        parties_updated = counts.parties_updated,
        promises_inserted = counts.promises_inserted,
        promises_updated = counts.promises_updated,
        passages_inserted = counts.passages_inserted,
        motions_inserted = counts.motions_inserted,
        motions_updated = counts.motions_updated,
        votes_inserted = counts.votes_inserted,
        votes_updated = counts.votes_updated,
        skipped_records = counts.skipped_records,
        fallback_values = counts.fallback_values,
        "ingest completed"
    );

    let manifest = IngestRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        started_at,
        updated_at: now_utc_string(),
        dataset_path: args.dataset.display().to_string(),
        dataset_sha256,
        dry_run: args.dry_run,
        counts: report.counts,
        warnings: report.warnings,
    };
    let manifest_path = write_manifest(&args.store.cache_root, &run_id, &manifest)?;
    info!(path = %manifest_path.display(), "wrote ingest manifest");

    Ok(())
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub counts: IngestCounts,
    pub warnings: Vec<String>,
}

impl IngestReport {
    fn skip(&mut self, record: &str, key: &str, reason: &str) {
        warn!(record, key, reason, "skipping record");
        self.counts.skipped_records += 1;
        self.warnings.push(format!("skipped {record} {key}: {reason}"));
    }

    fn fallback(&mut self, promise_code: &str, field: &str, raw: Option<&str>, fallback: &str) {
        let raw = raw.unwrap_or_default();
        warn!(promise_code, field, raw, fallback, "unrecognized value, using fallback");
        self.counts.fallback_values += 1;
        self.warnings.push(format!(
            "promise {promise_code}: {field} '{raw}' replaced by {fallback}"
        ));
    }

    fn stored(
        &mut self,
        record: &str,
        key: &str,
        result: Result<UpsertOutcome>,
    ) -> Option<UpsertOutcome> {
        match result {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                error!(record, key, error = %err, "failed to store record");
                self.counts.skipped_records += 1;
                self.warnings.push(format!("failed to store {record} {key}: {err}"));
                None
            }
        }
    }
}

fn tally(outcome: UpsertOutcome, inserted: &mut usize, updated: &mut usize) {
    match outcome {
        UpsertOutcome::Inserted => *inserted += 1,
        UpsertOutcome::Updated => *updated += 1,
    }
}

pub fn ingest_dataset(store: &mut SqliteStore, dataset: &Dataset) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for party in &dataset.parties {
        let party_id = party.id.trim();
        if party_id.is_empty() {
            report.skip("party", &party.name, "empty party id");
            continue;
        }
        let result = store.upsert_party(party_id, party.name.trim());
        if let Some(outcome) = report.stored("party", party_id, result) {
            let counts = &mut report.counts;
            tally(outcome, &mut counts.parties_inserted, &mut counts.parties_updated);
        }
    }

    for program in &dataset.programs {
        let key = format!("{}/{}", program.party_id, program.election_year);
        if !store.party_exists(&program.party_id)? {
            report.skip("program", &key, "unknown party");
            continue;
        }
        let result = store.upsert_program(
            &program.party_id,
            program.election_year,
            program.title.as_deref(),
        );
        if let Some(outcome) = report.stored("program", &key, result) {
            let counts = &mut report.counts;
            tally(outcome, &mut counts.programs_inserted, &mut counts.programs_updated);
        }
    }

    for raw in &dataset.promises {
        if !store.party_exists(&raw.party_id)? {
            report.skip("promise", &raw.code, "unknown party");
            continue;
        }
        let Some(promise) = promise_from_raw(raw, &mut report) else {
            continue;
        };
        ensure_program(store, &promise.party_id, promise.election_year, &mut report);
        let result = store.upsert_promise(&promise);
        if let Some(outcome) = report.stored("promise", &promise.code, result) {
            let counts = &mut report.counts;
            tally(outcome, &mut counts.promises_inserted, &mut counts.promises_updated);
        }
    }

    for raw in &dataset.passages {
        if !store.party_exists(&raw.party_id)? {
            report.skip("passage", &raw.id, "unknown party");
            continue;
        }
        if raw.id.trim().is_empty() || raw.text.trim().is_empty() {
            report.skip("passage", &raw.id, "missing id or text");
            continue;
        }
        ensure_program(store, &raw.party_id, raw.election_year, &mut report);
        let passage = ProgramPassage {
            id: raw.id.trim().to_string(),
            party_id: raw.party_id.clone(),
            election_year: raw.election_year,
            text: raw.text.clone(),
        };
        let result = store.upsert_passage(&passage);
        if let Some(outcome) = report.stored("passage", &passage.id, result) {
            let counts = &mut report.counts;
            tally(outcome, &mut counts.passages_inserted, &mut counts.passages_updated);
        }
    }

    for raw in &dataset.motions {
        let Some(motion) = motion_from_raw(raw, &mut report) else {
            continue;
        };
        let result = store.upsert_motion(&motion);
        if let Some(outcome) = report.stored("motion", &motion.id, result) {
            let counts = &mut report.counts;
            tally(outcome, &mut counts.motions_inserted, &mut counts.motions_updated);
        }
    }

    for raw in &dataset.votes {
        if !store.motion_exists(&raw.motion_id)? {
            report.skip("vote", &raw.motion_id, "unknown motion");
            continue;
        }
        let outcome = vote_outcome_from_raw(store, raw, &mut report)?;
        let result = store.upsert_vote_outcome(&outcome);
        if let Some(stored) = report.stored("vote", &outcome.motion_id, result) {
            let counts = &mut report.counts;
            tally(stored, &mut counts.votes_inserted, &mut counts.votes_updated);
        }
    }

    Ok(report)
}

fn ensure_program(
    store: &SqliteStore,
    party_id: &str,
    election_year: i32,
    report: &mut IngestReport,
) {
    let key = format!("{party_id}/{election_year}");
    let result = store.upsert_program(party_id, election_year, None);
    if report.stored("program", &key, result) == Some(UpsertOutcome::Inserted) {
        report.counts.programs_inserted += 1;
    }
}

fn promise_from_raw(raw: &RawPromise, report: &mut IngestReport) -> Option<Promise> {
    let code = raw.code.trim();
    if code.is_empty() || raw.text.trim().is_empty() {
        report.skip("promise", code, "missing code or text");
        return None;
    }

    let theme = match raw.theme.as_deref().and_then(Theme::parse) {
        Some(theme) => theme,
        None => {
            report.fallback(code, "theme", raw.theme.as_deref(), Theme::Other.as_str());
            Theme::Other
        }
    };
    let specificity = match raw.specificity.as_deref().and_then(Specificity::parse) {
        Some(specificity) => specificity,
        None => {
            report.fallback(
                code,
                "specificity",
                raw.specificity.as_deref(),
                Specificity::Vague.as_str(),
            );
            Specificity::Vague
        }
    };
    let expected_direction = match raw
        .expected_direction
        .as_deref()
        .and_then(VoteDirection::parse)
    {
        Some(direction) => direction,
        None => {
            report.fallback(
                code,
                "expected_direction",
                raw.expected_direction.as_deref(),
                VoteDirection::For.as_str(),
            );
            VoteDirection::For
        }
    };

    let summary = raw
        .summary
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(raw.text.trim());

    Some(Promise {
        code: code.to_string(),
        party_id: raw.party_id.clone(),
        election_year: raw.election_year,
        text: raw.text.clone(),
        summary: summary.to_string(),
        theme,
        specificity,
        expected_direction,
    })
}

fn motion_from_raw(raw: &RawMotion, report: &mut IngestReport) -> Option<Motion> {
    let id = raw.id.trim();
    if id.is_empty() {
        report.skip("motion", &raw.title, "empty motion id");
        return None;
    }
    let Some(introduced) = parse_date(&raw.introduced_date) else {
        report.skip("motion", id, "unparseable introduced_date");
        return None;
    };

    Some(Motion {
        id: id.to_string(),
        title: raw.title.trim().to_string(),
        text: raw.text.clone().unwrap_or_default(),
        introduced,
        kind: raw
            .kind
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
    })
}

fn vote_outcome_from_raw(
    store: &SqliteStore,
    raw: &RawVoteOutcome,
    report: &mut IngestReport,
) -> Result<VoteOutcome> {
    let mut party_votes = Vec::with_capacity(raw.per_party.len());
    for party_vote in &raw.per_party {
        if !store.party_exists(&party_vote.party_id)? {
            let key = format!("{}/{}", raw.motion_id, party_vote.party_id);
            report.skip("party vote", &key, "unknown party");
            continue;
        }
        party_votes.push(PartyVote {
            party_id: party_vote.party_id.clone(),
            vote: party_vote.vote.as_deref().and_then(VoteDirection::parse),
            seats: party_vote.seats,
        });
    }

    Ok(VoteOutcome {
        motion_id: raw.motion_id.clone(),
        result: raw.result.trim().to_string(),
        total_for: raw.total_for,
        total_against: raw.total_against,
        total_abstain: raw.total_abstain,
        party_votes,
    })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let day = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{PipelineStore, PromiseFilter};

    fn dataset() -> Dataset {
        serde_json::from_value(serde_json::json!({
            "parties": [
                {"id": "sp", "name": "SP"},
                {"id": "vvd", "name": "VVD"}
            ],
            "programs": [
                {"party_id": "sp", "election_year": 2023, "title": "Nu de mensen"},
                {"party_id": "d66", "election_year": 2023}
            ],
            "promises": [
                {
                    "code": "SP-1",
                    "party_id": "sp",
                    "election_year": 2023,
                    "text": "Minimumloon verhogen naar 16 euro per uur",
                    "summary": "Minimumloon naar 16 euro",
                    "theme": "Werk",
                    "specificity": "CONCRETE",
                    "expected_direction": "FOR"
                },
                {
                    "code": "VVD-1",
                    "party_id": "vvd",
                    "election_year": 2023,
                    "text": "Lagere lasten voor ondernemers",
                    "theme": "astrologie",
                    "specificity": "vaag"
                },
                {
                    "code": "PVV-1",
                    "party_id": "pvv",
                    "election_year": 2023,
                    "text": "Asielstop"
                }
            ],
            "motions": [
                {
                    "id": "2024Z00001",
                    "title": "Motie over het minimumloon",
                    "text": "verzoekt de regering het minimumloon te verhogen",
                    "introduced_date": "2024-03-05T10:00:00Z"
                },
                {
                    "id": "2024Z00002",
                    "title": "Motie zonder datum",
                    "introduced_date": "gisteren"
                }
            ],
            "votes": [
                {
                    "motion_id": "2024Z00001",
                    "result": "aangenomen",
                    "total_for": 76,
                    "total_against": 74,
                    "per_party": [
                        {"party_id": "sp", "vote": "Voor", "seats": 5},
                        {"party_id": "vvd", "vote": "Tegen", "seats": 24},
                        {"party_id": "bbb", "vote": "Voor", "seats": 7}
                    ]
                },
                {"motion_id": "2024Z99999", "result": "verworpen"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn ingest_validates_and_skips_unknown_references() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let report = ingest_dataset(&mut store, &dataset()).unwrap();
        let counts = &report.counts;

        assert_eq!(counts.parties_inserted, 2);
        assert_eq!(counts.programs_inserted, 2);
        assert_eq!(counts.promises_inserted, 2);
        assert_eq!(counts.motions_inserted, 1);
        assert_eq!(counts.votes_inserted, 1);
        // d66 program, pvv promise, undated motion, bbb party vote, unknown motion vote
        assert_eq!(counts.skipped_records, 5);
        // VVD-1 has an unknown theme and no expected direction
        assert_eq!(counts.fallback_values, 2);

        let promises = store.load_promises(&PromiseFilter::default()).unwrap();
        let vvd = promises.iter().find(|value| value.code == "VVD-1").unwrap();
        assert_eq!(vvd.theme, Theme::Other);
        assert_eq!(vvd.specificity, Specificity::Vague);
        assert_eq!(vvd.summary, "Lagere lasten voor ondernemers");
        let sp = promises.iter().find(|value| value.code == "SP-1").unwrap();
        assert_eq!(sp.theme, Theme::Labour);

        let outcomes = store
            .load_vote_outcomes(&["2024Z00001".to_string()])
            .unwrap();
        assert_eq!(outcomes["2024Z00001"].party_votes.len(), 2);
    }

    #[test]
    fn reingest_counts_updates_not_failures() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        ingest_dataset(&mut store, &dataset()).unwrap();
        let report = ingest_dataset(&mut store, &dataset()).unwrap();

        assert_eq!(report.counts.parties_inserted, 0);
        assert_eq!(report.counts.parties_updated, 2);
        assert_eq!(report.counts.promises_updated, 2);
        assert_eq!(report.counts.motions_updated, 1);
        assert_eq!(report.counts.votes_updated, 1);
    }

    #[test]
    fn preview_resolves_rows_from_earlier_ingest_and_keeps_nothing() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut earlier = dataset();
        earlier.votes.clear();
        ingest_dataset(&mut store, &earlier).unwrap();

        let votes_only: Dataset = serde_json::from_value(serde_json::json!({
            "votes": [
                {
                    "motion_id": "2024Z00001",
                    "result": "aangenomen",
                    "per_party": [
                        {"party_id": "sp", "vote": "Voor", "seats": 5},
                        {"party_id": "vvd", "vote": "Tegen", "seats": 24}
                    ]
                }
            ]
        }))
        .unwrap();

        let report = store
            .rolled_back(|store| ingest_dataset(store, &votes_only))
            .unwrap();

        assert_eq!(report.counts.skipped_records, 0);
        assert_eq!(report.counts.votes_inserted, 1);
        let outcomes = store
            .load_vote_outcomes(&["2024Z00001".to_string()])
            .unwrap();
        assert!(outcomes.is_empty());
        assert!(store.party_exists("sp").unwrap());
    }

    #[test]
    fn parse_date_keeps_calendar_day() {
        assert_eq!(
            parse_date("2023-11-22T09:30:00+01:00"),
            NaiveDate::from_ymd_opt(2023, 11, 22)
        );
        assert_eq!(parse_date(" 2021-03-17 "), NaiveDate::from_ymd_opt(2021, 3, 17));
        assert_eq!(parse_date("17-03-2021"), None);
    }
}
