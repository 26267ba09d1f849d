use chrono::NaiveDate;

use super::*;
use crate::model::{
    MatchRecord, MatchType, Motion, ProgramPassage, Specificity, Theme, VoteDirection,
};
use crate::store::{MatchQuery, SqliteStore};

const VERSION: &str = "kw-test";

fn promise(code: &str, party_id: &str, summary: &str) -> Promise {
    Promise {
        code: code.to_string(),
        party_id: party_id.to_string(),
        election_year: 2023,
        text: "Minimumloon verhogen naar 16 euro per uur".to_string(),
        summary: summary.to_string(),
        theme: Theme::Labour,
        specificity: Specificity::Concrete,
        expected_direction: VoteDirection::For,
    }
}

fn motion(id: &str, kind: Option<&str>, introduced: (i32, u32, u32)) -> Motion {
    Motion {
        id: id.to_string(),
        title: "Motie over het minimumloon".to_string(),
        text: "verzoekt de regering het minimumloon verhogen naar 16 euro per uur".to_string(),
        introduced: NaiveDate::from_ymd_opt(introduced.0, introduced.1, introduced.2).unwrap(),
        kind: kind.map(ToOwned::to_owned),
    }
}

fn options(dry_run: bool) -> MatchOptions {
    MatchOptions {
        party_id: None,
        election_year: None,
        limit: None,
        algorithm_version: VERSION.to_string(),
        dry_run,
    }
}

fn query(target: MatchTarget) -> MatchQuery<'static> {
    MatchQuery {
        target,
        algorithm_version: VERSION,
        party_id: None,
        election_year: None,
        target_ids: None,
    }
}

fn seeded_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    for party in ["sp", "vvd"] {
        store.upsert_party(party, party).unwrap();
        store.upsert_program(party, 2023, None).unwrap();
    }
    store
        .upsert_promise(&promise("SP-1", "sp", "Minimumloon naar 16 euro"))
        .unwrap();
    store.upsert_motion(&motion("M-1", None, (2024, 3, 5))).unwrap();
    store
        .upsert_motion(&motion("M-2", Some("Motie van wantrouwen"), (2024, 3, 6)))
        .unwrap();
    store.upsert_motion(&motion("M-3", None, (2020, 1, 1))).unwrap();
    store
}

#[test]
fn procedural_and_out_of_scope_motions_never_match() {
    let mut store = seeded_store();
    let config = PipelineConfig::default();

    let counts = match_motions(&mut store, &config, &options(false)).unwrap();

    assert_eq!(counts.promises_considered, 1);
    assert_eq!(counts.candidates_scanned, 3);
    assert_eq!(counts.procedural_excluded, 1);
    assert_eq!(counts.out_of_scope, 1);
    assert_eq!(counts.pairs_scored, 1);
    assert_eq!(counts.matches_persisted, 1);

    let stored = store.load_matches(&query(MatchTarget::Motion)).unwrap();
    assert_eq!(stored.len(), 1);
    let only = &stored[0];
    assert_eq!(only.target_id, "M-1");
    assert_eq!(only.algorithm_name, MOTION_ALGORITHM);
    assert_eq!(only.match_type, MatchType::Explicit);
    assert!(only.matched_terms.contains(&"minimumloon".to_string()));
    assert!(only.confidence > 0.0 && only.confidence <= 1.0);
}

#[test]
fn dry_run_scores_without_persisting() {
    let mut store = seeded_store();
    let config = PipelineConfig::default();

    let counts = match_motions(&mut store, &config, &options(true)).unwrap();

    assert_eq!(counts.matches_accepted, 1);
    assert_eq!(counts.matches_persisted, 0);
    assert_eq!(store.count_matches(None).unwrap(), 0);
}

#[test]
fn near_duplicate_promise_is_dropped_and_its_stale_matches_cleared() {
    let mut store = seeded_store();
    store
        .upsert_promise(&promise("SP-2", "sp", "minimumloon naar 16 euro"))
        .unwrap();
    let stale = MatchRecord {
        promise_code: "SP-2".to_string(),
        party_id: "sp".to_string(),
        target: MatchTarget::Motion,
        target_id: "M-1".to_string(),
        score: 0.4,
        matched_terms: vec!["minimumloon".to_string(), "euro".to_string()],
        match_type: MatchType::Implicit,
        confidence: 0.1,
        algorithm_name: MOTION_ALGORITHM.to_string(),
        algorithm_version: VERSION.to_string(),
        rationale: "{}".to_string(),
        review: None,
    };
    let key = ReplaceKey {
        promise_code: "SP-2",
        target: MatchTarget::Motion,
        algorithm_version: VERSION,
    };
    store.replace_matches(&key, &[stale]).unwrap();

    let config = PipelineConfig::default();
    let counts = match_motions(&mut store, &config, &options(false)).unwrap();

    assert_eq!(counts.promises_considered, 1);
    assert_eq!(counts.duplicate_promises_dropped, 1);
    let stored = store.load_matches(&query(MatchTarget::Motion)).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].promise_code, "SP-1");
}

#[test]
fn limit_caps_promises_considered() {
    let mut store = seeded_store();
    let config = PipelineConfig::default();
    let options = MatchOptions {
        limit: Some(0),
        ..options(false)
    };

    let counts = match_motions(&mut store, &config, &options).unwrap();

    assert_eq!(counts.promises_considered, 0);
    assert_eq!(counts.pairs_scored, 0);
    assert_eq!(store.count_matches(None).unwrap(), 0);
}

#[test]
fn passages_only_match_within_their_own_program() {
    let mut store = seeded_store();
    for (id, party_id) in [("P-SP", "sp"), ("P-VVD", "vvd")] {
        store
            .upsert_passage(&ProgramPassage {
                id: id.to_string(),
                party_id: party_id.to_string(),
                election_year: 2023,
                text: "Wij willen het minimumloon verhogen naar 16 euro per uur.".to_string(),
            })
            .unwrap();
    }
    let config = PipelineConfig::default();

    let counts = match_passages(&mut store, &config, &options(false)).unwrap();

    assert_eq!(counts.candidates_scanned, 1);
    assert_eq!(counts.matches_persisted, 1);
    let stored = store.load_matches(&query(MatchTarget::Passage)).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].target_id, "P-SP");
    assert_eq!(stored[0].algorithm_name, PASSAGE_ALGORITHM);
    assert!(store.load_matches(&query(MatchTarget::Motion)).unwrap().is_empty());
}
