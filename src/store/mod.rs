use std::collections::HashMap;

use anyhow::Result;

use crate::model::{
    MatchRecord, MatchTarget, Motion, Prediction, ProgramPassage, Promise, VoteOutcome,
};

mod sqlite;

pub use sqlite::{DB_SCHEMA_VERSION, SqliteStore, UpsertOutcome};

#[derive(Debug, Clone, Default)]
pub struct PromiseFilter {
    pub party_id: Option<String>,
    pub election_year: Option<i32>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReplaceKey<'a> {
    pub promise_code: &'a str,
    pub target: MatchTarget,
    pub algorithm_version: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct PredictionKey<'a> {
    pub motion_id: &'a str,
    pub algorithm_version: &'a str,
    pub party_id: Option<&'a str>,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchQuery<'a> {
    pub target: MatchTarget,
    pub algorithm_version: &'a str,
    pub party_id: Option<&'a str>,
    pub election_year: Option<i32>,
    pub target_ids: Option<&'a [String]>,
}

pub trait PipelineStore {
    fn load_promises(&self, filter: &PromiseFilter) -> Result<Vec<Promise>>;

    fn load_candidates(&self, after: Option<&str>, limit: usize) -> Result<Vec<Motion>>;

    fn load_motions(&self, motion_ids: &[String]) -> Result<HashMap<String, Motion>>;

    fn load_passages(&self, party_id: &str, election_year: i32) -> Result<Vec<ProgramPassage>>;

    fn replace_matches(&mut self, key: &ReplaceKey<'_>, matches: &[MatchRecord]) -> Result<usize>;

    fn load_matches(&self, query: &MatchQuery<'_>) -> Result<Vec<MatchRecord>>;

    fn load_vote_outcomes(&self, motion_ids: &[String]) -> Result<HashMap<String, VoteOutcome>>;

    /// Replaces the predictions stored under `key`. With a party scope only
    /// that party's rows for the motion are touched.
    fn replace_predictions(
        &mut self,
        key: &PredictionKey<'_>,
        predictions: &[Prediction],
    ) -> Result<usize>;
}

pub struct CandidatePages<'a, S: PipelineStore + ?Sized> {
    store: &'a S,
    cursor: Option<String>,
    page_size: usize,
    done: bool,
}

impl<'a, S: PipelineStore + ?Sized> CandidatePages<'a, S> {
    pub fn new(store: &'a S, page_size: usize) -> Self {
        Self {
            store,
            cursor: None,
            page_size: page_size.max(1),
            done: false,
        }
    }
}

impl<S: PipelineStore + ?Sized> Iterator for CandidatePages<'_, S> {
    type Item = Result<Vec<Motion>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let page = match self
            .store
            .load_candidates(self.cursor.as_deref(), self.page_size)
        {
            Ok(page) => page,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        if page.len() < self.page_size {
            self.done = true;
        }
        let last = page.last()?;
        self.cursor = Some(last.id.clone());
        Some(Ok(page))
    }
}
