use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, OptionalExtension, ToSql, params, params_from_iter};

use crate::model::{
    MatchRecord, MatchTarget, MatchType, Motion, PartyVote, Prediction, ProgramPassage, Promise,
    ReviewStatus, Specificity, Theme, VoteDirection, VoteOutcome,
};
use crate::store::{MatchQuery, PipelineStore, PredictionKey, PromiseFilter, ReplaceKey};
use crate::util::now_utc_string;

pub const DB_SCHEMA_VERSION: &str = "0.2.0";

const MAX_IN_PARAMS: usize = 500;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

pub struct SqliteStore {
    connection: Connection,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        connection
            .pragma_update(None, "journal_mode", "WAL")
            .context("failed to set journal_mode=WAL")?;
        connection
            .pragma_update(None, "synchronous", "NORMAL")
            .context("failed to set synchronous=NORMAL")?;

        let store = Self { connection };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory database")?;
        let store = Self { connection };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        self.connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS metadata (
                  key TEXT PRIMARY KEY,
                  value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS parties (
                  party_id TEXT PRIMARY KEY,
                  name TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS programs (
                  party_id TEXT NOT NULL,
                  election_year INTEGER NOT NULL,
                  title TEXT,
                  PRIMARY KEY (party_id, election_year),
                  FOREIGN KEY (party_id) REFERENCES parties(party_id)
                );

                CREATE TABLE IF NOT EXISTS promises (
                  promise_code TEXT PRIMARY KEY,
                  party_id TEXT NOT NULL,
                  election_year INTEGER NOT NULL,
                  text TEXT NOT NULL,
                  summary TEXT NOT NULL,
                  theme TEXT NOT NULL,
                  specificity TEXT NOT NULL,
                  expected_direction TEXT NOT NULL,
                  FOREIGN KEY (party_id, election_year) REFERENCES programs(party_id, election_year)
                );

                CREATE TABLE IF NOT EXISTS passages (
                  passage_id TEXT PRIMARY KEY,
                  party_id TEXT NOT NULL,
                  election_year INTEGER NOT NULL,
                  text TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS motions (
                  motion_id TEXT PRIMARY KEY,
                  title TEXT NOT NULL,
                  text TEXT NOT NULL,
                  introduced_date TEXT NOT NULL,
                  kind TEXT
                );

                CREATE TABLE IF NOT EXISTS vote_outcomes (
                  motion_id TEXT PRIMARY KEY,
                  result TEXT NOT NULL,
                  total_for INTEGER NOT NULL,
                  total_against INTEGER NOT NULL,
                  total_abstain INTEGER NOT NULL,
                  FOREIGN KEY (motion_id) REFERENCES motions(motion_id)
                );

                CREATE TABLE IF NOT EXISTS party_votes (
                  motion_id TEXT NOT NULL,
                  party_id TEXT NOT NULL,
                  vote TEXT,
                  seats INTEGER NOT NULL DEFAULT 0,
                  PRIMARY KEY (motion_id, party_id)
                );

                CREATE TABLE IF NOT EXISTS matches (
                  promise_code TEXT NOT NULL,
                  party_id TEXT NOT NULL,
                  target_type TEXT NOT NULL,
                  target_id TEXT NOT NULL,
                  score REAL NOT NULL,
                  matched_terms TEXT NOT NULL,
                  match_type TEXT NOT NULL,
                  confidence REAL NOT NULL,
                  algorithm_name TEXT NOT NULL,
                  algorithm_version TEXT NOT NULL,
                  rationale TEXT NOT NULL,
                  review_status TEXT,
                  created_at TEXT NOT NULL,
                  PRIMARY KEY (promise_code, target_type, target_id, algorithm_version)
                );

                CREATE TABLE IF NOT EXISTS predictions (
                  motion_id TEXT NOT NULL,
                  party_id TEXT NOT NULL,
                  algorithm_version TEXT NOT NULL,
                  predicted_vote TEXT NOT NULL,
                  confidence REAL NOT NULL,
                  rationale TEXT NOT NULL,
                  actual_vote TEXT,
                  deviates INTEGER,
                  created_at TEXT NOT NULL,
                  PRIMARY KEY (motion_id, party_id, algorithm_version)
                );

                CREATE INDEX IF NOT EXISTS idx_promises_party_year ON promises(party_id, election_year);
                CREATE INDEX IF NOT EXISTS idx_passages_party_year ON passages(party_id, election_year);
                CREATE INDEX IF NOT EXISTS idx_matches_target ON matches(target_type, target_id, algorithm_version);
                CREATE INDEX IF NOT EXISTS idx_matches_version ON matches(algorithm_version);
                CREATE INDEX IF NOT EXISTS idx_predictions_version ON predictions(algorithm_version);
                ",
            )
            .context("failed to initialize schema")?;
        self.ensure_column_exists("matches", "reviewed_match_type TEXT")?;

        self.connection.execute(
            "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [DB_SCHEMA_VERSION],
        )?;
        self.connection.execute(
            "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
             ON CONFLICT(key) DO NOTHING",
            [now_utc_string()],
        )?;

        Ok(())
    }

    fn ensure_column_exists(&self, table_name: &str, column_definition: &str) -> Result<()> {
        let Some(column_name) = column_definition.split_whitespace().next() else {
            bail!("invalid column definition: {column_definition}");
        };

        let mut statement = self
            .connection
            .prepare(&format!("PRAGMA table_info({table_name})"))
            .with_context(|| format!("failed to inspect schema for table {table_name}"))?;
        let mut rows = statement.query([])?;
        while let Some(row) = rows.next()? {
            let existing_name: String = row.get(1)?;
            if existing_name == column_name {
                return Ok(());
            }
        }

        self.connection
            .execute(
                &format!("ALTER TABLE {table_name} ADD COLUMN {column_definition}"),
                [],
            )
            .with_context(|| format!("failed to add column {column_name} on {table_name}"))?;
        Ok(())
    }

    pub fn touch(&self) -> Result<()> {
        self.connection.execute(
            "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [now_utc_string()],
        )?;
        Ok(())
    }

    pub fn rolled_back<T>(&mut self, apply: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.connection
            .execute_batch("SAVEPOINT preview")
            .context("failed to open preview savepoint")?;
        let result = apply(self);
        self.connection
            .execute_batch("ROLLBACK TO preview; RELEASE preview")
            .context("failed to roll back preview")?;
        result
    }

    /// Inserts a row; a duplicate key is not a failure and turns into an
    /// update of the existing row. Both statements share parameter order.
    fn insert_or_update(
        &self,
        insert_sql: &str,
        update_sql: &str,
        values: &[&dyn ToSql],
    ) -> Result<UpsertOutcome> {
        match self.connection.execute(insert_sql, values) {
            Ok(_) => Ok(UpsertOutcome::Inserted),
            Err(err) if is_constraint_violation(&err) => {
                self.connection
                    .execute(update_sql, values)
                    .context("failed to update existing row")?;
                Ok(UpsertOutcome::Updated)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn upsert_party(&self, party_id: &str, name: &str) -> Result<UpsertOutcome> {
        self.insert_or_update(
            "INSERT INTO parties(party_id, name) VALUES(?1, ?2)",
            "UPDATE parties SET name=?2 WHERE party_id=?1",
            &[&party_id, &name],
        )
        .with_context(|| format!("failed to upsert party {party_id}"))
    }

    pub fn upsert_program(
        &self,
        party_id: &str,
        election_year: i32,
        title: Option<&str>,
    ) -> Result<UpsertOutcome> {
        self.insert_or_update(
            "INSERT INTO programs(party_id, election_year, title) VALUES(?1, ?2, ?3)",
            "UPDATE programs SET title=COALESCE(?3, title) WHERE party_id=?1 AND election_year=?2",
            &[&party_id, &election_year, &title],
        )
        .with_context(|| format!("failed to upsert program {party_id}/{election_year}"))
    }

    pub fn upsert_promise(&self, promise: &Promise) -> Result<UpsertOutcome> {
        self.insert_or_update(
            "
            INSERT INTO promises(promise_code, party_id, election_year, text, summary, theme, specificity, expected_direction)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
            "
            UPDATE promises SET
              party_id=?2, election_year=?3, text=?4, summary=?5, theme=?6, specificity=?7, expected_direction=?8
            WHERE promise_code=?1
            ",
            &[
                &promise.code,
                &promise.party_id,
                &promise.election_year,
                &promise.text,
                &promise.summary,
                &promise.theme.as_str(),
                &promise.specificity.as_str(),
                &promise.expected_direction.as_str(),
            ],
        )
        .with_context(|| format!("failed to upsert promise {}", promise.code))
    }

    pub fn upsert_passage(&self, passage: &ProgramPassage) -> Result<UpsertOutcome> {
        self.insert_or_update(
            "INSERT INTO passages(passage_id, party_id, election_year, text) VALUES(?1, ?2, ?3, ?4)",
            "UPDATE passages SET party_id=?2, election_year=?3, text=?4 WHERE passage_id=?1",
            &[
                &passage.id,
                &passage.party_id,
                &passage.election_year,
                &passage.text,
            ],
        )
        .with_context(|| format!("failed to upsert passage {}", passage.id))
    }

    pub fn upsert_motion(&self, motion: &Motion) -> Result<UpsertOutcome> {
        self.insert_or_update(
            "INSERT INTO motions(motion_id, title, text, introduced_date, kind) VALUES(?1, ?2, ?3, ?4, ?5)",
            "UPDATE motions SET title=?2, text=?3, introduced_date=?4, kind=?5 WHERE motion_id=?1",
            &[
                &motion.id,
                &motion.title,
                &motion.text,
                &motion.introduced,
                &motion.kind,
            ],
        )
        .with_context(|| format!("failed to upsert motion {}", motion.id))
    }

    pub fn upsert_vote_outcome(&mut self, outcome: &VoteOutcome) -> Result<UpsertOutcome> {
        let tx = self.connection.savepoint()?;
        let existed = tx
            .query_row(
                "SELECT 1 FROM vote_outcomes WHERE motion_id = ?1",
                [&outcome.motion_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        tx.execute(
            "
            INSERT INTO vote_outcomes(motion_id, result, total_for, total_against, total_abstain)
            VALUES(?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(motion_id) DO UPDATE SET
              result=excluded.result,
              total_for=excluded.total_for,
              total_against=excluded.total_against,
              total_abstain=excluded.total_abstain
            ",
            params![
                outcome.motion_id,
                outcome.result,
                outcome.total_for,
                outcome.total_against,
                outcome.total_abstain,
            ],
        )?;
        tx.execute(
            "DELETE FROM party_votes WHERE motion_id = ?1",
            [&outcome.motion_id],
        )?;
        {
            let mut statement = tx.prepare(
                "INSERT INTO party_votes(motion_id, party_id, vote, seats) VALUES(?1, ?2, ?3, ?4)",
            )?;
            for party_vote in &outcome.party_votes {
                statement.execute(params![
                    outcome.motion_id,
                    party_vote.party_id,
                    party_vote.vote.map(VoteDirection::as_str),
                    party_vote.seats,
                ])?;
            }
        }
        tx.commit()
            .with_context(|| format!("failed to store vote outcome {}", outcome.motion_id))?;

        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    pub fn party_exists(&self, party_id: &str) -> Result<bool> {
        self.exists("SELECT 1 FROM parties WHERE party_id = ?1", party_id)
    }

    pub fn motion_exists(&self, motion_id: &str) -> Result<bool> {
        self.exists("SELECT 1 FROM motions WHERE motion_id = ?1", motion_id)
    }

    fn exists(&self, sql: &str, key: &str) -> Result<bool> {
        let found = self
            .connection
            .query_row(sql, [key], |_| Ok(()))
            .optional()?
            .is_some();
        Ok(found)
    }

    pub fn set_review(
        &self,
        promise_code: &str,
        target_id: &str,
        algorithm_version: &str,
        status: ReviewStatus,
        match_type: Option<MatchType>,
    ) -> Result<usize> {
        let updated = self.connection.execute(
            "
            UPDATE matches SET
              review_status=?4,
              match_type=COALESCE(?5, match_type),
              reviewed_match_type=COALESCE(?5, reviewed_match_type)
            WHERE promise_code=?1 AND target_type='motion' AND target_id=?2 AND algorithm_version=?3
            ",
            params![
                promise_code,
                target_id,
                algorithm_version,
                status.as_str(),
                match_type.map(MatchType::as_str),
            ],
        )?;
        Ok(updated)
    }

    pub fn count_matches(&self, algorithm_version: Option<&str>) -> Result<i64> {
        self.count_scoped("matches", algorithm_version)
    }

    pub fn count_target_matches(
        &self,
        target: MatchTarget,
        algorithm_version: &str,
    ) -> Result<i64> {
        let count = self.connection.query_row(
            "SELECT COUNT(*) FROM matches WHERE target_type = ?1 AND algorithm_version = ?2",
            params![target.as_str(), algorithm_version],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_predictions(&self, algorithm_version: Option<&str>) -> Result<i64> {
        self.count_scoped("predictions", algorithm_version)
    }

    pub fn purge_matches(&self, algorithm_version: Option<&str>) -> Result<usize> {
        self.delete_scoped("matches", algorithm_version)
    }

    pub fn purge_predictions(&self, algorithm_version: Option<&str>) -> Result<usize> {
        self.delete_scoped("predictions", algorithm_version)
    }

    fn count_scoped(&self, table: &str, algorithm_version: Option<&str>) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {table} WHERE (?1 IS NULL OR algorithm_version = ?1)"
        );
        let count = self
            .connection
            .query_row(&sql, [algorithm_version], |row| row.get(0))?;
        Ok(count)
    }

    fn delete_scoped(&self, table: &str, algorithm_version: Option<&str>) -> Result<usize> {
        let sql = format!("DELETE FROM {table} WHERE (?1 IS NULL OR algorithm_version = ?1)");
        let deleted = self
            .connection
            .execute(&sql, [algorithm_version])
            .with_context(|| format!("failed to purge {table}"))?;
        Ok(deleted)
    }

    pub fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        let mut out = Vec::new();
        for table in [
            "parties",
            "programs",
            "promises",
            "passages",
            "motions",
            "vote_outcomes",
            "matches",
            "predictions",
        ] {
            let count = self.connection.query_row(
                &format!("SELECT COUNT(*) FROM {table}"),
                [],
                |row| row.get(0),
            )?;
            out.push((table, count));
        }
        Ok(out)
    }

    pub fn match_versions(&self) -> Result<Vec<(String, String, String, i64)>> {
        let mut statement = self.connection.prepare(
            "
            SELECT algorithm_name, algorithm_version, target_type, COUNT(*)
            FROM matches
            GROUP BY algorithm_name, algorithm_version, target_type
            ORDER BY algorithm_version, algorithm_name, target_type
            ",
        )?;
        let rows = statement.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn metadata_value(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .connection
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }
}

impl PipelineStore for SqliteStore {
    fn load_promises(&self, filter: &PromiseFilter) -> Result<Vec<Promise>> {
        let mut statement = self.connection.prepare(
            "
            SELECT promise_code, party_id, election_year, text, summary, theme, specificity, expected_direction
            FROM promises
            WHERE (?1 IS NULL OR party_id = ?1)
              AND (?2 IS NULL OR election_year = ?2)
            ORDER BY party_id ASC, election_year ASC, promise_code ASC
            ",
        )?;

        let mut rows = statement.query(params![filter.party_id, filter.election_year])?;
        let mut out = Vec::<Promise>::new();
        while let Some(row) = rows.next()? {
            let theme: String = row.get(5)?;
            let specificity: String = row.get(6)?;
            let expected: String = row.get(7)?;
            out.push(Promise {
                code: row.get(0)?,
                party_id: row.get(1)?,
                election_year: row.get(2)?,
                text: row.get(3)?,
                summary: row.get(4)?,
                theme: Theme::parse(&theme).unwrap_or(Theme::Other),
                specificity: Specificity::parse(&specificity).unwrap_or(Specificity::Vague),
                expected_direction: VoteDirection::parse(&expected).unwrap_or(VoteDirection::For),
            });
        }

        Ok(out)
    }

    fn load_candidates(&self, after: Option<&str>, limit: usize) -> Result<Vec<Motion>> {
        let mut statement = self.connection.prepare(
            "
            SELECT motion_id, title, text, introduced_date, kind
            FROM motions
            WHERE (?1 IS NULL OR motion_id > ?1)
            ORDER BY motion_id ASC
            LIMIT ?2
            ",
        )?;

        let mut rows = statement.query(params![after, limit as i64])?;
        let mut out = Vec::<Motion>::new();
        while let Some(row) = rows.next()? {
            out.push(Motion {
                id: row.get(0)?,
                title: row.get(1)?,
                text: row.get(2)?,
                introduced: row.get::<_, NaiveDate>(3)?,
                kind: row.get(4)?,
            });
        }

        Ok(out)
    }

    fn load_motions(&self, motion_ids: &[String]) -> Result<HashMap<String, Motion>> {
        let mut out = HashMap::<String, Motion>::new();

        for chunk in motion_ids.chunks(MAX_IN_PARAMS) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut statement = self.connection.prepare(&format!(
                "
                SELECT motion_id, title, text, introduced_date, kind
                FROM motions
                WHERE motion_id IN ({placeholders})
                "
            ))?;
            let mut rows = statement.query(params_from_iter(chunk.iter()))?;
            while let Some(row) = rows.next()? {
                let motion_id: String = row.get(0)?;
                out.insert(
                    motion_id.clone(),
                    Motion {
                        id: motion_id,
                        title: row.get(1)?,
                        text: row.get(2)?,
                        introduced: row.get::<_, NaiveDate>(3)?,
                        kind: row.get(4)?,
                    },
                );
            }
        }

        Ok(out)
    }

    fn load_passages(&self, party_id: &str, election_year: i32) -> Result<Vec<ProgramPassage>> {
        let mut statement = self.connection.prepare(
            "
            SELECT passage_id, party_id, election_year, text
            FROM passages
            WHERE party_id = ?1 AND election_year = ?2
            ORDER BY passage_id ASC
            ",
        )?;

        let rows = statement.query_map(params![party_id, election_year], |row| {
            Ok(ProgramPassage {
                id: row.get(0)?,
                party_id: row.get(1)?,
                election_year: row.get(2)?,
                text: row.get(3)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn replace_matches(&mut self, key: &ReplaceKey<'_>, matches: &[MatchRecord]) -> Result<usize> {
        let tx = self.connection.savepoint()?;

        let mut reviews = HashMap::<String, (String, Option<String>)>::new();
        {
            let mut statement = tx.prepare(
                "
                SELECT target_id, review_status, reviewed_match_type
                FROM matches
                WHERE promise_code=?1 AND target_type=?2 AND algorithm_version=?3
                  AND review_status IS NOT NULL
                ",
            )?;
            let mut rows = statement.query(params![
                key.promise_code,
                key.target.as_str(),
                key.algorithm_version
            ])?;
            while let Some(row) = rows.next()? {
                reviews.insert(row.get(0)?, (row.get(1)?, row.get(2)?));
            }
        }

        tx.execute(
            "DELETE FROM matches WHERE promise_code=?1 AND target_type=?2 AND algorithm_version=?3",
            params![
                key.promise_code,
                key.target.as_str(),
                key.algorithm_version
            ],
        )?;

        {
            let mut statement = tx.prepare(
                "
                INSERT INTO matches(
                  promise_code, party_id, target_type, target_id, score, matched_terms, match_type,
                  confidence, algorithm_name, algorithm_version, rationale, review_status,
                  reviewed_match_type, created_at
                )
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                ",
            )?;
            let created_at = now_utc_string();
            for record in matches {
                let matched_terms = serde_json::to_string(&record.matched_terms)
                    .context("failed to serialize matched terms")?;
                // A stored review outlives re-runs. The match type only sticks
                // when the reviewer set one.
                let stored = reviews.get(&record.target_id);
                let (review, reviewed_type) = match (record.review, stored) {
                    (Some(review), _) => (Some(review.as_str()), None),
                    (None, Some((review, reviewed_type))) => {
                        (Some(review.as_str()), reviewed_type.as_deref())
                    }
                    (None, None) => (None, None),
                };
                let match_type = reviewed_type.unwrap_or(record.match_type.as_str());
                statement.execute(params![
                    key.promise_code,
                    record.party_id,
                    key.target.as_str(),
                    record.target_id,
                    record.score.max(0.0),
                    matched_terms,
                    match_type,
                    record.confidence.clamp(0.0, 1.0),
                    record.algorithm_name,
                    key.algorithm_version,
                    record.rationale,
                    review,
                    reviewed_type,
                    created_at,
                ])?;
            }
        }

        tx.commit().with_context(|| {
            format!(
                "failed to replace matches for promise {}",
                key.promise_code
            )
        })?;
        Ok(matches.len())
    }

    fn load_matches(&self, query: &MatchQuery<'_>) -> Result<Vec<MatchRecord>> {
        let base_sql = "
            SELECT m.promise_code, m.party_id, m.target_type, m.target_id, m.score, m.matched_terms,
                   m.match_type, m.confidence, m.algorithm_name, m.algorithm_version, m.rationale,
                   m.review_status
            FROM matches m
            JOIN promises p ON p.promise_code = m.promise_code
            WHERE m.target_type = ? AND m.algorithm_version = ?
            ";

        let mut base_params = vec![
            Value::Text(query.target.as_str().to_string()),
            Value::Text(query.algorithm_version.to_string()),
        ];
        let mut filters = String::new();
        if let Some(party_id) = query.party_id {
            filters.push_str(" AND p.party_id = ?");
            base_params.push(Value::Text(party_id.to_string()));
        }
        if let Some(election_year) = query.election_year {
            filters.push_str(" AND p.election_year = ?");
            base_params.push(Value::Integer(i64::from(election_year)));
        }

        let order = " ORDER BY m.promise_code ASC, m.score DESC, m.target_id ASC";
        let mut out = Vec::<MatchRecord>::new();

        match query.target_ids {
            None => {
                let sql = format!("{base_sql}{filters}{order}");
                self.collect_matches(&sql, &base_params, &mut out)?;
            }
            Some(target_ids) => {
                for chunk in target_ids.chunks(MAX_IN_PARAMS) {
                    let placeholders = vec!["?"; chunk.len()].join(", ");
                    let sql =
                        format!("{base_sql}{filters} AND m.target_id IN ({placeholders}){order}");
                    let mut chunk_params = base_params.clone();
                    chunk_params.extend(chunk.iter().map(|value| Value::Text(value.clone())));
                    self.collect_matches(&sql, &chunk_params, &mut out)?;
                }
            }
        }

        Ok(out)
    }

    fn load_vote_outcomes(&self, motion_ids: &[String]) -> Result<HashMap<String, VoteOutcome>> {
        let mut out = HashMap::<String, VoteOutcome>::new();

        for chunk in motion_ids.chunks(MAX_IN_PARAMS) {
            let placeholders = vec!["?"; chunk.len()].join(", ");

            let mut statement = self.connection.prepare(&format!(
                "
                SELECT motion_id, result, total_for, total_against, total_abstain
                FROM vote_outcomes
                WHERE motion_id IN ({placeholders})
                "
            ))?;
            let mut rows = statement.query(params_from_iter(chunk.iter()))?;
            while let Some(row) = rows.next()? {
                let motion_id: String = row.get(0)?;
                out.insert(
                    motion_id.clone(),
                    VoteOutcome {
                        motion_id,
                        result: row.get(1)?,
                        total_for: row.get(2)?,
                        total_against: row.get(3)?,
                        total_abstain: row.get(4)?,
                        party_votes: Vec::new(),
                    },
                );
            }

            let mut statement = self.connection.prepare(&format!(
                "
                SELECT motion_id, party_id, vote, seats
                FROM party_votes
                WHERE motion_id IN ({placeholders})
                ORDER BY motion_id ASC, party_id ASC
                "
            ))?;
            let mut rows = statement.query(params_from_iter(chunk.iter()))?;
            while let Some(row) = rows.next()? {
                let motion_id: String = row.get(0)?;
                let vote: Option<String> = row.get(2)?;
                let Some(outcome) = out.get_mut(&motion_id) else {
                    continue;
                };
                outcome.party_votes.push(PartyVote {
                    party_id: row.get(1)?,
                    vote: vote.as_deref().and_then(VoteDirection::parse),
                    seats: row.get(3)?,
                });
            }
        }

        Ok(out)
    }

    fn replace_predictions(
        &mut self,
        key: &PredictionKey<'_>,
        predictions: &[Prediction],
    ) -> Result<usize> {
        let tx = self.connection.savepoint()?;
        tx.execute(
            "
            DELETE FROM predictions
            WHERE motion_id=?1 AND algorithm_version=?2 AND (?3 IS NULL OR party_id = ?3)
            ",
            params![key.motion_id, key.algorithm_version, key.party_id],
        )?;

        {
            let mut statement = tx.prepare(
                "
                INSERT INTO predictions(
                  motion_id, party_id, algorithm_version, predicted_vote, confidence, rationale,
                  actual_vote, deviates, created_at
                )
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ",
            )?;
            let created_at = now_utc_string();
            for prediction in predictions {
                statement.execute(params![
                    key.motion_id,
                    prediction.party_id,
                    key.algorithm_version,
                    prediction.predicted_vote.as_str(),
                    prediction.confidence,
                    prediction.rationale,
                    prediction.actual_vote.map(VoteDirection::as_str),
                    prediction.deviates,
                    created_at,
                ])?;
            }
        }

        tx.commit().with_context(|| {
            format!("failed to replace predictions for motion {}", key.motion_id)
        })?;
        Ok(predictions.len())
    }
}

impl SqliteStore {
    fn collect_matches(
        &self,
        sql: &str,
        values: &[Value],
        out: &mut Vec<MatchRecord>,
    ) -> Result<()> {
        let mut statement = self.connection.prepare(sql)?;
        let mut rows = statement.query(params_from_iter(values.iter()))?;

        while let Some(row) = rows.next()? {
            let target_type: String = row.get(2)?;
            let matched_terms: String = row.get(5)?;
            let match_type: String = row.get(6)?;
            let review: Option<String> = row.get(11)?;

            out.push(MatchRecord {
                promise_code: row.get(0)?,
                party_id: row.get(1)?,
                target: if target_type == MatchTarget::Passage.as_str() {
                    MatchTarget::Passage
                } else {
                    MatchTarget::Motion
                },
                target_id: row.get(3)?,
                score: row.get(4)?,
                matched_terms: serde_json::from_str(&matched_terms).unwrap_or_default(),
                match_type: MatchType::parse(&match_type).unwrap_or(MatchType::Implicit),
                confidence: row.get(7)?,
                algorithm_name: row.get(8)?,
                algorithm_version: row.get(9)?,
                rationale: row.get(10)?,
                review: review.as_deref().and_then(ReviewStatus::parse),
            });
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == ErrorCode::ConstraintViolation
    )
}
