use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::model::{MatchTarget, MatchType, ReviewStatus};

#[derive(Parser, Debug)]
#[command(
    name = "mandate",
    version,
    about = "Promise-to-motion matching and mandate consistency scoring"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Ingest(IngestArgs),
    Match(MatchArgs),
    Score(ScoreArgs),
    Predict(PredictArgs),
    Review(ReviewArgs),
    Purge(PurgeArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, default_value = ".cache/mandate")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// JSON file overriding pipeline thresholds and word lists.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl StoreArgs {
    pub fn resolve_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.cache_root.join("mandate.sqlite"))
    }
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub dataset: PathBuf,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MatchArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, value_enum, default_value_t = MatchTarget::Motion)]
    pub target: MatchTarget,

    #[arg(long)]
    pub party: Option<String>,

    #[arg(long)]
    pub year: Option<i32>,

    /// Maximum number of promises to match.
    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, default_value = "kw-1")]
    pub algorithm_version: String,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Required to overwrite rows stored by an earlier run of the same
    /// algorithm version.
    #[arg(long, default_value_t = false)]
    pub confirm: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub party: Option<String>,

    #[arg(long)]
    pub year: Option<i32>,

    #[arg(long, default_value = "kw-1")]
    pub algorithm_version: String,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub party: Option<String>,

    /// Maximum number of motions to predict.
    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, default_value = "kw-1")]
    pub algorithm_version: String,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Required to overwrite rows stored by an earlier run of the same
    /// algorithm version.
    #[arg(long, default_value_t = false)]
    pub confirm: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReviewArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub promise: String,

    #[arg(long)]
    pub motion: String,

    #[arg(long, value_enum)]
    pub status: ReviewStatus,

    #[arg(long, value_enum)]
    pub match_type: Option<MatchType>,

    #[arg(long, default_value = "kw-1")]
    pub algorithm_version: String,
}

#[derive(Args, Debug, Clone)]
pub struct PurgeArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Restrict the purge to one algorithm version; all versions otherwise.
    #[arg(long)]
    pub algorithm_version: Option<String>,

    #[arg(long, default_value_t = false)]
    pub cascade_predictions: bool,

    /// Without this flag the purge only reports what it would delete.
    #[arg(long, default_value_t = false)]
    pub confirm: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}
