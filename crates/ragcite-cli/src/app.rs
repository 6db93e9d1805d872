//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ragcite")]
#[command(
    author,
    version,
    about = "Ask questions over your documents and get answers with citations"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, env = "RAGCITE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest text files or directories
    Ingest(IngestArgs),

    /// Remove a document and its chunks
    #[command(alias = "rm")]
    Remove(RemoveArgs),

    /// List ingested documents
    Ls,

    /// Show index status
    Status,

    /// Ask a question
    Query(QueryArgs),

    /// Evaluate retrieval against a labelled test set
    Eval(EvalArgs),

    /// Compare two evaluation reports
    Compare(CompareArgs),

    /// List, show or delete conversation sessions
    Sessions(SessionsArgs),

    /// Show or create the configuration file
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct IngestArgs {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Document id (single file only; defaults to the file name)
    #[arg(long)]
    pub id: Option<String>,

    /// File extensions to pick up when walking directories
    #[arg(long, value_delimiter = ',', default_value = "txt,md")]
    pub ext: Vec<String>,
}

#[derive(Args)]
pub struct RemoveArgs {
    pub document_id: String,
}

#[derive(Args)]
pub struct QueryArgs {
    /// Question text
    #[arg(required = true)]
    pub query: Vec<String>,

    /// Number of passages to retrieve
    #[arg(short = 'n', long = "top-k")]
    pub top_k: Option<usize>,

    /// Show ranked passages only, without synthesis
    #[arg(long, conflicts_with = "session")]
    pub retrieve_only: bool,

    /// Continue a conversation: earlier turns of this session inform the
    /// answer, and the answer is added to it
    #[arg(short, long)]
    pub session: Option<String>,
}

#[derive(Args)]
pub struct EvalArgs {
    /// Test set (JSON array or JSONL)
    pub test_set: PathBuf,

    /// Cutoffs for Recall@k
    #[arg(short, long, value_delimiter = ',')]
    pub k: Option<Vec<usize>>,

    /// Write the report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Compare against a saved report and fail on regressions
    #[arg(long)]
    pub baseline: Option<PathBuf>,
}

#[derive(Args)]
pub struct CompareArgs {
    pub baseline: PathBuf,
    pub current: PathBuf,
}

#[derive(Args)]
pub struct SessionsArgs {
    #[command(subcommand)]
    pub action: SessionsAction,
}

#[derive(Subcommand)]
pub enum SessionsAction {
    /// List sessions, most recent first
    Ls {
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Print the turns of a session
    Show {
        session_id: String,
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Delete a session
    #[command(alias = "remove")]
    Rm { session_id: String },
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
}
