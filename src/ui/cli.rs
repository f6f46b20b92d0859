use clap::{Parser, Subcommand};

/// journal2vec - Semantic search over dated markdown journals
#[derive(Parser, Debug)]
#[command(name = "journal2vec")]
#[command(about = "A local-first, multi-granularity semantic search engine for dated markdown journals", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Custom base directory (default: ~/.journal2vec)
    #[arg(long, global = true)]
    pub base_dir: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize journal2vec (create directories and download models)
    Init,
    /// Rebuild the full index from the journal directory
    Index,
    /// Watch the journal directory and keep the index up to date
    Watch,
    /// Search your journal
    Search {
        /// Search query
        query: String,
        /// Retrieval granularity: day, memory, section or line
        #[arg(short, long)]
        mode: Option<String>,
        /// Score penalty per day of age, overriding the configured value
        #[arg(long)]
        recency_weight: Option<f32>,
        /// Maximum number of results to return
        #[arg(short = 'n', long)]
        n_results: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show current settings, or update the ones given as flags
    Settings {
        /// Root directory of the journal tree
        #[arg(long)]
        docs_dir: Option<String>,
        /// IANA time zone name, e.g. Europe/Berlin
        #[arg(long)]
        timezone: Option<String>,
        /// Prefix segment text with its heading line
        #[arg(long)]
        include_titles: Option<bool>,
        /// Default retrieval granularity: day, memory, section or line
        #[arg(long)]
        mode: Option<String>,
        /// Score penalty per day of age
        #[arg(long)]
        recency_weight: Option<f32>,
        /// Candidates fetched before reranking
        #[arg(long)]
        n_candidates: Option<usize>,
        /// Results returned per query
        #[arg(long)]
        n_results: Option<usize>,
    },
    /// Show index status
    Status,
    /// Clear the index (run `index` afterwards to repopulate)
    Reset,
}
