use clap::{Parser, Subcommand};
use std::path::PathBuf;
use verse_search::Result;
use verse_search::commands::{
    self, DEFAULT_STORE, chapters, clear, ingest, search, show_config, status,
};

#[derive(Parser)]
#[command(name = "verse-search")]
#[command(about = "Semantic search over scripture passages with chapter-level aggregation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current configuration
    Config,
    /// Embed a corpus data file and build the vector index
    Ingest {
        /// JSON file of chapter records with their passages
        data_file: PathBuf,
        /// Store to index into
        #[arg(long, default_value = DEFAULT_STORE)]
        store: String,
        /// Re-embed even if the store already matches the corpus
        #[arg(long)]
        force: bool,
    },
    /// Search individual passages by theme
    Search {
        /// Free-text theme to search for
        theme: String,
        /// Maximum number of passages to return
        #[arg(long, default_value_t = 5)]
        limit: usize,
        /// Similarity floor for semantic hits (0.0 to 1.0)
        #[arg(long)]
        min_similarity: Option<f32>,
        /// Skip the embedding model and match substrings only
        #[arg(long)]
        keyword_only: bool,
    },
    /// Search chapters by theme with composite relevance scoring
    Chapters {
        /// Free-text theme to search for
        theme: String,
        /// Maximum number of chapters to return
        #[arg(long, default_value_t = 5)]
        limit: usize,
        /// Result ordering: "relevance" or "id"
        #[arg(long, default_value = "relevance")]
        sort: String,
    },
    /// Detect wellness categories in free text and show supporting passages
    Wellness {
        /// Free text to analyze
        text: String,
        /// Passages to show per category
        #[arg(long, default_value_t = 3)]
        limit: usize,
    },
    /// Show store and corpus status
    Status,
    /// Remove all vectors from a store
    Clear {
        /// Store to clear
        #[arg(long, default_value = DEFAULT_STORE)]
        store: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config => {
            show_config()?;
        }
        Commands::Ingest {
            data_file,
            store,
            force,
        } => {
            ingest(&data_file, &store, force)?;
        }
        Commands::Search {
            theme,
            limit,
            min_similarity,
            keyword_only,
        } => {
            search(&theme, limit, min_similarity, keyword_only)?;
        }
        Commands::Chapters { theme, limit, sort } => {
            chapters(&theme, limit, &sort)?;
        }
        Commands::Wellness { text, limit } => {
            commands::wellness(&text, limit)?;
        }
        Commands::Status => {
            status()?;
        }
        Commands::Clear { store } => {
            clear(&store)?;
        }
    }

    Ok(())
}
