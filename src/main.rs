use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use flock_feed::config::AppConfig;
use flock_feed::logging::{init_logging, OperationTimer};
use flock_feed::models::{Message, Post, SearchOptions};
use flock_feed::search::MessageSearchIndex;
use flock_feed::validation::InputValidator;
use flock_feed::DuplicateMatcher;

#[derive(Parser)]
#[command(author, version, about = "Chat search and feed deduplication tools")]
struct Cli {
    /// Configuration file (defaults to config/default, config/local, flock.*)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a JSON array of chat messages
    Search {
        /// File containing the messages
        #[arg(short, long)]
        messages: PathBuf,

        /// Free-text search term
        #[arg(short, long)]
        term: String,

        /// Restrict results to one conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Check whether one post duplicates another
    Dedup {
        /// File containing the candidate post
        #[arg(long)]
        candidate: PathBuf,

        /// File containing the canonical post
        #[arg(long)]
        canonical: PathBuf,

        /// Video ids already known to be canonical
        #[arg(long = "known-id")]
        known_ids: Vec<String>,
    },
    /// Drop posts that duplicate a canonical post
    Filter {
        /// File containing a JSON array of candidate posts
        #[arg(long)]
        candidates: PathBuf,

        /// File containing the canonical post
        #[arg(long)]
        canonical: PathBuf,
    },
    /// Print the embeddable player URL for a video link
    EmbedUrl {
        /// Any supported video URL
        url: String,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    // Initialize logging
    let _guard = init_logging(&config.logging, cli.log_level.as_deref())?;

    info!("Starting flock");

    match cli.command {
        Commands::Search {
            messages,
            term,
            conversation,
            limit,
        } => search_messages(&config, &messages, &term, conversation, limit),
        Commands::Dedup {
            candidate,
            canonical,
            known_ids,
        } => check_duplicate(&config, &candidate, &canonical, known_ids),
        Commands::Filter {
            candidates,
            canonical,
        } => filter_posts(&config, &candidates, &canonical),
        Commands::EmbedUrl { url } => embed_url(&config, &url),
    }
}

/// Read a JSON document from disk
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write a JSON value to stdout followed by a newline
fn print_json(value: &serde_json::Value) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

/// Build an index from a message file and run one query
fn search_messages(
    config: &AppConfig, messages_path: &Path, term: &str, conversation: Option<String>, limit: Option<usize>,
) -> Result<ExitCode> {
    let options = SearchOptions {
        conversation_id: conversation,
        limit,
    };
    let term = InputValidator::sanitize_text(term);
    InputValidator::validate_term(&term)?;
    InputValidator::validate_search_options(&options, &config.search)?;

    let file = File::open(messages_path)
        .with_context(|| format!("Failed to open {}", messages_path.display()))?;
    let messages = Message::parse_batch(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", messages_path.display()))?;
    info!("Loaded {} messages", messages.len());

    let timer = OperationTimer::new("search");
    let mut index = MessageSearchIndex::from_config(&config.search)?;
    index.index_messages(&messages);
    let hits = index.search(&term, &options);
    timer.finish();

    if hits.is_empty() {
        warn!("No messages matched '{}'", term);
    }

    print_json(&serde_json::to_value(&hits)?)?;
    Ok(ExitCode::SUCCESS)
}

/// Compare a single candidate against a canonical post
fn check_duplicate(
    config: &AppConfig, candidate_path: &Path, canonical_path: &Path, known_ids: Vec<String>,
) -> Result<ExitCode> {
    let candidate: Post = read_json(candidate_path)?;
    let canonical: Post = read_json(canonical_path)?;
    let known_ids: BTreeSet<String> = known_ids.into_iter().collect();

    let matcher = DuplicateMatcher::from_config(&config.dedup)?;
    let reason = matcher.check(&candidate, &canonical, &known_ids);

    print_json(&serde_json::json!({
        "duplicate": reason.is_some(),
        "reason": reason.as_ref().map(ToString::to_string),
    }))?;
    Ok(ExitCode::SUCCESS)
}

/// Drop duplicates of a canonical post from a batch
fn filter_posts(config: &AppConfig, candidates_path: &Path, canonical_path: &Path) -> Result<ExitCode> {
    let candidates: Vec<Post> = read_json(candidates_path)?;
    let canonical: Post = read_json(canonical_path)?;

    let timer = OperationTimer::new("filter");
    let matcher = DuplicateMatcher::from_config(&config.dedup)?;
    let kept = matcher.filter_duplicates(candidates, &canonical);
    timer.finish();

    print_json(&serde_json::to_value(&kept)?)?;
    Ok(ExitCode::SUCCESS)
}

/// Print the embed URL, failing when no video id is recognized
fn embed_url(config: &AppConfig, url: &str) -> Result<ExitCode> {
    let matcher = DuplicateMatcher::from_config(&config.dedup)?;
    match matcher.extractor().embed_url(url) {
        Some(embed) => {
            writeln!(std::io::stdout().lock(), "{embed}")?;
            Ok(ExitCode::SUCCESS)
        },
        None => {
            warn!("No video id found in {}", url);
            Ok(ExitCode::FAILURE)
        },
    }
}
