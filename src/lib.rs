//! Flock Feed - Chat Search and Feed Deduplication
//!
//! Two utilities behind the church community app:
//!
//! - an in-memory full-text index over chat messages, with stemming, typo
//!   tolerance and optional conversation scoping
//! - a matcher that spots feed posts re-sharing a video another post already
//!   shows, so the feed doesn't list the same live stream twice
//!
//! Both operate on caller-supplied snapshots and own no persistence.

/// Tokenization and stemming shared by indexing and search
pub mod analysis;
/// Configuration management
pub mod config;
/// Duplicate post detection
pub mod dedup;
/// Error types
pub mod error;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Message search index
pub mod search;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use analysis::TextAnalyzer;
pub use config::AppConfig;
pub use dedup::{is_duplicate, DuplicateMatcher, DuplicateReason, VideoIdExtractor};
pub use error::{FlockError, Result};
pub use models::{Message, Post, SearchHit, SearchOptions};
pub use search::MessageSearchIndex;
