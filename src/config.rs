use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analysis::is_supported_language;
use crate::dedup::VideoPattern;
use crate::error::{FlockError, Result};

/// Application configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub search: SearchConfig,
    pub dedup: DedupConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    /// Maximum edit distance between a query token and an indexed token
    pub tolerance: usize,
    pub content_boost: f64,
    pub author_boost: f64,
    pub remove_stop_words: bool,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub video_patterns: Vec<VideoPatternConfig>,
}

/// A named video URL shape; `regex` must capture the identifier as `id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoPatternConfig {
    pub name: String,
    pub regex: String,
}

impl VideoPatternConfig {
    pub fn new(name: &str, regex: &str) -> Self {
        Self {
            name: name.to_string(),
            regex: regex.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            format: "text".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 500,
            tolerance: 1,
            content_boost: 1.0,
            author_boost: 0.5,
            remove_stop_words: false,
            language: "english".to_string(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            video_patterns: vec![
                VideoPatternConfig::new(
                    "youtube_watch",
                    r"(?i:youtube(?:-nocookie)?\.com)/watch\?(?:[^#\s]*?(?:&amp;|&))?v=(?P<id>[A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
                ),
                VideoPatternConfig::new(
                    "youtube_path",
                    r"(?i:youtube(?:-nocookie)?\.com)/(?:embed|v|shorts|live)/(?P<id>[A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
                ),
                VideoPatternConfig::new(
                    "youtube_short_link",
                    r"(?i:youtu\.be)/(?P<id>[A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)",
                ),
            ],
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("flock").required(false));
        Self::finish(builder)
    }

    /// Load configuration from an explicit file, still honoring environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let builder = Config::builder().add_source(File::from(path).required(true));
        Self::finish(builder)
    }

    fn finish(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let app_config: Self = builder
            // Nested keys use a double underscore: FLOCK_SEARCH__DEFAULT_LIMIT
            .add_source(
                Environment::with_prefix("FLOCK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(FlockError::InvalidConfig(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            )));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(FlockError::InvalidConfig(format!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format, valid_formats
            )));
        }

        // Validate search config
        if self.search.default_limit == 0 {
            return Err(FlockError::InvalidConfig(
                "default_limit must be greater than 0".to_string(),
            ));
        }
        if self.search.max_limit < self.search.default_limit {
            return Err(FlockError::InvalidConfig(format!(
                "max_limit ({}) must be at least default_limit ({})",
                self.search.max_limit, self.search.default_limit
            )));
        }
        if self.search.tolerance > 3 {
            return Err(FlockError::InvalidConfig(
                "tolerance must be between 0 and 3".to_string(),
            ));
        }
        if !(self.search.content_boost >= 0.0 && self.search.author_boost >= 0.0) {
            return Err(FlockError::InvalidConfig(
                "field boosts must be non-negative".to_string(),
            ));
        }
        if !is_supported_language(&self.search.language) {
            return Err(FlockError::UnsupportedLanguage(self.search.language.clone()));
        }

        // Validate dedup config
        for pattern in &self.dedup.video_patterns {
            VideoPattern::new(&pattern.name, &pattern.regex)?;
        }

        Ok(())
    }
}
