use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::fmt;
use stop_words::{get, LANGUAGE};
use unicode_normalization::UnicodeNormalization;

use crate::config::SearchConfig;
use crate::error::{FlockError, Result};

/// Languages with both a stemmer and a stop word list
pub const SUPPORTED_LANGUAGES: [&str; 6] = [
    "english",
    "spanish",
    "french",
    "german",
    "portuguese",
    "italian",
];

fn resolve_language(language: &str) -> Result<(Algorithm, LANGUAGE)> {
    match language.to_lowercase().as_str() {
        "english" | "en" => Ok((Algorithm::English, LANGUAGE::English)),
        "spanish" | "es" => Ok((Algorithm::Spanish, LANGUAGE::Spanish)),
        "french" | "fr" => Ok((Algorithm::French, LANGUAGE::French)),
        "german" | "de" => Ok((Algorithm::German, LANGUAGE::German)),
        "portuguese" | "pt" => Ok((Algorithm::Portuguese, LANGUAGE::Portuguese)),
        "italian" | "it" => Ok((Algorithm::Italian, LANGUAGE::Italian)),
        other => Err(FlockError::UnsupportedLanguage(other.to_string())),
    }
}

/// Whether `language` (name or two-letter code) has a stemmer here
#[must_use]
pub fn is_supported_language(language: &str) -> bool {
    resolve_language(language).is_ok()
}

/// Tokenizer and stemmer shared by indexing and querying
///
/// Both sides of a search must go through the same analyzer, otherwise
/// "praying" in a message and "pray" in a query stem differently.
pub struct TextAnalyzer {
    language: String,
    emoji_regex: Regex,
    special_chars_regex: Regex,
    extra_spaces_regex: Regex,
    stopwords: Option<HashSet<String>>,
    stemmer: Stemmer,
}

impl fmt::Debug for TextAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextAnalyzer")
            .field("language", &self.language)
            .field("remove_stop_words", &self.stopwords.is_some())
            .finish_non_exhaustive()
    }
}

impl TextAnalyzer {
    /// Create an analyzer for `language`, optionally dropping stop words
    pub fn new(language: &str, remove_stop_words: bool) -> Result<Self> {
        let (algorithm, stop_language) = resolve_language(language)?;

        let emoji_regex = Regex::new(r"\p{Extended_Pictographic}")?;
        // Word characters survive; everything else becomes a separator
        let special_chars_regex = Regex::new(r"[^\w\s]|_")?;
        let extra_spaces_regex = Regex::new(r"\s+")?;

        let stopwords = remove_stop_words.then(|| {
            get(stop_language)
                .iter()
                .map(ToString::to_string)
                .collect::<HashSet<String>>()
        });

        Ok(Self {
            language: language.to_lowercase(),
            emoji_regex,
            special_chars_regex,
            extra_spaces_regex,
            stopwords,
            stemmer: Stemmer::create(algorithm),
        })
    }

    /// Create an analyzer from the search section of the configuration
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        Self::new(&config.language, config.remove_stop_words)
    }

    /// English analyzer that keeps stop words
    pub fn english() -> Result<Self> {
        Self::new("english", false)
    }

    /// Language this analyzer stems for
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Lowercase, strip punctuation and emoji, collapse whitespace
    #[must_use]
    pub fn normalize(&self, text: &str) -> String {
        let normalized = text.nfc().collect::<String>();
        let no_emojis = self.emoji_regex.replace_all(&normalized, " ");
        let no_special = self.special_chars_regex.replace_all(&no_emojis, " ");
        let collapsed = self.extra_spaces_regex.replace_all(&no_special, " ");
        collapsed.trim().to_lowercase()
    }

    /// Split text into stemmed search tokens
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.normalize(text)
            .split_whitespace()
            .filter(|word| {
                self.stopwords
                    .as_ref()
                    .map_or(true, |stopwords| !stopwords.contains(*word))
            })
            .map(|word| self.stemmer.stem(word).into_owned())
            .filter(|token| !token.is_empty())
            .collect()
    }
}
