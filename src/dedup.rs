//! Cross-platform duplicate detection for feed posts
//!
//! A Facebook post that re-shares a YouTube live stream should not appear in
//! the feed next to the stream itself. The matcher compares a candidate post
//! against a canonical one using, in order:
//!
//! 1. identical post ids
//! 2. identical media URLs
//! 3. the canonical media URL pasted into the candidate's text
//! 4. a shared video identifier extracted from any URL in the candidate
//!
//! Video identifiers are pulled out with a configurable list of regexes, so
//! supporting another platform means adding a pattern, not another branch.
//! Nothing here returns an error at match time: a URL that doesn't parse is
//! simply no signal.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::config::DedupConfig;
use crate::error::{FlockError, Result};
use crate::metrics::MetricsCollector;
use crate::models::Post;

const VIDEO_ID_LEN: usize = 11;

/// True for a bare 11-character video identifier
#[must_use]
pub fn is_valid_video_id(candidate: &str) -> bool {
    candidate.len() == VIDEO_ID_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// A named URL shape that captures a video identifier as `id`
#[derive(Debug, Clone)]
pub struct VideoPattern {
    name: String,
    regex: Regex,
}

impl VideoPattern {
    /// Compile a pattern, rejecting regexes without an `id` group
    pub fn new(name: &str, source: &str) -> Result<Self> {
        let regex = Regex::new(source).map_err(|source| FlockError::InvalidPattern {
            name: name.to_string(),
            source,
        })?;
        if !regex.capture_names().flatten().any(|group| group == "id") {
            return Err(FlockError::MissingIdGroup(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            regex,
        })
    }

    /// Pattern name from configuration
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First identifier this pattern finds in `text`
    #[must_use]
    pub fn extract(&self, text: &str) -> Option<String> {
        self.regex
            .captures_iter(text)
            .filter_map(|captures| captures.name("id"))
            .map(|id| id.as_str())
            .find(|id| is_valid_video_id(id))
            .map(ToString::to_string)
    }
}

/// Pulls video identifiers out of URLs and free text
#[derive(Debug, Clone)]
pub struct VideoIdExtractor {
    patterns: Vec<VideoPattern>,
}

impl Default for VideoIdExtractor {
    fn default() -> Self {
        let patterns = DedupConfig::default()
            .video_patterns
            .iter()
            .filter_map(|pattern| VideoPattern::new(&pattern.name, &pattern.regex).ok())
            .collect();
        Self { patterns }
    }
}

impl VideoIdExtractor {
    /// Build an extractor from already compiled patterns
    #[must_use]
    pub const fn new(patterns: Vec<VideoPattern>) -> Self {
        Self { patterns }
    }

    /// Compile every configured pattern
    pub fn from_config(config: &DedupConfig) -> Result<Self> {
        let patterns = config
            .video_patterns
            .iter()
            .map(|pattern| VideoPattern::new(&pattern.name, &pattern.regex))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(patterns))
    }

    /// Patterns in match order
    #[must_use]
    pub fn patterns(&self) -> &[VideoPattern] {
        &self.patterns
    }

    /// Video identifier in `text`, trying patterns in order
    #[must_use]
    pub fn extract(&self, text: &str) -> Option<String> {
        self.patterns.iter().find_map(|pattern| pattern.extract(text))
    }

    /// Identifier from a post's media URL, external URL, then body
    #[must_use]
    pub fn extract_from_post(&self, post: &Post) -> Option<String> {
        [post.media_url(), post.external_url(), Some(post.content.as_str())]
            .into_iter()
            .flatten()
            .find_map(|text| self.extract(text))
    }

    /// Every identifier a canonical post is known by
    #[must_use]
    pub fn canonical_ids(&self, post: &Post) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        if let Some(source_id) = post.source_id.as_deref().map(str::trim) {
            if is_valid_video_id(source_id) {
                ids.insert(source_id.to_string());
            } else if let Some(id) = self.extract(source_id) {
                ids.insert(id);
            }
        }
        for url in [post.media_url(), post.external_url()].into_iter().flatten() {
            if let Some(id) = self.extract(url) {
                ids.insert(id);
            }
        }
        ids
    }

    /// Embeddable player URL for any recognized video link
    #[must_use]
    pub fn embed_url(&self, text: &str) -> Option<String> {
        self.extract(text)
            .map(|id| format!("https://www.youtube.com/embed/{id}"))
    }
}

/// Which rule flagged a post as a duplicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateReason {
    /// Both posts carry the same id
    SameId,
    /// Both posts point at the same media URL
    ExactMedia,
    /// The candidate's text contains the canonical media URL
    EmbeddedLink,
    /// The candidate links to a video the canonical post already shows
    SharedVideoId(String),
}

impl DuplicateReason {
    /// Stable label for logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SameId => "same_id",
            Self::ExactMedia => "exact_media",
            Self::EmbeddedLink => "embedded_link",
            Self::SharedVideoId(_) => "shared_video_id",
        }
    }
}

impl fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedVideoId(id) => write!(f, "{} ({id})", self.as_str()),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Decides whether a candidate post re-posts a canonical one
#[derive(Debug, Default)]
pub struct DuplicateMatcher {
    extractor: VideoIdExtractor,
    metrics: MetricsCollector,
}

impl DuplicateMatcher {
    /// Create a matcher around an extractor
    #[must_use]
    pub fn new(extractor: VideoIdExtractor) -> Self {
        Self {
            extractor,
            metrics: MetricsCollector::default(),
        }
    }

    /// Create a matcher from configured video patterns
    pub fn from_config(config: &DedupConfig) -> Result<Self> {
        Ok(Self::new(VideoIdExtractor::from_config(config)?))
    }

    /// The extractor used for rule 4
    #[must_use]
    pub const fn extractor(&self) -> &VideoIdExtractor {
        &self.extractor
    }

    /// Metrics recorded by this matcher
    #[must_use]
    pub const fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// The rule that marks `candidate` as a duplicate, if any
    ///
    /// `known_ids` adds video identifiers the caller already treats as
    /// canonical on top of those derived from `canonical` itself.
    #[must_use]
    pub fn check(
        &self,
        candidate: &Post,
        canonical: &Post,
        known_ids: &BTreeSet<String>,
    ) -> Option<DuplicateReason> {
        let reason = self.evaluate(candidate, canonical, known_ids);
        self.metrics
            .record_dedup_check(reason.as_ref().map(DuplicateReason::as_str));
        if let Some(reason) = &reason {
            debug!(
                candidate = %candidate.id,
                canonical = %canonical.id,
                %reason,
                "Duplicate post detected"
            );
        }
        reason
    }

    fn evaluate(
        &self,
        candidate: &Post,
        canonical: &Post,
        known_ids: &BTreeSet<String>,
    ) -> Option<DuplicateReason> {
        // Empty ids come from malformed records and identify nothing
        if !candidate.id.is_empty() && candidate.id == canonical.id {
            return Some(DuplicateReason::SameId);
        }

        if let Some(canonical_media) = canonical.media_url() {
            if candidate.media_url() == Some(canonical_media) {
                return Some(DuplicateReason::ExactMedia);
            }
            if candidate.content.contains(canonical_media) {
                return Some(DuplicateReason::EmbeddedLink);
            }
        }

        let candidate_id = self.extractor.extract_from_post(candidate)?;
        if known_ids.contains(&candidate_id)
            || self.extractor.canonical_ids(canonical).contains(&candidate_id)
        {
            return Some(DuplicateReason::SharedVideoId(candidate_id));
        }

        None
    }

    /// Whether `candidate` duplicates `canonical`
    #[must_use]
    pub fn is_duplicate(&self, candidate: &Post, canonical: &Post) -> bool {
        self.check(candidate, canonical, &BTreeSet::new()).is_some()
    }

    /// Whether `candidate` duplicates `canonical` or any known video id
    #[must_use]
    pub fn is_duplicate_with_known(
        &self,
        candidate: &Post,
        canonical: &Post,
        known_ids: &BTreeSet<String>,
    ) -> bool {
        self.check(candidate, canonical, known_ids).is_some()
    }

    /// Drop every candidate that duplicates `canonical`
    #[must_use]
    pub fn filter_duplicates(&self, candidates: Vec<Post>, canonical: &Post) -> Vec<Post> {
        let total = candidates.len();
        let known_ids = self.extractor.canonical_ids(canonical);
        let kept: Vec<Post> = candidates
            .into_iter()
            .filter(|candidate| self.check(candidate, canonical, &known_ids).is_none())
            .collect();
        self.metrics.record_batch_kept(kept.len());
        info!(
            canonical = %canonical.id,
            total,
            dropped = total - kept.len(),
            "Filtered duplicate posts"
        );
        kept
    }
}

/// [`DuplicateMatcher::is_duplicate`] with the built-in video patterns
#[must_use]
pub fn is_duplicate(candidate: &Post, canonical: &Post) -> bool {
    static MATCHER: OnceLock<DuplicateMatcher> = OnceLock::new();
    MATCHER
        .get_or_init(DuplicateMatcher::default)
        .is_duplicate(candidate, canonical)
}
