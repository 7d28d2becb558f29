//! Data models for chat messages, feed posts and search results
//!
//! Input records come from the document store as JSON. Every field is
//! optional on the wire and read leniently: a scalar of the wrong type is
//! converted or dropped, so a single malformed record deserializes to empty
//! values instead of failing the whole batch.

use std::io::Read;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Any scalar as a string; `null`, arrays and objects become empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_to_string(Value::deserialize(deserializer)?).unwrap_or_default())
}

/// Like [`lenient_string`], keeping absence as `None`
fn lenient_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_to_string(Value::deserialize(deserializer)?))
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Unrecognized timestamp shapes read as absent
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<RawTimestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(RawTimestamp::from_value(Value::deserialize(deserializer)?))
}

/// Timestamp as it arrives from the message store
///
/// Either raw epoch milliseconds or a structured seconds/nanoseconds pair.
/// The document store serializes the latter with leading underscores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Milliseconds since the Unix epoch
    Millis(i64),
    /// Fractional milliseconds, as produced by some JavaScript clients
    FractionalMillis(f64),
    /// Seconds plus sub-second nanoseconds
    Structured {
        /// Whole seconds since the Unix epoch
        #[serde(alias = "_seconds")]
        seconds: i64,
        /// Nanoseconds past `seconds`
        #[serde(default, alias = "_nanoseconds", alias = "nanos")]
        nanoseconds: i64,
    },
}

impl RawTimestamp {
    /// Interpret a JSON value, accepting numeric and RFC 3339 strings too
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(text) => Self::parse_text(&text),
            other => serde_json::from_value(other).ok(),
        }
    }

    fn parse_text(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(ms) = text.parse::<i64>() {
            return Some(Self::Millis(ms));
        }
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|sent| Self::Millis(sent.timestamp_millis()))
    }

    /// Normalize to milliseconds since the Unix epoch
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_millis(self) -> i64 {
        match self {
            Self::Millis(ms) => ms,
            Self::FractionalMillis(ms) if ms.is_finite() => ms.round() as i64,
            Self::FractionalMillis(_) => 0,
            Self::Structured {
                seconds,
                nanoseconds,
            } => seconds
                .saturating_mul(1000)
                .saturating_add(nanoseconds / 1_000_000),
        }
    }
}

/// A chat message as supplied by the message store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Message {
    /// Unique message identifier
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    /// Message text
    #[serde(deserialize_with = "lenient_string")]
    pub content: String,
    /// Display name of the author
    #[serde(deserialize_with = "lenient_string")]
    pub author_name: String,
    /// Author identifier, stored but never searched
    #[serde(deserialize_with = "lenient_string")]
    pub author_id: String,
    /// Conversation the message belongs to
    #[serde(deserialize_with = "lenient_string")]
    pub conversation_id: String,
    /// Send time in whichever shape the store produced
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<RawTimestamp>,
}

impl Message {
    /// Create a message with an epoch-millisecond timestamp
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        author_name: impl Into<String>,
        conversation_id: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            author_name: author_name.into(),
            author_id: String::new(),
            conversation_id: conversation_id.into(),
            timestamp: Some(RawTimestamp::Millis(timestamp_ms)),
        }
    }

    /// Set the author identifier
    #[must_use]
    pub fn with_author_id(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = author_id.into();
        self
    }

    /// Read a JSON array of message records
    ///
    /// Records that are not objects are logged and skipped; the rest are
    /// kept in input order.
    pub fn parse_batch<R: Read>(reader: R) -> crate::error::Result<Vec<Self>> {
        let records: Vec<Value> = serde_json::from_reader(reader)?;
        let messages = records
            .into_iter()
            .enumerate()
            .filter_map(|(position, record)| match serde_json::from_value(record) {
                Ok(message) => Some(message),
                Err(error) => {
                    warn!(position, %error, "Skipping unreadable message record");
                    None
                },
            })
            .collect();
        Ok(messages)
    }

    /// Timestamp in epoch milliseconds, zero when absent
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.map_or(0, RawTimestamp::to_millis)
    }
}

/// A message as retained by the search index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedMessage {
    /// Unique message identifier
    pub id: String,
    /// Message text
    pub content: String,
    /// Display name of the author
    pub author_name: String,
    /// Author identifier
    pub author_id: String,
    /// Conversation the message belongs to
    pub conversation_id: String,
    /// Send time in epoch milliseconds
    pub timestamp: i64,
}

impl From<&Message> for IndexedMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            content: message.content.clone(),
            author_name: message.author_name.clone(),
            author_id: message.author_id.clone(),
            conversation_id: message.conversation_id.clone(),
            timestamp: message.timestamp_millis(),
        }
    }
}

/// A single search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// The matched document
    #[serde(flatten)]
    pub message: IndexedMessage,
    /// Relevance score, higher is better
    pub score: f64,
}

impl SearchHit {
    /// Send time as a UTC datetime, if representable
    #[must_use]
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.message.timestamp)
    }
}

/// Options accepted by a search query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    /// Only return documents from this conversation (exact match)
    pub conversation_id: Option<String>,
    /// Maximum number of hits, falls back to the configured default
    pub limit: Option<usize>,
}

impl SearchOptions {
    /// Empty options: all conversations, default limit
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict results to one conversation
    #[must_use]
    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Cap the number of results
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A feed post as ingested from a social platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Post {
    /// Opaque identifier, usually prefixed by the originating platform
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    /// Primary attached media
    #[serde(deserialize_with = "lenient_optional_string")]
    pub media_url: Option<String>,
    /// Link to the original post on its platform
    #[serde(deserialize_with = "lenient_optional_string")]
    pub external_url: Option<String>,
    /// Post body, may itself contain links
    #[serde(deserialize_with = "lenient_string")]
    pub content: String,
    /// Raw identifier on the originating platform
    #[serde(deserialize_with = "lenient_optional_string")]
    pub source_id: Option<String>,
}

impl Post {
    /// Create a post with only an identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the media URL
    #[must_use]
    pub fn with_media_url(mut self, url: impl Into<String>) -> Self {
        self.media_url = Some(url.into());
        self
    }

    /// Set the external URL
    #[must_use]
    pub fn with_external_url(mut self, url: impl Into<String>) -> Self {
        self.external_url = Some(url.into());
        self
    }

    /// Set the post body
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Set the platform identifier
    #[must_use]
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Media URL, treating an empty string as absent
    #[must_use]
    pub fn media_url(&self) -> Option<&str> {
        self.media_url.as_deref().filter(|url| !url.trim().is_empty())
    }

    /// External URL, treating an empty string as absent
    #[must_use]
    pub fn external_url(&self) -> Option<&str> {
        self.external_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
    }
}
