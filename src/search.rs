//! In-memory full-text index over chat messages
//!
//! Documents are tokenized with the shared [`TextAnalyzer`] and stored in an
//! inverted index keyed by stemmed term. Queries match exact stems, prefixes
//! and near misses within the configured edit distance, and are ranked with
//! BM25 weighted per field.
//!
//! The index is an ordinary value: each tenant, conversation view or test
//! builds its own. Mutation takes `&mut self` and search takes `&self`, so a
//! caller sharing one index across threads wraps it in a `RwLock`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::time::Instant;

use tracing::{debug, info};

use crate::analysis::TextAnalyzer;
use crate::config::SearchConfig;
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::models::{IndexedMessage, Message, SearchHit, SearchOptions};

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;
const PREFIX_WEIGHT: f64 = 0.5;
const MIN_EXPANSION_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Content,
    AuthorName,
}

#[derive(Debug, Clone, Copy)]
struct Posting {
    doc: usize,
    field: Field,
    term_frequency: u32,
}

#[derive(Debug)]
struct StoredDocument {
    message: IndexedMessage,
    content_len: usize,
    author_len: usize,
    terms: Vec<String>,
}

impl StoredDocument {
    const fn field_len(&self, field: Field) -> usize {
        match field {
            Field::Content => self.content_len,
            Field::AuthorName => self.author_len,
        }
    }
}

/// Live index data; absent until the index is initialized
#[derive(Debug, Default)]
struct IndexState {
    // Removed documents leave a `None` so posting offsets stay valid
    documents: Vec<Option<StoredDocument>>,
    postings: BTreeMap<String, Vec<Posting>>,
    slots_by_id: HashMap<String, Vec<usize>>,
    live: usize,
    total_content_len: usize,
    total_author_len: usize,
}

impl IndexState {
    fn insert(&mut self, analyzer: &TextAnalyzer, message: &Message) {
        let doc = self.documents.len();
        let content_tokens = analyzer.tokenize(&message.content);
        let author_tokens = analyzer.tokenize(&message.author_name);

        let mut terms = HashSet::new();
        for (field, tokens) in [
            (Field::Content, &content_tokens),
            (Field::AuthorName, &author_tokens),
        ] {
            let mut frequencies: BTreeMap<&str, u32> = BTreeMap::new();
            for token in tokens {
                *frequencies.entry(token.as_str()).or_default() += 1;
            }
            for (term, term_frequency) in frequencies {
                self.postings
                    .entry(term.to_string())
                    .or_default()
                    .push(Posting {
                        doc,
                        field,
                        term_frequency,
                    });
                terms.insert(term.to_string());
            }
        }

        let mut terms: Vec<String> = terms.into_iter().collect();
        terms.sort();

        self.total_content_len += content_tokens.len();
        self.total_author_len += author_tokens.len();
        self.live += 1;
        self.slots_by_id
            .entry(message.id.clone())
            .or_default()
            .push(doc);
        self.documents.push(Some(StoredDocument {
            message: IndexedMessage::from(message),
            content_len: content_tokens.len(),
            author_len: author_tokens.len(),
            terms,
        }));
    }

    fn remove(&mut self, id: &str) -> usize {
        let Some(doomed) = self.slots_by_id.remove(id) else {
            return 0;
        };

        for &doc in &doomed {
            let Some(stored) = self.documents[doc].take() else {
                continue;
            };
            for term in &stored.terms {
                if let Some(postings) = self.postings.get_mut(term) {
                    postings.retain(|posting| posting.doc != doc);
                    if postings.is_empty() {
                        self.postings.remove(term);
                    }
                }
            }
            self.total_content_len -= stored.content_len;
            self.total_author_len -= stored.author_len;
            self.live -= 1;
        }

        if self.documents.len() - self.live > self.live {
            self.compact();
        }

        doomed.len()
    }

    /// Drop tombstone slots, keeping surviving documents in insertion order
    fn compact(&mut self) {
        let mut relocated = vec![None; self.documents.len()];
        let mut documents = Vec::with_capacity(self.live);
        for (old, slot) in std::mem::take(&mut self.documents).into_iter().enumerate() {
            if let Some(stored) = slot {
                relocated[old] = Some(documents.len());
                documents.push(Some(stored));
            }
        }
        self.documents = documents;

        for postings in self.postings.values_mut() {
            for posting in postings.iter_mut() {
                if let Some(doc) = relocated[posting.doc] {
                    posting.doc = doc;
                }
            }
        }
        for slots in self.slots_by_id.values_mut() {
            for slot in slots.iter_mut() {
                if let Some(doc) = relocated[*slot] {
                    *slot = doc;
                }
            }
        }
        debug!(live = self.live, "Compacted search index");
    }

    fn average_len(&self, field: Field) -> f64 {
        if self.live == 0 {
            return 0.0;
        }
        let total = match field {
            Field::Content => self.total_content_len,
            Field::AuthorName => self.total_author_len,
        };
        total as f64 / self.live as f64
    }

    /// Inverse document frequency over distinct live documents
    fn idf(&self, postings: &[Posting]) -> f64 {
        let mut docs: Vec<usize> = postings.iter().map(|posting| posting.doc).collect();
        docs.dedup();
        let document_frequency = docs.len() as f64;
        let total = self.live as f64;
        (1.0 + (total - document_frequency + 0.5) / (document_frequency + 0.5)).ln()
    }

    /// Indexed terms a query token should match, with their match weight
    fn expand(&self, token: &str, tolerance: usize) -> Vec<(&str, f64)> {
        let mut matches: BTreeMap<&str, f64> = BTreeMap::new();
        if let Some((term, _)) = self.postings.get_key_value(token) {
            matches.insert(term.as_str(), 1.0);
        }

        let token_len = token.chars().count();
        if token_len < MIN_EXPANSION_CHARS {
            return matches.into_iter().collect();
        }

        for term in self
            .postings
            .range::<str, _>((Bound::Included(token), Bound::Unbounded))
            .map(|(term, _)| term.as_str())
            .take_while(|term| term.starts_with(token))
        {
            matches.entry(term).or_insert(PREFIX_WEIGHT);
        }

        if tolerance > 0 {
            for term in self.postings.keys() {
                if token_len.abs_diff(term.chars().count()) > tolerance {
                    continue;
                }
                let distance = strsim::levenshtein(token, term);
                if distance == 0 || distance > tolerance {
                    continue;
                }
                let weight = 1.0 / (1.0 + distance as f64);
                let entry = matches.entry(term.as_str()).or_insert(weight);
                if weight > *entry {
                    *entry = weight;
                }
            }
        }

        matches.into_iter().collect()
    }
}

/// Full-text search over chat messages
#[derive(Debug)]
pub struct MessageSearchIndex {
    config: SearchConfig,
    analyzer: TextAnalyzer,
    state: Option<IndexState>,
    metrics: MetricsCollector,
}

impl MessageSearchIndex {
    /// Create an uninitialized index
    #[must_use]
    pub fn new(config: SearchConfig, analyzer: TextAnalyzer) -> Self {
        Self {
            config,
            analyzer,
            state: None,
            metrics: MetricsCollector::default(),
        }
    }

    /// Create an index from configuration, building its analyzer
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let analyzer = TextAnalyzer::from_config(config)?;
        Ok(Self::new(config.clone(), analyzer))
    }

    /// Create an index with default settings
    pub fn with_defaults() -> Result<Self> {
        Self::from_config(&SearchConfig::default())
    }

    /// Create an empty index if none exists; no-op otherwise
    pub fn initialize(&mut self) {
        if self.state.is_none() {
            debug!("Initializing message search index");
            self.state = Some(IndexState::default());
        }
    }

    /// Whether [`initialize`](Self::initialize) has run
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Number of live documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.as_ref().map_or(0, |state| state.live)
    }

    /// True when no documents are indexed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metrics recorded by this index
    #[must_use]
    pub const fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Append every message to the index
    ///
    /// No de-duplication happens here: indexing the same id twice yields two
    /// documents. Use [`upsert_messages`](Self::upsert_messages) to replace.
    pub fn index_messages(&mut self, messages: &[Message]) {
        self.initialize();
        let Some(state) = self.state.as_mut() else {
            return;
        };
        for message in messages {
            state.insert(&self.analyzer, message);
        }
        self.metrics.record_documents_indexed(messages.len());
        info!(
            indexed = messages.len(),
            total = state.live,
            "Indexed messages"
        );
    }

    /// Replace any documents sharing an id with the incoming messages
    pub fn upsert_messages(&mut self, messages: &[Message]) {
        self.initialize();
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let mut replaced = 0;
        for message in messages {
            // Last occurrence of an id wins, including repeats within the batch
            replaced += state.remove(&message.id);
            state.insert(&self.analyzer, message);
        }
        self.metrics.record_documents_indexed(messages.len());
        info!(
            upserted = messages.len(),
            replaced,
            total = state.live,
            "Upserted messages"
        );
    }

    /// Remove every document with this id, returning how many were removed
    pub fn remove(&mut self, id: &str) -> usize {
        let removed = self.state.as_mut().map_or(0, |state| state.remove(id));
        debug!(id, removed, "Removed messages from index");
        removed
    }

    /// Discard all documents, leaving a freshly initialized index
    pub fn clear(&mut self) {
        self.state = Some(IndexState::default());
        info!("Cleared message search index");
    }

    /// Search `content` and `authorName` for `term`
    ///
    /// Returns an empty list for blank terms and for an index that was never
    /// initialized.
    #[must_use]
    pub fn search(&self, term: &str, options: &SearchOptions) -> Vec<SearchHit> {
        let Some(state) = self.state.as_ref() else {
            return Vec::new();
        };
        let started = Instant::now();

        let mut tokens = self.analyzer.tokenize(term);
        let mut seen = HashSet::new();
        tokens.retain(|token| seen.insert(token.clone()));
        if tokens.is_empty() {
            return Vec::new();
        }

        let conversation = options.conversation_id.as_deref();
        let limit = options
            .limit
            .unwrap_or(self.config.default_limit)
            .min(self.config.max_limit);

        let mut scores: HashMap<usize, f64> = HashMap::new();
        for token in &tokens {
            for (term, weight) in state.expand(token, self.config.tolerance) {
                let Some(postings) = state.postings.get(term) else {
                    continue;
                };
                let idf = state.idf(postings);
                for posting in postings {
                    let Some(stored) = state.documents[posting.doc].as_ref() else {
                        continue;
                    };
                    if conversation.is_some_and(|id| stored.message.conversation_id != id) {
                        continue;
                    }
                    let score = self.field_score(state, stored, posting, idf) * weight;
                    *scores.entry(posting.doc).or_default() += score;
                }
            }
        }

        let mut ranked: Vec<(usize, f64)> = scores.into_iter().collect();
        ranked.sort_by(|(doc_a, score_a), (doc_b, score_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    let newer = |doc: usize| {
                        state.documents[doc]
                            .as_ref()
                            .map_or(0, |stored| stored.message.timestamp)
                    };
                    newer(*doc_b).cmp(&newer(*doc_a))
                })
                .then_with(|| doc_a.cmp(doc_b))
        });
        ranked.truncate(limit);

        let hits: Vec<SearchHit> = ranked
            .into_iter()
            .filter_map(|(doc, score)| {
                state.documents[doc].as_ref().map(|stored| SearchHit {
                    message: stored.message.clone(),
                    score,
                })
            })
            .collect();

        self.metrics
            .record_search(conversation.is_some(), hits.len(), started.elapsed());
        debug!(term, hits = hits.len(), "Search completed");
        hits
    }

    fn field_score(
        &self,
        state: &IndexState,
        stored: &StoredDocument,
        posting: &Posting,
        idf: f64,
    ) -> f64 {
        let boost = match posting.field {
            Field::Content => self.config.content_boost,
            Field::AuthorName => self.config.author_boost,
        };
        let average = state.average_len(posting.field);
        let length_ratio = if average > 0.0 {
            stored.field_len(posting.field) as f64 / average
        } else {
            1.0
        };
        let tf = f64::from(posting.term_frequency);
        let saturation = tf * (BM25_K1 + 1.0)
            / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * length_ratio));
        idf * saturation * boost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> MessageSearchIndex {
        MessageSearchIndex::with_defaults().expect("Failed to create index")
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|hit| hit.message.id.as_str()).collect()
    }

    #[test]
    fn test_search_before_initialize_is_empty() {
        let index = index();
        assert!(!index.is_initialized());
        assert!(index.search("pray", &SearchOptions::new()).is_empty());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut index = index();
        index.index_messages(&[Message::new("m1", "hello church", "Ann", "c1", 1)]);
        index.initialize();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_stemmed_match() {
        let mut index = index();
        index.index_messages(&[
            Message::new("m1", "praying for you", "Ann", "c1", 1),
            Message::new("m2", "see you sunday", "Bob", "c1", 2),
        ]);

        let hits = index.search("pray", &SearchOptions::new());
        assert_eq!(ids(&hits), vec!["m1"]);
    }

    #[test]
    fn test_typo_tolerance() {
        let mut index = index();
        index.index_messages(&[Message::new("m1", "potluck after service", "Ann", "c1", 1)]);

        let hits = index.search("potlick", &SearchOptions::new());
        assert_eq!(ids(&hits), vec!["m1"]);
    }

    #[test]
    fn test_prefix_match() {
        let mut index = index();
        index.index_messages(&[Message::new("m1", "choir rehearsal moved", "Ann", "c1", 1)]);

        let hits = index.search("rehea", &SearchOptions::new());
        assert_eq!(ids(&hits), vec!["m1"]);
    }

    #[test]
    fn test_author_name_is_searched() {
        let mut index = index();
        index.index_messages(&[
            Message::new("m1", "welcome everyone", "Pastor Dave", "c1", 1),
            Message::new("m2", "thanks", "Ann", "c1", 2),
        ]);

        let hits = index.search("dave", &SearchOptions::new());
        assert_eq!(ids(&hits), vec!["m1"]);
    }

    #[test]
    fn test_content_outranks_author() {
        let mut index = index();
        index.index_messages(&[
            Message::new("m1", "hello", "Grace Lee", "c1", 1),
            Message::new("m2", "grace before meals", "Ann", "c1", 1),
        ]);

        let hits = index.search("grace", &SearchOptions::new());
        assert_eq!(ids(&hits), vec!["m2", "m1"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_author_id_is_not_searched() {
        let mut index = index();
        index.index_messages(&[
            Message::new("m1", "hello", "Ann", "c1", 1).with_author_id("zebulon"),
        ]);

        assert!(index.search("zebulon", &SearchOptions::new()).is_empty());
    }

    #[test]
    fn test_conversation_scope() {
        let mut index = index();
        index.index_messages(&[
            Message::new("m1", "bible study tonight", "Ann", "youth", 1),
            Message::new("m2", "bible study moved", "Bob", "youth-leaders", 2),
        ]);

        let hits = index.search("bible", &SearchOptions::new().in_conversation("youth"));
        assert_eq!(ids(&hits), vec!["m1"]);
    }

    #[test]
    fn test_limit() {
        let mut index = index();
        let messages: Vec<Message> = (0..30)
            .map(|i| Message::new(format!("m{i}"), "worship night", "Ann", "c1", i))
            .collect();
        index.index_messages(&messages);

        assert_eq!(index.search("worship", &SearchOptions::new()).len(), 20);
        assert_eq!(
            index
                .search("worship", &SearchOptions::new().with_limit(5))
                .len(),
            5
        );
    }

    #[test]
    fn test_ties_break_newest_first() {
        let mut index = index();
        index.index_messages(&[
            Message::new("old", "worship night", "Ann", "c1", 100),
            Message::new("new", "worship night", "Ann", "c1", 200),
        ]);

        let hits = index.search("worship", &SearchOptions::new());
        assert_eq!(ids(&hits), vec!["new", "old"]);
    }

    #[test]
    fn test_blank_term_is_empty() {
        let mut index = index();
        index.index_messages(&[Message::new("m1", "hello", "Ann", "c1", 1)]);
        assert!(index.search("", &SearchOptions::new()).is_empty());
        assert!(index.search("   \t", &SearchOptions::new()).is_empty());
    }

    #[test]
    fn test_duplicate_ids_are_appended() {
        let mut index = index();
        let message = Message::new("m1", "prayer request", "Ann", "c1", 1);
        index.index_messages(&[message.clone()]);
        index.index_messages(&[message]);

        let hits = index.search("prayer", &SearchOptions::new());
        assert_eq!(ids(&hits), vec!["m1", "m1"]);
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut index = index();
        index.index_messages(&[Message::new("m1", "prayer request", "Ann", "c1", 1)]);
        index.upsert_messages(&[Message::new("m1", "edited: praise report", "Ann", "c1", 1)]);

        assert_eq!(index.len(), 1);
        assert!(index.search("request", &SearchOptions::new()).is_empty());
        assert_eq!(ids(&index.search("praise", &SearchOptions::new())), vec!["m1"]);
    }

    #[test]
    fn test_removed_slots_are_compacted() {
        let mut index = index();
        let messages: Vec<Message> = (0..10)
            .map(|i| Message::new(format!("m{i}"), "youth retreat signup", "Ann", "c1", 5))
            .collect();
        index.index_messages(&messages);

        for i in 0..8 {
            assert_eq!(index.remove(&format!("m{i}")), 1);
        }

        let state = index.state.as_ref().expect("index is initialized");
        assert_eq!(state.live, 2);
        assert_eq!(state.documents.len(), 4);
        assert_eq!(state.slots_by_id.len(), 2);

        // Equal scores and timestamps fall back to insertion order
        let hits = index.search("retreat", &SearchOptions::new());
        assert_eq!(ids(&hits), vec!["m8", "m9"]);

        assert_eq!(index.remove("m8"), 1);
        assert_eq!(index.remove("m8"), 0);
        assert_eq!(ids(&index.search("signup", &SearchOptions::new())), vec!["m9"]);
    }

    #[test]
    fn test_upsert_after_compaction() {
        let mut index = index();
        index.index_messages(&[
            Message::new("m1", "old note", "Ann", "c1", 1),
            Message::new("m2", "old note", "Ann", "c1", 2),
            Message::new("m3", "old note", "Ann", "c1", 3),
        ]);
        index.remove("m1");
        index.remove("m2");
        index.upsert_messages(&[Message::new("m3", "new note", "Ann", "c1", 3)]);

        assert_eq!(index.len(), 1);
        assert!(index.search("old", &SearchOptions::new()).is_empty());
        assert_eq!(ids(&index.search("new", &SearchOptions::new())), vec!["m3"]);
    }

    #[test]
    fn test_upsert_repeated_id_in_batch() {
        let mut index = index();
        index.upsert_messages(&[
            Message::new("m1", "first draft", "Ann", "c1", 1),
            Message::new("m1", "final draft", "Ann", "c1", 2),
        ]);

        assert_eq!(index.len(), 1);
        let hits = index.search("draft", &SearchOptions::new());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message.content, "final draft");
    }

    #[test]
    fn test_remove() {
        let mut index = index();
        index.index_messages(&[
            Message::new("m1", "prayer request", "Ann", "c1", 1),
            Message::new("m2", "prayer meeting", "Bob", "c1", 2),
        ]);

        assert_eq!(index.remove("m1"), 1);
        assert_eq!(index.remove("missing"), 0);
        assert_eq!(ids(&index.search("prayer", &SearchOptions::new())), vec!["m2"]);
    }

    #[test]
    fn test_clear() {
        let mut index = index();
        index.index_messages(&[Message::new("m1", "prayer request", "Ann", "c1", 1)]);
        index.clear();

        assert!(index.is_initialized());
        assert!(index.is_empty());
        assert!(index.search("prayer", &SearchOptions::new()).is_empty());
    }

    #[test]
    fn test_deterministic_scores() {
        let messages = vec![
            Message::new("m1", "pray for the youth retreat", "Ann", "c1", 1),
            Message::new("m2", "praying, praying, praying", "Bob", "c1", 2),
            Message::new("m3", "retreat packing list", "Cal", "c2", 3),
        ];
        let mut first = index();
        first.index_messages(&messages);
        let mut second = index();
        second.index_messages(&messages);

        let options = SearchOptions::new();
        assert_eq!(
            first.search("pray retreat", &options),
            second.search("pray retreat", &options)
        );
    }
}
