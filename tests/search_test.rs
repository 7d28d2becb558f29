//! Integration tests for the message search index

use proptest::prelude::*;
use flock_feed::config::SearchConfig;
use flock_feed::models::{Message, RawTimestamp, SearchOptions};
use flock_feed::search::MessageSearchIndex;

fn index() -> MessageSearchIndex {
    MessageSearchIndex::with_defaults().expect("Failed to create index")
}

#[test]
fn test_praying_matches_pray() {
    let mut index = index();
    index.index_messages(&[Message::new("m1", "praying for you", "Ann", "c1", 1)]);

    let hits = index.search("pray", &SearchOptions::new());
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].message.id, "m1");
    assert!(hits[0].score > 0.0);
}

#[test]
fn test_hits_carry_original_fields() {
    let mut index = index();
    let message = Message::new("m1", "Choir practice at 7", "Ann Lee", "choir", 1_700_000_000_000)
        .with_author_id("u42");
    index.index_messages(&[message]);

    let hits = index.search("choir", &SearchOptions::new());
    let hit = &hits[0].message;
    assert_eq!(hit.content, "Choir practice at 7");
    assert_eq!(hit.author_name, "Ann Lee");
    assert_eq!(hit.author_id, "u42");
    assert_eq!(hit.conversation_id, "choir");
    assert_eq!(hit.timestamp, 1_700_000_000_000);
}

#[test]
fn test_structured_timestamp_is_normalized() {
    let mut index = index();
    let mut message = Message::new("m1", "hello", "Ann", "c1", 0);
    message.timestamp = Some(RawTimestamp::Structured {
        seconds: 1_700_000_000,
        nanoseconds: 250_000_000,
    });
    index.index_messages(&[message]);

    let hits = index.search("hello", &SearchOptions::new());
    assert_eq!(hits[0].message.timestamp, 1_700_000_000_250);
}

#[test]
fn test_malformed_records_do_not_block_batch() {
    let messages: Vec<Message> = serde_json::from_str(
        r#"[
            {"id": "bad", "content": null},
            {"id": "m2", "content": "fellowship lunch", "authorName": "Bob", "conversationId": "c1"}
        ]"#,
    )
    .expect("Failed to parse messages");

    let mut index = index();
    index.index_messages(&messages);

    assert_eq!(index.len(), 2);
    let hits = index.search("fellowship", &SearchOptions::new());
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].message.id, "m2");
}

#[test]
fn test_wrong_typed_fields_do_not_block_batch() {
    let messages: Vec<Message> = serde_json::from_str(
        r#"[
            {"id": "iso", "content": "hymn sheet", "timestamp": "2024-01-01T00:00:00Z"},
            {"id": 7, "content": "hymn practice", "timestamp": "soon"},
            {"id": "m3", "content": ["not", "text"], "conversationId": 12},
            {"id": "m4", "content": "hymn night", "authorName": "Bob", "conversationId": "c1", "timestamp": 5}
        ]"#,
    )
    .expect("Failed to parse messages");

    let mut index = index();
    index.index_messages(&messages);
    assert_eq!(index.len(), 4);

    let hits = index.search("hymn", &SearchOptions::new());
    let ids: Vec<&str> = hits.iter().map(|hit| hit.message.id.as_str()).collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&"iso"));
    assert!(ids.contains(&"7"));
    assert!(ids.contains(&"m4"));

    let iso = hits.iter().find(|hit| hit.message.id == "iso").expect("iso hit");
    assert_eq!(iso.message.timestamp, 1_704_067_200_000);
    let unknown = hits.iter().find(|hit| hit.message.id == "7").expect("numeric id hit");
    assert_eq!(unknown.message.timestamp, 0);
}

#[test]
fn test_parse_batch_skips_non_object_records() {
    let json = r#"[
        "just a string",
        {"id": "m1", "content": "baptism class", "conversationId": "c1"},
        null,
        42,
        {"id": "m2", "content": "baptism sunday", "conversationId": "c1"}
    ]"#;
    let messages = Message::parse_batch(json.as_bytes()).expect("Failed to parse batch");
    assert_eq!(messages.len(), 2);

    let mut index = index();
    index.index_messages(&messages);
    assert_eq!(index.search("baptism", &SearchOptions::new()).len(), 2);
}

#[test]
fn test_parse_batch_rejects_non_array() {
    assert!(Message::parse_batch(r#"{"id": "m1"}"#.as_bytes()).is_err());
}

#[test]
fn test_clear_discards_everything() {
    let mut index = index();
    index.index_messages(&[
        Message::new("m1", "youth group", "Ann", "c1", 1),
        Message::new("m2", "youth retreat", "Bob", "c2", 2),
    ]);
    index.clear();

    assert!(index.search("youth", &SearchOptions::new()).is_empty());
    assert!(index
        .search("youth", &SearchOptions::new().in_conversation("c1"))
        .is_empty());

    index.index_messages(&[Message::new("m3", "youth night", "Cal", "c1", 3)]);
    assert_eq!(index.search("youth", &SearchOptions::new()).len(), 1);
}

#[test]
fn test_independent_indices_do_not_share_state() {
    let mut first = index();
    let second = index();
    first.index_messages(&[Message::new("m1", "baptism sunday", "Ann", "c1", 1)]);

    assert_eq!(first.search("baptism", &SearchOptions::new()).len(), 1);
    assert!(second.search("baptism", &SearchOptions::new()).is_empty());
}

#[test]
fn test_zero_tolerance_disables_fuzzy_matching() {
    let config = SearchConfig {
        tolerance: 0,
        ..SearchConfig::default()
    };
    let mut index = MessageSearchIndex::from_config(&config).expect("Failed to create index");
    index.index_messages(&[Message::new("m1", "potluck", "Ann", "c1", 1)]);

    assert!(index.search("potlick", &SearchOptions::new()).is_empty());
    assert_eq!(index.search("potluck", &SearchOptions::new()).len(), 1);
}

#[test]
fn test_limit_is_capped_by_config() {
    let config = SearchConfig {
        default_limit: 2,
        max_limit: 3,
        ..SearchConfig::default()
    };
    let mut index = MessageSearchIndex::from_config(&config).expect("Failed to create index");
    let messages: Vec<Message> = (0..10)
        .map(|i| Message::new(format!("m{i}"), "worship", "Ann", "c1", i))
        .collect();
    index.index_messages(&messages);

    assert_eq!(index.search("worship", &SearchOptions::new()).len(), 2);
    assert_eq!(
        index
            .search("worship", &SearchOptions::new().with_limit(100))
            .len(),
        3
    );
}

#[test]
fn test_metrics_track_activity() {
    let mut index = index();
    index.index_messages(&[Message::new("m1", "hello", "Ann", "c1", 1)]);
    let _ = index.search("hello", &SearchOptions::new());
    let _ = index.search("hello", &SearchOptions::new().in_conversation("c1"));

    assert_eq!(index.metrics().documents_indexed(), 1);
    assert_eq!(index.metrics().searches(), 2);
}

fn word() -> impl Strategy<Value = String> {
    "[a-z]{3,8}"
}

fn sentence() -> impl Strategy<Value = String> {
    prop::collection::vec(word(), 1..5).prop_map(|words| words.join(" "))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn exact_content_finds_its_message(
        contents in prop::collection::vec(sentence(), 1..15),
        pick in any::<prop::sample::Index>(),
    ) {
        let messages: Vec<Message> = contents
            .iter()
            .enumerate()
            .map(|(i, content)| Message::new(format!("m{i}"), content.clone(), "", "c1", i as i64))
            .collect();
        let mut index = index();
        index.index_messages(&messages);

        let k = pick.index(messages.len());
        let options = SearchOptions::new().with_limit(messages.len());
        let hits = index.search(&messages[k].content, &options);
        prop_assert!(hits.iter().any(|hit| hit.message.id == messages[k].id));
    }

    #[test]
    fn conversation_scope_is_exact(
        docs in prop::collection::vec((sentence(), 0..4usize), 1..20),
        term in word(),
        scope in 0..4usize,
    ) {
        let messages: Vec<Message> = docs
            .iter()
            .enumerate()
            .map(|(i, (content, conversation))| {
                Message::new(format!("m{i}"), content.clone(), "Ann", format!("conv{conversation}"), 0)
            })
            .collect();
        let mut index = index();
        index.index_messages(&messages);

        let scope = format!("conv{scope}");
        let hits = index.search(&term, &SearchOptions::new().in_conversation(scope.clone()));
        prop_assert!(hits.iter().all(|hit| hit.message.conversation_id == scope));
    }

    #[test]
    fn cleared_index_returns_nothing(
        contents in prop::collection::vec(sentence(), 0..10),
        term in sentence(),
    ) {
        let messages: Vec<Message> = contents
            .iter()
            .enumerate()
            .map(|(i, content)| Message::new(format!("m{i}"), content.clone(), "Ann", "c1", 0))
            .collect();
        let mut index = index();
        index.index_messages(&messages);
        index.clear();

        prop_assert!(index.search(&term, &SearchOptions::new()).is_empty());
    }
}
