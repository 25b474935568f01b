//! Tests for event parsing from a live byte stream.

use codex_cli_provider::cli::{CodexEvent, EventReader, ItemKind};

#[tokio::test]
async fn reader_skips_garbage_between_events() {
    let mock = tokio_test::io::Builder::new()
        .read(b"Reading prompt from stdin...\n")
        .read(b"{\"type\":\"thread.started\",\"thread_id\":\"t-1\"}\n")
        .read(b"{\"type\":\"item.compl")
        .read(b"eted\",\"item\":{\"id\":\"c\",\"type\":\"web_search\",\"query\":\"q\"}}\n")
        .read(b"not json at all\n\n")
        .read(b"{\"type\":\"turn.completed\",\"usage\":{\"input_tokens\":4,\"output_tokens\":2,\"cached_input_tokens\":1}}")
        .build();
    let mut reader = EventReader::new(mock);

    let first = reader.next_event().await.unwrap().unwrap();
    assert_eq!(first.session_id(), Some("t-1"));

    match reader.next_event().await.unwrap().unwrap() {
        CodexEvent::ItemCompleted { item } => {
            assert_eq!(item.id.as_deref(), Some("c"));
            assert!(matches!(item.kind, ItemKind::WebSearch(ref s) if s.query == "q"));
        }
        other => panic!("Expected ItemCompleted, got {other:?}"),
    }

    match reader.next_event().await.unwrap().unwrap() {
        CodexEvent::TurnCompleted { usage: Some(usage) } => assert_eq!(usage.total(), 6),
        other => panic!("Expected TurnCompleted, got {other:?}"),
    }

    assert!(reader.next_event().await.unwrap().is_none());
    assert_eq!(reader.skipped(), 2);
}

#[tokio::test]
async fn unknown_event_types_pass_through() {
    let mock = tokio_test::io::Builder::new()
        .read(b"{\"type\":\"turn.plan_updated\",\"plan\":[]}\n")
        .read(b"{\"type\":\"item.started\",\"item\":{\"id\":\"x\",\"type\":\"todo_list\",\"items\":[]}}\n")
        .build();
    let mut reader = EventReader::new(mock);

    assert_eq!(reader.next_event().await.unwrap(), Some(CodexEvent::Unknown));
    match reader.next_event().await.unwrap().unwrap() {
        CodexEvent::ItemStarted { item } => assert_eq!(item.kind.tag(), "todo_list"),
        other => panic!("Expected ItemStarted, got {other:?}"),
    }
}
