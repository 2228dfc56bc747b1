//! Integration tests for full synthesis cycles.
//!
//! These tests drive the public API the way a host does:
//! 1. Parse the conversation note
//! 2. Retrieve excerpts through the strategies
//! 3. Stream the answer back into the note
//! 4. Re-run on the updated note

use std::sync::Arc;

use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;
use vault_context::{
    testing::{fixed_time, SequenceMarkers},
    Aggregator, BufferSink, ContextConfig, ContextError, ConversationDocument, MockGeneration,
    MockQueryRunner, MockVault, QueryHit, RecordingSink, RetryConfig, Role, StrategyKind,
};

const STANDUP: &str = "# Standup\n\n```context\nsources:\n- strategy: SingleReferrer\n  evergreen: [[Alpha]]\n  note: [[Mon]]\nWhat happened with Alpha?\n```\n";

fn journal() -> MockVault {
    MockVault::new()
        .with_note(
            "Journal/Mon.md",
            "---\ntags: [journal]\n---\nIntro line\n\nCall with [[Alpha]] about launch ^c1\n\nUnrelated paragraph",
            fixed_time(1),
        )
        .with_note("Alpha.md", "Alpha is the launch project", fixed_time(0))
}

fn config() -> ContextConfig {
    ContextConfig::default().with_retry(RetryConfig::default().immediate())
}

fn aggregator(
    vault: MockVault,
    runner: MockQueryRunner,
    generation: &MockGeneration,
) -> Aggregator {
    Aggregator::new(
        Arc::new(vault),
        Arc::new(runner),
        Arc::new(generation.clone()),
        config(),
    )
    .unwrap()
    .with_marker_generator(|| SequenceMarkers::new(["m1", "m2", "m3"]))
}

/// Set up a single-referrer cycle, then continue the same note.
#[tokio::test]
async fn test_conversation_continues_across_cycles() {
    let generation = MockGeneration::new()
        .with_fragments(["Alpha launch call ", "%m", "1% done."])
        .with_fragments(["Nothing new."]);
    let runner = MockQueryRunner::new();
    let aggregator = aggregator(journal(), runner.clone(), &generation);

    // First cycle
    let sink = BufferSink::new(STANDUP);
    let first = aggregator
        .synthesize(
            &ConversationDocument::new("Standup", STANDUP),
            &sink,
            CancellationToken::new(),
        )
        .await;
    let first = assert_ok!(first);

    assert_eq!(first.excerpts.len(), 1);
    assert_eq!(first.excerpts[0].source_id, "Journal/Mon.md");
    assert!(first.excerpts[0].body.contains("Call with [[Alpha]] about launch %m1%"));
    assert!(!first.excerpts[0].body.contains("tags:"));

    let answered = sink.text();
    assert_eq!(
        answered,
        format!("{}\n\n> [!ai]\n> Alpha launch call ![[Mon#^c1]] done.\n\n", STANDUP)
    );

    // Second cycle on the updated note
    let continued = format!("{}```context\nAnd then?\n```\n", answered);
    let sink = BufferSink::new(continued.clone());
    let second = aggregator
        .synthesize(
            &ConversationDocument::new("Standup", continued.clone()),
            &sink,
            CancellationToken::new(),
        )
        .await;
    let second = assert_ok!(second);

    assert!(second.excerpts.is_empty());
    assert_eq!(
        sink.text(),
        format!("{}\n\n> [!ai]\n> Nothing new.\n\n", continued)
    );
    assert_eq!(sink.text().matches("Alpha launch call").count(), 1);

    let messages = &generation.requests()[1];
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
    assert_eq!(messages[2].content, "Alpha launch call %m1% done.");
    assert_eq!(
        messages[3].content,
        "No excerpts were retrieved.\n\n## Request\nAnd then?"
    );

    // The unspecified descriptor fell back to recency ranking
    let hints: Vec<Option<StrategyKind>> = runner.calls().iter().map(|c| c.hint).collect();
    assert_eq!(
        hints,
        vec![Some(StrategyKind::RecencyRanked), Some(StrategyKind::RecencyRanked)]
    );
}

#[tokio::test]
async fn test_query_driven_block_with_preamble() {
    let document = "```context\nsources:\n- query: LIST FROM #launch\n  evergreen: [[Alpha]]\n  preamble: Launch notes\nSummarise the launch\n```";
    let runner = MockQueryRunner::new().with_result(
        "LIST FROM #launch",
        vec![
            QueryHit::new("Journal/Mon.md", fixed_time(1)),
            QueryHit::new("Alpha.md", fixed_time(0)),
        ],
    );
    let generation = MockGeneration::new().with_fragments(["Launch is on track."]);
    let aggregator = aggregator(journal(), runner, &generation);
    let sink = RecordingSink::new();

    let outcome = aggregator
        .synthesize(
            &ConversationDocument::new("Review", document),
            &sink,
            CancellationToken::new(),
        )
        .await;
    let outcome = assert_ok!(outcome);

    let sources: Vec<&str> = outcome.excerpts.iter().map(|e| e.source_id.as_str()).collect();
    assert_eq!(sources, vec!["Alpha.md", "Journal/Mon.md"]);

    let requests = generation.requests();
    let final_user = &requests[0].last().unwrap().content;
    assert!(final_user.starts_with("## Excerpts\n\nLaunch notes\n\n### Alpha"));
    assert!(final_user.ends_with("## Request\nSummarise the launch"));
    assert_eq!(sink.text(), "\n\n> [!ai]\n> Launch is on track.\n\n");
}

#[tokio::test]
async fn test_rejected_append_becomes_notice() {
    let generation = MockGeneration::new().with_fragments(["Alpha"]);
    let aggregator = aggregator(journal(), MockQueryRunner::new(), &generation);
    let sink = RecordingSink::failing();

    let result = aggregator
        .synthesize(
            &ConversationDocument::new("Standup", STANDUP),
            &sink,
            CancellationToken::new(),
        )
        .await;

    let err = assert_err!(result);
    assert!(matches!(err, ContextError::Sink(_)));
    assert_eq!(
        sink.notices(),
        vec!["Context generation failed: sink error: sink is read-only"]
    );
    assert_eq!(sink.placeholder_history(), vec![true, false]);
}

#[tokio::test]
async fn test_config_from_json_drives_grammar() {
    let config = ContextConfig::from_json(
        r#"{"source_block_language": "ask", "assistant_callout": "answer"}"#,
    )
    .unwrap()
    .with_retry(RetryConfig::default().immediate());

    let generation = MockGeneration::new().with_fragments(["Done"]);
    let aggregator = Aggregator::new(
        Arc::new(journal()),
        Arc::new(MockQueryRunner::new()),
        Arc::new(generation.clone()),
        config,
    )
    .unwrap();
    let sink = RecordingSink::new();

    let document = "```ask\nsources:\n- strategy: Basic\n  note: Alpha\nWhat is Alpha?\n```";
    let outcome = aggregator
        .synthesize(
            &ConversationDocument::new("Chat", document),
            &sink,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.excerpts[0].body, "Alpha is the launch project");
    assert_eq!(sink.text(), "\n\n> [!answer]\n> Done\n\n");
}
