// tests/pipeline_flow.rs
// The node graph end to end against scripted collaborators: routing edges,
// grading, degraded classification, the video-load path, cancellation.

mod common;

use common::{RecordingSink, setup, setup_with_top_k};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tubetalk::llm::CallMetadata;
use tubetalk::pipeline::{
    Intent, PipelineState, Step, VideoLoadEvent, VideoLoadPhase, classify,
};
use tubetalk::store::{NewChunk, NewTranscript};
use tubetalk::testing::Scripted;

async fn seed_corpus(ctx: &common::TestCtx, user_id: &str) -> Vec<String> {
    let transcript = ctx
        .app
        .transcripts
        .insert(NewTranscript {
            user_id: user_id.to_string(),
            youtube_video_id: "vid00000001".to_string(),
            title: "FastAPI Crash Course".to_string(),
            channel_name: Some("PyBites".to_string()),
            duration_s: Some(600),
            transcript_text: "FastAPI is a web framework ...".to_string(),
            metadata: None,
        })
        .await
        .unwrap();

    let chunks = ctx
        .app
        .chunks
        .insert_many(vec![
            NewChunk {
                transcript_id: transcript.id.clone(),
                user_id: user_id.to_string(),
                channel_id: None,
                chunk_index: 0,
                chunk_text: "FastAPI is a web framework for building APIs".to_string(),
                token_count: 9,
                metadata: None,
            },
            NewChunk {
                transcript_id: transcript.id.clone(),
                user_id: user_id.to_string(),
                channel_id: None,
                chunk_index: 1,
                chunk_text: "It is built on Starlette and Pydantic".to_string(),
                token_count: 8,
                metadata: None,
            },
        ])
        .await
        .unwrap();

    ctx.app
        .corpus
        .index_chunks(
            &chunks,
            &transcript.youtube_video_id,
            None,
            &CallMetadata::new("seed", user_id),
        )
        .await
        .unwrap();

    chunks.into_iter().map(|c| c.id).collect()
}

fn state_for(user_id: &str, query: &str) -> PipelineState {
    PipelineState::new("req-1", user_id, "conv-1", query, Vec::new())
}

#[tokio::test]
async fn chitchat_skips_retrieval_entirely() {
    let ctx = setup().await;
    ctx.chat.push_intent("chitchat", 0.95);
    ctx.chat.push_chat("Hey there!");

    let sink = RecordingSink::new();
    let cancel = CancellationToken::new();
    let state = ctx
        .app
        .pipeline
        .run(state_for("u1", "hi"), &sink, &cancel)
        .await
        .unwrap();

    let reply = state.response.unwrap();
    assert_eq!(reply.response, "Hey there!");
    assert_eq!(reply.metadata.intent, Intent::Chitchat);
    assert_eq!(reply.metadata.chunks_used, 0);
    assert_eq!(sink.steps(), vec![Step::Routing, Step::Generating]);
    // No embedding calls happened.
    assert!(ctx.embedder.calls.lock().is_empty());
}

#[tokio::test]
async fn qa_routes_through_retrieve_grade_generate() {
    let ctx = setup().await;
    let chunk_ids = seed_corpus(&ctx, "u1").await;

    ctx.chat.push_intent("qa", 0.9);
    ctx.chat.push_chat("FastAPI is a Python web framework.");

    let sink = RecordingSink::new();
    let cancel = CancellationToken::new();
    let state = ctx
        .app
        .pipeline
        .run(state_for("u1", "what is FastAPI about"), &sink, &cancel)
        .await
        .unwrap();

    assert_eq!(
        sink.steps(),
        vec![Step::Routing, Step::Retrieving, Step::Grading, Step::Generating]
    );

    let reply = state.response.unwrap();
    assert_eq!(reply.metadata.intent, Intent::Qa);
    assert!(reply.metadata.chunks_used >= 1);
    assert!(
        reply
            .metadata
            .source_chunks
            .iter()
            .all(|id| chunk_ids.contains(id))
    );
    assert!(!reply.metadata.no_context);
}

#[tokio::test]
async fn tenant_filter_hides_other_users_chunks() {
    let ctx = setup().await;
    seed_corpus(&ctx, "owner").await;

    ctx.chat.push_intent("qa", 0.9);
    ctx.chat.push_chat("I could not find anything about that.");

    let state = ctx
        .app
        .pipeline
        .run(
            state_for("someone-else", "what is FastAPI about"),
            &RecordingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let reply = state.response.unwrap();
    assert_eq!(reply.metadata.chunks_used, 0);
    assert!(reply.metadata.no_context);
}

#[tokio::test]
async fn grader_verdicts_filter_and_preserve_order() {
    let ctx = setup().await;
    seed_corpus(&ctx, "u1").await;

    ctx.chat.push_intent("qa", 0.9);
    // First graded chunk is rejected, second kept.
    ctx.chat
        .push_structured("grade_chunk", json!({ "is_relevant": false, "reasoning": "off" }));
    ctx.chat
        .push_structured("grade_chunk", json!({ "is_relevant": true, "reasoning": "on" }));
    ctx.chat.push_chat("Answer from the one good chunk.");

    let state = ctx
        .app
        .pipeline
        .run(
            state_for("u1", "what is FastAPI about"),
            &RecordingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let retrieved = state.retrieved_chunks.clone().unwrap();
    let graded = state.graded_chunks.clone().unwrap();
    assert_eq!(retrieved.len(), 2);
    assert_eq!(graded.len(), 1);
    // The survivor is the second-ranked retrieval hit.
    assert_eq!(graded[0].chunk_id, retrieved[1].chunk_id);
}

#[tokio::test]
async fn grader_failure_drops_chunk_not_turn() {
    let ctx = setup().await;
    seed_corpus(&ctx, "u1").await;

    ctx.chat.push_intent("qa", 0.9);
    ctx.chat.push_structured_outcome(
        "grade_chunk",
        Scripted::TransientError("grader exploded".into()),
    );
    ctx.chat
        .push_structured("grade_chunk", json!({ "is_relevant": true, "reasoning": "on" }));
    ctx.chat.push_chat("Still answered.");

    let state = ctx
        .app
        .pipeline
        .run(
            state_for("u1", "what is FastAPI about"),
            &RecordingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let reply = state.response.unwrap();
    assert_eq!(reply.metadata.chunks_used, 1);
    assert_eq!(reply.response, "Still answered.");
}

#[tokio::test]
async fn top_k_zero_still_answers_with_no_context_marker() {
    let ctx = setup_with_top_k(Some(0)).await;
    seed_corpus(&ctx, "u1").await;

    ctx.chat.push_intent("qa", 0.9);
    ctx.chat.push_chat("I have no transcript context for that.");

    let state = ctx
        .app
        .pipeline
        .run(
            state_for("u1", "what is FastAPI about"),
            &RecordingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let reply = state.response.unwrap();
    assert_eq!(reply.metadata.chunks_used, 0);
    assert!(reply.metadata.no_context);
}

#[tokio::test]
async fn summarize_intent_gets_summary_cue() {
    let ctx = setup().await;
    seed_corpus(&ctx, "u1").await;

    ctx.chat.push_intent("metadata_search_and_summarize", 0.9);
    ctx.chat.push_chat("Here is the summary.");

    ctx.app
        .pipeline
        .run(
            state_for("u1", "tell me about FastAPI Crash Course - one paragraph"),
            &RecordingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let requests = ctx.chat.chat_requests.lock();
    let generation = requests.last().unwrap();
    assert!(generation.messages[0].content.contains("Summarize the matching video"));
    assert_eq!(generation.temperature, 0.3);
    assert_eq!(generation.max_tokens, 2000);
}

#[tokio::test]
async fn metadata_intent_lists_library_without_retrieval() {
    let ctx = setup().await;
    seed_corpus(&ctx, "u1").await;

    ctx.chat.push_intent("metadata", 0.9);
    ctx.chat.push_chat("You have 1 video: FastAPI Crash Course.");

    let sink = RecordingSink::new();
    let state = ctx
        .app
        .pipeline
        .run(
            state_for("u1", "what videos do I have"),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(sink.steps(), vec![Step::Routing, Step::Generating]);
    assert_eq!(state.response.unwrap().metadata.intent, Intent::Metadata);

    let requests = ctx.chat.chat_requests.lock();
    assert!(requests.last().unwrap().messages[0]
        .content
        .contains("FastAPI Crash Course"));
}

#[tokio::test]
async fn classifier_degrades_to_chitchat_after_malformed_output() {
    let ctx = setup().await;
    for _ in 0..3 {
        ctx.chat.push_structured(
            "classify_intent",
            json!({ "intent": "banana", "confidence": 0.8, "reasoning": "?" }),
        );
    }

    let decision = classify::classify(
        ctx.chat.as_ref(),
        "hello there",
        &[],
        &CallMetadata::new("req-x", "u1"),
    )
    .await
    .unwrap();

    assert_eq!(decision.intent, Intent::Chitchat);
    assert_eq!(decision.confidence, 0.0);
    // All three attempts were spent.
    assert_eq!(
        ctx.chat
            .structured_requests
            .lock()
            .iter()
            .filter(|(tool, _)| tool == "classify_intent")
            .count(),
        3
    );
}

#[tokio::test]
async fn transient_classifier_errors_are_retried_at_the_node() {
    let ctx = setup().await;
    ctx.chat.push_structured_outcome(
        "classify_intent",
        Scripted::TransientError("upstream 503".into()),
    );
    ctx.chat.push_intent("chitchat", 0.9);
    ctx.chat.push_chat("Hi!");

    let state = ctx
        .app
        .pipeline
        .run(
            state_for("u1", "hi"),
            &RecordingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(state.response.unwrap().response, "Hi!");
}

#[tokio::test]
async fn video_load_path_confirms_ingests_and_acknowledges() {
    let ctx = setup().await;

    let sink = RecordingSink::new();
    let state = ctx
        .app
        .pipeline
        .run(
            state_for("u1", "https://youtu.be/dQw4w9WgXcQ please"),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let reply = state.response.unwrap();
    assert_eq!(reply.metadata.intent, Intent::VideoLoad);
    assert_eq!(reply.response, "Added video *Mock Video* to your library.");

    let events = sink.video_events.lock();
    assert!(matches!(events[0], VideoLoadEvent::Confirmation { .. }));
    assert!(matches!(
        events[1],
        VideoLoadEvent::Status { status: VideoLoadPhase::Started, .. }
    ));
    assert!(matches!(
        events[2],
        VideoLoadEvent::Status { status: VideoLoadPhase::Completed, .. }
    ));
    assert_eq!(sink.steps(), vec![Step::Routing, Step::Ingesting]);
    assert_eq!(ctx.ingestor.calls.lock().len(), 1);
}

#[tokio::test]
async fn transient_ingest_failures_retry_without_duplicate_frames() {
    let ctx = setup().await;
    ctx.ingestor.fail_transiently(1);

    let sink = RecordingSink::new();
    let state = ctx
        .app
        .pipeline
        .run(
            state_for("u1", "https://youtu.be/dQw4w9WgXcQ"),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(state.response.unwrap().metadata.intent, Intent::VideoLoad);
    assert_eq!(ctx.ingestor.calls.lock().len(), 2);

    // Confirmation, started, completed: once each, despite the retry.
    let events = sink.video_events.lock();
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], VideoLoadEvent::Confirmation { .. }));
    assert!(matches!(
        events[1],
        VideoLoadEvent::Status { status: VideoLoadPhase::Started, .. }
    ));
    assert!(matches!(
        events[2],
        VideoLoadEvent::Status { status: VideoLoadPhase::Completed, .. }
    ));
}

#[tokio::test]
async fn video_load_failure_reports_failed_status_and_errors_the_turn() {
    let ctx = setup().await;
    ctx.ingestor.fail_next("no captions available");

    let sink = RecordingSink::new();
    let result = ctx
        .app
        .pipeline
        .run(
            state_for("u1", "https://youtu.be/dQw4w9WgXcQ"),
            &sink,
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_err());
    let events = sink.video_events.lock();
    assert!(matches!(
        events.last().unwrap(),
        VideoLoadEvent::Status { status: VideoLoadPhase::Failed, .. }
    ));
}

#[tokio::test]
async fn cancellation_before_first_node_yields_nothing() {
    let ctx = setup().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let sink = RecordingSink::new();
    let result = ctx
        .app
        .pipeline
        .run(state_for("u1", "hi"), &sink, &cancel)
        .await;

    assert!(matches!(result, Err(tubetalk::ApiError::Canceled)));
    assert!(sink.steps().is_empty());
    // No model calls were made.
    assert!(ctx.chat.chat_requests.lock().is_empty());
    assert!(ctx.chat.structured_requests.lock().is_empty());
}

#[tokio::test]
async fn empty_history_is_fine_for_classifier_and_generator() {
    let ctx = setup().await;
    ctx.chat.push_intent("chitchat", 0.5);
    ctx.chat.push_chat("Hello!");

    let state = ctx
        .app
        .pipeline
        .run(
            PipelineState::new("req-2", "u1", "conv-2", "hey", Vec::new()),
            &RecordingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(state.response.is_some());
}
