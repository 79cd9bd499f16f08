// tests/corpus_invariants.rs
// Chunk rows and vector points stay paired: indexing writes one point per
// row, deletes clean vectors before rows, channel removal touches only the
// channel's corpus.

mod common;

use common::setup;
use tubetalk::llm::CallMetadata;
use tubetalk::services::CorpusService;
use tubetalk::store::{NewChunk, NewTranscript};
use tubetalk::vector::GLOBAL_COLLECTION;

/// A corpus service over the same stores with orphan deletion switched on.
fn corpus_with_orphan_deletion(ctx: &common::TestCtx) -> CorpusService {
    CorpusService::new(
        ctx.app.transcripts.clone(),
        ctx.app.chunks.clone(),
        ctx.app.channels.clone(),
        ctx.vectors.clone(),
        ctx.embedder.clone(),
        true,
    )
}

async fn seed_transcript(
    ctx: &common::TestCtx,
    user_id: &str,
    video_id: &str,
    channel_id: Option<&str>,
) -> (String, Vec<tubetalk::store::Chunk>) {
    let transcript = ctx
        .app
        .transcripts
        .insert(NewTranscript {
            user_id: user_id.to_string(),
            youtube_video_id: video_id.to_string(),
            title: format!("Video {}", video_id),
            channel_name: None,
            duration_s: None,
            transcript_text: "full text".to_string(),
            metadata: None,
        })
        .await
        .unwrap();

    let chunks = ctx
        .app
        .chunks
        .insert_many(
            (0..3)
                .map(|i| NewChunk {
                    transcript_id: transcript.id.clone(),
                    user_id: user_id.to_string(),
                    channel_id: channel_id.map(String::from),
                    chunk_index: i,
                    chunk_text: format!("chunk {} of {}", i, video_id),
                    token_count: 4,
                    metadata: None,
                })
                .collect(),
        )
        .await
        .unwrap();

    (transcript.id, chunks)
}

#[tokio::test]
async fn indexing_writes_one_point_per_chunk_row() {
    let ctx = setup().await;
    let (_tid, chunks) = seed_transcript(&ctx, "u1", "vid00000001", None).await;

    ctx.app
        .corpus
        .index_chunks(&chunks, "vid00000001", None, &CallMetadata::new("r", "u1"))
        .await
        .unwrap();

    assert_eq!(ctx.vectors.point_count(GLOBAL_COLLECTION), 3);
}

#[tokio::test]
async fn duplicate_ingest_is_rejected_per_user_but_not_across_users() {
    let ctx = setup().await;
    seed_transcript(&ctx, "u1", "vid00000001", None).await;

    let err = ctx
        .app
        .transcripts
        .insert(NewTranscript {
            user_id: "u1".to_string(),
            youtube_video_id: "vid00000001".to_string(),
            title: "again".to_string(),
            channel_name: None,
            duration_s: None,
            transcript_text: "t".to_string(),
            metadata: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");

    // A different user may ingest the same video.
    assert!(
        ctx.app
            .transcripts
            .insert(NewTranscript {
                user_id: "u2".to_string(),
                youtube_video_id: "vid00000001".to_string(),
                title: "theirs".to_string(),
                channel_name: None,
                duration_s: None,
                transcript_text: "t".to_string(),
                metadata: None,
            })
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn delete_transcript_removes_vectors_and_rows() {
    let ctx = setup().await;
    let (transcript_id, chunks) = seed_transcript(&ctx, "u1", "vid00000001", None).await;
    ctx.app
        .corpus
        .index_chunks(&chunks, "vid00000001", None, &CallMetadata::new("r", "u1"))
        .await
        .unwrap();

    ctx.app
        .corpus
        .delete_transcript("u1", &transcript_id)
        .await
        .unwrap();

    assert_eq!(ctx.vectors.point_count(GLOBAL_COLLECTION), 0);
    assert!(ctx.app.transcripts.get(&transcript_id).await.unwrap().is_none());
    assert!(
        ctx.app
            .chunks
            .ids_for_transcript(&transcript_id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn delete_transcript_enforces_ownership() {
    let ctx = setup().await;
    let (transcript_id, _) = seed_transcript(&ctx, "owner", "vid00000001", None).await;

    let err = ctx
        .app
        .corpus
        .delete_transcript("intruder", &transcript_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
    assert!(ctx.app.transcripts.get(&transcript_id).await.unwrap().is_some());
}

#[tokio::test]
async fn channel_video_removal_touches_only_channel_chunks() {
    let ctx = setup().await;
    let channel = ctx
        .app
        .channels
        .create("rustconf", "RustConf", None, "admin-1")
        .await
        .unwrap();

    // The same transcript has personal chunks and channel chunks.
    let (transcript_id, personal_chunks) =
        seed_transcript(&ctx, "admin-1", "vid00000001", None).await;
    let channel_chunks = ctx
        .app
        .chunks
        .insert_many(
            (10..13)
                .map(|i| NewChunk {
                    transcript_id: transcript_id.clone(),
                    user_id: "admin-1".to_string(),
                    channel_id: Some(channel.id.clone()),
                    chunk_index: i,
                    chunk_text: format!("channel chunk {}", i),
                    token_count: 3,
                    metadata: None,
                })
                .collect(),
        )
        .await
        .unwrap();
    ctx.app
        .channels
        .add_video(&channel.id, &transcript_id, "admin-1")
        .await
        .unwrap();

    let meta = CallMetadata::new("r", "admin-1");
    ctx.app
        .corpus
        .index_chunks(&personal_chunks, "vid00000001", None, &meta)
        .await
        .unwrap();
    ctx.app
        .corpus
        .index_chunks(&channel_chunks, "vid00000001", Some(&channel), &meta)
        .await
        .unwrap();
    assert_eq!(ctx.vectors.point_count(&channel.qdrant_collection_name), 3);

    ctx.app
        .corpus
        .remove_channel_video(true, &channel, &transcript_id)
        .await
        .unwrap();

    // Channel corpus gone, personal corpus intact, transcript retained.
    assert_eq!(ctx.vectors.point_count(&channel.qdrant_collection_name), 0);
    assert_eq!(ctx.vectors.point_count(GLOBAL_COLLECTION), 3);
    assert_eq!(
        ctx.app
            .chunks
            .ids_for_transcript(&transcript_id)
            .await
            .unwrap()
            .len(),
        3
    );
    assert!(ctx.app.transcripts.get(&transcript_id).await.unwrap().is_some());
}

#[tokio::test]
async fn orphan_deletion_spares_transcripts_with_personal_chunks() {
    let ctx = setup().await;
    let channel = ctx
        .app
        .channels
        .create("rustconf", "RustConf", None, "admin-1")
        .await
        .unwrap();

    // The transcript backs both the admin's personal corpus and the channel.
    let (transcript_id, personal_chunks) =
        seed_transcript(&ctx, "admin-1", "vid00000001", None).await;
    let channel_chunks = ctx
        .app
        .chunks
        .insert_many(
            (10..13)
                .map(|i| NewChunk {
                    transcript_id: transcript_id.clone(),
                    user_id: "admin-1".to_string(),
                    channel_id: Some(channel.id.clone()),
                    chunk_index: i,
                    chunk_text: format!("channel chunk {}", i),
                    token_count: 3,
                    metadata: None,
                })
                .collect(),
        )
        .await
        .unwrap();
    ctx.app
        .channels
        .add_video(&channel.id, &transcript_id, "admin-1")
        .await
        .unwrap();

    let meta = CallMetadata::new("r", "admin-1");
    let corpus = corpus_with_orphan_deletion(&ctx);
    corpus
        .index_chunks(&personal_chunks, "vid00000001", None, &meta)
        .await
        .unwrap();
    corpus
        .index_chunks(&channel_chunks, "vid00000001", Some(&channel), &meta)
        .await
        .unwrap();

    // Last channel reference goes away, but the personal copy is in use.
    corpus
        .remove_channel_video(true, &channel, &transcript_id)
        .await
        .unwrap();

    assert!(ctx.app.transcripts.get(&transcript_id).await.unwrap().is_some());
    assert_eq!(
        ctx.app
            .chunks
            .ids_for_transcript(&transcript_id)
            .await
            .unwrap()
            .len(),
        3
    );
    assert_eq!(ctx.vectors.point_count(GLOBAL_COLLECTION), 3);
    assert_eq!(ctx.vectors.point_count(&channel.qdrant_collection_name), 0);
}

#[tokio::test]
async fn orphan_deletion_removes_fully_orphaned_transcripts() {
    let ctx = setup().await;
    let channel = ctx
        .app
        .channels
        .create("onlychan", "Only Channel", None, "admin-1")
        .await
        .unwrap();

    // Channel-only transcript: no personal chunks at all.
    let (transcript_id, channel_chunks) =
        seed_transcript(&ctx, "admin-1", "vid00000002", Some(&channel.id)).await;
    ctx.app
        .channels
        .add_video(&channel.id, &transcript_id, "admin-1")
        .await
        .unwrap();

    let corpus = corpus_with_orphan_deletion(&ctx);
    corpus
        .index_chunks(
            &channel_chunks,
            "vid00000002",
            Some(&channel),
            &CallMetadata::new("r", "admin-1"),
        )
        .await
        .unwrap();

    corpus
        .remove_channel_video(true, &channel, &transcript_id)
        .await
        .unwrap();

    assert!(ctx.app.transcripts.get(&transcript_id).await.unwrap().is_none());
    assert!(
        ctx.app
            .chunks
            .ids_for_transcript(&transcript_id)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(ctx.vectors.point_count(&channel.qdrant_collection_name), 0);
}

#[tokio::test]
async fn channel_video_removal_requires_admin() {
    let ctx = setup().await;
    let channel = ctx
        .app
        .channels
        .create("locked", "Locked", None, "admin-1")
        .await
        .unwrap();
    let (transcript_id, _) = seed_transcript(&ctx, "admin-1", "vid00000001", None).await;

    let err = ctx
        .app
        .corpus
        .remove_channel_video(false, &channel, &transcript_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
}

#[tokio::test]
async fn channel_chunks_carry_channel_id_in_payload() {
    let ctx = setup().await;
    let channel = ctx
        .app
        .channels
        .create("tagged", "Tagged", None, "admin-1")
        .await
        .unwrap();
    let (transcript_id, _) = seed_transcript(&ctx, "admin-1", "vid00000001", None).await;
    let channel_chunks = ctx
        .app
        .chunks
        .insert_many(vec![NewChunk {
            transcript_id,
            user_id: "admin-1".to_string(),
            channel_id: Some(channel.id.clone()),
            chunk_index: 10,
            chunk_text: "channel text".to_string(),
            token_count: 2,
            metadata: None,
        }])
        .await
        .unwrap();

    ctx.app
        .corpus
        .index_chunks(
            &channel_chunks,
            "vid00000001",
            Some(&channel),
            &CallMetadata::new("r", "admin-1"),
        )
        .await
        .unwrap();

    // Point ids mirror row ids and land in the channel's collection.
    assert_eq!(ctx.vectors.point_count(&channel.qdrant_collection_name), 1);
    assert_eq!(ctx.vectors.point_count(GLOBAL_COLLECTION), 0);
}
