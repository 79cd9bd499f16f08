// src/pipeline/video_load.rs
// The video-load side-effect path: no reply generation, just ingestion
// progress and a templated acknowledgment.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ProgressSink, Step};
use crate::error::{ApiError, ApiResult};
use crate::llm::{CallMetadata, RetryPolicy, retry};

lazy_static! {
    /// Matches youtube.com/watch?v=<id> and youtu.be/<id> forms.
    static ref YOUTUBE_URL: Regex = Regex::new(
        r"(?:https?://)?(?:www\.)?(?:youtube\.com/watch\?v=|youtu\.be/)([A-Za-z0-9_-]{11,})"
    )
    .expect("youtube url regex");
}

/// Extract `(url, video_id)` from free text, if present.
pub fn extract_youtube_url(text: &str) -> Option<(String, String)> {
    let captures = YOUTUBE_URL.captures(text)?;
    let url = captures.get(0)?.as_str().to_string();
    let video_id = captures.get(1)?.as_str().to_string();
    Some((url, video_id))
}

#[derive(Debug, Clone)]
pub struct IngestedVideo {
    pub video_id: String,
    pub title: String,
}

/// The ingestion collaborator: URL in, transcript fetched/chunked/embedded/
/// indexed out of band, title back. The online path only observes the
/// contract surface.
#[async_trait]
pub trait VideoIngestor: Send + Sync {
    async fn ingest(
        &self,
        youtube_url: &str,
        user_id: &str,
        meta: &CallMetadata,
    ) -> ApiResult<IngestedVideo>;
}

/// Placeholder wired in when no ingestion backend is configured.
pub struct DisabledIngestor;

#[async_trait]
impl VideoIngestor for DisabledIngestor {
    async fn ingest(
        &self,
        _youtube_url: &str,
        _user_id: &str,
        _meta: &CallMetadata,
    ) -> ApiResult<IngestedVideo> {
        Err(ApiError::external_fatal("video ingestion is not configured"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoLoadPhase {
    Started,
    Completed,
    Failed,
}

/// Events the gateway forwards as `video_load_confirmation` /
/// `video_load_status` frames.
#[derive(Debug, Clone)]
pub enum VideoLoadEvent {
    Confirmation {
        youtube_url: String,
        video_id: String,
    },
    Status {
        status: VideoLoadPhase,
        video_id: String,
        video_title: Option<String>,
        error: Option<String>,
    },
}

/// Run the side-effect path. Returns the acknowledgment reply persisted as
/// the assistant message on success. The ingest call gets the same bounded
/// retry as the other external call sites; the surrounding frames are
/// emitted once per turn, not per attempt.
pub async fn run(
    ingestor: &dyn VideoIngestor,
    sink: &dyn ProgressSink,
    user_query: &str,
    user_id: &str,
    meta: &CallMetadata,
    retry_policy: &RetryPolicy,
) -> ApiResult<super::GeneratedReply> {
    let (url, video_id) = extract_youtube_url(user_query).ok_or_else(|| {
        ApiError::InvalidInput("no YouTube URL found in the message".to_string())
    })?;

    sink.video(VideoLoadEvent::Confirmation {
        youtube_url: url.clone(),
        video_id: video_id.clone(),
    });
    sink.status(Step::Ingesting, "Fetching the video transcript");
    sink.video(VideoLoadEvent::Status {
        status: VideoLoadPhase::Started,
        video_id: video_id.clone(),
        video_title: None,
        error: None,
    });

    let call_meta = meta.clone().tagged("video_load");
    match retry(retry_policy, "video_load", || {
        ingestor.ingest(&url, user_id, &call_meta)
    })
    .await
    {
        Ok(video) => {
            info!(
                request_id = %meta.request_id,
                video_id = %video.video_id,
                "video ingested"
            );
            sink.video(VideoLoadEvent::Status {
                status: VideoLoadPhase::Completed,
                video_id: video.video_id.clone(),
                video_title: Some(video.title.clone()),
                error: None,
            });

            Ok(super::GeneratedReply {
                response: format!("Added video *{}* to your library.", video.title),
                metadata: super::ReplyMetadata {
                    intent: super::Intent::VideoLoad,
                    chunks_used: 0,
                    source_chunks: Vec::new(),
                    no_context: false,
                },
            })
        }
        Err(e) => {
            warn!(
                request_id = %meta.request_id,
                video_id = %video_id,
                error = %e,
                "video ingestion failed"
            );
            sink.video(VideoLoadEvent::Status {
                status: VideoLoadPhase::Failed,
                video_id,
                video_title: None,
                error: Some(e.user_message()),
            });
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_watch_urls() {
        let (url, id) =
            extract_youtube_url("check https://www.youtube.com/watch?v=dQw4w9WgXcQ out").unwrap();
        assert_eq!(id, "dQw4w9WgXcQ");
        assert!(url.contains("youtube.com/watch?v="));
    }

    #[test]
    fn extracts_short_urls() {
        let (_, id) = extract_youtube_url("https://youtu.be/abc123XYZ_-").unwrap();
        assert_eq!(id, "abc123XYZ_-");
    }

    #[test]
    fn ignores_plain_text_and_short_ids() {
        assert!(extract_youtube_url("tell me about youtube").is_none());
        assert!(extract_youtube_url("youtu.be/short").is_none());
    }
}
