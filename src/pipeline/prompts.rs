// src/pipeline/prompts.rs
// Prompt templates for the classifier and the per-intent generators

use crate::llm::ChatMessage;
use crate::store::Transcript;

use super::retrieve::RetrievedChunk;

pub const CLASSIFIER_SYSTEM: &str = "\
You classify messages sent to a chat assistant that answers questions about \
a library of YouTube video transcripts. Pick exactly one intent:

- chitchat: greetings, small talk, anything not about the video library.
- qa: a topical question to answer from transcript content.
- linkedin: the user wants a LinkedIn post written. If LinkedIn post \
creation is mentioned anywhere, this intent wins over everything else.
- metadata: the user wants the list of videos in the library.
- metadata_search: the user wants videos filtered by a topic.
- metadata_search_and_summarize: the user names a specific video and wants \
it summarized or explained.
- video_load: the message contains a YouTube URL to ingest.

Rules:
- An exact, full video title in the message means \
metadata_search_and_summarize, even when conversation history suggests \
another video. Searching by title beats guessing from context.
- A partial title or topic plus a summarize/explain verb is also \
metadata_search_and_summarize.
- \"What videos do I have\" style requests are metadata; topic filters are \
metadata_search.
- Pronouns and follow-ups (\"it\", \"that\", \"the first one\") are qa only \
when the conversation history provides a clear antecedent.

Report a confidence in [0,1] and one sentence of reasoning.";

pub fn build_classifier_prompt(user_query: &str, history: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(&history_block(history));
        prompt.push('\n');
    }
    prompt.push_str("Message to classify:\n");
    prompt.push_str(user_query);
    prompt
}

pub const CHITCHAT_SYSTEM: &str = "\
You are TubeTalk, a friendly assistant for a personal YouTube transcript \
library. Keep replies short and conversational. If the user seems to want \
something from their videos, point them at asking about one.";

pub const QA_RAG_SYSTEM: &str = "\
You are TubeTalk, answering questions from the user's YouTube transcript \
library. Ground your answer in the provided transcript excerpts and name \
the videos you drew from. If the excerpts do not cover the question, say \
so plainly instead of inventing an answer.";

pub const LINKEDIN_SYSTEM: &str = "\
You are TubeTalk, drafting a LinkedIn post for the user. Build the post \
from the provided transcript excerpts: a hook, a few substantial insights, \
and a closing line with relevant hashtags. Match a professional but \
personal voice. Do not fabricate facts that are not in the excerpts.";

pub const METADATA_LIST_SYSTEM: &str = "\
You are TubeTalk. Present the user's video library as a clean list with \
titles and channel names. Note the total count. Do not editorialize.";

pub const METADATA_SEARCH_SYSTEM: &str = "\
You are TubeTalk. The user searched their video library; present the \
matching videos with titles and relevance, best match first. If nothing \
matched, say so.";

fn history_block(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn context_block(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return "(no transcript excerpts matched)".to_string();
    }
    chunks
        .iter()
        .map(|c| format!("[{} | part {}]\n{}", c.title, c.chunk_index + 1, c.chunk_text))
        .collect::<Vec<_>>()
        .join("\n---\n")
}

pub fn build_qa_prompt(
    user_query: &str,
    history: &[ChatMessage],
    chunks: &[RetrievedChunk],
) -> String {
    let mut prompt = String::new();
    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(&history_block(history));
        prompt.push_str("\n\n");
    }
    prompt.push_str("Transcript excerpts:\n");
    prompt.push_str(&context_block(chunks));
    prompt.push_str("\n\nQuestion:\n");
    prompt.push_str(user_query);
    prompt
}

pub fn build_chitchat_prompt(user_query: &str, history: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(&history_block(history));
        prompt.push_str("\n\n");
    }
    prompt.push_str(user_query);
    prompt
}

pub fn build_video_list_prompt(user_query: &str, videos: &[Transcript]) -> String {
    let mut prompt = String::new();
    prompt.push_str("Video library:\n");
    if videos.is_empty() {
        prompt.push_str("(empty)\n");
    }
    for video in videos {
        match &video.channel_name {
            Some(channel) => prompt.push_str(&format!("- {} ({})\n", video.title, channel)),
            None => prompt.push_str(&format!("- {}\n", video.title)),
        }
    }
    prompt.push_str("\nRequest:\n");
    prompt.push_str(user_query);
    prompt
}

pub fn build_metadata_search_prompt(
    user_query: &str,
    chunks: &[RetrievedChunk],
    summarize: bool,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("Search hits (best first):\n");
    if chunks.is_empty() {
        prompt.push_str("(none)\n");
    }

    // One line per distinct video, keeping the best score.
    let mut seen: Vec<&str> = Vec::new();
    for chunk in chunks {
        if seen.contains(&chunk.title.as_str()) {
            continue;
        }
        seen.push(&chunk.title);
        prompt.push_str(&format!("- {} (score {:.2})\n", chunk.title, chunk.score));
    }

    if summarize {
        prompt.push_str("\nTranscript excerpts of the best match:\n");
        prompt.push_str(&context_block(chunks));
        prompt.push_str("\n\nSummarize the matching video for the user as requested.");
    }

    prompt.push_str("\n\nRequest:\n");
    prompt.push_str(user_query);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(title: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: "c1".into(),
            score,
            chunk_text: "text".into(),
            youtube_video_id: "v1".into(),
            chunk_index: 0,
            title: title.into(),
        }
    }

    #[test]
    fn classifier_rules_prefer_search_for_exact_titles() {
        assert!(CLASSIFIER_SYSTEM.contains("exact, full video title"));
        assert!(CLASSIFIER_SYSTEM.contains("metadata_search_and_summarize"));
        assert!(CLASSIFIER_SYSTEM.contains("LinkedIn post creation"));
    }

    #[test]
    fn qa_prompt_carries_context_and_question() {
        let prompt = build_qa_prompt("what is FastAPI?", &[], &[chunk("Intro", 0.9)]);
        assert!(prompt.contains("Intro"));
        assert!(prompt.contains("what is FastAPI?"));
    }

    #[test]
    fn empty_context_is_stated_not_omitted() {
        let prompt = build_qa_prompt("anything?", &[], &[]);
        assert!(prompt.contains("no transcript excerpts matched"));
    }

    #[test]
    fn search_prompt_dedupes_videos() {
        let chunks = vec![chunk("Same Video", 0.9), chunk("Same Video", 0.8)];
        let prompt = build_metadata_search_prompt("find it", &chunks, false);
        assert_eq!(prompt.matches("- Same Video").count(), 1);
    }

    #[test]
    fn summarize_variant_adds_cue() {
        let chunks = vec![chunk("A", 0.9)];
        let with = build_metadata_search_prompt("q", &chunks, true);
        let without = build_metadata_search_prompt("q", &chunks, false);
        assert!(with.contains("Summarize the matching video"));
        assert!(!without.contains("Summarize the matching video"));
    }
}
