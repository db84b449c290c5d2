// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Episode builder: buffers raw messages and emits episode summaries on
//! batch completion, topic switch, or explicit flush.

use engram_core::tokens::estimate_tokens;
use engram_core::{
    ChatMessage, EmbeddingAdapter, EmbeddingInput, EmbeddingTask, EngramError, SummarizerAdapter,
};
use tracing::debug;
use uuid::Uuid;

/// Per-message body cap inside the raw-message blob.
const RAW_MESSAGE_CHAR_LIMIT: usize = 500;

/// Explicit topic-switch markers, matched case-insensitively against the
/// incoming message.
const TOPIC_MARKERS: &[&str] = &[
    "by the way",
    "btw,",
    "another question",
    "on a different note",
    "changing the subject",
    "另外",
    "换个话题",
    "顺便问一下",
    "话说回来",
];

/// Outcome of buffering one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Message buffered; nothing to do.
    Buffered,
    /// Buffer reached the batch size; caller should flush.
    BatchReady,
    /// The message opens a new topic; caller should flush the current
    /// buffer first, then re-add the message.
    TopicSwitch,
}

/// Accumulates messages for one session and emits coherent episodes.
pub struct EpisodeBuilder {
    session_id: String,
    batch_size: usize,
    buffer: Vec<ChatMessage>,
    /// Running turn counter across the session.
    turn: u32,
}

impl EpisodeBuilder {
    pub fn new(session_id: impl Into<String>, batch_size: usize) -> Self {
        Self {
            session_id: session_id.into(),
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            turn: 0,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append a message. O(1); returns whether the caller should flush.
    pub fn add(&mut self, message: ChatMessage) -> AddOutcome {
        if let Some(prev) = self.buffer.last() {
            if topic_switch(&message.content, &prev.content) {
                return AddOutcome::TopicSwitch;
            }
        }
        self.buffer.push(message);
        if self.buffer.len() >= self.batch_size {
            AddOutcome::BatchReady
        } else {
            AddOutcome::Buffered
        }
    }

    /// Append without topic-switch detection or batch signalling.
    ///
    /// Used when the host has cancelled the turn: buffering stays cheap
    /// and synchronous, and the preserved messages flush next turn.
    pub fn buffer_message(&mut self, message: ChatMessage) {
        self.buffer.push(message);
    }

    /// Summarise and emit the buffered messages as an [`super::types::Episode`].
    ///
    /// Returns `None` on an empty buffer. Summariser or embedding failures
    /// propagate and leave the buffer intact: no partial episode is
    /// persisted and the messages survive for the next attempt.
    pub async fn flush(
        &mut self,
        summarizer: &dyn SummarizerAdapter,
        embedder: &dyn EmbeddingAdapter,
    ) -> Result<Option<crate::types::Episode>, EngramError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let transcript: String = self
            .buffer
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Summarize this conversation excerpt in 50-100 tokens. Capture \
             what was discussed, key decisions, and planned actions. Answer \
             in the language of the input.\n\n{transcript}"
        );
        let summary = summarizer.complete(&prompt, 256).await?;
        let summary = summary.trim().to_string();
        if summary.is_empty() {
            return Err(EngramError::Summarizer {
                message: "episode summary came back empty".into(),
                source: None,
            });
        }

        let output = embedder
            .embed(EmbeddingInput {
                texts: vec![summary.clone()],
                task: EmbeddingTask::TextMatching,
            })
            .await?;
        let embedding = output.embeddings.into_iter().next().ok_or_else(|| {
            EngramError::Embedding {
                message: "embedding returned no results".into(),
                source: None,
            }
        })?;

        // All fallible work is done; now consume the buffer.
        let messages = std::mem::take(&mut self.buffer);
        let message_count = messages.len() as u32;
        let turn_start = self.turn;
        self.turn += message_count;
        let turn_end = self.turn.saturating_sub(1);

        let truncated: Vec<ChatMessage> = messages
            .into_iter()
            .map(|mut m| {
                if m.content.chars().count() > RAW_MESSAGE_CHAR_LIMIT {
                    m.content = m.content.chars().take(RAW_MESSAGE_CHAR_LIMIT).collect();
                }
                m
            })
            .collect();
        let raw_messages =
            serde_json::to_string(&truncated).unwrap_or_else(|_| "[]".to_string());

        let dialogue_time = truncated
            .iter()
            .filter_map(|m| m.timestamp_ms)
            .max()
            .unwrap_or_else(now_ms);

        let episode = crate::types::Episode {
            id: Uuid::new_v4().to_string(),
            summary,
            session_id: self.session_id.clone(),
            turn_start,
            turn_end,
            message_count,
            created_at: dialogue_time,
            embedding,
            raw_messages,
        };
        debug!(
            episode_id = %episode.id,
            message_count,
            summary_tokens = estimate_tokens(&episode.summary),
            "episode flushed"
        );
        Ok(Some(episode))
    }
}

/// Whether the incoming message explicitly switches topic relative to the
/// previous one. Plain continuations never match.
pub fn topic_switch(current: &str, previous: &str) -> bool {
    if previous.is_empty() {
        return false;
    }
    let lowered = current.to_lowercase();
    TOPIC_MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_core::MessageRole;
    use engram_test_utils::{MockEmbedder, MockSummarizer};

    fn user(text: &str) -> ChatMessage {
        ChatMessage::new(MessageRole::User, text)
    }

    fn assistant(text: &str) -> ChatMessage {
        ChatMessage::new(MessageRole::Assistant, text)
    }

    #[test]
    fn topic_switch_on_marker() {
        assert!(topic_switch("By the way, how is the weather?", "we were discussing rust"));
        assert!(topic_switch("另外我想问一下部署的事", "我们聊聊代码"));
        assert!(topic_switch("换个话题吧", "好的"));
        assert!(topic_switch("Another question: what about tests?", "the parser is done"));
    }

    #[test]
    fn no_topic_switch_on_continuation() {
        assert!(!topic_switch("and then what happened?", "we deployed on friday"));
        assert!(!topic_switch("yes, that makes sense", "use a builder"));
        assert!(!topic_switch("anything at all", ""));
    }

    #[test]
    fn add_reports_batch_ready_at_batch_size() {
        let mut builder = EpisodeBuilder::new("s1", 3);
        assert_eq!(builder.add(user("one")), AddOutcome::Buffered);
        assert_eq!(builder.add(assistant("two")), AddOutcome::Buffered);
        assert_eq!(builder.add(user("three")), AddOutcome::BatchReady);
        assert_eq!(builder.buffered(), 3);
    }

    #[test]
    fn add_reports_topic_switch_without_buffering() {
        let mut builder = EpisodeBuilder::new("s1", 5);
        builder.add(user("tell me about rust lifetimes"));
        let outcome = builder.add(user("by the way, what time is it?"));
        assert_eq!(outcome, AddOutcome::TopicSwitch);
        // The switching message was not buffered.
        assert_eq!(builder.buffered(), 1);
    }

    #[tokio::test]
    async fn flush_empty_buffer_returns_none() {
        let mut builder = EpisodeBuilder::new("s1", 5);
        let summarizer = MockSummarizer::new();
        let embedder = MockEmbedder::new(16);
        let result = builder.flush(&summarizer, &embedder).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn flush_emits_episode_and_clears_buffer() {
        let mut builder = EpisodeBuilder::new("s1", 5);
        builder.add(user("we should migrate the billing service"));
        builder.add(assistant("agreed, start with the invoice table"));

        let summarizer = MockSummarizer::new();
        summarizer.push_response("Discussed migrating the billing service; start with invoices.");
        let embedder = MockEmbedder::new(16);

        let episode = builder.flush(&summarizer, &embedder).await.unwrap().unwrap();
        assert_eq!(episode.session_id, "s1");
        assert_eq!(episode.message_count, 2);
        assert_eq!(episode.turn_start, 0);
        assert_eq!(episode.turn_end, 1);
        assert!(episode.summary.contains("billing"));
        assert_eq!(episode.embedding.len(), 16);
        assert_eq!(builder.buffered(), 0);

        // Raw messages survive in the blob.
        let raw: Vec<ChatMessage> = serde_json::from_str(&episode.raw_messages).unwrap();
        assert_eq!(raw.len(), 2);
    }

    #[tokio::test]
    async fn flush_truncates_long_messages() {
        let mut builder = EpisodeBuilder::new("s1", 5);
        let long = "x".repeat(1200);
        builder.add(user(&long));

        let summarizer = MockSummarizer::new();
        summarizer.push_response("A very long message.");
        let embedder = MockEmbedder::new(16);

        let episode = builder.flush(&summarizer, &embedder).await.unwrap().unwrap();
        let raw: Vec<ChatMessage> = serde_json::from_str(&episode.raw_messages).unwrap();
        assert_eq!(raw[0].content.chars().count(), 500);
    }

    #[tokio::test]
    async fn flush_failure_preserves_buffer() {
        let mut builder = EpisodeBuilder::new("s1", 5);
        builder.add(user("important content"));

        let summarizer = MockSummarizer::failing();
        let embedder = MockEmbedder::new(16);

        let result = builder.flush(&summarizer, &embedder).await;
        assert!(result.is_err());
        assert_eq!(builder.buffered(), 1, "buffer must survive a failed flush");
    }

    #[tokio::test]
    async fn turn_range_advances_across_flushes() {
        let mut builder = EpisodeBuilder::new("s1", 2);
        let summarizer = MockSummarizer::new();
        let embedder = MockEmbedder::new(16);

        builder.add(user("a"));
        builder.add(assistant("b"));
        let first = builder.flush(&summarizer, &embedder).await.unwrap().unwrap();
        builder.add(user("c"));
        builder.add(assistant("d"));
        let second = builder.flush(&summarizer, &embedder).await.unwrap().unwrap();

        assert_eq!((first.turn_start, first.turn_end), (0, 1));
        assert_eq!((second.turn_start, second.turn_end), (2, 3));
    }
}
