//! Ordered conversation state reconciled from history and realtime frames.
//!
//! The [`Transcript`] is the single writer for chat state. It absorbs
//! wholesale history loads, atomic `response` frames, and incremental
//! stream frames into one insertion-ordered sequence of turns, staying
//! idempotent against duplicate delivery.

use crate::types::{ChatResponsePayload, HistoryMessage};
use rand::rngs::OsRng;
use rand::RngCore;

/// Conversation participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

/// One message in the transcript.
///
/// Once created, a turn's identity (`id`/`stream_id`) never changes; only
/// its `text` grows while `streaming` is set.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub id: String,
    pub role: TurnRole,
    pub text: String,
    pub agent: Option<String>,
    /// Correlates the start/delta/end frames of a streamed turn. Atomic
    /// turns carry `None`.
    pub stream_id: Option<String>,
    pub streaming: bool,
}

/// Ordered conversation state plus the assistant typing indicator.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
    typing: bool,
    local_seq: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// All turns in insertion order.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Whether the assistant typing indicator is currently on.
    pub fn typing(&self) -> bool {
        self.typing
    }

    pub fn set_typing(&mut self, typing: bool) {
        self.typing = typing;
    }

    /// Replace the whole sequence from a history fetch.
    ///
    /// Each recorded request/response pair expands to zero, one, or two
    /// turns: a user turn when the request text is non-empty, an assistant
    /// turn when the response text is non-empty.
    pub fn apply_history(&mut self, messages: &[HistoryMessage]) {
        self.turns.clear();
        self.typing = false;
        for record in messages {
            let user_text = record.message.trim();
            if !user_text.is_empty() {
                self.turns.push(ConversationTurn {
                    id: format!("{}:user", record.id),
                    role: TurnRole::User,
                    text: user_text.to_string(),
                    agent: None,
                    stream_id: None,
                    streaming: false,
                });
            }
            let assistant_text = record
                .response
                .message
                .as_deref()
                .unwrap_or_default()
                .trim();
            if !assistant_text.is_empty() {
                let agent = record
                    .response
                    .agent
                    .clone()
                    .or_else(|| (!record.agent.is_empty()).then(|| record.agent.clone()));
                self.turns.push(ConversationTurn {
                    id: format!("{}:assistant", record.id),
                    role: TurnRole::Assistant,
                    text: assistant_text.to_string(),
                    agent,
                    stream_id: None,
                    streaming: false,
                });
            }
        }
    }

    /// Apply an atomic assistant response frame.
    ///
    /// Clears the typing indicator. Duplicate delivery under the same
    /// stream id replaces the existing turn's content instead of appending
    /// a second turn. An empty-message response that follows a streamed
    /// turn only finalizes it; the streamed text stays.
    pub fn apply_response(
        &mut self,
        payload: &ChatResponsePayload,
        stream_id: Option<&str>,
    ) -> Option<&ConversationTurn> {
        self.typing = false;

        if let Some(sid) = stream_id {
            if let Some(index) = self.find_stream(sid) {
                let turn = &mut self.turns[index];
                if !payload.message.is_empty() {
                    turn.text = payload.message.clone();
                }
                if payload.agent.is_some() {
                    turn.agent = payload.agent.clone();
                }
                turn.streaming = false;
                return Some(&self.turns[index]);
            }
        }

        if payload.message.is_empty() {
            // Stream-completion envelopes carry no text and no known turn.
            return None;
        }

        let id = match stream_id {
            Some(sid) => sid.to_string(),
            None => self.next_local_id("asst"),
        };
        self.turns.push(ConversationTurn {
            id,
            role: TurnRole::Assistant,
            text: payload.message.clone(),
            agent: payload.agent.clone(),
            stream_id: stream_id.map(str::to_string),
            streaming: false,
        });
        self.turns.last()
    }

    /// Open a streamed assistant turn. Repeated starts for a known stream
    /// id are ignored, preserving the at-most-one-turn-per-stream invariant.
    pub fn apply_stream_start(&mut self, stream_id: &str, agent: Option<&str>) -> bool {
        if self.find_stream(stream_id).is_some() {
            return false;
        }
        self.turns.push(ConversationTurn {
            id: stream_id.to_string(),
            role: TurnRole::Assistant,
            text: String::new(),
            agent: agent.map(str::to_string),
            stream_id: Some(stream_id.to_string()),
            streaming: true,
        });
        true
    }

    /// Append a delta to a streamed turn. Deltas for stream ids that were
    /// never started are ignored.
    pub fn apply_stream_delta(&mut self, stream_id: &str, delta: &str) -> bool {
        match self.find_stream(stream_id) {
            Some(index) => {
                self.turns[index].text.push_str(delta);
                true
            }
            None => false,
        }
    }

    /// Finalize a streamed turn: trim trailing whitespace, keep everything
    /// else as delivered.
    pub fn apply_stream_end(&mut self, stream_id: &str) -> Option<&ConversationTurn> {
        let index = self.find_stream(stream_id)?;
        let turn = &mut self.turns[index];
        let trimmed_len = turn.text.trim_end().len();
        turn.text.truncate(trimmed_len);
        turn.streaming = false;
        Some(&self.turns[index])
    }

    /// Optimistic local echo of an outbound user message. Appended
    /// immediately, never retried or rolled back.
    pub fn append_local_user_turn(&mut self, text: &str) -> &ConversationTurn {
        let id = self.next_local_id("user");
        self.turns.push(ConversationTurn {
            id,
            role: TurnRole::User,
            text: text.to_string(),
            agent: None,
            stream_id: None,
            streaming: false,
        });
        self.turns.last().expect("turn just pushed")
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.typing = false;
    }

    fn find_stream(&self, stream_id: &str) -> Option<usize> {
        self.turns
            .iter()
            .position(|turn| turn.stream_id.as_deref() == Some(stream_id))
    }

    fn next_local_id(&mut self, tag: &str) -> String {
        self.local_seq += 1;
        format!("local-{tag}-{}-{:08x}", self.local_seq, OsRng.next_u32())
    }
}
