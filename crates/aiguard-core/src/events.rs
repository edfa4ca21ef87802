//! Output event types shared by the streaming and non-streaming paths

use serde::{Deserialize, Serialize};

/// Why a completion ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The generator ran to completion
    Stop,

    /// A blocking rule terminated the session
    ContentFilter,
}

/// One event in a filtered streaming response.
///
/// A stream is a sequence of `Delta` events, exactly one terminal `Finished`
/// event, and a final `Done` marker after which nothing else is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A span of filtered text safe to deliver
    Delta { text: String },

    /// Terminal event carrying the finish reason
    Finished { reason: FinishReason },

    /// Explicit end-of-stream marker, always last
    Done,
}

impl StreamEvent {
    /// Create a delta event
    pub fn delta(text: impl Into<String>) -> Self {
        Self::Delta { text: text.into() }
    }

    /// Create the terminal event
    pub fn finished(reason: FinishReason) -> Self {
        Self::Finished { reason }
    }
}

/// Result of a non-streaming completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// The full filtered text
    pub content: String,

    /// Why the completion ended
    pub finish_reason: FinishReason,
}

impl Completion {
    /// Create a new completion result
    pub fn new(content: impl Into<String>, finish_reason: FinishReason) -> Self {
        Self {
            content: content.into(),
            finish_reason,
        }
    }
}
