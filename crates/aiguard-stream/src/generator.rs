//! The text-source collaborator driving a filtered session

use aiguard_core::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A pull-based source of generated text.
///
/// The orchestrator pulls one chunk at a time; `None` means the source is
/// exhausted. Chunk sizes are arbitrary and carry no meaning — the stream
/// buffer is responsible for reassembling patterns that straddle them.
#[async_trait]
pub trait TextGenerator: Send {
    async fn next_chunk(&mut self) -> Result<Option<String>>;
}

/// Generator that replays a fixed text in `chunk_chars`-sized pieces,
/// optionally pausing between chunks to simulate generation latency.
///
/// Serves as the mock LLM backend for the demo server and for tests.
pub struct ScriptedGenerator {
    chars: Vec<char>,
    pos: usize,
    chunk_chars: usize,
    delay: Duration,
}

impl ScriptedGenerator {
    pub fn new(text: impl Into<String>, chunk_chars: usize) -> Self {
        Self {
            chars: text.into().chars().collect(),
            pos: 0,
            chunk_chars: chunk_chars.max(1),
            delay: Duration::ZERO,
        }
    }

    /// Sleep this long before yielding each chunk
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Characters not yet yielded
    pub fn remaining(&self) -> usize {
        self.chars.len() - self.pos
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn next_chunk(&mut self) -> Result<Option<String>> {
        if self.pos >= self.chars.len() {
            return Ok(None);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let end = (self.pos + self.chunk_chars).min(self.chars.len());
        let chunk: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;
        Ok(Some(chunk))
    }
}
