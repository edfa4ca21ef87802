//! Per-response stream buffering and windowing.
//!
//! Generator chunks arrive at arbitrary granularity, so a forbidden pattern
//! can straddle any number of chunk boundaries. The session accumulates
//! chunks, normalizes them in batches, and only releases text up to a cut
//! point that (a) keeps at least `window_chars` of trailing context buffered
//! and (b) never falls inside a rule match of the current snapshot. Every
//! match no longer than the window is therefore assembled intact inside a
//! single engine apply call, no matter how the source was chunked.

use aiguard_core::normalize;
use aiguard_policy::{FilterMode, RuleStage, Snapshot};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Filtering options for one deployment, validated once at startup
#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    /// How `block` rules behave: mask-and-continue or abort-on-first-match
    pub mode: FilterMode,

    /// Generator-side chunk size, in characters
    pub chunk_chars: usize,

    /// Buffered chunk count that forces a flush
    pub buffer_tokens: usize,

    /// Trailing context retained across emissions, in characters.
    /// Must be at least as long as the longest pattern a rule can match.
    pub window_chars: usize,

    /// Simulated generation latency per chunk
    #[serde(default)]
    pub per_chunk_delay: Duration,
}

impl GuardConfig {
    pub fn validate(&self) -> aiguard_core::Result<()> {
        if self.chunk_chars == 0 {
            return Err(aiguard_core::Error::config("chunk_chars must be >= 1"));
        }
        if self.buffer_tokens == 0 {
            return Err(aiguard_core::Error::config("buffer_tokens must be >= 1"));
        }
        if self.window_chars == 0 {
            return Err(aiguard_core::Error::config("window_chars must be >= 1"));
        }
        Ok(())
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            mode: FilterMode::Mask,
            chunk_chars: 3,
            buffer_tokens: 10,
            window_chars: 128,
            per_chunk_delay: Duration::ZERO,
        }
    }
}

/// Buffering state for one streaming response.
///
/// Owned and driven by a single orchestrator task; never shared across
/// sessions, so it needs no synchronization.
#[derive(Debug)]
pub struct StreamSession {
    /// Raw chunks awaiting normalization
    pending: VecDeque<String>,
    pending_chars: usize,

    /// Normalized text held back for boundary safety
    carry: String,

    /// Rolling window over everything emitted so far, capped at
    /// `window_chars`; kept so emitted context can be re-inspected together
    /// with new arrivals
    trailing_window: String,

    /// Whether the normalized stream assembled so far ends with a space;
    /// suppresses the duplicate space a flush cut would otherwise introduce
    last_emission_ended_with_space: bool,

    buffer_tokens: usize,
    window_chars: usize,
}

impl StreamSession {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            pending: VecDeque::new(),
            pending_chars: 0,
            carry: String::new(),
            trailing_window: String::new(),
            last_emission_ended_with_space: false,
            buffer_tokens: config.buffer_tokens,
            window_chars: config.window_chars,
        }
    }

    /// Buffer one raw generator chunk
    pub fn push(&mut self, chunk: &str) {
        self.pending_chars += chunk.chars().count();
        self.pending.push_back(chunk.to_string());
    }

    /// Whether enough has accumulated to attempt a release. The char budget
    /// is the primary trigger; the chunk-count threshold bounds latency when
    /// chunks are large.
    pub fn should_flush(&self) -> bool {
        self.pending.len() > self.buffer_tokens || self.pending_chars >= self.window_chars
    }

    /// Normalize all pending chunks and append them to the carry.
    ///
    /// A leading space that merely duplicates the space the stream already
    /// ends with (an artifact of the flush cut, not of the source text) is
    /// stripped.
    ///
    /// Normalization runs per batch. A decomposed combining sequence whose
    /// base and mark land in different batches would compose differently
    /// than in a single pass over the whole text; generators emit composed
    /// chars, so batch boundaries never split such a sequence.
    pub fn absorb(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let raw: String = self.pending.drain(..).collect();
        self.pending_chars = 0;

        let mut text = normalize(&raw);
        let stream_ends_with_space = if self.carry.is_empty() {
            self.last_emission_ended_with_space
        } else {
            self.carry.ends_with(' ')
        };
        if stream_ends_with_space && text.starts_with(' ') {
            text = text.trim_start_matches(' ').to_string();
        }
        self.carry.push_str(&text);
    }

    /// Release the carry head up to a safe cut, retaining at least
    /// `window_chars` of trailing context. Returns `None` when nothing can
    /// be released yet.
    ///
    /// The cut starts at the window boundary and is moved left of any rule
    /// match that would be split by it, so no ≤-window match is ever divided
    /// between two releases.
    pub fn take_ready(&mut self, snapshot: &Snapshot) -> Option<String> {
        let carry_chars = self.carry.chars().count();
        if carry_chars <= self.window_chars {
            return None;
        }
        let keep_from = carry_chars - self.window_chars;
        let desired = self
            .carry
            .char_indices()
            .nth(keep_from)
            .map(|(i, _)| i)
            .unwrap_or(self.carry.len());

        let cut = snapshot.safe_cut(&self.carry, RuleStage::Post, desired);
        if cut == 0 {
            return None;
        }
        let head = self.carry[..cut].to_string();
        self.carry = self.carry[cut..].to_string();
        Some(head)
    }

    /// Absorb whatever is still pending and hand back the entire carry.
    /// Used at end of source, where no trailing context is needed anymore.
    pub fn drain_all(&mut self) -> String {
        self.absorb();
        std::mem::take(&mut self.carry)
    }

    /// Record text that was actually emitted to the client
    pub fn note_emitted(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.last_emission_ended_with_space = text.ends_with(' ');
        self.trailing_window.push_str(text);
        let window_len = self.trailing_window.chars().count();
        if window_len > self.window_chars {
            let cut = self
                .trailing_window
                .char_indices()
                .nth(window_len - self.window_chars)
                .map(|(i, _)| i)
                .unwrap_or(0);
            self.trailing_window = self.trailing_window[cut..].to_string();
        }
    }

    /// The last `window_chars` characters emitted so far
    pub fn trailing_window(&self) -> &str {
        &self.trailing_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiguard_policy::{Engine, RuleAction, RuleSpec, StaticSource};

    fn config(buffer_tokens: usize, window_chars: usize) -> GuardConfig {
        GuardConfig {
            buffer_tokens,
            window_chars,
            ..GuardConfig::default()
        }
    }

    fn empty_snapshot() -> std::sync::Arc<aiguard_policy::Snapshot> {
        Engine::new(StaticSource::default()).unwrap().snapshot()
    }

    fn block_rule(pattern: &str) -> RuleSpec {
        RuleSpec {
            id: "block".to_string(),
            enabled: true,
            stage: RuleStage::Post,
            pattern: pattern.to_string(),
            case_insensitive: false,
            action: RuleAction::Block,
            priority: 100,
            message: String::new(),
            redact_with: "[REDACTED]".to_string(),
        }
    }

    #[test]
    fn flush_triggers_on_char_budget_or_chunk_count() {
        let mut session = StreamSession::new(&config(3, 10));
        session.push("abcd");
        assert!(!session.should_flush());
        session.push("efgh");
        assert!(!session.should_flush());
        session.push("ij");
        // 10 chars buffered, char budget reached
        assert!(session.should_flush());

        let mut session = StreamSession::new(&config(2, 100));
        session.push("a");
        session.push("b");
        assert!(!session.should_flush());
        session.push("c");
        // chunk count exceeded long before the char budget
        assert!(session.should_flush());
    }

    #[test]
    fn take_ready_retains_the_window() {
        let snapshot = empty_snapshot();
        let mut session = StreamSession::new(&config(1, 4));
        session.push("abcdefghij");
        session.absorb();

        let head = session.take_ready(&snapshot).unwrap();
        assert_eq!(head, "abcdef");
        assert_eq!(session.carry, "ghij");
        // Nothing more without new input
        assert!(session.take_ready(&snapshot).is_none());
    }

    #[test]
    fn take_ready_never_cuts_inside_a_match() {
        let engine = Engine::new(StaticSource::new(vec![block_rule("forbidden")])).unwrap();
        let snapshot = engine.snapshot();

        let mut session = StreamSession::new(&config(1, 4));
        // Window cut would land inside "forbidden"
        session.push("xxforbiddenzz");
        session.absorb();

        let head = session.take_ready(&snapshot).unwrap();
        assert_eq!(head, "xx");
        assert!(session.carry.contains("forbidden"));
    }

    #[test]
    fn flush_cut_spaces_are_deduplicated() {
        let mut session = StreamSession::new(&config(1, 4));
        session.push("hello   ");
        session.absorb();
        session.last_emission_ended_with_space = false;
        assert_eq!(session.carry, "hello ");

        // Simulate a full emission, then a batch starting with whitespace
        let emitted = session.carry.clone();
        session.note_emitted(&emitted);
        session.carry.clear();
        session.push("  world");
        session.absorb();
        assert_eq!(session.carry, "world");
    }

    #[test]
    fn source_spaces_are_preserved() {
        let mut session = StreamSession::new(&config(1, 4));
        session.push("one");
        session.absorb();
        session.push(" two");
        session.absorb();
        assert_eq!(session.carry, "one two");
    }

    #[test]
    fn drain_all_includes_pending_and_carry() {
        let mut session = StreamSession::new(&config(10, 100));
        session.push("Hello ");
        session.absorb();
        session.push(" WORLD");
        assert_eq!(session.drain_all(), "hello world");
        assert_eq!(session.carry, "");
    }

    #[test]
    fn trailing_window_is_capped() {
        let mut session = StreamSession::new(&config(1, 4));
        session.note_emitted("abcdefgh");
        assert_eq!(session.trailing_window(), "efgh");
        session.note_emitted("ij");
        assert_eq!(session.trailing_window(), "ghij");
    }

    #[test]
    fn config_validation() {
        assert!(GuardConfig::default().validate().is_ok());
        let bad = GuardConfig {
            window_chars: 0,
            ..GuardConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
