//! Drives a generator through the filtering pipeline.
//!
//! One orchestrator serves many concurrent sessions; each call owns its own
//! [`StreamSession`] and captures engine snapshots as it goes, so a rule
//! reload mid-stream never exposes a half-built rule list.

use crate::generator::TextGenerator;
use crate::session::{GuardConfig, StreamSession};
use aiguard_core::{normalize, Completion, FinishReason, Result, StreamEvent};
use aiguard_policy::{Engine, RuleStage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outcome of one release step
enum Release {
    Continue,
    Terminated,
}

pub struct Orchestrator {
    engine: Arc<Engine>,
    config: GuardConfig,
}

impl Orchestrator {
    /// Create an orchestrator, validating the configuration once
    pub fn new(engine: Arc<Engine>, config: GuardConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { engine, config })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Run a filtered streaming session.
    ///
    /// Events are pushed into `tx`: zero or more `Delta`s, one `Finished`,
    /// then `Done`. A closed receiver means the client went away; the
    /// generator is not pulled again and the session ends quietly. Generator
    /// failures propagate as errors without a terminal event — the transport
    /// layer reports those as internal failures, not as content filtering.
    pub async fn stream(
        &self,
        prompt: &str,
        generator: &mut dyn TextGenerator,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        let mode = self.config.mode;

        // Upfront gate: the prompt goes through the pre stage once, before
        // any generation happens.
        let gate = self.engine.snapshot();
        if let Err(violation) = gate.apply(&normalize(prompt), RuleStage::Pre, mode) {
            warn!(rule = %violation.rule_id, "prompt rejected by pre-stage gate");
            let _ = tx.send(StreamEvent::finished(FinishReason::ContentFilter)).await;
            let _ = tx.send(StreamEvent::Done).await;
            return Ok(());
        }

        let mut session = StreamSession::new(&self.config);
        loop {
            if tx.is_closed() {
                debug!("consumer gone, stopping generator");
                return Ok(());
            }
            let Some(chunk) = generator.next_chunk().await? else {
                break;
            };
            session.push(&chunk);
            if session.should_flush() {
                session.absorb();
                match self.release(&mut session, tx, false).await {
                    Release::Continue => {}
                    Release::Terminated => return Ok(()),
                }
            }
        }

        // Source exhausted: flush the remainder through the same path.
        match self.release(&mut session, tx, true).await {
            Release::Continue => {
                let _ = tx.send(StreamEvent::finished(FinishReason::Stop)).await;
                let _ = tx.send(StreamEvent::Done).await;
            }
            Release::Terminated => {}
        }
        Ok(())
    }

    /// Filter and emit whatever the session can safely release.
    async fn release(
        &self,
        session: &mut StreamSession,
        tx: &mpsc::Sender<StreamEvent>,
        at_end: bool,
    ) -> Release {
        // One snapshot for both the cut scan and the apply call.
        let snapshot = self.engine.snapshot();
        let head = if at_end {
            session.drain_all()
        } else {
            match session.take_ready(&snapshot) {
                Some(head) => head,
                None => return Release::Continue,
            }
        };
        if head.is_empty() {
            return Release::Continue;
        }

        match snapshot.apply(&head, RuleStage::Post, self.config.mode) {
            Ok(filtered) => {
                if filtered.is_empty() {
                    return Release::Continue;
                }
                session.note_emitted(&filtered);
                if tx.send(StreamEvent::delta(filtered)).await.is_err() {
                    return Release::Terminated;
                }
                Release::Continue
            }
            Err(violation) => {
                // The whole flush is discarded; nothing past the last safe
                // emission reaches the client.
                warn!(
                    rule = %violation.rule_id,
                    matched = %violation.matched_text,
                    "stream terminated by policy violation"
                );
                let _ = tx.send(StreamEvent::finished(FinishReason::ContentFilter)).await;
                let _ = tx.send(StreamEvent::Done).await;
                Release::Terminated
            }
        }
    }

    /// Non-streaming completion: same pipeline, collected into one result.
    pub async fn complete(
        &self,
        prompt: &str,
        generator: &mut dyn TextGenerator,
    ) -> Result<Completion> {
        let (tx, mut rx) = mpsc::channel(16);

        let produce = async {
            let result = self.stream(prompt, generator, &tx).await;
            drop(tx);
            result
        };
        let collect = async {
            let mut content = String::new();
            let mut finish_reason = FinishReason::Stop;
            while let Some(event) = rx.recv().await {
                match event {
                    StreamEvent::Delta { text } => content.push_str(&text),
                    StreamEvent::Finished { reason } => finish_reason = reason,
                    StreamEvent::Done => {}
                }
            }
            Completion::new(content, finish_reason)
        };

        let (result, completion) = tokio::join!(produce, collect);
        result?;
        Ok(completion)
    }
}
