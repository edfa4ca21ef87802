//! Versioned rule engine with atomic hot reload

use crate::rule::{FilterMode, Rule, RuleSpec, RuleStage, Violation};
use crate::source::RuleSource;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// An immutable, fully-loaded, priority-ordered rule set.
///
/// Once published a snapshot never changes; every `apply` call runs against
/// exactly one snapshot from start to finish.
#[derive(Debug)]
pub struct Snapshot {
    /// Monotonically increasing, starts at 1
    pub revision: u64,

    /// When this snapshot was built
    pub loaded_at: DateTime<Utc>,

    rules: Vec<Rule>,
}

impl Snapshot {
    /// Compile rule records into a snapshot.
    ///
    /// A record whose pattern does not compile is logged and excluded; the
    /// remaining rules still load (fail-soft). Rules are stably sorted by
    /// ascending priority, so records with equal priority keep their
    /// definition order.
    fn build(revision: u64, specs: Vec<RuleSpec>) -> Self {
        let mut rules: Vec<Rule> = specs
            .into_iter()
            .filter_map(|spec| {
                let id = spec.id.clone();
                match Rule::compile(spec) {
                    Ok(rule) => Some(rule),
                    Err(e) => {
                        warn!(rule = %id, error = %e, "excluding rule that failed to compile");
                        None
                    }
                }
            })
            .collect();
        rules.sort_by_key(Rule::priority);

        Self {
            revision,
            loaded_at: Utc::now(),
            rules,
        }
    }

    /// All rules in pipeline order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    fn stage_rules(&self, stage: RuleStage) -> impl Iterator<Item = &Rule> {
        self.rules
            .iter()
            .filter(move |r| r.enabled() && r.stage() == stage)
    }

    /// Run the stage-matching rules over `text` as a linear pipeline: each
    /// rule sees the previous rule's output. The first [`Violation`]
    /// short-circuits the pipeline.
    pub fn apply(
        &self,
        text: &str,
        stage: RuleStage,
        mode: FilterMode,
    ) -> Result<String, Violation> {
        let mut result = text.to_string();
        for rule in self.stage_rules(stage) {
            result = rule.apply(&result, mode)?;
        }
        Ok(result)
    }

    /// Largest cut position `<= desired` that no stage-matching rule match
    /// spans.
    ///
    /// The stream buffer uses this to pick emission boundaries: text before
    /// the cut can be filtered and released, text after it stays buffered,
    /// and no match is ever split across the two. `desired` must lie on a
    /// char boundary of `text`; the returned position does too, since match
    /// starts are char boundaries.
    pub fn safe_cut(&self, text: &str, stage: RuleStage, desired: usize) -> usize {
        let mut cut = desired.min(text.len());
        loop {
            let mut moved = false;
            for rule in self.stage_rules(stage) {
                for (start, end) in rule.match_ranges(text) {
                    if start >= cut {
                        break;
                    }
                    if end > cut {
                        cut = start;
                        moved = true;
                    }
                }
            }
            if !moved {
                return cut;
            }
        }
    }
}

/// Read-only view of the current snapshot for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveRules {
    pub revision: u64,
    pub loaded_at: DateTime<Utc>,
    /// Enabled rules only, in pipeline order
    pub rules: Vec<RuleSpec>,
}

/// The rule engine: a rule source plus the currently published snapshot.
///
/// Arbitrarily many sessions read the snapshot concurrently; `refresh` is
/// the only writer and publishes by replacement, so readers never observe a
/// half-built rule list. Concurrent refreshes are last-writer-wins with
/// strictly increasing revisions.
pub struct Engine {
    source: Box<dyn RuleSource>,
    current: RwLock<Arc<Snapshot>>,
}

impl Engine {
    /// Build an engine, performing the initial load (revision 1)
    pub fn new<S: RuleSource + 'static>(source: S) -> aiguard_core::Result<Self> {
        let specs = source.load()?;
        let snapshot = Arc::new(Snapshot::build(1, specs));
        info!(revision = snapshot.revision, rules = snapshot.rules.len(), "rule engine loaded");
        Ok(Self {
            source: Box::new(source),
            current: RwLock::new(snapshot),
        })
    }

    /// Capture the current snapshot.
    ///
    /// Callers that make several correlated calls (a flush's cut scan plus
    /// its apply) should capture once and reuse the `Arc` so a concurrent
    /// reload cannot slip in between.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Apply the current snapshot's stage pipeline to `text`
    pub fn apply(
        &self,
        text: &str,
        stage: RuleStage,
        mode: FilterMode,
    ) -> Result<String, Violation> {
        self.snapshot().apply(text, stage, mode)
    }

    /// Rebuild the rule list from the source and atomically publish it.
    ///
    /// In-flight `apply` calls keep the snapshot they captured. Returns the
    /// new revision. On a source error the old snapshot stays published.
    ///
    /// The revision is read and bumped under the write lock, so concurrent
    /// refreshes serialize and each publishes a distinct revision.
    pub fn refresh(&self) -> aiguard_core::Result<u64> {
        let specs = self.source.load()?;
        let mut current = self.current.write();
        let next = Arc::new(Snapshot::build(current.revision + 1, specs));
        let revision = next.revision;
        let count = next.rules.len();
        *current = next;
        drop(current);
        info!(revision, rules = count, "rule engine reloaded");
        Ok(revision)
    }

    /// Enabled rules of the current snapshot, in pipeline order
    pub fn effective(&self) -> EffectiveRules {
        let snapshot = self.snapshot();
        EffectiveRules {
            revision: snapshot.revision,
            loaded_at: snapshot.loaded_at,
            rules: snapshot
                .rules
                .iter()
                .filter(|r| r.enabled())
                .map(|r| r.spec().clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleAction;
    use crate::source::StaticSource;

    fn spec(id: &str, pattern: &str, action: RuleAction, priority: i32) -> RuleSpec {
        RuleSpec {
            id: id.to_string(),
            enabled: true,
            stage: RuleStage::Post,
            pattern: pattern.to_string(),
            case_insensitive: false,
            action,
            priority,
            message: String::new(),
            redact_with: "[REDACTED]".to_string(),
        }
    }

    #[test]
    fn pipeline_runs_in_ascending_priority_order() {
        // The high-priority (lower number) rule rewrites "alpha" to
        // "[REDACTED]"; the later rule then matches the redacted text,
        // proving it sees the earlier rule's output.
        let mut early = spec("early", "alpha", RuleAction::Redact, 10);
        early.redact_with = "beta".to_string();
        let late = spec("late", "beta", RuleAction::Redact, 20);

        let engine = Engine::new(StaticSource::new(vec![late.clone(), early])).unwrap();
        let out = engine
            .apply("alpha", RuleStage::Post, FilterMode::Mask)
            .unwrap();
        assert_eq!(out, "[REDACTED]");
    }

    #[test]
    fn equal_priority_keeps_definition_order() {
        let mut first = spec("first", "x", RuleAction::Redact, 50);
        first.redact_with = "y".to_string();
        let mut second = spec("second", "y", RuleAction::Redact, 50);
        second.redact_with = "z".to_string();

        let engine = Engine::new(StaticSource::new(vec![first, second])).unwrap();
        let out = engine.apply("x", RuleStage::Post, FilterMode::Mask).unwrap();
        assert_eq!(out, "z");
    }

    #[test]
    fn stage_mismatch_is_skipped() {
        let mut pre = spec("gate", "blocked", RuleAction::Block, 10);
        pre.stage = RuleStage::Pre;

        let engine = Engine::new(StaticSource::new(vec![pre])).unwrap();
        // Post-stage apply must not see the pre rule
        let out = engine
            .apply("blocked", RuleStage::Post, FilterMode::Truncate)
            .unwrap();
        assert_eq!(out, "blocked");
        // Pre-stage apply does
        assert!(engine
            .apply("blocked", RuleStage::Pre, FilterMode::Truncate)
            .is_err());
    }

    #[test]
    fn violation_aborts_pipeline() {
        let block = spec("block", "bad", RuleAction::Block, 10);
        let redact = spec("later", "bad", RuleAction::Redact, 20);

        let engine = Engine::new(StaticSource::new(vec![block, redact])).unwrap();
        let violation = engine
            .apply("bad text", RuleStage::Post, FilterMode::Truncate)
            .unwrap_err();
        assert_eq!(violation.rule_id, "block");
        assert_eq!(violation.matched_text, "bad");
    }

    #[test]
    fn fail_soft_loading_keeps_valid_rules() {
        let rules = vec![
            spec("good1", "one", RuleAction::Flag, 10),
            spec("broken", "([unclosed", RuleAction::Flag, 20),
            spec("good2", "two", RuleAction::Flag, 30),
        ];
        let engine = Engine::new(StaticSource::new(rules)).unwrap();
        let effective = engine.effective();
        let ids: Vec<&str> = effective.rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["good1", "good2"]);
    }

    #[test]
    fn refresh_increments_revision_by_one() {
        let source = Arc::new(StaticSource::new(vec![]));
        let engine = Engine::new(source.clone()).unwrap();
        assert_eq!(engine.snapshot().revision, 1);

        source.set(vec![spec("added", "hello", RuleAction::Block, 10)]);
        let revision = engine.refresh().unwrap();
        assert_eq!(revision, 2);
        assert_eq!(engine.effective().revision, 2);
        assert!(engine
            .apply("hello", RuleStage::Post, FilterMode::Truncate)
            .is_err());
    }

    #[test]
    fn concurrent_refreshes_publish_strictly_increasing_revisions() {
        let engine = Arc::new(Engine::new(StaticSource::default()).unwrap());
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    engine.refresh().unwrap()
                })
            })
            .collect();
        let mut revisions: Vec<u64> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        revisions.sort_unstable();

        // Both reloads succeed and neither reuses a revision number.
        assert_eq!(revisions, vec![2, 3]);
        assert_eq!(engine.snapshot().revision, 3);
    }

    #[test]
    fn in_flight_snapshot_is_unaffected_by_refresh() {
        let source = Arc::new(StaticSource::new(vec![spec(
            "old",
            "old",
            RuleAction::Redact,
            10,
        )]));
        let engine = Engine::new(source.clone()).unwrap();

        let captured = engine.snapshot();
        source.set(vec![spec("new", "old", RuleAction::Block, 10)]);
        engine.refresh().unwrap();

        // The captured snapshot still redacts; the published one now blocks.
        assert_eq!(
            captured
                .apply("old", RuleStage::Post, FilterMode::Truncate)
                .unwrap(),
            "[REDACTED]"
        );
        assert!(engine
            .apply("old", RuleStage::Post, FilterMode::Truncate)
            .is_err());
    }

    #[test]
    fn effective_excludes_disabled_rules() {
        let mut off = spec("off", "x", RuleAction::Flag, 10);
        off.enabled = false;
        let on = spec("on", "y", RuleAction::Flag, 20);

        let engine = Engine::new(StaticSource::new(vec![off, on])).unwrap();
        let effective = engine.effective();
        assert_eq!(effective.rules.len(), 1);
        assert_eq!(effective.rules[0].id, "on");
    }

    #[test]
    fn safe_cut_moves_left_of_spanning_match() {
        let engine =
            Engine::new(StaticSource::new(vec![spec("b", "bad", RuleAction::Block, 10)])).unwrap();
        let snapshot = engine.snapshot();

        let text = "aaabadzzz";
        // Desired cut lands inside "bad" (bytes 3..6)
        assert_eq!(snapshot.safe_cut(text, RuleStage::Post, 5), 3);
        // Cut outside any match is untouched
        assert_eq!(snapshot.safe_cut(text, RuleStage::Post, 2), 2);
        assert_eq!(snapshot.safe_cut(text, RuleStage::Post, 7), 7);
    }

    #[test]
    fn safe_cut_iterates_over_chained_matches() {
        // Two overlapping-adjacent matches: moving out of one can land the
        // cut inside another, which must also be escaped.
        let rules = vec![
            spec("one", "cde", RuleAction::Block, 10),
            spec("two", "abc", RuleAction::Block, 20),
        ];
        let engine = Engine::new(StaticSource::new(rules)).unwrap();
        let snapshot = engine.snapshot();

        // "abcdef": desired 4 is inside "cde" (2..5) -> 2, which is inside
        // "abc" (0..3) -> 0.
        assert_eq!(snapshot.safe_cut("abcdef", RuleStage::Post, 4), 0);
    }
}
