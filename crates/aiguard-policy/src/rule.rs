//! Rule definitions and single-rule apply semantics

use aiguard_core::Error;
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Fixed marker substituted for `block` rule matches in mask mode.
///
/// Deliberately distinct from a rule's `redact_with`: masking an advisory
/// block is not the same as a configured redaction.
pub const BLOCK_MARKER: &str = "[BLOCKED]";

/// Whether a rule inspects the inbound prompt or the generated output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStage {
    #[default]
    Pre,
    Post,
}

/// Effect of a rule on matched text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Abort the session (truncate mode) or mask the match (mask mode)
    Block,
    /// Replace the match with the rule's `redact_with` text
    Redact,
    /// Log the match, leave the text unchanged
    Flag,
}

/// How `block` rules behave across a whole session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Replace block matches with [`BLOCK_MARKER`] and keep going
    Mask,
    /// Terminate on the first block match
    Truncate,
}

/// A rule record as it appears in a policy file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Rule identifier
    pub id: String,

    /// Whether this rule participates in matching
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Stage this rule applies to
    #[serde(default)]
    pub stage: RuleStage,

    /// Regular expression to match
    pub pattern: String,

    /// Case-insensitive matching
    #[serde(default)]
    pub case_insensitive: bool,

    /// Effect on a match
    pub action: RuleAction,

    /// Pipeline position; lower numbers run first
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Human-readable reason, carried into audit logs
    #[serde(default)]
    pub message: String,

    /// Replacement text for `redact` rules
    #[serde(default = "default_redaction")]
    pub redact_with: String,
}

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    100
}

fn default_redaction() -> String {
    "[REDACTED]".to_string()
}

/// A blocking rule match that terminates the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// The rule that matched
    pub rule_id: String,

    /// The matched substring
    pub matched_text: String,
}

/// A compiled rule: the record plus its ready-to-run matcher
#[derive(Debug, Clone)]
pub struct Rule {
    spec: RuleSpec,
    regex: Regex,
}

impl Rule {
    /// Compile a rule record. Fails when the pattern is not a valid regex.
    pub fn compile(spec: RuleSpec) -> aiguard_core::Result<Self> {
        let pattern = if spec.case_insensitive {
            format!("(?i){}", spec.pattern)
        } else {
            spec.pattern.clone()
        };
        let regex = Regex::new(&pattern).map_err(|e| {
            Error::policy(format!("rule '{}': invalid pattern: {}", spec.id, e))
        })?;
        Ok(Self { spec, regex })
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn enabled(&self) -> bool {
        self.spec.enabled
    }

    pub fn stage(&self) -> RuleStage {
        self.spec.stage
    }

    pub fn priority(&self) -> i32 {
        self.spec.priority
    }

    /// The underlying record, as loaded
    pub fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    /// Byte ranges of every match in `text`, in order
    pub fn match_ranges(&self, text: &str) -> Vec<(usize, usize)> {
        self.regex.find_iter(text).map(|m| (m.start(), m.end())).collect()
    }

    /// Apply this rule to `text`.
    ///
    /// Returns the (possibly rewritten) text, or a [`Violation`] when the
    /// rule is `block` and the mode is [`FilterMode::Truncate`]. A disabled
    /// rule is a no-op pass-through.
    pub fn apply(&self, text: &str, mode: FilterMode) -> Result<String, Violation> {
        if !self.spec.enabled || !self.regex.is_match(text) {
            return Ok(text.to_string());
        }

        match self.spec.action {
            RuleAction::Block => match mode {
                FilterMode::Truncate => {
                    // First match wins; the caller discards the whole flush.
                    let Some(m) = self.regex.find(text) else {
                        return Ok(text.to_string());
                    };
                    info!(
                        rule = %self.spec.id,
                        matched = %m.as_str(),
                        message = %self.spec.message,
                        "block rule matched, truncating"
                    );
                    Err(Violation {
                        rule_id: self.spec.id.clone(),
                        matched_text: m.as_str().to_string(),
                    })
                }
                FilterMode::Mask => {
                    for m in self.regex.find_iter(text) {
                        info!(
                            rule = %self.spec.id,
                            matched = %m.as_str(),
                            replaced = BLOCK_MARKER,
                            message = %self.spec.message,
                            "block rule matched, masking"
                        );
                    }
                    Ok(self.regex.replace_all(text, NoExpand(BLOCK_MARKER)).into_owned())
                }
            },
            RuleAction::Redact => {
                for m in self.regex.find_iter(text) {
                    info!(
                        rule = %self.spec.id,
                        matched = %m.as_str(),
                        replaced = %self.spec.redact_with,
                        message = %self.spec.message,
                        "redact rule matched"
                    );
                }
                Ok(self
                    .regex
                    .replace_all(text, NoExpand(&self.spec.redact_with))
                    .into_owned())
            }
            RuleAction::Flag => {
                for m in self.regex.find_iter(text) {
                    info!(
                        rule = %self.spec.id,
                        matched = %m.as_str(),
                        message = %self.spec.message,
                        "flag rule matched"
                    );
                }
                Ok(text.to_string())
            }
        }
    }
}
