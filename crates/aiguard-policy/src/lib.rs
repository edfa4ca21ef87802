//! AiGuard Policy Engine
//!
//! Pattern-based safety rules applied to prompts and generated output.
//!
//! Rules are plain records (YAML in the default setup) compiled into an
//! immutable, priority-ordered [`Snapshot`]. The [`Engine`] publishes one
//! snapshot at a time and hot-reloads by building a replacement off to the
//! side and swapping a single reference, so concurrent sessions never see a
//! half-built rule list. Blocking matches surface as [`Violation`] values,
//! not errors.

pub mod engine;
pub mod rule;
pub mod source;

pub use engine::{EffectiveRules, Engine, Snapshot};
pub use rule::{FilterMode, Rule, RuleAction, RuleSpec, RuleStage, Violation, BLOCK_MARKER};
pub use source::{RuleSource, StaticSource, YamlDirSource};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::engine::{EffectiveRules, Engine, Snapshot};
    pub use crate::rule::{FilterMode, Rule, RuleAction, RuleSpec, RuleStage, Violation};
    pub use crate::source::{RuleSource, StaticSource, YamlDirSource};
}
