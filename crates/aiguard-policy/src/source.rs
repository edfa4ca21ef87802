//! Rule sources: where rule records come from

use crate::rule::RuleSpec;
use aiguard_core::Result;
use parking_lot::RwLock;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// A provider of rule records for the engine.
///
/// Loading is pulled by [`Engine::refresh`](crate::Engine::refresh); a source
/// returns the full rule list on every call.
pub trait RuleSource: Send + Sync {
    fn load(&self) -> Result<Vec<RuleSpec>>;
}

impl<T: RuleSource + ?Sized> RuleSource for Arc<T> {
    fn load(&self) -> Result<Vec<RuleSpec>> {
        (**self).load()
    }
}

/// Loads rule lists from every `*.yaml`/`*.yml` file in a directory.
///
/// Files are read in sorted filename order so that rule definition order,
/// and therefore priority tie-breaking, is deterministic. A file that fails
/// to parse is logged and skipped; one broken file must not take down the
/// whole rule set.
pub struct YamlDirSource {
    dir: PathBuf,
}

impl YamlDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl RuleSource for YamlDirSource {
    fn load(&self) -> Result<Vec<RuleSpec>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        files.sort();

        let mut specs = Vec::new();
        for path in files {
            let content = fs::read_to_string(&path)?;
            match serde_yaml::from_str::<Vec<RuleSpec>>(&content) {
                Ok(mut list) => specs.append(&mut list),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unparseable policy file");
                }
            }
        }
        Ok(specs)
    }
}

/// In-memory rule source, replaceable at runtime.
///
/// Shared as `Arc<StaticSource>` so callers can swap the rule list and then
/// trigger an engine refresh; used by tests and embedded setups.
#[derive(Default)]
pub struct StaticSource {
    rules: RwLock<Vec<RuleSpec>>,
}

impl StaticSource {
    pub fn new(rules: Vec<RuleSpec>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// Replace the rule list; takes effect on the next engine refresh
    pub fn set(&self, rules: Vec<RuleSpec>) {
        *self.rules.write() = rules;
    }

    /// Append a single rule record
    pub fn push(&self, rule: RuleSpec) {
        self.rules.write().push(rule);
    }
}

impl RuleSource for StaticSource {
    fn load(&self) -> Result<Vec<RuleSpec>> {
        Ok(self.rules.read().clone())
    }
}
