//! Declarative description of one host routine to patch.

use super::{PatchError, PatchResult, PatchRule};
use std::path::PathBuf;

/// What an unreadable source means for the boot sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Reported as a failed target.
    Required,
    /// Logged as a warning and reported as skipped.
    BestEffort,
}

/// One host routine and the rules that rewrite it.
///
/// Built once from a static table at boot and consumed by
/// [`crate::patch::PatchLoader::install_all`]; never mutated afterwards.
#[derive(Debug)]
pub struct PatchTarget {
    /// Stable name used in logs and reports, e.g. `media.helper`.
    pub identifier: String,
    /// Host symbol the routine defines; present means "already loaded".
    pub symbol: String,
    pub source_path: PathBuf,
    pub rules: Vec<PatchRule>,
    pub virtual_key: String,
    pub policy: FailurePolicy,
}

impl PatchTarget {
    pub fn new(
        identifier: impl Into<String>,
        symbol: impl Into<String>,
        source_path: impl Into<PathBuf>,
        virtual_key: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            symbol: symbol.into(),
            source_path: source_path.into(),
            rules: Vec::new(),
            virtual_key: virtual_key.into(),
            policy: FailurePolicy::Required,
        }
    }

    pub fn with_rule(mut self, rule: PatchRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_rules(mut self, rules: impl IntoIterator<Item = PatchRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.policy = FailurePolicy::BestEffort;
        self
    }

    pub fn validate(&self) -> PatchResult<()> {
        if self.identifier.trim().is_empty() {
            return Err(PatchError::InvalidTarget(
                "identifier must not be empty".to_string(),
            ));
        }
        if self.symbol.trim().is_empty() {
            return Err(PatchError::InvalidTarget(format!(
                "`{}` has no host symbol",
                self.identifier
            )));
        }
        if !is_valid_virtual_key(&self.virtual_key) {
            return Err(PatchError::InvalidTarget(format!(
                "`{}` has invalid virtual key `{}`",
                self.identifier, self.virtual_key
            )));
        }
        Ok(())
    }
}

fn is_valid_virtual_key(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
