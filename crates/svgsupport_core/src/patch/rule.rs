//! Ordered text substitution rules.

use super::{PatchError, PatchResult};
use regex::Regex;
use std::fmt::{Debug, Formatter};

type Matcher = Box<dyn Fn(&str) -> bool + Send + Sync>;
type Transform = Box<dyn Fn(&str) -> String + Send + Sync>;

/// One substitution applied to a host routine's source.
///
/// Rules are immutable once built and applied in declaration order; each
/// sees the output of the rule before it.
pub enum PatchRule {
    /// Replaces every occurrence of `find` with `replace`.
    Literal { find: String, replace: String },
    /// Replaces every regex match; `replace` may use `$1`/`${name}` groups.
    Pattern { regex: Regex, replace: String },
    /// Runs `transform` over the whole source when `matcher` accepts it.
    Custom {
        name: String,
        matcher: Matcher,
        transform: Transform,
    },
}

impl PatchRule {
    pub fn literal(find: impl Into<String>, replace: impl Into<String>) -> PatchResult<Self> {
        let find = find.into();
        if find.is_empty() {
            return Err(PatchError::InvalidRule(
                "literal rule needs non-empty match text".to_string(),
            ));
        }
        Ok(Self::Literal {
            find,
            replace: replace.into(),
        })
    }

    pub fn pattern(expression: &str, replace: impl Into<String>) -> PatchResult<Self> {
        let regex = Regex::new(expression)
            .map_err(|err| PatchError::InvalidRule(format!("bad pattern `{expression}`: {err}")))?;
        Ok(Self::Pattern {
            regex,
            replace: replace.into(),
        })
    }

    pub fn custom(
        name: impl Into<String>,
        matcher: impl Fn(&str) -> bool + Send + Sync + 'static,
        transform: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        Self::Custom {
            name: name.into(),
            matcher: Box::new(matcher),
            transform: Box::new(transform),
        }
    }

    /// Short label used in logs and reports.
    pub fn describe(&self) -> String {
        match self {
            Self::Literal { find, .. } => format!("literal:{}", crate::logging::single_line(find, 48)),
            Self::Pattern { regex, .. } => format!("pattern:{}", regex.as_str()),
            Self::Custom { name, .. } => format!("custom:{name}"),
        }
    }

    pub fn apply(&self, source: &str) -> RuleApplication {
        match self {
            Self::Literal { find, replace } => {
                let matches = source.matches(find.as_str()).count();
                if matches == 0 {
                    return RuleApplication::unchanged(source);
                }
                RuleApplication {
                    text: source.replace(find.as_str(), replace),
                    matches,
                }
            }
            Self::Pattern { regex, replace } => {
                let matches = regex.find_iter(source).count();
                if matches == 0 {
                    return RuleApplication::unchanged(source);
                }
                RuleApplication {
                    text: regex.replace_all(source, replace.as_str()).into_owned(),
                    matches,
                }
            }
            Self::Custom {
                matcher, transform, ..
            } => {
                if !matcher(source) {
                    return RuleApplication::unchanged(source);
                }
                RuleApplication {
                    text: transform(source),
                    matches: 1,
                }
            }
        }
    }
}

impl Debug for PatchRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal { find, replace } => f
                .debug_struct("Literal")
                .field("find", find)
                .field("replace", replace)
                .finish(),
            Self::Pattern { regex, replace } => f
                .debug_struct("Pattern")
                .field("regex", &regex.as_str())
                .field("replace", replace)
                .finish(),
            Self::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}

/// Output of a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleApplication {
    pub text: String,
    pub matches: usize,
}

impl RuleApplication {
    fn unchanged(source: &str) -> Self {
        Self {
            text: source.to_string(),
            matches: 0,
        }
    }
}

/// Source after every rule ran, with the per-rule bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedSource {
    pub text: String,
    /// Labels of rules that matched at least once.
    pub applied: Vec<String>,
    /// Labels of rules that matched nothing.
    pub unmatched: Vec<String>,
}

/// Applies `rules` in order. Unmatched rules leave the text untouched.
pub fn apply_rules(source: &str, rules: &[PatchRule]) -> PatchedSource {
    let mut text = source.to_string();
    let mut applied = Vec::new();
    let mut unmatched = Vec::new();

    for rule in rules {
        let outcome = rule.apply(&text);
        if outcome.matches == 0 {
            unmatched.push(rule.describe());
            continue;
        }
        applied.push(rule.describe());
        text = outcome.text;
    }

    PatchedSource {
        text,
        applied,
        unmatched,
    }
}
