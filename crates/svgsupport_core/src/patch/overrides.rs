//! Best-effort overrides of host option lists.
//!
//! Some host behavior is driven by already-loaded configuration rather than
//! source, so it is adjusted through the host's option store: read the
//! comma-delimited value, append the missing tokens, write it back.

use log::{info, warn};

/// Host configuration store seam, keyed by component name.
pub trait ConfigStore {
    fn has_component(&self, component: &str) -> bool;
    fn get(&self, component: &str, key: &str) -> Option<String>;
    fn set(&mut self, component: &str, key: &str, value: &str) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideSkip {
    ComponentMissing,
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideOutcome {
    /// Tokens that were appended.
    Applied(Vec<String>),
    Skipped(OverrideSkip),
    Failed(String),
}

/// Tokens to append to one delimited option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionOverride {
    pub component: String,
    pub key: String,
    pub tokens: Vec<String>,
    /// Host default used when the option is unset.
    pub fallback: String,
}

impl OptionOverride {
    pub fn new(
        component: impl Into<String>,
        key: impl Into<String>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            key: key.into(),
            tokens: Vec::new(),
            fallback: fallback.into(),
        }
    }

    pub fn with_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(tokens.into_iter().map(Into::into));
        self
    }

    pub fn apply(&self, store: &mut dyn ConfigStore) -> OverrideOutcome {
        if !store.has_component(&self.component) {
            return OverrideOutcome::Skipped(OverrideSkip::ComponentMissing);
        }

        let current = store
            .get(&self.component, &self.key)
            .unwrap_or_else(|| self.fallback.clone());
        let (value, added) = append_tokens(&current, &self.tokens);
        if added.is_empty() {
            return OverrideOutcome::Skipped(OverrideSkip::AlreadyPresent);
        }

        match store.set(&self.component, &self.key, &value) {
            Ok(()) => OverrideOutcome::Applied(added),
            Err(message) => OverrideOutcome::Failed(message),
        }
    }
}

/// Appends each token missing from the comma-delimited `list`.
///
/// Comparison is exact and case-sensitive. Returns the new list and the tokens
/// that were added, in order.
pub fn append_tokens(list: &str, tokens: &[String]) -> (String, Vec<String>) {
    let mut present: Vec<&str> = list
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect();
    let mut added = Vec::new();

    for token in tokens {
        let token = token.trim();
        if token.is_empty() || present.contains(&token) {
            continue;
        }
        present.push(token);
        added.push(token.to_string());
    }

    if added.is_empty() {
        return (list.to_string(), added);
    }

    let base = list.trim().trim_end_matches(',');
    let value = if base.is_empty() {
        added.join(",")
    } else {
        format!("{base},{}", added.join(","))
    };
    (value, added)
}

/// Overrides that let the media component accept the protected format.
pub fn media_option_overrides(component: &str) -> Vec<OptionOverride> {
    vec![
        OptionOverride::new(
            component,
            "upload_extensions",
            "bmp,csv,doc,gif,ico,jpg,jpeg,odg,odp,ods,odt,pdf,png,ppt,txt,xcf,xls,BMP,CSV,DOC,GIF,ICO,JPG,JPEG,ODG,ODP,ODS,ODT,PDF,PNG,PPT,TXT,XCF,XLS",
        )
        .with_tokens(["SVG", "svg"]),
        OptionOverride::new(component, "image_extensions", "bmp,gif,jpg,png").with_tokens(["svg"]),
        OptionOverride::new(
            component,
            "upload_mime",
            "image/jpeg,image/gif,image/png,image/bmp,application/msword,application/excel,application/pdf,application/powerpoint,text/plain,application/x-zip",
        )
        .with_tokens([crate::config::SVG_MEDIA_TYPE, crate::config::SVG_LEGACY_MEDIA_TYPE]),
    ]
}

/// Applies every override, logging each outcome. Never fails.
pub fn apply_overrides(
    store: &mut dyn ConfigStore,
    overrides: &[OptionOverride],
) -> Vec<(String, OverrideOutcome)> {
    overrides
        .iter()
        .map(|item| {
            let outcome = item.apply(store);
            match &outcome {
                OverrideOutcome::Applied(added) => info!(
                    "event=option_override module=patch status=ok component={} key={} added={}",
                    item.component,
                    item.key,
                    added.join(",")
                ),
                OverrideOutcome::Skipped(reason) => info!(
                    "event=option_override module=patch status=skip component={} key={} reason={:?}",
                    item.component, item.key, reason
                ),
                OverrideOutcome::Failed(message) => warn!(
                    "event=option_override module=patch status=warn component={} key={} error={}",
                    item.component,
                    item.key,
                    crate::logging::single_line(message, 160)
                ),
            }
            (item.key.clone(), outcome)
        })
        .collect()
}
