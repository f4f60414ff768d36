//! Protected-format detection.
//!
//! # Invariants
//! - Upload detection needs both signals: the declared name ends with the
//!   protected suffix AND a sniffer reports an allowed media type.
//! - Without a sniffer, upload detection is negative even when the suffix
//!   matches. Metadata detection trusts the suffix alone in that case.

use super::sniff::{MarkupSniffer, MediaSniffer};
use crate::config::SupportConfig;
use log::debug;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::Arc;

/// Call site a detection was made for; the two differ without a sniffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSite {
    Upload,
    Metadata,
}

impl DetectionSite {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Metadata => "metadata",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionResult {
    pub site: DetectionSite,
    pub suffix_match: bool,
    /// Sniffed media type; only sniffed when the suffix matched.
    pub sniffed: Option<String>,
    pub is_protected: bool,
}

pub struct Detector {
    suffix: String,
    allowed: Vec<String>,
    sniffer: Option<Arc<dyn MediaSniffer>>,
}

impl Detector {
    /// `sniffer = None` models a host without content sniffing.
    pub fn new(config: &SupportConfig, sniffer: Option<Arc<dyn MediaSniffer>>) -> Self {
        Self {
            suffix: config.protected_suffix(),
            allowed: config
                .allowed_media_types
                .iter()
                .map(|media| media.trim().to_ascii_lowercase())
                .filter(|media| !media.is_empty())
                .collect(),
            sniffer,
        }
    }

    pub fn with_default_sniffer(config: &SupportConfig) -> Self {
        Self::new(config, Some(Arc::new(MarkupSniffer)))
    }

    /// Protected extension without the leading dot.
    pub fn protected_extension(&self) -> &str {
        self.suffix.trim_start_matches('.')
    }

    pub fn has_sniffer(&self) -> bool {
        self.sniffer.is_some()
    }

    /// Case-insensitive comparison of the last four characters.
    pub fn has_protected_suffix(&self, name: &str) -> bool {
        let width = self.suffix.chars().count();
        let count = name.chars().count();
        if count < width {
            return false;
        }
        let tail: String = name.chars().skip(count - width).collect();
        tail.to_lowercase() == self.suffix
    }

    pub fn is_allowed_media_type(&self, media: &str) -> bool {
        let media = media.trim().to_ascii_lowercase();
        self.allowed.iter().any(|allowed| *allowed == media)
    }

    /// Detection for the upload sanitization call site.
    pub fn detect(&self, declared_name: &str, temp_path: &Path) -> DetectionResult {
        let suffix_match = self.has_protected_suffix(declared_name);
        let (sniffed, is_protected) = match (&self.sniffer, suffix_match) {
            (Some(sniffer), true) => self.sniff_allowed(sniffer.as_ref(), temp_path),
            _ => (None, false),
        };
        self.finish(DetectionResult {
            site: DetectionSite::Upload,
            suffix_match,
            sniffed,
            is_protected,
        })
    }

    /// Detection for the metadata synthesis call site.
    pub fn detect_for_metadata(&self, path: &Path) -> DetectionResult {
        let suffix_match = self.has_protected_suffix(&path.to_string_lossy());
        let (sniffed, is_protected) = match (&self.sniffer, suffix_match) {
            (Some(sniffer), true) => self.sniff_allowed(sniffer.as_ref(), path),
            (None, true) => (None, true),
            (_, false) => (None, false),
        };
        self.finish(DetectionResult {
            site: DetectionSite::Metadata,
            suffix_match,
            sniffed,
            is_protected,
        })
    }

    fn sniff_allowed(&self, sniffer: &dyn MediaSniffer, path: &Path) -> (Option<String>, bool) {
        let sniffed = sniffer.sniff(path);
        let allowed = sniffed
            .as_deref()
            .is_some_and(|media| self.is_allowed_media_type(media));
        (sniffed, allowed)
    }

    fn finish(&self, result: DetectionResult) -> DetectionResult {
        debug!(
            "event=svg_detect module=gate site={} suffix_match={} sniffer={} sniffed={} protected={}",
            result.site.as_str(),
            result.suffix_match,
            self.has_sniffer(),
            result.sniffed.as_deref().unwrap_or("-"),
            result.is_protected
        );
        result
    }
}

impl Debug for Detector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("suffix", &self.suffix)
            .field("allowed", &self.allowed)
            .field("sniffer", &self.sniffer.is_some())
            .finish()
    }
}
