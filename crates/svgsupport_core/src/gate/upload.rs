//! Upload validation middleware.
//!
//! # Responsibility
//! - Sanitize protected uploads before the host's own checks run.
//! - Turn gate failures into a queued user message plus a negative answer.
//!
//! # Invariants
//! - A rejected upload never reaches the inner validator.
//! - Non-protected uploads pass through untouched.

use super::detect::Detector;
use super::sanitize::{sanitize_upload, Sanitizer};
use super::{SanitizationOutcome, UploadedFile};
use crate::language::Translator;
use log::warn;
use std::sync::Arc;

/// Language key shown when the temp upload is gone before sanitization.
pub const ERR_UPLOAD_DISAPPEARED: &str = "SVGSUPPORT_ERR_UPLOAD_DISAPPEARED";
/// Language key shown when the sanitizer refuses the content.
pub const ERR_INVALID_FILE: &str = "SVGSUPPORT_ERR_INVALID_FILE";
/// Language key shown when the cleaned bytes cannot replace the temp file.
pub const ERR_UPLOAD_NOT_SAVED: &str = "SVGSUPPORT_ERR_UPLOAD_NOT_SAVED";

/// Image extensions the host helpers know without configuration.
const DEFAULT_IMAGE_EXTENSIONS: [&str; 7] = ["svg", "webp", "gif", "jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Message,
    Warning,
    Error,
}

impl MessageLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Host queue of user-visible messages.
pub trait MessageSink {
    fn enqueue(&mut self, level: MessageLevel, message: String);
}

/// In-memory [`MessageSink`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQueue {
    messages: Vec<(MessageLevel, String)>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[(MessageLevel, String)] {
        &self.messages
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter(|(level, _)| *level == MessageLevel::Error)
            .map(|(_, message)| message.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl MessageSink for MessageQueue {
    fn enqueue(&mut self, level: MessageLevel, message: String) {
        self.messages.push((level, message));
    }
}

/// Host upload check. `false` rejects the upload.
pub trait UploadValidator {
    fn validate(&self, file: &UploadedFile, messages: &mut dyn MessageSink) -> bool;
}

/// Validator accepting everything; stands in for a host without checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl UploadValidator for AcceptAll {
    fn validate(&self, _file: &UploadedFile, _messages: &mut dyn MessageSink) -> bool {
        true
    }
}

/// Wraps a host validator with detection and in-place sanitization.
pub struct SvgUploadGate<V, T> {
    inner: V,
    detector: Arc<Detector>,
    sanitizer: Arc<dyn Sanitizer>,
    translator: T,
}

impl<V: UploadValidator, T: Translator> SvgUploadGate<V, T> {
    pub fn new(
        inner: V,
        detector: Arc<Detector>,
        sanitizer: Arc<dyn Sanitizer>,
        translator: T,
    ) -> Self {
        Self {
            inner,
            detector,
            sanitizer,
            translator,
        }
    }

    pub fn inner(&self) -> &V {
        &self.inner
    }
}

impl<V: UploadValidator, T: Translator> UploadValidator for SvgUploadGate<V, T> {
    fn validate(&self, file: &UploadedFile, messages: &mut dyn MessageSink) -> bool {
        let detection = self.detector.detect(&file.declared_name, &file.temp_path);
        if detection.is_protected {
            if let SanitizationOutcome::Rejected(err) = sanitize_upload(file, self.sanitizer.as_ref())
            {
                warn!(
                    "event=upload_reject module=gate status=rejected key={}",
                    err.message_key()
                );
                messages.enqueue(
                    MessageLevel::Error,
                    self.translator.translate(err.message_key()),
                );
                return false;
            }
        }
        self.inner.validate(file, messages)
    }
}

/// `|`-joined image extension list for patched host helpers.
///
/// Configured entries come first, followed by the built-in defaults and both
/// spellings of the protected extension. Entries are trimmed; the first
/// occurrence of a duplicate wins.
pub fn image_extensions_pipe(configured: &str) -> String {
    let mut merged: Vec<&str> = Vec::new();
    let candidates = configured
        .split(',')
        .map(str::trim)
        .chain(DEFAULT_IMAGE_EXTENSIONS)
        .chain(["svg", "SVG"]);
    for extension in candidates {
        if !extension.is_empty() && !merged.contains(&extension) {
            merged.push(extension);
        }
    }
    merged.join("|")
}

#[cfg(test)]
mod tests {
    use super::{image_extensions_pipe, MessageLevel, MessageQueue, MessageSink};

    #[test]
    fn pipe_merges_configured_and_default_extensions() {
        assert_eq!(
            image_extensions_pipe("bmp,gif,jpg,jpeg,png,webp"),
            "bmp|gif|jpg|jpeg|png|webp|svg|SVG"
        );
        assert_eq!(
            image_extensions_pipe(" tiff , png,,"),
            "tiff|png|svg|webp|gif|jpg|jpeg|bmp|SVG"
        );
        assert_eq!(image_extensions_pipe(""), "svg|webp|gif|jpg|jpeg|png|bmp|SVG");
    }

    #[test]
    fn queue_keeps_order_and_filters_errors() {
        let mut queue = MessageQueue::new();
        queue.enqueue(MessageLevel::Warning, "w".to_string());
        queue.enqueue(MessageLevel::Error, "e".to_string());
        assert_eq!(queue.messages().len(), 2);
        assert_eq!(queue.errors().collect::<Vec<_>>(), vec!["e"]);
        assert_eq!(MessageLevel::Error.as_str(), "error");
    }
}
