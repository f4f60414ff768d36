//! Content gate for the protected vector-image format.
//!
//! # Responsibility
//! - Decide whether an upload is the protected format (name suffix AND
//!   sniffed media type).
//! - Neutralize protected uploads in place before the host stores them.
//! - Report fixed image metadata for protected files so host introspection
//!   never hits a binary-image parser.
//!
//! # Invariants
//! - Only [`sanitize::sanitize_in_place`] mutates an upload; everything else
//!   here is read-only.
//! - Sanitizer failure rejects the upload; uncleaned bytes never pass through.
//! - The gate keeps no state between calls.

use crate::config::SupportConfig;
use crate::language::Translator;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod detect;
pub mod markup;
pub mod metadata;
pub mod sanitize;
pub mod sniff;
pub mod upload;

pub use detect::{DetectionResult, DetectionSite, Detector};
pub use markup::MarkupError;
pub use metadata::{
    HeaderImageInfo, ImageInfo, ImageInfoProvider, ImageInfoSource, LegacySize, SvgAwareImageInfo,
    IMAGE_TYPE_UNKNOWN,
};
pub use sanitize::{sanitize_in_place, sanitize_upload, Sanitizer, SvgSanitizer};
pub use sniff::{classify, MarkupSniffer, MediaSniffer};
pub use upload::{
    image_extensions_pipe, AcceptAll, MessageLevel, MessageQueue, MessageSink, SvgUploadGate,
    UploadValidator, ERR_INVALID_FILE, ERR_UPLOAD_DISAPPEARED, ERR_UPLOAD_NOT_SAVED,
};

pub type GateResult<T> = Result<T, GateError>;

/// Gate-time failures. All of them surface as a rejected upload.
#[derive(Debug)]
pub enum GateError {
    /// The temp upload disappeared between detection and sanitization.
    SourceVanished {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The sanitizer refused the content outright.
    InvalidContent(String),
    /// Cleaned bytes could not replace the temp file.
    WriteBack {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl GateError {
    /// Language key of the user-facing reject message.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::SourceVanished { .. } => ERR_UPLOAD_DISAPPEARED,
            Self::InvalidContent(_) => ERR_INVALID_FILE,
            Self::WriteBack { .. } => ERR_UPLOAD_NOT_SAVED,
        }
    }
}

impl Display for GateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceVanished { path, source } => {
                write!(f, "upload vanished at `{}`: {source}", path.display())
            }
            Self::InvalidContent(reason) => write!(f, "content rejected by sanitizer: {reason}"),
            Self::WriteBack { path, source } => {
                write!(f, "cannot write sanitized upload `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for GateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SourceVanished { source, .. } | Self::WriteBack { source, .. } => Some(source),
            Self::InvalidContent(_) => None,
        }
    }
}

impl From<MarkupError> for GateError {
    fn from(value: MarkupError) -> Self {
        Self::InvalidContent(value.to_string())
    }
}

/// An upload as handed over by the host pipeline.
///
/// The gate borrows it for one call and keeps nothing afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Name the uploader asked for, e.g. `logo.svg`.
    pub declared_name: String,
    /// Unique temp location the host wrote the bytes to.
    pub temp_path: PathBuf,
}

impl UploadedFile {
    pub fn new(declared_name: impl Into<String>, temp_path: impl Into<PathBuf>) -> Self {
        Self {
            declared_name: declared_name.into(),
            temp_path: temp_path.into(),
        }
    }

    /// Current bytes at the temp location.
    pub fn bytes(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.temp_path)
    }
}

/// Either the cleaned bytes (already written back) or the reason for refusal.
#[derive(Debug)]
pub enum SanitizationOutcome {
    Clean(Vec<u8>),
    Rejected(GateError),
}

impl SanitizationOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean(_))
    }
}

/// Entry points patched host routines call into.
#[derive(Clone)]
pub struct ContentGate {
    detector: Arc<Detector>,
    sanitizer: Arc<dyn Sanitizer>,
    config: Arc<SupportConfig>,
}

impl ContentGate {
    /// Builds a gate with the built-in sniffer and sanitizer.
    pub fn new(config: SupportConfig) -> Self {
        let sanitizer = Arc::new(SvgSanitizer::new(config.sanitizer.clone()));
        let detector = Arc::new(Detector::with_default_sniffer(&config));
        Self::with_parts(config, detector, sanitizer)
    }

    pub fn with_parts(
        config: SupportConfig,
        detector: Arc<Detector>,
        sanitizer: Arc<dyn Sanitizer>,
    ) -> Self {
        Self {
            detector,
            sanitizer,
            config: Arc::new(config),
        }
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn detect(&self, declared_name: &str, temp_path: &Path) -> DetectionResult {
        self.detector.detect(declared_name, temp_path)
    }

    /// Sanitizes `file` in place. Callers only invoke this after a positive
    /// [`ContentGate::detect`].
    pub fn sanitize(&self, file: &UploadedFile) -> SanitizationOutcome {
        sanitize_upload(file, self.sanitizer.as_ref())
    }

    /// Wraps a native introspection routine with synthesized metadata.
    pub fn image_info_provider<P: ImageInfoProvider>(&self, native: P) -> SvgAwareImageInfo<P> {
        SvgAwareImageInfo::new(native, self.detector.clone(), self.config.metadata.clone())
    }

    /// Wraps a host upload validator with detection and sanitization.
    pub fn upload_gate<V: UploadValidator, T: Translator>(
        &self,
        inner: V,
        translator: T,
    ) -> SvgUploadGate<V, T> {
        SvgUploadGate::new(inner, self.detector.clone(), self.sanitizer.clone(), translator)
    }
}

impl std::fmt::Debug for ContentGate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentGate")
            .field("detector", &self.detector)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
