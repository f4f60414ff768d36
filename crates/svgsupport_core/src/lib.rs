//! SVG support for a host CMS that only knows raster images.
//! Patches host routines at boot and gates uploads of the vector format.

pub mod config;
pub mod gate;
pub mod language;
pub mod logging;
pub mod patch;
pub mod plugin;

pub use config::{ConfigError, SupportConfig};
pub use gate::{
    ContentGate, DetectionResult, Detector, GateError, ImageInfo, ImageInfoProvider,
    SanitizationOutcome, UploadedFile,
};
pub use language::{LanguageCatalog, LanguageError, Translator};
pub use logging::{default_log_level, init_logging, logging_status};
pub use patch::{
    InstallReport, ModuleHost, PatchError, PatchLoader, PatchRule, PatchTarget, TargetOutcome,
};
pub use plugin::{BootReport, SvgSupportPlugin};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
