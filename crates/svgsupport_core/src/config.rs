//! Runtime configuration for the patch loader and the content gate.
//!
//! # Responsibility
//! - Describe every tunable with a working default.
//! - Load overrides from a JSON document and reject unusable values.
//!
//! # Invariants
//! - A default-constructed `SupportConfig` always passes `validate()`.
//! - The protected extension is exactly three ASCII alphanumerics, so the
//!   suffix check can compare the last four characters (`.ext`).

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Canonical media type of the protected format.
pub const SVG_MEDIA_TYPE: &str = "image/svg+xml";
/// Legacy alias some sniffers still report.
pub const SVG_LEGACY_MEDIA_TYPE: &str = "application/svg+xml";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "malformed config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportConfig {
    /// Protected file extension without the leading dot.
    pub protected_extension: String,
    /// Sniffed media types accepted as the protected format.
    pub allowed_media_types: Vec<String>,
    pub sanitizer: SanitizerConfig,
    pub metadata: MetadataConfig,
    pub host: HostConfig,
    /// Image extensions assumed when the host store has none configured.
    pub default_image_extensions: String,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            protected_extension: "svg".to_string(),
            allowed_media_types: vec![
                SVG_MEDIA_TYPE.to_string(),
                SVG_LEGACY_MEDIA_TYPE.to_string(),
            ],
            sanitizer: SanitizerConfig::default(),
            metadata: MetadataConfig::default(),
            host: HostConfig::default(),
            default_image_extensions: "bmp,gif,jpg,jpeg,png,webp".to_string(),
        }
    }
}

impl SupportConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Parses and validates a JSON config document. Missing keys keep defaults.
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let ext = self.protected_extension.as_str();
        if ext.len() != 3 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Invalid(format!(
                "protected_extension must be three ASCII alphanumerics, got `{ext}`"
            )));
        }
        if self
            .allowed_media_types
            .iter()
            .all(|media| media.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "allowed_media_types must name at least one media type".to_string(),
            ));
        }
        if self.sanitizer.max_depth == 0 {
            return Err(ConfigError::Invalid(
                "sanitizer.max_depth must be positive".to_string(),
            ));
        }
        if self.host.virtual_scheme.is_empty()
            || !self
                .host
                .virtual_scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '+' || c == '.')
        {
            return Err(ConfigError::Invalid(format!(
                "host.virtual_scheme is not a valid scheme: `{}`",
                self.host.virtual_scheme
            )));
        }
        Ok(())
    }

    /// The `.ext` suffix compared against declared file names.
    pub fn protected_suffix(&self) -> String {
        format!(".{}", self.protected_extension.to_ascii_lowercase())
    }
}

/// Sanitizer switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Strip references to resources outside the document.
    pub remove_remote_references: bool,
    /// Drop whitespace-only text between elements.
    pub minify: bool,
    /// Deepest element nesting accepted before the document is rejected.
    pub max_depth: usize,
    /// Upper bound on `<use>` elements, which can amplify rendering cost.
    pub max_use_elements: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            remove_remote_references: true,
            minify: true,
            max_depth: 128,
            max_use_elements: 256,
        }
    }
}

/// Values reported for protected files instead of native introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub width: u32,
    pub height: u32,
    pub attributes: String,
    pub orientation: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            attributes: "height=\"60\" width=\"60\"".to_string(),
            orientation: "square".to_string(),
        }
    }
}

/// Where the host keeps its sources and how patched code reaches the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Root that relative target source paths resolve against.
    pub root: PathBuf,
    /// Host-language expression patched routines call into.
    pub gate_symbol: String,
    /// URI scheme of virtual slot paths handed to the host loader.
    pub virtual_scheme: String,
    /// Host component whose option lists gain the protected format.
    pub media_component: String,
    /// Optional INI language file layered over the built-in strings.
    pub language_file: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            gate_symbol: "\\SvgSupport\\Gate".to_string(),
            virtual_scheme: "svgsupport-buffer".to_string(),
            media_component: "com_media".to_string(),
            language_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, SupportConfig};

    #[test]
    fn default_config_is_valid() {
        let config = SupportConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.protected_suffix(), ".svg");
        assert!(config.sanitizer.remove_remote_references);
        assert!(config.sanitizer.minify);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SupportConfig::from_json_str(
            r#"{ "sanitizer": { "minify": false }, "host": { "root": "/srv/site" } }"#,
        )
        .expect("partial config parses");
        assert!(!config.sanitizer.minify);
        assert!(config.sanitizer.remove_remote_references);
        assert_eq!(config.host.root.to_str(), Some("/srv/site"));
        assert_eq!(config.host.virtual_scheme, "svgsupport-buffer");
        assert_eq!(config.allowed_media_types.len(), 2);
    }

    #[test]
    fn rejects_unusable_extension() {
        let err = SupportConfig::from_json_str(r#"{ "protected_extension": "svgz" }"#)
            .expect_err("four-char extension must fail");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_allow_set() {
        let err = SupportConfig::from_json_str(r#"{ "allowed_media_types": [" "] }"#)
            .expect_err("empty allow-set must fail");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn reports_malformed_json() {
        let err = SupportConfig::from_json_str("{ not json").expect_err("bad json must fail");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SupportConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
