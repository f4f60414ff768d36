//! User-facing strings.
//!
//! # Responsibility
//! - Parse INI-style `KEY="value"` language files.
//! - Translate reject-message keys, falling back to the key itself.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

static ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^([A-Za-z0-9_.\-]+)\s*=\s*"((?:[^"\\]|\\.)*)"\s*(?:;.*)?$"#)
        .expect("valid language entry regex")
});

const BUILTIN_EN: &str = r#"
; Built-in English strings
SVGSUPPORT_ERR_UPLOAD_DISAPPEARED="The uploaded file disappeared before it could be checked. Please try again."
SVGSUPPORT_ERR_INVALID_FILE="The uploaded SVG file could not be sanitized and was rejected."
SVGSUPPORT_ERR_UPLOAD_NOT_SAVED="The sanitized SVG file could not be saved. Please try again."
"#;

/// Lookup of user-visible strings by language key.
pub trait Translator {
    fn translate(&self, key: &str) -> String;
}

impl<T: Translator + ?Sized> Translator for &T {
    fn translate(&self, key: &str) -> String {
        (**self).translate(key)
    }
}

#[derive(Debug)]
pub enum LanguageError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Malformed {
        line: usize,
        content: String,
    },
}

impl Display for LanguageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read language file `{}`: {source}", path.display())
            }
            Self::Malformed { line, content } => {
                write!(f, "malformed language entry at line {line}: {content}")
            }
        }
    }
}

impl Error for LanguageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Malformed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageCatalog {
    strings: BTreeMap<String, String>,
}

impl LanguageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in English reject messages.
    pub fn builtin_en() -> Self {
        match Self::parse_ini(BUILTIN_EN) {
            Ok(catalog) => catalog,
            Err(_) => Self::new(),
        }
    }

    /// Parses `KEY="value"` lines. `;`/`#` comments, blank lines and
    /// `[section]` headers are skipped.
    pub fn parse_ini(raw: &str) -> Result<Self, LanguageError> {
        let mut strings = BTreeMap::new();
        for (index, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty()
                || line.starts_with(';')
                || line.starts_with('#')
                || (line.starts_with('[') && line.ends_with(']'))
            {
                continue;
            }
            let Some(captures) = ENTRY.captures(line) else {
                return Err(LanguageError::Malformed {
                    line: index + 1,
                    content: crate::logging::single_line(line, 80),
                });
            };
            strings.insert(captures[1].to_string(), unescape(&captures[2]));
        }
        Ok(Self { strings })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LanguageError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| LanguageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_ini(&raw)
    }

    /// Layers `other` over `self`; keys in `other` win.
    pub fn merge(&mut self, other: LanguageCatalog) {
        self.strings.extend(other.strings);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Translator for LanguageCatalog {
    fn translate(&self, key: &str) -> String {
        self.get(key).unwrap_or(key).to_string()
    }
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
