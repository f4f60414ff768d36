//! Media-type sniffing from file content.

use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const SNIFF_LIMIT_BYTES: u64 = 4096;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Optional prolog (declaration, comments, doctype) followed by an `svg` root.
static SVG_ROOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is-u)^\s*(?:<\?xml[^>]*\?>\s*)?(?:(?:<!--.*?-->|<!DOCTYPE[^\[>]*(?:\[.*?\])?\s*>|<\?[^>]*\?>)\s*)*<(?:[a-z_][\w.\-]*:)?svg[\s/>]"#,
    )
    .expect("svg root pattern is valid")
});

static XML_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i-u)^\s*<\?xml[\s?]").expect("xml declaration pattern is valid"));

static HTML_ROOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i-u)^\s*(?:<!--.*?-->\s*)*<(?:!doctype\s+html|html|head|body)[\s>]")
        .expect("html root pattern is valid")
});

/// Content-based media type detection.
///
/// `None` means the type could not be determined (missing or unreadable file).
pub trait MediaSniffer: Send + Sync {
    fn sniff(&self, path: &Path) -> Option<String>;
}

/// Built-in sniffer looking at the first few KiB of a file.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupSniffer;

impl MediaSniffer for MarkupSniffer {
    fn sniff(&self, path: &Path) -> Option<String> {
        let file = File::open(path).ok()?;
        let mut head = Vec::with_capacity(SNIFF_LIMIT_BYTES as usize);
        file.take(SNIFF_LIMIT_BYTES).read_to_end(&mut head).ok()?;
        Some(classify(&head).to_string())
    }
}

/// Classifies leading file bytes into a media type.
pub fn classify(head: &[u8]) -> &'static str {
    if head.is_empty() {
        return "application/x-empty";
    }
    let head = head.strip_prefix(UTF8_BOM).unwrap_or(head);
    if head.contains(&0) {
        return "application/octet-stream";
    }
    if SVG_ROOT.is_match(head) {
        return crate::config::SVG_MEDIA_TYPE;
    }
    if HTML_ROOT.is_match(head) {
        return "text/html";
    }
    if XML_DECL.is_match(head) {
        return "text/xml";
    }
    if std::str::from_utf8(head).is_ok() {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, MarkupSniffer, MediaSniffer};

    #[test]
    fn recognizes_bare_svg_root() {
        assert_eq!(classify(b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>"), "image/svg+xml");
    }

    #[test]
    fn recognizes_svg_after_prolog() {
        let doc = b"\xEF\xBB\xBF<?xml version=\"1.0\"?>\n<!-- made by hand -->\n<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\" \"http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd\">\n<svg width=\"10\"></svg>";
        assert_eq!(classify(doc), "image/svg+xml");
    }

    #[test]
    fn recognizes_prefixed_svg_root() {
        assert_eq!(classify(b"<svg:svg xmlns:svg=\"x\"></svg:svg>"), "image/svg+xml");
    }

    #[test]
    fn other_markup_is_not_svg() {
        assert_eq!(classify(b"<?xml version=\"1.0\"?><feed/>"), "text/xml");
        assert_eq!(classify(b"<!DOCTYPE html><html></html>"), "text/html");
        assert_eq!(classify(b"hello"), "text/plain");
        assert_eq!(classify(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"), "application/octet-stream");
        assert_eq!(classify(b""), "application/x-empty");
    }

    #[test]
    fn svg_mentioned_later_does_not_count() {
        assert_eq!(classify(b"text first <svg></svg>"), "text/plain");
    }

    #[test]
    fn sniffer_reads_files_and_reports_missing_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload");
        std::fs::write(&path, "<svg></svg>").unwrap();
        assert_eq!(MarkupSniffer.sniff(&path).as_deref(), Some("image/svg+xml"));
        assert!(MarkupSniffer.sniff(&dir.path().join("gone")).is_none());
    }
}
