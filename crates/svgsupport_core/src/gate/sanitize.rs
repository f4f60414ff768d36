//! Allow-list sanitizer for vector markup and the in-place upload rewrite.
//!
//! # Responsibility
//! - Keep only allow-listed elements and attributes.
//! - Strip script hooks and, when configured, every reference to a resource
//!   outside the document.
//! - Replace the upload's temp file with the cleaned bytes.
//!
//! # Invariants
//! - Output is canonical markup, so sanitizing it again yields the same bytes.
//! - Attribute values and stylesheets are checked as CSS. A backslash escape
//!   anywhere in them is refused, since it can spell `url(` or `javascript:`.
//! - A document the parser refuses is rejected, never passed through.

use super::markup::{self, Element, MarkupError, Node};
use super::{GateError, GateResult, SanitizationOutcome, UploadedFile};
use crate::config::SanitizerConfig;
use log::{error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::time::Instant;

static ALLOWED_ELEMENTS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "circle", "clipPath", "defs", "desc", "ellipse", "feBlend", "feColorMatrix",
        "feComponentTransfer", "feComposite", "feConvolveMatrix", "feDiffuseLighting",
        "feDisplacementMap", "feDistantLight", "feDropShadow", "feFlood", "feFuncA", "feFuncB",
        "feFuncG", "feFuncR", "feGaussianBlur", "feMerge", "feMergeNode", "feMorphology",
        "feOffset", "fePointLight", "feSpecularLighting", "feSpotLight", "feTile",
        "feTurbulence", "filter", "g", "image", "line", "linearGradient", "marker", "mask",
        "metadata", "path", "pattern", "polygon", "polyline", "radialGradient", "rect", "stop",
        "style", "svg", "switch", "symbol", "text", "textPath", "title", "tspan", "use", "view",
    ]
    .into_iter()
    .collect()
});

/// Compared lowercased.
static ALLOWED_ATTRIBUTES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "accent-height", "alignment-baseline", "amplitude", "azimuth", "basefrequency",
        "baseline-shift", "bias", "class", "clip", "clip-path", "clip-rule", "clippathunits",
        "color", "color-interpolation", "color-interpolation-filters", "color-profile",
        "color-rendering", "cx", "cy", "d", "diffuseconstant", "direction", "display",
        "divisor", "dominant-baseline", "dx", "dy", "edgemode", "elevation", "enable-background",
        "exponent", "fill", "fill-opacity", "fill-rule", "filter", "filterunits", "flood-color",
        "flood-opacity", "font-family", "font-size", "font-size-adjust", "font-stretch",
        "font-style", "font-variant", "font-weight", "fr", "fx", "fy", "gradienttransform",
        "gradientunits", "height", "href", "id", "image-rendering", "in", "in2", "intercept",
        "k", "k1", "k2", "k3", "k4", "kernelmatrix", "kernelunitlength", "kerning", "lang",
        "lengthadjust", "letter-spacing", "lighting-color", "limitingconeangle", "marker-end",
        "marker-mid", "marker-start", "markerheight", "markerunits", "markerwidth", "mask",
        "maskcontentunits", "maskunits", "mode", "numoctaves", "offset", "opacity", "operator",
        "order", "orient", "overflow", "paint-order", "path", "pathlength",
        "patterncontentunits", "patterntransform", "patternunits", "points", "pointsatx",
        "pointsaty", "pointsatz", "preservealpha", "preserveaspectratio", "primitiveunits",
        "r", "radius", "refx", "refy", "result", "role", "rotate", "rx", "ry", "scale", "seed",
        "shape-rendering", "slope", "specularconstant", "specularexponent", "spreadmethod",
        "startoffset", "stddeviation", "stitchtiles", "stop-color", "stop-opacity",
        "stroke", "stroke-dasharray", "stroke-dashoffset", "stroke-linecap",
        "stroke-linejoin", "stroke-miterlimit", "stroke-opacity", "stroke-width", "style",
        "surfacescale", "systemlanguage", "tabindex", "tablevalues", "targetx", "targety",
        "text-anchor", "text-decoration", "text-rendering", "textlength", "transform", "type",
        "u1", "u2", "unicode", "values", "vector-effect", "version", "viewbox", "visibility",
        "width", "word-spacing", "writing-mode", "x", "x1", "x2", "xchannelselector",
        "xlink:href", "xlink:title", "xml:space", "xmlns", "xmlns:xlink", "y", "y1", "y2",
        "ychannelselector", "z",
    ]
    .into_iter()
    .collect()
});

/// Targets of every `url(...)` in a value.
static URL_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\s*\(\s*['"]?\s*([^'")\s]*)"#).expect("valid url reference regex")
});

/// Quoted CSS strings; `image-set()` and `@import` load these as URLs.
static CSS_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)"|'([^']*)'"#).expect("valid css string regex"));

static URL_SCHEME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:[a-z][a-z0-9+.\-]*:|//)").expect("valid url scheme regex")
});

static IMPORT_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)@import").expect("valid import regex"));

static SCRIPT_SCHEME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:java|vb)\s*script\s*:|expression\s*\(").expect("valid script scheme regex")
});

static SAFE_DATA_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^data:image/(?:png|gif|jpe?g);base64,[a-z0-9+/=\s]*$")
        .expect("valid data uri regex")
});

static REMOTE_SCHEME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:https?:)?//").expect("valid remote scheme regex")
});

/// Turns untrusted markup into safe markup, or refuses it.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, dirty: &[u8]) -> Result<Vec<u8>, MarkupError>;
}

/// Allow-list sanitizer for SVG documents.
#[derive(Debug, Clone)]
pub struct SvgSanitizer {
    options: SanitizerConfig,
}

impl Default for SvgSanitizer {
    fn default() -> Self {
        Self::new(SanitizerConfig::default())
    }
}

impl SvgSanitizer {
    pub fn new(options: SanitizerConfig) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SanitizerConfig {
        &self.options
    }

    fn clean_element(&self, element: &mut Element, use_count: &mut usize) -> Result<(), MarkupError> {
        if element.local_name() == "use" {
            *use_count += 1;
            if *use_count > self.options.max_use_elements {
                return Err(MarkupError::TooManyUseElements(self.options.max_use_elements));
            }
        }

        element
            .attributes
            .retain(|(name, value)| self.keep_attribute(name, value));

        if element.name == "style" {
            self.clean_stylesheet(element);
            return Ok(());
        }
        let mut children = std::mem::take(&mut element.children);
        children.retain(|child| match child {
            Node::Element(inner) => ALLOWED_ELEMENTS.contains(inner.name.as_str()),
            Node::Text(text) if self.options.minify => !text.trim().is_empty(),
            _ => true,
        });
        for child in &mut children {
            if let Node::Element(inner) = child {
                self.clean_element(inner, use_count)?;
            }
        }
        element.children = coalesce_text(children);
        Ok(())
    }

    /// Replaces a `<style>` body with one text node, or empties it when the
    /// joined text is unsafe or holds markup.
    fn clean_stylesheet(&self, element: &mut Element) {
        let mut sheet = String::new();
        for child in std::mem::take(&mut element.children) {
            match child {
                Node::Text(text) | Node::CData(text) => sheet.push_str(&text),
                Node::Element(_) => return,
            }
        }
        if self.is_unsafe_css(&sheet) || (self.options.minify && sheet.trim().is_empty()) {
            return;
        }
        element.children.push(Node::Text(sheet));
    }

    fn keep_attribute(&self, name: &str, value: &str) -> bool {
        let lowered = name.to_ascii_lowercase();
        if lowered.starts_with("on") || !ALLOWED_ATTRIBUTES.contains(lowered.as_str()) {
            return false;
        }
        if SCRIPT_SCHEME.is_match(value) {
            return false;
        }
        if lowered == "href" || lowered == "xlink:href" {
            return self.is_safe_href(value);
        }
        !self.is_unsafe_css(value)
    }

    fn is_safe_href(&self, value: &str) -> bool {
        let value = value.trim();
        if value.starts_with('#') || SAFE_DATA_IMAGE.is_match(value) {
            return true;
        }
        !self.options.remove_remote_references && REMOTE_SCHEME.is_match(value)
    }

    fn has_remote_url(&self, value: &str) -> bool {
        URL_REFERENCE.captures_iter(value).any(|captures| {
            let target = captures.get(1).map_or("", |m| m.as_str());
            !(target.starts_with('#') || SAFE_DATA_IMAGE.is_match(target))
        })
    }

    fn has_remote_string(&self, value: &str) -> bool {
        CSS_STRING.captures_iter(value).any(|captures| {
            let literal = captures
                .get(1)
                .or_else(|| captures.get(2))
                .map_or("", |m| m.as_str())
                .trim();
            URL_SCHEME.is_match(literal) && !SAFE_DATA_IMAGE.is_match(literal)
        })
    }

    fn is_unsafe_css(&self, text: &str) -> bool {
        if text.contains('\\') || SCRIPT_SCHEME.is_match(text) {
            return true;
        }
        self.options.remove_remote_references
            && (IMPORT_RULE.is_match(text)
                || self.has_remote_url(text)
                || self.has_remote_string(text))
    }
}

/// Joins text nodes left adjacent after their separator was dropped.
fn coalesce_text(children: Vec<Node>) -> Vec<Node> {
    let mut merged: Vec<Node> = Vec::with_capacity(children.len());
    for child in children {
        if let (Node::Text(text), Some(Node::Text(previous))) = (&child, merged.last_mut()) {
            previous.push_str(text);
            continue;
        }
        merged.push(child);
    }
    merged
}

impl Sanitizer for SvgSanitizer {
    fn sanitize(&self, dirty: &[u8]) -> Result<Vec<u8>, MarkupError> {
        let text = std::str::from_utf8(dirty).map_err(|_| MarkupError::NotUtf8)?;
        let mut root = markup::parse(text, self.options.max_depth)?;
        if root.name != "svg" {
            return Err(MarkupError::NotSvgRoot(root.name));
        }
        let mut use_count = 0;
        self.clean_element(&mut root, &mut use_count)?;
        Ok(markup::serialize(&root).into_bytes())
    }
}

/// Reads, sanitizes and overwrites the upload's temp file.
///
/// Returns the cleaned bytes that now live at `file.temp_path`.
pub fn sanitize_in_place(file: &UploadedFile, sanitizer: &dyn Sanitizer) -> GateResult<Vec<u8>> {
    let dirty = std::fs::read(&file.temp_path).map_err(|source| GateError::SourceVanished {
        path: file.temp_path.clone(),
        source,
    })?;
    let clean = sanitizer.sanitize(&dirty)?;
    std::fs::write(&file.temp_path, &clean).map_err(|source| GateError::WriteBack {
        path: file.temp_path.clone(),
        source,
    })?;
    Ok(clean)
}

/// [`sanitize_in_place`] folded into a two-state outcome, with logging.
pub fn sanitize_upload(file: &UploadedFile, sanitizer: &dyn Sanitizer) -> SanitizationOutcome {
    let started_at = Instant::now();
    match sanitize_in_place(file, sanitizer) {
        Ok(clean) => {
            info!(
                "event=svg_sanitize module=gate status=ok name={} bytes_out={} duration_ms={}",
                crate::logging::single_line(&file.declared_name, 80),
                clean.len(),
                started_at.elapsed().as_millis()
            );
            SanitizationOutcome::Clean(clean)
        }
        Err(err) => {
            error!(
                "event=svg_sanitize module=gate status=error name={} error={}",
                crate::logging::single_line(&file.declared_name, 80),
                crate::logging::single_line(&err.to_string(), 160)
            );
            SanitizationOutcome::Rejected(err)
        }
    }
}
