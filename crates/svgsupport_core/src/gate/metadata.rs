//! Image metadata with synthesized values for the protected format.
//!
//! # Responsibility
//! - Answer image introspection for protected files with fixed values.
//! - Delegate everything else to the host's native introspection.
//!
//! # Invariants
//! - Protected files never reach the native provider.
//! - Synthesized values depend only on config and file size, never content.

use super::detect::Detector;
use crate::config::{MetadataConfig, SVG_MEDIA_TYPE};
use log::debug;
use image::{ImageDecoder, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Image type code for formats the host has no constant for.
pub const IMAGE_TYPE_UNKNOWN: u16 = 0;
pub const IMAGE_TYPE_GIF: u16 = 1;
pub const IMAGE_TYPE_JPEG: u16 = 2;
pub const IMAGE_TYPE_PNG: u16 = 3;
pub const IMAGE_TYPE_BMP: u16 = 6;
pub const IMAGE_TYPE_WEBP: u16 = 18;

/// Size for the legacy media list, which wants fixed thumbnail dimensions.
const LEGACY_EDGE: u32 = 60;

/// Metadata record in the shape host image helpers consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub image_type: u16,
    /// Ready-made `height=".." width=".."` fragment.
    pub attributes: String,
    pub bits: Option<u8>,
    pub channels: Option<u8>,
    pub mime: String,
    pub filesize: u64,
    pub orientation: String,
}

impl ImageInfo {
    fn native(
        (width, height): (u32, u32),
        image_type: u16,
        mime: &str,
        bits: Option<u8>,
        channels: Option<u8>,
        filesize: u64,
    ) -> Self {
        Self {
            width,
            height,
            image_type,
            attributes: format!("width=\"{width}\" height=\"{height}\""),
            bits,
            channels,
            mime: mime.to_string(),
            filesize,
            orientation: orientation_of(width, height).to_string(),
        }
    }
}

fn orientation_of(width: u32, height: u32) -> &'static str {
    match width.cmp(&height) {
        std::cmp::Ordering::Greater => "landscape",
        std::cmp::Ordering::Less => "portrait",
        std::cmp::Ordering::Equal => "square",
    }
}

/// Host image introspection. `None` means "not an image I can read".
pub trait ImageInfoProvider {
    fn image_info(&self, path: &Path) -> Option<ImageInfo>;
}

impl<F> ImageInfoProvider for F
where
    F: Fn(&Path) -> Option<ImageInfo>,
{
    fn image_info(&self, path: &Path) -> Option<ImageInfo> {
        self(path)
    }
}

/// Where an [`ImageInfo`] answer came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInfoSource {
    Synthesized(ImageInfo),
    Native(Option<ImageInfo>),
}

impl ImageInfoSource {
    pub fn into_info(self) -> Option<ImageInfo> {
        match self {
            Self::Synthesized(info) => Some(info),
            Self::Native(info) => info,
        }
    }
}

/// Dimensions and type as the legacy media list reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacySize {
    pub width: u32,
    pub height: u32,
    pub kind: String,
    pub mime: String,
}

/// Native provider wrapped with synthesized answers for protected files.
pub struct SvgAwareImageInfo<P> {
    native: P,
    detector: Arc<Detector>,
    metadata: MetadataConfig,
}

impl<P: ImageInfoProvider> SvgAwareImageInfo<P> {
    pub fn new(native: P, detector: Arc<Detector>, metadata: MetadataConfig) -> Self {
        Self {
            native,
            detector,
            metadata,
        }
    }

    pub fn resolve(&self, path: &Path) -> ImageInfoSource {
        if !self.detector.detect_for_metadata(path).is_protected {
            let info = self.native.image_info(path);
            debug!(
                "event=image_info module=gate source=native found={} path={}",
                info.is_some(),
                path.display()
            );
            return ImageInfoSource::Native(info);
        }

        let filesize = std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
        debug!(
            "event=image_info module=gate source=synthesized filesize={} path={}",
            filesize,
            path.display()
        );
        ImageInfoSource::Synthesized(ImageInfo {
            width: self.metadata.width,
            height: self.metadata.height,
            image_type: IMAGE_TYPE_UNKNOWN,
            attributes: self.metadata.attributes.clone(),
            bits: None,
            channels: None,
            mime: SVG_MEDIA_TYPE.to_string(),
            filesize,
            orientation: self.metadata.orientation.clone(),
        })
    }

    /// Legacy `[w, h, kind, mime]` size tuple.
    pub fn legacy_size(&self, path: &Path) -> Option<LegacySize> {
        match self.resolve(path) {
            ImageInfoSource::Synthesized(info) => Some(LegacySize {
                width: LEGACY_EDGE,
                height: LEGACY_EDGE,
                kind: self.detector.protected_extension().to_string(),
                mime: info.mime,
            }),
            ImageInfoSource::Native(info) => info.map(|info| LegacySize {
                width: info.width,
                height: info.height,
                kind: type_name(info.image_type).to_string(),
                mime: info.mime,
            }),
        }
    }
}

impl<P: ImageInfoProvider> ImageInfoProvider for SvgAwareImageInfo<P> {
    fn image_info(&self, path: &Path) -> Option<ImageInfo> {
        self.resolve(path).into_info()
    }
}

fn type_name(image_type: u16) -> &'static str {
    match image_type {
        IMAGE_TYPE_GIF => "gif",
        IMAGE_TYPE_JPEG => "jpeg",
        IMAGE_TYPE_PNG => "png",
        IMAGE_TYPE_BMP => "bmp",
        IMAGE_TYPE_WEBP => "webp",
        _ => "unknown",
    }
}

/// Reads dimensions and pixel layout from the image header, without decoding
/// pixel data.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderImageInfo;

impl ImageInfoProvider for HeaderImageInfo {
    fn image_info(&self, path: &Path) -> Option<ImageInfo> {
        let filesize = std::fs::metadata(path).ok()?.len();
        let reader = ImageReader::open(path).ok()?.with_guessed_format().ok()?;
        let (image_type, mime) = host_type(reader.format()?)?;
        let decoder = reader.into_decoder().ok()?;
        let color = decoder.color_type();
        let channels = color.channel_count();
        let bits = u8::try_from(color.bits_per_pixel() / u16::from(channels.max(1))).ok();
        Some(ImageInfo::native(
            decoder.dimensions(),
            image_type,
            mime,
            bits,
            Some(channels),
            filesize,
        ))
    }
}

/// Host type code and media type for the raster formats the host accepts.
fn host_type(format: ImageFormat) -> Option<(u16, &'static str)> {
    match format {
        ImageFormat::Gif => Some((IMAGE_TYPE_GIF, "image/gif")),
        ImageFormat::Jpeg => Some((IMAGE_TYPE_JPEG, "image/jpeg")),
        ImageFormat::Png => Some((IMAGE_TYPE_PNG, "image/png")),
        ImageFormat::Bmp => Some((IMAGE_TYPE_BMP, "image/bmp")),
        ImageFormat::WebP => Some((IMAGE_TYPE_WEBP, "image/webp")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        HeaderImageInfo, ImageInfo, ImageInfoProvider, ImageInfoSource, SvgAwareImageInfo,
        IMAGE_TYPE_BMP, IMAGE_TYPE_JPEG, IMAGE_TYPE_PNG, IMAGE_TYPE_UNKNOWN,
    };
    use crate::config::{MetadataConfig, SupportConfig};
    use crate::gate::Detector;
    use std::cell::Cell;
    use std::path::Path;
    use std::sync::Arc;

    fn write_png(path: &Path, width: u32, height: u32) {
        image::RgbaImage::new(width, height).save(path).unwrap();
    }

    #[test]
    fn protected_files_get_fixed_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.svg");
        std::fs::write(&path, "<svg xmlns=\"http://www.w3.org/2000/svg\"/>").unwrap();

        let called = Cell::new(false);
        let native = |_: &Path| -> Option<ImageInfo> {
            called.set(true);
            None
        };
        let detector = Arc::new(Detector::with_default_sniffer(&SupportConfig::default()));
        let provider = SvgAwareImageInfo::new(native, detector, MetadataConfig::default());

        let info = provider.image_info(&path).expect("synthesized info");
        assert!(!called.get());
        assert_eq!((info.width, info.height), (1024, 1024));
        assert_eq!(info.image_type, IMAGE_TYPE_UNKNOWN);
        assert_eq!(info.attributes, "height=\"60\" width=\"60\"");
        assert_eq!(info.mime, "image/svg+xml");
        assert_eq!(info.filesize, 41);
        assert_eq!(info.orientation, "square");
        assert_eq!(info.bits, None);

        let legacy = provider.legacy_size(&path).expect("legacy size");
        assert_eq!((legacy.width, legacy.height), (60, 60));
        assert_eq!(legacy.kind, "svg");
        assert_eq!(legacy.mime, "image/svg+xml");
    }

    #[test]
    fn other_files_go_to_native_provider() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        write_png(&path, 300, 200);

        let detector = Arc::new(Detector::with_default_sniffer(&SupportConfig::default()));
        let provider = SvgAwareImageInfo::new(HeaderImageInfo, detector, MetadataConfig::default());
        match provider.resolve(&path) {
            ImageInfoSource::Native(Some(info)) => {
                assert_eq!((info.width, info.height), (300, 200));
                assert_eq!(info.orientation, "landscape");
            }
            other => panic!("expected native answer, got {other:?}"),
        }
        let legacy = provider.legacy_size(&path).unwrap();
        assert_eq!(legacy.kind, "png");
    }

    #[test]
    fn disguised_markup_with_svg_name_is_not_synthesized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.svg");
        std::fs::write(&path, "plain text").unwrap();
        let detector = Arc::new(Detector::with_default_sniffer(&SupportConfig::default()));
        let provider = SvgAwareImageInfo::new(|_: &Path| -> Option<ImageInfo> { None }, detector, MetadataConfig::default());
        assert_eq!(provider.resolve(&path), ImageInfoSource::Native(None));
    }

    #[test]
    fn header_reader_handles_common_formats() {
        let dir = tempfile::tempdir().unwrap();

        let png = dir.path().join("a.png");
        write_png(&png, 10, 20);
        let info = HeaderImageInfo.image_info(&png).unwrap();
        assert_eq!((info.width, info.height, info.image_type), (10, 20, IMAGE_TYPE_PNG));
        assert_eq!((info.bits, info.channels), (Some(8), Some(4)));
        assert_eq!(info.mime, "image/png");
        assert_eq!(info.orientation, "portrait");

        let jpeg = dir.path().join("a.jpg");
        image::RgbImage::new(64, 48).save(&jpeg).unwrap();
        let info = HeaderImageInfo.image_info(&jpeg).unwrap();
        assert_eq!((info.width, info.height, info.image_type), (64, 48, IMAGE_TYPE_JPEG));
        assert_eq!(info.channels, Some(3));

        let bmp = dir.path().join("a.bmp");
        image::RgbImage::new(4, 4).save(&bmp).unwrap();
        let info = HeaderImageInfo.image_info(&bmp).unwrap();
        assert_eq!((info.width, info.height, info.image_type), (4, 4, IMAGE_TYPE_BMP));
        assert_eq!(info.mime, "image/bmp");

        let text = dir.path().join("a.txt");
        std::fs::write(&text, "hello").unwrap();
        assert!(HeaderImageInfo.image_info(&text).is_none());

        let renamed = dir.path().join("photo.gif");
        std::fs::copy(&png, &renamed).unwrap();
        let info = HeaderImageInfo.image_info(&renamed).unwrap();
        assert_eq!(info.image_type, IMAGE_TYPE_PNG, "content decides, not the name");
    }

    #[test]
    fn image_info_serializes_for_host_bridges() {
        let info = ImageInfo {
            width: 1,
            height: 1,
            image_type: 0,
            attributes: String::new(),
            bits: None,
            channels: None,
            mime: "image/svg+xml".to_string(),
            filesize: 3,
            orientation: "square".to_string(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["mime"], "image/svg+xml");
        assert!(json["bits"].is_null());
    }
}
