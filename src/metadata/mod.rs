//! Metadata extraction from chunked image containers.
//!
//! Each reader walks the raw container structure (GIF blocks, JPEG marker
//! segments, JP2 boxes and codestream markers) and never decodes pixels.
//! Readers are lazy: binding a source does no I/O, the first accessor call
//! parses, and every later call returns the cached record or the cached
//! failure.
//!
//! | Module | Role |
//! |--------|------|
//! | [`gif`] | Screen size, loop count, frame delay, XMP application extension |
//! | [`jpeg`] | Frame size, EXIF, XMP (standard and extended), ICC, IPTC, Adobe APP14 |
//! | [`jpeg2000`] | Image/tile geometry, components, DWT levels, `uuid` box payloads |
//! | [`iptc`] | IPTC-IIM dataset decoding, Photoshop resources, TIFF tag lookup |
//! | [`xmp`] | RDF extraction from XMP packets |
//! | [`stream`] | Seekable byte input with mark/reset |
//!
//! [`read_info`] sniffs a file's magic bytes and dispatches to the matching
//! reader, falling back to the `image` crate's header probe for formats
//! without a dedicated reader.

pub mod error;
pub mod gif;
pub mod iptc;
pub mod jpeg;
pub mod jpeg2000;
pub mod stream;
pub mod xmp;

pub use error::MetadataError;
pub use gif::{GifMetadata, GifMetadataReader};
pub use iptc::IptcFields;
pub use jpeg::{AdobeColorTransform, JpegMetadata, JpegMetadataReader};
pub use jpeg2000::{Jpeg2000Metadata, Jpeg2000MetadataReader};

use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Parse progress of a lazy reader.
#[derive(Debug)]
pub(crate) enum ReadState<T> {
    Unparsed,
    Parsed(T),
    Failed(MetadataError),
}

impl<T> ReadState<T> {
    /// Run `parse` once and cache its outcome. Later calls return the cached
    /// record or a clone of the cached failure without calling `parse`.
    pub(crate) fn ensure(
        &mut self,
        parse: impl FnOnce() -> Result<T, MetadataError>,
    ) -> Result<&T, MetadataError> {
        if let ReadState::Unparsed = self {
            *self = match parse() {
                Ok(record) => ReadState::Parsed(record),
                Err(e) => ReadState::Failed(e),
            };
        }
        match &*self {
            ReadState::Parsed(record) => Ok(record),
            ReadState::Failed(e) => Err(e.clone()),
            ReadState::Unparsed => Err(MetadataError::SourceNotSet),
        }
    }
}

/// Container formats recognised by [`detect_format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Gif,
    Jpeg,
    Jpeg2000,
    Png,
    Tiff,
    WebP,
}

impl SourceFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            SourceFormat::Gif => "image/gif",
            SourceFormat::Jpeg => "image/jpeg",
            SourceFormat::Jpeg2000 => "image/jp2",
            SourceFormat::Png => "image/png",
            SourceFormat::Tiff => "image/tiff",
            SourceFormat::WebP => "image/webp",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SourceFormat::Gif => "GIF",
            SourceFormat::Jpeg => "JPEG",
            SourceFormat::Jpeg2000 => "JPEG2000",
            SourceFormat::Png => "PNG",
            SourceFormat::Tiff => "TIFF",
            SourceFormat::WebP => "WebP",
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Bytes [`detect_format`] needs to tell every format apart.
pub const SNIFF_LEN: usize = 12;

/// Identify a container from its leading bytes.
///
/// ```
/// use iiif_raster::metadata::{SourceFormat, detect_format};
///
/// assert_eq!(detect_format(b"GIF89a\x01\x00"), Some(SourceFormat::Gif));
/// assert_eq!(detect_format(&[0xFF, 0x4F, 0xFF, 0x51]), Some(SourceFormat::Jpeg2000));
/// assert_eq!(detect_format(b"BM"), None);
/// ```
pub fn detect_format(data: &[u8]) -> Option<SourceFormat> {
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some(SourceFormat::Gif);
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(SourceFormat::Jpeg);
    }
    if data.starts_with(&jpeg2000::JP2_SIGNATURE) || data.starts_with(&jpeg2000::CODESTREAM_SIGNATURE) {
        return Some(SourceFormat::Jpeg2000);
    }
    if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(SourceFormat::Png);
    }
    if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
        return Some(SourceFormat::Tiff);
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some(SourceFormat::WebP);
    }
    None
}

/// Summary of a source image's container metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    pub format: SourceFormat,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_count: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_time: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_size: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decomposition_levels: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xmp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iptc: Option<IptcFields>,
}

impl ImageInfo {
    fn new(format: SourceFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            loop_count: None,
            delay_time: None,
            tile_size: None,
            decomposition_levels: None,
            xmp: None,
            iptc: None,
        }
    }
}

/// Read container metadata from the file at `path`.
pub fn read_info(path: &Path) -> Result<ImageInfo, MetadataError> {
    let mut file = BufReader::new(File::open(path)?);
    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut file).take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    file.seek(SeekFrom::Start(0))?;

    let format = detect_format(&head).ok_or_else(|| MetadataError::InvalidSignature {
        format: "image",
        found: error::hex(&head),
    })?;
    debug!(path = %path.display(), %format, "reading metadata");

    match format {
        SourceFormat::Gif => {
            let mut reader = GifMetadataReader::new();
            reader.set_source(file);
            let m = reader.metadata()?;
            let mut info = ImageInfo::new(format, m.width.into(), m.height.into());
            info.loop_count = Some(m.loop_count);
            info.delay_time = Some(m.delay_time);
            info.xmp = m.xmp.clone();
            Ok(info)
        }
        SourceFormat::Jpeg => {
            let mut reader = JpegMetadataReader::new();
            reader.set_source(file);
            let m = reader.metadata()?;
            let mut info = ImageInfo::new(format, m.width.into(), m.height.into());
            info.xmp = m.xmp.clone();
            info.iptc = non_empty_iptc(m.iptc.as_deref());
            Ok(info)
        }
        SourceFormat::Jpeg2000 => {
            let mut reader = Jpeg2000MetadataReader::new();
            reader.set_source(file);
            let m = reader.metadata()?;
            let mut info = ImageInfo::new(format, m.width, m.height);
            info.tile_size = Some((m.tile_width, m.tile_height));
            info.decomposition_levels = Some(m.decomposition_levels);
            info.xmp = m.xmp.clone();
            info.iptc = non_empty_iptc(m.iptc.as_deref());
            Ok(info)
        }
        SourceFormat::Png | SourceFormat::Tiff | SourceFormat::WebP => {
            drop(file);
            let (width, height) =
                image::image_dimensions(path).map_err(|e| MetadataError::Malformed {
                    format: format.name(),
                    reason: e.to_string(),
                })?;
            let mut info = ImageInfo::new(format, width, height);
            if format == SourceFormat::Tiff {
                info.iptc = iptc::from_tiff(&std::fs::read(path)?);
            }
            Ok(info)
        }
    }
}

fn non_empty_iptc(iim: Option<&[u8]>) -> Option<IptcFields> {
    iim.map(iptc::parse_iim).filter(|f| !f.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    // =========================================================================
    // ReadState
    // =========================================================================

    #[test]
    fn ensure_parses_once() {
        let calls = Cell::new(0);
        let mut state = ReadState::Unparsed;
        for _ in 0..3 {
            let v = state
                .ensure(|| {
                    calls.set(calls.get() + 1);
                    Ok(7)
                })
                .unwrap();
            assert_eq!(*v, 7);
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn ensure_caches_failure() {
        let calls = Cell::new(0);
        let mut state: ReadState<u8> = ReadState::Unparsed;
        for _ in 0..2 {
            let err = state
                .ensure(|| {
                    calls.set(calls.get() + 1);
                    Err(MetadataError::Malformed {
                        format: "X",
                        reason: "bad".into(),
                    })
                })
                .unwrap_err();
            assert!(matches!(err, MetadataError::Malformed { .. }));
        }
        assert_eq!(calls.get(), 1);
    }

    // =========================================================================
    // detect_format
    // =========================================================================

    #[test]
    fn detects_each_format() {
        assert_eq!(detect_format(b"GIF87a"), Some(SourceFormat::Gif));
        assert_eq!(detect_format(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(SourceFormat::Jpeg));
        assert_eq!(detect_format(&jpeg2000::JP2_SIGNATURE), Some(SourceFormat::Jpeg2000));
        assert_eq!(detect_format(b"\x89PNG\r\n\x1a\n"), Some(SourceFormat::Png));
        assert_eq!(detect_format(b"II*\0\x08\0\0\0"), Some(SourceFormat::Tiff));
        assert_eq!(detect_format(b"MM\0*\0\0\0\x08"), Some(SourceFormat::Tiff));
        assert_eq!(detect_format(b"RIFF\0\0\0\0WEBPVP8 "), Some(SourceFormat::WebP));
    }

    #[test]
    fn unknown_or_short() {
        assert_eq!(detect_format(&[]), None);
        assert_eq!(detect_format(b"GIF"), None);
        assert_eq!(detect_format(b"RIFF\0\0\0\0WAVE"), None);
    }

    #[test]
    fn format_serializes_lowercase() {
        let json = serde_json::to_string(&SourceFormat::Jpeg2000).unwrap();
        assert_eq!(json, "\"jpeg2000\"");
        assert_eq!(SourceFormat::WebP.mime_type(), "image/webp");
    }

    // =========================================================================
    // read_info
    // =========================================================================

    #[test]
    fn read_info_gif() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("anim.gif");
        let mut bytes = b"GIF89a\x0A\x00\x14\x00\x00\x00\x00".to_vec();
        bytes.extend_from_slice(&[0x21, 0xFF, 0x0B]);
        bytes.extend_from_slice(b"NETSCAPE2.0");
        bytes.extend_from_slice(&[0x03, 0x01, 0x00, 0x00, 0x00]);
        bytes.push(0x3B);
        std::fs::write(&path, bytes).unwrap();

        let info = read_info(&path).unwrap();
        assert_eq!(info.format, SourceFormat::Gif);
        assert_eq!((info.width, info.height), (10, 20));
        assert_eq!(info.loop_count, Some(0));
    }

    #[test]
    fn read_info_png_uses_header_probe() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("pixel.png");
        image::RgbImage::new(7, 3).save(&path).unwrap();

        let info = read_info(&path).unwrap();
        assert_eq!(info.format, SourceFormat::Png);
        assert_eq!((info.width, info.height), (7, 3));
        assert_eq!(info.iptc, None);
    }

    #[test]
    fn read_info_rejects_unknown() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();
        assert!(matches!(
            read_info(&path),
            Err(MetadataError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn read_info_missing_file_is_io() {
        let err = read_info(Path::new("/nonexistent/image.gif")).unwrap_err();
        assert!(matches!(err, MetadataError::Io(_)));
    }
}
