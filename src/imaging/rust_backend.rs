//! Pure Rust codec backend over the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF) | `image::ImageReader` |
//! | Identify | `image::image_dimensions`, chunk readers for JPEG2000 |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` with quality, alpha dropped |
//! | Encode → PNG, TIFF, WebP, GIF | `DynamicImage::save_with_format` |
//! | Metadata | [`crate::metadata::read_info`] |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::Quality;
use super::raster::Raster;
use crate::metadata::{self, ImageInfo};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

/// Extensions whose decoders are compiled in.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
    ("gif", ImageFormat::Gif),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn output_format(path: &Path) -> Result<ImageFormat, BackendError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    INPUT_CANDIDATES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, fmt)| *fmt)
        .filter(|fmt| fmt.writing_enabled())
        .ok_or_else(|| BackendError::ProcessingFailed(format!("Unsupported output format: {ext}")))
}

/// Load and decode an image from disk.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// Convert to an 8-bit raster, keeping the gray/color and alpha layout.
fn to_raster(img: DynamicImage) -> Result<Raster, BackendError> {
    let (width, height) = (img.width(), img.height());
    let (channels, data) = match img {
        DynamicImage::ImageLuma8(buf) => (1, buf.into_raw()),
        DynamicImage::ImageLumaA8(buf) => (2, buf.into_raw()),
        DynamicImage::ImageRgb8(buf) => (3, buf.into_raw()),
        DynamicImage::ImageRgba8(buf) => (4, buf.into_raw()),
        other => match other.color().channel_count() {
            1 => (1, other.to_luma8().into_raw()),
            2 => (2, other.to_luma_alpha8().into_raw()),
            3 => (3, other.to_rgb8().into_raw()),
            _ => (4, other.to_rgba8().into_raw()),
        },
    };
    Ok(Raster::new(width, height, channels, data)?)
}

fn to_dynamic(raster: &Raster) -> Result<DynamicImage, BackendError> {
    let (w, h) = raster.dimensions();
    let data = raster.as_bytes().to_vec();
    let img = match raster.channels() {
        1 => image::GrayImage::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
        2 => image::GrayAlphaImage::from_raw(w, h, data).map(DynamicImage::ImageLumaA8),
        3 => image::RgbImage::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
        _ => image::RgbaImage::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
    };
    img.ok_or_else(|| BackendError::ProcessingFailed("Raster buffer does not match its size".into()))
}

/// Encode and save as JPEG. JPEG has no alpha, so it is dropped.
fn save_jpeg(img: DynamicImage, path: &Path, quality: Quality) -> Result<(), BackendError> {
    let img = match img {
        DynamicImage::ImageLumaA8(_) => DynamicImage::ImageLuma8(img.to_luma8()),
        DynamicImage::ImageRgba8(_) => DynamicImage::ImageRgb8(img.to_rgb8()),
        other => other,
    };
    let file = std::fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality.value() as u8);
    img.write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        match image::image_dimensions(path) {
            Ok((width, height)) => Ok(Dimensions { width, height }),
            Err(image::ImageError::IoError(e)) => Err(BackendError::Io(e)),
            // Containers the `image` crate can't open (JPEG2000) still have
            // a chunk reader.
            Err(e) => metadata::read_info(path)
                .map(|info| Dimensions {
                    width: info.width,
                    height: info.height,
                })
                .map_err(|_| {
                    BackendError::ProcessingFailed(format!("Failed to read dimensions: {}", e))
                }),
        }
    }

    fn decode(&self, path: &Path) -> Result<Raster, BackendError> {
        let img = load_image(path)?;
        debug!(path = %path.display(), color = ?img.color(), "decoded");
        to_raster(img)
    }

    fn encode(&self, raster: &Raster, path: &Path, quality: Quality) -> Result<(), BackendError> {
        let format = output_format(path)?;
        let img = to_dynamic(raster)?;
        match format {
            ImageFormat::Jpeg => save_jpeg(img, path, quality),
            // The GIF and WebP encoders take RGB(A) only.
            ImageFormat::Gif | ImageFormat::WebP if raster.channels() < 3 || format == ImageFormat::Gif => {
                DynamicImage::ImageRgba8(img.to_rgba8())
                    .save_with_format(path, format)
                    .map_err(|e| BackendError::ProcessingFailed(format!("{format:?} encode failed: {e}")))
            }
            _ => img
                .save_with_format(path, format)
                .map_err(|e| BackendError::ProcessingFailed(format!("{format:?} encode failed: {e}"))),
        }
    }

    fn read_metadata(&self, path: &Path) -> Result<ImageInfo, BackendError> {
        Ok(metadata::read_info(path)?)
    }
}
