//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait covers the I/O around the resampler: identify,
//! decode to a [`Raster`], encode a [`Raster`], and read container metadata.
//! Pixel work (scaling, sharpening) never happens in a backend; it lives in
//! the resampler so every backend produces identical derivatives.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate.

use super::error::ResampleError;
use super::params::Quality;
use super::raster::Raster;
use crate::metadata::{ImageInfo, MetadataError};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image codec backends.
pub trait ImageBackend: Sync {
    /// Get image dimensions without decoding pixels.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode to an 8-bit raster. Palette, 16-bit and float sources are
    /// converted; the channel layout (gray/RGB, alpha or not) is kept.
    fn decode(&self, path: &Path) -> Result<Raster, BackendError>;

    /// Encode `raster` to `path`, format chosen by the file extension.
    fn encode(&self, raster: &Raster, path: &Path, quality: Quality) -> Result<(), BackendError>;

    /// Read container metadata (dimensions, XMP, IPTC, animation fields).
    fn read_metadata(&self, path: &Path) -> Result<ImageInfo, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::metadata::SourceFormat;
    use std::sync::Mutex;

    /// Mock backend that records operations. `decode` hands out queued
    /// rasters, or a gradient of the queued dimensions.
    /// Uses Mutex (not RefCell) so it is Sync.
    #[derive(Default)]
    pub struct MockBackend {
        pub identify_results: Mutex<Vec<Dimensions>>,
        pub decode_results: Mutex<Vec<Raster>>,
        pub metadata_results: Mutex<Vec<ImageInfo>>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(String),
        Decode(String),
        Encode {
            output: String,
            width: u32,
            height: u32,
            channels: u8,
            quality: u32,
        },
        ReadMetadata(String),
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_dimensions(dims: Vec<Dimensions>) -> Self {
            Self {
                identify_results: Mutex::new(dims),
                ..Self::default()
            }
        }

        pub fn with_rasters(rasters: Vec<Raster>) -> Self {
            Self {
                decode_results: Mutex::new(rasters),
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(path.to_string_lossy().to_string()));

            self.identify_results
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| BackendError::ProcessingFailed("No mock dimensions".to_string()))
        }

        fn decode(&self, path: &Path) -> Result<Raster, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Decode(path.to_string_lossy().to_string()));

            self.decode_results
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| BackendError::ProcessingFailed("No mock raster".to_string()))
        }

        fn encode(&self, raster: &Raster, path: &Path, quality: Quality) -> Result<(), BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Encode {
                output: path.to_string_lossy().to_string(),
                width: raster.width(),
                height: raster.height(),
                channels: raster.channels(),
                quality: quality.value(),
            });
            Ok(())
        }

        fn read_metadata(&self, path: &Path) -> Result<ImageInfo, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::ReadMetadata(path.to_string_lossy().to_string()));

            self.metadata_results
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| BackendError::ProcessingFailed("No mock metadata".to_string()))
        }
    }

    pub fn gradient(width: u32, height: u32) -> Raster {
        Raster::from_fn(width, height, |x, y| [(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128])
            .unwrap()
    }

    #[test]
    fn mock_records_identify() {
        let backend = MockBackend::with_dimensions(vec![Dimensions {
            width: 800,
            height: 600,
        }]);

        let result = backend.identify(Path::new("/test/image.jpg")).unwrap();
        assert_eq!(result.width, 800);
        assert_eq!(result.height, 600);

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], RecordedOp::Identify(p) if p == "/test/image.jpg"));
    }

    #[test]
    fn mock_decode_then_encode() {
        let backend = MockBackend::with_rasters(vec![gradient(8, 4)]);
        let raster = backend.decode(Path::new("/in.png")).unwrap();
        backend
            .encode(&raster, Path::new("/out.jpg"), Quality::new(80))
            .unwrap();

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(
            &ops[1],
            RecordedOp::Encode {
                width: 8,
                height: 4,
                channels: 3,
                quality: 80,
                ..
            }
        ));
    }

    #[test]
    fn mock_metadata_exhausted_errors() {
        let backend = MockBackend::new();
        assert!(backend.read_metadata(Path::new("/a.gif")).is_err());

        let info = ImageInfo {
            format: SourceFormat::Gif,
            width: 1,
            height: 1,
            loop_count: Some(1),
            delay_time: Some(0),
            tile_size: None,
            decomposition_levels: None,
            xmp: None,
            iptc: None,
        };
        backend.metadata_results.lock().unwrap().push(info.clone());
        assert_eq!(backend.read_metadata(Path::new("/a.gif")).unwrap(), info);
    }

    #[test]
    fn errors_convert() {
        let e: BackendError = ResampleError::InvalidArgument("x".into()).into();
        assert!(matches!(e, BackendError::Resample(_)));
        let e: BackendError = MetadataError::SourceNotSet.into();
        assert_eq!(e.to_string(), "Source not set");
    }
}
