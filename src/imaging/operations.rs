//! High-level image operations.
//!
//! These functions combine calculations, the resampler and backend I/O.
//! They take parameters, compute sizes and kernels, and call the backend
//! only for decode and encode.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{default_filter, resulting_size};
use super::filters::Filter;
use super::params::{DeriveParams, Sharpen};
use super::pool::WorkerPool;
use super::raster::{ColorInterpretation, Raster};
use super::resample::{MIN_DEST_SIZE, ResampleOp};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Get image dimensions using the backend.
pub fn get_dimensions(backend: &impl ImageBackend, path: &Path) -> Result<(u32, u32)> {
    let dims = backend.identify(path)?;
    Ok((dims.width, dims.height))
}

fn too_small((w, h): (u32, u32)) -> bool {
    w < MIN_DEST_SIZE || h < MIN_DEST_SIZE
}

/// Scale `source` to `target`.
///
/// - Either side below 3 pixels on either axis: returns a blank raster of
///   the target size with the source's channel count. The kernels need a
///   few pixels to work with.
/// - Same size: returns `source` untouched.
pub fn scale(
    source: Raster,
    target: (u32, u32),
    filter: Filter,
    linear_output: bool,
    pool: &WorkerPool,
) -> Result<Raster> {
    let size = source.dimensions();
    if too_small(size) || too_small(target) {
        debug!(?size, ?target, "too small to resample, returning blank raster");
        let blank = Raster::blank(target.0, target.1, source.channels())?;
        return Ok(blank.with_interpretation(interpretation(linear_output)));
    }
    if size == target {
        return Ok(source);
    }

    let started = Instant::now();
    let out = ResampleOp::new(target.0, target.1)
        .with_filter(filter)
        .with_linear_output(linear_output)
        .filter(&source, None, pool)?;
    debug!(
        filter = %filter,
        from = ?size,
        to = ?target,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "scaled"
    );
    Ok(out)
}

fn interpretation(linear: bool) -> ColorInterpretation {
    if linear {
        ColorInterpretation::Linear
    } else {
        ColorInterpretation::Gamma
    }
}

/// Unsharp-mask `raster` in place. Skipped when the amount has no effect
/// or the raster is 2 pixels or less on an axis.
pub fn sharpen(raster: &mut Raster, amount: Sharpen, pool: &WorkerPool) -> Result<()> {
    let (w, h) = raster.dimensions();
    if !amount.has_effect() || w <= 2 || h <= 2 {
        return Ok(());
    }
    amount.mask().apply(raster, pool)?;
    Ok(())
}

/// What [`derive`] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derivative {
    pub source_size: (u32, u32),
    pub size: (u32, u32),
    pub channels: u8,
    pub filter: Filter,
}

/// Decode, scale, sharpen and encode one derivative.
pub fn derive(
    backend: &impl ImageBackend,
    params: &DeriveParams,
    pool: &WorkerPool,
) -> Result<Derivative> {
    let source = backend.decode(&params.source)?;
    let source_size = source.dimensions();
    let target = resulting_size(source_size, params.mode);
    let filter = default_filter(params.filter, source_size, target, &params.policy);

    let mut out = scale(source, target, filter, params.linear_output, pool)?;
    sharpen(&mut out, params.sharpen, pool)?;
    backend.encode(&out, &params.output, params.quality)?;

    Ok(Derivative {
        source_size,
        size: out.dimensions(),
        channels: out.channels(),
        filter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Dimensions;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp, gradient};
    use crate::imaging::params::{FilterPolicy, Quality, ScaleMode};

    fn pool() -> WorkerPool {
        WorkerPool::new(2).unwrap()
    }

    fn params(mode: ScaleMode) -> DeriveParams {
        DeriveParams {
            source: "/source.png".into(),
            output: "/out.jpg".into(),
            mode,
            filter: None,
            policy: FilterPolicy::default(),
            sharpen: Sharpen::default(),
            linear_output: false,
            quality: Quality::new(85),
        }
    }

    #[test]
    fn get_dimensions_calls_backend() {
        let backend = MockBackend::with_dimensions(vec![Dimensions {
            width: 1920,
            height: 1080,
        }]);

        let dims = get_dimensions(&backend, Path::new("/test.jpg")).unwrap();
        assert_eq!(dims, (1920, 1080));
    }

    // =========================================================================
    // scale
    // =========================================================================

    #[test]
    fn scale_same_size_returns_source() {
        let src = gradient(10, 8);
        let out = scale(src.clone(), (10, 8), Filter::Lanczos3, false, &pool()).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn scale_tiny_target_is_blank() {
        let out = scale(gradient(10, 8), (2, 5), Filter::Lanczos3, true, &pool()).unwrap();
        assert_eq!(out.dimensions(), (2, 5));
        assert_eq!(out.channels(), 3);
        assert_eq!(out.interpretation(), ColorInterpretation::Linear);
        assert!(out.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn scale_tiny_source_is_blank() {
        let out = scale(gradient(2, 2), (10, 10), Filter::Bicubic, false, &pool()).unwrap();
        assert_eq!(out.dimensions(), (10, 10));
        assert!(out.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn scale_resamples() {
        let out = scale(gradient(64, 56), (32, 28), Filter::Lanczos3, false, &pool()).unwrap();
        assert_eq!(out.dimensions(), (32, 28));
        assert_eq!(out.as_bytes().len(), 32 * 28 * 3);
    }

    // =========================================================================
    // sharpen
    // =========================================================================

    #[test]
    fn sharpen_without_effect_is_noop() {
        let mut r = gradient(10, 10);
        let before = r.clone();
        sharpen(&mut r, Sharpen(0.0), &pool()).unwrap();
        assert_eq!(r, before);
    }

    #[test]
    fn sharpen_skips_thin_rasters() {
        let mut r = Raster::from_fn(2, 10, |_, y| [if y % 2 == 0 { 0u8 } else { 255 }]).unwrap();
        let before = r.clone();
        sharpen(&mut r, Sharpen(2.0), &pool()).unwrap();
        assert_eq!(r, before);
    }

    #[test]
    fn sharpen_changes_edges() {
        let mut r = Raster::from_fn(12, 12, |x, _| [if x < 6 { 60u8 } else { 180 }]).unwrap();
        let before = r.clone();
        sharpen(&mut r, Sharpen(1.0), &pool()).unwrap();
        assert_ne!(r, before);
    }

    // =========================================================================
    // derive
    // =========================================================================

    #[test]
    fn derive_decodes_scales_encodes() {
        let backend = MockBackend::with_rasters(vec![gradient(400, 300)]);
        let out = derive(&backend, &params(ScaleMode::Width(200)), &pool()).unwrap();

        assert_eq!(out.source_size, (400, 300));
        assert_eq!(out.size, (200, 150));
        assert_eq!(out.filter, Filter::Box);

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], RecordedOp::Decode(p) if p == "/source.png"));
        assert!(matches!(
            &ops[1],
            RecordedOp::Encode {
                width: 200,
                height: 150,
                quality: 85,
                ..
            }
        ));
    }

    #[test]
    fn derive_upscale_uses_upscale_filter() {
        let backend = MockBackend::with_rasters(vec![gradient(20, 10)]);
        let out = derive(&backend, &params(ScaleMode::Percent(200.0)), &pool()).unwrap();
        assert_eq!(out.size, (40, 20));
        assert_eq!(out.filter, Filter::Bicubic);
    }

    #[test]
    fn derive_explicit_filter() {
        let backend = MockBackend::with_rasters(vec![gradient(20, 10)]);
        let p = DeriveParams {
            filter: Some(Filter::Mitchell),
            sharpen: Sharpen(0.5),
            ..params(ScaleMode::Exact { width: 7, height: 7 })
        };
        let out = derive(&backend, &p, &pool()).unwrap();
        assert_eq!(out.filter, Filter::Mitchell);
        assert_eq!(out.size, (7, 7));
    }

    #[test]
    fn derive_decode_failure_propagates() {
        let backend = MockBackend::new();
        let err = derive(&backend, &params(ScaleMode::Full), &pool()).unwrap_err();
        assert!(matches!(err, BackendError::ProcessingFailed(_)));
        assert!(
            !backend
                .get_operations()
                .iter()
                .any(|op| matches!(op, RecordedOp::Encode { .. }))
        );
    }
}
