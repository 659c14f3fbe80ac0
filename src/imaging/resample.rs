//! Separable weighted-contribution scaler.
//!
//! Scaling runs in two passes over 8-bit interleaved samples:
//!
//! 1. **Horizontal**: every source row is resampled to the destination
//!    width, producing an intermediate `src_height x dest_width` buffer.
//!    Intermediate samples are rounded back to bytes.
//! 2. **Vertical**: every destination row is computed from the
//!    intermediate rows listed in the vertical contribution table.
//!
//! Both passes are split across a [`WorkerPool`] by output row: row `y` goes
//! to worker `y % N`. The vertical pass writes whole destination rows, each
//! reading every column of the intermediate buffer. An optional unsharp mask
//! runs over the assembled result.

use super::contributions::ContributionTable;
use super::error::ResampleError;
use super::filters::Filter;
use super::pool::WorkerPool;
use super::raster::{ColorInterpretation, Raster};
use super::sharpen::UnsharpMask;
use std::time::Instant;
use tracing::debug;

/// Smallest destination size on either axis.
pub const MIN_DEST_SIZE: u32 = 3;

/// A configured resize to a fixed destination size.
///
/// ```
/// use iiif_raster::imaging::{Filter, Raster, ResampleOp, WorkerPool};
///
/// let src = Raster::from_fn(64, 56, |x, y| [x as u8, y as u8, 0]).unwrap();
/// let pool = WorkerPool::new(2).unwrap();
/// let out = ResampleOp::new(32, 28)
///     .with_filter(Filter::Lanczos3)
///     .filter(&src, None, &pool)
///     .unwrap();
/// assert_eq!(out.dimensions(), (32, 28));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResampleOp {
    dest_width: u32,
    dest_height: u32,
    kernel: Filter,
    linear_output: bool,
    unsharp_amount: f32,
}

impl ResampleOp {
    pub fn new(dest_width: u32, dest_height: u32) -> Self {
        Self {
            dest_width,
            dest_height,
            kernel: Filter::default(),
            linear_output: false,
            unsharp_amount: 0.0,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.kernel = filter;
        self
    }

    /// Tag freshly allocated destinations as linear-light.
    pub fn with_linear_output(mut self, linear: bool) -> Self {
        self.linear_output = linear;
        self
    }

    /// Sharpen the result by `amount`. Values within 1e-4 of zero disable
    /// the pass.
    pub fn with_unsharpen_mask(mut self, amount: f32) -> Self {
        self.unsharp_amount = amount;
        self
    }

    pub fn dest_size(&self) -> (u32, u32) {
        (self.dest_width, self.dest_height)
    }

    pub fn kernel(&self) -> Filter {
        self.kernel
    }

    /// Resample `source`.
    ///
    /// If `dest` has the target dimensions its buffer is overwritten and
    /// returned; its channel count must match the source. Any other `dest`
    /// is dropped and a new raster allocated.
    pub fn filter(
        &self,
        source: &Raster,
        dest: Option<Raster>,
        pool: &WorkerPool,
    ) -> Result<Raster, ResampleError> {
        let (dst_w, dst_h) = (self.dest_width, self.dest_height);
        if dst_w < MIN_DEST_SIZE || dst_h < MIN_DEST_SIZE {
            return Err(ResampleError::InvalidArgument(format!(
                "target size was {dst_w}x{dst_h} but must be at least {MIN_DEST_SIZE}x{MIN_DEST_SIZE}"
            )));
        }
        let (src_w, src_h) = source.dimensions();
        if src_w == 0 || src_h == 0 {
            return Err(ResampleError::InvalidArgument(format!(
                "source image is {src_w}x{src_h}"
            )));
        }
        let channels = source.channels();

        let mut out = match dest {
            Some(d) if d.dimensions() == (dst_w, dst_h) => {
                if d.channels() != channels {
                    return Err(ResampleError::InvalidArgument(format!(
                        "Source image has {} channels; destination image has {} channels",
                        channels,
                        d.channels()
                    )));
                }
                d
            }
            _ => {
                let interpretation = if self.linear_output {
                    ColorInterpretation::Linear
                } else {
                    ColorInterpretation::Gamma
                };
                Raster::blank(dst_w, dst_h, channels)?.with_interpretation(interpretation)
            }
        };

        let started = Instant::now();
        let horizontal = ContributionTable::build(self.kernel, src_w, dst_w);
        let vertical = ContributionTable::build(self.kernel, src_h, dst_h);

        let ch = channels as usize;
        let work_stride = dst_w as usize * ch;
        let mut work = vec![0u8; src_h as usize * work_stride];
        pool.for_each_row(&mut work, work_stride, |y, row| {
            resample_row(source.row(y as u32), row, &horizontal, ch);
        })?;

        let work = &work;
        pool.for_each_row(out.as_bytes_mut(), work_stride, |y, row| {
            resample_column_band(work, work_stride, row, vertical.entries(y));
        })?;

        let sharpen = UnsharpMask::new(self.unsharp_amount);
        if sharpen.has_effect() {
            sharpen.apply(&mut out, pool)?;
        }

        debug!(
            filter = self.kernel.display_name(),
            src = %format_args!("{src_w}x{src_h}"),
            dst = %format_args!("{dst_w}x{dst_h}"),
            channels,
            threads = pool.threads(),
            sharpen = self.unsharp_amount,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "resampled"
        );
        Ok(out)
    }
}

/// Resample `source` to `dest_width x dest_height` on the shared pool.
pub fn resample(
    source: &Raster,
    dest_width: u32,
    dest_height: u32,
    filter: Filter,
    linear_output: bool,
    unsharp_amount: f32,
) -> Result<Raster, ResampleError> {
    let pool = WorkerPool::shared()?;
    ResampleOp::new(dest_width, dest_height)
        .with_filter(filter)
        .with_linear_output(linear_output)
        .with_unsharpen_mask(unsharp_amount)
        .filter(source, None, pool)
}

/// Round a weighted sum to a byte.
#[inline]
pub(crate) fn to_byte(v: f32) -> u8 {
    if v < 0.0 {
        0
    } else if v > 255.0 {
        255
    } else {
        (v + 0.5) as u8
    }
}

fn resample_row(src: &[u8], dst: &mut [u8], table: &ContributionTable, ch: usize) {
    for (i, out) in dst.chunks_exact_mut(ch).enumerate() {
        let (pixels, weights) = table.entries(i);
        for (c, sample) in out.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (&p, &w) in pixels.iter().zip(weights) {
                acc += src[p as usize * ch + c] as f32 * w;
            }
            *sample = to_byte(acc);
        }
    }
}

/// One destination row of the vertical pass. Every sample depends only on
/// the same sample position in the contributing intermediate rows.
fn resample_column_band(work: &[u8], stride: usize, dst: &mut [u8], (rows, weights): (&[u32], &[f32])) {
    for (s, sample) in dst.iter_mut().enumerate() {
        let mut acc = 0.0f32;
        for (&r, &w) in rows.iter().zip(weights) {
            acc += work[r as usize * stride + s] as f32 * w;
        }
        *sample = to_byte(acc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> WorkerPool {
        WorkerPool::new(3).unwrap()
    }

    fn gradient(w: u32, h: u32) -> Raster {
        Raster::from_fn(w, h, |x, y| [(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8]).unwrap()
    }

    // =========================================================================
    // to_byte
    // =========================================================================

    #[test]
    fn to_byte_clamps_and_rounds() {
        assert_eq!(to_byte(-3.2), 0);
        assert_eq!(to_byte(300.0), 255);
        assert_eq!(to_byte(254.6), 255);
        assert_eq!(to_byte(12.49), 12);
        assert_eq!(to_byte(12.5), 13);
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    #[test]
    fn downscale_dimensions() {
        let out = ResampleOp::new(32, 28).filter(&gradient(64, 56), None, &pool()).unwrap();
        assert_eq!(out.dimensions(), (32, 28));
        assert_eq!(out.as_bytes().len(), 32 * 28 * 3);
    }

    #[test]
    fn upscale_dimensions() {
        let out = ResampleOp::new(50, 9)
            .with_filter(Filter::Mitchell)
            .filter(&gradient(10, 3), None, &pool())
            .unwrap();
        assert_eq!(out.dimensions(), (50, 9));
    }

    #[test]
    fn target_below_three_rejected() {
        let src = gradient(10, 10);
        for (w, h) in [(2, 10), (10, 2), (0, 0)] {
            let err = ResampleOp::new(w, h).filter(&src, None, &pool()).unwrap_err();
            assert!(matches!(err, ResampleError::InvalidArgument(_)), "{w}x{h}");
        }
    }

    #[test]
    fn empty_source_rejected() {
        let src = Raster::blank(0, 5, 3).unwrap();
        assert!(ResampleOp::new(4, 4).filter(&src, None, &pool()).is_err());
    }

    // =========================================================================
    // Values
    // =========================================================================

    #[test]
    fn flat_color_stays_flat() {
        let src = Raster::from_fn(40, 30, |_, _| [200u8, 10, 77, 255]).unwrap();
        for f in Filter::ALL {
            let out = ResampleOp::new(13, 17).with_filter(f).filter(&src, None, &pool()).unwrap();
            for px in out.as_bytes().chunks(4) {
                assert_eq!(px, &[200, 10, 77, 255], "{f}");
            }
        }
    }

    #[test]
    fn box_same_size_is_identity() {
        let src = gradient(20, 15);
        let out = ResampleOp::new(20, 15)
            .with_filter(Filter::Box)
            .filter(&src, None, &pool())
            .unwrap();
        assert_eq!(out.as_bytes(), src.as_bytes());
    }

    #[test]
    fn box_halving_averages_blocks() {
        let src = Raster::from_fn(6, 6, |x, y| [if (x / 2 + y / 2) % 2 == 0 { 0u8 } else { 100 }]).unwrap();
        let out = ResampleOp::new(3, 3)
            .with_filter(Filter::Box)
            .filter(&src, None, &pool())
            .unwrap();
        assert_eq!(out.as_bytes(), &[0, 100, 0, 100, 0, 100, 0, 100, 0]);
    }

    #[test]
    fn thread_count_does_not_change_output() {
        let src = gradient(37, 23);
        let op = ResampleOp::new(19, 41).with_filter(Filter::Lanczos3);
        let one = op.filter(&src, None, &WorkerPool::new(1).unwrap()).unwrap();
        let many = op.filter(&src, None, &WorkerPool::new(5).unwrap()).unwrap();
        assert_eq!(one, many);
    }

    #[test]
    fn gray_and_gray_alpha_supported() {
        let gray = Raster::from_fn(8, 8, |x, _| [(x * 30) as u8]).unwrap();
        let out = ResampleOp::new(4, 4).filter(&gray, None, &pool()).unwrap();
        assert_eq!(out.channels(), 1);
        let ga = Raster::from_fn(8, 8, |x, _| [(x * 30) as u8, 255]).unwrap();
        let out = ResampleOp::new(4, 4).filter(&ga, None, &pool()).unwrap();
        assert_eq!(out.channels(), 2);
        assert!(out.as_bytes().chunks(2).all(|px| px[1] == 255));
    }

    // =========================================================================
    // Destination handling
    // =========================================================================

    #[test]
    fn linear_output_tags_new_destination() {
        let out = ResampleOp::new(5, 5)
            .with_linear_output(true)
            .filter(&gradient(10, 10), None, &pool())
            .unwrap();
        assert_eq!(out.interpretation(), ColorInterpretation::Linear);
    }

    #[test]
    fn matching_destination_is_reused() {
        let dest = Raster::blank(5, 5, 3).unwrap();
        let ptr = dest.as_bytes().as_ptr();
        let out = ResampleOp::new(5, 5)
            .filter(&gradient(10, 10), Some(dest), &pool())
            .unwrap();
        assert_eq!(out.as_bytes().as_ptr(), ptr);
    }

    #[test]
    fn destination_channel_mismatch_names_both_counts() {
        let dest = Raster::blank(5, 5, 4).unwrap();
        let err = ResampleOp::new(5, 5)
            .filter(&gradient(10, 10), Some(dest), &pool())
            .unwrap_err();
        assert_eq!(
            err,
            ResampleError::InvalidArgument(
                "Source image has 3 channels; destination image has 4 channels".into()
            )
        );
    }

    #[test]
    fn wrong_size_destination_is_replaced() {
        let dest = Raster::blank(9, 9, 4).unwrap();
        let out = ResampleOp::new(5, 5)
            .filter(&gradient(10, 10), Some(dest), &pool())
            .unwrap();
        assert_eq!(out.dimensions(), (5, 5));
        assert_eq!(out.channels(), 3);
    }

    // =========================================================================
    // Sharpening
    // =========================================================================

    #[test]
    fn tiny_unsharp_amount_is_ignored() {
        let src = gradient(30, 30);
        let plain = ResampleOp::new(12, 12).filter(&src, None, &pool()).unwrap();
        let near_zero = ResampleOp::new(12, 12)
            .with_unsharpen_mask(0.00005)
            .filter(&src, None, &pool())
            .unwrap();
        assert_eq!(plain, near_zero);
    }

    #[test]
    fn unsharp_changes_edges() {
        let src = Raster::from_fn(40, 40, |x, _| [if x < 20 { 60u8 } else { 190 }]).unwrap();
        let plain = ResampleOp::new(20, 20).filter(&src, None, &pool()).unwrap();
        let sharp = ResampleOp::new(20, 20)
            .with_unsharpen_mask(0.8)
            .filter(&src, None, &pool())
            .unwrap();
        assert_ne!(plain, sharp);
    }

    #[test]
    fn free_function_uses_shared_pool() {
        let out = resample(&gradient(64, 56), 32, 28, Filter::Lanczos3, false, 0.0).unwrap();
        assert_eq!(out.as_bytes().len(), 32 * 28 * 3);
    }
}
