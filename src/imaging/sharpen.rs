//! Unsharp masking.
//!
//! The raster is blurred with a separable Gaussian (edges clamped), then
//! every color sample that differs from its blurred counterpart by at least
//! `threshold` is pushed away from it:
//!
//! ```text
//! out = clamp((amount + 1) * (orig - blur) + blur)
//! ```
//!
//! Alpha is never modified.

use super::error::ResampleError;
use super::pool::WorkerPool;
use super::raster::Raster;
use super::resample::to_byte;

pub const DEFAULT_RADIUS: f32 = 2.0;
pub const DEFAULT_THRESHOLD: u8 = 10;

/// Amounts at or below this magnitude are treated as "no sharpening".
const MIN_AMOUNT: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnsharpMask {
    radius: f32,
    amount: f32,
    threshold: u8,
}

impl UnsharpMask {
    pub fn new(amount: f32) -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            amount,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn amount(&self) -> f32 {
        self.amount
    }

    pub fn has_effect(&self) -> bool {
        self.amount.abs() > MIN_AMOUNT
    }

    /// Sharpen `raster` in place.
    pub fn apply(&self, raster: &mut Raster, pool: &WorkerPool) -> Result<(), ResampleError> {
        if !self.has_effect() || raster.as_bytes().is_empty() {
            return Ok(());
        }
        let kernel = gaussian_kernel(self.radius);
        let ch = raster.channels() as usize;
        let color_channels = if raster.has_alpha() { ch - 1 } else { ch };
        let stride = raster.stride();
        let height = raster.height() as usize;

        let mut horizontal = vec![0u8; raster.as_bytes().len()];
        {
            let src: &Raster = raster;
            pool.for_each_row(&mut horizontal, stride, |y, row| {
                blur_row(src.row(y as u32), row, &kernel, ch);
            })?;
        }

        let mut blurred = vec![0u8; horizontal.len()];
        {
            let horizontal = &horizontal;
            pool.for_each_row(&mut blurred, stride, |y, row| {
                blur_column_band(horizontal, stride, height, y, row, &kernel);
            })?;
        }

        let amount = self.amount;
        let threshold = self.threshold as i32;
        let blurred = &blurred;
        pool.for_each_row(raster.as_bytes_mut(), stride, |y, row| {
            let blur = &blurred[y * stride..(y + 1) * stride];
            for (px, bpx) in row.chunks_exact_mut(ch).zip(blur.chunks_exact(ch)) {
                for c in 0..color_channels {
                    let o = px[c] as i32;
                    let b = bpx[c] as i32;
                    if (o - b).abs() >= threshold {
                        let v = ((amount + 1.0) * (o - b) as f32 + b as f32) as i32;
                        px[c] = v.clamp(0, 255) as u8;
                    }
                }
            }
        })
    }
}

/// Normalized 1-D Gaussian with `ceil(radius) * 2 + 1` taps and
/// `sigma = radius / 3`. Taps further than `radius` from the center are 0.
pub fn gaussian_kernel(radius: f32) -> Vec<f32> {
    let r = radius.ceil().max(0.0) as i32;
    let sigma = (radius / 3.0).max(f32::EPSILON);
    let sigma22 = 2.0 * sigma * sigma;
    let sqrt_sigma_pi2 = (2.0 * std::f32::consts::PI * sigma).sqrt();
    let radius2 = radius * radius;

    let mut taps: Vec<f32> = (-r..=r)
        .map(|d| {
            let distance = (d * d) as f32;
            if distance > radius2 {
                0.0
            } else {
                (-distance / sigma22).exp() / sqrt_sigma_pi2
            }
        })
        .collect();
    let total: f32 = taps.iter().sum();
    if total > 0.0 {
        for t in &mut taps {
            *t /= total;
        }
    }
    taps
}

fn blur_row(src: &[u8], dst: &mut [u8], kernel: &[f32], ch: usize) {
    let half = (kernel.len() / 2) as isize;
    let last = (src.len() / ch) as isize - 1;
    for (x, out) in dst.chunks_exact_mut(ch).enumerate() {
        for (c, sample) in out.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (k, &w) in kernel.iter().enumerate() {
                let sx = (x as isize + k as isize - half).clamp(0, last) as usize;
                acc += src[sx * ch + c] as f32 * w;
            }
            *sample = to_byte(acc);
        }
    }
}

fn blur_column_band(src: &[u8], stride: usize, height: usize, y: usize, dst: &mut [u8], kernel: &[f32]) {
    let half = (kernel.len() / 2) as isize;
    let last = height as isize - 1;
    for (s, sample) in dst.iter_mut().enumerate() {
        let mut acc = 0.0f32;
        for (k, &w) in kernel.iter().enumerate() {
            let sy = (y as isize + k as isize - half).clamp(0, last) as usize;
            acc += src[sy * stride + s] as f32 * w;
        }
        *sample = to_byte(acc);
    }
}
