//! Pure calculation functions for derivative sizes and kernel choice.
//!
//! All functions here are pure and testable without any I/O or images.

use super::filters::Filter;
use super::params::{FilterPolicy, ScaleMode};

/// Output size for `source` under `mode`.
///
/// Aspect-preserving modes round to the nearest pixel; no axis goes below 1.
///
/// # Examples
/// ```
/// # use iiif_raster::imaging::{ScaleMode, resulting_size};
/// assert_eq!(resulting_size((1000, 750), ScaleMode::Width(400)), (400, 300));
/// assert_eq!(resulting_size((1000, 750), ScaleMode::Fit { width: 300, height: 300 }), (300, 225));
/// assert_eq!(resulting_size((64, 56), ScaleMode::Percent(50.0)), (32, 28));
/// ```
pub fn resulting_size(source: (u32, u32), mode: ScaleMode) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (w, h) = (src_w as f64, src_h as f64);

    let (out_w, out_h) = match mode {
        ScaleMode::Full => (w, h),
        ScaleMode::Width(target) => (target as f64, h * target as f64 / w),
        ScaleMode::Height(target) => (w * target as f64 / h, target as f64),
        ScaleMode::Fit { width, height } => {
            let scale = (width as f64 / w).min(height as f64 / h);
            (w * scale, h * scale)
        }
        ScaleMode::Exact { width, height } => (width as f64, height as f64),
        ScaleMode::Percent(pct) => (w * pct / 100.0, h * pct / 100.0),
    };

    (to_pixels(out_w), to_pixels(out_h))
}

fn to_pixels(v: f64) -> u32 {
    if v.is_finite() {
        (v.round() as u32).max(1)
    } else {
        1
    }
}

/// True when either axis shrinks.
pub fn is_downscale(source: (u32, u32), target: (u32, u32)) -> bool {
    target.0 < source.0 || target.1 < source.1
}

/// Kernel for a resize from `source` to `target`: the requested one if any,
/// else the policy's downscale or upscale kernel.
pub fn default_filter(
    requested: Option<Filter>,
    source: (u32, u32),
    target: (u32, u32),
    policy: &FilterPolicy,
) -> Filter {
    requested.unwrap_or(if is_downscale(source, target) {
        policy.downscale
    } else {
        policy.upscale
    })
}
