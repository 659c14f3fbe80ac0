//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the CLI/config layer and [`operations`](super::operations),
//! which turns them into resampler and backend calls.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1-100, default 90). Clamped on construction.
//! - [`Sharpen`]: unsharp-mask amount applied after scaling.
//! - [`ScaleMode`]: how the target size is derived from the source size.
//! - [`FilterPolicy`]: which kernel to use when none is requested.
//! - [`DeriveParams`]: everything needed for one derivative: source, output, size, filter, quality.

use super::filters::Filter;
use super::sharpen::UnsharpMask;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Unsharp-mask amount. `0.0` disables sharpening.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sharpen(pub f32);

impl Sharpen {
    pub fn amount(self) -> f32 {
        self.0
    }

    pub fn mask(self) -> UnsharpMask {
        UnsharpMask::new(self.0)
    }

    pub fn has_effect(self) -> bool {
        self.mask().has_effect()
    }
}

/// How the output size relates to the source size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleMode {
    /// Keep the source size.
    Full,
    /// Scale to this width, height follows the aspect ratio.
    Width(u32),
    /// Scale to this height, width follows the aspect ratio.
    Height(u32),
    /// Largest aspect-preserving size fitting inside the box.
    Fit { width: u32, height: u32 },
    /// Exactly this size, aspect ratio ignored.
    Exact { width: u32, height: u32 },
    /// Percentage of the source size.
    Percent(f64),
}

/// Kernel choice when the caller does not name one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterPolicy {
    pub downscale: Filter,
    pub upscale: Filter,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            downscale: Filter::Box,
            upscale: Filter::Bicubic,
        }
    }
}

/// Everything needed to produce one derivative image.
#[derive(Debug, Clone, PartialEq)]
pub struct DeriveParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub mode: ScaleMode,
    /// Explicit kernel; `None` defers to `policy`.
    pub filter: Option<Filter>,
    pub policy: FilterPolicy,
    pub sharpen: Sharpen,
    pub linear_output: bool,
    pub quality: Quality,
}
