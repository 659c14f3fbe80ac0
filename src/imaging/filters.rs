//! Interpolation kernels for the resampler.
//!
//! Each [`Filter`] is a stateless weighting function of the signed distance
//! (in source pixels) between a destination sample's center and a source
//! pixel, plus the radius outside of which the weight is zero.
//!
//! Rough guidance from downscaling/upscaling photographic material:
//!
//! | Use | Best-looking first |
//! |---|---|
//! | Downscale | Lanczos3, Box, Bicubic, Mitchell, Triangle, Bell, Hermite, BSpline |
//! | Upscale | Lanczos3, Bicubic, Mitchell, Triangle, Hermite, Bell, BSpline, Box |
//!
//! Box and Triangle are the cheapest; Lanczos3 and Bell the most expensive.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    Bell,
    Bicubic,
    /// Bicubic with `a = -1`: sharper, more ringing.
    #[serde(rename = "bicubic-high-freq")]
    BicubicHighFreq,
    Box,
    #[serde(rename = "bspline")]
    BSpline,
    Hermite,
    #[default]
    Lanczos3,
    Mitchell,
    Triangle,
}

impl Filter {
    pub const ALL: [Filter; 9] = [
        Filter::Bell,
        Filter::Bicubic,
        Filter::BicubicHighFreq,
        Filter::Box,
        Filter::BSpline,
        Filter::Hermite,
        Filter::Lanczos3,
        Filter::Mitchell,
        Filter::Triangle,
    ];

    /// Support radius in source pixels.
    pub fn radius(self) -> f32 {
        match self {
            Filter::Box => 0.5,
            Filter::Triangle | Filter::Hermite => 1.0,
            Filter::Bell => 1.5,
            Filter::BSpline | Filter::Bicubic | Filter::BicubicHighFreq | Filter::Mitchell => 2.0,
            Filter::Lanczos3 => 3.0,
        }
    }

    /// Weight at signed distance `x`.
    pub fn weight(self, x: f32) -> f32 {
        match self {
            Filter::Box => {
                if x > -0.5 && x <= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Filter::Triangle => {
                let x = x.abs();
                if x < 1.0 { 1.0 - x } else { 0.0 }
            }
            Filter::Hermite => {
                let x = x.abs();
                if x < 1.0 {
                    (2.0 * x - 3.0) * x * x + 1.0
                } else {
                    0.0
                }
            }
            Filter::Bell => {
                let x = x.abs();
                if x < 0.5 {
                    0.75 - x * x
                } else if x < 1.5 {
                    let t = x - 1.5;
                    0.5 * t * t
                } else {
                    0.0
                }
            }
            Filter::BSpline => {
                let x = x.abs();
                if x < 1.0 {
                    let xx = x * x;
                    0.5 * xx * x - xx + 2.0 / 3.0
                } else if x < 2.0 {
                    let t = 2.0 - x;
                    t * t * t / 6.0
                } else {
                    0.0
                }
            }
            Filter::Bicubic => cubic_convolution(x, -0.5),
            Filter::BicubicHighFreq => cubic_convolution(x, -1.0),
            Filter::Mitchell => mitchell_netravali(x, 1.0 / 3.0, 1.0 / 3.0),
            Filter::Lanczos3 => {
                if x == 0.0 {
                    return 1.0;
                }
                let x = x.abs();
                if x < 3.0 {
                    let px = x * PI;
                    sinc_scaled(px) * sinc_scaled(px / 3.0)
                } else {
                    0.0
                }
            }
        }
    }

    /// Human-readable name used in logs.
    pub fn display_name(self) -> &'static str {
        match self {
            Filter::Bell => "Bell",
            Filter::Bicubic => "Bicubic",
            Filter::BicubicHighFreq => "Bicubic (high frequency)",
            Filter::Box => "Box",
            Filter::BSpline => "B-Spline",
            Filter::Hermite => "Hermite",
            Filter::Lanczos3 => "Lanczos3",
            Filter::Mitchell => "Mitchell",
            Filter::Triangle => "Triangle",
        }
    }

    /// Configuration/CLI name.
    pub fn name(self) -> &'static str {
        match self {
            Filter::Bell => "bell",
            Filter::Bicubic => "bicubic",
            Filter::BicubicHighFreq => "bicubic-high-freq",
            Filter::Box => "box",
            Filter::BSpline => "bspline",
            Filter::Hermite => "hermite",
            Filter::Lanczos3 => "lanczos3",
            Filter::Mitchell => "mitchell",
            Filter::Triangle => "triangle",
        }
    }
}

/// `sin(x) / x` for an argument already multiplied by pi. `x` is never zero
/// here: the caller handles the origin.
fn sinc_scaled(x: f32) -> f32 {
    x.sin() / x
}

/// Keys' cubic convolution kernel with free parameter `a`.
fn cubic_convolution(x: f32, a: f32) -> f32 {
    let x = x.abs();
    let xx = x * x;
    if x < 1.0 {
        (a + 2.0) * xx * x - (a + 3.0) * xx + 1.0
    } else if x < 2.0 {
        a * xx * x - 5.0 * a * xx + 8.0 * a * x - 4.0 * a
    } else {
        0.0
    }
}

fn mitchell_netravali(x: f32, b: f32, c: f32) -> f32 {
    let x = x.abs();
    let xx = x * x;
    if x < 1.0 {
        ((12.0 - 9.0 * b - 6.0 * c) * xx * x + (-18.0 + 12.0 * b + 6.0 * c) * xx
            + (6.0 - 2.0 * b))
            / 6.0
    } else if x < 2.0 {
        ((-b - 6.0 * c) * xx * x + (6.0 * b + 30.0 * c) * xx + (-12.0 * b - 48.0 * c) * x
            + (8.0 * b + 24.0 * c))
            / 6.0
    } else {
        0.0
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let wanted = match wanted.as_str() {
            "b-spline" => "bspline",
            "lanczos" => "lanczos3",
            "bilinear" => "triangle",
            other => other,
        };
        Filter::ALL
            .into_iter()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Filter::ALL.iter().map(|f| f.name()).collect();
                format!("unknown filter '{s}' (expected one of: {})", names.join(", "))
            })
    }
}
