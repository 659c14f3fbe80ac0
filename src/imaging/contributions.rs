//! Per-axis contribution tables.
//!
//! A table maps every destination index along one axis to the source
//! indices that feed it and their normalized weights. Tables are stored
//! flat: `offsets[i]..offsets[i + 1]` delimits the entries of index `i`
//! inside `pixels` and `weights`.

use super::filters::Filter;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct ContributionTable {
    offsets: Vec<usize>,
    pixels: Vec<u32>,
    weights: Vec<f32>,
}

impl ContributionTable {
    /// Build the table mapping `src_size` samples onto `dst_size` samples.
    ///
    /// Both sizes must be non-zero; callers validate geometry first.
    pub fn build(filter: Filter, src_size: u32, dst_size: u32) -> Self {
        let scale = dst_size as f32 / src_size as f32;
        let radius = filter.radius();
        let center_offset = 0.5 / scale;

        // Shrinking widens the kernel to cover every source pixel that
        // falls under one destination pixel.
        let (width, norm) = if scale < 1.0 {
            let width = radius / scale;
            (width, 1.0 / (width.ceil() / radius))
        } else {
            (radius, 1.0)
        };

        let per_index = (width * 2.0 + 2.0) as usize;
        let mut table = Self {
            offsets: Vec::with_capacity(dst_size as usize + 1),
            pixels: Vec::with_capacity(dst_size as usize * per_index),
            weights: Vec::with_capacity(dst_size as usize * per_index),
        };
        table.offsets.push(0);

        let src = src_size as i64;
        for i in 0..dst_size {
            let start = table.pixels.len();
            let center = i as f32 / scale + center_offset;
            let left = (center - width).floor() as i64;
            let right = (center + width).ceil() as i64;

            for j in left..=right {
                let weight = filter.weight((center - j as f32) * norm);
                if weight == 0.0 {
                    continue;
                }
                let n = reflect(j, src);
                if (0..src).contains(&n) {
                    table.pixels.push(n as u32);
                    table.weights.push(weight);
                } else {
                    // Still outside after one reflection (tiny sources).
                    // Keep the slot but make it inert.
                    table.pixels.push(n.clamp(0, src - 1) as u32);
                    table.weights.push(0.0);
                }
            }

            let entries = &mut table.weights[start..];
            let total: f32 = entries.iter().sum();
            if total != 0.0 {
                for w in entries.iter_mut() {
                    *w /= total;
                }
            } else {
                warn!(
                    index = i,
                    src_size, dst_size, filter = %filter,
                    "contribution weights sum to zero"
                );
            }
            table.offsets.push(table.pixels.len());
        }
        table
    }

    /// Number of destination indices.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(source indices, weights)` feeding destination index `i`.
    pub fn entries(&self, i: usize) -> (&[u32], &[f32]) {
        let range = self.offsets[i]..self.offsets[i + 1];
        (&self.pixels[range.clone()], &self.weights[range])
    }

    pub fn weight_sum(&self, i: usize) -> f32 {
        self.entries(i).1.iter().sum()
    }

    /// Largest number of entries recorded for any index.
    pub fn max_contributors(&self) -> usize {
        self.offsets
            .windows(2)
            .map(|w| w[1] - w[0])
            .max()
            .unwrap_or(0)
    }
}

/// Mirror an out-of-range candidate back into the source, once.
fn reflect(j: i64, size: i64) -> i64 {
    if j < 0 {
        -j
    } else if j >= size {
        2 * size - j - 1
    } else {
        j
    }
}
