//! In-memory pixel grids exchanged between decoders, the resampler, and
//! encoders.
//!
//! A [`Raster`] is always 8 bits per channel, row-major, with channels
//! interleaved in a fixed order (`Gray`, `GrayAlpha`, `RGB`, `RGBA`). When a
//! raster has an alpha channel it is always the last one.

use super::error::ResampleError;

/// How downstream encoders should interpret the sample values.
///
/// The resampler's arithmetic never looks at this; it only decides which tag
/// a freshly allocated destination carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorInterpretation {
    /// Gamma-encoded (sRGB-like) samples.
    #[default]
    Gamma,
    /// Linear-light samples.
    Linear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    channels: u8,
    interpretation: ColorInterpretation,
    data: Vec<u8>,
}

impl Raster {
    /// Wrap an existing buffer. Fails if the buffer length doesn't match
    /// `width * height * channels` or the channel count is not 1-4.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, ResampleError> {
        check_channels(channels)?;
        let expected = buffer_len(width, height, channels);
        if data.len() != expected {
            return Err(ResampleError::InvalidArgument(format!(
                "buffer of {} bytes does not match {}x{}x{} ({} bytes)",
                data.len(),
                width,
                height,
                channels,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            interpretation: ColorInterpretation::Gamma,
            data,
        })
    }

    /// A zero-filled raster.
    pub fn blank(width: u32, height: u32, channels: u8) -> Result<Self, ResampleError> {
        check_channels(channels)?;
        Self::new(
            width,
            height,
            channels,
            vec![0; buffer_len(width, height, channels)],
        )
    }

    /// Build a raster by evaluating `f(x, y)` for every pixel.
    pub fn from_fn<const C: usize>(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> [u8; C],
    ) -> Result<Self, ResampleError> {
        let channels = u8::try_from(C)
            .map_err(|_| ResampleError::InvalidArgument(format!("{C} channels")))?;
        check_channels(channels)?;
        let mut data = Vec::with_capacity(buffer_len(width, height, channels));
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self::new(width, height, channels, data)
    }

    pub fn with_interpretation(mut self, interpretation: ColorInterpretation) -> Self {
        self.interpretation = interpretation;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn has_alpha(&self) -> bool {
        self.channels == 2 || self.channels == 4
    }

    pub fn interpretation(&self) -> ColorInterpretation {
        self.interpretation
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// One row of interleaved samples.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Samples of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let ch = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * ch;
        &self.data[start..start + ch]
    }
}

pub(crate) fn buffer_len(width: u32, height: u32, channels: u8) -> usize {
    width as usize * height as usize * channels as usize
}

fn check_channels(channels: u8) -> Result<(), ResampleError> {
    if (1..=4).contains(&channels) {
        Ok(())
    } else {
        Err(ResampleError::InvalidArgument(format!(
            "unsupported channel count {channels} (expected 1-4)"
        )))
    }
}
