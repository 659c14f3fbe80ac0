//! # iiif-raster
//!
//! The raster core of an image server: a weighted-contribution resampler
//! and forward-only metadata readers for chunked image formats.
//!
//! # Architecture
//!
//! ```text
//! decode (backend) → Raster → ResampleOp → Raster → encode (backend)
//! file → ByteStream → Gif / Jpeg / Jpeg2000 reader → metadata record
//! ```
//!
//! The resampler never touches files and the readers never decode pixels.
//! Codecs are delegated to the `image` crate behind
//! [`imaging::ImageBackend`], so the pipeline can be tested against a mock.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | `Raster`, kernels, contribution tables, worker pool, unsharp mask, backend, scale/derive operations |
//! | [`metadata`] | GIF, JPEG and JPEG2000 chunk readers, IPTC decoding, format detection, `read_info` |
//! | [`cache`] | Content-addressed derivative cache for the CLI |
//! | [`config`] | Layered `iiif-raster.toml` loading and validation |
//! | [`logging`] | `tracing-subscriber` setup |
//! | [`output`] | CLI output formatting |
//!
//! # Example
//!
//! ```
//! use iiif_raster::imaging::{resample, Filter, Raster};
//!
//! let src = Raster::from_fn(64, 56, |x, y| [x as u8, y as u8, 128]).unwrap();
//! let dst = resample(&src, 32, 28, Filter::Lanczos3, false, 0.0).unwrap();
//! assert_eq!(dst.as_bytes().len(), 32 * 28 * 3);
//! ```

pub mod cache;
pub mod config;
pub mod imaging;
pub mod logging;
pub mod metadata;
pub mod output;
