//! Image processing: the resampling engine and the codec boundary around it.
//!
//! | Operation | Implementation |
//! |---|---|
//! | **Resample** | [`ResampleOp`]: separable weighted-contribution scaling, [`Filter`] kernels |
//! | **Sharpen** | [`UnsharpMask`]: Gaussian unsharp mask with threshold |
//! | **Parallelism** | [`WorkerPool`]: fixed rayon pool, row partitions |
//! | **Decode / encode** | [`RustBackend`] over the `image` crate |
//!
//! The module is split into:
//! - **Raster**: the 8-bit pixel grid every stage exchanges
//! - **Resampler**: filters, contribution tables, the two-pass resample, unsharp mask
//! - **Calculations**: Pure functions for size math and kernel choice (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations, resampler and backend

pub mod backend;
mod calculations;
pub mod contributions;
pub mod error;
pub mod filters;
pub mod operations;
mod params;
pub mod pool;
pub mod raster;
pub mod resample;
pub mod rust_backend;
pub mod sharpen;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{default_filter, is_downscale, resulting_size};
pub use contributions::ContributionTable;
pub use error::ResampleError;
pub use filters::Filter;
pub use operations::{Derivative, derive, get_dimensions, scale, sharpen};
pub use params::{DeriveParams, FilterPolicy, Quality, ScaleMode, Sharpen};
pub use pool::WorkerPool;
pub use raster::{ColorInterpretation, Raster};
pub use resample::{MIN_DEST_SIZE, ResampleOp, resample};
pub use rust_backend::RustBackend;
pub use sharpen::UnsharpMask;
