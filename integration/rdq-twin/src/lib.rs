//! Digital twin of the rdq coprocessor.
//!
//! [`Twin`] implements [`rdq_hal::Coprocessor`] by executing every kick
//! inline: a queue engine model interprets the stream and a rasterizer
//! model draws into the shared memory. Tests and the CLI use it to check
//! rendered pixels instead of encoded bytes.

pub mod dump;
pub mod error;
pub mod interp;
pub mod raster;

pub use error::TwinError;
pub use interp::{Twin, TwinStats, MAX_CALL_DEPTH};
pub use raster::{Image, RasterStats, Rasterizer, Scissor, Submission, TraceEntry};
