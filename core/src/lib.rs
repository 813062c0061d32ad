//! Streaming radiometry core for a 21 cm (H I) radio telescope spectrometer.
//!
//! The stages mirror the receiver chain: a polyphase filter bank ahead of the
//! FFT, a decimating power integrator, a Hot/Cold radiometric calibrator and a
//! frequency-gated recorder. Each stage owns its buffers and is driven one
//! block at a time by the caller.

pub mod interface;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod recording;
pub mod telemetry;

pub use prelude::{PipelineConfig, ProcessingStage, StageError, StageResult};
