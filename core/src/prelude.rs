use crate::interface::CalibrationMode;
use crate::math::window::WindowKind;
use crate::processing::calibrator::CalibrationSettings;
use crate::recording::FrequencyWindow;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Shared configuration for the whole spectrometer chain.
///
/// Defaults follow the reference flowgraph: 4096 channels sampled at 2.5 MHz,
/// a 4-tap Hamming PFB and 25 integrated spectra per output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub vec_len: usize,
    pub num_taps: usize,
    pub window: WindowKind,
    /// Non-positive values are clamped to 1.
    pub nb_integration: i64,
    pub calibration: CalibrationMode,
    pub calibration_settings: CalibrationSettings,
    pub sample_rate: f64,
    pub azimuth: f64,
    pub elevation: f64,
    pub record: bool,
    pub output_dir: PathBuf,
    pub flush_rows: usize,
    pub band: FrequencyWindow,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vec_len: 4096,
            num_taps: 4,
            window: WindowKind::Hamming,
            nb_integration: 25,
            calibration: CalibrationMode::Hot,
            calibration_settings: CalibrationSettings::default(),
            sample_rate: 2.5e6,
            azimuth: 0.0,
            elevation: 0.0,
            record: false,
            output_dir: PathBuf::from("."),
            flush_rows: 1000,
            band: FrequencyWindow::default(),
        }
    }
}

impl PipelineConfig {
    pub fn integration_count(&self) -> usize {
        clamp_integration(self.nb_integration)
    }
}

/// Clamp a requested integration count to the valid `[1, ∞)` range.
pub fn clamp_integration(requested: i64) -> usize {
    requested.max(1) as usize
}

/// Common error type for stage execution.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("recording I/O failure on {}: {}", .path.display(), .source)]
    RecordingIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type StageResult<T> = Result<T, StageError>;

/// Rejects vectors whose length does not match the configured channel count.
pub(crate) fn expect_len(stage: &str, expected: usize, actual: usize) -> StageResult<()> {
    if expected != actual {
        return Err(StageError::InvalidInput(format!(
            "{} expected a vector of {} bins, got {}",
            stage, expected, actual
        )));
    }
    Ok(())
}

/// Trait describing the streaming stages of the spectrometer.
///
/// `execute` is invoked once per available block; `cleanup` returns the stage
/// to its freshly constructed state (and releases any open resources).
pub trait ProcessingStage {
    type Input: ?Sized;
    type Output;

    fn execute(&mut self, input: &Self::Input) -> StageResult<Self::Output>;
    fn cleanup(&mut self);
}
