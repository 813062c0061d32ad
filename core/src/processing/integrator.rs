//! Decimating power integrator.
//!
//! Power spectra are summed bin by bin in `f64` and every `nb_integration`
//! frames the mean is emitted, so the output rate is the input rate divided
//! by `nb_integration`.

use crate::math::stats::StatsHelper;
use crate::prelude::{clamp_integration, expect_len, ProcessingStage, StageError, StageResult};
use crate::telemetry::log::LogManager;
use ndarray::ArrayView2;

pub struct Integrator {
    vec_len: usize,
    nb_integration: usize,
    iteration: usize,
    accumulator: Vec<f64>,
    logger: LogManager,
}

impl Integrator {
    /// `nb_integration` values below 1 are clamped to 1.
    pub fn new(vec_len: usize, nb_integration: i64) -> StageResult<Self> {
        if vec_len == 0 {
            return Err(StageError::Config("vector length must be positive".into()));
        }
        Ok(Self {
            vec_len,
            nb_integration: clamp_integration(nb_integration),
            iteration: 0,
            accumulator: vec![0.0; vec_len],
            logger: LogManager::new("spectrocore::integrator"),
        })
    }

    /// Changes the divisor used at the next emission. Frames already summed
    /// and the iteration counter are kept.
    pub fn set_integration_count(&mut self, nb_integration: i64) {
        self.nb_integration = clamp_integration(nb_integration);
        self.logger.record(&format!(
            "integration count set to {} ({} frames pending)",
            self.nb_integration, self.iteration
        ));
    }

    /// Adds one power frame. Returns the averaged spectrum when this frame
    /// completes an integration period, `None` otherwise.
    pub fn push_frame(&mut self, frame: &[f32]) -> StageResult<Option<Vec<f32>>> {
        expect_len("integrator", self.vec_len, frame.len())?;
        for (acc, &value) in self.accumulator.iter_mut().zip(frame) {
            *acc += f64::from(value);
        }
        self.iteration += 1;

        if self.iteration < self.nb_integration {
            return Ok(None);
        }

        let divisor = self.nb_integration as f64;
        let averaged: Vec<f32> = self
            .accumulator
            .iter()
            .map(|&sum| (sum / divisor) as f32)
            .collect();
        self.reset();
        self.logger.detail(&format!(
            "integrated {} frames, RMS {:.4e}",
            self.nb_integration,
            StatsHelper::rms(&averaged)
        ));
        Ok(Some(averaged))
    }

    /// Feeds every row of `frames` in order and returns one averaged spectrum
    /// per completed integration period (possibly none).
    pub fn accumulate(&mut self, frames: ArrayView2<f32>) -> StageResult<Vec<Vec<f32>>> {
        expect_len("integrator batch", self.vec_len, frames.ncols())?;
        let mut emitted = Vec::new();
        for row in frames.rows() {
            let frame: Vec<f32> = row.iter().copied().collect();
            if let Some(averaged) = self.push_frame(&frame)? {
                emitted.push(averaged);
            }
        }
        Ok(emitted)
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn nb_integration(&self) -> usize {
        self.nb_integration
    }

    pub fn reset(&mut self) {
        self.accumulator.fill(0.0);
        self.iteration = 0;
    }
}

impl ProcessingStage for Integrator {
    type Input = [f32];
    type Output = Option<Vec<f32>>;

    fn execute(&mut self, input: &[f32]) -> StageResult<Option<Vec<f32>>> {
        self.push_frame(input)
    }

    fn cleanup(&mut self) {
        self.reset();
    }
}
