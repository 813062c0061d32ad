use num_complex::Complex32;
use spectrocore::interface::{CalibrationOutput, ControlCommand};
use spectrocore::math::{power_spectrum, FftHelper, SpectralTransform};
use spectrocore::prelude::{PipelineConfig, StageError, StageResult};
use spectrocore::processing::{
    Calibrator, Integrator, LineFitter, LineProfile, PolyphaseFilterBank,
};
use spectrocore::recording::{Recorder, RecorderConfig};
use spectrocore::telemetry::{LogManager, MetricsRecorder, MetricsSnapshot};
use std::sync::Arc;

/// The assembled receive chain: PFB, FFT, |x|², integrator, calibrator,
/// recorder and line fit, driven one sample block at a time.
pub struct Spectrometer {
    pfb: PolyphaseFilterBank,
    fft: FftHelper,
    integrator: Integrator,
    calibrator: Calibrator,
    recorder: Recorder,
    line_fitter: LineFitter,
    line: Option<LineProfile>,
    metrics: Arc<MetricsRecorder>,
    recording_error: Option<StageError>,
    logger: LogManager,
}

impl Spectrometer {
    pub fn new(config: &PipelineConfig) -> StageResult<Self> {
        let pfb = PolyphaseFilterBank::new(config.vec_len, config.window, config.num_taps)?;
        let integrator = Integrator::new(config.vec_len, config.nb_integration)?;
        let calibrator = Calibrator::new(
            config.calibration,
            config.vec_len,
            config.sample_rate,
            config.calibration_settings.clone(),
        )?;
        let recorder = Recorder::new(RecorderConfig::from_pipeline(config))?;
        let line_fitter = LineFitter::new(config.vec_len)?;

        Ok(Self {
            pfb,
            fft: FftHelper::new(config.vec_len),
            integrator,
            calibrator,
            recorder,
            line_fitter,
            line: None,
            metrics: Arc::new(MetricsRecorder::new()),
            recording_error: None,
            logger: LogManager::new("spectrosim::chain"),
        })
    }

    /// Pushes one block through the chain. Returns the calibrated spectrum
    /// when the integrator completes a frame, `None` otherwise.
    ///
    /// Recorder failures disable recording but keep the chain running; the
    /// failure is kept for [`take_recording_error`](Self::take_recording_error).
    pub fn process_block(&mut self, block: &[Complex32]) -> StageResult<Option<CalibrationOutput>> {
        let mut filtered = self.pfb.process_segment(block)?;
        self.metrics.record_segment();
        self.fft.transform(&mut filtered);
        let power = power_spectrum(&filtered);

        let Some(averaged) = self.integrator.push_frame(&power)? else {
            return Ok(None);
        };
        let output = self.calibrator.process(&averaged)?;
        self.metrics.record_spectrum();

        let recording = self.recorder.is_recording();
        match self.recorder.process_vector(&output.power) {
            Ok(bytes) if recording => self.metrics.record_rows(1, bytes),
            Ok(_) => {}
            Err(err) => self.note_recording_error(err),
        }
        // Hot and Cold spectra are reference loads, not sky data.
        if !output.mode.acquires_reference() {
            self.line = Some(self.line_fitter.fit(&output.power)?);
        }
        self.logger.detail(&format!(
            "{} spectrum emitted, mean Tsys {:.2} K",
            output.mode,
            output.mean_tsys()
        ));
        Ok(Some(output))
    }

    /// Applies a runtime parameter update between two blocks.
    pub fn apply(&mut self, command: ControlCommand) -> StageResult<()> {
        self.logger.record(&format!("control: {:?}", command));
        match command {
            ControlCommand::SetMode { mode } => {
                self.calibrator.set_mode(mode);
                Ok(())
            }
            ControlCommand::SetWindow { window } => self.pfb.reconfigure_window(window),
            ControlCommand::SetIntegrationCount { count } => {
                self.integrator.set_integration_count(count);
                Ok(())
            }
            ControlCommand::SetRecording { enabled } => {
                let result = self.recorder.set_toggle(enabled);
                self.track(result)
            }
            ControlCommand::SetAzimuthElevation { azimuth, elevation } => {
                let result = self.recorder.set_azimuth_elevation(azimuth, elevation);
                self.track(result)
            }
            ControlCommand::SetSource { .. } => Err(StageError::Config(
                "source parameters are not part of the receive chain".into(),
            )),
        }
    }

    pub fn take_recording_error(&mut self) -> Option<StageError> {
        self.recording_error.take()
    }

    /// Flushes and closes any open recording.
    pub fn shutdown(&mut self) -> StageResult<()> {
        let result = self.recorder.close();
        if result.is_err() {
            self.metrics.record_error();
        }
        result
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Latest fit of the sky spectrum; `None` until a sky spectrum was seen.
    pub fn line_profile(&self) -> Option<LineProfile> {
        self.line
    }

    #[cfg(test)]
    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    fn track(&mut self, result: StageResult<()>) -> StageResult<()> {
        if result.is_err() {
            self.metrics.record_error();
        }
        result
    }

    fn note_recording_error(&mut self, err: StageError) {
        self.metrics.record_error();
        self.logger.warn(&format!("recorder: {}", err));
        self.recording_error = Some(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectrocore::interface::{CalibrationMode, WindowKind};
    use spectrocore::recording::RecordReader;
    use std::fs;
    use tempfile::tempdir;

    fn small_config(dir: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            vec_len: 64,
            num_taps: 4,
            nb_integration: 4,
            sample_rate: 2.5e6,
            output_dir: dir.to_path_buf(),
            flush_rows: 2,
            ..Default::default()
        }
    }

    fn tone(vec_len: usize, bin: usize) -> Vec<Complex32> {
        (0..vec_len)
            .map(|n| {
                let phase = 2.0 * std::f32::consts::PI * bin as f32 * n as f32 / vec_len as f32;
                Complex32::new(phase.cos(), phase.sin())
            })
            .collect()
    }

    #[test]
    fn emits_one_spectrum_per_integration_window() {
        let dir = tempdir().unwrap();
        let mut chain = Spectrometer::new(&small_config(dir.path())).unwrap();
        let block = tone(64, 5);

        let emitted = (0..12)
            .filter_map(|_| chain.process_block(&block).unwrap())
            .count();
        assert_eq!(emitted, 3);

        let metrics = chain.metrics();
        assert_eq!(metrics.segments_filtered, 12);
        assert_eq!(metrics.spectra_emitted, 3);
        assert_eq!(metrics.rows_recorded, 0);
    }

    #[test]
    fn tone_peaks_in_its_channel() {
        let dir = tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.calibration = CalibrationMode::NonCalibrated;
        let mut chain = Spectrometer::new(&config).unwrap();
        let block = tone(64, 9);

        let mut last = None;
        for _ in 0..8 {
            if let Some(out) = chain.process_block(&block).unwrap() {
                last = Some(out);
            }
        }
        let out = last.unwrap();
        let peak = out
            .power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| idx)
            .unwrap();
        assert_eq!(peak, 9);
    }

    #[test]
    fn wrong_block_length_is_rejected() {
        let dir = tempdir().unwrap();
        let mut chain = Spectrometer::new(&small_config(dir.path())).unwrap();
        let err = chain.process_block(&tone(32, 1)).unwrap_err();
        assert!(matches!(err, StageError::InvalidInput(_)));
    }

    #[test]
    fn controls_reach_each_stage() {
        let dir = tempdir().unwrap();
        let mut chain = Spectrometer::new(&small_config(dir.path())).unwrap();
        let block = tone(64, 3);

        chain
            .apply(ControlCommand::SetMode {
                mode: CalibrationMode::Calibrated,
            })
            .unwrap();
        chain
            .apply(ControlCommand::SetWindow {
                window: WindowKind::BlackmanHarris,
            })
            .unwrap();
        chain
            .apply(ControlCommand::SetIntegrationCount { count: 0 })
            .unwrap();

        let out = chain.process_block(&block).unwrap().unwrap();
        assert_eq!(out.mode, CalibrationMode::Calibrated);
        assert_eq!(chain.calibrator().mode(), CalibrationMode::Calibrated);
    }

    #[test]
    fn line_is_fitted_on_sky_spectra_only() {
        let dir = tempdir().unwrap();
        let mut chain = Spectrometer::new(&small_config(dir.path())).unwrap();
        let block = tone(64, 3);

        for _ in 0..4 {
            chain.process_block(&block).unwrap();
        }
        assert_eq!(chain.line_profile(), None);

        chain
            .apply(ControlCommand::SetMode {
                mode: CalibrationMode::NonCalibrated,
            })
            .unwrap();
        for _ in 0..4 {
            chain.process_block(&block).unwrap();
        }
        let line = chain.line_profile().unwrap();
        assert!(line.x0.is_finite() && line.sigma2.is_finite());
    }

    #[test]
    fn source_updates_are_not_chain_controls() {
        let dir = tempdir().unwrap();
        let mut chain = Spectrometer::new(&small_config(dir.path())).unwrap();
        let err = chain
            .apply(ControlCommand::SetSource {
                carrier_frequency: Some(1.0e5),
                sigma: None,
                amplitude: None,
            })
            .unwrap_err();
        assert!(matches!(err, StageError::Config(_)));
    }

    #[test]
    fn recording_round_trips_through_reader() {
        let dir = tempdir().unwrap();
        let mut chain = Spectrometer::new(&small_config(dir.path())).unwrap();
        let block = tone(64, 2);

        chain
            .apply(ControlCommand::SetRecording { enabled: true })
            .unwrap();
        assert!(chain.is_recording());
        for _ in 0..20 {
            chain.process_block(&block).unwrap();
        }
        chain.shutdown().unwrap();
        assert!(!chain.is_recording());
        assert_eq!(chain.metrics().rows_recorded, 5);

        let files: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let mut reader = RecordReader::open(&files[0]).unwrap();
        assert_eq!(reader.header().vec_len, 64);
        let rows = reader.read_all_rows().unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn pointing_change_rolls_recording_over() {
        let dir = tempdir().unwrap();
        let mut chain = Spectrometer::new(&small_config(dir.path())).unwrap();
        let block = tone(64, 2);

        chain
            .apply(ControlCommand::SetRecording { enabled: true })
            .unwrap();
        for _ in 0..8 {
            chain.process_block(&block).unwrap();
        }
        chain
            .apply(ControlCommand::SetAzimuthElevation {
                azimuth: 90.0,
                elevation: 30.0,
            })
            .unwrap();
        for _ in 0..12 {
            chain.process_block(&block).unwrap();
        }
        chain.shutdown().unwrap();

        let mut total = 0;
        for entry in fs::read_dir(dir.path()).unwrap() {
            let mut reader = RecordReader::open(entry.unwrap().path()).unwrap();
            total += reader.read_all_rows().unwrap().len();
        }
        assert_eq!(total, 5);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn unwritable_output_dir_keeps_chain_running() {
        let dir = tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.output_dir = dir.path().join("missing");
        let mut chain = Spectrometer::new(&config).unwrap();

        let err = chain
            .apply(ControlCommand::SetRecording { enabled: true })
            .unwrap_err();
        assert!(matches!(err, StageError::RecordingIo { .. }));
        assert!(!chain.is_recording());
        assert_eq!(chain.metrics().errors, 1);

        let block = tone(64, 1);
        for _ in 0..4 {
            chain.process_block(&block).unwrap();
        }
        assert_eq!(chain.metrics().spectra_emitted, 1);
    }
}
