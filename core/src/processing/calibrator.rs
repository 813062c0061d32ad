//! Hot/Cold radiometric calibration.
//!
//! The calibrator is a mode selector rather than a temporal state machine:
//! Hot and Cold store the current spectrum as the matching reference load and
//! re-solve the per-channel system temperature and gain; Calibrated and
//! NonCalibrated only consume the last solution.

use crate::interface::{CalibrationMode, CalibrationOutput};
use crate::math::fft::fftfreq;
use crate::math::stats::StatsHelper;
use crate::prelude::{expect_len, ProcessingStage, StageError, StageResult};
use crate::processing::spike::suppress_spikes;
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};

/// Boltzmann constant (J/K).
pub const BOLTZMANN: f64 = 1.380649e-23;
/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Conversion used for the `Non_calibrated` data mode.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NonCalibratedPolicy {
    /// Raw power, unchanged.
    #[default]
    PassThrough,
    /// `power / (k_B Δf)`, an uncalibrated antenna-temperature scale.
    NoisePower,
}

/// Conversion used for the `Calibrated` data mode.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CalibratedConversion {
    /// `power / Gsys - Gsys k_B Δf Tsys`.
    #[default]
    GainTemperature,
    /// Rayleigh-Jeans brightness temperature `power c² / (2 k_B f²)`.
    RayleighJeans,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Physical temperature of the hot (ground) load in kelvin.
    pub ground_temperature: f64,
    /// Brightness temperature of the cold (sky) load in kelvin.
    pub sky_temperature: f64,
    pub spike_suppression: bool,
    pub non_calibrated: NonCalibratedPolicy,
    pub calibrated: CalibratedConversion,
    /// Sky frequency of the DC bin, used by the Rayleigh-Jeans conversion.
    pub rest_frequency: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            ground_temperature: 300.0,
            sky_temperature: 10.0,
            spike_suppression: false,
            non_calibrated: NonCalibratedPolicy::PassThrough,
            calibrated: CalibratedConversion::GainTemperature,
            rest_frequency: 1420e6,
        }
    }
}

pub struct Calibrator {
    mode: CalibrationMode,
    vec_len: usize,
    sample_rate: f64,
    settings: CalibrationSettings,
    hot_spectrum: Vec<f64>,
    cold_spectrum: Vec<f64>,
    hcr: Vec<f64>,
    tsys: Vec<f64>,
    gsys: Vec<f64>,
    sky_frequencies: Vec<f64>,
    logger: LogManager,
}

impl Calibrator {
    pub fn new(
        mode: CalibrationMode,
        vec_len: usize,
        sample_rate: f64,
        settings: CalibrationSettings,
    ) -> StageResult<Self> {
        if vec_len == 0 {
            return Err(StageError::Config("vector length must be positive".into()));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(StageError::Config(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }

        let sky_frequencies = fftfreq(vec_len, sample_rate)
            .into_iter()
            .map(|offset| settings.rest_frequency + offset)
            .collect();

        Ok(Self {
            mode,
            vec_len,
            sample_rate,
            settings,
            hot_spectrum: vec![1.0; vec_len],
            cold_spectrum: vec![1.0; vec_len],
            hcr: vec![1.0; vec_len],
            tsys: vec![0.0; vec_len],
            gsys: vec![1.0; vec_len],
            sky_frequencies,
            logger: LogManager::new("spectrocore::calibrator"),
        })
    }

    pub fn set_mode(&mut self, mode: CalibrationMode) {
        self.mode = mode;
        self.logger.record(&format!("calibration mode set to {}", mode));
    }

    /// Parses and applies a mode name such as `"Hot"` or `"Non_calibrated"`.
    pub fn set_mode_named(&mut self, name: &str) -> StageResult<()> {
        let mode = name.parse::<CalibrationMode>()?;
        self.set_mode(mode);
        Ok(())
    }

    pub fn process(&mut self, power: &[f32]) -> StageResult<CalibrationOutput> {
        expect_len("calibrator", self.vec_len, power.len())?;

        let raw: Vec<f64> = power.iter().map(|&v| f64::from(v)).collect();
        let spectrum = if self.settings.spike_suppression {
            suppress_spikes(&raw)
        } else {
            raw
        };

        let calibrated = match self.mode {
            CalibrationMode::Hot => {
                self.hot_spectrum.copy_from_slice(&spectrum);
                self.solve();
                spectrum
            }
            CalibrationMode::Cold => {
                self.cold_spectrum.copy_from_slice(&spectrum);
                self.solve();
                spectrum
            }
            CalibrationMode::Calibrated => self.convert_calibrated(&spectrum),
            CalibrationMode::NonCalibrated => self.convert_non_calibrated(spectrum),
        };

        Ok(CalibrationOutput {
            mode: self.mode,
            power: calibrated.iter().map(|&v| v as f32).collect(),
            tsys: self.tsys.iter().map(|&v| v as f32).collect(),
            gsys_db: self
                .gsys
                .iter()
                .map(|&g| StatsHelper::to_db(g) as f32)
                .collect(),
        })
    }

    /// Y-factor solution from the stored hot and cold spectra.
    fn solve(&mut self) {
        let t_ground = self.settings.ground_temperature;
        let t_sky = self.settings.sky_temperature;

        for idx in 0..self.vec_len {
            let cold = self.cold_spectrum[idx];
            let mut ratio = self.hot_spectrum[idx] / cold;
            // Identical loads make `ratio - 1` vanish below.
            if ratio == 1.0 {
                ratio = 2.0;
            }
            let tsys = (t_ground - ratio * t_sky) / (ratio - 1.0);
            let mut gsys = cold / (t_sky + tsys);
            if gsys.is_nan() || gsys <= 0.0 {
                gsys = 1.0;
            }

            self.hcr[idx] = ratio;
            self.tsys[idx] = tsys;
            self.gsys[idx] = gsys;
        }

        self.logger.detail(&format!(
            "{} solution: mean Tsys {:.2} K",
            self.mode,
            StatsHelper::mean(&self.tsys)
        ));
    }

    fn convert_calibrated(&self, spectrum: &[f64]) -> Vec<f64> {
        match self.settings.calibrated {
            CalibratedConversion::GainTemperature => {
                let noise = BOLTZMANN * self.channel_bandwidth();
                spectrum
                    .iter()
                    .zip(self.gsys.iter().zip(&self.tsys))
                    .map(|(&p, (&g, &t))| p / g - g * noise * t)
                    .collect()
            }
            CalibratedConversion::RayleighJeans => spectrum
                .iter()
                .zip(&self.sky_frequencies)
                .map(|(&p, &f)| p * SPEED_OF_LIGHT * SPEED_OF_LIGHT / (2.0 * BOLTZMANN * f * f))
                .collect(),
        }
    }

    fn convert_non_calibrated(&self, spectrum: Vec<f64>) -> Vec<f64> {
        match self.settings.non_calibrated {
            NonCalibratedPolicy::PassThrough => spectrum,
            NonCalibratedPolicy::NoisePower => {
                let noise = BOLTZMANN * self.channel_bandwidth();
                spectrum.into_iter().map(|p| p / noise).collect()
            }
        }
    }

    /// Width of one FFT channel in hertz.
    pub fn channel_bandwidth(&self) -> f64 {
        self.sample_rate / self.vec_len as f64
    }

    pub fn mode(&self) -> CalibrationMode {
        self.mode
    }

    pub fn hcr(&self) -> &[f64] {
        &self.hcr
    }

    pub fn tsys(&self) -> &[f64] {
        &self.tsys
    }

    pub fn gsys(&self) -> &[f64] {
        &self.gsys
    }

    /// Forgets both reference loads and the current solution.
    pub fn reset(&mut self) {
        self.hot_spectrum.fill(1.0);
        self.cold_spectrum.fill(1.0);
        self.hcr.fill(1.0);
        self.tsys.fill(0.0);
        self.gsys.fill(1.0);
    }
}

impl ProcessingStage for Calibrator {
    type Input = [f32];
    type Output = CalibrationOutput;

    fn execute(&mut self, input: &[f32]) -> StageResult<CalibrationOutput> {
        self.process(input)
    }

    fn cleanup(&mut self) {
        self.reset();
    }
}
