use anyhow::bail;
use log::info;
use num_complex::Complex32;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Configuration for the synthetic sky source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Offset of the line from the band centre in hertz.
    pub carrier_frequency: f64,
    /// Width of the Gaussian envelope in seconds.
    pub sigma: f64,
    pub amplitude: f64,
    /// Half width of the uniform noise added to I and Q.
    pub noise: f64,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            carrier_frequency: 250e3,
            sigma: 2e-4,
            amplitude: 1.0,
            noise: 0.05,
            seed: 0,
        }
    }
}

/// Gaussian-enveloped complex carrier plus receiver noise.
///
/// The time axis is centred on every block, so each block carries the same
/// envelope and the integrated spectrum shows a stable line.
pub struct GaussianSource {
    config: GeneratorConfig,
    sample_rate: f64,
    sample_index: u64,
    rng: StdRng,
}

impl GaussianSource {
    pub fn new(config: GeneratorConfig, sample_rate: f64) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            sample_rate,
            sample_index: 0,
            rng,
        }
    }

    pub fn next_block(&mut self, len: usize) -> Vec<Complex32> {
        let start = self.sample_index as f64;
        let centre = start + len as f64 / 2.0;
        let two_sigma_sq = 2.0 * self.config.sigma * self.config.sigma;
        let noise = self.config.noise;

        let block = (0..len)
            .map(|i| {
                let t = (start + i as f64 - centre) / self.sample_rate;
                let envelope = self.config.amplitude * (-t * t / two_sigma_sq).exp();
                let phase = 2.0 * PI * self.config.carrier_frequency * t;
                let (mut re, mut im) = (envelope * phase.cos(), envelope * phase.sin());
                if noise > 0.0 {
                    re += self.rng.gen_range(-noise..noise);
                    im += self.rng.gen_range(-noise..noise);
                }
                Complex32::new(re as f32, im as f32)
            })
            .collect();

        self.sample_index += len as u64;
        block
    }

    pub fn set_carrier_frequency(&mut self, carrier_frequency: f64) {
        self.config.carrier_frequency = carrier_frequency;
        info!("carrier frequency: {}", carrier_frequency);
    }

    pub fn set_sigma(&mut self, sigma: f64) -> anyhow::Result<()> {
        if !(sigma.is_finite() && sigma > 0.0) {
            bail!("envelope sigma must be positive, got {}", sigma);
        }
        self.config.sigma = sigma;
        info!("envelope sigma: {}", sigma);
        Ok(())
    }

    pub fn set_amplitude(&mut self, amplitude: f64) {
        self.config.amplitude = amplitude;
        info!("amplitude: {}", amplitude);
    }

    #[cfg(test)]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    #[cfg(test)]
    pub fn samples_generated(&self) -> u64 {
        self.sample_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_builds_expected_sample_count() {
        let mut source = GaussianSource::new(GeneratorConfig::default(), 2.5e6);
        assert_eq!(source.next_block(4096).len(), 4096);
        assert_eq!(source.next_block(4096).len(), 4096);
        assert_eq!(source.samples_generated(), 8192);
    }

    #[test]
    fn noiseless_envelope_peaks_at_block_centre() {
        let config = GeneratorConfig {
            noise: 0.0,
            amplitude: 2.0,
            ..Default::default()
        };
        let mut source = GaussianSource::new(config, 1.0e6);
        let block = source.next_block(256);
        assert!((block[128].norm() - 2.0).abs() < 1e-6);
        assert!(block[0].norm() < block[64].norm());
        assert!(block[255].norm() < block[192].norm());
    }

    #[test]
    fn setters_change_the_next_block() {
        let config = GeneratorConfig {
            noise: 0.0,
            ..Default::default()
        };
        let mut source = GaussianSource::new(config, 1.0e6);
        let before = source.next_block(256);
        source.set_amplitude(3.0);
        source.set_carrier_frequency(0.0);
        source.set_sigma(1e-3).unwrap();
        let after = source.next_block(256);

        assert_ne!(before, after);
        assert!((after[128].re - 3.0).abs() < 1e-6);
        assert_eq!(source.config().sigma, 1e-3);
    }

    #[test]
    fn non_positive_sigma_is_rejected() {
        let mut source = GaussianSource::new(GeneratorConfig::default(), 1.0e6);
        assert!(source.set_sigma(0.0).is_err());
        assert!(source.set_sigma(-1.0).is_err());
        assert_eq!(source.config().sigma, 2e-4);
    }

    #[test]
    fn same_seed_reproduces_stream() {
        let config = GeneratorConfig {
            seed: 13,
            ..Default::default()
        };
        let mut a = GaussianSource::new(config.clone(), 2.5e6);
        let mut b = GaussianSource::new(config, 2.5e6);
        assert_eq!(a.next_block(512), b.next_block(512));
    }
}
