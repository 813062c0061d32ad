use num_complex::Complex32;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Complex-to-complex transform sitting between the PFB and the integrator.
///
/// The core treats the FFT as a trusted primitive: a vector in, a vector of
/// the same length out, transformed in place.
pub trait SpectralTransform {
    fn size(&self) -> usize;
    fn transform(&mut self, buffer: &mut [Complex32]);
}

/// Helper that wraps the `rustfft` planner for reuse.
pub struct FftHelper {
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex32>,
    size: usize,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex32::zero(); fft.get_inplace_scratch_len()];
        Self { fft, scratch, size }
    }
}

impl SpectralTransform for FftHelper {
    fn size(&self) -> usize {
        self.size
    }

    fn transform(&mut self, buffer: &mut [Complex32]) {
        self.fft.process_with_scratch(buffer, &mut self.scratch);
    }
}

/// Squared magnitude of each bin.
pub fn power_spectrum(spectrum: &[Complex32]) -> Vec<f32> {
    spectrum.iter().map(|bin| bin.norm_sqr()).collect()
}

/// Bin centre frequencies in FFT order (DC first, negative half last).
pub fn fftfreq(n: usize, sample_rate: f64) -> Vec<f64> {
    let positive = (n + 1) / 2;
    let spacing = sample_rate / n as f64;
    (0..n)
        .map(|i| {
            let k = if i < positive {
                i as f64
            } else {
                i as f64 - n as f64
            };
            k * spacing
        })
        .collect()
}
