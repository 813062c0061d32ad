use crate::math::fft::fftfreq;
use serde::{Deserialize, Serialize};

/// Sky-frequency passband kept by the recorder, centred on the 21 cm line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FrequencyWindow {
    /// Sky frequency of the DC bin in hertz.
    pub rest_frequency: f64,
    /// Exclusive lower edge in hertz.
    pub low: f64,
    /// Exclusive upper edge in hertz.
    pub high: f64,
}

impl Default for FrequencyWindow {
    fn default() -> Self {
        Self {
            rest_frequency: 1420e6,
            low: 1415e6,
            high: 1425e6,
        }
    }
}

impl FrequencyWindow {
    /// FFT-ordered indices of the bins whose sky frequency lies strictly
    /// inside `(low, high)`.
    pub fn bin_indices(&self, vec_len: usize, sample_rate: f64) -> Vec<usize> {
        fftfreq(vec_len, sample_rate)
            .into_iter()
            .enumerate()
            .filter(|(_, offset)| {
                let frequency = self.rest_frequency + offset;
                frequency > self.low && frequency < self.high
            })
            .map(|(idx, _)| idx)
            .collect()
    }
}
