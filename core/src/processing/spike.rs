//! Narrow-band RFI spike suppression applied before calibration.

use crate::math::stats::StatsHelper;

/// Samples above `factor × local mean` are treated as spikes.
pub const SPIKE_THRESHOLD_FACTOR: f64 = 1.2;
/// Half width of the window around the strongest bin used for the mean.
pub const PEAK_WINDOW: usize = 100;
/// Half width of the neighbourhood whose median replaces a spike.
pub const MEDIAN_HALF_WIDTH: usize = 10;

/// Replaces every spike with the median of its ±10 bin neighbourhood.
///
/// The threshold is 1.2 times the mean of the 200 bins around the spectrum
/// peak. Medians are always taken from the untouched input, so neighbouring
/// spikes never see each other's replacements.
pub fn suppress_spikes(spectrum: &[f64]) -> Vec<f64> {
    let Some(peak) = StatsHelper::argmax(spectrum) else {
        return Vec::new();
    };
    let len = spectrum.len();

    let window = &spectrum[peak.saturating_sub(PEAK_WINDOW)..(peak + PEAK_WINDOW).min(len)];
    let threshold = SPIKE_THRESHOLD_FACTOR * StatsHelper::mean(window);

    spectrum
        .iter()
        .enumerate()
        .map(|(idx, &value)| {
            if value > threshold {
                let lower = idx.saturating_sub(MEDIAN_HALF_WIDTH);
                let upper = (idx + MEDIAN_HALF_WIDTH + 1).min(len);
                StatsHelper::median(&spectrum[lower..upper])
            } else {
                value
            }
        })
        .collect()
}
