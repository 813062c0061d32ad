//! Polyphase filter bank placed in front of the FFT.
//!
//! A windowed-sinc prototype of `num_taps * vec_len` coefficients is split into
//! `num_taps` phases. Every incoming block is pushed into a rolling history of
//! the last `num_taps` blocks and each phase weights one block of that
//! history, so the output at call *k* depends on blocks *k - num_taps + 1*
//! through *k*. The history persists across calls and batches.

use crate::math::window::{sinc, WindowKind};
use crate::prelude::{expect_len, ProcessingStage, StageError, StageResult};
use crate::telemetry::log::LogManager;
use ndarray::{Array2, ArrayView2};
use num_complex::Complex32;
use std::collections::VecDeque;

/// Prototype filter coefficients, one contiguous slice of `vec_len` per phase.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBank {
    coefficients: Vec<f32>,
    vec_len: usize,
    num_taps: usize,
    window: WindowKind,
}

impl FilterBank {
    /// Samples `sinc` at `num_taps * vec_len` points over
    /// `[-num_taps/2, num_taps/2)` and tapers it with `window`.
    pub fn design(vec_len: usize, num_taps: usize, window: WindowKind) -> StageResult<Self> {
        if num_taps == 0 {
            return Err(StageError::Config(
                "number of taps must be positive".into(),
            ));
        }
        if vec_len == 0 {
            return Err(StageError::Config("vector length must be positive".into()));
        }

        let total = num_taps
            .checked_mul(vec_len)
            .ok_or_else(|| StageError::Config("filter length overflows usize".into()))?;
        let half_span = num_taps as f64 / 2.0;
        let coefficients = window
            .coefficients(total)
            .into_iter()
            .enumerate()
            .map(|(idx, taper)| {
                let x = -half_span + idx as f64 / vec_len as f64;
                (sinc(x) * taper) as f32
            })
            .collect();

        Ok(Self {
            coefficients,
            vec_len,
            num_taps,
            window,
        })
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    pub fn phase(&self, phase: usize) -> &[f32] {
        let start = phase * self.vec_len;
        &self.coefficients[start..start + self.vec_len]
    }

    pub fn window(&self) -> WindowKind {
        self.window
    }

    pub fn num_taps(&self) -> usize {
        self.num_taps
    }

    pub fn vec_len(&self) -> usize {
        self.vec_len
    }

    /// Sums every history segment weighted by its phase coefficients.
    pub fn apply(&self, memory: &PhaseMemory) -> Vec<Complex32> {
        let mut output = vec![Complex32::new(0.0, 0.0); self.vec_len];
        for (phase, segment) in memory.iter().take(self.num_taps).enumerate() {
            for ((acc, &sample), &tap) in output.iter_mut().zip(segment).zip(self.phase(phase)) {
                *acc += sample * tap;
            }
        }
        output
    }
}

/// Fixed-depth history of input segments; index 0 is the most recent.
#[derive(Debug, Clone)]
pub struct PhaseMemory {
    segments: VecDeque<Vec<Complex32>>,
    vec_len: usize,
}

impl PhaseMemory {
    /// Zero-filled history of `depth` segments.
    pub fn new(depth: usize, vec_len: usize) -> Self {
        let segments = (0..depth)
            .map(|_| vec![Complex32::new(0.0, 0.0); vec_len])
            .collect();
        Self { segments, vec_len }
    }

    /// Inserts `segment` at the front and evicts the oldest entry.
    pub fn push(&mut self, segment: &[Complex32]) -> StageResult<()> {
        expect_len("phase memory", self.vec_len, segment.len())?;
        if let Some(mut recycled) = self.segments.pop_back() {
            recycled.copy_from_slice(segment);
            self.segments.push_front(recycled);
        }
        Ok(())
    }

    pub fn get(&self, phase: usize) -> Option<&[Complex32]> {
        self.segments.get(phase).map(Vec::as_slice)
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[Complex32]> {
        self.segments.iter().map(Vec::as_slice)
    }

    pub fn reset(&mut self) {
        for segment in self.segments.iter_mut() {
            segment.fill(Complex32::new(0.0, 0.0));
        }
    }
}

/// Streaming PFB stage: owns the prototype filter and the phase history.
pub struct PolyphaseFilterBank {
    filter: FilterBank,
    memory: PhaseMemory,
    logger: LogManager,
}

impl PolyphaseFilterBank {
    pub fn new(vec_len: usize, window: WindowKind, num_taps: usize) -> StageResult<Self> {
        let filter = FilterBank::design(vec_len, num_taps, window)?;
        let logger = LogManager::new("spectrocore::pfb");
        logger.record(&format!(
            "PFB ready: {} taps x {} bins, {} window",
            num_taps, vec_len, window
        ));
        Ok(Self {
            memory: PhaseMemory::new(num_taps, vec_len),
            filter,
            logger,
        })
    }

    /// Rebuilds the coefficients for `window`. The replacement is designed in
    /// full before it is swapped in; the phase history is kept.
    pub fn reconfigure_window(&mut self, window: WindowKind) -> StageResult<()> {
        let filter = FilterBank::design(self.filter.vec_len, self.filter.num_taps, window)?;
        self.filter = filter;
        self.logger.record(&format!("PFB window set to {}", window));
        Ok(())
    }

    /// Same as [`reconfigure_window`](Self::reconfigure_window) for a window name.
    pub fn reconfigure_window_named(&mut self, name: &str) -> StageResult<()> {
        let window = name.parse::<WindowKind>()?;
        self.reconfigure_window(window)
    }

    pub fn process_segment(&mut self, segment: &[Complex32]) -> StageResult<Vec<Complex32>> {
        expect_len("PFB", self.filter.vec_len, segment.len())?;
        self.memory.push(segment)?;
        Ok(self.filter.apply(&self.memory))
    }

    /// Filters each row in order; all rows share the persistent history.
    pub fn process_batch(&mut self, rows: ArrayView2<Complex32>) -> StageResult<Array2<Complex32>> {
        expect_len("PFB batch", self.filter.vec_len, rows.ncols())?;

        let mut flat = Vec::with_capacity(rows.len());
        for row in rows.rows() {
            let segment: Vec<Complex32> = row.iter().copied().collect();
            flat.extend(self.process_segment(&segment)?);
        }
        self.logger
            .detail(&format!("PFB filtered batch of {} segments", rows.nrows()));

        Array2::from_shape_vec((rows.nrows(), self.filter.vec_len), flat)
            .map_err(|err| StageError::Internal(format!("PFB batch reshape: {}", err)))
    }

    pub fn filter(&self) -> &FilterBank {
        &self.filter
    }

    pub fn memory(&self) -> &PhaseMemory {
        &self.memory
    }

    pub fn reset(&mut self) {
        self.memory.reset();
    }
}

impl ProcessingStage for PolyphaseFilterBank {
    type Input = [Complex32];
    type Output = Vec<Complex32>;

    fn execute(&mut self, input: &[Complex32]) -> StageResult<Vec<Complex32>> {
        self.process_segment(input)
    }

    fn cleanup(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(vec_len: usize, seed: f32) -> Vec<Complex32> {
        (0..vec_len)
            .map(|i| Complex32::new(seed + i as f32 * 0.5, seed - i as f32 * 0.25))
            .collect()
    }

    #[test]
    fn zero_taps_is_rejected() {
        assert!(matches!(
            PolyphaseFilterBank::new(8, WindowKind::Hamming, 0),
            Err(StageError::Config(_))
        ));
    }

    #[test]
    fn wrong_segment_length_fails_fast() {
        let mut pfb = PolyphaseFilterBank::new(8, WindowKind::Hanning, 2).unwrap();
        assert!(matches!(
            pfb.process_segment(&ramp(7, 1.0)),
            Err(StageError::InvalidInput(_))
        ));
    }

    #[test]
    fn vec_len_need_not_divide_by_taps() {
        let pfb = PolyphaseFilterBank::new(10, WindowKind::Hamming, 4).unwrap();
        assert_eq!(pfb.filter().coefficients().len(), 40);
        assert_eq!(pfb.memory().depth(), 4);
    }

    #[test]
    fn centre_coefficient_is_the_window_value() {
        let filter = FilterBank::design(8, 4, WindowKind::Hamming).unwrap();
        let taper = WindowKind::Hamming.coefficients(32);
        // x = 0 falls on index num_taps * vec_len / 2.
        assert_eq!(filter.coefficients()[16], taper[16] as f32);
        assert_eq!(filter.phase(2)[0], taper[16] as f32);
    }

    #[test]
    fn single_tap_is_an_elementwise_weighting() {
        let mut pfb = PolyphaseFilterBank::new(4, WindowKind::BlackmanHarris, 1).unwrap();
        let segment = ramp(4, 2.0);
        let output = pfb.process_segment(&segment).unwrap();
        for ((out, input), &tap) in output
            .iter()
            .zip(&segment)
            .zip(pfb.filter().coefficients())
        {
            assert_eq!(*out, *input * tap);
        }
    }

    #[test]
    fn identical_streams_give_bit_identical_output() {
        let inputs: Vec<Vec<Complex32>> = (0..7).map(|k| ramp(16, k as f32)).collect();
        let run = || {
            let mut pfb = PolyphaseFilterBank::new(16, WindowKind::Hamming, 4).unwrap();
            inputs
                .iter()
                .map(|segment| pfb.process_segment(segment).unwrap())
                .collect::<Vec<_>>()
        };
        let first = run();
        let second = run();
        for (a, b) in first.iter().flatten().zip(second.iter().flatten()) {
            assert_eq!(a.re.to_bits(), b.re.to_bits());
            assert_eq!(a.im.to_bits(), b.im.to_bits());
        }
    }

    #[test]
    fn history_is_exactly_num_taps_deep() {
        let num_taps = 4;
        let vec_len = 8;
        let mut pfb = PolyphaseFilterBank::new(vec_len, WindowKind::Hamming, num_taps).unwrap();
        for k in 0..num_taps {
            pfb.process_segment(&ramp(vec_len, 1.0 + k as f32)).unwrap();
        }

        let zeros = vec![Complex32::new(0.0, 0.0); vec_len];
        let mut outputs = Vec::new();
        for _ in 0..num_taps {
            outputs.push(pfb.process_segment(&zeros).unwrap());
        }

        // The third zero block still sees the oldest non-zero segment in its
        // last phase; the fourth sees nothing but zeros.
        assert!(outputs[num_taps - 2].iter().any(|v| v.norm() > 0.0));
        assert!(outputs[num_taps - 1]
            .iter()
            .all(|v| v.re == 0.0 && v.im == 0.0));
    }

    #[test]
    fn batch_shares_memory_with_single_calls() {
        let vec_len = 8;
        let segments: Vec<Vec<Complex32>> = (0..5).map(|k| ramp(vec_len, k as f32)).collect();

        let mut sequential = PolyphaseFilterBank::new(vec_len, WindowKind::Hanning, 3).unwrap();
        let expected: Vec<Complex32> = segments
            .iter()
            .flat_map(|s| sequential.process_segment(s).unwrap())
            .collect();

        let mut batched = PolyphaseFilterBank::new(vec_len, WindowKind::Hanning, 3).unwrap();
        let flat: Vec<Complex32> = segments.iter().flatten().copied().collect();
        let first = Array2::from_shape_vec((2, vec_len), flat[..2 * vec_len].to_vec()).unwrap();
        let rest = Array2::from_shape_vec((3, vec_len), flat[2 * vec_len..].to_vec()).unwrap();

        let mut got = batched.process_batch(first.view()).unwrap().into_raw_vec();
        got.extend(batched.process_batch(rest.view()).unwrap().into_raw_vec());
        assert_eq!(got, expected);
    }

    #[test]
    fn unknown_window_leaves_filter_untouched() {
        let mut pfb = PolyphaseFilterBank::new(8, WindowKind::Hamming, 2).unwrap();
        let before = pfb.filter().clone();
        assert!(matches!(
            pfb.reconfigure_window_named("kaiser"),
            Err(StageError::Config(_))
        ));
        assert_eq!(pfb.filter(), &before);
    }

    #[test]
    fn reconfiguring_window_keeps_history() {
        let vec_len = 8;
        let mut pfb = PolyphaseFilterBank::new(vec_len, WindowKind::Hamming, 2).unwrap();
        pfb.process_segment(&ramp(vec_len, 3.0)).unwrap();
        pfb.reconfigure_window_named("blackman_harris").unwrap();
        assert_eq!(pfb.filter().window(), WindowKind::BlackmanHarris);

        let next = ramp(vec_len, 5.0);
        let mut expected_memory = pfb.memory().clone();
        expected_memory.push(&next).unwrap();
        let expected = pfb.filter().apply(&expected_memory);
        assert_eq!(pfb.process_segment(&next).unwrap(), expected);
    }

    #[test]
    fn cleanup_clears_history() {
        let mut pfb = PolyphaseFilterBank::new(4, WindowKind::Hamming, 2).unwrap();
        pfb.execute(&ramp(4, 1.0)).unwrap();
        pfb.cleanup();
        assert!(pfb
            .memory()
            .iter()
            .flatten()
            .all(|v| v.re == 0.0 && v.im == 0.0));
    }
}
