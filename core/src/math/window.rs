//! Window functions used to taper the polyphase prototype filter.

use crate::prelude::StageError;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

const BH_A0: f64 = 0.35875;
const BH_A1: f64 = 0.48829;
const BH_A2: f64 = 0.14128;
const BH_A3: f64 = 0.01168;

/// Supported tapering windows, addressed by their snake_case names
/// (`hanning`, `hamming`, `blackman_harris`) in configs and control messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Hanning,
    Hamming,
    BlackmanHarris,
}

impl WindowKind {
    pub fn name(self) -> &'static str {
        match self {
            WindowKind::Hanning => "hanning",
            WindowKind::Hamming => "hamming",
            WindowKind::BlackmanHarris => "blackman_harris",
        }
    }

    /// Symmetric window of `len` points. A single point window is `[1.0]`.
    pub fn coefficients(self, len: usize) -> Vec<f64> {
        match len {
            0 => return Vec::new(),
            1 => return vec![1.0],
            _ => {}
        }

        let denom = (len - 1) as f64;
        (0..len)
            .map(|n| {
                let phase = 2.0 * PI * n as f64 / denom;
                match self {
                    WindowKind::Hanning => 0.5 - 0.5 * phase.cos(),
                    WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
                    WindowKind::BlackmanHarris => {
                        BH_A0 - BH_A1 * phase.cos() + BH_A2 * (2.0 * phase).cos()
                            - BH_A3 * (3.0 * phase).cos()
                    }
                }
            })
            .collect()
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WindowKind {
    type Err = StageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hanning" => Ok(WindowKind::Hanning),
            "hamming" => Ok(WindowKind::Hamming),
            "blackman_harris" => Ok(WindowKind::BlackmanHarris),
            other => Err(StageError::Config(format!(
                "unsupported window type: {}",
                other
            ))),
        }
    }
}

/// Normalized sinc, `sin(πx) / (πx)` with `sinc(0) = 1`.
pub fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let arg = PI * x;
        arg.sin() / arg
    }
}
