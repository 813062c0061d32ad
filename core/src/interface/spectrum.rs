use crate::interface::CalibrationMode;
use serde::{Deserialize, Serialize};

/// Output triple of the calibrator, consumed by the display and the recorder.
///
/// `tsys` and `gsys_db` always carry the most recent Hot/Cold solution, even
/// in the data modes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationOutput {
    pub mode: CalibrationMode,
    pub power: Vec<f32>,
    pub tsys: Vec<f32>,
    pub gsys_db: Vec<f32>,
}

impl CalibrationOutput {
    pub fn len(&self) -> usize {
        self.power.len()
    }

    pub fn is_empty(&self) -> bool {
        self.power.is_empty()
    }

    /// Average system temperature over all channels, handy for status lines.
    pub fn mean_tsys(&self) -> f32 {
        if self.tsys.is_empty() {
            return 0.0;
        }
        self.tsys.iter().sum::<f32>() / self.tsys.len() as f32
    }
}
