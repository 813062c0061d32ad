use crate::prelude::StageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calibrator operating mode.
///
/// `Hot` and `Cold` acquire the reference-load spectra and refresh the
/// Tsys/Gsys solution; `Calibrated` and `NonCalibrated` are data modes that
/// only consume it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CalibrationMode {
    Hot,
    Cold,
    Calibrated,
    #[serde(rename = "Non_calibrated", alias = "NonCalibrated")]
    NonCalibrated,
}

impl CalibrationMode {
    pub fn name(self) -> &'static str {
        match self {
            CalibrationMode::Hot => "Hot",
            CalibrationMode::Cold => "Cold",
            CalibrationMode::Calibrated => "Calibrated",
            CalibrationMode::NonCalibrated => "Non_calibrated",
        }
    }

    pub fn acquires_reference(self) -> bool {
        matches!(self, CalibrationMode::Hot | CalibrationMode::Cold)
    }
}

impl fmt::Display for CalibrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CalibrationMode {
    type Err = StageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hot" => Ok(CalibrationMode::Hot),
            "cold" => Ok(CalibrationMode::Cold),
            "calibrated" => Ok(CalibrationMode::Calibrated),
            "non_calibrated" | "noncalibrated" => Ok(CalibrationMode::NonCalibrated),
            _ => Err(StageError::Config(format!(
                "unsupported calibration mode: {}",
                value
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_round_trip_through_from_str() {
        for mode in [
            CalibrationMode::Hot,
            CalibrationMode::Cold,
            CalibrationMode::Calibrated,
            CalibrationMode::NonCalibrated,
        ] {
            assert_eq!(mode.name().parse::<CalibrationMode>().unwrap(), mode);
        }
    }

    #[test]
    fn misspelled_mode_is_a_config_error() {
        // The reference GUI chooser shipped with this typo.
        assert!(matches!(
            "Caibrated".parse::<CalibrationMode>(),
            Err(StageError::Config(_))
        ));
    }

    #[test]
    fn only_hot_and_cold_acquire() {
        assert!(CalibrationMode::Hot.acquires_reference());
        assert!(CalibrationMode::Cold.acquires_reference());
        assert!(!CalibrationMode::Calibrated.acquires_reference());
        assert!(!CalibrationMode::NonCalibrated.acquires_reference());
    }
}
