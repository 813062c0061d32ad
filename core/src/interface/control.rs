use crate::interface::CalibrationMode;
use crate::math::window::WindowKind;
use crate::prelude::{StageError, StageResult};
use serde::{Deserialize, Serialize};

/// Runtime parameter update delivered by the control path (UI, HTTP bridge or
/// a scripted schedule). Applied between two `execute` calls, never during one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    SetMode { mode: CalibrationMode },
    SetWindow { window: WindowKind },
    SetIntegrationCount { count: i64 },
    SetRecording { enabled: bool },
    SetAzimuthElevation { azimuth: f64, elevation: f64 },
    /// Synthetic source parameters; fields left out keep their value.
    SetSource {
        #[serde(default)]
        carrier_frequency: Option<f64>,
        #[serde(default)]
        sigma: Option<f64>,
        #[serde(default)]
        amplitude: Option<f64>,
    },
}

impl ControlCommand {
    /// Parses a JSON control message; malformed or unknown values are
    /// configuration errors and leave the running state untouched.
    pub fn parse(json: &str) -> StageResult<Self> {
        serde_json::from_str(json)
            .map_err(|err| StageError::Config(format!("rejected control message: {}", err)))
    }
}
