use serde::{Deserialize, Serialize};
use spectrocore::interface::{CalibrationMode, CalibrationOutput};
use spectrocore::processing::LineProfile;
use spectrocore::telemetry::MetricsSnapshot;

/// Snapshot served to the external display at `GET /telemetry`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DisplayModel {
    /// `None` until the first spectrum has been emitted.
    pub mode: Option<CalibrationMode>,
    pub power: Vec<f32>,
    pub tsys: Vec<f32>,
    pub gsys_db: Vec<f32>,
    /// Fitted line of the latest sky spectrum.
    pub line: Option<LineProfile>,
    pub recording: bool,
    pub metrics: MetricsSnapshot,
    pub status: String,
}

impl DisplayModel {
    pub fn from_output(
        output: &CalibrationOutput,
        line: Option<LineProfile>,
        recording: bool,
        metrics: MetricsSnapshot,
    ) -> Self {
        Self {
            mode: Some(output.mode),
            power: output.power.clone(),
            tsys: output.tsys.clone(),
            gsys_db: output.gsys_db.clone(),
            line,
            recording,
            metrics,
            status: String::new(),
        }
    }
}
