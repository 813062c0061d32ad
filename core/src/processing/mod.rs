pub mod calibrator;
pub mod integrator;
pub mod line_fit;
pub mod pfb;
pub mod spike;

pub use calibrator::{CalibratedConversion, CalibrationSettings, Calibrator, NonCalibratedPolicy};
pub use integrator::Integrator;
pub use line_fit::{LineFitter, LineProfile};
pub use pfb::{FilterBank, PhaseMemory, PolyphaseFilterBank};
pub use spike::suppress_spikes;
