pub mod control;
pub mod mode;
pub mod spectrum;

pub use crate::math::window::WindowKind;
pub use control::ControlCommand;
pub use mode::CalibrationMode;
pub use spectrum::CalibrationOutput;
