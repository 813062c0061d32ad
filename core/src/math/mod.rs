pub mod fft;
pub mod stats;
pub mod window;

pub use fft::{fftfreq, power_spectrum, FftHelper, SpectralTransform};
pub use stats::StatsHelper;
pub use window::{sinc, WindowKind};
