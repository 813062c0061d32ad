//! Frequency-gated recording of the calibrated spectrum stream.

pub mod band;
pub mod format;
pub mod recorder;
pub mod worker;

pub use band::FrequencyWindow;
pub use format::{RecordReader, RecordingHeader};
pub use recorder::{recording_filename, Recorder, RecorderConfig};
pub use worker::FlushWorker;
