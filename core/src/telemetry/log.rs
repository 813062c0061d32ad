use log::{debug, info, warn};

/// Stage-scoped wrapper around the `log` facade; every message carries the
/// stage name as its target so `RUST_LOG=spectrocore::pfb=debug` style
/// filters work per stage.
pub struct LogManager {
    target: &'static str,
}

impl LogManager {
    pub fn new(target: &'static str) -> Self {
        Self { target }
    }

    pub fn record(&self, message: &str) {
        info!(target: self.target, "{}", message);
    }

    pub fn detail(&self, message: &str) {
        debug!(target: self.target, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(target: self.target, "{}", message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("spectrocore")
    }
}
