use crate::generator::profile::GeneratorConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use spectrocore::interface::ControlCommand;
use spectrocore::prelude::PipelineConfig;
use std::fs;
use std::path::Path;

/// A control command replayed when the runner reaches `at_block`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScheduledControl {
    pub at_block: usize,
    #[serde(flatten)]
    pub command: ControlCommand,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub pipeline: PipelineConfig,
    pub generator: GeneratorConfig,
    /// Number of sample blocks to process; 0 runs until stopped.
    pub blocks: usize,
    pub controls: Vec<ScheduledControl>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            generator: GeneratorConfig::default(),
            blocks: 200,
            controls: Vec::new(),
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(pipeline: PipelineConfig, blocks: usize) -> Self {
        Self {
            pipeline,
            blocks,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectrocore::interface::{CalibrationMode, WindowKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_keeps_pipeline() {
        let pipeline = PipelineConfig {
            vec_len: 1024,
            ..Default::default()
        };
        let cfg = WorkflowConfig::from_args(pipeline, 50);
        assert_eq!(cfg.pipeline.vec_len, 1024);
        assert_eq!(cfg.blocks, 50);
        assert!(cfg.controls.is_empty());
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"pipeline:\n  vec_len: 512\n  window: blackman_harris\n  calibration: Non_calibrated\n  nb_integration: 10\nblocks: 30\ncontrols:\n  - at_block: 10\n    command: set_mode\n    mode: Cold\n  - at_block: 20\n    command: set_recording\n    enabled: true\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();

        assert_eq!(cfg.pipeline.vec_len, 512);
        assert_eq!(cfg.pipeline.window, WindowKind::BlackmanHarris);
        assert_eq!(cfg.pipeline.calibration, CalibrationMode::NonCalibrated);
        assert_eq!(cfg.pipeline.integration_count(), 10);
        assert_eq!(cfg.pipeline.num_taps, 4);
        assert_eq!(cfg.blocks, 30);
        assert_eq!(
            cfg.controls,
            vec![
                ScheduledControl {
                    at_block: 10,
                    command: ControlCommand::SetMode {
                        mode: CalibrationMode::Cold
                    },
                },
                ScheduledControl {
                    at_block: 20,
                    command: ControlCommand::SetRecording { enabled: true },
                },
            ]
        );
    }

    #[test]
    fn unknown_window_in_yaml_is_rejected() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"pipeline:\n  window: kaiser\n").unwrap();
        let path = temp.into_temp_path();
        assert!(WorkflowConfig::load(&path).is_err());
    }
}
