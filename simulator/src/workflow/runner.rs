use crate::generator::profile::GaussianSource;
use crate::gui_bridge::bridge::TelemetryBridge;
use crate::gui_bridge::model::DisplayModel;
use crate::workflow::chain::Spectrometer;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use log::{info, warn};
use spectrocore::interface::{CalibrationOutput, ControlCommand};
use spectrocore::telemetry::MetricsSnapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub struct WorkflowResult {
    pub blocks_processed: usize,
    pub spectra_emitted: usize,
    pub last_output: Option<CalibrationOutput>,
    pub metrics: MetricsSnapshot,
}

/// Live inputs of a run. Everything is optional so offline runs and tests
/// can use `RunContext::default()`.
#[derive(Default)]
pub struct RunContext<'a> {
    pub controls: Option<&'a mut UnboundedReceiver<ControlCommand>>,
    pub bridge: Option<&'a TelemetryBridge>,
    pub stop: Option<&'a AtomicBool>,
    /// Sleep between blocks to approximate the radio's sample cadence.
    pub pace: Option<Duration>,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self, mut ctx: RunContext<'_>) -> anyhow::Result<WorkflowResult> {
        let pipeline = &self.config.pipeline;
        let mut chain = Spectrometer::new(pipeline).context("assembling spectrometer chain")?;
        let mut source = GaussianSource::new(self.config.generator.clone(), pipeline.sample_rate);

        let mut schedule = self.config.controls.clone();
        schedule.sort_by_key(|control| control.at_block);
        let mut schedule = schedule.into_iter().peekable();

        if let Some(bridge) = ctx.bridge {
            bridge.publish_status(&format!(
                "running {} channels, {} mode",
                pipeline.vec_len, pipeline.calibration
            ));
        }

        let mut blocks_processed = 0;
        let mut spectra_emitted = 0;
        let mut last_output = None;

        while self.config.blocks == 0 || blocks_processed < self.config.blocks {
            if ctx.stop.is_some_and(|stop| stop.load(Ordering::Relaxed)) {
                info!("stop requested after {} blocks", blocks_processed);
                break;
            }

            while let Some(scheduled) = schedule.next_if(|c| c.at_block <= blocks_processed) {
                apply_control(&mut chain, &mut source, scheduled.command);
            }
            if let Some(receiver) = ctx.controls.as_deref_mut() {
                while let Ok(command) = receiver.try_recv() {
                    apply_control(&mut chain, &mut source, command);
                }
            }

            let block = source.next_block(pipeline.vec_len);
            let emitted = chain
                .process_block(&block)
                .with_context(|| format!("processing block {}", blocks_processed))?;
            blocks_processed += 1;

            if let Some(output) = emitted {
                spectra_emitted += 1;
                if let Some(bridge) = ctx.bridge {
                    let model = DisplayModel::from_output(
                        &output,
                        chain.line_profile(),
                        chain.is_recording(),
                        chain.metrics(),
                    );
                    bridge.publish(&model);
                }
                last_output = Some(output);
            }
            if let Some(err) = chain.take_recording_error() {
                if let Some(bridge) = ctx.bridge {
                    bridge.publish_status(&format!("recording stopped: {}", err));
                }
            }

            if let Some(pace) = ctx.pace {
                thread::sleep(pace);
            }
        }

        chain.shutdown().context("closing recorder")?;
        let metrics = chain.metrics();
        if let Some(bridge) = ctx.bridge {
            bridge.publish_status(&format!(
                "finished after {} blocks, {} spectra",
                blocks_processed, spectra_emitted
            ));
        }

        Ok(WorkflowResult {
            blocks_processed,
            spectra_emitted,
            last_output,
            metrics,
        })
    }
}

/// Control errors are reported and the run continues with the previous state.
fn apply_control(chain: &mut Spectrometer, source: &mut GaussianSource, command: ControlCommand) {
    let result = match command {
        ControlCommand::SetSource {
            carrier_frequency,
            sigma,
            amplitude,
        } => update_source(source, carrier_frequency, sigma, amplitude),
        other => chain.apply(other).map_err(anyhow::Error::from),
    };
    if let Err(err) = result {
        warn!("control rejected: {}", err);
    }
}

fn update_source(
    source: &mut GaussianSource,
    carrier_frequency: Option<f64>,
    sigma: Option<f64>,
    amplitude: Option<f64>,
) -> anyhow::Result<()> {
    if let Some(sigma) = sigma {
        source.set_sigma(sigma)?;
    }
    if let Some(frequency) = carrier_frequency {
        source.set_carrier_frequency(frequency);
    }
    if let Some(amplitude) = amplitude {
        source.set_amplitude(amplitude);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::ScheduledControl;
    use spectrocore::interface::CalibrationMode;
    use spectrocore::prelude::PipelineConfig;
    use std::fs;
    use tempfile::tempdir;
    use tokio::sync::mpsc::unbounded_channel;

    fn small_workflow(output_dir: &std::path::Path, blocks: usize) -> WorkflowConfig {
        let pipeline = PipelineConfig {
            vec_len: 128,
            nb_integration: 5,
            output_dir: output_dir.to_path_buf(),
            ..Default::default()
        };
        WorkflowConfig::from_args(pipeline, blocks)
    }

    #[test]
    fn runner_executes_workflow() {
        let dir = tempdir().unwrap();
        let runner = Runner::new(small_workflow(dir.path(), 50));
        let result = runner.execute(RunContext::default()).unwrap();

        assert_eq!(result.blocks_processed, 50);
        assert_eq!(result.spectra_emitted, 10);
        assert_eq!(result.metrics.spectra_emitted, 10);
        let last = result.last_output.unwrap();
        assert_eq!(last.len(), 128);
        assert_eq!(last.mode, CalibrationMode::Hot);
    }

    #[test]
    fn scheduled_controls_apply_at_their_block() {
        let dir = tempdir().unwrap();
        let mut cfg = small_workflow(dir.path(), 40);
        cfg.controls = vec![
            ScheduledControl {
                at_block: 10,
                command: ControlCommand::SetMode {
                    mode: CalibrationMode::Cold,
                },
            },
            ScheduledControl {
                at_block: 20,
                command: ControlCommand::SetMode {
                    mode: CalibrationMode::Calibrated,
                },
            },
            ScheduledControl {
                at_block: 20,
                command: ControlCommand::SetRecording { enabled: true },
            },
        ];
        let result = Runner::new(cfg).execute(RunContext::default()).unwrap();

        assert_eq!(result.last_output.unwrap().mode, CalibrationMode::Calibrated);
        assert_eq!(result.metrics.rows_recorded, 4);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn live_controls_are_drained_between_blocks() {
        let dir = tempdir().unwrap();
        let runner = Runner::new(small_workflow(dir.path(), 10));
        let (sender, mut receiver) = unbounded_channel();
        sender
            .send(ControlCommand::SetMode {
                mode: CalibrationMode::NonCalibrated,
            })
            .unwrap();

        let result = runner
            .execute(RunContext {
                controls: Some(&mut receiver),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            result.last_output.unwrap().mode,
            CalibrationMode::NonCalibrated
        );
    }

    #[test]
    fn stop_flag_ends_unbounded_run() {
        let dir = tempdir().unwrap();
        let runner = Runner::new(small_workflow(dir.path(), 0));
        let stop = AtomicBool::new(true);
        let result = runner
            .execute(RunContext {
                stop: Some(&stop),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(result.blocks_processed, 0);
        assert!(result.last_output.is_none());
    }

    #[test]
    fn rejected_control_does_not_abort_run() {
        let dir = tempdir().unwrap();
        let mut cfg = small_workflow(dir.path(), 10);
        cfg.pipeline.output_dir = dir.path().join("absent");
        cfg.controls = vec![ScheduledControl {
            at_block: 0,
            command: ControlCommand::SetRecording { enabled: true },
        }];
        let result = Runner::new(cfg).execute(RunContext::default()).unwrap();
        assert_eq!(result.spectra_emitted, 2);
        assert_eq!(result.metrics.errors, 1);
    }

    #[test]
    fn source_controls_reach_the_generator() {
        let dir = tempdir().unwrap();
        let mut cfg = small_workflow(dir.path(), 10);
        cfg.generator.noise = 0.0;
        let baseline = Runner::new(cfg.clone())
            .execute(RunContext::default())
            .unwrap();
        assert!(baseline.last_output.unwrap().power.iter().any(|&p| p > 0.0));

        cfg.controls = vec![ScheduledControl {
            at_block: 0,
            command: ControlCommand::SetSource {
                carrier_frequency: None,
                sigma: None,
                amplitude: Some(0.0),
            },
        }];
        let silenced = Runner::new(cfg).execute(RunContext::default()).unwrap();
        assert!(silenced.last_output.unwrap().power.iter().all(|&p| p == 0.0));
        assert_eq!(silenced.metrics.errors, 0);
    }
}
