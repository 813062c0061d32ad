use anyhow::Context;
use clap::Parser;
use gui_bridge::bridge::TelemetryBridge;
use log::info;
use spectrocore::interface::{CalibrationMode, WindowKind};
use spectrocore::recording::RecordReader;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::{RunContext, Runner, WorkflowResult};

mod generator;
mod gui_bridge;
mod workflow;

const RUN_LOG: &str = "spectrometer_runs.log";

#[derive(Parser)]
#[command(author, version, about = "H I spectrometer pipeline driver")]
struct Args {
    /// Load a workflow config from YAML; the pipeline flags below are ignored
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long, default_value_t = 4096)]
    vec_len: usize,
    #[arg(long, default_value_t = 4)]
    num_taps: usize,
    /// hanning, hamming or blackman_harris
    #[arg(long, default_value = "hamming")]
    window: WindowKind,
    #[arg(long, default_value_t = 25, allow_negative_numbers = true)]
    nb_integration: i64,
    /// Hot, Cold, Calibrated or Non_calibrated
    #[arg(long, default_value = "Hot")]
    mode: CalibrationMode,
    #[arg(long, default_value_t = 2.5e6)]
    sample_rate: f64,
    /// Number of sample blocks to process; 0 runs until Ctrl+C
    #[arg(long)]
    blocks: Option<usize>,
    #[arg(long, default_value_t = false)]
    record: bool,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    azimuth: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    elevation: f64,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Expose telemetry and accept controls over HTTP, pacing blocks in real time
    #[arg(long, default_value_t = false)]
    serve: bool,
    #[arg(long, default_value = "127.0.0.1:9000")]
    bind: SocketAddr,
    /// Print the header and row counts of a recorded file, then exit
    #[arg(long)]
    inspect: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if let Some(path) = args.inspect.as_deref() {
        return inspect(path);
    }

    let workflow_config = load_workflow(&args)?;
    fs::create_dir_all(&workflow_config.pipeline.output_dir).with_context(|| {
        format!(
            "creating output directory {}",
            workflow_config.pipeline.output_dir.display()
        )
    })?;
    let runner = Runner::new(workflow_config.clone());

    let stop = Arc::new(AtomicBool::new(false));
    spawn_interrupt_watcher(stop.clone())?;

    let result = if args.serve {
        let (bridge, mut controls) = TelemetryBridge::new();
        bridge.serve(args.bind)?;
        bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        let pace = block_period(&workflow_config);
        runner.execute(RunContext {
            controls: Some(&mut controls),
            bridge: Some(&bridge),
            stop: Some(&stop),
            pace: Some(pace),
        })?
    } else {
        runner.execute(RunContext {
            stop: Some(&stop),
            ..Default::default()
        })?
    };

    report(&workflow_config, &result)
}

fn load_workflow(args: &Args) -> anyhow::Result<WorkflowConfig> {
    let mut config = if let Some(path) = args.workflow.as_deref() {
        WorkflowConfig::load(path)?
    } else {
        let mut config = WorkflowConfig::default();
        let pipeline = &mut config.pipeline;
        pipeline.vec_len = args.vec_len;
        pipeline.num_taps = args.num_taps;
        pipeline.window = args.window;
        pipeline.nb_integration = args.nb_integration;
        pipeline.calibration = args.mode;
        pipeline.sample_rate = args.sample_rate;
        pipeline.record = args.record;
        pipeline.azimuth = args.azimuth;
        pipeline.elevation = args.elevation;
        config
    };
    if let Some(blocks) = args.blocks {
        config.blocks = blocks;
    }
    if let Some(dir) = args.output_dir.as_ref() {
        config.pipeline.output_dir = dir.clone();
    }
    Ok(config)
}

/// Time the radio needs to deliver one block at the configured sample rate.
fn block_period(config: &WorkflowConfig) -> Duration {
    let pipeline = &config.pipeline;
    Duration::from_secs_f64(pipeline.vec_len as f64 / pipeline.sample_rate.max(1.0))
}

fn spawn_interrupt_watcher(stop: Arc<AtomicBool>) -> anyhow::Result<()> {
    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    thread::Builder::new()
        .name("interrupt-watcher".into())
        .spawn(move || {
            if runtime.block_on(signal::ctrl_c()).is_ok() {
                info!("Ctrl+C received, finishing current block");
                stop.store(true, Ordering::Relaxed);
            }
        })
        .context("spawning interrupt watcher")?;
    Ok(())
}

fn report(config: &WorkflowConfig, result: &WorkflowResult) -> anyhow::Result<()> {
    let mean_tsys = result
        .last_output
        .as_ref()
        .map_or(0.0, |output| output.mean_tsys());
    println!(
        "Run -> blocks {}, spectra {}, mean Tsys {:.2} K, rows recorded {}, errors {}",
        result.blocks_processed,
        result.spectra_emitted,
        mean_tsys,
        result.metrics.rows_recorded,
        result.metrics.errors
    );

    let pipeline = &config.pipeline;
    let line = format!(
        "vec_len={} taps={} window={} nb_integration={} mode={} blocks={} spectra={} mean_tsys={:.3} rows={} bytes={} errors={}\n",
        pipeline.vec_len,
        pipeline.num_taps,
        pipeline.window,
        pipeline.integration_count(),
        pipeline.calibration,
        result.blocks_processed,
        result.spectra_emitted,
        mean_tsys,
        result.metrics.rows_recorded,
        result.metrics.bytes_flushed,
        result.metrics.errors
    );
    let log_path = pipeline.output_dir.join(RUN_LOG);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening run log {}", log_path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let mut reader = RecordReader::open(path)
        .with_context(|| format!("opening recording {}", path.display()))?;
    let header = reader.header().clone();
    println!("file:        {}", path.display());
    println!("sample rate: {} Hz", header.sample_rate);
    println!("pointing:    az {:.2} el {:.2}", header.azimuth, header.elevation);
    println!(
        "channels:    {} of {} recorded",
        header.row_len(),
        header.vec_len
    );

    let mut events = 0;
    let mut rows = 0;
    while let Some(event) = reader
        .next_event()
        .with_context(|| format!("reading event {} of {}", events, path.display()))?
    {
        events += 1;
        rows += event.len();
    }
    println!("events:      {}", events);
    println!("rows:        {}", rows);
    Ok(())
}
