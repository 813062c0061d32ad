use crate::prelude::{expect_len, PipelineConfig, ProcessingStage, StageError, StageResult};
use crate::recording::band::FrequencyWindow;
use crate::recording::format::{event_size, RecordingHeader};
use crate::recording::worker::FlushWorker;
use crate::telemetry::log::LogManager;
use chrono::{Local, NaiveDateTime};
use ndarray::{ArrayView2, Axis};
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

const MAX_NAME_COLLISIONS: usize = 1000;

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub vec_len: usize,
    pub azimuth: f64,
    pub elevation: f64,
    pub toggle: bool,
    pub sample_rate: f64,
    pub output_dir: PathBuf,
    /// The buffer is flushed once it holds more rows than this.
    pub flush_rows: usize,
    pub band: FrequencyWindow,
}

impl RecorderConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            vec_len: config.vec_len,
            azimuth: config.azimuth,
            elevation: config.elevation,
            toggle: config.record,
            sample_rate: config.sample_rate,
            output_dir: config.output_dir.clone(),
            flush_rows: config.flush_rows,
            band: config.band,
        }
    }
}

/// `data_<YYYY-MM-DD_HH-MM-SS>_az<AZ>_el<EL>_rate<RATE>.bin`
///
/// The rate keeps its decimal point (`rate2500000.0`) so names match files
/// produced by the existing acquisition scripts.
pub fn recording_filename(
    timestamp: &NaiveDateTime,
    azimuth: f64,
    elevation: f64,
    sample_rate: f64,
) -> String {
    format!(
        "data_{}_az{:.2}_el{:.2}_rate{:?}.bin",
        timestamp.format("%Y-%m-%d_%H-%M-%S"),
        azimuth,
        elevation,
        sample_rate
    )
}

struct RecordingSession {
    worker: FlushWorker,
    buffer: Vec<Vec<f32>>,
}

/// Writes the in-band slice of every incoming spectrum to a timestamped file
/// while recording is toggled on.
pub struct Recorder {
    config: RecorderConfig,
    toggle: bool,
    bin_indices: Vec<usize>,
    session: Option<RecordingSession>,
    logger: LogManager,
}

impl Recorder {
    /// Starts recording right away when `config.toggle` is set; a file that
    /// cannot be opened at construction is reported as an error.
    pub fn new(config: RecorderConfig) -> StageResult<Self> {
        if config.vec_len == 0 {
            return Err(StageError::Config("vector length must be positive".into()));
        }
        if !(config.sample_rate.is_finite() && config.sample_rate > 0.0) {
            return Err(StageError::Config(format!(
                "sample rate must be positive, got {}",
                config.sample_rate
            )));
        }

        let bin_indices = config.band.bin_indices(config.vec_len, config.sample_rate);
        let logger = LogManager::new("spectrocore::recorder");
        logger.detail(&format!(
            "recorder keeps {} of {} bins",
            bin_indices.len(),
            config.vec_len
        ));

        let start = config.toggle;
        let mut recorder = Self {
            config,
            toggle: false,
            bin_indices,
            session: None,
            logger,
        };
        if start {
            recorder.set_toggle(true)?;
        }
        Ok(recorder)
    }

    /// Starts or stops recording. Repeating the current state is a no-op.
    pub fn set_toggle(&mut self, on: bool) -> StageResult<()> {
        if on == self.toggle {
            return Ok(());
        }
        if on {
            self.start()
        } else {
            self.stop()
        }
    }

    /// Updates the pointing. An active recording is closed and a new file,
    /// named after the new coordinates, is opened.
    pub fn set_azimuth_elevation(&mut self, azimuth: f64, elevation: f64) -> StageResult<()> {
        let recording = self.toggle;
        let closed = if recording { self.stop() } else { Ok(()) };
        self.config.azimuth = azimuth;
        self.config.elevation = elevation;
        closed?;
        if recording {
            self.start()?;
        }
        Ok(())
    }

    /// Buffers the in-band bins of `vector`. Returns the size of the flush
    /// event handed to the writer, or 0 when nothing was flushed.
    pub fn process_vector(&mut self, vector: &[f32]) -> StageResult<usize> {
        expect_len("recorder", self.config.vec_len, vector.len())?;
        if self.session.is_none() {
            return Ok(0);
        }
        let row = self.bin_indices.iter().map(|&idx| vector[idx]).collect();
        self.push_row(row)
    }

    /// Batch form of [`process_vector`](Self::process_vector).
    pub fn process_batch(&mut self, rows: ArrayView2<f32>) -> StageResult<usize> {
        expect_len("recorder batch", self.config.vec_len, rows.ncols())?;
        if self.session.is_none() {
            return Ok(0);
        }
        let selected = rows.select(Axis(1), &self.bin_indices);
        let mut flushed = 0;
        for row in selected.rows() {
            flushed += self.push_row(row.to_vec())?;
        }
        Ok(flushed)
    }

    /// Hands the pending rows to the writer.
    pub fn flush(&mut self) -> StageResult<usize> {
        let row_len = self.bin_indices.len();
        let Some(session) = self.session.as_mut() else {
            return Ok(0);
        };
        if session.buffer.is_empty() {
            return Ok(0);
        }

        let rows = std::mem::take(&mut session.buffer);
        let bytes = event_size(rows.len(), row_len);
        match session.worker.submit(rows) {
            Ok(()) => Ok(bytes),
            Err(source) => {
                let path = session.worker.path().to_path_buf();
                Err(self.fail(path, source))
            }
        }
    }

    /// Flushes and closes any open file.
    pub fn close(&mut self) -> StageResult<()> {
        self.set_toggle(false)
    }

    pub fn is_recording(&self) -> bool {
        self.toggle
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|session| session.worker.path())
    }

    pub fn buffered_rows(&self) -> usize {
        self.session.as_ref().map_or(0, |session| session.buffer.len())
    }

    pub fn bin_indices(&self) -> &[usize] {
        &self.bin_indices
    }

    pub fn azimuth(&self) -> f64 {
        self.config.azimuth
    }

    pub fn elevation(&self) -> f64 {
        self.config.elevation
    }

    fn push_row(&mut self, row: Vec<f32>) -> StageResult<usize> {
        let threshold = self.config.flush_rows;
        let Some(session) = self.session.as_mut() else {
            return Ok(0);
        };
        session.buffer.push(row);
        if session.buffer.len() > threshold {
            self.flush()
        } else {
            Ok(0)
        }
    }

    fn start(&mut self) -> StageResult<()> {
        let (path, file) = match self.create_output() {
            Ok(opened) => opened,
            Err((path, source)) => return Err(self.fail(path, source)),
        };
        self.begin_session(path, file)
    }

    /// Writes the header to `sink` and hands it to a new flush worker.
    fn begin_session<W>(&mut self, path: PathBuf, sink: W) -> StageResult<()>
    where
        W: Write + Send + 'static,
    {
        let header = RecordingHeader {
            sample_rate: self.config.sample_rate,
            azimuth: self.config.azimuth,
            elevation: self.config.elevation,
            vec_len: self.config.vec_len as u32,
            bin_indices: self.bin_indices.iter().map(|&idx| idx as u32).collect(),
        };
        let worker = match FlushWorker::spawn(sink, path.clone(), &header) {
            Ok(worker) => worker,
            Err(source) => return Err(self.fail(path, source)),
        };

        self.logger
            .record(&format!("recording started: {}", path.display()));
        self.session = Some(RecordingSession {
            worker,
            buffer: Vec::new(),
        });
        self.toggle = true;
        Ok(())
    }

    fn stop(&mut self) -> StageResult<()> {
        self.toggle = false;
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        let rows = std::mem::take(&mut session.buffer);
        let submitted = if rows.is_empty() {
            Ok(())
        } else {
            session.worker.submit(rows)
        };
        let finished = session.worker.finish();
        let path = session.worker.path().to_path_buf();

        match submitted.and(finished) {
            Ok(bytes) => {
                self.logger.record(&format!(
                    "recording closed: {} ({} bytes of spectra)",
                    path.display(),
                    bytes
                ));
                Ok(())
            }
            Err(source) => Err(self.fail(path, source)),
        }
    }

    /// Opens a fresh file; a name already taken within the same second gets
    /// a numeric suffix instead of being overwritten.
    fn create_output(&self) -> Result<(PathBuf, File), (PathBuf, io::Error)> {
        let name = recording_filename(
            &Local::now().naive_local(),
            self.config.azimuth,
            self.config.elevation,
            self.config.sample_rate,
        );
        let stem = name.trim_end_matches(".bin").to_string();

        let mut candidate = self.config.output_dir.join(&name);
        for attempt in 1..=MAX_NAME_COLLISIONS {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(file) => return Ok((candidate, file)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    candidate = self
                        .config
                        .output_dir
                        .join(format!("{}_{}.bin", stem, attempt));
                }
                Err(err) => return Err((candidate, err)),
            }
        }
        Err((
            candidate,
            io::Error::new(ErrorKind::AlreadyExists, "no free recording file name"),
        ))
    }

    /// Disables recording after an I/O failure and builds the error to report.
    fn fail(&mut self, path: PathBuf, source: io::Error) -> StageError {
        self.toggle = false;
        self.session = None;
        self.logger.warn(&format!(
            "recording disabled after I/O failure on {}: {}",
            path.display(),
            source
        ));
        StageError::RecordingIo { path, source }
    }
}

impl ProcessingStage for Recorder {
    type Input = [f32];
    type Output = usize;

    fn execute(&mut self, input: &[f32]) -> StageResult<usize> {
        self.process_vector(input)
    }

    fn cleanup(&mut self) {
        if let Err(err) = self.close() {
            self.logger.warn(&format!("recorder cleanup: {}", err));
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.cleanup();
    }
}
