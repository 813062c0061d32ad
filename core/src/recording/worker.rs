use crate::recording::format::{write_event, RecordingHeader};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

/// Flush events that may wait for the writer before `submit` blocks.
pub const FLUSH_QUEUE_DEPTH: usize = 4;

type FlushEvent = Vec<Vec<f32>>;

/// Background writer owning one recording sink (normally the session file).
///
/// Events are written in submission order. The header is written before the
/// thread starts so open and header failures surface to the caller at once;
/// a failure of a later write surfaces on the next `submit` or on `finish`.
pub struct FlushWorker {
    path: PathBuf,
    sender: Option<mpsc::Sender<FlushEvent>>,
    handle: Option<JoinHandle<io::Result<u64>>>,
}

impl FlushWorker {
    pub fn spawn<W>(sink: W, path: PathBuf, header: &RecordingHeader) -> io::Result<Self>
    where
        W: Write + Send + 'static,
    {
        let mut writer = BufWriter::new(sink);
        header.write_to(&mut writer)?;
        writer.flush()?;

        let (sender, mut receiver) = mpsc::channel::<FlushEvent>(FLUSH_QUEUE_DEPTH);
        let handle = thread::Builder::new()
            .name("recorder-flush".into())
            .spawn(move || -> io::Result<u64> {
                let mut written = 0u64;
                while let Some(rows) = receiver.blocking_recv() {
                    written += write_event(&mut writer, &rows)? as u64;
                    writer.flush()?;
                }
                Ok(written)
            })?;

        Ok(Self {
            path,
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queues one flush event, blocking only while the queue is full.
    pub fn submit(&mut self, rows: FlushEvent) -> io::Result<()> {
        let delivered = match self.sender.as_ref() {
            Some(sender) => sender.blocking_send(rows).is_ok(),
            None => false,
        };
        if delivered {
            return Ok(());
        }

        // The writer only hangs up after a failed write; report that failure.
        self.finish()?;
        Err(io::Error::new(
            ErrorKind::BrokenPipe,
            "recording writer is no longer running",
        ))
    }

    /// Closes the queue, waits for pending events and returns the number of
    /// event bytes written after the header.
    pub fn finish(&mut self) -> io::Result<u64> {
        self.sender.take();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| io::Error::new(ErrorKind::Other, "recording writer panicked"))?,
            None => Ok(0),
        }
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::format::{event_size, RecordReader};
    use std::fs::File;

    #[test]
    fn events_land_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.bin");
        let header = RecordingHeader {
            sample_rate: 1.0e6,
            azimuth: 0.0,
            elevation: 90.0,
            vec_len: 2,
            bin_indices: vec![0, 1],
        };

        let mut worker =
            FlushWorker::spawn(File::create(&path).unwrap(), path.clone(), &header).unwrap();
        for k in 0..10 {
            worker
                .submit(vec![vec![k as f32, -(k as f32)]])
                .unwrap();
        }
        assert_eq!(worker.finish().unwrap(), 10 * event_size(1, 2) as u64);

        let rows = RecordReader::open(&path).unwrap().read_all_rows().unwrap();
        let expected: Vec<Vec<f32>> = (0..10).map(|k| vec![k as f32, -(k as f32)]).collect();
        assert_eq!(rows, expected);
    }

    #[test]
    fn submit_after_finish_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("closed.bin");
        let header = RecordingHeader {
            sample_rate: 1.0,
            azimuth: 0.0,
            elevation: 0.0,
            vec_len: 1,
            bin_indices: vec![0],
        };
        let mut worker =
            FlushWorker::spawn(File::create(&path).unwrap(), path.clone(), &header).unwrap();
        worker.finish().unwrap();
        assert!(worker.submit(vec![vec![1.0]]).is_err());
    }
}
