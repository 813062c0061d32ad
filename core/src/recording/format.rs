//! Binary layout of recording files.
//!
//! All fields are little-endian.
//!
//! ```text
//! header  "H1SP" | u32 version | f64 sample_rate | f64 azimuth | f64 elevation
//!         | u32 vec_len | u32 bin_count | bin_count x u32 bin index
//! event*  u32 row_count | u32 row_len | row_count x row_len x f32
//! ```
//!
//! Each event is one buffer flush. A file ends cleanly on an event boundary.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::Path;

pub const MAGIC: &[u8; 4] = b"H1SP";
pub const FORMAT_VERSION: u32 = 1;

/// Observation metadata written once at the start of a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingHeader {
    pub sample_rate: f64,
    pub azimuth: f64,
    pub elevation: f64,
    pub vec_len: u32,
    /// FFT bin index of every recorded column.
    pub bin_indices: Vec<u32>,
}

impl RecordingHeader {
    pub fn row_len(&self) -> usize {
        self.bin_indices.len()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        writer.write_f64::<LittleEndian>(self.sample_rate)?;
        writer.write_f64::<LittleEndian>(self.azimuth)?;
        writer.write_f64::<LittleEndian>(self.elevation)?;
        writer.write_u32::<LittleEndian>(self.vec_len)?;
        writer.write_u32::<LittleEndian>(self.bin_indices.len() as u32)?;
        for &index in &self.bin_indices {
            writer.write_u32::<LittleEndian>(index)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                "not a spectrometer recording (bad magic)",
            ));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("unsupported recording version {}", version),
            ));
        }

        let sample_rate = reader.read_f64::<LittleEndian>()?;
        let azimuth = reader.read_f64::<LittleEndian>()?;
        let elevation = reader.read_f64::<LittleEndian>()?;
        let vec_len = reader.read_u32::<LittleEndian>()?;
        let bin_count = reader.read_u32::<LittleEndian>()? as usize;
        let mut bin_indices = vec![0u32; bin_count];
        reader.read_u32_into::<LittleEndian>(&mut bin_indices)?;

        Ok(Self {
            sample_rate,
            azimuth,
            elevation,
            vec_len,
            bin_indices,
        })
    }
}

/// Encoded size in bytes of one flush event.
pub fn event_size(rows: usize, row_len: usize) -> usize {
    8 + rows * row_len * 4
}

/// Writes one flush event; every row must be `row_len` long.
pub fn write_event<W: Write>(writer: &mut W, rows: &[Vec<f32>]) -> io::Result<usize> {
    let row_len = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|row| row.len() != row_len) {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            "ragged rows in flush event",
        ));
    }

    writer.write_u32::<LittleEndian>(rows.len() as u32)?;
    writer.write_u32::<LittleEndian>(row_len as u32)?;
    for row in rows {
        for &value in row {
            writer.write_f32::<LittleEndian>(value)?;
        }
    }
    Ok(event_size(rows.len(), row_len))
}

/// Sequential reader over a recording file.
pub struct RecordReader<R: Read> {
    reader: R,
    header: RecordingHeader,
}

impl RecordReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read> RecordReader<R> {
    pub fn new(mut reader: R) -> io::Result<Self> {
        let header = RecordingHeader::read_from(&mut reader)?;
        Ok(Self { reader, header })
    }

    pub fn header(&self) -> &RecordingHeader {
        &self.header
    }

    /// Next flush event, or `None` at a clean end of file.
    pub fn next_event(&mut self) -> io::Result<Option<Vec<Vec<f32>>>> {
        let mut prefix = [0u8; 4];
        let mut filled = 0;
        while filled < prefix.len() {
            match self.reader.read(&mut prefix[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < prefix.len() {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "truncated flush event",
            ));
        }

        let row_count = LittleEndian::read_u32(&prefix) as usize;
        let row_len = self.reader.read_u32::<LittleEndian>()? as usize;
        if row_count > 0 && row_len != self.header.row_len() {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "event rows hold {} bins, header declares {}",
                    row_len,
                    self.header.row_len()
                ),
            ));
        }

        let mut rows = Vec::with_capacity(row_count);
        for _ in 0..row_count {
            let mut row = vec![0f32; row_len];
            self.reader.read_f32_into::<LittleEndian>(&mut row)?;
            rows.push(row);
        }
        Ok(Some(rows))
    }

    /// Concatenates the rows of every remaining event.
    pub fn read_all_rows(&mut self) -> io::Result<Vec<Vec<f32>>> {
        let mut rows = Vec::new();
        while let Some(event) = self.next_event()? {
            rows.extend(event);
        }
        Ok(rows)
    }
}
