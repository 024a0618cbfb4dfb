use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

const LEN_BYTES: usize = 4;
const CRC_BYTES: usize = 4;

/// Write one record as `[len][bincode][crc32]`.
fn write_record<R: Serialize>(writer: &mut impl Write, record: &R) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

enum Frame {
    Payload(Vec<u8>),
    /// Clean end of file, a torn tail, or a CRC mismatch. Replay stops here.
    End,
}

/// Read exactly `buf.len()` bytes; `Ok(false)` on EOF.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_frame(reader: &mut impl Read) -> io::Result<Frame> {
    let mut len_buf = [0u8; LEN_BYTES];
    if !fill(reader, &mut len_buf)? {
        return Ok(Frame::End);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
    if !fill(reader, &mut payload)? {
        return Ok(Frame::End);
    }
    let mut crc_buf = [0u8; CRC_BYTES];
    if !fill(reader, &mut crc_buf)? {
        return Ok(Frame::End);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(Frame::End);
    }
    Ok(Frame::Payload(payload))
}

/// Append-only write-ahead log holding every committed scheduling change.
///
/// Entry format: `[u32 LE: len][bincode payload][u32 LE: crc32 of payload]`.
/// A torn or corrupt tail (crash mid-append) is dropped on replay and cut off
/// the file before the first new append; everything before it is kept.
pub struct Wal {
    file: File,
    path: PathBuf,
    /// Length of the file up to the last fsynced frame.
    committed_len: u64,
    /// Encoded frames waiting for `flush_sync`.
    pending: Vec<u8>,
    pending_records: u64,
    appends_since_compact: u64,
}

impl Wal {
    /// Replay the log at `path` and open it for appends. Bytes after the last
    /// intact frame are truncated so new records are never stranded behind them.
    pub fn open<R: DeserializeOwned>(path: &Path) -> io::Result<(Self, Vec<R>)> {
        let (records, valid_len) = Self::scan(path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() != valid_len {
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(valid_len))?;
        let wal = Self {
            file,
            path: path.to_path_buf(),
            committed_len: valid_len,
            pending: Vec::new(),
            pending_records: 0,
            appends_since_compact: 0,
        };
        Ok((wal, records))
    }

    /// Buffer one record. Nothing is durable until `flush_sync`. A record that
    /// fails to encode leaves the buffer as it was.
    pub fn append_buffered<R: Serialize>(&mut self, record: &R) -> io::Result<()> {
        let mut frame = Vec::new();
        write_record(&mut frame, record)?;
        self.pending.extend_from_slice(&frame);
        self.pending_records += 1;
        Ok(())
    }

    /// Append and fsync a single record.
    #[cfg(test)]
    pub fn append<R: Serialize>(&mut self, record: &R) -> io::Result<()> {
        self.append_buffered(record)?;
        self.flush_sync()
    }

    /// Write and fsync everything buffered. On failure the buffer is dropped and
    /// the file is cut back to its last committed length, so none of it survives.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let written = self
            .file
            .write_all(&self.pending)
            .and_then(|()| self.file.sync_data());
        let frames = std::mem::take(&mut self.pending);
        let records = std::mem::take(&mut self.pending_records);
        match written {
            Ok(()) => {
                self.committed_len += frames.len() as u64;
                self.appends_since_compact += records;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.rollback() {
                    tracing::error!("WAL rollback after failed flush: {rollback}");
                }
                Err(e)
            }
        }
    }

    fn rollback(&mut self) -> io::Result<()> {
        self.file.set_len(self.committed_len)?;
        self.file.seek(SeekFrom::Start(self.committed_len))?;
        self.file.sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn compact_tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a snapshot to the side file and fsync it. Slow; the live log is untouched.
    pub fn write_snapshot<R: Serialize>(path: &Path, records: &[R]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_tmp_path(path))?);
        for record in records {
            write_record(&mut writer, record)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the snapshot over the live log and reopen for appends.
    pub fn install_snapshot(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_tmp_path(&self.path), &self.path)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;
        self.committed_len = file.seek(SeekFrom::End(0))?;
        self.file = file;
        self.pending.clear();
        self.pending_records = 0;
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Read back every intact record. A missing file is an empty log.
    pub fn replay<R: DeserializeOwned>(path: &Path) -> io::Result<Vec<R>> {
        Self::scan(path).map(|(records, _)| records)
    }

    /// Intact records plus the byte length they occupy.
    fn scan<R: DeserializeOwned>(path: &Path) -> io::Result<(Vec<R>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut valid_len = 0u64;
        while let Frame::Payload(payload) = read_frame(&mut reader)? {
            match bincode::deserialize::<R>(&payload) {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
            valid_len += (LEN_BYTES + payload.len() + CRC_BYTES) as u64;
        }
        Ok((records, valid_len))
    }
}
