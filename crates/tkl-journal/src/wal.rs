use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use tkl_store::{BatchJournal, StoreError, StoreResult, TxOp};

use crate::config::SyncMode;

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct WalWriter {
    writer: BufWriter<File>,
    /// Current write offset in the journal file.
    offset: u64,
}

/// Append-only journal of committed batches.
///
/// Each committed unit of work is one entry:
///
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized Vec<TxOp>)]
/// ```
///
/// On recovery the file is read front to back. A truncated tail (torn write)
/// ends recovery and is cut off so later appends stay readable; an entry
/// that fails its CRC is skipped. A failed append is rolled back to the
/// previous end of the journal.
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<WalWriter>,
    sync_mode: SyncMode,
}

impl WriteAheadLog {
    /// Open (or create) a journal file at the given path.
    pub fn open(path: &Path, sync_mode: SyncMode) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let (writer, offset) = open_append(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(WalWriter { writer, offset }),
            sync_mode,
        })
    }

    /// Append one batch. Returns the byte offset of the entry.
    pub fn append_batch(&self, batch: &[TxOp]) -> StoreResult<u64> {
        let payload = encode(batch)?;
        let mut w = self.writer.lock()?;
        let entry_offset = w.offset;
        let written = write_entry(&mut w.writer, &payload).and_then(|()| self.sync(&mut w.writer));
        if let Err(e) = written {
            warn!(offset = entry_offset, error = %e, "journal append failed; rolling back");
            if let Err(rollback) = self.roll_back(&mut w, entry_offset) {
                warn!(offset = entry_offset, error = %rollback, "journal rollback failed");
            }
            return Err(e.into());
        }
        w.offset += (HEADER_SIZE + payload.len()) as u64;

        debug!(offset = entry_offset, ops = batch.len(), len = payload.len(), "journal append");
        Ok(entry_offset)
    }

    /// Read back every intact batch, in commit order.
    pub fn recover(&self) -> StoreResult<Vec<Vec<TxOp>>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut batches = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;

            let mut header = [0u8; HEADER_SIZE];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + u64::from(length) > file_len {
                warn!(offset, length, file_len, "truncated journal entry; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            match file.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, "truncated journal entry; stopping recovery");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            offset += HEADER_SIZE as u64 + u64::from(length);

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping journal entry"
                );
                continue;
            }

            match bincode::deserialize::<Vec<TxOp>>(&payload) {
                Ok(batch) => batches.push(batch),
                Err(e) => warn!(offset, error = %e, "undecodable journal entry; skipping"),
            }
        }

        if offset < file_len {
            warn!(valid = offset, file_len, "cutting off torn journal tail");
            let mut w = self.writer.lock()?;
            w.writer.flush()?;
            w.writer.get_ref().set_len(offset)?;
            w.offset = offset;
        }

        debug!(recovered = batches.len(), "journal recovery complete");
        Ok(batches)
    }

    /// Replace the whole journal with a single batch.
    ///
    /// The new contents are written to a sibling file and renamed over the
    /// journal, so a crash leaves either the old or the new journal intact.
    /// An empty batch leaves an empty journal.
    pub fn rewrite(&self, batch: &[TxOp]) -> StoreResult<()> {
        let mut w = self.writer.lock()?;
        let tmp = self.path.with_extension("compact");
        let mut offset = 0u64;
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            if !batch.is_empty() {
                let payload = encode(batch)?;
                write_entry(&mut out, &payload)?;
                offset = (HEADER_SIZE + payload.len()) as u64;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        let (writer, reopened) = open_append(&self.path)?;
        debug_assert_eq!(reopened, offset);
        w.writer = writer;
        w.offset = reopened;

        debug!(ops = batch.len(), len = offset, "journal rewritten");
        Ok(())
    }

    /// Current write offset.
    pub fn offset(&self) -> StoreResult<u64> {
        Ok(self.writer.lock()?.offset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop whatever a failed append left buffered or on disk, so the
    /// journal ends at `entry_offset` again.
    fn roll_back(&self, w: &mut WalWriter, entry_offset: u64) -> io::Result<()> {
        let (fresh, _) = open_append(&self.path)?;
        let failed = std::mem::replace(&mut w.writer, fresh);
        // into_parts hands back the file without flushing the buffer.
        let _ = failed.into_parts();
        w.writer.get_ref().set_len(entry_offset)?;
        w.offset = entry_offset;
        Ok(())
    }

    fn sync(&self, writer: &mut BufWriter<File>) -> io::Result<()> {
        writer.flush()?;
        if self.sync_mode == SyncMode::EveryWrite {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}

impl BatchJournal for WriteAheadLog {
    fn append(&self, batch: &[TxOp]) -> StoreResult<()> {
        self.append_batch(batch).map(|_| ())
    }
}

impl std::fmt::Debug for WriteAheadLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog")
            .field("path", &self.path)
            .field("sync_mode", &self.sync_mode)
            .finish()
    }
}

fn open_append(path: &Path) -> io::Result<(BufWriter<File>, u64)> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let offset = file.metadata()?.len();
    Ok((BufWriter::new(file), offset))
}

fn encode(batch: &[TxOp]) -> StoreResult<Vec<u8>> {
    let payload = bincode::serialize(batch).map_err(|e| StoreError::Serialization(e.to_string()))?;
    if u32::try_from(payload.len()).is_err() {
        return Err(StoreError::Serialization(format!(
            "batch of {} bytes exceeds the journal entry limit",
            payload.len()
        )));
    }
    Ok(payload)
}

fn write_entry(out: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let length = payload.len() as u32;
    let crc = crc32fast::hash(payload);
    out.write_all(&length.to_le_bytes())?;
    out.write_all(&crc.to_le_bytes())?;
    out.write_all(payload)
}
