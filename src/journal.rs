//! Append-only commit journal.
//!
//! Every committed transaction becomes exactly one frame:
//! `len (u32 LE) | MessagePack payload | crc32 (u32 LE)`.
//! On open, frames are replayed in order. A short or damaged frame at the end
//! of the file is a torn tail and is cut off; a damaged frame with data after
//! it is corruption and fails the open.

use crate::error::{Result, StoreError};
use crate::types::{Status, StatusId, TimelineEntry, TimelineKey, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Magic bytes for journal file.
const JOURNAL_MAGIC: &[u8; 4] = b"TLJ\0";

/// Current journal format version.
const JOURNAL_VERSION: u8 = 1;

/// Magic + version.
const HEADER_SIZE: u64 = 5;

/// Sanity bound for a single frame.
const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// A single mutation recorded in the journal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum JournalOp {
    /// Insert or replace a status entity.
    UpsertStatus(Status),
    /// Insert or replace a timeline entry.
    UpsertEntry(TimelineEntry),
    /// Delete a timeline entry.
    RemoveEntry { key: TimelineKey, status_id: StatusId },
}

/// One committed transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalFrame {
    pub seq: u64,
    pub timestamp: Timestamp,
    pub ops: Vec<JournalOp>,
}

/// Borrowed form of [`JournalFrame`], encoded identically.
#[derive(Serialize)]
struct FrameRef<'a> {
    seq: u64,
    timestamp: Timestamp,
    ops: &'a [JournalOp],
}

struct JournalWriter {
    file: File,
    /// Length of the valid prefix of the file.
    size: u64,
    next_seq: u64,
}

/// Journal backing a [`TimelineStore`](crate::store::TimelineStore).
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    read_only: bool,
    sync_on_commit: bool,
}

impl Journal {
    /// Open (or create) a journal and return the frames it holds.
    pub fn open(
        path: impl AsRef<Path>,
        read_only: bool,
        sync_on_commit: bool,
    ) -> Result<(Self, Vec<JournalFrame>)> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            if read_only {
                return Err(StoreError::NotInitialized);
            }
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            file.write_all(JOURNAL_MAGIC)?;
            file.write_all(&[JOURNAL_VERSION])?;
            file.sync_all()?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(&path)?;
        let total_len = file.metadata()?.len();

        let (frames, valid_len) = Self::read_frames(&file, total_len)?;

        if valid_len < total_len {
            warn!(
                path = %path.display(),
                valid_len,
                total_len,
                "discarding torn journal tail"
            );
            if !read_only {
                file.set_len(valid_len)?;
                file.sync_all()?;
            }
        }

        let next_seq = frames.last().map(|f| f.seq + 1).unwrap_or(1);

        Ok((
            Self {
                path,
                writer: Mutex::new(JournalWriter {
                    file,
                    size: valid_len,
                    next_seq,
                }),
                read_only,
                sync_on_commit,
            },
            frames,
        ))
    }

    /// Append one frame holding `ops`. Returns the frame's sequence number.
    ///
    /// On failure the file is cut back to its previous length, so a failed
    /// append never leaves bytes that later frames would follow.
    pub fn append(&self, ops: &[JournalOp]) -> Result<u64> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }

        let mut writer = self.writer.lock();
        let seq = writer.next_seq;
        let encoded = Self::encode_frame(seq, ops)?;

        let start = writer.size;
        if let Err(e) = Self::write_at(&mut writer.file, start, &encoded, self.sync_on_commit) {
            warn!(seq, error = %e, "journal append failed, truncating");
            if let Err(truncate_err) = writer.file.set_len(start) {
                warn!(
                    seq,
                    len = start,
                    error = %truncate_err,
                    "could not truncate journal after failed append"
                );
            }
            return Err(e);
        }

        writer.size = start + encoded.len() as u64;
        writer.next_seq += 1;
        debug!(seq, bytes = encoded.len(), ops = ops.len(), "journal frame appended");

        Ok(seq)
    }

    /// Replace the whole journal with a single frame holding `ops`.
    ///
    /// The new file is written beside the old one and renamed over it.
    pub fn rewrite(&self, ops: &[JournalOp]) -> Result<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }

        let mut writer = self.writer.lock();
        let tmp_path = self.path.with_extension("journal.tmp");

        let encoded = Self::encode_frame(1, ops)?;
        {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            tmp.write_all(JOURNAL_MAGIC)?;
            tmp.write_all(&[JOURNAL_VERSION])?;
            tmp.write_all(&encoded)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        writer.size = file.metadata()?.len();
        writer.file = file;
        writer.next_seq = 2;

        Ok(())
    }

    /// Length of the valid journal in bytes.
    pub fn size(&self) -> u64 {
        self.writer.lock().size
    }

    /// Swap the underlying file handle.
    #[cfg(test)]
    pub(crate) fn replace_file(&self, file: File) {
        self.writer.lock().file = file;
    }

    fn write_at(file: &mut File, offset: u64, bytes: &[u8], sync: bool) -> Result<()> {
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        if sync {
            file.sync_data()?;
        } else {
            file.flush()?;
        }
        Ok(())
    }

    fn encode_frame(seq: u64, ops: &[JournalOp]) -> Result<Vec<u8>> {
        let payload = rmp_serde::to_vec(&FrameRef {
            seq,
            timestamp: Timestamp::now(),
            ops,
        })?;

        if payload.len() > MAX_FRAME_SIZE {
            return Err(StoreError::InvalidOperation(format!(
                "Journal frame too large: {} bytes",
                payload.len()
            )));
        }

        let mut encoded = Vec::with_capacity(payload.len() + 8);
        encoded.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        encoded.extend_from_slice(&payload);
        encoded.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        Ok(encoded)
    }

    /// Read all intact frames. Returns them with the length of the valid prefix.
    fn read_frames(file: &File, total_len: u64) -> Result<(Vec<JournalFrame>, u64)> {
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != JOURNAL_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid journal magic".into()));
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != JOURNAL_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported journal version: {}",
                version[0]
            )));
        }

        let mut frames = Vec::new();
        let mut offset = HEADER_SIZE;

        while offset < total_len {
            match Self::read_frame(&mut reader) {
                Ok((frame, len)) => {
                    frames.push(frame);
                    offset += len;
                }
                Err(StoreError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    warn!(offset, "journal ends in a short frame");
                    break;
                }
                Err(e) => {
                    let frame_end = Self::frame_end(&mut reader, offset)?;
                    if frame_end < total_len {
                        return Err(StoreError::Corruption(format!(
                            "Damaged journal frame at offset {} followed by {} bytes: {}",
                            offset,
                            total_len - frame_end,
                            e
                        )));
                    }
                    warn!(offset, error = %e, "journal ends in a damaged frame");
                    break;
                }
            }
        }

        Ok((frames, offset))
    }

    /// Offset just past the frame starting at `offset`, per its length prefix.
    fn frame_end(reader: &mut (impl Read + Seek), offset: u64) -> Result<u64> {
        reader.seek(SeekFrom::Start(offset))?;
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        Ok(offset + u32::from_le_bytes(len_bytes) as u64 + 8)
    }

    fn read_frame(reader: &mut impl Read) -> Result<(JournalFrame, u64)> {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(StoreError::Corruption("Journal frame too large".into()));
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload)?;

        let mut checksum_bytes = [0u8; 4];
        reader.read_exact(&mut checksum_bytes)?;
        let expected = u32::from_le_bytes(checksum_bytes);

        let got = crc32fast::hash(&payload);
        if expected != got {
            return Err(StoreError::ChecksumMismatch { expected, got });
        }

        let frame: JournalFrame = rmp_serde::from_slice(&payload)?;
        Ok((frame, len as u64 + 8))
    }
}
