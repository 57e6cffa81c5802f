//! Append-only store journal
//!
//! One JSON line per entry:
//!
//! ```text
//! {"sequence":12,"event_type":"trade","payload":"{...}","checksum":3735928559}
//! ```
//!
//! `payload` is the serialized [`JournalRecord`]; `checksum` is CRC32C over
//! the little-endian sequence followed by the payload bytes. Every append is
//! fsynced before the store call returns. A torn final line from a crash is
//! dropped on open; damage anywhere else stops recovery.

use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use types::asset::Asset;
use types::investment::Investment;
use types::order::Order;
use types::trade::Trade;
use types::treasury::TreasuryAccount;

use super::memory::AccountBinding;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sequence error: expected {expected}, got {got}")]
    SequenceError { expected: u64, got: u64 },

    #[error("Corrupt entry at line {line}")]
    Corrupt { line: usize },
}

/// The new state of one stored row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalRecord {
    Order(Order),
    Trade(Trade),
    Investment(Investment),
    Treasury(TreasuryAccount),
    Asset(Asset),
    Account(AccountBinding),
}

impl JournalRecord {
    pub fn event_type(&self) -> &'static str {
        match self {
            JournalRecord::Order(_) => "order",
            JournalRecord::Trade(_) => "trade",
            JournalRecord::Investment(_) => "investment",
            JournalRecord::Treasury(_) => "treasury",
            JournalRecord::Asset(_) => "asset",
            JournalRecord::Account(_) => "account",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub sequence: u64,
    pub event_type: String,
    pub payload: String,
    pub checksum: u32,
}

impl JournalEntry {
    pub fn new(sequence: u64, record: &JournalRecord) -> Result<Self, JournalError> {
        let payload = serde_json::to_string(record)?;
        Ok(Self {
            sequence,
            event_type: record.event_type().to_string(),
            checksum: Self::compute_checksum(sequence, &payload),
            payload,
        })
    }

    pub fn compute_checksum(sequence: u64, payload: &str) -> u32 {
        let mut buf = Vec::with_capacity(8 + payload.len());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(payload.as_bytes());
        crc32c(&buf)
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum == Self::compute_checksum(self.sequence, &self.payload)
    }

    pub fn record(&self) -> Result<JournalRecord, JournalError> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Intact entries of the journal at `path` and the byte length they span
pub fn read_entries(path: &Path) -> Result<(Vec<JournalEntry>, u64), JournalError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(err) => return Err(err.into()),
    };

    let mut entries: Vec<JournalEntry> = Vec::new();
    let mut valid_len = 0usize;
    let lines: Vec<&[u8]> = data.split_inclusive(|b| *b == b'\n').collect();
    for (index, line) in lines.iter().enumerate() {
        let is_last = index + 1 == lines.len();
        let entry = line
            .strip_suffix(b"\n")
            .and_then(|body| serde_json::from_slice::<JournalEntry>(body).ok())
            .filter(JournalEntry::verify_checksum);
        let Some(entry) = entry else {
            if is_last {
                warn!(path = %path.display(), line = index + 1, "Dropping torn journal tail");
                break;
            }
            return Err(JournalError::Corrupt { line: index + 1 });
        };
        if let Some(previous) = entries.last() {
            if entry.sequence != previous.sequence + 1 {
                return Err(JournalError::SequenceError {
                    expected: previous.sequence + 1,
                    got: entry.sequence,
                });
            }
        }
        valid_len += line.len();
        entries.push(entry);
    }
    Ok((entries, valid_len as u64))
}

pub struct JournalWriter {
    path: PathBuf,
    file: File,
    next_sequence: u64,
    entries: u64,
}

impl JournalWriter {
    /// Open for append, cutting the file back to `valid_len` intact bytes
    pub fn open(path: impl Into<PathBuf>, valid_len: u64, next_sequence: u64) -> Result<Self, JournalError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.set_len(valid_len)?;
        Ok(Self {
            path,
            file,
            next_sequence,
            entries: 0,
        })
    }

    /// Durably append one record and return its sequence
    pub fn append(&mut self, record: &JournalRecord) -> Result<u64, JournalError> {
        let entry = JournalEntry::new(self.next_sequence, record)?;
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()?;
        self.next_sequence += 1;
        self.entries += 1;
        Ok(entry.sequence)
    }

    pub fn last_sequence(&self) -> u64 {
        self.next_sequence.saturating_sub(1)
    }

    /// Entries appended since open or the last reset
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Empty the file once a snapshot covers everything in it
    pub fn reset(&mut self) -> Result<(), JournalError> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.entries = 0;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use types::ids::{LedgerAccountId, UserId};

    fn account(n: u32) -> JournalRecord {
        JournalRecord::Account(AccountBinding {
            user_id: UserId::new(),
            ledger_account_id: LedgerAccountId::new(format!("0.0.{n}")),
        })
    }

    fn write_journal(path: &Path, count: u32) {
        let mut writer = JournalWriter::open(path, 0, 1).unwrap();
        for n in 0..count {
            writer.append(&account(n)).unwrap();
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("journal.jsonl");
        let mut writer = JournalWriter::open(&path, 0, 1).unwrap();
        let record = account(1);
        assert_eq!(writer.append(&record).unwrap(), 1);
        assert_eq!(writer.append(&account(2)).unwrap(), 2);

        let (entries, valid_len) = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].record().unwrap(), record);
        assert_eq!(entries[1].event_type, "account");
        assert_eq!(valid_len, fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_missing_journal_is_empty() {
        let tmp = TempDir::new().unwrap();
        let (entries, valid_len) = read_entries(&tmp.path().join("journal.jsonl")).unwrap();
        assert!(entries.is_empty());
        assert_eq!(valid_len, 0);
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("journal.jsonl");
        write_journal(&path, 5);

        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 10]).unwrap();

        let (entries, valid_len) = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 4);
        assert!(valid_len < data.len() as u64);

        let mut writer = JournalWriter::open(&path, valid_len, 5).unwrap();
        writer.append(&account(9)).unwrap();
        let (entries, _) = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[4].sequence, 5);
    }

    #[test]
    fn test_corruption_before_tail_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("journal.jsonl");
        write_journal(&path, 3);

        let text = fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        lines[0] = lines[0].replace("0.0.0", "0.0.7");
        fs::write(&path, lines.join("\n") + "\n").unwrap();

        let err = read_entries(&path).unwrap_err();
        assert!(matches!(err, JournalError::Corrupt { line: 1 }));
    }
}
