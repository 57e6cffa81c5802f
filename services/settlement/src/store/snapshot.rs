//! Store snapshots
//!
//! The whole store state as one JSON document with a SHA-256 integrity
//! hash. Tables are `BTreeMap`s so the serialized form, and with it the
//! hash, is the same for the same state. Writes go to a temp file that is
//! fsynced and renamed over the previous snapshot.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use types::asset::Asset;
use types::ids::{AssetId, InvestmentId, LedgerAccountId, OrderId, TradeId, UserId};
use types::investment::Investment;
use types::order::Order;
use types::trade::Trade;
use types::treasury::TreasuryAccount;

use super::journal::JournalRecord;
use super::memory::StoreSeed;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailure { expected: String, actual: String },

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),
}

/// Every table of the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreState {
    pub orders: BTreeMap<OrderId, Order>,
    pub next_sequence: u64,
    pub trades: BTreeMap<TradeId, Trade>,
    pub investments: BTreeMap<InvestmentId, Investment>,
    pub treasuries: BTreeMap<AssetId, TreasuryAccount>,
    pub assets: BTreeMap<AssetId, Asset>,
    pub accounts: BTreeMap<UserId, LedgerAccountId>,
}

impl StoreState {
    /// Upsert one journaled record
    pub fn apply(&mut self, record: JournalRecord) {
        match record {
            JournalRecord::Order(order) => {
                self.next_sequence = self.next_sequence.max(order.sequence);
                self.orders.insert(order.id, order);
            }
            JournalRecord::Trade(trade) => {
                self.trades.insert(trade.id, trade);
            }
            JournalRecord::Investment(investment) => {
                self.investments.insert(investment.id, investment);
            }
            JournalRecord::Treasury(treasury) => {
                self.treasuries.insert(treasury.asset_id.clone(), treasury);
            }
            JournalRecord::Asset(asset) => {
                self.assets.insert(asset.asset_id.clone(), asset);
            }
            JournalRecord::Account(binding) => {
                self.accounts.insert(binding.user_id, binding.ledger_account_id);
            }
        }
    }

    /// SHA-256 over the canonical JSON form, hex encoded
    pub fn compute_hash(&self) -> Result<String, SnapshotError> {
        let bytes = serde_json::to_vec(self)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }
}

impl From<StoreSeed> for StoreState {
    fn from(seed: StoreSeed) -> Self {
        let mut state = StoreState::default();
        for asset in seed.assets {
            state.apply(JournalRecord::Asset(asset));
        }
        for treasury in seed.treasuries {
            state.apply(JournalRecord::Treasury(treasury));
        }
        for binding in seed.accounts {
            state.apply(JournalRecord::Account(binding));
        }
        state
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    /// Last journal sequence folded into `state`
    pub sequence: u64,
    pub state: StoreState,
    pub checksum: String,
}

impl Snapshot {
    pub fn new(sequence: u64, state: StoreState) -> Result<Self, SnapshotError> {
        let checksum = state.compute_hash()?;
        Ok(Self {
            version: SNAPSHOT_VERSION,
            sequence,
            state,
            checksum,
        })
    }

    pub fn verify_integrity(&self) -> Result<(), SnapshotError> {
        let actual = self.state.compute_hash()?;
        if actual != self.checksum {
            return Err(SnapshotError::IntegrityFailure {
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    fn path(dir: &Path) -> PathBuf {
        dir.join("snapshot.json")
    }

    /// Atomic write: temp file, fsync, rename
    pub fn write(&self, dir: &Path) -> Result<(), SnapshotError> {
        fs::create_dir_all(dir)?;
        let path = Self::path(dir);
        let tmp_path = dir.join("snapshot.json.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&serde_json::to_vec(self)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// The snapshot in `dir`, if one has been written
    pub fn load(dir: &Path) -> Result<Option<Self>, SnapshotError> {
        let path = Self::path(dir);
        if !path.exists() {
            return Ok(None);
        }
        let snapshot: Snapshot = serde_json::from_slice(&fs::read(&path)?)?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        snapshot.verify_integrity()?;
        Ok(Some(snapshot))
    }
}
