// Timestamped backup and restore of chain snapshots

use super::{read_snapshot, write_snapshot, Storage};
use crate::chain::Chain;
use crate::core::unix_now;
use crate::error::{LedgerError, Result};
use std::fs;
use std::io;
use std::path::PathBuf;

pub const BACKUP_DATA_PREFIX: &str = "blockchain_backup_";
pub const BACKUP_META_PREFIX: &str = "blockchain_meta_backup_";
const BACKUP_SUFFIX: &str = ".dat";

/// One backup artifact pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub timestamp: i64,
    pub data_path: PathBuf,
    pub meta_path: PathBuf,
}

impl Storage {
    fn backup_info(&self, timestamp: i64, stamp: &str) -> BackupInfo {
        BackupInfo {
            timestamp,
            data_path: self
                .dir()
                .join(format!("{}{}{}", BACKUP_DATA_PREFIX, stamp, BACKUP_SUFFIX)),
            meta_path: self
                .dir()
                .join(format!("{}{}{}", BACKUP_META_PREFIX, stamp, BACKUP_SUFFIX)),
        }
    }

    /// Back up the chain under the current unix time
    pub fn backup(&self, chain: &Chain) -> Result<BackupInfo> {
        self.backup_at(chain, unix_now())
    }

    /// Back up the chain under an explicit timestamp; an existing pair is overwritten
    pub fn backup_at(&self, chain: &Chain, timestamp: i64) -> Result<BackupInfo> {
        fs::create_dir_all(self.dir()).map_err(|e| LedgerError::io(self.dir(), e))?;

        let info = self.backup_info(timestamp, &timestamp.to_string());
        write_snapshot(chain, &info.meta_path, &info.data_path)?;
        log::info!(
            "Backed up {} blocks to {}",
            chain.block_count(),
            info.data_path.display()
        );
        Ok(info)
    }

    /// All backups in the data directory, oldest first
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let entries = match fs::read_dir(self.dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LedgerError::io(self.dir(), e)),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LedgerError::io(self.dir(), e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };

            let Some(stamp) = name
                .strip_prefix(BACKUP_DATA_PREFIX)
                .and_then(|rest| rest.strip_suffix(BACKUP_SUFFIX))
            else {
                continue;
            };
            // paths keep the stamp as written, e.g. "0900"
            if let Ok(ts) = stamp.parse::<i64>() {
                backups.push(self.backup_info(ts, stamp));
            }
        }
        backups.sort_by_key(|b| b.timestamp);
        Ok(backups)
    }

    /// Most recent backup by timestamp
    pub fn latest_backup(&self) -> Result<Option<BackupInfo>> {
        Ok(self.list_backups()?.pop())
    }

    /// Decode the latest backup into a fresh chain. Needs no live snapshot.
    pub fn load_latest_backup(&self) -> Result<(Chain, BackupInfo)> {
        let info = self.latest_backup()?.ok_or_else(|| {
            LedgerError::io(
                self.dir(),
                io::Error::new(io::ErrorKind::NotFound, "no backup found"),
            )
        })?;

        let (blocks, meta) = read_snapshot(&info.meta_path, &info.data_path)?;
        let restored = Chain::from_parts(blocks, meta.difficulty, None)?;
        Ok((restored, info))
    }

    /// Replace `chain` with the latest backup. The chain is untouched unless
    /// the backup decodes completely.
    pub fn restore(&self, chain: &mut Chain) -> Result<BackupInfo> {
        let (restored, info) = self.load_latest_backup()?;

        if !chain.pending().transactions.is_empty() {
            log::warn!(
                "Restore discards {} pending transactions",
                chain.pending().transactions.len()
            );
        }
        chain.replace_with(restored);
        log::info!(
            "Restored {} blocks from backup {}",
            chain.block_count(),
            info.timestamp
        );
        Ok(info)
    }
}
