// Storage layer: chain snapshots on disk

mod backup;
pub mod codec;

pub use backup::{BackupInfo, BACKUP_DATA_PREFIX, BACKUP_META_PREFIX};
pub use codec::{CodecError, Metadata};

use crate::chain::Chain;
use crate::core::Block;
use crate::error::{LedgerError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Block data artifact
pub const DATA_FILE: &str = "blockchain.dat";
/// Metadata artifact (block count, difficulty)
pub const META_FILE: &str = "blockchain_meta.dat";
/// Pending block artifact, present only while it holds transactions
pub const PENDING_FILE: &str = "blockchain_pending.dat";

/// Storage manager rooted at a data directory
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            dir: path.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn data_path(&self) -> PathBuf {
        self.dir.join(DATA_FILE)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    pub fn pending_path(&self) -> PathBuf {
        self.dir.join(PENDING_FILE)
    }

    /// True when both snapshot artifacts exist
    pub fn exists(&self) -> bool {
        self.data_path().is_file() && self.meta_path().is_file()
    }

    /// Write metadata, then every block in order, then the pending block
    pub fn save(&self, chain: &Chain) -> Result<()> {
        self.ensure_dir()?;
        write_snapshot(chain, &self.meta_path(), &self.data_path())?;

        let pending_path = self.pending_path();
        let pending = chain.pending();
        if pending.transactions.is_empty() {
            match fs::remove_file(&pending_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(LedgerError::io(pending_path, e)),
            }
        } else {
            let mut buf = Vec::new();
            codec::write_block(&mut buf, pending).map_err(|e| codec_error(&pending_path, e))?;
            write_atomic(&pending_path, &buf)?;
        }

        log::info!(
            "Saved {} blocks to {}",
            chain.block_count(),
            self.dir.display()
        );
        Ok(())
    }

    /// Rebuild the chain from the snapshot; hashes are trusted, not re-verified
    pub fn load(&self) -> Result<Chain> {
        let (blocks, meta) = read_snapshot(&self.meta_path(), &self.data_path())?;
        let pending = self.load_pending()?;
        let chain = Chain::from_parts(blocks, meta.difficulty, pending)?;
        log::info!(
            "Loaded {} blocks (difficulty {}) from {}",
            chain.block_count(),
            chain.difficulty(),
            self.dir.display()
        );
        Ok(chain)
    }

    fn load_pending(&self) -> Result<Option<Block>> {
        let path = self.pending_path();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LedgerError::io(path, e)),
        };
        let mut blocks = codec::decode_blocks(&data, 1).map_err(|e| codec_error(&path, e))?;
        Ok(blocks.pop())
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| LedgerError::io(&self.dir, e))
    }
}

pub(crate) fn codec_error(path: &Path, err: CodecError) -> LedgerError {
    match err {
        CodecError::Format(reason) => LedgerError::format(path, reason),
        CodecError::Allocation(reason) => LedgerError::Allocation(reason),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Write `data` to the sibling temp file of `path`
fn write_tmp(path: &Path, data: &[u8]) -> Result<PathBuf> {
    let tmp = tmp_path(path);
    match fs::write(&tmp, data) {
        Ok(()) => Ok(tmp),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(LedgerError::io(&tmp, e))
        }
    }
}

/// Write to a sibling temp file, then rename over the target
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = write_tmp(path, data)?;
    fs::rename(&tmp, path).map_err(|e| LedgerError::io(path, e))
}

/// Encode `chain` to a metadata/data artifact pair.
///
/// Both temp files are written before either artifact is replaced, and the
/// metadata is renamed last. A failed write leaves the previous pair intact.
pub(crate) fn write_snapshot(chain: &Chain, meta_path: &Path, data_path: &Path) -> Result<()> {
    let meta = Metadata {
        block_count: chain.block_count(),
        difficulty: chain.difficulty(),
    };
    let data = codec::encode_blocks(chain.blocks()).map_err(|e| codec_error(data_path, e))?;

    let data_tmp = write_tmp(data_path, &data)?;
    let meta_tmp = match write_tmp(meta_path, &codec::encode_metadata(&meta)) {
        Ok(tmp) => tmp,
        Err(e) => {
            let _ = fs::remove_file(&data_tmp);
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&data_tmp, data_path) {
        let _ = fs::remove_file(&data_tmp);
        let _ = fs::remove_file(&meta_tmp);
        return Err(LedgerError::io(data_path, e));
    }
    fs::rename(&meta_tmp, meta_path).map_err(|e| {
        log::error!(
            "Data artifact {} replaced but metadata rename failed",
            data_path.display()
        );
        LedgerError::io(meta_path, e)
    })
}

/// Decode a metadata/data artifact pair
pub(crate) fn read_snapshot(meta_path: &Path, data_path: &Path) -> Result<(Vec<Block>, Metadata)> {
    let meta_bytes = fs::read(meta_path).map_err(|e| LedgerError::io(meta_path, e))?;
    let meta = codec::decode_metadata(&meta_bytes).map_err(|e| codec_error(meta_path, e))?;

    let data = fs::read(data_path).map_err(|e| LedgerError::io(data_path, e))?;
    let blocks =
        codec::decode_blocks(&data, meta.block_count).map_err(|e| codec_error(data_path, e))?;

    // records come back in order; position must match id for the arena
    for (i, block) in blocks.iter().enumerate() {
        if block.id as usize != i {
            return Err(LedgerError::format(
                data_path,
                format!("record {} carries block id {}", i, block.id),
            ));
        }
    }

    log::debug!("Decoded {} blocks from {}", blocks.len(), data_path.display());
    Ok((blocks, meta))
}
