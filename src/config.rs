// Configuration management for the ledger

use crate::access::Role;
use crate::consensus::Difficulty;
use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    /// Defaults to `<data_dir>/ledger.key`
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default = "default_role")]
    pub role: Role,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            difficulty: default_difficulty(),
            key_file: None,
            role: default_role(),
        }
    }
}

impl LedgerConfig {
    /// Parse a TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| LedgerError::io(path, e))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: LedgerConfig =
            toml::from_str(text).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate critical values
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(LedgerError::Config("data_dir must not be empty".to_string()));
        }
        self.difficulty()?;
        Ok(())
    }

    pub fn difficulty(&self) -> Result<Difficulty> {
        Difficulty::new(self.difficulty).map_err(LedgerError::Config)
    }

    pub fn key_path(&self) -> PathBuf {
        self.key_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("ledger.key"))
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_difficulty() -> u32 {
    Difficulty::DEFAULT.zeros()
}

fn default_role() -> Role {
    Role::Doctor
}
