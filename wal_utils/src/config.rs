//! Configuration of the `wal_utils` tool.
//!
//! Values come from, in increasing order of precedence: built-in defaults, a
//! TOML file, the `PGARCHIVE` environment variable and command-line flags.
use anyhow::{Context, bail};
use camino::{Utf8Path, Utf8PathBuf};
use postgres_ffi::xlog_utils::{DEFAULT_WAL_SEG_SIZE, is_valid_wal_seg_size};
use serde_with::serde_as;
use utils::logging::LogFormat;

use crate::archive::WalArchive;

/// Environment variable naming the archive directory.
pub const ARCHIVE_DIR_ENV: &str = "PGARCHIVE";

pub mod defaults {
    use super::*;

    pub const DEFAULT_LOG_FORMAT: LogFormat = LogFormat::Plain;
    pub const DEFAULT_WAL_SEG_SIZE_BYTES: u64 = DEFAULT_WAL_SEG_SIZE;
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalUtilsConf {
    /// WAL segment size of the cluster whose WAL is handled, in bytes.
    pub wal_seg_size: u64,
    pub archive_dir: Option<Utf8PathBuf>,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub log_format: LogFormat,
}

impl Default for WalUtilsConf {
    fn default() -> Self {
        WalUtilsConf {
            wal_seg_size: defaults::DEFAULT_WAL_SEG_SIZE_BYTES,
            archive_dir: None,
            log_format: defaults::DEFAULT_LOG_FORMAT,
        }
    }
}

impl WalUtilsConf {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        toml_edit::de::from_str(input).context("parse wal_utils config")
    }

    /// Defaults, overlaid with the file at `path` if one is given.
    pub fn load(path: Option<&Utf8Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("read config file \"{path}\""))?;
        Self::from_toml_str(&input).with_context(|| format!("load config file \"{path}\""))
    }

    /// Take the archive directory from the environment value, if set and non-empty.
    pub fn with_archive_dir_env(mut self, value: Option<String>) -> Self {
        if let Some(dir) = value.filter(|v| !v.is_empty()) {
            self.archive_dir = Some(Utf8PathBuf::from(dir));
        }
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !is_valid_wal_seg_size(self.wal_seg_size) {
            bail!(
                "invalid wal_seg_size {}: must be a power of two of at most 1 GiB",
                self.wal_seg_size
            );
        }
        Ok(())
    }

    pub fn archive(&self) -> anyhow::Result<WalArchive> {
        match &self.archive_dir {
            Some(dir) => Ok(WalArchive::new(dir.clone())),
            None => bail!(
                "archive path is not defined, set archive_dir in the config file, pass --archive-dir or set {ARCHIVE_DIR_ENV}"
            ),
        }
    }
}
