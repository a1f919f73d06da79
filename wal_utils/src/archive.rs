//!
//! Read-only access to a WAL archive directory.
//!
//! Names are always resolved relative to the archive root: absolute paths and
//! `..` components are refused, so a caller can only reach files inside it.
//!
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use postgres_ffi::TimeLineID;
use postgres_ffi::xlog_utils::TLHistoryFileName;
use tracing::debug;

use crate::timeline_history::{ParseError, TimelineHistory, parse_history};

/// Largest chunk [`WalArchive::read`] hands out in one call.
pub const MAX_READ_SIZE: u64 = (1 << 30) - 1;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("absolute path not allowed: \"{0}\"")]
    AbsolutePath(Utf8PathBuf),
    #[error("reference to parent directory (\"..\") not allowed: \"{0}\"")]
    ParentReference(Utf8PathBuf),
    #[error("requested length {requested} too large, at most {MAX_READ_SIZE} bytes per read")]
    ReadTooLarge { requested: u64 },
    #[error("could not access file \"{path}\"")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not parse history file \"{path}\"")]
    History {
        path: Utf8PathBuf,
        #[source]
        source: ParseError,
    },
}

#[derive(Debug, Clone)]
pub struct WalArchive {
    root: Utf8PathBuf,
}

impl WalArchive {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        WalArchive { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Full path of `name` inside the archive.
    pub fn resolve(&self, name: &str) -> Result<Utf8PathBuf, ArchiveError> {
        let name = Utf8Path::new(name);
        if name.is_absolute() || name.has_root() {
            return Err(ArchiveError::AbsolutePath(name.to_owned()));
        }
        if name
            .components()
            .any(|c| matches!(c, Utf8Component::ParentDir))
        {
            return Err(ArchiveError::ParentReference(name.to_owned()));
        }
        Ok(self.root.join(name))
    }

    pub fn file_size(&self, name: &str) -> Result<u64, ArchiveError> {
        let path = self.resolve(name)?;
        let metadata = path.metadata().map_err(|source| ArchiveError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(metadata.len())
    }

    /// Read part of an archived file.
    ///
    /// A negative `offset` counts back from the end of the file. Without a
    /// `length`, reading goes on until the end of the file. Fewer bytes than
    /// asked for come back if the file ends first.
    pub fn read(
        &self,
        name: &str,
        offset: i64,
        length: Option<u64>,
    ) -> Result<Vec<u8>, ArchiveError> {
        if let Some(requested) = length.filter(|len| *len > MAX_READ_SIZE) {
            return Err(ArchiveError::ReadTooLarge { requested });
        }

        let path = self.resolve(name)?;
        let io_err = |source| ArchiveError::Io {
            path: path.clone(),
            source,
        };

        let mut file = File::open(&path).map_err(io_err)?;
        let length = match length {
            Some(len) => len,
            None if offset < 0 => offset.unsigned_abs(),
            None => {
                let size = file.metadata().map_err(io_err)?.len();
                size.saturating_sub(offset as u64)
            }
        };
        if length > MAX_READ_SIZE {
            return Err(ArchiveError::ReadTooLarge { requested: length });
        }

        let seek_to = if offset >= 0 {
            SeekFrom::Start(offset as u64)
        } else {
            SeekFrom::End(offset)
        };
        file.seek(seek_to).map_err(io_err)?;

        debug!(%path, offset, length, "reading from archive");
        let mut buf = Vec::with_capacity(length as usize);
        file.take(length).read_to_end(&mut buf).map_err(io_err)?;
        Ok(buf)
    }

    /// Read and parse the history file of timeline `tli`.
    pub fn read_history(&self, tli: TimeLineID) -> Result<TimelineHistory, ArchiveError> {
        let name = TLHistoryFileName(tli);
        let path = self.resolve(&name)?;
        let text = std::fs::read_to_string(&path).map_err(|source| ArchiveError::Io {
            path: path.clone(),
            source,
        })?;
        let history =
            parse_history(&text).map_err(|source| ArchiveError::History { path, source })?;
        debug!(tli, entries = history.len(), "loaded timeline history");
        Ok(history)
    }
}
