//! Knowledge about PostgreSQL on-disk naming conventions for WAL, shared by
//! everything in this repository that has to produce or consume WAL file names.

pub mod xlog_utils;

pub use xlog_utils::{TimeLineID, XLogRecPtr, XLogSegNo};
