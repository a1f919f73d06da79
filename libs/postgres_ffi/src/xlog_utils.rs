//
// This file contains common utilities for dealing with PostgreSQL WAL file
// names, timeline history file names and the segment arithmetic behind them.
//
// Many of these functions mirror PostgreSQL macros from xlog_internal.h.
// That's why they don't follow the usual Rust naming conventions, they
// have been named the same as the corresponding PostgreSQL macros instead.
//

pub const XLOG_FNAME_LEN: usize = 24;
pub const XLOG_HISTORY_SUFFIX: &str = ".history";
pub const XLOG_PARTIAL_SUFFIX: &str = ".partial";

/// Segment size PostgreSQL uses unless initdb was told otherwise.
pub const DEFAULT_WAL_SEG_SIZE: u64 = 16 * 1024 * 1024;
/// Largest segment size PostgreSQL accepts, see IsValidWalSegSize().
pub const WAL_SEGMENT_SIZE_MAX: u64 = 1024 * 1024 * 1024;

pub type XLogRecPtr = u64;
pub type TimeLineID = u32;
pub type XLogSegNo = u64;

/// Timeline IDs start at 1, zero never names a timeline.
pub const INVALID_TIMELINE_ID: TimeLineID = 0;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum WalFileNameError {
    #[error("invalid WAL segment file name {0:?}")]
    InvalidSegmentFileName(String),
    #[error("segment part of {fname:?} out of range for segment size {wal_seg_size}")]
    SegmentOutOfRange { fname: String, wal_seg_size: u64 },
}

/// Segment sizes are powers of two, at most [`WAL_SEGMENT_SIZE_MAX`].
///
/// PostgreSQL itself also enforces a 1 MiB lower bound, but nothing in the
/// arithmetic here depends on it, so smaller sizes are accepted for tests and
/// tooling that work with toy archives.
pub fn is_valid_wal_seg_size(wal_seg_size: u64) -> bool {
    wal_seg_size.is_power_of_two() && wal_seg_size <= WAL_SEGMENT_SIZE_MAX
}

#[allow(non_snake_case)]
pub fn XLogSegmentsPerXLogId(wal_segsz_bytes: u64) -> XLogSegNo {
    0x1_0000_0000u64 / wal_segsz_bytes
}

#[allow(non_snake_case)]
pub fn XLogSegNoOffsetToRecPtr(segno: XLogSegNo, offset: u32, wal_segsz_bytes: u64) -> XLogRecPtr {
    segno * wal_segsz_bytes + (offset as u64)
}

#[allow(non_snake_case)]
pub fn XLogFileName(tli: TimeLineID, logSegNo: XLogSegNo, wal_segsz_bytes: u64) -> String {
    format!(
        "{:>08X}{:>08X}{:>08X}",
        tli,
        logSegNo / XLogSegmentsPerXLogId(wal_segsz_bytes),
        logSegNo % XLogSegmentsPerXLogId(wal_segsz_bytes)
    )
}

/// Inverse of [`XLogFileName`], returns (segno, timeline).
#[allow(non_snake_case)]
pub fn XLogFromFileName(
    fname: &str,
    wal_seg_size: u64,
) -> Result<(XLogSegNo, TimeLineID), WalFileNameError> {
    if !IsXLogFileName(fname) {
        return Err(WalFileNameError::InvalidSegmentFileName(fname.to_owned()));
    }
    let field = |range: std::ops::Range<usize>| {
        u32::from_str_radix(&fname[range], 16)
            .map_err(|_| WalFileNameError::InvalidSegmentFileName(fname.to_owned()))
    };
    let tli = field(0..8)?;
    let log = field(8..16)? as XLogSegNo;
    let seg = field(16..24)? as XLogSegNo;

    let per_id = XLogSegmentsPerXLogId(wal_seg_size);
    if seg >= per_id {
        return Err(WalFileNameError::SegmentOutOfRange {
            fname: fname.to_owned(),
            wal_seg_size,
        });
    }
    Ok((log * per_id + seg, tli))
}

#[allow(non_snake_case)]
pub fn IsXLogFileName(fname: &str) -> bool {
    fname.len() == XLOG_FNAME_LEN && fname.chars().all(|c| c.is_ascii_hexdigit())
}

#[allow(non_snake_case)]
pub fn IsPartialXLogFileName(fname: &str) -> bool {
    fname
        .strip_suffix(XLOG_PARTIAL_SUFFIX)
        .is_some_and(IsXLogFileName)
}

#[allow(non_snake_case)]
pub fn TLHistoryFileName(tli: TimeLineID) -> String {
    format!("{tli:>08X}{XLOG_HISTORY_SUFFIX}")
}
