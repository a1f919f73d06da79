//! Tooling around PostgreSQL WAL archives: parsing timeline history files,
//! working out which segments lead from one WAL position to another across
//! timeline switches, and reading files out of an archive directory.
//!
//! [`timeline_history`] and [`segment_list`] are pure functions of their
//! input. They do no I/O and keep no state, so they can be called from any
//! thread. [`archive`] and [`config`] are the parts that touch the file system
//! and the environment.

pub mod archive;
pub mod config;
pub mod segment_list;
pub mod timeline_history;

pub use segment_list::{
    RangeError, SegmentFileNaming, SegmentListRequest, TimelinePosition, WalSegment,
    XLogFileNaming, build_segment_list, build_segment_range, build_segment_range_with,
};
pub use timeline_history::{ParseError, TimelineHistory, TimelineHistoryEntry, parse_history};
