//!
//! Computes which WAL segments a standby needs to get from an origin position
//! on one timeline to a target position on the same or a descendant timeline.
//!
//! When the server switches to a new timeline it starts a fresh segment on
//! that timeline straight away, and the partial segment of the old timeline is
//! never completed. The list therefore follows the history: segments of each
//! ancestor until its switchpoint, then segments of the next timeline.
//!
use std::iter;

use postgres_ffi::xlog_utils::{WAL_SEGMENT_SIZE_MAX, XLogFileName};
use postgres_ffi::{TimeLineID, XLogSegNo};
use utils::lsn::Lsn;

use crate::timeline_history::{TimelineHistoryEntry, find_containing};

/// A (timeline, LSN) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelinePosition {
    pub tli: TimeLineID,
    pub lsn: Lsn,
}

impl TimelinePosition {
    pub fn new(tli: TimeLineID, lsn: Lsn) -> Self {
        TimelinePosition { tli, lsn }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentListRequest {
    pub origin: TimelinePosition,
    pub target: TimelinePosition,
    pub wal_seg_size: u64,
}

/// One WAL segment file, identified independently of how it is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalSegment {
    pub tli: TimeLineID,
    pub segno: XLogSegNo,
}

impl WalSegment {
    /// The segment of timeline `tli` holding `lsn`.
    pub fn containing(tli: TimeLineID, lsn: Lsn, wal_seg_size: u64) -> Self {
        WalSegment {
            tli,
            segno: lsn.segment_number(wal_seg_size),
        }
    }
}

/// Turns a segment into the file name an archive stores it under.
pub trait SegmentFileNaming {
    fn file_name(&self, segment: WalSegment) -> String;
}

/// PostgreSQL's own `TTTTTTTTXXXXXXXXYYYYYYYY` naming.
///
/// Only meaningful for segment sizes up to [`WAL_SEGMENT_SIZE_MAX`], which
/// [`build_segment_range`] checks before naming anything.
#[derive(Debug, Clone, Copy)]
pub struct XLogFileNaming {
    pub wal_seg_size: u64,
}

impl SegmentFileNaming for XLogFileNaming {
    fn file_name(&self, segment: WalSegment) -> String {
        XLogFileName(segment.tli, segment.segno, self.wal_seg_size)
    }
}

impl<F> SegmentFileNaming for F
where
    F: Fn(WalSegment) -> String,
{
    fn file_name(&self, segment: WalSegment) -> String {
        self(segment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("WAL segment size {segment_size} is not a power of two")]
    InvalidSegmentSize { segment_size: u64 },
    #[error(
        "WAL segment size {segment_size} exceeds the {WAL_SEGMENT_SIZE_MAX} byte maximum of WAL file names"
    )]
    SegmentSizeTooLarge { segment_size: u64 },
    #[error("origin LSN {origin_lsn} newer than target LSN {target_lsn}")]
    OriginNewerThanTarget { origin_lsn: Lsn, target_lsn: Lsn },
    #[error("origin timeline {origin_timeline} newer than target timeline {target_timeline}")]
    OriginTimelineNewerThanTarget {
        origin_timeline: TimeLineID,
        target_timeline: TimeLineID,
    },
    #[error("timeline history found empty after parsing")]
    EmptyHistory,
    #[error(
        "timeline of last history entry {last_history_timeline} newer than or equal to target timeline {target_timeline}"
    )]
    HistoryNotOlderThanTarget {
        last_history_timeline: TimeLineID,
        target_timeline: TimeLineID,
    },
    #[error("LSN {last_history_end} of last history entry newer than target LSN {target_lsn}")]
    HistoryNewerThanTarget {
        last_history_end: Lsn,
        target_lsn: Lsn,
    },
    #[error("origin timeline {origin_timeline} at {origin_lsn} not a direct parent of target")]
    OriginNotDirectParent {
        origin_timeline: TimeLineID,
        origin_lsn: Lsn,
    },
    #[error(
        "origin timeline {origin_timeline} and target timeline {target_timeline} not matching without history file"
    )]
    TimelinesDifferWithoutHistory {
        origin_timeline: TimeLineID,
        target_timeline: TimeLineID,
    },
}

/// List the segments needed to replay WAL from `request.origin` up to and
/// including `request.target`.
///
/// `history` is the parsed history of the target timeline. It is required
/// when origin and target timelines differ, and the origin must then lie on
/// one of its entries. The result is in replay order and has no duplicates;
/// its last element is always the segment holding the target LSN.
pub fn build_segment_list(
    request: &SegmentListRequest,
    history: Option<&[TimelineHistoryEntry]>,
) -> Result<Vec<WalSegment>, RangeError> {
    let target_begin = validate(request, history)?;
    if !request.wal_seg_size.is_power_of_two() {
        return Err(RangeError::InvalidSegmentSize {
            segment_size: request.wal_seg_size,
        });
    }

    let SegmentListRequest {
        origin,
        target,
        wal_seg_size,
    } = *request;

    // The target timeline, from where its parent was left off up to the target.
    let target_span = TimelineHistoryEntry {
        tli: target.tli,
        begin: target_begin,
        end: target.lsn,
    };
    let chain = history
        .unwrap_or_default()
        .iter()
        .copied()
        .chain(iter::once(target_span));

    let mut segments = Vec::new();

    // The segment holding the origin is already there, start with the next one.
    let mut cursor = origin.lsn.checked_next_segment_lsn(wal_seg_size);
    for span in chain {
        while let Some(lsn) = cursor.filter(|c| span.begin <= *c && *c < span.end) {
            segments.push(WalSegment::containing(span.tli, lsn, wal_seg_size));
            cursor = lsn.checked_next_segment_lsn(wal_seg_size);
        }
    }

    let last = WalSegment::containing(target.tli, target.lsn, wal_seg_size);
    if segments.last() != Some(&last) {
        segments.push(last);
    }

    Ok(segments)
}

/// Checks the request against the history and returns where the target
/// timeline's own span begins.
fn validate(
    request: &SegmentListRequest,
    history: Option<&[TimelineHistoryEntry]>,
) -> Result<Lsn, RangeError> {
    let SegmentListRequest { origin, target, .. } = *request;

    if origin.lsn > target.lsn {
        return Err(RangeError::OriginNewerThanTarget {
            origin_lsn: origin.lsn,
            target_lsn: target.lsn,
        });
    }
    if origin.tli > target.tli {
        return Err(RangeError::OriginTimelineNewerThanTarget {
            origin_timeline: origin.tli,
            target_timeline: target.tli,
        });
    }

    let Some(history) = history else {
        if origin.tli != target.tli {
            return Err(RangeError::TimelinesDifferWithoutHistory {
                origin_timeline: origin.tli,
                target_timeline: target.tli,
            });
        }
        return Ok(origin.lsn);
    };

    let last = history.last().ok_or(RangeError::EmptyHistory)?;
    if last.tli >= target.tli {
        return Err(RangeError::HistoryNotOlderThanTarget {
            last_history_timeline: last.tli,
            target_timeline: target.tli,
        });
    }
    if last.end > target.lsn {
        return Err(RangeError::HistoryNewerThanTarget {
            last_history_end: last.end,
            target_lsn: target.lsn,
        });
    }
    if find_containing(history, origin.tli, origin.lsn).is_none() {
        return Err(RangeError::OriginNotDirectParent {
            origin_timeline: origin.tli,
            origin_lsn: origin.lsn,
        });
    }

    Ok(last.end)
}

/// [`build_segment_list`] with plain arguments, naming segments the
/// PostgreSQL way.
///
/// On top of the checks of [`build_segment_list`], the segment size must not
/// exceed [`WAL_SEGMENT_SIZE_MAX`].
pub fn build_segment_range(
    origin_timeline: TimeLineID,
    origin_lsn: Lsn,
    target_timeline: TimeLineID,
    target_lsn: Lsn,
    history: Option<&[TimelineHistoryEntry]>,
    segment_size: u64,
) -> Result<Vec<String>, RangeError> {
    let request = SegmentListRequest {
        origin: TimelinePosition::new(origin_timeline, origin_lsn),
        target: TimelinePosition::new(target_timeline, target_lsn),
        wal_seg_size: segment_size,
    };
    let segments = build_segment_list(&request, history)?;
    if segment_size > WAL_SEGMENT_SIZE_MAX {
        return Err(RangeError::SegmentSizeTooLarge { segment_size });
    }
    let naming = XLogFileNaming {
        wal_seg_size: segment_size,
    };
    Ok(name_segments(segments, &naming))
}

/// Like [`build_segment_range`], with a custom segment naming and no upper
/// bound on the segment size.
pub fn build_segment_range_with(
    origin_timeline: TimeLineID,
    origin_lsn: Lsn,
    target_timeline: TimeLineID,
    target_lsn: Lsn,
    history: Option<&[TimelineHistoryEntry]>,
    segment_size: u64,
    naming: &impl SegmentFileNaming,
) -> Result<Vec<String>, RangeError> {
    let request = SegmentListRequest {
        origin: TimelinePosition::new(origin_timeline, origin_lsn),
        target: TimelinePosition::new(target_timeline, target_lsn),
        wal_seg_size: segment_size,
    };
    let segments = build_segment_list(&request, history)?;
    Ok(name_segments(segments, naming))
}

fn name_segments(segments: Vec<WalSegment>, naming: &impl SegmentFileNaming) -> Vec<String> {
    segments.into_iter().map(|s| naming.file_name(s)).collect()
}
