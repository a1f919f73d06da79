//!
//! Parsing of PostgreSQL timeline history files.
//!
//! A history file `<TLI>.history` lists every ancestor timeline of `<TLI>`
//! together with the LSN at which the server switched away from it:
//!
//! ```text
//! 1	3/A2000028	no recovery target specified
//! 2	5/120000A8	before 2000-01-01 00:00:00+00
//! ```
//!
//! Blank lines and `#` comments are skipped, anything after the switchpoint
//! is free text and ignored.
//!
use std::fmt;
use std::str::FromStr;

use postgres_ffi::TimeLineID;
use postgres_ffi::xlog_utils::INVALID_TIMELINE_ID;
use serde::{Serialize, Serializer};
use utils::lsn::Lsn;

/// One timeline's span of validity, `begin..=end`.
///
/// `begin` is the switchpoint of the previous entry, or [`Lsn::INVALID`] for
/// the oldest timeline, whose history starts at the beginning of WAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimelineHistoryEntry {
    pub tli: TimeLineID,
    #[serde(serialize_with = "serialize_valid_lsn")]
    pub begin: Lsn,
    #[serde(serialize_with = "serialize_valid_lsn")]
    pub end: Lsn,
}

impl TimelineHistoryEntry {
    /// Whether `lsn` falls inside this span, both bounds included.
    pub fn contains(&self, lsn: Lsn) -> bool {
        self.begin <= lsn && lsn <= self.end
    }
}

/// Invalid positions are reported as `null`.
fn serialize_valid_lsn<S: Serializer>(lsn: &Lsn, serializer: S) -> Result<S::Ok, S::Error> {
    if lsn.is_valid() {
        serializer.serialize_some(lsn)
    } else {
        serializer.serialize_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error(
        "syntax error in history file at line {lineno}: {line:?}, expected a numeric timeline ID"
    )]
    MissingTimelineId { lineno: usize, line: String },
    #[error(
        "syntax error in history file at line {lineno}: {line:?}, expected a write-ahead log switchpoint location"
    )]
    MissingSwitchpoint { lineno: usize, line: String },
    #[error(
        "invalid data in history file at line {lineno}: {line:?}, timeline IDs must be in increasing sequence, got {found} after {previous}"
    )]
    NonIncreasingTimeline {
        lineno: usize,
        line: String,
        previous: TimeLineID,
        found: TimeLineID,
    },
}

/// Parsed contents of a history file, oldest timeline first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TimelineHistory(Vec<TimelineHistoryEntry>);

impl TimelineHistory {
    pub fn entries(&self) -> &[TimelineHistoryEntry] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

}

/// The entry of timeline `tli` in `history`, if `lsn` lies within its span.
pub fn find_containing(
    history: &[TimelineHistoryEntry],
    tli: TimeLineID,
    lsn: Lsn,
) -> Option<&TimelineHistoryEntry> {
    history.iter().find(|e| e.tli == tli && e.contains(lsn))
}

impl FromStr for TimelineHistory {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_history(s)
    }
}

/// Renders the entries back in history file syntax, comments are not kept.
impl fmt::Display for TimelineHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.0 {
            writeln!(f, "{}\t{}", entry.tli, entry.end)?;
        }
        Ok(())
    }
}

/// Parse the full text of a timeline history file.
///
/// An input without any entry gives an empty history, it is up to the caller
/// to decide whether that is acceptable.
pub fn parse_history(text: &str) -> Result<TimelineHistory, ParseError> {
    let mut entries = Vec::new();
    let mut last_tli = INVALID_TIMELINE_ID;
    let mut prev_end = Lsn::INVALID;

    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (tli, switchpoint) = match scan_line(line) {
            ScannedFields::None => {
                return Err(ParseError::MissingTimelineId {
                    lineno,
                    line: line.to_owned(),
                });
            }
            ScannedFields::TimelineOnly => {
                return Err(ParseError::MissingSwitchpoint {
                    lineno,
                    line: line.to_owned(),
                });
            }
            ScannedFields::Complete(tli, switchpoint) => (tli, switchpoint),
        };

        if tli <= last_tli {
            return Err(ParseError::NonIncreasingTimeline {
                lineno,
                line: line.to_owned(),
                previous: last_tli,
                found: tli,
            });
        }
        entries.push(TimelineHistoryEntry {
            tli,
            begin: prev_end,
            end: switchpoint,
        });
        last_tli = tli;
        prev_end = switchpoint;
    }

    Ok(TimelineHistory(entries))
}

enum ScannedFields {
    None,
    TimelineOnly,
    Complete(TimeLineID, Lsn),
}

/// Reads `<decimal tli> <hex>/<hex>` from the start of a line.
///
/// Whitespace may precede every number and separates the timeline from the
/// switchpoint, but none is required between them. Digits are consumed
/// greedily, trailing text after the second hex number is left alone. A
/// number that does not fit in 32 bits counts as absent. A number may carry a
/// `+` sign; a `-` sign or a `0x` prefix is refused.
fn scan_line(line: &str) -> ScannedFields {
    let mut scanner = Scanner { rest: line };

    let Some(tli) = scanner.number(10) else {
        return ScannedFields::None;
    };
    let switchpoint = scanner
        .number(16)
        .filter(|_| scanner.literal('/'))
        .and_then(|hi| scanner.number(16).map(|lo| Lsn::from_parts(hi, lo)));

    match switchpoint {
        Some(lsn) => ScannedFields::Complete(tli, lsn),
        None => ScannedFields::TimelineOnly,
    }
}

struct Scanner<'a> {
    rest: &'a str,
}

impl Scanner<'_> {
    fn number(&mut self, radix: u32) -> Option<u32> {
        let s = self.rest.trim_start();
        let s = s.strip_prefix('+').unwrap_or(s);
        let len = s
            .find(|c: char| !c.is_digit(radix))
            .unwrap_or(s.len());
        let value = u32::from_str_radix(&s[..len], radix).ok()?;
        self.rest = &s[len..];
        Some(value)
    }

    fn literal(&mut self, expected: char) -> bool {
        match self.rest.strip_prefix(expected) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }
}
