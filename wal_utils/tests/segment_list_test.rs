use postgres_ffi::xlog_utils::{XLogFileName, XLogFromFileName};
use utils::lsn::Lsn;
use wal_utils::{RangeError, TimelineHistory, build_segment_range, parse_history};

const SEG_SZ: u64 = 16 * 1024 * 1024;

/// History of timeline 4 after switches at 0/2A000098, 0/55000000 and 1/10000000.
const HISTORY_4: &str = "\
1\t0/2A000098\tno recovery target specified

2\t0/55000000\tbefore 2024-05-01 10:00:00+00
3\t1/10000000\tat restore point \"nightly\"
";

fn history_4() -> TimelineHistory {
    parse_history(HISTORY_4).unwrap()
}

#[test]
fn parsed_history_is_chained() {
    let history = history_4();
    let entries = history.entries();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].begin, Lsn::INVALID);
    for pair in entries.windows(2) {
        assert!(pair[0].tli < pair[1].tli);
        assert_eq!(pair[1].begin, pair[0].end);
    }
    assert_eq!(entries.last().unwrap().end, Lsn::from_parts(1, 0x1000_0000));

    // printing and parsing back gives the same history
    assert_eq!(parse_history(&history.to_string()).unwrap(), history);
}

#[test]
fn out_of_order_history_is_rejected() {
    let err = parse_history("2\t0/100\n1\t0/200\n").unwrap_err();
    assert!(err.to_string().contains("timeline IDs must be in increasing sequence"), "{err}");
}

#[test]
fn single_timeline_ends_with_target_segment() {
    let names =
        build_segment_range(1, Lsn(0x1000), 1, Lsn(0x5000_0000), None, SEG_SZ).unwrap();
    assert_eq!(names.len(), 0x50);
    assert_eq!(names.first().unwrap(), &XLogFileName(1, 1, SEG_SZ));
    assert_eq!(names.last().unwrap(), &XLogFileName(1, 0x50, SEG_SZ));
    assert_eq!(names.last().unwrap(), "000000010000000000000050");
}

#[test]
fn differing_timelines_need_history() {
    assert_eq!(
        build_segment_range(1, Lsn(0), 2, Lsn(100), None, 16),
        Err(RangeError::TimelinesDifferWithoutHistory {
            origin_timeline: 1,
            target_timeline: 2
        })
    );
}

#[test]
fn origin_after_target_is_rejected() {
    assert_eq!(
        build_segment_range(1, Lsn(0x2000), 1, Lsn(0x1000), None, SEG_SZ),
        Err(RangeError::OriginNewerThanTarget {
            origin_lsn: Lsn(0x2000),
            target_lsn: Lsn(0x1000)
        })
    );
}

#[test]
fn parent_segments_come_first() {
    let history = parse_history("1\t0/3E8\n").unwrap();
    let names =
        build_segment_range(1, Lsn(500), 2, Lsn(2000), Some(history.entries()), 256).unwrap();

    let decoded: Vec<_> = names
        .iter()
        .map(|name| XLogFromFileName(name, 256).unwrap())
        .collect();
    assert_eq!(
        decoded,
        vec![(2, 1), (3, 1), (4, 2), (5, 2), (6, 2), (7, 2)]
    );

    let first_tli2 = decoded.iter().position(|(_, tli)| *tli == 2).unwrap();
    assert!(decoded[..first_tli2].iter().all(|(_, tli)| *tli == 1));
    assert!(decoded[first_tli2..].iter().all(|(_, tli)| *tli == 2));
}

#[test]
fn multi_timeline_walk() {
    let history = history_4();
    let target_lsn = Lsn::from_parts(1, 0x1200_0000);
    let names = build_segment_range(
        2,
        Lsn(0x5000_0000),
        4,
        target_lsn,
        Some(history.entries()),
        SEG_SZ,
    )
    .unwrap();

    let decoded: Vec<_> = names
        .iter()
        .map(|name| XLogFromFileName(name, SEG_SZ).unwrap())
        .collect();

    // segment numbers strictly increase, so there are no duplicates
    assert!(decoded.windows(2).all(|w| w[0].0 < w[1].0));
    // timelines never go backwards
    assert!(decoded.windows(2).all(|w| w[0].1 <= w[1].1));

    assert_eq!(decoded.first(), Some(&(0x51, 2)));
    assert_eq!(decoded.iter().filter(|(_, tli)| *tli == 2).count(), 4);
    assert_eq!(decoded.iter().filter(|(_, tli)| *tli == 3).count(), 0xBB);
    assert_eq!(
        decoded.last(),
        Some(&(target_lsn.segment_number(SEG_SZ), 4))
    );
    assert_eq!(names.last().unwrap(), "000000040000000100000012");
}

#[test]
fn repeated_calls_agree() {
    let history = history_4();
    let run = || {
        build_segment_range(
            1,
            Lsn(0x1000),
            4,
            Lsn::from_parts(1, 0x1000_0000),
            Some(history.entries()),
            SEG_SZ,
        )
    };
    assert_eq!(run(), run());
}

#[test]
fn target_segment_is_listed_once() {
    // target sits on the first byte of a segment
    let names =
        build_segment_range(1, Lsn(0x10), 1, Lsn(0x300_0000), None, SEG_SZ).unwrap();
    assert_eq!(
        names,
        vec![
            XLogFileName(1, 1, SEG_SZ),
            XLogFileName(1, 2, SEG_SZ),
            XLogFileName(1, 3, SEG_SZ),
        ]
    );

    // target in the middle of the last walked segment
    let names =
        build_segment_range(1, Lsn(0x10), 1, Lsn(0x280_0000), None, SEG_SZ).unwrap();
    assert_eq!(
        names,
        vec![XLogFileName(1, 1, SEG_SZ), XLogFileName(1, 2, SEG_SZ)]
    );
}

#[test]
fn backward_switchpoint_is_taken_as_written() {
    let history = parse_history("1\t0/3000000\n2\t0/2000000\n").unwrap();
    assert_eq!(parse_history(&history.to_string()).unwrap(), history);

    // the span of timeline 2 runs backwards and adds nothing to the walk
    let names = build_segment_range(
        1,
        Lsn(0x10),
        3,
        Lsn(0x400_0000),
        Some(history.entries()),
        SEG_SZ,
    )
    .unwrap();
    assert_eq!(
        names,
        vec![
            XLogFileName(1, 1, SEG_SZ),
            XLogFileName(1, 2, SEG_SZ),
            XLogFileName(3, 3, SEG_SZ),
            XLogFileName(3, 4, SEG_SZ),
        ]
    );
}
