#![warn(missing_docs)]

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// A Postgres LSN (Log Sequence Number), also known as an XLogRecPtr
#[derive(Clone, Copy, Default, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub struct Lsn(pub u64);

impl Serialize for Lsn {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            self.0.serialize(serializer)
        }
    }
}

/// We tried to parse an LSN from a string, but failed
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("LsnParseError")]
pub struct LsnParseError;

impl Lsn {
    /// Maximum possible value for an LSN
    pub const MAX: Lsn = Lsn(u64::MAX);

    /// Invalid value for InvalidXLogRecPtr, as defined in xlogdefs.h
    pub const INVALID: Lsn = Lsn(0);

    /// Build an LSN out of the two 32-bit halves of its text form.
    pub const fn from_parts(hi: u32, lo: u32) -> Lsn {
        Lsn(((hi as u64) << 32) | lo as u64)
    }

    /// Add a number, returning None on overflow.
    pub fn checked_add<T: Into<u64>>(self, other: T) -> Option<Lsn> {
        let other: u64 = other.into();
        self.0.checked_add(other).map(Lsn)
    }

    /// Compute LSN of the segment start.
    #[inline]
    pub fn segment_lsn(self, seg_sz: u64) -> Lsn {
        Lsn(self.0 - (self.0 % seg_sz))
    }

    /// Compute the segment number
    #[inline]
    pub fn segment_number(self, seg_sz: u64) -> u64 {
        self.0 / seg_sz
    }

    /// Start of the segment following the one that holds this LSN.
    ///
    /// Unlike rounding up, an LSN sitting exactly on a segment boundary still
    /// moves forward by a whole segment. Returns `None` if the next segment
    /// would start past [`Lsn::MAX`].
    #[inline]
    pub fn checked_next_segment_lsn(self, seg_sz: u64) -> Option<Lsn> {
        self.segment_lsn(seg_sz).checked_add(seg_sz)
    }

    /// Return if the LSN is valid
    /// mimics postgres XLogRecPtrIsInvalid macro
    pub fn is_valid(self) -> bool {
        self != Lsn::INVALID
    }
}

impl FromStr for Lsn {
    type Err = LsnParseError;

    /// Parse an LSN from a string in the form `00000000/00000000`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut splitter = s.trim().split('/');
        if let (Some(left), Some(right), None) = (splitter.next(), splitter.next(), splitter.next())
        {
            let left_num = u32::from_str_radix(left, 16).map_err(|_| LsnParseError)?;
            let right_num = u32::from_str_radix(right, 16).map_err(|_| LsnParseError)?;
            Ok(Lsn::from_parts(left_num, right_num))
        } else {
            Err(LsnParseError)
        }
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xffffffff)
    }
}

impl fmt::Debug for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xffffffff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_assert::{Serializer, Token, Tokens};

    #[test]
    fn test_lsn_strings() {
        assert_eq!("12345678/AAAA5555".parse(), Ok(Lsn(0x12345678AAAA5555)));
        assert_eq!("aaaa/bbbb".parse(), Ok(Lsn(0x0000AAAA0000BBBB)));
        assert_eq!("1/A".parse(), Ok(Lsn(0x000000010000000A)));
        assert_eq!("0/0".parse(), Ok(Lsn(0)));
        "ABCDEFG/12345678".parse::<Lsn>().unwrap_err();
        "123456789/AAAA5555".parse::<Lsn>().unwrap_err();
        "12345678/AAAA55550".parse::<Lsn>().unwrap_err();
        "-1/0".parse::<Lsn>().unwrap_err();
        "1/-1".parse::<Lsn>().unwrap_err();
        "12345678AAAA5555".parse::<Lsn>().unwrap_err();

        assert_eq!(format!("{}", Lsn(0x12345678AAAA5555)), "12345678/AAAA5555");
        assert_eq!(format!("{}", Lsn(0x000000010000000A)), "1/A");

        let expected_lsn = Lsn(0x3C490F8);
        assert_eq!(" 0/3C490F8".parse(), Ok(expected_lsn));
        assert_eq!("0/3C490F8 ".parse(), Ok(expected_lsn));
        assert_eq!(" 0/3C490F8 ".parse(), Ok(expected_lsn));
    }

    #[test]
    fn test_lsn_math() {
        assert_eq!(Lsn(1234).checked_add(11u64), Some(Lsn(1245)));
        assert_eq!(Lsn::MAX.checked_add(1u64), None);

        let seg_sz: u64 = 16 * 1024 * 1024;
        assert_eq!(Lsn(0x1000007).segment_number(seg_sz), 1u64);
        assert_eq!(Lsn(0x1000007).segment_lsn(seg_sz), Lsn(0x1000000));
        assert_eq!(Lsn(0x1000000).segment_lsn(seg_sz), Lsn(0x1000000));
    }

    #[test]
    fn test_next_segment_lsn() {
        let seg_sz: u64 = 16 * 1024 * 1024;
        assert_eq!(Lsn(0).checked_next_segment_lsn(seg_sz), Some(Lsn(0x1000000)));
        assert_eq!(
            Lsn(0x1000).checked_next_segment_lsn(seg_sz),
            Some(Lsn(0x1000000))
        );
        // a boundary LSN still moves to the following segment
        assert_eq!(
            Lsn(0x1000000).checked_next_segment_lsn(seg_sz),
            Some(Lsn(0x2000000))
        );
        assert_eq!(Lsn::MAX.checked_next_segment_lsn(seg_sz), None);
    }

    #[test]
    fn test_lsn_validity() {
        assert!(!Lsn::INVALID.is_valid());
        assert!(Lsn(1).is_valid());
        assert_eq!(Lsn::from_parts(3, 0xA2000028), Lsn(0x3_A200_0028));
    }

    #[test]
    fn test_lsn_serde() {
        let original_lsn = Lsn(0x0123456789abcdef);

        let serializer = Serializer::builder().is_human_readable(false).build();
        assert_eq!(
            original_lsn.serialize(&serializer).unwrap(),
            Tokens(vec![Token::U64(0x0123456789abcdef)])
        );

        let serializer = Serializer::builder().is_human_readable(true).build();
        assert_eq!(
            original_lsn.serialize(&serializer).unwrap(),
            Tokens(vec![Token::Str(String::from("1234567/89ABCDEF"))])
        );
    }

    #[test]
    fn test_lsn_json() {
        let lsn = Lsn(0x5_1200_00A8);
        assert_eq!(serde_json::to_string(&lsn).unwrap(), r#""5/120000A8""#);
        assert_eq!(serde_json::to_string(&Some(lsn)).unwrap(), r#""5/120000A8""#);
    }
}
