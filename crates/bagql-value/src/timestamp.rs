//! Ion-style timestamps with explicit precision.
//!
//! A timestamp literal may stop at any of year, month, day, minute, or
//! second precision (`2001T`, `2001-07T`, `2001-07-01`, `2001-07-01T10:15Z`,
//! `2001-07-01T10:15:30.5Z`). Time-bearing forms require an offset.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use thiserror::Error;

/// How much of the timestamp was actually written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum TimestampPrecision {
    Year,
    Month,
    Day,
    Minute,
    Second,
}

/// A point in time with explicit precision and optional UTC offset.
///
/// Fields beyond the stated precision hold their zero defaults and are not
/// rendered by `Display`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Timestamp {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Fractional seconds, in nanoseconds.
    pub nanosecond: u32,
    /// Minutes east of UTC. `None` for date-only precisions.
    pub offset_minutes: Option<i16>,
    pub precision: TimestampPrecision,
}

/// Failure to interpret text as a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("malformed timestamp literal `{0}`")]
    Malformed(String),
    #[error("timestamp {field} out of range in `{text}`")]
    FieldOutOfRange { field: &'static str, text: String },
    #[error("timestamp `{0}` has a time component but no offset")]
    MissingOffset(String),
}

impl Timestamp {
    /// A year-precision timestamp, e.g. the literal `2001T`.
    #[must_use]
    pub const fn from_year(year: i32) -> Self {
        Self {
            year,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            nanosecond: 0,
            offset_minutes: None,
            precision: TimestampPrecision::Year,
        }
    }
}

/// Cursor over the ASCII bytes of a timestamp literal.
struct Scan<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scan<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn malformed(&self) -> TimestampError {
        TimestampError::Malformed(self.text.to_owned())
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, ch: u8) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn done(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Read exactly `n` ASCII digits as a number.
    fn digits(&mut self, n: usize) -> Result<u32, TimestampError> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(self.malformed());
        }
        let mut v: u32 = 0;
        for &b in &self.bytes[self.pos..end] {
            if !b.is_ascii_digit() {
                return Err(self.malformed());
            }
            v = v * 10 + u32::from(b - b'0');
        }
        self.pos = end;
        Ok(v)
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    #[allow(
        clippy::too_many_lines,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap
    )]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut sc = Scan::new(s);
        let mut ts = Self::from_year(0);

        let year = sc.digits(4)?;
        if year == 0 {
            return Err(TimestampError::FieldOutOfRange {
                field: "year",
                text: s.to_owned(),
            });
        }
        ts.year = year as i32;

        // `2001T`
        if sc.eat(b'T') && sc.done() {
            return Ok(ts);
        }

        if !sc.eat(b'-') {
            return Err(sc.malformed());
        }
        let month = sc.digits(2)?;
        if !(1..=12).contains(&month) {
            return Err(TimestampError::FieldOutOfRange {
                field: "month",
                text: s.to_owned(),
            });
        }
        ts.month = month as u8;
        ts.precision = TimestampPrecision::Month;

        // `2001-07T`
        if sc.eat(b'T') && sc.done() {
            return Ok(ts);
        }

        if !sc.eat(b'-') {
            return Err(sc.malformed());
        }
        let day = sc.digits(2)?;
        ts.day = day as u8;
        ts.precision = TimestampPrecision::Day;
        // Calendar validity (day-in-month, leap years) via chrono.
        if NaiveDate::from_ymd_opt(ts.year, month, day).is_none() {
            return Err(TimestampError::FieldOutOfRange {
                field: "day",
                text: s.to_owned(),
            });
        }

        // `2001-07-01` or `2001-07-01T`
        if sc.done() {
            return Ok(ts);
        }
        if !sc.eat(b'T') {
            return Err(sc.malformed());
        }
        if sc.done() {
            return Ok(ts);
        }

        let hour = sc.digits(2)?;
        if hour > 23 {
            return Err(TimestampError::FieldOutOfRange {
                field: "hour",
                text: s.to_owned(),
            });
        }
        if !sc.eat(b':') {
            return Err(sc.malformed());
        }
        let minute = sc.digits(2)?;
        if minute > 59 {
            return Err(TimestampError::FieldOutOfRange {
                field: "minute",
                text: s.to_owned(),
            });
        }
        ts.hour = hour as u8;
        ts.minute = minute as u8;
        ts.precision = TimestampPrecision::Minute;

        if sc.eat(b':') {
            let second = sc.digits(2)?;
            if second > 59 {
                return Err(TimestampError::FieldOutOfRange {
                    field: "second",
                    text: s.to_owned(),
                });
            }
            ts.second = second as u8;
            ts.precision = TimestampPrecision::Second;

            if sc.eat(b'.') {
                let frac_start = sc.pos;
                let mut nanos: u32 = 0;
                let mut scale: u32 = 100_000_000;
                while let Some(b) = sc.peek() {
                    if !b.is_ascii_digit() {
                        break;
                    }
                    // Digits past nanosecond precision are dropped.
                    if scale > 0 {
                        nanos += u32::from(b - b'0') * scale;
                        scale /= 10;
                    }
                    sc.pos += 1;
                }
                if sc.pos == frac_start {
                    return Err(sc.malformed());
                }
                ts.nanosecond = nanos;
            }
        }

        // Offset: `Z` or `+hh:mm` / `-hh:mm`.
        let offset = match sc.peek() {
            Some(b'Z') => {
                sc.pos += 1;
                0i16
            }
            Some(sign @ (b'+' | b'-')) => {
                sc.pos += 1;
                let oh = sc.digits(2)?;
                if !sc.eat(b':') {
                    return Err(sc.malformed());
                }
                let om = sc.digits(2)?;
                if oh > 23 || om > 59 {
                    return Err(TimestampError::FieldOutOfRange {
                        field: "offset",
                        text: s.to_owned(),
                    });
                }
                let total = (oh * 60 + om) as i16;
                if sign == b'-' { -total } else { total }
            }
            _ => return Err(TimestampError::MissingOffset(s.to_owned())),
        };
        ts.offset_minutes = Some(offset);

        if sc.done() {
            Ok(ts)
        } else {
            Err(sc.malformed())
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.precision {
            TimestampPrecision::Year => write!(f, "{:04}T", self.year),
            TimestampPrecision::Month => write!(f, "{:04}-{:02}T", self.year, self.month),
            TimestampPrecision::Day => {
                write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
            }
            TimestampPrecision::Minute | TimestampPrecision::Second => {
                write!(
                    f,
                    "{:04}-{:02}-{:02}T{:02}:{:02}",
                    self.year, self.month, self.day, self.hour, self.minute
                )?;
                if self.precision == TimestampPrecision::Second {
                    write!(f, ":{:02}", self.second)?;
                    if self.nanosecond > 0 {
                        let frac = format!("{:09}", self.nanosecond);
                        write!(f, ".{}", frac.trim_end_matches('0'))?;
                    }
                }
                match self.offset_minutes {
                    Some(0) | None => f.write_str("Z"),
                    Some(off) => {
                        let (sign, off) = if off < 0 { ('-', -off) } else { ('+', off) };
                        write!(f, "{sign}{:02}:{:02}", off / 60, off % 60)
                    }
                }
            }
        }
    }
}
