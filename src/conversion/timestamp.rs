//! Timestamp parsing.
//!
//! [`parse`] is a single-pass scanner for the format servers emit by default,
//! `YYYY-MM-DD HH:MM:SS[.fraction][±HH[:]MM]`. It reports `None` instead of an
//! error so callers can fall back to a general parser, which [`parse_datetime`]
//! does with chrono.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use super::Value;
use crate::error::{Error, Result};

/// Maximum number of fraction digits taken into account.
const MAX_FRACTION_DIGITS: usize = 31;

/// Broken-down timestamp produced by [`parse`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timestamp {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    /// Seconds including the fractional part.
    pub second: f64,
    /// Signed offset from UTC in seconds; 0 when the text carried no zone.
    pub offset: i32,
}

/// Byte cursor used by the scanners in this module.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn rest(&self) -> &'a [u8] {
        self.bytes.get(self.pos..).unwrap_or_default()
    }

    /// Consume `b` if it is the next byte.
    fn literal(&mut self, b: u8) -> Option<()> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    /// Read between 1 and `max` decimal digits.
    fn digits(&mut self, max: usize) -> Option<u32> {
        let mut value = 0u32;
        let mut count = 0;
        while count < max {
            match self.peek() {
                Some(b) if b.is_ascii_digit() => {
                    value = value * 10 + u32::from(b - b'0');
                    self.pos += 1;
                    count += 1;
                }
                _ => break,
            }
        }
        (count > 0).then_some(value)
    }

    /// Read a `.digits` fraction, returning its value in `[0, 1)`.
    fn fraction(&mut self) -> Option<f64> {
        self.literal(b'.')?;
        let mut value = 0u128;
        let mut count = 0;
        while count < MAX_FRACTION_DIGITS {
            match self.peek() {
                Some(b) if b.is_ascii_digit() => {
                    value = value * 10 + u128::from(b - b'0');
                    self.pos += 1;
                    count += 1;
                }
                _ => break,
            }
        }
        Some(value as f64 / 10f64.powi(count as i32))
    }

    fn skip_non_digits(&mut self) {
        while matches!(self.peek(), Some(b) if !b.is_ascii_digit()) {
            self.pos += 1;
        }
    }
}

/// Scan a `±HH[[:]MM]` zone anywhere in `rest`.
///
/// Returns the signed offset in seconds, or `None` when no sign is present.
fn scan_zone(rest: &[u8]) -> Option<i32> {
    let at = memchr::memchr2(b'+', b'-', rest)?;
    let sign = if rest[at] == b'+' { 1 } else { -1 };
    let mut cur = Cursor::new(&rest[at + 1..]);
    let Some(hours) = cur.digits(2) else {
        return Some(0);
    };
    cur.skip_non_digits();
    let minutes = cur.digits(2).unwrap_or(0);
    Some(sign * (hours as i32 * 3600 + minutes as i32 * 60))
}

/// Parse `YYYY-MM-DD HH:MM:SS[.fraction][±HH[:]MM]`.
///
/// Returns `None` if the mandatory date and time prefix does not match or the
/// day is zero. A missing fraction or zone is not an error.
pub fn parse(text: &[u8]) -> Option<Timestamp> {
    let mut cur = Cursor::new(text);

    let year = cur.digits(4)?;
    cur.literal(b'-')?;
    let month = cur.digits(2)?;
    cur.literal(b'-')?;
    let day = cur.digits(2)?;
    if day == 0 {
        return None;
    }
    cur.literal(b' ')?;
    let hour = cur.digits(2)?;
    cur.literal(b':')?;
    let minute = cur.digits(2)?;
    cur.literal(b':')?;
    let whole_seconds = cur.digits(2)?;

    let mut second = f64::from(whole_seconds);
    if cur.peek() == Some(b'.') {
        second += cur.fraction().unwrap_or(0.0);
    }

    let offset = scan_zone(cur.rest()).unwrap_or(0);

    Some(Timestamp {
        year: year as i32,
        month,
        day,
        hour,
        minute,
        second,
        offset,
    })
}

impl Timestamp {
    /// Convert into a chrono timestamp carrying the parsed offset.
    ///
    /// Returns `None` for out-of-range fields (month 13, hour 25, ...).
    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.offset)?;
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day)?;
        let whole = self.second.trunc();
        let nanos = (((self.second - whole) * 1e9).round() as u32).min(999_999_999);
        let time = NaiveTime::from_hms_nano_opt(self.hour, self.minute, whole as u32, nanos)?;
        date.and_time(time).and_local_timezone(offset).single()
    }
}

impl std::fmt::Display for Timestamp {
    /// Render in the grammar accepted by [`parse`], with microsecond precision
    /// and an explicit `±HH:MM` zone.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.second.trunc();
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, whole as u32
        )?;
        let micros = (((self.second - whole) * 1e6).round() as u32).min(999_999);
        if micros > 0 {
            write!(f, ".{:06}", micros)?;
        }
        let sign = if self.offset < 0 { '-' } else { '+' };
        let abs = self.offset.unsigned_abs();
        write!(f, "{}{:02}:{:02}", sign, abs / 3600, abs % 3600 / 60)
    }
}

/// Parse a timestamp, trying the fast path first and chrono's general parsers
/// afterwards. Zone-less input is taken as UTC.
pub fn parse_datetime(text: &str) -> Result<DateTime<FixedOffset>> {
    if let Some(dt) = parse(text.as_bytes()).and_then(|ts| ts.to_datetime()) {
        return Ok(dt);
    }

    let utc = FixedOffset::east_opt(0).ok_or_else(|| Error::Decode("invalid offset".into()))?;
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_rfc2822(text))
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
                .or_else(|_| {
                    NaiveDate::parse_from_str(text, "%Y-%m-%d")
                        .map(|d| d.and_time(NaiveTime::MIN))
                })
                .map(|naive| naive.and_utc().with_timezone(&utc))
        })
        .map_err(|e| Error::Decode(format!("invalid timestamp {:?}: {}", text, e)))
}

/// Cast a TIME column.
///
/// A `.` at byte 19 marks sub-second resolution. The date and time digits are
/// normalized to `YYYY-MM-DD HH:MM:SS` and read as local time in `local`. An
/// explicit zone in the source corrects the epoch and becomes the result's
/// offset. Unparseable input is returned as text after a warning.
pub(crate) fn cast_time(raw: &[u8], local: FixedOffset) -> Value {
    match time_value(raw, local) {
        Some(dt) => Value::Timestamp(dt),
        None => {
            tracing::warn!(data = %String::from_utf8_lossy(raw), "typecast failed to parse date");
            Value::Text(raw.to_vec())
        }
    }
}

fn time_value(raw: &[u8], local: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let text = simdutf8::basic::from_utf8(raw).ok()?;
    let with_usec = raw.get(19) == Some(&b'.');

    let (date, clock) = text.split_once(' ').unwrap_or((text, ""));
    let mut cur = Cursor::new(clock.as_bytes());

    // hour, minute, second; missing fields stay zero
    let mut fields = [0u32; 3];
    let mut complete = true;
    for (i, field) in fields.iter_mut().enumerate() {
        if i > 0 && cur.literal(b':').is_none() {
            complete = false;
            break;
        }
        match cur.digits(2) {
            Some(v) => *field = v,
            None => {
                complete = false;
                break;
            }
        }
    }

    let mut usec = 0.0;
    let mut zone = None;
    if complete {
        if with_usec {
            usec = cur.fraction().unwrap_or(0.0);
        }
        if matches!(cur.peek(), Some(b'+' | b'-')) {
            zone = scan_zone(cur.rest());
        }
    }

    let normalized = format!("{} {:02}:{:02}:{:02}", date, fields[0], fields[1], fields[2]);
    let naive = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S").ok()?;

    // Epoch as if `naive` were wall-clock time at `local`.
    let local_secs = i64::from(local.local_minus_utc());
    let mut epoch = naive.and_utc().timestamp() - local_secs;
    let offset = match zone {
        Some(zone) => {
            epoch += -i64::from(zone) + local_secs;
            FixedOffset::east_opt(zone)?
        }
        None => local,
    };

    let micros = ((usec * 1e6).round() as u32).min(999_999);
    DateTime::from_timestamp(epoch, micros * 1000).map(|utc| utc.with_timezone(&offset))
}
