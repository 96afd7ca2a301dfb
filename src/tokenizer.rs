//! Stateless byte-level recognizers for the logical types of §4.6.1.
//!
//! Every function here is pure: it borrows a [`ByteSlice`] and returns
//! `Some(value)` on success or `None` on failure. None of them allocate on
//! the parse path; widening (e.g. `f64` round-tripping through `f32`) is
//! plain arithmetic, not reparsing.

use crate::byte_slice::ByteSlice;

/// Recognizes `true`/`false`, case-insensitively, ASCII-only.
pub fn try_parse_bool(cell: ByteSlice<'_>) -> Option<bool> {
    let bytes = cell.data();
    if bytes.eq_ignore_ascii_case(b"true") {
        Some(true)
    } else if bytes.eq_ignore_ascii_case(b"false") {
        Some(false)
    } else {
        None
    }
}

/// Parses a signed decimal integer with an optional leading `+`/`-`,
/// failing on overflow of the target width.
///
/// Shared by `try_parse_byte`/`try_parse_short`/`try_parse_int`/`try_parse_long`;
/// the accumulator is widened to `i128` so overflow of the *target* type can
/// be detected precisely rather than wrapping.
fn try_parse_signed(cell: ByteSlice<'_>) -> Option<i128> {
    let bytes = cell.data();
    if bytes.is_empty() {
        return None;
    }
    let (negative, digits) = match bytes[0] {
        b'-' => (true, &bytes[1..]),
        b'+' => (false, &bytes[1..]),
        _ => (false, bytes),
    };
    if digits.is_empty() {
        return None;
    }
    let mut acc: i128 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        acc = acc.checked_mul(10)?.checked_add((b - b'0') as i128)?;
    }
    Some(if negative { -acc } else { acc })
}

macro_rules! signed_tokenizer {
    ($name:ident, $ty:ty) => {
        /// Parses a signed decimal integer, failing on overflow of this
        /// width or on any non-digit byte besides a leading sign.
        pub fn $name(cell: ByteSlice<'_>) -> Option<$ty> {
            let v = try_parse_signed(cell)?;
            <$ty>::try_from(v).ok()
        }
    };
}

signed_tokenizer!(try_parse_byte, i8);
signed_tokenizer!(try_parse_short, i16);
signed_tokenizer!(try_parse_int, i32);
signed_tokenizer!(try_parse_long, i64);

/// A pluggable double parser, injected rather than looked up via a process
/// global (§9 "Global state: none").
pub trait DoubleParser: Send + Sync {
    /// Parses `s` as a finite or non-finite IEEE-754 double.
    fn parse(&self, s: &str) -> Option<f64>;
}

/// The default double parser, backed by `f64::from_str`.
#[derive(Copy, Clone, Default, Debug)]
pub struct StdDoubleParser;

impl DoubleParser for StdDoubleParser {
    fn parse(&self, s: &str) -> Option<f64> {
        s.parse().ok()
    }
}

/// Parses a double via the supplied pluggable parser.
pub fn try_parse_double(cell: ByteSlice<'_>, parser: &dyn DoubleParser) -> Option<f64> {
    let s = core::str::from_utf8(cell.data()).ok()?;
    parser.parse(s)
}

/// Parses a float by round-tripping through [`try_parse_double`]; the
/// result must be finite (a double that only fits as an infinity or NaN at
/// `f32` precision is rejected, matching "floats are derived by round-trip
/// through double but must be finite").
pub fn try_parse_float(cell: ByteSlice<'_>, parser: &dyn DoubleParser) -> Option<f32> {
    let d = try_parse_double(cell, parser)?;
    let f = d as f32;
    if f.is_finite() || d == 0.0 {
        Some(f)
    } else {
        None
    }
}

/// Parses exactly one Unicode scalar (1-4 UTF-8 bytes) into a UTF-16 code
/// unit. Scalars outside the Basic Multilingual Plane require a surrogate
/// pair and are rejected, since `char` here is a 16-bit unit.
pub fn try_parse_char(cell: ByteSlice<'_>) -> Option<u16> {
    let s = core::str::from_utf8(cell.data()).ok()?;
    let mut chars = s.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let scalar = c as u32;
    if scalar > 0xFFFF {
        None
    } else {
        Some(scalar as u16)
    }
}

/// Resolves a timezone mnemonic (e.g. `"PST"`) to a UTC offset in seconds.
///
/// Injected the same way as [`DoubleParser`]; the core ships no built-in
/// mnemonic table.
pub trait TimeZoneParser: Send + Sync {
    /// Returns the UTC offset, in seconds, for `mnemonic`, or `None` if it
    /// is not recognized.
    fn resolve(&self, mnemonic: &str) -> Option<i32>;
}

/// Parses an ISO-8601 datetime (optionally with a zone/offset) to
/// nanoseconds since the Unix epoch.
pub fn try_parse_datetime(
    cell: ByteSlice<'_>,
    zone_parser: Option<&dyn TimeZoneParser>,
) -> Option<i64> {
    use time::format_description::well_known::Iso8601;
    use time::{OffsetDateTime, PrimitiveDateTime};

    let s = core::str::from_utf8(cell.data()).ok()?;

    if let Ok(dt) = OffsetDateTime::parse(s, &Iso8601::DEFAULT) {
        return i64::try_from(dt.unix_timestamp_nanos()).ok();
    }
    if let Ok(dt) = PrimitiveDateTime::parse(s, &Iso8601::DEFAULT) {
        return i64::try_from(dt.assume_utc().unix_timestamp_nanos()).ok();
    }

    // A trailing space-separated mnemonic (e.g. "2024-01-01T00:00:00 PST")
    // is only attempted when a custom zone parser was supplied.
    let zone_parser = zone_parser?;
    let idx = s.rfind(' ')?;
    let (ts_part, mnemonic) = (&s[..idx], s[idx + 1..].trim());
    let offset_secs = zone_parser.resolve(mnemonic)?;
    let naive = PrimitiveDateTime::parse(ts_part, &Iso8601::DEFAULT).ok()?;
    let offset = time::UtcOffset::from_whole_seconds(offset_secs).ok()?;
    i64::try_from(naive.assume_offset(offset).unix_timestamp_nanos()).ok()
}

/// A timestamp is a raw signed integer epoch count in whatever scale the
/// caller's [`crate::parser`] type declared (seconds/ms/µs/ns); the
/// tokenizer itself performs no scale conversion.
pub fn try_parse_timestamp(cell: ByteSlice<'_>) -> Option<i64> {
    try_parse_long(cell)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(bytes: &[u8]) -> ByteSlice<'_> {
        ByteSlice::whole(bytes)
    }

    #[test]
    fn bool_case_insensitive() {
        assert_eq!(try_parse_bool(cell(b"true")), Some(true));
        assert_eq!(try_parse_bool(cell(b"TRUE")), Some(true));
        assert_eq!(try_parse_bool(cell(b"FaLsE")), Some(false));
        assert_eq!(try_parse_bool(cell(b"nope")), None);
    }

    #[test]
    fn integers_overflow_by_width() {
        assert_eq!(try_parse_byte(cell(b"127")), Some(127));
        assert_eq!(try_parse_byte(cell(b"128")), None);
        assert_eq!(try_parse_byte(cell(b"-128")), Some(-128));
        assert_eq!(try_parse_short(cell(b"32767")), Some(32767));
        assert_eq!(try_parse_short(cell(b"32768")), None);
        assert_eq!(try_parse_int(cell(b"2147483647")), Some(2147483647));
        assert_eq!(try_parse_int(cell(b"2147483648")), None);
        assert_eq!(try_parse_long(cell(b"-40000")), Some(-40000));
        assert_eq!(try_parse_long(cell(b"9223372036854775807")), Some(i64::MAX));
        assert_eq!(try_parse_long(cell(b"9223372036854775808")), None);
    }

    #[test]
    fn integers_reject_non_digits() {
        assert_eq!(try_parse_int(cell(b"")), None);
        assert_eq!(try_parse_int(cell(b"+")), None);
        assert_eq!(try_parse_int(cell(b"12a")), None);
        assert_eq!(try_parse_int(cell(b"1.5")), None);
        assert_eq!(try_parse_int(cell(b"+42")), Some(42));
    }

    #[test]
    fn double_delegates_to_pluggable_parser() {
        let p = StdDoubleParser;
        assert_eq!(try_parse_double(cell(b"2.5"), &p), Some(2.5));
        assert_eq!(try_parse_double(cell(b"nan"), &p).map(f64::is_nan), Some(true));
        assert_eq!(try_parse_double(cell(b"abc"), &p), None);
    }

    #[test]
    fn float_must_be_finite() {
        let p = StdDoubleParser;
        assert_eq!(try_parse_float(cell(b"2.5"), &p), Some(2.5));
        // f64::MAX doesn't fit in f32 and rounds to infinity, so the float
        // tokenizer must reject it even though the double parse succeeded.
        assert_eq!(try_parse_float(cell(b"1.7976931348623157e308"), &p), None);
    }

    #[test]
    fn char_accepts_single_scalar_only() {
        assert_eq!(try_parse_char(cell("a".as_bytes())), Some('a' as u16));
        assert_eq!(try_parse_char(cell("é".as_bytes())), Some('é' as u16));
        assert_eq!(try_parse_char(cell("ab".as_bytes())), None);
        // U+1F600 (GRINNING FACE) is outside the BMP and needs a surrogate
        // pair in UTF-16, so it must be rejected.
        assert_eq!(try_parse_char(cell("😀".as_bytes())), None);
    }

    #[test]
    fn datetime_parses_offset_and_naive_forms() {
        let with_offset = try_parse_datetime(cell(b"2024-01-02T03:04:05Z"), None);
        assert!(with_offset.is_some());
        let naive = try_parse_datetime(cell(b"2024-01-02T03:04:05"), None);
        assert!(naive.is_some());
        assert_eq!(try_parse_datetime(cell(b"not a date"), None), None);
    }

    struct FixedZone;
    impl TimeZoneParser for FixedZone {
        fn resolve(&self, mnemonic: &str) -> Option<i32> {
            match mnemonic {
                "PST" => Some(-8 * 3600),
                _ => None,
            }
        }
    }

    #[test]
    fn datetime_resolves_custom_mnemonic() {
        let parser = FixedZone;
        let result = try_parse_datetime(cell(b"2024-01-02T03:04:05 PST"), Some(&parser));
        assert!(result.is_some());
        let utc = try_parse_datetime(cell(b"2024-01-02T11:04:05Z"), None);
        assert_eq!(result, utc);
    }

    #[test]
    fn timestamp_is_a_raw_long() {
        assert_eq!(try_parse_timestamp(cell(b"1700000000000")), Some(1700000000000));
        assert_eq!(try_parse_timestamp(cell(b"not a number")), None);
    }
}
