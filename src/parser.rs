//! Typed parsers implementing the per-cell policy of §4.6 over the
//! tokenizers of §4.5, plus the parser-identity enumeration the inference
//! engine drives.

use crate::byte_slice::ByteSlice;
use crate::error::CoreError;
use crate::sink::{Chunk, DataType, Sink, TimestampScale, CHUNK_CAPACITY};
use crate::storage::DenseStorageReader;
use crate::tokenizer::{
    try_parse_bool, try_parse_byte, try_parse_char, try_parse_datetime, try_parse_double,
    try_parse_float, try_parse_int, try_parse_long, try_parse_short, try_parse_timestamp,
    DoubleParser, TimeZoneParser,
};

pub use crate::error::ParserName;

/// A one-cell-of-lookahead wrapper over a [`DenseStorageReader`].
///
/// Inference's numeric/non-numeric ladders must be able to hand a cell
/// that one parser rejected to the *next* parser without having consumed
/// it, which a plain pop-only stream can't do; this is the idiomatic
/// `Peekable`-shaped fix.
pub struct PeekableCellSource<'r> {
    reader: &'r mut DenseStorageReader,
    peeked: Option<Option<Vec<u8>>>,
}

impl<'r> PeekableCellSource<'r> {
    pub fn new(reader: &'r mut DenseStorageReader) -> Self {
        PeekableCellSource { reader, peeked: None }
    }

    /// Looks at the next cell without consuming it.
    pub fn peek(&mut self) -> Result<Option<&[u8]>, CoreError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.reader.try_get_next_slice()?);
        }
        Ok(self.peeked.as_ref().unwrap().as_deref())
    }

    /// Consumes the peeked cell (or the next one, if nothing was peeked
    /// yet).
    pub fn advance(&mut self) -> Result<Option<Vec<u8>>, CoreError> {
        match self.peeked.take() {
            Some(v) => Ok(v),
            None => self.reader.try_get_next_slice(),
        }
    }

    /// Clones the underlying reader's current cursor, for scanning ahead
    /// without disturbing `self`. Only meaningful when nothing has been
    /// peeked from `self` yet: a buffered peeked cell is not reflected in
    /// the clone, since it was already popped off the underlying reader.
    pub fn fork(&self) -> DenseStorageReader {
        self.reader.clone()
    }
}

/// The outcome of one `tryParse` call.
pub struct ParseOutcome {
    /// Exclusive upper bound of values successfully written.
    pub dest_consumed: usize,
    /// Whether the underlying stream was fully exhausted (as opposed to
    /// having stopped because of `dest_end` or an unparseable cell).
    pub exhausted: bool,
}

/// Applies the per-cell null/parse/sentinel policy of §4.6 to one cell.
/// Returns `None` when the parser should stop (the cell is not a null
/// literal and does not tokenize, or it tokenizes to the reserved
/// sentinel).
fn apply_cell_policy<T: Clone + Default + PartialEq>(
    cell: &[u8],
    null_literals: &[&[u8]],
    sentinel: Option<&T>,
    parse: &mut dyn FnMut(ByteSlice<'_>) -> Option<T>,
) -> Option<(T, bool)> {
    if null_literals.iter().any(|lit| *lit == cell) {
        return Some((sentinel.cloned().unwrap_or_default(), true));
    }
    let value = parse(ByteSlice::whole(cell))?;
    if let Some(sentinel) = sentinel {
        if value == *sentinel {
            return None;
        }
    }
    Some((value, false))
}

/// Drives the shared chunk-batched `tryParse` loop: pulls cells from
/// `iter`, applies the null/sentinel policy, and flushes full (or final)
/// chunks to `sink`. Shared by every typed parser in this module.
fn try_parse_generic<T: Clone + Default + PartialEq, S: Sink<T> + ?Sized>(
    iter: &mut PeekableCellSource<'_>,
    sink: &mut S,
    null_literals: &[&[u8]],
    sentinel: Option<&T>,
    dest_begin: usize,
    dest_end: usize,
    appending: bool,
    mut parse: impl FnMut(ByteSlice<'_>) -> Option<T>,
) -> Result<ParseOutcome, CoreError> {
    let capacity = CHUNK_CAPACITY.min(dest_end.saturating_sub(dest_begin)).max(1);
    let mut chunk: Chunk<T> = Chunk::with_capacity(capacity);
    let mut chunk_start = dest_begin;
    let mut pos = dest_begin;
    let mut exhausted = false;

    while pos < dest_end {
        let cell = match iter.peek()? {
            Some(cell) => cell.to_vec(),
            None => {
                exhausted = true;
                break;
            }
        };
        match apply_cell_policy(&cell, null_literals, sentinel, &mut parse) {
            Some((value, is_null)) => {
                iter.advance()?;
                chunk.push(value, is_null);
                pos += 1;
                if chunk.len() >= CHUNK_CAPACITY {
                    sink.write(chunk_start, chunk.values(), chunk.nulls(), appending && chunk_start == dest_begin);
                    chunk.clear();
                    chunk_start = pos;
                }
            }
            None => break,
        }
    }
    if !chunk.is_empty() {
        sink.write(chunk_start, chunk.values(), chunk.nulls(), appending && chunk_start == dest_begin);
    }
    Ok(ParseOutcome { dest_consumed: pos, exhausted })
}

/// Parses a column as `BOOLEAN_AS_BYTE` (stored as `u8`: 0/1).
#[allow(clippy::too_many_arguments)]
pub fn parse_bool<S: Sink<u8> + ?Sized>(
    iter: &mut PeekableCellSource<'_>,
    sink: &mut S,
    null_literals: &[&[u8]],
    sentinel: Option<u8>,
    dest_begin: usize,
    dest_end: usize,
    appending: bool,
) -> Result<ParseOutcome, CoreError> {
    try_parse_generic(iter, sink, null_literals, sentinel.as_ref(), dest_begin, dest_end, appending, |c| {
        try_parse_bool(c).map(|b| b as u8)
    })
}

macro_rules! integral_parser {
    ($fn_name:ident, $ty:ty, $tokenizer:ident) => {
        #[allow(clippy::too_many_arguments)]
        pub fn $fn_name<S: Sink<$ty> + ?Sized>(
            iter: &mut PeekableCellSource<'_>,
            sink: &mut S,
            null_literals: &[&[u8]],
            sentinel: Option<$ty>,
            dest_begin: usize,
            dest_end: usize,
            appending: bool,
        ) -> Result<ParseOutcome, CoreError> {
            try_parse_generic(iter, sink, null_literals, sentinel.as_ref(), dest_begin, dest_end, appending, |c| {
                $tokenizer(c)
            })
        }
    };
}

integral_parser!(parse_byte, i8, try_parse_byte);
integral_parser!(parse_short, i16, try_parse_short);
integral_parser!(parse_int, i32, try_parse_int);
integral_parser!(parse_long, i64, try_parse_long);

/// Parses a column as `FLOAT` via the "fast" tokenizer path: any value
/// that round-trips through `f64` to a finite `f32` is accepted, even if
/// that narrowing loses precision.
#[allow(clippy::too_many_arguments)]
pub fn parse_float_fast<S: Sink<f32> + ?Sized>(
    iter: &mut PeekableCellSource<'_>,
    sink: &mut S,
    null_literals: &[&[u8]],
    sentinel: Option<f32>,
    dest_begin: usize,
    dest_end: usize,
    appending: bool,
    double_parser: &dyn DoubleParser,
) -> Result<ParseOutcome, CoreError> {
    try_parse_generic(iter, sink, null_literals, sentinel.as_ref(), dest_begin, dest_end, appending, |c| {
        try_parse_float(c, double_parser)
    })
}

/// Parses a column as `FLOAT` via the "strict" tokenizer path: only
/// accepts a value when narrowing to `f32` and back to `f64` recovers the
/// exact original double, i.e. no precision is lost.
#[allow(clippy::too_many_arguments)]
pub fn parse_float_strict<S: Sink<f32> + ?Sized>(
    iter: &mut PeekableCellSource<'_>,
    sink: &mut S,
    null_literals: &[&[u8]],
    sentinel: Option<f32>,
    dest_begin: usize,
    dest_end: usize,
    appending: bool,
    double_parser: &dyn DoubleParser,
) -> Result<ParseOutcome, CoreError> {
    try_parse_generic(iter, sink, null_literals, sentinel.as_ref(), dest_begin, dest_end, appending, |c| {
        let d = try_parse_double(c, double_parser)?;
        let f = d as f32;
        if (f as f64) == d {
            Some(f)
        } else {
            None
        }
    })
}

/// Parses a column as `DOUBLE`.
#[allow(clippy::too_many_arguments)]
pub fn parse_double<S: Sink<f64> + ?Sized>(
    iter: &mut PeekableCellSource<'_>,
    sink: &mut S,
    null_literals: &[&[u8]],
    sentinel: Option<f64>,
    dest_begin: usize,
    dest_end: usize,
    appending: bool,
    double_parser: &dyn DoubleParser,
) -> Result<ParseOutcome, CoreError> {
    try_parse_generic(iter, sink, null_literals, sentinel.as_ref(), dest_begin, dest_end, appending, |c| {
        try_parse_double(c, double_parser)
    })
}

/// Parses a column as `CHAR`.
#[allow(clippy::too_many_arguments)]
pub fn parse_char<S: Sink<u16> + ?Sized>(
    iter: &mut PeekableCellSource<'_>,
    sink: &mut S,
    null_literals: &[&[u8]],
    sentinel: Option<u16>,
    dest_begin: usize,
    dest_end: usize,
    appending: bool,
) -> Result<ParseOutcome, CoreError> {
    try_parse_generic(iter, sink, null_literals, sentinel.as_ref(), dest_begin, dest_end, appending, |c| {
        try_parse_char(c)
    })
}

/// Parses a column as `STRING`. Every cell that is valid UTF-8 is
/// accepted; null payload is represented natively as `None` rather than a
/// reserved sentinel.
#[allow(clippy::too_many_arguments)]
pub fn parse_string<S: Sink<Option<Box<str>>> + ?Sized>(
    iter: &mut PeekableCellSource<'_>,
    sink: &mut S,
    null_literals: &[&[u8]],
    dest_begin: usize,
    dest_end: usize,
    appending: bool,
) -> Result<ParseOutcome, CoreError> {
    try_parse_generic(iter, sink, null_literals, None, dest_begin, dest_end, appending, |c| {
        core::str::from_utf8(c.data()).ok().map(|s| Some(s.to_string().into_boxed_str()))
    })
}

/// Parses a column as `DATETIME_AS_LONG` (nanoseconds since epoch).
#[allow(clippy::too_many_arguments)]
pub fn parse_datetime<S: Sink<i64> + ?Sized>(
    iter: &mut PeekableCellSource<'_>,
    sink: &mut S,
    null_literals: &[&[u8]],
    sentinel: Option<i64>,
    dest_begin: usize,
    dest_end: usize,
    appending: bool,
    zone_parser: Option<&dyn TimeZoneParser>,
) -> Result<ParseOutcome, CoreError> {
    try_parse_generic(iter, sink, null_literals, sentinel.as_ref(), dest_begin, dest_end, appending, |c| {
        try_parse_datetime(c, zone_parser)
    })
}

/// Parses a column as `TIMESTAMP_AS_LONG` at a given scale. The scale is
/// descriptive only at this layer: the tokenizer reads a raw epoch count
/// and performs no unit conversion (§4.5's "timestamp is a raw signed
/// integer epoch count").
#[allow(clippy::too_many_arguments)]
pub fn parse_timestamp<S: Sink<i64> + ?Sized>(
    iter: &mut PeekableCellSource<'_>,
    sink: &mut S,
    null_literals: &[&[u8]],
    sentinel: Option<i64>,
    dest_begin: usize,
    dest_end: usize,
    appending: bool,
) -> Result<ParseOutcome, CoreError> {
    try_parse_generic(iter, sink, null_literals, sentinel.as_ref(), dest_begin, dest_end, appending, |c| {
        try_parse_timestamp(c)
    })
}

/// Tagged-variant identity for every built-in parser, used to recognize a
/// parser by value (for the numeric ladder's precedence order and for
/// error diagnostics) while `tryParse` itself stays a concrete function
/// per type rather than a single dynamically-dispatched method — Rust has
/// no uniform way to erase `Sink<T>`'s `T` across the ladder without
/// losing the static typing the rest of the crate relies on.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum NumericParserKind {
    Byte,
    Short,
    Int,
    Long,
    FloatFast,
    FloatStrict,
    Double,
}

impl NumericParserKind {
    /// The full numeric/float precedence order of §4.7 step 4.
    pub const PRECEDENCE: [NumericParserKind; 7] = [
        NumericParserKind::Byte,
        NumericParserKind::Short,
        NumericParserKind::Int,
        NumericParserKind::Long,
        NumericParserKind::FloatFast,
        NumericParserKind::FloatStrict,
        NumericParserKind::Double,
    ];

    pub fn name(self) -> ParserName {
        match self {
            NumericParserKind::Byte => "byte",
            NumericParserKind::Short => "short",
            NumericParserKind::Int => "int",
            NumericParserKind::Long => "long",
            NumericParserKind::FloatFast => "float_fast",
            NumericParserKind::FloatStrict => "float_strict",
            NumericParserKind::Double => "double",
        }
    }

    pub fn data_type(self) -> DataType {
        match self {
            NumericParserKind::Byte => DataType::Byte,
            NumericParserKind::Short => DataType::Short,
            NumericParserKind::Int => DataType::Int,
            NumericParserKind::Long => DataType::Long,
            NumericParserKind::FloatFast | NumericParserKind::FloatStrict => DataType::Float,
            NumericParserKind::Double => DataType::Double,
        }
    }
}

/// Tagged identity for the non-numeric ladder of §4.7 step 5.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum NonNumericParserKind {
    Bool,
    Timestamp(TimestampScale),
    Datetime,
    Char,
    Custom(String),
    String,
}

impl NonNumericParserKind {
    pub fn name(&self) -> ParserName {
        match self {
            NonNumericParserKind::Bool => "bool",
            NonNumericParserKind::Timestamp(_) => "timestamp",
            NonNumericParserKind::Datetime => "datetime",
            NonNumericParserKind::Char => "char",
            NonNumericParserKind::Custom(_) => "custom",
            NonNumericParserKind::String => "string",
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            NonNumericParserKind::Bool => DataType::BooleanAsByte,
            NonNumericParserKind::Timestamp(scale) => DataType::TimestampAsLong(*scale),
            NonNumericParserKind::Datetime => DataType::DatetimeAsLong,
            NonNumericParserKind::Char => DataType::Char,
            NonNumericParserKind::Custom(name) => DataType::Custom(name.clone()),
            NonNumericParserKind::String => DataType::String,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::VecSink;
    use crate::storage::channel;
    use crate::tokenizer::StdDoubleParser;

    fn push_cells(writer: &mut crate::storage::DenseStorageWriter, cells: &[&[u8]]) {
        for c in cells {
            writer.append(ByteSlice::whole(c));
        }
    }

    #[test]
    fn parse_int_stops_at_first_bad_cell_leaving_it_unconsumed() {
        let (mut w, mut r) = channel(4);
        push_cells(&mut w, &[b"1", b"2", b"abc", b"4"]);
        w.finish();
        let mut iter = PeekableCellSource::new(&mut r);
        let mut sink = VecSink::<i32>::new();
        let outcome = parse_int(&mut iter, &mut sink, &[b""], None, 0, 4, true).unwrap();
        assert_eq!(outcome.dest_consumed, 2);
        assert!(!outcome.exhausted);
        // The failing cell must still be available to the next parser.
        assert_eq!(iter.peek().unwrap(), Some(b"abc".as_slice()));
    }

    #[test]
    fn parse_int_applies_null_literal() {
        let (mut w, mut r) = channel(4);
        push_cells(&mut w, &[b"1", b"", b"3"]);
        w.finish();
        let mut iter = PeekableCellSource::new(&mut r);
        let mut sink = VecSink::<i32>::new();
        let outcome = parse_int(&mut iter, &mut sink, &[b""], None, 0, 3, true).unwrap();
        assert_eq!(outcome.dest_consumed, 3);
        assert!(outcome.exhausted);
        let (values, nulls) = sink.into_parts();
        assert_eq!(values, vec![1, 0, 3]);
        assert_eq!(nulls, vec![false, true, false]);
    }

    #[test]
    fn float_strict_rejects_lossy_values_float_fast_accepts_them() {
        let (mut w, mut r) = channel(4);
        // 0.1 cannot be represented exactly in either f32 or f64, but the
        // round trip f32->f64 differs from the f64 parse, so strict must
        // reject while fast accepts it.
        push_cells(&mut w, &[b"0.1"]);
        w.finish();
        let parser = StdDoubleParser;
        let mut iter = PeekableCellSource::new(&mut r);
        let mut sink = VecSink::<f32>::new();
        let outcome = parse_float_strict(&mut iter, &mut sink, &[b""], None, 0, 1, true, &parser).unwrap();
        assert_eq!(outcome.dest_consumed, 0);

        let (mut w2, mut r2) = channel(4);
        push_cells(&mut w2, &[b"0.1"]);
        w2.finish();
        let mut iter2 = PeekableCellSource::new(&mut r2);
        let mut sink2 = VecSink::<f32>::new();
        let outcome2 = parse_float_fast(&mut iter2, &mut sink2, &[b""], None, 0, 1, true, &parser).unwrap();
        assert_eq!(outcome2.dest_consumed, 1);
    }

    #[test]
    fn sentinel_makes_matching_non_null_value_fail() {
        let (mut w, mut r) = channel(4);
        push_cells(&mut w, &[b"1", b"-1", b"3"]);
        w.finish();
        let mut iter = PeekableCellSource::new(&mut r);
        let mut sink = VecSink::<i32>::new();
        // -1 is reserved as the sentinel, so a literal "-1" cell must be
        // treated as an unparseable value, not silently accepted.
        let outcome = parse_int(&mut iter, &mut sink, &[b""], Some(-1), 0, 3, true).unwrap();
        assert_eq!(outcome.dest_consumed, 1);
    }

    #[test]
    fn parse_string_accepts_every_utf8_cell() {
        let (mut w, mut r) = channel(4);
        push_cells(&mut w, &["héllo".as_bytes(), b"world"]);
        w.finish();
        let mut iter = PeekableCellSource::new(&mut r);
        let mut sink = VecSink::<Option<Box<str>>>::new();
        let outcome = parse_string(&mut iter, &mut sink, &[b""], 0, 2, true).unwrap();
        assert_eq!(outcome.dest_consumed, 2);
        assert!(outcome.exhausted);
        let (values, _) = sink.into_parts();
        assert_eq!(values[0].as_deref(), Some("héllo"));
        assert_eq!(values[1].as_deref(), Some("world"));
    }
}
