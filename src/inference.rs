//! The two-phase type-inference engine, §4.7.
//!
//! Each column is driven by two independent [`PeekableCellSource`]s over
//! the same `DenseStorage` stream (§4.7.1): the first drives the
//! speculative ladder walk, the second is only touched when a second pass
//! over the column's prefix turns out to be necessary.

use crate::error::CoreError;
use crate::parser::{
    self, NonNumericParserKind, NumericParserKind, ParseOutcome, PeekableCellSource,
};
use crate::sink::{DataType, Sink, SinkFactory, SinkSource, Source, TimestampScale};
use crate::tokenizer::{
    try_parse_bool, try_parse_datetime, try_parse_double, try_parse_long, DoubleParser,
    TimeZoneParser,
};

/// Per-type reserved sentinel values, supplied by the caller through
/// whatever channel populates [`ParserUniverse`] (a real integration would
/// thread these from `ReaderConfig`'s per-column overrides; this core only
/// needs the flat set).
#[derive(Clone, Default)]
pub struct NumericSentinels {
    pub byte: Option<i8>,
    pub short: Option<i16>,
    pub int: Option<i32>,
    pub long: Option<i64>,
    pub float: Option<f32>,
    pub double: Option<f64>,
}

/// The effective parser universe for one column: which logical types are
/// in play and in what order the non-numeric ladder should try them,
/// per §4.7 steps 4-5.
#[derive(Clone)]
pub struct ParserUniverse {
    /// Numeric/float parsers to walk, already restricted to those enabled
    /// and kept in [`NumericParserKind::PRECEDENCE`] order.
    pub numeric: Vec<NumericParserKind>,
    pub bool_enabled: bool,
    pub char_enabled: bool,
    pub string_enabled: bool,
    pub datetime_enabled: bool,
    pub timestamp_scale: Option<TimestampScale>,
}

impl ParserUniverse {
    /// The full default universe: every built-in type, in catalog order,
    /// except `FloatFast`/`FloatStrict`. Both sit ahead of `Double` in
    /// [`NumericParserKind::PRECEDENCE`] and a plain decimal column like
    /// `2.5`/`4.0` round-trips losslessly through `f32`, so leaving them in
    /// by default would resolve such a column to Float instead of the
    /// expected Double. A caller that wants float columns opts in
    /// explicitly through its own `ParserConfig`.
    pub fn default_full() -> Self {
        ParserUniverse {
            numeric: NumericParserKind::PRECEDENCE
                .iter()
                .copied()
                .filter(|k| !matches!(k, NumericParserKind::FloatFast | NumericParserKind::FloatStrict))
                .collect(),
            bool_enabled: true,
            char_enabled: true,
            string_enabled: true,
            datetime_enabled: true,
            timestamp_scale: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.numeric.is_empty()
            && !self.bool_enabled
            && !self.char_enabled
            && !self.string_enabled
            && !self.datetime_enabled
            && self.timestamp_scale.is_none()
    }

    /// The single parser to use when the universe names exactly one type,
    /// per §4.7 step 2 ("single-parser set: skip inference").
    fn single(&self) -> Option<SingleParser> {
        let count = self.numeric.len()
            + self.bool_enabled as usize
            + self.char_enabled as usize
            + self.string_enabled as usize
            + self.datetime_enabled as usize
            + self.timestamp_scale.is_some() as usize;
        if count != 1 {
            return None;
        }
        if let Some(&k) = self.numeric.first() {
            return Some(SingleParser::Numeric(k));
        }
        if self.bool_enabled {
            return Some(SingleParser::Bool);
        }
        if self.char_enabled {
            return Some(SingleParser::Char);
        }
        if self.datetime_enabled {
            return Some(SingleParser::Datetime);
        }
        if let Some(scale) = self.timestamp_scale {
            return Some(SingleParser::Timestamp(scale));
        }
        Some(SingleParser::String)
    }
}

enum SingleParser {
    Numeric(NumericParserKind),
    Bool,
    Char,
    Datetime,
    Timestamp(TimestampScale),
    String,
}

/// The final, fully-populated backing column store, tagged by its chosen
/// [`DataType`].
pub enum ColumnSink {
    Bool(Box<dyn Sink<u8>>),
    Byte(Box<dyn SinkSource<i8>>),
    Short(Box<dyn SinkSource<i16>>),
    Int(Box<dyn SinkSource<i32>>),
    Long(Box<dyn SinkSource<i64>>),
    Float(Box<dyn Sink<f32>>),
    Double(Box<dyn Sink<f64>>),
    Char(Box<dyn Sink<u16>>),
    String(Box<dyn Sink<Option<Box<str>>>>),
    Datetime(Box<dyn Sink<i64>>),
    Timestamp(Box<dyn Sink<i64>>),
}

/// The result of inferring and fully parsing one column.
pub struct ColumnOutcome {
    pub data_type: DataType,
    pub rows: usize,
    pub sink: ColumnSink,
}

/// Environment threaded through every parser call: pluggable tokenizers
/// plus the sentinels/null literals that don't change across a column.
pub struct InferenceEnv<'a> {
    pub null_literals: Vec<&'a [u8]>,
    pub sentinels: NumericSentinels,
    pub bool_sentinel: Option<u8>,
    pub char_sentinel: Option<u16>,
    pub datetime_sentinel: Option<i64>,
    pub timestamp_sentinel: Option<i64>,
    pub double_parser: &'a dyn DoubleParser,
    pub zone_parser: Option<&'a dyn TimeZoneParser>,
    pub sink_factory: &'a dyn SinkFactory,
}

/// Infers and fully parses one column, given two independent readers over
/// the same `DenseStorage` stream.
pub fn infer_column(
    iter1: &mut PeekableCellSource<'_>,
    iter2: &mut PeekableCellSource<'_>,
    column: usize,
    universe: &ParserUniverse,
    env: &InferenceEnv<'_>,
) -> Result<ColumnOutcome, CoreError> {
    if universe.is_empty() {
        return Err(CoreError::ConfigError { reason: "no parser configured for column".to_string() });
    }

    // Step 1/3: scan ahead for emptiness / an all-null prefix, on a forked
    // reader so `iter1` itself is left untouched -- the real ladder below
    // still needs to see every leading null cell in order to record it,
    // not just skip past it.
    let (null_prefix_count, first_non_null) = scan_null_prefix(iter1, &env.null_literals)?;
    if first_non_null.is_none() {
        return empty_or_all_null_parse(null_prefix_count, column, universe, env);
    }
    let first_cell = first_non_null.unwrap();

    // Step 2: a singleton universe always runs a single-pass parse over
    // the whole stream; it must consume everything or the column fails.
    if let Some(single) = universe.single() {
        return run_single(single, iter1, column, env);
    }

    // Step 4: numeric fast path.
    if !universe.numeric.is_empty() && try_parse_double(crate::byte_slice::ByteSlice::whole(&first_cell), env.double_parser).is_some() {
        if let Some(outcome) = try_numeric_branch(iter1, iter2, column, universe, env)? {
            return Ok(outcome);
        }
        // Numeric ladder never reached end-of-input; fall through to the
        // non-numeric branch only if it has something to offer.
    }

    // Step 5: non-numeric inference.
    run_non_numeric_branch(iter1, iter2, column, universe, env, Some(&first_cell))
}

/// Scans a forked (throwaway) copy of `iter1`'s cursor, skipping configured
/// null literals, until a non-null cell is found or the stream ends.
/// Returns the count of leading null cells and, if found, the first
/// non-null cell's bytes. Since the scan runs on a fork, `iter1` itself
/// never advances past anything.
fn scan_null_prefix(
    iter1: &PeekableCellSource<'_>,
    null_literals: &[&[u8]],
) -> Result<(usize, Option<Vec<u8>>), CoreError> {
    let mut forked = iter1.fork();
    let mut scratch = PeekableCellSource::new(&mut forked);
    let mut count = 0usize;
    loop {
        match scratch.advance()? {
            None => return Ok((count, None)),
            Some(cell) => {
                if null_literals.iter().any(|lit| *lit == cell.as_slice()) {
                    count += 1;
                    continue;
                }
                return Ok((count, Some(cell)));
            }
        }
    }
}

/// Builds the "null parser" sink directly, padding it with `null_count`
/// null entries with no tokenization pass at all -- used both for a
/// genuinely empty column (`null_count == 0`) and an all-null one.
fn empty_or_all_null_parse(
    null_count: usize,
    column: usize,
    universe: &ParserUniverse,
    env: &InferenceEnv<'_>,
) -> Result<ColumnOutcome, CoreError> {
    // Prefer the narrowest/first-declared type as the "null parser",
    // falling back through the universe in declaration order.
    let kind = universe
        .numeric
        .first()
        .copied()
        .map(SingleParser::Numeric)
        .or(universe.bool_enabled.then_some(SingleParser::Bool))
        .or(universe.datetime_enabled.then_some(SingleParser::Datetime))
        .or(universe.timestamp_scale.map(SingleParser::Timestamp))
        .or(universe.char_enabled.then_some(SingleParser::Char))
        .or(universe.string_enabled.then_some(SingleParser::String))
        .ok_or_else(|| CoreError::ConfigError { reason: "no null parser configured for empty column".to_string() })?;

    match kind {
        SingleParser::Numeric(numeric_kind) => fill_numeric_null(numeric_kind, null_count, column, env),
        SingleParser::Bool => {
            let mut sink = env.sink_factory.make_bool_sink(column, env.bool_sentinel);
            if null_count > 0 {
                sink.write(0, &vec![0u8; null_count], &vec![true; null_count], true);
            }
            Ok(ColumnOutcome { data_type: DataType::BooleanAsByte, rows: null_count, sink: ColumnSink::Bool(sink) })
        }
        SingleParser::Char => {
            let mut sink = env.sink_factory.make_char_sink(column, env.char_sentinel);
            if null_count > 0 {
                sink.write(0, &vec![0u16; null_count], &vec![true; null_count], true);
            }
            Ok(ColumnOutcome { data_type: DataType::Char, rows: null_count, sink: ColumnSink::Char(sink) })
        }
        SingleParser::Datetime => {
            let mut sink = env.sink_factory.make_datetime_sink(column, env.datetime_sentinel);
            if null_count > 0 {
                sink.write(0, &vec![0i64; null_count], &vec![true; null_count], true);
            }
            Ok(ColumnOutcome { data_type: DataType::DatetimeAsLong, rows: null_count, sink: ColumnSink::Datetime(sink) })
        }
        SingleParser::Timestamp(scale) => {
            let mut sink = env.sink_factory.make_timestamp_sink(column, scale, env.timestamp_sentinel);
            if null_count > 0 {
                sink.write(0, &vec![0i64; null_count], &vec![true; null_count], true);
            }
            Ok(ColumnOutcome { data_type: DataType::TimestampAsLong(scale), rows: null_count, sink: ColumnSink::Timestamp(sink) })
        }
        SingleParser::String => {
            let mut sink = env.sink_factory.make_string_sink(column);
            if null_count > 0 {
                let values: Vec<Option<Box<str>>> = vec![None; null_count];
                sink.write(0, &values, &vec![true; null_count], true);
            }
            Ok(ColumnOutcome { data_type: DataType::String, rows: null_count, sink: ColumnSink::String(sink) })
        }
    }
}

fn fill_numeric_null(
    kind: NumericParserKind,
    null_count: usize,
    column: usize,
    env: &InferenceEnv<'_>,
) -> Result<ColumnOutcome, CoreError> {
    macro_rules! fill {
        ($sink_ctor:expr, $handle:ident, $data_type:expr, $default:expr) => {{
            let mut sink = $sink_ctor;
            if null_count > 0 {
                sink.write(0, &vec![$default; null_count], &vec![true; null_count], true);
            }
            Ok(ColumnOutcome {
                data_type: $data_type,
                rows: null_count,
                sink: numeric_sink_into_column_sink(NumericSinkHandle::$handle(sink)),
            })
        }};
    }
    match kind {
        NumericParserKind::Byte => fill!(env.sink_factory.make_byte_sink(column, env.sentinels.byte), Byte, DataType::Byte, 0i8),
        NumericParserKind::Short => fill!(env.sink_factory.make_short_sink(column, env.sentinels.short), Short, DataType::Short, 0i16),
        NumericParserKind::Int => fill!(env.sink_factory.make_int_sink(column, env.sentinels.int), Int, DataType::Int, 0i32),
        NumericParserKind::Long => fill!(env.sink_factory.make_long_sink(column, env.sentinels.long), Long, DataType::Long, 0i64),
        NumericParserKind::FloatFast => {
            fill!(env.sink_factory.make_float_sink(column, env.sentinels.float), FloatFast, DataType::Float, 0f32)
        }
        NumericParserKind::FloatStrict => {
            fill!(env.sink_factory.make_float_sink(column, env.sentinels.float), FloatStrict, DataType::Float, 0f32)
        }
        NumericParserKind::Double => {
            fill!(env.sink_factory.make_double_sink(column, env.sentinels.double), Double, DataType::Double, 0f64)
        }
    }
}

/// Runs a single parser type over the whole remaining stream (used for
/// singleton universes and for all-null/empty columns).
fn run_single(
    kind: SingleParser,
    iter: &mut PeekableCellSource<'_>,
    column: usize,
    env: &InferenceEnv<'_>,
) -> Result<ColumnOutcome, CoreError> {
    macro_rules! run {
        ($sink_ctor:expr, $parse:expr, $variant:ident, $data_type:expr) => {{
            let mut sink = $sink_ctor;
            let outcome = $parse(iter, sink.as_mut())?;
            if !outcome.exhausted {
                return Err(CoreError::ParseFailure {
                    column,
                    parser: kind_name(&kind),
                    cell_index: outcome.dest_consumed as u64,
                });
            }
            Ok(ColumnOutcome { data_type: $data_type, rows: outcome.dest_consumed, sink: ColumnSink::$variant(sink) })
        }};
    }

    match kind {
        SingleParser::Numeric(k) => run_single_numeric(k, iter, column, env),
        SingleParser::Bool => run!(
            env.sink_factory.make_bool_sink(column, env.bool_sentinel),
            |it: &mut PeekableCellSource<'_>, s: &mut dyn Sink<u8>| parser::parse_bool(
                it, s, &env.null_literals, env.bool_sentinel, 0, usize::MAX, true
            ),
            Bool,
            DataType::BooleanAsByte
        ),
        SingleParser::Char => run!(
            env.sink_factory.make_char_sink(column, env.char_sentinel),
            |it: &mut PeekableCellSource<'_>, s: &mut dyn Sink<u16>| parser::parse_char(
                it, s, &env.null_literals, env.char_sentinel, 0, usize::MAX, true
            ),
            Char,
            DataType::Char
        ),
        SingleParser::Datetime => run!(
            env.sink_factory.make_datetime_sink(column, env.datetime_sentinel),
            |it: &mut PeekableCellSource<'_>, s: &mut dyn Sink<i64>| parser::parse_datetime(
                it, s, &env.null_literals, env.datetime_sentinel, 0, usize::MAX, true, env.zone_parser
            ),
            Datetime,
            DataType::DatetimeAsLong
        ),
        SingleParser::Timestamp(scale) => run!(
            env.sink_factory.make_timestamp_sink(column, scale, env.timestamp_sentinel),
            |it: &mut PeekableCellSource<'_>, s: &mut dyn Sink<i64>| parser::parse_timestamp(
                it, s, &env.null_literals, env.timestamp_sentinel, 0, usize::MAX, true
            ),
            Timestamp,
            DataType::TimestampAsLong(scale)
        ),
        SingleParser::String => run!(
            env.sink_factory.make_string_sink(column),
            |it: &mut PeekableCellSource<'_>, s: &mut dyn Sink<Option<Box<str>>>| parser::parse_string(
                it, s, &env.null_literals, 0, usize::MAX, true
            ),
            String,
            DataType::String
        ),
    }
}

fn kind_name(kind: &SingleParser) -> &'static str {
    match kind {
        SingleParser::Numeric(k) => k.name(),
        SingleParser::Bool => "bool",
        SingleParser::Char => "char",
        SingleParser::Datetime => "datetime",
        SingleParser::Timestamp(_) => "timestamp",
        SingleParser::String => "string",
    }
}

fn run_single_numeric(
    kind: NumericParserKind,
    iter: &mut PeekableCellSource<'_>,
    column: usize,
    env: &InferenceEnv<'_>,
) -> Result<ColumnOutcome, CoreError> {
    let (sink, outcome, data_type) = run_one_numeric_attempt(kind, iter, 0, column, env)?;
    if !outcome.exhausted {
        return Err(CoreError::ParseFailure { column, parser: kind.name(), cell_index: outcome.dest_consumed as u64 });
    }
    Ok(ColumnOutcome { data_type, rows: outcome.dest_consumed, sink: numeric_sink_into_column_sink(sink) })
}

/// One concrete sink for one numeric ladder position, kept alive across
/// the ladder walk so later unification/reparse can still reach it.
enum NumericSinkHandle {
    Byte(Box<dyn SinkSource<i8>>),
    Short(Box<dyn SinkSource<i16>>),
    Int(Box<dyn SinkSource<i32>>),
    Long(Box<dyn SinkSource<i64>>),
    FloatFast(Box<dyn Sink<f32>>),
    FloatStrict(Box<dyn Sink<f32>>),
    Double(Box<dyn Sink<f64>>),
}

fn numeric_sink_into_column_sink(sink: NumericSinkHandle) -> ColumnSink {
    match sink {
        NumericSinkHandle::Byte(s) => ColumnSink::Byte(s),
        NumericSinkHandle::Short(s) => ColumnSink::Short(s),
        NumericSinkHandle::Int(s) => ColumnSink::Int(s),
        NumericSinkHandle::Long(s) => ColumnSink::Long(s),
        NumericSinkHandle::FloatFast(s) | NumericSinkHandle::FloatStrict(s) => ColumnSink::Float(s),
        NumericSinkHandle::Double(s) => ColumnSink::Double(s),
    }
}

fn run_one_numeric_attempt(
    kind: NumericParserKind,
    iter: &mut PeekableCellSource<'_>,
    dest_begin: usize,
    column: usize,
    env: &InferenceEnv<'_>,
) -> Result<(NumericSinkHandle, ParseOutcome, DataType), CoreError> {
    let appending = dest_begin == 0;
    let nl = &env.null_literals;
    Ok(match kind {
        NumericParserKind::Byte => {
            let mut sink = env.sink_factory.make_byte_sink(column, env.sentinels.byte);
            let outcome = parser::parse_byte(iter, sink.as_mut(), nl, env.sentinels.byte, dest_begin, usize::MAX, appending)?;
            (NumericSinkHandle::Byte(sink), outcome, DataType::Byte)
        }
        NumericParserKind::Short => {
            let mut sink = env.sink_factory.make_short_sink(column, env.sentinels.short);
            let outcome = parser::parse_short(iter, sink.as_mut(), nl, env.sentinels.short, dest_begin, usize::MAX, appending)?;
            (NumericSinkHandle::Short(sink), outcome, DataType::Short)
        }
        NumericParserKind::Int => {
            let mut sink = env.sink_factory.make_int_sink(column, env.sentinels.int);
            let outcome = parser::parse_int(iter, sink.as_mut(), nl, env.sentinels.int, dest_begin, usize::MAX, appending)?;
            (NumericSinkHandle::Int(sink), outcome, DataType::Int)
        }
        NumericParserKind::Long => {
            let mut sink = env.sink_factory.make_long_sink(column, env.sentinels.long);
            let outcome = parser::parse_long(iter, sink.as_mut(), nl, env.sentinels.long, dest_begin, usize::MAX, appending)?;
            (NumericSinkHandle::Long(sink), outcome, DataType::Long)
        }
        NumericParserKind::FloatFast => {
            let mut sink = env.sink_factory.make_float_sink(column, env.sentinels.float);
            let outcome =
                parser::parse_float_fast(iter, sink.as_mut(), nl, env.sentinels.float, dest_begin, usize::MAX, appending, env.double_parser)?;
            (NumericSinkHandle::FloatFast(sink), outcome, DataType::Float)
        }
        NumericParserKind::FloatStrict => {
            let mut sink = env.sink_factory.make_float_sink(column, env.sentinels.float);
            let outcome = parser::parse_float_strict(
                iter, sink.as_mut(), nl, env.sentinels.float, dest_begin, usize::MAX, appending, env.double_parser,
            )?;
            (NumericSinkHandle::FloatStrict(sink), outcome, DataType::Float)
        }
        NumericParserKind::Double => {
            let mut sink = env.sink_factory.make_double_sink(column, env.sentinels.double);
            let outcome =
                parser::parse_double(iter, sink.as_mut(), nl, env.sentinels.double, dest_begin, usize::MAX, appending, env.double_parser)?;
            (NumericSinkHandle::Double(sink), outcome, DataType::Double)
        }
    })
}

struct NumericAttempt {
    kind: NumericParserKind,
    begin: usize,
    end: usize,
    sink: NumericSinkHandle,
}

/// Walks the numeric ladder to completion. Returns `Ok(Some(outcome))` if
/// some parser consumed to end-of-input; `Ok(None)` if the universe was
/// exhausted without reaching the end (the caller should fall back to the
/// non-numeric branch, if one exists).
fn try_numeric_branch(
    iter1: &mut PeekableCellSource<'_>,
    iter2: &mut PeekableCellSource<'_>,
    column: usize,
    universe: &ParserUniverse,
    env: &InferenceEnv<'_>,
) -> Result<Option<ColumnOutcome>, CoreError> {
    let mut attempts: Vec<NumericAttempt> = Vec::new();
    let mut pos = 0usize;
    let mut exhausted = false;

    for &kind in &universe.numeric {
        let (sink, outcome, _data_type) = run_one_numeric_attempt(kind, iter1, pos, column, env)?;
        let end = outcome.dest_consumed;
        exhausted = outcome.exhausted;
        attempts.push(NumericAttempt { kind, begin: pos, end, sink });
        pos = end;
        if exhausted {
            break;
        }
    }

    if !exhausted {
        return Ok(None);
    }

    let winner_idx = attempts.len() - 1;
    let winner_kind = attempts[winner_idx].kind;
    let winner_begin = attempts[winner_idx].begin;

    if matches!(winner_kind, NumericParserKind::Byte | NumericParserKind::Short | NumericParserKind::Int | NumericParserKind::Long) {
        log::debug!("column {column} widening via unification into {}", winner_kind.name());
        unify_numeric(&mut attempts, winner_idx)?;
    } else if winner_begin > 0 {
        log::debug!("column {column} widening via reparse into {} (prefix already consumed by narrower attempts)", winner_kind.name());
        reparse_numeric_prefix(iter2, &mut attempts[winner_idx], column, env)?;
    }

    let rows = attempts[winner_idx].end;
    let data_type = winner_kind.data_type();
    let sink = attempts.pop().unwrap().sink;
    Ok(Some(ColumnOutcome { data_type, rows, sink: numeric_sink_into_column_sink(sink) }))
}

/// Fills `[0, winner.begin)` of the winning sink by copying every earlier
/// attempt's already-typed values through its `Source` read-back, widened
/// with a lossless numeric conversion. No re-tokenization occurs.
fn unify_numeric(attempts: &mut [NumericAttempt], winner_idx: usize) -> Result<(), CoreError> {
    let (priors, rest) = attempts.split_at_mut(winner_idx);
    let winner = &mut rest[0];
    for prior in priors.iter() {
        widen_copy_into(prior, winner);
    }
    Ok(())
}

fn widen_copy_into(prior: &NumericAttempt, winner: &mut NumericAttempt) {
    match (&prior.sink, &mut winner.sink) {
        (NumericSinkHandle::Byte(s), NumericSinkHandle::Short(w)) => copy_widen(s.as_ref(), w.as_mut(), prior.begin, prior.end),
        (NumericSinkHandle::Byte(s), NumericSinkHandle::Int(w)) => copy_widen(s.as_ref(), w.as_mut(), prior.begin, prior.end),
        (NumericSinkHandle::Byte(s), NumericSinkHandle::Long(w)) => copy_widen(s.as_ref(), w.as_mut(), prior.begin, prior.end),
        (NumericSinkHandle::Short(s), NumericSinkHandle::Int(w)) => copy_widen(s.as_ref(), w.as_mut(), prior.begin, prior.end),
        (NumericSinkHandle::Short(s), NumericSinkHandle::Long(w)) => copy_widen(s.as_ref(), w.as_mut(), prior.begin, prior.end),
        (NumericSinkHandle::Int(s), NumericSinkHandle::Long(w)) => copy_widen(s.as_ref(), w.as_mut(), prior.begin, prior.end),
        _ => unreachable!("numeric ladder precedence only ever widens in increasing integral order"),
    }
}

fn copy_widen<From, To>(src: &dyn Source<From>, dst: &mut dyn Sink<To>, begin: usize, end: usize)
where
    From: Copy + Into<To>,
    To: Clone + Default + PartialEq,
{
    let mut values = Vec::new();
    let mut nulls = Vec::new();
    src.read_into(begin, end, &mut values, &mut nulls);
    let widened: Vec<To> = values.into_iter().map(Into::into).collect();
    dst.write(begin, &widened, &nulls, false);
}

/// Re-runs the winning float/double parser over `[0, winner.begin)` using
/// the reserved second iterator, since float/double sinks need not
/// implement `Source`. Fails with [`CoreError::Unification`] if the
/// second-phase exit position doesn't land exactly back on `winner.begin`.
fn reparse_numeric_prefix(
    iter2: &mut PeekableCellSource<'_>,
    winner: &mut NumericAttempt,
    column: usize,
    env: &InferenceEnv<'_>,
) -> Result<(), CoreError> {
    let begin = winner.begin;
    let outcome = match &mut winner.sink {
        NumericSinkHandle::FloatFast(s) => parser::parse_float_fast(
            iter2, s.as_mut(), &env.null_literals, env.sentinels.float, 0, begin, true, env.double_parser,
        )?,
        NumericSinkHandle::FloatStrict(s) => parser::parse_float_strict(
            iter2, s.as_mut(), &env.null_literals, env.sentinels.float, 0, begin, true, env.double_parser,
        )?,
        NumericSinkHandle::Double(s) => {
            parser::parse_double(iter2, s.as_mut(), &env.null_literals, env.sentinels.double, 0, begin, true, env.double_parser)?
        }
        _ => unreachable!("reparse only ever needed for float/double winners"),
    };
    if outcome.dest_consumed != begin {
        return Err(CoreError::Unification { column, expected: begin as u64, actual: outcome.dest_consumed as u64 });
    }
    Ok(())
}

enum NonNumericSinkHandle {
    Bool(Box<dyn Sink<u8>>),
    Timestamp(Box<dyn Sink<i64>>),
    Datetime(Box<dyn Sink<i64>>),
    Char(Box<dyn Sink<u16>>),
    String(Box<dyn Sink<Option<Box<str>>>>),
}

struct NonNumericAttempt {
    kind: NonNumericParserKind,
    begin: usize,
    end: usize,
    sink: NonNumericSinkHandle,
}

fn non_numeric_sequence(universe: &ParserUniverse, first_cell: Option<&[u8]>, env: &InferenceEnv<'_>) -> Vec<NonNumericParserKind> {
    let mut seq = Vec::new();
    if let Some(cell) = first_cell {
        let slice = crate::byte_slice::ByteSlice::whole(cell);
        if let Some(scale) = universe.timestamp_scale {
            if try_parse_long(slice).is_some() {
                seq.push(NonNumericParserKind::Timestamp(scale));
            }
        } else if universe.bool_enabled && try_parse_bool(slice).is_some() {
            seq.push(NonNumericParserKind::Bool);
        } else if universe.datetime_enabled && try_parse_datetime(slice, env.zone_parser).is_some() {
            seq.push(NonNumericParserKind::Datetime);
        }
    }
    if universe.char_enabled && !seq.contains(&NonNumericParserKind::Char) {
        seq.push(NonNumericParserKind::Char);
    }
    if universe.string_enabled {
        seq.push(NonNumericParserKind::String);
    }
    seq
}

fn run_non_numeric_branch(
    iter1: &mut PeekableCellSource<'_>,
    iter2: &mut PeekableCellSource<'_>,
    column: usize,
    universe: &ParserUniverse,
    env: &InferenceEnv<'_>,
    first_cell: Option<&[u8]>,
) -> Result<ColumnOutcome, CoreError> {
    let sequence = non_numeric_sequence(universe, first_cell, env);
    if sequence.is_empty() {
        return Err(CoreError::ConfigError { reason: "no parser in the universe can consume this column".to_string() });
    }

    let mut attempts: Vec<NonNumericAttempt> = Vec::new();
    let mut pos = 0usize;
    let mut exhausted = false;

    for kind in &sequence {
        let (sink, outcome) = run_one_non_numeric_attempt(kind, iter1, pos, column, env)?;
        let end = outcome.dest_consumed;
        exhausted = outcome.exhausted;
        attempts.push(NonNumericAttempt { kind: kind.clone(), begin: pos, end, sink });
        pos = end;
        if exhausted {
            break;
        }
    }

    if !exhausted {
        let last = attempts.last().expect("sequence is non-empty");
        return Err(CoreError::ParseFailure { column, parser: last.kind.name(), cell_index: last.end as u64 });
    }

    let winner_idx = attempts.len() - 1;
    if attempts[winner_idx].begin > 0 {
        log::debug!("column {column} falling back to {} after an earlier non-numeric attempt failed partway through", attempts[winner_idx].kind.name());
        reparse_non_numeric_prefix(iter2, &mut attempts[winner_idx], column, env)?;
    }

    let winner = attempts.pop().unwrap();
    let data_type = winner.kind.data_type();
    let rows = winner.end;
    Ok(ColumnOutcome { data_type, rows, sink: non_numeric_sink_into_column_sink(winner.sink) })
}

fn non_numeric_sink_into_column_sink(sink: NonNumericSinkHandle) -> ColumnSink {
    match sink {
        NonNumericSinkHandle::Bool(s) => ColumnSink::Bool(s),
        NonNumericSinkHandle::Timestamp(s) => ColumnSink::Timestamp(s),
        NonNumericSinkHandle::Datetime(s) => ColumnSink::Datetime(s),
        NonNumericSinkHandle::Char(s) => ColumnSink::Char(s),
        NonNumericSinkHandle::String(s) => ColumnSink::String(s),
    }
}

fn run_one_non_numeric_attempt(
    kind: &NonNumericParserKind,
    iter: &mut PeekableCellSource<'_>,
    dest_begin: usize,
    column: usize,
    env: &InferenceEnv<'_>,
) -> Result<(NonNumericSinkHandle, ParseOutcome), CoreError> {
    let appending = dest_begin == 0;
    let nl = &env.null_literals;
    Ok(match kind {
        NonNumericParserKind::Bool => {
            let mut sink = env.sink_factory.make_bool_sink(column, env.bool_sentinel);
            let outcome = parser::parse_bool(iter, sink.as_mut(), nl, env.bool_sentinel, dest_begin, usize::MAX, appending)?;
            (NonNumericSinkHandle::Bool(sink), outcome)
        }
        NonNumericParserKind::Timestamp(scale) => {
            let mut sink = env.sink_factory.make_timestamp_sink(column, *scale, env.timestamp_sentinel);
            let outcome = parser::parse_timestamp(iter, sink.as_mut(), nl, env.timestamp_sentinel, dest_begin, usize::MAX, appending)?;
            (NonNumericSinkHandle::Timestamp(sink), outcome)
        }
        NonNumericParserKind::Datetime => {
            let mut sink = env.sink_factory.make_datetime_sink(column, env.datetime_sentinel);
            let outcome = parser::parse_datetime(
                iter, sink.as_mut(), nl, env.datetime_sentinel, dest_begin, usize::MAX, appending, env.zone_parser,
            )?;
            (NonNumericSinkHandle::Datetime(sink), outcome)
        }
        NonNumericParserKind::Char => {
            let mut sink = env.sink_factory.make_char_sink(column, env.char_sentinel);
            let outcome = parser::parse_char(iter, sink.as_mut(), nl, env.char_sentinel, dest_begin, usize::MAX, appending)?;
            (NonNumericSinkHandle::Char(sink), outcome)
        }
        NonNumericParserKind::String => {
            let mut sink = env.sink_factory.make_string_sink(column);
            let outcome = parser::parse_string(iter, sink.as_mut(), nl, dest_begin, usize::MAX, appending)?;
            (NonNumericSinkHandle::String(sink), outcome)
        }
        NonNumericParserKind::Custom(name) => {
            return Err(CoreError::ConfigError { reason: format!("custom parser \"{name}\" is not wired into the default universe") });
        }
    })
}

fn reparse_non_numeric_prefix(
    iter2: &mut PeekableCellSource<'_>,
    winner: &mut NonNumericAttempt,
    column: usize,
    env: &InferenceEnv<'_>,
) -> Result<(), CoreError> {
    let begin = winner.begin;
    let nl = &env.null_literals;
    let outcome = match &mut winner.sink {
        NonNumericSinkHandle::Bool(s) => parser::parse_bool(iter2, s.as_mut(), nl, env.bool_sentinel, 0, begin, true)?,
        NonNumericSinkHandle::Timestamp(s) => parser::parse_timestamp(iter2, s.as_mut(), nl, env.timestamp_sentinel, 0, begin, true)?,
        NonNumericSinkHandle::Datetime(s) => {
            parser::parse_datetime(iter2, s.as_mut(), nl, env.datetime_sentinel, 0, begin, true, env.zone_parser)?
        }
        NonNumericSinkHandle::Char(s) => parser::parse_char(iter2, s.as_mut(), nl, env.char_sentinel, 0, begin, true)?,
        NonNumericSinkHandle::String(s) => parser::parse_string(iter2, s.as_mut(), nl, 0, begin, true)?,
    };
    if outcome.dest_consumed != begin {
        return Err(CoreError::Unification { column, expected: begin as u64, actual: outcome.dest_consumed as u64 });
    }
    Ok(())
}
