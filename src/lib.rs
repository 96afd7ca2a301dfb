//! A dense, columnar CSV/fixed-width reader built around the DenseStorage
//! pipeline: a [`grabber`] tokenizes delimited or fixed-width cells, a
//! [`framing`] coordinator resolves the header and fans rows out to one
//! [`storage`] channel per column, and [`inference`] drives each column's
//! two-phase type ladder independently. [`read`] ties the four stages
//! together into the crate's single entry point.
//!
//! # Example
//!
//! ```
//! use densecsv::{read, ReadOptions};
//! use densecsv::config::ReaderConfig;
//! use densecsv::sink::VecSinkFactory;
//! use densecsv::tokenizer::StdDoubleParser;
//!
//! let buf = b"id,name\n1,alice\n2,bob\n";
//! let config = ReaderConfig::default();
//! let sink_factory = VecSinkFactory;
//! let double_parser = StdDoubleParser;
//! let opts = ReadOptions::new(&config, &sink_factory, &double_parser);
//! let result = read(buf, &opts).unwrap();
//! assert_eq!(result.rows, 2);
//! assert_eq!(result.columns[0].name, "id");
//! ```

pub mod byte_slice;
pub mod config;
pub mod error;
pub mod framing;
pub mod grabber;
pub mod inference;
pub mod parser;
pub mod sink;
pub mod storage;
pub mod tokenizer;

use std::thread;

use error::{ColumnError, CoreError};
use framing::{HeaderLegalizer, HeaderValidator};
use inference::{ColumnOutcome, ColumnSink, InferenceEnv, NumericSentinels, ParserUniverse};
use parser::PeekableCellSource;
use sink::{DataType, SinkFactory};
use storage::DenseStorageReader;
use tokenizer::{DoubleParser, StdDoubleParser, TimeZoneParser};

/// Per-column sentinel values, grouped for [`ParserConfig::sentinels`]'s
/// single return value rather than threading five separate `Option`s
/// through the call.
#[derive(Clone, Default)]
pub struct ColumnSentinels {
    pub numeric: NumericSentinels,
    pub bool_sentinel: Option<u8>,
    pub char_sentinel: Option<u16>,
    pub datetime_sentinel: Option<i64>,
    pub timestamp_sentinel: Option<i64>,
}

/// Caller-assembled per-column parser selection, mirroring [`SinkFactory`]'s
/// shape: §6.2's `parsers`/`parser_for_name`/`parser_for_index`/`null_parser`
/// are deliberately not `ReaderConfig` fields (see `config`'s module doc), so
/// this is where a caller wanting a non-default universe or sentinel set
/// plugs it in. May be called concurrently when `concurrent=true`.
pub trait ParserConfig: Send + Sync {
    /// The set of parsers to walk for column `column` (0-based), named
    /// `name` after header resolution.
    fn universe(&self, column: usize, name: &str) -> ParserUniverse;

    /// The reserved sentinel values for column `column`.
    fn sentinels(&self, column: usize, name: &str) -> ColumnSentinels {
        let _ = (column, name);
        ColumnSentinels::default()
    }
}

/// The default [`ParserConfig`]: every built-in type enabled, in catalog
/// order, no reserved sentinels.
#[derive(Default)]
pub struct DefaultParserConfig;

impl ParserConfig for DefaultParserConfig {
    fn universe(&self, _column: usize, _name: &str) -> ParserUniverse {
        ParserUniverse::default_full()
    }
}

/// Everything [`read`] needs beyond the input bytes and [`config::ReaderConfig`]:
/// the caller-supplied factories, pluggable tokenizers, and header hooks of
/// §6.2/§6.3.
pub struct ReadOptions<'a> {
    pub config: &'a config::ReaderConfig,
    pub sink_factory: &'a dyn SinkFactory,
    pub double_parser: &'a dyn DoubleParser,
    pub parser_config: &'a dyn ParserConfig,
    pub zone_parser: Option<&'a dyn TimeZoneParser>,
    pub header_legalizer: Option<HeaderLegalizer<'a>>,
    pub header_validator: Option<HeaderValidator<'a>>,
}

impl<'a> ReadOptions<'a> {
    /// The common case: default parser universe and sentinels, no header
    /// legalization/validation, the standard double parser, no zone parser.
    pub fn new(config: &'a config::ReaderConfig, sink_factory: &'a dyn SinkFactory, double_parser: &'a dyn DoubleParser) -> Self {
        ReadOptions {
            config,
            sink_factory,
            double_parser,
            parser_config: &DefaultParserConfig,
            zone_parser: None,
            header_legalizer: None,
            header_validator: None,
        }
    }
}

/// One column's resolved identity and fully-parsed backing store, per §6.4.
pub struct ColumnResult {
    /// The column's name, after legalization/validation.
    pub name: String,
    /// The chosen logical type.
    pub data_type: DataType,
    /// The caller's underlying column object, obtained from the chosen
    /// Sink/Source pair.
    pub sink: ColumnSink,
}

/// The outcome of a complete [`read`] call.
pub struct ReadResult {
    /// The final data row count.
    pub rows: u64,
    /// One entry per column, in input order.
    pub columns: Vec<ColumnResult>,
}

/// Errors [`read`] can return.
///
/// `Framing` covers failures with no single owning column (bad
/// configuration, an unresolvable header, a malformed row); `Column` wraps a
/// failure inside one column's grabbing/parsing/inference, tagged with that
/// column's index and resolved name per §7's propagation policy.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error(transparent)]
    Framing(#[from] CoreError),
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// Reads `buf` per `opts.config`, returning the row count and one typed,
/// caller-owned column per resolved header name.
///
/// Drives §5's two execution models: when `config.concurrent` is set, the
/// framing coordinator and every column's inference run as sibling tasks
/// (one thread each) exchanging cells through `storage::channel`'s bounded
/// backpressure; otherwise the coordinator still runs to completion first
/// (the whole input is already materialized in `buf`, so there is no
/// streaming refill for a disabled semaphore to gate), and every column is
/// then inferred in turn on the calling thread.
pub fn read(buf: &[u8], opts: &ReadOptions<'_>) -> Result<ReadResult, ReadError> {
    opts.config.validate()?;
    let header = framing::resolve_header(buf, opts.config, opts.header_legalizer, opts.header_validator)?;
    let column_count = header.column_count();

    let max_unobserved = if opts.config.concurrent {
        storage::DEFAULT_MAX_UNOBSERVED_PAGES
    } else {
        // Single-threaded mode never blocks on backpressure (§5): the
        // coordinator always finishes every writer before any reader is
        // touched, so the bound is immaterial as long as it's non-zero.
        usize::MAX
    };

    let mut writers = Vec::with_capacity(column_count);
    let mut first_readers = Vec::with_capacity(column_count);
    let mut second_readers = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        let (writer, reader) = storage::channel(max_unobserved);
        let reader2 = reader.clone();
        writers.push(writer);
        first_readers.push(reader);
        second_readers.push(reader2);
    }

    let (rows, outcomes) = if opts.config.concurrent {
        read_concurrent(buf, &header, opts, writers, first_readers, second_readers)?
    } else {
        read_sequential(buf, &header, opts, writers, first_readers, second_readers)?
    };

    let columns = header
        .names
        .into_iter()
        .zip(outcomes.into_iter())
        .map(|(name, outcome)| ColumnResult { name, data_type: outcome.data_type, sink: outcome.sink })
        .collect();

    Ok(ReadResult { rows, columns })
}

/// The subset of [`ReadOptions`] a column's inference needs, minus the
/// header hooks (`header_legalizer`/`header_validator` only run during
/// header resolution, and aren't required to be `Sync`, so they're kept out
/// of what gets shared across the per-column threads of
/// [`read_concurrent`]).
#[derive(Clone, Copy)]
struct ColumnEnvSources<'a> {
    config: &'a config::ReaderConfig,
    sink_factory: &'a dyn SinkFactory,
    double_parser: &'a dyn DoubleParser,
    parser_config: &'a dyn ParserConfig,
    zone_parser: Option<&'a dyn TimeZoneParser>,
}

impl<'a> From<&'a ReadOptions<'a>> for ColumnEnvSources<'a> {
    fn from(opts: &'a ReadOptions<'a>) -> Self {
        ColumnEnvSources {
            config: opts.config,
            sink_factory: opts.sink_factory,
            double_parser: opts.double_parser,
            parser_config: opts.parser_config,
            zone_parser: opts.zone_parser,
        }
    }
}

fn column_env<'a>(sources: ColumnEnvSources<'a>, column: usize, name: &str) -> (ParserUniverse, InferenceEnv<'a>) {
    let universe = sources.parser_config.universe(column, name);
    let sentinels = sources.parser_config.sentinels(column, name);
    let null_literals = sources.config.null_literals_for(column, Some(name));
    let env = InferenceEnv {
        null_literals,
        sentinels: sentinels.numeric,
        bool_sentinel: sentinels.bool_sentinel,
        char_sentinel: sentinels.char_sentinel,
        datetime_sentinel: sentinels.datetime_sentinel,
        timestamp_sentinel: sentinels.timestamp_sentinel,
        double_parser: sources.double_parser,
        zone_parser: sources.zone_parser,
        sink_factory: sources.sink_factory,
    };
    (universe, env)
}

fn wrap_column_error(column: usize, name: &str, err: CoreError) -> ReadError {
    ReadError::Column(ColumnError { column_index: column, column_name: Some(name.to_string()), source: err })
}

/// Runs the framing coordinator on the calling thread to completion, then
/// infers each column in turn, also on the calling thread.
fn read_sequential(
    buf: &[u8],
    header: &framing::HeaderResolution,
    opts: &ReadOptions<'_>,
    writers: Vec<storage::DenseStorageWriter>,
    mut first_readers: Vec<DenseStorageReader>,
    mut second_readers: Vec<DenseStorageReader>,
) -> Result<(u64, Vec<ColumnOutcome>), ReadError> {
    let rows = framing::distribute_rows(buf, opts.config, header, writers)?;

    let sources = ColumnEnvSources::from(opts);
    let mut outcomes = Vec::with_capacity(header.names.len());
    for (i, name) in header.names.iter().enumerate() {
        let (universe, env) = column_env(sources, i, name);
        let mut iter1 = PeekableCellSource::new(&mut first_readers[i]);
        let mut iter2 = PeekableCellSource::new(&mut second_readers[i]);
        let outcome = inference::infer_column(&mut iter1, &mut iter2, i, &universe, &env).map_err(|e| wrap_column_error(i, name, e))?;
        outcomes.push(outcome);
    }
    Ok((rows, outcomes))
}

/// Runs the framing coordinator and every column's inference as sibling
/// threads under one scope, per §5's concurrent execution model.
fn read_concurrent(
    buf: &[u8],
    header: &framing::HeaderResolution,
    opts: &ReadOptions<'_>,
    writers: Vec<storage::DenseStorageWriter>,
    mut first_readers: Vec<DenseStorageReader>,
    mut second_readers: Vec<DenseStorageReader>,
) -> Result<(u64, Vec<ColumnOutcome>), ReadError> {
    let sources = ColumnEnvSources::from(opts);
    thread::scope(|scope| {
        let distributor = scope.spawn(|| framing::distribute_rows(buf, opts.config, header, writers));

        let column_handles: Vec<_> = first_readers
            .iter_mut()
            .zip(second_readers.iter_mut())
            .enumerate()
            .map(|(i, (r1, r2))| {
                let name = &header.names[i];
                scope.spawn(move || {
                    let (universe, env) = column_env(sources, i, name);
                    let mut iter1 = PeekableCellSource::new(r1);
                    let mut iter2 = PeekableCellSource::new(r2);
                    inference::infer_column(&mut iter1, &mut iter2, i, &universe, &env)
                })
            })
            .collect();

        // Every column thread only depends on its own DenseStorage chain,
        // which `distribute_rows` always terminates (it calls `finish` on
        // every writer on every return path, including its own error
        // paths), so joining columns first and the distributor last cannot
        // deadlock even if the distributor fails partway through.
        let mut column_results = Vec::with_capacity(column_handles.len());
        for (i, handle) in column_handles.into_iter().enumerate() {
            column_results.push(handle.join().map_err(|_| {
                log::warn!("column {i} inference thread panicked, canceling read");
                CoreError::Canceled
            })?);
        }
        let rows = distributor.join().map_err(|_| {
            log::warn!("row distribution thread panicked, canceling read");
            CoreError::Canceled
        })??;

        let mut outcomes = Vec::with_capacity(column_results.len());
        for (i, result) in column_results.into_iter().enumerate() {
            let outcome = result.map_err(|e| wrap_column_error(i, &header.names[i], e))?;
            outcomes.push(outcome);
        }
        Ok((rows, outcomes))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::TimestampScale;

    fn opts<'a>(config: &'a config::ReaderConfig, factory: &'a sink::VecSinkFactory, dp: &'a StdDoubleParser) -> ReadOptions<'a> {
        ReadOptions::new(config, factory, dp)
    }

    #[test]
    fn minimal_numeric_widening() {
        let buf = b"X\n1\n2\n300\n-40000\n";
        let cfg = config::ReaderConfig::default();
        let factory = sink::VecSinkFactory;
        let dp = StdDoubleParser;
        let o = opts(&cfg, &factory, &dp);
        let result = read(buf, &o).unwrap();
        assert_eq!(result.rows, 4);
        assert_eq!(result.columns.len(), 1);
        assert_eq!(result.columns[0].name, "X");
        assert_eq!(result.columns[0].data_type, DataType::Int);
        if let ColumnSink::Int(s) = &result.columns[0].sink {
            let mut values = Vec::new();
            let mut nulls = Vec::new();
            sink::Source::read_into(s.as_ref(), 0, 4, &mut values, &mut nulls);
            assert_eq!(values, vec![1, 2, 300, -40000]);
            assert!(nulls.iter().all(|n| !n));
        } else {
            panic!("expected Int sink");
        }
    }

    #[test]
    fn null_literal_and_numeric_widening_to_double() {
        let buf = b"A,B\n1,\n,2.5\n3,4.0\n";
        let cfg = config::ReaderConfig::default();
        let factory = sink::VecSinkFactory;
        let dp = StdDoubleParser;
        let o = opts(&cfg, &factory, &dp);
        let result = read(buf, &o).unwrap();
        assert_eq!(result.columns[0].data_type, DataType::Int);
        assert_eq!(result.columns[1].data_type, DataType::Double);
        if let ColumnSink::Int(s) = &result.columns[0].sink {
            let mut values = Vec::new();
            let mut nulls = Vec::new();
            sink::Source::read_into(s.as_ref(), 0, 3, &mut values, &mut nulls);
            assert_eq!(nulls, vec![false, true, false]);
            assert_eq!(values[0], 1);
            assert_eq!(values[2], 3);
        } else {
            panic!("expected Int sink");
        }
    }

    #[test]
    fn quoted_quotes_and_embedded_newline() {
        let buf = b"Comment\n\"He said \"\"hi\"\"\nthere\"\n";
        let cfg = config::ReaderConfig::default();
        let factory = sink::VecSinkFactory;
        let dp = StdDoubleParser;
        let o = opts(&cfg, &factory, &dp);
        let result = read(buf, &o).unwrap();
        assert_eq!(result.rows, 1);
        assert_eq!(result.columns[0].data_type, DataType::String);
    }

    #[test]
    fn escape_expansion_and_sibling_int_column() {
        let buf = b"Text,Num\nDeep|b|r|n|t|fhaven,42\n";
        let cfg = config::ReaderConfig { escape: Some(b'|'), quote: b'`', ..Default::default() };
        let factory = sink::VecSinkFactory;
        let dp = StdDoubleParser;
        let o = opts(&cfg, &factory, &dp);
        let result = read(buf, &o).unwrap();
        assert_eq!(result.columns[1].data_type, DataType::Int);
    }

    #[test]
    fn fixed_width_inference_from_header() {
        let buf = b"Name      Age  Score\nAnn         3     17\nBob        21   1000\n";
        let cfg = config::ReaderConfig { has_fixed_width_columns: true, ..Default::default() };
        let factory = sink::VecSinkFactory;
        let dp = StdDoubleParser;
        let o = opts(&cfg, &factory, &dp);
        let result = read(buf, &o).unwrap();
        assert_eq!(result.columns.len(), 3);
        assert_eq!(result.columns[0].name, "Name");
        assert_eq!(result.columns[0].data_type, DataType::String);
        assert_eq!(result.columns[1].data_type, DataType::Int);
        assert_eq!(result.columns[2].data_type, DataType::Int);
    }

    #[test]
    fn row_shape_policies_null_fill_and_long_row_failure() {
        let buf = b"a,b,c\n1,2\n1,2,3,4\n";
        let cfg = config::ReaderConfig {
            allow_missing_columns: true,
            null_value_literals_for_index: vec![(2, vec![b"NA".to_vec()])],
            ..Default::default()
        };
        let factory = sink::VecSinkFactory;
        let dp = StdDoubleParser;
        let o = opts(&cfg, &factory, &dp);
        assert!(matches!(read(buf, &o), Err(ReadError::Framing(CoreError::LongRow { row: 3, .. }))));
    }

    #[test]
    fn short_row_alone_is_null_filled() {
        let buf = b"a,b,c\n1,2\n";
        let cfg = config::ReaderConfig { allow_missing_columns: true, ..Default::default() };
        let factory = sink::VecSinkFactory;
        let dp = StdDoubleParser;
        let o = opts(&cfg, &factory, &dp);
        let result = read(buf, &o).unwrap();
        assert_eq!(result.rows, 1);
        assert_eq!(result.columns[2].data_type, DataType::Int);
    }

    #[test]
    fn sequential_mode_matches_concurrent_mode() {
        let buf = b"a,b\n1,x\n2,y\n3,z\n";
        let factory = sink::VecSinkFactory;
        let dp = StdDoubleParser;

        let cfg_seq = config::ReaderConfig { concurrent: false, ..Default::default() };
        let o_seq = opts(&cfg_seq, &factory, &dp);
        let r_seq = read(buf, &o_seq).unwrap();

        let cfg_conc = config::ReaderConfig { concurrent: true, ..Default::default() };
        let o_conc = opts(&cfg_conc, &factory, &dp);
        let r_conc = read(buf, &o_conc).unwrap();

        assert_eq!(r_seq.rows, r_conc.rows);
        assert_eq!(r_seq.columns[0].data_type, r_conc.columns[0].data_type);
        assert_eq!(r_seq.columns[1].data_type, r_conc.columns[1].data_type);
    }

    #[test]
    fn custom_parser_config_restricts_universe_to_string_only() {
        struct StringOnly;
        impl ParserConfig for StringOnly {
            fn universe(&self, _column: usize, _name: &str) -> ParserUniverse {
                ParserUniverse { numeric: Vec::new(), bool_enabled: false, char_enabled: false, string_enabled: true, datetime_enabled: false, timestamp_scale: None }
            }
        }
        let buf = b"n\n1\n2\n3\n";
        let cfg = config::ReaderConfig::default();
        let factory = sink::VecSinkFactory;
        let dp = StdDoubleParser;
        let string_only = StringOnly;
        let o = ReadOptions { parser_config: &string_only, ..opts(&cfg, &factory, &dp) };
        let result = read(buf, &o).unwrap();
        assert_eq!(result.columns[0].data_type, DataType::String);
    }

    #[test]
    fn timestamp_scale_is_selectable_per_column() {
        struct TimestampUniverse;
        impl ParserConfig for TimestampUniverse {
            fn universe(&self, _column: usize, _name: &str) -> ParserUniverse {
                ParserUniverse { numeric: Vec::new(), bool_enabled: false, char_enabled: false, string_enabled: false, datetime_enabled: false, timestamp_scale: Some(TimestampScale::Millis) }
            }
        }
        let buf = b"t\n1700000000000\n1700000000500\n";
        let cfg = config::ReaderConfig::default();
        let factory = sink::VecSinkFactory;
        let dp = StdDoubleParser;
        let u = TimestampUniverse;
        let o = ReadOptions { parser_config: &u, ..opts(&cfg, &factory, &dp) };
        let result = read(buf, &o).unwrap();
        assert_eq!(result.columns[0].data_type, DataType::TimestampAsLong(TimestampScale::Millis));
        let _: &dyn sink::Sink<i64> = match &result.columns[0].sink {
            ColumnSink::Timestamp(s) => s.as_ref(),
            _ => panic!("expected Timestamp sink"),
        };
    }
}
