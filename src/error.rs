//! The error taxonomy shared across the grabber, storage, tokenizer, parser
//! and inference engine.

use std::fmt;

/// The canonical name of a parser, used in [`CoreError::ParseFailure`] and
/// log instrumentation so a failure can be traced back to the exact ladder
/// position it occurred at.
pub type ParserName = &'static str;

/// Errors produced by the core pipeline.
///
/// Every variant here corresponds to one entry in the error taxonomy. The
/// core never panics for expected failure modes; panics are reserved for
/// detected invariant violations (see [`CoreError::Unification`] for the one
/// case that *is* surfaced as a value rather than a panic, and
/// [`crate::inference`] for the internal `assert!`s that guard true logic
/// bugs).
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// A quoted cell was left unterminated, or trailing bytes followed a
    /// closing quote before the next delimiter/terminator.
    #[error("malformed quoting at byte offset {offset}: {reason}")]
    MalformedQuoting {
        /// Byte offset within the input stream where the problem was found.
        offset: u64,
        /// Human-readable detail, e.g. "unterminated quoted cell" or
        /// "trailing data after closing quote".
        reason: &'static str,
    },

    /// An escape sequence was invalid: escape at end of input, or escaping a
    /// CR/LF/non-ASCII byte.
    #[error("malformed escape at byte offset {offset}: {reason}")]
    MalformedEscape {
        /// Byte offset of the escape character itself.
        offset: u64,
        /// Human-readable detail.
        reason: &'static str,
    },

    /// A data row had fewer cells than the header/schema requires, and the
    /// configuration does not permit null-filling it.
    #[error("row {row} is short: expected at least {expected} columns, found {actual}")]
    ShortRow {
        /// 1-based physical row number.
        row: u64,
        /// Number of columns expected.
        expected: usize,
        /// Number of columns actually present.
        actual: usize,
    },

    /// A data row had more cells than the header/schema allows, and the
    /// configuration does not permit dropping the excess.
    #[error("row {row} is long: expected {expected} columns, found at least {actual}")]
    LongRow {
        /// 1-based physical row number.
        row: u64,
        /// Number of columns expected.
        expected: usize,
        /// Number of columns actually observed before the row was rejected.
        actual: usize,
    },

    /// Header names could not be determined, or were invalid once
    /// determined (duplicates, or rejected by the caller's validator).
    #[error("header error: {reason}")]
    HeaderError {
        /// Human-readable detail.
        reason: String,
    },

    /// A [`crate::config::ReaderConfig`] failed validation.
    #[error("configuration error: {reason}")]
    ConfigError {
        /// Human-readable detail.
        reason: String,
    },

    /// No parser in the effective universe accepted every cell of a column.
    #[error(
        "no parser accepted column {column}: {parser} got furthest, failing at cell {cell_index}"
    )]
    ParseFailure {
        /// The column index this failure pertains to.
        column: usize,
        /// The canonical name of the parser that consumed the most input.
        parser: ParserName,
        /// The 0-based index, within the column, of the first cell the
        /// furthest-reaching parser could not accept.
        cell_index: u64,
    },

    /// A second-phase reparse or unification exit position did not match
    /// the range recorded during the first phase. This indicates a logic
    /// error in the inference engine, not a malformed input.
    #[error(
        "unification invariant violated for column {column}: expected exit at {expected}, got {actual}"
    )]
    Unification {
        /// The column index this failure pertains to.
        column: usize,
        /// The expected second-phase exit position.
        expected: u64,
        /// The actual second-phase exit position.
        actual: u64,
    },

    /// The underlying byte stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was cancelled because a sibling column task failed.
    #[error("operation canceled")]
    Canceled,
}

/// Wraps a [`CoreError`] with the column it occurred in, for the "single
/// error wrapping the column name/index" propagation policy of §7.
#[derive(Debug)]
pub struct ColumnError {
    /// 0-based index of the column the error occurred in.
    pub column_index: usize,
    /// The column's resolved name, if headers were available.
    pub column_name: Option<String>,
    /// The underlying error.
    pub source: CoreError,
}

impl fmt::Display for ColumnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column_name {
            Some(name) => write!(
                f,
                "column {} ({}): {}",
                self.column_index, name, self.source
            ),
            None => write!(f, "column {}: {}", self.column_index, self.source),
        }
    }
}

impl std::error::Error for ColumnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Convenience alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;
