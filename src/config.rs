//! The configuration surface, §6.2.
//!
//! The configuration object itself is deliberately out of this core's
//! scope as a *feature* — no fluent builder is provided here, callers use
//! struct-literal/`..Default::default()` construction — but the struct and
//! its validation rules are concrete, since the rest of the core needs a
//! real type to be driven by.

use crate::error::CoreError;

/// A column width, measured either in UTF-16 code units or full Unicode
/// scalars, per [`ReaderConfig::use_utf32_counting_convention`].
pub type ColumnWidth = u32;

/// The complete, flat configuration surface of the core.
///
/// Fields mirror §6.2 one-to-one. `parsers`, `null_value_literals`, and the
/// per-name/per-index override maps are intentionally left as data the
/// caller assembles; this struct does not impose an enum-based "parser
/// universe" type here because that belongs to [`crate::parser`] and
/// [`crate::inference`] — the configuration only carries the ASCII/layout
/// knobs that the grabber and framing coordinator need directly.
#[derive(Clone, Debug)]
pub struct ReaderConfig {
    /// Whether the first non-skipped row is a header row.
    pub has_header_row: bool,
    /// Number of header rows to skip before the header row itself.
    pub skip_header_rows: usize,
    /// Number of rows to skip before any header/data processing begins.
    pub skip_rows: usize,
    /// Maximum number of data rows to read, if bounded.
    pub max_rows: Option<u64>,

    /// Overrides the names of every column, by position.
    pub headers: Option<Vec<String>>,
    /// Overrides the name of specific columns, by 0-based index.
    pub headers_by_index: Vec<(usize, String)>,

    /// Default null literals applied to every column unless overridden.
    pub null_value_literals: Vec<Vec<u8>>,
    /// Null literal overrides keyed by column name.
    pub null_value_literals_for_name: Vec<(String, Vec<Vec<u8>>)>,
    /// Null literal overrides keyed by 0-based column index.
    pub null_value_literals_for_index: Vec<(usize, Vec<Vec<u8>>)>,

    /// The field delimiter. Must be 7-bit ASCII. Forbidden in fixed-width
    /// mode.
    pub delimiter: u8,
    /// The quote character. Must be 7-bit ASCII. Forbidden in fixed-width
    /// mode.
    pub quote: u8,
    /// The escape character, or `None` if escaping is disabled. Must be
    /// 7-bit ASCII when present.
    pub escape: Option<u8>,
    /// Whether to skip leading spaces/tabs before a cell (not the
    /// delimiter itself).
    pub ignore_surrounding_spaces: bool,
    /// Whether to trim spaces/tabs inside a returned cell value.
    pub trim: bool,
    /// Whether rows with no cells at all are silently skipped.
    pub ignore_empty_lines: bool,
    /// Whether short rows are null-filled rather than rejected.
    pub allow_missing_columns: bool,
    /// Whether long rows have their excess cells dropped rather than being
    /// rejected.
    pub ignore_excess_columns: bool,

    /// Whether the input uses fixed-width columns rather than delimiters.
    pub has_fixed_width_columns: bool,
    /// Column widths for fixed-width mode. `None` means "infer from the
    /// header row".
    pub fixed_column_widths: Option<Vec<ColumnWidth>>,
    /// Whether fixed column widths are measured in UTF-16 code units
    /// (`false`) or full Unicode scalars (`true`, the default).
    pub use_utf32_counting_convention: bool,

    /// Whether the concurrent (one thread per column) execution model is
    /// used. When `false`, everything runs on the calling thread and the
    /// backpressure semaphore never blocks.
    pub concurrent: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            has_header_row: true,
            skip_header_rows: 0,
            skip_rows: 0,
            max_rows: None,
            headers: None,
            headers_by_index: Vec::new(),
            null_value_literals: vec![Vec::new()],
            null_value_literals_for_name: Vec::new(),
            null_value_literals_for_index: Vec::new(),
            delimiter: b',',
            quote: b'"',
            escape: None,
            ignore_surrounding_spaces: true,
            trim: false,
            ignore_empty_lines: false,
            allow_missing_columns: false,
            ignore_excess_columns: false,
            has_fixed_width_columns: false,
            fixed_column_widths: None,
            use_utf32_counting_convention: true,
            concurrent: true,
        }
    }
}

impl ReaderConfig {
    /// Validates the configuration per §6.2's validation rules.
    ///
    /// Open question (§9), resolved: `escape == quote` or
    /// `escape == delimiter` is rejected here rather than given ambiguous
    /// runtime behavior.
    pub fn validate(&self) -> Result<(), CoreError> {
        let ascii7 = |b: u8| b < 0x80;

        if !ascii7(self.delimiter) {
            return Err(CoreError::ConfigError {
                reason: "delimiter must be 7-bit ASCII".into(),
            });
        }
        if !ascii7(self.quote) {
            return Err(CoreError::ConfigError {
                reason: "quote must be 7-bit ASCII".into(),
            });
        }
        if let Some(escape) = self.escape {
            if !ascii7(escape) {
                return Err(CoreError::ConfigError {
                    reason: "escape must be 7-bit ASCII".into(),
                });
            }
            if escape == self.quote {
                return Err(CoreError::ConfigError {
                    reason: "escape must not equal quote".into(),
                });
            }
            if escape == self.delimiter {
                return Err(CoreError::ConfigError {
                    reason: "escape must not equal delimiter".into(),
                });
            }
        }
        if self.skip_header_rows > 0 && !self.has_header_row {
            return Err(CoreError::ConfigError {
                reason: "skip_header_rows > 0 requires has_header_row".into(),
            });
        }
        if let Some(widths) = &self.fixed_column_widths {
            if widths.iter().any(|&w| w == 0) {
                return Err(CoreError::ConfigError {
                    reason: "fixed column widths must all be >= 1".into(),
                });
            }
        }
        if self.has_fixed_width_columns {
            if self.trim {
                return Err(CoreError::ConfigError {
                    reason: "fixed-width mode forbids setting trim".into(),
                });
            }
            // Fixed-width mode also forbids setting `quote`/`delimiter`, but
            // both carry meaningful non-sentinel defaults on this struct, so
            // there is no way from here to tell "caller explicitly set this"
            // apart from "caller left the default". Left unenforced rather
            // than rejecting configs that merely hold the default value.
        } else if self.fixed_column_widths.is_some() {
            return Err(CoreError::ConfigError {
                reason: "delimited mode forbids fixed_column_widths".into(),
            });
        }
        // Delimited mode also forbids `use_utf32_counting_convention`, left
        // unenforced for the same reason as the quote/delimiter checks above.
        Ok(())
    }

    /// Resolves the null literals applicable to a given column.
    pub fn null_literals_for(&self, index: usize, name: Option<&str>) -> Vec<&[u8]> {
        let mut out: Vec<&[u8]> = self.null_value_literals.iter().map(|v| v.as_slice()).collect();
        if let Some(name) = name {
            for (n, lits) in &self.null_value_literals_for_name {
                if n == name {
                    out.extend(lits.iter().map(|v| v.as_slice()));
                }
            }
        }
        for (i, lits) in &self.null_value_literals_for_index {
            if *i == index {
                out.extend(lits.iter().map(|v| v.as_slice()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ReaderConfig::default().validate().is_ok());
    }

    #[test]
    fn escape_equal_to_quote_is_rejected() {
        let cfg = ReaderConfig { escape: Some(b'"'), ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn escape_equal_to_delimiter_is_rejected() {
        let cfg = ReaderConfig { escape: Some(b','), ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn skip_header_rows_without_header_is_rejected() {
        let cfg = ReaderConfig {
            has_header_row: false,
            skip_header_rows: 1,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn fixed_width_forbids_trim() {
        let cfg = ReaderConfig {
            has_fixed_width_columns: true,
            trim: true,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn delimited_forbids_fixed_widths() {
        let cfg = ReaderConfig {
            fixed_column_widths: Some(vec![3, 4]),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn null_literals_merge_default_name_and_index_overrides() {
        let cfg = ReaderConfig {
            null_value_literals: vec![b"".to_vec()],
            null_value_literals_for_name: vec![("b".to_string(), vec![b"NA".to_vec()])],
            null_value_literals_for_index: vec![(2, vec![b"N/A".to_vec()])],
            ..Default::default()
        };
        let lits = cfg.null_literals_for(2, Some("b"));
        assert!(lits.contains(&b"".as_slice()));
        assert!(lits.contains(&b"NA".as_slice()));
        assert!(lits.contains(&b"N/A".as_slice()));
    }
}
