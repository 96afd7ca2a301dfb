//! Header resolution and per-row distribution: the small coordinator that
//! sits around the grabber/storage/inference core, §4.8.
//!
//! Resolving the header is split from distributing rows because the column
//! count (and, in fixed-width mode, the widths) must be known before the
//! caller can build one `DenseStorage` channel per column; [`resolve_header`]
//! answers that question and hands back the byte offset row distribution
//! should start from, and [`distribute_rows`] drives the rest of the input
//! into the writers the caller built from that answer.

use std::collections::HashSet;

use crate::byte_slice::ByteSlice;
use crate::config::{ColumnWidth, ReaderConfig};
use crate::error::CoreError;
use crate::grabber::{self, DelimitedGrabber, FixedWidthGrabber};
use crate::storage::DenseStorageWriter;

/// A pure transform applied to every header name before validation, per
/// §6.2's `header_legalizer`. Left as a plain closure reference rather than
/// a `ReaderConfig` field, mirroring how `parsers`/`null_parser` are kept out
/// of the config struct.
pub type HeaderLegalizer<'a> = &'a dyn Fn(&str) -> String;
/// A predicate every legalized header name must satisfy, per §6.2's
/// `header_validator`.
pub type HeaderValidator<'a> = &'a dyn Fn(&str) -> bool;

/// The resolved shape of one input, produced by [`resolve_header`].
pub struct HeaderResolution {
    /// Final, legalized, validated column names. Its length is the
    /// authoritative column count every data row is measured against.
    pub names: Vec<String>,
    /// Resolved fixed-width column widths, `None` in delimited mode. May be
    /// one longer than `names` when the header's last column was empty and
    /// dropped (see `trailing_empty_columns`); the grabber still tokenizes
    /// every width, the extra trailing cell is just asserted empty and
    /// discarded per row.
    pub fixed_widths: Option<Vec<ColumnWidth>>,
    /// Byte offset into the original input at which [`distribute_rows`]
    /// should begin.
    pub data_start: usize,
    /// How many trailing columns were dropped because the header's
    /// trailing cells were empty, per §4.8's trailing-empty-column rule.
    pub trailing_empty_columns: usize,
}

impl HeaderResolution {
    /// The authoritative column count data rows are measured against.
    pub fn column_count(&self) -> usize {
        self.names.len()
    }
}

/// Resolves header names (and, in fixed-width mode, column widths) from the
/// front of `buf`, without tokenizing any data row.
pub fn resolve_header(
    buf: &[u8],
    config: &ReaderConfig,
    legalizer: Option<HeaderLegalizer<'_>>,
    validator: Option<HeaderValidator<'_>>,
) -> Result<HeaderResolution, CoreError> {
    if config.has_fixed_width_columns {
        resolve_fixed_width_header(buf, config, legalizer, validator)
    } else {
        resolve_delimited_header(buf, config, legalizer, validator)
    }
}

fn resolve_delimited_header(
    buf: &[u8],
    config: &ReaderConfig,
    legalizer: Option<HeaderLegalizer<'_>>,
    validator: Option<HeaderValidator<'_>>,
) -> Result<HeaderResolution, CoreError> {
    let mut g = DelimitedGrabber::new(
        buf, config.delimiter, config.quote, config.escape, config.ignore_surrounding_spaces, config.trim,
    );
    g.skip_rows(config.skip_rows);

    if config.has_header_row {
        g.skip_rows(config.skip_header_rows);
        let raw_names = collect_row_strings(&mut g)?;
        let data_start = g.offset() as usize;
        let (names, trailing_empty_columns) = finalize_names(raw_names, true, config, legalizer, validator)?;
        Ok(HeaderResolution { names, fixed_widths: None, data_start, trailing_empty_columns })
    } else {
        let data_start = g.offset() as usize;
        // A throwaway grabber over the same remaining bytes, read far enough
        // to count the first data row's cells, then discarded: the real
        // distribution pass starts fresh from `data_start` and sees this row
        // again as genuine data.
        let mut peek = DelimitedGrabber::new(
            &buf[data_start..], config.delimiter, config.quote, config.escape, config.ignore_surrounding_spaces, config.trim,
        );
        let count = if peek.at_end() { 0 } else { collect_row_strings(&mut peek)?.len() };
        let default_names: Vec<String> = (0..count).map(|i| format!("column_{i}")).collect();
        let (names, _) = finalize_names(default_names, false, config, legalizer, validator)?;
        Ok(HeaderResolution { names, fixed_widths: None, data_start, trailing_empty_columns: 0 })
    }
}

fn collect_row_strings(g: &mut DelimitedGrabber<'_>) -> Result<Vec<String>, CoreError> {
    let mut cells = Vec::new();
    loop {
        let outcome = g.grab_next()?;
        cells.push(String::from_utf8_lossy(outcome.cell.data()).into_owned());
        if outcome.last_in_row {
            break;
        }
    }
    Ok(cells)
}

fn resolve_fixed_width_header(
    buf: &[u8],
    config: &ReaderConfig,
    legalizer: Option<HeaderLegalizer<'_>>,
    validator: Option<HeaderValidator<'_>>,
) -> Result<HeaderResolution, CoreError> {
    let after_skip = grabber::skip_raw_lines(buf, config.skip_rows);

    if config.has_header_row {
        let before_header = grabber::skip_raw_lines(after_skip, config.skip_header_rows);
        let (header_line, remainder) = grabber::take_first_line(before_header)?;
        let widths = match &config.fixed_column_widths {
            Some(w) => w.clone(),
            None => grabber::infer_column_widths(header_line, config.use_utf32_counting_convention)?,
        };
        let byte_widths = grabber::resolve_byte_widths(header_line, &widths, config.use_utf32_counting_convention);
        let mut raw_names = Vec::with_capacity(byte_widths.len());
        let mut pos = 0;
        for &len in &byte_widths {
            let end = (pos + len).min(header_line.len());
            raw_names.push(String::from_utf8_lossy(&header_line[pos..end]).trim().to_string());
            pos = end;
        }
        let data_start = buf.len() - remainder.len();
        let (names, trailing_empty_columns) = finalize_names(raw_names, true, config, legalizer, validator)?;
        Ok(HeaderResolution { names, fixed_widths: Some(widths), data_start, trailing_empty_columns })
    } else {
        let widths = config.fixed_column_widths.clone().ok_or_else(|| CoreError::ConfigError {
            reason: "fixed-width mode without a header row requires fixed_column_widths".to_string(),
        })?;
        let default_names: Vec<String> = (0..widths.len()).map(|i| format!("column_{i}")).collect();
        let (names, _) = finalize_names(default_names, false, config, legalizer, validator)?;
        let data_start = buf.len() - after_skip.len();
        Ok(HeaderResolution { names, fixed_widths: Some(widths), data_start, trailing_empty_columns: 0 })
    }
}

/// Applies trailing-empty-column trimming, `headers`/`headers_by_index`
/// overrides, legalization, validation, and duplicate-name checking, in
/// that order.
fn finalize_names(
    mut raw: Vec<String>,
    drop_trailing_empty: bool,
    config: &ReaderConfig,
    legalizer: Option<HeaderLegalizer<'_>>,
    validator: Option<HeaderValidator<'_>>,
) -> Result<(Vec<String>, usize), CoreError> {
    let mut trailing_empty = 0;
    if drop_trailing_empty {
        while raw.len() > 1 && raw.last().is_some_and(|n| n.is_empty()) {
            raw.pop();
            trailing_empty += 1;
        }
    }

    let mut names = match &config.headers {
        Some(overrides) if overrides.len() == raw.len() => overrides.clone(),
        Some(overrides) => {
            return Err(CoreError::HeaderError {
                reason: format!("headers override has {} names but {} columns were resolved", overrides.len(), raw.len()),
            })
        }
        None => raw,
    };

    for (index, name) in &config.headers_by_index {
        let len = names.len();
        let slot = names
            .get_mut(*index)
            .ok_or_else(|| CoreError::HeaderError { reason: format!("headers_by_index references column {index} but only {len} columns exist") })?;
        *slot = name.clone();
    }

    if let Some(legalizer) = legalizer {
        for name in &mut names {
            *name = legalizer(name);
        }
    }

    if let Some(validator) = validator {
        for name in &names {
            if !validator(name) {
                return Err(CoreError::HeaderError { reason: format!("header name \"{name}\" rejected by validator") });
            }
        }
    }

    let mut seen = HashSet::new();
    for name in &names {
        if !seen.insert(name.as_str()) {
            return Err(CoreError::HeaderError { reason: format!("duplicate header name \"{name}\"") });
        }
    }

    Ok((names, trailing_empty))
}

/// Drives the remainder of the input (from [`HeaderResolution::data_start`]
/// onward) into `writers`, one per column, enforcing the per-row policies of
/// §4.8. Returns the number of data rows written.
///
/// Takes `writers` by value (rather than `&mut [DenseStorageWriter]`) since
/// [`DenseStorageWriter::finish`] consumes each writer exactly once, on every
/// return path including an early `max_rows` cutoff.
pub fn distribute_rows(
    buf: &[u8],
    config: &ReaderConfig,
    header: &HeaderResolution,
    mut writers: Vec<DenseStorageWriter>,
) -> Result<u64, CoreError> {
    debug_assert_eq!(writers.len(), header.column_count());
    let column_count = header.column_count();
    let data = &buf[header.data_start..];

    let null_firsts: Vec<Vec<u8>> = (0..column_count)
        .map(|i| {
            config
                .null_literals_for(i, header.names.get(i).map(String::as_str))
                .first()
                .map(|lit| lit.to_vec())
                .unwrap_or_default()
        })
        .collect();

    let result = (|| -> Result<u64, CoreError> {
        let mut rows_written: u64 = 0;
        // Cells are copied into owned buffers rather than held as `ByteSlice`
        // views: both grabbers' `grab_next` ties its returned cell to the
        // `&mut self` reborrow of that one call, so a row's cells can't be
        // accumulated across calls without copying them out first.
        let mut row: Vec<Vec<u8>> = Vec::with_capacity(column_count + header.trailing_empty_columns);

        macro_rules! dispatch_row {
            ($physical_row:expr) => {{
                if config.ignore_empty_lines && row.len() == 1 && row[0].is_empty() {
                    // A blank physical line: neither written nor counted.
                } else {
                    let usable = reconcile_row_len(&row, column_count, header.trailing_empty_columns, config, $physical_row)?;
                    for (i, writer) in writers.iter_mut().enumerate() {
                        if i < usable {
                            writer.append(ByteSlice::whole(&row[i]));
                        } else {
                            writer.append(ByteSlice::whole(&null_firsts[i]));
                        }
                    }
                    rows_written += 1;
                    if let Some(max_rows) = config.max_rows {
                        if rows_written >= max_rows {
                            return Ok(rows_written);
                        }
                    }
                }
            }};
        }

        if config.has_fixed_width_columns {
            let widths = header.fixed_widths.as_ref().expect("fixed-width mode always resolves widths");
            let mut g = FixedWidthGrabber::new(data, widths.clone(), config.use_utf32_counting_convention);
            if !g.at_end() {
                loop {
                    let physical_row = g.physical_row();
                    row.clear();
                    loop {
                        let outcome = g.grab_next()?;
                        let mut cell = outcome.cell;
                        // The grabber itself must keep yielding the
                        // untrimmed, full-width cell (the §8 "concatenation
                        // of emitted cells without trimming" property is
                        // about the grabber, not what gets typed); trimming
                        // happens here, right before the cell is stored and
                        // tokenized.
                        if config.ignore_surrounding_spaces {
                            cell.trim_spaces_and_tabs();
                        }
                        row.push(cell.data().to_vec());
                        if outcome.last_in_row {
                            break;
                        }
                    }
                    dispatch_row!(physical_row);
                    if g.at_end() {
                        break;
                    }
                }
            }
        } else {
            let mut g = DelimitedGrabber::new(
                data, config.delimiter, config.quote, config.escape, config.ignore_surrounding_spaces, config.trim,
            );
            if !g.at_end() {
                loop {
                    let physical_row = g.physical_row();
                    row.clear();
                    loop {
                        let outcome = g.grab_next()?;
                        row.push(outcome.cell.data().to_vec());
                        if outcome.last_in_row {
                            break;
                        }
                    }
                    dispatch_row!(physical_row);
                    if g.at_end() {
                        break;
                    }
                }
            }
        }

        Ok(rows_written)
    })();

    for writer in writers {
        writer.finish();
    }
    result
}

/// Checks one data row's cells against the column count, applying the
/// trailing-empty-cell assertion, `ignore_excess_columns`, and
/// `allow_missing_columns`. Returns how many of `row` should be taken as
/// real values (the rest are null-filled).
fn reconcile_row_len(
    row: &[Vec<u8>],
    column_count: usize,
    trailing_empty_columns: usize,
    config: &ReaderConfig,
    physical_row: u64,
) -> Result<usize, CoreError> {
    let len = row.len();
    let mut usable = len.min(column_count);
    if len > column_count {
        let excess = len - column_count;
        let matches_header_trailing = excess == trailing_empty_columns && row[column_count..].iter().all(|cell| cell.is_empty());
        if !matches_header_trailing && !config.ignore_excess_columns {
            return Err(CoreError::LongRow { row: physical_row, expected: column_count, actual: len });
        }
    }
    if usable < column_count && !config.allow_missing_columns {
        return Err(CoreError::ShortRow { row: physical_row, expected: column_count, actual: usable });
    }
    Ok(usable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::channel;

    fn default_config() -> ReaderConfig {
        ReaderConfig::default()
    }

    #[test]
    fn resolves_simple_delimited_header() {
        let buf = b"a,b,c\n1,2,3\n";
        let h = resolve_header(buf, &default_config(), None, None).unwrap();
        assert_eq!(h.names, vec!["a", "b", "c"]);
        assert_eq!(&buf[h.data_start..], b"1,2,3\n");
    }

    #[test]
    fn drops_trailing_empty_header_column() {
        let buf = b"a,b,\n1,2,\n";
        let h = resolve_header(buf, &default_config(), None, None).unwrap();
        assert_eq!(h.names, vec!["a", "b"]);
        assert_eq!(h.trailing_empty_columns, 1);
    }

    #[test]
    fn duplicate_header_names_are_rejected() {
        let buf = b"a,a\n1,2\n";
        assert!(matches!(resolve_header(buf, &default_config(), None, None), Err(CoreError::HeaderError { .. })));
    }

    #[test]
    fn headers_by_index_overrides_one_column() {
        let buf = b"a,b,c\n1,2,3\n";
        let cfg = ReaderConfig { headers_by_index: vec![(1, "renamed".to_string())], ..default_config() };
        let h = resolve_header(buf, &cfg, None, None).unwrap();
        assert_eq!(h.names, vec!["a", "renamed", "c"]);
    }

    #[test]
    fn legalizer_and_validator_run_over_final_names() {
        let buf = b"A,B\n1,2\n";
        let cfg = default_config();
        let lower = |s: &str| s.to_lowercase();
        let non_empty = |s: &str| !s.is_empty();
        let h = resolve_header(buf, &cfg, Some(&lower), Some(&non_empty)).unwrap();
        assert_eq!(h.names, vec!["a", "b"]);
    }

    #[test]
    fn distributes_simple_rows_into_column_writers() {
        let buf = b"a,b\n1,2\n3,4\n";
        let cfg = default_config();
        let header = resolve_header(buf, &cfg, None, None).unwrap();
        let (w0, mut r0) = channel(4);
        let (w1, mut r1) = channel(4);
        let rows = distribute_rows(buf, &cfg, &header, vec![w0, w1]).unwrap();
        assert_eq!(rows, 2);
        assert_eq!(r0.try_get_next_slice().unwrap(), Some(b"1".to_vec()));
        assert_eq!(r0.try_get_next_slice().unwrap(), Some(b"3".to_vec()));
        assert_eq!(r0.try_get_next_slice().unwrap(), None);
        assert_eq!(r1.try_get_next_slice().unwrap(), Some(b"2".to_vec()));
        assert_eq!(r1.try_get_next_slice().unwrap(), Some(b"4".to_vec()));
        assert_eq!(r1.try_get_next_slice().unwrap(), None);
    }

    #[test]
    fn short_row_is_null_filled_when_allowed() {
        let buf = b"a,b,c\n1,2\n";
        let cfg = ReaderConfig { allow_missing_columns: true, ..default_config() };
        let header = resolve_header(buf, &cfg, None, None).unwrap();
        let (w0, mut r0) = channel(4);
        let (w1, mut r1) = channel(4);
        let (w2, mut r2) = channel(4);
        distribute_rows(buf, &cfg, &header, vec![w0, w1, w2]).unwrap();
        assert_eq!(r0.try_get_next_slice().unwrap(), Some(b"1".to_vec()));
        assert_eq!(r1.try_get_next_slice().unwrap(), Some(b"2".to_vec()));
        assert_eq!(r2.try_get_next_slice().unwrap(), Some(b"".to_vec()));
    }

    #[test]
    fn short_row_is_rejected_when_not_allowed() {
        let buf = b"a,b,c\n1,2\n";
        let cfg = default_config();
        let header = resolve_header(buf, &cfg, None, None).unwrap();
        let (w0, w1, w2) = (channel(4).0, channel(4).0, channel(4).0);
        assert!(matches!(
            distribute_rows(buf, &cfg, &header, vec![w0, w1, w2]),
            Err(CoreError::ShortRow { .. })
        ));
    }

    #[test]
    fn long_row_is_rejected_unless_ignored() {
        let buf = b"a,b\n1,2,3\n";
        let cfg = default_config();
        let header = resolve_header(buf, &cfg, None, None).unwrap();
        let (w0, w1) = (channel(4).0, channel(4).0);
        assert!(matches!(distribute_rows(buf, &cfg, &header, vec![w0, w1]), Err(CoreError::LongRow { .. })));

        let cfg2 = ReaderConfig { ignore_excess_columns: true, ..default_config() };
        let header2 = resolve_header(buf, &cfg2, None, None).unwrap();
        let (w0, mut r0) = channel(4);
        let (w1, mut r1) = channel(4);
        let rows = distribute_rows(buf, &cfg2, &header2, vec![w0, w1]).unwrap();
        assert_eq!(rows, 1);
        assert_eq!(r0.try_get_next_slice().unwrap(), Some(b"1".to_vec()));
        assert_eq!(r1.try_get_next_slice().unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn trailing_empty_data_cell_matching_header_is_dropped() {
        let buf = b"a,b,\n1,2,\n";
        let cfg = default_config();
        let header = resolve_header(buf, &cfg, None, None).unwrap();
        let (w0, mut r0) = channel(4);
        let (w1, mut r1) = channel(4);
        let rows = distribute_rows(buf, &cfg, &header, vec![w0, w1]).unwrap();
        assert_eq!(rows, 1);
        assert_eq!(r0.try_get_next_slice().unwrap(), Some(b"1".to_vec()));
        assert_eq!(r1.try_get_next_slice().unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn empty_lines_are_skipped_when_configured() {
        let buf = b"a,b\n1,2\n\n3,4\n";
        let cfg = ReaderConfig { ignore_empty_lines: true, ..default_config() };
        let header = resolve_header(buf, &cfg, None, None).unwrap();
        let (w0, mut r0) = channel(4);
        let (w1, mut r1) = channel(4);
        let rows = distribute_rows(buf, &cfg, &header, vec![w0, w1]).unwrap();
        assert_eq!(rows, 2);
        assert_eq!(r0.try_get_next_slice().unwrap(), Some(b"1".to_vec()));
        assert_eq!(r0.try_get_next_slice().unwrap(), Some(b"3".to_vec()));
        let _ = &mut r1;
    }

    #[test]
    fn fixed_width_header_infers_widths_and_data_start() {
        // Fixed-width cells are emitted without trimming (§4.3): column
        // widths are resolved from the header's "id   " / "name" spans, and
        // data rows keep their padding spaces verbatim except in the last
        // column, which always absorbs whatever bytes remain.
        let buf = b"id   name\n1    alice\n2    bob  \n";
        let cfg = ReaderConfig { has_fixed_width_columns: true, trim: false, ..default_config() };
        let h = resolve_header(buf, &cfg, None, None).unwrap();
        assert_eq!(h.names, vec!["id", "name"]);
        assert_eq!(h.fixed_widths, Some(vec![5, 4]));
        let (w0, mut r0) = channel(4);
        let (w1, mut r1) = channel(4);
        let rows = distribute_rows(buf, &cfg, &h, vec![w0, w1]).unwrap();
        assert_eq!(rows, 2);
        assert_eq!(r0.try_get_next_slice().unwrap(), Some(b"1    ".to_vec()));
        assert_eq!(r0.try_get_next_slice().unwrap(), Some(b"2    ".to_vec()));
        assert_eq!(r1.try_get_next_slice().unwrap(), Some(b"alice".to_vec()));
        assert_eq!(r1.try_get_next_slice().unwrap(), Some(b"bob  ".to_vec()));
    }

    #[test]
    fn max_rows_stops_distribution_early() {
        let buf = b"a,b\n1,2\n3,4\n5,6\n";
        let cfg = ReaderConfig { max_rows: Some(2), ..default_config() };
        let header = resolve_header(buf, &cfg, None, None).unwrap();
        let (w0, mut r0) = channel(4);
        let (w1, _r1) = channel(4);
        let rows = distribute_rows(buf, &cfg, &header, vec![w0, w1]).unwrap();
        assert_eq!(rows, 2);
        assert_eq!(r0.try_get_next_slice().unwrap(), Some(b"1".to_vec()));
        assert_eq!(r0.try_get_next_slice().unwrap(), Some(b"3".to_vec()));
    }
}
