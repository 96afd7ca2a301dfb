//! The fixed-width cell grabber, §4.3.

use memchr::memchr2;

use crate::byte_slice::ByteSlice;
use crate::config::ColumnWidth;
use crate::error::CoreError;

use super::GrabOutcome;

/// Returns the byte length of the UTF-8 sequence starting with `lead`.
fn utf8_char_len(lead: u8) -> usize {
    if lead < 0x80 {
        1
    } else if lead & 0xE0 == 0xC0 {
        2
    } else if lead & 0xF0 == 0xE0 {
        3
    } else if lead & 0xF8 == 0xF0 {
        4
    } else {
        // A stray continuation byte; treat defensively as its own unit so
        // callers always make forward progress.
        1
    }
}

/// The "unit cost" of one UTF-8 character under the configured counting
/// convention: every scalar costs 1 under the UTF-32 (scalar) convention;
/// under the UTF-16 convention, scalars outside the Basic Multilingual
/// Plane (4-byte UTF-8 sequences) cost 2 to account for the surrogate pair.
fn unit_cost(char_byte_len: usize, use_utf32_counting_convention: bool) -> usize {
    if use_utf32_counting_convention || char_byte_len != 4 {
        1
    } else {
        2
    }
}

/// Counts the number of configured-convention units spanned by `bytes`,
/// which must be valid UTF-8.
fn count_units(bytes: &[u8], use_utf32_counting_convention: bool) -> ColumnWidth {
    let mut units: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let len = utf8_char_len(bytes[i]).min(bytes.len() - i);
        units += unit_cost(len, use_utf32_counting_convention) as u32;
        i += len;
    }
    units
}

/// Converts a vector of column widths (in configured-convention units) to
/// byte widths for one concrete row. The last column always absorbs
/// whatever bytes remain, regardless of its configured width.
pub(crate) fn resolve_byte_widths(row: &[u8], widths: &[ColumnWidth], use_utf32_counting_convention: bool) -> Vec<usize> {
    let mut out = Vec::with_capacity(widths.len());
    let mut byte_pos = 0;
    for (i, &w) in widths.iter().enumerate() {
        if i == widths.len() - 1 {
            out.push(row.len() - byte_pos);
            break;
        }
        let mut units_needed = w as usize;
        let mut consumed = 0;
        while units_needed > 0 && byte_pos + consumed < row.len() {
            let lead = row[byte_pos + consumed];
            let char_len = utf8_char_len(lead).min(row.len() - byte_pos - consumed);
            let cost = unit_cost(char_len, use_utf32_counting_convention);
            consumed += char_len;
            units_needed = units_needed.saturating_sub(cost);
        }
        out.push(consumed);
        byte_pos += consumed;
    }
    out
}

/// Auto-infers column widths (in configured-convention units) from a header
/// row by treating a space-to-non-space transition as a column start.
///
/// A header row starting with a space is rejected, since there would be no
/// byte to anchor the first column's start at.
pub fn infer_column_widths(
    header_line: &[u8],
    use_utf32_counting_convention: bool,
) -> Result<Vec<ColumnWidth>, CoreError> {
    if header_line.first() == Some(&b' ') {
        return Err(CoreError::HeaderError {
            reason: "fixed-width header row must not start with a space".to_string(),
        });
    }
    if header_line.is_empty() {
        return Err(CoreError::HeaderError {
            reason: "fixed-width header row is empty".to_string(),
        });
    }

    let mut starts = vec![0usize];
    let mut prev_was_space = false;
    for (idx, &b) in header_line.iter().enumerate() {
        let is_space = b == b' ';
        if prev_was_space && !is_space {
            starts.push(idx);
        }
        prev_was_space = is_space;
    }
    starts.push(header_line.len());

    Ok(starts
        .windows(2)
        .map(|w| count_units(&header_line[w[0]..w[1]], use_utf32_counting_convention))
        .collect())
}

/// A degenerate line grabber: yields whole physical rows with no delimiter,
/// quote, or escape handling, per §4.3's "wraps a line grabber" framing.
struct LineGrabber<'a> {
    buf: &'a [u8],
    pos: usize,
    physical_row: u64,
}

impl<'a> LineGrabber<'a> {
    fn new(buf: &'a [u8]) -> Self {
        LineGrabber { buf, pos: 0, physical_row: 1 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Returns the next row's bytes (without its terminator) and whether
    /// the input is now fully exhausted.
    fn next_line(&mut self) -> Option<(&'a [u8], bool)> {
        if self.at_end() {
            return None;
        }
        let rest = &self.buf[self.pos..];
        match memchr2(b'\n', b'\r', rest) {
            Some(i) => {
                let line = &rest[..i];
                let mut consumed = i + 1;
                if rest[i] == b'\r' && rest.get(i + 1) == Some(&b'\n') {
                    consumed += 1;
                }
                self.pos += consumed;
                self.physical_row += 1;
                Some((line, self.at_end()))
            }
            None => {
                self.pos = self.buf.len();
                Some((rest, true))
            }
        }
    }
}

/// Advances past `n` whole physical rows without tokenizing them, for the
/// framing coordinator's `skip_rows`/`skip_header_rows` handling in
/// fixed-width mode, where column widths aren't resolved yet.
pub(crate) fn skip_raw_lines(buf: &[u8], n: usize) -> &[u8] {
    let mut line = LineGrabber::new(buf);
    for _ in 0..n {
        if line.next_line().is_none() {
            break;
        }
    }
    &buf[line.pos..]
}

/// Splits off the next physical row (without its terminator) from `buf`,
/// along with what remains after it. Used to read the header row before
/// column widths are known.
pub(crate) fn take_first_line(buf: &[u8]) -> Result<(&[u8], &[u8]), CoreError> {
    let mut line = LineGrabber::new(buf);
    match line.next_line() {
        Some((row, _)) => Ok((row, &buf[line.pos..])),
        None => Err(CoreError::HeaderError { reason: "no header row available in fixed-width input".to_string() }),
    }
}

/// Tokenizes bytes into fixed-width cells.
pub struct FixedWidthGrabber<'a> {
    line: LineGrabber<'a>,
    widths: Vec<ColumnWidth>,
    use_utf32_counting_convention: bool,
    current_row: Vec<ByteSlice<'a>>,
    current_row_end_of_input: bool,
    next_cell: usize,
}

impl<'a> FixedWidthGrabber<'a> {
    /// Creates a grabber over `buf` with already-resolved column widths
    /// (either supplied directly, or obtained from
    /// [`infer_column_widths`] applied to the header row).
    pub fn new(buf: &'a [u8], widths: Vec<ColumnWidth>, use_utf32_counting_convention: bool) -> Self {
        FixedWidthGrabber {
            line: LineGrabber::new(buf),
            widths,
            use_utf32_counting_convention,
            current_row: Vec::new(),
            current_row_end_of_input: false,
            next_cell: 0,
        }
    }

    /// The current 1-based physical row number.
    pub fn physical_row(&self) -> u64 {
        self.line.physical_row
    }

    /// Whether the grabber has no more rows to yield.
    pub fn at_end(&self) -> bool {
        self.next_cell >= self.current_row.len() && self.line.at_end()
    }

    fn load_next_row(&mut self) -> bool {
        match self.line.next_line() {
            Some((row, end_of_input)) => {
                let byte_widths = resolve_byte_widths(row, &self.widths, self.use_utf32_counting_convention);
                let mut cells = Vec::with_capacity(byte_widths.len());
                let mut pos = 0;
                for &len in &byte_widths {
                    let end = (pos + len).min(row.len());
                    cells.push(ByteSlice::new(row, pos, end));
                    pos = end;
                }
                self.current_row = cells;
                self.current_row_end_of_input = end_of_input;
                self.next_cell = 0;
                true
            }
            None => false,
        }
    }

    /// Produces the next cell.
    pub fn grab_next(&mut self) -> Result<GrabOutcome<'_>, CoreError> {
        if self.next_cell >= self.current_row.len() && !self.load_next_row() {
            return Err(CoreError::HeaderError {
                reason: "grab_next called with no more rows available".to_string(),
            });
        }
        let cell = self.current_row[self.next_cell];
        self.next_cell += 1;
        let last_in_row = self.next_cell >= self.current_row.len();
        let end_of_input = last_in_row && self.current_row_end_of_input;
        Ok(GrabOutcome { cell, last_in_row, end_of_input })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_widths_from_header_transitions() {
        let widths = infer_column_widths(b"id   name       age", true).unwrap();
        // "id   " (5) "name       " (11) "age" (3)
        assert_eq!(widths, vec![5, 11, 3]);
    }

    #[test]
    fn header_starting_with_space_is_rejected() {
        assert!(infer_column_widths(b" id  name", true).is_err());
    }

    #[test]
    fn fixed_width_row_splits_by_widths_last_column_absorbs_remainder() {
        let mut g = FixedWidthGrabber::new(b"ab1234extra\n", vec![2, 4], true);
        let first = g.grab_next().unwrap();
        assert_eq!(first.cell.data(), b"ab");
        assert!(!first.last_in_row);
        let second = g.grab_next().unwrap();
        assert_eq!(second.cell.data(), b"1234extra");
        assert!(second.last_in_row);
    }

    #[test]
    fn multiple_rows_are_yielded_in_order() {
        let mut g = FixedWidthGrabber::new(b"aabbb\nccddd\n", vec![2, 3], true);
        assert_eq!(g.grab_next().unwrap().cell.data(), b"aa");
        let second = g.grab_next().unwrap();
        assert_eq!(second.cell.data(), b"bbb");
        assert!(second.last_in_row);
        assert_eq!(g.grab_next().unwrap().cell.data(), b"cc");
        let fourth = g.grab_next().unwrap();
        assert_eq!(fourth.cell.data(), b"ddd");
        assert!(fourth.last_in_row);
        assert!(fourth.end_of_input);
    }

    #[test]
    fn utf16_counting_treats_astral_scalars_as_width_two() {
        // "😀" is a 4-byte UTF-8 sequence representing one astral scalar,
        // which costs 2 units under the UTF-16 convention.
        let row = "😀bc".as_bytes();
        let widths = resolve_byte_widths(row, &[3, 1], false);
        assert_eq!(widths[0], row.len() - 1); // the astral scalar (4 bytes) + "b" (1 byte)
        assert_eq!(widths[1], 1);
    }

    #[test]
    fn utf32_counting_treats_every_scalar_as_width_one() {
        let row = "😀bc".as_bytes();
        let widths = resolve_byte_widths(row, &[1, 2], true);
        let astral_len = "😀".len();
        assert_eq!(widths[0], astral_len);
        assert_eq!(widths[1], 2);
    }

    #[test]
    fn crlf_and_lone_cr_and_lf_all_advance_one_physical_row() {
        let mut g = FixedWidthGrabber::new(b"aa\r\nbb\rcc\n", vec![2], true);
        assert_eq!(g.grab_next().unwrap().cell.data(), b"aa");
        assert_eq!(g.grab_next().unwrap().cell.data(), b"bb");
        assert_eq!(g.grab_next().unwrap().cell.data(), b"cc");
        assert_eq!(g.physical_row(), 4);
    }
}
