//! The delimited (quoted-CSV) cell grabber, §4.2 and §4.2.1.

use crate::byte_slice::{ByteSlice, GrowableByteBuffer};
use crate::error::CoreError;

use super::GrabOutcome;

/// Maps an escaped byte to its expanded form, per §4.2.1. Returns `None` for
/// CR, LF, and any byte with the high bit set, which are rejected.
fn expand_escaped_byte(x: u8) -> Option<u8> {
    if x == b'\r' || x == b'\n' || x >= 0x80 {
        return None;
    }
    Some(match x {
        b'b' => 0x08,
        b't' => 0x09,
        b'n' => 0x0A,
        b'r' => 0x0D,
        b'f' => 0x0C,
        other => other,
    })
}

/// Tokenizes bytes into cells while honoring quoting, escaping, and record
/// delimiters.
///
/// `quote`, `escape`, and `delimiter` must be 7-bit ASCII; this is enforced
/// by [`crate::config::ReaderConfig::validate`] before a grabber is built.
pub struct DelimitedGrabber<'a> {
    buf: &'a [u8],
    pos: usize,
    spill: GrowableByteBuffer,
    quote: u8,
    escape: Option<u8>,
    delimiter: u8,
    ignore_surrounding_spaces: bool,
    trim: bool,
    physical_row: u64,
}

impl<'a> DelimitedGrabber<'a> {
    /// Creates a grabber over `buf`.
    pub fn new(
        buf: &'a [u8],
        delimiter: u8,
        quote: u8,
        escape: Option<u8>,
        ignore_surrounding_spaces: bool,
        trim: bool,
    ) -> Self {
        DelimitedGrabber {
            buf,
            pos: 0,
            spill: GrowableByteBuffer::new(),
            quote,
            escape,
            delimiter,
            ignore_surrounding_spaces,
            trim,
            physical_row: 1,
        }
    }

    /// Whether the grabber has consumed the entire input.
    pub fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// The current byte offset, for error reporting.
    pub fn offset(&self) -> u64 {
        self.pos as u64
    }

    /// The current 1-based physical row number (CR, LF, and CRLF each
    /// advance this exactly once).
    pub fn physical_row(&self) -> u64 {
        self.physical_row
    }

    /// Skips `n` whole physical rows without tokenizing their cells, by
    /// scanning for row terminators only. Used by the framing coordinator
    /// to honor `skip_rows`/`skip_header_rows`.
    pub fn skip_rows(&mut self, n: usize) {
        for _ in 0..n {
            if self.at_end() {
                return;
            }
            loop {
                match self.peek() {
                    None => return,
                    Some(b'\n') => {
                        self.pos += 1;
                        self.physical_row += 1;
                        break;
                    }
                    Some(b'\r') => {
                        self.pos += 1;
                        if self.peek() == Some(b'\n') {
                            self.pos += 1;
                        }
                        self.physical_row += 1;
                        break;
                    }
                    Some(_) => self.pos += 1,
                }
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn is_escape(&self, b: u8) -> bool {
        self.escape == Some(b)
    }

    /// Consumes the escape character (already advanced past by the caller)
    /// and the byte it escapes, returning the expanded byte.
    fn expand_escape(&mut self) -> Result<u8, CoreError> {
        let escape_offset = self.pos as u64 - 1;
        let Some(x) = self.peek() else {
            return Err(CoreError::MalformedEscape {
                offset: escape_offset,
                reason: "escape character at end of input",
            });
        };
        match expand_escaped_byte(x) {
            Some(mapped) => {
                self.pos += 1;
                Ok(mapped)
            }
            None if x == b'\r' || x == b'\n' => Err(CoreError::MalformedEscape {
                offset: escape_offset,
                reason: "cannot escape a line terminator",
            }),
            None => Err(CoreError::MalformedEscape {
                offset: escape_offset,
                reason: "cannot escape a non-ASCII byte",
            }),
        }
    }

    /// Produces the next cell.
    pub fn grab_next(&mut self) -> Result<GrabOutcome<'_>, CoreError> {
        self.spill.clear();
        if self.ignore_surrounding_spaces {
            while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
                self.pos += 1;
            }
        }
        if self.at_end() {
            return Ok(GrabOutcome {
                cell: ByteSlice::new(self.buf, self.pos, self.pos),
                last_in_row: true,
                end_of_input: true,
            });
        }
        let start = self.pos;
        if self.peek() == Some(self.quote) {
            self.pos += 1;
            self.grab_quoted(self.pos)
        } else {
            self.grab_unquoted(start)
        }
    }

    fn grab_quoted(&mut self, value_start: usize) -> Result<GrabOutcome<'_>, CoreError> {
        let mut seg_start = value_start;
        let mut spilled = false;
        let value_end;
        loop {
            match self.peek() {
                None => {
                    return Err(CoreError::MalformedQuoting {
                        offset: self.pos as u64,
                        reason: "quoted cell reached end of input without a closing quote",
                    });
                }
                Some(b'\n') => {
                    self.pos += 1;
                    self.physical_row += 1;
                }
                Some(b'\r') => {
                    self.pos += 1;
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                    }
                    self.physical_row += 1;
                }
                Some(b) if self.is_escape(b) => {
                    self.spill.append(self.buf, seg_start, self.pos - seg_start);
                    self.pos += 1;
                    let mapped = self.expand_escape()?;
                    self.spill.push(mapped);
                    seg_start = self.pos;
                    spilled = true;
                }
                Some(b) if b == self.quote => {
                    self.pos += 1;
                    if self.peek() == Some(self.quote) {
                        // `""` inside a quoted cell collapses to one `"`.
                        self.spill.append(self.buf, seg_start, self.pos - seg_start);
                        self.pos += 1;
                        seg_start = self.pos;
                        spilled = true;
                        continue;
                    }
                    value_end = self.pos - 1;
                    if spilled {
                        self.spill.append(self.buf, seg_start, value_end - seg_start);
                    }
                    break;
                }
                Some(_) => self.pos += 1,
            }
        }

        // Consume trailing whitespace between the closing quote and the
        // next delimiter/terminator, rejecting anything else.
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }

        let mut cell = if spilled {
            self.spill.as_byte_slice()
        } else {
            ByteSlice::new(self.buf, value_start, value_end)
        };
        if self.trim {
            cell.trim_spaces_and_tabs();
        }

        match self.peek() {
            Some(b) if b == self.delimiter => {
                self.pos += 1;
                Ok(GrabOutcome { cell, last_in_row: false, end_of_input: false })
            }
            Some(b'\n') => {
                self.pos += 1;
                self.physical_row += 1;
                Ok(GrabOutcome { cell, last_in_row: true, end_of_input: self.at_end() })
            }
            Some(b'\r') => {
                self.pos += 1;
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
                self.physical_row += 1;
                Ok(GrabOutcome { cell, last_in_row: true, end_of_input: self.at_end() })
            }
            None => Ok(GrabOutcome { cell, last_in_row: true, end_of_input: true }),
            Some(_) => Err(CoreError::MalformedQuoting {
                offset: self.pos as u64,
                reason: "trailing data after closing quote",
            }),
        }
    }

    fn grab_unquoted(&mut self, start: usize) -> Result<GrabOutcome<'_>, CoreError> {
        let mut seg_start = start;
        let mut spilled = false;
        loop {
            match self.peek() {
                None => {
                    if spilled {
                        self.spill.append(self.buf, seg_start, self.pos - seg_start);
                    }
                    let mut cell = if spilled {
                        self.spill.as_byte_slice()
                    } else {
                        ByteSlice::new(self.buf, start, self.pos)
                    };
                    if self.ignore_surrounding_spaces {
                        cell.trim_spaces_and_tabs();
                    }
                    return Ok(GrabOutcome { cell, last_in_row: true, end_of_input: true });
                }
                Some(b) if b == self.delimiter => {
                    let value_end = self.pos;
                    self.pos += 1;
                    return self.finish_unquoted(start, seg_start, value_end, spilled, false, false);
                }
                Some(b'\n') => {
                    let value_end = self.pos;
                    self.pos += 1;
                    self.physical_row += 1;
                    let eoi = self.at_end();
                    return self.finish_unquoted(start, seg_start, value_end, spilled, true, eoi);
                }
                Some(b'\r') => {
                    let value_end = self.pos;
                    self.pos += 1;
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                    }
                    self.physical_row += 1;
                    let eoi = self.at_end();
                    return self.finish_unquoted(start, seg_start, value_end, spilled, true, eoi);
                }
                Some(b) if self.is_escape(b) => {
                    self.spill.append(self.buf, seg_start, self.pos - seg_start);
                    self.pos += 1;
                    let mapped = self.expand_escape()?;
                    self.spill.push(mapped);
                    seg_start = self.pos;
                    spilled = true;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn finish_unquoted(
        &mut self,
        start: usize,
        seg_start: usize,
        value_end: usize,
        spilled: bool,
        last_in_row: bool,
        end_of_input: bool,
    ) -> Result<GrabOutcome<'_>, CoreError> {
        if spilled {
            self.spill.append(self.buf, seg_start, value_end - seg_start);
        }
        let mut cell = if spilled {
            self.spill.as_byte_slice()
        } else {
            ByteSlice::new(self.buf, start, value_end)
        };
        if self.ignore_surrounding_spaces {
            cell.trim_spaces_and_tabs();
        }
        Ok(GrabOutcome { cell, last_in_row, end_of_input })
    }
}
