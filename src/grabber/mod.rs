//! Cell grabbers: the tokenizers that turn raw bytes into successive cells
//! (§4.2, §4.3).
//!
//! Both implementations operate over a fully-addressable in-memory byte
//! buffer rather than a bounded streaming refill window (see `DESIGN.md`
//! for why); [`crate::byte_slice::GrowableByteBuffer`] is still used for its
//! other documented purpose — giving escape expansion and quoted-quote
//! collapsing a place to produce contiguous output when the returned cell
//! can no longer be a plain view into the input.

mod delimited;
mod fixed_width;

pub use delimited::DelimitedGrabber;
pub use fixed_width::{infer_column_widths, FixedWidthGrabber};
pub(crate) use fixed_width::{resolve_byte_widths, skip_raw_lines, take_first_line};

use crate::byte_slice::ByteSlice;

/// The result of one [`DelimitedGrabber::grab_next`] or
/// [`FixedWidthGrabber::grab_next`] call.
#[derive(Debug)]
pub struct GrabOutcome<'a> {
    /// The cell's bytes.
    pub cell: ByteSlice<'a>,
    /// Whether this cell is the last one in its row.
    pub last_in_row: bool,
    /// Whether the input is fully exhausted after this cell.
    pub end_of_input: bool,
}
