//! Zero-copy views and small owned buffers over UTF-8 bytes.
//!
//! [`ByteSlice`] is the non-owning triple the rest of the crate passes
//! around for a single cell's bytes. [`GrowableByteBuffer`] is the owned,
//! amortized-growth buffer the grabber spills into whenever a cell would
//! otherwise straddle a refill boundary or contain an escape sequence.

/// A read-only view into a byte buffer, expressed as `[begin, end)` within
/// some backing storage.
///
/// The view does not own `data`; its validity ends whenever the owning page
/// or buffer is released or reused.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ByteSlice<'a> {
    data: &'a [u8],
    begin: usize,
    end: usize,
}

impl<'a> ByteSlice<'a> {
    /// Creates a slice over `data[begin..end]`.
    ///
    /// # Panics
    ///
    /// Panics if `begin > end` or `end > data.len()`.
    pub fn new(data: &'a [u8], begin: usize, end: usize) -> Self {
        assert!(begin <= end && end <= data.len());
        ByteSlice { data, begin, end }
    }

    /// Creates a slice spanning the whole of `data`.
    pub fn whole(data: &'a [u8]) -> Self {
        ByteSlice { data, begin: 0, end: data.len() }
    }

    /// Re-targets this view to `data[begin..end]`, reusing the storage.
    ///
    /// # Panics
    ///
    /// Panics if `begin > end` or `end > data.len()`.
    pub fn reset(&mut self, data: &'a [u8], begin: usize, end: usize) {
        assert!(begin <= end && end <= data.len());
        self.data = data;
        self.begin = begin;
        self.end = end;
    }

    /// The number of bytes in the view.
    pub fn size(&self) -> usize {
        self.end - self.begin
    }

    /// Returns `true` if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Borrows the bytes covered by this view.
    pub fn data(&self) -> &'a [u8] {
        &self.data[self.begin..self.end]
    }

    /// Copies this view's bytes into `dst` starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `dst[offset..]` is shorter than the view.
    pub fn copy_to(&self, dst: &mut [u8], offset: usize) {
        dst[offset..offset + self.size()].copy_from_slice(self.data());
    }

    /// Trims leading and trailing spaces (`0x20`) and tabs (`0x09`) in place.
    pub fn trim_spaces_and_tabs(&mut self) {
        let bytes = &self.data[self.begin..self.end];
        let leading = bytes.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
        let trailing = bytes
            .iter()
            .rev()
            .take_while(|&&b| b == b' ' || b == b'\t')
            .count();
        let new_begin = self.begin + leading;
        let new_end = self.end.saturating_sub(trailing).max(new_begin);
        self.begin = new_begin;
        self.end = new_end;
    }
}

/// An owned, amortized-growth byte buffer.
///
/// Used by the grabber whenever a cell's bytes cannot be returned as a
/// single contiguous view into the refill page — either because the cell
/// straddles a page boundary or because an escape sequence expanded into
/// fewer bytes than it consumed.
#[derive(Clone, Debug, Default)]
pub struct GrowableByteBuffer {
    buf: Vec<u8>,
}

impl GrowableByteBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        GrowableByteBuffer { buf: Vec::new() }
    }

    /// Creates an empty buffer with room for at least `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        GrowableByteBuffer { buf: Vec::with_capacity(capacity) }
    }

    /// The number of bytes currently stored.
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Borrows the stored bytes.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Appends `src[off..off + len]` to the buffer.
    ///
    /// Growth is amortized O(1) per byte: `Vec::extend_from_slice` doubles
    /// capacity on overflow exactly like the packed pages it backstops.
    pub fn append(&mut self, src: &[u8], off: usize, len: usize) {
        self.buf.extend_from_slice(&src[off..off + len]);
    }

    /// Appends a single byte, e.g. the result of escape expansion.
    pub fn push(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Empties the buffer without releasing its capacity.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Borrows the buffer's contents as a [`ByteSlice`].
    pub fn as_byte_slice(&self) -> ByteSlice<'_> {
        ByteSlice::whole(&self.buf)
    }
}
