//! DenseStorage: the dense, page-granular columnar pipeline between the
//! cell grabber and the type-inference engine, §4.4 and §6.7.
//!
//! A writer packs cells into a flat byte page plus a side page of owned
//! large-cell arrays, and periodically publishes an immutable [`QueueNode`]
//! onto a singly-linked chain. One or more readers walk the same chain
//! independently, each blocking on a `parking_lot::Condvar` when it catches
//! up to the writer and each observing cells in exactly the order they were
//! written. A counting semaphore bounds how far the writer may run ahead of
//! the slowest reader.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::byte_slice::ByteSlice;
use crate::error::CoreError;

/// Control word meaning "no more cells in this stream".
const END_SENTINEL: i32 = -2;
/// Control word meaning "the next cell is in the large-cell page".
const LARGE_SENTINEL: i32 = -1;
/// Cells at or above this size are stored out-of-line in the large-cell
/// page instead of inline in the packed page.
pub const LARGE_THRESHOLD: usize = 1024;
/// Default packed-page capacity.
const PACKED_PAGE_CAPACITY: usize = 64 * 1024;
/// Default number of unobserved pages the writer may run ahead by.
pub const DEFAULT_MAX_UNOBSERVED_PAGES: usize = 4;

/// One immutable published segment of the control stream.
///
/// Every field but `next` is fixed at publication time; `next` transitions
/// `None` to `Some` exactly once, guarded by `link`'s mutex/condvar.
struct QueueNode {
    packed: Vec<u8>,
    large: Vec<Arc<[u8]>>,
    link: Mutex<Option<Arc<QueueNode>>>,
    link_ready: Condvar,
    /// Set by the first reader to observe `link` become populated, so later
    /// readers crossing the same boundary do not also release a permit.
    crossing_observed: Mutex<bool>,
}

impl QueueNode {
    fn empty_tail() -> Self {
        QueueNode {
            packed: Vec::new(),
            large: Vec::new(),
            link: Mutex::new(None),
            link_ready: Condvar::new(),
            crossing_observed: Mutex::new(false),
        }
    }
}

/// The shared backpressure semaphore and QueueNode chain tail, held by the
/// writer and handed out (cloned as `Arc`) to every reader.
struct Shared {
    semaphore: Mutex<usize>,
    semaphore_ready: Condvar,
    max_unobserved_pages: usize,
}

/// The write half of a DenseStorage column stream.
///
/// Constructed via [`channel`]; call [`DenseStorageWriter::append`] once per
/// cell and [`DenseStorageWriter::finish`] exactly once when the column is
/// exhausted.
pub struct DenseStorageWriter {
    shared: Arc<Shared>,
    tail: Arc<QueueNode>,
    packed: Vec<u8>,
    large: Vec<Arc<[u8]>>,
    finished: bool,
}

/// The read half of a DenseStorage column stream. Cloned cheaply (an
/// `Arc`-backed cursor) to give the two-phase inference engine independent
/// concurrent readers over identical content.
#[derive(Clone)]
pub struct DenseStorageReader {
    shared: Arc<Shared>,
    node: Arc<QueueNode>,
    /// Byte offset into `node.packed`.
    packed_pos: usize,
    /// Index into `node.large`.
    large_pos: usize,
}

/// Creates a writer and its first reader over a fresh, empty chain.
pub fn channel(max_unobserved_pages: usize) -> (DenseStorageWriter, DenseStorageReader) {
    let shared = Arc::new(Shared {
        semaphore: Mutex::new(max_unobserved_pages),
        semaphore_ready: Condvar::new(),
        max_unobserved_pages,
    });
    let tail = Arc::new(QueueNode::empty_tail());
    let writer = DenseStorageWriter {
        shared: Arc::clone(&shared),
        tail: Arc::clone(&tail),
        packed: Vec::with_capacity(PACKED_PAGE_CAPACITY),
        large: Vec::new(),
        finished: false,
    };
    let reader = DenseStorageReader { shared, node: tail, packed_pos: 0, large_pos: 0 };
    (writer, reader)
}

impl DenseStorageWriter {
    /// Writes one cell's bytes into the stream.
    pub fn append(&mut self, slice: ByteSlice<'_>) {
        debug_assert!(!self.finished, "append after finish");
        let prospective_packed_bytes = if slice.size() >= LARGE_THRESHOLD { 4 } else { 4 + slice.size() };
        if self.packed.len() + prospective_packed_bytes > PACKED_PAGE_CAPACITY && !self.packed.is_empty() {
            self.rotate_page();
        }
        if slice.size() >= LARGE_THRESHOLD {
            self.packed.extend_from_slice(&LARGE_SENTINEL.to_le_bytes());
            self.large.push(Arc::from(slice.data()));
        } else {
            self.packed.extend_from_slice(&(slice.size() as i32).to_le_bytes());
            self.packed.extend_from_slice(slice.data());
        }
    }

    /// Ends the stream: appends the END sentinel and publishes the final
    /// page as a terminal `QueueNode` with no successor.
    pub fn finish(mut self) {
        self.packed.extend_from_slice(&END_SENTINEL.to_le_bytes());
        let tail = self.tail.clone();
        self.publish(&tail);
        self.finished = true;
    }

    /// Publishes the currently-accumulated pages into a fresh `QueueNode`,
    /// acquires a backpressure permit, and starts new empty pages.
    fn rotate_page(&mut self) {
        let published = self.tail.clone();
        self.publish(&published);
        self.acquire_permit();
        self.tail = Arc::new(QueueNode::empty_tail());
        self.packed = Vec::with_capacity(PACKED_PAGE_CAPACITY);
        self.large = Vec::new();
    }

    /// Fills `node`'s payload and atomically splices a fresh successor tail
    /// onto it, waking any reader blocked on the boundary.
    fn publish(&mut self, node: &Arc<QueueNode>) {
        // Safety of this "fill a previously-empty node" pattern relies on
        // `node` not yet being visible to any reader beyond its `link`
        // pointer — the packed/large Vecs are written here, once, before
        // `link` is populated, and never touched again.
        //
        // We can't mutate through `Arc` directly, so the node itself is
        // built empty and then spliced: the writer keeps the *next* node's
        // contents in `self.packed`/`self.large` until rotation, and here
        // we hand them off by constructing the real node fresh and
        // swapping `self.tail`'s link to point at it.
        let packed = std::mem::take(&mut self.packed);
        let large = std::mem::take(&mut self.large);
        let filled = Arc::new(QueueNode {
            packed,
            large,
            link: Mutex::new(None),
            link_ready: Condvar::new(),
            crossing_observed: Mutex::new(false),
        });
        let mut link = node.link.lock();
        *link = Some(filled);
        node.link_ready.notify_all();
    }

    fn acquire_permit(&self) {
        let mut permits = self.shared.semaphore.lock();
        if *permits == 0 {
            log::trace!("writer blocked on backpressure semaphore (max_unobserved_pages={})", self.shared.max_unobserved_pages);
        }
        while *permits == 0 {
            self.shared.semaphore_ready.wait(&mut permits);
        }
        *permits -= 1;
    }
}

impl DenseStorageReader {
    /// Reads the next cell, or `None` at the END sentinel.
    ///
    /// Mirrors `tryGetNextSlice`: the control word is `END` (stop),
    /// `LARGE` (pop from the large-cell page), or a non-negative length
    /// (take that many bytes from the packed page). Crossing a page
    /// boundary blocks on the successor link until the writer publishes it;
    /// the first reader to observe a given transition releases one
    /// backpressure permit on the writer's behalf.
    pub fn try_get_next_slice(&mut self) -> Result<Option<Vec<u8>>, CoreError> {
        loop {
            if self.packed_pos + 4 > self.node.packed.len() {
                if !self.advance_to_next_node()? {
                    return Ok(None);
                }
                continue;
            }
            let control = i32::from_le_bytes(
                self.node.packed[self.packed_pos..self.packed_pos + 4]
                    .try_into()
                    .expect("slice of length 4"),
            );
            self.packed_pos += 4;
            match control {
                END_SENTINEL => return Ok(None),
                LARGE_SENTINEL => {
                    let bytes = self.node.large[self.large_pos].to_vec();
                    self.large_pos += 1;
                    return Ok(Some(bytes));
                }
                len if len >= 0 => {
                    let len = len as usize;
                    let bytes = self.node.packed[self.packed_pos..self.packed_pos + len].to_vec();
                    self.packed_pos += len;
                    return Ok(Some(bytes));
                }
                other => unreachable!("control word {other} outside {{-2,-1}} union non-negative"),
            }
        }
    }

    /// Blocks until the current node's successor is published, then moves
    /// the cursor onto it. Returns `false` if the current node was already
    /// terminal (end-of-stream with no successor ever coming).
    fn advance_to_next_node(&mut self) -> Result<bool, CoreError> {
        let next = {
            let mut link = self.node.link.lock();
            loop {
                if let Some(next) = link.as_ref() {
                    break Arc::clone(next);
                }
                self.node.link_ready.wait(&mut link);
            }
        };

        {
            let mut observed = self.node.crossing_observed.lock();
            if !*observed {
                *observed = true;
                let mut permits = self.shared.semaphore.lock();
                *permits += 1;
                self.shared.semaphore_ready.notify_one();
                log::trace!("reader crossed page boundary, released one backpressure permit");
            }
        }

        self.node = next;
        self.packed_pos = 0;
        self.large_pos = 0;
        Ok(true)
    }

    /// The configured backpressure bound, for diagnostics/tests.
    pub fn max_unobserved_pages(&self) -> usize {
        self.shared.max_unobserved_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(bytes: &[u8]) -> ByteSlice<'_> {
        ByteSlice::whole(bytes)
    }

    #[test]
    fn round_trips_small_cells_in_order() {
        let (mut w, mut r) = channel(DEFAULT_MAX_UNOBSERVED_PAGES);
        w.append(slice(b"alpha"));
        w.append(slice(b"beta"));
        w.append(slice(b""));
        w.finish();

        assert_eq!(r.try_get_next_slice().unwrap(), Some(b"alpha".to_vec()));
        assert_eq!(r.try_get_next_slice().unwrap(), Some(b"beta".to_vec()));
        assert_eq!(r.try_get_next_slice().unwrap(), Some(b"".to_vec()));
        assert_eq!(r.try_get_next_slice().unwrap(), None);
    }

    #[test]
    fn large_cells_round_trip_through_the_side_page() {
        let big = vec![b'x'; LARGE_THRESHOLD + 17];
        let (mut w, mut r) = channel(DEFAULT_MAX_UNOBSERVED_PAGES);
        w.append(slice(&big));
        w.append(slice(b"small"));
        w.finish();

        assert_eq!(r.try_get_next_slice().unwrap(), Some(big));
        assert_eq!(r.try_get_next_slice().unwrap(), Some(b"small".to_vec()));
        assert_eq!(r.try_get_next_slice().unwrap(), None);
    }

    #[test]
    fn page_rotation_splits_many_cells_across_nodes() {
        let (mut w, mut r) = channel(DEFAULT_MAX_UNOBSERVED_PAGES);
        let cell = vec![b'y'; 100];
        let n = (PACKED_PAGE_CAPACITY / 104) * 3;
        for _ in 0..n {
            w.append(slice(&cell));
        }
        w.finish();

        for _ in 0..n {
            assert_eq!(r.try_get_next_slice().unwrap(), Some(cell.clone()));
        }
        assert_eq!(r.try_get_next_slice().unwrap(), None);
    }

    #[test]
    fn multiple_independent_readers_see_the_same_order() {
        let (mut w, r1) = channel(DEFAULT_MAX_UNOBSERVED_PAGES);
        let mut r2 = r1.clone();
        let mut r1 = r1;
        w.append(slice(b"one"));
        w.append(slice(b"two"));
        w.finish();

        assert_eq!(r1.try_get_next_slice().unwrap(), Some(b"one".to_vec()));
        assert_eq!(r2.try_get_next_slice().unwrap(), Some(b"one".to_vec()));
        assert_eq!(r2.try_get_next_slice().unwrap(), Some(b"two".to_vec()));
        assert_eq!(r1.try_get_next_slice().unwrap(), Some(b"two".to_vec()));
        assert_eq!(r1.try_get_next_slice().unwrap(), None);
        assert_eq!(r2.try_get_next_slice().unwrap(), None);
    }

    #[test]
    fn writer_and_reader_on_separate_threads_round_trip() {
        let (mut w, mut r) = channel(2);
        std::thread::scope(|scope| {
            scope.spawn(move || {
                for i in 0..5000u32 {
                    w.append(slice(i.to_string().as_bytes()));
                }
                w.finish();
            });
            scope.spawn(move || {
                for i in 0..5000u32 {
                    assert_eq!(r.try_get_next_slice().unwrap(), Some(i.to_string().into_bytes()));
                }
                assert_eq!(r.try_get_next_slice().unwrap(), None);
            });
        });
    }
}
