//! The parser/Sink/Source protocol and the logical type catalog, §4.6.

/// Number of elements a single parser invocation batches into one write,
/// per §3's "Chunk" definition.
pub const CHUNK_CAPACITY: usize = 256 * 1024;

/// The resolution of a `TIMESTAMP_AS_LONG` column's epoch count.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TimestampScale {
    Seconds,
    Millis,
    Micros,
    Nanos,
}

/// The logical type catalog of §4.6.1.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum DataType {
    BooleanAsByte,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    String,
    DatetimeAsLong,
    TimestampAsLong(TimestampScale),
    /// A caller-supplied parser outside the built-in catalog, named for
    /// diagnostics.
    Custom(String),
}

/// A fixed-capacity batch of one primitive/reference type plus a parallel
/// null mask, owned by a single `tryParse` invocation.
pub struct Chunk<T> {
    values: Vec<T>,
    nulls: Vec<bool>,
}

impl<T> Chunk<T> {
    /// Creates an empty chunk with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Chunk { values: Vec::with_capacity(capacity), nulls: Vec::with_capacity(capacity) }
    }

    /// Appends one value and its null flag.
    pub fn push(&mut self, value: T, is_null: bool) {
        self.values.push(value);
        self.nulls.push(is_null);
    }

    /// The number of values currently held.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the chunk holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Empties the chunk without releasing its capacity.
    pub fn clear(&mut self) {
        self.values.clear();
        self.nulls.clear();
    }

    /// Borrows the values.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Borrows the null mask, parallel to [`Chunk::values`].
    pub fn nulls(&self) -> &[bool] {
        &self.nulls
    }
}

/// Caller-owned backing column store, §3.
///
/// Implementations must tolerate non-overlapping writes to arbitrary
/// `[dest_begin, dest_begin + values.len())` ranges arriving out of order
/// (the unification branch of §4.7 fills a final Sink's prefix after its
/// suffix is already in place), and must grow or pad with a default/null
/// value as needed. `appending` is a hint only: `true` means the range
/// starts at the sink's current logical length; implementations that don't
/// need the hint may ignore it.
pub trait Sink<T>: Send {
    /// Writes `values`/`nulls` (equal length) starting at `dest_begin`.
    fn write(&mut self, dest_begin: usize, values: &[T], nulls: &[bool], appending: bool);

    /// The number of positions written so far (including padding).
    fn len(&self) -> usize;
}

/// Optional read-back view over a [`Sink`] that has already been written
/// to, §3/§4.6. Only the integral sinks (byte/short/int/long) are required
/// to implement this; it lets the inference engine's unification branch
/// widen previously-parsed values without re-tokenizing the source text.
pub trait Source<T> {
    /// Reads `[begin, end)`, appending values and their null flags (in
    /// parallel) to `out_values`/`out_nulls`.
    ///
    /// Callers only ever request ranges previously written by the paired
    /// [`Sink`]; the null mask must round-trip exactly, since unification
    /// must not turn a null cell into a forged non-null default.
    fn read_into(&self, begin: usize, end: usize, out_values: &mut Vec<T>, out_nulls: &mut Vec<bool>);
}

/// Marker trait for a Sink that also offers read-back, used by the
/// inference engine to hold both interfaces behind one trait object
/// without requiring dynamic trait-object upcasting.
pub trait SinkSource<T>: Sink<T> + Source<T> {}
impl<T, S: Sink<T> + Source<T>> SinkSource<T> for S {}

/// A factory supplied by the caller: one constructor per logical type,
/// invoked on demand, per column, once inference has chosen that column's
/// type. May be called concurrently when `concurrent=true`.
pub trait SinkFactory: Send + Sync {
    fn make_bool_sink(&self, column: usize, sentinel: Option<u8>) -> Box<dyn Sink<u8>>;
    fn make_byte_sink(&self, column: usize, sentinel: Option<i8>) -> Box<dyn SinkSource<i8>>;
    fn make_short_sink(&self, column: usize, sentinel: Option<i16>) -> Box<dyn SinkSource<i16>>;
    fn make_int_sink(&self, column: usize, sentinel: Option<i32>) -> Box<dyn SinkSource<i32>>;
    fn make_long_sink(&self, column: usize, sentinel: Option<i64>) -> Box<dyn SinkSource<i64>>;
    fn make_float_sink(&self, column: usize, sentinel: Option<f32>) -> Box<dyn Sink<f32>>;
    fn make_double_sink(&self, column: usize, sentinel: Option<f64>) -> Box<dyn Sink<f64>>;
    fn make_char_sink(&self, column: usize, sentinel: Option<u16>) -> Box<dyn Sink<u16>>;
    fn make_string_sink(&self, column: usize) -> Box<dyn Sink<Option<Box<str>>>>;
    fn make_datetime_sink(&self, column: usize, sentinel: Option<i64>) -> Box<dyn Sink<i64>>;
    fn make_timestamp_sink(
        &self,
        column: usize,
        scale: TimestampScale,
        sentinel: Option<i64>,
    ) -> Box<dyn Sink<i64>>;
}

/// An in-memory [`Sink`]/[`Source`] over a plain `Vec<T>`, used by
/// [`VecSinkFactory`] and the test suite. Out-of-range writes pad with
/// `T::default()` (value side) and `true` (null side, so padding reads back
/// as null rather than a forged default value).
pub struct VecSink<T> {
    values: Vec<T>,
    nulls: Vec<bool>,
}

impl<T: Clone + Default> VecSink<T> {
    pub fn new() -> Self {
        VecSink { values: Vec::new(), nulls: Vec::new() }
    }

    /// Consumes the sink, returning its values and null mask.
    pub fn into_parts(self) -> (Vec<T>, Vec<bool>) {
        (self.values, self.nulls)
    }

    fn ensure_len(&mut self, len: usize) {
        if self.values.len() < len {
            self.values.resize(len, T::default());
            self.nulls.resize(len, true);
        }
    }
}

impl<T: Clone + Default> Default for VecSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Default + Send> Sink<T> for VecSink<T> {
    fn write(&mut self, dest_begin: usize, values: &[T], nulls: &[bool], _appending: bool) {
        self.ensure_len(dest_begin + values.len());
        for (i, (v, n)) in values.iter().zip(nulls).enumerate() {
            self.values[dest_begin + i] = v.clone();
            self.nulls[dest_begin + i] = *n;
        }
    }

    fn len(&self) -> usize {
        self.values.len()
    }
}

impl<T: Clone + Default + Send> Source<T> for VecSink<T> {
    fn read_into(&self, begin: usize, end: usize, out_values: &mut Vec<T>, out_nulls: &mut Vec<bool>) {
        out_values.extend_from_slice(&self.values[begin..end]);
        out_nulls.extend_from_slice(&self.nulls[begin..end]);
    }
}

/// A simple [`SinkFactory`] backed entirely by [`VecSink`]s, suitable for
/// in-process callers and tests that just want `Vec<T>` columns back.
#[derive(Default)]
pub struct VecSinkFactory;

impl SinkFactory for VecSinkFactory {
    fn make_bool_sink(&self, _column: usize, _sentinel: Option<u8>) -> Box<dyn Sink<u8>> {
        Box::new(VecSink::<u8>::new())
    }
    fn make_byte_sink(&self, _column: usize, _sentinel: Option<i8>) -> Box<dyn SinkSource<i8>> {
        Box::new(VecSink::<i8>::new())
    }
    fn make_short_sink(&self, _column: usize, _sentinel: Option<i16>) -> Box<dyn SinkSource<i16>> {
        Box::new(VecSink::<i16>::new())
    }
    fn make_int_sink(&self, _column: usize, _sentinel: Option<i32>) -> Box<dyn SinkSource<i32>> {
        Box::new(VecSink::<i32>::new())
    }
    fn make_long_sink(&self, _column: usize, _sentinel: Option<i64>) -> Box<dyn SinkSource<i64>> {
        Box::new(VecSink::<i64>::new())
    }
    fn make_float_sink(&self, _column: usize, _sentinel: Option<f32>) -> Box<dyn Sink<f32>> {
        Box::new(VecSink::<f32>::new())
    }
    fn make_double_sink(&self, _column: usize, _sentinel: Option<f64>) -> Box<dyn Sink<f64>> {
        Box::new(VecSink::<f64>::new())
    }
    fn make_char_sink(&self, _column: usize, _sentinel: Option<u16>) -> Box<dyn Sink<u16>> {
        Box::new(VecSink::<u16>::new())
    }
    fn make_string_sink(&self, _column: usize) -> Box<dyn Sink<Option<Box<str>>>> {
        Box::new(VecSink::<Option<Box<str>>>::new())
    }
    fn make_datetime_sink(&self, _column: usize, _sentinel: Option<i64>) -> Box<dyn Sink<i64>> {
        Box::new(VecSink::<i64>::new())
    }
    fn make_timestamp_sink(
        &self,
        _column: usize,
        _scale: TimestampScale,
        _sentinel: Option<i64>,
    ) -> Box<dyn Sink<i64>> {
        Box::new(VecSink::<i64>::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_pads_unwritten_prefix_as_null() {
        let mut sink = VecSink::<i32>::new();
        sink.write(3, &[10, 20], &[false, false], false);
        let (values, nulls) = sink.into_parts();
        assert_eq!(values, vec![0, 0, 0, 10, 20]);
        assert_eq!(nulls, vec![true, true, true, false, false]);
    }

    #[test]
    fn vec_sink_supports_out_of_order_writes() {
        let mut sink = VecSink::<i32>::new();
        sink.write(2, &[30], &[false], false);
        sink.write(0, &[10, 20], &[false, false], false);
        let (values, _) = sink.into_parts();
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[test]
    fn source_reads_back_written_range() {
        let mut sink = VecSink::<i64>::new();
        sink.write(0, &[1, 2, 3], &[false, false, false], true);
        let mut out = Vec::new();
        let mut out_nulls = Vec::new();
        Source::read_into(&sink, 1, 3, &mut out, &mut out_nulls);
        assert_eq!(out, vec![2, 3]);
        assert_eq!(out_nulls, vec![false, false]);
    }

    #[test]
    fn chunk_push_and_clear() {
        let mut chunk = Chunk::<i32>::with_capacity(4);
        chunk.push(1, false);
        chunk.push(0, true);
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.values(), &[1, 0]);
        assert_eq!(chunk.nulls(), &[false, true]);
        chunk.clear();
        assert!(chunk.is_empty());
    }
}
