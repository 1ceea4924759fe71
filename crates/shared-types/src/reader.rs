//! # KVEntry Readers
//!
//! A `KVEntryReader` streams `KVEntry` values out of some ordered source.
//!
//! ## Contract
//!
//! - `read()` yields `Ok(Some(entry))` for every entry in order, then
//!   `Ok(None)` exactly once to mark the end of the stream.
//! - Any `read()` after the end was reported fails with
//!   [`KVEntryError::ReadPastEnd`].
//! - `close()` releases the backing resource; any later `read()` fails with
//!   [`KVEntryError::Closed`].
//!
//! ## Sources
//!
//! | Reader | Backed by |
//! |--------|-----------|
//! | [`KVIteratorReader`] | an [`OrderedIterator`] from the chain store |
//! | [`KVEntrySequenceReader`] | an in-memory `Vec<T>` and a conversion fn |
//! | [`JsonlKVEntryReader`](crate::JsonlKVEntryReader) | line-delimited JSON |
//! | [`KVHookReader`] | another reader, with read/close callbacks |

use crate::entities::KVEntry;
use crate::errors::KVEntryError;

/// Streaming source of key/value entries.
pub trait KVEntryReader: Send {
    /// Read the next entry. `Ok(None)` marks the end of the stream.
    fn read(&mut self) -> Result<Option<KVEntry>, KVEntryError>;

    /// Release the backing resource.
    fn close(&mut self) -> Result<(), KVEntryError>;
}

impl<R: KVEntryReader + ?Sized> KVEntryReader for Box<R> {
    fn read(&mut self) -> Result<Option<KVEntry>, KVEntryError> {
        (**self).read()
    }

    fn close(&mut self) -> Result<(), KVEntryError> {
        (**self).close()
    }
}

// =============================================================================
// ORDERED STORE ITERATOR
// =============================================================================

/// Cursor over an ordered key/value store.
///
/// This is the iteration contract of the chain's path-keyed storage engine.
pub trait OrderedIterator: Send {
    /// Whether the cursor points at an entry.
    fn valid(&self) -> bool;
    /// Key at the cursor. Only meaningful while `valid()`.
    fn key(&self) -> &[u8];
    /// Value at the cursor. Only meaningful while `valid()`.
    fn value(&self) -> &[u8];
    /// Move the cursor to the next entry.
    fn advance(&mut self);
    /// Release the cursor.
    fn close(&mut self) -> Result<(), KVEntryError>;
}

impl<I: OrderedIterator + ?Sized> OrderedIterator for Box<I> {
    fn valid(&self) -> bool {
        (**self).valid()
    }
    fn key(&self) -> &[u8] {
        (**self).key()
    }
    fn value(&self) -> &[u8] {
        (**self).value()
    }
    fn advance(&mut self) {
        (**self).advance()
    }
    fn close(&mut self) -> Result<(), KVEntryError> {
        (**self).close()
    }
}

/// Reader over an ordered store iterator. Every entry carries a value.
pub struct KVIteratorReader<I: OrderedIterator> {
    iter: Option<I>,
    exhausted: bool,
}

impl<I: OrderedIterator> KVIteratorReader<I> {
    /// Wrap an iterator. The reader owns it and closes it on `close()`.
    pub fn new(iter: I) -> Self {
        Self {
            iter: Some(iter),
            exhausted: false,
        }
    }
}

fn utf8(bytes: &[u8], what: &str) -> Result<String, KVEntryError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| KVEntryError::Iterator(format!("{} is not valid UTF-8: {}", what, e)))
}

impl<I: OrderedIterator> KVEntryReader for KVIteratorReader<I> {
    fn read(&mut self) -> Result<Option<KVEntry>, KVEntryError> {
        let iter = self.iter.as_mut().ok_or(KVEntryError::Closed)?;
        if self.exhausted {
            return Err(KVEntryError::ReadPastEnd);
        }
        if !iter.valid() {
            self.exhausted = true;
            return Ok(None);
        }
        let entry = KVEntry::new(utf8(iter.key(), "key")?, Some(utf8(iter.value(), "value")?))?;
        iter.advance();
        Ok(Some(entry))
    }

    fn close(&mut self) -> Result<(), KVEntryError> {
        match self.iter.take() {
            Some(mut iter) => iter.close(),
            None => Ok(()),
        }
    }
}

// =============================================================================
// IN-MEMORY SEQUENCE
// =============================================================================

/// Reader over an in-memory sequence, converting each item on read.
pub struct KVEntrySequenceReader<T, F>
where
    F: FnMut(&T) -> Result<KVEntry, KVEntryError>,
{
    entries: Option<Vec<T>>,
    next_index: usize,
    convert: F,
}

impl<T, F> KVEntrySequenceReader<T, F>
where
    T: Send,
    F: FnMut(&T) -> Result<KVEntry, KVEntryError> + Send,
{
    /// Create a reader over `entries` using `convert` to produce each entry.
    pub fn new(entries: Vec<T>, convert: F) -> Self {
        Self {
            entries: Some(entries),
            next_index: 0,
            convert,
        }
    }

    /// Index of the next item to be read.
    pub fn position(&self) -> usize {
        self.next_index
    }
}

/// Reader over already-built entries.
pub type KVEntryVecReader = KVEntrySequenceReader<KVEntry, fn(&KVEntry) -> Result<KVEntry, KVEntryError>>;

impl KVEntryVecReader {
    /// Create a reader over a list of entries.
    pub fn from_entries(entries: Vec<KVEntry>) -> Self {
        fn identity(entry: &KVEntry) -> Result<KVEntry, KVEntryError> {
            Ok(entry.clone())
        }
        KVEntrySequenceReader::new(entries, identity as fn(&KVEntry) -> Result<KVEntry, KVEntryError>)
    }
}

impl<T, F> KVEntryReader for KVEntrySequenceReader<T, F>
where
    T: Send,
    F: FnMut(&T) -> Result<KVEntry, KVEntryError> + Send,
{
    fn read(&mut self) -> Result<Option<KVEntry>, KVEntryError> {
        let entries = self.entries.as_ref().ok_or(KVEntryError::Closed)?;
        let len = entries.len();
        if self.next_index > len {
            return Err(KVEntryError::ReadPastEnd);
        }
        if self.next_index == len {
            self.next_index += 1;
            return Ok(None);
        }
        let entry = (self.convert)(&entries[self.next_index])?;
        self.next_index += 1;
        Ok(Some(entry))
    }

    fn close(&mut self) -> Result<(), KVEntryError> {
        self.entries = None;
        Ok(())
    }
}

// =============================================================================
// HOOK READER
// =============================================================================

type ReadHook = Box<dyn FnMut(&KVEntry) -> Result<(), KVEntryError> + Send>;
type CloseHook = Box<dyn FnOnce() -> Result<(), KVEntryError> + Send>;

/// Reader that forwards to another reader and calls back on every entry read
/// and on close. Used to tee export data into a shadow copy while it streams
/// elsewhere.
pub struct KVHookReader<R: KVEntryReader> {
    inner: R,
    on_read: ReadHook,
    on_close: Option<CloseHook>,
}

impl<R: KVEntryReader> KVHookReader<R> {
    /// Wrap `inner`. `on_read` sees every entry before it is returned;
    /// `on_close` runs once after `inner` is closed.
    pub fn new<OnRead, OnClose>(inner: R, on_read: OnRead, on_close: OnClose) -> Self
    where
        OnRead: FnMut(&KVEntry) -> Result<(), KVEntryError> + Send + 'static,
        OnClose: FnOnce() -> Result<(), KVEntryError> + Send + 'static,
    {
        Self {
            inner,
            on_read: Box::new(on_read),
            on_close: Some(Box::new(on_close)),
        }
    }
}

impl<R: KVEntryReader> KVEntryReader for KVHookReader<R> {
    fn read(&mut self) -> Result<Option<KVEntry>, KVEntryError> {
        let entry = self.inner.read()?;
        if let Some(entry) = &entry {
            (self.on_read)(entry)?;
        }
        Ok(entry)
    }

    fn close(&mut self) -> Result<(), KVEntryError> {
        let closed = self.inner.close();
        let hooked = match self.on_close.take() {
            Some(on_close) => on_close(),
            None => Ok(()),
        };
        closed.and(hooked)
    }
}
