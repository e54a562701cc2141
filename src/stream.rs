//! Lazy record streams returned by drivers.
//!
//! [`RecordStream`] is a boxed, single-consumption iterator of
//! `anyhow::Result<Record>`. Reader failures travel through the stream as `Err`
//! items so the consumer decides when to stop. The combinators here are the
//! subset the drivers and the shard pipeline need:
//!
//! - [`take`](RecordStream::take), [`map`](RecordStream::map),
//!   [`try_map`](RecordStream::try_map), [`filter`](RecordStream::filter)
//! - [`flat_map`](RecordStream::flat_map), [`chain`](RecordStream::chain)
//! - [`shuffle`](RecordStream::shuffle) (seeded, buffered)
//! - [`to`](RecordStream::to) and [`through`](RecordStream::through) to hand
//!   the whole stream to stream-level hooks
//!
//! ```
//! use dataset_drivers::record::record_from;
//! use dataset_drivers::stream::RecordStream;
//! # fn main() -> anyhow::Result<()> {
//! let records = (0..10).map(|i| record_from([("id", i.into())]));
//! let out = RecordStream::from_records(records.collect::<Vec<_>>())
//!     .filter(|r| r["id"].as_i64().unwrap_or(0) % 2 == 0)
//!     .take(3)
//!     .collect()?;
//! assert_eq!(out.len(), 3);
//! # Ok(())
//! # }
//! ```

use crate::record::Record;
use crate::utils::SplitMix64;
use anyhow::Result;
use std::sync::Arc;

/// Boxed iterator item type carried by a [`RecordStream`].
pub type StreamItem = Result<Record>;

/// Upper bound on the shuffle buffer allocated up front; larger buffers grow
/// as items arrive.
const SHUFFLE_PREALLOC: usize = 1024;

/// A whole-stream transform handed to a driver, e.g. a filter over the file
/// listing that runs before any file is loaded.
pub type StreamHook = Arc<dyn Fn(RecordStream) -> RecordStream + Send + Sync>;

/// Wrap a closure as a [`StreamHook`].
pub fn stream_hook<F>(f: F) -> StreamHook
where
    F: Fn(RecordStream) -> RecordStream + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A lazy, consume-once sequence of records.
pub struct RecordStream {
    inner: Box<dyn Iterator<Item = StreamItem> + Send>,
}

impl RecordStream {
    /// Wrap any fallible record iterator.
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = StreamItem> + Send + 'static,
    {
        Self { inner: Box::new(iter) }
    }

    /// Stream over already-materialized records.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
        I::IntoIter: Send + 'static,
    {
        Self::new(records.into_iter().map(Ok))
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// Keep only the first `n` items in source order.
    #[must_use]
    pub fn take(self, n: usize) -> Self {
        Self::new(self.inner.take(n))
    }

    #[must_use]
    pub fn map<F>(self, mut f: F) -> Self
    where
        F: FnMut(Record) -> Record + Send + 'static,
    {
        Self::new(self.inner.map(move |r| r.map(&mut f)))
    }

    /// Fallible per-record map; an `Err` becomes an `Err` item in the stream.
    #[must_use]
    pub fn try_map<F>(self, mut f: F) -> Self
    where
        F: FnMut(Record) -> Result<Record> + Send + 'static,
    {
        Self::new(self.inner.map(move |r| r.and_then(&mut f)))
    }

    /// Keep records matching `pred`. `Err` items are always kept.
    #[must_use]
    pub fn filter<F>(self, mut pred: F) -> Self
    where
        F: FnMut(&Record) -> bool + Send + 'static,
    {
        Self::new(self.inner.filter(move |r| r.as_ref().map_or(true, &mut pred)))
    }

    /// Expand each record into a nested stream and flatten the result.
    #[must_use]
    pub fn flat_map<F>(self, mut f: F) -> Self
    where
        F: FnMut(Record) -> RecordStream + Send + 'static,
    {
        Self::new(self.inner.flat_map(move |r| match r {
            Ok(rec) => f(rec),
            Err(e) => RecordStream::new(std::iter::once(Err(e))),
        }))
    }

    #[must_use]
    pub fn chain(self, other: RecordStream) -> Self {
        Self::new(self.inner.chain(other.inner))
    }

    /// Buffered shuffle.
    ///
    /// `initial` items are buffered before the first one is emitted; afterwards
    /// the buffer grows by one extra item per emitted item until it holds `size`.
    /// Each emitted item is drawn uniformly from the buffer with a PRNG seeded by
    /// `seed`, so the same input and seed always give the same order.
    /// A `size` of 0 or 1 leaves the stream untouched.
    #[must_use]
    pub fn shuffle(self, size: usize, initial: usize, seed: u64) -> Self {
        if size <= 1 {
            return self;
        }
        let initial = initial.clamp(1, size);
        Self::new(ShuffleIter {
            src: self.inner,
            buf: Vec::with_capacity(initial.min(SHUFFLE_PREALLOC)),
            size,
            initial,
            primed: false,
            rng: SplitMix64::new(seed),
        })
    }

    /// Pass the whole stream through a stream-level hook.
    #[must_use]
    pub fn to<F>(self, hook: F) -> Self
    where
        F: FnOnce(RecordStream) -> RecordStream,
    {
        hook(self)
    }

    /// Apply `hooks` first to last.
    #[must_use]
    pub fn through(self, hooks: &[StreamHook]) -> Self {
        hooks.iter().fold(self, |stream, hook| stream.to(hook.as_ref()))
    }

    /// Drain the stream, stopping at the first error.
    ///
    /// # Errors
    /// Returns the first `Err` item produced by the stream.
    pub fn collect(self) -> Result<Vec<Record>> {
        self.inner.collect()
    }
}

impl Iterator for RecordStream {
    type Item = StreamItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

struct ShuffleIter {
    src: Box<dyn Iterator<Item = StreamItem> + Send>,
    buf: Vec<StreamItem>,
    size: usize,
    initial: usize,
    primed: bool,
    rng: SplitMix64,
}

impl Iterator for ShuffleIter {
    type Item = StreamItem;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.primed {
            while self.buf.len() < self.initial {
                match self.src.next() {
                    Some(item) => self.buf.push(item),
                    None => break,
                }
            }
            self.primed = true;
        }
        if let Some(item) = self.src.next() {
            self.buf.push(item);
            if self.buf.len() < self.size
                && let Some(extra) = self.src.next()
            {
                self.buf.push(extra);
            }
        }
        if self.buf.is_empty() {
            return None;
        }
        let j = self.rng.next_index(self.buf.len());
        Some(self.buf.swap_remove(j))
    }
}
