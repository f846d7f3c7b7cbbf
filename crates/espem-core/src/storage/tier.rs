//! Fixed-capacity ring buffer of samples at one sampling interval.

use alloc::collections::VecDeque;

use super::{TierLabel, TierSpec};
use crate::error::StorageError;

/// Position of a sample within a [`Tier`].
///
/// Cursors are absolute sequence numbers: the n-th sample ever pushed into a
/// tier sits at `Cursor(n)`. A cursor captured before further pushes keeps
/// pointing at the same sample until that sample is evicted, after which
/// [`Tier::get`] resolves it to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor(u64);

impl Cursor {
    /// Move forward by `n` positions
    #[must_use]
    pub const fn advance(self, n: usize) -> Self {
        Self(self.0 + n as u64)
    }

    /// Number of positions from `self` up to `other` (0 if `other` is behind)
    pub const fn distance_to(self, other: Cursor) -> usize {
        other.0.saturating_sub(self.0) as usize
    }
}

/// One tier of the time-series store
///
/// Holds up to `capacity` samples in arrival order. When full, pushing a new
/// sample evicts the oldest one.
#[derive(Debug)]
pub struct Tier<M> {
    id: u8,
    label: TierLabel,
    capacity: usize,
    interval: u32,
    /// Time the tier was created, seconds since epoch
    tstamp: u32,
    buf: VecDeque<M>,
    /// Total number of samples ever pushed, i.e. the end sentinel sequence
    pushed: u64,
}

impl<M: Copy> Tier<M> {
    /// Create an empty tier from `spec` based at `now`
    pub fn new(spec: &TierSpec, now: u32) -> Result<Self, StorageError> {
        if spec.capacity == 0 {
            return Err(StorageError::ZeroCapacity { id: spec.id });
        }

        Ok(Self {
            id: spec.id,
            label: spec.label.clone(),
            capacity: spec.capacity,
            interval: spec.interval,
            tstamp: now,
            buf: VecDeque::with_capacity(spec.capacity),
            pushed: 0,
        })
    }

    /// Append a sample, evicting the oldest if the tier is full
    pub fn push(&mut self, sample: M) {
        if self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
        self.pushed += 1;
    }

    /// Drop all samples, keeping the configuration
    pub fn clear(&mut self) {
        self.buf.clear();
        // Keep `pushed` so that cursors taken before the purge can't resolve
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Base timestamp of the tier
    pub fn tstamp(&self) -> u32 {
        self.tstamp
    }

    /// Number of samples currently stored
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Cursor at the oldest stored sample
    pub fn cbegin(&self) -> Cursor {
        Cursor(self.pushed - self.buf.len() as u64)
    }

    /// End sentinel, one past the most recent sample
    pub fn cend(&self) -> Cursor {
        Cursor(self.pushed)
    }

    /// Sample at `cursor`, or `None` if it was evicted or lies at/after the end
    pub fn get(&self, cursor: Cursor) -> Option<&M> {
        let begin = self.cbegin();
        if cursor < begin || cursor >= self.cend() {
            return None;
        }
        self.buf.get(begin.distance_to(cursor))
    }

    /// Derived timestamp of the sample at `cursor`
    ///
    /// The most recent sample is stamped with the tier's base timestamp and
    /// each older one `interval` seconds earlier.
    pub fn timestamp_at(&self, cursor: Cursor) -> u32 {
        self.timestamp_from(cursor, self.cend())
    }

    /// Derived timestamp of the sample at `cursor` with the head fixed at `head`.
    ///
    /// Readers that captured `cend()` earlier keep stamping their slice the
    /// same way while new samples arrive.
    pub fn timestamp_from(&self, cursor: Cursor, head: Cursor) -> u32 {
        let distance = cursor.distance_to(head).saturating_sub(1) as u64;
        let back = distance.saturating_mul(u64::from(self.interval));
        u64::from(self.tstamp).saturating_sub(back) as u32
    }

    /// Iterate over `[from, to)` in arrival order, stopping at the first
    /// position that no longer resolves
    pub fn iter_range(&self, from: Cursor, to: Cursor) -> TierIter<'_, M> {
        TierIter {
            tier: self,
            pos: from.max(self.cbegin()),
            end: to.min(self.cend()),
        }
    }

    /// Iterate over every stored sample, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &M> {
        self.buf.iter()
    }

    /// Most recently pushed sample
    pub fn last(&self) -> Option<&M> {
        self.buf.back()
    }
}

/// Forward-only read cursor over a [`Tier`]
pub struct TierIter<'a, M> {
    tier: &'a Tier<M>,
    pos: Cursor,
    end: Cursor,
}

impl<'a, M: Copy> Iterator for TierIter<'a, M> {
    type Item = (Cursor, &'a M);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let item = self.tier.get(self.pos)?;
        let cursor = self.pos;
        self.pos = self.pos.advance(1);
        Some((cursor, item))
    }
}
