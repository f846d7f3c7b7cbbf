//! Configured tier store plus read-time energy calibration.

use alloc::rc::Rc;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use log::{error, info};

use super::{MAX_TIERS, TierSpec, TieredStore, default_tiers};
use crate::error::StorageError;

/// Storage handle shared between the ingestion callback and response streams.
///
/// Everything runs on one cooperative executor, so a no-op mutex is enough:
/// each user holds the lock only for one push or one chunk.
pub type SharedStorage<M> = Rc<Mutex<NoopRawMutex, RefCell<DataStorage<M>>>>;

/// Tiered sample store together with its configuration
#[derive(Debug)]
pub struct DataStorage<M> {
    store: TieredStore<M>,
    specs: heapless::Vec<TierSpec, MAX_TIERS>,
    /// Signed energy adjustment in Wh, applied only when rendering
    nrg_offset: i32,
}

impl<M: Copy> Default for DataStorage<M> {
    fn default() -> Self {
        Self::new(default_tiers())
    }
}

impl<M: Copy> DataStorage<M> {
    /// Create an unconfigured storage that will build `specs` on first reset
    pub fn new(specs: heapless::Vec<TierSpec, MAX_TIERS>) -> Self {
        Self {
            store: TieredStore::new(),
            specs,
            nrg_offset: 0,
        }
    }

    /// Wrap into a [`SharedStorage`] handle
    pub fn into_shared(self) -> SharedStorage<M> {
        Rc::new(Mutex::new(RefCell::new(self)))
    }

    /// Replace the tier layout used by the next [`DataStorage::reset`].
    ///
    /// A layout with more than [`MAX_TIERS`] tiers is rejected as a whole and
    /// the current layout stays in place.
    pub fn configure(&mut self, specs: &[TierSpec]) -> Result<(), StorageError> {
        let mut layout = heapless::Vec::new();
        for spec in specs {
            if layout.push(spec.clone()).is_err() {
                error!(
                    "Tier layout has {} tiers, at most {} supported",
                    specs.len(),
                    MAX_TIERS
                );
                return Err(StorageError::TooManyTiers { max: MAX_TIERS });
            }
        }
        self.specs = layout;
        Ok(())
    }

    pub fn specs(&self) -> &[TierSpec] {
        &self.specs
    }

    /// Discard all history and rebuild the tiers from the configured specs
    pub fn reset(&mut self, now: u32) -> Result<(), StorageError> {
        let result = self.store.reset(&self.specs, now);
        info!(
            "TimeSeries DB ready: {} tiers, {} samples total",
            self.store.tier_count(),
            self.store.total_capacity()
        );
        result
    }

    pub fn push(&mut self, sample: M, now: u32) {
        self.store.push(sample, now);
    }

    pub fn purge(&mut self) {
        self.store.purge();
    }

    pub fn store(&self) -> &TieredStore<M> {
        &self.store
    }

    /// Offset added to energy values in every reply, e.g. to match another counter
    pub fn set_energy_offset(&mut self, offset: i32) {
        self.nrg_offset = offset;
    }

    pub fn energy_offset(&self) -> i32 {
        self.nrg_offset
    }

    /// Total configured capacity, zero if never reset
    pub fn total_capacity(&self) -> usize {
        self.store.total_capacity()
    }

    pub fn size(&self, id: u8) -> Option<usize> {
        self.store.size(id)
    }
}
