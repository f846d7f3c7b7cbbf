//! Tier container: routes pushes and lookups by tier id.

use log::{error, info};

use super::{MAX_TIERS, Tier, TierSpec};
use crate::error::StorageError;

/// A set of tiers fed from the same sample stream
#[derive(Debug)]
pub struct TieredStore<M> {
    tiers: heapless::Vec<Tier<M>, MAX_TIERS>,
    /// Bumped on every reset so stale cursors can be told apart
    epoch: u32,
}

impl<M> Default for TieredStore<M> {
    fn default() -> Self {
        Self {
            tiers: heapless::Vec::new(),
            epoch: 0,
        }
    }
}

impl<M: Copy> TieredStore<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one tier built from `spec`, based at `now`
    pub fn add_tier(&mut self, spec: &TierSpec, now: u32) -> Result<u8, StorageError> {
        if self.tier(spec.id).is_some() {
            return Err(StorageError::DuplicateTier { id: spec.id });
        }

        let tier = Tier::new(spec, now)?;
        self.tiers
            .push(tier)
            .map_err(|_| StorageError::TooManyTiers { max: MAX_TIERS })?;
        Ok(spec.id)
    }

    /// Discard every tier and rebuild from `specs`.
    ///
    /// Invalid specs are skipped so that the remaining tiers still come up;
    /// the first failure is returned.
    pub fn reset(&mut self, specs: &[TierSpec], now: u32) -> Result<(), StorageError> {
        self.tiers.clear();
        self.epoch = self.epoch.wrapping_add(1);

        let mut first_err = None;
        for spec in specs {
            match self.add_tier(spec, now) {
                Ok(id) => info!(
                    "Add TS {}: {}, size: {}, interval: {}s, mem: {} bytes",
                    id,
                    spec.label,
                    spec.capacity,
                    spec.interval,
                    spec.capacity * core::mem::size_of::<M>()
                ),
                Err(e) => {
                    error!("Skipping tier {}: {}", spec.id, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Append `sample` to every tier.
    ///
    /// `now` is accepted for symmetry with the producer side but not stored;
    /// timestamps are derived from slot positions.
    pub fn push(&mut self, sample: M, _now: u32) {
        for tier in self.tiers.iter_mut() {
            tier.push(sample);
        }
    }

    /// Empty every tier, keeping their configuration
    pub fn purge(&mut self) {
        for tier in self.tiers.iter_mut() {
            tier.clear();
        }
    }

    pub fn tier(&self, id: u8) -> Option<&Tier<M>> {
        self.tiers.iter().find(|t| t.id() == id)
    }

    /// Number of samples in tier `id`, `None` if no such tier
    pub fn size(&self, id: u8) -> Option<usize> {
        self.tier(id).map(Tier::size)
    }

    pub fn capacity(&self, id: u8) -> Option<usize> {
        self.tier(id).map(Tier::capacity)
    }

    pub fn interval(&self, id: u8) -> Option<u32> {
        self.tier(id).map(Tier::interval)
    }

    pub fn label(&self, id: u8) -> Option<&str> {
        self.tier(id).map(Tier::label)
    }

    /// Sum of all tier capacities; zero means "never initialized"
    pub fn total_capacity(&self) -> usize {
        self.tiers.iter().map(Tier::capacity).sum()
    }

    /// Reset generation; cursors taken in another epoch are meaningless
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.tiers.iter().map(Tier::id)
    }
}
