//! Error types for espem
//!
//! None of these are fatal: every failure is reported back to the caller as an
//! ordinary value and the collector degrades to a "no data" state.

use thiserror_no_std::Error;

/// Tier configuration errors reported by the time-series store
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("Tier {id} requests zero capacity")]
    ZeroCapacity { id: u8 },
    #[error("Tier {id} is already configured")]
    DuplicateTier { id: u8 },
    #[error("Tier table is full ({max} tiers)")]
    TooManyTiers { max: usize },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EspemError {
    #[error("No power meter attached")]
    NoMeter,
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for EspemError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

/// Errors from the persisted configuration blob codec
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config encode failed: {0}")]
    Encode(postcard::Error),
    #[error("Config decode failed: {0}")]
    Decode(postcard::Error),
}
