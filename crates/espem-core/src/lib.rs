//! Hardware-independent core library for espem
//!
//! This crate contains the platform-agnostic logic of the espem energy
//! monitor: meter sample types, the tiered in-RAM time-series store, the
//! chunked JSON serializer for sample history, and the metrics collector that
//! wires a PZEM protocol driver into the store.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod producer;
pub mod publish;
pub mod reply;
pub mod storage;
pub mod stream;

pub use collector::{Clock, CollectorState, Espem};
pub use error::{ConfigError, EspemError, StorageError};
pub use metrics::{Metrics, Pz003Metrics, Pz004Metrics, Quantity};
pub use storage::{DataStorage, SharedStorage, Tier, TierSpec, TieredStore};
pub use stream::SampleStream;
