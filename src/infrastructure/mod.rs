//! Adapters behind the domain ports: stores, clocks, sinks, the mock payment
//! gateway, plus configuration and logging setup.

pub mod clock;
pub mod config;
pub mod in_memory;
pub mod logging;
pub mod notification;
pub mod payment;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
