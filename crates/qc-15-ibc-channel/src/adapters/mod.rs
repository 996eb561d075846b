//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements the outbound ports for hosts and tests.

mod capabilities;
mod light_client;
mod memory_store;
#[cfg(feature = "rocksdb")]
mod rocksdb_store;

pub use capabilities::InMemoryCapabilities;
pub use light_client::MockLightClient;
pub use memory_store::InMemoryStore;
#[cfg(feature = "rocksdb")]
pub use rocksdb_store::{RocksDbConfig, RocksDbStore};
