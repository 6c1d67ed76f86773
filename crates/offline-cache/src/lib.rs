//! Offline cache coordinator.
//!
//! A same-origin request interceptor that answers from versioned named
//! stores using one of three strategies (cache-first, network-first,
//! stale-while-revalidate), keeps each store under an item bound by
//! dropping the earliest inserts, and accepts page commands to pin or unpin
//! articles for offline reading.

pub mod arena;
mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod eviction;
pub mod lifecycle;
pub mod protocol;
pub mod request;
pub mod storage;
pub mod store;
pub mod strategy;
pub mod traits;

#[cfg(test)]
mod testing;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, Served, ServedFrom};
pub use error::{CommandError, InstallError, NetworkError};
pub use lifecycle::{Registration, WorkerState};
pub use protocol::{Broadcast, CachedArticles, Command, PageMessage};
pub use request::{FetchRequest, RequestKey, RequestMode};
pub use storage::CacheStorage;
pub use store::NamedStore;
pub use strategy::{Strategy, StrategyTable};
pub use traits::{CachedResponse, Network, StoreStats};
