// Adapters layer: concrete implementations for external systems (storage, payments, cache).

pub mod cache;
pub mod mpesa;
pub mod storage;

pub use cache::ResponseCache;
pub use mpesa::DarajaClient;
pub use storage::{LocalStorage, MemoryStorage};
