pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{DarajaClient, LocalStorage, MemoryStorage, ResponseCache};
pub use app::{build_app, build_router, serve, AppState};
#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::TomlConfig;
pub use core::Store;
pub use utils::error::{ChamaError, Result};
