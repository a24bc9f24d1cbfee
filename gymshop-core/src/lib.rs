pub mod auth;
pub mod common;
pub mod domain;
pub mod services;
pub mod storage;

pub use common::error::{Result, ShopError};
pub use domain::*;

// Re-export database manager when db feature is enabled
#[cfg(feature = "db")]
pub use storage::database::DatabaseManager;
