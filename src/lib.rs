//! Storage management on top of the `devicegraph` model: probing the block
//! devices of a machine, planning the actions that turn them into a staging
//! devicegraph and committing those actions.

pub mod actiongraph;
pub mod cli;
pub mod commit;
pub mod config;
pub mod error;
mod logging;
pub mod probe;
pub mod storage;

pub use error::StorageError;
pub use logging::{file_log::FileLog, multilog::MultiLogger};
pub use storage::{SharedStorage, Storage};

/// Version as provided by environment variables at build time
pub const STORAGECTL_VERSION: &str = match option_env!("STORAGECTL_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
