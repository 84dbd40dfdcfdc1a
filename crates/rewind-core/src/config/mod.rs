//! Configuration for the snapshot engine
//!
//! All sections deserialize with defaults, so a partial TOML file (or none at
//! all) yields a usable configuration:
//!
//! ```toml
//! [storage]
//! max_snapshots = 20
//! checksum = "sha256"
//!
//! [git]
//! command_timeout = "10s"
//! ```

mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use loader::{load_config_from_file, load_config_with_env};
pub use types::{
    GitConfig, IdStrategy, MirrorConfig, MonitorConfig, RewindConfig, StorageConfig,
    TrackingConfig,
};
