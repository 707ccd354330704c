//! Relay Configuration Module
//!
//! Provides the deployment configuration loaded from a TOML file. Every
//! section is optional; missing values fall back to [`defaults`].
//!
//! ## Loading Order
//!
//! 1. `RACEWIRE_CONFIG` environment variable (path to TOML file)
//! 2. `racewire.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! config::init(RelayConfig::load());
//!
//! let tick = config::get().aggregation.tick_ms;
//! ```

mod relay_config;
pub mod defaults;

pub use relay_config::*;

use std::sync::OnceLock;

/// Global relay configuration, initialized once at startup.
static RELAY_CONFIG: OnceLock<RelayConfig> = OnceLock::new();

/// Initialize the global relay configuration.
///
/// A second call is ignored with a warning.
pub fn init(config: RelayConfig) {
    if RELAY_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global relay configuration.
///
/// Falls back to built-in defaults when `init()` was never called, so
/// library users and tests do not need a config file.
pub fn get() -> &'static RelayConfig {
    RELAY_CONFIG.get_or_init(RelayConfig::default)
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    RELAY_CONFIG.get().is_some()
}
