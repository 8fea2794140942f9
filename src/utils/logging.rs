//! Logging utilities
//!
//! `RUST_LOG` selects the filter; `info` when unset.

use env_logger::Env;

/// Setup logging for the server
pub fn setup_logging() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
}
