//! Logging utilities
//!
//! Provides logging setup and configuration.

use log::LevelFilter;

/// Setup logging, honouring `RUST_LOG` and falling back to `default_level`
pub fn setup_logging(default_level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();
}
