//! A global, configurable level filter for the harness logger.
//!
//! get_level() returns None unless set_level has been called.  init_test_logger() prefers the
//! global level, then the TTY_TESTING_LOG environment variable, then `warn`.
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Once,
};

use log::LevelFilter;
use simplelog::{ColorChoice, TermLogger, TerminalMode};

/// The environment variable read by init_test_logger(), e.g. `TTY_TESTING_LOG=debug`
pub const LOG_ENV_VAR: &str = "TTY_TESTING_LOG";

// 0 is unset, otherwise the filter's position in LevelFilter::iter() plus one
static LOG_LEVEL: AtomicUsize = AtomicUsize::new(0);
static INIT: Once = Once::new();

/// Sets the level used by the next init_test_logger().  Has no effect once a logger is
/// installed.
pub fn set_level(level: LevelFilter) {
    LOG_LEVEL.store(level as usize + 1, Ordering::SeqCst);
}

pub fn get_level() -> Option<LevelFilter> {
    match LOG_LEVEL.load(Ordering::SeqCst) {
        0 => None,
        stored => LevelFilter::iter().nth(stored - 1),
    }
}

/// Parses the level from TTY_TESTING_LOG, if it is set and valid.
pub fn env_level() -> Option<LevelFilter> {
    std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|level| level.trim().parse().ok())
}

/// The level init_test_logger() installs.
pub fn configured_level() -> LevelFilter {
    get_level().or_else(env_level).unwrap_or(LevelFilter::Warn)
}

/// Installs a stderr logger for test runs.  Only the first call has an effect, and a logger
/// installed by someone else is left alone.
pub fn init_test_logger() {
    INIT.call_once(|| {
        let level = configured_level();

        let config = simplelog::ConfigBuilder::new()
            .set_time_format_str("%H:%M:%S%.3f TST")
            .build();

        if TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto).is_err() {
            log::debug!("a logger was already installed, keeping it");
        }
    });
}
