//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize the logging system with a default level filter
///
/// `RUST_LOG` still overrides the level when present.
pub fn init_with_level(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    if let Err(e) = env_logger::Builder::from_env(env).try_init() {
        log::debug!("Logger already initialized: {}", e);
    }
}

/// Initialize logging for unit tests (idempotent, captured by the test harness)
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
