use log::LevelFilter;

/// Installs the `env_logger` backend used by the command-line driver.
///
/// Logs go to stderr with millisecond timestamps.
///
/// Log level is Debug in development builds and Info in production builds;
/// `RUST_LOG` overrides it. Embedding hosts install their own logger instead.
pub fn init() {
    let default_level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}
