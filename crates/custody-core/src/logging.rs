/// Install `env_logger` as the `log` backend.
///
/// `RUST_LOG` is honoured; without it everything at `info` and above is
/// printed. Calling this again after a logger is installed does nothing.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
