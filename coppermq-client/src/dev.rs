/// Set up an env_logger based logger, mostly for examples and tests. The
/// `RUST_LOG` environment variable selects the level as usual; calling it
/// more than once is harmless.
pub fn setup_logger() {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .try_init();
}
