//! Utilities for logging.
//!
//! Nothing in relq installs a subscriber on its own. Embedders call `init`
//! once at startup, tests call `init_test`.
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

/// Output format for log lines.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Map a `-v` count to a max level.
pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn builder(level: Level) -> SubscriberBuilder<
    tracing_subscriber::fmt::format::DefaultFields,
    tracing_subscriber::fmt::format::Format,
    EnvFilter,
> {
    // RUST_LOG takes precedence over the verbosity flag.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
}

/// Install the global subscriber.
///
/// Subsequent calls are no-ops (the first subscriber wins).
pub fn init(verbosity: u8, mode: LoggingMode) {
    let level = level_for_verbosity(verbosity);
    let builder = builder(level);

    let _ = match mode {
        LoggingMode::Pretty => builder.pretty().try_init(),
        LoggingMode::Json => builder.json().try_init(),
        LoggingMode::Compact => builder.compact().try_init(),
    };
}

/// Initialize a trace-level logger for tests.
///
/// Output is captured by the test harness.
pub fn init_test() {
    let _ = builder(Level::TRACE).with_test_writer().try_init();
}
