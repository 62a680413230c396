//! Structured logging for cratestack binaries and tests.
//!
//! Console output carries uptime timestamps and module targets. Debug builds
//! can additionally write JSON lines to `cratestack.log` so host and client
//! runs can be compared after the fact.

use std::path::Path;

use cratestack_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config says otherwise.
pub const DEFAULT_FILTER: &str = "info,rapier2d=warn";

/// Name of the JSON log file written in debug builds.
pub const LOG_FILE_NAME: &str = "cratestack.log";

/// Filter string derived from the config's `debug.log_level`.
///
/// An empty level falls back to [`DEFAULT_FILTER`]. Physics engine chatter is
/// kept at `warn` unless the level already mentions it.
pub fn filter_string(config: Option<&Config>) -> String {
    let Some(level) = config
        .map(|c| c.debug.log_level.trim())
        .filter(|level| !level.is_empty())
    else {
        return DEFAULT_FILTER.to_string();
    };

    if level.contains("rapier2d") {
        level.to_string()
    } else {
        format!("{level},rapier2d=warn")
    }
}

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - directory for the JSON log file (debug builds only)
/// * `debug_build` - whether to attach the JSON file layer
/// * `config` - optional configuration supplying the log level
///
/// `RUST_LOG` takes precedence over the config. Calling this twice is a
/// no-op for the second call.
///
/// ```no_run
/// use cratestack_config::Config;
/// use cratestack_log::init_logging;
///
/// let config = Config::default();
/// init_logging(None, false, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let filter_str = filter_string(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(false)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        let _ = subscriber.with(file_layer).try_init();
        return;
    }

    let _ = subscriber.try_init();
}

/// An `EnvFilter` built from [`DEFAULT_FILTER`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
