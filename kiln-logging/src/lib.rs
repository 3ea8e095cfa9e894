#![deny(warnings)]
#![deny(clippy::all)]

//! Logging setup for the driver. A thin wrapper over `env_logger` so that `--log LEVEL` and
//! `RUST_LOG` compose the same way across the binary and its integration tests.

use std::str::FromStr;
use std::sync::Once;

use log::LevelFilter;

/// The level used when neither `--log` nor `RUST_LOG` says otherwise.
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Warn;

static INIT: Once = Once::new();

/// Parses a `--log` flag value (case-insensitive: `trace`/`debug`/`info`/`warn`/`error`).
pub fn parse_level(raw: &str) -> Result<LevelFilter, String> {
    LevelFilter::from_str(raw).map_err(|_| format!("not a valid log level: {raw:?}"))
}

/// Initializes the global logger. `explicit_level` is `--log LEVEL`, if given; otherwise
/// `RUST_LOG` is honored, falling back to [`DEFAULT_LEVEL`].
///
/// Safe to call more than once per process (e.g. once per test): only the first call takes
/// effect, matching `env_logger`'s own idempotency guarantee.
pub fn init(explicit_level: Option<LevelFilter>) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        match explicit_level {
            Some(level) => {
                builder.filter_level(level);
            }
            None => {
                builder.filter_level(DEFAULT_LEVEL);
                if let Ok(rust_log) = std::env::var("RUST_LOG") {
                    builder.parse_filters(&rust_log);
                }
            }
        }
        // Logs are diagnostic output, not the tool's product: keep them off stdout so dry-run
        // and `-t` output stay pipeable.
        builder.target(env_logger::Target::Stderr);
        let _ = builder.try_init();
    });
}
