//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the effective level is resolved.
//! A bare level applies to this crate; dependencies (teloxide, reqwest,
//! hyper, axum) are held at `warn` unless the level is quieter still.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

const CRATE_TARGET: &str = "guruh_bot";

/// Initialise the global tracing subscriber.
///
/// `level` is either a bare level (`"info"`, `"debug"`, …) or a full
/// `EnvFilter` directive such as `"guruh_bot=trace,teloxide=debug"`, which
/// is used verbatim.
///
/// With `prefer_level`, `level` wins over `RUST_LOG` (the CLI `-v` flags);
/// otherwise `RUST_LOG` wins and `level` is the fallback.
pub fn init(level: &str, prefer_level: bool) -> Result<(), AppError> {
    let wanted = directive(level);
    let filter = if prefer_level {
        match EnvFilter::try_new(&wanted) {
            Ok(filter) => filter,
            Err(level_err) => EnvFilter::try_from_default_env().map_err(|env_err| {
                AppError::Logger(format!(
                    "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                ))
            })?,
        }
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&wanted))
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

/// Expand a bare level into a crate-scoped directive.
fn directive(level: &str) -> String {
    let level = level.trim();
    match level.parse::<LevelFilter>() {
        Ok(ours) if !level.is_empty() => {
            let deps = ours.min(LevelFilter::WARN);
            format!("{deps},{CRATE_TARGET}={ours}").to_lowercase()
        }
        _ => level.to_string(),
    }
}
