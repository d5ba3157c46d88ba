//! Tracing subscriber setup.

use crate::error::{ConfigError, FileOp};
use crate::{LogFormat, LoggingConfig};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install a global fmt subscriber for `config`.
///
/// `RUST_LOG` takes precedence over `config.level`. Returns `Ok(false)` if a
/// global subscriber was already installed (the existing one stays active).
pub fn init_tracing(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?,
    };

    let builder = FmtSubscriber::builder().with_env_filter(filter);

    let installed = match (&config.file, &config.format) {
        (Some(path), format) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| ConfigError::file(FileOp::OpenLog, path, e))?;
            let builder = builder.with_writer(Mutex::new(file)).with_ansi(false);
            match format {
                LogFormat::Json => builder.json().finish().try_init().is_ok(),
                LogFormat::Text => builder.finish().try_init().is_ok(),
            }
        }
        (None, LogFormat::Json) => builder
            .with_writer(std::io::stderr)
            .json()
            .finish()
            .try_init()
            .is_ok(),
        (None, LogFormat::Text) => builder
            .with_writer(std::io::stderr)
            .finish()
            .try_init()
            .is_ok(),
    };

    Ok(installed)
}
