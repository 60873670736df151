use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{ConsoleFormat, LoggingConfig};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Console output goes to stderr so
/// stdout stays free for callers that print reports. When `log_dir` is set,
/// JSON lines are also written to a daily-rolled file and the returned
/// [`WorkerGuard`] must be held until exit to flush it.
pub fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = env_filter(logging)?;

    let (file_layer, guard) = match logging.log_dir.as_deref() {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {dir}"))?;
            let appender = tracing_appender::rolling::daily(dir, &logging.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .json()
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = match logging.console_format {
        ConsoleFormat::Compact => Some(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact()
                .boxed(),
        ),
        ConsoleFormat::Json => Some(fmt::layer().with_writer(std::io::stderr).json().boxed()),
        ConsoleFormat::Off => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("tracing subscriber already installed")?;

    Ok(guard)
}

fn env_filter(logging: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&logging.default_filter)
            .with_context(|| format!("invalid log filter '{}'", logging.default_filter)),
    }
}
