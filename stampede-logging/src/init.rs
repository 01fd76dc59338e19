use stampede_config::{LogFormat, LogLevel, LoggingConfig};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid {var} filter '{directives}': {reason}")]
    InvalidFilter {
        var: &'static str,
        directives: String,
        reason: String,
    },
}

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    }
}

/// Filter from the configured level, refined by `RUST_LOG` directives when set
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    let builder = EnvFilter::builder().with_default_directive(level_filter(config.level).into());

    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => {
            builder
                .parse(&directives)
                .map_err(|e| LoggingError::InvalidFilter {
                    var: EnvFilter::DEFAULT_ENV,
                    directives,
                    reason: e.to_string(),
                })
        }
        _ => Ok(builder.parse_lossy("")),
    }
}

fn fmt_layer(config: &LoggingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_ids(config.include_thread_ids)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    match config.format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().with_current_span(false).boxed(),
    }
}

/// Initialize the global subscriber. Calling it again is harmless, the
/// first subscriber stays installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;

    if tracing_subscriber::registry()
        .with(fmt_layer(config))
        .with(filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}
