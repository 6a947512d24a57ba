use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging with an explicit default level and format
///
/// Log level can also be controlled via the `RUST_LOG` environment variable.
/// Examples:
/// - `RUST_LOG=debug` - Debug level and above
/// - `RUST_LOG=qosprobe=debug` - Debug level for qosprobe crate only
///
/// `RUST_LOG` takes precedence over `level` when set. Logs are written
/// to stderr so that stdout carries only the measurement reports.
pub fn init_logging_with_config(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_thread_names(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_names(true)
                    .with_line_number(true)
                    .with_file(true),
            )
            .init();
    }
}
