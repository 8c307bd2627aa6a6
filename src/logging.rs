use std::io;

use time::macros::format_description;
use time::UtcOffset;
use tracing_subscriber::{self, fmt, prelude::*};

pub fn init_logger(no_color: bool, log_level: Option<&str>) -> io::Result<()> {
    let timer = fmt::time::OffsetTime::new(
        UtcOffset::UTC,
        format_description!("[[[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z]"),
    );

    // The transport owns stdout, so all logging goes to stderr.
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer)
        .with_ansi(!no_color);

    let env_filter = match log_level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            // A second init (tests, embedded use) is not an error worth surfacing.
            if e.to_string().contains("already been set") {
                Ok(())
            } else {
                Err(io::Error::new(io::ErrorKind::Other, e))
            }
        }
    }
}
