//! Tracing subscriber setup for the command-line front end

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Level used when neither `-v` nor a configuration file asks for another
pub const DEFAULT_LEVEL: &str = "info";

/// Filter directive for a verbosity count.
///
/// `base_level` applies to this crate's targets when no `-v` flag is given.
pub fn filter_for(verbosity: u8, quiet: bool, base_level: &str) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbosity {
        0 => format!("tensor_buckets={0},tbuckets={0},warn", base_level),
        1 => "tensor_buckets=debug,tbuckets=debug,info".to_string(),
        2 => "tensor_buckets=trace,tbuckets=trace,debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber; `RUST_LOG` overrides the verbosity flags
/// and `base_level` (usually the configured `system.log_level`)
pub fn init_logging(verbosity: u8, quiet: bool, json_output: bool, base_level: Option<&str>) -> Result<()> {
    let base_level = base_level.unwrap_or(DEFAULT_LEVEL);
    let env_filter = if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter_for(verbosity, quiet, base_level)))
    };

    if json_output {
        let json_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(env_filter);

        tracing_subscriber::registry().with(json_layer).try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(env_filter);

        tracing_subscriber::registry().with(fmt_layer).try_init()?;
    }

    Ok(())
}
