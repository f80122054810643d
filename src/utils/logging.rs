use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs the global subscriber. Logs go to stderr so stdout stays
/// parseable for `--json` output. `RUST_LOG` overrides everything else.
pub fn init_tracing(config: &LoggingConfig, verbosity: u8) {
    let level = effective_level(&config.level, verbosity);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,slack_cli={level}")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(err) = result {
        eprintln!("failed to initialise logging: {err}");
    }
}

fn effective_level(configured: &str, verbosity: u8) -> &str {
    match verbosity {
        0 => configured,
        1 => "debug",
        _ => "trace",
    }
}
