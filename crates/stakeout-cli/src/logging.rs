//! Log setup for the CLI.
//!
//! Logs go to stderr so table and JSON output on stdout stays clean.
//! `RUST_LOG` overrides the level chosen by `-v`/`--quiet`.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Level for the given `-v` count, or `warn` when `quiet` is set.
pub fn level(verbosity: u8, quiet: bool) -> Level {
    if quiet {
        return Level::WARN;
    }
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn build_env_filter(level: Level) -> EnvFilter {
    let level = level.as_str().to_lowercase();
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,stakeout={level},stakeout_core={level}")))
}

pub fn init(level: Level) {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();
    tracing_subscriber::registry()
        .with(build_env_filter(level))
        .with(layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level(0, false), Level::INFO);
        assert_eq!(level(1, false), Level::DEBUG);
        assert_eq!(level(3, false), Level::TRACE);
        assert_eq!(level(2, true), Level::WARN);
    }
}
