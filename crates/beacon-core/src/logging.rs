//! Structured logging setup.
//!
//! Every crate logs through `tracing`. Binaries call [`init_subscriber`]
//! once at startup; libraries never install a subscriber.

use tracing_subscriber::EnvFilter;

/// Target raised to `debug` when connection debug logging is on.
pub const REALTIME_TARGET: &str = "beacon_realtime";

/// Build the filter directive for a base level and the debug flag.
///
/// With `debug` set the realtime layer logs at `debug` regardless of the
/// base level.
pub fn filter_directive(level: &str, debug: bool) -> String {
    if debug {
        format!("{level},{REALTIME_TARGET}=debug")
    } else {
        level.to_string()
    }
}

/// Install the global stderr subscriber.
///
/// `RUST_LOG` takes precedence over `directive`. Subsequent calls are no-ops.
pub fn init_subscriber(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global subscriber already exists
    let _ = subscriber.try_init();
}

/// Install a JSON-lines stderr subscriber for log shipping.
pub fn init_json_subscriber(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_without_debug() {
        assert_eq!(filter_directive("warn", false), "warn");
    }

    #[test]
    fn directive_with_debug() {
        assert_eq!(filter_directive("info", true), "info,beacon_realtime=debug");
    }

    #[test]
    fn init_subscriber_twice_does_not_panic() {
        init_subscriber("warn");
        init_subscriber("debug");
        init_json_subscriber("info");
    }
}
