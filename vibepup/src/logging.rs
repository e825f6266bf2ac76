//! Diagnostic tracing for the loop itself.
//!
//! Agent output is mirrored to stdout and persisted under `.ralph/runs/`;
//! tracing goes to stderr only, so the two never interleave in a pipe.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "VIBEPUP_LOG";

const DEFAULT_DIRECTIVE: &str = "warn";

/// Pick the filter directive: `VIBEPUP_LOG`, then `RUST_LOG`, then `warn`.
/// Blank values are skipped.
pub fn filter_directive<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    [LOG_ENV, EnvFilter::DEFAULT_ENV]
        .into_iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string())
}

/// Install the stderr subscriber.
///
/// ```bash
/// VIBEPUP_LOG=vibepup=debug vibepup 3
/// ```
pub fn init() {
    let directive = filter_directive(|key| std::env::var(key).ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("ignoring invalid log filter {directive:?}: {err}");
        EnvFilter::new(DEFAULT_DIRECTIVE)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
