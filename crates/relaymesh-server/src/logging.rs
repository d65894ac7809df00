//! Structured logging setup (SPEC_FULL.md §B): `tracing-subscriber` with
//! an `EnvFilter` (default `info`, overridable via `RUST_LOG`) and a
//! plain `fmt` layer. The `logger` host option (§6.6) selects the filter
//! directive when `RUST_LOG` isn't set, rather than swapping in a
//! different logging backend — relaymesh always logs through `tracing`.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. Idempotent-safe to call once
/// at process startup; a second call is a programming error in the
/// caller, not something this function guards against, matching the
/// teacher's init-once convention.
pub fn init(default_directive: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive.unwrap_or("info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
