#![warn(missing_docs)]

//! Logging setup shared by the kenflow binaries.
//!
//! - [`LogArgs`]: clap flags selecting a level or an explicit filter
//! - [`compute_spec`]: resolve flags and `RUST_LOG` into one filter directive
//! - [`init`]: install the global subscriber

use std::{env, io};

use clap::Args;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Logging controls for CLI apps.
#[derive(Debug, Clone, Default, Args)]
pub struct LogArgs {
    /// Set log level to trace (our crates only)
    #[arg(long, global = true, conflicts_with_all = ["debug", "log_level", "log_filter"])]
    pub trace: bool,

    /// Set log level to debug (our crates only)
    #[arg(long, global = true, conflicts_with_all = ["trace", "log_level", "log_filter"])]
    pub debug: bool,

    /// Set a single log level for our crates (error|warn|info|debug|trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Set an explicit tracing filter directive (overrides other flags)
    /// e.g. "kenflow_coord=trace,kenflow_backend=debug"
    #[arg(long, global = true)]
    pub log_filter: Option<String>,
}

/// Crate targets that constitute "our" logs.
pub fn our_crates() -> &'static [&'static str] {
    &[
        "kenflow",
        "kenflow_coord",
        "kenflow_backend",
        "kenflow_protocol",
        "keycombo",
        "logging",
    ]
}

/// HTTP stack targets that are noisy at debug level.
const QUIET_TARGETS: &[&str] = &["hyper_util=warn", "reqwest=warn"];

/// Build a filter directive that sets `level` for all of our crates and keeps
/// the HTTP stack at `warn`.
pub fn level_spec_for(level: &str) -> String {
    let lvl = level.to_ascii_lowercase();
    our_crates()
        .iter()
        .map(|t| format!("{t}={lvl}"))
        .chain(QUIET_TARGETS.iter().map(|s| s.to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Compute the final filter spec string with precedence:
/// - `log_filter`
/// - `trace`/`debug`/`log_level` (crate-scoped)
/// - `RUST_LOG` env
/// - default to crate-scoped `info`
pub fn compute_spec(
    trace: bool,
    debug: bool,
    log_level: Option<&str>,
    log_filter: Option<&str>,
) -> String {
    if let Some(spec) = log_filter {
        return spec.to_string();
    }
    if trace {
        return level_spec_for("trace");
    }
    if debug {
        return level_spec_for("debug");
    }
    if let Some(lvl) = log_level {
        return level_spec_for(lvl);
    }
    match env::var("RUST_LOG") {
        Ok(spec) if !spec.trim().is_empty() => spec,
        _ => level_spec_for("info"),
    }
}

impl LogArgs {
    /// Filter spec selected by these flags.
    pub fn spec(&self) -> String {
        compute_spec(
            self.trace,
            self.debug,
            self.log_level.as_deref(),
            self.log_filter.as_deref(),
        )
    }
}

/// Create an `EnvFilter` from a spec string, falling back to crate-scoped
/// `info` when the directive does not parse.
pub fn env_filter_from_spec(spec: &str) -> EnvFilter {
    EnvFilter::try_new(spec).unwrap_or_else(|_| EnvFilter::new(level_spec_for("info")))
}

/// Install the global subscriber: env filter plus a compact fmt layer on
/// stderr. Calling it twice is harmless.
pub fn init(args: &LogArgs) {
    let spec = args.spec();
    tracing_subscriber::registry()
        .with(env_filter_from_spec(&spec))
        .with(fmt::layer().with_writer(io::stderr).without_time())
        .try_init()
        .ok();
    tracing::debug!(spec = %spec, "logging initialised");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_spec_covers_our_crates() {
        let spec = level_spec_for("DEBUG");
        for c in our_crates() {
            assert!(spec.contains(&format!("{c}=debug")), "{spec}");
        }
        assert!(spec.contains("reqwest=warn"));
    }

    #[test]
    fn explicit_filter_wins() {
        let spec = compute_spec(true, false, Some("warn"), Some("kenflow_coord=trace"));
        assert_eq!(spec, "kenflow_coord=trace");
        assert_eq!(compute_spec(true, false, None, None), level_spec_for("trace"));
        assert_eq!(
            compute_spec(false, false, Some("error"), None),
            level_spec_for("error")
        );
    }
}
