//! Diagnostic output setup.
//!
//! Library code only emits `tracing` events. Hosts call [`init`] once to
//! print them; `RUST_LOG` takes precedence over the default directive.
//! Script output carries the field `source = "script"`, so
//! `RUST_LOG=vesper_script=info` shows `log()`/`print()` calls from scripts.

use tracing_subscriber::EnvFilter;

/// Directive used when neither `RUST_LOG` nor the caller supplies one.
pub const DEFAULT_DIRECTIVE: &str = "warn";

/// Install a formatted subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive`. Returns `false` if a global subscriber was already
/// installed.
pub fn init(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
