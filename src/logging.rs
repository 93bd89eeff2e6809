//! Diagnostic logging setup.
//!
//! Diagnostics go to stderr through `tracing`; command output stays on stdout.
//! The filter comes from `RUST_LOG` when set, otherwise `info` for the docqa
//! crates (`debug` with `--verbose`) and `warn` for everything else.

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) {
    let default_directive = if verbose {
        "warn,docqa=debug,docqa_core=debug"
    } else {
        "warn,docqa=info,docqa_core=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // A second init (e.g. from tests) is not an error worth surfacing.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
