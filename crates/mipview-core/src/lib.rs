// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use tracing::error;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

/// Log a fatal error with its whole context chain, outermost first.
pub fn report_fatal(err: &anyhow::Error) {
    error!("fatal: {err}");
    for cause in err.chain().skip(1) {
        error!("  caused by: {cause}");
    }
}
