//! Logging setup.
//!
//! Embedders call [`init_stdout`] once at startup; library code uses
//! `use ebus_core::tracing::prelude::*` for the usual macros.

use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

/// Log to stdout, filtering according to `RUST_LOG` with INFO as the
/// default level.
///
/// Safe to call more than once; later calls leave the installed subscriber
/// in place.
pub fn init_stdout() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
