//! Test utilities for the account-abstraction engine.

mod harness;
mod keys;
mod operations;

pub use harness::*;
pub use keys::*;
pub use operations::*;

use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber honouring `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
