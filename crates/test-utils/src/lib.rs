//! Shared helpers for the taskweave integration tests.
//!
//! - [`builders`]: in-memory workflow configs.
//! - [`callables`]: task callables with observable side effects.

pub mod builders;
pub mod callables;

use std::future::Future;
use std::time::Duration;

use taskweave::logging::LOG_ENV_VAR;
use tracing_subscriber::EnvFilter;

/// Upper bound for any single awaited step in a test.
pub const TEST_DEADLINE: Duration = Duration::from_secs(5);

/// Install a test-writer subscriber once per test binary.
///
/// Reads the same `TASKWEAVE_LOG` variable as the binary and defaults to
/// `warn`, so passing tests stay quiet. Later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Await `fut`, panicking if it takes longer than [`TEST_DEADLINE`].
pub async fn with_timeout<F: Future>(fut: F) -> F::Output {
    match tokio::time::timeout(TEST_DEADLINE, fut).await {
        Ok(out) => out,
        Err(_) => panic!("test step exceeded {TEST_DEADLINE:?}"),
    }
}
