//! Tracing initialisation for the devmatrix binaries.
//!
//! Diagnostics go through `tracing`; progress lines and grids are written by
//! [`crate::Logger`] and are not affected by the filter set up here.

use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` directives win over `level`. Calls after the first are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let output = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let output = if json {
        output.json().flatten_event(true).boxed()
    } else {
        output.compact().boxed()
    };

    if tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
}
