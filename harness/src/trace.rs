use tracing::{info, subscriber, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub fn init_tracing(level: Level) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();

    subscriber::set_global_default(subscriber)?;
    info!("Initialized tracing with level: {}", level);

    Ok(())
}

/// Installs a subscriber that writes through the test harness' capture and
/// honours `RUST_LOG`. Subsequent calls are no-ops.
pub fn init_test_tracing() {
    let _ = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
