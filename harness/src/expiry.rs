use crate::{
    poll::{poll_until, Clock, PollConfig},
    timestamp::Timestamp,
    wallet::Wallet,
};
use std::time::Duration;

/// Returns once `wallet`'s ledger reports a time at or past `expiry`.
///
/// Ledger time only moves when blocks are produced, so there is no bound
/// here; the scenario deadline takes care of a ledger that stopped.
pub async fn wait_for(
    clock: &dyn Clock,
    interval: Duration,
    wallet: &dyn Wallet,
    expiry: Timestamp,
) -> anyhow::Result<()> {
    poll_until(
        clock,
        PollConfig::every(interval),
        &format!("{} time to pass {}", wallet.ledger(), expiry),
        move || async move {
            let now = wallet.blockchain_time().await?;

            if now >= expiry {
                Ok(Some(()))
            } else {
                tracing::debug!(
                    "{} time is {}, {}s until {}",
                    wallet.ledger(),
                    now,
                    now.seconds_until(expiry),
                    expiry
                );
                Ok(None)
            }
        },
    )
    .await
}
