use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use super::TokenStore;

/// Periodically drops tokens that expired more than `retention` ago.
///
/// `retention` keeps recently expired tokens around for renewal after expiry.
/// Must be called from within a tokio runtime.
pub fn spawn_expiry_sweeper(
    store: Arc<dyn TokenStore>,
    interval: Duration,
    retention: time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let cutoff = OffsetDateTime::now_utc() - retention;
            let dropped = store.remove_expired(cutoff);
            if dropped > 0 {
                tracing::info!(dropped, "Expired tokens swept from store");
            } else {
                tracing::trace!("Token sweep found nothing to drop");
            }
        }
    })
}
