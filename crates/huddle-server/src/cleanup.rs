use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use huddle_db::Database;

/// Background task that drops sessions whose tokens can no longer verify.
pub async fn run_session_cleanup(db: Arc<Database>, token_ttl_days: i64, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let Some(cutoff) = chrono::Duration::try_days(token_ttl_days)
            .and_then(|ttl| chrono::Utc::now().checked_sub_signed(ttl))
        else {
            warn!("Cleanup disabled: token lifetime of {} days is out of range", token_ttl_days);
            return;
        };
        let db = db.clone();
        match tokio::task::spawn_blocking(move || db.prune_sessions(cutoff)).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Cleanup: pruned {} expired sessions", count);
                }
            }
            Ok(Err(e)) => warn!("Cleanup error: {}", e),
            Err(e) => warn!("Cleanup task failed: {}", e),
        }
    }
}
