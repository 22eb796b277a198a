//! Background cleanup of registrations that were never activated.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::db::{DbPool, registration, users};
use crate::error::AppResult;

/// Configuration for the cleanup service.
#[derive(Clone)]
pub struct CleanupConfig {
    /// Days a new account has to activate before it is removed
    pub activation_days: i64,
    /// How often to run cleanup (in seconds)
    pub interval_secs: u64,
}

/// Start the cleanup background task.
pub fn start_cleanup_task(pool: Arc<DbPool>, config: CleanupConfig) {
    tokio::spawn(async move {
        info!(
            "Starting registration cleanup (activation window: {} days, interval: {} seconds)",
            config.activation_days, config.interval_secs
        );

        let mut ticker = interval(Duration::from_secs(config.interval_secs.max(1)));

        loop {
            ticker.tick().await;

            if let Err(e) = cleanup_expired_registrations(&pool, config.activation_days).await {
                error!("Cleanup task error: {}", e);
            }
        }
    });
}

/// Delete inactive users whose activation window has passed. Returns how
/// many were removed.
pub async fn cleanup_expired_registrations(pool: &DbPool, activation_days: i64) -> AppResult<u64> {
    let cutoff = Utc::now() - chrono::Duration::days(activation_days);
    let expired = registration::expired_user_ids(pool.connection(), cutoff).await?;

    if expired.is_empty() {
        return Ok(0);
    }

    info!("Found {} expired registrations", expired.len());

    let mut deleted = 0;
    for user_id in expired {
        match users::delete(pool.connection(), user_id).await {
            Ok(()) => deleted += 1,
            Err(e) => warn!("Failed to delete expired registration {}: {}", user_id, e),
        }
    }

    if deleted > 0 {
        info!("Expired registrations cleanup: {} deleted", deleted);
    }
    Ok(deleted)
}
