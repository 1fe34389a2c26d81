// src/services/token_sweeper.rs
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info};

use crate::csrf::clock::duration_millis;
use crate::csrf::{Clock, StoreError, TokenStore};

/// Periodically deletes tokens older than the expiry window.
pub struct TokenSweeper {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    token_expiry: Duration,
    interval: Duration,
}

impl TokenSweeper {
    pub fn new(
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        token_expiry: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            token_expiry,
            interval,
        }
    }

    /// Start the sweep loop. The first sweep runs immediately.
    pub async fn start(self) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        info!(
            interval_secs = self.interval.as_secs(),
            "Token sweeper started"
        );

        loop {
            interval.tick().await;

            if let Err(e) = self.sweep_once().await {
                error!(error = %e, "Token sweep failed");
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<u64, StoreError> {
        let cutoff = self.clock.now_millis() - duration_millis(self.token_expiry);
        let removed = self.store.delete_older_than(cutoff).await?;

        if removed > 0 {
            info!(removed, "Expired CSRF tokens removed");
        } else {
            debug!("No expired CSRF tokens to remove");
        }

        Ok(removed)
    }
}
