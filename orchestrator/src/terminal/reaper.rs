//! Idle reaper: periodically closes sessions without recent input

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::manager::SessionManager;
use super::session::CloseReason;

pub struct IdleReaper {
    manager: Arc<SessionManager>,
    ttl: Duration,
    interval: Duration,
}

impl IdleReaper {
    pub fn new(manager: Arc<SessionManager>, ttl: Duration, interval: Duration) -> Self {
        Self {
            manager,
            ttl,
            interval,
        }
    }

    /// Run a sweep every interval until the returned handle is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                ttl_secs = self.ttl.as_secs(),
                interval_secs = self.interval.as_secs(),
                "Idle reaper started"
            );

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                self.sweep().await;
            }
        })
    }

    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    /// Close every session idle for longer than the TTL as of `now`.
    ///
    /// Sessions that close concurrently are skipped; each close is bounded by the
    /// manager's grace period.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = match chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
        {
            Some(cutoff) => cutoff,
            // Nothing can have been idle for that long
            None => return 0,
        };

        let mut expired = 0;
        for session in self.manager.registry().snapshot().await {
            if self.manager.expire_if_idle(&session.id, cutoff).await {
                crate::metrics::record_idle_expiry();
                info!(
                    session_id = %session.id,
                    container_id = %session.target,
                    reason = CloseReason::Idle.as_str(),
                    "Closed idle terminal session"
                );
                expired += 1;
            }
        }

        debug!(expired, "Idle sweep finished");
        expired
    }
}
