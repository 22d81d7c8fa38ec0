//! Expiry sweeper.
//!
//! # Responsibilities
//! - Periodically find users whose effective expiry has passed
//! - Ask the access-control system to revoke each of them
//! - Prune their lapsed rows in one transaction
//!
//! # Design Decisions
//! - Single-flight: a tick that starts while another runs is skipped, and
//!   the timer skips missed ticks instead of bursting
//! - One "now" per tick; expired means `max_expiry <= now`
//! - A failed revocation is logged and the user is still pruned. Users the
//!   tick budget did not reach keep their rows for the next tick
//! - Deletes are scoped to `expires_at <= now`, so a grant that lands during
//!   the tick survives it

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::SweeperConfig;
use crate::observability::metrics;
use crate::store::{StoreError, SubscriptionStore, UserId};
use crate::subscriptions::access::AccessRevoker;
use crate::subscriptions::clock::Clock;

/// Counts from one completed tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub total_users: usize,
    pub active: usize,
    pub expired: usize,
    pub revoked: usize,
    pub revoke_failures: usize,
    pub deleted_rows: u64,
    pub deferred: usize,
}

/// Result of a tick request.
#[derive(Debug)]
pub enum TickOutcome {
    Completed(SweepReport),
    /// Another tick was already running.
    Skipped,
    /// The store could not be read or the prune was rolled back.
    Failed(StoreError),
}

/// Clears the running flag when a tick ends, including by panic or cancellation.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ExpirySweeper {
    store: SubscriptionStore,
    revoker: Arc<dyn AccessRevoker>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
    running: AtomicBool,
}

impl ExpirySweeper {
    pub fn new(
        store: SubscriptionStore,
        revoker: Arc<dyn AccessRevoker>,
        clock: Arc<dyn Clock>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            store,
            revoker,
            clock,
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run the timer loop until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Expiry sweeper disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            budget = self.config.tick_budget_secs,
            "Expiry sweeper starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Outcomes are logged inside; nothing here may end the loop.
                    let _ = self.tick().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Expiry sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Execute one sweep, unless one is already in progress.
    pub async fn tick(&self) -> TickOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sweep already running, skipping tick");
            return TickOutcome::Skipped;
        }
        let _guard = RunningGuard(&self.running);

        let started = Instant::now();
        match self.sweep().await {
            Ok(report) => {
                metrics::record_sweep(started.elapsed(), report.active, report.deferred);
                if report.expired > 0 || report.deleted_rows > 0 {
                    tracing::info!(
                        users = report.total_users,
                        expired = report.expired,
                        revoked = report.revoked,
                        revoke_failures = report.revoke_failures,
                        deleted_rows = report.deleted_rows,
                        deferred = report.deferred,
                        elapsed = ?started.elapsed(),
                        "Sweep completed"
                    );
                } else {
                    tracing::debug!(users = report.total_users, "Sweep completed, nothing expired");
                }
                TickOutcome::Completed(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Sweep failed; no rows were removed");
                TickOutcome::Failed(e)
            }
        }
    }

    async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let now = self.clock.now();
        let deadline = Instant::now() + Duration::from_secs(self.config.tick_budget_secs);

        let expiries = self.store.max_expiry_per_user().await?;
        let expired: Vec<UserId> = expiries
            .iter()
            .filter(|(_, max_expiry)| *max_expiry <= now)
            .map(|(user_id, _)| *user_id)
            .collect();

        let mut report = SweepReport {
            total_users: expiries.len(),
            active: expiries.len() - expired.len(),
            expired: expired.len(),
            ..SweepReport::default()
        };

        let mut processed = Vec::with_capacity(expired.len());
        let mut reached = 0;
        for &user_id in &expired {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let latest = self.store.latest_row(user_id).await?;

            // Renewed after the expiry scan: the user holds a valid row again.
            if let Some(row) = latest.as_ref().filter(|row| row.is_active_at(now)) {
                tracing::info!(user_id, plan = %row.plan, expires_at = %row.expires_at, "Renewed during sweep, keeping access");
                report.expired -= 1;
                report.active += 1;
                reached += 1;
                continue;
            }

            let plan = latest.map_or_else(|| "-".to_string(), |row| row.plan);

            match time::timeout(remaining, self.revoker.revoke(user_id, &plan)).await {
                Ok(Ok(())) => {
                    tracing::info!(user_id, plan = %plan, "Access revoked for lapsed subscription");
                    metrics::record_revocation(true);
                    report.revoked += 1;
                }
                Ok(Err(e)) => {
                    tracing::warn!(user_id, plan = %plan, error = %e, "Revocation failed; pruning lapsed rows anyway");
                    metrics::record_revocation(false);
                    report.revoke_failures += 1;
                }
                Err(_) => {
                    tracing::warn!(user_id, "Tick budget exhausted during revocation, deferring user");
                    break;
                }
            }
            reached += 1;
            processed.push(user_id);
        }

        report.deferred = expired.len() - reached;
        if report.deferred > 0 {
            tracing::warn!(deferred = report.deferred, "Tick budget exhausted, remaining users deferred");
        }

        if !processed.is_empty() {
            report.deleted_rows = self.store.delete_lapsed_batch(&processed, now).await?;
        }

        Ok(report)
    }
}
