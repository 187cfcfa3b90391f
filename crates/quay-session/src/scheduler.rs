//! Periodic job scheduling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Result, SessionError};

/// A job that runs on a fixed period.
///
/// Jobs report their own failures; nothing is returned to the scheduler.
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    async fn run(&self);
}

/// Runs jobs at a fixed rate.
pub trait Scheduler: Send + Sync {
    /// Run `job` after `initial_delay`, then every `period`.
    fn schedule_at_fixed_rate(
        &self,
        job: Arc<dyn PeriodicJob>,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<ScheduleHandle>;
}

/// Cancels a scheduled job. Dropping the handle leaves the job running.
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    token: CancellationToken,
}

impl ScheduleHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Stop future runs. A run already in progress finishes.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// [`Scheduler`] backed by tokio timers on the current runtime.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler;

impl TokioScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_at_fixed_rate(
        &self,
        job: Arc<dyn PeriodicJob>,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<ScheduleHandle> {
        if period.is_zero() {
            return Err(SessionError::Registration(
                "period must be greater than zero".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SessionError::Registration(format!("no tokio runtime: {e}")))?;

        let token = CancellationToken::new();
        let cancelled = token.clone();
        runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + initial_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        trace!("Running scheduled job");
                        job.run().await;
                    }
                }
            }
            debug!("Scheduled job cancelled");
        });

        debug!(
            initial_delay_ms = initial_delay.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "Scheduled job at fixed rate"
        );
        Ok(ScheduleHandle::new(token))
    }
}
