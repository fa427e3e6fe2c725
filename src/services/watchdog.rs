use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::job::{JobState, TransitionError};
use crate::services::registry::{JobRegistry, RegistryError};

/// Periodically fails jobs that entered `processing` and never reported
/// progress within the timeout.
///
/// A job with any progress above zero is never touched, however long it runs.
pub struct Watchdog {
    registries: Vec<Arc<JobRegistry>>,
    period: Duration,
    timeout: Duration,
}

impl Watchdog {
    pub fn new(registries: Vec<Arc<JobRegistry>>, period: Duration, timeout: Duration) -> Self {
        Self {
            registries,
            period,
            timeout,
        }
    }

    /// Run one sweep as of `now` and return the ids that were cancelled.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let timeout = chrono::Duration::from_std(self.timeout).unwrap_or_else(|_| chrono::Duration::weeks(52));
        let message = format!(
            "automatic timeout cancellation: no progress within {} seconds",
            self.timeout.as_secs()
        );
        let mut cancelled = Vec::new();

        for registry in &self.registries {
            let candidates: Vec<Uuid> = registry
                .list_active()
                .into_iter()
                .filter(|record| record.state == JobState::Processing)
                .map(|record| record.id)
                .collect();

            for id in candidates {
                // Re-checked under the registry lock so a concurrent progress
                // update wins over the cancellation.
                let result = registry
                    .update(id, |record| {
                        if record.is_stuck(now, timeout) {
                            record.fail(message.clone())
                        } else {
                            Err(TransitionError::NotStuck)
                        }
                    })
                    .await;

                match result {
                    Ok(_) => {
                        metrics::counter!("detector_watchdog_cancellations_total").increment(1);
                        warn!(registry = registry.name(), job_id = %id, "Cancelled stuck job");
                        cancelled.push(id);
                    }
                    Err(RegistryError::Rejected {
                        source: TransitionError::NotStuck,
                        ..
                    })
                    | Err(RegistryError::Terminal { .. }) => {}
                    Err(e) => {
                        warn!(registry = registry.name(), job_id = %id, error = %e, "Watchdog check failed");
                    }
                }
            }
        }

        cancelled
    }

    /// Start the periodic sweep on the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                period_secs = self.period.as_secs(),
                timeout_secs = self.timeout.as_secs(),
                "Watchdog started"
            );
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let cancelled = self.sweep_at(Utc::now()).await;
                if !cancelled.is_empty() {
                    info!(count = cancelled.len(), "Watchdog sweep cancelled jobs");
                }
            }
        })
    }
}
