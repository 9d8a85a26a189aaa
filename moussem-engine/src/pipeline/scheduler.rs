//! Long-running schedule loop.
//!
//! API/scrape/sheet sources poll every six hours; the pending-candidate
//! queue (manual imports) drains hourly; daily maintenance runs at 02:00
//! UTC; the candidate GC sweeps weekly on the Monday maintenance run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveTime, Utc, Weekday};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::PipelineOrchestrator;
use crate::search::ProjectionSynchronizer;

const INGEST_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
const QUEUE_INTERVAL: Duration = Duration::from_secs(60 * 60);
const DAILY_HOUR_UTC: u32 = 2;

pub struct Scheduler {
    orchestrator: Arc<PipelineOrchestrator>,
    sync: Arc<ProjectionSynchronizer>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, sync: Arc<ProjectionSynchronizer>) -> Self {
        Self { orchestrator, sync }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut ingest_tick = tokio::time::interval(INGEST_INTERVAL);
        let mut queue_tick = tokio::time::interval(QUEUE_INTERVAL);
        ingest_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        queue_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("scheduler started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("scheduler stopping");
                    break;
                }
                _ = ingest_tick.tick() => {
                    if let Err(e) = self.orchestrator.run_ingestion(&cancel, None).await {
                        error!(error = %e, "scheduled ingestion failed");
                    }
                    self.flush_projection_retries().await;
                }
                _ = queue_tick.tick() => {
                    if let Err(e) = self.orchestrator.process_pending_candidates(&cancel).await {
                        error!(error = %e, "pending-queue run failed");
                    }
                    self.flush_projection_retries().await;
                }
                _ = tokio::time::sleep(until_next_daily()) => {
                    if let Err(e) = self.orchestrator.run_daily_maintenance(&cancel).await {
                        error!(error = %e, "daily maintenance failed");
                    }
                    if Utc::now().weekday() == Weekday::Mon {
                        if let Err(e) = self.orchestrator.garbage_collect_candidates() {
                            error!(error = %e, "candidate GC failed");
                        }
                    }
                }
            }
        }
    }

    async fn flush_projection_retries(&self) {
        if self.sync.pending_len() == 0 {
            return;
        }
        match self.sync.flush_pending().await {
            Ok(applied) if applied > 0 => info!(applied, "flushed queued projection ops"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "projection retry flush failed"),
        }
    }
}

/// Wall-clock duration until the next 02:00 UTC.
fn until_next_daily() -> Duration {
    let now = Utc::now();
    let today_run = now
        .date_naive()
        .and_time(NaiveTime::from_hms_opt(DAILY_HOUR_UTC, 0, 0).unwrap_or(NaiveTime::MIN))
        .and_utc();
    let next = if today_run > now {
        today_run
    } else {
        today_run + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::from_secs(60))
}
