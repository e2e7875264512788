//! Background ticker: advances the simulated workload and publishes frames,
//! so stream clients see a live backend.

use crate::state::AppState;
use botwatch::types::{BotStatus, LogLevel};
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Jobs arriving per tick while the bot is not stopped.
const ARRIVALS_PER_TICK: u32 = 2;
const QUEUE_LIMIT: u32 = 10_000;

pub fn spawn_ticker(state: AppState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let processed = advance(&state).await;
            state.publish_snapshot().await;
            if processed > 0 {
                state
                    .log(LogLevel::Info, format!("processed {processed} job(s)"))
                    .await;
            }
        }
    })
}

/// One simulation step. Returns the number of jobs processed.
pub async fn advance(state: &AppState) -> u32 {
    let mut snap = state.snapshot.write().await;
    if snap.status != BotStatus::Stopped {
        snap.queue_depth = snap.queue_depth.saturating_add(ARRIVALS_PER_TICK).min(QUEUE_LIMIT);
    }
    let processed = if snap.status == BotStatus::Running {
        snap.active_workers.min(snap.queue_depth)
    } else {
        0
    };
    snap.queue_depth -= processed;
    snap.jobs_processed = snap.jobs_processed.saturating_add(u64::from(processed));
    if processed > 0 {
        snap.success_rate = (snap.success_rate + 0.05).min(99.9);
    }
    snap.last_heartbeat = Utc::now();
    processed
}
