//! Countdown - logs the expected remaining campaign time.

use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Interval between two countdown log lines
pub const DEFAULT_COUNTDOWN_STEP: Duration = Duration::from_secs(10);

/// Expected duration of the timed phase: all rounds plus the grace wait.
/// Saturates at `Duration::MAX`.
pub fn expected_duration(rounds: u32, period: Duration, grace_period: Duration) -> Duration {
    period
        .saturating_mul(rounds.saturating_sub(1))
        .saturating_add(grace_period)
}

/// Log the remaining time every `step` until `completion` fires.
/// Returns the number of log lines emitted.
pub async fn run(total: Duration, step: Duration, completion: CancellationToken) -> u32 {
    let started = Instant::now();
    let mut ticker = interval_at(started + step, step);
    let mut ticks = 0;

    loop {
        tokio::select! {
            _ = completion.cancelled() => break,
            _ = ticker.tick() => {}
        }
        ticks += 1;
        let remaining = total.saturating_sub(started.elapsed());
        info!(remaining_secs = remaining.as_secs(), "Benchmark running");
    }

    ticks
}
