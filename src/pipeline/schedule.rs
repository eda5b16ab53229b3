// src/pipeline/schedule.rs

//! Repeated polling with a randomized pause between cycles.

use std::time::Duration;

use rand::Rng;

use crate::models::ScheduleConfig;
use crate::pipeline::poll::{CycleOutcome, Poller};

/// Pause before the next cycle: base delay plus a uniform jitter.
pub fn next_delay(schedule: &ScheduleConfig) -> Duration {
    let low = schedule.jitter_min_secs.min(schedule.jitter_max_secs);
    let high = schedule.jitter_min_secs.max(schedule.jitter_max_secs);
    let jitter = rand::rng().random_range(low..=high);
    Duration::from_secs(schedule.base_delay_secs.saturating_add(jitter))
}

/// Poll until Ctrl-C, or until `max_cycles` cycles have run.
///
/// Cycles never overlap. Failures are logged and the loop carries on with
/// the previous snapshot. Ctrl-C is only observed while sleeping, so a
/// cycle in flight always finishes.
pub async fn run_forever(poller: &Poller, schedule: &ScheduleConfig, max_cycles: Option<usize>) {
    let mut previous = poller.load_previous().await;
    let mut cycles = 0usize;

    loop {
        match poller.run_cycle(&mut previous).await {
            Ok(CycleOutcome::Completed(summary)) => log::debug!(
                "Cycle done: {} kitas, {} of interest, notified: {}",
                summary.kita_count,
                summary.report.interesting.len(),
                summary.notified
            ),
            Ok(CycleOutcome::Empty) => {}
            Err(e) => log::error!("Poll cycle failed: {}", e),
        }

        cycles += 1;
        if max_cycles.is_some_and(|max| cycles >= max) {
            log::info!("Finished {} cycle(s)", cycles);
            break;
        }

        let delay = next_delay(schedule);
        log::debug!(
            "Run again in {}s ({:.1}min)",
            delay.as_secs(),
            delay.as_secs_f64() / 60.0
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping after {} cycle(s)", cycles);
                break;
            }
        }
    }
}
