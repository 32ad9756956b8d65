//! The tick loop.
//!
//! [`run_session`] steps a [`Session`] until a tick limit is reached or a
//! stop is requested, sleeping the configured interval between ticks.

use std::sync::atomic::{AtomicBool, Ordering};

use oath_core::config::EngineConfig;
use tracing::{debug, info, warn};

use crate::session::{Session, TickSummary};

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    /// Reached the configured `max_ticks` limit.
    MaxTicksReached,
    /// A stop was requested (Ctrl-C).
    StopRequested,
}

/// Result of a run.
#[derive(Debug)]
pub struct RunResult {
    /// Why the loop ended.
    pub end_reason: SessionEndReason,
    /// The last tick summary, if any tick ran.
    pub final_summary: Option<TickSummary>,
    /// Ticks executed during this run.
    pub total_ticks: u64,
}

/// Step `session` until `max_ticks` ticks have run (never, when 0) or
/// `stop` is set.
pub async fn run_session(session: &mut Session, engine: &EngineConfig, stop: &AtomicBool) -> RunResult {
    let mut last_summary: Option<TickSummary> = None;
    let mut total_ticks: u64 = 0;

    info!(
        max_ticks = engine.max_ticks,
        tick_interval_ms = engine.tick_interval_ms,
        delta_seconds = engine.delta_seconds,
        "Session loop starting"
    );

    loop {
        if stop.load(Ordering::Acquire) {
            info!("Stop requested");
            return RunResult {
                end_reason: SessionEndReason::StopRequested,
                final_summary: last_summary,
                total_ticks,
            };
        }

        let summary = session.step();
        total_ticks = total_ticks.saturating_add(1);
        debug!(
            tick = summary.tick,
            days_passed = summary.days_passed,
            hour = summary.hour,
            failures = summary.failures,
            "Tick complete"
        );

        if engine.max_ticks > 0 && total_ticks >= engine.max_ticks {
            info!(max_ticks = engine.max_ticks, "Tick limit reached");
            return RunResult {
                end_reason: SessionEndReason::MaxTicksReached,
                final_summary: Some(summary),
                total_ticks,
            };
        }
        last_summary = Some(summary);

        if engine.tick_interval_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(engine.tick_interval_ms)).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

/// Log how the run ended.
pub fn log_session_end(result: &RunResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        "Session loop ended"
    );

    if let Some(summary) = result.final_summary {
        info!(
            tick = summary.tick,
            days_passed = summary.days_passed,
            hour = summary.hour,
            season = %summary.season,
            gold = summary.gold,
            health = summary.health,
            "Final tick summary"
        );
    } else {
        warn!("Session ended with no ticks executed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use oath_core::config::OathConfig;

    use super::*;

    fn engine(max_ticks: u64) -> EngineConfig {
        EngineConfig {
            tick_interval_ms: 0,
            delta_seconds: 60.0,
            max_ticks,
        }
    }

    fn session() -> Session {
        let mut config = OathConfig::default();
        config.save.path = std::env::temp_dir()
            .join(format!("oath-runner-{}.json", uuid::Uuid::new_v4()))
            .display()
            .to_string();
        Session::new(&config).unwrap()
    }

    #[tokio::test]
    async fn stops_at_the_tick_limit() {
        let mut session = session();
        let stop = AtomicBool::new(false);
        let result = run_session(&mut session, &engine(24), &stop).await;

        assert_eq!(result.end_reason, SessionEndReason::MaxTicksReached);
        assert_eq!(result.total_ticks, 24);
        let summary = result.final_summary.unwrap();
        assert_eq!(summary.tick, 24);
        assert_eq!(summary.days_passed, 1);
        assert_eq!(summary.hour, 8);
    }

    #[tokio::test]
    async fn a_pending_stop_runs_no_ticks() {
        let mut session = session();
        let stop = AtomicBool::new(true);
        let result = run_session(&mut session, &engine(0), &stop).await;

        assert_eq!(result.end_reason, SessionEndReason::StopRequested);
        assert_eq!(result.total_ticks, 0);
        assert!(result.final_summary.is_none());
        assert_eq!(session.ticks(), 0);
    }
}
