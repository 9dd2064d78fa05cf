//! Continuous mode.
//!
//! [`run_continuous`] repeats [`run_cycle`] until a stop is requested or an
//! optional cycle limit is reached. A failed cycle is logged and counted;
//! the loop sleeps for the configured interval and tries again.
//!
//! [`run_cycle`]: crate::cycle::run_cycle

use std::time::Duration;

use claimwatch_db::Store;
use serde::Serialize;
use tracing::{error, info};

use crate::cycle::{CycleContext, CycleReport, now_epoch, run_cycle};
use crate::report::ReportSink;
use crate::transport::Transport;

/// Why continuous mode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunEndReason {
    /// A stop was requested.
    Stopped,
    /// The cycle limit was reached.
    CycleLimit,
}

/// Summary of a continuous run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Why the loop ended.
    pub end_reason: RunEndReason,
    /// Cycles started.
    pub cycles: u64,
    /// Cycles that returned an error.
    pub failed: u64,
    /// Report of the last cycle that succeeded.
    pub last_report: Option<CycleReport>,
}

/// Run cycles every `interval` until stopped.
///
/// `max_cycles` bounds the run; `None` runs until a stop is requested.
pub async fn run_continuous<S, T, R>(
    ctx: &CycleContext<'_, S, T, R>,
    interval: Duration,
    max_cycles: Option<u64>,
) -> RunSummary
where
    S: Store,
    T: Transport,
    R: ReportSink,
{
    let mut cycles: u64 = 0;
    let mut failed: u64 = 0;
    let mut last_report = None;

    info!(
        interval_secs = interval.as_secs(),
        max_cycles,
        "Continuous mode starting"
    );

    let end_reason = loop {
        if ctx.shutdown.is_requested() {
            break RunEndReason::Stopped;
        }
        if max_cycles.is_some_and(|max| cycles >= max) {
            break RunEndReason::CycleLimit;
        }

        cycles = cycles.saturating_add(1);
        match run_cycle(ctx, now_epoch()).await {
            Ok(report) => last_report = Some(report),
            Err(e) => {
                failed = failed.saturating_add(1);
                error!(cycle = cycles, error = %e, "Cycle failed");
            }
        }

        if max_cycles.is_some_and(|max| cycles >= max) {
            break RunEndReason::CycleLimit;
        }
        if ctx.shutdown.sleep(interval).await {
            break RunEndReason::Stopped;
        }
    };

    info!(reason = ?end_reason, cycles, failed, "Continuous mode ended");
    RunSummary {
        end_reason,
        cycles,
        failed,
        last_report,
    }
}
