//! Outbound bulletins.
//!
//! A [`ReportSink`] receives finished text and is fire-and-forget: a sink
//! that cannot deliver drops the bulletin, it never fails the cycle.

use std::fmt::Write as _;
use std::sync::Mutex;

use chrono::DateTime;
use tracing::info;

use crate::config::InactivityConfig;
use crate::inactivity::{InactiveAccount, InactivityWindow};
use crate::query::AccountProfile;

/// Destination for bulletins.
pub trait ReportSink: Send + Sync {
    /// Deliver one bulletin.
    fn push(&self, bulletin: &str);
}

/// Logs every bulletin at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn push(&self, bulletin: &str) {
        info!(target: "claimwatch::bulletin", "{bulletin}");
    }
}

/// Collects bulletins in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    bulletins: Mutex<Vec<String>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything pushed so far.
    pub fn bulletins(&self) -> Vec<String> {
        match self.bulletins.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ReportSink for MemorySink {
    fn push(&self, bulletin: &str) {
        match self.bulletins.lock() {
            Ok(mut guard) => guard.push(bulletin.to_owned()),
            Err(poisoned) => poisoned.into_inner().push(bulletin.to_owned()),
        }
    }
}

fn timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0).map_or_else(
        || secs.to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// Header line announcing how many accounts fell into `window`.
pub fn window_heading(window: InactivityWindow, count: usize, config: &InactivityConfig) -> String {
    let (warn, expire) = (config.warn_after_days, config.expire_after_days);
    match window {
        InactivityWindow::Approaching => {
            format!("{count} account(s) idle between {warn} and {expire} days")
        }
        InactivityWindow::Expired => format!("{count} account(s) idle for {expire} days or more"),
    }
}

/// Multi-line bulletin describing one idle account.
pub fn inactivity_bulletin(entry: &InactiveAccount, profile: Option<&AccountProfile>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Account: {}", entry.account);
    if let Some(p) = profile {
        let a = &p.account;
        let _ = writeln!(out, "  Name: {}", a.display_name);
        let _ = writeln!(out, "  World: {}", a.world);
        let p = a.position();
        let _ = writeln!(out, "  Position: ({}, {}, {})", p.x, p.y, p.z);
        let _ = writeln!(out, "  Health: {}  Armor: {}", a.health, a.armor);
        let _ = writeln!(out, "  Last seen: {}", timestamp(a.update_time));
    }
    let _ = writeln!(out, "  Last activity: {}", timestamp(entry.last_activity));
    let _ = write!(out, "  Idle: {:.1} days", entry.idle_days());

    match profile.and_then(|p| p.settlement.as_ref()) {
        Some(s) => {
            let _ = write!(
                out,
                "\n  Settlement: {}\n    Tier: {}\n    Steward: {}\n    Area: {}",
                s.name, s.tier, s.steward, s.area
            );
            if let Some(polity) = profile.and_then(|p| p.polity.as_ref()) {
                let _ = write!(
                    out,
                    "\n    Polity: {}\n    Polity tier: {}\n    Capital: {}\n    Territories: {}",
                    polity.name, polity.tier, polity.capital, polity.territory_count
                );
            }
        }
        None => out.push_str("\n  Settlement: none"),
    }
    out
}
