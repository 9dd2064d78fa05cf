//! Inactivity classification.
//!
//! An account's last activity is the most recent `update_time` among the
//! settlements it stewards. Accounts stewarding nothing are measured from
//! the first-run timestamp. Pure functions only; nothing here writes.

use std::collections::HashMap;

use claimwatch_db::{AccountRow, SettlementRow};
use serde::Serialize;

use crate::config::InactivityConfig;

/// Seconds in one day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Which reporting window an inactive account falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InactivityWindow {
    /// Idle for at least the warning threshold but less than the expiry.
    Approaching,
    /// Idle for at least the expiry threshold.
    Expired,
}

/// One account found idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InactiveAccount {
    /// Account name.
    pub account: String,
    /// Epoch seconds of last activity.
    pub last_activity: i64,
    /// Seconds idle as of the classification time.
    pub idle_seconds: i64,
    /// Window the account falls into.
    pub window: InactivityWindow,
}

impl InactiveAccount {
    /// Idle time in fractional days.
    #[allow(clippy::cast_precision_loss)]
    pub fn idle_days(&self) -> f64 {
        self.idle_seconds as f64 / SECONDS_PER_DAY as f64
    }
}

fn threshold_seconds(days: u64) -> i64 {
    i64::try_from(days)
        .unwrap_or(i64::MAX)
        .saturating_mul(SECONDS_PER_DAY)
}

/// Latest settlement `update_time` per steward.
fn activity_index(settlements: &[SettlementRow]) -> HashMap<&str, i64> {
    let mut index: HashMap<&str, i64> = HashMap::new();
    for s in settlements.iter().filter(|s| !s.steward.is_empty()) {
        index
            .entry(s.steward.as_str())
            .and_modify(|t| *t = (*t).max(s.update_time))
            .or_insert(s.update_time);
    }
    index
}

/// Most recent `update_time` of settlements stewarded by `account`, or
/// `first_run` when it stewards none.
pub fn last_activity(account: &str, settlements: &[SettlementRow], first_run: i64) -> i64 {
    settlements
        .iter()
        .filter(|s| s.steward == account)
        .map(|s| s.update_time)
        .max()
        .unwrap_or(first_run)
}

/// Whether `now - last` has reached `threshold_days`.
pub fn is_inactive(last: i64, now: i64, threshold_days: u64) -> bool {
    now.saturating_sub(last) >= threshold_seconds(threshold_days)
}

/// Sort accounts into the approaching and expired windows.
///
/// Accounts idle for less than `warn_after_days` are omitted. Output
/// follows the order of `accounts`.
pub fn classify(
    accounts: &[AccountRow],
    settlements: &[SettlementRow],
    first_run: i64,
    now: i64,
    config: &InactivityConfig,
) -> Vec<InactiveAccount> {
    let index = activity_index(settlements);
    let warn_after = threshold_seconds(config.warn_after_days);
    let expire_after = threshold_seconds(config.expire_after_days);

    accounts
        .iter()
        .filter_map(|a| {
            let last = index.get(a.account.as_str()).copied().unwrap_or(first_run);
            let idle = now.saturating_sub(last);
            let window = if idle >= expire_after {
                InactivityWindow::Expired
            } else if idle >= warn_after {
                InactivityWindow::Approaching
            } else {
                return None;
            };
            Some(InactiveAccount {
                account: a.account.clone(),
                last_activity: last,
                idle_seconds: idle,
                window,
            })
        })
        .collect()
}

/// Every account idle for at least `threshold_days`, as
/// `(account, last_activity)` pairs.
pub fn inactive_accounts(
    accounts: &[AccountRow],
    settlements: &[SettlementRow],
    first_run: i64,
    now: i64,
    threshold_days: u64,
) -> Vec<(String, i64)> {
    let index = activity_index(settlements);
    accounts
        .iter()
        .filter_map(|a| {
            let last = index.get(a.account.as_str()).copied().unwrap_or(first_run);
            is_inactive(last, now, threshold_days).then(|| (a.account.clone(), last))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use claimwatch_types::{AccountSighting, Position, Settlement};

    use super::*;

    const DAY: i64 = SECONDS_PER_DAY;

    fn account(name: &str) -> AccountRow {
        AccountRow::from_sighting(
            &AccountSighting {
                account: name.to_owned(),
                display_name: name.to_owned(),
                world: "world".to_owned(),
                position: Position::default(),
                health: 20.0,
                armor: 0,
                sort: 0,
                kind: "player".to_owned(),
            },
            0,
        )
    }

    fn stewarded(name: &str, steward: &str, update_time: i64) -> SettlementRow {
        SettlementRow::from_settlement(
            &Settlement {
                name: name.to_owned(),
                steward: steward.to_owned(),
                ..Settlement::default()
            },
            update_time,
        )
    }

    #[test]
    fn last_activity_is_latest_stewarded_settlement() {
        let rows = vec![
            stewarded("A", "alice", 100),
            stewarded("B", "alice", 300),
            stewarded("C", "bob", 900),
        ];
        assert_eq!(last_activity("alice", &rows, 5), 300);
        assert_eq!(last_activity("carol", &rows, 5), 5);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(is_inactive(0, 42 * DAY, 42));
        assert!(!is_inactive(0, 42 * DAY - 1, 42));
    }

    #[test]
    fn accounts_without_settlements_use_first_run() {
        let first_run = 1_000;
        let now = first_run + 43 * DAY;
        let out = inactive_accounts(&[account("ghost")], &[], first_run, now, 42);
        assert_eq!(out, vec![("ghost".to_owned(), first_run)]);
    }

    #[test]
    fn windows_are_disjoint() {
        let now = 100 * DAY;
        let accounts = vec![account("fresh"), account("warned"), account("expired")];
        let rows = vec![
            stewarded("A", "fresh", now - 10 * DAY),
            stewarded("B", "warned", now - 41 * DAY - 3_600),
            stewarded("C", "expired", now - 42 * DAY),
        ];
        let out = classify(&accounts, &rows, 0, now, &InactivityConfig::default());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].account, "warned");
        assert_eq!(out[0].window, InactivityWindow::Approaching);
        assert_eq!(out[1].account, "expired");
        assert_eq!(out[1].window, InactivityWindow::Expired);
        assert!(out[1].idle_days() >= 42.0);
    }

    #[test]
    fn newer_settlement_keeps_account_active() {
        let now = 100 * DAY;
        let rows = vec![
            stewarded("Old", "alice", now - 60 * DAY),
            stewarded("New", "alice", now - DAY),
        ];
        let out = classify(&[account("alice")], &rows, 0, now, &InactivityConfig::default());
        assert!(out.is_empty());
    }
}
