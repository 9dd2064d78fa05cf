//! In-process [`Store`] backed by ordered maps.
//!
//! Behaves like [`PgStore`](crate::PgStore) for every query the core uses,
//! including ordering and case-insensitive search. Writes for selected
//! natural keys can be made to fail, to exercise per-record error handling.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};

use claimwatch_types::{AccountSighting, PolityAggregates, PolityCandidate, Settlement};
use tokio::sync::Mutex;

use crate::error::DbError;
use crate::store::{
    AccountRow, PolityRow, SettlementRow, Store, StoreCounts, to_column,
};

#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<String, AccountRow>,
    settlements: BTreeMap<String, SettlementRow>,
    polities: BTreeMap<String, PolityRow>,
    markers: BTreeMap<String, String>,
    failing: HashSet<String>,
}

impl Tables {
    fn check(&self, key: &str) -> Result<(), DbError> {
        if self.failing.contains(key) {
            return Err(DbError::Rejected(key.to_owned()));
        }
        Ok(())
    }
}

/// A [`Store`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later write keyed by `key` fail with [`DbError::Rejected`].
    pub async fn fail_writes_for(&self, key: &str) {
        self.tables.lock().await.failing.insert(key.to_owned());
    }

    /// Insert a settlement row directly, bypassing the upsert path.
    pub async fn insert_settlement_row(&self, row: SettlementRow) {
        self.tables
            .lock()
            .await
            .settlements
            .insert(row.name.clone(), row);
    }
}

fn contains_ignoring_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn take<T>(rows: impl Iterator<Item = T>, limit: u32) -> Vec<T> {
    rows.take(usize::try_from(limit).unwrap_or(usize::MAX)).collect()
}

fn by_area(rows: &mut [SettlementRow]) {
    rows.sort_by(|a, b| b.area.cmp(&a.area).then_with(|| a.name.cmp(&b.name)));
}

fn by_total_area(rows: &mut [PolityRow]) {
    rows.sort_by(|a, b| {
        b.total_area
            .cmp(&a.total_area)
            .then_with(|| a.name.cmp(&b.name))
    });
}

impl Store for MemoryStore {
    async fn upsert_account(&self, sighting: &AccountSighting, now: i64) -> Result<(), DbError> {
        let mut tables = self.tables.lock().await;
        tables.check(&sighting.account)?;
        let mut row = AccountRow::from_sighting(sighting, now);
        if let Some(existing) = tables.accounts.get(&sighting.account) {
            row.id = existing.id;
        }
        tables.accounts.insert(sighting.account.clone(), row);
        Ok(())
    }

    async fn get_account(&self, account: &str) -> Result<Option<AccountRow>, DbError> {
        Ok(self.tables.lock().await.accounts.get(account).cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<AccountRow>, DbError> {
        let mut rows: Vec<_> = self.tables.lock().await.accounts.values().cloned().collect();
        rows.sort_by_key(|r| Reverse(r.update_time));
        Ok(rows)
    }

    async fn upsert_settlement(&self, settlement: &Settlement, now: i64) -> Result<(), DbError> {
        let mut tables = self.tables.lock().await;
        tables.check(&settlement.name)?;
        let mut row = SettlementRow::from_settlement(settlement, now);
        if let Some(existing) = tables.settlements.get(&settlement.name) {
            row.id = existing.id;
        }
        tables.settlements.insert(settlement.name.clone(), row);
        Ok(())
    }

    async fn get_settlement(&self, name: &str) -> Result<Option<SettlementRow>, DbError> {
        Ok(self.tables.lock().await.settlements.get(name).cloned())
    }

    async fn list_settlements(&self) -> Result<Vec<SettlementRow>, DbError> {
        let mut rows: Vec<_> = self
            .tables
            .lock()
            .await
            .settlements
            .values()
            .cloned()
            .collect();
        by_area(&mut rows);
        Ok(rows)
    }

    async fn settlements_with_member(&self, account: &str) -> Result<Vec<SettlementRow>, DbError> {
        let mut rows: Vec<_> = self
            .tables
            .lock()
            .await
            .settlements
            .values()
            .filter(|r| r.members.iter().any(|m| m == account))
            .cloned()
            .collect();
        by_area(&mut rows);
        Ok(rows)
    }

    async fn settlements_in_polity(&self, polity: &str) -> Result<Vec<SettlementRow>, DbError> {
        let mut rows: Vec<_> = self
            .tables
            .lock()
            .await
            .settlements
            .values()
            .filter(|r| r.polity == polity)
            .cloned()
            .collect();
        by_area(&mut rows);
        Ok(rows)
    }

    async fn upsert_polity(&self, candidate: &PolityCandidate, now: i64) -> Result<(), DbError> {
        let mut tables = self.tables.lock().await;
        tables.check(&candidate.name)?;
        let fresh = PolityRow::from_candidate(candidate, now);
        match tables.polities.get_mut(&candidate.name) {
            Some(row) => {
                row.tier = fresh.tier;
                row.capital = fresh.capital;
                row.territories = fresh.territories;
                row.territory_count = fresh.territory_count;
                row.update_time = now;
            }
            None => {
                tables.polities.insert(candidate.name.clone(), fresh);
            }
        }
        Ok(())
    }

    async fn get_polity(&self, name: &str) -> Result<Option<PolityRow>, DbError> {
        Ok(self.tables.lock().await.polities.get(name).cloned())
    }

    async fn list_polities(&self) -> Result<Vec<PolityRow>, DbError> {
        Ok(self.tables.lock().await.polities.values().cloned().collect())
    }

    async fn update_polity_aggregates(
        &self,
        name: &str,
        aggregates: PolityAggregates,
        now: i64,
    ) -> Result<(), DbError> {
        let mut tables = self.tables.lock().await;
        tables.check(name)?;
        if let Some(row) = tables.polities.get_mut(name) {
            row.territory_count = to_column(aggregates.territory_count);
            row.member_count = to_column(aggregates.member_count);
            row.total_area = to_column(aggregates.total_area);
            row.update_time = now;
        }
        Ok(())
    }

    async fn top_settlements_by_area(&self, limit: u32) -> Result<Vec<SettlementRow>, DbError> {
        let mut rows: Vec<_> = self
            .tables
            .lock()
            .await
            .settlements
            .values()
            .filter(|r| r.area > 0)
            .cloned()
            .collect();
        by_area(&mut rows);
        Ok(take(rows.into_iter(), limit))
    }

    async fn top_polities_by_area(&self, limit: u32) -> Result<Vec<PolityRow>, DbError> {
        let mut rows: Vec<_> = self.tables.lock().await.polities.values().cloned().collect();
        by_total_area(&mut rows);
        Ok(take(rows.into_iter(), limit))
    }

    async fn search_accounts(&self, keyword: &str, limit: u32) -> Result<Vec<AccountRow>, DbError> {
        let mut rows: Vec<_> = self
            .tables
            .lock()
            .await
            .accounts
            .values()
            .filter(|r| {
                contains_ignoring_case(&r.account, keyword)
                    || contains_ignoring_case(&r.display_name, keyword)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| Reverse(r.update_time));
        Ok(take(rows.into_iter(), limit))
    }

    async fn search_settlements(
        &self,
        keyword: &str,
        limit: u32,
    ) -> Result<Vec<SettlementRow>, DbError> {
        let mut rows: Vec<_> = self
            .tables
            .lock()
            .await
            .settlements
            .values()
            .filter(|r| {
                contains_ignoring_case(&r.name, keyword)
                    || contains_ignoring_case(&r.steward, keyword)
            })
            .cloned()
            .collect();
        by_area(&mut rows);
        Ok(take(rows.into_iter(), limit))
    }

    async fn search_polities(&self, keyword: &str, limit: u32) -> Result<Vec<PolityRow>, DbError> {
        let mut rows: Vec<_> = self
            .tables
            .lock()
            .await
            .polities
            .values()
            .filter(|r| {
                contains_ignoring_case(&r.name, keyword)
                    || contains_ignoring_case(&r.capital, keyword)
            })
            .cloned()
            .collect();
        by_total_area(&mut rows);
        Ok(take(rows.into_iter(), limit))
    }

    async fn delete_accounts_before(&self, cutoff: i64) -> Result<u64, DbError> {
        let mut tables = self.tables.lock().await;
        let before = tables.accounts.len();
        tables.accounts.retain(|_, r| r.update_time >= cutoff);
        let removed = before.saturating_sub(tables.accounts.len());
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    async fn counts(&self) -> Result<StoreCounts, DbError> {
        let tables = self.tables.lock().await;
        let len = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
        Ok(StoreCounts {
            accounts: len(tables.accounts.len()),
            settlements: len(tables.settlements.len()),
            polities: len(tables.polities.len()),
            total_area: tables
                .settlements
                .values()
                .fold(0_i64, |acc, r| acc.saturating_add(r.area)),
            latest_account_update: tables.accounts.values().map(|r| r.update_time).max(),
        })
    }

    async fn get_marker(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(self.tables.lock().await.markers.get(key).cloned())
    }

    async fn set_marker_once(&self, key: &str, value: &str, _now: i64) -> Result<bool, DbError> {
        let mut tables = self.tables.lock().await;
        if tables.markers.contains_key(key) {
            return Ok(false);
        }
        tables.markers.insert(key.to_owned(), value.to_owned());
        Ok(true)
    }
}
