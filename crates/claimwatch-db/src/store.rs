//! The persistent store contract and its row types.
//!
//! Every table is keyed by a natural key (account name, settlement name,
//! polity name). Writes are upserts on that key. Reads return row structs
//! that carry the store's surrogate id and the `update_time` stamped by the
//! last write.

use std::future::Future;

use claimwatch_types::{
    AccountId, AccountSighting, PolityAggregates, PolityCandidate, PolityId, Position,
    Settlement, SettlementId,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DbError;

/// Marker key holding the first-run timestamp.
pub const FIRST_RUN_KEY: &str = "first_run_timestamp";

/// Clamp an unsigned tally into a `BIGINT` column.
pub fn to_column(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Read a `BIGINT` tally column back, treating negatives as zero.
pub fn from_column(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// A row from the `accounts` table.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AccountRow {
    /// Surrogate id.
    pub id: Uuid,
    /// Account name.
    pub account: String,
    /// Display name.
    pub display_name: String,
    /// World of the last sighting.
    pub world: String,
    /// East-west coordinate.
    pub x: f64,
    /// Elevation.
    pub y: f64,
    /// North-south coordinate.
    pub z: f64,
    /// Health at last sighting.
    pub health: f64,
    /// Armor at last sighting.
    pub armor: i64,
    /// Map sort order.
    pub sort: i64,
    /// Map marker type.
    pub kind: String,
    /// Epoch seconds of the last write.
    pub update_time: i64,
}

impl AccountRow {
    /// Build the row a sighting would produce at `now`.
    pub fn from_sighting(sighting: &AccountSighting, now: i64) -> Self {
        Self {
            id: AccountId::new().into_inner(),
            account: sighting.account.clone(),
            display_name: sighting.display_name.clone(),
            world: sighting.world.clone(),
            x: sighting.position.x,
            y: sighting.position.y,
            z: sighting.position.z,
            health: sighting.health,
            armor: sighting.armor,
            sort: sighting.sort,
            kind: sighting.kind.clone(),
            update_time: now,
        }
    }

    /// Typed row id.
    pub fn row_id(&self) -> AccountId {
        AccountId::from(self.id)
    }

    /// Last known position.
    pub const fn position(&self) -> Position {
        Position::new(self.x, self.y, self.z)
    }
}

/// A row from the `settlements` table.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SettlementRow {
    /// Surrogate id.
    pub id: Uuid,
    /// Settlement name.
    pub name: String,
    /// Marker label.
    pub label: String,
    /// East-west coordinate.
    pub x: f64,
    /// Elevation.
    pub y: f64,
    /// North-south coordinate.
    pub z: f64,
    /// Tier label.
    pub tier: String,
    /// Steward account.
    pub steward: String,
    /// Treasury text.
    pub treasury: String,
    /// Claimed area in chunks.
    pub area: i64,
    /// Member accounts.
    pub members: Vec<String>,
    /// Owning polity, empty when unaffiliated.
    pub polity: String,
    /// Epoch seconds of the last write.
    pub update_time: i64,
}

impl SettlementRow {
    /// Build the row a settlement would produce at `now`.
    pub fn from_settlement(settlement: &Settlement, now: i64) -> Self {
        Self {
            id: SettlementId::new().into_inner(),
            name: settlement.name.clone(),
            label: settlement.label.clone(),
            x: settlement.position.x,
            y: settlement.position.y,
            z: settlement.position.z,
            tier: settlement.tier.clone(),
            steward: settlement.steward.clone(),
            treasury: settlement.treasury.clone(),
            area: to_column(settlement.area),
            members: settlement.members.clone(),
            polity: settlement.polity.clone(),
            update_time: now,
        }
    }

    /// Typed row id.
    pub fn row_id(&self) -> SettlementId {
        SettlementId::from(self.id)
    }

    /// Claimed area as an unsigned count.
    pub fn area_chunks(&self) -> u64 {
        from_column(self.area)
    }
}

/// A row from the `polities` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PolityRow {
    /// Surrogate id.
    pub id: Uuid,
    /// Polity name.
    pub name: String,
    /// Tier label.
    pub tier: String,
    /// Capital settlement name.
    pub capital: String,
    /// Claimed settlement names.
    pub territories: Vec<String>,
    /// Length of `territories` as of the last reconciliation.
    pub territory_count: i64,
    /// Distinct members across found territories.
    pub member_count: i64,
    /// Total area of found territories.
    pub total_area: i64,
    /// Epoch seconds of the last write.
    pub update_time: i64,
}

impl PolityRow {
    /// Build the row a candidate would produce at `now`, before any
    /// reconciliation.
    pub fn from_candidate(candidate: &PolityCandidate, now: i64) -> Self {
        Self {
            id: PolityId::new().into_inner(),
            name: candidate.name.clone(),
            tier: candidate.tier.clone(),
            capital: candidate.capital.clone(),
            territories: candidate.territories.clone(),
            territory_count: to_column(u64::try_from(candidate.territories.len()).unwrap_or(0)),
            member_count: 0,
            total_area: 0,
            update_time: now,
        }
    }

    /// Typed row id.
    pub fn row_id(&self) -> PolityId {
        PolityId::from(self.id)
    }

    /// Stored aggregates.
    pub fn aggregates(&self) -> PolityAggregates {
        PolityAggregates {
            territory_count: from_column(self.territory_count),
            member_count: from_column(self.member_count),
            total_area: from_column(self.total_area),
        }
    }
}

/// Row counts and headline figures across the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StoreCounts {
    /// Rows in `accounts`.
    pub accounts: i64,
    /// Rows in `settlements`.
    pub settlements: i64,
    /// Rows in `polities`.
    pub polities: i64,
    /// Sum of settlement area.
    pub total_area: i64,
    /// Most recent account `update_time`, if any account exists.
    pub latest_account_update: Option<i64>,
}

/// Persistence operations used by the ingestion cycle, the reconciler and
/// the query service.
///
/// Upserts replace every column except the surrogate id. `now` is the
/// caller's clock in epoch seconds.
pub trait Store: Send + Sync {
    /// Insert or overwrite an account by name.
    fn upsert_account(
        &self,
        sighting: &AccountSighting,
        now: i64,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Look up one account.
    fn get_account(
        &self,
        account: &str,
    ) -> impl Future<Output = Result<Option<AccountRow>, DbError>> + Send;

    /// All accounts, most recently updated first.
    fn list_accounts(&self) -> impl Future<Output = Result<Vec<AccountRow>, DbError>> + Send;

    /// Insert or overwrite a settlement by name.
    fn upsert_settlement(
        &self,
        settlement: &Settlement,
        now: i64,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Look up one settlement.
    fn get_settlement(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<SettlementRow>, DbError>> + Send;

    /// All settlements, largest first.
    fn list_settlements(&self)
    -> impl Future<Output = Result<Vec<SettlementRow>, DbError>> + Send;

    /// Settlements listing `account` as a member, largest first.
    fn settlements_with_member(
        &self,
        account: &str,
    ) -> impl Future<Output = Result<Vec<SettlementRow>, DbError>> + Send;

    /// Settlements affiliated with `polity`, largest first.
    fn settlements_in_polity(
        &self,
        polity: &str,
    ) -> impl Future<Output = Result<Vec<SettlementRow>, DbError>> + Send;

    /// Insert or overwrite a polity's descriptive columns by name. Stored
    /// aggregates other than `territory_count` are left untouched.
    fn upsert_polity(
        &self,
        candidate: &PolityCandidate,
        now: i64,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Look up one polity.
    fn get_polity(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<PolityRow>, DbError>> + Send;

    /// All polities in name order.
    fn list_polities(&self) -> impl Future<Output = Result<Vec<PolityRow>, DbError>> + Send;

    /// Overwrite a polity's aggregate columns. A missing polity is a no-op.
    fn update_polity_aggregates(
        &self,
        name: &str,
        aggregates: PolityAggregates,
        now: i64,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Settlements with non-zero area, largest first.
    fn top_settlements_by_area(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<SettlementRow>, DbError>> + Send;

    /// Polities by stored total area, largest first.
    fn top_polities_by_area(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<PolityRow>, DbError>> + Send;

    /// Accounts whose name or display name contains `keyword`, ignoring case.
    fn search_accounts(
        &self,
        keyword: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<AccountRow>, DbError>> + Send;

    /// Settlements whose name or steward contains `keyword`, ignoring case.
    fn search_settlements(
        &self,
        keyword: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<SettlementRow>, DbError>> + Send;

    /// Polities whose name or capital contains `keyword`, ignoring case.
    fn search_polities(
        &self,
        keyword: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<PolityRow>, DbError>> + Send;

    /// Delete accounts last written before `cutoff`. Returns rows removed.
    fn delete_accounts_before(
        &self,
        cutoff: i64,
    ) -> impl Future<Output = Result<u64, DbError>> + Send;

    /// Row counts and headline figures.
    fn counts(&self) -> impl Future<Output = Result<StoreCounts, DbError>> + Send;

    /// Read a system marker.
    fn get_marker(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, DbError>> + Send;

    /// Write a system marker unless it already exists. Returns `true` when
    /// this call created it.
    fn set_marker_once(
        &self,
        key: &str,
        value: &str,
        now: i64,
    ) -> impl Future<Output = Result<bool, DbError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_conversion_clamps() {
        assert_eq!(to_column(u64::MAX), i64::MAX);
        assert_eq!(from_column(-5), 0);
        assert_eq!(from_column(42), 42);
    }

    #[test]
    fn candidate_row_counts_territories() {
        let c = PolityCandidate {
            name: "Northreach".to_owned(),
            territories: vec!["A".to_owned(), "B".to_owned()],
            ..PolityCandidate::default()
        };
        let row = PolityRow::from_candidate(&c, 10);
        assert_eq!(row.territory_count, 2);
        assert_eq!(row.aggregates().member_count, 0);
    }
}
