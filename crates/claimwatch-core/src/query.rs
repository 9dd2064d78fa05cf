//! Read-only views over the store.
//!
//! Each view is a plain serialisable struct; presentation is left to the
//! caller.

use claimwatch_db::{AccountRow, DbError, PolityRow, SettlementRow, Store, StoreCounts};
use serde::Serialize;

/// An account together with the settlement it belongs to and that
/// settlement's polity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountProfile {
    /// The account row.
    pub account: AccountRow,
    /// Largest settlement listing the account as a member.
    pub settlement: Option<SettlementRow>,
    /// Polity of that settlement.
    pub polity: Option<PolityRow>,
}

/// A settlement and its polity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementProfile {
    /// The settlement row.
    pub settlement: SettlementRow,
    /// Number of listed members.
    pub member_count: usize,
    /// Owning polity, if affiliated and persisted.
    pub polity: Option<PolityRow>,
}

/// A polity and the settlements affiliated with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolityProfile {
    /// The polity row.
    pub polity: PolityRow,
    /// Settlements naming this polity, largest first.
    pub settlements: Vec<SettlementRow>,
}

/// Side-by-side comparison of two settlements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementComparison {
    /// First settlement.
    pub first: SettlementProfile,
    /// Second settlement.
    pub second: SettlementProfile,
    /// `first.area - second.area`.
    pub area_difference: i64,
    /// `first.members - second.members`.
    pub member_difference: i64,
    /// Name of the larger settlement; the second on a tie.
    pub larger: String,
}

/// Keyword search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    /// Matching accounts.
    pub accounts: Vec<AccountRow>,
    /// Matching settlements.
    pub settlements: Vec<SettlementRow>,
    /// Matching polities.
    pub polities: Vec<PolityRow>,
}

/// Store-wide statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    /// Row counts and totals.
    pub counts: StoreCounts,
    /// Mean area over settlements with non-zero area.
    pub average_area: f64,
    /// Largest settlement by area.
    pub largest_settlement: Option<SettlementRow>,
    /// Largest polity by total area.
    pub largest_polity: Option<PolityRow>,
}

/// Which tables an export covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportScope {
    /// Account rows only.
    Accounts,
    /// Settlement rows only.
    Settlements,
    /// Polity rows only.
    Polities,
    /// Every table.
    All,
}

impl ExportScope {
    fn covers(self, table: Self) -> bool {
        self == Self::All || self == table
    }
}

/// Full table dump.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Export {
    /// Epoch seconds the export was taken at.
    pub exported_at: i64,
    /// Tables included.
    pub scope: ExportScope,
    /// Accounts, most recently seen first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<AccountRow>>,
    /// Settlements, largest first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlements: Option<Vec<SettlementRow>>,
    /// Polities, largest first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polities: Option<Vec<PolityRow>>,
}

/// Read-only queries over a [`Store`].
pub struct QueryService<'a, S> {
    store: &'a S,
}

impl<'a, S: Store> QueryService<'a, S> {
    /// Create a query service over `store`.
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Profile of one account, or `None` if it has never been seen.
    pub async fn account_profile(&self, account: &str) -> Result<Option<AccountProfile>, DbError> {
        let Some(row) = self.store.get_account(account).await? else {
            return Ok(None);
        };
        let settlement = self
            .store
            .settlements_with_member(account)
            .await?
            .into_iter()
            .next();
        let polity = match settlement.as_ref().filter(|s| !s.polity.is_empty()) {
            Some(s) => self.store.get_polity(&s.polity).await?,
            None => None,
        };
        Ok(Some(AccountProfile {
            account: row,
            settlement,
            polity,
        }))
    }

    /// Profile of one settlement.
    pub async fn settlement_profile(
        &self,
        name: &str,
    ) -> Result<Option<SettlementProfile>, DbError> {
        let Some(settlement) = self.store.get_settlement(name).await? else {
            return Ok(None);
        };
        let polity = if settlement.polity.is_empty() {
            None
        } else {
            self.store.get_polity(&settlement.polity).await?
        };
        Ok(Some(SettlementProfile {
            member_count: settlement.members.len(),
            settlement,
            polity,
        }))
    }

    /// Profile of one polity.
    pub async fn polity_profile(&self, name: &str) -> Result<Option<PolityProfile>, DbError> {
        let Some(polity) = self.store.get_polity(name).await? else {
            return Ok(None);
        };
        let settlements = self.store.settlements_in_polity(name).await?;
        Ok(Some(PolityProfile {
            polity,
            settlements,
        }))
    }

    /// Compare two settlements. `None` if either is unknown.
    pub async fn compare_settlements(
        &self,
        first: &str,
        second: &str,
    ) -> Result<Option<SettlementComparison>, DbError> {
        let (Some(first), Some(second)) = (
            self.settlement_profile(first).await?,
            self.settlement_profile(second).await?,
        ) else {
            return Ok(None);
        };
        let member_count =
            |p: &SettlementProfile| i64::try_from(p.member_count).unwrap_or(i64::MAX);
        let larger = if first.settlement.area > second.settlement.area {
            first.settlement.name.clone()
        } else {
            second.settlement.name.clone()
        };
        Ok(Some(SettlementComparison {
            area_difference: first.settlement.area.saturating_sub(second.settlement.area),
            member_difference: member_count(&first).saturating_sub(member_count(&second)),
            larger,
            first,
            second,
        }))
    }

    /// Largest settlements by area.
    pub async fn top_settlements(&self, limit: u32) -> Result<Vec<SettlementRow>, DbError> {
        self.store.top_settlements_by_area(limit).await
    }

    /// Largest polities by total area.
    pub async fn top_polities(&self, limit: u32) -> Result<Vec<PolityRow>, DbError> {
        self.store.top_polities_by_area(limit).await
    }

    /// Search accounts, settlements and polities for `keyword`.
    pub async fn search(&self, keyword: &str, limit: u32) -> Result<SearchResults, DbError> {
        Ok(SearchResults {
            accounts: self.store.search_accounts(keyword, limit).await?,
            settlements: self.store.search_settlements(keyword, limit).await?,
            polities: self.store.search_polities(keyword, limit).await?,
        })
    }

    /// Accounts written at or after `since`, most recent first.
    pub async fn recently_seen(&self, since: i64) -> Result<Vec<AccountRow>, DbError> {
        let mut rows: Vec<AccountRow> = self
            .store
            .list_accounts()
            .await?
            .into_iter()
            .filter(|a| a.update_time >= since)
            .collect();
        rows.sort_by(|a, b| {
            b.update_time
                .cmp(&a.update_time)
                .then_with(|| a.account.cmp(&b.account))
        });
        Ok(rows)
    }

    /// Dump the tables selected by `scope`.
    pub async fn export(&self, scope: ExportScope, now: i64) -> Result<Export, DbError> {
        let accounts = if scope.covers(ExportScope::Accounts) {
            Some(self.recently_seen(i64::MIN).await?)
        } else {
            None
        };
        let settlements = if scope.covers(ExportScope::Settlements) {
            let mut rows = self.store.list_settlements().await?;
            rows.sort_by(|a, b| b.area.cmp(&a.area).then_with(|| a.name.cmp(&b.name)));
            Some(rows)
        } else {
            None
        };
        let polities = if scope.covers(ExportScope::Polities) {
            let mut rows = self.store.list_polities().await?;
            rows.sort_by(|a, b| b.total_area.cmp(&a.total_area).then_with(|| a.name.cmp(&b.name)));
            Some(rows)
        } else {
            None
        };
        Ok(Export {
            exported_at: now,
            scope,
            accounts,
            settlements,
            polities,
        })
    }

    /// Store-wide statistics.
    #[allow(clippy::cast_precision_loss)]
    pub async fn statistics(&self) -> Result<Statistics, DbError> {
        let counts = self.store.counts().await?;
        let sized = self.store.top_settlements_by_area(u32::MAX).await?;
        let average_area = if sized.is_empty() {
            0.0
        } else {
            counts.total_area as f64 / sized.len() as f64
        };
        Ok(Statistics {
            counts,
            average_area,
            largest_settlement: sized.into_iter().next(),
            largest_polity: self.store.top_polities_by_area(1).await?.into_iter().next(),
        })
    }
}
