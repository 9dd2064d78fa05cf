//! Polity aggregate reconciliation.
//!
//! Aggregates are never maintained incrementally. After every ingestion
//! pass each persisted polity's territory list is resolved against the
//! settlement rows currently in the store and the three aggregates are
//! recomputed from scratch:
//!
//! - `territory_count` is the length of the territory list
//! - `total_area` is the sum of the found territories' area
//! - `member_count` is the size of the union of their member lists
//!
//! A territory name with no persisted settlement contributes nothing. Running
//! the pass twice against unchanged rows writes the same values.

use std::collections::{HashMap, HashSet};

use claimwatch_db::{DbError, SettlementRow, Store};
use claimwatch_types::PolityAggregates;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Errors that stop a reconciliation pass as a whole.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The polity list could not be read.
    #[error("failed to list polities: {source}")]
    ListPolities {
        /// The underlying store error.
        #[from]
        source: DbError,
    },
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Polities examined.
    pub polities: usize,
    /// Polities whose aggregates were written.
    pub updated: usize,
    /// Polities whose lookup or write failed.
    pub failed: Vec<String>,
    /// Territory names that matched no persisted settlement.
    pub missing_territories: usize,
}

/// Compute aggregates for one territory list.
///
/// `lookup` resolves a settlement name to its persisted row. A name listed
/// more than once counts toward `territory_count` each time but contributes
/// its area and members once.
pub fn compute_aggregates<'a, F>(territories: &[String], lookup: F) -> PolityAggregates
where
    F: Fn(&str) -> Option<&'a SettlementRow>,
{
    let mut visited: HashSet<&str> = HashSet::new();
    let mut members: HashSet<&'a str> = HashSet::new();
    let mut total_area: u64 = 0;

    for name in territories {
        if !visited.insert(name.as_str()) {
            continue;
        }
        let Some(row) = lookup(name) else {
            continue;
        };
        total_area = total_area.saturating_add(row.area_chunks());
        members.extend(row.members.iter().map(String::as_str));
    }

    PolityAggregates {
        territory_count: u64::try_from(territories.len()).unwrap_or(u64::MAX),
        member_count: u64::try_from(members.len()).unwrap_or(u64::MAX),
        total_area,
    }
}

/// Recompute and store aggregates for every persisted polity.
///
/// A failure to resolve or write one polity is recorded in the report and
/// the pass moves on to the next.
///
/// # Errors
///
/// Returns [`ReconcileError::ListPolities`] if the polity list cannot be read.
pub async fn reconcile_polities<S: Store>(
    store: &S,
    now: i64,
) -> Result<ReconcileReport, ReconcileError> {
    let polities = store.list_polities().await?;
    let mut report = ReconcileReport {
        polities: polities.len(),
        ..ReconcileReport::default()
    };

    for polity in polities {
        match reconcile_one(store, &polity.name, &polity.territories, now).await {
            Ok(missing) => {
                report.updated = report.updated.saturating_add(1);
                report.missing_territories = report.missing_territories.saturating_add(missing);
            }
            Err(e) => {
                warn!(polity = %polity.name, error = %e, "Failed to reconcile polity");
                report.failed.push(polity.name);
            }
        }
    }

    info!(
        polities = report.polities,
        updated = report.updated,
        failed = report.failed.len(),
        missing_territories = report.missing_territories,
        "Polity aggregates reconciled"
    );
    Ok(report)
}

/// Returns how many territory names matched no settlement.
async fn reconcile_one<S: Store>(
    store: &S,
    name: &str,
    territories: &[String],
    now: i64,
) -> Result<usize, DbError> {
    let mut found: HashMap<&str, SettlementRow> = HashMap::new();
    let mut missing = 0_usize;
    for territory in territories {
        if found.contains_key(territory.as_str()) {
            continue;
        }
        match store.get_settlement(territory).await? {
            Some(row) => {
                found.insert(territory.as_str(), row);
            }
            None => missing = missing.saturating_add(1),
        }
    }

    let aggregates = compute_aggregates(territories, |t| found.get(t));
    debug!(
        polity = name,
        territory_count = aggregates.territory_count,
        member_count = aggregates.member_count,
        total_area = aggregates.total_area,
        "Recomputed polity aggregates"
    );
    store.update_polity_aggregates(name, aggregates, now).await?;
    Ok(missing)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use claimwatch_db::MemoryStore;
    use claimwatch_types::{PolityCandidate, Settlement};

    use super::*;

    fn settlement(name: &str, area: u64, members: &[&str]) -> Settlement {
        Settlement {
            name: name.to_owned(),
            label: name.to_owned(),
            area,
            members: members.iter().map(|m| (*m).to_owned()).collect(),
            ..Settlement::default()
        }
    }

    fn polity(name: &str, territories: &[&str]) -> PolityCandidate {
        PolityCandidate {
            name: name.to_owned(),
            territories: territories.iter().map(|t| (*t).to_owned()).collect(),
            ..PolityCandidate::default()
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn missing_territory_contributes_nothing() {
        let a = SettlementRow::from_settlement(&settlement("A", 50, &["x"]), 0);
        let agg = compute_aggregates(&names(&["A", "GHOST"]), |n| (n == "A").then_some(&a));
        assert_eq!(agg.territory_count, 2);
        assert_eq!(agg.total_area, 50);
        assert_eq!(agg.member_count, 1);
    }

    #[test]
    fn members_are_a_union() {
        let a = SettlementRow::from_settlement(&settlement("A", 1, &["x", "y"]), 0);
        let b = SettlementRow::from_settlement(&settlement("B", 2, &["y", "z"]), 0);
        let agg = compute_aggregates(&names(&["A", "B"]), |n| match n {
            "A" => Some(&a),
            "B" => Some(&b),
            _ => None,
        });
        assert_eq!(agg.member_count, 3);
        assert_eq!(agg.total_area, 3);
    }

    #[test]
    fn duplicate_territory_counted_once_for_area() {
        let a = SettlementRow::from_settlement(&settlement("A", 10, &["x"]), 0);
        let agg = compute_aggregates(&names(&["A", "A"]), |_| Some(&a));
        assert_eq!(agg.territory_count, 2);
        assert_eq!(agg.total_area, 10);
    }

    #[test]
    fn empty_territory_list() {
        let agg = compute_aggregates(&[], |_| None);
        assert_eq!(agg, PolityAggregates::default());
    }

    #[tokio::test]
    async fn reconcile_writes_recomputed_values() {
        let store = MemoryStore::new();
        store.upsert_settlement(&settlement("A", 50, &["x", "y"]), 1).await.unwrap();
        store.upsert_settlement(&settlement("B", 30, &["y", "z"]), 1).await.unwrap();
        store.upsert_polity(&polity("N", &["A", "B", "GHOST"]), 1).await.unwrap();

        let report = reconcile_polities(&store, 2).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.missing_territories, 1);

        let row = store.get_polity("N").await.unwrap().unwrap();
        assert_eq!(row.territory_count, 3);
        assert_eq!(row.total_area, 80);
        assert_eq!(row.member_count, 3);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let store = MemoryStore::new();
        store.upsert_settlement(&settlement("A", 7, &["x"]), 1).await.unwrap();
        store.upsert_polity(&polity("N", &["A"]), 1).await.unwrap();

        reconcile_polities(&store, 2).await.unwrap();
        let first = store.get_polity("N").await.unwrap().unwrap().aggregates();
        reconcile_polities(&store, 3).await.unwrap();
        let second = store.get_polity("N").await.unwrap().unwrap().aggregates();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn reconcile_reflects_shrunk_settlement() {
        let store = MemoryStore::new();
        store.upsert_settlement(&settlement("A", 100, &["x", "y"]), 1).await.unwrap();
        store.upsert_polity(&polity("N", &["A"]), 1).await.unwrap();
        reconcile_polities(&store, 2).await.unwrap();

        store.upsert_settlement(&settlement("A", 40, &["x"]), 3).await.unwrap();
        reconcile_polities(&store, 4).await.unwrap();
        let agg = store.get_polity("N").await.unwrap().unwrap().aggregates();
        assert_eq!(agg.total_area, 40);
        assert_eq!(agg.member_count, 1);
    }

    #[tokio::test]
    async fn negative_stored_area_reads_as_zero() {
        let store = MemoryStore::new();
        let mut row = SettlementRow::from_settlement(&settlement("A", 0, &[]), 1);
        row.area = -20;
        store.insert_settlement_row(row).await;
        store.upsert_settlement(&settlement("B", 5, &[]), 1).await.unwrap();
        store.upsert_polity(&polity("N", &["A", "B"]), 1).await.unwrap();

        reconcile_polities(&store, 2).await.unwrap();
        let agg = store.get_polity("N").await.unwrap().unwrap().aggregates();
        assert_eq!(agg.total_area, 5);
    }

    #[tokio::test]
    async fn failing_polity_does_not_stop_others() {
        let store = MemoryStore::new();
        store.upsert_settlement(&settlement("A", 5, &[]), 1).await.unwrap();
        store.upsert_polity(&polity("Bad", &["A"]), 1).await.unwrap();
        store.upsert_polity(&polity("Good", &["A"]), 1).await.unwrap();
        store.fail_writes_for("Bad").await;

        let report = reconcile_polities(&store, 2).await.unwrap();
        assert_eq!(report.failed, vec!["Bad".to_owned()]);
        assert_eq!(report.updated, 1);
        let good = store.get_polity("Good").await.unwrap().unwrap();
        assert_eq!(good.total_area, 5);
    }
}
