//! One ingestion cycle.
//!
//! ```text
//! fetch accounts -> parse --(none)--> abort
//! fetch markers  -> extract --(none)--> abort
//! derive polity candidates
//! upsert accounts, settlements, polities   (stop honoured between writes)
//! reconcile polity aggregates              (skipped when interrupted)
//! classify inactivity -> bulletins
//! prune stale accounts                     (when retention is enabled)
//! ```
//!
//! A failed write affects only its own record; it is counted and the cycle
//! carries on. Nothing written is rolled back.

use std::fmt::Display;

use claimwatch_db::{DbError, FIRST_RUN_KEY, Store};
use claimwatch_parser::{PayloadAnomaly, derive_polities, extract_settlements, parse_accounts};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ClaimwatchConfig, InactivityConfig};
use crate::inactivity::{InactivityWindow, SECONDS_PER_DAY, classify};
use crate::query::QueryService;
use crate::reconcile::{ReconcileError, ReconcileReport, reconcile_polities};
use crate::report::{ReportSink, inactivity_bulletin, window_heading};
use crate::shutdown::Shutdown;
use crate::transport::{FetchError, Transport};

/// Errors that abort a cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// A payload could not be fetched.
    #[error("fetch failed: {source}")]
    Fetch {
        /// The underlying transport error.
        #[from]
        source: FetchError,
    },

    /// A payload lacked the structure needed to find records.
    #[error("payload rejected: {source}")]
    Payload {
        /// The underlying anomaly.
        #[from]
        source: PayloadAnomaly,
    },

    /// The account payload contained no usable accounts.
    #[error("account payload yielded no accounts")]
    NoAccounts,

    /// The marker payload contained no usable settlements.
    #[error("marker payload yielded no settlements")]
    NoSettlements,

    /// A store read needed by the cycle as a whole failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: DbError,
    },

    /// Reconciliation could not start.
    #[error("reconciliation failed: {source}")]
    Reconcile {
        /// The underlying reconciliation error.
        #[from]
        source: ReconcileError,
    },
}

/// Everything a cycle needs.
pub struct CycleContext<'a, S, T, R> {
    /// Persistent store.
    pub store: &'a S,
    /// Payload transport.
    pub transport: &'a T,
    /// Bulletin destination.
    pub sink: &'a R,
    /// Configuration.
    pub config: &'a ClaimwatchConfig,
    /// Stop signal.
    pub shutdown: &'a Shutdown,
}

/// Write outcomes for one record kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertTally {
    /// Records for which a write was issued.
    pub attempted: usize,
    /// Writes that succeeded.
    pub written: usize,
    /// Writes that failed.
    pub failed: usize,
}

impl UpsertTally {
    fn record<E: Display>(&mut self, kind: &str, key: &str, result: Result<(), E>) {
        self.attempted = self.attempted.saturating_add(1);
        match result {
            Ok(()) => self.written = self.written.saturating_add(1),
            Err(e) => {
                self.failed = self.failed.saturating_add(1);
                warn!(kind, key, error = %e, "Failed to store record");
            }
        }
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Epoch seconds the cycle ran at.
    pub started_at: i64,
    /// First-run timestamp in effect.
    pub first_run: i64,
    /// Account writes.
    pub accounts: UpsertTally,
    /// Settlement writes.
    pub settlements: UpsertTally,
    /// Polity writes.
    pub polities: UpsertTally,
    /// Description anomalies recovered from during extraction.
    pub anomalies: usize,
    /// Reconciliation outcome, absent when interrupted.
    pub reconcile: Option<ReconcileReport>,
    /// Accounts in the approaching window.
    pub approaching: usize,
    /// Accounts in the expired window.
    pub expired: usize,
    /// Account rows removed by retention.
    pub pruned: u64,
    /// Whether a stop request cut the writes short.
    pub interrupted: bool,
}

/// Current wall-clock time in epoch seconds.
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Read the first-run marker, writing it with `now` if it does not exist.
///
/// # Errors
///
/// Returns [`DbError`] if the marker cannot be read or written.
pub async fn ensure_first_run<S: Store>(store: &S, now: i64) -> Result<i64, DbError> {
    if let Some(value) = store.get_marker(FIRST_RUN_KEY).await? {
        return Ok(parse_marker(&value, now));
    }
    if store.set_marker_once(FIRST_RUN_KEY, &now.to_string(), now).await? {
        info!(first_run = now, "Recorded first-run timestamp");
        return Ok(now);
    }
    let value = store.get_marker(FIRST_RUN_KEY).await?;
    Ok(value.map_or(now, |v| parse_marker(&v, now)))
}

fn parse_marker(value: &str, fallback: i64) -> i64 {
    value.trim().parse().unwrap_or_else(|_| {
        warn!(value, "First-run marker is not a timestamp, using current time");
        fallback
    })
}

/// Delete account rows not written for `days_to_keep` days.
///
/// # Errors
///
/// Returns [`DbError`] if the delete fails.
pub async fn prune_accounts<S: Store>(
    store: &S,
    days_to_keep: u64,
    now: i64,
) -> Result<u64, DbError> {
    let keep = i64::try_from(days_to_keep)
        .unwrap_or(i64::MAX)
        .saturating_mul(SECONDS_PER_DAY);
    let removed = store.delete_accounts_before(now.saturating_sub(keep)).await?;
    info!(removed, days_to_keep, "Pruned stale account rows");
    Ok(removed)
}

/// Run one full cycle at time `now`.
///
/// # Errors
///
/// Returns [`CycleError`] when a payload cannot be fetched or parsed, when
/// either payload yields no records, or when a store read that the whole
/// cycle depends on fails. Per-record write failures are only counted.
pub async fn run_cycle<S, T, R>(
    ctx: &CycleContext<'_, S, T, R>,
    now: i64,
) -> Result<CycleReport, CycleError>
where
    S: Store,
    T: Transport,
    R: ReportSink,
{
    let config = ctx.config;
    let first_run = ensure_first_run(ctx.store, now).await?;

    let account_payload = ctx.transport.fetch(&config.source.account_url).await?;
    let sightings = parse_accounts(&account_payload)?;
    if sightings.is_empty() {
        return Err(CycleError::NoAccounts);
    }

    let marker_payload = ctx.transport.fetch(&config.source.marker_url).await?;
    let extraction = extract_settlements(&marker_payload, &config.parser)?;
    if extraction.settlements.is_empty() {
        return Err(CycleError::NoSettlements);
    }

    let candidates = derive_polities(&extraction.settlements);
    debug!(
        accounts = sightings.len(),
        settlements = extraction.settlements.len(),
        polities = candidates.len(),
        "Payloads parsed"
    );

    let mut report = CycleReport {
        started_at: now,
        first_run,
        anomalies: extraction.anomalies,
        ..CycleReport::default()
    };

    'writes: {
        for sighting in &sightings {
            if ctx.shutdown.is_requested() {
                report.interrupted = true;
                break 'writes;
            }
            let result = ctx.store.upsert_account(sighting, now).await;
            report.accounts.record("account", &sighting.account, result);
        }
        for settlement in &extraction.settlements {
            if ctx.shutdown.is_requested() {
                report.interrupted = true;
                break 'writes;
            }
            let result = ctx.store.upsert_settlement(settlement, now).await;
            report.settlements.record("settlement", &settlement.name, result);
        }
        for candidate in &candidates {
            if ctx.shutdown.is_requested() {
                report.interrupted = true;
                break 'writes;
            }
            let result = ctx.store.upsert_polity(candidate, now).await;
            report.polities.record("polity", &candidate.name, result);
        }
    }

    if report.interrupted {
        warn!(
            accounts = report.accounts.written,
            settlements = report.settlements.written,
            polities = report.polities.written,
            "Stop requested mid-cycle, skipping reconciliation"
        );
        return Ok(report);
    }

    report.reconcile = Some(reconcile_polities(ctx.store, now).await?);

    let (approaching, expired) =
        report_inactivity(ctx.store, ctx.sink, &config.inactivity, first_run, now).await?;
    report.approaching = approaching;
    report.expired = expired;

    if config.retention.enabled {
        report.pruned = prune_accounts(ctx.store, config.retention.days_to_keep, now).await?;
    }

    info!(
        accounts = report.accounts.written,
        settlements = report.settlements.written,
        polities = report.polities.written,
        failed_writes = report
            .accounts
            .failed
            .saturating_add(report.settlements.failed)
            .saturating_add(report.polities.failed),
        anomalies = report.anomalies,
        approaching = report.approaching,
        expired = report.expired,
        "Cycle complete"
    );
    Ok(report)
}

/// Classify inactivity against persisted rows and push one heading plus one
/// bulletin per account for each non-empty window.
async fn report_inactivity<S: Store, R: ReportSink>(
    store: &S,
    sink: &R,
    config: &InactivityConfig,
    first_run: i64,
    now: i64,
) -> Result<(usize, usize), DbError> {
    let accounts = store.list_accounts().await?;
    let settlements = store.list_settlements().await?;
    let idle = classify(&accounts, &settlements, first_run, now, config);
    let query = QueryService::new(store);

    let mut counts = (0, 0);
    for window in [InactivityWindow::Approaching, InactivityWindow::Expired] {
        let entries: Vec<_> = idle.iter().filter(|e| e.window == window).collect();
        match window {
            InactivityWindow::Approaching => counts.0 = entries.len(),
            InactivityWindow::Expired => counts.1 = entries.len(),
        }
        if entries.is_empty() {
            continue;
        }

        sink.push(&window_heading(window, entries.len(), config));
        for entry in entries {
            let profile = query
                .account_profile(&entry.account)
                .await
                .unwrap_or_else(|e| {
                    warn!(account = %entry.account, error = %e, "Profile lookup failed");
                    None
                });
            sink.push(&inactivity_bulletin(entry, profile.as_ref()));
        }
    }
    Ok(counts)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use claimwatch_db::MemoryStore;
    use serde_json::{Value, json};

    use super::*;
    use crate::report::MemorySink;
    use crate::transport::StaticTransport;

    const ACCOUNTS: &str = "mem://accounts";
    const MARKERS: &str = "mem://markers";
    const DAY: i64 = SECONDS_PER_DAY;

    fn config() -> ClaimwatchConfig {
        let mut config = ClaimwatchConfig::default();
        ACCOUNTS.clone_into(&mut config.source.account_url);
        MARKERS.clone_into(&mut config.source.marker_url);
        config
    }

    fn player(account: &str) -> Value {
        json!({ "account": account, "name": account, "world": "world", "x": 0, "y": 64, "z": 0 })
    }

    fn marker(name: &str, area: u64, members: &str, polity: Option<(&str, &str)>) -> Value {
        let mut desc = format!(
            "<span style='font-size:200%'>{name}</span>\
             <ul><li>等级:1</li><li>区块:{area}</li><li>玩家(1):{members}</li></ul>"
        );
        if let Some((polity, territories)) = polity {
            desc.push_str(&format!(
                "<p><strong>这片领土属于国家{polity}:</strong></p>\
                 <ul><li>首都:{name}</li><li>领土(2):{territories}</li></ul>"
            ));
        }
        json!({ "label": name, "desc": desc, "x": 1, "y": 70, "z": 2 })
    }

    fn markers(entries: &[(&str, Value)]) -> Value {
        let mut map = serde_json::Map::new();
        for (key, value) in entries {
            map.insert((*key).to_owned(), value.clone());
        }
        json!({ "sets": { "me.angeschossen.lands": { "markers": map } } })
    }

    async fn transport(players: Value, markers: Value) -> StaticTransport {
        let t = StaticTransport::new();
        t.serve(ACCOUNTS, players).await;
        t.serve(MARKERS, markers).await;
        t
    }

    #[tokio::test]
    async fn full_cycle_persists_and_reconciles() {
        let store = MemoryStore::new();
        let t = transport(
            json!({ "players": [player("alice"), player("bob")] }),
            markers(&[
                (
                    "m1",
                    marker(
                        "Riverton",
                        120,
                        "alice, bob",
                        Some(("Northreach", "Riverton, Oakvale")),
                    ),
                ),
                ("m2", marker("Oakvale", 30, "bob, carol", None)),
                ("m3", marker("出生点", 999, "admin", None)),
            ]),
        )
        .await;
        let sink = MemorySink::new();
        let shutdown = Shutdown::new();
        let config = config();
        let ctx = CycleContext {
            store: &store,
            transport: &t,
            sink: &sink,
            config: &config,
            shutdown: &shutdown,
        };

        let report = run_cycle(&ctx, 1_000).await.unwrap();
        assert_eq!(report.accounts.written, 2);
        assert_eq!(report.settlements.written, 2);
        assert_eq!(report.polities.written, 1);
        assert!(!report.interrupted);
        assert_eq!(report.reconcile.as_ref().unwrap().updated, 1);

        let polity = store.get_polity("Northreach").await.unwrap().unwrap();
        assert_eq!(polity.total_area, 150);
        assert_eq!(polity.member_count, 3);
        assert_eq!(polity.territory_count, 2);
        assert!(store.get_settlement("出生点").await.unwrap().is_none());
        assert_eq!(report.first_run, 1_000);
    }

    #[tokio::test]
    async fn unchanged_payload_keeps_statistics() {
        let store = MemoryStore::new();
        let t = transport(
            json!({ "players": [player("alice")] }),
            markers(&[
                (
                    "m1",
                    marker(
                        "Riverton",
                        120,
                        "alice, bob",
                        Some(("Northreach", "Riverton, Oakvale")),
                    ),
                ),
                ("m2", marker("Oakvale", 30, "bob, carol", None)),
            ]),
        )
        .await;
        let sink = MemorySink::new();
        let shutdown = Shutdown::new();
        let config = config();
        let ctx = CycleContext {
            store: &store,
            transport: &t,
            sink: &sink,
            config: &config,
            shutdown: &shutdown,
        };

        run_cycle(&ctx, 1_000).await.unwrap();
        let first = store.get_polity("Northreach").await.unwrap().unwrap();
        let riverton = store.get_settlement("Riverton").await.unwrap().unwrap();
        run_cycle(&ctx, 2_000).await.unwrap();
        let second = store.get_polity("Northreach").await.unwrap().unwrap();
        let again = store.get_settlement("Riverton").await.unwrap().unwrap();

        assert_eq!(first.aggregates(), second.aggregates());
        assert_eq!(first.row_id(), second.row_id());
        assert_eq!(riverton.row_id(), again.row_id());
        assert_eq!(riverton.area, again.area);
        assert_eq!(riverton.members, again.members);
        assert_eq!(store.counts().await.unwrap().settlements, 2);
    }

    #[tokio::test]
    async fn empty_accounts_abort_before_any_write() {
        let store = MemoryStore::new();
        let t = transport(
            json!({ "players": [] }),
            markers(&[("m", marker("A", 1, "x", None))]),
        )
        .await;
        let sink = MemorySink::new();
        let shutdown = Shutdown::new();
        let config = config();
        let ctx = CycleContext {
            store: &store,
            transport: &t,
            sink: &sink,
            config: &config,
            shutdown: &shutdown,
        };

        let err = run_cycle(&ctx, 1_000).await.unwrap_err();
        assert!(matches!(err, CycleError::NoAccounts));
        assert_eq!(store.counts().await.unwrap().settlements, 0);
    }

    #[tokio::test]
    async fn empty_markers_abort_before_reconcile() {
        let store = MemoryStore::new();
        store
            .upsert_polity(
                &claimwatch_types::PolityCandidate {
                    name: "N".to_owned(),
                    territories: vec!["A".to_owned()],
                    ..Default::default()
                },
                1,
            )
            .await
            .unwrap();
        let t = transport(json!({ "players": [player("alice")] }), markers(&[])).await;
        let sink = MemorySink::new();
        let shutdown = Shutdown::new();
        let config = config();
        let ctx = CycleContext {
            store: &store,
            transport: &t,
            sink: &sink,
            config: &config,
            shutdown: &shutdown,
        };

        let err = run_cycle(&ctx, 1_000).await.unwrap_err();
        assert!(matches!(err, CycleError::NoSettlements));
        let row = store.get_polity("N").await.unwrap().unwrap();
        assert_eq!(row.update_time, 1);
        assert!(store.get_account("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_settlement_does_not_stop_siblings() {
        let store = MemoryStore::new();
        store.fail_writes_for("Broken").await;
        let t = transport(
            json!({ "players": [player("alice")] }),
            markers(&[
                ("a", marker("Broken", 10, "alice", None)),
                ("b", marker("Fine", 20, "alice", None)),
            ]),
        )
        .await;
        let sink = MemorySink::new();
        let shutdown = Shutdown::new();
        let config = config();
        let ctx = CycleContext {
            store: &store,
            transport: &t,
            sink: &sink,
            config: &config,
            shutdown: &shutdown,
        };

        let report = run_cycle(&ctx, 1_000).await.unwrap();
        assert_eq!(report.settlements.attempted, 2);
        assert_eq!(report.settlements.failed, 1);
        assert!(store.get_settlement("Fine").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn withdrawn_marker_payload_fails_the_fetch() {
        let store = MemoryStore::new();
        let t = transport(json!({ "players": [player("alice")] }), markers(&[])).await;
        t.withdraw(MARKERS).await;
        let sink = MemorySink::new();
        let shutdown = Shutdown::new();
        let config = config();
        let ctx = CycleContext {
            store: &store,
            transport: &t,
            sink: &sink,
            config: &config,
            shutdown: &shutdown,
        };

        let err = run_cycle(&ctx, 1_000).await.unwrap_err();
        assert!(matches!(
            err,
            CycleError::Fetch {
                source: FetchError::Status { status: 404, .. }
            }
        ));
        assert!(store.get_account("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stop_request_skips_writes_and_reconcile() {
        let store = MemoryStore::new();
        let t = transport(
            json!({ "players": [player("alice")] }),
            markers(&[("a", marker("A", 10, "alice", None))]),
        )
        .await;
        let sink = MemorySink::new();
        let shutdown = Shutdown::new();
        shutdown.request();
        let config = config();
        let ctx = CycleContext {
            store: &store,
            transport: &t,
            sink: &sink,
            config: &config,
            shutdown: &shutdown,
        };

        let report = run_cycle(&ctx, 1_000).await.unwrap();
        assert!(report.interrupted);
        assert!(report.reconcile.is_none());
        assert_eq!(report.accounts.attempted, 0);
    }

    #[tokio::test]
    async fn first_run_marker_never_overwritten() {
        let store = MemoryStore::new();
        assert_eq!(ensure_first_run(&store, 100).await.unwrap(), 100);
        assert_eq!(ensure_first_run(&store, 500).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn idle_accounts_reported_with_profiles() {
        let store = MemoryStore::new();
        ensure_first_run(&store, 0).await.unwrap();
        let t = transport(
            json!({ "players": [player("alice"), player("bob")] }),
            markers(&[("a", marker("Riverton", 10, "alice", None))]),
        )
        .await;
        let sink = MemorySink::new();
        let shutdown = Shutdown::new();
        let config = config();
        let ctx = CycleContext {
            store: &store,
            transport: &t,
            sink: &sink,
            config: &config,
            shutdown: &shutdown,
        };

        // bob stewards nothing, so idle time runs from first run (day 0)
        let report = run_cycle(&ctx, 42 * DAY).await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.approaching, 0);
        let bulletins = sink.bulletins();
        assert_eq!(bulletins.len(), 2);
        assert!(bulletins[0].contains("42 days or more"));
        assert!(bulletins[1].starts_with("Account: bob"));
    }

    #[tokio::test]
    async fn retention_prunes_when_enabled() {
        let store = MemoryStore::new();
        store
            .upsert_account(
                &claimwatch_parser::parse_accounts(&json!({ "players": [player("stale")] }))
                    .unwrap()[0],
                0,
            )
            .await
            .unwrap();
        let t = transport(
            json!({ "players": [player("alice")] }),
            markers(&[("a", marker("A", 10, "alice", None))]),
        )
        .await;
        let sink = MemorySink::new();
        let shutdown = Shutdown::new();
        let mut config = config();
        config.retention.enabled = true;
        let ctx = CycleContext {
            store: &store,
            transport: &t,
            sink: &sink,
            config: &config,
            shutdown: &shutdown,
        };

        let report = run_cycle(&ctx, 100 * DAY).await.unwrap();
        assert_eq!(report.pruned, 1);
        assert!(store.get_account("stale").await.unwrap().is_none());
        assert!(store.get_account("alice").await.unwrap().is_some());
    }
}
