use crate::aggregate::Scope;
use crate::errors::MonitorResult;
use crate::poller::Completion;
use crate::source::{DashboardSource, FeedSource};
use crate::state::{AppState, ControlCommand, DashboardSnapshot, SortToggle, ViewSnapshot, WsMessage};
use crate::views::{self, ViewContext, ViewData, ViewId, ViewScheduler};
use chrono::{DateTime, Utc};
use portable_atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

pub type ViewCompletion = Completion<ViewId, MonitorResult<ViewData>>;

/// Sole writer of the dashboard snapshot. Owns the scheduler so scope
/// changes and commits are serialized through one task.
pub struct Store<S, F> {
    state: Arc<AppState>,
    ctx: Arc<ViewContext<S, F>>,
    scheduler: ViewScheduler,
    snapshot: DashboardSnapshot,
}

impl<S: DashboardSource, F: FeedSource> Store<S, F> {
    pub fn new(
        state: Arc<AppState>,
        ctx: Arc<ViewContext<S, F>>,
        scheduler: ViewScheduler,
        scope: Scope,
    ) -> Self {
        Self {
            state,
            ctx,
            scheduler,
            snapshot: DashboardSnapshot::new(scope),
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> &DashboardSnapshot {
        &self.snapshot
    }

    /// Register every view under the current scope.
    pub fn start(&mut self) {
        for view in ViewId::ALL {
            self.schedule(view);
        }
        self.publish();
        tracing::info!(scope = %self.snapshot.scope, views = ViewId::ALL.len(), "views registered");
    }

    fn schedule(&mut self, view: ViewId) {
        let generation = views::schedule_view(&mut self.scheduler, &self.ctx, view, &self.snapshot.scope);
        if let Some(slot) = self.snapshot.views.get_mut(&view) {
            slot.generation = generation;
        }
    }

    /// Commit one finished cycle. Returns false when it was stale.
    pub fn apply_completion(&mut self, completion: ViewCompletion) -> bool {
        let counters = &self.state.counters;

        if !self.scheduler.is_current(&completion) {
            counters.stale_discarded.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                view = %completion.view,
                generation = completion.generation,
                "stale completion discarded"
            );
            return false;
        }

        let Completion {
            view,
            generation,
            payload,
        } = completion;
        let now = Utc::now();
        let Some(slot) = self.snapshot.views.get_mut(&view) else {
            return false;
        };
        slot.loaded = true;
        slot.generation = generation;

        match payload {
            Ok(data) => {
                let failed = data.failed_strategies().to_vec();
                if !failed.is_empty() {
                    counters.partial_joins.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(view = %view, failed = ?failed, "partial join committed");
                }
                counters.cycles_committed.fetch_add(1, Ordering::Relaxed);

                slot.data = Some(data);
                slot.error = None;
                slot.updated_at = Some(now);

                self.state.broadcast(WsMessage::ViewUpdated {
                    view,
                    generation,
                    updated_at: now.to_rfc3339(),
                    failed,
                });
            }
            Err(e) => {
                counters.cycles_failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(view = %view, generation, error = %e, "view refresh failed");

                // previous data stays visible next to the error
                slot.error = Some(e.to_string());

                self.state.broadcast(WsMessage::ViewError {
                    view,
                    generation,
                    error: e.to_string(),
                });
            }
        }

        self.publish();
        true
    }

    /// Returns false once the store should stop.
    pub fn apply_control(&mut self, cmd: ControlCommand) -> bool {
        match cmd {
            ControlCommand::SelectScope(scope) => {
                self.select_scope(scope);
                true
            }
            ControlCommand::ToggleSort(toggle) => {
                let sort = &mut self.snapshot.sort;
                match toggle {
                    SortToggle::Trades(key) => sort.trades.toggle(key),
                    SortToggle::Positions(key) => sort.positions.toggle(key),
                    SortToggle::Strategies(key) => sort.strategies.toggle(key),
                }
                self.state.broadcast(WsMessage::SortChanged { sort: *sort });
                self.publish();
                true
            }
            ControlCommand::Shutdown => {
                tracing::info!(
                    views = self.scheduler.active_views().len(),
                    "shutdown requested, cancelling views"
                );
                self.scheduler.cancel_all();
                false
            }
        }
    }

    fn select_scope(&mut self, scope: Scope) {
        if scope == self.snapshot.scope {
            return;
        }
        tracing::info!(from = %self.snapshot.scope, to = %scope, "scope changed");
        self.snapshot.scope = scope.clone();

        // Scoped views restart from scratch so nothing from the old scope
        // can be shown under the new one.
        for view in ViewId::ALL.into_iter().filter(|v| v.is_scoped()) {
            self.snapshot.views.insert(view, ViewSnapshot::default());
            self.schedule(view);
        }

        self.state.broadcast(WsMessage::ScopeChanged { scope });
        self.publish();
    }

    /// Advance hold durations of open positions without refetching.
    pub fn tick_hold(&mut self, now: DateTime<Utc>) -> bool {
        let mut touched = false;
        for view in [ViewId::Positions, ViewId::Trades] {
            let Some(ViewSnapshot {
                data: Some(ViewData::Positions(agg) | ViewData::Trades(agg)),
                ..
            }) = self.snapshot.views.get_mut(&view)
            else {
                continue;
            };
            for row in agg.records.iter_mut().filter(|r| r.trade.trade.is_open()) {
                row.refresh_hold(now);
                touched = true;
            }
        }

        if touched {
            self.state.counters.hold_ticks.fetch_add(1, Ordering::Relaxed);
            self.publish();
        }
        touched
    }

    fn publish(&self) {
        self.state.publish(self.snapshot.clone());
    }
}

/// Store loop. Commits poll completions, applies control commands and keeps
/// hold durations ticking until shutdown or every sender is gone.
pub async fn run_store<S: DashboardSource, F: FeedSource>(
    mut store: Store<S, F>,
    mut completions: mpsc::Receiver<ViewCompletion>,
    mut control: mpsc::Receiver<ControlCommand>,
    hold_tick: Duration,
) {
    tracing::info!("store task started");
    store.start();

    let mut hold = tokio::time::interval(hold_tick);
    hold.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            Some(completion) = completions.recv() => {
                store.apply_completion(completion);
            }
            cmd = control.recv() => match cmd {
                Some(cmd) => {
                    if !store.apply_control(cmd) {
                        break;
                    }
                }
                None => break,
            },
            _ = hold.tick() => {
                store.tick_hold(Utc::now());
            }
        }
    }

    tracing::info!("store task shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::testing::*;
    use crate::aggregate::Aggregated;
    use crate::config::AppConfig;
    use crate::errors::MonitorError;
    use crate::poller::scheduler::OverlapPolicy;
    use crate::source::client::ApiClient;
    use crate::source::types::TradeWithStrategy;
    use crate::table::{StrategySortKey, TradeRow, TradeSortKey};
    use crate::table::sort::SortDirection;
    use crate::views::ViewSettings;
    use std::collections::HashMap;

    struct Harness {
        store: Store<FakeSource, NoFeeds>,
        state: Arc<AppState>,
        _completions: mpsc::Receiver<ViewCompletion>,
    }

    fn harness(source: FakeSource) -> Harness {
        let config = AppConfig::for_tests("http://unused");
        let (control_tx, _control_rx) = mpsc::channel(8);
        let client = ApiClient::new(&config.api_base_url, config.request_timeout);
        let state = AppState::new(client, DashboardSnapshot::default(), control_tx);

        let ctx = Arc::new(ViewContext {
            source,
            feeds: NoFeeds,
            settings: ViewSettings::from_config(&config),
        });
        let (tx, rx) = mpsc::channel(64);
        let scheduler = ViewScheduler::new(OverlapPolicy::SkipIfBusy, tx);

        Harness {
            store: Store::new(state.clone(), ctx, scheduler, Scope::All),
            state,
            _completions: rx,
        }
    }

    fn completion(view: ViewId, generation: u64, payload: MonitorResult<ViewData>) -> ViewCompletion {
        Completion {
            view,
            generation,
            payload,
        }
    }

    fn open_positions(entry: &str, now: DateTime<Utc>) -> ViewData {
        ViewData::Positions(Aggregated {
            records: vec![TradeRow::new(
                TradeWithStrategy {
                    strategy: "a".into(),
                    trade: trade("1", "BTC", "OPEN", 0.0, entry),
                },
                now,
            )],
            failed: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_error_keeps_last_good_data() {
        let mut h = harness(FakeSource::default());
        h.store.start();
        let generation = h.store.snapshot().views[&ViewId::Logs].generation;

        assert!(h.store.apply_completion(completion(
            ViewId::Logs,
            generation,
            Ok(ViewData::Logs(vec!["boot".into()]))
        )));
        assert!(h.store.apply_completion(completion(
            ViewId::Logs,
            generation,
            Err(MonitorError::network("connection refused"))
        )));

        let published = h.state.snapshot_rx.borrow().clone();
        let logs = &published.views[&ViewId::Logs];
        assert!(logs.loaded);
        assert!(matches!(&logs.data, Some(ViewData::Logs(lines)) if lines == &["boot".to_string()]));
        assert!(logs.error.as_deref().unwrap().contains("connection refused"));
        assert_eq!(h.state.counters.cycles_failed.load(Ordering::Relaxed), 1);

        // a later success clears the inline error
        h.store.apply_completion(completion(ViewId::Logs, generation, Ok(ViewData::Logs(vec![]))));
        assert!(h.store.snapshot().views[&ViewId::Logs].error.is_none());
    }

    #[tokio::test]
    async fn test_scope_change_discards_old_generation() {
        let mut h = harness(FakeSource::default());
        h.store.start();
        let before = h.store.snapshot().views[&ViewId::Trades].generation;
        let unscoped = h.store.snapshot().views[&ViewId::Summary].generation;

        h.store.apply_control(ControlCommand::SelectScope(Scope::Platform("binance".into())));
        let after = h.store.snapshot().views[&ViewId::Trades].generation;
        assert!(after > before);
        assert_eq!(h.store.snapshot().views[&ViewId::Summary].generation, unscoped);

        let stale = ViewData::Trades(Aggregated::default());
        assert!(!h.store.apply_completion(completion(ViewId::Trades, before, Ok(stale))));
        assert!(h.store.snapshot().views[&ViewId::Trades].data.is_none());
        assert!(!h.store.snapshot().views[&ViewId::Trades].loaded);
        assert_eq!(h.state.counters.stale_discarded.load(Ordering::Relaxed), 1);

        let fresh = ViewData::Trades(Aggregated::default());
        assert!(h.store.apply_completion(completion(ViewId::Trades, after, Ok(fresh))));
        assert_eq!(h.state.snapshot_rx.borrow().scope, Scope::Platform("binance".into()));
    }

    #[tokio::test]
    async fn test_same_scope_is_noop() {
        let mut h = harness(FakeSource::default());
        h.store.start();
        let before = h.store.snapshot().views[&ViewId::Health].generation;
        h.store.apply_control(ControlCommand::SelectScope(Scope::All));
        assert_eq!(h.store.snapshot().views[&ViewId::Health].generation, before);
    }

    #[tokio::test]
    async fn test_partial_join_counted() {
        let mut h = harness(FakeSource::default());
        h.store.start();
        let generation = h.store.snapshot().views[&ViewId::Trades].generation;
        let partial = ViewData::Trades(Aggregated {
            records: Vec::new(),
            failed: vec!["b".into()],
        });
        h.store.apply_completion(completion(ViewId::Trades, generation, Ok(partial)));
        assert_eq!(h.state.counters.partial_joins.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_hold_tick_advances_without_refetch() {
        let mut h = harness(FakeSource::default());
        h.store.start();
        let generation = h.store.snapshot().views[&ViewId::Positions].generation;
        let t0: DateTime<Utc> = "2026-03-01T12:00:00Z".parse().unwrap();

        h.store.apply_completion(completion(
            ViewId::Positions,
            generation,
            Ok(open_positions("2026-03-01T11:00:00Z", t0)),
        ));
        assert!(h.store.tick_hold(t0 + chrono::Duration::seconds(30)));

        let Some(ViewData::Positions(agg)) = &h.store.snapshot().views[&ViewId::Positions].data else {
            panic!("expected positions");
        };
        assert_eq!(agg.records[0].hold_seconds, 3630);
        assert_eq!(h.state.counters.hold_ticks.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_sort_toggle_published() {
        let mut h = harness(FakeSource::default());
        let mut ws = h.state.ws_tx.subscribe();
        h.store.apply_control(ControlCommand::ToggleSort(SortToggle::Strategies(StrategySortKey::Pnl)));
        h.store.apply_control(ControlCommand::ToggleSort(SortToggle::Trades(TradeSortKey::Asset)));

        let sort = h.state.snapshot_rx.borrow().sort;
        assert_eq!(sort.strategies.direction, SortDirection::Asc);
        assert_eq!(sort.trades.key, TradeSortKey::Asset);
        assert!(matches!(ws.try_recv(), Ok(WsMessage::SortChanged { .. })));
    }

    #[tokio::test]
    async fn test_run_store_commits_and_shuts_down() {
        let config = AppConfig::for_tests("http://unused");
        let (control_tx, control_rx) = mpsc::channel(8);
        let client = ApiClient::new(&config.api_base_url, config.request_timeout);
        let state = AppState::new(client, DashboardSnapshot::default(), control_tx.clone());

        let ctx = Arc::new(ViewContext {
            source: FakeSource {
                strategies: vec![strategy("a", &["binance"])],
                trades: Arc::new(HashMap::new()),
                healthy: true,
                ..FakeSource::default()
            },
            feeds: NoFeeds,
            settings: ViewSettings::from_config(&config),
        });
        let (tx, rx) = mpsc::channel(64);
        let store = Store::new(
            state.clone(),
            ctx,
            ViewScheduler::new(OverlapPolicy::SkipIfBusy, tx),
            Scope::All,
        );
        let handle = tokio::spawn(run_store(store, rx, control_rx, Duration::from_secs(1)));

        let mut snapshots = state.snapshot_rx.clone();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let done = snapshots
                    .borrow_and_update()
                    .view(ViewId::Strategies)
                    .is_some_and(|v| v.data.is_some());
                if done {
                    break;
                }
                snapshots.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        control_tx.send(ControlCommand::Shutdown).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        let snapshot = state.snapshot_rx.borrow().clone();
        let Some(ViewData::Strategies(board)) = &snapshot.views[&ViewId::Strategies].data else {
            panic!("expected strategies");
        };
        assert_eq!(board.strategies[0].name, "a");
    }
}
