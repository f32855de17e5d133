use crate::aggregate::Scope;
use crate::source::client::ApiClient;
use crate::table::sort::SortState;
use crate::table::{StrategySortKey, TradeSortKey};
use crate::views::{ViewData, ViewId};
use chrono::{DateTime, Utc};
use portable_atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

// ── Per-view committed state ──

/// What readers see for one view. Only ever replaced by the store after a
/// cycle fully commits.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    /// Last successful payload; kept when a later cycle fails.
    pub data: Option<ViewData>,
    /// Inline error from the most recent cycle, cleared on success.
    pub error: Option<String>,
    /// Set after the first completed cycle, success or not.
    pub loaded: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SortPrefs {
    pub trades: SortState<TradeSortKey>,
    pub positions: SortState<TradeSortKey>,
    pub strategies: SortState<StrategySortKey>,
}

impl Default for SortPrefs {
    fn default() -> Self {
        Self {
            trades: SortState::new(TradeSortKey::EntryTime),
            positions: SortState::new(TradeSortKey::Hold),
            strategies: SortState::new(StrategySortKey::Pnl),
        }
    }
}

// ── Dashboard snapshot (sent via watch channel) ──

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub scope: Scope,
    pub views: BTreeMap<ViewId, ViewSnapshot>,
    pub sort: SortPrefs,
    pub started_at: DateTime<Utc>,
}

impl DashboardSnapshot {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            views: ViewId::ALL
                .into_iter()
                .map(|v| (v, ViewSnapshot::default()))
                .collect(),
            sort: SortPrefs::default(),
            started_at: Utc::now(),
        }
    }

    pub fn view(&self, id: ViewId) -> Option<&ViewSnapshot> {
        self.views.get(&id)
    }
}

impl Default for DashboardSnapshot {
    fn default() -> Self {
        Self::new(Scope::All)
    }
}

// ── Messages INTO the store ──

#[derive(Debug, Clone, Copy)]
pub enum SortToggle {
    Trades(TradeSortKey),
    Positions(TradeSortKey),
    Strategies(StrategySortKey),
}

#[derive(Debug, Clone)]
pub enum ControlCommand {
    SelectScope(Scope),
    ToggleSort(SortToggle),
    Shutdown,
}

// ── Messages OUT of the store ──

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "view_updated")]
    ViewUpdated {
        view: ViewId,
        generation: u64,
        updated_at: String,
        failed: Vec<String>,
    },

    #[serde(rename = "view_error")]
    ViewError {
        view: ViewId,
        generation: u64,
        error: String,
    },

    #[serde(rename = "scope_changed")]
    ScopeChanged { scope: Scope },

    #[serde(rename = "sort_changed")]
    SortChanged { sort: SortPrefs },
}

// ── Counters (lock-free) ──

pub struct PerfCounters {
    pub cycles_committed: AtomicU64,
    pub cycles_failed: AtomicU64,
    pub stale_discarded: AtomicU64,
    pub partial_joins: AtomicU64,
    pub hold_ticks: AtomicU64,
    pub ws_messages_sent: AtomicU64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self {
            cycles_committed: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            stale_discarded: AtomicU64::new(0),
            partial_joins: AtomicU64::new(0),
            hold_ticks: AtomicU64::new(0),
            ws_messages_sent: AtomicU64::new(0),
        }
    }
}

// ── Application shared state (channels, not locks) ──

pub struct AppState {
    // On-demand reads that are not polled (strategy docs)
    pub client: ApiClient,

    // Store -> readers: latest committed snapshot (single producer, multi consumer)
    pub snapshot_tx: watch::Sender<DashboardSnapshot>,
    pub snapshot_rx: watch::Receiver<DashboardSnapshot>,

    // Store -> WS clients: change notifications
    pub ws_tx: broadcast::Sender<WsMessage>,

    // Routes -> store: bounded control channel
    pub control_tx: mpsc::Sender<ControlCommand>,

    pub counters: PerfCounters,
}

impl AppState {
    pub fn new(
        client: ApiClient,
        initial: DashboardSnapshot,
        control_tx: mpsc::Sender<ControlCommand>,
    ) -> Arc<Self> {
        let (ws_tx, _) = broadcast::channel(1024);
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        Arc::new(Self {
            client,
            snapshot_tx,
            snapshot_rx,
            ws_tx,
            control_tx,
            counters: PerfCounters::new(),
        })
    }

    #[inline]
    pub fn broadcast(&self, msg: WsMessage) {
        self.counters.ws_messages_sent.fetch_add(1, Ordering::Relaxed);
        let _ = self.ws_tx.send(msg);
    }

    #[inline]
    pub fn publish(&self, snapshot: DashboardSnapshot) {
        self.snapshot_tx.send_replace(snapshot);
    }
}
