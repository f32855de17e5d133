use crate::aggregate::Scope;
use crate::errors::MonitorError;
use crate::source::types::StrategyDocs;
use crate::state::{AppState, ControlCommand, DashboardSnapshot, SortToggle, ViewSnapshot};
use crate::table::filter::{FilterPipeline, Outcome, Predicate};
use crate::table::sort::{SortDirection, SortKey, SortState};
use crate::table::{self, StrategySortKey, TradeSortKey};
use crate::views::{ViewData, ViewId};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let status = match &self {
            MonitorError::NotFound(_) => StatusCode::NOT_FOUND,
            MonitorError::InvalidInput(_) | MonitorError::Config(_) => StatusCode::BAD_REQUEST,
            e if e.status() == Some(404) => StatusCode::NOT_FOUND,
            MonitorError::Network { .. } | MonitorError::Parse(_) => StatusCode::BAD_GATEWAY,
            MonitorError::ChannelClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, MonitorError>;

#[derive(Debug, Default, serde::Deserialize)]
pub struct TableQuery {
    pub strategy: Option<String>,
    pub asset: Option<String>,
    pub outcome: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub sort: Option<String>,
    pub dir: Option<String>,
}

impl TableQuery {
    fn filters(&self) -> ApiResult<FilterPipeline> {
        let mut filters = FilterPipeline::new();
        if let Some(s) = non_empty(&self.strategy) {
            filters = filters.with(Predicate::Strategy(s.to_string()));
        }
        if let Some(a) = non_empty(&self.asset) {
            filters = filters.with(Predicate::Asset(a.to_string()));
        }
        if let Some(o) = non_empty(&self.outcome) {
            let outcome = Outcome::parse(o)
                .ok_or_else(|| MonitorError::InvalidInput(format!("outcome `{o}`")))?;
            filters = filters.with(Predicate::Outcome(outcome));
        }
        if self.from.is_some() || self.to.is_some() {
            filters = filters.with(Predicate::EnteredBetween {
                from: self.from,
                to: self.to,
            });
        }
        Ok(filters)
    }

    /// Query overrides take precedence over the stored preference.
    fn sort<K>(&self, stored: SortState<K>) -> ApiResult<SortState<K>>
    where
        K: SortKey + std::str::FromStr<Err = MonitorError>,
    {
        let mut sort = match non_empty(&self.sort) {
            Some(key) => SortState::new(key.parse::<K>()?),
            None => stored,
        };
        if let Some(dir) = non_empty(&self.dir) {
            sort.direction = SortDirection::parse(dir)
                .ok_or_else(|| MonitorError::InvalidInput(format!("sort direction `{dir}`")))?;
        }
        Ok(sort)
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Load state of a view, shared by every table route.
fn status_of(view: &ViewSnapshot) -> Value {
    json!({
        "loaded": view.loaded,
        "error": view.error,
        "updatedAt": view.updated_at,
        "generation": view.generation,
    })
}

fn slot(snapshot: &DashboardSnapshot, view: ViewId) -> ApiResult<&ViewSnapshot> {
    snapshot
        .view(view)
        .ok_or_else(|| MonitorError::NotFound(format!("view `{view}`")))
}

/// GET /api/state -- full dashboard snapshot (from watch channel, no lock)
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<DashboardSnapshot> {
    let snapshot = state.snapshot_rx.borrow().clone();
    Json(snapshot)
}

/// GET /api/views/{view} -- one view as last committed
pub async fn get_view(
    State(state): State<Arc<AppState>>,
    Path(view): Path<String>,
) -> ApiResult<Json<ViewSnapshot>> {
    let view: ViewId = view.parse()?;
    let snapshot = state.snapshot_rx.borrow().clone();
    Ok(Json(slot(&snapshot, view)?.clone()))
}

/// GET /api/trades -- merged trades, filtered then sorted
pub async fn get_trades(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TableQuery>,
) -> ApiResult<Json<Value>> {
    let filters = params.filters()?;
    let snapshot = state.snapshot_rx.borrow().clone();
    let sort = params.sort(snapshot.sort.trades)?;
    let view = slot(&snapshot, ViewId::Trades)?;

    let (rows, failed) = match &view.data {
        Some(ViewData::Trades(agg)) => (agg.records.as_slice(), agg.failed.as_slice()),
        _ => (&[][..], &[][..]),
    };
    Ok(Json(json!({
        "scope": snapshot.scope,
        "status": status_of(view),
        "failed": failed,
        "table": table::trade_table(rows, &filters, sort),
    })))
}

/// GET /api/positions -- open positions with live hold time
pub async fn get_positions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TableQuery>,
) -> ApiResult<Json<Value>> {
    let filters = params.filters()?;
    let snapshot = state.snapshot_rx.borrow().clone();
    let sort = params.sort(snapshot.sort.positions)?;
    let view = slot(&snapshot, ViewId::Positions)?;

    let (rows, failed) = match &view.data {
        Some(ViewData::Positions(agg)) => (agg.records.as_slice(), agg.failed.as_slice()),
        _ => (&[][..], &[][..]),
    };
    Ok(Json(json!({
        "scope": snapshot.scope,
        "status": status_of(view),
        "failed": failed,
        "table": table::trade_table(rows, &filters, sort),
    })))
}

/// GET /api/strategies -- strategy board with roll-up
pub async fn get_strategies(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TableQuery>,
) -> ApiResult<Json<Value>> {
    let snapshot = state.snapshot_rx.borrow().clone();
    let sort = params.sort(snapshot.sort.strategies)?;
    let view = slot(&snapshot, ViewId::Strategies)?;

    let (table, rollup) = match &view.data {
        Some(ViewData::Strategies(board)) => (
            table::strategy_table(&board.strategies, sort),
            Some(&board.rollup),
        ),
        _ => (table::strategy_table(&[], sort), None),
    };
    Ok(Json(json!({
        "scope": snapshot.scope,
        "status": status_of(view),
        "table": table,
        "rollup": rollup,
    })))
}

/// GET /api/alerts -- per-strategy health and service status
pub async fn get_alerts(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let snapshot = state.snapshot_rx.borrow().clone();
    let view = slot(&snapshot, ViewId::Health)?;
    let board = match &view.data {
        Some(ViewData::Health(board)) => Some(board),
        _ => None,
    };
    Ok(Json(json!({
        "scope": snapshot.scope,
        "status": status_of(view),
        "health": board,
    })))
}

/// GET /api/strategies/{name}/docs -- fetched on demand, never polled
pub async fn get_strategy_docs(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<StrategyDocs>> {
    let docs = state.client.get_strategy_docs(&name).await.map_err(|e| {
        tracing::warn!(strategy = %name, error = %e, "docs fetch failed");
        e
    })?;
    Ok(Json(docs))
}

#[derive(Debug, serde::Deserialize)]
pub struct ScopeRequest {
    #[serde(default)]
    pub platform: Option<String>,
}

/// POST /api/scope -- re-scope the platform-dependent views
pub async fn post_scope(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScopeRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let scope = Scope::from_platform(req.platform);
    state
        .control_tx
        .send(ControlCommand::SelectScope(scope.clone()))
        .await
        .map_err(|_| MonitorError::ChannelClosed("store".into()))?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "scope": scope }))))
}

#[derive(Debug, serde::Deserialize)]
pub struct SortRequest {
    pub key: String,
}

/// POST /api/sort/{table} -- toggle the stored sort for a table
pub async fn post_sort(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Json(req): Json<SortRequest>,
) -> ApiResult<StatusCode> {
    let toggle = match table.as_str() {
        "trades" => SortToggle::Trades(req.key.parse::<TradeSortKey>()?),
        "positions" => SortToggle::Positions(req.key.parse::<TradeSortKey>()?),
        "strategies" => SortToggle::Strategies(req.key.parse::<StrategySortKey>()?),
        other => return Err(MonitorError::NotFound(format!("table `{other}`"))),
    };
    state
        .control_tx
        .send(ControlCommand::ToggleSort(toggle))
        .await
        .map_err(|_| MonitorError::ChannelClosed("store".into()))?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /api/counters -- performance counters (lock-free reads)
pub async fn get_counters(State(state): State<Arc<AppState>>) -> Json<Value> {
    use portable_atomic::Ordering::Relaxed;
    Json(json!({
        "cycles_committed": state.counters.cycles_committed.load(Relaxed),
        "cycles_failed": state.counters.cycles_failed.load(Relaxed),
        "stale_discarded": state.counters.stale_discarded.load(Relaxed),
        "partial_joins": state.counters.partial_joins.load(Relaxed),
        "hold_ticks": state.counters.hold_ticks.load(Relaxed),
        "ws_messages_sent": state.counters.ws_messages_sent.load(Relaxed),
    }))
}
