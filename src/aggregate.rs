//! Fan-out / join over strategies. One sub-request per strategy per
//! resource, all in flight at once; a failing strategy contributes an empty
//! result and is reported, the join as a whole still completes.

use crate::errors::MonitorResult;
use crate::source::types::{Signal, Strategy, TradeStatus, TradeWithStrategy};
use crate::source::DashboardSource;
use futures_util::future::join_all;
use std::future::Future;

/// Which strategies a view covers.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "platform")]
pub enum Scope {
    #[default]
    All,
    Platform(String),
}

impl Scope {
    pub fn from_platform(platform: Option<String>) -> Self {
        match platform {
            Some(p) if !p.trim().is_empty() && p != "all" => Scope::Platform(p),
            _ => Scope::All,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Platform(p) => write!(f, "{p}"),
        }
    }
}

/// Merged records plus the strategies whose sub-request failed.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Aggregated<T> {
    pub records: Vec<T>,
    pub failed: Vec<String>,
}

impl<T> Default for Aggregated<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Run `fetch` for every strategy concurrently and pair each strategy with
/// its result. Failures become empty results and are listed in `failed`.
pub async fn fan_out<'a, T, F, Fut>(
    strategies: &'a [Strategy],
    resource: &'static str,
    fetch: F,
) -> Aggregated<(&'a Strategy, Vec<T>)>
where
    F: Fn(&'a Strategy) -> Fut,
    Fut: Future<Output = MonitorResult<Vec<T>>>,
{
    let results = join_all(strategies.iter().map(|s| {
        let fut = fetch(s);
        async move { (s, fut.await) }
    }))
    .await;

    let mut out = Aggregated::default();
    for (strategy, result) in results {
        match result {
            Ok(records) => out.records.push((strategy, records)),
            Err(e) => {
                tracing::warn!(
                    strategy = %strategy.name,
                    resource,
                    error = %e,
                    "sub-request failed, substituting empty result"
                );
                out.failed.push(strategy.name.clone());
                out.records.push((strategy, Vec::new()));
            }
        }
    }
    out
}

/// Strategy set for a scope. Membership is checked against each strategy's
/// `exchanges` tags.
pub async fn strategies_by_scope<S: DashboardSource>(
    source: &S,
    scope: &Scope,
) -> MonitorResult<Vec<Strategy>> {
    match scope {
        Scope::All => source.strategies().await,
        Scope::Platform(p) => strategies_by_platform(source, p).await,
    }
}

pub async fn strategies_by_platform<S: DashboardSource>(
    source: &S,
    platform: &str,
) -> MonitorResult<Vec<Strategy>> {
    let strategies = source.strategies().await?;
    Ok(strategies.into_iter().filter(|s| s.on_platform(platform)).collect())
}

/// Trades of every strategy in scope, each tagged with its owner.
pub async fn trades_by_scope<S: DashboardSource>(
    source: &S,
    scope: &Scope,
    status: Option<TradeStatus>,
) -> MonitorResult<Aggregated<TradeWithStrategy>> {
    match scope {
        Scope::All => {
            let strategies = source.strategies().await?;
            Ok(join_trades(source, &strategies, status).await)
        }
        Scope::Platform(p) => trades_by_platform(source, p, status).await,
    }
}

pub async fn trades_by_platform<S: DashboardSource>(
    source: &S,
    platform: &str,
    status: Option<TradeStatus>,
) -> MonitorResult<Aggregated<TradeWithStrategy>> {
    let strategies = strategies_by_platform(source, platform).await?;
    Ok(join_trades(source, &strategies, status).await)
}

/// Open positions only. The status filter is re-applied locally in case the
/// API ignores the query parameter.
pub async fn open_positions_by_scope<S: DashboardSource>(
    source: &S,
    scope: &Scope,
) -> MonitorResult<Aggregated<TradeWithStrategy>> {
    match scope {
        Scope::All => trades_by_scope(source, scope, Some(TradeStatus::Open))
            .await
            .map(retain_open),
        Scope::Platform(p) => open_positions_by_platform(source, p).await,
    }
}

pub async fn open_positions_by_platform<S: DashboardSource>(
    source: &S,
    platform: &str,
) -> MonitorResult<Aggregated<TradeWithStrategy>> {
    trades_by_platform(source, platform, Some(TradeStatus::Open))
        .await
        .map(retain_open)
}

fn retain_open(mut agg: Aggregated<TradeWithStrategy>) -> Aggregated<TradeWithStrategy> {
    agg.records.retain(|t| t.trade.is_open());
    agg
}

pub async fn join_trades<S: DashboardSource>(
    source: &S,
    strategies: &[Strategy],
    status: Option<TradeStatus>,
) -> Aggregated<TradeWithStrategy> {
    let joined = fan_out(strategies, "trades", |s| source.trades(&s.name, status)).await;

    let records = joined
        .records
        .into_iter()
        .flat_map(|(strategy, trades)| {
            let name = strategy.name.clone();
            trades.into_iter().map(move |trade| TradeWithStrategy {
                strategy: name.clone(),
                trade,
            })
        })
        .collect();

    Aggregated {
        records,
        failed: joined.failed,
    }
}

/// Each strategy with its signal history (newest-first, as returned).
pub async fn join_signals<S: DashboardSource>(
    source: &S,
    strategies: &[Strategy],
) -> Aggregated<(Strategy, Vec<Signal>)> {
    let joined = fan_out(strategies, "signals", |s| source.signals(&s.name)).await;
    Aggregated {
        records: joined
            .records
            .into_iter()
            .map(|(strategy, signals)| (strategy.clone(), signals))
            .collect(),
        failed: joined.failed,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::errors::{MonitorError, MonitorResult};
    use crate::source::types::*;
    use crate::source::{DashboardSource, FeedSource};
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    /// In-memory source. Strategies listed in `failing` answer every
    /// per-strategy request with a 500.
    #[derive(Clone, Default)]
    pub struct FakeSource {
        pub strategies: Vec<Strategy>,
        pub trades: Arc<HashMap<String, Vec<Trade>>>,
        pub signals: Arc<HashMap<String, Vec<Signal>>>,
        pub failing: Arc<HashSet<String>>,
        pub healthy: bool,
    }

    /// Log tail answers with a few fixed lines; the alert feed is offline.
    #[derive(Clone, Default)]
    pub struct NoFeeds;

    impl FeedSource for NoFeeds {
        async fn log_tail(&self, _file: &str, lines: usize) -> MonitorResult<Vec<String>> {
            Ok(vec!["line".to_string(); lines.min(3)])
        }

        async fn alert_feed(&self, _file: &str, _limit: usize) -> MonitorResult<Vec<FeedAlert>> {
            Err(MonitorError::network("feed offline"))
        }
    }

    pub fn strategy(name: &str, exchanges: &[&str]) -> Strategy {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "exchanges": exchanges,
        }))
        .unwrap()
    }

    pub fn trade(id: &str, asset: &str, status: &str, pnl: f64, entry: &str) -> Trade {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "asset": asset,
            "exchange": "binance",
            "direction": "LONG",
            "entryPrice": 100.0,
            "entryTime": entry,
            "quantity": 1.0,
            "realisedPnl": pnl,
            "status": status,
        }))
        .unwrap()
    }

    pub fn signal(id: &str, timestamp: chrono::DateTime<chrono::Utc>) -> Signal {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "timestamp": timestamp,
            "asset": "BTC",
            "direction": "LONG",
            "confidence": 0.7,
        }))
        .unwrap()
    }

    impl FakeSource {
        fn check(&self, strategy: &str) -> MonitorResult<()> {
            if self.failing.contains(strategy) {
                return Err(MonitorError::Network {
                    status: Some(500),
                    message: format!("{strategy} unavailable"),
                });
            }
            Ok(())
        }
    }

    impl DashboardSource for FakeSource {
        async fn strategies(&self) -> MonitorResult<Vec<Strategy>> {
            Ok(self.strategies.clone())
        }

        async fn summary(&self) -> MonitorResult<Summary> {
            Ok(serde_json::from_value(serde_json::json!({"totalEquity": 1000.0}))?)
        }

        async fn equity_curve(&self) -> MonitorResult<Vec<EquityCurvePoint>> {
            Ok(Vec::new())
        }

        async fn trades(&self, strategy: &str, status: Option<TradeStatus>) -> MonitorResult<Vec<Trade>> {
            self.check(strategy)?;
            let trades = self.trades.get(strategy).cloned().unwrap_or_default();
            Ok(match status {
                Some(s) => trades.into_iter().filter(|t| t.status == s).collect(),
                None => trades,
            })
        }

        async fn signals(&self, strategy: &str) -> MonitorResult<Vec<Signal>> {
            self.check(strategy)?;
            Ok(self.signals.get(strategy).cloned().unwrap_or_default())
        }

        async fn health(&self) -> MonitorResult<ServiceHealth> {
            Ok(ServiceHealth {
                status: if self.healthy { "healthy" } else { "degraded" }.into(),
                timestamp: String::new(),
            })
        }
    }
}
