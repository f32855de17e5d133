//! Every dashboard view runs through the same primitive: a view id picks
//! the endpoint set and period, the scope picks the strategies, and the
//! scheduler drives it.

use crate::aggregate::{self, Aggregated, Scope};
use crate::analytics::{self, DrawdownPoint, Rollup};
use crate::config::AppConfig;
use crate::errors::{MonitorError, MonitorResult};
use crate::health::{self, HealthThresholds, ServiceCheck, StrategyHealth};
use crate::poller::scheduler::Scheduler;
use crate::source::types::{FeedAlert, Strategy, Summary};
use crate::source::{DashboardSource, FeedSource};
use crate::table::TradeRow;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewId {
    Summary,
    Strategies,
    EquityCurve,
    Trades,
    Positions,
    Health,
    Logs,
    AlertFeed,
}

impl ViewId {
    pub const ALL: [ViewId; 8] = [
        ViewId::Summary,
        ViewId::Strategies,
        ViewId::EquityCurve,
        ViewId::Trades,
        ViewId::Positions,
        ViewId::Health,
        ViewId::Logs,
        ViewId::AlertFeed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Strategies => "strategies",
            Self::EquityCurve => "equity_curve",
            Self::Trades => "trades",
            Self::Positions => "positions",
            Self::Health => "health",
            Self::Logs => "logs",
            Self::AlertFeed => "alert_feed",
        }
    }

    /// Views whose contents depend on the selected platform.
    pub fn is_scoped(self) -> bool {
        matches!(
            self,
            Self::Strategies | Self::Trades | Self::Positions | Self::Health
        )
    }

    /// Raw tails refresh fast; everything aggregated refreshes slow.
    pub fn is_fast(self) -> bool {
        matches!(self, Self::Logs | Self::AlertFeed)
    }
}

impl std::fmt::Display for ViewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ViewId {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViewId::ALL
            .into_iter()
            .find(|v| v.as_str() == s || v.as_str().replace('_', "-") == s)
            .ok_or_else(|| MonitorError::NotFound(format!("view `{s}`")))
    }
}

// ── View payloads ──

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyBoard {
    pub strategies: Vec<Strategy>,
    pub rollup: Rollup,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityView {
    pub points: Vec<DrawdownPoint>,
    pub max_drawdown_pct: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthBoard {
    pub service: ServiceCheck,
    pub strategies: Vec<StrategyHealth>,
    pub failed: Vec<String>,
    pub warn_count: usize,
    pub crit_count: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ViewData {
    Summary(Summary),
    Strategies(StrategyBoard),
    EquityCurve(EquityView),
    Trades(Aggregated<TradeRow>),
    Positions(Aggregated<TradeRow>),
    Health(HealthBoard),
    Logs(Vec<String>),
    AlertFeed(Vec<FeedAlert>),
}

impl ViewData {
    /// Strategies whose sub-request failed during the join, if any.
    pub fn failed_strategies(&self) -> &[String] {
        match self {
            ViewData::Trades(agg) | ViewData::Positions(agg) => &agg.failed,
            ViewData::Health(board) => &board.failed,
            _ => &[],
        }
    }
}

// ── Refresh ──

#[derive(Debug, Clone)]
pub struct ViewSettings {
    pub thresholds: HealthThresholds,
    pub log_file: String,
    pub alert_feed_file: String,
    pub log_tail_lines: usize,
    pub alert_feed_limit: usize,
    pub fast_poll: Duration,
    pub slow_poll: Duration,
}

impl ViewSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            thresholds: HealthThresholds {
                silence_minutes: config.silence_threshold_minutes,
                ..HealthThresholds::default()
            },
            log_file: config.log_file.clone(),
            alert_feed_file: config.alert_feed_file.clone(),
            log_tail_lines: config.log_tail_lines,
            alert_feed_limit: config.alert_feed_limit,
            fast_poll: config.fast_poll,
            slow_poll: config.slow_poll,
        }
    }

    pub fn period(&self, view: ViewId) -> Duration {
        if view.is_fast() {
            self.fast_poll
        } else {
            self.slow_poll
        }
    }
}

/// Everything a poll cycle needs, shared by all views.
pub struct ViewContext<S, F> {
    pub source: S,
    pub feeds: F,
    pub settings: ViewSettings,
}

/// One poll cycle for one view: fetch, join, derive.
pub async fn refresh<S: DashboardSource, F: FeedSource>(
    ctx: &ViewContext<S, F>,
    view: ViewId,
    scope: &Scope,
) -> MonitorResult<ViewData> {
    let source = &ctx.source;
    let settings = &ctx.settings;

    match view {
        ViewId::Summary => Ok(ViewData::Summary(source.summary().await?)),

        ViewId::Strategies => {
            let strategies = aggregate::strategies_by_scope(source, scope).await?;
            let rollup = analytics::compute_rollup(&strategies);
            Ok(ViewData::Strategies(StrategyBoard { strategies, rollup }))
        }

        ViewId::EquityCurve => {
            let points = analytics::drawdown_series(&source.equity_curve().await?);
            let max_drawdown_pct = analytics::drawdown::max_drawdown_pct(&points);
            Ok(ViewData::EquityCurve(EquityView {
                points,
                max_drawdown_pct,
            }))
        }

        ViewId::Trades => {
            let agg = aggregate::trades_by_scope(source, scope, None).await?;
            Ok(ViewData::Trades(with_hold(agg)))
        }

        ViewId::Positions => {
            let agg = aggregate::open_positions_by_scope(source, scope).await?;
            Ok(ViewData::Positions(with_hold(agg)))
        }

        ViewId::Health => {
            let (service, strategies) = tokio::join!(
                source.health(),
                aggregate::strategies_by_scope(source, scope)
            );
            let strategies = strategies?;
            let joined = aggregate::join_signals(source, &strategies).await;

            let now = Utc::now();
            let rows: Vec<StrategyHealth> = joined
                .records
                .iter()
                .map(|(s, signals)| health::strategy_health(s, signals, now, &settings.thresholds))
                .collect();
            let count = |level: health::AlertLevel| {
                rows.iter()
                    .flat_map(|r| r.alerts.iter())
                    .filter(|a| a.level == level)
                    .count()
            };

            Ok(ViewData::Health(HealthBoard {
                service: ServiceCheck::from_result(service.map_err(|e| e.to_string())),
                warn_count: count(health::AlertLevel::Warn),
                crit_count: count(health::AlertLevel::Crit),
                strategies: rows,
                failed: joined.failed,
            }))
        }

        ViewId::Logs => Ok(ViewData::Logs(
            ctx.feeds
                .log_tail(&settings.log_file, settings.log_tail_lines)
                .await?,
        )),

        ViewId::AlertFeed => Ok(ViewData::AlertFeed(
            ctx.feeds
                .alert_feed(&settings.alert_feed_file, settings.alert_feed_limit)
                .await?,
        )),
    }
}

fn with_hold(agg: Aggregated<crate::source::types::TradeWithStrategy>) -> Aggregated<TradeRow> {
    let now = Utc::now();
    Aggregated {
        records: agg.records.into_iter().map(|t| TradeRow::new(t, now)).collect(),
        failed: agg.failed,
    }
}

pub type ViewScheduler = Scheduler<ViewId, MonitorResult<ViewData>>;

/// Register (or re-register) a view's repeating task under `scope`.
pub fn schedule_view<S: DashboardSource, F: FeedSource>(
    scheduler: &mut ViewScheduler,
    ctx: &Arc<ViewContext<S, F>>,
    view: ViewId,
    scope: &Scope,
) -> u64 {
    let period = ctx.settings.period(view);
    let ctx = ctx.clone();
    let scope = scope.clone();
    scheduler.schedule(view, period, move || {
        let ctx = ctx.clone();
        let scope = scope.clone();
        async move { refresh(&ctx, view, &scope).await }
    })
}
