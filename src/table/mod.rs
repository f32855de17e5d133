pub mod filter;
pub mod sort;

use crate::analytics;
use crate::errors::MonitorError;
use crate::source::types::{Strategy, TradeWithStrategy};
use chrono::{DateTime, Utc};
use filter::FilterPipeline;
use sort::{SortDirection, SortKey, SortState, Sortable};
use std::cmp::Ordering;

/// A merged trade with its hold time, as shown in the trades and positions tables.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRow {
    #[serde(flatten)]
    pub trade: TradeWithStrategy,
    pub hold_seconds: i64,
    pub hold: String,
}

impl TradeRow {
    pub fn new(trade: TradeWithStrategy, now: DateTime<Utc>) -> Self {
        let mut row = Self {
            trade,
            hold_seconds: 0,
            hold: String::new(),
        };
        row.refresh_hold(now);
        row
    }

    /// Recompute elapsed hold time without refetching.
    pub fn refresh_hold(&mut self, now: DateTime<Utc>) {
        let held = analytics::hold_duration(&self.trade.trade, now);
        self.hold_seconds = held.num_seconds();
        self.hold = analytics::format_duration(held);
    }
}

impl AsRef<TradeWithStrategy> for TradeRow {
    fn as_ref(&self) -> &TradeWithStrategy {
        &self.trade
    }
}

// ── Sort keys ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TradeSortKey {
    Strategy,
    Asset,
    EntryTime,
    Pnl,
    Quantity,
    Hold,
}

impl SortKey for TradeSortKey {
    fn default_direction(self) -> SortDirection {
        match self {
            Self::Strategy | Self::Asset => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }
}

impl std::str::FromStr for TradeSortKey {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strategy" => Ok(Self::Strategy),
            "asset" => Ok(Self::Asset),
            "entryTime" | "entry_time" | "time" => Ok(Self::EntryTime),
            "pnl" | "realisedPnl" => Ok(Self::Pnl),
            "quantity" => Ok(Self::Quantity),
            "hold" => Ok(Self::Hold),
            other => Err(MonitorError::InvalidInput(format!("trade sort key `{other}`"))),
        }
    }
}

impl Sortable<TradeSortKey> for TradeRow {
    fn compare_by(&self, other: &Self, key: TradeSortKey) -> Ordering {
        let (a, b) = (&self.trade, &other.trade);
        match key {
            TradeSortKey::Strategy => a.strategy.cmp(&b.strategy),
            TradeSortKey::Asset => a.trade.asset.cmp(&b.trade.asset),
            TradeSortKey::EntryTime => a.trade.entry_time.cmp(&b.trade.entry_time),
            TradeSortKey::Pnl => a.trade.pnl().total_cmp(&b.trade.pnl()),
            TradeSortKey::Quantity => a.trade.quantity.total_cmp(&b.trade.quantity),
            TradeSortKey::Hold => self.hold_seconds.cmp(&other.hold_seconds),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StrategySortKey {
    Name,
    Pnl,
    WinRate,
    Sharpe,
    MaxDrawdown,
    Trades,
}

impl SortKey for StrategySortKey {
    fn default_direction(self) -> SortDirection {
        match self {
            Self::Name => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }
}

impl std::str::FromStr for StrategySortKey {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "pnl" | "totalPnl" => Ok(Self::Pnl),
            "winRate" | "win_rate" => Ok(Self::WinRate),
            "sharpe" | "sharpeRatio" => Ok(Self::Sharpe),
            "maxDrawdown" | "max_drawdown" | "drawdown" => Ok(Self::MaxDrawdown),
            "trades" | "totalTrades" => Ok(Self::Trades),
            other => Err(MonitorError::InvalidInput(format!("strategy sort key `{other}`"))),
        }
    }
}

impl Sortable<StrategySortKey> for Strategy {
    fn compare_by(&self, other: &Self, key: StrategySortKey) -> Ordering {
        match key {
            StrategySortKey::Name => self.name.cmp(&other.name),
            StrategySortKey::Pnl => self.total_pnl.total_cmp(&other.total_pnl),
            StrategySortKey::WinRate => self.win_rate.total_cmp(&other.win_rate),
            // an undefined ratio sorts below any defined one
            StrategySortKey::Sharpe => match (self.sharpe_ratio, other.sharpe_ratio) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                (a, b) => a.is_some().cmp(&b.is_some()),
            },
            StrategySortKey::MaxDrawdown => self.max_drawdown.total_cmp(&other.max_drawdown),
            StrategySortKey::Trades => self.total_trades.cmp(&other.total_trades),
        }
    }
}

// ── Tables ──

/// Filtered, ordered view over a record set. `empty` is the explicit
/// no-match state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Table<R, K> {
    pub rows: Vec<R>,
    pub total: usize,
    pub empty: bool,
    pub sort: SortState<K>,
}

/// Filter first, then sort.
pub fn trade_table(
    records: &[TradeRow],
    filters: &FilterPipeline,
    sort: SortState<TradeSortKey>,
) -> Table<TradeRow, TradeSortKey> {
    let mut rows = filters.apply(records.iter().cloned());
    sort.apply(&mut rows);
    Table {
        empty: rows.is_empty(),
        total: records.len(),
        rows,
        sort,
    }
}

pub fn strategy_table(
    records: &[Strategy],
    sort: SortState<StrategySortKey>,
) -> Table<Strategy, StrategySortKey> {
    let mut rows = records.to_vec();
    sort.apply(&mut rows);
    Table {
        empty: rows.is_empty(),
        total: records.len(),
        rows,
        sort,
    }
}
