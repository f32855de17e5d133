//! Scope-wide roll-up across strategies.
//! Pure -- takes the strategy snapshot and returns computed values.

use crate::source::types::Strategy;

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollup {
    pub strategies: usize,
    pub enabled: usize,
    pub total_trades: u64,
    pub total_pnl: f64,
    /// Win rate weighted by each strategy's trade count.
    pub win_rate: f64,
    pub best: Option<StrategyPnl>,
    pub worst: Option<StrategyPnl>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyPnl {
    pub name: String,
    pub total_pnl: f64,
}

pub fn compute_rollup(strategies: &[Strategy]) -> Rollup {
    let total_trades: u64 = strategies.iter().map(|s| s.total_trades).sum();
    let weighted_wins: f64 = strategies
        .iter()
        .map(|s| s.win_rate * s.total_trades as f64)
        .sum();

    let best = strategies
        .iter()
        .max_by(|a, b| a.total_pnl.total_cmp(&b.total_pnl))
        .map(to_pnl);
    let worst = strategies
        .iter()
        .min_by(|a, b| a.total_pnl.total_cmp(&b.total_pnl))
        .map(to_pnl);

    Rollup {
        strategies: strategies.len(),
        enabled: strategies.iter().filter(|s| s.enabled).count(),
        total_trades,
        total_pnl: strategies.iter().map(|s| s.total_pnl).sum(),
        win_rate: if total_trades == 0 {
            0.0
        } else {
            weighted_wins / total_trades as f64
        },
        best,
        worst,
    }
}

fn to_pnl(s: &Strategy) -> StrategyPnl {
    StrategyPnl {
        name: s.name.clone(),
        total_pnl: s.total_pnl,
    }
}
