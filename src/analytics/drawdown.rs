use crate::source::types::EquityCurvePoint;
use chrono::{DateTime, Utc};

/// One equity point with its percentage decline from the running peak.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawdownPoint {
    pub timestamp: DateTime<Utc>,
    pub total_equity: f64,
    pub unrealised_pnl: f64,
    pub realised_pnl: f64,
    pub open_positions: u32,
    pub peak_equity: f64,
    /// Always <= 0; exactly 0 where a new peak is set.
    pub drawdown_pct: f64,
}

/// Drawdown-from-peak over an ascending equity curve.
pub fn drawdown_series(points: &[EquityCurvePoint]) -> Vec<DrawdownPoint> {
    let mut peak = f64::NEG_INFINITY;

    points
        .iter()
        .map(|p| {
            if p.total_equity >= peak {
                peak = p.total_equity;
            }
            let drawdown_pct = if peak > 0.0 && p.total_equity < peak {
                (p.total_equity - peak) / peak * 100.0
            } else {
                0.0
            };
            DrawdownPoint {
                timestamp: p.timestamp,
                total_equity: p.total_equity,
                unrealised_pnl: p.unrealised_pnl,
                realised_pnl: p.realised_pnl,
                open_positions: p.open_positions,
                peak_equity: peak,
                drawdown_pct,
            }
        })
        .collect()
}

/// Deepest drawdown in a series (most negative value), 0 for an empty one.
pub fn max_drawdown_pct(series: &[DrawdownPoint]) -> f64 {
    series.iter().map(|p| p.drawdown_pct).fold(0.0, f64::min)
}
