use crate::analytics::{self, derived::minutes_since};
use crate::source::types::{ServiceHealth, Signal, Strategy};
use chrono::{DateTime, Utc};
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warn,
    Crit,
}

/// Derived per poll; carries no identity across polls.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct HealthAlert {
    pub level: AlertLevel,
    pub text: String,
}

impl HealthAlert {
    fn warn(text: String) -> Self {
        Self { level: AlertLevel::Warn, text }
    }

    fn crit(text: String) -> Self {
        Self { level: AlertLevel::Crit, text }
    }
}

pub type Alerts = SmallVec<[HealthAlert; 4]>;

#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    /// Minutes without a signal before warning; twice this is critical.
    pub silence_minutes: f64,
    /// Max drawdown percentage above which a warning fires.
    pub drawdown_warn_pct: f64,
    /// Max drawdown percentage above which the alert is critical.
    pub drawdown_crit_pct: f64,
    /// Total P&L below this is critical.
    pub loss_crit: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            silence_minutes: 60.0,
            drawdown_warn_pct: 3.0,
            drawdown_crit_pct: 5.0,
            loss_crit: -500.0,
        }
    }
}

/// Evaluate every rule, in order, for one strategy. All matching alerts
/// are returned. Disabled strategies produce none.
pub fn evaluate_strategy(
    strategy: &Strategy,
    signals: &[Signal],
    now: DateTime<Utc>,
    limits: &HealthThresholds,
) -> Alerts {
    let mut alerts = Alerts::new();
    if !strategy.enabled {
        return alerts;
    }

    // 1. Silence
    match analytics::newest_signal(signals) {
        None => alerts.push(HealthAlert::warn("No signals recorded yet".into())),
        Some(newest) => {
            let m = minutes_since(newest, now);
            if m > 2.0 * limits.silence_minutes {
                alerts.push(HealthAlert::crit(format!(
                    "No signals for {:.0} min (limit {:.0} min)",
                    m,
                    2.0 * limits.silence_minutes
                )));
            } else if m > limits.silence_minutes {
                alerts.push(HealthAlert::warn(format!(
                    "No signals for {:.0} min (threshold {:.0} min)",
                    m, limits.silence_minutes
                )));
            }
        }
    }

    // 2. Drawdown
    let dd = strategy.max_drawdown;
    if dd > limits.drawdown_crit_pct {
        alerts.push(HealthAlert::crit(format!(
            "Max drawdown {}% exceeds {}% limit",
            dd, limits.drawdown_crit_pct
        )));
    } else if dd > limits.drawdown_warn_pct {
        alerts.push(HealthAlert::warn(format!(
            "Max drawdown {}% approaching {}% limit",
            dd, limits.drawdown_crit_pct
        )));
    }

    // 3. Loss
    if strategy.total_pnl < limits.loss_crit {
        alerts.push(HealthAlert::crit(format!(
            "Total P&L {:.2} below {} limit",
            strategy.total_pnl, limits.loss_crit
        )));
    }

    alerts
}

/// One strategy's row on the health board.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyHealth {
    pub name: String,
    pub enabled: bool,
    pub signal_count: usize,
    pub last_signal: Option<DateTime<Utc>>,
    pub last_signal_ago: Option<String>,
    pub signals_per_hour: f64,
    pub alerts: Alerts,
}

pub fn strategy_health(
    strategy: &Strategy,
    signals: &[Signal],
    now: DateTime<Utc>,
    limits: &HealthThresholds,
) -> StrategyHealth {
    let last_signal = analytics::newest_signal(signals);
    StrategyHealth {
        name: strategy.name.clone(),
        enabled: strategy.enabled,
        signal_count: signals.len(),
        last_signal,
        last_signal_ago: last_signal.map(|ts| analytics::time_ago(ts, now)),
        signals_per_hour: analytics::signals_per_hour(signals),
        alerts: evaluate_strategy(strategy, signals, now, limits),
    }
}

/// Service check, rendered apart from the per-strategy alerts.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheck {
    pub healthy: bool,
    pub status: String,
    pub error: Option<String>,
}

impl ServiceCheck {
    pub fn from_result(result: Result<ServiceHealth, String>) -> Self {
        match result {
            Ok(h) => Self {
                healthy: h.is_healthy(),
                status: h.status,
                error: None,
            },
            Err(e) => Self {
                healthy: false,
                status: "unreachable".into(),
                error: Some(e),
            },
        }
    }
}
