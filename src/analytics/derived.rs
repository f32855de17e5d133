/// Derived metrics that no single source reports.
/// All functions are pure -- the caller supplies `now`.

use crate::source::types::{Signal, Trade};
use chrono::{DateTime, Duration, Utc};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Signals per hour over the span between the newest and oldest signal.
///
/// The API hands signals back newest-first, but the span is taken from the
/// max/min timestamps so a differently-ordered list gives the same figure.
/// Fewer than two signals, or a non-positive span (clock skew), gives 0.
pub fn signals_per_hour(signals: &[Signal]) -> f64 {
    if signals.len() < 2 {
        return 0.0;
    }
    let (Some(newest), Some(oldest)) = (newest_signal(signals), oldest_signal(signals)) else {
        return 0.0;
    };
    let span_ms = (newest - oldest).num_milliseconds() as f64;
    if span_ms <= 0.0 {
        return 0.0;
    }
    signals.len() as f64 / (span_ms / MS_PER_HOUR)
}

#[inline]
pub fn newest_signal(signals: &[Signal]) -> Option<DateTime<Utc>> {
    signals.iter().map(|s| s.timestamp).max()
}

#[inline]
fn oldest_signal(signals: &[Signal]) -> Option<DateTime<Utc>> {
    signals.iter().map(|s| s.timestamp).min()
}

/// Minutes elapsed since `ts`, fractional. Negative for future timestamps.
#[inline]
pub fn minutes_since(ts: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - ts).num_milliseconds() as f64 / 60_000.0
}

/// Human-relative time: "42s ago", "5m ago", "2h 5m ago", "3h ago".
pub fn time_ago(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - ts).num_seconds();
    if secs <= 0 {
        return "just now".to_string();
    }
    if secs < 60 {
        return format!("{secs}s ago");
    }
    let mins = secs / 60;
    if mins < 60 {
        return format!("{mins}m ago");
    }
    let (h, m) = (mins / 60, mins % 60);
    if m == 0 {
        format!("{h}h ago")
    } else {
        format!("{h}h {m}m ago")
    }
}

/// Time a trade has been (or was) held. Closed trades use their exit time,
/// anything still open runs against `now`. Never negative.
pub fn hold_duration(trade: &Trade, now: DateTime<Utc>) -> Duration {
    let end = match trade.exit_time {
        Some(exit) if !trade.is_open() => exit,
        _ => now,
    };
    (end - trade.entry_time).max(Duration::zero())
}

/// "2h 5m", "14m", "40s".
pub fn format_duration(d: Duration) -> String {
    let secs = d.num_seconds().max(0);
    if secs < 60 {
        return format!("{secs}s");
    }
    let mins = secs / 60;
    if mins < 60 {
        return format!("{mins}m");
    }
    format!("{}h {}m", mins / 60, mins % 60)
}
