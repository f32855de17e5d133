use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// Schema check applied after a record decodes. Records that fail are
/// dropped by the decoder instead of failing the whole payload.
pub trait Record {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

// ── Strategy ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub total_trades: u64,
    #[serde(default)]
    pub win_rate: f64,
    #[serde(default)]
    pub avg_win: f64,
    #[serde(default)]
    pub avg_loss: f64,
    #[serde(default)]
    pub total_pnl: f64,
    #[serde(default)]
    pub profit_factor: Option<f64>,
    #[serde(default)]
    pub sharpe_ratio: Option<f64>,
    #[serde(default)]
    pub sortino_ratio: Option<f64>,
    #[serde(default)]
    pub max_drawdown: f64,
    #[serde(default)]
    pub expectancy: f64,
    #[serde(default)]
    pub avg_hold_minutes: f64,
    /// Platform tags this strategy belongs to.
    #[serde(default)]
    pub exchanges: BTreeSet<String>,
}

impl Strategy {
    /// Platform membership is a set lookup on `exchanges`, nothing else.
    #[inline]
    pub fn on_platform(&self, platform: &str) -> bool {
        self.exchanges.contains(platform)
    }
}

impl Record for Strategy {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("strategy without a name".into());
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

// ── Trades ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
    #[serde(other)]
    Other,
}

impl TradeStatus {
    pub fn as_query(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub asset: String,
    #[serde(default)]
    pub exchange: String,
    pub direction: Direction,
    pub entry_price: f64,
    #[serde(deserialize_with = "utc_timestamp")]
    pub entry_time: DateTime<Utc>,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default, deserialize_with = "optional_utc_timestamp")]
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_reason: Option<String>,
    #[serde(default)]
    pub realised_pnl: Option<f64>,
    pub status: TradeStatus,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Trade {
    #[inline]
    pub fn pnl(&self) -> f64 {
        self.realised_pnl.unwrap_or(0.0)
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }
}

impl Record for Trade {
    fn validate(&self) -> Result<(), String> {
        if self.is_open() && (self.exit_price.is_some() || self.exit_time.is_some()) {
            return Err(format!("open trade {} carries exit fields", self.id));
        }
        if let Some(exit) = self.exit_time {
            if exit < self.entry_time {
                return Err(format!("trade {} exits before it enters", self.id));
            }
        }
        Ok(())
    }
}

/// A trade tagged with its owning strategy. Only built by the join stage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeWithStrategy {
    pub strategy: String,
    #[serde(flatten)]
    pub trade: Trade,
}

// ── Signals ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "utc_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    #[serde(default)]
    pub exchange: String,
    /// Free text: LONG/SHORT on perp venues, YES/NO on prediction markets.
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub entry_price: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub acted_on: bool,
}

impl Record for Signal {}

// ── Equity / summary ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityCurvePoint {
    #[serde(deserialize_with = "utc_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub total_equity: f64,
    #[serde(default)]
    pub unrealised_pnl: f64,
    #[serde(default)]
    pub realised_pnl: f64,
    #[serde(default)]
    pub open_positions: u32,
}

impl Record for EquityCurvePoint {
    fn validate(&self) -> Result<(), String> {
        if !self.total_equity.is_finite() {
            return Err(format!("non-finite equity at {}", self.timestamp));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    #[serde(default)]
    pub total_equity: f64,
    #[serde(default)]
    pub realised_pnl: f64,
    #[serde(default)]
    pub unrealised_pnl: f64,
    #[serde(default)]
    pub daily_pnl: f64,
    #[serde(default)]
    pub sharpe_ratio: Option<f64>,
    #[serde(default)]
    pub max_drawdown: f64,
    #[serde(default)]
    pub open_positions: u32,
    /// Anything else the API reports is carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(default)]
    pub timestamp: String,
}

impl ServiceHealth {
    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDocs {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thesis: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Feeds ──

/// One record of a JSONL alert feed written by a strategy process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedAlert {
    #[serde(deserialize_with = "utc_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub strategy: Option<String>,
    pub message: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Record for FeedAlert {
    fn validate(&self) -> Result<(), String> {
        if self.message.is_empty() {
            return Err("alert without a message".into());
        }
        Ok(())
    }
}

/// Upstream ids show up as strings or integers depending on the writer.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// RFC 3339, or a naive ISO timestamp taken as UTC (what Python's
/// `datetime.utcnow().isoformat()` writes).
fn parse_utc(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid timestamp `{raw}`"))
}

fn utc_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_utc(&raw).map_err(serde::de::Error::custom)
}

fn optional_utc_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => parse_utc(&raw).map(Some).map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}
