use super::decode;
use super::types::*;
use super::{DashboardSource, FeedSource};
use crate::errors::{MonitorError, MonitorResult};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Client for the strategy monitoring REST API. All methods return Result, never panic.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .pool_max_idle_per_host(8)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Join percent-encoded path segments onto the base URL. Strategy names
    /// are free text, so they always go through here.
    fn endpoint(&self, segments: &[&str]) -> MonitorResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| MonitorError::Config(format!("API base url `{}`: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| MonitorError::Config(format!("API base url `{}` cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> MonitorResult<reqwest::Response> {
        let path = url.path().to_string();
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MonitorError::network(format!("GET {path}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MonitorError::Network {
                status: Some(status.as_u16()),
                message: format!("GET {path}: {}", truncate(&body, 200)),
            });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> MonitorResult<T> {
        let path = url.path().to_string();
        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|e| MonitorError::network(format!("GET {path}: {e}")))?;
        serde_json::from_slice::<T>(&bytes).map_err(|e| MonitorError::Parse(format!("GET {path}: {e}")))
    }

    /// Fetch an object and decode the array under `field` record by record.
    async fn get_records<T: DeserializeOwned + Record>(
        &self,
        url: Url,
        field: &str,
    ) -> MonitorResult<Vec<T>> {
        let path = url.path().to_string();
        let mut body: serde_json::Value = self.get_json(url).await?;
        let values = match body.get_mut(field).map(serde_json::Value::take) {
            Some(serde_json::Value::Array(values)) => values,
            Some(serde_json::Value::Null) | None => {
                return Err(MonitorError::Parse(format!("GET {path}: missing `{field}` array")))
            }
            Some(other) => {
                return Err(MonitorError::Parse(format!(
                    "GET {path}: `{field}` is not an array: {}",
                    truncate(&other.to_string(), 80)
                )))
            }
        };
        Ok(decode::decode_records(values, &path))
    }

    async fn get_text(&self, url: Url) -> MonitorResult<String> {
        let path = url.path().to_string();
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|e| MonitorError::network(format!("GET {path}: {e}")))
    }

    // ── JSON endpoints ──

    pub async fn get_strategies(&self) -> MonitorResult<Vec<Strategy>> {
        self.get_records(self.endpoint(&["api", "strategies"])?, "strategies")
            .await
    }

    pub async fn get_summary(&self) -> MonitorResult<Summary> {
        self.get_json(self.endpoint(&["api", "summary"])?).await
    }

    /// Points come back ascending by time; a stable sort keeps that true
    /// even if the writer appended out of order.
    pub async fn get_equity_curve(&self) -> MonitorResult<Vec<EquityCurvePoint>> {
        let mut points: Vec<EquityCurvePoint> = self
            .get_records(self.endpoint(&["api", "equity-curve"])?, "data")
            .await?;
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }

    pub async fn get_trades(
        &self,
        strategy: &str,
        status: Option<TradeStatus>,
    ) -> MonitorResult<Vec<Trade>> {
        let mut url = self.endpoint(&["api", "strategies", strategy, "trades"])?;
        if let Some(s) = status {
            url.query_pairs_mut().append_pair("status", s.as_query());
        }
        self.get_records(url, "trades").await
    }

    pub async fn get_signals(&self, strategy: &str) -> MonitorResult<Vec<Signal>> {
        self.get_records(self.endpoint(&["api", "strategies", strategy, "signals"])?, "signals")
            .await
    }

    pub async fn get_strategy_docs(&self, strategy: &str) -> MonitorResult<StrategyDocs> {
        self.get_json(self.endpoint(&["api", "strategies", strategy, "docs"])?)
            .await
    }

    pub async fn get_health(&self) -> MonitorResult<ServiceHealth> {
        self.get_json(self.endpoint(&["api", "health"])?).await
    }

    // ── Flat files served next to the API ──

    pub async fn get_log_tail(&self, file: &str, lines: usize) -> MonitorResult<Vec<String>> {
        let text = self.get_text(self.endpoint(&["logs", file])?).await?;
        Ok(decode::tail_lines(&text, lines))
    }

    pub async fn get_alert_feed(&self, file: &str, limit: usize) -> MonitorResult<Vec<FeedAlert>> {
        let url = self.endpoint(&["data", file])?;
        let path = url.path().to_string();
        let text = self.get_text(url).await?;
        Ok(decode::keep_last(decode::parse_jsonl(&text, &path), limit))
    }
}

impl DashboardSource for ApiClient {
    async fn strategies(&self) -> MonitorResult<Vec<Strategy>> {
        self.get_strategies().await
    }

    async fn summary(&self) -> MonitorResult<Summary> {
        self.get_summary().await
    }

    async fn equity_curve(&self) -> MonitorResult<Vec<EquityCurvePoint>> {
        self.get_equity_curve().await
    }

    async fn trades(&self, strategy: &str, status: Option<TradeStatus>) -> MonitorResult<Vec<Trade>> {
        self.get_trades(strategy, status).await
    }

    async fn signals(&self, strategy: &str) -> MonitorResult<Vec<Signal>> {
        self.get_signals(strategy).await
    }

    async fn health(&self) -> MonitorResult<ServiceHealth> {
        self.get_health().await
    }
}

impl FeedSource for ApiClient {
    async fn log_tail(&self, file: &str, lines: usize) -> MonitorResult<Vec<String>> {
        self.get_log_tail(file, lines).await
    }

    async fn alert_feed(&self, file: &str, limit: usize) -> MonitorResult<Vec<FeedAlert>> {
        self.get_alert_feed(file, limit).await
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
