use super::decode;
use super::types::FeedAlert;
use super::FeedSource;
use crate::errors::{MonitorError, MonitorResult};
use reqwest::Client;
use std::time::Duration;

/// Lines the legacy server returns from `/api/logs`.
const LEGACY_LOG_LINES: usize = 200;
/// Records the legacy server returns from `/api/alerts`.
const LEGACY_ALERT_RECORDS: usize = 100;

/// Client for the old single-process server that reads its own log and
/// alert files. It exposes one log and one feed, so file names are ignored.
#[derive(Clone)]
pub struct LegacyClient {
    client: Client,
    base_url: String,
}

#[derive(serde::Deserialize)]
struct LogsResponse {
    #[serde(default)]
    lines: Vec<String>,
}

#[derive(serde::Deserialize)]
struct AlertsResponse {
    #[serde(default)]
    alerts: Vec<serde_json::Value>,
}

impl LegacyClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> MonitorResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MonitorError::network(format!("GET {path} (legacy): {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MonitorError::Network {
                status: Some(status.as_u16()),
                message: format!("GET {path} (legacy): {body}"),
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| MonitorError::Parse(format!("GET {path} (legacy): {e}")))
    }
}

impl FeedSource for LegacyClient {
    async fn log_tail(&self, _file: &str, lines: usize) -> MonitorResult<Vec<String>> {
        let resp: LogsResponse = self.get_json("/api/logs").await?;
        Ok(decode::keep_last(resp.lines, lines.min(LEGACY_LOG_LINES)))
    }

    async fn alert_feed(&self, _file: &str, limit: usize) -> MonitorResult<Vec<FeedAlert>> {
        let resp: AlertsResponse = self.get_json("/api/alerts").await?;
        let alerts: Vec<FeedAlert> = decode::decode_records(resp.alerts, "/api/alerts (legacy)");
        Ok(decode::keep_last(alerts, limit.min(LEGACY_ALERT_RECORDS)))
    }
}
