pub mod client;
pub mod decode;
pub mod legacy;
pub mod types;

use crate::errors::MonitorResult;
use std::future::Future;
use types::*;

/// Typed access to the strategy API. The join stage and the views are
/// generic over this so they can run against any backend.
pub trait DashboardSource: Clone + Send + Sync + 'static {
    fn strategies(&self) -> impl Future<Output = MonitorResult<Vec<Strategy>>> + Send;

    fn summary(&self) -> impl Future<Output = MonitorResult<Summary>> + Send;

    /// Ascending by timestamp.
    fn equity_curve(&self) -> impl Future<Output = MonitorResult<Vec<EquityCurvePoint>>> + Send;

    fn trades(
        &self,
        strategy: &str,
        status: Option<TradeStatus>,
    ) -> impl Future<Output = MonitorResult<Vec<Trade>>> + Send;

    /// Newest-first, as the API returns them.
    fn signals(&self, strategy: &str) -> impl Future<Output = MonitorResult<Vec<Signal>>> + Send;

    fn health(&self) -> impl Future<Output = MonitorResult<ServiceHealth>> + Send;
}

/// Raw log tails and JSONL alert feeds. Served either as flat files next to
/// the API or by the legacy single-process server.
pub trait FeedSource: Clone + Send + Sync + 'static {
    fn log_tail(&self, file: &str, lines: usize) -> impl Future<Output = MonitorResult<Vec<String>>> + Send;

    fn alert_feed(&self, file: &str, limit: usize) -> impl Future<Output = MonitorResult<Vec<FeedAlert>>> + Send;
}

/// Which backend serves the feeds, picked once from config.
#[derive(Clone)]
pub enum Feeds {
    Files(client::ApiClient),
    Legacy(legacy::LegacyClient),
}

impl FeedSource for Feeds {
    async fn log_tail(&self, file: &str, lines: usize) -> MonitorResult<Vec<String>> {
        match self {
            Feeds::Files(c) => c.log_tail(file, lines).await,
            Feeds::Legacy(c) => c.log_tail(file, lines).await,
        }
    }

    async fn alert_feed(&self, file: &str, limit: usize) -> MonitorResult<Vec<FeedAlert>> {
        match self {
            Feeds::Files(c) => c.alert_feed(file, limit).await,
            Feeds::Legacy(c) => c.alert_feed(file, limit).await,
        }
    }
}
