use crate::errors::{MonitorError, MonitorResult};
use crate::poller::scheduler::OverlapPolicy;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    /// When set, log tails and the alert feed come from the legacy
    /// single-process server instead of the static file paths.
    pub legacy_base_url: Option<String>,
    pub server_port: u16,
    pub fast_poll: Duration,
    pub slow_poll: Duration,
    pub hold_tick: Duration,
    pub request_timeout: Duration,
    pub silence_threshold_minutes: f64,
    pub default_platform: Option<String>,
    pub log_file: String,
    pub alert_feed_file: String,
    pub log_tail_lines: usize,
    pub alert_feed_limit: usize,
    pub overlap_policy: OverlapPolicy,
}

impl AppConfig {
    pub fn from_env() -> MonitorResult<Self> {
        dotenvy::dotenv().ok();

        let server_port = env_var_or("SERVER_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| MonitorError::Config(format!("SERVER_PORT: {e}")))?;

        let fast_poll = parse_millis("FAST_POLL_MS", "3000")?;
        let slow_poll = parse_millis("SLOW_POLL_MS", "10000")?;
        let hold_tick = parse_millis("HOLD_TICK_MS", "1000")?;

        let request_timeout = env_var_or("REQUEST_TIMEOUT_SECS", "10")
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| MonitorError::Config(format!("REQUEST_TIMEOUT_SECS: {e}")))?;

        let silence_threshold_minutes = env_var_or("SILENCE_THRESHOLD_MINUTES", "60")
            .parse::<f64>()
            .map_err(|e| MonitorError::Config(format!("SILENCE_THRESHOLD_MINUTES: {e}")))?;
        if !silence_threshold_minutes.is_finite() || silence_threshold_minutes <= 0.0 {
            return Err(MonitorError::Config(format!(
                "SILENCE_THRESHOLD_MINUTES must be positive, got {silence_threshold_minutes}"
            )));
        }

        let log_tail_lines = env_var_or("LOG_TAIL_LINES", "200")
            .parse::<usize>()
            .map_err(|e| MonitorError::Config(format!("LOG_TAIL_LINES: {e}")))?;

        let alert_feed_limit = env_var_or("ALERT_FEED_LIMIT", "100")
            .parse::<usize>()
            .map_err(|e| MonitorError::Config(format!("ALERT_FEED_LIMIT: {e}")))?;

        let overlap_policy = env_var_or("OVERLAP_POLICY", "skip").parse::<OverlapPolicy>()?;

        let api_base_url = env_var_or("API_BASE_URL", "http://localhost:8000");
        let legacy_base_url = env_var_opt("LEGACY_BASE_URL");
        for url in std::iter::once(&api_base_url).chain(legacy_base_url.as_ref()) {
            reqwest::Url::parse(url).map_err(|e| MonitorError::Config(format!("base url `{url}`: {e}")))?;
        }

        Ok(Self {
            api_base_url,
            legacy_base_url,
            server_port,
            fast_poll,
            slow_poll,
            hold_tick,
            request_timeout,
            silence_threshold_minutes,
            default_platform: env_var_opt("DEFAULT_PLATFORM"),
            log_file: env_var_or("LOG_FILE", "strategy.log"),
            alert_feed_file: env_var_or("ALERT_FEED_FILE", "alerts.jsonl"),
            log_tail_lines,
            alert_feed_limit,
            overlap_policy,
        })
    }

    #[cfg(test)]
    pub fn for_tests(api_base_url: &str) -> Self {
        Self {
            api_base_url: api_base_url.to_string(),
            legacy_base_url: None,
            server_port: 0,
            fast_poll: Duration::from_millis(3000),
            slow_poll: Duration::from_millis(10_000),
            hold_tick: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(2),
            silence_threshold_minutes: 60.0,
            default_platform: None,
            log_file: "strategy.log".into(),
            alert_feed_file: "alerts.jsonl".into(),
            log_tail_lines: 200,
            alert_feed_limit: 100,
            overlap_policy: OverlapPolicy::SkipIfBusy,
        }
    }
}

fn parse_millis(key: &str, default: &str) -> MonitorResult<Duration> {
    let ms = env_var_or(key, default)
        .parse::<u64>()
        .map_err(|e| MonitorError::Config(format!("{key}: {e}")))?;
    if ms == 0 {
        return Err(MonitorError::Config(format!("{key} must be non-zero")));
    }
    Ok(Duration::from_millis(ms))
}

fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
