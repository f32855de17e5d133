/// Error contract shared by every data source and view.
/// Nothing here is fatal once the service is running:
/// - Network / Parse failures keep the view's last data and surface inline
/// - per-strategy failures during a join are substituted with empty results
/// - only Config errors at startup stop the process
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("network error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Network { status: Option<u16>, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl MonitorError {
    pub fn network(message: impl Into<String>) -> Self {
        MonitorError::Network {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status carried by a network error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            MonitorError::Network { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return MonitorError::Parse(e.to_string());
        }
        MonitorError::Network {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        MonitorError::Parse(e.to_string())
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_display_includes_status() {
        let e = MonitorError::Network {
            status: Some(503),
            message: "GET /api/summary: upstream down".into(),
        };
        assert_eq!(e.to_string(), "network error (503): GET /api/summary: upstream down");
        assert_eq!(e.status(), Some(503));
    }

    #[test]
    fn test_transport_failure_has_no_status() {
        let e = MonitorError::network("connection refused");
        assert_eq!(e.to_string(), "network error: connection refused");
        assert_eq!(e.status(), None);
    }

    #[test]
    fn test_json_error_maps_to_parse() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(MonitorError::from(err), MonitorError::Parse(_)));
    }
}
