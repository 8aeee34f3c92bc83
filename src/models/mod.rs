use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::connect::Proxy;
use crate::utils::now;

// One dispatch attempt, from the URL the caller handed in to the opened endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectLog {
    pub url: String,
    pub delegate: Option<String>,
    pub forwarded: Option<String>,
    pub proxy: Option<String>,
    pub peer: Option<String>,

    pub timestamp: DateTime<Utc>,
    pub duration_ms: Option<u64>,

    pub error: Option<String>,
}

impl ConnectLog {
    // Start a record for an incoming URL
    pub fn new(url: &Url, proxy: Option<&Proxy>) -> Self {
        Self {
            url: url.to_string(),
            delegate: None,
            forwarded: None,
            proxy: proxy.map(|p| p.to_string()),
            peer: None,
            timestamp: now(),
            duration_ms: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::ProxyKind;

    #[test]
    fn test_new_log_records_url_and_proxy() {
        let url = Url::parse("http://example.com/a").unwrap();
        let proxy = Proxy::new(ProxyKind::Http, "127.0.0.1:3128");
        let log = ConnectLog::new(&url, Some(&proxy));

        assert_eq!(log.url, "http://example.com/a");
        assert_eq!(log.proxy.as_deref(), Some("http://127.0.0.1:3128"));
        assert!(log.is_success());
    }

    #[test]
    fn test_log_serializes_to_json() {
        let url = Url::parse("https://example.com/").unwrap();
        let mut log = ConnectLog::new(&url, None);
        log.error = Some("refused".to_string());

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["error"], "refused");
        assert!(json["proxy"].is_null());
    }
}
