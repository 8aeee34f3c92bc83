//! Reference dispatcher over an ordered set of delegates

use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use url::Url;

use super::{forward_url, forward_with, Delegate, DelegateExt};
use crate::connect::{Connection, Opener, Proxy, TcpOpener};
use crate::log_connect_transaction;
use crate::models::ConnectLog;
use crate::utils::duration_to_ms;

/// How a delegate is picked when several claim the same URL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Earliest registered delegate wins
    #[default]
    FirstMatch,
    /// More than one claimant is an error
    Exclusive,
}

/// Outcome of running selection and rewriting without opening anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub delegate: Option<String>,
    pub transformed: Url,
    pub forwarded: Url,
}

pub struct Dispatcher {
    delegates: Vec<Arc<dyn Delegate>>,
    policy: SelectionPolicy,
    opener: Arc<dyn Opener>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(SelectionPolicy::default())
    }
}

impl Dispatcher {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            delegates: Vec::new(),
            policy,
            opener: Arc::new(TcpOpener::default()),
        }
    }

    pub fn with_opener(mut self, opener: Arc<dyn Opener>) -> Self {
        self.opener = opener;
        self
    }

    /// Append a delegate; registration order is selection order
    pub fn add_delegate(&mut self, delegate: Arc<dyn Delegate>) {
        self.delegates.push(delegate);
    }

    pub fn delegates(&self) -> &[Arc<dyn Delegate>] {
        &self.delegates
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Delegate responsible for `url`, or `None` when nobody claims it
    pub fn select(&self, url: &Url) -> io::Result<Option<&Arc<dyn Delegate>>> {
        match self.policy {
            SelectionPolicy::FirstMatch => Ok(self.delegates.iter().find(|d| d.applies_to(url))),
            SelectionPolicy::Exclusive => {
                let claimants: Vec<&Arc<dyn Delegate>> =
                    self.delegates.iter().filter(|d| d.applies_to(url)).collect();
                if claimants.len() > 1 {
                    let names: Vec<&str> = claimants.iter().map(|d| d.name()).collect();
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("{} is claimed by several delegates: {}", url, names.join(", ")),
                    ));
                }
                Ok(claimants.into_iter().next())
            }
        }
    }

    /// Selection, transform and sentinel rewrite, without connecting
    pub async fn resolve(&self, url: &Url) -> io::Result<Resolution> {
        let (delegate, transformed) = match self.select(url)? {
            Some(delegate) => (Some(delegate.name().to_string()), delegate.transform(url).await?),
            None => (None, url.clone()),
        };
        let forwarded = forward_url(&transformed)?;

        Ok(Resolution {
            delegate,
            transformed,
            forwarded,
        })
    }

    /// Open a connection for `url` through the selected delegate, or forward it as is
    pub async fn open(&self, url: &Url, proxy: Option<&Proxy>) -> io::Result<Connection> {
        let started = Instant::now();
        let mut entry = ConnectLog::new(url, proxy);

        let result = self.open_inner(url, proxy, &mut entry).await;

        let elapsed = duration_to_ms(started.elapsed());
        entry.duration_ms = Some(elapsed);
        match &result {
            Ok(conn) => {
                entry.forwarded = Some(conn.url().to_string());
                entry.peer = Some(conn.peer().to_string());
            }
            Err(e) => entry.error = Some(e.to_string()),
        }

        if entry.is_success() {
            let forwarded = entry.forwarded.as_deref().unwrap_or_default();
            info!("✅ {} → {} ({}ms)", url, forwarded, elapsed);
        } else {
            info!("❌ {} failed: {}", url, entry.error.as_deref().unwrap_or_default());
        }
        log_connect_transaction!(&entry);

        result
    }

    async fn open_inner(
        &self,
        url: &Url,
        proxy: Option<&Proxy>,
        entry: &mut ConnectLog,
    ) -> io::Result<Connection> {
        match self.select(url)? {
            Some(delegate) => {
                debug!(
                    "Delegate {} claimed {}, opening via {}",
                    delegate.name(),
                    url,
                    self.opener.name()
                );
                entry.delegate = Some(delegate.name().to_string());
                delegate.connect_with(self.opener.as_ref(), url, proxy).await
            }
            None => {
                debug!("No delegate claimed {}, forwarding via {}", url, self.opener.name());
                forward_with(self.opener.as_ref(), url, proxy).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect::BoxedStream;
    use crate::delegate::RewriteDelegate;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingOpener {
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Opener for RecordingOpener {
        async fn open(&self, url: &Url, proxy: Option<&Proxy>) -> io::Result<Connection> {
            self.urls.lock().unwrap().push(url.to_string());
            let (stream, _peer) = tokio::io::duplex(16);
            let stream: BoxedStream = Box::new(stream);
            Ok(Connection::new(url.clone(), proxy.cloned(), "memory".to_string(), stream))
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn rewrite(name: &str, host: &str, target: &str) -> Arc<dyn Delegate> {
        Arc::new(RewriteDelegate::new(name, host, Url::parse(target).unwrap()))
    }

    fn dispatcher(policy: SelectionPolicy) -> (Dispatcher, Arc<RecordingOpener>) {
        let opener = Arc::new(RecordingOpener::default());
        let mut dispatcher = Dispatcher::new(policy).with_opener(opener.clone());
        dispatcher.add_delegate(rewrite("first", "api.example.com", "http://first.local/"));
        dispatcher.add_delegate(rewrite("second", "api.example.com", "https://second.local/"));
        dispatcher.add_delegate(rewrite("cdn", "cdn.example.com", "http://cache.local:81/"));
        (dispatcher, opener)
    }

    #[test]
    fn test_first_match_picks_earliest() {
        let (dispatcher, _) = dispatcher(SelectionPolicy::FirstMatch);
        let url = Url::parse("http://api.example.com/v1").unwrap();
        let selected = dispatcher.select(&url).unwrap().unwrap();
        assert_eq!(selected.name(), "first");
    }

    #[test]
    fn test_exclusive_rejects_ambiguity() {
        let (dispatcher, _) = dispatcher(SelectionPolicy::Exclusive);
        let url = Url::parse("http://api.example.com/v1").unwrap();
        let err = dispatcher.select(&url).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("first, second"));

        let url = Url::parse("http://cdn.example.com/lib.jar").unwrap();
        assert_eq!(dispatcher.select(&url).unwrap().unwrap().name(), "cdn");
    }

    #[test]
    fn test_unclaimed_selects_nothing() {
        let (dispatcher, _) = dispatcher(SelectionPolicy::Exclusive);
        let url = Url::parse("http://elsewhere.example.com/").unwrap();
        assert!(dispatcher.select(&url).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_claimed_url() {
        let (dispatcher, opener) = dispatcher(SelectionPolicy::FirstMatch);
        let url = Url::parse("https://cdn.example.com/lib.jar?v=2").unwrap();

        let resolution = dispatcher.resolve(&url).await.unwrap();
        assert_eq!(resolution.delegate.as_deref(), Some("cdn"));
        assert_eq!(resolution.transformed.as_str(), "http://cache.local:81/lib.jar?v=2");
        assert_eq!(resolution.forwarded.as_str(), "forward://cache.local:81/lib.jar?v=2");
        assert!(opener.urls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_claimed_and_unclaimed() {
        let (dispatcher, opener) = dispatcher(SelectionPolicy::FirstMatch);

        let claimed = Url::parse("http://api.example.com/v1").unwrap();
        let conn = dispatcher.open(&claimed, None).await.unwrap();
        assert_eq!(conn.url().as_str(), "forward://first.local/v1");

        let unclaimed = Url::parse("http://elsewhere.example.com:8080/x").unwrap();
        dispatcher.open(&unclaimed, None).await.unwrap();

        let secure = Url::parse("https://elsewhere.example.com/y").unwrap();
        dispatcher.open(&secure, None).await.unwrap();

        assert_eq!(
            opener.urls.lock().unwrap().as_slice(),
            [
                "forward://first.local/v1",
                "forward://elsewhere.example.com:8080/x",
                "https://elsewhere.example.com/y",
            ]
        );
    }

    #[tokio::test]
    async fn test_open_surfaces_selection_error() {
        let (dispatcher, opener) = dispatcher(SelectionPolicy::Exclusive);
        let url = Url::parse("http://api.example.com/v1").unwrap();
        assert!(dispatcher.open(&url, None).await.is_err());
        assert!(opener.urls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: SelectionPolicy = serde_yaml::from_str("exclusive").unwrap();
        assert_eq!(policy, SelectionPolicy::Exclusive);
        let policy: SelectionPolicy = serde_yaml::from_str("first_match").unwrap();
        assert_eq!(policy, SelectionPolicy::FirstMatch);
    }
}
