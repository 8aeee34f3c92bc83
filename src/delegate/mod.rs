//! Delegate capability and the shared forward operation
//!
//! A delegate claims URLs ([`Delegate::applies_to`]) and may rewrite them
//! ([`Delegate::transform`]). Opening a connection for a claimed URL always goes
//! through [`DelegateExt::connect`], which transforms first and only then renames
//! `http` to the `forward` sentinel via [`forward`]. The sentinel tells the
//! connection layer the URL was already resolved and must be opened as given.

use async_trait::async_trait;
use std::io;
use url::Url;

use crate::connect::{Connection, Opener, Proxy, TcpOpener, FORWARD_PROTOCOL};

pub mod dispatcher;
pub mod rewrite;

pub use dispatcher::{Dispatcher, Resolution, SelectionPolicy};
pub use rewrite::{RewriteDelegate, RewriteRule};

/// Protocol token that gets renamed to [`FORWARD_PROTOCOL`]
pub const HTTP_PROTOCOL: &str = "http";

/// Pluggable strategy that claims and optionally rewrites URLs
///
/// Implementations must keep `applies_to` free of side effects: dispatchers may
/// call it repeatedly and speculatively. Instances are shared across tasks, so
/// they should not carry mutable state.
#[async_trait]
pub trait Delegate: Send + Sync {
    /// Whether this delegate takes responsibility for `url`
    fn applies_to(&self, url: &Url) -> bool;

    /// The URL the connection layer should actually use for `url`
    async fn transform(&self, url: &Url) -> io::Result<Url>;

    /// Label used in logs and dispatcher reports
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Operations derived from [`Delegate`], implemented for every delegate
///
/// Lives on a separate trait so concrete delegates cannot reorder the
/// transform and rewrite steps.
#[async_trait]
pub trait DelegateExt: Delegate {
    /// `forward(transform(url), proxy)`
    async fn connect(&self, url: &Url, proxy: Option<&Proxy>) -> io::Result<Connection> {
        self.connect_with(&TcpOpener::default(), url, proxy).await
    }

    /// [`DelegateExt::connect`] over an explicit connection facility
    async fn connect_with(
        &self,
        opener: &dyn Opener,
        url: &Url,
        proxy: Option<&Proxy>,
    ) -> io::Result<Connection> {
        let target = self.transform(url).await?;
        forward_with(opener, &target, proxy).await
    }
}

#[async_trait]
impl<D: Delegate + ?Sized> DelegateExt for D {}

/// Rename `http` to the `forward` sentinel, keeping host, port and file
///
/// Any other protocol passes through. The result is rebuilt from protocol,
/// host, port and file only, so userinfo and fragment are not carried over.
///
/// `Url` normalises an explicit default port away at parse time, so
/// `http://host:80/` and `http://host/` both become `forward://host/`.
/// Openers resolve the missing port with [`crate::connect::default_port`],
/// which maps `forward` to 80.
pub fn forward_url(url: &Url) -> io::Result<Url> {
    let protocol = if url.scheme() == HTTP_PROTOCOL {
        FORWARD_PROTOCOL
    } else {
        url.scheme()
    };

    let mut forwarded = if protocol == url.scheme() {
        url.clone()
    } else {
        let host = url.host_str().unwrap_or_default();
        let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        Url::parse(&format!("{}://{}{}{}", protocol, host, port, file(url)))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
    };

    forwarded.set_fragment(None);
    if forwarded.has_authority() {
        // Only fails for URLs without a host, which have no credentials anyway
        let _ = forwarded.set_username("");
        let _ = forwarded.set_password(None);
    }

    Ok(forwarded)
}

/// Path plus query
pub fn file(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Rewrite `url` with [`forward_url`] and open it with the default TCP facility
pub async fn forward(url: &Url, proxy: Option<&Proxy>) -> io::Result<Connection> {
    forward_with(&TcpOpener::default(), url, proxy).await
}

/// Rewrite `url` with [`forward_url`] and open it with `opener`
pub async fn forward_with(
    opener: &dyn Opener,
    url: &Url,
    proxy: Option<&Proxy>,
) -> io::Result<Connection> {
    let forwarded = forward_url(url)?;
    opener.open(&forwarded, proxy).await
}
