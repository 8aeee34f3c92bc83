//! Connection-opening facility
//!
//! Turns a URL (usually one already renamed by [`crate::delegate::forward_url`])
//! and an optional proxy into an open byte stream. Openers are keyed on the
//! URL's protocol token; the `forward` sentinel is opened exactly like `http`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;
use url::{Host, Url};

mod http_connect;
mod socks5;

/// Protocol token the delegate layer substitutes for `http`
pub const FORWARD_PROTOCOL: &str = "forward";

/// Workaround for `only auto traits can be used as additional traits in a trait object`
pub trait ConnectionIo: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> ConnectionIo for T {}

pub type BoxedStream = Box<dyn ConnectionIo + Send + Unpin>;

/// Kind of intermediary a connection is routed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    /// HTTP proxy, tunnelled with `CONNECT`
    Http,
    /// SOCKS5 proxy without authentication
    Socks5,
}

impl ProxyKind {
    pub fn scheme(&self) -> &'static str {
        match self {
            ProxyKind::Http => "http",
            ProxyKind::Socks5 => "socks5",
        }
    }
}

/// An intermediary hop: kind plus `host:port` address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    kind: ProxyKind,
    addr: String,
}

impl Proxy {
    pub fn new(kind: ProxyKind, addr: impl Into<String>) -> Self {
        Self {
            kind,
            addr: addr.into(),
        }
    }

    pub fn kind(&self) -> ProxyKind {
        self.kind
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Parse a proxy from a URL such as `http://10.0.0.1:3128` or `socks5://localhost:1080`
    ///
    /// HTTP proxies default to port 80 and SOCKS5 proxies to 1080. Proxy
    /// authentication is not supported, so URLs carrying credentials are rejected.
    pub fn parse(input: &str) -> io::Result<Self> {
        let url = Url::parse(input.trim())
            .map_err(|e| invalid_input(format!("invalid proxy URL '{}': {}", input, e)))?;

        let kind = match url.scheme() {
            "http" => ProxyKind::Http,
            "socks5" | "socks5h" => ProxyKind::Socks5,
            other => {
                return Err(invalid_input(format!(
                    "unsupported proxy scheme '{}' in '{}'",
                    other, input
                )))
            }
        };

        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid_input(format!(
                "proxy URL for {} carries credentials, which are not supported",
                url.host_str().unwrap_or_default()
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid_input(format!("proxy URL '{}' has no host", input)))?;

        let port = url.port_or_known_default().or(match kind {
            ProxyKind::Socks5 => Some(1080),
            ProxyKind::Http => None,
        });
        let port = port.ok_or_else(|| invalid_input(format!("proxy URL '{}' has no port", input)))?;

        Ok(Self::new(kind, format!("{}:{}", host, port)))
    }
}

impl FromStr for Proxy {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.kind.scheme(), self.addr)
    }
}

/// An open channel to the endpoint of a URL, possibly through a proxy
///
/// The caller owns the connection; dropping it closes the stream.
pub struct Connection {
    url: Url,
    proxy: Option<Proxy>,
    peer: String,
    stream: BoxedStream,
}

impl Connection {
    pub fn new(url: Url, proxy: Option<Proxy>, peer: String, stream: BoxedStream) -> Self {
        Self {
            url,
            proxy,
            peer,
            stream,
        }
    }

    /// URL the connection was opened for
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }

    pub fn is_proxied(&self) -> bool {
        self.proxy.is_some()
    }

    /// `host:port` endpoint requested for the URL
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url.as_str())
            .field("proxy", &self.proxy)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut *self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().stream).poll_shutdown(cx)
    }
}

/// Facility that opens a connection for a URL, directly or via a proxy
#[async_trait]
pub trait Opener: Send + Sync {
    /// Open a connection for `url`, routed through `proxy` when one is given
    async fn open(&self, url: &Url, proxy: Option<&Proxy>) -> io::Result<Connection>;

    /// Get the implementation name
    fn name(&self) -> &'static str;
}

/// Default port for a protocol token this crate knows how to open
pub fn default_port(protocol: &str) -> Option<u16> {
    match protocol {
        FORWARD_PROTOCOL | "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        "ftp" => Some(21),
        _ => None,
    }
}

/// Host and port to dial for `url`
pub fn endpoint(url: &Url) -> io::Result<(String, u16)> {
    let protocol = url.scheme();
    let default = default_port(protocol).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unknown protocol: {}", protocol),
        )
    })?;

    let host = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        _ => return Err(invalid_input(format!("URL has no host: {}", url))),
    };

    Ok((host, url.port().unwrap_or(default)))
}

/// `host:port`, bracketing IPv6 literals
pub fn authority(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Plain TCP opener, the default connection facility
#[derive(Debug, Clone, Default)]
pub struct TcpOpener {
    connect_timeout: Option<Duration>,
}

impl TcpOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the whole open (including any proxy handshake)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    async fn dial(host: &str, port: u16, proxy: Option<&Proxy>) -> io::Result<BoxedStream> {
        match proxy {
            None => {
                debug!("Establishing a direct connection to {}", authority(host, port));
                let socket = TcpStream::connect((host, port)).await?;
                Ok(Box::new(socket))
            }
            Some(proxy) => {
                let target = authority(host, port);
                match proxy.kind() {
                    ProxyKind::Http => {
                        debug!("Tunnelling to {} through HTTP proxy {}", target, proxy.addr());
                        http_connect::tunnel(proxy.addr(), &target).await
                    }
                    ProxyKind::Socks5 => {
                        debug!("Tunnelling to {} through SOCKS5 proxy {}", target, proxy.addr());
                        socks5::tunnel(proxy.addr(), host, port).await
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Opener for TcpOpener {
    async fn open(&self, url: &Url, proxy: Option<&Proxy>) -> io::Result<Connection> {
        let (host, port) = endpoint(url)?;
        let peer = authority(&host, port);

        let stream = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, Self::dial(&host, port, proxy))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connecting to {} timed out after {:?}", peer, limit),
                    )
                })??,
            None => Self::dial(&host, port, proxy).await?,
        };

        Ok(Connection::new(url.clone(), proxy.cloned(), peer, stream))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

/// Openers keyed by protocol token, with an optional fallback
#[derive(Default)]
pub struct OpenerRegistry {
    openers: HashMap<String, Arc<dyn Opener>>,
    fallback: Option<Arc<dyn Opener>>,
}

impl OpenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, protocol: impl Into<String>, opener: Arc<dyn Opener>) -> Self {
        self.openers.insert(protocol.into(), opener);
        self
    }

    pub fn with_fallback(mut self, opener: Arc<dyn Opener>) -> Self {
        self.fallback = Some(opener);
        self
    }

    /// Opener responsible for `protocol`, if any
    pub fn lookup(&self, protocol: &str) -> Option<&Arc<dyn Opener>> {
        self.openers.get(protocol).or(self.fallback.as_ref())
    }
}

#[async_trait]
impl Opener for OpenerRegistry {
    async fn open(&self, url: &Url, proxy: Option<&Proxy>) -> io::Result<Connection> {
        let opener = self.lookup(url.scheme()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                format!("no opener registered for protocol: {}", url.scheme()),
            )
        })?;
        opener.open(url, proxy).await
    }

    fn name(&self) -> &'static str {
        "registry"
    }
}

fn invalid_input(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}
