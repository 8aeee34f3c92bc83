use fast_socks5::client::{Config, Socks5Stream};
use fast_socks5::SocksError;
use std::io;
use tracing::debug;

use super::BoxedStream;

/// Plain SOCKS5 CONNECT (no authentication) through the proxy at `proxy_addr`
pub(super) async fn tunnel(proxy_addr: &str, host: &str, port: u16) -> io::Result<BoxedStream> {
    let config = Config::default();
    let stream = Socks5Stream::connect(proxy_addr, host.to_string(), port, config)
        .await
        .map_err(into_io_error)?;

    debug!("SOCKS5 proxy {} opened tunnel to {}:{}", proxy_addr, host, port);
    Ok(Box::new(stream))
}

fn into_io_error(err: SocksError) -> io::Error {
    match err {
        SocksError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::ConnectionRefused, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_unreachable_socks_proxy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = match tunnel(&addr, "example.com", 80).await {
            Ok(_) => panic!("proxy is not listening"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }
}
