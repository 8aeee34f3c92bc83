use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::BoxedStream;

const CONNECT_HEADERS_MAX_SIZE: usize = 8192;
const CONNECT_HEADERS_MAX_COUNT: usize = 32;

/// Send CONNECT to an HTTP proxy and return the stream on 2xx response
pub(super) async fn tunnel(proxy_addr: &str, target: &str) -> io::Result<BoxedStream> {
    let mut stream = TcpStream::connect(proxy_addr).await?;

    let request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\n", target, target);
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    // Byte at a time so nothing past the header block is consumed
    let mut buf = Vec::with_capacity(512);
    let mut one = [0u8; 1];
    loop {
        let n = stream.read(&mut one).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "HTTP proxy closed connection before response",
            ));
        }
        buf.push(one[0]);
        if buf.ends_with(b"\r\n\r\n") {
            break;
        }
        if buf.len() > CONNECT_HEADERS_MAX_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "HTTP proxy response headers too large",
            ));
        }
    }

    let mut headers = [httparse::EMPTY_HEADER; CONNECT_HEADERS_MAX_COUNT];
    let mut response = httparse::Response::new(&mut headers);
    response
        .parse(&buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let code = response
        .code
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Empty HTTP proxy response"))?;
    if !(200..300).contains(&code) {
        let reason = response.reason.unwrap_or("");
        return Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!(
                "HTTP proxy CONNECT failed with status code {}: {}",
                code, reason
            ),
        ));
    }

    debug!("HTTP proxy {} opened tunnel to {}", proxy_addr, target);
    Ok(Box::new(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one client, record the CONNECT header block, answer with `reply`
    async fn fake_proxy(reply: &'static [u8]) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut seen = Vec::new();
            let mut one = [0u8; 1];
            while !seen.ends_with(b"\r\n\r\n") {
                if socket.read(&mut one).await.unwrap() == 0 {
                    break;
                }
                seen.push(one[0]);
            }
            socket.write_all(reply).await.unwrap();
            socket.write_all(b"tunnelled").await.unwrap();
            String::from_utf8(seen).unwrap()
        });

        (addr, handle)
    }

    #[tokio::test]
    async fn test_tunnel_established() {
        let (addr, handle) =
            fake_proxy(b"HTTP/1.1 200 Connection established\r\n\r\n").await;

        let mut stream = tunnel(&addr, "example.com:80").await.unwrap();
        let mut buf = [0u8; 9];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"tunnelled");

        let request = handle.await.unwrap();
        assert!(request.starts_with("CONNECT example.com:80 HTTP/1.1\r\n"));
        assert!(request.contains("Host: example.com:80\r\n"));
    }

    #[tokio::test]
    async fn test_tunnel_rejected() {
        let (addr, _handle) =
            fake_proxy(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n").await;

        let err = match tunnel(&addr, "example.com:443").await {
            Ok(_) => panic!("tunnel should be rejected"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert!(err.to_string().contains("407"));
    }

    #[tokio::test]
    async fn test_proxy_hangs_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let err = match tunnel(&addr, "example.com:80").await {
            Ok(_) => panic!("tunnel should fail"),
            Err(e) => e,
        };
        assert!(matches!(
            err.kind(),
            io::ErrorKind::UnexpectedEof
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::BrokenPipe
        ));
    }
}
