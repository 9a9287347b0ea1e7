use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// One duplex line-oriented link to a draft server.
///
/// `recv` yields whole frames with the newline stripped; `None` means the
/// server closed the connection cleanly. Both halves are driven from the
/// session task, so implementations only need `&mut self`.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, line: &str) -> io::Result<()>;
    async fn recv(&mut self) -> Option<io::Result<String>>;
    async fn close(&mut self) -> io::Result<()>;
}

/// Produces fresh transports. The session task calls this once on startup
/// and again for every reconnect attempt.
#[async_trait]
pub trait Connector: Send + 'static {
    type Transport: Transport + 'static;

    async fn connect(&mut self) -> io::Result<Self::Transport>;
}

// ── TCP ─────────────────────────────────────────────────────────────

/// JSON-lines over a plain TCP stream.
pub struct TcpTransport {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer: write_half,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    async fn recv(&mut self) -> Option<io::Result<String>> {
        self.lines.next_line().await.transpose()
    }

    async fn close(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

/// Dials the same address for every attempt.
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Transport = TcpTransport;

    async fn connect(&mut self) -> io::Result<TcpTransport> {
        let stream = TcpStream::connect(&self.addr).await?;
        Ok(TcpTransport::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_transport_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"{\"type\":\"ping\",\"timestamp\":7}\n");
            stream
                .write_all(b"{\"type\":\"pong\",\"timestamp\":7}\n")
                .await
                .unwrap();
        });

        let mut connector = TcpConnector::new(addr.to_string());
        let mut transport = connector.connect().await.unwrap();
        transport
            .send(r#"{"type":"ping","timestamp":7}"#)
            .await
            .unwrap();

        let reply = transport.recv().await.unwrap().unwrap();
        assert_eq!(reply, r#"{"type":"pong","timestamp":7}"#);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_transport_recv_none_on_server_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut connector = TcpConnector::new(addr.to_string());
        let mut transport = connector.connect().await.unwrap();
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_tcp_connector_refused() {
        // Bind then drop to get a port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut connector = TcpConnector::new(addr.to_string());
        assert!(connector.connect().await.is_err());
    }
}
