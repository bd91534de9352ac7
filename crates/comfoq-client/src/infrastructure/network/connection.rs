//! TCP implementation of the gateway link.
//!
//! Architecture:
//! - [`TcpConnector`] resolves the gateway (UDP discovery) and opens TCP
//!   streams to it.
//! - Each [`TcpLink`] splits its stream.  A reader task feeds received bytes
//!   through a [`FrameDecoder`] and forwards [`LinkEvent`]s on an `mpsc`
//!   channel; the write half stays with the link for outbound frames.

use std::time::Duration;

use async_trait::async_trait;
use comfoq_core::protocol::FrameDecoder;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::mpsc,
    task::JoinHandle,
    time,
};
use tracing::{debug, info, warn};

use crate::application::link::{DeviceConnector, DeviceDescriptor, DeviceLink, LinkError, LinkEvent};
use crate::infrastructure::network::discovery::{discover_gateway, DiscoveryError};

/// Maximum time a single frame write may take.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens real network links to a gateway.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl DeviceConnector for TcpConnector {
    async fn discover(
        &self,
        broadcast: std::net::SocketAddr,
        timeout: Duration,
    ) -> Result<DeviceDescriptor, LinkError> {
        discover_gateway(broadcast, timeout).await.map_err(|e| match e {
            DiscoveryError::Timeout(d) => LinkError::DiscoveryTimeout(d),
            DiscoveryError::Socket(source) | DiscoveryError::Send { source, .. } => {
                LinkError::Io(source)
            }
        })
    }

    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn DeviceLink>, LinkError> {
        let addr = format!("{host}:{port}");
        let stream = match time::timeout(timeout, TcpStream::connect(&addr)).await {
            Err(_) => return Err(LinkError::ConnectTimeout(addr)),
            Ok(Err(e)) => {
                return Err(LinkError::ConnectFailed {
                    addr,
                    reason: e.to_string(),
                })
            }
            Ok(Ok(stream)) => stream,
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {e}");
        }
        info!("connected to gateway at {addr}");
        Ok(Box::new(TcpLink::new(stream)))
    }
}

/// One TCP connection to a gateway.
pub struct TcpLink {
    writer: Option<OwnedWriteHalf>,
    inbound: mpsc::Receiver<LinkEvent>,
    reader: JoinHandle<()>,
    closed: bool,
}

impl TcpLink {
    /// Wraps an established stream and starts its reader task.
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(128);
        let reader = tokio::spawn(read_frames(read_half, tx));
        Self {
            writer: Some(write_half),
            inbound: rx,
            reader,
            closed: false,
        }
    }
}

#[async_trait]
impl DeviceLink for TcpLink {
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), LinkError> {
        let writer = self.writer.as_mut().ok_or(LinkError::Closed)?;
        match time::timeout(WRITE_TIMEOUT, writer.write_all(&frame)).await {
            Ok(result) => result.map_err(LinkError::Io),
            Err(_) => Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "frame write timed out",
            ))),
        }
    }

    async fn next_event(&mut self) -> LinkEvent {
        if self.closed {
            return LinkEvent::Closed;
        }
        match self.inbound.recv().await {
            Some(event) => {
                if matches!(event, LinkEvent::Closed | LinkEvent::Corrupt(_)) {
                    self.closed = true;
                }
                event
            }
            None => {
                self.closed = true;
                LinkEvent::Closed
            }
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        self.reader.abort();
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("error shutting down gateway stream: {e}");
            }
        }
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Reads the stream until EOF, error or a fatal framing error.
async fn read_frames(mut reader: OwnedReadHalf, tx: mpsc::Sender<LinkEvent>) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; 4096];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("gateway closed the stream");
                let _ = tx.send(LinkEvent::Closed).await;
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("read error on gateway stream: {e}");
                let _ = tx.send(LinkEvent::Closed).await;
                return;
            }
        };
        decoder.push(&buf[..n]);

        loop {
            let event = match decoder.next_message() {
                Ok(Some(msg)) => LinkEvent::Message(msg),
                Ok(None) => break,
                Err(e) if e.is_fatal() => {
                    let _ = tx.send(LinkEvent::Corrupt(e)).await;
                    return;
                }
                Err(e) => LinkEvent::Skipped(e),
            };
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use comfoq_core::protocol::{encode_message, Body, Message, OperationType};
    use tokio::net::TcpListener;
    use uuid::Uuid;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_connect_refused_maps_to_connect_failed() {
        // Arrange: bind then drop to get a port nobody listens on
        let (listener, port) = listener().await;
        drop(listener);

        // Act
        let result = TcpConnector
            .connect("127.0.0.1", port, Duration::from_secs(1))
            .await;

        // Assert
        assert!(matches!(result, Err(LinkError::ConnectFailed { .. })));
    }

    #[tokio::test]
    async fn test_link_delivers_frames_split_across_writes() {
        // Arrange
        let (listener, port) = listener().await;
        let frame = encode_message(&Message::request(
            Uuid::from_u128(1),
            Uuid::from_u128(2),
            9,
            Body::VersionRequest,
        ))
        .unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&frame[..5]).await.unwrap();
            sock.flush().await.unwrap();
            time::sleep(Duration::from_millis(20)).await;
            sock.write_all(&frame[5..]).await.unwrap();
            sock
        });

        // Act
        let mut link = TcpConnector
            .connect("127.0.0.1", port, Duration::from_secs(1))
            .await
            .unwrap();
        let event = link.next_event().await;

        // Assert
        match event {
            LinkEvent::Message(msg) => {
                assert_eq!(msg.kind(), OperationType::VersionRequest);
                assert_eq!(msg.reference(), Some(9));
            }
            other => panic!("unexpected event {other:?}"),
        }
        drop(server.await.unwrap());
        assert!(matches!(link.next_event().await, LinkEvent::Closed));
        assert!(matches!(link.next_event().await, LinkEvent::Closed));
    }

    #[tokio::test]
    async fn test_fatal_length_reports_corrupt() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&[0, 0, 0, 1, 0xaa]).await.unwrap();
            time::sleep(Duration::from_millis(200)).await;
        });

        let mut link = TcpConnector
            .connect("127.0.0.1", port, Duration::from_secs(1))
            .await
            .unwrap();

        assert!(matches!(link.next_event().await, LinkEvent::Corrupt(_)));
        assert!(matches!(link.next_event().await, LinkEvent::Closed));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let _conn = listener.accept().await.unwrap();
            time::sleep(Duration::from_millis(200)).await;
        });

        let mut link = TcpConnector
            .connect("127.0.0.1", port, Duration::from_secs(1))
            .await
            .unwrap();
        link.close().await;

        assert!(matches!(link.send(vec![1, 2, 3]).await, Err(LinkError::Closed)));
        assert!(matches!(link.next_event().await, LinkEvent::Closed));
    }
}
