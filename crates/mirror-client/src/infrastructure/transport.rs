//! TCP transport for the forwarded video socket.
//!
//! The device-side server is reached through an `adb forward` tunnel, so from
//! here it is an ordinary TCP connection to a local port.  A background task
//! reads the socket, parses the stream header and packet framing, and pushes
//! each item to the session tagged with the [`TransportTarget`] it was opened
//! for.  The session drops anything whose target is no longer current, so the
//! task never needs to know whether it has been superseded.
//!
//! The server may still be binding when the session opens the transport, so a
//! refused or timed-out connect is retried a few times before giving up.

use std::time::Duration;

use async_trait::async_trait;
use mirror_core::{Ingress, MediaStreamParser, StreamHeaderOptions, StreamItem};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::application::session::{
    SessionEvent, TransportConnector, TransportError, TransportHandle, TransportTarget,
};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Where and how to reach the video socket.
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    pub host: String,
    pub port: u16,
    /// Limit for each connect attempt.
    pub connect_timeout: Duration,
    pub connect_attempts: u32,
    pub connect_retry_delay: Duration,
    pub header: StreamHeaderOptions,
}

pub struct TcpTransportConnector {
    config: TcpTransportConfig,
}

impl TcpTransportConnector {
    pub fn new(config: TcpTransportConfig) -> Self {
        Self { config }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    async fn connect(&self, addr: &str) -> Result<TcpStream, TransportError> {
        let attempts = self.config.connect_attempts.max(1);
        let mut attempt = 1;
        loop {
            let error = match time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => TransportError::Connect(format!("{addr}: {e}")),
                Err(_) => TransportError::Timeout(self.config.connect_timeout),
            };
            if attempt >= attempts {
                return Err(error);
            }
            debug!(%addr, attempt, "video socket not ready: {error}");
            attempt += 1;
            time::sleep(self.config.connect_retry_delay).await;
        }
    }
}

#[async_trait]
impl TransportConnector for TcpTransportConnector {
    async fn open(
        &self,
        target: TransportTarget,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        let addr = self.address();
        let stream = self.connect(&addr).await?;
        stream.set_nodelay(true)?;
        info!(%addr, device = %target.device, generation = %target.generation, "video socket connected");

        let task = tokio::spawn(pump(stream, target, self.config.header, events));
        Ok(Box::new(TcpTransportHandle { task: Some(task) }))
    }
}

/// Owns the reader task; closing aborts it.
pub struct TcpTransportHandle {
    task: Option<JoinHandle<()>>,
}

impl TransportHandle for TcpTransportHandle {
    fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TcpTransportHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reads `reader` until EOF or error, forwarding parsed items as session
/// events.  Always finishes with [`SessionEvent::TransportClosed`] unless the
/// session has gone away.
pub async fn pump<R: AsyncRead + Unpin>(
    mut reader: R,
    target: TransportTarget,
    header: StreamHeaderOptions,
    events: mpsc::Sender<SessionEvent>,
) {
    let mut parser = MediaStreamParser::new(header);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let reason = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break None,
            Ok(n) => n,
            Err(e) => break Some(format!("read failed: {e}")),
        };
        let items = match parser.push(&buf[..n]) {
            Ok(items) => items,
            Err(e) => break Some(format!("protocol error: {e}")),
        };
        for item in items {
            let event = match item {
                StreamItem::Metadata(metadata) => SessionEvent::StreamMetadata {
                    target: target.clone(),
                    metadata,
                },
                StreamItem::Packet(packet) => SessionEvent::Ingress {
                    target: target.clone(),
                    ingress: Ingress::Packet(packet),
                },
                StreamItem::Raw(bytes) => SessionEvent::Ingress {
                    target: target.clone(),
                    ingress: Ingress::Bytes(bytes),
                },
            };
            if events.send(event).await.is_err() {
                debug!("session gone; stopping reader");
                return;
            }
        }
    };

    if let Some(reason) = &reason {
        warn!(generation = %target.generation, "video socket closed: {reason}");
    }
    if events
        .send(SessionEvent::TransportClosed { target, reason })
        .await
        .is_err()
    {
        debug!("session gone before close notification");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
