use super::{GatewayTransport, TlsContext};
use crate::{Error, Result};
use std::{
    fmt,
    sync::{Arc, RwLock},
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::Mutex,
    time::timeout,
};
use tokio_rustls::rustls::pki_types;
use tracing::{debug, info, warn};

type TlsClientStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Lifecycle of one encrypted session.
///
/// `Disconnected → Connecting → Handshaking → Established`, back to
/// `Disconnected` on any I/O error, `Closed` terminally on [`SecureChannel::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Handshaking,
    Established,
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Handshaking => "handshaking",
            ChannelState::Established => "established",
            ChannelState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One encrypted TCP session to one (host, port) of the push gateway.
///
/// The gateway silently closes idle connections, so the channel keeps its
/// lifecycle state observable and lets callers reconnect: the Push Client
/// retries a failed send once, the Health Monitor reconnects on a timer.
/// Operations on a single channel are serialized by the internal locks;
/// concurrent workers should hold their own channel instance.
pub struct SecureChannel {
    tls: Arc<TlsContext>,
    host: String,
    port: u16,
    read_timeout: Duration,
    state: RwLock<ChannelState>,
    read_half: Mutex<Option<tokio::io::ReadHalf<TlsClientStream>>>,
    write_half: Mutex<Option<tokio::io::WriteHalf<TlsClientStream>>>,
}

impl SecureChannel {
    pub fn new(
        tls: Arc<TlsContext>,
        host: impl Into<String>,
        port: u16,
        read_timeout: Duration,
    ) -> Self {
        SecureChannel {
            tls,
            host: host.into(),
            port,
            read_timeout,
            state: RwLock::new(ChannelState::Disconnected),
            read_half: Mutex::new(None),
            write_half: Mutex::new(None),
        }
    }

    /// The configured read timeout for this endpoint.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn state(&self) -> ChannelState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(ChannelState::Disconnected)
    }

    fn set_state(&self, state: ChannelState) {
        self.state.write().map(|mut s| *s = state).ok();
    }

    /// Resolve, connect and handshake. A no-op when already established;
    /// an error once the channel has been closed.
    pub async fn connect(&self) -> Result<()> {
        match self.state() {
            ChannelState::Established => return Ok(()),
            ChannelState::Closed => {
                return Err(Error::Connect("channel is closed".to_string()));
            }
            _ => {}
        }

        self.set_state(ChannelState::Connecting);
        let addr = format!("{}:{}", self.host, self.port);
        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            self.set_state(ChannelState::Disconnected);
            Error::Connect(format!("{}: {}", addr, e))
        })?;

        self.set_state(ChannelState::Handshaking);
        let server_name = pki_types::ServerName::try_from(self.host.clone()).map_err(|_| {
            self.set_state(ChannelState::Disconnected);
            Error::Connect(format!("invalid server name: {}", self.host))
        })?;
        let tls_stream = self
            .tls
            .connector()
            .connect(server_name, stream)
            .await
            .map_err(|e| {
                self.set_state(ChannelState::Disconnected);
                Error::Handshake(format!("{}: {}", addr, e))
            })?;

        let (read_half, write_half) = tokio::io::split(tls_stream);
        *self.read_half.lock().await = Some(read_half);
        *self.write_half.lock().await = Some(write_half);
        self.set_state(ChannelState::Established);

        info!("push gateway connection established: {}", addr);
        Ok(())
    }

    /// Write the full buffer. On failure the channel drops to
    /// `Disconnected`; whether to reconnect and resend is the caller's
    /// decision.
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.write_half.lock().await;
        let write_half = match guard.as_mut() {
            Some(write_half) => write_half,
            None => return Err(Error::Write("not connected".to_string())),
        };

        let result = async {
            write_half.write_all(data).await?;
            write_half.flush().await
        }
        .await;

        if let Err(e) = result {
            *guard = None;
            self.set_state(ChannelState::Disconnected);
            return Err(Error::Write(e.to_string()));
        }
        Ok(())
    }

    /// Read up to `max_bytes`, bounded by `timeout`. `ReadTimeout` is a
    /// liveness signal, not a failure: the session stays established.
    /// EOF means the peer closed and drops the channel to `Disconnected`.
    pub async fn receive_with_timeout(
        &self,
        max_bytes: usize,
        read_timeout: Duration,
    ) -> Result<Vec<u8>> {
        let mut guard = self.read_half.lock().await;
        let read_half = match guard.as_mut() {
            Some(read_half) => read_half,
            None => return Err(Error::ConnectionClosed),
        };

        let mut buf = vec![0u8; max_bytes];
        match timeout(read_timeout, read_half.read(&mut buf)).await {
            Err(_) => Err(Error::ReadTimeout),
            Ok(Ok(0)) => {
                debug!("push gateway closed the connection: {}:{}", self.host, self.port);
                *guard = None;
                self.set_state(ChannelState::Disconnected);
                Err(Error::ConnectionClosed)
            }
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(buf)
            }
            Ok(Err(e)) => {
                warn!("error reading from push gateway: {}", e);
                *guard = None;
                self.set_state(ChannelState::Disconnected);
                Err(Error::ConnectionClosed)
            }
        }
    }

    /// Terminal teardown: shuts down the TLS session and releases the
    /// socket. Safe to call in any state, including after prior errors.
    pub async fn close(&self) -> Result<()> {
        if let Some(mut write_half) = self.write_half.lock().await.take() {
            if let Err(e) = write_half.shutdown().await {
                debug!("shutdown on close: {}", e);
            }
        }
        self.read_half.lock().await.take();
        self.set_state(ChannelState::Closed);
        Ok(())
    }
}

#[async_trait::async_trait]
impl GatewayTransport for SecureChannel {
    async fn connect(&self) -> Result<()> {
        SecureChannel::connect(self).await
    }

    async fn send(&self, data: &[u8]) -> Result<()> {
        SecureChannel::send(self, data).await
    }

    async fn receive_with_timeout(&self, max_bytes: usize, read_timeout: Duration) -> Result<Vec<u8>> {
        SecureChannel::receive_with_timeout(self, max_bytes, read_timeout).await
    }

    fn state(&self) -> ChannelState {
        SecureChannel::state(self)
    }

    async fn close(&self) -> Result<()> {
        SecureChannel::close(self).await
    }
}

impl fmt::Display for SecureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TLS {}:{} ({})", self.host, self.port, self.state())
    }
}

impl fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
