pub mod channel;
pub mod tls;

pub use channel::{ChannelState, SecureChannel};
pub use tls::TlsContext;

use crate::Result;
use std::time::Duration;

/// Seam between the push orchestration and the encrypted session.
///
/// `SecureChannel` is the production implementation; tests substitute
/// scripted mocks to drive the retry and polling paths.
#[async_trait::async_trait]
pub trait GatewayTransport: Send + Sync {
    /// Establish the session. A no-op when already established.
    async fn connect(&self) -> Result<()>;

    /// Write the full buffer or fail.
    async fn send(&self, data: &[u8]) -> Result<()>;

    /// Blocking read bounded by `timeout`. `Error::ReadTimeout` is the
    /// normal idle outcome, not a fault.
    async fn receive_with_timeout(&self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>>;

    fn state(&self) -> ChannelState;

    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
pub mod tests;
